// HTTP request and response types

use crate::Error;
use crate::content_negotiation::AcceptMediaType;
use crate::media_type::MediaType;
use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode};
use std::any::{Any, TypeId};
use std::fmt;
use tracing::warn;

// ============================================================================
// Request
// ============================================================================

/// Inbound request as seen by the dispatcher.
///
/// `path` keeps its percent-encoding; the query string, if any, is split off
/// into `query`.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpRequest {
    /// Build a request for `uri`, which may carry a query string.
    pub fn new(method: Method, uri: &str) -> Self {
        let (path, query) = match uri.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (uri, None),
        };
        let path = if path.is_empty() { "/" } else { path };
        Self {
            method,
            path: path.to_string(),
            query,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn get(uri: &str) -> Self {
        Self::new(Method::GET, uri)
    }

    pub fn post(uri: &str) -> Self {
        Self::new(Method::POST, uri)
    }

    pub fn put(uri: &str) -> Self {
        Self::new(Method::PUT, uri)
    }

    pub fn delete(uri: &str) -> Self {
        Self::new(Method::DELETE, uri)
    }

    pub fn head(uri: &str) -> Self {
        Self::new(Method::HEAD, uri)
    }

    pub fn options(uri: &str) -> Self {
        Self::new(Method::OPTIONS, uri)
    }

    /// Append a header. Names or values that are not valid HTTP are dropped
    /// with a warning.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let Some((name, value)) = header_pair(name, value) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header, if it is visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// All values of a header joined with `,`.
    pub fn header_joined(&self, name: &str) -> Option<String> {
        let values: Vec<&str> = self
            .headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.join(","))
        }
    }

    /// Parsed `Content-Type`; malformed values are a bad request.
    pub fn content_type(&self) -> Result<Option<MediaType>, Error> {
        match self.header(CONTENT_TYPE.as_str()) {
            None => Ok(None),
            Some(value) => MediaType::parse(value)
                .map(Some)
                .map_err(|_| Error::BadRequest(format!("invalid Content-Type '{}'", value))),
        }
    }

    /// Quality-sorted `Accept` entries.
    pub fn accept_media_types(&self) -> Result<Vec<AcceptMediaType>, Error> {
        AcceptMediaType::parse_list(self.header_joined(ACCEPT.as_str()).as_deref())
    }

    /// Path plus query string.
    pub fn uri(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{}", self.path, q),
            None => self.path.clone(),
        }
    }
}

// ============================================================================
// Entities
// ============================================================================

/// Runtime type of an entity, used to pick readers and writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityType {
    id: TypeId,
    name: &'static str,
}

impl EntityType {
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A type-erased request or response body value.
pub struct Entity {
    value: Box<dyn Any + Send + Sync>,
    ty: EntityType,
}

impl Entity {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Box::new(value),
            ty: EntityType::of::<T>(),
        }
    }

    pub fn entity_type(&self) -> EntityType {
        self.ty
    }

    pub fn is<T: Any>(&self) -> bool {
        self.ty.is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Take the value out, or get the entity back on a type mismatch.
    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        let ty = self.ty;
        self.value
            .downcast::<T>()
            .map(|b| *b)
            .map_err(|value| Self { value, ty })
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity").field("type", &self.ty.name).finish()
    }
}

// ============================================================================
// Response
// ============================================================================

/// Response produced by dispatch, before the entity is serialized.
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub entity: Option<Entity>,
}

impl HttpResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            entity: None,
        }
    }

    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    pub fn created() -> Self {
        Self::new(StatusCode::CREATED)
    }

    pub fn accepted() -> Self {
        Self::new(StatusCode::ACCEPTED)
    }

    pub fn no_content() -> Self {
        Self::new(StatusCode::NO_CONTENT)
    }

    pub fn bad_request() -> Self {
        Self::new(StatusCode::BAD_REQUEST)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND)
    }

    pub fn internal_server_error() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.entity = Some(entity);
        self
    }

    /// Plain-text body; sets `Content-Type: text/plain` unless already set.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.entity = Some(Entity::new(text.into()));
        if !self.headers.contains_key(CONTENT_TYPE) {
            self.headers
                .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        }
        self
    }

    /// Replace a header. Invalid names or values are dropped with a warning.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let Some((name, value)) = header_pair(name, value) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn with_content_type(mut self, media_type: &MediaType) -> Self {
        self.set_content_type(media_type);
        self
    }

    pub fn set_content_type(&mut self, media_type: &MediaType) {
        match HeaderValue::from_str(&media_type.to_header_value()) {
            Ok(value) => {
                self.headers.insert(CONTENT_TYPE, value);
            }
            Err(_) => warn!(media_type = %media_type, "Dropping unrepresentable Content-Type"),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Parsed `Content-Type`, `None` when absent or malformed.
    pub fn content_type(&self) -> Option<MediaType> {
        self.header(CONTENT_TYPE.as_str())
            .and_then(|v| MediaType::parse(v).ok())
    }

    pub fn entity_ref<T: Any>(&self) -> Option<&T> {
        self.entity.as_ref().and_then(|e| e.downcast_ref::<T>())
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("entity", &self.entity)
            .finish()
    }
}

fn header_pair(name: &str, value: &str) -> Option<(HeaderName, HeaderValue)> {
    match (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_str(value),
    ) {
        (Ok(name), Ok(value)) => Some((name, value)),
        _ => {
            warn!(header = name, "Dropping invalid header");
            None
        }
    }
}

// ============================================================================
// Invocation results
// ============================================================================

/// Handle to work continuing in the background; answered with
/// `202 Accepted` and a `Location` pointing at `uri`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncJob {
    pub uri: String,
}

impl AsyncJob {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

/// What a resource method returned.
#[derive(Debug)]
pub enum Outcome {
    /// No value; answered with `204 No Content`
    Empty,
    /// A value to serialize with a negotiated writer
    Entity(Entity),
    /// A complete response, passed through
    Response(HttpResponse),
    Job(AsyncJob),
}

impl From<()> for Outcome {
    fn from(_: ()) -> Self {
        Outcome::Empty
    }
}

impl From<Entity> for Outcome {
    fn from(entity: Entity) -> Self {
        Outcome::Entity(entity)
    }
}

impl From<HttpResponse> for Outcome {
    fn from(response: HttpResponse) -> Self {
        Outcome::Response(response)
    }
}

impl From<AsyncJob> for Outcome {
    fn from(job: AsyncJob) -> Self {
        Outcome::Job(job)
    }
}

impl From<String> for Outcome {
    fn from(s: String) -> Self {
        Outcome::Entity(Entity::new(s))
    }
}

impl From<&'static str> for Outcome {
    fn from(s: &'static str) -> Self {
        Outcome::Entity(Entity::new(s))
    }
}

impl From<Vec<u8>> for Outcome {
    fn from(v: Vec<u8>) -> Self {
        Outcome::Entity(Entity::new(v))
    }
}

impl From<Bytes> for Outcome {
    fn from(b: Bytes) -> Self {
        Outcome::Entity(Entity::new(b))
    }
}

impl From<serde_json::Value> for Outcome {
    fn from(v: serde_json::Value) -> Self {
        Outcome::Entity(Entity::new(v))
    }
}

impl<T: Into<Outcome>> From<Option<T>> for Outcome {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Outcome::Empty)
    }
}

// ============================================================================
// Errors carrying a response
// ============================================================================

/// Error that already knows its response.
///
/// Returned from resource code to abort with a specific status. When the
/// response has no entity, the message becomes a `text/plain` body.
pub struct WebApplicationError {
    pub response: HttpResponse,
    pub message: Option<String>,
}

impl WebApplicationError {
    pub fn new(response: HttpResponse) -> Self {
        Self {
            response,
            message: None,
        }
    }

    pub fn status(status: StatusCode) -> Self {
        Self::new(HttpResponse::new(status))
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl fmt::Debug for WebApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebApplicationError")
            .field("status", &self.response.status)
            .field("message", &self.message)
            .finish()
    }
}

impl fmt::Display for WebApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.response.status, message),
            None => write!(f, "{}", self.response.status),
        }
    }
}

impl std::error::Error for WebApplicationError {}
