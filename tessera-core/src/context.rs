//! Per-request state.
//!
//! An [`ApplicationContext`] is created for every request and owned by the
//! code handling it. It accumulates path parameters and the matched
//! resource and URI stacks as dispatch descends through locators. It
//! caches query parameters and carries request-scoped attributes. Instances
//! queued for destruction have their [`Resource::destroy`] hook called when
//! the context is dropped.

use crate::error::ResourceError;
use crate::http::{EntityType, HttpRequest};
use crate::media_type::MediaType;
use crate::provider::{ContextResolver, ProviderRegistry};
use crate::resource::Resource;
use crate::uri_pattern::decode;
use crate::Error;
use std::any::{Any, TypeId};
use std::cell::OnceCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

/// One path segment with its matrix parameters, e.g. `cars;color=red`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    pub path: String,
    pub matrix: Vec<(String, String)>,
}

impl PathSegment {
    fn parse(raw: &str) -> Self {
        let mut parts = raw.split(';');
        let path = decode(parts.next().unwrap_or_default());
        let matrix = parts
            .filter(|p| !p.is_empty())
            .map(|p| match p.split_once('=') {
                Some((k, v)) => (decode(k), decode(v)),
                None => (decode(p), String::new()),
            })
            .collect();
        Self { path, matrix }
    }

    pub fn matrix_param(&self, name: &str) -> Option<&str> {
        self.matrix
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Remove `;name=value` matrix parameters from every segment of `path`.
pub fn strip_matrix_params(path: &str) -> String {
    if !path.contains(';') {
        return path.to_string();
    }
    path.split('/')
        .map(|segment| segment.split(';').next().unwrap_or_default())
        .collect::<Vec<_>>()
        .join("/")
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_query(k), decode_query(v))
        })
        .collect()
}

fn decode_query(value: &str) -> String {
    decode(&value.replace('+', " "))
}

/// Request-scoped state threaded through dispatch.
pub struct ApplicationContext {
    request: HttpRequest,
    providers: Arc<ProviderRegistry>,
    /// Raw (encoded) path parameters in the order they were matched.
    path_params: Vec<(String, String)>,
    query_params: OnceCell<Vec<(String, String)>>,
    matched_uris: VecDeque<String>,
    matched_resources: VecDeque<Arc<dyn Resource>>,
    attributes: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    properties: HashMap<String, String>,
    destroy_queue: Vec<Arc<dyn Resource>>,
    locator_depth: usize,
}

impl ApplicationContext {
    pub fn new(request: HttpRequest, providers: Arc<ProviderRegistry>) -> Self {
        Self {
            request,
            providers,
            path_params: Vec::new(),
            query_params: OnceCell::new(),
            matched_uris: VecDeque::new(),
            matched_resources: VecDeque::new(),
            attributes: HashMap::new(),
            properties: HashMap::new(),
            destroy_queue: Vec::new(),
            locator_depth: 0,
        }
    }

    // ------------------------------------------------------------------------
    // Request
    // ------------------------------------------------------------------------

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    /// Mutable request, for filters. Changing the query string resets the
    /// cached query parameters.
    pub fn request_mut(&mut self) -> &mut HttpRequest {
        self.query_params = OnceCell::new();
        &mut self.request
    }

    pub fn providers(&self) -> &Arc<ProviderRegistry> {
        &self.providers
    }

    /// Request path with matrix parameters removed, still encoded.
    pub fn path(&self) -> String {
        strip_matrix_params(&self.request.path)
    }

    /// Decoded path segments with their matrix parameters.
    pub fn path_segments(&self) -> Vec<PathSegment> {
        self.request
            .path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(PathSegment::parse)
            .collect()
    }

    // ------------------------------------------------------------------------
    // Parameters
    // ------------------------------------------------------------------------

    /// Decoded value of path parameter `name`; the innermost match wins.
    pub fn path_param(&self, name: &str) -> Option<String> {
        self.path_param_encoded(name).map(decode)
    }

    pub fn path_param_encoded(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// All decoded path parameters in match order. A name bound at several
    /// levels appears once per level.
    pub fn path_params(&self) -> Vec<(String, String)> {
        self.path_params
            .iter()
            .map(|(k, v)| (k.clone(), decode(v)))
            .collect()
    }

    pub(crate) fn add_path_params(&mut self, names: &[String], values: &[String]) {
        self.path_params
            .extend(names.iter().cloned().zip(values.iter().cloned()));
    }

    /// Decoded query parameters, parsed on first use.
    pub fn query_params(&self) -> &[(String, String)] {
        self.query_params
            .get_or_init(|| self.request.query.as_deref().map(parse_query).unwrap_or_default())
    }

    /// First value of query parameter `name`.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params()
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn query_param_values(&self, name: &str) -> Vec<&str> {
        self.query_params()
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    // ------------------------------------------------------------------------
    // Matched stacks
    // ------------------------------------------------------------------------

    /// Matched URI fragments, most recent first, still encoded.
    pub fn matched_uris(&self) -> impl Iterator<Item = &str> {
        self.matched_uris.iter().map(String::as_str)
    }

    pub fn matched_uris_decoded(&self) -> Vec<String> {
        self.matched_uris.iter().map(|u| decode(u)).collect()
    }

    /// Resource instances that handled this request, most recent first.
    pub fn matched_resources(&self) -> impl Iterator<Item = &Arc<dyn Resource>> {
        self.matched_resources.iter()
    }

    pub(crate) fn push_matched_uri(&mut self, uri: &str) {
        if !uri.is_empty() {
            self.matched_uris.push_front(uri.to_string());
        }
    }

    pub(crate) fn push_matched_resource(&mut self, resource: Arc<dyn Resource>) {
        self.matched_resources.push_front(resource);
    }

    pub fn locator_depth(&self) -> usize {
        self.locator_depth
    }

    pub(crate) fn enter_locator(&mut self) -> usize {
        self.locator_depth += 1;
        self.locator_depth
    }

    // ------------------------------------------------------------------------
    // Attributes and properties
    // ------------------------------------------------------------------------

    pub fn set_attribute<T: Any + Send + Sync>(&mut self, value: T) {
        self.attributes.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn attribute<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.attributes
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }

    pub fn remove_attribute<T: Any + Send + Sync>(&mut self) -> Option<T> {
        self.attributes
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok())
            .map(|b| *b)
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    // ------------------------------------------------------------------------
    // Providers
    // ------------------------------------------------------------------------

    /// Read the request body as `T` with the reader registered for the
    /// request content type (`application/octet-stream` when absent).
    pub fn read_entity<T: Any + Send + Sync>(&self) -> Result<T, Error> {
        let media_type = self
            .request
            .content_type()?
            .unwrap_or_else(MediaType::octet_stream);
        let ty = EntityType::of::<T>();
        let reader = self
            .providers
            .get_message_body_reader(&ty, &media_type)
            .ok_or_else(|| {
                Error::UnsupportedMediaType(format!("Media type {} is not supported.", media_type))
            })?;
        let entity = reader.read_from(
            &ty,
            &media_type,
            &self.request.headers,
            &mut self.request.body.as_ref(),
        )?;
        entity.downcast::<T>().map_err(|entity| {
            Error::Internal(format!(
                "reader for {} produced {}",
                ty,
                entity.entity_type()
            ))
        })
    }

    pub fn context_resolver<T: 'static>(
        &self,
        media_type: &MediaType,
    ) -> Option<Arc<dyn ContextResolver<T>>> {
        self.providers.get_context_resolver::<T>(media_type)
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Call `instance.destroy()` when this request completes.
    pub fn destroy_on_completion(&mut self, instance: Arc<dyn Resource>) {
        self.destroy_queue.push(instance);
    }

    fn destroy_all(&mut self) {
        for instance in self.destroy_queue.drain(..) {
            let result: Result<(), ResourceError> = instance.destroy();
            if let Err(e) = result {
                error!(error = %e, "Failed to destroy per-request resource");
            }
        }
    }
}

impl Drop for ApplicationContext {
    fn drop(&mut self) {
        if !self.destroy_queue.is_empty() {
            debug!(count = self.destroy_queue.len(), "Destroying per-request resources");
            self.destroy_all();
        }
    }
}

impl fmt::Debug for ApplicationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationContext")
            .field("method", &self.request.method)
            .field("path", &self.request.path)
            .field("path_params", &self.path_params)
            .field("matched_uris", &self.matched_uris)
            .field("locator_depth", &self.locator_depth)
            .finish()
    }
}
