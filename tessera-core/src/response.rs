//! Turning invocation results into responses and writing them out.
//!
//! [`assemble`] maps what a resource method returned onto a status, headers
//! and entity. [`write_response`] picks a writer for the entity and
//! serializes it into a [`ResponseSink`].

use crate::content_negotiation::{AcceptMediaType, acceptable_media_type};
use crate::http::{HttpRequest, HttpResponse, Outcome};
use crate::media_type::MediaType;
use crate::provider::ProviderRegistry;
use crate::Error;
use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use std::io::{self, Write};
use tracing::{error, warn};

// ============================================================================
// Assembly
// ============================================================================

/// Build the response for an invocation `outcome`.
///
/// `content_type` is the negotiated type for a bare entity; it is also
/// stamped on a returned response that carries an entity but no
/// `Content-Type`.
pub fn assemble(outcome: Outcome, content_type: Option<MediaType>) -> HttpResponse {
    match outcome {
        Outcome::Empty => HttpResponse::no_content(),
        Outcome::Job(job) => HttpResponse::accepted()
            .with_header(LOCATION.as_str(), &job.uri)
            .with_text(job.uri),
        Outcome::Response(mut response) => {
            if response.entity.is_some()
                && !response.headers.contains_key(CONTENT_TYPE)
                && let Some(ct) = &content_type
            {
                response.set_content_type(ct);
            }
            response
        }
        Outcome::Entity(entity) => {
            let response = HttpResponse::ok().with_entity(entity);
            match &content_type {
                Some(ct) => response.with_content_type(ct),
                None => response,
            }
        }
    }
}

// ============================================================================
// Writing
// ============================================================================

/// Destination of a serialized response.
pub trait ResponseSink {
    fn set_status(&mut self, status: StatusCode);

    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Body stream; headers are final once this is first called.
    fn body(&mut self) -> &mut dyn Write;
}

/// A response serialized into memory.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BufferedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl BufferedResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn into_body(self) -> Bytes {
        Bytes::from(self.body)
    }
}

impl ResponseSink for BufferedResponse {
    fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn body(&mut self) -> &mut dyn Write {
        &mut self.body
    }
}

/// Serialize `response` into `sink`.
///
/// A missing `Content-Type` is negotiated from the writers able to handle
/// the entity, falling back to `application/octet-stream`. When no writer
/// exists the client gets 406, except for HEAD where the entity is simply
/// dropped. A client that goes away while the body is written is logged
/// and otherwise ignored.
pub fn write_response(
    request: &HttpRequest,
    mut response: HttpResponse,
    providers: &ProviderRegistry,
    sink: &mut dyn ResponseSink,
) -> Result<(), Error> {
    let is_head = request.method == Method::HEAD;

    let Some(entity) = response.entity.take() else {
        sink.set_status(response.status);
        sink.headers_mut().extend(response.headers);
        return Ok(());
    };
    let ty = entity.entity_type();

    let content_type = match response.content_type() {
        Some(ct) if !ct.is_wildcard_type() && !ct.is_wildcard_subtype() => ct,
        _ => {
            let accept = request
                .accept_media_types()
                .unwrap_or_else(|_| vec![AcceptMediaType::any()]);
            let writable = providers.get_acceptable_writer_media_types(&ty);
            let ct = acceptable_media_type(&accept, &writable)
                .filter(|ct| !ct.is_wildcard_type() && !ct.is_wildcard_subtype())
                .unwrap_or_else(MediaType::octet_stream);
            response.set_content_type(&ct);
            ct
        }
    };

    let Some(writer) = providers.get_message_body_writer(&ty, &content_type) else {
        let message = format!("Not found writer for {} and MIME type {}", ty, content_type);
        if is_head {
            warn!(entity = ty.name(), content_type = %content_type, "{}", message);
            sink.set_status(response.status);
            sink.headers_mut().extend(response.headers);
            return Ok(());
        }
        error!(entity = ty.name(), content_type = %content_type, "{}", message);
        return write_text(sink, StatusCode::NOT_ACCEPTABLE, &message);
    };

    if let Some(size) = writer.size(&entity, &content_type) {
        response.headers.insert(CONTENT_LENGTH, HeaderValue::from(size));
    }

    sink.set_status(response.status);
    let headers = sink.headers_mut();
    headers.extend(response.headers);
    if is_head {
        return Ok(());
    }

    // writers may still add headers; they land in the sink before the body
    let mut late_headers = HeaderMap::new();
    let mut body = Vec::new();
    writer.write_to(&entity, &content_type, &mut late_headers, &mut body)?;
    sink.headers_mut().extend(late_headers);
    swallow_client_abort(sink.body().write_all(&body).and_then(|_| sink.body().flush()))
}

fn write_text(sink: &mut dyn ResponseSink, status: StatusCode, message: &str) -> Result<(), Error> {
    sink.set_status(status);
    let headers = sink.headers_mut();
    headers.clear();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(message.len()));
    swallow_client_abort(sink.body().write_all(message.as_bytes()))
}

fn swallow_client_abort(result: io::Result<()>) -> Result<(), Error> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if is_client_abort(&e) => {
            warn!(error = %e, "Client aborted while the response was written");
            Ok(())
        }
        Err(e) => Err(Error::Io(e)),
    }
}

/// Whether `e` means the peer closed the connection.
pub fn is_client_abort(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
    )
}
