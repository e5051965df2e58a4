//! The complete request pipeline.
//!
//! [`RequestHandler`] ties the registries and the dispatcher together:
//!
//! 1. URI normalization and `X-HTTP-Method-Override`
//! 2. request filters, which may answer on their own
//! 3. dispatch
//! 4. mapping of resource errors to responses
//! 5. response filters
//! 6. entity serialization through the provider registry
//! 7. destruction of per-request instances
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use tessera_core::*;
//!
//! struct Hello;
//!
//! impl Resource for Hello {
//!     fn path() -> Option<&'static str> {
//!         Some("/hello/{name}")
//!     }
//!
//!     fn describe(r: &mut ResourceBuilder<Self>) {
//!         r.get(|_, ctx| Ok(format!("hello {}", ctx.path_param("name").unwrap_or_default())));
//!     }
//! }
//!
//! let resources = Arc::new(ResourceRegistry::new());
//! resources.add_singleton(Hello).unwrap();
//! let handler = RequestHandler::new(resources, Arc::new(ProviderRegistry::with_defaults()));
//!
//! let response = handler.handle_buffered(HttpRequest::get("/hello/world")).unwrap();
//! assert_eq!(response.text(), "hello world");
//! ```

use crate::config::DispatcherConfig;
use crate::context::ApplicationContext;
use crate::dispatcher::RequestDispatcher;
use crate::http::{HttpRequest, HttpResponse, WebApplicationError};
use crate::provider::ProviderRegistry;
use crate::resource_registry::ResourceRegistry;
use crate::response::{BufferedResponse, ResponseSink, write_response};
use crate::{Error, ResourceError};
use http::header::{CONTENT_TYPE, HeaderValue};
use http::{Method, StatusCode};
use std::error::Error as StdError;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info_span, warn};

/// Header that replaces the verb of a POST request.
pub const METHOD_OVERRIDE_HEADER: &str = "X-HTTP-Method-Override";

/// Marks responses whose body was generated from an error message.
pub const BODY_PROVIDED_HEADER: &str = "JAXRS-Body-Provided";

pub struct RequestHandler {
    dispatcher: RequestDispatcher,
    providers: Arc<ProviderRegistry>,
    config: DispatcherConfig,
}

impl RequestHandler {
    pub fn new(resources: Arc<ResourceRegistry>, providers: Arc<ProviderRegistry>) -> Self {
        Self::with_config(resources, providers, DispatcherConfig::default())
    }

    pub fn with_config(
        resources: Arc<ResourceRegistry>,
        providers: Arc<ProviderRegistry>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            dispatcher: RequestDispatcher::with_config(resources, &config),
            providers,
            config,
        }
    }

    pub fn dispatcher(&self) -> &RequestDispatcher {
        &self.dispatcher
    }

    pub fn resources(&self) -> &Arc<ResourceRegistry> {
        self.dispatcher.resources()
    }

    pub fn providers(&self) -> &Arc<ProviderRegistry> {
        &self.providers
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Start removing expired root resources at the configured interval.
    pub fn spawn_expiry_cleaner(&self) -> JoinHandle<()> {
        self.resources()
            .spawn_expiry_cleaner(self.config.resource_cleaner_interval)
    }

    // ------------------------------------------------------------------------
    // Entry points
    // ------------------------------------------------------------------------

    /// Handle `request`, writing the response into `sink`.
    ///
    /// Returns [`Error::Unhandled`] when a resource error has no exception
    /// mapper; nothing has been written to `sink` in that case.
    pub fn handle(&self, request: HttpRequest, sink: &mut dyn ResponseSink) -> Result<(), Error> {
        let request = self.prepare(request);
        let span = info_span!("request", method = %request.method, path = %request.path);
        let _enter = span.enter();

        let mut ctx = ApplicationContext::new(request, Arc::clone(&self.providers));
        let response = self.process(&mut ctx)?;
        debug!(status = %response.status, "Writing response");
        write_response(ctx.request(), response, &self.providers, sink)
    }

    /// Handle `request` into an in-memory response.
    pub fn handle_buffered(&self, request: HttpRequest) -> Result<BufferedResponse, Error> {
        let mut sink = BufferedResponse::default();
        self.handle(request, &mut sink)?;
        Ok(sink)
    }

    /// Like [`handle_buffered`](Self::handle_buffered), answering failures
    /// with a plain 500.
    pub fn handle_or_500(&self, request: HttpRequest) -> BufferedResponse {
        self.handle_buffered(request).unwrap_or_else(|e| {
            error!(error = %e, "Request failed");
            internal_server_error()
        })
    }

    /// Run the pipeline on tokio's blocking pool.
    pub async fn handle_async(self: &Arc<Self>, request: HttpRequest) -> Result<BufferedResponse, Error> {
        let handler = Arc::clone(self);
        tokio::task::spawn_blocking(move || handler.handle_buffered(request))
            .await
            .map_err(|e| Error::Internal(format!("request task failed: {}", e)))?
    }

    // ------------------------------------------------------------------------
    // Pipeline
    // ------------------------------------------------------------------------

    fn prepare(&self, mut request: HttpRequest) -> HttpRequest {
        if self.config.normalize_uri {
            request.path = normalize_path(&request.path);
        }
        if self.config.method_override
            && request.method == Method::POST
            && let Some(value) = request.header(METHOD_OVERRIDE_HEADER)
        {
            match Method::from_bytes(value.trim().as_bytes()) {
                Ok(method) => {
                    debug!(method = %method, "Overriding POST");
                    request.method = method;
                }
                Err(_) => warn!(value = %value, "Ignoring invalid method override"),
            }
        }
        request
    }

    fn process(&self, ctx: &mut ApplicationContext) -> Result<HttpResponse, Error> {
        let path = ctx.path();

        let mut short_circuit = None;
        for filter in self.providers.get_request_filters(&path) {
            match filter.filter(ctx) {
                Ok(None) => {}
                Ok(Some(response)) => {
                    debug!(status = %response.status, "Request filter answered");
                    short_circuit = Some(response);
                    break;
                }
                Err(e) => {
                    short_circuit = Some(self.map_error(e)?);
                    break;
                }
            }
        }

        let mut response = match short_circuit {
            Some(response) => response,
            None => match self.dispatcher.dispatch(ctx) {
                Ok(response) => response,
                Err(e) => self.map_error(e)?,
            },
        };

        for filter in self.providers.get_response_filters(&path) {
            if let Err(e) = filter.filter(ctx, &mut response) {
                response = self.map_error(e)?;
            }
        }
        Ok(response)
    }

    /// Turn a resource error into a response, or give up with
    /// [`Error::Unhandled`].
    fn map_error(&self, err: ResourceError) -> Result<HttpResponse, Error> {
        let err = match err.downcast::<WebApplicationError>() {
            Ok(web) => {
                if let Some(response) = self.providers.map_exception(&*web) {
                    return Ok(response);
                }
                let WebApplicationError { mut response, message } = *web;
                if response.entity.is_none()
                    && let Some(message) = message
                {
                    if response.status.as_u16() >= 400 {
                        response = response.with_header(BODY_PROVIDED_HEADER, "Error-Message");
                    }
                    response = response.with_text(message);
                }
                return Ok(response);
            }
            Err(err) => err,
        };

        let mut current: Option<&(dyn StdError + 'static)> = Some(&*err);
        while let Some(e) = current {
            if let Some(response) = self.providers.map_exception(e) {
                return Ok(response);
            }
            current = e.source();
        }

        if let Some(e) = err.downcast_ref::<Error>()
            && (e.is_client_error() || matches!(e, Error::LocatorDepthExceeded(_)))
        {
            debug!(error = %e, "Answering with error status");
            return Ok(HttpResponse::new(e.status_code()).with_text(e.to_string()));
        }

        error!(error = %err, "No exception mapper for resource error");
        Err(Error::Unhandled(err))
    }
}

impl std::fmt::Debug for RequestHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandler")
            .field("resources", &self.resources().len())
            .field("providers", &self.providers)
            .field("config", &self.config)
            .finish()
    }
}

fn internal_server_error() -> BufferedResponse {
    let status = StatusCode::INTERNAL_SERVER_ERROR;
    let mut response = BufferedResponse {
        status,
        body: status.canonical_reason().unwrap_or_default().as_bytes().to_vec(),
        ..Default::default()
    };
    response
        .headers
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}

/// Collapse `.` and `..` segments and repeated slashes.
///
/// `..` never climbs above the root. A trailing slash is kept.
pub fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    let mut normalized = format!("/{}", segments.join("/"));
    let trailing = path.ends_with('/') || path.ends_with("/.") || path.ends_with("/..");
    if trailing && !segments.is_empty() {
        normalized.push('/');
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ObjectFactory;
    use crate::provider::{RequestFilter, ResponseFilter};
    use crate::resource::{Resource, ResourceBuilder};
    use std::fmt;

    #[derive(Debug)]
    struct Overdrawn;

    impl fmt::Display for Overdrawn {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("account overdrawn")
        }
    }

    impl StdError for Overdrawn {}

    #[derive(Debug)]
    struct Wrapped(Overdrawn);

    impl fmt::Display for Wrapped {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("wrapped")
        }
    }

    impl StdError for Wrapped {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(&self.0)
        }
    }

    struct Bank;

    impl Resource for Bank {
        fn path() -> Option<&'static str> {
            Some("/bank")
        }

        fn describe(r: &mut ResourceBuilder<Self>) {
            r.get(|_, _| Ok("balance"));
            r.put(|_, _| Ok(()));
            r.method(Method::DELETE, |_, _| -> Result<(), ResourceError> {
                Err(Box::new(WebApplicationError::status(StatusCode::CONFLICT).with_message("locked")))
            });
            r.post(|_, _| -> Result<(), ResourceError> { Err(Box::new(Wrapped(Overdrawn))) })
                .path("/wrapped");
            r.post(|_, _| -> Result<(), ResourceError> { Err(Box::new(Overdrawn)) })
                .path("/raw");
        }
    }

    fn handler(config: DispatcherConfig) -> RequestHandler {
        let resources = Arc::new(ResourceRegistry::new());
        resources.add_singleton(Bank).unwrap();
        RequestHandler::with_config(resources, Arc::new(ProviderRegistry::with_defaults()), config)
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/a//b/./c/../d"), "/a/b/d");
        assert_eq!(normalize_path("/../x"), "/x");
        assert_eq!(normalize_path("/a/b/"), "/a/b/");
        assert_eq!(normalize_path("/a/.."), "/");
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn test_normalization_is_opt_in() {
        let plain = handler(DispatcherConfig::new());
        assert_eq!(plain.handle_or_500(HttpRequest::get("/x/../bank")).status, StatusCode::NOT_FOUND);

        let normalizing = handler(DispatcherConfig::new().normalize_uri(true));
        let response = normalizing.handle_or_500(HttpRequest::get("/x/../bank"));
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.text(), "balance");
    }

    #[test]
    fn test_method_override() {
        let handler = handler(DispatcherConfig::new());
        let response = handler.handle_or_500(HttpRequest::post("/bank").with_header(METHOD_OVERRIDE_HEADER, "PUT"));
        assert_eq!(response.status, StatusCode::NO_CONTENT);

        let handler = handler_without_override();
        let response = handler.handle_or_500(HttpRequest::post("/bank").with_header(METHOD_OVERRIDE_HEADER, "PUT"));
        assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
    }

    fn handler_without_override() -> RequestHandler {
        handler(DispatcherConfig::new().method_override(false))
    }

    #[test]
    fn test_web_application_error_message_body() {
        let handler = handler(DispatcherConfig::new());
        let response = handler.handle_buffered(HttpRequest::delete("/bank")).unwrap();
        assert_eq!(response.status, StatusCode::CONFLICT);
        assert_eq!(response.text(), "locked");
        assert_eq!(response.header(BODY_PROVIDED_HEADER), Some("Error-Message"));
    }

    #[test]
    fn test_source_chain_is_mapped() {
        let handler = handler(DispatcherConfig::new());
        handler
            .providers()
            .add_exception_mapper_fn::<Overdrawn, _>(|e| {
                HttpResponse::new(StatusCode::PAYMENT_REQUIRED).with_text(e.to_string())
            })
            .unwrap();

        let response = handler.handle_buffered(HttpRequest::post("/bank/wrapped")).unwrap();
        assert_eq!(response.status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(response.text(), "account overdrawn");
    }

    #[test]
    fn test_unmapped_error_is_unhandled() {
        let handler = handler(DispatcherConfig::new());
        let result = handler.handle_buffered(HttpRequest::post("/bank/raw"));
        assert!(matches!(result, Err(Error::Unhandled(_))));

        let response = handler.handle_or_500(HttpRequest::post("/bank/raw"));
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_malformed_accept_is_bad_request() {
        let handler = handler(DispatcherConfig::new());
        let response = handler
            .handle_buffered(HttpRequest::get("/bank").with_header("Accept", "text/plain;q=abc"))
            .unwrap();
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
    }

    struct Gate;

    impl RequestFilter for Gate {
        fn filter(&self, ctx: &mut ApplicationContext) -> Result<Option<HttpResponse>, ResourceError> {
            if ctx.request().header("authorization").is_none() {
                return Ok(Some(HttpResponse::new(StatusCode::UNAUTHORIZED)));
            }
            Ok(None)
        }
    }

    struct Stamp;

    impl ResponseFilter for Stamp {
        fn filter(&self, _ctx: &ApplicationContext, response: &mut HttpResponse) -> Result<(), ResourceError> {
            response
                .headers
                .insert("x-served-by", HeaderValue::from_static("tessera"));
            Ok(())
        }
    }

    #[test]
    fn test_filters() {
        let handler = handler(DispatcherConfig::new());
        handler
            .providers()
            .add_request_filter(Some("/bank"), ObjectFactory::singleton(Arc::new(Gate)))
            .unwrap();
        handler
            .providers()
            .add_response_filter(None, ObjectFactory::singleton(Arc::new(Stamp)))
            .unwrap();

        let response = handler.handle_or_500(HttpRequest::get("/bank"));
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.header("x-served-by"), Some("tessera"));

        let response = handler.handle_or_500(HttpRequest::get("/bank").with_header("Authorization", "yes"));
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.header("x-served-by"), Some("tessera"));
    }

    #[tokio::test]
    async fn test_handle_async() {
        let handler = Arc::new(handler(DispatcherConfig::new()));
        let response = handler.handle_async(HttpRequest::get("/bank")).await.unwrap();
        assert_eq!(response.text(), "balance");
    }
}
