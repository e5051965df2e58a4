// Test application builder

use crate::TestClient;
use std::sync::Arc;
use tessera_core::{
    DispatcherConfig, Error, MessageBodyReader, MessageBodyWriter, ProviderRegistry,
    RequestHandler, Resource, ResourceRegistry,
};

/// A fully wired request handler for tests.
pub struct TestApp {
    handler: Arc<RequestHandler>,
}

impl TestApp {
    pub fn new(handler: RequestHandler) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }

    pub fn handler(&self) -> &Arc<RequestHandler> {
        &self.handler
    }

    pub fn resources(&self) -> &Arc<ResourceRegistry> {
        self.handler.resources()
    }

    pub fn providers(&self) -> &Arc<ProviderRegistry> {
        self.handler.providers()
    }

    /// Create a test client for making requests
    pub fn client(&self) -> TestClient {
        TestClient::new(Arc::clone(&self.handler))
    }
}

/// Builder for test applications.
///
/// Registration errors are collected and reported by [`build`](Self::build)
/// so a misdeclared resource fails the test at a single point.
pub struct TestAppBuilder {
    resources: Arc<ResourceRegistry>,
    providers: Arc<ProviderRegistry>,
    config: DispatcherConfig,
    errors: Vec<Error>,
}

impl TestAppBuilder {
    /// Builder with the built-in providers installed.
    pub fn new() -> Self {
        Self {
            resources: Arc::new(ResourceRegistry::new()),
            providers: Arc::new(ProviderRegistry::with_defaults()),
            config: DispatcherConfig::default(),
            errors: Vec::new(),
        }
    }

    /// Register a singleton root resource.
    pub fn resource<R: Resource>(mut self, instance: R) -> Self {
        if let Err(e) = self.resources.add_singleton(instance) {
            self.errors.push(e);
        }
        self
    }

    /// Register a root resource created for every request.
    pub fn per_request<R, F>(mut self, factory: F) -> Self
    where
        R: Resource,
        F: Fn() -> R + Send + Sync + 'static,
    {
        if let Err(e) = self.resources.add_per_request(factory) {
            self.errors.push(e);
        }
        self
    }

    pub fn reader<R: MessageBodyReader + 'static>(mut self, reader: R, consumes: &[&str]) -> Self {
        if let Err(e) = self.providers.add_reader(reader, consumes) {
            self.errors.push(e);
        }
        self
    }

    pub fn writer<W: MessageBodyWriter + 'static>(mut self, writer: W, produces: &[&str]) -> Self {
        if let Err(e) = self.providers.add_writer(writer, produces) {
            self.errors.push(e);
        }
        self
    }

    /// Use a custom provider registry; providers added before are dropped.
    pub fn with_providers(self, providers: Arc<ProviderRegistry>) -> Self {
        Self { providers, ..self }
    }

    pub fn with_config(self, config: DispatcherConfig) -> Self {
        Self { config, ..self }
    }

    /// Build the test application, or report the first registration error.
    pub fn try_build(mut self) -> Result<TestApp, Error> {
        if !self.errors.is_empty() {
            return Err(self.errors.remove(0));
        }
        self.config.validate()?;
        Ok(TestApp::new(RequestHandler::with_config(
            self.resources,
            self.providers,
            self.config,
        )))
    }

    /// Build the test application.
    ///
    /// # Panics
    ///
    /// Panics when a registration failed or the configuration is invalid.
    pub fn build(self) -> TestApp {
        match self.try_build() {
            Ok(app) => app,
            Err(e) => panic!("Invalid test application: {}", e),
        }
    }
}

impl Default for TestAppBuilder {
    fn default() -> Self {
        Self::new()
    }
}
