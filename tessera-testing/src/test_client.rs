// Test HTTP client

use http::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tessera_core::{BufferedResponse, Error, HttpRequest, RequestHandler};

/// Test client running requests through a [`RequestHandler`] in process.
#[derive(Clone)]
pub struct TestClient {
    handler: Arc<RequestHandler>,
}

impl TestClient {
    pub fn new(handler: Arc<RequestHandler>) -> Self {
        Self { handler }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.send(TestRequestBuilder::new(Method::GET, path)).await
    }

    pub async fn head(&self, path: &str) -> TestResponse {
        self.send(TestRequestBuilder::new(Method::HEAD, path)).await
    }

    pub async fn options(&self, path: &str) -> TestResponse {
        self.send(TestRequestBuilder::new(Method::OPTIONS, path)).await
    }

    pub async fn post(&self, path: &str, body: Vec<u8>) -> TestResponse {
        self.send(TestRequestBuilder::new(Method::POST, path).body(body))
            .await
    }

    pub async fn put(&self, path: &str, body: Vec<u8>) -> TestResponse {
        self.send(TestRequestBuilder::new(Method::PUT, path).body(body))
            .await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        self.send(TestRequestBuilder::new(Method::DELETE, path)).await
    }

    /// Send a request built with [`TestRequestBuilder`].
    pub async fn send(&self, request: TestRequestBuilder) -> TestResponse {
        self.execute(request.build()).await
    }

    pub async fn execute(&self, request: HttpRequest) -> TestResponse {
        match self.handler.handle_async(request).await {
            Ok(response) => TestResponse::Success(response),
            Err(error) => TestResponse::Error(error),
        }
    }

    /// Handle `request` on the calling thread.
    pub fn execute_blocking(&self, request: HttpRequest) -> TestResponse {
        match self.handler.handle_buffered(request) {
            Ok(response) => TestResponse::Success(response),
            Err(error) => TestResponse::Error(error),
        }
    }
}

/// Builder for test requests
pub struct TestRequestBuilder {
    method: Method,
    path: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    query_params: Vec<(String, String)>,
}

impl TestRequestBuilder {
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            headers: Vec::new(),
            body: Vec::new(),
            query_params: Vec::new(),
        }
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    pub fn accept(self, media_types: &str) -> Self {
        self.header("Accept", media_types)
    }

    pub fn content_type(self, media_type: &str) -> Self {
        self.header("Content-Type", media_type)
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Set a JSON body along with its `Content-Type`.
    pub fn json<T: Serialize>(mut self, data: &T) -> Result<Self, Error> {
        self.body = serde_json::to_vec(data).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(self.content_type("application/json"))
    }

    /// Add a query parameter; the value is percent-encoded.
    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query_params.push((key.to_string(), value.to_string()));
        self
    }

    pub fn build(self) -> HttpRequest {
        let uri = if self.query_params.is_empty() {
            self.path
        } else {
            let params: Vec<String> = self
                .query_params
                .iter()
                .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                .collect();
            format!("{}?{}", self.path, params.join("&"))
        };

        let mut request = HttpRequest::new(self.method, &uri).with_body(self.body);
        for (key, value) in &self.headers {
            request = request.with_header(key, value);
        }
        request
    }
}

/// Response from a test request
#[derive(Debug)]
pub enum TestResponse {
    Success(BufferedResponse),
    Error(Error),
}

impl TestResponse {
    /// Assert the request produced a response
    pub fn assert_success(&self) -> &BufferedResponse {
        match self {
            TestResponse::Success(response) => response,
            TestResponse::Error(error) => {
                panic!("Expected response, got error: {:?}", error)
            }
        }
    }

    /// Assert the request failed without a response
    pub fn assert_error(&self) -> &Error {
        match self {
            TestResponse::Error(error) => error,
            TestResponse::Success(response) => {
                panic!("Expected error, got response with status {}", response.status)
            }
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            TestResponse::Success(response) => Some(response.status.as_u16()),
            TestResponse::Error(_) => None,
        }
    }

    pub fn body(&self) -> Option<&[u8]> {
        match self {
            TestResponse::Success(response) => Some(&response.body),
            TestResponse::Error(_) => None,
        }
    }

    pub fn body_string(&self) -> Option<String> {
        self.body()
            .and_then(|body| String::from_utf8(body.to_vec()).ok())
    }

    pub fn body_json<T: DeserializeOwned>(&self) -> Result<T, String> {
        match self {
            TestResponse::Success(response) => serde_json::from_slice(&response.body)
                .map_err(|e| format!("Deserialization error: {}", e)),
            TestResponse::Error(error) => Err(format!("{:?}", error)),
        }
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        match self {
            TestResponse::Success(response) => response.header(key),
            TestResponse::Error(_) => None,
        }
    }
}
