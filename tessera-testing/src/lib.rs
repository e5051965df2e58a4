//! Testing utilities for Tessera applications.
//!
//! - **TestApp** - wires registries and a request handler for a test
//! - **TestClient** - in-process client with async and blocking calls
//! - **Assertions** - status, header, content type and body checks
//!
//! ## Quick Start
//!
//! ```
//! use tessera_core::{Resource, ResourceBuilder};
//! use tessera_testing::*;
//!
//! struct Hello;
//!
//! impl Resource for Hello {
//!     fn path() -> Option<&'static str> {
//!         Some("/hello")
//!     }
//!
//!     fn describe(r: &mut ResourceBuilder<Self>) {
//!         r.get(|_, _| Ok("Hello!")).produces(&["text/plain"]);
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let app = TestAppBuilder::new().resource(Hello).build();
//! let client = app.client();
//!
//! let response = client.get("/hello").await;
//! assert_status(&response, 200);
//! assert_content_type(&response, "text/plain");
//! assert_eq!(response.body_string(), Some("Hello!".to_string()));
//!
//! let response = client.put("/hello", Vec::new()).await;
//! assert_status(&response, 405);
//! assert_allow(&response, &["GET"]);
//! # });
//! ```

mod assertions;
mod test_app;
mod test_client;

pub use assertions::{
    assert_allow, assert_body_contains, assert_client_error, assert_content_type, assert_header,
    assert_json, assert_server_error, assert_status, assert_success,
};
pub use test_app::{TestApp, TestAppBuilder};
pub use test_client::{TestClient, TestRequestBuilder, TestResponse};
