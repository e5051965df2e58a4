// Core library for the Tessera dispatch framework
// URI templates, resource and provider registries, content negotiation and
// the request pipeline built on them

pub mod builtin;
pub mod component;
pub mod config;
pub mod content_negotiation;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod http;
pub mod logging;
pub mod media_type;
pub mod provider;
pub mod resource;
pub mod resource_registry;
pub mod response;
mod snapshot;
pub mod uri_pattern;
pub mod variant;

// Re-export commonly used types
pub use component::*;
pub use config::DispatcherConfig;
pub use content_negotiation::{AcceptLanguage, AcceptMediaType, AcceptToken, LanguageTag};
pub use context::*;
pub use dispatcher::*;
pub use error::*;
pub use handler::*;
pub use crate::http::*;
pub use media_type::*;
pub use provider::*;
pub use resource::*;
pub use resource_registry::*;
pub use response::*;
pub use uri_pattern::*;
pub use variant::*;
