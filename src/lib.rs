// Tessera - a JAX-RS style request dispatch core for Rust
//
// Resources declare their URI templates, methods and sub-resource locators;
// the dispatcher matches requests against them, negotiates media types and
// hands entities to pluggable readers and writers.

// Re-export core functionality
pub use tessera_core::*;

#[cfg(feature = "testing")]
pub use tessera_testing;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        ApplicationContext,
        AsyncJob,
        DispatcherConfig,
        Entity,
        EntityType,
        Error,
        HttpRequest,
        HttpResponse,
        Located,
        MediaType,
        MessageBodyReader,
        MessageBodyWriter,
        ProviderRegistry,
        RequestHandler,
        Resource,
        ResourceBuilder,
        ResourceError,
        ResourceRegistry,
        Variant,
        WebApplicationError,
        select_variant,
    };
}
