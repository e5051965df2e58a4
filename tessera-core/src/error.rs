// Error types for the Tessera dispatch core

use http::StatusCode;
use thiserror::Error;

/// Error raised by resource methods, sub-resource locators and filters.
///
/// Anything implementing `std::error::Error + Send + Sync` converts into it
/// with `?`, so handlers can bubble up their own error types and let the
/// exception mappers registered with the
/// [`ProviderRegistry`](crate::ProviderRegistry) decide on the response.
pub type ResourceError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum Error {
    // Registration errors
    #[error("Invalid URI template: {0}")]
    InvalidUriTemplate(String),

    #[error("Invalid media type: {0}")]
    InvalidMediaType(String),

    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    #[error("Duplicate resource: {0}")]
    DuplicateResource(String),

    #[error("Duplicate resource method: {0}")]
    DuplicateResourceMethod(String),

    #[error("Duplicate exception mapper: {0}")]
    DuplicateExceptionMapper(String),

    #[error("Duplicate context resolver: {0}")]
    DuplicateContextResolver(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // Request errors
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Unsupported Media Type: {0}")]
    UnsupportedMediaType(String),

    #[error("Sub-resource locator chain deeper than {0} levels")]
    LocatorDepthExceeded(usize),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unhandled error: {0}")]
    Unhandled(#[source] ResourceError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl Error {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest(_) | Error::Deserialization(_) => StatusCode::BAD_REQUEST,
            Error::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Errors reported while registering resources, providers or configuration.
    ///
    /// These abort registration of the offending component and never reach
    /// request processing.
    pub fn is_registration_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidUriTemplate(_)
                | Error::InvalidMediaType(_)
                | Error::InvalidResource(_)
                | Error::DuplicateResource(_)
                | Error::DuplicateResourceMethod(_)
                | Error::DuplicateExceptionMapper(_)
                | Error::DuplicateContextResolver(_)
                | Error::Config(_)
        )
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            Error::BadRequest("q=abc".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::UnsupportedMediaType("a/b".into()).status_code(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            Error::LocatorDepthExceeded(8).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert!(Error::Deserialization("bad".into()).is_client_error());
        assert!(Error::Internal("boom".into()).is_server_error());
    }

    #[test]
    fn test_registration_errors() {
        assert!(Error::DuplicateResource("x".into()).is_registration_error());
        assert!(Error::InvalidUriTemplate("{".into()).is_registration_error());
        assert!(!Error::BadRequest("x".into()).is_registration_error());
    }

    #[test]
    fn test_unhandled_keeps_source() {
        let inner: ResourceError = "disk on fire".into();
        let err = Error::Unhandled(inner);
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("disk on fire"));
    }
}
