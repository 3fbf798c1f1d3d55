//! Unified error types for depscan.
//!
//! SBOM validation problems are the only hard failures in the pipeline;
//! provider failures are expected to degrade into status entries on the
//! report, so their error kinds carry enough detail to build those.

use thiserror::Error;

/// Main error type for depscan operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DepscanError {
    /// Errors while validating or parsing an SBOM document
    #[error("Invalid SBOM: {context}")]
    Validation {
        context: String,
        #[source]
        source: ValidationErrorKind,
    },

    /// Errors while talking to a vulnerability provider
    #[error("Provider '{provider}' failed: {source}")]
    Provider {
        provider: String,
        #[source]
        source: ProviderErrorKind,
    },

    /// IO errors with context
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration errors
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Specific SBOM validation error kinds
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ValidationErrorKind {
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error("Unsupported spec version: {version} (supported: {supported})")]
    UnsupportedVersion { version: String, supported: String },

    #[error("Missing root. Verify the document DESCRIBES relationship matches a package")]
    MissingRoot,

    #[error("Unknown media type: {0}")]
    UnknownMediaType(String),

    #[error("Malformed purl: {purl} - {reason}")]
    InvalidPurl { purl: String, reason: String },

    /// Collected per-package failures, reported once for the whole document
    #[error("Document validation failed: {}", details.join("; "))]
    InvalidDocument { details: Vec<String> },
}

/// Specific provider error kinds
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProviderErrorKind {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP status {code}: {message}")]
    Status { code: u16, message: String },

    #[error("Unauthenticated")]
    Unauthenticated,

    #[error("Circuit breaker is open")]
    CircuitOpen,

    #[error("Invalid response payload: {0}")]
    InvalidResponse(String),
}

// ============================================================================
// Error construction helpers
// ============================================================================

impl DepscanError {
    /// Create a validation error with context
    pub fn validation(context: impl Into<String>, source: ValidationErrorKind) -> Self {
        Self::Validation {
            context: context.into(),
            source,
        }
    }

    /// Create a validation error for a malformed document
    pub fn malformed(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::validation(context, ValidationErrorKind::MalformedDocument(message.into()))
    }

    /// Create a validation error for an unknown media type
    pub fn unknown_media_type(media_type: impl Into<String>) -> Self {
        Self::validation(
            "selecting parser",
            ValidationErrorKind::UnknownMediaType(media_type.into()),
        )
    }

    /// Create a provider error
    pub fn provider(provider: impl Into<String>, source: ProviderErrorKind) -> Self {
        Self::Provider {
            provider: provider.into(),
            source,
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

// ============================================================================
// Conversions from existing error types
// ============================================================================

impl From<std::io::Error> for DepscanError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{err}"),
            source: err,
        }
    }
}

impl From<serde_json::Error> for DepscanError {
    fn from(err: serde_json::Error) -> Self {
        Self::validation(
            "JSON deserialization",
            ValidationErrorKind::MalformedDocument(err.to_string()),
        )
    }
}

/// Convenient Result type for depscan operations
pub type Result<T> = std::result::Result<T, DepscanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = DepscanError::validation(
            "parsing SPDX",
            ValidationErrorKind::InvalidDocument {
                details: vec!["missing purl".into(), "dangling ref".into()],
            },
        );
        let msg = format!("{err}");
        assert!(msg.contains("parsing SPDX"));
        let source = std::error::Error::source(&err).unwrap();
        assert!(format!("{source}").contains("missing purl; dangling ref"));
    }

    #[test]
    fn test_provider_error_display() {
        let err = DepscanError::provider("osv", ProviderErrorKind::CircuitOpen);
        assert!(format!("{err}").contains("osv"));
    }
}
