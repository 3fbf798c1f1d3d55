//! SBOM parsers and media-type dispatch.
//!
//! Both supported formats normalize into the same [`DependencyTree`]; the
//! parser is selected by the declared media type, never by sniffing.

mod cyclonedx;
mod spdx;

pub use cyclonedx::CycloneDxParser;
pub use spdx::SpdxParser;

use crate::error::{DepscanError, Result};
use crate::model::DependencyTree;

/// Media type for SPDX JSON documents.
pub const SPDX_MEDIA_TYPE: &str = "application/vnd.spdx+json";
/// Media type for CycloneDX JSON documents.
pub const CYCLONEDX_MEDIA_TYPE: &str = "application/vnd.cyclonedx+json";

/// Trait for format-specific SBOM parsers.
pub trait SbomParser: Send + Sync {
    /// Extract the dependency tree from a raw SBOM document.
    fn build_tree(&self, input: &[u8]) -> Result<DependencyTree>;
}

/// Select a parser for the given media type.
pub fn parser_for(media_type: &str) -> Result<Box<dyn SbomParser>> {
    match media_type {
        SPDX_MEDIA_TYPE => Ok(Box::new(SpdxParser)),
        CYCLONEDX_MEDIA_TYPE => Ok(Box::new(CycloneDxParser)),
        other => Err(DepscanError::unknown_media_type(other)),
    }
}

/// Parse an SBOM document of the given media type into a dependency tree.
pub fn build_tree(media_type: &str, input: &[u8]) -> Result<DependencyTree> {
    parser_for(media_type)?.build_tree(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_media_type_rejected() {
        use crate::error::{DepscanError, ValidationErrorKind};

        let err = build_tree("application/vnd.cyclonedx+xml", b"{}").unwrap_err();
        assert!(matches!(
            err,
            DepscanError::Validation {
                source: ValidationErrorKind::UnknownMediaType(_),
                ..
            }
        ));
    }

    #[test]
    fn test_known_media_types_dispatch() {
        assert!(parser_for(SPDX_MEDIA_TYPE).is_ok());
        assert!(parser_for(CYCLONEDX_MEDIA_TYPE).is_ok());
    }
}
