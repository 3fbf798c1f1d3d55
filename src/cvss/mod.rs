//! CVSS base-vector parsing and scoring.
//!
//! Providers report severity either as a vector string or as a
//! precomputed score. This module turns vector strings into base scores;
//! severity banding lives on [`crate::model::Severity`].

mod v2;
mod v3;

pub use v2::CvssV2;
pub use v3::CvssV3;

use std::str::FromStr;

/// Errors from CVSS vector parsing.
#[derive(Debug, Copy, Clone, thiserror::Error)]
pub enum CvssError {
    #[error("invalid CVSS vector")]
    Invalid,
    #[error("unsupported CVSS version")]
    Version,
    #[error("invalid metric: {0}")]
    Metric(&'static str),
}

/// Compute the base score of a CVSS vector string, any supported version.
///
/// Returns `None` for vectors that cannot be parsed; callers treat those
/// issues as score-less and drop them.
#[must_use]
pub fn score_vector(vector: &str) -> Option<f32> {
    if vector.starts_with("CVSS:3") {
        CvssV3::from_str(vector).ok().map(|v| v.score() as f32)
    } else {
        CvssV2::from_str(vector).ok().map(|v| v.score() as f32)
    }
}
