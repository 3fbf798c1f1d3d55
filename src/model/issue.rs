//! Vulnerability issues and severity bands.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PackageRef;

/// Severity band derived from a CVSS base score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

const LOW_MIN: f32 = 0.1;
const MEDIUM_MIN: f32 = 4.0;
const HIGH_MIN: f32 = 7.0;
const CRITICAL_MIN: f32 = 9.0;

impl Severity {
    /// Band a CVSS base score.
    #[must_use]
    pub fn from_score(score: f32) -> Self {
        if score < LOW_MIN {
            Self::None
        } else if score < MEDIUM_MIN {
            Self::Low
        } else if score < HIGH_MIN {
            Self::Medium
        } else if score < CRITICAL_MIN {
            Self::High
        } else {
            Self::Critical
        }
    }

    /// Parse an explicit severity label, case-insensitively.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_uppercase().as_str() {
            "NONE" => Some(Self::None),
            "LOW" => Some(Self::Low),
            "MEDIUM" | "MODERATE" => Some(Self::Medium),
            "HIGH" => Some(Self::High),
            "CRITICAL" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// A vetted replacement package that already addresses the issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustedContent {
    #[serde(rename = "ref")]
    pub package: PackageRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
}

/// Known fixed versions for an issue, plus an optional trusted-content
/// replacement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Remediation {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fixed_in: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trusted_content: Option<TrustedContent>,
}

/// A vulnerability affecting one package, as reported by one provider
/// source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Data source within the provider (e.g. "osv", "cve", "manual").
    pub source: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cves: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cvss_vector: Option<String>,
    pub cvss_score: f32,
    pub severity: Severity,
    #[serde(default)]
    pub remediation: Remediation,
    /// Privately reported, no public CVE assigned yet.
    #[serde(default)]
    pub unique: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

impl Issue {
    /// The vulnerability count this issue contributes to summaries: the
    /// number of public CVEs, or one for a privately reported issue.
    #[must_use]
    pub fn vulnerability_count(&self) -> usize {
        if !self.cves.is_empty() {
            self.cves.len()
        } else if self.unique {
            1
        } else {
            0
        }
    }
}
