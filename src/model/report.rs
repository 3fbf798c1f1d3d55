//! Provider responses and the aggregated analysis report.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{Issue, PackageRef};

/// Outcome of one provider's participation in an analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub name: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub code: u16,
}

impl ProviderStatus {
    /// The status attached to every successfully normalized response.
    #[must_use]
    pub fn ok(provider: &str) -> Self {
        Self {
            name: provider.to_string(),
            ok: true,
            message: Some("OK".to_string()),
            code: 200,
        }
    }

    #[must_use]
    pub fn error(provider: &str, code: u16, message: impl Into<String>) -> Self {
        Self {
            name: provider.to_string(),
            ok: false,
            message: Some(message.into()),
            code,
        }
    }

    /// Synthetic status for a provider that requires a token none was
    /// supplied for. No request is sent in that case.
    #[must_use]
    pub fn unauthenticated(provider: &str) -> Self {
        Self::error(provider, 401, "Unauthenticated")
    }
}

/// Issues keyed by package ref string.
pub type IssueMap = IndexMap<String, Vec<Issue>>;

/// One provider's normalized answer for a set of packages.
///
/// `issues` is `None` only on failure; an empty map is a valid "nothing
/// affected" answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub issues: Option<IssueMap>,
    pub status: Option<ProviderStatus>,
}

impl ProviderResponse {
    #[must_use]
    pub fn new(issues: IssueMap, status: ProviderStatus) -> Self {
        Self {
            issues: Some(issues),
            status: Some(status),
        }
    }

    /// The response for an empty candidate set: no issues, no status.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            issues: Some(IssueMap::new()),
            status: None,
        }
    }

    #[must_use]
    pub fn failed(status: ProviderStatus) -> Self {
        Self {
            issues: None,
            status: Some(status),
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(&self.status, Some(s) if !s.ok)
    }

    /// Merge one batch result into the running aggregate.
    ///
    /// An error status sticks: once a batch has failed, later batches are
    /// ignored. Otherwise issue maps union, concatenating issue lists on
    /// key collision. A failed new batch keeps the issues gathered so far
    /// but takes over the error status.
    #[must_use]
    pub fn aggregate(old: Option<Self>, new: Self) -> Self {
        let Some(old) = old else {
            return new;
        };
        if old.is_error() {
            return old;
        }
        let mut merged = old.issues.clone().unwrap_or_default();
        match new.issues {
            Some(new_issues) => {
                for (key, issues) in new_issues {
                    merged.entry(key).or_default().extend(issues);
                }
            }
            None => {
                if new.is_error() {
                    return Self {
                        issues: Some(merged),
                        status: new.status,
                    };
                }
            }
        }
        Self {
            issues: Some(merged),
            status: old.status,
        }
    }
}

/// Advisory status of one vulnerability in a recommended package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityStatus {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
}

/// A trusted-content replacement suggested for one queried package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(rename = "ref")]
    pub package: PackageRef,
    /// Vulnerability statuses keyed by uppercased identifier.
    #[serde(default)]
    pub vulnerabilities: IndexMap<String, VulnerabilityStatus>,
}

impl Recommendation {
    /// Status entry for an issue identifier, matched case-insensitively.
    #[must_use]
    pub fn status_for(&self, id: &str) -> Option<&VulnerabilityStatus> {
        self.vulnerabilities.get(&id.to_ascii_uppercase())
    }
}

/// Recommendations keyed by the queried package ref string.
pub type RecommendationMap = IndexMap<String, Recommendation>;

/// Per-source issue counters for one provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSummary {
    pub total: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    /// Vulnerabilities on direct dependencies.
    pub direct: usize,
    /// Vulnerabilities on transitive dependencies.
    pub transitive: usize,
    /// Number of affected packages.
    pub dependencies: usize,
    /// Issues with a known fixed version.
    pub remediations: usize,
    /// Direct dependencies with a trusted-content recommendation.
    pub recommendations: usize,
}

/// Issues on one transitive dependency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitiveDependencyReport {
    #[serde(rename = "ref")]
    pub package: PackageRef,
    pub issues: Vec<Issue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highest_vulnerability: Option<Issue>,
}

/// Issues on one direct dependency and its transitive closure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyReport {
    #[serde(rename = "ref")]
    pub package: PackageRef,
    pub issues: Vec<Issue>,
    pub transitive: Vec<TransitiveDependencyReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highest_vulnerability: Option<Issue>,
    /// Trusted-content replacement for this dependency, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<PackageRef>,
}

/// Issues reported by one data source within a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub summary: SourceSummary,
    pub dependencies: Vec<DependencyReport>,
}

/// One provider's section of the analysis report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderReport {
    pub status: ProviderStatus,
    pub sources: IndexMap<String, Source>,
}

impl ProviderReport {
    /// A report that carries only a failure status.
    #[must_use]
    pub fn failed(status: ProviderStatus) -> Self {
        Self {
            status,
            sources: IndexMap::new(),
        }
    }
}

/// Package counts for the analyzed tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scanned {
    pub total: usize,
    pub direct: usize,
    pub transitive: usize,
}

/// The merged result of one analysis across all enabled providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub scanned: Scanned,
    pub providers: IndexMap<String, ProviderReport>,
    /// Union of all providers' issues, keyed by package ref string. Lists
    /// concatenate across providers; CVEs are not deduplicated.
    pub issues: IssueMap,
}

impl AnalysisReport {
    /// Per-provider statuses, in provider order.
    #[must_use]
    pub fn statuses(&self) -> Vec<&ProviderStatus> {
        self.providers.values().map(|p| &p.status).collect()
    }
}

/// Result of probing one provider's health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealthCheckResult {
    pub provider: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProviderHealthCheckResult {
    #[must_use]
    pub fn success(provider: &str, code: u16) -> Self {
        Self {
            provider: provider.to_string(),
            ok: true,
            code: Some(code),
            message: None,
        }
    }

    #[must_use]
    pub fn failure(provider: &str, code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.to_string(),
            ok: false,
            code,
            message: Some(message.into()),
        }
    }
}
