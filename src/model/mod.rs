//! Core data model: package identity, dependency trees, issues and reports.

mod issue;
mod package;
mod report;
mod tree;

pub use issue::{Issue, Remediation, Severity, TrustedContent};
pub use package::PackageRef;
pub use report::{
    AnalysisReport, DependencyReport, IssueMap, ProviderHealthCheckResult, ProviderReport,
    ProviderResponse, ProviderStatus, Recommendation, RecommendationMap, Scanned, Source,
    SourceSummary, TransitiveDependencyReport, VulnerabilityStatus,
};
pub use tree::{DependencyTree, DirectDependency};
