//! Trustify provider: request shape and response normalization.
//!
//! One vulnerability can affect a package through several advisory
//! sources; issues are deduplicated per `source:id` pair. Withdrawn
//! vulnerabilities and withdrawn affected entries are skipped.

use indexmap::map::Entry;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use super::VulnerabilityProvider;
use crate::error::Result;
use crate::model::{
    DependencyTree, Issue, IssueMap, PackageRef, Recommendation, RecommendationMap, Remediation,
    Severity, VulnerabilityStatus,
};

pub(crate) const PROVIDER_NAME: &str = "trustify";

const DEFAULT_SOURCE: &str = "manual";

const RECOMMEND_PATH: &str = "/api/v2/purl/recommend";

/// Score type preference, best first: v4, v3.1, v3.0, v2.
const SCORE_TYPE_ORDER: [&str; 4] = ["4", "3.1", "3.0", "2"];

/// Statuses meaning the vulnerability is already dealt with in the
/// recommended package.
const FIXED_STATUSES: [&str; 2] = ["NotAffected", "Fixed"];

/// Provider backed by a Trustify vulnerability analysis endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustifyProvider;

impl VulnerabilityProvider for TrustifyProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn requires_token(&self) -> bool {
        true
    }

    fn analyze_path(&self) -> &'static str {
        "/api/v2/vulnerability/analyze"
    }

    fn health_path(&self) -> &'static str {
        "/.well-known/trustify"
    }

    fn parse_response(&self, body: &[u8], tree: &DependencyTree) -> Result<IssueMap> {
        let response: IndexMap<String, Value> = serde_json::from_slice(body)?;
        let mut issues = IssueMap::new();
        for ref_str in tree.get_all().keys() {
            let Some(value) = response.get(ref_str) else {
                continue;
            };
            match details(value) {
                Ok(vulnerabilities) => {
                    issues.insert(
                        ref_str.clone(),
                        vulnerabilities.iter().flat_map(to_issues).collect(),
                    );
                }
                Err(e) => warn!("Skipping unparseable entry for {ref_str}: {e}"),
            }
        }
        Ok(issues)
    }

    fn recommend_path(&self) -> Option<&'static str> {
        Some(RECOMMEND_PATH)
    }

    fn parse_recommendations(&self, body: &[u8], batch: &[String]) -> Result<RecommendationMap> {
        let response: RecommendationsResponse = serde_json::from_slice(body)?;
        let mut recommendations = RecommendationMap::new();
        for (queried, entries) in response.recommendations {
            if !batch.contains(&queried) {
                continue;
            }
            if let Some(recommendation) = to_recommendation(&queried, &entries) {
                recommendations.insert(queried, recommendation);
            }
        }
        Ok(recommendations)
    }
}

#[derive(Deserialize)]
struct RecommendationsResponse {
    #[serde(default)]
    recommendations: IndexMap<String, Vec<TrustifyRecommendation>>,
}

#[derive(Deserialize)]
struct TrustifyRecommendation {
    package: String,
    #[serde(default)]
    vulnerabilities: Vec<TrustifyVulnerabilityStatus>,
}

#[derive(Deserialize)]
struct TrustifyVulnerabilityStatus {
    id: String,
    status: Option<String>,
    justification: Option<String>,
}

/// The first entry names the recommended package; vulnerability statuses
/// merge across all entries, keyed by uppercased identifier. A
/// recommendation pointing back at the queried coordinates is dropped.
fn to_recommendation(queried: &str, entries: &[TrustifyRecommendation]) -> Option<Recommendation> {
    let first = entries.first()?;
    let package = match PackageRef::parse(&first.package) {
        Ok(package) => package,
        Err(e) => {
            warn!("Skipping unparseable recommendation for {queried}: {e}");
            return None;
        }
    };
    if PackageRef::parse(queried).is_ok_and(|q| q.id() == package.id()) {
        return None;
    }
    let mut vulnerabilities: IndexMap<String, VulnerabilityStatus> = IndexMap::new();
    for entry in entries {
        for vuln in &entry.vulnerabilities {
            let status = VulnerabilityStatus {
                id: vuln.id.clone(),
                status: vuln.status.clone(),
                justification: vuln.justification.clone(),
            };
            match vulnerabilities.entry(vuln.id.to_ascii_uppercase()) {
                Entry::Occupied(mut current) => {
                    if !outstanding(current.get()) {
                        current.insert(status);
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(status);
                }
            }
        }
    }
    Some(Recommendation {
        package,
        vulnerabilities,
    })
}

/// An entry whose status is outside the fixed set still needs attention
/// and wins over later duplicates.
fn outstanding(status: &VulnerabilityStatus) -> bool {
    status
        .status
        .as_deref()
        .is_some_and(|s| !FIXED_STATUSES.contains(&s))
}

/// The per-ref value is either `{"details": [...]}` or a bare array.
fn details(value: &Value) -> serde_json::Result<Vec<TrustifyVulnerability>> {
    let array = value.get("details").unwrap_or(value);
    serde_json::from_value(array.clone())
}

#[derive(Deserialize)]
struct TrustifyVulnerability {
    identifier: Option<String>,
    title: Option<String>,
    description: Option<String>,
    withdrawn: Option<Value>,
    status: Option<TrustifyStatus>,
}

#[derive(Deserialize)]
struct TrustifyStatus {
    #[serde(default)]
    affected: Vec<TrustifyAffected>,
}

#[derive(Deserialize)]
struct TrustifyAffected {
    withdrawn: Option<Value>,
    labels: Option<TrustifyLabels>,
    #[serde(default)]
    scores: Vec<Value>,
    #[serde(default)]
    ranges: Vec<TrustifyRange>,
}

#[derive(Deserialize)]
struct TrustifyLabels {
    importer: Option<String>,
}

#[derive(Deserialize)]
struct TrustifyScore {
    #[serde(rename = "type")]
    kind: String,
    severity: Option<String>,
    value: f64,
}

#[derive(Deserialize)]
struct TrustifyRange {
    #[serde(default)]
    events: Vec<TrustifyEvent>,
}

#[derive(Deserialize)]
struct TrustifyEvent {
    fixed: Option<String>,
}

fn to_issues(vuln: &TrustifyVulnerability) -> Vec<Issue> {
    if !matches!(vuln.withdrawn, None | Some(Value::Null)) {
        return Vec::new();
    }
    let Some(id) = vuln.identifier.clone() else {
        return Vec::new();
    };
    let Some(status) = &vuln.status else {
        return Vec::new();
    };
    let title = vuln.title.clone().or_else(|| vuln.description.clone());
    // Identifiers without a CVE shape are privately reported.
    let is_cve = id.to_ascii_uppercase().starts_with("CVE-");

    // One issue per advisory source, first entry per source wins.
    let mut by_source: IndexMap<String, Issue> = IndexMap::new();
    for affected in &status.affected {
        if !matches!(affected.withdrawn, None | Some(Value::Null)) {
            continue;
        }
        let source = affected
            .labels
            .as_ref()
            .and_then(|l| l.importer.as_deref())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_SOURCE)
            .to_string();
        if by_source.contains_key(&source) {
            continue;
        }
        let Some((score, severity)) = best_score(&id, &affected.scores) else {
            continue;
        };
        by_source.insert(
            source.clone(),
            Issue {
                id: id.clone(),
                title: title.clone(),
                source,
                cves: if is_cve { vec![id.clone()] } else { Vec::new() },
                cvss_vector: None,
                cvss_score: score,
                severity,
                remediation: remediation(&affected.ranges),
                unique: !is_cve,
                published: None,
                modified: None,
            },
        );
    }
    by_source.into_values().collect()
}

/// Pick the best-typed score. An explicit severity label is trusted over
/// the score-derived band; entries that fail to parse are logged and
/// skipped.
fn best_score(id: &str, scores: &[Value]) -> Option<(f32, Severity)> {
    let mut parsed: Vec<(usize, TrustifyScore)> = Vec::new();
    for value in scores {
        match serde_json::from_value::<TrustifyScore>(value.clone()) {
            Ok(score) => {
                match SCORE_TYPE_ORDER.iter().position(|t| *t == score.kind) {
                    Some(rank) => parsed.push((rank, score)),
                    None => info!("Unable to parse advisory score for {id}: unknown type"),
                }
            }
            Err(e) => info!("Unable to parse advisory score for {id}: {e}"),
        }
    }
    parsed.sort_by_key(|(rank, _)| *rank);
    let (_, best) = parsed.into_iter().next()?;
    let score = best.value as f32;
    let severity = best
        .severity
        .as_deref()
        .and_then(Severity::from_label)
        .unwrap_or_else(|| Severity::from_score(score));
    Some((score, severity))
}

fn remediation(ranges: &[TrustifyRange]) -> Remediation {
    let fixed_in = ranges
        .iter()
        .flat_map(|r| &r.events)
        .filter_map(|e| e.fixed.clone())
        .collect();
    Remediation {
        fixed_in,
        trusted_content: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DependencyTree, DirectDependency, PackageRef};

    fn tree_with(purl: &str) -> DependencyTree {
        let mut tree = DependencyTree::new();
        tree.insert(DirectDependency::new(PackageRef::parse(purl).unwrap()));
        tree
    }

    fn parse(body: &str) -> IssueMap {
        TrustifyProvider
            .parse_response(body.as_bytes(), &tree_with("pkg:npm/a@1.0.0"))
            .unwrap()
    }

    #[test]
    fn test_normalizes_issue() {
        let issues = parse(
            r#"{
              "pkg:npm/a@1.0.0": {"details": [{
                "identifier": "CVE-2024-1234",
                "title": "Overflow",
                "status": {"affected": [{
                  "labels": {"importer": "osv"},
                  "scores": [
                    {"type": "2", "value": 6.4},
                    {"type": "3.1", "value": 9.1}
                  ],
                  "ranges": [{"events": [{"fixed": "2.0.0"}]}]
                }]}
              }]}
            }"#,
        );
        let issue = &issues["pkg:npm/a@1.0.0"][0];
        assert_eq!(issue.id, "CVE-2024-1234");
        assert_eq!(issue.source, "osv");
        assert!((issue.cvss_score - 9.1).abs() < f32::EPSILON);
        assert_eq!(issue.severity, Severity::Critical);
        assert_eq!(issue.remediation.fixed_in, vec!["2.0.0"]);
    }

    #[test]
    fn test_explicit_severity_label_wins() {
        let issues = parse(
            r#"{
              "pkg:npm/a@1.0.0": {"details": [{
                "identifier": "CVE-1",
                "status": {"affected": [{
                  "scores": [{"type": "3.1", "value": 9.8, "severity": "medium"}]
                }]}
              }]}
            }"#,
        );
        assert_eq!(issues["pkg:npm/a@1.0.0"][0].severity, Severity::Medium);
    }

    #[test]
    fn test_skips_withdrawn() {
        let issues = parse(
            r#"{
              "pkg:npm/a@1.0.0": {"details": [{
                "identifier": "CVE-1",
                "withdrawn": "2024-01-01T00:00:00Z",
                "status": {"affected": [{"scores": [{"type": "2", "value": 5.0}]}]}
              }]}
            }"#,
        );
        assert!(issues["pkg:npm/a@1.0.0"].is_empty());
    }

    #[test]
    fn test_default_source_and_dedupe() {
        let issues = parse(
            r#"{
              "pkg:npm/a@1.0.0": {"details": [{
                "identifier": "CVE-1",
                "status": {"affected": [
                  {"scores": [{"type": "2", "value": 5.0}]},
                  {"scores": [{"type": "3.1", "value": 9.8}]}
                ]}
              }]}
            }"#,
        );
        let list = &issues["pkg:npm/a@1.0.0"];
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].source, "manual");
        assert!((list[0].cvss_score - 5.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_bare_array_accepted() {
        let issues = parse(
            r#"{
              "pkg:npm/a@1.0.0": [{
                "identifier": "CVE-1",
                "status": {"affected": [{"scores": [{"type": "2", "value": 5.0}]}]}
              }]
            }"#,
        );
        assert_eq!(issues["pkg:npm/a@1.0.0"].len(), 1);
    }

    #[test]
    fn test_non_cve_identifier_is_unique() {
        let issues = parse(
            r#"{
              "pkg:npm/a@1.0.0": {"details": [{
                "identifier": "GHSA-aaaa-bbbb-cccc",
                "status": {"affected": [{"scores": [{"type": "3.1", "value": 7.5}]}]}
              }]}
            }"#,
        );
        let issue = &issues["pkg:npm/a@1.0.0"][0];
        assert!(issue.unique);
        assert!(issue.cves.is_empty());
        assert_eq!(issue.vulnerability_count(), 1);
    }

    #[test]
    fn test_cve_identifier_is_not_unique() {
        let issues = parse(
            r#"{
              "pkg:npm/a@1.0.0": {"details": [{
                "identifier": "CVE-2024-1234",
                "status": {"affected": [{"scores": [{"type": "3.1", "value": 7.5}]}]}
              }]}
            }"#,
        );
        let issue = &issues["pkg:npm/a@1.0.0"][0];
        assert!(!issue.unique);
        assert_eq!(issue.cves, vec!["CVE-2024-1234"]);
    }

    fn recommend(body: &str, batch: &[&str]) -> RecommendationMap {
        let batch: Vec<String> = batch.iter().map(|s| (*s).to_string()).collect();
        TrustifyProvider
            .parse_recommendations(body.as_bytes(), &batch)
            .unwrap()
    }

    #[test]
    fn test_recommendation_parsed() {
        let recommendations = recommend(
            r#"{
              "recommendations": {
                "pkg:maven/io.quarkus/quarkus-core@2.13.5": [{
                  "package": "pkg:maven/io.quarkus/quarkus-core@2.13.9?repository_url=https%3A%2F%2Fmaven.repository.redhat.com%2Fga%2F",
                  "vulnerabilities": [{
                    "id": "cve-2024-1234",
                    "status": "NotAffected",
                    "justification": "vulnerable_code_not_present"
                  }]
                }]
              }
            }"#,
            &["pkg:maven/io.quarkus/quarkus-core@2.13.5"],
        );
        let recommendation = &recommendations["pkg:maven/io.quarkus/quarkus-core@2.13.5"];
        assert_eq!(recommendation.package.version(), "2.13.9");
        let status = recommendation.status_for("CVE-2024-1234").unwrap();
        assert_eq!(status.status.as_deref(), Some("NotAffected"));
    }

    #[test]
    fn test_self_recommendation_dropped() {
        let recommendations = recommend(
            r#"{
              "recommendations": {
                "pkg:maven/io.quarkus/quarkus-core@2.13.5": [{
                  "package": "pkg:maven/io.quarkus/quarkus-core@2.13.5?type=jar",
                  "vulnerabilities": []
                }]
              }
            }"#,
            &["pkg:maven/io.quarkus/quarkus-core@2.13.5"],
        );
        assert!(recommendations.is_empty());
    }

    #[test]
    fn test_recommendation_status_merge_prefers_outstanding() {
        let recommendations = recommend(
            r#"{
              "recommendations": {
                "pkg:npm/a@1.0.0": [
                  {
                    "package": "pkg:npm/a@2.0.0",
                    "vulnerabilities": [{"id": "CVE-1", "status": "Fixed"}]
                  },
                  {
                    "package": "pkg:npm/a@3.0.0",
                    "vulnerabilities": [{"id": "cve-1", "status": "Affected"}]
                  }
                ]
              }
            }"#,
            &["pkg:npm/a@1.0.0"],
        );
        let recommendation = &recommendations["pkg:npm/a@1.0.0"];
        // First entry names the package, statuses merge across entries.
        assert_eq!(recommendation.package.version(), "2.0.0");
        let status = recommendation.status_for("CVE-1").unwrap();
        assert_eq!(status.status.as_deref(), Some("Affected"));
    }

    #[test]
    fn test_recommendation_outside_batch_ignored() {
        let recommendations = recommend(
            r#"{
              "recommendations": {
                "pkg:npm/b@1.0.0": [{"package": "pkg:npm/b@2.0.0", "vulnerabilities": []}]
              }
            }"#,
            &["pkg:npm/a@1.0.0"],
        );
        assert!(recommendations.is_empty());
    }

    #[test]
    fn test_unknown_score_type_skipped() {
        let issues = parse(
            r#"{
              "pkg:npm/a@1.0.0": {"details": [{
                "identifier": "CVE-1",
                "status": {"affected": [{"scores": [{"type": "5", "value": 5.0}]}]}
              }]}
            }"#,
        );
        assert!(issues["pkg:npm/a@1.0.0"].is_empty());
    }
}
