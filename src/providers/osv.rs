//! OSV provider: request shape and response normalization.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use super::VulnerabilityProvider;
use crate::cvss;
use crate::error::Result;
use crate::model::{DependencyTree, Issue, IssueMap, Remediation, Severity};

pub(crate) const PROVIDER_NAME: &str = "osv";

/// Provider backed by an OSV-shaped purl batch endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsvProvider;

impl VulnerabilityProvider for OsvProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn analyze_path(&self) -> &'static str {
        "/purls"
    }

    fn health_path(&self) -> &'static str {
        "/q/health"
    }

    fn parse_response(&self, body: &[u8], tree: &DependencyTree) -> Result<IssueMap> {
        let response: IndexMap<String, Value> = serde_json::from_slice(body)?;
        let mut issues = IssueMap::new();
        for ref_str in tree.get_all().keys() {
            let Some(value) = response.get(ref_str) else {
                continue;
            };
            let vulnerabilities: Vec<OsvVulnerability> =
                match serde_json::from_value(value.clone()) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("Skipping unparseable entry for {ref_str}: {e}");
                        continue;
                    }
                };
            issues.insert(
                ref_str.clone(),
                vulnerabilities.iter().filter_map(to_issue).collect(),
            );
        }
        Ok(issues)
    }
}

#[derive(Deserialize)]
struct OsvVulnerability {
    id: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    #[serde(default)]
    severity: Vec<OsvSeverity>,
    #[serde(default)]
    affected: Vec<OsvAffected>,
    published: Option<DateTime<Utc>>,
    modified: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct OsvSeverity {
    #[serde(rename = "type")]
    kind: String,
    score: String,
}

#[derive(Deserialize)]
struct OsvAffected {
    #[serde(default)]
    ranges: Vec<OsvRange>,
}

#[derive(Deserialize)]
struct OsvRange {
    #[serde(default)]
    events: Vec<OsvEvent>,
}

#[derive(Deserialize)]
struct OsvEvent {
    fixed: Option<String>,
}

/// Issues must carry an id and a resolvable CVSS score; anything else is
/// dropped.
fn to_issue(vuln: &OsvVulnerability) -> Option<Issue> {
    let id = vuln.id.clone()?;
    let title = vuln
        .summary
        .clone()
        .filter(|s| !s.is_empty())
        .or_else(|| vuln.description.clone());
    let (vector, score) = best_vector(&vuln.severity)?;
    Some(Issue {
        id: id.clone(),
        title,
        source: PROVIDER_NAME.to_string(),
        cves: vec![id],
        cvss_vector: Some(vector),
        cvss_score: score,
        severity: Severity::from_score(score),
        remediation: remediation(&vuln.affected),
        unique: false,
        published: vuln.published,
        modified: vuln.modified,
    })
}

/// Prefer a v3 vector over a v2 one; a vector that fails to parse yields
/// no score.
fn best_vector(severities: &[OsvSeverity]) -> Option<(String, f32)> {
    let by_kind: IndexMap<&str, &str> = severities
        .iter()
        .map(|s| (s.kind.as_str(), s.score.as_str()))
        .collect();
    let vector = by_kind
        .get("CVSS_V3")
        .or_else(|| by_kind.get("CVSS_V2"))?;
    let score = cvss::score_vector(vector)?;
    Some((vector.to_string(), score))
}

fn remediation(affected: &[OsvAffected]) -> Remediation {
    let fixed_in = affected
        .iter()
        .flat_map(|a| &a.ranges)
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

    #[test]
    fn test_normalizes_issue() {
        let body = r#"{
          "pkg:npm/a@1.0.0": [{
            "id": "GHSA-1234",
            "summary": "Bad stuff",
            "severity": [
              {"type": "CVSS_V2", "score": "AV:N/AC:L/Au:N/C:P/I:P/A:P"},
              {"type": "CVSS_V3", "score": "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H"}
            ],
            "affected": [{"ranges": [{"events": [{"introduced": "0"}, {"fixed": "1.0.1"}]}]}]
          }]
        }"#;
        let issues = OsvProvider
            .parse_response(body.as_bytes(), &tree_with("pkg:npm/a@1.0.0"))
            .unwrap();
        let issue = &issues["pkg:npm/a@1.0.0"][0];
        assert_eq!(issue.id, "GHSA-1234");
        assert_eq!(issue.cves, vec!["GHSA-1234"]);
        assert_eq!(issue.severity, Severity::Critical);
        assert!((issue.cvss_score - 9.8).abs() < f32::EPSILON);
        assert!(issue.cvss_vector.as_deref().unwrap().starts_with("CVSS:3.1"));
        assert_eq!(issue.remediation.fixed_in, vec!["1.0.1"]);
    }

    #[test]
    fn test_title_falls_back_to_description() {
        let body = r#"{
          "pkg:npm/a@1.0.0": [{
            "id": "GHSA-1",
            "description": "long text",
            "severity": [{"type": "CVSS_V2", "score": "AV:N/AC:L/Au:N/C:P/I:P/A:P"}]
          }]
        }"#;
        let issues = OsvProvider
            .parse_response(body.as_bytes(), &tree_with("pkg:npm/a@1.0.0"))
            .unwrap();
        assert_eq!(issues["pkg:npm/a@1.0.0"][0].title.as_deref(), Some("long text"));
    }

    #[test]
    fn test_drops_issue_without_id_or_score() {
        let body = r#"{
          "pkg:npm/a@1.0.0": [
            {"summary": "no id", "severity": [{"type": "CVSS_V2", "score": "AV:N/AC:L/Au:N/C:P/I:P/A:P"}]},
            {"id": "GHSA-2", "summary": "no severity"},
            {"id": "GHSA-3", "severity": [{"type": "CVSS_V3", "score": "garbage"}]}
          ]
        }"#;
        let issues = OsvProvider
            .parse_response(body.as_bytes(), &tree_with("pkg:npm/a@1.0.0"))
            .unwrap();
        assert!(issues["pkg:npm/a@1.0.0"].is_empty());
    }

    #[test]
    fn test_ignores_refs_outside_tree() {
        let body = r#"{"pkg:npm/other@1.0.0": []}"#;
        let issues = OsvProvider
            .parse_response(body.as_bytes(), &tree_with("pkg:npm/a@1.0.0"))
            .unwrap();
        assert!(issues.is_empty());
    }
}
