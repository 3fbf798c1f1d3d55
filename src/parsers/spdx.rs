//! SPDX JSON parser.
//!
//! The graph is reconstructed from the relationship list. Relationship
//! types are classified by direction: a FORWARD relationship means the
//! element depends on the related package, a BACKWARDS one the reverse,
//! and everything else is ignored. Packages without a purl external
//! reference cannot be analyzed and are skipped silently; every other
//! per-package failure is collected and reported as one aggregated
//! validation error.

use indexmap::{IndexMap, IndexSet};
use serde::Deserialize;

use super::SbomParser;
use crate::error::{DepscanError, Result, ValidationErrorKind};
use crate::model::{DependencyTree, DirectDependency, PackageRef};

const PURL_REFERENCE_TYPE: &str = "purl";

/// Parser for `application/vnd.spdx+json` documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpdxParser;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpdxDocument {
    #[serde(rename = "SPDXID", default)]
    spdx_id: Option<String>,
    #[serde(default)]
    document_describes: Vec<String>,
    #[serde(default)]
    packages: Vec<SpdxPackage>,
    #[serde(default)]
    relationships: Vec<SpdxRelationship>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpdxPackage {
    #[serde(rename = "SPDXID")]
    spdx_id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    external_refs: Vec<SpdxExternalRef>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpdxExternalRef {
    reference_type: String,
    #[serde(default)]
    reference_locator: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpdxRelationship {
    spdx_element_id: String,
    relationship_type: String,
    related_spdx_element: String,
}

#[derive(Debug, PartialEq, Eq)]
enum Direction {
    Forward,
    Backwards,
    Ignored,
}

fn direction(relationship_type: &str) -> Direction {
    match relationship_type {
        "DESCRIBES" | "DEPENDS_ON" | "CONTAINED_BY" | "BUILD_DEPENDENCY_OF"
        | "OPTIONAL_COMPONENT_OF" | "OPTIONAL_DEPENDENCY_OF" | "PROVIDED_DEPENDENCY_OF"
        | "TEST_DEPENDENCY_OF" | "RUNTIME_DEPENDENCY_OF" | "DEV_DEPENDENCY_OF"
        | "ANCESTOR_OF" => Direction::Forward,
        "DESCRIBED_BY" | "DEPENDENCY_OF" | "DESCENDANT_OF" | "PACKAGE_OF" | "CONTAINS" => {
            Direction::Backwards
        }
        _ => Direction::Ignored,
    }
}

impl SbomParser for SpdxParser {
    fn build_tree(&self, input: &[u8]) -> Result<DependencyTree> {
        let doc: SpdxDocument = serde_json::from_slice(input).map_err(|e| {
            DepscanError::malformed("parsing SPDX document", e.to_string())
        })?;
        let graph = SpdxGraph::build(&doc)?;
        Ok(graph.into_tree())
    }
}

/// Per-package refs and directed edges extracted from the document.
struct SpdxGraph {
    /// Element id -> package ref, for packages that carry a purl.
    refs: IndexMap<String, PackageRef>,
    /// Dependent element id -> dependency element ids.
    edges: IndexMap<String, IndexSet<String>>,
    /// Element ids the analysis starts from (the root's dependencies).
    start_from: IndexSet<String>,
}

impl SpdxGraph {
    fn build(doc: &SpdxDocument) -> Result<Self> {
        let root_id = find_root_id(doc)?;
        let doc_id = doc.spdx_id.as_deref().unwrap_or("SPDXRef-DOCUMENT");

        let mut validation_errors = IndexSet::new();
        let mut refs = IndexMap::new();
        let known: IndexSet<&str> = doc.packages.iter().map(|p| p.spdx_id.as_str()).collect();
        for package in &doc.packages {
            match package_ref(package) {
                Ok(Some(r)) => {
                    refs.insert(package.spdx_id.clone(), r);
                }
                // No purl: cannot be analyzed, skipped silently.
                Ok(None) => {}
                Err(detail) => {
                    validation_errors.insert(detail);
                }
            }
        }

        let mut edges: IndexMap<String, IndexSet<String>> = IndexMap::new();
        let mut start_from = IndexSet::new();
        for rel in &doc.relationships {
            let dir = direction(&rel.relationship_type);
            if dir == Direction::Ignored {
                continue;
            }
            // Document-level relationships only locate the root.
            if rel.spdx_element_id == doc_id || rel.related_spdx_element == doc_id {
                continue;
            }
            for id in [&rel.spdx_element_id, &rel.related_spdx_element] {
                if id != &root_id && !known.contains(id.as_str()) {
                    validation_errors
                        .insert(format!("Related element is not in this document: {id}"));
                }
            }
            if rel.spdx_element_id == root_id {
                if dir == Direction::Forward {
                    start_from.insert(rel.related_spdx_element.clone());
                }
                continue;
            }
            if rel.related_spdx_element == root_id {
                // Any relationship pointing at the root marks the element
                // as a starting package.
                start_from.insert(rel.spdx_element_id.clone());
                continue;
            }
            match dir {
                Direction::Forward => {
                    edges
                        .entry(rel.spdx_element_id.clone())
                        .or_default()
                        .insert(rel.related_spdx_element.clone());
                }
                Direction::Backwards => {
                    edges
                        .entry(rel.related_spdx_element.clone())
                        .or_default()
                        .insert(rel.spdx_element_id.clone());
                }
                Direction::Ignored => {}
            }
        }

        if !validation_errors.is_empty() {
            return Err(DepscanError::validation(
                "validating SPDX document",
                ValidationErrorKind::InvalidDocument {
                    details: validation_errors.into_iter().collect(),
                },
            ));
        }

        Ok(Self {
            refs,
            edges,
            start_from,
        })
    }

    fn into_tree(self) -> DependencyTree {
        let mut tree = DependencyTree::new();
        let mut visited = IndexSet::new();

        for id in &self.start_from {
            let Some(package) = self.refs.get(id) else {
                continue;
            };
            let mut deps = IndexSet::new();
            self.collect_transitive(id, &mut deps, &mut visited);
            visited.insert(id.clone());
            tree.insert(DirectDependency::with_transitive(
                package.clone(),
                self.resolve(&deps),
            ));
        }

        // Packages related to nothing reachable are promoted to direct
        // dependencies so they still get analyzed.
        let orphans: Vec<String> = self
            .edges
            .keys()
            .filter(|id| !visited.contains(*id))
            .cloned()
            .collect();
        for id in orphans {
            let Some(package) = self.refs.get(&id) else {
                continue;
            };
            let mut deps = IndexSet::new();
            self.collect_transitive(&id, &mut deps, &mut visited);
            tree.insert(DirectDependency::with_transitive(
                package.clone(),
                self.resolve(&deps),
            ));
        }

        tree
    }

    fn collect_transitive(
        &self,
        id: &str,
        deps: &mut IndexSet<String>,
        visited: &mut IndexSet<String>,
    ) {
        let Some(direct) = self.edges.get(id) else {
            return;
        };
        for dep in direct {
            if deps.insert(dep.clone()) {
                self.collect_transitive(dep, deps, visited);
                visited.insert(dep.clone());
            }
        }
    }

    fn resolve(&self, ids: &IndexSet<String>) -> Vec<PackageRef> {
        ids.iter()
            .filter_map(|id| self.refs.get(id))
            .cloned()
            .collect()
    }
}

/// The root is the single `documentDescribes` entry, or the target of a
/// DESCRIBES / source of a DESCRIBED_BY relationship. A document without
/// a root cannot be analyzed.
fn find_root_id(doc: &SpdxDocument) -> Result<String> {
    if doc.document_describes.len() == 1 {
        return Ok(doc.document_describes[0].clone());
    }
    for rel in &doc.relationships {
        match rel.relationship_type.as_str() {
            "DESCRIBES" => return Ok(rel.related_spdx_element.clone()),
            "DESCRIBED_BY" => return Ok(rel.spdx_element_id.clone()),
            _ => {}
        }
    }
    Err(DepscanError::validation(
        "resolving SPDX root",
        ValidationErrorKind::MissingRoot,
    ))
}

/// Extract the purl-based ref from a package.
///
/// `Ok(None)` means the package has no purl external reference and is
/// skipped; `Err` carries the validation detail for aggregation.
fn package_ref(package: &SpdxPackage) -> std::result::Result<Option<PackageRef>, String> {
    let locator = package
        .external_refs
        .iter()
        .find(|r| r.reference_type == PURL_REFERENCE_TYPE)
        .and_then(|r| r.reference_locator.as_deref());
    let Some(locator) = locator else {
        return Ok(None);
    };
    if locator.trim().is_empty() {
        return Ok(None);
    }
    PackageRef::parse(locator).map(Some).map_err(|e| {
        format!(
            "Invalid purl for package {}: {e}",
            package.name.as_deref().unwrap_or("unknown")
        )
    })
}
