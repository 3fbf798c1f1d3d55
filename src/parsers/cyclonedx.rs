//! CycloneDX JSON parser.
//!
//! Unlike SPDX, a CycloneDX document without a root component is
//! tolerated: the dependency graph still identifies direct dependencies
//! by in-degree. Components never referenced by any dependency edge are
//! promoted to direct dependencies so they are not lost from analysis.

use indexmap::{IndexMap, IndexSet};
use serde::Deserialize;

use super::SbomParser;
use crate::error::{DepscanError, Result, ValidationErrorKind};
use crate::model::{DependencyTree, DirectDependency, PackageRef};

const SUPPORTED_VERSIONS: [&str; 7] = ["1.0", "1.1", "1.2", "1.3", "1.4", "1.5", "1.6"];

/// Parser for `application/vnd.cyclonedx+json` documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycloneDxParser;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CdxBom {
    #[serde(default)]
    spec_version: Option<String>,
    #[serde(default)]
    metadata: Option<CdxMetadata>,
    #[serde(default)]
    components: Vec<CdxComponent>,
    #[serde(default)]
    dependencies: Option<Vec<CdxDependency>>,
}

#[derive(Deserialize)]
struct CdxMetadata {
    #[serde(default)]
    component: Option<CdxComponent>,
}

#[derive(Deserialize)]
struct CdxComponent {
    #[serde(rename = "bom-ref", default)]
    bom_ref: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    purl: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CdxDependency {
    #[serde(rename = "ref")]
    bom_ref: String,
    #[serde(default)]
    depends_on: Vec<String>,
}

impl SbomParser for CycloneDxParser {
    fn build_tree(&self, input: &[u8]) -> Result<DependencyTree> {
        let bom: CdxBom = serde_json::from_slice(input).map_err(|e| {
            DepscanError::malformed("parsing CycloneDX document", e.to_string())
        })?;
        validate_spec_version(bom.spec_version.as_deref())?;

        let mut component_purls = IndexMap::new();
        for component in &bom.components {
            let (Some(bom_ref), Some(purl)) = (&component.bom_ref, &component.purl) else {
                continue;
            };
            component_purls.insert(bom_ref.clone(), PackageRef::parse(purl)?);
        }

        let root = root_ref(&bom, &component_purls)?;
        build_dependencies(&bom, &component_purls, root.as_ref())
    }
}

fn validate_spec_version(version: Option<&str>) -> Result<()> {
    let Some(version) = version else {
        return Err(DepscanError::malformed(
            "parsing CycloneDX document",
            "Missing CycloneDX spec version",
        ));
    };
    if SUPPORTED_VERSIONS.contains(&version) {
        Ok(())
    } else {
        Err(DepscanError::validation(
            "parsing CycloneDX document",
            ValidationErrorKind::UnsupportedVersion {
                version: version.to_string(),
                supported: SUPPORTED_VERSIONS.join(", "),
            },
        ))
    }
}

/// Resolve the root from `metadata.component`: its purl, else the purl of
/// the component its bom-ref points at, else a synthesized generic purl.
/// A rootless document is valid.
fn root_ref(
    bom: &CdxBom,
    component_purls: &IndexMap<String, PackageRef>,
) -> Result<Option<PackageRef>> {
    let Some(component) = bom.metadata.as_ref().and_then(|m| m.component.as_ref()) else {
        return Ok(None);
    };
    if let Some(purl) = &component.purl {
        return PackageRef::parse(purl).map(Some);
    }
    if let Some(found) = component
        .bom_ref
        .as_ref()
        .and_then(|r| component_purls.get(r))
    {
        return Ok(Some(found.clone()));
    }
    PackageRef::generic(
        component.name.as_deref().unwrap_or("unknown"),
        component.version.as_deref().unwrap_or("unknown"),
    )
    .map(Some)
}

fn build_dependencies(
    bom: &CdxBom,
    component_purls: &IndexMap<String, PackageRef>,
    root: Option<&PackageRef>,
) -> Result<DependencyTree> {
    let Some(declared) = bom.dependencies.as_ref().filter(|d| !d.is_empty()) else {
        // No dependency section: every component with a purl stands alone
        // as a direct dependency.
        let mut tree = DependencyTree::new();
        for package in component_purls.values() {
            tree.insert(DirectDependency::new(package.clone()));
        }
        return Ok(tree);
    };

    // Edges keyed by ref string; unknown dependency refs fall back to the
    // root when one exists.
    let mut packages: IndexMap<String, PackageRef> = IndexMap::new();
    let mut edges: IndexMap<String, IndexSet<String>> = IndexMap::new();
    for dependency in declared {
        let package = match component_purls.get(&dependency.bom_ref) {
            Some(p) => p.clone(),
            None => match root {
                Some(r) => r.clone(),
                None => continue,
            },
        };
        let key = package.ref_str().to_string();
        packages.entry(key.clone()).or_insert(package);
        let deps = edges.entry(key).or_default();
        for target in &dependency.depends_on {
            if let Some(dep) = component_purls.get(target) {
                packages
                    .entry(dep.ref_str().to_string())
                    .or_insert_with(|| dep.clone());
                deps.insert(dep.ref_str().to_string());
            }
        }
    }

    // Components never mentioned by any dependency edge still count.
    let mut referenced: IndexSet<String> = edges.keys().cloned().collect();
    for deps in edges.values() {
        referenced.extend(deps.iter().cloned());
    }
    for package in component_purls.values() {
        let key = package.ref_str().to_string();
        if !referenced.contains(&key) {
            packages.entry(key.clone()).or_insert_with(|| package.clone());
            edges.entry(key).or_default();
        }
    }

    let direct: Vec<String> = match root.map(|r| r.ref_str().to_string()) {
        Some(root_key) if edges.contains_key(&root_key) => edges[&root_key]
            .iter()
            .cloned()
            .collect(),
        _ => {
            // In-degree zero nodes are the direct dependencies.
            let mut keys: IndexSet<String> = edges.keys().cloned().collect();
            for deps in edges.values() {
                for dep in deps {
                    keys.shift_remove(dep);
                }
            }
            keys.into_iter().collect()
        }
    };

    let mut tree = DependencyTree::new();
    for key in direct {
        let Some(package) = packages.get(&key) else {
            continue;
        };
        let transitive = transitive_closure(&key, &edges, &packages);
        tree.insert(DirectDependency::with_transitive(package.clone(), transitive));
    }
    Ok(tree)
}

/// Iterative closure with a shared visited set; cycles terminate because
/// every ref is enqueued at most once.
fn transitive_closure(
    start: &str,
    edges: &IndexMap<String, IndexSet<String>>,
    packages: &IndexMap<String, PackageRef>,
) -> Vec<PackageRef> {
    let mut acc: IndexSet<String> = IndexSet::new();
    let mut queue: Vec<String> = vec![start.to_string()];
    while let Some(current) = queue.pop() {
        if let Some(deps) = edges.get(&current) {
            for dep in deps {
                if acc.insert(dep.clone()) {
                    queue.push(dep.clone());
                }
            }
        }
    }
    acc.iter().filter_map(|k| packages.get(k)).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DepscanError;

    fn parse(json: &str) -> Result<DependencyTree> {
        CycloneDxParser.build_tree(json.as_bytes())
    }

    fn component(bom_ref: &str, purl: &str) -> String {
        format!(r#"{{"bom-ref":"{bom_ref}","name":"{bom_ref}","purl":"{purl}"}}"#)
    }

    #[test]
    fn test_simple_tree_with_root() {
        let doc = format!(
            r#"{{
              "specVersion": "1.4",
              "metadata": {{"component": {{"bom-ref": "root", "purl": "pkg:maven/com.acme/app@1.0.0"}}}},
              "components": [{}, {}],
              "dependencies": [
                {{"ref": "root", "dependsOn": ["a"]}},
                {{"ref": "a", "dependsOn": ["b"]}}
              ]
            }}"#,
            component("a", "pkg:maven/com.acme/a@1.0.0"),
            component("b", "pkg:maven/com.acme/b@1.0.0"),
        );
        let tree = parse(&doc).unwrap();
        assert_eq!(tree.direct_count(), 1);
        let direct = &tree.dependencies["pkg:maven/com.acme/a@1.0.0"];
        assert_eq!(direct.transitive.len(), 1);
    }

    #[test]
    fn test_missing_spec_version_is_malformed() {
        assert!(parse(r#"{"components": []}"#).is_err());
    }

    #[test]
    fn test_unsupported_spec_version() {
        let err = parse(r#"{"specVersion": "2.0", "components": []}"#).unwrap_err();
        assert!(matches!(
            err,
            DepscanError::Validation {
                source: ValidationErrorKind::UnsupportedVersion { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_rootless_document_tolerated() {
        let doc = format!(
            r#"{{
              "specVersion": "1.5",
              "components": [{}, {}],
              "dependencies": [{{"ref": "a", "dependsOn": ["b"]}}]
            }}"#,
            component("a", "pkg:npm/a@1.0.0"),
            component("b", "pkg:npm/b@1.0.0"),
        );
        let tree = parse(&doc).unwrap();
        assert_eq!(tree.direct_count(), 1);
        assert!(tree.is_direct("pkg:npm/a@1.0.0"));
    }

    #[test]
    fn test_empty_document_yields_empty_tree() {
        let tree = parse(r#"{"specVersion": "1.4"}"#).unwrap();
        assert!(tree.is_empty());
    }

    #[test]
    fn test_no_dependency_section_promotes_components() {
        let doc = format!(
            r#"{{"specVersion": "1.4", "components": [{}, {}]}}"#,
            component("a", "pkg:npm/a@1.0.0"),
            component("b", "pkg:npm/b@1.0.0"),
        );
        let tree = parse(&doc).unwrap();
        assert_eq!(tree.direct_count(), 2);
        assert!(tree.dependencies["pkg:npm/a@1.0.0"].transitive.is_empty());
    }

    #[test]
    fn test_unreferenced_component_promoted() {
        let doc = format!(
            r#"{{
              "specVersion": "1.4",
              "metadata": {{"component": {{"purl": "pkg:npm/app@1.0.0"}}}},
              "components": [{}, {}, {}],
              "dependencies": [
                {{"ref": "root", "dependsOn": ["a"]}},
                {{"ref": "a", "dependsOn": ["b"]}}
              ]
            }}"#,
            component("a", "pkg:npm/a@1.0.0"),
            component("b", "pkg:npm/b@1.0.0"),
            component("c", "pkg:npm/c@1.0.0"),
        );
        let tree = parse(&doc).unwrap();
        assert!(tree.is_direct("pkg:npm/c@1.0.0"));
    }

    #[test]
    fn test_root_synthesized_from_name_version() {
        let doc = format!(
            r#"{{
              "specVersion": "1.4",
              "metadata": {{"component": {{"name": "my-app", "version": "2.0.0"}}}},
              "components": [{}],
              "dependencies": [{{"ref": "my-app", "dependsOn": ["a"]}}]
            }}"#,
            component("a", "pkg:npm/a@1.0.0"),
        );
        let tree = parse(&doc).unwrap();
        // The unknown "my-app" ref resolves to the synthesized root, whose
        // children become the direct dependencies.
        assert_eq!(tree.direct_count(), 1);
        assert!(tree.is_direct("pkg:npm/a@1.0.0"));
    }

    #[test]
    fn test_cycle_terminates() {
        let doc = format!(
            r#"{{
              "specVersion": "1.4",
              "components": [{}, {}],
              "dependencies": [
                {{"ref": "a", "dependsOn": ["b"]}},
                {{"ref": "b", "dependsOn": ["a"]}}
              ]
            }}"#,
            component("a", "pkg:npm/a@1.0.0"),
            component("b", "pkg:npm/b@1.0.0"),
        );
        let tree = parse(&doc).unwrap();
        // Both nodes sit in a cycle so neither has in-degree zero; the
        // closure still terminates and the tree stays finite.
        assert!(tree.direct_count() <= 2);
    }
}
