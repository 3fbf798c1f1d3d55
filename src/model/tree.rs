//! Canonical dependency tree extracted from an SBOM.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::PackageRef;

/// A direct dependency of the analyzed component together with its
/// transitive closure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectDependency {
    pub package: PackageRef,
    /// Transitive closure, deduplicated by ref string, in discovery order.
    pub transitive: Vec<PackageRef>,
}

impl DirectDependency {
    #[must_use]
    pub fn new(package: PackageRef) -> Self {
        Self {
            package,
            transitive: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_transitive(package: PackageRef, transitive: Vec<PackageRef>) -> Self {
        Self {
            package,
            transitive,
        }
    }
}

/// The flattened dependency graph: direct dependencies keyed by their ref
/// string, each carrying its transitive closure.
///
/// Keys are ref strings rather than [`PackageRef`] values so that two
/// versions of the same package stay distinct despite name-only equality.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyTree {
    pub dependencies: IndexMap<String, DirectDependency>,
}

impl DependencyTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a direct dependency. Duplicate keys are overwritten,
    /// last write wins.
    pub fn insert(&mut self, dep: DirectDependency) {
        let key = dep.package.ref_str().to_string();
        if self.dependencies.contains_key(&key) {
            debug!("Ignore duplicate key {key}");
        }
        self.dependencies.insert(key, dep);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// All packages in the tree, direct and transitive, deduplicated by
    /// ref string.
    #[must_use]
    pub fn get_all(&self) -> IndexMap<String, PackageRef> {
        let mut all = IndexMap::new();
        for dep in self.dependencies.values() {
            all.entry(dep.package.ref_str().to_string())
                .or_insert_with(|| dep.package.clone());
            for t in &dep.transitive {
                all.entry(t.ref_str().to_string()).or_insert_with(|| t.clone());
            }
        }
        all
    }

    /// Number of direct dependencies.
    #[must_use]
    pub fn direct_count(&self) -> usize {
        self.dependencies.len()
    }

    /// Number of packages reachable only transitively.
    #[must_use]
    pub fn transitive_count(&self) -> usize {
        self.get_all().len() - self.direct_count()
    }

    /// Whether the given ref string is a direct dependency.
    #[must_use]
    pub fn is_direct(&self, ref_str: &str) -> bool {
        self.dependencies.contains_key(ref_str)
    }
}
