//! **SBOM-driven dependency vulnerability analysis.**
//!
//! `depscan` parses a software bill of materials, flattens it into a
//! canonical dependency tree, and checks every package against one or
//! more vulnerability providers, merging the answers into a single
//! report.
//!
//! The library supports **CycloneDX** and **SPDX** JSON documents and
//! normalizes both into the same [`model::DependencyTree`], so the
//! analysis side never cares which format the input came in.
//!
//! ## Key Features
//!
//! - **Multi-Format Parsing**: Ingests CycloneDX (JSON) and SPDX (JSON)
//!   documents, selected by media type.
//! - **Provider Aggregation**: Queries OSV- and Trustify-shaped
//!   endpoints in parallel batches and normalizes their answers into a
//!   common issue shape with CVSS-derived severities.
//! - **Partial-Failure Tolerance**: A failing provider degrades into a
//!   status entry in the report instead of failing the analysis; circuit
//!   breakers isolate unhealthy endpoints per route.
//! - **Trusted Content**: Providers that offer it can recommend vetted
//!   replacement packages, annotating the issues they already address.
//! - **Caching**: Per-package results and recommendation lookups are
//!   served cache-aside with a TTL, so repeated scans only pay for the
//!   packages they have not seen.
//!
//! ## Core Concepts & Modules
//!
//! - **[`model`]**: The canonical data structures: [`model::PackageRef`],
//!   [`model::DependencyTree`], [`model::Issue`] and the report types.
//! - **[`parsers`]**: SBOM ingestion. [`parsers::build_tree`] picks the
//!   parser from the document's media type.
//! - **[`providers`]**: The [`providers::VulnerabilityProvider`] trait
//!   and its OSV and Trustify implementations.
//! - **[`aggregator`]**: The [`aggregator::Aggregator`] drives the whole
//!   pipeline: cache lookup, batching, breaker-guarded calls, merging
//!   and report assembly.
//!
//! ## Quick Start
//!
//! ```no_run
//! use depscan::aggregator::{Aggregator, AnalysisRequest};
//! use depscan::config::DepscanConfig;
//! use depscan::parsers::{self, CYCLONEDX_MEDIA_TYPE};
//!
//! # fn main() -> depscan::error::Result<()> {
//! let sbom = std::fs::read("bom.json")?;
//! let tree = parsers::build_tree(CYCLONEDX_MEDIA_TYPE, &sbom)?;
//!
//! let config = DepscanConfig::from_yaml_file("depscan.yaml")?;
//! let aggregator = Aggregator::new(config)?;
//! let report = aggregator.analyze(&tree, &AnalysisRequest::new(["osv"]));
//!
//! println!("{}", serde_json::to_string_pretty(&report)?);
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod cvss;
pub mod error;
pub mod model;
pub mod parsers;
pub mod providers;

pub use aggregator::{Aggregator, AnalysisRequest};
pub use error::{DepscanError, Result};
pub use model::{AnalysisReport, DependencyTree, Issue, PackageRef, Severity};
