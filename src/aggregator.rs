//! Multi-provider fan-out and report assembly.
//!
//! Per provider the pipeline is: auth pre-filter, cache lookup, batch
//! split of the misses, parallel batch calls behind a circuit breaker,
//! batch merge, cache write-back, cache-hit overlay, report build.
//! Providers run in parallel and are joined into one report. SBOM
//! validation problems are the caller's only hard failures; provider
//! failures degrade into status entries.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::cache::{CacheService, InMemoryCacheService, NoOpCacheService};
use crate::config::{DepscanConfig, ProviderConfig};
use crate::model::{
    AnalysisReport, DependencyReport, DependencyTree, Issue, IssueMap, ProviderHealthCheckResult,
    ProviderReport, ProviderResponse, ProviderStatus, RecommendationMap, Scanned, Source,
    SourceSummary, TransitiveDependencyReport, TrustedContent,
};
use crate::providers::{
    prettify_http_status, provider_for, BreakerRegistry, HttpTransport, ReqwestTransport,
    VulnerabilityProvider,
};
use crate::error::Result;

const ANALYZE_ROUTE: &str = "analyze";
const HEALTH_ROUTE: &str = "health";
const RECOMMEND_ROUTE: &str = "recommend";

/// What to analyze with: enabled provider names, per-provider tokens
/// and whether to look up trusted-content recommendations.
#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest {
    pub providers: Vec<String>,
    pub tokens: HashMap<String, String>,
    pub recommend: bool,
}

impl AnalysisRequest {
    #[must_use]
    pub fn new(providers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            providers: providers.into_iter().map(Into::into).collect(),
            tokens: HashMap::new(),
            recommend: false,
        }
    }

    #[must_use]
    pub fn with_token(mut self, provider: impl Into<String>, token: impl Into<String>) -> Self {
        self.tokens.insert(provider.into(), token.into());
        self
    }

    /// Ask providers that offer it for trusted-content recommendations.
    #[must_use]
    pub fn with_recommendations(mut self) -> Self {
        self.recommend = true;
        self
    }
}

/// Orchestrates providers, cache and breakers for one configuration.
pub struct Aggregator {
    config: DepscanConfig,
    transport: Arc<dyn HttpTransport>,
    cache: Arc<dyn CacheService>,
    breakers: BreakerRegistry,
}

impl Aggregator {
    /// Build an aggregator with the default HTTP transport and an
    /// in-memory cache (or no cache when disabled).
    pub fn new(config: DepscanConfig) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new()?);
        let cache: Arc<dyn CacheService> = if config.cache.enabled {
            Arc::new(InMemoryCacheService::new(config.cache.ttl()))
        } else {
            Arc::new(NoOpCacheService)
        };
        Ok(Self::with_components(config, transport, cache))
    }

    /// Build an aggregator from explicit components.
    #[must_use]
    pub fn with_components(
        config: DepscanConfig,
        transport: Arc<dyn HttpTransport>,
        cache: Arc<dyn CacheService>,
    ) -> Self {
        let breakers = BreakerRegistry::new(
            config.breaker.failure_threshold,
            config.breaker.cool_down(),
        );
        Self {
            config,
            transport,
            cache,
            breakers,
        }
    }

    /// Analyze a dependency tree against the requested providers.
    #[must_use]
    pub fn analyze(&self, tree: &DependencyTree, request: &AnalysisRequest) -> AnalysisReport {
        let all = tree.get_all();
        let scanned = Scanned {
            total: all.len(),
            direct: tree.direct_count(),
            transitive: all.len() - tree.direct_count(),
        };

        // A provider named twice must not double its issues in the
        // merged map.
        let names: Vec<&String> = request
            .providers
            .iter()
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect();
        let results: Vec<(String, ProviderReport, IssueMap)> = names
            .into_par_iter()
            .map(|name| self.analyze_provider(name, tree, request))
            .collect();

        let mut providers = IndexMap::new();
        let mut issues = IssueMap::new();
        for (name, report, provider_issues) in results {
            providers.insert(name, report);
            for (ref_str, list) in provider_issues {
                if !list.is_empty() {
                    issues.entry(ref_str).or_default().extend(list);
                }
            }
        }
        AnalysisReport {
            scanned,
            providers,
            issues,
        }
    }

    /// Probe every enabled provider's health endpoint. Disabled
    /// providers are excluded silently.
    #[must_use]
    pub fn health_check(&self) -> Vec<ProviderHealthCheckResult> {
        let enabled: Vec<(&String, &ProviderConfig)> = self
            .config
            .providers
            .iter()
            .filter(|(_, cfg)| cfg.enabled)
            .collect();
        enabled
            .par_iter()
            .map(|(name, cfg)| self.probe(name, cfg))
            .collect()
    }

    fn probe(&self, name: &str, cfg: &ProviderConfig) -> ProviderHealthCheckResult {
        let Some(provider) = provider_for(name) else {
            return ProviderHealthCheckResult::failure(name, None, "Unknown provider");
        };
        let breaker = self.breakers.get(name, HEALTH_ROUTE);
        if !breaker.try_acquire() {
            return ProviderHealthCheckResult::failure(name, None, "Circuit breaker is open");
        }
        let url = format!(
            "{}{}",
            cfg.host.trim_end_matches('/'),
            provider.health_path()
        );
        match self.transport.get(&url, cfg.health_timeout()) {
            Ok(response) if response.is_success() => {
                breaker.record_success();
                ProviderHealthCheckResult::success(name, response.code)
            }
            Ok(response) => {
                breaker.record_failure();
                let body = String::from_utf8_lossy(&response.body);
                ProviderHealthCheckResult::failure(
                    name,
                    Some(response.code),
                    prettify_http_status(response.code, body.trim()),
                )
            }
            Err(e) => {
                breaker.record_failure();
                ProviderHealthCheckResult::failure(name, None, e.to_string())
            }
        }
    }

    fn analyze_provider(
        &self,
        name: &str,
        tree: &DependencyTree,
        request: &AnalysisRequest,
    ) -> (String, ProviderReport, IssueMap) {
        let failed = |status: ProviderStatus| {
            (
                name.to_string(),
                ProviderReport::failed(status),
                IssueMap::new(),
            )
        };

        let Some(provider) = provider_for(name) else {
            return failed(ProviderStatus::error(name, 422, "Unknown provider"));
        };
        let Some(cfg) = self.config.providers.get(name) else {
            return failed(ProviderStatus::error(name, 422, "Provider is not configured"));
        };
        if !cfg.enabled {
            return failed(ProviderStatus::error(name, 422, "Provider is disabled"));
        }

        let token = request.tokens.get(name);
        if provider.requires_token() && token.is_none() {
            debug!("No token for {name}, skipping the request");
            return failed(ProviderStatus::unauthenticated(name));
        }

        if tree.is_empty() {
            return (
                name.to_string(),
                ProviderReport {
                    status: ProviderStatus::ok(name),
                    sources: IndexMap::new(),
                },
                IssueMap::new(),
            );
        }

        let candidates: IndexSet<String> = tree.get_all().keys().cloned().collect();
        let cached = self.cache.get_cached_items(&candidates);
        let misses: IndexSet<String> = candidates
            .iter()
            .filter(|r| !cached.contains_key(*r))
            .cloned()
            .collect();

        let batches: Vec<Vec<String>> = misses
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .chunks(cfg.batch_size)
            .map(<[String]>::to_vec)
            .collect();

        let responses: Vec<ProviderResponse> = batches
            .par_iter()
            .map(|batch| self.call_batch(provider.as_ref(), cfg, token.map(String::as_str), batch, tree))
            .collect();
        let merged = responses
            .into_iter()
            .fold(None, |acc, response| {
                Some(ProviderResponse::aggregate(acc, response))
            })
            .unwrap_or_else(ProviderResponse::empty);

        self.cache.cache_items(&merged, &misses);

        if merged.is_error() {
            let status = merged
                .status
                .unwrap_or_else(|| ProviderStatus::error(name, 500, "Unknown error"));
            return failed(status);
        }

        let mut issues = merged.issues.unwrap_or_default();
        for (ref_str, list) in cached {
            if !list.is_empty() {
                issues.entry(ref_str).or_default().extend(list);
            }
        }

        let recommendations = if request.recommend {
            self.fetch_recommendations(
                provider.as_ref(),
                cfg,
                token.map(String::as_str),
                &candidates,
            )
        } else {
            RecommendationMap::new()
        };
        apply_trusted_content(&mut issues, &recommendations);

        let report = ProviderReport {
            status: ProviderStatus::ok(name),
            sources: build_sources(name, tree, &issues, &recommendations),
        };
        (name.to_string(), report, issues)
    }

    /// Look up trusted-content recommendations for the candidate set.
    /// Failures degrade to an empty map; a missing recommendation never
    /// fails the provider.
    fn fetch_recommendations(
        &self,
        provider: &dyn VulnerabilityProvider,
        cfg: &ProviderConfig,
        token: Option<&str>,
        candidates: &IndexSet<String>,
    ) -> RecommendationMap {
        let Some(path) = provider.recommend_path() else {
            return RecommendationMap::new();
        };
        let cached = self.cache.get_cached_recommendations(candidates);
        let misses: IndexSet<String> = candidates
            .iter()
            .filter(|r| !cached.contains_key(*r))
            .cloned()
            .collect();

        let mut merged = RecommendationMap::new();
        if !misses.is_empty() {
            let batches: Vec<Vec<String>> = misses
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .chunks(cfg.batch_size)
                .map(<[String]>::to_vec)
                .collect();
            let results: Vec<Option<RecommendationMap>> = batches
                .par_iter()
                .map(|batch| self.call_recommend(provider, cfg, token, path, batch))
                .collect();
            let complete = results.iter().all(Option::is_some);
            for result in results.into_iter().flatten() {
                merged.extend(result);
            }
            // A failed batch is not an affirmative "no recommendation"
            // answer, so nothing is written in that case.
            if complete {
                self.cache.cache_recommendations(&merged, &misses);
            }
        }
        for (ref_str, recommendation) in cached {
            if let Some(recommendation) = recommendation {
                merged.insert(ref_str, recommendation);
            }
        }
        merged
    }

    fn call_recommend(
        &self,
        provider: &dyn VulnerabilityProvider,
        cfg: &ProviderConfig,
        token: Option<&str>,
        path: &str,
        batch: &[String],
    ) -> Option<RecommendationMap> {
        let name = provider.name();
        let breaker = self.breakers.get(name, RECOMMEND_ROUTE);
        if !breaker.try_acquire() {
            warn!("Skipping recommendations for {name}: circuit breaker is open");
            return None;
        }
        let url = format!("{}{}", cfg.host.trim_end_matches('/'), path);
        let body = provider.build_request(batch);
        match self.transport.post_json(&url, token, &body, cfg.timeout()) {
            Ok(response) if response.is_success() => {
                breaker.record_success();
                match provider.parse_recommendations(&response.body, batch) {
                    Ok(recommendations) => Some(recommendations),
                    Err(e) => {
                        warn!("Unable to process recommendations from {name}: {e}");
                        None
                    }
                }
            }
            Ok(response) => {
                breaker.record_failure();
                let body = String::from_utf8_lossy(&response.body);
                warn!(
                    "Unable to fetch recommendations from {name}: {}",
                    prettify_http_status(response.code, body.trim())
                );
                None
            }
            Err(e) => {
                breaker.record_failure();
                warn!("Unable to fetch recommendations from {name}: {e}");
                None
            }
        }
    }

    fn call_batch(
        &self,
        provider: &dyn VulnerabilityProvider,
        cfg: &ProviderConfig,
        token: Option<&str>,
        batch: &[String],
        tree: &DependencyTree,
    ) -> ProviderResponse {
        let name = provider.name();
        let breaker = self.breakers.get(name, ANALYZE_ROUTE);
        if !breaker.try_acquire() {
            return ProviderResponse::failed(ProviderStatus::error(
                name,
                503,
                "Service Unavailable: Circuit breaker is open",
            ));
        }
        let url = format!(
            "{}{}",
            cfg.host.trim_end_matches('/'),
            provider.analyze_path()
        );
        let body = provider.build_request(batch);
        match self.transport.post_json(&url, token, &body, cfg.timeout()) {
            Ok(response) if response.is_success() => {
                breaker.record_success();
                match provider.parse_response(&response.body, tree) {
                    Ok(issues) => ProviderResponse::new(issues, ProviderStatus::ok(name)),
                    Err(e) => {
                        debug!("Unable to process response from {name}: {e}");
                        ProviderResponse::failed(ProviderStatus::error(name, 422, e.to_string()))
                    }
                }
            }
            Ok(response) => {
                breaker.record_failure();
                let body = String::from_utf8_lossy(&response.body);
                let message = prettify_http_status(response.code, body.trim());
                warn!("Unable to process request: {message}");
                ProviderResponse::failed(ProviderStatus::error(name, response.code, message))
            }
            Err(e) => {
                breaker.record_failure();
                warn!("Unable to process request to {name}: {e}");
                ProviderResponse::failed(ProviderStatus::error(name, 500, e.to_string()))
            }
        }
    }
}

/// Mark issues their recommended package already has a status for.
fn apply_trusted_content(issues: &mut IssueMap, recommendations: &RecommendationMap) {
    for (ref_str, list) in issues.iter_mut() {
        let Some(recommendation) = recommendations.get(ref_str) else {
            continue;
        };
        for issue in list.iter_mut() {
            if let Some(found) = recommendation.status_for(&issue.id) {
                issue.remediation.trusted_content = Some(TrustedContent {
                    package: recommendation.package.clone(),
                    status: found.status.clone(),
                    justification: found.justification.clone(),
                });
            }
        }
    }
}

/// Group one provider's issues by their source tag and build a report
/// section per source. A provider that returned only recommendations
/// still gets a section, named after the provider itself.
fn build_sources(
    provider: &str,
    tree: &DependencyTree,
    issues: &IssueMap,
    recommendations: &RecommendationMap,
) -> IndexMap<String, Source> {
    let mut by_source: IndexMap<String, IssueMap> = IndexMap::new();
    for (ref_str, list) in issues {
        for issue in list {
            by_source
                .entry(issue.source.clone())
                .or_default()
                .entry(ref_str.clone())
                .or_default()
                .push(issue.clone());
        }
    }
    if by_source.is_empty() && !recommendations.is_empty() {
        by_source.insert(provider.to_string(), IssueMap::new());
    }
    by_source
        .into_iter()
        .map(|(source, items)| (source, build_source(tree, &items, recommendations)))
        .collect()
}

fn build_source(
    tree: &DependencyTree,
    items: &IssueMap,
    recommendations: &RecommendationMap,
) -> Source {
    let mut dependencies = Vec::new();
    for direct in tree.dependencies.values() {
        let mut issues = items
            .get(direct.package.ref_str())
            .cloned()
            .unwrap_or_default();
        sort_by_score(&mut issues);
        let mut highest = issues.first().cloned();
        let recommendation = recommendations
            .get(direct.package.ref_str())
            .map(|r| r.package.clone());

        let mut transitive = Vec::new();
        for package in &direct.transitive {
            let Some(found) = items.get(package.ref_str()).filter(|l| !l.is_empty()) else {
                continue;
            };
            let mut transitive_issues = found.clone();
            sort_by_score(&mut transitive_issues);
            let top = transitive_issues.first().cloned();
            if let Some(top) = &top {
                let beats_current = highest
                    .as_ref()
                    .map_or(true, |h| h.cvss_score < top.cvss_score);
                if beats_current {
                    highest = Some(top.clone());
                }
            }
            transitive.push(TransitiveDependencyReport {
                package: package.clone(),
                issues: transitive_issues,
                highest_vulnerability: top,
            });
        }
        transitive.sort_by(|a, b| {
            score_of(&b.highest_vulnerability).total_cmp(&score_of(&a.highest_vulnerability))
        });

        if highest.is_some() || recommendation.is_some() {
            dependencies.push(DependencyReport {
                package: direct.package.clone(),
                issues,
                transitive,
                highest_vulnerability: highest,
                recommendation,
            });
        }
    }
    dependencies.sort_by(|a, b| {
        score_of(&b.highest_vulnerability).total_cmp(&score_of(&a.highest_vulnerability))
    });

    let mut summary = build_summary(tree, items);
    summary.recommendations = dependencies
        .iter()
        .filter(|d| d.recommendation.is_some())
        .count();
    Source {
        summary,
        dependencies,
    }
}

fn build_summary(tree: &DependencyTree, items: &IssueMap) -> SourceSummary {
    let mut summary = SourceSummary::default();
    for (ref_str, issues) in items {
        if issues.is_empty() {
            continue;
        }
        summary.dependencies += 1;
        let is_direct = tree.is_direct(ref_str);
        for issue in issues {
            let count = issue.vulnerability_count();
            match issue.severity {
                crate::model::Severity::Critical => summary.critical += count,
                crate::model::Severity::High => summary.high += count,
                crate::model::Severity::Medium => summary.medium += count,
                crate::model::Severity::Low => summary.low += count,
                crate::model::Severity::None => {}
            }
            summary.total += count;
            if is_direct {
                summary.direct += count;
            } else {
                summary.transitive += count;
            }
            if !issue.remediation.fixed_in.is_empty() {
                summary.remediations += 1;
            }
        }
    }
    summary
}

fn sort_by_score(issues: &mut [Issue]) {
    issues.sort_by(|a, b| b.cvss_score.total_cmp(&a.cvss_score));
}

fn score_of(issue: &Option<Issue>) -> f32 {
    issue.as_ref().map_or(0.0, |i| i.cvss_score)
}
