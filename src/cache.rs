//! Cache-aside storage for per-package provider results.
//!
//! Issue entries are keyed by `"items:"` plus the package ref string,
//! recommendation lookups by `"recommend:"` plus the ref. A cached empty
//! issue list is a real answer ("this package is clean"), and a cached
//! `None` recommendation means the provider had nothing to suggest; both
//! are distinct from a cache miss. TTL is enforced by the store on read.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{Issue, IssueMap, ProviderResponse, Recommendation, RecommendationMap};

const KEY_PREFIX: &str = "items:";
const RECOMMEND_PREFIX: &str = "recommend:";

/// Default entry time-to-live: one day.
pub const DEFAULT_TTL_SECS: u64 = 24 * 60 * 60;

/// One cached per-package result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedEntry {
    pub package_ref: String,
    pub issues: Vec<Issue>,
}

/// One cached recommendation lookup. `recommendation: None` records
/// that the provider had nothing to suggest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedRecommendation {
    pub package_ref: String,
    pub recommendation: Option<Recommendation>,
}

/// Storage for per-package provider results.
pub trait CacheService: Send + Sync {
    /// Look up cached results for the given ref strings. Missing and
    /// expired entries are simply absent from the result.
    fn get_cached_items(&self, refs: &IndexSet<String>) -> IssueMap;

    /// Store the miss-set entries of a provider response. Responses that
    /// carry an error status are never cached; misses the response holds
    /// no issues for are written as explicit empty entries.
    fn cache_items(&self, response: &ProviderResponse, misses: &IndexSet<String>);

    /// Look up cached recommendation lookups. A hit holding `None` is an
    /// affirmative "no recommendation" answer, distinct from a miss.
    fn get_cached_recommendations(
        &self,
        refs: &IndexSet<String>,
    ) -> IndexMap<String, Option<Recommendation>>;

    /// Store recommendation lookups for the miss set. Misses the map
    /// holds no recommendation for are written as explicit `None`
    /// entries.
    fn cache_recommendations(&self, recommendations: &RecommendationMap, misses: &IndexSet<String>);
}

/// In-memory [`CacheService`] with per-entry TTL.
pub struct InMemoryCacheService {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, CachedEntry)>>,
    recommendations: Mutex<HashMap<String, (Instant, CachedRecommendation)>>,
}

impl InMemoryCacheService {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
            recommendations: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (Instant, CachedEntry)>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_recommendations(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<String, (Instant, CachedRecommendation)>> {
        self.recommendations.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for InMemoryCacheService {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TTL_SECS))
    }
}

impl CacheService for InMemoryCacheService {
    fn get_cached_items(&self, refs: &IndexSet<String>) -> IssueMap {
        if refs.is_empty() {
            return IssueMap::new();
        }
        let mut entries = self.lock();
        let mut hits = IssueMap::new();
        for ref_str in refs {
            let key = format!("{KEY_PREFIX}{ref_str}");
            let expired = match entries.get(&key) {
                Some((stored, _)) => stored.elapsed() > self.ttl,
                None => false,
            };
            if expired {
                entries.remove(&key);
                continue;
            }
            if let Some((_, entry)) = entries.get(&key) {
                hits.insert(ref_str.clone(), entry.issues.clone());
            }
        }
        debug!("Got {} cached items for {} refs", hits.len(), refs.len());
        hits
    }

    fn cache_items(&self, response: &ProviderResponse, misses: &IndexSet<String>) {
        let Some(issues) = &response.issues else {
            return;
        };
        if misses.is_empty() || response.is_error() {
            return;
        }
        let mut entries = self.lock();
        let now = Instant::now();
        for ref_str in misses {
            let entry = CachedEntry {
                package_ref: ref_str.clone(),
                issues: issues.get(ref_str).cloned().unwrap_or_default(),
            };
            entries.insert(format!("{KEY_PREFIX}{ref_str}"), (now, entry));
        }
        debug!("Cached {} items", misses.len());
    }

    fn get_cached_recommendations(
        &self,
        refs: &IndexSet<String>,
    ) -> IndexMap<String, Option<Recommendation>> {
        if refs.is_empty() {
            return IndexMap::new();
        }
        let mut entries = self.lock_recommendations();
        let mut hits = IndexMap::new();
        for ref_str in refs {
            let key = format!("{RECOMMEND_PREFIX}{ref_str}");
            let expired = match entries.get(&key) {
                Some((stored, _)) => stored.elapsed() > self.ttl,
                None => false,
            };
            if expired {
                entries.remove(&key);
                continue;
            }
            if let Some((_, entry)) = entries.get(&key) {
                hits.insert(ref_str.clone(), entry.recommendation.clone());
            }
        }
        debug!(
            "Got {} cached recommendations for {} refs",
            hits.len(),
            refs.len()
        );
        hits
    }

    fn cache_recommendations(
        &self,
        recommendations: &RecommendationMap,
        misses: &IndexSet<String>,
    ) {
        if misses.is_empty() {
            return;
        }
        let mut entries = self.lock_recommendations();
        let now = Instant::now();
        for ref_str in misses {
            let entry = CachedRecommendation {
                package_ref: ref_str.clone(),
                recommendation: recommendations.get(ref_str).cloned(),
            };
            entries.insert(format!("{RECOMMEND_PREFIX}{ref_str}"), (now, entry));
        }
        debug!("Cached {} recommendations", misses.len());
    }
}

/// A [`CacheService`] that stores nothing, for disabled caching.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCacheService;

impl CacheService for NoOpCacheService {
    fn get_cached_items(&self, _refs: &IndexSet<String>) -> IssueMap {
        IssueMap::new()
    }

    fn cache_items(&self, _response: &ProviderResponse, _misses: &IndexSet<String>) {}

    fn get_cached_recommendations(
        &self,
        _refs: &IndexSet<String>,
    ) -> IndexMap<String, Option<Recommendation>> {
        IndexMap::new()
    }

    fn cache_recommendations(
        &self,
        _recommendations: &RecommendationMap,
        _misses: &IndexSet<String>,
    ) {
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProviderStatus;

    fn refs(items: &[&str]) -> IndexSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn ok_response(map: IssueMap) -> ProviderResponse {
        ProviderResponse::new(map, ProviderStatus::ok("osv"))
    }

    #[test]
    fn test_miss_then_hit() {
        let cache = InMemoryCacheService::default();
        let misses = refs(&["pkg:npm/a@1.0.0"]);
        assert!(cache.get_cached_items(&misses).is_empty());

        cache.cache_items(&ok_response(IssueMap::new()), &misses);
        let hits = cache.get_cached_items(&misses);
        assert_eq!(hits.len(), 1);
        assert!(hits["pkg:npm/a@1.0.0"].is_empty());
    }

    #[test]
    fn test_only_misses_are_written() {
        let cache = InMemoryCacheService::default();
        let mut map = IssueMap::new();
        map.insert("pkg:npm/a@1.0.0".to_string(), Vec::new());
        map.insert("pkg:npm/b@1.0.0".to_string(), Vec::new());
        cache.cache_items(&ok_response(map), &refs(&["pkg:npm/a@1.0.0"]));

        let hits = cache.get_cached_items(&refs(&["pkg:npm/a@1.0.0", "pkg:npm/b@1.0.0"]));
        assert_eq!(hits.len(), 1);
        assert!(hits.contains_key("pkg:npm/a@1.0.0"));
    }

    #[test]
    fn test_error_response_not_cached() {
        let cache = InMemoryCacheService::default();
        let response = ProviderResponse {
            issues: Some(IssueMap::new()),
            status: Some(ProviderStatus::error("osv", 500, "boom")),
        };
        let misses = refs(&["pkg:npm/a@1.0.0"]);
        cache.cache_items(&response, &misses);
        assert!(cache.get_cached_items(&misses).is_empty());
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache = InMemoryCacheService::new(Duration::from_secs(0));
        let misses = refs(&["pkg:npm/a@1.0.0"]);
        cache.cache_items(&ok_response(IssueMap::new()), &misses);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get_cached_items(&misses).is_empty());
    }

    #[test]
    fn test_noop_cache() {
        let cache = NoOpCacheService;
        let misses = refs(&["pkg:npm/a@1.0.0"]);
        cache.cache_items(&ok_response(IssueMap::new()), &misses);
        assert!(cache.get_cached_items(&misses).is_empty());
    }

    fn recommendation(purl: &str) -> Recommendation {
        Recommendation {
            package: crate::model::PackageRef::parse(purl).unwrap(),
            vulnerabilities: IndexMap::new(),
        }
    }

    #[test]
    fn test_recommendation_miss_then_hit() {
        let cache = InMemoryCacheService::default();
        let misses = refs(&["pkg:npm/a@1.0.0"]);
        assert!(cache.get_cached_recommendations(&misses).is_empty());

        let mut map = RecommendationMap::new();
        map.insert("pkg:npm/a@1.0.0".into(), recommendation("pkg:npm/a@2.0.0"));
        cache.cache_recommendations(&map, &misses);

        let hits = cache.get_cached_recommendations(&misses);
        let hit = hits["pkg:npm/a@1.0.0"].as_ref().unwrap();
        assert_eq!(hit.package.ref_str(), "pkg:npm/a@2.0.0");
    }

    #[test]
    fn test_no_recommendation_is_an_answer() {
        let cache = InMemoryCacheService::default();
        let misses = refs(&["pkg:npm/a@1.0.0"]);
        cache.cache_recommendations(&RecommendationMap::new(), &misses);

        let hits = cache.get_cached_recommendations(&misses);
        assert_eq!(hits.len(), 1);
        assert!(hits["pkg:npm/a@1.0.0"].is_none());
    }

    #[test]
    fn test_expired_recommendation_is_a_miss() {
        let cache = InMemoryCacheService::new(Duration::from_secs(0));
        let misses = refs(&["pkg:npm/a@1.0.0"]);
        cache.cache_recommendations(&RecommendationMap::new(), &misses);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get_cached_recommendations(&misses).is_empty());
    }
}
