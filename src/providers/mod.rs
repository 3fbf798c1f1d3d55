//! Vulnerability providers and their supporting plumbing.

mod breaker;
mod osv;
mod transport;
mod trustify;

pub use breaker::{BreakerRegistry, CircuitBreaker};
pub use osv::OsvProvider;
pub use transport::{prettify_http_status, HttpResponse, HttpTransport, ReqwestTransport};
pub use trustify::TrustifyProvider;

use crate::error::Result;
use crate::model::{DependencyTree, IssueMap, RecommendationMap};

/// Capabilities every vulnerability provider exposes.
///
/// A provider only describes its wire contract: how to build a batch
/// request and how to normalize the response. Transport, batching,
/// caching and isolation live in the aggregator.
pub trait VulnerabilityProvider: Send + Sync {
    /// Stable provider name, used for selection, status entries and
    /// breaker keys.
    fn name(&self) -> &'static str;

    /// Whether calls must carry a credential. Without one the provider
    /// is answered with a synthetic unauthenticated status, no request
    /// is sent.
    fn requires_token(&self) -> bool {
        false
    }

    /// Path of the batch analysis endpoint, relative to the host.
    fn analyze_path(&self) -> &'static str;

    /// Path of the health endpoint, relative to the host.
    fn health_path(&self) -> &'static str;

    /// Build the JSON body for one batch of purl ref strings.
    fn build_request(&self, batch: &[String]) -> serde_json::Value {
        serde_json::json!({ "purls": batch })
    }

    /// Normalize a raw response body into issues keyed by ref string.
    /// Only refs present in the tree are considered.
    fn parse_response(&self, body: &[u8], tree: &DependencyTree) -> Result<IssueMap>;

    /// Path of the trusted-content recommendation endpoint, for
    /// providers that offer one.
    fn recommend_path(&self) -> Option<&'static str> {
        None
    }

    /// Normalize a raw recommendation response into recommendations
    /// keyed by queried ref string. Only refs from the batch are
    /// considered.
    fn parse_recommendations(&self, _body: &[u8], _batch: &[String]) -> Result<RecommendationMap> {
        Ok(RecommendationMap::new())
    }
}

/// Look up a provider implementation by name.
#[must_use]
pub fn provider_for(name: &str) -> Option<Box<dyn VulnerabilityProvider>> {
    match name {
        osv::PROVIDER_NAME => Some(Box::new(OsvProvider)),
        trustify::PROVIDER_NAME => Some(Box::new(TrustifyProvider)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_lookup() {
        assert!(provider_for("osv").is_some());
        assert!(provider_for("trustify").is_some());
        assert!(provider_for("snyk").is_none());
    }

    #[test]
    fn test_default_request_body() {
        let provider = OsvProvider;
        let body = provider.build_request(&["pkg:npm/a@1.0.0".to_string()]);
        assert_eq!(body["purls"][0], "pkg:npm/a@1.0.0");
    }
}
