//! Blocking HTTP transport for provider calls.
//!
//! The trait exists so the aggregator can be exercised in tests with a
//! scripted transport instead of a live endpoint.

use std::time::Duration;

use reqwest::blocking::Client;

use crate::error::{DepscanError, ProviderErrorKind, Result};

/// A raw HTTP exchange outcome. Non-2xx statuses are returned, not
/// errors; the caller decides how to degrade.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub code: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

/// Minimal blocking HTTP surface the providers need.
pub trait HttpTransport: Send + Sync {
    /// POST a JSON body, optionally with a bearer token.
    fn post_json(
        &self,
        url: &str,
        token: Option<&str>,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> Result<HttpResponse>;

    /// Plain GET, used for health probes.
    fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse>;
}

/// [`HttpTransport`] backed by a shared reqwest blocking client.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(|e| {
                DepscanError::provider("http", ProviderErrorKind::Network(e.to_string()))
            })?;
        Ok(Self { client })
    }

    fn read(response: reqwest::blocking::Response) -> Result<HttpResponse> {
        let code = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|e| {
                DepscanError::provider("http", ProviderErrorKind::Network(e.to_string()))
            })?
            .to_vec();
        Ok(HttpResponse { code, body })
    }
}

impl HttpTransport for ReqwestTransport {
    fn post_json(
        &self,
        url: &str,
        token: Option<&str>,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> Result<HttpResponse> {
        let mut request = self.client.post(url).json(body).timeout(timeout);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.send().map_err(|e| {
            DepscanError::provider("http", ProviderErrorKind::Network(e.to_string()))
        })?;
        Self::read(response)
    }

    fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse> {
        let response = self.client.get(url).timeout(timeout).send().map_err(|e| {
            DepscanError::provider("http", ProviderErrorKind::Network(e.to_string()))
        })?;
        Self::read(response)
    }
}

/// Translate an HTTP failure status into an actionable message.
#[must_use]
pub fn prettify_http_status(code: u16, body: &str) -> String {
    let reason = reason_phrase(code);
    match code {
        401 => format!("{reason}: Verify the provided credentials are valid."),
        403 => format!("{reason}: The provided credentials don't have the required permissions."),
        429 => format!("{reason}: The rate limit has been exceeded."),
        _ if body.is_empty() => reason.to_string(),
        _ => format!("{reason}: {body}"),
    }
}

fn reason_phrase(code: u16) -> &'static str {
    reqwest::StatusCode::from_u16(code)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prettify_known_codes() {
        assert_eq!(
            prettify_http_status(401, ""),
            "Unauthorized: Verify the provided credentials are valid."
        );
        assert_eq!(
            prettify_http_status(403, ""),
            "Forbidden: The provided credentials don't have the required permissions."
        );
        assert_eq!(
            prettify_http_status(429, ""),
            "Too Many Requests: The rate limit has been exceeded."
        );
    }

    #[test]
    fn test_prettify_default_appends_body() {
        assert_eq!(
            prettify_http_status(500, "boom"),
            "Internal Server Error: boom"
        );
        assert_eq!(prettify_http_status(500, ""), "Internal Server Error");
    }
}
