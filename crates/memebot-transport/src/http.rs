//! Shared reqwest plumbing.
//!
//! Every adapter in this crate funnels its failures through [`classify`] and
//! [`check_status`] so the transient/permanent split is the same everywhere:
//! connection problems, timeouts and the statuses in
//! [`memebot_core::TRANSIENT_STATUS`] may be retried, everything else may not.

use std::time::Duration;

use reqwest::{Client, ClientBuilder, Response};

use memebot_core::{AdapterError, AdapterResult, ConfigError};

/// Builds a client with a whole-request timeout.
pub fn build_client(component: &str, timeout: Duration) -> Result<Client, ConfigError> {
    ClientBuilder::new()
        .timeout(timeout)
        .build()
        .map_err(|e| ConfigError::new(component, format!("failed to build HTTP client: {e}")))
}

/// Tags a reqwest failure as transient or permanent.
pub fn classify(adapter: &str, err: reqwest::Error) -> AdapterError {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        AdapterError::transient(adapter, err.to_string())
    } else if let Some(status) = err.status() {
        AdapterError::from_status(adapter, status.as_u16(), err.to_string())
    } else {
        AdapterError::permanent(adapter, err.to_string())
    }
}

/// Passes a successful response through and turns any other status into an
/// error carrying the start of the body.
pub async fn check_status(adapter: &str, resp: Response) -> AdapterResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(AdapterError::from_status(adapter, status.as_u16(), body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_check_status_classifies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/denied"))
            .respond_with(ResponseTemplate::new(403).set_body_string("bad key"))
            .mount(&server)
            .await;

        let client = build_client("test", Duration::from_secs(5)).unwrap();

        let resp = client
            .get(format!("{}/busy", server.uri()))
            .send()
            .await
            .unwrap();
        let err = check_status("test", resp).await.unwrap_err();
        assert!(err.is_transient());

        let resp = client
            .get(format!("{}/denied", server.uri()))
            .send()
            .await
            .unwrap();
        let err = check_status("test", resp).await.unwrap_err();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("bad key"));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        let client = build_client("test", Duration::from_secs(5)).unwrap();
        // Port 9 (discard) is closed on test machines.
        let err = client
            .get("http://127.0.0.1:9/")
            .send()
            .await
            .unwrap_err();
        assert!(classify("test", err).is_transient());
    }
}
