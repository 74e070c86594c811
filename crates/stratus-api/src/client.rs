//! Bearer-token HTTP client shared by every upstream service.

use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::Method;
use serde_json::Value;

use crate::error::ApiError;
use crate::retry::{with_retry, RetryConfig};
use crate::token::TokenCell;

const REQUEST_TIMEOUT_SECS: u64 = 10;

/// JSON-over-HTTP client for one upstream service.
///
/// Every request attaches `Authorization: Bearer <token>` when the cell
/// holds one and runs under the bounded retry loop. A 401 clears the cell
/// and surfaces [`ApiError::Unauthorized`] without retrying.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: TokenCell,
    retry: RetryConfig,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: TokenCell) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            token,
            retry: RetryConfig::default(),
        })
    }

    /// Override the default retry budget.
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn token(&self) -> &TokenCell {
        &self.token
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET a JSON resource with query parameters.
    pub async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, ApiError> {
        with_retry(&self.retry, ApiError::is_retryable, || {
            self.attempt(Method::GET, path, query, None)
        })
        .await
    }

    /// POST a JSON body and parse the JSON response.
    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        with_retry(&self.retry, ApiError::is_retryable, || {
            self.attempt(Method::POST, path, &[], Some(body))
        })
        .await
    }

    async fn attempt(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.base_url, path);

        let mut request = self.http.request(method, &url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(token) = self.token.get() {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        if status.as_u16() == 401 {
            tracing::warn!("Unauthorized response from {}, clearing credential", url);
            self.token.clear();
            return Err(ApiError::Unauthorized);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Http {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ApiError::MalformedResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer, token: TokenCell) -> ApiClient {
        ApiClient::new(server.uri(), token)
            .unwrap()
            .with_retry_config(RetryConfig::new(2, 1, 10))
    }

    #[tokio::test]
    async fn test_get_json_attaches_bearer_token() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/locations"))
            .and(header("Authorization", "Bearer secret-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"name": "Bangkok"}])))
            .mount(&server)
            .await;

        let client = test_client(&server, TokenCell::with_token("secret-token"));
        let value = client.get_json("/api/locations", &[]).await.unwrap();

        assert_eq!(value[0]["name"], "Bangkok");
    }

    #[tokio::test]
    async fn test_get_json_without_token_omits_header() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/forecast"))
            .and(query_param("latitude", "13.7563"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let client = test_client(&server, TokenCell::new());
        let value = client
            .get_json("/forecast", &[("latitude", "13.7563".to_string())])
            .await
            .unwrap();
        assert_eq!(value["ok"], true);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].headers.contains_key("authorization"));
    }

    #[tokio::test]
    async fn test_unauthorized_clears_token_without_retry() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/locations"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let token = TokenCell::with_token("expired");
        let client = test_client(&server, token.clone());
        let result = client.get_json("/api/locations", &[]).await;

        assert!(matches!(result, Err(ApiError::Unauthorized)));
        assert!(!token.is_set());
        // A single call: the 401 bypasses the retry loop.
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_server_error_retries_to_budget() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/forecast"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = test_client(&server, TokenCell::new());
        let result = client.get_json("/forecast", &[]).await;

        assert!(matches!(result, Err(ApiError::Http { status: 500, .. })));
        // 1 initial + 2 retries
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_malformed_body_retries() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json at all"))
            .mount(&server)
            .await;

        let client = test_client(&server, TokenCell::new());
        let result = client.get_json("/forecast", &[]).await;

        assert!(matches!(result, Err(ApiError::MalformedResponse(_))));
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_recovers_when_server_comes_back() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/forecast"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let client = test_client(&server, TokenCell::new());
        let value = client.get_json("/forecast", &[]).await.unwrap();

        assert_eq!(value["ok"], true);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_post_json_sends_body() {
        let server = MockServer::start().await;
        let payload = json!({"name": "Bangkok", "lat": 13.7563, "lon": 100.5018});

        Mock::given(method("POST"))
            .and(path("/api/locations"))
            .and(body_json(&payload))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"id": 1, "name": "Bangkok"})),
            )
            .mount(&server)
            .await;

        let client = test_client(&server, TokenCell::with_token("t"));
        let created = client.post_json("/api/locations", &payload).await.unwrap();

        assert_eq!(created["id"], 1);
    }
}
