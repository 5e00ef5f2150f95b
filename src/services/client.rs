use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::GuardError;
use tracing::debug;

/// Thin reqwest wrapper for the Arr family of services.
///
/// Every request carries the `X-Api-Key` header. Non-success statuses are
/// mapped onto the error taxonomy by [`classify_status`].
#[derive(Clone)]
pub struct ArrHttpClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ArrHttpClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, GuardError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GuardError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, GuardError> {
        debug!(path = path, "GET");
        let resp = self.client
            .get(self.url(path))
            .header("X-Api-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| map_transport_error(e, path))?;
        parse_json(ensure_success(resp, path).await?, path).await
    }

    /// POST without a body. The raw response is returned so callers can
    /// interpret non-success statuses themselves.
    pub async fn post_raw(&self, path: &str) -> Result<Response, GuardError> {
        debug!(path = path, "POST");
        self.client
            .post(self.url(path))
            .header("X-Api-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| map_transport_error(e, path))
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<Value, GuardError> {
        debug!(path = path, "PUT");
        let request = self.client.put(self.url(path));
        self.send_json(request, path, body).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, GuardError> {
        debug!(path = path, "POST");
        let request = self.client.post(self.url(path));
        self.send_json(request, path, body).await
    }

    /// Send `body` as JSON. An empty response body comes back as `Null`.
    async fn send_json(&self, request: RequestBuilder, path: &str, body: &Value) -> Result<Value, GuardError> {
        let resp = request
            .header("X-Api-Key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, path))?;
        let resp = ensure_success(resp, path).await?;
        let text = resp.text().await.map_err(|e| map_transport_error(e, path))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

/// Plain GET for documents outside any Arr service, such as discovery lists.
#[derive(Clone)]
pub struct SourceHttpClient {
    client: Client,
}

impl SourceHttpClient {
    pub fn new(timeout: Duration) -> Result<Self, GuardError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GuardError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub async fn get_text(&self, url: &str) -> Result<String, GuardError> {
        debug!(url = url, "GET");
        let resp = self.client
            .get(url)
            .send()
            .await
            .map_err(|e| map_transport_error(e, url))?;
        let resp = ensure_success(resp, url).await?;
        resp.text().await.map_err(|e| map_transport_error(e, url))
    }
}

async fn ensure_success(resp: Response, path: &str) -> Result<Response, GuardError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(classify_status(status, path, &body))
}

async fn parse_json<T: DeserializeOwned>(resp: Response, path: &str) -> Result<T, GuardError> {
    let text = resp.text().await.map_err(|e| map_transport_error(e, path))?;
    serde_json::from_str(&text)
        .map_err(|e| GuardError::InvalidResponse(format!("{}: {}", path, e)))
}

/// Map a non-success HTTP status onto the error taxonomy.
pub fn classify_status(status: StatusCode, path: &str, body: &str) -> GuardError {
    let detail = format!("{} returned {}: {}", path, status.as_u16(), error_message(body));
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GuardError::Authentication(detail),
        StatusCode::NOT_FOUND => GuardError::NotFound(detail),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => GuardError::Transient(detail),
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            GuardError::ServiceUnavailable(detail)
        }
        s if s.is_server_error() => GuardError::Transient(detail),
        _ => GuardError::Permanent(detail),
    }
}

fn map_transport_error(e: reqwest::Error, path: &str) -> GuardError {
    if e.is_timeout() {
        GuardError::Timeout(format!("{}: {}", path, e))
    } else if e.is_decode() {
        GuardError::InvalidResponse(format!("{}: {}", path, e))
    } else {
        GuardError::Network(format!("{}: {}", path, e))
    }
}

/// Best-effort human message from an Arr error body.
///
/// Validation failures come back as an array of `{errorMessage}` objects;
/// other errors as `{message}`.
pub fn error_message(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Array(items)) => {
            let messages: Vec<&str> = items
                .iter()
                .filter_map(|i| i.get("errorMessage").and_then(Value::as_str))
                .collect();
            if messages.is_empty() {
                truncate(body)
            } else {
                messages.join("; ")
            }
        }
        Ok(Value::Object(obj)) => obj
            .get("message")
            .or_else(|| obj.get("errorMessage"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| truncate(body)),
        _ => truncate(body),
    }
}

fn truncate(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= 200 {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(200).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn test_server_errors_are_transient() {
        for code in [500u16, 502, 503, 504] {
            let status = StatusCode::from_u16(code).unwrap();
            assert_eq!(classify_status(status, "/api/v3/indexer", "").kind(), ErrorKind::Transient);
        }
    }

    #[test]
    fn test_auth_and_not_found_are_permanent() {
        let err = classify_status(StatusCode::UNAUTHORIZED, "/api/v3/indexer", "");
        assert!(matches!(err, GuardError::Authentication(_)));
        let err = classify_status(StatusCode::NOT_FOUND, "/api/v3/indexer/9", "");
        assert!(matches!(err, GuardError::NotFound(_)));
        assert_eq!(err.kind(), ErrorKind::Permanent);
    }

    #[test]
    fn test_rate_limit_is_transient() {
        let err = classify_status(StatusCode::TOO_MANY_REQUESTS, "/api/v3/indexer", "");
        assert!(err.classify().retryable());
    }

    #[test]
    fn test_error_message_from_validation_array() {
        let body = r#"[{"propertyName":"BaseUrl","errorMessage":"Unable to connect to indexer"},{"errorMessage":"check logs"}]"#;
        assert_eq!(error_message(body), "Unable to connect to indexer; check logs");
    }

    #[test]
    fn test_error_message_from_object_and_plain_text() {
        assert_eq!(error_message(r#"{"message":"NotFound"}"#), "NotFound");
        assert_eq!(error_message("  gateway down "), "gateway down");
        let long = "x".repeat(300);
        assert_eq!(error_message(&long).len(), 203);
    }

    #[tokio::test]
    async fn test_source_fetch_from_unreachable_host_is_transient() {
        let client = SourceHttpClient::new(Duration::from_secs(2)).unwrap();
        let err = client.get_text("http://127.0.0.1:1/indexers.txt").await.unwrap_err();
        assert!(matches!(err, GuardError::Network(_) | GuardError::Timeout(_)));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ArrHttpClient::new("http://localhost:7878/", "key", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:7878");
        assert_eq!(client.url("/api/v3/indexer"), "http://localhost:7878/api/v3/indexer");
    }
}
