//! Google Sheets HTTP client

use super::types::ApiError;
use crate::providers::{invalid_response, transport_error};
use reqwest::{Client, Method, StatusCode, Url};
use serde::{de::DeserializeOwned, Serialize};
use sheetstock_core::{RemoteError, StockError, StockResult};

pub(crate) const SERVICE: &str = "google_sheets";
pub const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Thin REST client for the Sheets v4 API.
#[derive(Clone)]
pub struct GoogleSheetsClient {
    client: Client,
    access_token: String,
    base_url: String,
}

impl GoogleSheetsClient {
    /// Create a client that authenticates with `access_token`.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            access_token: access_token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the client at another endpoint (a proxy or a test server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build `{base}/{segment}/{segment}...`, percent-encoding each segment.
    pub fn url(&self, segments: &[&str]) -> StockResult<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| transport_error(SERVICE, format!("Invalid base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| transport_error(SERVICE, "Base URL cannot carry a path"))?
            .extend(segments);
        Ok(url)
    }

    pub async fn get<Res: DeserializeOwned>(&self, url: Url) -> StockResult<Res> {
        let request = self.client.get(url).bearer_auth(&self.access_token);
        self.execute(request).await
    }

    pub async fn send<Req: Serialize + ?Sized, Res: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: &Req,
    ) -> StockResult<Res> {
        let request = self
            .client
            .request(method, url)
            .bearer_auth(&self.access_token)
            .json(body);
        self.execute(request).await
    }

    async fn execute<Res: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> StockResult<Res> {
        let response = request
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| invalid_response(SERVICE, format!("Failed to parse response: {}", e)))
        } else {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            Err(StockError::Remote(error_from_response(status, &body)))
        }
    }
}

/// Map a non-success response to a [`RemoteError`], keeping the API's
/// reason string so retry classification can inspect it.
pub fn error_from_response(status: StatusCode, body: &str) -> RemoteError {
    let (reason, message) = match serde_json::from_str::<ApiError>(body) {
        Ok(api_error) => (api_error.error.reason(), api_error.error.message),
        Err(_) => (None, body.to_string()),
    };

    match status {
        StatusCode::TOO_MANY_REQUESTS => RemoteError::RateLimited {
            service: SERVICE.to_string(),
            message,
        },
        _ => RemoteError::RequestFailed {
            service: SERVICE.to_string(),
            status: status.as_u16(),
            reason,
            message,
        },
    }
}

impl std::fmt::Debug for GoogleSheetsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleSheetsClient")
            .field("base_url", &self.base_url)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_encodes_segments() {
        let client = GoogleSheetsClient::new("token");
        let url = client.url(&["sheet-id", "values", "'Pack List'!A1:C3"]).unwrap();
        assert!(url.as_str().starts_with(DEFAULT_BASE_URL));
        assert!(url.as_str().contains("/sheet-id/values/"));
        assert!(!url.as_str().contains(' '));
    }

    #[test]
    fn test_with_base_url_trims_slash() {
        let client = GoogleSheetsClient::new("t").with_base_url("http://localhost:8080/v4/");
        assert_eq!(client.base_url(), "http://localhost:8080/v4");
    }

    #[test]
    fn test_debug_redacts_token() {
        let client = GoogleSheetsClient::new("super-secret");
        assert!(!format!("{:?}", client).contains("super-secret"));
    }

    #[test]
    fn test_quota_403_is_retryable() {
        let body = r#"{"error":{"code":403,"message":"Quota exceeded","status":"PERMISSION_DENIED",
            "errors":[{"reason":"rateLimitExceeded","domain":"usageLimits"}]}}"#;
        let err = error_from_response(StatusCode::FORBIDDEN, body);
        assert_eq!(err.status(), Some(403));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_403_without_quota_reason_is_fatal() {
        let body = r#"{"error":{"code":403,"message":"The caller does not have access","status":"FORBIDDEN"}}"#;
        let err = error_from_response(StatusCode::FORBIDDEN, body);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_429_becomes_rate_limited() {
        let err = error_from_response(StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(matches!(err, RemoteError::RateLimited { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_unparseable_body_kept_as_message() {
        let err = error_from_response(StatusCode::INTERNAL_SERVER_ERROR, "<html>oops</html>");
        match err {
            RemoteError::RequestFailed { status, message, reason, .. } => {
                assert_eq!(status, 500);
                assert_eq!(message, "<html>oops</html>");
                assert_eq!(reason, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
