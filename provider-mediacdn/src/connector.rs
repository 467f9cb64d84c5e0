//! Media CDN API connector implementation
//!
//! Implements the `RemoteMediaStore` trait for a media CDN's upload/admin
//! HTTP API.

use async_trait::async_trait;
use bytes::Bytes;
use offload_bridge::error::Result;
use offload_bridge::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use offload_bridge::remote::{
    RemoteMediaStore, RemoteResource, TransformResult, UploadRequest, UploadResult,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::MediaCdnError;
use crate::types::{
    ContextRequest, CopyRequest, ErrorResponse, ResourceResponse, TransformRequest,
    TransformResponse, UploadResponse,
};

/// Maximum attempts for retryable API errors (429, 5xx)
const MAX_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds
const INITIAL_BACKOFF_MS: u64 = 250;

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Media CDN API connector
///
/// # Features
///
/// - Byte uploads with context metadata
/// - Server-side copy and context updates
/// - Eager transformations for reduced-quality renditions
/// - Exponential backoff on rate limiting and server errors
/// - Typed mapping of "already exists" and "restricted file type" responses
///
/// # Example
///
/// ```ignore
/// use provider_mediacdn::MediaCdnConnector;
/// use offload_bridge::remote::RemoteMediaStore;
///
/// let connector = MediaCdnConnector::new(http_client, "https://api.cdn.example.com", api_key);
/// let reachable = connector.probe().await;
/// ```
pub struct MediaCdnConnector {
    /// HTTP client for API requests
    http_client: Arc<dyn HttpClient>,

    /// API base URL, no trailing slash
    base_url: String,

    /// API key sent as a bearer token
    api_key: String,
}

impl MediaCdnConnector {
    /// Create a new connector
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: HttpRequest) -> HttpRequest {
        request
            .bearer_token(self.api_key.clone())
            .header("Accept", "application/json")
            .timeout(REQUEST_TIMEOUT)
    }

    /// Extract the API's error message from a failure response
    fn error_message(response: &HttpResponse) -> String {
        response
            .json::<ErrorResponse>()
            .map(|e| e.error.message)
            .unwrap_or_else(|_| format!("HTTP {}", response.status))
    }

    /// Map a non-success response to a typed error
    fn classify_failure(response: &HttpResponse) -> MediaCdnError {
        let message = Self::error_message(response);
        match response.status {
            401 | 403 => MediaCdnError::AuthenticationFailed(message),
            409 => MediaCdnError::AlreadyExists(message),
            415 => MediaCdnError::RestrictedFileType(message),
            status => MediaCdnError::ApiError {
                status_code: status,
                message,
            },
        }
    }

    /// Execute an API request, retrying 429 and 5xx with exponential backoff
    #[instrument(skip(self, request), fields(url = %request.url))]
    async fn execute_with_retry(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut attempt = 0;

        loop {
            let response = self
                .http_client
                .execute(self.authorized(request.clone()))
                .await
                .map_err(|e| MediaCdnError::NetworkError(e.to_string()))?;

            if response.is_success() {
                debug!(status = response.status, "API request succeeded");
                return Ok(response);
            }

            if response.status == 429 || response.is_server_error() {
                attempt += 1;
                if attempt >= MAX_RETRIES {
                    warn!(
                        status = response.status,
                        attempts = attempt,
                        "API request failed after retries"
                    );
                    return Err(Self::classify_failure(&response).into());
                }

                let backoff = INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1);
                warn!(
                    status = response.status,
                    attempt = attempt,
                    backoff_ms = backoff,
                    "Retryable API error, backing off"
                );
                tokio::time::sleep(Duration::from_millis(backoff)).await;
                continue;
            }

            return Err(Self::classify_failure(&response).into());
        }
    }
}

#[async_trait]
impl RemoteMediaStore for MediaCdnConnector {
    async fn upload(&self, request: UploadRequest) -> Result<UploadResult> {
        let context_json = serde_json::to_string(&request.context)
            .map_err(|e| MediaCdnError::ParseError(e.to_string()))?;

        let url = format!(
            "{}?public_id={}",
            self.url("/resources"),
            urlencode(&request.public_id)
        );

        let http_request = HttpRequest::new(HttpMethod::Post, url)
            .header("Content-Type", request.content_type.clone())
            .header("X-Resource-Context", context_json)
            .body(request.data.clone());

        let response = self.execute_with_retry(http_request).await?;
        let parsed: UploadResponse = response
            .json()
            .map_err(|e| MediaCdnError::ParseError(e.to_string()))?;

        debug!(public_id = %parsed.public_id, version = parsed.version, "Uploaded resource");
        Ok(UploadResult {
            public_id: parsed.public_id,
            version: parsed.version,
            delivery_type: parsed.delivery_type,
            bytes: parsed.bytes,
            url: parsed.secure_url,
        })
    }

    async fn copy(&self, from_public_id: &str, to_public_id: &str) -> Result<UploadResult> {
        let url = self.url(&format!("/resources/{}/copy", urlencode(from_public_id)));
        let http_request = HttpRequest::new(HttpMethod::Post, url).json(&CopyRequest {
            to_public_id,
        })?;

        let response = self.execute_with_retry(http_request).await?;
        let parsed: UploadResponse = response
            .json()
            .map_err(|e| MediaCdnError::ParseError(e.to_string()))?;

        Ok(UploadResult {
            public_id: parsed.public_id,
            version: parsed.version,
            delivery_type: parsed.delivery_type,
            bytes: parsed.bytes,
            url: parsed.secure_url,
        })
    }

    async fn context_update(
        &self,
        public_id: &str,
        context: HashMap<String, String>,
    ) -> Result<()> {
        let url = self.url(&format!("/resources/{}/context", urlencode(public_id)));
        let http_request =
            HttpRequest::new(HttpMethod::Post, url).json(&ContextRequest { context })?;

        self.execute_with_retry(http_request).await?;
        Ok(())
    }

    async fn explicit_transform(
        &self,
        public_id: &str,
        transformation: &str,
    ) -> Result<TransformResult> {
        let url = self.url(&format!("/resources/{}/transform", urlencode(public_id)));
        let http_request =
            HttpRequest::new(HttpMethod::Post, url).json(&TransformRequest { transformation })?;

        let response = self.execute_with_retry(http_request).await?;
        let parsed: TransformResponse = response
            .json()
            .map_err(|e| MediaCdnError::ParseError(e.to_string()))?;

        Ok(TransformResult {
            url: parsed.secure_url,
            bytes: parsed.bytes,
        })
    }

    async fn destroy(&self, public_id: &str, invalidate: bool) -> Result<()> {
        let url = format!(
            "{}?invalidate={}",
            self.url(&format!("/resources/{}", urlencode(public_id))),
            invalidate
        );
        let http_request = HttpRequest::new(HttpMethod::Delete, url);

        self.execute_with_retry(http_request).await?;
        debug!(public_id = %public_id, invalidate = invalidate, "Destroyed resource");
        Ok(())
    }

    async fn resource(&self, public_id: &str) -> Result<Option<RemoteResource>> {
        let url = self.url(&format!("/resources/{}", urlencode(public_id)));
        let http_request = HttpRequest::new(HttpMethod::Get, url);

        match self.execute_with_retry(http_request).await {
            Ok(response) => {
                let parsed: ResourceResponse = response
                    .json()
                    .map_err(|e| MediaCdnError::ParseError(e.to_string()))?;
                Ok(Some(RemoteResource {
                    public_id: parsed.public_id,
                    version: parsed.version,
                    delivery_type: parsed.delivery_type,
                    bytes: parsed.bytes,
                    url: parsed.secure_url,
                }))
            }
            Err(offload_bridge::BridgeError::RemoteApi { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn fetch(&self, public_id: &str, transformation: Option<&str>) -> Result<Bytes> {
        let path = match transformation {
            Some(t) => format!(
                "/delivery/{}/{}",
                urlencode(t),
                urlencode(public_id)
            ),
            None => format!("/delivery/{}", urlencode(public_id)),
        };
        let response = self
            .execute_with_retry(HttpRequest::new(HttpMethod::Get, self.url(&path)))
            .await?;
        Ok(response.body)
    }

    async fn probe(&self) -> bool {
        let request = HttpRequest::new(HttpMethod::Get, self.url("/ping"));
        match self.http_client.execute(self.authorized(request)).await {
            Ok(response) => response.is_success(),
            Err(_) => false,
        }
    }
}

/// Percent-encode a path or query component.
///
/// Public ids may contain `/` for folders; those stay intact because the API
/// treats them as path structure.
fn urlencode(component: &str) -> String {
    let mut out = String::with_capacity(component.len());
    for byte in component.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}
