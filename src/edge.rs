//! Edge diagnosis handler: a transport-agnostic request/response function.
//!
//! Mirrors an edge-function deployment: one handler receives every request,
//! answers CORS preflight, serves POST diagnosis requests, and serves a
//! cacheable GET catalog listing. The handler never surfaces remote-model
//! failures; the only error shape it emits is the documented 500 body.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::catalog::DiseaseCatalog;
use crate::diagnosis::image_prep::MAX_IMAGE_BYTES;
use crate::diagnosis::{DiagnosisService, VisionTransport};

/// Catalog listing cache lifetime.
const CATALOG_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Request method, as far as the handler cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeMethod {
    Get,
    Post,
    Options,
    Other(String),
}

/// Incoming request to the edge handler.
#[derive(Debug, Clone)]
pub struct EdgeRequest {
    pub method: EdgeMethod,
    pub body: Option<String>,
}

impl EdgeRequest {
    pub fn get() -> Self {
        Self {
            method: EdgeMethod::Get,
            body: None,
        }
    }

    pub fn post(body: impl Into<String>) -> Self {
        Self {
            method: EdgeMethod::Post,
            body: Some(body.into()),
        }
    }

    pub fn options() -> Self {
        Self {
            method: EdgeMethod::Options,
            body: None,
        }
    }
}

/// Outgoing response from the edge handler.
#[derive(Debug, Clone)]
pub struct EdgeResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl EdgeResponse {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// POST body: the image payload and an optional caller credential.
#[derive(Debug, Deserialize)]
struct DiagnoseRequest {
    image: String,
    #[serde(rename = "apiKey", default)]
    api_key: Option<String>,
}

/// The single documented error shape, always with a 500 status.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

/// GET response: the supported taxonomy plus a generation timestamp.
#[derive(Debug, Serialize)]
struct CatalogListing {
    diseases: Vec<String>,
    crops: Vec<String>,
    timestamp: i64,
}

/// Single-slot TTL cache for the catalog listing. The listing has one fixed
/// key, so there is nothing to evict beyond expiry.
struct ListingCache {
    slot: Mutex<Option<(String, Instant)>>,
    ttl: Duration,
}

impl ListingCache {
    fn new(ttl: Duration) -> Self {
        Self {
            slot: Mutex::new(None),
            ttl,
        }
    }

    fn get(&self) -> Option<String> {
        let slot = self.slot.lock().unwrap();
        match slot.as_ref() {
            Some((body, cached_at)) if cached_at.elapsed() < self.ttl => Some(body.clone()),
            _ => None,
        }
    }

    fn put(&self, body: String) {
        *self.slot.lock().unwrap() = Some((body, Instant::now()));
    }
}

/// Edge handler for the diagnosis API.
pub struct EdgeHandler<T: VisionTransport> {
    service: DiagnosisService<T>,
    catalog: Arc<DiseaseCatalog>,
    listing_cache: ListingCache,
    server_key: Option<String>,
}

impl<T: VisionTransport> EdgeHandler<T> {
    pub fn new(service: DiagnosisService<T>, catalog: Arc<DiseaseCatalog>) -> Self {
        Self {
            service,
            catalog,
            listing_cache: ListingCache::new(CATALOG_CACHE_TTL),
            server_key: None,
        }
    }

    /// Deployment-side credential used when the request carries none.
    pub fn with_server_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.server_key = if key.is_empty() { None } else { Some(key) };
        self
    }

    #[cfg(test)]
    fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.listing_cache = ListingCache::new(ttl);
        self
    }

    /// Dispatch one request.
    pub async fn handle(&self, request: EdgeRequest) -> EdgeResponse {
        match request.method {
            EdgeMethod::Options => preflight_response(),
            EdgeMethod::Post => self.handle_diagnose(request.body.as_deref()).await,
            EdgeMethod::Get => self.handle_listing(),
            EdgeMethod::Other(method) => {
                warn!("Rejecting unsupported method: {}", method);
                error_response(format!("Unsupported method: {method}"))
            }
        }
    }

    async fn handle_diagnose(&self, body: Option<&str>) -> EdgeResponse {
        let body = match body {
            Some(body) => body,
            None => return error_response("Missing request body".to_string()),
        };

        let request: DiagnoseRequest = match serde_json::from_str(body) {
            Ok(request) => request,
            Err(e) => return error_response(format!("Malformed request body: {e}")),
        };

        if request.image.len() > MAX_IMAGE_BYTES {
            return error_response(format!(
                "Image payload too large: {} bytes (maximum {MAX_IMAGE_BYTES})",
                request.image.len()
            ));
        }

        // Request credential wins over the deployment credential; either may
        // be absent, in which case the fallback path serves the request.
        let credential = request
            .api_key
            .filter(|key| !key.is_empty())
            .or_else(|| self.server_key.clone());

        info!(
            "Diagnosis request: {} byte image, credential {}",
            request.image.len(),
            if credential.is_some() { "present" } else { "absent" }
        );

        match self.service.diagnose(&request.image, credential.as_deref()).await {
            Ok(payload) => match serde_json::to_string(&payload) {
                Ok(json) => json_response(200, json, &[]),
                Err(e) => error_response(format!("Failed to serialize diagnosis: {e}")),
            },
            Err(e) => error_response(e.to_string()),
        }
    }

    fn handle_listing(&self) -> EdgeResponse {
        if let Some(cached) = self.listing_cache.get() {
            return json_response(
                200,
                cached,
                &[("Cache-Control", "max-age=3600"), ("X-Cache", "HIT")],
            );
        }

        let listing = CatalogListing {
            diseases: self
                .catalog
                .disease_ids()
                .iter()
                .map(|id| id.to_string())
                .collect(),
            crops: self.catalog.crops().iter().map(|c| c.to_string()).collect(),
            timestamp: Utc::now().timestamp_millis(),
        };

        match serde_json::to_string(&listing) {
            Ok(json) => {
                self.listing_cache.put(json.clone());
                json_response(
                    200,
                    json,
                    &[("Cache-Control", "max-age=3600"), ("X-Cache", "MISS")],
                )
            }
            Err(e) => error_response(format!("Failed to serialize catalog listing: {e}")),
        }
    }
}

/// CORS headers attached to every response: any origin, the three supported
/// methods, and the content-type/authorization request headers.
fn cors_headers() -> Vec<(String, String)> {
    vec![
        (
            "Access-Control-Allow-Origin".to_string(),
            "*".to_string(),
        ),
        (
            "Access-Control-Allow-Methods".to_string(),
            "GET, POST, OPTIONS".to_string(),
        ),
        (
            "Access-Control-Allow-Headers".to_string(),
            "Content-Type, Authorization".to_string(),
        ),
    ]
}

fn preflight_response() -> EdgeResponse {
    EdgeResponse {
        status: 204,
        headers: cors_headers(),
        body: None,
    }
}

fn json_response(status: u16, body: String, extra_headers: &[(&str, &str)]) -> EdgeResponse {
    let mut headers = cors_headers();
    headers.push(("Content-Type".to_string(), "application/json".to_string()));
    for (key, value) in extra_headers {
        headers.push((key.to_string(), value.to_string()));
    }
    EdgeResponse {
        status,
        headers,
        body: Some(body),
    }
}

fn error_response(message: String) -> EdgeResponse {
    warn!("Diagnosis handler error: {}", message);
    let body = ErrorBody {
        error: "Diagnosis service error".to_string(),
        message: Some(message),
    };
    // ErrorBody serialization cannot fail; fall back to a minimal literal
    // rather than panic if it somehow does.
    let json = serde_json::to_string(&body)
        .unwrap_or_else(|_| r#"{"error":"Diagnosis service error"}"#.to_string());
    json_response(500, json, &[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnosis::testing::FakeTransport;

    const VALID_REPLY: &str = r#"{"crop":"Tea","disease":"Leaf spot","severity":"mild","confidence":0.91,"description":"Circular spots","treatment":["Remove affected leaves"],"prevention":["Improve drainage"]}"#;

    fn handler(transport: FakeTransport) -> EdgeHandler<FakeTransport> {
        let catalog = Arc::new(DiseaseCatalog::builtin());
        let service = DiagnosisService::new(transport, catalog.clone())
            .with_fallback_delay(Duration::ZERO);
        EdgeHandler::new(service, catalog)
    }

    fn parse_body(response: &EdgeResponse) -> serde_json::Value {
        serde_json::from_str(response.body.as_deref().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_preflight_returns_cors_and_empty_body() {
        let handler = handler(FakeTransport::replying(VALID_REPLY));
        let response = handler.handle(EdgeRequest::options()).await;

        assert_eq!(response.status, 204);
        assert!(response.body.is_none());
        assert_eq!(response.header("Access-Control-Allow-Origin"), Some("*"));
        assert_eq!(
            response.header("Access-Control-Allow-Methods"),
            Some("GET, POST, OPTIONS")
        );
        assert_eq!(
            response.header("Access-Control-Allow-Headers"),
            Some("Content-Type, Authorization")
        );
    }

    #[tokio::test]
    async fn test_post_without_credential_serves_fallback() {
        let transport = FakeTransport::replying(VALID_REPLY);
        let calls = transport.calls.clone();
        let handler = handler(transport);

        // 35-byte image: multiple of the 5-entry catalog -> index 0
        let body = serde_json::json!({ "image": "x".repeat(35) }).to_string();
        let response = handler.handle(EdgeRequest::post(body)).await;

        assert_eq!(response.status, 200);
        assert_eq!(response.header("Content-Type"), Some("application/json"));
        assert_eq!(response.header("Access-Control-Allow-Origin"), Some("*"));

        let payload = parse_body(&response);
        assert_eq!(payload["crop"], "Rice");
        assert_eq!(payload["disease"], "Rice blast");
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_post_with_credential_uses_remote() {
        let handler = handler(FakeTransport::replying(VALID_REPLY));
        let body =
            serde_json::json!({ "image": "abc", "apiKey": "sk-test" }).to_string();
        let response = handler.handle(EdgeRequest::post(body)).await;

        assert_eq!(response.status, 200);
        let payload = parse_body(&response);
        assert_eq!(payload["crop"], "Tea");
        assert_eq!(payload["confidence"], 0.91);
    }

    #[tokio::test]
    async fn test_post_with_unparsable_remote_reply_still_succeeds() {
        let handler = handler(FakeTransport::replying("no json here"));
        let body = serde_json::json!({ "image": "x".repeat(35), "apiKey": "sk-test" })
            .to_string();
        let response = handler.handle(EdgeRequest::post(body)).await;

        assert_eq!(response.status, 200, "remote failure must not surface");
        let payload = parse_body(&response);
        assert_eq!(payload["crop"], "Rice");
    }

    #[tokio::test]
    async fn test_server_key_applies_when_request_has_none() {
        let transport = FakeTransport::replying(VALID_REPLY);
        let calls = transport.calls.clone();
        let handler = handler(transport).with_server_key("sk-deployment");

        let body = serde_json::json!({ "image": "abc" }).to_string();
        let response = handler.handle(EdgeRequest::post(body)).await;

        assert_eq!(response.status, 200);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(parse_body(&response)["crop"], "Tea");
    }

    #[tokio::test]
    async fn test_malformed_post_body_yields_error_shape() {
        let handler = handler(FakeTransport::replying(VALID_REPLY));
        let response = handler.handle(EdgeRequest::post("{not json")).await;

        assert_eq!(response.status, 500);
        let body = parse_body(&response);
        assert_eq!(body["error"], "Diagnosis service error");
        assert!(body["message"].is_string());
        assert_eq!(response.header("Access-Control-Allow-Origin"), Some("*"));
    }

    #[tokio::test]
    async fn test_missing_post_body_yields_error_shape() {
        let handler = handler(FakeTransport::replying(VALID_REPLY));
        let request = EdgeRequest {
            method: EdgeMethod::Post,
            body: None,
        };
        let response = handler.handle(request).await;
        assert_eq!(response.status, 500);
        assert_eq!(parse_body(&response)["error"], "Diagnosis service error");
    }

    #[tokio::test]
    async fn test_oversized_image_is_rejected() {
        let handler = handler(FakeTransport::replying(VALID_REPLY));
        let body =
            serde_json::json!({ "image": "a".repeat(MAX_IMAGE_BYTES + 1) }).to_string();
        let response = handler.handle(EdgeRequest::post(body)).await;

        assert_eq!(response.status, 500);
        let parsed = parse_body(&response);
        assert!(parsed["message"]
            .as_str()
            .unwrap()
            .contains("too large"));
    }

    #[tokio::test]
    async fn test_listing_includes_taxonomy_and_timestamp() {
        let handler = handler(FakeTransport::replying(VALID_REPLY));
        let response = handler.handle(EdgeRequest::get()).await;

        assert_eq!(response.status, 200);
        assert_eq!(response.header("Cache-Control"), Some("max-age=3600"));

        let listing = parse_body(&response);
        assert_eq!(listing["diseases"].as_array().unwrap().len(), 5);
        assert_eq!(listing["crops"].as_array().unwrap().len(), 5);
        assert!(listing["timestamp"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_listing_cache_miss_then_hit() {
        let handler = handler(FakeTransport::replying(VALID_REPLY));

        let first = handler.handle(EdgeRequest::get()).await;
        assert_eq!(first.header("X-Cache"), Some("MISS"));

        let second = handler.handle(EdgeRequest::get()).await;
        assert_eq!(second.header("X-Cache"), Some("HIT"));
        assert_eq!(second.body, first.body, "cached body must be identical");
    }

    #[tokio::test]
    async fn test_listing_cache_expires() {
        let handler =
            handler(FakeTransport::replying(VALID_REPLY)).with_cache_ttl(Duration::ZERO);

        let first = handler.handle(EdgeRequest::get()).await;
        assert_eq!(first.header("X-Cache"), Some("MISS"));

        let second = handler.handle(EdgeRequest::get()).await;
        assert_eq!(second.header("X-Cache"), Some("MISS"));
    }

    #[tokio::test]
    async fn test_unsupported_method_yields_error_shape() {
        let handler = handler(FakeTransport::replying(VALID_REPLY));
        let request = EdgeRequest {
            method: EdgeMethod::Other("DELETE".to_string()),
            body: None,
        };
        let response = handler.handle(request).await;
        assert_eq!(response.status, 500);
        assert_eq!(parse_body(&response)["error"], "Diagnosis service error");
    }
}
