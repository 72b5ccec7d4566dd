//! End-to-end diagnosis flow tests against the public API: state store
//! cycles backed by SQLite persistence, and the edge handler contract.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use agriedge::diagnosis::remote::{RemoteCallFailure, VisionTransport};
use agriedge::edge::EdgeMethod;
use agriedge::{
    AgriStore, DiagnosisService, DiseaseCatalog, EdgeHandler, EdgeRequest, SqliteAdapter,
    StorePhase,
};

/// Transport that always replies with the same model text.
struct CannedTransport {
    reply: String,
}

impl CannedTransport {
    fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
        }
    }
}

impl VisionTransport for CannedTransport {
    fn request_diagnosis(
        &self,
        _api_key: &str,
        _image: &str,
    ) -> impl std::future::Future<Output = Result<String, RemoteCallFailure>> {
        let reply = self.reply.clone();
        async move { Ok(reply) }
    }
}

const VALID_REPLY: &str = r#"{"crop":"Grape","disease":"Downy mildew","severity":"moderate","confidence":0.87,"description":"Oily lesions on upper leaf surface","treatment":["Spray copper-based fungicide"],"prevention":["Prune for airflow"]}"#;

fn service(reply: &str) -> DiagnosisService<CannedTransport> {
    DiagnosisService::new(
        CannedTransport::new(reply),
        Arc::new(DiseaseCatalog::builtin()),
    )
    .with_fallback_delay(Duration::ZERO)
}

#[tokio::test]
async fn test_history_survives_store_restart() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("agriedge.db");

    {
        let adapter = Arc::new(SqliteAdapter::new(&db_path).unwrap());
        let mut store = AgriStore::new(service(VALID_REPLY), adapter);
        for i in 0..3 {
            store.set_image(Some(format!("image-{i}")));
            store.analyze().await.unwrap();
        }
        assert_eq!(store.history().len(), 3);
    }

    // Fresh store against the same database
    let adapter = Arc::new(SqliteAdapter::new(&db_path).unwrap());
    let store = AgriStore::new(service(VALID_REPLY), adapter);

    assert_eq!(store.history().len(), 3);
    assert_eq!(store.phase(), StorePhase::Idle);
    assert_eq!(store.history()[0].image_url, "image-2");
    assert_eq!(store.history()[2].image_url, "image-0");
    for record in store.history() {
        assert!(record.payload.confidence >= 0.0 && record.payload.confidence <= 1.0);
    }
}

#[tokio::test]
async fn test_history_bound_holds_across_restart() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("agriedge.db");

    {
        let adapter = Arc::new(SqliteAdapter::new(&db_path).unwrap());
        let mut store = AgriStore::new(service(VALID_REPLY), adapter);
        for i in 0..21 {
            store.set_image(Some(format!("image-{i}")));
            store.analyze().await.unwrap();
        }
    }

    let adapter = Arc::new(SqliteAdapter::new(&db_path).unwrap());
    let store = AgriStore::new(service(VALID_REPLY), adapter);

    assert_eq!(store.history().len(), 20);
    assert_eq!(store.history()[0].image_url, "image-20");
    assert!(
        !store.history().iter().any(|r| r.image_url == "image-0"),
        "oldest record must have been evicted"
    );
}

#[tokio::test]
async fn test_credential_survives_store_restart() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("agriedge.db");

    {
        let adapter = Arc::new(SqliteAdapter::new(&db_path).unwrap());
        let mut store = AgriStore::new(service(VALID_REPLY), adapter);
        store.set_api_key("sk-persisted");
    }

    let adapter = Arc::new(SqliteAdapter::new(&db_path).unwrap());
    let store = AgriStore::new(service(VALID_REPLY), adapter);
    assert_eq!(store.api_key(), Some("sk-persisted"));
}

#[tokio::test]
async fn test_edge_handler_full_contract() {
    let catalog = Arc::new(DiseaseCatalog::builtin());
    let svc = DiagnosisService::new(CannedTransport::new(VALID_REPLY), catalog.clone())
        .with_fallback_delay(Duration::ZERO);
    let handler = EdgeHandler::new(svc, catalog);

    // Preflight
    let preflight = handler.handle(EdgeRequest::options()).await;
    assert_eq!(preflight.status, 204);
    assert_eq!(preflight.header("Access-Control-Allow-Origin"), Some("*"));

    // Catalog listing, then a cache hit
    let listing = handler.handle(EdgeRequest::get()).await;
    assert_eq!(listing.status, 200);
    assert_eq!(listing.header("X-Cache"), Some("MISS"));
    let listing_body: serde_json::Value =
        serde_json::from_str(listing.body.as_deref().unwrap()).unwrap();
    assert!(listing_body["diseases"]
        .as_array()
        .unwrap()
        .iter()
        .any(|d| d == "rice_blast"));

    let cached = handler.handle(EdgeRequest::get()).await;
    assert_eq!(cached.header("X-Cache"), Some("HIT"));

    // Diagnosis with a credential routes through the canned remote reply
    let body = serde_json::json!({ "image": "leaf", "apiKey": "sk-test" }).to_string();
    let diagnosis = handler.handle(EdgeRequest::post(body)).await;
    assert_eq!(diagnosis.status, 200);
    let payload: serde_json::Value =
        serde_json::from_str(diagnosis.body.as_deref().unwrap()).unwrap();
    assert_eq!(payload["crop"], "Grape");
    assert_eq!(payload["severity"], "moderate");

    // Unsupported method gets the single documented error shape
    let rejected = handler
        .handle(EdgeRequest {
            method: EdgeMethod::Other("PUT".to_string()),
            body: None,
        })
        .await;
    assert_eq!(rejected.status, 500);
    let error_body: serde_json::Value =
        serde_json::from_str(rejected.body.as_deref().unwrap()).unwrap();
    assert_eq!(error_body["error"], "Diagnosis service error");
}
