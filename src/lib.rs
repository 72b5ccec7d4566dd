//! AgriEdge: crop disease diagnosis with a remote vision model and an
//! edge-cached local fallback.
//!
//! The flow is: an image is captured and normalized (`diagnosis::image_prep`),
//! the client state store (`store`) drives one diagnosis cycle through the
//! diagnosis service (`diagnosis`), which prefers the remote vision model and
//! falls back to the built-in catalog (`catalog`). The edge handler (`edge`)
//! exposes the same service behind the request/response contract, and the
//! history log and credential persist through a key-value adapter
//! (`persistence`).

pub mod catalog;
pub mod diagnosis;
pub mod edge;
pub mod error;
pub mod persistence;
pub mod store;

pub use catalog::{CatalogError, DiseaseCatalog, DiseaseProfile, Severity};
pub use diagnosis::{
    DiagnosisError, DiagnosisPayload, DiagnosisRecord, DiagnosisService, FallbackStrategy,
    QwenVlClient,
};
pub use edge::{EdgeHandler, EdgeRequest, EdgeResponse};
pub use error::AgriEdgeError;
pub use persistence::{KeyValueAdapter, MemoryAdapter, SqliteAdapter};
pub use store::{AgriStore, StorePhase};

/// Initialize tracing with env-filter control, defaulting to `info`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
