//! One-shot diagnosis from the command line: reads a leaf photo, runs a
//! full diagnosis cycle through the state store, and prints the record.
//!
//! The API credential comes from `QIWEN_API_KEY`; without it the diagnosis
//! takes the local fallback path.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use tracing::info;

use agriedge::error::AgriEdgeError;
use agriedge::{AgriStore, DiagnosisService, DiseaseCatalog, QwenVlClient, SqliteAdapter};

#[tokio::main]
async fn main() -> ExitCode {
    agriedge::init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), AgriEdgeError> {
    let image_path = std::env::args()
        .nth(1)
        .ok_or_else(|| AgriEdgeError::Usage("Usage: agriedge <image-path>".to_string()))?;

    let bytes = std::fs::read(&image_path).map_err(|e| {
        AgriEdgeError::Usage(format!("Failed to read image '{image_path}': {e}"))
    })?;

    let transport = QwenVlClient::new()
        .map_err(|e| AgriEdgeError::Usage(format!("Failed to build vision client: {e}")))?;
    let catalog = Arc::new(DiseaseCatalog::builtin());
    let service = DiagnosisService::new(transport, catalog);
    let adapter = Arc::new(SqliteAdapter::new(Path::new("agriedge.db"))?);

    let mut store = AgriStore::new(service, adapter);
    if let Ok(key) = std::env::var("QIWEN_API_KEY") {
        store.set_api_key(&key);
    }

    store.intake_image(&STANDARD.encode(&bytes))?;
    store.analyze().await?;

    let record = store
        .current_result()
        .ok_or_else(|| AgriEdgeError::Usage("Analysis finished without a result".to_string()))?;
    info!(
        "Diagnosis complete: {} / {} ({} records in history)",
        record.payload.crop,
        record.payload.disease,
        store.history().len()
    );

    match serde_json::to_string_pretty(record) {
        Ok(json) => println!("{json}"),
        Err(e) => return Err(AgriEdgeError::Usage(format!("Failed to render result: {e}"))),
    }
    Ok(())
}
