//! Client state store: single source of truth for one diagnosis cycle.
//!
//! Owns the current image, result, history log, and credential, and
//! coordinates the diagnosis service and persistence adapter. Collaborators
//! are injected at construction; there is no ambient global state.
//!
//! State machine per cycle:
//! Idle -> set_image -> ImageSet -> analyze -> Analyzing -> ResultReady
//! -> clear_result -> Idle. A failed service call (the only failure the
//! service surfaces) returns to ImageSet with the error indicator set.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::warn;

use crate::diagnosis::image_prep::{prepare_image, IntakeError};
use crate::diagnosis::{DiagnosisError, DiagnosisRecord, DiagnosisService, VisionTransport};
use crate::persistence::KeyValueAdapter;

/// Persistence key for the serialized history snapshot.
pub const HISTORY_KEY: &str = "agri_history";

/// Persistence key for the API credential.
pub const API_KEY_KEY: &str = "qiwen_api_key";

/// History log bound: only the most recent entries are kept.
pub const HISTORY_LIMIT: usize = 20;

/// Observable phase of the diagnosis cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorePhase {
    Idle,
    ImageSet,
    Analyzing,
    ResultReady,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No image selected for analysis")]
    NoImage,

    #[error("An analysis is already in progress")]
    AnalysisInFlight,

    #[error("Diagnosis failed: {0}")]
    Diagnosis(#[from] DiagnosisError),
}

/// Clears the in-flight flag when the analysis future completes or is
/// dropped at its suspension point.
struct InFlightGuard<'a>(&'a mut bool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        *self.0 = false;
    }
}

/// UI-facing state store for the diagnosis flow.
pub struct AgriStore<T: VisionTransport> {
    service: DiagnosisService<T>,
    adapter: Arc<dyn KeyValueAdapter>,
    current_image: Option<String>,
    current_result: Option<DiagnosisRecord>,
    is_analyzing: bool,
    error: Option<String>,
    history: Vec<DiagnosisRecord>,
    api_key: Option<String>,
    next_seq: u64,
}

impl<T: VisionTransport> AgriStore<T> {
    /// Build a store, loading the persisted history snapshot and credential.
    ///
    /// Storage faults at startup are non-fatal: the store logs and begins
    /// with empty in-memory state.
    pub fn new(service: DiagnosisService<T>, adapter: Arc<dyn KeyValueAdapter>) -> Self {
        let history = match adapter.get(HISTORY_KEY) {
            Ok(Some(snapshot)) => serde_json::from_str(&snapshot).unwrap_or_else(|e| {
                warn!("Discarding unreadable history snapshot: {}", e);
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Failed to load history, starting empty: {}", e);
                Vec::new()
            }
        };

        let api_key = match adapter.get(API_KEY_KEY) {
            Ok(key) => key.filter(|k| !k.is_empty()),
            Err(e) => {
                warn!("Failed to load credential: {}", e);
                None
            }
        };

        Self {
            service,
            adapter,
            current_image: None,
            current_result: None,
            is_analyzing: false,
            error: None,
            history,
            api_key,
            next_seq: 0,
        }
    }

    /// Set (or clear) the current image, discarding any prior result and
    /// error indicator.
    pub fn set_image(&mut self, image: Option<String>) {
        self.current_image = image;
        self.current_result = None;
        self.error = None;
    }

    /// Validate and normalize a raw captured image, then set it as current.
    ///
    /// Invalid input (non-image file, oversized payload) is surfaced
    /// immediately; no request is sent and the store state is unchanged.
    pub fn intake_image(&mut self, raw: &str) -> Result<(), IntakeError> {
        let prepared = prepare_image(raw)?;
        self.set_image(Some(prepared));
        Ok(())
    }

    /// Run one diagnosis cycle for the current image.
    ///
    /// Exactly one analysis may be in flight per store; a second call while
    /// analyzing is rejected. On success the new record is prepended to the
    /// history, the history is truncated to [`HISTORY_LIMIT`], and the
    /// snapshot is persisted before the observable history is updated. On
    /// the service's only failure (empty catalog) the store returns to
    /// ImageSet with the error indicator set.
    ///
    /// Dropping the returned future mid-analysis (timeout, navigation away)
    /// releases the in-flight flag; the store is immediately usable again.
    pub async fn analyze(&mut self) -> Result<(), StoreError> {
        if self.is_analyzing {
            return Err(StoreError::AnalysisInFlight);
        }
        let image = self.current_image.clone().ok_or(StoreError::NoImage)?;

        self.error = None;
        self.is_analyzing = true;

        let outcome = {
            let _in_flight = InFlightGuard(&mut self.is_analyzing);
            self.service.diagnose(&image, self.api_key.as_deref()).await
        };

        let payload = match outcome {
            Ok(payload) => payload,
            Err(e) => {
                self.error = Some(e.to_string());
                return Err(e.into());
            }
        };

        let timestamp = Utc::now().timestamp_millis();
        self.next_seq += 1;
        let record = DiagnosisRecord {
            id: format!("{}-{}", timestamp, self.next_seq),
            timestamp,
            image_url: image,
            payload,
        };

        let mut updated = Vec::with_capacity(self.history.len() + 1);
        updated.push(record.clone());
        updated.extend(self.history.iter().cloned());
        updated.truncate(HISTORY_LIMIT);

        // Persist the snapshot before exposing it, so observable state is
        // never ahead of durable state. A storage fault degrades to
        // in-memory-only for this session.
        match serde_json::to_string(&updated) {
            Ok(snapshot) => {
                if let Err(e) = self.adapter.set(HISTORY_KEY, &snapshot) {
                    warn!("Failed to persist history, continuing in memory: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize history snapshot: {}", e),
        }

        self.history = updated;
        self.current_result = Some(record);
        Ok(())
    }

    /// Return to the idle state, clearing the image and result.
    pub fn clear_result(&mut self) {
        self.current_image = None;
        self.current_result = None;
        self.error = None;
    }

    /// Persist and apply the API credential. An empty key clears the
    /// credential, so subsequent diagnoses take the fallback path.
    pub fn set_api_key(&mut self, key: &str) {
        if let Err(e) = self.adapter.set(API_KEY_KEY, key) {
            warn!("Failed to persist credential: {}", e);
        }
        self.api_key = if key.is_empty() {
            None
        } else {
            Some(key.to_string())
        };
    }

    /// Empty the history log and its persisted snapshot. Idempotent.
    pub fn clear_history(&mut self) {
        if let Err(e) = self.adapter.remove(HISTORY_KEY) {
            warn!("Failed to remove persisted history: {}", e);
        }
        self.history.clear();
    }

    pub fn phase(&self) -> StorePhase {
        if self.is_analyzing {
            StorePhase::Analyzing
        } else if self.current_result.is_some() {
            StorePhase::ResultReady
        } else if self.current_image.is_some() {
            StorePhase::ImageSet
        } else {
            StorePhase::Idle
        }
    }

    pub fn current_image(&self) -> Option<&str> {
        self.current_image.as_deref()
    }

    pub fn current_result(&self) -> Option<&DiagnosisRecord> {
        self.current_result.as_ref()
    }

    pub fn history(&self) -> &[DiagnosisRecord] {
        &self.history
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }
}
