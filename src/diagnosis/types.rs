//! Diagnosis result shapes shared by the service, store, and edge handler.

use serde::{Deserialize, Serialize};

use crate::catalog::Severity;

/// Diagnosis result produced by either the remote model or the fallback path.
///
/// This is the wire shape of a successful diagnosis response; the store adds
/// `id`, `timestamp`, and the image reference when recording it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisPayload {
    /// Crop name identified in the image.
    pub crop: String,
    /// Disease name, or "healthy".
    pub disease: String,
    /// One of healthy/mild/moderate/severe.
    pub severity: Severity,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// Free-text explanation of the finding.
    pub description: String,
    /// Ordered treatment steps; empty for healthy plants.
    pub treatment: Vec<String>,
    /// Ordered prevention steps.
    pub prevention: Vec<String>,
}

/// A completed diagnosis as recorded in the history log.
///
/// Records are immutable after creation; they leave the log only through
/// eviction past the history bound or an explicit clear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisRecord {
    /// Unique id, derived from the creation time.
    pub id: String,
    /// Creation instant, epoch milliseconds.
    pub timestamp: i64,
    /// Opaque handle for the source image, kept for display only.
    pub image_url: String,
    #[serde(flatten)]
    pub payload: DiagnosisPayload,
}
