//! Crop disease diagnosis: remote vision-model calls with a local fallback.

pub mod image_prep;
pub mod prompts;
pub mod remote;
pub mod service;
pub mod types;

pub use remote::{QwenVlClient, RemoteCallFailure, VisionTransport};
pub use service::{DiagnosisError, DiagnosisService, FallbackStrategy};
pub use types::{DiagnosisPayload, DiagnosisRecord};
