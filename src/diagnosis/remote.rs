//! Remote vision-model call for crop disease diagnosis.
//!
//! Follows the chat-completions wire protocol: the model is instructed to
//! embed a diagnosis JSON object in its text reply, and this module locates
//! and parses that object. Every failure here is a [`RemoteCallFailure`];
//! the service layer converts all of them into a local fallback diagnosis.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::error;

use super::prompts::{diagnosis_system_prompt, diagnosis_user_prompt};
use super::types::DiagnosisPayload;

/// Fixed chat-completions endpoint for the qwen-vl model.
const QWEN_ENDPOINT: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1/chat/completions";

/// Vision model identifier.
const QWEN_MODEL: &str = "qwen-vl-plus";

/// Remote call timeout. A timeout is recovered exactly like any other
/// remote failure.
const REMOTE_TIMEOUT: Duration = Duration::from_secs(20);

/// Ways the remote diagnosis attempt can fail. None of these reach the
/// end user; they are all routed into the fallback path.
#[derive(Debug, Error)]
pub enum RemoteCallFailure {
    #[error("Vision API request failed: {0}")]
    Request(String),

    #[error("Vision API error status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed vision API response wrapper: {0}")]
    MalformedWrapper(String),

    #[error("No parsable JSON object in model reply")]
    NoJsonPayload,

    #[error("Model reply JSON does not match the diagnosis shape: {0}")]
    InvalidPayload(String),
}

/// Transport seam for the vision-model call.
///
/// The production implementation is [`QwenVlClient`]; tests inject canned
/// replies. Returns the model's raw text reply on success.
pub trait VisionTransport {
    fn request_diagnosis(
        &self,
        api_key: &str,
        image: &str,
    ) -> impl Future<Output = Result<String, RemoteCallFailure>>;
}

/// HTTP client for the qwen-vl chat-completions endpoint.
pub struct QwenVlClient {
    client: reqwest::Client,
    endpoint: String,
}

impl QwenVlClient {
    /// Build a client with the fixed endpoint and remote timeout.
    pub fn new() -> Result<Self, RemoteCallFailure> {
        let client = reqwest::Client::builder()
            .timeout(REMOTE_TIMEOUT)
            .build()
            .map_err(|e| RemoteCallFailure::Request(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: QWEN_ENDPOINT.to_string(),
        })
    }
}

impl VisionTransport for QwenVlClient {
    fn request_diagnosis(
        &self,
        api_key: &str,
        image: &str,
    ) -> impl Future<Output = Result<String, RemoteCallFailure>> {
        let body = serde_json::json!({
            "model": QWEN_MODEL,
            "messages": [
                {"role": "system", "content": diagnosis_system_prompt()},
                {
                    "role": "user",
                    "content": [
                        {"type": "image_url", "image_url": {"url": image}},
                        {"type": "text", "text": diagnosis_user_prompt()}
                    ]
                }
            ],
            "max_tokens": 1000
        });

        let request = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("content-type", "application/json")
            .json(&body);

        async move {
            let response = request.send().await.map_err(|e| {
                let msg = if e.is_timeout() {
                    format!("Vision API timeout after {}s", REMOTE_TIMEOUT.as_secs())
                } else {
                    format!("Vision API request failed: {e}")
                };
                error!("{}", msg);
                RemoteCallFailure::Request(msg)
            })?;

            let status = response.status();
            if !status.is_success() {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<failed to read body>".to_string());
                let truncated = truncate(&body, 1024);
                error!("Vision API error: {} - {}", status, truncated);
                return Err(RemoteCallFailure::Status {
                    status: status.as_u16(),
                    body: truncated,
                });
            }

            let wrapper: serde_json::Value = response.json().await.map_err(|e| {
                let msg = format!("Failed to parse response wrapper: {e}");
                error!("{}", msg);
                RemoteCallFailure::MalformedWrapper(msg)
            })?;

            wrapper["choices"][0]["message"]["content"]
                .as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| {
                    error!("No text content in vision API response");
                    RemoteCallFailure::MalformedWrapper(
                        "No text content in response".to_string(),
                    )
                })
        }
    }
}

/// Parse the model's free-text reply into a diagnosis payload.
///
/// Locates the first well-formed JSON object substring in the reply and
/// deserializes it. Confidence is clamped to [0, 1]; an unknown severity
/// string is a failure, not a default.
pub fn parse_vision_reply(content: &str) -> Result<DiagnosisPayload, RemoteCallFailure> {
    let object = extract_json_object(content).ok_or(RemoteCallFailure::NoJsonPayload)?;

    let mut payload: DiagnosisPayload = serde_json::from_str(object).map_err(|e| {
        let msg = format!("{e}. Extracted (first 500 chars): {}", truncate(object, 500));
        error!("Model reply rejected: {}", msg);
        RemoteCallFailure::InvalidPayload(msg)
    })?;

    payload.confidence = payload.confidence.clamp(0.0, 1.0);
    Ok(payload)
}

/// Find the first balanced `{...}` substring that parses as a JSON object.
///
/// Models often wrap the JSON in prose or markdown fences; a brace-depth
/// scan that respects string literals handles both.
fn extract_json_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut start = 0;
    while let Some(open) = text[start..].find('{').map(|i| start + i) {
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        for (offset, &byte) in bytes[open..].iter().enumerate() {
            if in_string {
                if escaped {
                    escaped = false;
                } else if byte == b'\\' {
                    escaped = true;
                } else if byte == b'"' {
                    in_string = false;
                }
                continue;
            }
            match byte {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        let candidate = &text[open..=open + offset];
                        if serde_json::from_str::<serde_json::Value>(candidate).is_ok() {
                            return Some(candidate);
                        }
                        break;
                    }
                }
                _ => {}
            }
        }
        start = open + 1;
    }
    None
}

fn truncate(text: &str, limit: usize) -> String {
    if text.len() > limit {
        let mut end = limit;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    } else {
        text.to_string()
    }
}
