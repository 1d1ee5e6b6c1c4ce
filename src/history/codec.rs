//! Opaque string form of [`ChatHistory`] for the caller's context blob.
//!
//! The blob is standard base64 over a versioned JSON envelope. Decoding is
//! the exact inverse of encoding; anything else is rejected rather than
//! silently replaced with an empty history.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::ChatHistory;
use crate::core::errors::ApiError;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u32,
    history: &'a ChatHistory,
}

#[derive(Deserialize)]
struct Envelope {
    version: u32,
    history: ChatHistory,
}

pub fn encode(history: &ChatHistory) -> Result<String, ApiError> {
    let json = serde_json::to_vec(&EnvelopeRef {
        version: FORMAT_VERSION,
        history,
    })
    .map_err(ApiError::internal)?;
    Ok(STANDARD.encode(json))
}

pub fn decode(blob: &str) -> Result<ChatHistory, ApiError> {
    let bytes = STANDARD
        .decode(blob.trim())
        .map_err(|e| {
            ApiError::BadRequest(format!("Saved chat history is not valid base64: {}", e))
        })?;
    let envelope: Envelope = serde_json::from_slice(&bytes)
        .map_err(|e| ApiError::BadRequest(format!("Saved chat history is malformed: {}", e)))?;

    if envelope.version != FORMAT_VERSION {
        return Err(ApiError::BadRequest(format!(
            "Saved chat history has unsupported version {} (expected {})",
            envelope.version, FORMAT_VERSION
        )));
    }

    Ok(envelope.history)
}

impl ChatHistory {
    pub fn encode(&self) -> Result<String, ApiError> {
        encode(self)
    }

    pub fn decode(blob: &str) -> Result<Self, ApiError> {
        decode(blob)
    }
}
