use std::fmt;

use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_IMAGE_MEDIA_TYPE: &str = "image/png";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "validation_error")]
    Validation,
    #[serde(rename = "file_read_error")]
    FileRead,
    #[serde(rename = "transport_error")]
    Transport,
    #[serde(rename = "network_error")]
    Network,
    #[serde(rename = "malformed_response")]
    MalformedResponse,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation_error",
            Self::FileRead => "file_read_error",
            Self::Transport => "transport_error",
            Self::Network => "network_error",
            Self::MalformedResponse => "malformed_response",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct GenerationFailure {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl GenerationFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn file_read(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FileRead, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    pub fn network(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Network,
            message: message.into(),
            status: Some(status),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedResponse, message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub media_type: String,
    pub data: String,
}

impl EncodedImage {
    pub fn from_bytes(media_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            media_type: media_type.into(),
            data: BASE64.encode(bytes),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// Kept as the base64 text it arrived in; decoded on export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub media_type: String,
    pub data: String,
}

impl GeneratedImage {
    pub fn new(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into(),
            data: data.into(),
        }
    }

    pub fn bytes(&self) -> anyhow::Result<Vec<u8>> {
        BASE64
            .decode(self.data.trim().as_bytes())
            .context("generated image base64 decode failed")
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }

    pub fn extension(&self) -> &'static str {
        extension_for_media_type(&self.media_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationResult {
    Success(GeneratedImage),
    Failure(GenerationFailure),
}

impl GenerationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

pub fn extension_for_media_type(media_type: &str) -> &'static str {
    let lowered = media_type.trim().to_ascii_lowercase();
    if lowered.contains("jpeg") || lowered.contains("jpg") {
        return "jpg";
    }
    if lowered.contains("webp") {
        return "webp";
    }
    if lowered.contains("gif") {
        return "gif";
    }
    "png"
}
