use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::generation::{ErrorKind, GeneratedImage, GenerationFailure};

// Credentials appear only as their fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MockupEvent {
    GenerationStarted {
        sequence: u64,
        prompt_chars: usize,
        image_path: String,
        credential: String,
    },
    GenerationState {
        sequence: u64,
        state: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        media_type: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        data_chars: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_kind: Option<ErrorKind>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
    },
    GenerationDiscarded {
        sequence: u64,
        current_sequence: u64,
    },
    CredentialSaved {
        fingerprint: String,
        persisted: bool,
    },
    CredentialWarning {
        fingerprint: String,
        persisted: bool,
        warning: String,
    },
}

impl MockupEvent {
    pub fn progress(sequence: u64, state: &str) -> Self {
        Self::GenerationState {
            sequence,
            state: state.to_string(),
            media_type: None,
            data_chars: None,
            error_kind: None,
            message: None,
            status: None,
        }
    }

    pub fn succeeded(sequence: u64, image: &GeneratedImage) -> Self {
        Self::GenerationState {
            sequence,
            state: "success".to_string(),
            media_type: Some(image.media_type.clone()),
            data_chars: Some(image.data.len()),
            error_kind: None,
            message: None,
            status: None,
        }
    }

    pub fn failed(sequence: u64, failure: &GenerationFailure) -> Self {
        Self::GenerationState {
            sequence,
            state: "error".to_string(),
            media_type: None,
            data_chars: None,
            error_kind: Some(failure.kind),
            message: Some(failure.message.clone()),
            status: failure.status,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::GenerationStarted { .. } => "generation_started",
            Self::GenerationState { .. } => "generation_state",
            Self::GenerationDiscarded { .. } => "generation_discarded",
            Self::CredentialSaved { .. } => "credential_saved",
            Self::CredentialWarning { .. } => "credential_warning",
        }
    }
}

#[derive(Debug)]
pub struct EventLog {
    path: PathBuf,
    app_session: String,
    lock: Mutex<()>,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>, app_session: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            app_session: app_session.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, event: &MockupEvent) -> anyhow::Result<()> {
        let mut row = match serde_json::to_value(event)? {
            Value::Object(row) => row,
            other => return Err(anyhow!("event serialized to non-object: {other}")),
        };
        row.insert(
            "app_session".to_string(),
            Value::String(self.app_session.clone()),
        );
        row.insert("ts".to_string(), Value::String(now_utc_iso()));
        let line = serde_json::to_string(&row)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow!("event log lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

pub fn read_events(path: &Path) -> anyhow::Result<Vec<Value>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(raw
        .lines()
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .filter(Value::is_object)
        .collect())
}

pub(crate) fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
