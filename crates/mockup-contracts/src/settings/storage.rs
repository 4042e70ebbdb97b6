use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use serde_json::{Map, Value};

pub trait KeyValueStorage: Send {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()>;
}

// Every read goes back to disk and writes merge into the current file, so
// instances sharing a path see each other's keys.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStorage for JsonFileStorage {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let payload = read_json_object(&self.path).unwrap_or_default();
        Ok(payload
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut on_disk = read_json_object(&self.path).unwrap_or_default();
        if on_disk.get(key).and_then(Value::as_str) == Some(value) {
            return Ok(());
        }
        on_disk.insert(key.to_string(), Value::String(value.to_string()));
        write_json_object(&self.path, &on_disk)
            .with_context(|| format!("failed to write settings {}", self.path.display()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    values: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let values = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("memory storage lock poisoned"))?;
        Ok(values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("memory storage lock poisoned"))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

fn read_json_object(path: &Path) -> Option<Map<String, Value>> {
    let raw = std::fs::read_to_string(path).ok()?;
    let parsed: Value = serde_json::from_str(&raw).ok()?;
    parsed.as_object().cloned()
}

fn write_json_object(path: &Path, payload: &Map<String, Value>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(
        path,
        serde_json::to_string_pretty(&Value::Object(payload.clone()))?,
    )?;
    Ok(())
}
