use std::fmt;

use sha2::{Digest, Sha256};

use super::storage::KeyValueStorage;

pub const CREDENTIAL_STORAGE_KEY: &str = "gemini-api-key";

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    key_value: String,
    is_persisted: bool,
}

impl Credential {
    pub fn key_value(&self) -> &str {
        &self.key_value
    }

    pub fn is_persisted(&self) -> bool {
        self.is_persisted
    }

    pub fn is_blank(&self) -> bool {
        self.key_value.trim().is_empty()
    }

    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.key_value.as_bytes());
        hex::encode(digest)[..12].to_string()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("fingerprint", &self.fingerprint())
            .field("is_persisted", &self.is_persisted)
            .finish()
    }
}

pub struct CredentialStore {
    storage: Box<dyn KeyValueStorage>,
    current: Option<Credential>,
}

impl CredentialStore {
    pub fn load<S: KeyValueStorage + 'static>(storage: S) -> (Self, Option<String>) {
        let (current, warning) = match storage.get(CREDENTIAL_STORAGE_KEY) {
            Ok(value) => (
                value.map(|key_value| Credential {
                    key_value,
                    is_persisted: true,
                }),
                None,
            ),
            Err(err) => (
                None,
                Some(format!("Failed to read saved API key: {err:#}")),
            ),
        };
        (
            Self {
                storage: Box::new(storage),
                current,
            },
            warning,
        )
    }

    pub fn get(&self) -> Option<&Credential> {
        self.current.as_ref()
    }

    // A failed write keeps the in-memory key and marks it not persisted.
    pub fn set(&mut self, key_value: impl Into<String>) -> Option<String> {
        let key_value = key_value.into();
        let outcome = self.storage.set(CREDENTIAL_STORAGE_KEY, &key_value);
        let (is_persisted, warning) = match outcome {
            Ok(()) => (true, None),
            Err(err) => (
                false,
                Some(format!(
                    "API key kept for this session only; saving failed: {err:#}"
                )),
            ),
        };
        self.current = Some(Credential {
            key_value,
            is_persisted,
        });
        warning
    }

    pub fn adopt_transient(&mut self, key_value: impl Into<String>) -> bool {
        if self.current.is_some() {
            return false;
        }
        let key_value = key_value.into();
        if key_value.trim().is_empty() {
            return false;
        }
        self.current = Some(Credential {
            key_value,
            is_persisted: false,
        });
        true
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}
