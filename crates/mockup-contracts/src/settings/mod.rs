mod credentials;
mod storage;

pub use credentials::{Credential, CredentialStore, CREDENTIAL_STORAGE_KEY};
pub use storage::{JsonFileStorage, KeyValueStorage, MemoryStorage};
