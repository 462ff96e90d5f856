use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use proxy_wasm::hostcalls;
use proxy_wasm::types::Status;

use crate::core::error::HttpError;

/// Attempts made by [`SharedDataStore::purge`] when another worker writes the entry concurrently.
pub const MAX_CAS_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The host rejected a shared data call.
    Host { key: String, status: String },
    /// The entry kept changing underneath every compare-and-swap attempt.
    Contended { key: String },
    /// A writer panicked while holding the store lock.
    Poisoned,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Host { key, status } => write!(f, "Shared data call for '{}' failed: {}", key, status),
            StoreError::Contended { key } => write!(f, "Entry '{}' changed during {} purge attempts", key, MAX_CAS_ATTEMPTS),
            StoreError::Poisoned => write!(f, "Cache store lock poisoned"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<StoreError> for HttpError {
    fn from(err: StoreError) -> Self {
        HttpError::new(500, err.to_string())
    }
}

/// Stored responses keyed by absolute request URI.
///
/// An empty entry is the same as no entry: it is never returned by `lookup`
/// and `purge` reports it as absent.
pub trait CacheStore: Send + Sync {
    /// Returns the stored entry for `uri`, if any.
    fn lookup(&self, uri: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Stores `entry` under `uri`, replacing what was there. An empty `entry` clears it.
    fn store(&self, uri: &str, entry: &[u8]) -> Result<(), StoreError>;

    /// Removes the entry for `uri`, returning whether one existed.
    fn purge(&self, uri: &str) -> Result<bool, StoreError>;
}

/// In-process store, for hosts that are not a proxy-wasm runtime and for tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryStore {
    fn lookup(&self, uri: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(uri).cloned())
    }

    fn store(&self, uri: &str, entry: &[u8]) -> Result<(), StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        if entry.is_empty() {
            entries.remove(uri);
        } else {
            entries.insert(uri.to_string(), entry.to_vec());
        }
        Ok(())
    }

    fn purge(&self, uri: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.remove(uri).is_some())
    }
}

/// Shared data calls of the host.
pub trait SharedData: Send + Sync {
    fn get(&self, key: &str) -> Result<(Option<Vec<u8>>, Option<u32>), Status>;

    fn set(&self, key: &str, value: Option<&[u8]>, cas: Option<u32>) -> Result<(), Status>;
}

/// The proxy-wasm runtime's shared data.
#[derive(Default)]
pub struct HostSharedData;

impl SharedData for HostSharedData {
    fn get(&self, key: &str) -> Result<(Option<Vec<u8>>, Option<u32>), Status> {
        hostcalls::get_shared_data(key)
    }

    fn set(&self, key: &str, value: Option<&[u8]>, cas: Option<u32>) -> Result<(), Status> {
        hostcalls::set_shared_data(key, value, cas)
    }
}

/// Store over the proxy-wasm shared data, visible to every worker of the host.
///
/// Shared data keys cannot be deleted, so a purged entry is overwritten with an
/// empty value and empty values read as absent.
pub struct SharedDataStore<H: SharedData = HostSharedData> {
    key_prefix: String,
    host: H,
}

impl SharedDataStore {
    pub fn new(key_prefix: &str) -> Self {
        SharedDataStore::with_host(key_prefix, HostSharedData)
    }
}

impl<H: SharedData> SharedDataStore<H> {
    pub fn with_host(key_prefix: &str, host: H) -> Self {
        SharedDataStore {
            key_prefix: key_prefix.to_string(),
            host,
        }
    }

    pub fn key(&self, uri: &str) -> String {
        format!("{}{}", self.key_prefix, uri)
    }

    fn read(&self, key: &str) -> Result<(Option<Vec<u8>>, Option<u32>), StoreError> {
        let (data, cas) = self.host.get(key).map_err(|status| host_error(key, status))?;
        Ok((data.filter(|data| !data.is_empty()), cas))
    }
}

impl<H: SharedData> CacheStore for SharedDataStore<H> {
    fn lookup(&self, uri: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let key = self.key(uri);
        self.read(&key).map(|(data, _)| data)
    }

    fn store(&self, uri: &str, entry: &[u8]) -> Result<(), StoreError> {
        let key = self.key(uri);
        self.host.set(&key, Some(entry), None).map_err(|status| host_error(&key, status))
    }

    fn purge(&self, uri: &str) -> Result<bool, StoreError> {
        let key = self.key(uri);
        let tombstone: &[u8] = &[];

        for _ in 0..MAX_CAS_ATTEMPTS {
            let cas = match self.read(&key)? {
                (Some(_), cas) => cas,
                (None, _) => return Ok(false),
            };

            match self.host.set(&key, Some(tombstone), cas) {
                Ok(()) => return Ok(true),
                Err(Status::CasMismatch) => continue,
                Err(status) => return Err(host_error(&key, status)),
            }
        }

        Err(StoreError::Contended { key })
    }
}

fn host_error(key: &str, status: Status) -> StoreError {
    StoreError::Host {
        key: key.to_string(),
        status: format!("{:?}", status),
    }
}
