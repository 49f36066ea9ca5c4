//! Keyed JSON storage over the browser's session and persistent stores.
//!
//! SYSTEM CONTEXT
//! ==============
//! Every read/write of `sessionStorage` and `localStorage` goes through a
//! [`KeyedStorage`] so the migration, listener, and store modules never touch
//! web-sys directly. Without the `hydrate` feature (SSR, native tests) the
//! browser backends are replaced by [`MemoryStorage`].
//!
//! ERROR HANDLING
//! ==============
//! Reads fail soft: an unavailable store or an unparseable value reads as
//! absent. Writes return [`StorageError`] so callers can keep their own
//! in-memory state consistent with what actually landed in the store.

#[cfg(test)]
#[path = "storage_test.rs"]
mod storage_test;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Which of the two browser stores a value lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageScope {
    /// Per-window `sessionStorage`, cleared when the window closes.
    Session,
    /// Origin-wide `localStorage`, shared across windows.
    Persistent,
}

impl fmt::Display for StorageScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session => f.write_str("session"),
            Self::Persistent => f.write_str("persistent"),
        }
    }
}

/// Errors surfaced by storage writes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// The store could not be reached (no window, storage disabled).
    #[error("{scope} storage is unavailable")]
    Unavailable { scope: StorageScope },

    /// The store refused the write (quota exceeded, security error).
    #[error("{scope} storage rejected write to `{key}`: {reason}")]
    Write { scope: StorageScope, key: String, reason: String },

    /// The value could not be encoded as JSON.
    #[error("could not serialize value for `{key}`: {reason}")]
    Serialize { key: String, reason: String },
}

/// String key-value substrate behind a [`KeyedStorage`].
pub trait StorageBackend: Send + Sync {
    fn scope(&self) -> StorageScope;

    /// Read the raw string stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unavailable`] if the store cannot be reached.
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable or rejects the write.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete `key`. Deleting an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable or rejects the write.
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Default)]
struct MemoryInner {
    items: BTreeMap<String, String>,
    rejecting_writes: bool,
}

/// In-memory store used for SSR and tests.
///
/// Clones share the same underlying map, which is how tests model two
/// windows sharing one origin-wide persistent store.
#[derive(Clone, Debug)]
pub struct MemoryStorage {
    scope: StorageScope,
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new(scope: StorageScope) -> Self {
        Self { scope, inner: Arc::new(Mutex::new(MemoryInner::default())) }
    }

    /// Make subsequent writes and removals fail, as a full or locked-down
    /// browser store would.
    pub fn reject_writes(&self, reject: bool) {
        self.lock().rejecting_writes = reject;
    }

    /// Keys currently held, in sorted order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.lock().items.keys().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn rejected(&self, key: &str) -> StorageError {
        StorageError::Write {
            scope: self.scope,
            key: key.to_owned(),
            reason: "writes rejected".into(),
        }
    }
}

impl StorageBackend for MemoryStorage {
    fn scope(&self) -> StorageScope {
        self.scope
    }

    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock().items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut inner = self.lock();
        if inner.rejecting_writes {
            return Err(self.rejected(key));
        }
        inner.items.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut inner = self.lock();
        if inner.rejecting_writes {
            return Err(self.rejected(key));
        }
        inner.items.remove(key);
        Ok(())
    }
}

/// `window.sessionStorage` / `window.localStorage` backend.
///
/// Holds no JS handles; the storage object is looked up on every call so the
/// backend stays `Send + Sync` for Leptos context.
#[cfg(feature = "hydrate")]
#[derive(Clone, Copy, Debug)]
pub struct BrowserStorage {
    scope: StorageScope,
}

#[cfg(feature = "hydrate")]
impl BrowserStorage {
    #[must_use]
    pub fn new(scope: StorageScope) -> Self {
        Self { scope }
    }

    fn storage(&self) -> Result<web_sys::Storage, StorageError> {
        let unavailable = StorageError::Unavailable { scope: self.scope };
        let window = web_sys::window().ok_or_else(|| unavailable.clone())?;
        let storage = match self.scope {
            StorageScope::Session => window.session_storage(),
            StorageScope::Persistent => window.local_storage(),
        };
        storage.ok().flatten().ok_or(unavailable)
    }

    fn write_error(&self, key: &str, cause: &wasm_bindgen::JsValue) -> StorageError {
        StorageError::Write {
            scope: self.scope,
            key: key.to_owned(),
            reason: format!("{cause:?}"),
        }
    }
}

#[cfg(feature = "hydrate")]
impl StorageBackend for BrowserStorage {
    fn scope(&self) -> StorageScope {
        self.scope
    }

    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.storage()?
            .get_item(key)
            .map_err(|_| StorageError::Unavailable { scope: self.scope })
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.storage()?
            .set_item(key, value)
            .map_err(|e| self.write_error(key, &e))
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.storage()?
            .remove_item(key)
            .map_err(|e| self.write_error(key, &e))
    }
}

/// Decode a stored JSON value; text that is not valid JSON reads as absent.
pub fn decode<T: DeserializeOwned>(raw: &str) -> Option<T> {
    serde_json::from_str(raw).ok()
}

/// Like [`decode`], but text that is not JSON (values written raw, such as
/// `Empresa` or `#ffffff`) is also accepted when `T` can be built from a
/// plain string.
pub fn decode_lenient<T: DeserializeOwned>(raw: &str) -> Option<T> {
    decode(raw).or_else(|| serde_json::from_value(serde_json::Value::String(raw.to_owned())).ok())
}

/// Typed JSON view over one [`StorageBackend`].
#[derive(Clone)]
pub struct KeyedStorage {
    backend: Arc<dyn StorageBackend>,
}

impl fmt::Debug for KeyedStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedStorage").field("scope", &self.scope()).finish()
    }
}

impl KeyedStorage {
    pub fn new(backend: impl StorageBackend + 'static) -> Self {
        Self { backend: Arc::new(backend) }
    }

    #[must_use]
    pub fn scope(&self) -> StorageScope {
        self.backend.scope()
    }

    /// Load and decode the value stored under `key`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        decode(&self.get_raw(key)?)
    }

    /// Load the value under `key`, accepting raw text for string types.
    pub fn get_lenient<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        decode_lenient(&self.get_raw(key)?)
    }

    /// Load the raw string stored under `key`.
    pub fn get_raw(&self, key: &str) -> Option<String> {
        match self.backend.get_item(key) {
            Ok(value) => value,
            Err(e) => {
                leptos::logging::warn!("storage read of `{key}` failed: {e}");
                None
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get_raw(key).is_some()
    }

    /// Serialize `value` as JSON and store it under `key`.
    ///
    /// Returns the text that was written.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the store rejects the write.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<String, StorageError> {
        let raw = serde_json::to_string(value)
            .map_err(|e| StorageError::Serialize { key: key.to_owned(), reason: e.to_string() })?;
        self.backend.set_item(key, &raw)?;
        Ok(raw)
    }

    /// Store `value` under `key` verbatim.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    pub fn set_raw(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.backend.set_item(key, value)
    }

    /// Delete `key`; absent keys are a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the removal.
    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.backend.remove_item(key)
    }
}

/// The pair of stores visible to one browser window.
#[derive(Clone, Debug)]
pub struct StorageSet {
    pub session: KeyedStorage,
    pub persistent: KeyedStorage,
}

impl StorageSet {
    #[must_use]
    pub fn new(session: KeyedStorage, persistent: KeyedStorage) -> Self {
        Self { session, persistent }
    }

    /// Fresh in-memory stores with nothing shared.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(
            KeyedStorage::new(MemoryStorage::new(StorageScope::Session)),
            KeyedStorage::new(MemoryStorage::new(StorageScope::Persistent)),
        )
    }

    /// Stores for the current window: the browser's own under `hydrate`,
    /// throwaway in-memory stores on the server.
    #[must_use]
    pub fn for_window() -> Self {
        #[cfg(feature = "hydrate")]
        {
            Self::new(
                KeyedStorage::new(BrowserStorage::new(StorageScope::Session)),
                KeyedStorage::new(BrowserStorage::new(StorageScope::Persistent)),
            )
        }
        #[cfg(not(feature = "hydrate"))]
        {
            Self::in_memory()
        }
    }

    #[must_use]
    pub fn scope(&self, scope: StorageScope) -> &KeyedStorage {
        match scope {
            StorageScope::Session => &self.session,
            StorageScope::Persistent => &self.persistent,
        }
    }
}
