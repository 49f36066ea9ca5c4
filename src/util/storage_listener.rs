//! Change notification for individual storage keys.
//!
//! Two channels feed a subscriber:
//! - the browser `storage` event, which only fires for writes made in *other*
//!   windows (hydrate only);
//! - the in-process [`StorageBus`], which carries same-window writes.
//!
//! DESIGN
//! ======
//! Same-window writers go through [`StorageListener::set`] (or the stores in
//! `state`), which always write the store and then broadcast on the bus, so a
//! write can never skip the broadcast. No ordering is promised between the
//! two channels.
//!
//! Listeners are RAII: dropping a [`BusListener`] or [`StorageListener`]
//! removes every callback it registered.

#[cfg(test)]
#[path = "storage_listener_test.rs"]
mod storage_listener_test;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use leptos::prelude::{GetUntracked, ReadSignal, RwSignal, Set};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::storage::{StorageError, StorageScope, StorageSet, decode_lenient};

/// Payload broadcast for a same-window write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageUpdate {
    pub key: String,
    /// Raw stored text, or `None` when the key was removed.
    pub new_value: Option<String>,
}

type Callback = Arc<dyn Fn(&StorageUpdate) + Send + Sync>;

#[derive(Default)]
struct BusInner {
    next_id: u64,
    listeners: Vec<(u64, String, Callback)>,
}

/// In-process broadcast channel keyed by storage key.
#[derive(Clone, Default)]
pub struct StorageBus {
    inner: Arc<Mutex<BusInner>>,
}

impl fmt::Debug for StorageBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageBus").field("listeners", &self.listener_count()).finish()
    }
}

impl StorageBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for updates to `key`.
    ///
    /// The callback stays registered until the returned guard is dropped.
    #[must_use = "dropping the guard unregisters the callback"]
    pub fn listen<F>(&self, key: &str, callback: F) -> BusListener
    where
        F: Fn(&StorageUpdate) + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.listeners.push((id, key.to_owned(), Arc::new(callback)));
        BusListener { bus: Arc::downgrade(&self.inner), id }
    }

    /// Notify every same-window listener of `key`.
    ///
    /// Returns how many listeners were notified.
    pub fn trigger_storage_update(&self, key: &str, new_value: Option<&str>) -> usize {
        // Snapshot under the lock, dispatch outside it: callbacks may
        // subscribe, unsubscribe, or write again.
        let targets: Vec<Callback> = self
            .lock()
            .listeners
            .iter()
            .filter(|(_, k, _)| k == key)
            .map(|(_, _, cb)| Arc::clone(cb))
            .collect();
        let update = StorageUpdate { key: key.to_owned(), new_value: new_value.map(str::to_owned) };
        for cb in &targets {
            cb(&update);
        }
        targets.len()
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    fn lock(&self) -> MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registration guard returned by [`StorageBus::listen`].
pub struct BusListener {
    bus: Weak<Mutex<BusInner>>,
    id: u64,
}

impl fmt::Debug for BusListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusListener").field("id", &self.id).finish()
    }
}

impl Drop for BusListener {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.listeners.retain(|(id, _, _)| *id != self.id);
        }
    }
}

/// Reactive view of one storage key.
///
/// Holds the decoded value in a signal, falling back to the default whenever
/// the key is absent, removed, or unparseable.
pub struct StorageListener<T: Send + Sync + 'static> {
    key: String,
    scope: StorageScope,
    value: RwSignal<T>,
    storages: StorageSet,
    bus: StorageBus,
    _bus_listener: BusListener,
    #[cfg(feature = "hydrate")]
    _native: Option<NativeStorageListener>,
}

impl<T> StorageListener<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Subscribe to `key` in the `scope` store.
    pub fn subscribe(
        key: &str,
        default: T,
        scope: StorageScope,
        storages: &StorageSet,
        bus: &StorageBus,
    ) -> Self {
        let initial = storages.scope(scope).get_lenient(key).unwrap_or_else(|| default.clone());
        let value = RwSignal::new(initial);

        let apply = Arc::new(move |raw: Option<&str>| {
            let next = raw.and_then(decode_lenient::<T>).unwrap_or_else(|| default.clone());
            value.set(next);
        });

        let bus_listener = {
            let apply = Arc::clone(&apply);
            bus.listen(key, move |update| apply(update.new_value.as_deref()))
        };

        #[cfg(feature = "hydrate")]
        let native = {
            let apply = Arc::clone(&apply);
            NativeStorageListener::install(key, scope, move |raw| apply(raw))
        };

        Self {
            key: key.to_owned(),
            scope,
            value,
            storages: storages.clone(),
            bus: bus.clone(),
            _bus_listener: bus_listener,
            #[cfg(feature = "hydrate")]
            _native: native,
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current value without tracking.
    #[must_use]
    pub fn get(&self) -> T {
        self.value.get_untracked()
    }

    /// Read-only signal for use in views.
    #[must_use]
    pub fn value(&self) -> ReadSignal<T> {
        self.value.read_only()
    }

    /// Write `value` to the store and broadcast it to same-window listeners.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the write fails; nothing is broadcast.
    pub fn set(&self, value: &T) -> Result<(), StorageError> {
        let raw = self.storages.scope(self.scope).set(&self.key, value)?;
        self.bus.trigger_storage_update(&self.key, Some(&raw));
        Ok(())
    }

    /// Remove the key and reset every same-window listener to its default.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the removal fails; nothing is broadcast.
    pub fn remove(&self) -> Result<(), StorageError> {
        self.storages.scope(self.scope).remove(&self.key)?;
        self.bus.trigger_storage_update(&self.key, None);
        Ok(())
    }
}

/// Window `storage` event registration for one key.
#[cfg(feature = "hydrate")]
struct NativeStorageListener {
    callback: wasm_bindgen::closure::Closure<dyn FnMut(web_sys::StorageEvent)>,
}

#[cfg(feature = "hydrate")]
impl NativeStorageListener {
    fn install(
        key: &str,
        scope: StorageScope,
        on_change: impl Fn(Option<&str>) + 'static,
    ) -> Option<Self> {
        use wasm_bindgen::JsCast;
        use wasm_bindgen::closure::Closure;

        let window = web_sys::window()?;
        let watched = key.to_owned();
        let callback = Closure::<dyn FnMut(web_sys::StorageEvent)>::new(
            move |event: web_sys::StorageEvent| {
                if !event_matches_scope(&event, scope) {
                    return;
                }
                match event.key() {
                    Some(changed) if changed == watched => {
                        on_change(event.new_value().as_deref());
                    }
                    Some(_) => {}
                    // `storage.clear()` in another window.
                    None => on_change(None),
                }
            },
        );
        if let Err(e) =
            window.add_event_listener_with_callback("storage", callback.as_ref().unchecked_ref())
        {
            leptos::logging::warn!("storage listener for `{key}` not installed: {e:?}");
            return None;
        }
        Some(Self { callback })
    }
}

#[cfg(feature = "hydrate")]
impl Drop for NativeStorageListener {
    fn drop(&mut self) {
        use wasm_bindgen::JsCast;

        if let Some(window) = web_sys::window() {
            let _ = window.remove_event_listener_with_callback(
                "storage",
                self.callback.as_ref().unchecked_ref(),
            );
        }
    }
}

#[cfg(feature = "hydrate")]
fn event_matches_scope(event: &web_sys::StorageEvent, scope: StorageScope) -> bool {
    let (Some(area), Some(window)) = (event.storage_area(), web_sys::window()) else {
        return false;
    };
    let expected = match scope {
        StorageScope::Session => window.session_storage(),
        StorageScope::Persistent => window.local_storage(),
    };
    expected.ok().flatten().is_some_and(|s| js_sys::Object::is(&area, &s))
}
