//! Startup wiring: migration, stores, and context providers.
//!
//! The portal shell mounts [`PortalProvider`] above its router. Everything
//! below it can then `expect_context::<SessionStore>()` /
//! `expect_context::<PreferencesStore>()` (or use [`use_session`] and
//! [`use_preferences`]).

#[cfg(test)]
#[path = "app_test.rs"]
mod app_test;

use leptos::prelude::*;

use crate::config::PortalConfig;
use crate::state::preferences::PreferencesStore;
use crate::state::session::SessionStore;
use crate::util::migration::StorageMigrator;
use crate::util::storage::StorageSet;
use crate::util::storage_listener::StorageBus;
use crate::util::style::document_surface;

/// Handles created at startup.
#[derive(Clone)]
pub struct PortalState {
    pub storages: StorageSet,
    pub bus: StorageBus,
    pub session: SessionStore,
    pub preferences: PreferencesStore,
}

impl PortalState {
    /// Run the identity migration, then restore both stores from `storages`.
    ///
    /// Migration failure is logged and otherwise ignored.
    pub fn boot(storages: StorageSet, config: &PortalConfig) -> Self {
        let _ = StorageMigrator::new(storages.clone()).migration_complete();
        let bus = StorageBus::new();
        let session = SessionStore::new(&storages, bus.clone());
        let preferences = PreferencesStore::new(
            &storages,
            document_surface(),
            bus.clone(),
            config.preferences.clone(),
        );
        Self { storages, bus, session, preferences }
    }
}

/// Boot against the current window's storage and provide every store as context.
pub fn provide_portal_state(config: &PortalConfig) -> PortalState {
    let state = PortalState::boot(StorageSet::for_window(), config);
    provide_context(state.storages.clone());
    provide_context(state.bus.clone());
    provide_context(state.session.clone());
    provide_context(state.preferences.clone());
    state
}

/// Provides session, preference, and storage contexts to its children.
#[component]
pub fn PortalProvider(
    #[prop(optional)] config: Option<PortalConfig>,
    children: Children,
) -> impl IntoView {
    provide_portal_state(&config.unwrap_or_default());
    children()
}

/// The session store provided by [`PortalProvider`].
pub fn use_session() -> SessionStore {
    expect_context::<SessionStore>()
}

/// The preferences store provided by [`PortalProvider`].
pub fn use_preferences() -> PreferencesStore {
    expect_context::<PreferencesStore>()
}
