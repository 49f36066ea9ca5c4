//! One-time move of identity keys out of the persistent store.
//!
//! Older portal builds kept the logged-in user in `localStorage`, which leaked
//! the session into every window of the origin. On startup each window moves
//! those keys into its own `sessionStorage` exactly once and records that it
//! did so under `migration_completed`.
//!
//! Rules:
//! - a value already in the session store is never overwritten (another
//!   window may have established it this session);
//! - the persistent copy is always removed, copied or not;
//! - failure is non-fatal: the caller keeps starting up and the user logs in
//!   again at worst.

#[cfg(test)]
#[path = "migration_test.rs"]
mod migration_test;

use crate::config::keys::{IDENTITY_KEYS, MIGRATION_COMPLETED};

use super::storage::{StorageError, StorageSet};

/// Errors raised while migrating identity keys.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MigrationError {
    #[error("failed to migrate `{key}`: {source}")]
    Key {
        key: &'static str,
        #[source]
        source: StorageError,
    },

    #[error("failed to record migration flag: {0}")]
    Flag(#[source] StorageError),
}

/// What a migration pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationOutcome {
    /// The flag was already set; nothing was touched.
    pub already_completed: bool,
    /// Keys copied from the persistent store into the session store.
    pub copied: Vec<&'static str>,
    /// Keys dropped from the persistent store because the session already held them.
    pub discarded: Vec<&'static str>,
}

/// Where each identity key currently lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPresence {
    pub key: &'static str,
    pub in_session: bool,
    pub in_persistent: bool,
    /// Both stores hold non-empty, different values.
    pub conflicting: bool,
}

/// Read-only snapshot from [`StorageMigrator::check_current_session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub migration_completed: bool,
    pub keys: Vec<KeyPresence>,
}

impl SessionReport {
    /// Identity keys still present in the persistent store.
    #[must_use]
    pub fn persistent_leftovers(&self) -> Vec<&'static str> {
        self.keys.iter().filter(|k| k.in_persistent).map(|k| k.key).collect()
    }

    #[must_use]
    pub fn has_conflicts(&self) -> bool {
        self.keys.iter().any(|k| k.conflicting)
    }
}

/// Moves identity keys from the persistent store into the session store.
#[derive(Clone, Debug)]
pub struct StorageMigrator {
    storages: StorageSet,
}

impl StorageMigrator {
    #[must_use]
    pub fn new(storages: StorageSet) -> Self {
        Self { storages }
    }

    /// Run the migration if this window has not yet done so.
    ///
    /// Returns `false` on failure; the error is logged, never propagated.
    pub fn migration_complete(&self) -> bool {
        match self.migrate() {
            Ok(outcome) => {
                if !outcome.already_completed {
                    leptos::logging::log!(
                        "identity migration done: copied={:?} discarded={:?}",
                        outcome.copied,
                        outcome.discarded
                    );
                }
                true
            }
            Err(e) => {
                leptos::logging::error!("identity migration failed: {e}");
                false
            }
        }
    }

    /// Run the migration and report what happened.
    ///
    /// # Errors
    ///
    /// Returns the first storage failure. Keys handled before the failure stay
    /// handled and the flag is not set, so the next start retries.
    pub fn migrate(&self) -> Result<MigrationOutcome, MigrationError> {
        let session = &self.storages.session;
        let persistent = &self.storages.persistent;

        if self.is_completed() {
            return Ok(MigrationOutcome { already_completed: true, ..MigrationOutcome::default() });
        }

        let mut outcome = MigrationOutcome::default();
        for key in IDENTITY_KEYS {
            if let Some(value) = persistent.get_raw(key) {
                if session.contains(key) {
                    outcome.discarded.push(key);
                } else {
                    session
                        .set_raw(key, &value)
                        .map_err(|source| MigrationError::Key { key, source })?;
                    outcome.copied.push(key);
                }
            }
            persistent.remove(key).map_err(|source| MigrationError::Key { key, source })?;
        }

        session.set(MIGRATION_COMPLETED, &true).map_err(MigrationError::Flag)?;
        Ok(outcome)
    }

    /// Whether this window already ran the migration.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.storages.session.get::<bool>(MIGRATION_COMPLETED).unwrap_or(false)
    }

    /// Describe where identity keys currently live. Does not mutate anything.
    pub fn check_current_session(&self) -> SessionReport {
        let keys = IDENTITY_KEYS
            .iter()
            .map(|&key| {
                let session = self.storages.session.get_raw(key);
                let persistent = self.storages.persistent.get_raw(key);
                let conflicting = match (&session, &persistent) {
                    (Some(s), Some(p)) => !s.is_empty() && !p.is_empty() && s != p,
                    _ => false,
                };
                KeyPresence {
                    key,
                    in_session: session.is_some(),
                    in_persistent: persistent.is_some(),
                    conflicting,
                }
            })
            .collect();
        let report = SessionReport { migration_completed: self.is_completed(), keys };
        if report.has_conflicts() {
            leptos::logging::warn!("identity keys conflict between stores: {:?}", report.keys);
        }
        report
    }

    /// Remove every identity key from the persistent store.
    ///
    /// Returns how many keys were present. Safe to call repeatedly.
    ///
    /// # Errors
    ///
    /// Returns the storage error of the first removal that fails.
    pub fn clean_local_storage(&self) -> Result<usize, StorageError> {
        let persistent = &self.storages.persistent;
        let mut removed = 0;
        for key in IDENTITY_KEYS {
            if persistent.contains(key) {
                persistent.remove(key)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
