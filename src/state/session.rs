//! Auth-session cache for the current browser window.
//!
//! SYSTEM CONTEXT
//! ==============
//! Holds whatever user record and bearer token the login endpoint returned,
//! mirrored into `sessionStorage` so a reload keeps the session but other
//! windows do not share it. Route guards (`util::auth`) and REST callers
//! (`fetch_with_auth`) read it; nothing here enforces authorization.
//!
//! ERROR HANDLING
//! ==============
//! - corrupt stored entries are dropped at startup and the window starts
//!   anonymous;
//! - incomplete logins are rejected with an error and leave state untouched;
//! - a 401 from the backend forces logout before the error reaches the caller.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use leptos::prelude::{ReadSignal, RwSignal, Set, Update, WithUntracked};
use serde_json::Value;

use crate::config::keys::{AUTH_TOKEN, USER, USER_DATA};
use crate::net::http::{HttpRequest, HttpResponse, HttpTransport, RequestOptions, TransportError};
use crate::util::storage::{KeyedStorage, StorageError, StorageSet};
use crate::util::storage_listener::{BusListener, StorageBus};

/// Errors surfaced by session operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// `login` was called without a user record or without a token.
    #[error("login rejected: missing {missing}")]
    IncompleteLogin { missing: &'static str },

    /// An authenticated operation was attempted while anonymous.
    #[error("no active session")]
    NoActiveSession,

    /// The backend rejected the bearer token; the session has been cleared.
    #[error("session expired, please log in again")]
    SessionExpired,

    /// The session could not be mirrored into `sessionStorage`.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The request never produced a response.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Authentication state: anonymous when `user` is `None`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionState {
    pub user: Option<Value>,
    pub auth_token: String,
}

impl SessionState {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some() && !self.auth_token.is_empty()
    }
}

/// Reactive session store backed by the session-scoped store.
#[derive(Clone, Debug)]
pub struct SessionStore {
    state: RwSignal<SessionState>,
    storage: KeyedStorage,
    bus: StorageBus,
}

impl SessionStore {
    /// Restore the session from the session-scoped store.
    pub fn new(storages: &StorageSet, bus: StorageBus) -> Self {
        let storage = storages.session.clone();
        let state = load_session(&storage);
        Self { state: RwSignal::new(state), storage, bus }
    }

    /// Read-only signal for views and route guards.
    #[must_use]
    pub fn state(&self) -> ReadSignal<SessionState> {
        self.state.read_only()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.with_untracked(SessionState::is_authenticated)
    }

    #[must_use]
    pub fn user(&self) -> Option<Value> {
        self.state.with_untracked(|s| s.user.clone())
    }

    #[must_use]
    pub fn auth_token(&self) -> String {
        self.state.with_untracked(|s| s.auth_token.clone())
    }

    /// Enter the authenticated state.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::IncompleteLogin`] if `user` is null or `token`
    /// is empty, and [`SessionError::Storage`] if the session could not be
    /// saved. State is unchanged in both cases.
    pub fn login(&self, user: Value, token: &str) -> Result<(), SessionError> {
        let missing = match (user.is_null(), token.is_empty()) {
            (true, true) => Some("user and token"),
            (true, false) => Some("user"),
            (false, true) => Some("token"),
            (false, false) => None,
        };
        if let Some(missing) = missing {
            leptos::logging::warn!("login rejected: missing {missing}");
            return Err(SessionError::IncompleteLogin { missing });
        }

        let previous_user = self.storage.get_raw(USER);
        let user_raw = self.storage.set(USER, &user)?;
        if let Err(e) = self.storage.set_raw(AUTH_TOKEN, token) {
            self.restore_user(previous_user.as_deref());
            return Err(e.into());
        }
        self.state.set(SessionState { user: Some(user), auth_token: token.to_owned() });
        self.bus.trigger_storage_update(USER, Some(&user_raw));
        self.bus.trigger_storage_update(AUTH_TOKEN, Some(token));
        Ok(())
    }

    /// Replace the cached user record, keeping the current token.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoActiveSession`] while anonymous,
    /// [`SessionError::IncompleteLogin`] for a null record, and
    /// [`SessionError::Storage`] if the record could not be saved.
    pub fn update_user(&self, user: Value) -> Result<(), SessionError> {
        if !self.is_authenticated() {
            return Err(SessionError::NoActiveSession);
        }
        if user.is_null() {
            return Err(SessionError::IncompleteLogin { missing: "user" });
        }
        let raw = self.storage.set(USER, &user)?;
        self.state.update(|s| s.user = Some(user));
        self.bus.trigger_storage_update(USER, Some(&raw));
        Ok(())
    }

    /// Return to the anonymous state. Always succeeds; storage cleanup
    /// failures are logged.
    pub fn logout(&self) {
        for key in [USER, AUTH_TOKEN, USER_DATA] {
            if let Err(e) = self.storage.remove(key) {
                leptos::logging::warn!("failed to clear `{key}` on logout: {e}");
            }
        }
        self.state.set(SessionState::default());
        self.bus.trigger_storage_update(USER, None);
        self.bus.trigger_storage_update(AUTH_TOKEN, None);
    }

    /// Run `callback` every time this window returns to the anonymous state,
    /// whether through [`logout`](Self::logout) or a 401 expiry.
    ///
    /// The callback stays registered until the returned guard is dropped.
    pub fn on_logout<F>(&self, callback: F) -> BusListener
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.bus.listen(AUTH_TOKEN, move |update| {
            if update.new_value.is_none() {
                callback();
            }
        })
    }

    /// Send `options` to `url` with the session's bearer token.
    ///
    /// The `Authorization` header overrides any caller-supplied one. A 401
    /// response logs the session out.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NoActiveSession`] while anonymous (nothing is sent);
    /// - [`SessionError::SessionExpired`] on a 401 response;
    /// - [`SessionError::Transport`] when no response arrives.
    pub async fn fetch_with_auth<T: HttpTransport>(
        &self,
        transport: &T,
        url: &str,
        options: RequestOptions,
    ) -> Result<HttpResponse, SessionError> {
        let token = self
            .state
            .with_untracked(|s| s.is_authenticated().then(|| s.auth_token.clone()));
        let Some(token) = token else {
            return Err(SessionError::NoActiveSession);
        };

        let request = HttpRequest::new(url, options)
            .with_header("Authorization", &format!("Bearer {token}"));
        match transport.send(request).await {
            Ok(resp) if resp.is_unauthorized() => {
                leptos::logging::warn!("{url} returned 401; clearing session");
                self.logout();
                Err(SessionError::SessionExpired)
            }
            Ok(resp) => Ok(resp),
            Err(e) => {
                leptos::logging::error!("{url}: {e}");
                Err(e.into())
            }
        }
    }

    /// Put back the `user` entry a failed login overwrote.
    fn restore_user(&self, previous: Option<&str>) {
        let restored = match previous {
            Some(raw) => self.storage.set_raw(USER, raw),
            None => self.storage.remove(USER),
        };
        if let Err(e) = restored {
            leptos::logging::error!("could not restore `{USER}` after failed login: {e}");
        }
    }
}

/// Read the stored session. Unparseable entries are dropped; a user without
/// a token (or the reverse) starts anonymous but stays stored.
fn load_session(storage: &KeyedStorage) -> SessionState {
    let auth_token = storage.get_raw(AUTH_TOKEN).unwrap_or_default();
    let user = load_user(storage, !auth_token.is_empty());

    if user.is_some() != !auth_token.is_empty() {
        leptos::logging::warn!("stored session is incomplete; starting anonymous");
        return SessionState::default();
    }
    SessionState { user, auth_token }
}

fn load_user(storage: &KeyedStorage, has_token: bool) -> Option<Value> {
    if let Some(raw) = storage.get_raw(USER) {
        return parse_user(storage, USER, &raw);
    }

    // Sessions migrated from older builds carry the record as `userData`.
    let raw = storage.get_raw(USER_DATA)?;
    let user = parse_user(storage, USER_DATA, &raw)?;
    if has_token {
        adopt_legacy_user(storage, &raw);
    }
    Some(user)
}

fn adopt_legacy_user(storage: &KeyedStorage, raw: &str) {
    if let Err(e) = storage.set_raw(USER, raw) {
        leptos::logging::warn!("could not adopt `{USER_DATA}` as `{USER}`: {e}");
        return;
    }
    if let Err(e) = storage.remove(USER_DATA) {
        leptos::logging::warn!("failed to clear `{USER_DATA}` after adopting it: {e}");
    }
}

fn parse_user(storage: &KeyedStorage, key: &str, raw: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(user) if !user.is_null() => Some(user),
        _ => {
            leptos::logging::warn!("discarding corrupt `{key}` entry");
            if let Err(e) = storage.remove(key) {
                leptos::logging::warn!("failed to clear corrupt `{key}`: {e}");
            }
            None
        }
    }
}
