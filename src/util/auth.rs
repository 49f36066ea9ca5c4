//! Shared auth UI helpers.
//!
//! SYSTEM CONTEXT
//! ==============
//! Protected routes (invoices, companies, users) apply identical redirect
//! behavior when the session is missing or has just expired.

#[cfg(test)]
#[path = "auth_test.rs"]
mod auth_test;

use leptos::prelude::*;
use leptos_router::NavigateOptions;

use crate::state::session::{SessionState, SessionStore};

pub const LOGIN_PATH: &str = "/login";

/// Whether a protected route should send the user to the login page.
pub fn should_redirect_unauth(state: &SessionState) -> bool {
    !state.is_authenticated()
}

/// Redirect to `/login` now if the window is anonymous, and again whenever
/// the session ends (logout or `fetch_with_auth` expiry).
///
/// The redirect stays installed until the current reactive owner is cleaned up.
pub fn install_unauth_redirect<F>(session: &SessionStore, navigate: F)
where
    F: Fn(&str, NavigateOptions) + 'static,
{
    // Router navigation closures are not `Send`; park it in the owner's arena.
    let navigate = StoredValue::new_local(navigate);
    let redirect = move || {
        let _ = navigate.try_with_value(|nav| nav(LOGIN_PATH, NavigateOptions::default()));
    };

    if session.state().with_untracked(should_redirect_unauth) {
        redirect();
    }
    let guard = session.on_logout(redirect);
    on_cleanup(move || drop(guard));
}
