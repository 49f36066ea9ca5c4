//! # cfdi-portal
//!
//! Client-side session and preference layer for the CFDI invoicing portal
//! (Leptos + WASM).
//!
//! This crate owns the browser-storage side of the portal: the one-time move
//! of identity keys into `sessionStorage`, per-key change notification, the
//! branding preferences projected onto CSS variables, and the cached login
//! session with its authenticated fetch helper. Invoice, company, and user
//! screens consume these stores through Leptos context.

pub mod app;
pub mod config;
pub mod net;
pub mod state;
pub mod util;

/// Route panics and `log` output to the browser console.
#[cfg(feature = "hydrate")]
pub fn init_browser_logging() {
    console_error_panic_hook::set_once();
    if let Err(e) = console_log::init_with_level(log::Level::Debug) {
        leptos::logging::warn!("console logger already installed: {e}");
    }
}
