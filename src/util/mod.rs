//! Utility helpers shared across client modules.
//!
//! SYSTEM CONTEXT
//! ==============
//! Utility modules isolate browser concerns (storage, storage events, style
//! variables) from the state stores so the stores stay testable natively.

pub mod auth;
pub mod migration;
pub mod storage;
pub mod storage_listener;
pub mod style;
