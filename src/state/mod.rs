//! Shared client-side state modules.
//!
//! DESIGN
//! ======
//! State is split by concern (`session`, `preferences`) so components depend
//! only on the store they render from.

pub mod preferences;
pub mod session;
