//! Networking modules.
//!
//! SYSTEM CONTEXT
//! ==============
//! `http` defines the request/response types and the transport seam used by
//! `SessionStore::fetch_with_auth`.

pub mod http;
