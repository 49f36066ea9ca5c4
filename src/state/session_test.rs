use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures::executor::block_on;
use leptos::prelude::GetUntracked;
use serde_json::json;

use super::*;
use crate::net::http::HttpMethod;
use crate::util::storage::{MemoryStorage, StorageBackend, StorageScope};

/// Transport returning a fixed status (or a failure) and recording requests.
struct ScriptedTransport {
    result: Result<u16, TransportError>,
    sent: RefCell<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    fn status(status: u16) -> Self {
        Self { result: Ok(status), sent: RefCell::new(Vec::new()) }
    }

    fn failing(message: &str) -> Self {
        Self {
            result: Err(TransportError(message.to_owned())),
            sent: RefCell::new(Vec::new()),
        }
    }
}

impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.sent.borrow_mut().push(request);
        self.result
            .clone()
            .map(|status| HttpResponse { status, body: "{}".to_owned() })
    }
}

/// Session store that can be told to refuse `authToken` writes only.
#[derive(Clone)]
struct TokenLockedStorage {
    inner: MemoryStorage,
    locked: Arc<AtomicBool>,
}

impl TokenLockedStorage {
    fn new() -> Self {
        Self {
            inner: MemoryStorage::new(StorageScope::Session),
            locked: Arc::new(AtomicBool::new(false)),
        }
    }

    fn lock_token(&self) {
        self.locked.store(true, Ordering::SeqCst);
    }
}

impl StorageBackend for TokenLockedStorage {
    fn scope(&self) -> StorageScope {
        StorageScope::Session
    }

    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if key == "authToken" && self.locked.load(Ordering::SeqCst) {
            return Err(StorageError::Write {
                scope: StorageScope::Session,
                key: key.to_owned(),
                reason: "quota exceeded".into(),
            });
        }
        self.inner.set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove_item(key)
    }
}

struct Fixture {
    session: MemoryStorage,
    storages: StorageSet,
    bus: StorageBus,
}

impl Fixture {
    fn new() -> Self {
        let session = MemoryStorage::new(StorageScope::Session);
        let storages = StorageSet::new(
            KeyedStorage::new(session.clone()),
            KeyedStorage::new(MemoryStorage::new(StorageScope::Persistent)),
        );
        Self { session, storages, bus: StorageBus::new() }
    }

    fn store(&self) -> SessionStore {
        SessionStore::new(&self.storages, self.bus.clone())
    }

    fn stored(&self, key: &str) -> Option<String> {
        self.storages.session.get_raw(key)
    }
}

fn ana() -> Value {
    json!({"id": 1, "email": "a@b.com"})
}

// =============================================================
// Initialization
// =============================================================

#[test]
fn starts_anonymous_with_empty_store() {
    let fx = Fixture::new();
    let store = fx.store();
    assert!(!store.is_authenticated());
    assert_eq!(store.user(), None);
    assert_eq!(store.auth_token(), "");
}

#[test]
fn restores_stored_session() {
    let fx = Fixture::new();
    fx.storages.session.set_raw("user", r#"{"id":1,"email":"a@b.com"}"#).unwrap();
    fx.storages.session.set_raw("authToken", "tok123").unwrap();

    let store = fx.store();

    assert!(store.is_authenticated());
    assert_eq!(store.user(), Some(ana()));
    assert_eq!(store.auth_token(), "tok123");
}

#[test]
fn corrupt_user_entry_is_cleared() {
    let fx = Fixture::new();
    fx.storages.session.set_raw("user", r#"{"id":1,"#).unwrap();
    fx.storages.session.set_raw("authToken", "tok123").unwrap();

    let store = fx.store();

    assert!(!store.is_authenticated());
    assert_eq!(fx.stored("user"), None);
    assert_eq!(fx.stored("authToken").as_deref(), Some("tok123"));
}

#[test]
fn token_without_user_starts_anonymous_and_stays_stored() {
    let fx = Fixture::new();
    fx.storages.session.set_raw("authToken", "orphan").unwrap();

    let store = fx.store();

    assert_eq!(store.state().get_untracked(), SessionState::default());
    assert_eq!(fx.stored("authToken").as_deref(), Some("orphan"));
}

#[test]
fn user_without_token_starts_anonymous_and_stays_stored() {
    let fx = Fixture::new();
    fx.storages.session.set_raw("user", r#"{"id":1}"#).unwrap();

    let store = fx.store();

    assert!(!store.is_authenticated());
    assert_eq!(store.user(), None);
    assert_eq!(fx.stored("user").as_deref(), Some(r#"{"id":1}"#));
}

#[test]
fn legacy_user_data_without_token_is_left_in_place() {
    let fx = Fixture::new();
    fx.storages.session.set_raw("userData", r#"{"id":5,"name":"Ana"}"#).unwrap();

    let store = fx.store();

    assert!(!store.is_authenticated());
    assert_eq!(fx.session.keys(), vec!["userData".to_owned()]);
    assert_eq!(fx.stored("userData").as_deref(), Some(r#"{"id":5,"name":"Ana"}"#));
}

#[test]
fn legacy_user_data_is_adopted() {
    let fx = Fixture::new();
    fx.storages.session.set_raw("userData", r#"{"id":5,"name":"Ana"}"#).unwrap();
    fx.storages.session.set_raw("authToken", "tok").unwrap();

    let store = fx.store();

    assert_eq!(store.user(), Some(json!({"id": 5, "name": "Ana"})));
    assert_eq!(fx.stored("user").as_deref(), Some(r#"{"id":5,"name":"Ana"}"#));
    assert_eq!(fx.stored("userData"), None);
}

// =============================================================
// login / logout
// =============================================================

#[test]
fn login_authenticates_and_mirrors() {
    let fx = Fixture::new();
    let store = fx.store();

    store.login(ana(), "tok123").unwrap();

    assert!(store.is_authenticated());
    assert_eq!(store.auth_token(), "tok123");
    assert_eq!(fx.storages.session.get::<Value>("user"), Some(ana()));
    assert_eq!(fx.stored("authToken").as_deref(), Some("tok123"));
    assert_eq!(fx.storages.persistent.get_raw("authToken"), None);
}

#[test]
fn login_without_user_is_rejected() {
    let fx = Fixture::new();
    let store = fx.store();

    let err = store.login(Value::Null, "tok").unwrap_err();

    assert_eq!(err, SessionError::IncompleteLogin { missing: "user" });
    assert!(!store.is_authenticated());
    assert!(fx.session.keys().is_empty());
}

#[test]
fn login_without_token_keeps_previous_session() {
    let fx = Fixture::new();
    let store = fx.store();
    store.login(ana(), "tok123").unwrap();
    let before = store.state().get_untracked();

    let err = store.login(json!({"id": 2}), "").unwrap_err();

    assert_eq!(err, SessionError::IncompleteLogin { missing: "token" });
    assert_eq!(store.state().get_untracked(), before);
    assert_eq!(fx.stored("authToken").as_deref(), Some("tok123"));
}

#[test]
fn login_storage_failure_leaves_state_unchanged() {
    let fx = Fixture::new();
    let store = fx.store();
    fx.session.reject_writes(true);

    let err = store.login(ana(), "tok").unwrap_err();

    assert!(matches!(err, SessionError::Storage(_)));
    assert!(!store.is_authenticated());
}

#[test]
fn failed_relogin_keeps_previous_session_stored() {
    let backend = TokenLockedStorage::new();
    let storages = StorageSet::new(
        KeyedStorage::new(backend.clone()),
        KeyedStorage::new(MemoryStorage::new(StorageScope::Persistent)),
    );
    let store = SessionStore::new(&storages, StorageBus::new());
    store.login(ana(), "tokA").unwrap();
    backend.lock_token();

    let err = store.login(json!({"id": 2}), "tokB").unwrap_err();

    assert!(matches!(err, SessionError::Storage(StorageError::Write { .. })));
    assert_eq!(store.user(), Some(ana()));
    assert_eq!(storages.session.get::<Value>("user"), Some(ana()));
    assert_eq!(storages.session.get_raw("authToken").as_deref(), Some("tokA"));

    let reloaded = SessionStore::new(&storages, StorageBus::new());
    assert_eq!(reloaded.state().get_untracked(), store.state().get_untracked());
}

#[test]
fn failed_first_login_leaves_no_user_entry() {
    let backend = TokenLockedStorage::new();
    let storages = StorageSet::new(
        KeyedStorage::new(backend.clone()),
        KeyedStorage::new(MemoryStorage::new(StorageScope::Persistent)),
    );
    let store = SessionStore::new(&storages, StorageBus::new());
    backend.lock_token();

    assert!(store.login(ana(), "tok").is_err());

    assert!(!store.is_authenticated());
    assert!(backend.inner.keys().is_empty());
}

#[test]
fn logout_clears_state_and_store() {
    let fx = Fixture::new();
    let store = fx.store();
    store.login(ana(), "tok123").unwrap();

    store.logout();

    assert!(!store.is_authenticated());
    assert_eq!(store.user(), None);
    assert_eq!(store.auth_token(), "");
    assert_eq!(fx.stored("user"), None);
    assert_eq!(fx.stored("authToken"), None);
}

#[test]
fn logout_when_anonymous_is_harmless() {
    let fx = Fixture::new();
    let store = fx.store();
    store.logout();
    assert!(!store.is_authenticated());
}

#[test]
fn session_changes_are_broadcast() {
    let fx = Fixture::new();
    let store = fx.store();
    let hits = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&hits);
    let _guard = fx.bus.listen("authToken", move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    store.login(ana(), "tok").unwrap();
    store.logout();

    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[test]
fn logout_notifies_until_guard_dropped() {
    let fx = Fixture::new();
    let store = fx.store();
    let hits = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&hits);
    let guard = store.on_logout(move || {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    store.login(ana(), "tok").unwrap();
    store.logout();
    drop(guard);
    store.logout();

    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn update_user_requires_session() {
    let fx = Fixture::new();
    let store = fx.store();
    assert_eq!(store.update_user(ana()), Err(SessionError::NoActiveSession));

    store.login(ana(), "tok").unwrap();
    store.update_user(json!({"id": 1, "email": "nuevo@b.com"})).unwrap();

    assert_eq!(store.user(), Some(json!({"id": 1, "email": "nuevo@b.com"})));
    assert_eq!(store.auth_token(), "tok");
    assert_eq!(fx.storages.session.get::<Value>("user"), store.user());
}

// =============================================================
// fetch_with_auth
// =============================================================

#[test]
fn fetch_without_session_sends_nothing() {
    let fx = Fixture::new();
    let store = fx.store();
    let transport = ScriptedTransport::status(200);

    let err = block_on(store.fetch_with_auth(
        &transport,
        "/api/facturas",
        RequestOptions::default(),
    ))
    .unwrap_err();

    assert_eq!(err, SessionError::NoActiveSession);
    assert!(transport.sent.borrow().is_empty());
}

#[test]
fn fetch_attaches_bearer_over_caller_header() {
    let fx = Fixture::new();
    let store = fx.store();
    store.login(ana(), "tok123").unwrap();
    let transport = ScriptedTransport::status(200);
    let options = RequestOptions::new(HttpMethod::Post)
        .header("authorization", "Bearer stale")
        .header("X-Empresa", "7");

    let resp = block_on(store.fetch_with_auth(&transport, "/api/facturas", options)).unwrap();

    assert_eq!(resp.status, 200);
    let sent = transport.sent.borrow();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].url, "/api/facturas");
    assert_eq!(sent[0].method, HttpMethod::Post);
    assert_eq!(sent[0].header("Authorization"), Some("Bearer tok123"));
    assert_eq!(sent[0].header("x-empresa"), Some("7"));
    let auth_headers = sent[0]
        .headers
        .iter()
        .filter(|(n, _)| n.eq_ignore_ascii_case("authorization"))
        .count();
    assert_eq!(auth_headers, 1);
}

#[test]
fn unauthorized_response_expires_session() {
    let fx = Fixture::new();
    let store = fx.store();
    store.login(json!({"id": 1, "email": "a@b.com"}), "tok123").unwrap();
    let transport = ScriptedTransport::status(401);

    let err = block_on(store.fetch_with_auth(
        &transport,
        "/api/usuarios",
        RequestOptions::default(),
    ))
    .unwrap_err();

    assert_eq!(err, SessionError::SessionExpired);
    assert!(err.to_string().contains("expired"));
    assert!(!store.is_authenticated());
    assert_eq!(store.user(), None);
    assert_eq!(store.auth_token(), "");
    assert_eq!(fx.stored("user"), None);
    assert_eq!(fx.stored("authToken"), None);
}

#[test]
fn other_error_statuses_are_returned_as_responses() {
    let fx = Fixture::new();
    let store = fx.store();
    store.login(ana(), "tok").unwrap();
    let transport = ScriptedTransport::status(500);

    let resp = block_on(store.fetch_with_auth(
        &transport,
        "/api/empresas",
        RequestOptions::default(),
    ))
    .unwrap();

    assert_eq!(resp.status, 500);
    assert!(store.is_authenticated());
}

#[test]
fn transport_failure_propagates_unchanged() {
    let fx = Fixture::new();
    let store = fx.store();
    store.login(ana(), "tok").unwrap();
    let transport = ScriptedTransport::failing("connection reset");

    let err = block_on(store.fetch_with_auth(
        &transport,
        "/api/empresas",
        RequestOptions::default(),
    ))
    .unwrap_err();

    assert_eq!(err, SessionError::Transport(TransportError("connection reset".into())));
    assert_eq!(err.to_string(), "request failed: connection reset");
    assert!(store.is_authenticated());
    assert_eq!(transport.sent.borrow().len(), 1);
}
