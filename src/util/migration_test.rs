use super::*;
use crate::util::storage::{KeyedStorage, MemoryStorage, StorageBackend, StorageScope};

struct Window {
    session: MemoryStorage,
    persistent: MemoryStorage,
    migrator: StorageMigrator,
}

fn window_sharing(persistent: &MemoryStorage) -> Window {
    let session = MemoryStorage::new(StorageScope::Session);
    let storages = StorageSet::new(
        KeyedStorage::new(session.clone()),
        KeyedStorage::new(persistent.clone()),
    );
    Window { session, persistent: persistent.clone(), migrator: StorageMigrator::new(storages) }
}

fn window() -> Window {
    window_sharing(&MemoryStorage::new(StorageScope::Persistent))
}

fn raw(storage: &MemoryStorage, key: &str) -> Option<String> {
    storage.get_item(key).unwrap()
}

// =============================================================
// migrate / migration_complete
// =============================================================

#[test]
fn moves_user_data_into_session_store() {
    let w = window();
    w.persistent.set_item("userData", r#"{"id":5,"name":"Ana"}"#).unwrap();

    assert!(w.migrator.migration_complete());

    assert_eq!(raw(&w.session, "userData").as_deref(), Some(r#"{"id":5,"name":"Ana"}"#));
    assert_eq!(raw(&w.persistent, "userData"), None);
    assert_eq!(raw(&w.session, "migration_completed").as_deref(), Some("true"));
    assert!(w.migrator.is_completed());
}

#[test]
fn moves_every_identity_key() {
    let w = window();
    w.persistent.set_item("userData", "{}").unwrap();
    w.persistent.set_item("user", r#"{"id":1}"#).unwrap();
    w.persistent.set_item("authToken", "tok").unwrap();
    w.persistent.set_item("companyName", "Acme").unwrap();

    let outcome = w.migrator.migrate().unwrap();

    assert_eq!(outcome.copied, vec!["userData", "user", "authToken"]);
    assert!(outcome.discarded.is_empty());
    assert_eq!(w.persistent.keys(), vec!["companyName".to_owned()]);
    assert_eq!(raw(&w.session, "authToken").as_deref(), Some("tok"));
}

#[test]
fn second_run_is_a_noop() {
    let w = window();
    w.persistent.set_item("user", r#"{"id":1}"#).unwrap();
    assert!(w.migrator.migration_complete());
    let after_first = w.session.keys();

    // A stale write from an old build in another window.
    w.persistent.set_item("user", r#"{"id":2}"#).unwrap();
    let outcome = w.migrator.migrate().unwrap();

    assert!(outcome.already_completed);
    assert_eq!(w.session.keys(), after_first);
    assert_eq!(raw(&w.session, "user").as_deref(), Some(r#"{"id":1}"#));
    assert!(w.migrator.is_completed());
}

#[test]
fn never_overwrites_existing_session_value() {
    let w = window();
    w.session.set_item("userData", r#"{"id":9}"#).unwrap();
    w.persistent.set_item("userData", r#"{"id":5}"#).unwrap();

    let outcome = w.migrator.migrate().unwrap();

    assert_eq!(outcome.discarded, vec!["userData"]);
    assert_eq!(raw(&w.session, "userData").as_deref(), Some(r#"{"id":9}"#));
    assert_eq!(raw(&w.persistent, "userData"), None);
}

#[test]
fn empty_stores_still_record_the_flag() {
    let w = window();
    let outcome = w.migrator.migrate().unwrap();
    assert_eq!(outcome, MigrationOutcome::default());
    assert!(w.migrator.is_completed());
}

#[test]
fn second_window_does_not_inherit_identity_after_first_migrates() {
    let shared = MemoryStorage::new(StorageScope::Persistent);
    shared.set_item("authToken", "tok").unwrap();
    let first = window_sharing(&shared);
    let second = window_sharing(&shared);

    assert!(first.migrator.migration_complete());
    assert!(second.migrator.migration_complete());

    assert_eq!(raw(&first.session, "authToken").as_deref(), Some("tok"));
    assert_eq!(raw(&second.session, "authToken"), None);
    assert!(second.migrator.is_completed());
}

#[test]
fn storage_failure_returns_false_and_leaves_flag_unset() {
    let w = window();
    w.persistent.set_item("user", r#"{"id":1}"#).unwrap();
    w.session.reject_writes(true);

    assert!(!w.migrator.migration_complete());
    assert!(!w.migrator.is_completed());
    assert!(matches!(w.migrator.migrate(), Err(MigrationError::Key { key: "user", .. })));
    assert_eq!(raw(&w.persistent, "user").as_deref(), Some(r#"{"id":1}"#));
}

#[test]
fn flag_write_failure_is_reported() {
    let w = window();
    w.session.reject_writes(true);
    assert!(matches!(w.migrator.migrate(), Err(MigrationError::Flag(_))));
}

// =============================================================
// check_current_session / clean_local_storage
// =============================================================

#[test]
fn check_current_session_reports_without_mutating() {
    let w = window();
    w.session.set_item("user", r#"{"id":1}"#).unwrap();
    w.persistent.set_item("user", r#"{"id":2}"#).unwrap();
    w.persistent.set_item("authToken", "tok").unwrap();

    let report = w.migrator.check_current_session();

    assert!(!report.migration_completed);
    assert!(report.has_conflicts());
    assert_eq!(report.persistent_leftovers(), vec!["user", "authToken"]);
    let user = report.keys.iter().find(|k| k.key == "user").unwrap();
    assert!(user.in_session && user.in_persistent && user.conflicting);
    assert_eq!(w.persistent.keys().len(), 2);
    assert_eq!(w.session.keys(), vec!["user".to_owned()]);
}

#[test]
fn identical_values_are_not_a_conflict() {
    let w = window();
    w.session.set_item("authToken", "tok").unwrap();
    w.persistent.set_item("authToken", "tok").unwrap();
    assert!(!w.migrator.check_current_session().has_conflicts());
}

#[test]
fn clean_local_storage_is_idempotent() {
    let w = window();
    w.persistent.set_item("user", "{}").unwrap();
    w.persistent.set_item("authToken", "tok").unwrap();
    w.persistent.set_item("baseFontSize", "16").unwrap();

    assert_eq!(w.migrator.clean_local_storage().unwrap(), 2);
    assert_eq!(w.migrator.clean_local_storage().unwrap(), 0);
    assert_eq!(w.persistent.keys(), vec!["baseFontSize".to_owned()]);
}
