//! First-run setup, unlock, and lock semantics.

use tempfile::TempDir;
use think_core::Error;
use think_storage_libsql::{database_exists, setup, unlock};

#[tokio::test]
async fn first_run_setup_then_unlock() {
    let dir = TempDir::new().unwrap();
    assert!(!database_exists(dir.path()));

    // Setup creates the salt, derives the key, opens the DB, runs migrations
    let unlocked = setup(dir.path(), "hunter2").await.unwrap();
    assert!(database_exists(dir.path()));
    assert!(dir.path().join(".salt").exists());

    // Settings are usable right away
    unlocked
        .store
        .set_setting("whisper_model", "small")
        .await
        .unwrap();
    drop(unlocked);

    // Unlock after a "restart" sees the persisted data
    let reopened = unlock(dir.path(), "hunter2").await.unwrap();
    assert_eq!(
        reopened.store.get_setting("whisper_model").await.unwrap(),
        Some("small".to_string())
    );
}

#[tokio::test]
async fn wrong_password_fails_with_auth_invalid() {
    let dir = TempDir::new().unwrap();
    let unlocked = setup(dir.path(), "hunter2").await.unwrap();
    drop(unlocked);

    assert!(matches!(
        unlock(dir.path(), "wrong").await,
        Err(Error::AuthInvalid)
    ));
}

#[tokio::test]
async fn setup_refuses_existing_database() {
    let dir = TempDir::new().unwrap();
    let unlocked = setup(dir.path(), "hunter2").await.unwrap();
    drop(unlocked);

    assert!(matches!(
        setup(dir.path(), "other").await,
        Err(Error::Conflict(_))
    ));
}

#[tokio::test]
async fn unlock_without_database_is_rejected() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        unlock(dir.path(), "hunter2").await,
        Err(Error::Validation(_))
    ));
}

#[tokio::test]
async fn salt_survives_restarts() {
    let dir = TempDir::new().unwrap();
    let unlocked = setup(dir.path(), "hunter2").await.unwrap();
    let salt_before = std::fs::read(dir.path().join(".salt")).unwrap();
    drop(unlocked);

    let _ = unlock(dir.path(), "hunter2").await.unwrap();
    let salt_after = std::fs::read(dir.path().join(".salt")).unwrap();
    assert_eq!(salt_before, salt_after);
}
