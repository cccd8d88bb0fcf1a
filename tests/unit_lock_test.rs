// tests/unit_lock_test.rs

use restatic::core::lock::LockManager;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn manager(tmp: &TempDir) -> LockManager {
    LockManager::new(tmp.path().join("locks")).unwrap()
}

#[test]
fn acquire_reports_holder_fields() {
    let tmp = TempDir::new().unwrap();
    let locks = manager(&tmp);

    let result = locks.acquire("key1", 30).unwrap();
    assert!(result.locked);
    assert!(!result.already_locked);
    let lock_id = result.lock_id.expect("lock id must be set");
    assert!(!lock_id.is_empty());
    assert!(result.expires_at.unwrap() > 0);
}

#[test]
fn second_acquire_reports_already_locked() {
    let tmp = TempDir::new().unwrap();
    let locks = manager(&tmp);

    assert!(locks.acquire("key1", 30).unwrap().locked);
    let second = locks.acquire("key1", 30).unwrap();
    assert!(!second.locked);
    assert!(second.already_locked);
    assert!(second.lock_id.is_none());
}

#[test]
fn release_returns_observed_lock_id() {
    let tmp = TempDir::new().unwrap();
    let locks = manager(&tmp);

    let acquired = locks.acquire("key1", 30).unwrap();
    let released_id = locks.release("key1");
    assert_eq!(released_id, acquired.lock_id);
    assert!(!locks.is_locked("key1"));

    // Releasing an unheld key is harmless.
    assert_eq!(locks.release("key1"), None);
}

#[test]
fn keys_lock_independently() {
    let tmp = TempDir::new().unwrap();
    let locks = manager(&tmp);

    assert!(locks.acquire("key1", 30).unwrap().locked);
    assert!(locks.acquire("key2", 30).unwrap().locked);
    assert!(locks.is_locked("key1"));
    assert!(locks.is_locked("key2"));
}

#[test]
fn zero_timeout_lock_is_immediately_reclaimable() {
    let tmp = TempDir::new().unwrap();
    let locks = manager(&tmp);

    assert!(locks.acquire("key1", 0).unwrap().locked);
    // The artifact expired the instant it was written; the next acquirer
    // reclaims it.
    let second = locks.acquire("key1", 30).unwrap();
    assert!(second.locked);
}

#[test]
fn expired_lock_is_reclaimed_after_its_timeout() {
    let tmp = TempDir::new().unwrap();
    let locks = manager(&tmp);

    assert!(locks.acquire("key1", 1).unwrap().locked);
    assert!(locks.is_locked("key1"));
    std::thread::sleep(Duration::from_millis(1100));
    assert!(!locks.is_locked("key1"));
    assert!(locks.acquire("key1", 30).unwrap().locked);
}

#[test]
fn corrupt_artifact_is_reclaimed() {
    let tmp = TempDir::new().unwrap();
    let locks = manager(&tmp);
    locks.acquire("key1", 300).unwrap();

    // Vandalize the single lock artifact on disk.
    let dir = tmp.path().join("locks");
    let artifact = std::fs::read_dir(&dir)
        .unwrap()
        .flatten()
        .next()
        .expect("one lock artifact")
        .path();
    std::fs::write(&artifact, b"garbage").unwrap();

    // A freshly written unparseable artifact could be a holder still
    // publishing, so it stays held until the grace passes.
    assert!(locks.is_locked("key1"));
    std::thread::sleep(Duration::from_millis(2100));
    assert!(!locks.is_locked("key1"));
    assert!(locks.acquire("key1", 30).unwrap().locked);
}

#[tokio::test]
async fn concurrent_acquirers_admit_exactly_one() {
    let tmp = TempDir::new().unwrap();
    let locks = Arc::new(manager(&tmp));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let locks = locks.clone();
        handles.push(tokio::spawn(async move {
            locks.acquire("hot", 30).unwrap().locked
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn acquire_with_wait_times_out_against_a_live_holder() {
    let tmp = TempDir::new().unwrap();
    let locks = manager(&tmp);
    assert!(locks.acquire("key1", 30).unwrap().locked);

    let result = locks
        .acquire_with_wait(
            "key1",
            30,
            Duration::from_millis(300),
            Duration::from_millis(50),
        )
        .await
        .unwrap();
    assert!(!result.locked);
    assert!(result.timeout_waiting);
    assert!(result.waited);
    assert!(result.already_locked);
}

#[tokio::test]
async fn acquire_with_wait_succeeds_once_released() {
    let tmp = TempDir::new().unwrap();
    let locks = Arc::new(manager(&tmp));
    assert!(locks.acquire("key1", 30).unwrap().locked);

    let releaser = {
        let locks = locks.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            locks.release("key1");
        })
    };

    let result = locks
        .acquire_with_wait(
            "key1",
            30,
            Duration::from_secs(2),
            Duration::from_millis(50),
        )
        .await
        .unwrap();
    assert!(result.locked);
    assert!(result.waited);
    releaser.await.unwrap();
}

#[test]
fn cleanup_expired_sweeps_only_dead_locks() {
    let tmp = TempDir::new().unwrap();
    let locks = manager(&tmp);

    locks.acquire("dead1", 0).unwrap();
    locks.acquire("dead2", 0).unwrap();
    locks.acquire("live", 300).unwrap();

    assert_eq!(locks.cleanup_expired(), 2);
    assert!(locks.is_locked("live"));
}

#[test]
fn release_all_sweeps_everything() {
    let tmp = TempDir::new().unwrap();
    let locks = manager(&tmp);

    locks.acquire("a", 300).unwrap();
    locks.acquire("b", 300).unwrap();
    assert_eq!(locks.release_all(), 2);
    assert!(!locks.is_locked("a"));
    assert!(!locks.is_locked("b"));
}
