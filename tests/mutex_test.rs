/*!
 * Mutex Integration Tests
 * Recursive ownership, non-owner release, and ownership handoff
 */

mod common;

use common::fixture;
use pretty_assertions::assert_eq;
use shmsync::SyncError;
use std::thread;
use std::time::Duration;

#[test]
fn test_owner_reenters_without_blocking() {
    let fx = fixture();
    let mutex = fx.engine.create_mutex(None, 0, true).unwrap();

    // Each re-entry is immediate and bumps the recursion count.
    assert_eq!(fx.engine.wait(&[mutex], true, false, Some(Duration::ZERO)), Ok(0));
    assert_eq!(fx.engine.wait(&[mutex], true, false, Some(Duration::ZERO)), Ok(0));

    let info = fx.engine.query_mutex(mutex).unwrap();
    assert_eq!(info.recursion, 3);
    assert!(info.owned_by_caller);

    assert_eq!(fx.engine.release_mutex(mutex).unwrap(), 3);
    assert_eq!(fx.engine.release_mutex(mutex).unwrap(), 2);
    assert_eq!(fx.engine.release_mutex(mutex).unwrap(), 1);

    let info = fx.engine.query_mutex(mutex).unwrap();
    assert_eq!(info.owner, 0);
    assert_eq!(info.recursion, 0);

    assert_eq!(fx.engine.release_mutex(mutex), Err(SyncError::NotOwned));
}

#[test]
fn test_non_owner_release_fails_without_mutation() {
    let fx = fixture();
    let mutex = fx.engine.create_mutex(None, 0, true).unwrap();

    let engine = fx.engine.clone();
    let outsider = thread::spawn(move || engine.release_mutex(mutex));
    assert_eq!(outsider.join().unwrap(), Err(SyncError::NotOwned));

    let info = fx.engine.query_mutex(mutex).unwrap();
    assert_eq!(info.recursion, 1);
    assert!(info.owned_by_caller);
}

#[test]
fn test_release_hands_ownership_to_blocked_waiter() {
    let fx = fixture();
    let mutex = fx.engine.create_mutex(None, 0, true).unwrap();

    let engine = fx.engine.clone();
    let contender = thread::spawn(move || {
        let result = engine.wait(&[mutex], true, false, Some(Duration::from_secs(2)));
        let info = engine.query_mutex(mutex).unwrap();
        engine.release_mutex(mutex).unwrap();
        (result, info)
    });

    thread::sleep(Duration::from_millis(100));
    assert_eq!(fx.engine.release_mutex(mutex).unwrap(), 1);

    let (result, info) = contender.join().unwrap();
    assert_eq!(result, Ok(0));
    assert_eq!(info.recursion, 1);
    assert!(info.owned_by_caller);

    // Fully released again after the contender's own release.
    assert_eq!(fx.engine.query_mutex(mutex).unwrap().owner, 0);
}

#[test]
fn test_contended_mutex_times_out() {
    let fx = fixture();
    let mutex = fx.engine.create_mutex(None, 0, true).unwrap();

    let engine = fx.engine.clone();
    let contender = thread::spawn(move || {
        engine.wait(&[mutex], true, false, Some(Duration::from_millis(100)))
    });
    assert_eq!(contender.join().unwrap(), Err(SyncError::Timeout));

    // Still ours.
    assert!(fx.engine.query_mutex(mutex).unwrap().owned_by_caller);
}

#[test]
fn test_unowned_create_is_immediately_acquirable() {
    let fx = fixture();
    let mutex = fx.engine.create_mutex(None, 0, false).unwrap();

    let info = fx.engine.query_mutex(mutex).unwrap();
    assert_eq!(info.owner, 0);
    assert_eq!(info.recursion, 0);

    assert_eq!(fx.engine.wait(&[mutex], true, false, Some(Duration::ZERO)), Ok(0));
    assert_eq!(fx.engine.release_mutex(mutex).unwrap(), 1);
}
