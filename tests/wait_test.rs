/*!
 * Wait Engine Integration Tests
 * Multi-object sets, degradation rules, and the message-wait protocol
 */

mod common;

use common::fixture;
use pretty_assertions::assert_eq;
use shmsync::{EventKind, Handle, SyncError, MAX_WAIT_OBJECTS};
use std::time::{Duration, Instant};

#[test]
fn test_available_object_returns_its_index_without_blocking() {
    let fx = fixture();
    let blocked = fx
        .engine
        .create_event(None, 0, EventKind::Auto, false)
        .unwrap();
    let signaled = fx
        .engine
        .create_event(None, 0, EventKind::Manual, true)
        .unwrap();

    let start = Instant::now();
    let result = fx
        .engine
        .wait(&[blocked, signaled], true, false, Some(Duration::from_secs(5)));
    assert_eq!(result, Ok(1));
    assert!(start.elapsed() < Duration::from_millis(500));
}

#[test]
fn test_lowest_ready_index_wins() {
    let fx = fixture();
    let first = fx
        .engine
        .create_event(None, 0, EventKind::Manual, true)
        .unwrap();
    let second = fx
        .engine
        .create_event(None, 0, EventKind::Auto, true)
        .unwrap();

    assert_eq!(
        fx.engine
            .wait(&[first, second], true, false, Some(Duration::ZERO)),
        Ok(0)
    );
    // The auto event after the winning index was never touched.
    assert!(fx.engine.query_event(second).unwrap().signaled);
}

#[test]
fn test_wait_for_all_multiple_objects_is_not_implemented() {
    let fx = fixture();
    let a = fx
        .engine
        .create_event(None, 0, EventKind::Manual, true)
        .unwrap();
    let b = fx
        .engine
        .create_event(None, 0, EventKind::Manual, true)
        .unwrap();

    // Unsupported regardless of object state.
    assert_eq!(
        fx.engine.wait(&[a, b], false, false, Some(Duration::ZERO)),
        Err(SyncError::NotImplemented)
    );
    assert_eq!(
        fx.engine.wait(&[a, b], false, false, None),
        Err(SyncError::NotImplemented)
    );
}

#[test]
fn test_wait_for_all_single_object_degenerates_to_wait_any() {
    let fx = fixture();
    let event = fx
        .engine
        .create_event(None, 0, EventKind::Manual, true)
        .unwrap();

    assert_eq!(fx.engine.wait(&[event], false, false, Some(Duration::ZERO)), Ok(0));
}

#[test]
fn test_pseudo_handles_decline_to_the_non_native_path() {
    let fx = fixture();
    let event = fx
        .engine
        .create_event(None, 0, EventKind::Manual, true)
        .unwrap();
    let pseudo = Handle(u32::MAX - 1);

    // All pseudo, and mixed with a native object: both degrade whole.
    assert_eq!(
        fx.engine.wait(&[pseudo], true, false, Some(Duration::ZERO)),
        Err(SyncError::NotImplemented)
    );
    assert_eq!(
        fx.engine
            .wait(&[event, pseudo], true, false, Some(Duration::ZERO)),
        Err(SyncError::NotImplemented)
    );
}

#[test]
fn test_resolution_failure_aborts_the_whole_wait() {
    let fx = fixture();
    let event = fx
        .engine
        .create_event(None, 0, EventKind::Auto, true)
        .unwrap();
    let unknown = Handle(0x4000);

    assert_eq!(
        fx.engine
            .wait(&[unknown, event], true, false, Some(Duration::ZERO)),
        Err(SyncError::InvalidHandle)
    );
    // The signaled event before the failing handle was not consumed.
    assert!(fx.engine.query_event(event).unwrap().signaled);

    assert_eq!(
        fx.engine
            .wait(&[Handle::NULL], true, false, Some(Duration::ZERO)),
        Err(SyncError::InvalidHandle)
    );
}

#[test]
fn test_wait_set_size_limits() {
    let fx = fixture();
    let event = fx
        .engine
        .create_event(None, 0, EventKind::Manual, true)
        .unwrap();

    assert!(matches!(
        fx.engine.wait(&[], true, false, Some(Duration::ZERO)),
        Err(SyncError::InvalidParameter(_))
    ));

    let oversized = vec![event; MAX_WAIT_OBJECTS + 1];
    assert!(matches!(
        fx.engine.wait(&oversized, true, false, Some(Duration::ZERO)),
        Err(SyncError::InvalidParameter(_))
    ));
}

#[test]
fn test_queue_in_last_position_wraps_wait_in_message_wait_state() {
    let fx = fixture();
    let event = fx
        .engine
        .create_event(None, 0, EventKind::Auto, false)
        .unwrap();
    let queue = fx.registry.install_queue();

    let result = fx
        .engine
        .wait(&[event, queue], true, false, Some(Duration::from_millis(100)));
    assert_eq!(result, Err(SyncError::Timeout));

    // Entered before blocking, cleared on the timeout path.
    assert_eq!(fx.registry.msgwait_log(), vec![true, false]);
}

#[test]
fn test_message_wait_cleared_on_success_path() {
    let fx = fixture();
    let signaled = fx
        .engine
        .create_event(None, 0, EventKind::Manual, true)
        .unwrap();
    let queue = fx.registry.install_queue();

    assert_eq!(
        fx.engine
            .wait(&[signaled, queue], true, false, Some(Duration::from_secs(2))),
        Ok(0)
    );
    assert_eq!(fx.registry.msgwait_log(), vec![true, false]);
}

#[test]
fn test_queue_not_in_last_position_does_not_enter_message_wait() {
    let fx = fixture();
    let signaled = fx
        .engine
        .create_event(None, 0, EventKind::Manual, true)
        .unwrap();
    let queue = fx.registry.install_queue();

    assert_eq!(
        fx.engine
            .wait(&[queue, signaled], true, false, Some(Duration::from_secs(2))),
        Ok(1)
    );
    assert!(fx.registry.msgwait_log().is_empty());
}

#[test]
fn test_close_invalidates_only_this_process_view() {
    let fx = fixture();
    let event = fx
        .engine
        .create_event(None, 0, EventKind::Manual, true)
        .unwrap();

    fx.engine.close(event).unwrap();
    assert_eq!(fx.engine.close(event), Err(SyncError::InvalidHandle));

    // Close never resolved anything through this process either.
    assert_eq!(fx.engine.close(Handle(0x7000)), Err(SyncError::InvalidHandle));
}
