//! Connection management scenarios, driven through the worker thread.

use std::sync::Arc;
use std::thread;

use essnode::app::ports::LinkObserver;
use essnode::error::GapError;
use essnode::gap::queue::EVENT_QUEUE_DEPTH;
use essnode::gap::{ConnectOutcome, GapSnapshot, PeerHandle};

use crate::mock_link::{Harness, Manager};

/// Predicates every sequentially reachable pair satisfies.
fn reachable(s: &GapSnapshot, max_slots: u8, auto_resume: bool) -> bool {
    s.slots_available <= max_slots
        && (!s.is_advertising() || s.slots_available > 0)
        && (!s.is_connected() || s.slots_available < max_slots)
        && s.auto_resume() == auto_resume
}

// ── Scenario A/B: single slot lifecycle ───────────────────────

#[test]
fn single_slot_connect_blocks_advertising() {
    let h = Harness::new(1, false);
    assert_eq!(h.manager.initialize(), Ok(()));

    assert_eq!(h.manager.start_advertising(), Ok(()));
    let s = h.next_commit();
    assert!(s.is_advertising());
    assert_eq!(s.slots_available, 1);

    h.link.fire_connected(1, ConnectOutcome::Success);
    let s = h.next_commit();
    assert!(!s.is_advertising());
    assert!(s.is_connected());
    assert_eq!(s.slots_available, 0);

    assert_eq!(h.manager.start_advertising(), Err(GapError::NoSlotsAvailable));
}

#[test]
fn recycle_resumes_advertising_automatically() {
    let h = Harness::new(1, true);
    assert_eq!(h.manager.initialize(), Ok(()));
    assert!(h.next_commit().is_advertising());

    h.link.fire_connected(1, ConnectOutcome::Success);
    let s = h.next_commit();
    assert!(s.is_connected());
    assert!(!s.is_advertising(), "no slot left to advertise");

    h.link.fire_disconnected(1, 0x13);
    let s = h.next_commit();
    assert!(!s.is_connected());
    assert_eq!(s.slots_available, 0);
    assert_eq!(h.link.refs(PeerHandle(1)), 0);

    h.link.fire_recycled();
    let s = h.next_commit();
    assert_eq!(s.slots_available, 1);
    assert!(s.is_advertising(), "auto-resume after recycle");
    assert_eq!(h.link.advertise_calls.load(std::sync::atomic::Ordering::SeqCst), 2);
}

#[test]
fn recycle_without_auto_resume_waits_for_caller() {
    let h = Harness::new(1, false);
    h.manager.initialize().unwrap();
    h.manager.start_advertising().unwrap();
    h.next_commit();

    h.link.fire_connected(1, ConnectOutcome::Success);
    h.link.fire_disconnected(1, 0x13);
    h.link.fire_recycled();
    let s = h.settle(3);
    assert_eq!(s.slots_available, 1);
    assert!(!s.is_advertising());
    assert!(!s.is_connected());

    assert_eq!(h.manager.start_advertising(), Ok(()));
    assert!(h.next_commit().is_advertising());
}

// ── Scenario C: failed connection ─────────────────────────────

#[test]
fn failed_connection_spends_a_slot_without_leaking() {
    let h = Harness::new(3, false);
    h.manager.initialize().unwrap();

    h.link.fire_connected(9, ConnectOutcome::Failed(0x3e));
    let s = h.next_commit();
    assert_eq!(s.slots_available, 2);
    assert!(!s.is_connected());
    assert_eq!(h.link.refs(PeerHandle(9)), 0, "reference released immediately");
}

// ── Scenario D: advertising subsystem down ────────────────────

#[test]
fn refused_advertising_recovers_on_next_event() {
    let h = Harness::new(2, true);
    h.link.refuse_advertising(true);

    // Initialisation completes; only the advertising attempt fails.
    assert_eq!(h.manager.initialize(), Err(GapError::ConnectionRefused));
    let s = h.next_commit();
    assert!(s.is_advertising_down());
    assert!(!s.is_advertising());

    assert_eq!(h.manager.start_advertising(), Err(GapError::ConnectionRefused));
    h.next_commit();

    h.link.refuse_advertising(false);
    h.link.fire_recycled();
    let s = h.next_commit();
    assert!(s.is_advertising());
    assert!(!s.is_advertising_down());
    assert_eq!(s.slots_available, 2, "recycle on a full pool is clamped");
}

// ── API contract ──────────────────────────────────────────────

#[test]
fn start_twice_is_already_advertising() {
    let h = Harness::new(2, false);
    h.manager.initialize().unwrap();
    assert_eq!(h.manager.start_advertising(), Ok(()));
    assert_eq!(
        h.manager.start_advertising(),
        Err(GapError::AlreadyAdvertising)
    );
    // Both calls commit.
    let commits = h.settle(2);
    assert!(commits.is_advertising());
}

#[test]
fn second_initialize_is_rejected() {
    let h = Harness::new(1, false);
    assert_eq!(h.manager.initialize(), Ok(()));
    assert_eq!(h.manager.initialize(), Err(GapError::AlreadyInitialized));
}

#[test]
fn multi_slot_stays_connected_until_last_peer_leaves() {
    let h = Harness::new(2, true);
    h.manager.initialize().unwrap();
    h.next_commit();

    h.link.fire_connected(1, ConnectOutcome::Success);
    let s = h.next_commit();
    assert!(s.is_connected());
    assert!(s.is_advertising(), "second slot still free");

    h.link.fire_connected(2, ConnectOutcome::Success);
    let s = h.next_commit();
    assert_eq!(s.slots_available, 0);
    assert!(!s.is_advertising());

    h.link.fire_disconnected(1, 0x13);
    assert!(h.next_commit().is_connected());
    h.link.fire_recycled();
    let s = h.next_commit();
    assert!(s.is_connected());
    assert!(s.is_advertising());

    h.link.fire_disconnected(2, 0x13);
    assert!(!h.next_commit().is_connected());
    assert_eq!(h.link.total_refs(), 0);
}

#[test]
fn shutdown_stops_event_processing() {
    let h = Harness::new(2, false);
    h.manager.initialize().unwrap();
    h.manager.shutdown();

    h.link.fire_recycled();
    assert!(h.quiet_for(100), "worker must be gone");

    // The synchronous API keeps working.
    assert_eq!(h.manager.start_advertising(), Ok(()));
    assert!(h.next_commit().is_advertising());
}

#[test]
fn notifications_after_shutdown_hold_no_reference() {
    let h = Harness::new(2, false);
    h.manager.initialize().unwrap();
    h.link.fire_connected(1, ConnectOutcome::Success);
    assert!(h.next_commit().is_connected());
    assert_eq!(h.link.refs(PeerHandle(1)), 1);

    h.manager.shutdown();
    h.link.fire_connected(7, ConnectOutcome::Success);
    assert_eq!(h.link.refs(PeerHandle(7)), 0, "no retain once stopped");
    h.link.fire_disconnected(1, 0x13);
    assert_eq!(h.link.refs(PeerHandle(1)), 0, "released in the producer");
    assert!(h.quiet_for(100));
    assert_eq!(h.link.total_refs(), 0);
}

#[test]
fn shutdown_before_initialize_leaves_worker_running() {
    let h = Harness::new(2, false);
    h.manager.on_connected(PeerHandle(4), ConnectOutcome::Success);
    h.manager.on_slot_recycled();
    h.manager.shutdown();
    assert_eq!(h.link.refs(PeerHandle(4)), 0, "queued connection released");
    assert_eq!(h.manager.pending_events(), 0);

    assert_eq!(h.manager.initialize(), Ok(()));
    assert!(h.quiet_for(100), "discarded events are never applied");

    h.link.fire_connected(1, ConnectOutcome::Success);
    assert!(h.next_commit().is_connected());
    h.link.fire_recycled();
    assert_eq!(h.next_commit().slots_available, 2);
}

// ── Concurrency ───────────────────────────────────────────────

/// Fire `rounds` connect / disconnect / recycle cycles, never overrunning
/// the event queue.
fn fire_rounds(h: &Harness, rounds: u16) -> thread::JoinHandle<()> {
    let link = Arc::clone(&h.link);
    let manager: Arc<Manager> = Arc::clone(&h.manager);
    thread::spawn(move || {
        let paced = |fire: &dyn Fn()| {
            while manager.pending_events() >= EVENT_QUEUE_DEPTH {
                thread::yield_now();
            }
            fire();
        };
        for round in 0..rounds {
            paced(&|| link.fire_connected(round, ConnectOutcome::Success));
            paced(&|| link.fire_disconnected(round, 0x13));
            paced(&|| link.fire_recycled());
        }
    })
}

#[test]
fn concurrent_callers_see_consistent_pairs() {
    const MAX: u8 = 4;
    let h = Harness::new(MAX, true);
    h.manager.initialize().unwrap();

    let callers: Vec<_> = (0..4)
        .map(|_| {
            let manager = Arc::clone(&h.manager);
            thread::spawn(move || {
                for _ in 0..200 {
                    match manager.start_advertising() {
                        Ok(())
                        | Err(GapError::Busy)
                        | Err(GapError::AlreadyAdvertising)
                        | Err(GapError::NoSlotsAvailable) => {}
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
            })
        })
        .collect();
    let events = fire_rounds(&h, 50);

    for c in callers {
        c.join().unwrap();
    }
    events.join().unwrap();

    // Let the worker drain the queue.
    let seen = h.collect_until_quiet(200);
    assert!(!seen.is_empty());
    for s in &seen {
        assert!(reachable(s, MAX, true), "unreachable pair {s:?}");
    }

    // Sinks run outside the lock, so arrival order across threads is not
    // commit order: check the committed record itself.
    let final_state = h.manager.snapshot();
    assert!(reachable(&final_state, MAX, true));
    assert!(final_state.is_advertising() || final_state.slots_available == 0);
    assert_eq!(final_state.slots_available, MAX);
    assert!(!final_state.is_connected());

    assert_eq!(h.manager.dropped_events(), 0);
    assert_eq!(h.link.total_refs(), 0, "every retain released once");
}

#[test]
fn events_alone_never_start_advertising_without_auto_resume() {
    const MAX: u8 = 2;
    let h = Harness::new(MAX, false);
    h.manager.initialize().unwrap();

    fire_rounds(&h, 50).join().unwrap();

    let seen = h.collect_until_quiet(200);
    assert_eq!(seen.len(), 150);
    for s in &seen {
        assert!(reachable(s, MAX, false), "unreachable pair {s:?}");
        assert!(!s.is_advertising(), "spontaneous advertising in {s:?}");
    }
    assert_eq!(h.link.total_refs(), 0);
}
