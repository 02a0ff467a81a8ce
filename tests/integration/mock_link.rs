//! Mock radio stack for integration tests.
//!
//! Records advertising starts and peer reference counts, and lets tests
//! fire lifecycle notifications into the registered observer as the stack
//! callbacks would.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use essnode::app::ports::{AdvertiseError, LinkController, LinkObserver, SubscribeError};
use essnode::config::GapConfig;
use essnode::gap::{AdvertisingPayload, ConnectOutcome, ConnectionManager, GapSnapshot, PeerHandle};

// ── MockLink ──────────────────────────────────────────────────

#[derive(Default)]
pub struct MockLink {
    observer: Mutex<Option<Arc<dyn LinkObserver>>>,
    refuse: AtomicBool,
    pub advertise_calls: AtomicU32,
    refs: Mutex<HashMap<PeerHandle, i32>>,
}

#[allow(dead_code)]
impl MockLink {
    pub fn refuse_advertising(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn refs(&self, peer: PeerHandle) -> i32 {
        self.refs.lock().unwrap().get(&peer).copied().unwrap_or(0)
    }

    pub fn total_refs(&self) -> i32 {
        self.refs.lock().unwrap().values().sum()
    }

    fn observer(&self) -> Arc<dyn LinkObserver> {
        self.observer
            .lock()
            .unwrap()
            .clone()
            .expect("no observer subscribed")
    }

    pub fn fire_connected(&self, peer: u16, outcome: ConnectOutcome) {
        self.observer().on_connected(PeerHandle(peer), outcome);
    }

    pub fn fire_disconnected(&self, peer: u16, reason: u8) {
        self.observer().on_disconnected(PeerHandle(peer), reason);
    }

    pub fn fire_recycled(&self) {
        self.observer().on_slot_recycled();
    }
}

impl LinkController for MockLink {
    fn subscribe(&self, observer: Arc<dyn LinkObserver>) -> Result<(), SubscribeError> {
        let mut slot = self.observer.lock().unwrap();
        if slot.is_some() {
            return Err(SubscribeError::AlreadySubscribed);
        }
        *slot = Some(observer);
        Ok(())
    }

    fn advertise_start(&self, _payload: &AdvertisingPayload) -> Result<(), AdvertiseError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(AdvertiseError::NoResources);
        }
        self.advertise_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn retain(&self, peer: PeerHandle) {
        *self.refs.lock().unwrap().entry(peer).or_insert(0) += 1;
    }

    fn release(&self, peer: PeerHandle) {
        *self.refs.lock().unwrap().entry(peer).or_insert(0) -= 1;
    }
}

// ── Harness ───────────────────────────────────────────────────

pub type Manager = ConnectionManager<Arc<MockLink>>;

/// Manager over a [`MockLink`], with every committed pair forwarded to a
/// channel so tests can wait for the worker.
pub struct Harness {
    pub link: Arc<MockLink>,
    pub manager: Arc<Manager>,
    commits: Receiver<GapSnapshot>,
}

#[allow(dead_code)]
impl Harness {
    /// Constructed but not initialised.
    pub fn new(max_slots: u8, auto_resume: bool) -> Self {
        let link = Arc::new(MockLink::default());
        let (tx, commits) = mpsc::channel();
        let manager = ConnectionManager::new(
            Arc::clone(&link),
            AdvertisingPayload::ess_sensor("essnode-test").unwrap(),
            GapConfig {
                max_slots,
                auto_resume,
            },
            Some(Box::new(move |flags, slots_available| {
                let _ = tx.send(GapSnapshot {
                    flags,
                    slots_available,
                });
            })),
        );
        Self {
            link,
            manager,
            commits,
        }
    }

    /// Next committed pair, failing the test after two seconds.
    pub fn next_commit(&self) -> GapSnapshot {
        self.commits
            .recv_timeout(Duration::from_secs(2))
            .expect("no state commit within 2s")
    }

    /// Wait for `n` commits and return the last.
    pub fn settle(&self, n: usize) -> GapSnapshot {
        let mut last = None;
        for _ in 0..n {
            last = Some(self.next_commit());
        }
        last.expect("settle(0)")
    }

    pub fn quiet_for(&self, ms: u64) -> bool {
        matches!(
            self.commits.recv_timeout(Duration::from_millis(ms)),
            Err(RecvTimeoutError::Timeout)
        )
    }

    /// Every commit until none arrives for `ms` milliseconds.
    pub fn collect_until_quiet(&self, ms: u64) -> Vec<GapSnapshot> {
        let mut seen = Vec::new();
        while let Ok(s) = self.commits.recv_timeout(Duration::from_millis(ms)) {
            seen.push(s);
        }
        seen
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.manager.shutdown();
    }
}
