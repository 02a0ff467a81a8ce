//! Connection manager: the authoritative `(flags, slots_available)` record
//! and the transitions that mutate it.
//!
//! Two kinds of callers compete for the [`AdmissionLock`]:
//!
//! * the synchronous API ([`ConnectionManager::start_advertising`]), which
//!   never waits and fails with [`GapError::Busy`] instead;
//! * the GAP worker ([`ConnectionManager::process_event`]), the only
//!   context allowed to wait for the lock.
//!
//! Every transition works on a private copy of the committed state and
//! publishes it in one critical section before the lock is released, so
//! readers never observe a half-applied transition.
//!
//! Peer references are tracked per retain: each one is given back exactly
//! once, by the transition that consumes its event, by `shutdown()` when
//! the event is discarded, or directly in the producer once stopped.

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use log::{debug, error, info, warn};

use super::lock::AdmissionLock;
use super::queue::EventQueue;
use super::{
    AdvertisingPayload, CFG_ADV_AUTO, ConnectOutcome, GapSnapshot, LinkEvent, PeerHandle,
    STATE_ADV_CONN, STATE_ADV_DOWN, STATE_CONNECTED, worker,
};
use crate::app::ports::{LinkController, LinkObserver};
use crate::config::GapConfig;
use crate::error::GapError;

/// State-changed sink, invoked with `(flags, slots_available)` after every
/// committed transition, outside the admission lock.
pub type StateChangedFn = Box<dyn Fn(u32, u8) + Send + Sync>;

pub struct ConnectionManager<C: LinkController> {
    link: C,
    payload: AdvertisingPayload,
    max_slots: u8,
    lock: AdmissionLock,
    committed: Mutex<CriticalSectionRawMutex, Cell<GapSnapshot>>,
    queue: EventQueue,
    on_state_changed: Option<StateChangedFn>,
    shutdown: Signal<CriticalSectionRawMutex, ()>,
    /// Set by `shutdown()`; lifecycle notifications are no longer queued.
    stopped: AtomicBool,
    /// Peers this manager holds a reference on, one entry per retain.
    held: std::sync::Mutex<Vec<PeerHandle>>,
    worker: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl<C: LinkController + 'static> ConnectionManager<C> {
    /// Create a manager with every slot free and no state bit set.
    ///
    /// `config.max_slots` is expected to be validated already
    /// (see [`NodeConfig::validate`](crate::config::NodeConfig::validate)).
    pub fn new(
        link: C,
        payload: AdvertisingPayload,
        config: GapConfig,
        on_state_changed: Option<StateChangedFn>,
    ) -> Arc<Self> {
        let flags = if config.auto_resume { CFG_ADV_AUTO } else { 0 };
        Arc::new(Self {
            link,
            payload,
            max_slots: config.max_slots,
            lock: AdmissionLock::new(),
            committed: Mutex::new(Cell::new(GapSnapshot {
                flags,
                slots_available: config.max_slots,
            })),
            queue: EventQueue::new(),
            on_state_changed,
            shutdown: Signal::new(),
            stopped: AtomicBool::new(false),
            held: std::sync::Mutex::new(Vec::new()),
            worker: std::sync::Mutex::new(None),
        })
    }

    /// Subscribe to link lifecycle notifications, start the GAP worker and,
    /// with auto-resume configured, start advertising.
    ///
    /// An advertising failure is returned but leaves the manager fully
    /// initialised: the worker retries on the next lifecycle event.
    pub fn initialize(self: &Arc<Self>) -> Result<(), GapError> {
        let observer: Arc<dyn LinkObserver> = self.clone();
        if self.link.subscribe(observer).is_err() {
            warn!("GAP: lifecycle subscriber already registered");
            return Err(GapError::AlreadyInitialized);
        }

        // A shutdown before initialisation must not stop the new worker.
        self.shutdown.reset();
        self.stopped.store(false, Ordering::Release);

        let handle = worker::spawn(Arc::clone(self)).map_err(|e| {
            error!("GAP: worker spawn failed: {}", e);
            GapError::WorkerSpawn
        })?;
        if let Ok(mut slot) = self.worker.lock() {
            *slot = Some(handle);
        }

        info!(
            "GAP: initialized ({} slots, auto-resume {})",
            self.max_slots,
            if self.snapshot().auto_resume() { "on" } else { "off" }
        );

        if self.snapshot().auto_resume() {
            self.start_advertising()
        } else {
            Ok(())
        }
    }

    /// Stop the GAP worker and wait for it to exit.
    ///
    /// Events still queued are discarded and the references held for them
    /// released.  The link subscription stays in place: later connections
    /// are ignored and later disconnections release their reference at
    /// once.
    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::Release);
        self.shutdown.signal(());
        let handle = self.worker.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            // The state-changed sink may call us from the worker itself,
            // which exits on its next iteration.
            if handle.thread().id() != std::thread::current().id() && handle.join().is_err() {
                error!("GAP: worker panicked");
            }
        }
        self.discard_queued();
        info!("GAP: shut down");
    }
}

impl<C: LinkController> ConnectionManager<C> {
    /// Start connectable advertising.  Never waits for the admission lock.
    pub fn start_advertising(&self) -> Result<(), GapError> {
        if !self.lock.try_acquire() {
            return Err(GapError::Busy);
        }

        let mut state = self.load();
        let result = if state.is_advertising() {
            Err(GapError::AlreadyAdvertising)
        } else if state.slots_available == 0 {
            Err(GapError::NoSlotsAvailable)
        } else {
            self.advertise(&mut state)
        };

        self.commit_and_release(state);
        result
    }

    /// Last committed `(flags, slots_available)` pair.
    pub fn snapshot(&self) -> GapSnapshot {
        self.committed.lock(|cell| cell.get())
    }

    pub fn max_slots(&self) -> u8 {
        self.max_slots
    }

    pub fn link(&self) -> &C {
        &self.link
    }

    /// Lifecycle events waiting for the worker.
    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Lifecycle events dropped on a full queue since construction.
    pub fn dropped_events(&self) -> u32 {
        self.queue.dropped()
    }

    pub(crate) fn queue(&self) -> &EventQueue {
        &self.queue
    }

    pub(crate) async fn wait_shutdown(&self) {
        self.shutdown.wait().await;
    }

    /// Apply one lifecycle event.  Waits for the admission lock; only the
    /// GAP worker calls this outside of tests.
    pub async fn process_event(&self, event: LinkEvent) {
        self.lock.acquire_wait().await;

        let mut state = self.load();
        match event {
            LinkEvent::Connected { peer, outcome } => self.connected(&mut state, peer, outcome),
            LinkEvent::Disconnected { peer, reason } => {
                self.disconnected(&mut state, peer, reason)
            }
            LinkEvent::SlotRecycled => self.slot_recycled(&mut state),
        }
        self.auto_resume(&mut state);

        self.commit_and_release(state);
    }

    // ── transitions (admission lock held) ─────────────────────────

    fn connected(&self, state: &mut GapSnapshot, peer: PeerHandle, outcome: ConnectOutcome) {
        state.flags &= !STATE_ADV_CONN;

        match state.slots_available.checked_sub(1) {
            Some(n) => state.slots_available = n,
            None => warn!("GAP: connection on {} with no slot accounted", peer),
        }

        match outcome {
            ConnectOutcome::Success => {
                info!("GAP: {} connected", peer);
                state.flags |= STATE_CONNECTED;
            }
            ConnectOutcome::Failed(status) => {
                warn!("GAP: connection failed (0x{:02x})", status);
                if !self.release_peer(peer) {
                    warn!("GAP: no reference held on {}", peer);
                }
            }
        }
    }

    fn disconnected(&self, state: &mut GapSnapshot, peer: PeerHandle, reason: u8) {
        info!("GAP: {} disconnected (reason 0x{:02x})", peer, reason);
        if !self.release_peer(peer) {
            warn!("GAP: no reference held on {}", peer);
        }

        // Last peer gone: the pending recycle completes the full set.
        if u16::from(state.slots_available) + 1 == u16::from(self.max_slots) {
            state.flags &= !STATE_CONNECTED;
        }
    }

    fn slot_recycled(&self, state: &mut GapSnapshot) {
        if state.slots_available < self.max_slots {
            state.slots_available += 1;
        } else {
            warn!("GAP: slot recycled with all {} slots free", self.max_slots);
        }
    }

    fn auto_resume(&self, state: &mut GapSnapshot) {
        if state.is_advertising() || !state.auto_resume() || state.slots_available == 0 {
            return;
        }
        if let Err(e) = self.advertise(state) {
            debug!("GAP: auto-resume deferred: {}", e);
        }
    }

    /// Advertise-start primitive shared by the API and the auto-resume
    /// check.
    fn advertise(&self, state: &mut GapSnapshot) -> Result<(), GapError> {
        match self.link.advertise_start(&self.payload) {
            Ok(()) => {
                state.flags &= !STATE_ADV_DOWN;
                state.flags |= STATE_ADV_CONN;
                debug!("GAP: advertising ({} slots free)", state.slots_available);
                Ok(())
            }
            Err(e) => {
                state.flags |= STATE_ADV_DOWN;
                error!("GAP: advertising failed to start: {}", e);
                Err(GapError::ConnectionRefused)
            }
        }
    }

    // ── peer references ───────────────────────────────────────────

    fn retain_peer(&self, peer: PeerHandle) {
        self.link.retain(peer);
        match self.held.lock() {
            Ok(mut held) => held.push(peer),
            Err(_) => error!("GAP: reference table poisoned, {} untracked", peer),
        }
    }

    /// Give back one reference taken on `peer`.  Returns `false` if none
    /// is held.
    fn release_peer(&self, peer: PeerHandle) -> bool {
        let found = self.held.lock().ok().is_some_and(|mut held| {
            match held.iter().position(|p| *p == peer) {
                Some(i) => {
                    held.swap_remove(i);
                    true
                }
                None => false,
            }
        });
        // Outside the table lock: the link may report a recycle from here.
        if found {
            self.link.release(peer);
        }
        found
    }

    /// Drop every queued event, releasing the references held for them.
    fn discard_queued(&self) {
        let mut discarded = 0u32;
        while let Some(event) = self.queue.try_receive() {
            discarded += 1;
            match event {
                LinkEvent::Connected { peer, .. } | LinkEvent::Disconnected { peer, .. } => {
                    self.release_peer(peer);
                }
                LinkEvent::SlotRecycled => {}
            }
        }
        if discarded > 0 {
            debug!("GAP: discarded {} queued events", discarded);
        }
    }

    /// Queue `event` for the worker.  A push racing with `shutdown()` is
    /// discarded here, since nothing drains the queue any more.
    fn enqueue(&self, event: LinkEvent) -> bool {
        if !self.queue.push(event) {
            return false;
        }
        if self.stopped.load(Ordering::Acquire) {
            self.discard_queued();
        }
        true
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    // ── committed state ───────────────────────────────────────────

    fn load(&self) -> GapSnapshot {
        self.committed.lock(|cell| cell.get())
    }

    /// Publish `state`, hand the lock back, then notify the sink.
    fn commit_and_release(&self, state: GapSnapshot) {
        self.committed.lock(|cell| cell.set(state));
        self.lock.release();

        if let Some(callback) = &self.on_state_changed {
            callback(state.flags, state.slots_available);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Stack callback contexts
// ───────────────────────────────────────────────────────────────

impl<C: LinkController> LinkObserver for ConnectionManager<C> {
    fn on_connected(&self, peer: PeerHandle, outcome: ConnectOutcome) {
        if self.is_stopped() {
            debug!("GAP: {} ignored, shut down", peer);
            return;
        }
        self.retain_peer(peer);
        if !self.enqueue(LinkEvent::Connected { peer, outcome }) {
            // Nobody will ever see this connection: give the reference back.
            self.release_peer(peer);
        }
    }

    fn on_disconnected(&self, peer: PeerHandle, reason: u8) {
        if self.is_stopped() {
            self.release_peer(peer);
            return;
        }
        self.enqueue(LinkEvent::Disconnected { peer, reason });
    }

    fn on_slot_recycled(&self) {
        if !self.is_stopped() {
            self.enqueue(LinkEvent::SlotRecycled);
        }
    }
}
