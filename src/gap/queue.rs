//! Bounded FIFO of link lifecycle events.
//!
//! Producers are radio stack callbacks, which must neither block nor fail
//! loudly: a full queue drops the event and logs it.  The single consumer
//! is the GAP worker, which suspends on [`EventQueue::receive`].

use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::error;

use super::LinkEvent;
use crate::config::MAX_CONNECTIONS;

/// Queue depth: a connection and a disconnection may be pending per slot.
pub const EVENT_QUEUE_DEPTH: usize = 2 * MAX_CONNECTIONS as usize;

pub struct EventQueue {
    events: Channel<CriticalSectionRawMutex, LinkEvent, EVENT_QUEUE_DEPTH>,
    dropped: AtomicU32,
}

impl EventQueue {
    pub const fn new() -> Self {
        Self {
            events: Channel::new(),
            dropped: AtomicU32::new(0),
        }
    }

    /// Non-blocking enqueue.  Returns `false` if the event was dropped.
    pub fn push(&self, event: LinkEvent) -> bool {
        match self.events.try_send(event) {
            Ok(()) => true,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                error!("GAP: event queue exhausted, dropped {:?}", event);
                false
            }
        }
    }

    /// Wait for the next event, in arrival order.
    pub async fn receive(&self) -> LinkEvent {
        self.events.receive().await
    }

    pub fn try_receive(&self) -> Option<LinkEvent> {
        self.events.try_receive().ok()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of events dropped on a full queue since boot.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}
