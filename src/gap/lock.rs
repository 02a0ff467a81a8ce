//! Admission lock: a single-permit semaphore shared by the GAP worker and
//! the synchronous connection management API.
//!
//! Unlike a scoped mutex guard, the permit is not tied to the acquiring
//! context: [`AdmissionLock::release`] hands it back explicitly, after the
//! state record has been committed.  At most one transition is in flight.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::semaphore::{GreedySemaphore, Semaphore};

pub struct AdmissionLock {
    permit: GreedySemaphore<CriticalSectionRawMutex>,
}

impl AdmissionLock {
    pub const fn new() -> Self {
        Self {
            permit: GreedySemaphore::new(1),
        }
    }

    /// Take the permit without waiting.  Never suspends the caller, so it
    /// is usable from stack callback contexts.
    pub fn try_acquire(&self) -> bool {
        match self.permit.try_acquire(1) {
            Some(releaser) => {
                // Released explicitly by `release()`.
                let _ = releaser.disarm();
                true
            }
            None => false,
        }
    }

    /// Wait until the permit is available.  Only the GAP worker awaits this.
    pub async fn acquire_wait(&self) {
        // GreedySemaphore's error type is `Infallible`.
        let Ok(releaser) = self.permit.acquire(1).await;
        let _ = releaser.disarm();
    }

    /// Hand the permit back, waking a pending `acquire_wait()`.
    pub fn release(&self) {
        self.permit.release(1);
    }
}

impl Default for AdmissionLock {
    fn default() -> Self {
        Self::new()
    }
}
