//! GAP worker: consumes the event queue until shutdown.
//!
//! Runs on its own thread, driving an async loop with `block_on`.  Each
//! iteration races the shutdown signal against the next lifecycle event,
//! then applies the event under the admission lock.

use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;

use futures_lite::future;
use log::info;

use super::manager::ConnectionManager;
use crate::app::ports::LinkController;
use crate::drivers::task_pin::{self, Core};

/// Same priority as the BLE host task, below the controller.
pub const GAP_TASK_PRIORITY: u8 = 19;
pub const GAP_TASK_STACK_KB: usize = 4;

pub(crate) fn spawn<C: LinkController + 'static>(
    manager: Arc<ConnectionManager<C>>,
) -> io::Result<JoinHandle<()>> {
    task_pin::spawn_on_core(
        Core::Pro,
        GAP_TASK_PRIORITY,
        GAP_TASK_STACK_KB,
        "gap\0",
        move || future::block_on(run(&manager)),
    )
}

/// Process events in arrival order until shutdown is signalled.
pub async fn run<C: LinkController>(manager: &ConnectionManager<C>) {
    info!("GAP: worker started");
    loop {
        // Shutdown is polled first: queued events are left to `shutdown()`.
        let next = future::or(
            async {
                manager.wait_shutdown().await;
                None
            },
            async { Some(manager.queue().receive().await) },
        )
        .await;

        match next {
            Some(event) => manager.process_event(event).await,
            None => break,
        }
    }
    info!("GAP: worker stopped");
}
