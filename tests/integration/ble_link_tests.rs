//! Connection management over the simulated BLE link adapter: recycling is
//! driven by real reference counting instead of injected events.

use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use essnode::adapters::ble::BleLink;
use essnode::config::GapConfig;
use essnode::gap::{AdvertisingPayload, ConnectionManager, GapSnapshot, PeerHandle};

fn setup(max_slots: u8) -> (Arc<BleLink>, Arc<ConnectionManager<Arc<BleLink>>>, mpsc::Receiver<GapSnapshot>) {
    let mut name = heapless::String::new();
    name.push_str("essnode-sim").unwrap();
    let link = Arc::new(BleLink::new(name));
    let (tx, rx) = mpsc::channel();
    let manager = ConnectionManager::new(
        Arc::clone(&link),
        AdvertisingPayload::ess_sensor(link.device_name()).unwrap(),
        GapConfig {
            max_slots,
            auto_resume: true,
        },
        Some(Box::new(move |flags, slots_available| {
            let _ = tx.send(GapSnapshot {
                flags,
                slots_available,
            });
        })),
    );
    (link, manager, rx)
}

fn next(rx: &mpsc::Receiver<GapSnapshot>) -> GapSnapshot {
    rx.recv_timeout(Duration::from_secs(2))
        .expect("no state commit within 2s")
}

#[test]
fn disconnect_release_recycles_and_resumes() {
    let (link, manager, rx) = setup(1);
    manager.initialize().unwrap();
    assert!(next(&rx).is_advertising());
    assert!(link.sim_is_advertising());

    let peer = PeerHandle(3);
    link.stack_connected(peer, 0);
    let s = next(&rx);
    assert!(s.is_connected());
    assert_eq!(link.peer_refs(peer), 2, "stack + manager");

    link.stack_disconnected(peer, 0x13);
    // Disconnected releases the manager's reference; the freed object
    // produces the recycle, which resumes advertising.
    let s = next(&rx);
    assert!(!s.is_connected());
    let s = next(&rx);
    assert_eq!(s.slots_available, 1);
    assert!(s.is_advertising());

    assert_eq!(link.allocated_slots(), 0);
    assert_eq!(link.sim_advertising_starts(), 2);
    manager.shutdown();
}

#[test]
fn failed_connect_is_recycled_after_manager_release() {
    let (link, manager, rx) = setup(2);
    manager.initialize().unwrap();
    next(&rx);

    link.stack_connected(PeerHandle(5), 0x3e);
    let s = next(&rx);
    assert!(!s.is_connected());

    // Failed transition released the manager's reference: slot comes back.
    let s = next(&rx);
    assert_eq!(s.slots_available, 2);
    assert_eq!(link.allocated_slots(), 0);
    manager.shutdown();
}

#[test]
fn stack_refusal_sets_advertising_down() {
    let (link, manager, rx) = setup(1);
    link.sim_refuse_advertising(true);
    assert!(manager.initialize().is_err());
    assert!(next(&rx).is_advertising_down());
    manager.shutdown();
}
