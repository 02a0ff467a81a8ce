//! Environmental Sensing Service flows: provisioning a configuration,
//! client descriptor traffic and sample streams.

use essnode::config::NodeConfig;
use essnode::error::{Error, EssError};
use essnode::ess::{AttError, EnvironmentalService, EssKind, PeriodicTimer, SensorReading};

fn provisioned(json: &str) -> EnvironmentalService {
    let config = NodeConfig::from_json(json.as_bytes()).unwrap();
    EnvironmentalService::new(&config.ess).unwrap()
}

const THRESHOLDS: &str = r#"{
    "device_name": "greenhouse-3",
    "gap": { "max_slots": 2, "auto_resume": true },
    "ess": {
        "temperature": { "condition": 6, "operand": 3000 },
        "pressure":    { "condition": 1, "operand": 60 },
        "humidity":    { "condition": 2, "operand": 30 }
    }
}"#;

#[test]
fn provisioned_triggers_are_readable_by_clients() {
    let ess = provisioned(THRESHOLDS);
    // Gt 30.00 °C
    assert_eq!(
        ess.characteristic(EssKind::Temperature).read_trigger().as_slice(),
        &[0x06, 0xb8, 0x0b]
    );
    // FixedTime 60 s
    assert_eq!(
        ess.characteristic(EssKind::Pressure).read_trigger().as_slice(),
        &[0x01, 0x3c, 0x00, 0x00]
    );
}

#[test]
fn threshold_trigger_only_notifies_above_operand() {
    let mut ess = provisioned(THRESHOLDS);
    ess.characteristic_mut(EssKind::Temperature).set_subscribed(true);

    assert_eq!(ess.update_temperature(2_950, 0), Ok(None));
    let n = ess.update_temperature(3_010, 1).unwrap().unwrap();
    assert_eq!(n.uuid, 0x2a6e);
    assert_eq!(n.payload.as_slice(), &3_010i16.to_le_bytes());
    // Still above: notified again.
    assert!(ess.update_temperature(3_020, 2).unwrap().is_some());
}

#[test]
fn fixed_interval_subscription_drives_timer() {
    let mut ess = provisioned(THRESHOLDS);
    let pressure = ess.characteristic_mut(EssKind::Pressure);
    assert_eq!(pressure.set_subscribed(true), PeriodicTimer::Start(60));

    // Updates are silent; the timer tick sends the latest value.
    assert_eq!(ess.update_pressure(1_000_120, 5), None);
    let tick = ess.characteristic(EssKind::Pressure).notification();
    assert_eq!(tick.payload.as_slice(), &1_000_120u32.to_le_bytes());
}

#[test]
fn sample_stream_with_rate_limited_humidity() {
    let mut ess = provisioned(THRESHOLDS);
    ess.characteristic_mut(EssKind::Humidity).set_subscribed(true);

    let reading = |humidity: f32| SensorReading {
        temperature: 21.0,
        pressure: 100_800.0,
        humidity,
    };
    let uuids = |sent: &[essnode::ess::Notification]| -> Vec<u16> {
        sent.iter().map(|n| n.uuid).collect()
    };

    assert_eq!(uuids(&ess.apply_sample(&reading(40.0), 30)), [0x2a6f]);
    assert!(ess.apply_sample(&reading(41.0), 45).is_empty());
    assert_eq!(uuids(&ess.apply_sample(&reading(42.0), 60)), [0x2a6f]);
    assert_eq!(ess.characteristic(EssKind::Humidity).value(), 4_200);
}

#[test]
fn client_rewrites_trigger_at_runtime() {
    let mut ess = provisioned(THRESHOLDS);
    let humidity = ess.characteristic_mut(EssKind::Humidity);
    humidity.set_subscribed(true);

    // Lte 20.00 %
    assert_eq!(
        humidity.write_trigger(&[0x05, 0xd0, 0x07]),
        Ok(PeriodicTimer::Keep)
    );
    assert_eq!(ess.update_humidity(2_500, 0), Ok(None));
    assert!(ess.update_humidity(2_000, 1).unwrap().is_some());

    // Malformed writes are refused with ATT codes and change nothing.
    let humidity = ess.characteristic_mut(EssKind::Humidity);
    assert_eq!(humidity.write_trigger(&[]), Err(AttError::InvalidAttributeLength));
    assert_eq!(humidity.write_trigger(&[0x0f]), Err(AttError::ConditionNotSupported));
    assert_eq!(humidity.read_trigger().as_slice(), &[0x05, 0xd0, 0x07]);
}

#[test]
fn invalid_samples_are_rejected_without_state_change() {
    let mut ess = provisioned(THRESHOLDS);
    ess.update_humidity(5_000, 0).unwrap();
    assert_eq!(
        ess.update_humidity(12_000, 1),
        Err(EssError::InvalidHumidity(12_000))
    );
    assert_eq!(ess.characteristic(EssKind::Humidity).value(), 5_000);
}

#[test]
fn provisioning_rejects_out_of_format_operand() {
    // Humidity operands are uint16.
    let json = THRESHOLDS.replace(
        r#""humidity":    { "condition": 2, "operand": 30 }"#,
        r#""humidity":    { "condition": 7, "operand": 70000 }"#,
    );
    assert!(matches!(
        NodeConfig::from_json(json.as_bytes()),
        Err(Error::Ess(EssError::OperandOutOfRange(70_000)))
    ));
}
