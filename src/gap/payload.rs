//! Advertising configuration: advertisement and scan response payloads.
//!
//! Both payloads are sequences of AD structures (`len`, `type`, `data…`)
//! limited to 31 bytes each by legacy advertising.  The payload is built
//! once at startup and read without locking afterwards.

use core::fmt;

/// Legacy advertising PDU data limit.
pub const MAX_AD_LEN: usize = 31;

/// AD type: Flags.
pub const AD_FLAGS: u8 = 0x01;
/// AD type: Complete List of 16-bit Service UUIDs.
pub const AD_UUID16_ALL: u8 = 0x03;
/// AD type: Shortened Local Name.
pub const AD_NAME_SHORTENED: u8 = 0x08;
/// AD type: Complete Local Name.
pub const AD_NAME_COMPLETE: u8 = 0x09;

/// Flags: LE General Discoverable Mode.
pub const AD_FLAG_GENERAL: u8 = 0x02;
/// Flags: BR/EDR Not Supported.
pub const AD_FLAG_NO_BREDR: u8 = 0x04;

/// Environmental Sensing Service UUID.
pub const UUID_ESS: u16 = 0x181a;

pub type AdData = heapless::Vec<u8, MAX_AD_LEN>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadError {
    /// The AD structure does not fit in the remaining PDU space.
    TooLong,
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLong => write!(f, "AD structure exceeds {MAX_AD_LEN} bytes"),
        }
    }
}

/// Append one AD structure to `buf`.
pub fn push_ad(buf: &mut AdData, ad_type: u8, data: &[u8]) -> Result<(), PayloadError> {
    let needed = 2 + data.len();
    if buf.len() + needed > MAX_AD_LEN {
        return Err(PayloadError::TooLong);
    }
    // Capacity checked above.
    let _ = buf.push((data.len() + 1) as u8);
    let _ = buf.push(ad_type);
    buf.extend_from_slice(data)
        .map_err(|_| PayloadError::TooLong)
}

/// Immutable advertising configuration owned by the connection manager.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvertisingPayload {
    adv_data: AdData,
    scan_data: AdData,
}

impl AdvertisingPayload {
    pub fn new(adv_data: AdData, scan_data: AdData) -> Self {
        Self {
            adv_data,
            scan_data,
        }
    }

    /// Payload of an Environmental Sensing Profile sensor: general
    /// discoverable, ESS UUID advertised, device name in the scan response.
    ///
    /// Names too long for the scan response are truncated and advertised as
    /// a shortened local name.
    pub fn ess_sensor(device_name: &str) -> Result<Self, PayloadError> {
        let mut adv_data = AdData::new();
        push_ad(&mut adv_data, AD_FLAGS, &[AD_FLAG_GENERAL | AD_FLAG_NO_BREDR])?;
        push_ad(&mut adv_data, AD_UUID16_ALL, &UUID_ESS.to_le_bytes())?;

        let mut scan_data = AdData::new();
        let name = device_name.as_bytes();
        let room = MAX_AD_LEN - 2;
        if name.len() <= room {
            push_ad(&mut scan_data, AD_NAME_COMPLETE, name)?;
        } else {
            push_ad(&mut scan_data, AD_NAME_SHORTENED, &name[..room])?;
        }

        Ok(Self::new(adv_data, scan_data))
    }

    pub fn adv_data(&self) -> &[u8] {
        &self.adv_data
    }

    pub fn scan_data(&self) -> &[u8] {
        &self.scan_data
    }
}
