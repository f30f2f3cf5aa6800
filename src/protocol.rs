/// Data model handed from the radio callback to the consumer, plus its JSON form.
///
/// Uses `heapless` types for no_std/no-alloc operation. A `Reading` owns
/// everything it carries so it can outlive the advertisement it was built from.
use heapless::{String, Vec};
use serde::Serialize;

/// Maximum length for MAC address strings ("AA:BB:CC:DD:EE:FF")
pub type MacString = String<18>;

/// Maximum length for device name strings
pub type NameString = String<33>;

/// Maximum number of measurements kept per reading
pub const MAX_MEASUREMENTS: usize = 12;

/// Measurement list carried by a reading
pub type Measurements = Vec<Measurement, MAX_MEASUREMENTS>;

/// One decoded sensor value.
///
/// Names and units come from the decoder's static object table, so they are
/// `&'static str` and copying a measurement never borrows from radio memory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Measurement {
    /// BTHome object identifier
    pub object_id: u8,
    pub name: &'static str,
    pub value: f32,
    pub unit: &'static str,
}

/// A fully decoded advertisement, ready for reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    /// Uppercase, colon-delimited device address
    #[serde(rename = "id")]
    pub device_id: MacString,
    /// Advertised local name, or the placeholder when none was seen
    #[serde(rename = "name")]
    pub device_name: NameString,
    pub bthome_version: u8,
    #[serde(rename = "bthome_encrypted")]
    pub encrypted: bool,
    pub rssi: i8,
    /// In decoder order
    pub measurements: Measurements,
}

impl Reading {
    /// Look up the first measurement with the given object id.
    pub fn measurement(&self, object_id: u8) -> Option<&Measurement> {
        self.measurements.iter().find(|m| m.object_id == object_id)
    }
}

/// Firmware version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum size of a serialized JSON reading
pub const MAX_MSG_LEN: usize = 1536;

/// Buffer type for serialized JSON readings
pub type MsgBuffer = Vec<u8, MAX_MSG_LEN>;
