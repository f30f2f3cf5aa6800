/// Plaintext BTHome v2 payload decoder.
///
/// Payload layout (service data for UUID 0xFCD2, UUID already stripped):
///   [device info] [object id] [value...] [object id] [value...] ...
///
/// Device info: bit 0 = encrypted, bit 2 = trigger based, bits 5..7 = version.
/// Values are little-endian; width, signedness and scale come from [`OBJECTS`].
///
/// Encrypted payloads are recognized but not decrypted: there is no AES-CCM
/// implementation in this firmware, so they come back with
/// `decryption_succeeded = false` and are dropped by the adapter.
use crate::decoder::{BindKey, DecodeResult, PayloadDecoder};
use crate::protocol::Measurement;

/// BTHome format version understood by this decoder.
pub const BTHOME_VERSION: u8 = 2;

const FLAG_ENCRYPTED: u8 = 0x01;
const FLAG_TRIGGER_BASED: u8 = 0x04;

/// Text (0x53) and raw (0x54) objects carry a length byte instead of a fixed width.
const VARIABLE_LENGTH_OBJECTS: &[u8] = &[0x53, 0x54];

/// Fixed-width BTHome object definition.
#[derive(Debug, Clone, Copy)]
pub struct ObjectSpec {
    pub id: u8,
    pub name: &'static str,
    /// Value width in bytes (1..=4)
    pub len: u8,
    pub signed: bool,
    /// Raw value is divided by this to get the reported value
    pub divisor: f32,
    pub unit: &'static str,
}

const fn obj(
    id: u8,
    name: &'static str,
    len: u8,
    signed: bool,
    divisor: f32,
    unit: &'static str,
) -> ObjectSpec {
    ObjectSpec {
        id,
        name,
        len,
        signed,
        divisor,
        unit,
    }
}

/// Known BTHome v2 objects.
///
/// Source: bthome.io format table (sensor, binary sensor and event objects).
pub static OBJECTS: &[ObjectSpec] = &[
    // === Misc ===
    obj(0x00, "packet_id", 1, false, 1.0, ""),
    // === Sensors ===
    obj(0x01, "battery", 1, false, 1.0, "%"),
    obj(0x02, "temperature", 2, true, 100.0, "°C"),
    obj(0x03, "humidity", 2, false, 100.0, "%"),
    obj(0x04, "pressure", 3, false, 100.0, "hPa"),
    obj(0x05, "illuminance", 3, false, 100.0, "lux"),
    obj(0x06, "mass", 2, false, 100.0, "kg"),
    obj(0x07, "mass", 2, false, 100.0, "lb"),
    obj(0x08, "dewpoint", 2, true, 100.0, "°C"),
    obj(0x09, "count", 1, false, 1.0, ""),
    obj(0x0A, "energy", 3, false, 1000.0, "kWh"),
    obj(0x0B, "power", 3, false, 100.0, "W"),
    obj(0x0C, "voltage", 2, false, 1000.0, "V"),
    obj(0x0D, "pm2_5", 2, false, 1.0, "ug/m3"),
    obj(0x0E, "pm10", 2, false, 1.0, "ug/m3"),
    // === Binary sensors ===
    obj(0x0F, "generic_boolean", 1, false, 1.0, ""),
    obj(0x10, "power_on", 1, false, 1.0, ""),
    obj(0x11, "opening", 1, false, 1.0, ""),
    obj(0x12, "co2", 2, false, 1.0, "ppm"),
    obj(0x13, "tvoc", 2, false, 1.0, "ug/m3"),
    obj(0x14, "moisture", 2, false, 100.0, "%"),
    obj(0x15, "battery_low", 1, false, 1.0, ""),
    obj(0x16, "battery_charging", 1, false, 1.0, ""),
    obj(0x17, "carbon_monoxide", 1, false, 1.0, ""),
    obj(0x18, "cold", 1, false, 1.0, ""),
    obj(0x19, "connectivity", 1, false, 1.0, ""),
    obj(0x1A, "door", 1, false, 1.0, ""),
    obj(0x1B, "garage_door", 1, false, 1.0, ""),
    obj(0x1C, "gas_detected", 1, false, 1.0, ""),
    obj(0x1D, "heat", 1, false, 1.0, ""),
    obj(0x1E, "light", 1, false, 1.0, ""),
    obj(0x1F, "lock", 1, false, 1.0, ""),
    obj(0x20, "moisture_detected", 1, false, 1.0, ""),
    obj(0x21, "motion", 1, false, 1.0, ""),
    obj(0x22, "moving", 1, false, 1.0, ""),
    obj(0x23, "occupancy", 1, false, 1.0, ""),
    obj(0x24, "plug", 1, false, 1.0, ""),
    obj(0x25, "presence", 1, false, 1.0, ""),
    obj(0x26, "problem", 1, false, 1.0, ""),
    obj(0x27, "running", 1, false, 1.0, ""),
    obj(0x28, "safety", 1, false, 1.0, ""),
    obj(0x29, "smoke", 1, false, 1.0, ""),
    obj(0x2A, "sound", 1, false, 1.0, ""),
    obj(0x2B, "tamper", 1, false, 1.0, ""),
    obj(0x2C, "vibration", 1, false, 1.0, ""),
    obj(0x2D, "window", 1, false, 1.0, ""),
    // === Sensors (continued) ===
    obj(0x2E, "humidity", 1, false, 1.0, "%"),
    obj(0x2F, "moisture", 1, false, 1.0, "%"),
    // === Events ===
    obj(0x3A, "button", 1, false, 1.0, ""),
    obj(0x3C, "dimmer", 2, false, 1.0, ""),
    // === Sensors (continued) ===
    obj(0x3D, "count", 2, false, 1.0, ""),
    obj(0x3E, "count", 4, false, 1.0, ""),
    obj(0x3F, "rotation", 2, true, 10.0, "°"),
    obj(0x40, "distance", 2, false, 1.0, "mm"),
    obj(0x41, "distance", 2, false, 10.0, "m"),
    obj(0x42, "duration", 3, false, 1000.0, "s"),
    obj(0x43, "current", 2, false, 1000.0, "A"),
    obj(0x44, "speed", 2, false, 100.0, "m/s"),
    obj(0x45, "temperature", 2, true, 10.0, "°C"),
    obj(0x46, "uv_index", 1, false, 10.0, ""),
    obj(0x47, "volume", 2, false, 10.0, "L"),
    obj(0x48, "volume", 2, false, 1.0, "mL"),
    obj(0x49, "volume_flow_rate", 2, false, 1000.0, "m3/hr"),
    obj(0x4A, "voltage", 2, false, 10.0, "V"),
    obj(0x4B, "gas", 3, false, 1000.0, "m3"),
    obj(0x4C, "gas", 4, false, 1000.0, "m3"),
    obj(0x4D, "energy", 4, false, 1000.0, "kWh"),
    obj(0x4E, "volume", 4, false, 1000.0, "L"),
    obj(0x4F, "water", 4, false, 1000.0, "L"),
    obj(0x50, "timestamp", 4, false, 1.0, "s"),
    obj(0x51, "acceleration", 2, false, 1000.0, "m/s²"),
    obj(0x52, "gyroscope", 2, false, 1000.0, "°/s"),
    obj(0x55, "volume_storage", 4, false, 1000.0, "L"),
    obj(0x56, "conductivity", 2, false, 1.0, "µS/cm"),
    obj(0x57, "temperature", 1, true, 1.0, "°C"),
    obj(0x59, "count", 1, true, 1.0, ""),
    obj(0x5A, "count", 2, true, 1.0, ""),
    obj(0x5B, "count", 4, true, 1.0, ""),
    obj(0x5C, "power", 4, true, 100.0, "W"),
    obj(0x5D, "current", 2, true, 1000.0, "A"),
    obj(0x5E, "direction", 2, false, 100.0, "°"),
    obj(0x5F, "precipitation", 2, false, 10.0, "mm"),
    obj(0x60, "channel", 1, false, 1.0, ""),
    obj(0x61, "rotational_speed", 2, false, 1.0, "rpm"),
];

/// Look up the definition of a BTHome object id.
pub fn object_spec(id: u8) -> Option<&'static ObjectSpec> {
    OBJECTS.iter().find(|spec| spec.id == id)
}

/// Read a little-endian integer of 1..=4 bytes, sign-extending if requested.
fn read_le(bytes: &[u8], signed: bool) -> i64 {
    let mut raw: u32 = 0;
    for (i, &b) in bytes.iter().enumerate() {
        raw |= u32::from(b) << (8 * i);
    }
    let bits = 8 * bytes.len() as u32;
    if signed && bits < 32 && raw & (1 << (bits - 1)) != 0 {
        i64::from(raw) - (1i64 << bits)
    } else if signed {
        i64::from(raw as i32)
    } else {
        i64::from(raw)
    }
}

/// Built-in [`PayloadDecoder`] for unencrypted BTHome v2 advertisements.
#[derive(Debug, Clone, Copy, Default)]
pub struct BthomeDecoder;

impl BthomeDecoder {
    pub const fn new() -> Self {
        Self
    }
}

impl PayloadDecoder for BthomeDecoder {
    fn decode(&self, payload: &[u8], address: &str, key: Option<&BindKey>) -> DecodeResult {
        let Some((&info, objects)) = payload.split_first() else {
            return DecodeResult::rejected();
        };

        let version = (info >> 5) & 0x07;
        if version != BTHOME_VERSION {
            return DecodeResult::rejected();
        }

        let mut result = DecodeResult {
            is_bthome: true,
            decryption_succeeded: true,
            version,
            is_encrypted: info & FLAG_ENCRYPTED != 0,
            measurements: Default::default(),
        };

        if result.is_encrypted {
            log::debug!(
                "{}: encrypted BTHome payload (key {}), decryption unsupported",
                address,
                if key.is_some() { "set" } else { "missing" }
            );
            result.decryption_succeeded = false;
            return result;
        }

        if info & FLAG_TRIGGER_BASED != 0 {
            log::trace!("{}: trigger-based BTHome device", address);
        }

        let mut pos = 0;
        while pos < objects.len() {
            let id = objects[pos];
            pos += 1;

            if VARIABLE_LENGTH_OBJECTS.contains(&id) {
                let Some(&len) = objects.get(pos) else {
                    break;
                };
                pos += 1 + len as usize;
                continue;
            }

            let Some(spec) = object_spec(id) else {
                // Width unknown, nothing after this can be located
                log::debug!("{}: unknown BTHome object 0x{:02X}", address, id);
                break;
            };

            let end = pos + spec.len as usize;
            let Some(bytes) = objects.get(pos..end) else {
                log::debug!("{}: truncated BTHome object 0x{:02X}", address, id);
                break;
            };
            pos = end;

            let value = read_le(bytes, spec.signed) as f32 / spec.divisor;
            let measurement = Measurement {
                object_id: spec.id,
                name: spec.name,
                value,
                unit: spec.unit,
            };
            if result.measurements.push(measurement).is_err() {
                log::debug!("{}: measurement list full, dropping the rest", address);
                break;
            }
        }

        result
    }
}
