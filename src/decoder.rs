/// Payload decoder contract and the adapter that turns decoded telemetry into
/// mailbox readings.
///
/// The decoder is a collaborator behind [`PayloadDecoder`]; the crate ships a
/// plaintext BTHome v2 implementation in [`crate::bthome`]. The adapter runs
/// in the scan callback: filter, decode, copy into an owned [`Reading`],
/// publish. Nothing else happens in that context.
use core::fmt;

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::defaults::NO_NAME;
use crate::filter::telemetry_entries;
use crate::mailbox::Mailbox;
use crate::protocol::{MacString, Measurements, NameString, Reading};
use crate::scanner::{format_mac, AdvertisementEvent};

/// AES-128 bind key for encrypted BTHome payloads.
pub type BindKey = [u8; 16];

/// Outcome of decoding one service data payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodeResult {
    /// The payload is in the telemetry format at all
    pub is_bthome: bool,
    /// Decryption worked, or the payload was not encrypted
    pub decryption_succeeded: bool,
    pub version: u8,
    pub is_encrypted: bool,
    pub measurements: Measurements,
}

impl DecodeResult {
    /// Result for a payload that is not telemetry.
    pub fn rejected() -> Self {
        Self::default()
    }

    /// Whether this result should be published.
    pub fn is_usable(&self) -> bool {
        self.is_bthome && self.decryption_succeeded
    }
}

/// Decodes one raw service data payload.
///
/// Implementations must not keep references into `payload` past the call.
/// `address` is the source device address in "AA:BB:CC:DD:EE:FF" form, used
/// for the encryption nonce. `key` is `None` when no decryption is configured.
pub trait PayloadDecoder {
    fn decode(&self, payload: &[u8], address: &str, key: Option<&BindKey>) -> DecodeResult;
}

/// Error parsing a bind key string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindKeyError {
    /// Not exactly 32 hex characters
    Length(usize),
    /// Non-hex character at the given position
    InvalidDigit(usize),
}

impl fmt::Display for BindKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindKeyError::Length(len) => {
                write!(f, "bind key must be 32 hex characters, got {len}")
            }
            BindKeyError::InvalidDigit(pos) => {
                write!(f, "bind key has a non-hex character at position {pos}")
            }
        }
    }
}

/// Parse a 32-character hex bind key. An empty string means "no key".
pub fn parse_bind_key(hex: &str) -> Result<Option<BindKey>, BindKeyError> {
    let hex = hex.trim();
    if hex.is_empty() {
        return Ok(None);
    }
    if hex.len() != 32 {
        return Err(BindKeyError::Length(hex.len()));
    }

    let mut key = [0u8; 16];
    for (i, pair) in hex.as_bytes().chunks(2).enumerate() {
        let hi = hex_digit(pair[0]).ok_or(BindKeyError::InvalidDigit(i * 2))?;
        let lo = hex_digit(pair[1]).ok_or(BindKeyError::InvalidDigit(i * 2 + 1))?;
        key[i] = (hi << 4) | lo;
    }
    Ok(Some(key))
}

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Build an owned reading from the callback-scoped event and a usable decode.
fn build_reading(event: &AdvertisementEvent<'_>, device_id: &MacString, result: DecodeResult) -> Reading {
    let mut device_name = NameString::new();
    let name = event.name.filter(|n| !n.is_empty()).unwrap_or(NO_NAME);
    for c in name.chars() {
        if device_name.push(c).is_err() {
            break;
        }
    }

    Reading {
        device_id: device_id.clone(),
        device_name,
        bthome_version: result.version,
        encrypted: result.is_encrypted,
        rssi: event.rssi,
        measurements: result.measurements,
    }
}

/// Decode every telemetry entry of an advertisement and publish the usable ones.
///
/// Entries are handled in advertised order, so when several decode the last
/// one is left in the mailbox. A rejected entry does not stop its siblings.
/// Returns the number of readings published.
pub fn process_advertisement<D, M>(
    event: &AdvertisementEvent<'_>,
    decoder: &D,
    key: Option<&BindKey>,
    mailbox: &Mailbox<M>,
) -> usize
where
    D: PayloadDecoder + ?Sized,
    M: RawMutex,
{
    let mut device_id = MacString::new();
    let mut published = 0;

    for entry in telemetry_entries(event) {
        if device_id.is_empty() {
            format_mac(&event.mac, &mut device_id);
        }

        let result = decoder.decode(entry.data, &device_id, key);
        if !result.is_usable() {
            log::debug!(
                "Dropped payload from {} (bthome={}, decrypted={})",
                device_id,
                result.is_bthome,
                result.decryption_succeeded
            );
            continue;
        }

        mailbox.publish(build_reading(event, &device_id, result));
        published += 1;
    }

    published
}
