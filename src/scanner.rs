/// BLE advertisement boundary.
///
/// The BLE stack hands out advertisement reports that borrow its receive
/// buffer. [`AdvertisementEvent`] keeps that borrow explicit: it cannot outlive
/// the callback that produced it, and anything needed later must be copied out
/// (see [`crate::protocol::Reading`]).
use crate::protocol::MacString;

/// Bluetooth base UUID `00000000-0000-1000-8000-00805F9B34FB`, little-endian
/// as carried over the air. Bytes 12..16 hold the 16/32-bit alias.
const BASE_UUID_LE: [u8; 16] = [
    0xFB, 0x34, 0x9B, 0x5F, 0x80, 0x00, 0x00, 0x80, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Service identifier attached to a service data entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceUuid {
    Uuid16(u16),
    Uuid32(u32),
    /// Little-endian, as carried over the air
    Uuid128([u8; 16]),
}

impl ServiceUuid {
    /// The 16-bit short form of this UUID, if it has one.
    ///
    /// 32- and 128-bit UUIDs built on the Bluetooth base UUID alias a 16-bit
    /// value when their upper bits are zero.
    pub fn as_u16(&self) -> Option<u16> {
        match *self {
            ServiceUuid::Uuid16(v) => Some(v),
            ServiceUuid::Uuid32(v) => u16::try_from(v).ok(),
            ServiceUuid::Uuid128(b) => {
                if b[..12] == BASE_UUID_LE[..12] && b[14] == 0 && b[15] == 0 {
                    Some(u16::from_le_bytes([b[12], b[13]]))
                } else {
                    None
                }
            }
        }
    }
}

/// One service data AD structure: identifier plus raw payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceData<'a> {
    pub uuid: ServiceUuid,
    pub data: &'a [u8],
}

/// A parsed BLE advertisement, valid only for the duration of the scan callback.
#[derive(Debug, Clone)]
pub struct AdvertisementEvent<'a> {
    /// Address in display order (most significant byte first)
    pub mac: [u8; 6],
    pub rssi: i8,
    /// Shortened or complete local name, if advertised
    pub name: Option<&'a str>,
    /// Raw AD structures, walked again by [`AdvertisementEvent::service_data`]
    ad_data: &'a [u8],
}

impl<'a> AdvertisementEvent<'a> {
    /// Parse advertisement data (AD structures) into an event.
    ///
    /// AD structure format: [length] [type] [data...]
    /// Types we care about:
    ///   0x08/0x09 = Shortened/Complete local name
    ///   0x16      = Service data, 16-bit UUID
    ///   0x20      = Service data, 32-bit UUID
    ///   0x21      = Service data, 128-bit UUID
    ///
    /// Only the name is extracted here. Service data stays in `ad_data` and is
    /// yielded lazily, so any number of entries is seen.
    pub fn parse(mac: [u8; 6], rssi: i8, ad_data: &'a [u8]) -> Self {
        let mut name = None;
        for (ad_type, data) in AdStructures::new(ad_data) {
            match ad_type {
                // Shortened name only fills in when no complete name was seen
                0x08 => {
                    if name.is_none() {
                        name = core::str::from_utf8(data).ok();
                    }
                }
                0x09 => {
                    if let Ok(complete) = core::str::from_utf8(data) {
                        name = Some(complete);
                    }
                }
                _ => {}
            }
        }

        AdvertisementEvent {
            mac,
            rssi,
            name,
            ad_data,
        }
    }

    /// Service data entries in the order they appear in the advertisement.
    pub fn service_data(&self) -> ServiceDataIter<'a> {
        ServiceDataIter {
            structures: AdStructures::new(self.ad_data),
        }
    }

    /// Whether the advertisement carried any service data at all.
    pub fn has_service_data(&self) -> bool {
        self.service_data().next().is_some()
    }
}

/// Walks AD structures as `(type, data)` pairs.
///
/// Stops at the first zero-length or truncated structure.
#[derive(Debug, Clone)]
struct AdStructures<'a> {
    ad_data: &'a [u8],
    pos: usize,
}

impl<'a> AdStructures<'a> {
    fn new(ad_data: &'a [u8]) -> Self {
        AdStructures { ad_data, pos: 0 }
    }
}

impl<'a> Iterator for AdStructures<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let pos = self.pos;
        let len = *self.ad_data.get(pos)? as usize;
        if len == 0 || pos + 1 + len > self.ad_data.len() {
            self.pos = self.ad_data.len();
            return None;
        }
        self.pos = pos + 1 + len;
        Some((self.ad_data[pos + 1], &self.ad_data[pos + 2..pos + 1 + len]))
    }
}

/// Iterator over the service data entries of an advertisement.
#[derive(Debug, Clone)]
pub struct ServiceDataIter<'a> {
    structures: AdStructures<'a>,
}

impl<'a> Iterator for ServiceDataIter<'a> {
    type Item = ServiceData<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        for (ad_type, data) in self.structures.by_ref() {
            let entry = match ad_type {
                0x16 if data.len() >= 2 => ServiceData {
                    uuid: ServiceUuid::Uuid16(u16::from_le_bytes([data[0], data[1]])),
                    data: &data[2..],
                },
                0x20 if data.len() >= 4 => ServiceData {
                    uuid: ServiceUuid::Uuid32(u32::from_le_bytes([data[0], data[1], data[2], data[3]])),
                    data: &data[4..],
                },
                0x21 if data.len() >= 16 => {
                    let mut uuid = [0u8; 16];
                    uuid.copy_from_slice(&data[..16]);
                    ServiceData {
                        uuid: ServiceUuid::Uuid128(uuid),
                        data: &data[16..],
                    }
                }
                _ => continue,
            };
            return Some(entry);
        }
        None
    }
}

/// Convert an HCI address (little-endian on the wire) into display order.
///
/// Returns `None` if `raw` is not exactly six bytes.
pub fn mac_from_hci(raw: &[u8]) -> Option<[u8; 6]> {
    let mut mac: [u8; 6] = raw.try_into().ok()?;
    mac.reverse();
    Some(mac)
}

/// Format a 6-byte MAC address into "AA:BB:CC:DD:EE:FF" string
pub fn format_mac(mac: &[u8; 6], buf: &mut MacString) {
    use core::fmt::Write;
    buf.clear();
    let _ = write!(
        buf,
        "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    );
}
