/// Payload filter: selects the service data entries that carry BTHome telemetry.
///
/// Runs in the radio callback, so it does no allocation and rejects
/// advertisements without service data before looking at anything else.
use crate::defaults::BTHOME_SERVICE_UUID16;
use crate::scanner::{AdvertisementEvent, ServiceData, ServiceUuid};

/// Whether a service identifier is the BTHome telemetry service.
pub fn is_telemetry_uuid(uuid: &ServiceUuid) -> bool {
    uuid.as_u16() == Some(BTHOME_SERVICE_UUID16)
}

/// Iterate over the telemetry entries of an advertisement, in advertised order.
///
/// Non-matching entries are skipped silently, however many there are. An
/// advertisement without service data yields nothing.
pub fn telemetry_entries<'a>(
    event: &AdvertisementEvent<'a>,
) -> impl Iterator<Item = ServiceData<'a>> {
    event
        .service_data()
        .filter(|entry| is_telemetry_uuid(&entry.uuid))
}
