use bletrack_domain::identity::BeaconIdentity;

use crate::event::{AddressType, AdvertisementRecord, EventType};

/// AD structures every iBeacon frame opens with: flags, then the
/// manufacturer-specific-data header.
const IBEACON_PREFIX: [u8; 5] = [0x02, 0x01, 0x04, 0x1A, 0xFF];

/// A recognized beacon advertisement.
#[derive(Debug, Clone, PartialEq)]
pub struct Beacon {
    pub identity: BeaconIdentity,
    pub tx_power: i8,
    pub payload: Vec<u8>,
}

/// Decide whether one advertisement is a beacon we track. iBeacon is
/// checked first, so a 30-byte iBeacon frame never reaches the secure
/// length test. Anything else is simply not a beacon.
pub fn classify(record: &AdvertisementRecord) -> Option<Beacon> {
    classify_ibeacon(record).or_else(|| classify_secure(record))
}

fn classify_ibeacon(record: &AdvertisementRecord) -> Option<Beacon> {
    let payload = &record.payload;
    if !matches!(payload.len(), 30 | 31) || !payload.starts_with(&IBEACON_PREFIX) {
        return None;
    }
    let uuid: [u8; 16] = payload[9..25].try_into().ok()?;
    let major = u16::from_be_bytes([payload[25], payload[26]]);
    let minor = u16::from_be_bytes([payload[27], payload[28]]);
    Some(Beacon {
        identity: BeaconIdentity::IBeacon { uuid, major, minor },
        tx_power: payload[29] as i8,
        payload: payload.clone(),
    })
}

fn classify_secure(record: &AdvertisementRecord) -> Option<Beacon> {
    let non_connectable = matches!(
        record.event_type,
        EventType::AdvNonconnInd | EventType::ScanRsp
    );
    if !non_connectable || record.address_type != AddressType::Random {
        return None;
    }
    // Both framings seen in the field: 18-23 bytes from newer radios,
    // exactly 30 from the original hardware.
    let len = record.payload.len();
    if !((18..=23).contains(&len) || len == 30) {
        return None;
    }
    let tx_power = *record.payload.last()? as i8;
    Some(Beacon {
        identity: BeaconIdentity::Secure {
            mac: record.address,
        },
        tx_power,
        payload: record.payload.clone(),
    })
}
