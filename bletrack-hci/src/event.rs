/// Advertising PDU types carried in an LE Advertising Report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventType {
    AdvInd,
    AdvDirectInd,
    AdvScanInd,
    AdvNonconnInd,
    ScanRsp,
    Unknown(u8),
}

impl From<u8> for EventType {
    fn from(byte: u8) -> EventType {
        match byte {
            0x00 => EventType::AdvInd,
            0x01 => EventType::AdvDirectInd,
            0x02 => EventType::AdvScanInd,
            0x03 => EventType::AdvNonconnInd,
            0x04 => EventType::ScanRsp,
            other => EventType::Unknown(other),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressType {
    Public,
    Random,
    PublicIdentity,
    RandomIdentity,
    Unknown(u8),
}

impl From<u8> for AddressType {
    fn from(byte: u8) -> AddressType {
        match byte {
            0x00 => AddressType::Public,
            0x01 => AddressType::Random,
            0x02 => AddressType::PublicIdentity,
            0x03 => AddressType::RandomIdentity,
            other => AddressType::Unknown(other),
        }
    }
}

/// One advertisement deinterleaved out of a controller event. Lives only
/// long enough to be classified.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdvertisementRecord {
    pub event_type: EventType,
    pub address_type: AddressType,
    pub address: [u8; 6],
    pub payload: Vec<u8>,
    pub rssi: i8,
}
