use bletrack_domain::identity::BeaconIdentity;
use bletrack_domain::record::BeaconRecord;
use bletrack_domain::registry::{Registry, Visit};

/// Wire protocol version, upper nibble of the first header byte.
pub const REPORT_VERSION: u8 = 0;

/// uuid · major · minor · pending count · distance · variance
pub const IBEACON_RECORD_LEN: u8 = 26;

/// Send a keepalive when no data packet has gone out for this long.
pub const KEEPALIVE_SECS: f64 = 30.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Keepalive = 0,
    Data = 1,
    Secure = 2,
}

/// Serializes beacons with unreported observations into the collector's
/// binary packet layout. Multi-byte fields are big-endian except where
/// the secure record says otherwise; the mix is load-bearing for wire
/// compatibility.
pub struct ReportEncoder {
    hostname: Vec<u8>,
}

impl ReportEncoder {
    pub fn new(hostname: &str) -> ReportEncoder {
        let mut hostname = hostname.as_bytes().to_vec();
        hostname.truncate(usize::from(u8::MAX));
        ReportEncoder { hostname }
    }

    pub fn header_len(&self) -> usize {
        3 + self.hostname.len()
    }

    fn header(&self, packet_type: PacketType, record_len: u8) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.header_len());
        buf.push(REPORT_VERSION << 4 | packet_type as u8);
        buf.push(record_len);
        buf.push(self.hostname.len() as u8);
        buf.extend_from_slice(&self.hostname);
        buf
    }

    pub fn keepalive(&self) -> Vec<u8> {
        self.header(PacketType::Keepalive, 0)
    }

    /// Delta-batch every iBeacon with pending observations into one Data
    /// packet, resetting the pending counters as it goes. `None` when no
    /// beacon contributed; the caller substitutes a keepalive.
    pub fn encode_data(&self, registry: &mut Registry) -> Option<Vec<u8>> {
        let mut buf = self.header(PacketType::Data, IBEACON_RECORD_LEN);
        let mut append = |record: &mut BeaconRecord| {
            if record.pending_count == 0 {
                return Visit::Keep;
            }
            if let BeaconIdentity::IBeacon { uuid, major, minor } = record.identity {
                buf.extend_from_slice(&uuid);
                buf.extend_from_slice(&major.to_be_bytes());
                buf.extend_from_slice(&minor.to_be_bytes());
                buf.extend_from_slice(&record.pending_count.to_be_bytes());
                buf.extend_from_slice(&centimeters(record.distance).to_be_bytes());
                buf.extend_from_slice(&centimeters(record.variance).to_be_bytes());
                record.pending_count = 0;
            }
            Visit::Keep
        };
        registry.visit(&mut [&mut append]);
        if buf.len() <= self.header_len() {
            None
        } else {
            Some(buf)
        }
    }

    /// One secure-beacon observation, reported immediately rather than
    /// batched. The trailing tx-power byte of the raw advertisement stays
    /// out of the record.
    pub fn encode_secure(&self, record: &mut BeaconRecord, payload: &[u8]) -> Option<Vec<u8>> {
        let BeaconIdentity::Secure { mac } = record.identity else {
            return None;
        };
        let body = payload.split_last().map(|(_, body)| body).unwrap_or(&[]);
        let record_len = (6 + body.len() + 4) as u8;
        let mut buf = self.header(PacketType::Secure, record_len);
        buf.extend_from_slice(&mac);
        buf.extend_from_slice(body);
        buf.extend_from_slice(&centimeters(record.distance).to_le_bytes());
        buf.extend_from_slice(&centimeters(record.variance).to_le_bytes());
        record.pending_count = 0;
        Some(buf)
    }
}

/// Centimeter-resolution wire field, saturating at u16::MAX.
fn centimeters(meters: f64) -> u16 {
    (meters * 100.0).round().clamp(0.0, f64::from(u16::MAX)) as u16
}

#[cfg(test)]
mod test {
    use super::{IBEACON_RECORD_LEN, PacketType, ReportEncoder, centimeters};
    use bletrack_domain::identity::BeaconIdentity;
    use bletrack_domain::registry::Registry;

    fn encoder() -> ReportEncoder {
        ReportEncoder::new("node-7")
    }

    fn ibeacon(minor: u16) -> BeaconIdentity {
        BeaconIdentity::IBeacon {
            uuid: [0x42; 16],
            major: 258,
            minor,
        }
    }

    #[test]
    fn header_layout() {
        let packet = encoder().keepalive();
        assert_eq!(packet.len(), 3 + 6);
        assert_eq!(packet[0], PacketType::Keepalive as u8); // version 0, type 0
        assert_eq!(packet[1], 0);
        assert_eq!(packet[2], 6);
        assert_eq!(&packet[3..], b"node-7");
    }

    #[test]
    fn empty_registry_yields_no_data_packet() {
        let mut registry = Registry::new();
        assert_eq!(encoder().encode_data(&mut registry), None);
    }

    #[test]
    fn zero_pending_beacons_contribute_nothing() {
        let mut registry = Registry::new();
        registry.find_or_add(ibeacon(1));
        assert_eq!(encoder().encode_data(&mut registry), None);
    }

    #[test]
    fn pending_beacon_is_encoded_and_reset() {
        let mut registry = Registry::new();
        {
            let record = registry.find_or_add(ibeacon(0x0304));
            record.pending_count = 3;
            record.distance = 3.16;
            record.variance = 1.5;
        }
        let encoder = encoder();
        let packet = encoder.encode_data(&mut registry).unwrap();
        assert_eq!(packet[0], 0x01); // version 0, type Data
        assert_eq!(packet[1], IBEACON_RECORD_LEN);
        let record = &packet[encoder.header_len()..];
        assert_eq!(record.len(), usize::from(IBEACON_RECORD_LEN));
        assert_eq!(&record[..16], &[0x42; 16]);
        assert_eq!(&record[16..18], &[0x01, 0x02]); // major 258 BE
        assert_eq!(&record[18..20], &[0x03, 0x04]); // minor BE
        assert_eq!(&record[20..22], &[0x00, 0x03]); // pending count BE
        assert_eq!(&record[22..24], &316u16.to_be_bytes());
        assert_eq!(&record[24..26], &150u16.to_be_bytes());

        // Consumed: the next cycle has nothing to say.
        assert_eq!(registry.find(&ibeacon(0x0304)).unwrap().pending_count, 0);
        assert_eq!(encoder.encode_data(&mut registry), None);
    }

    #[test]
    fn only_pending_beacons_are_batched() {
        let mut registry = Registry::new();
        registry.find_or_add(ibeacon(1)).pending_count = 1;
        registry.find_or_add(ibeacon(2));
        registry.find_or_add(ibeacon(3)).pending_count = 5;
        let encoder = encoder();
        let packet = encoder.encode_data(&mut registry).unwrap();
        let body_len = packet.len() - encoder.header_len();
        assert_eq!(body_len, 2 * usize::from(IBEACON_RECORD_LEN));
    }

    #[test]
    fn secure_record_layout() {
        let mut registry = Registry::new();
        let mac = [0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01];
        let record = registry.find_or_add(BeaconIdentity::Secure { mac });
        record.pending_count = 2;
        record.distance = 1.0;
        record.variance = 0.25;
        let payload: Vec<u8> = (0..20).collect();

        let encoder = encoder();
        let packet = encoder.encode_secure(record, &payload).unwrap();
        assert_eq!(packet[0], 0x02); // version 0, type Secure
        assert_eq!(packet[1], (6 + 19 + 4) as u8);
        let body = &packet[encoder.header_len()..];
        assert_eq!(&body[..6], &mac);
        assert_eq!(&body[6..25], &payload[..19]); // tx byte stripped
        assert_eq!(&body[25..27], &100u16.to_le_bytes());
        assert_eq!(&body[27..29], &25u16.to_le_bytes());
        assert_eq!(record.pending_count, 0);
    }

    #[test]
    fn secure_encoder_rejects_ibeacon_records() {
        let mut registry = Registry::new();
        let record = registry.find_or_add(ibeacon(1));
        assert!(encoder().encode_secure(record, &[0; 20]).is_none());
    }

    #[test]
    fn centimeters_round_and_saturate() {
        assert_eq!(centimeters(0.0), 0);
        assert_eq!(centimeters(3.162), 316);
        assert_eq!(centimeters(3.1651), 317);
        assert_eq!(centimeters(1000.0), u16::MAX);
        assert_eq!(centimeters(-1.0), 0);
    }
}
