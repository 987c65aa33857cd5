use thiserror::Error;

use crate::event::AdvertisementRecord;

/// LE Meta Event code in the HCI event header.
pub const LE_META_EVENT: u8 = 0x3E;
/// Advertising Report subevent code, first byte of the event body.
pub const SUBEVENT_ADVERTISING_REPORT: u8 = 0x02;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("not an advertising report subevent: {0:#04x}")]
    WrongSubevent(u8),
    #[error("event body truncated: wanted {wanted} bytes, have {have}")]
    Truncated { wanted: usize, have: usize },
}

/// Deinterleave one LE Advertising Report body into its records.
///
/// The controller packs `N` reports structure-of-arrays style: all the
/// event types, then all the address types, then all the addresses, then
/// all the length bytes, then the concatenated payloads, and finally the
/// `N` RSSI bytes at the very tail. `body` starts at the subevent code
/// and spans exactly the event's parameter length.
///
/// Any offset that would run past the buffer fails the whole event; the
/// caller drops it and keeps going.
pub fn decode_event(body: &[u8]) -> Result<Vec<AdvertisementRecord>, DecodeError> {
    if body.len() < 2 {
        return Err(DecodeError::Truncated {
            wanted: 2,
            have: body.len(),
        });
    }
    if body[0] != SUBEVENT_ADVERTISING_REPORT {
        return Err(DecodeError::WrongSubevent(body[0]));
    }
    let n = usize::from(body[1]);
    if body.len() < n {
        return Err(DecodeError::Truncated {
            wanted: n,
            have: body.len(),
        });
    }
    // Payloads may not run into the RSSI array at the tail.
    let rssi_base = body.len() - n;

    let mut records = Vec::with_capacity(n);
    let mut payload_offset = 0usize;
    for i in 0..n {
        let event_type = byte_at(body, 2 + i)?;
        let address_type = byte_at(body, 2 + n + i)?;
        let address = array_at(body, 2 + 2 * n + 6 * i)?;
        let len = usize::from(byte_at(body, 2 + 8 * n + i)?);
        let payload_start = 2 + 9 * n + payload_offset;
        let payload_end = payload_start + len;
        if payload_end > rssi_base {
            return Err(DecodeError::Truncated {
                wanted: payload_end + n,
                have: body.len(),
            });
        }
        let payload = body[payload_start..payload_end].to_vec();
        let rssi = body[rssi_base + i] as i8;
        payload_offset += len;
        records.push(AdvertisementRecord {
            event_type: event_type.into(),
            address_type: address_type.into(),
            address,
            payload,
            rssi,
        });
    }
    Ok(records)
}

fn byte_at(body: &[u8], at: usize) -> Result<u8, DecodeError> {
    body.get(at).copied().ok_or(DecodeError::Truncated {
        wanted: at + 1,
        have: body.len(),
    })
}

fn array_at(body: &[u8], at: usize) -> Result<[u8; 6], DecodeError> {
    body.get(at..at + 6)
        .and_then(|s| s.try_into().ok())
        .ok_or(DecodeError::Truncated {
            wanted: at + 6,
            have: body.len(),
        })
}
