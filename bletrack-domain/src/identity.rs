use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a beacon names itself on air. iBeacons carry a fixed UUID plus a
/// major/minor pair; secure beacons rotate everything except their MAC.
/// Identities of different variants never compare equal.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub enum BeaconIdentity {
    IBeacon {
        uuid: [u8; 16],
        major: u16,
        minor: u16,
    },
    Secure {
        mac: [u8; 6],
    },
}

impl BeaconIdentity {
    /// Bucket key: the sum of the identity's raw bytes.
    pub fn byte_sum(&self) -> usize {
        use BeaconIdentity::{IBeacon, Secure};
        match self {
            IBeacon { uuid, major, minor } => {
                uuid.iter().map(|&b| usize::from(b)).sum::<usize>()
                    + usize::from(*major)
                    + usize::from(*minor)
            }
            Secure { mac } => mac.iter().map(|&b| usize::from(b)).sum(),
        }
    }
}

impl std::fmt::Display for BeaconIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use BeaconIdentity::{IBeacon, Secure};
        match self {
            IBeacon { uuid, major, minor } => {
                write!(f, "{} {major}/{minor}", Uuid::from_bytes(*uuid))
            }
            Secure { mac } => {
                for byte in mac {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}
