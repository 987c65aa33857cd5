use serde_json::{Value, json};
use uuid::Uuid;

use crate::identity::BeaconIdentity;
use crate::record::BeaconRecord;
use crate::registry::{Registry, Visit};

/// JSON view of the live registry, one object per beacon. This is the
/// payload the admin surface serves; it reads the table through the same
/// visitor pass as everything else.
pub fn registry_json(registry: &mut Registry, now: f64) -> Value {
    let mut beacons = Vec::with_capacity(registry.len());
    let mut collect = |record: &mut BeaconRecord| {
        beacons.push(beacon_json(record, now));
        Visit::Keep
    };
    registry.visit(&mut [&mut collect]);
    Value::Array(beacons)
}

fn beacon_json(record: &BeaconRecord, now: f64) -> Value {
    let identity = match &record.identity {
        BeaconIdentity::IBeacon { uuid, major, minor } => json!({
            "type": "ibeacon",
            "uuid": Uuid::from_bytes(*uuid).to_string(),
            "major": major,
            "minor": minor,
        }),
        BeaconIdentity::Secure { .. } => json!({
            "type": "secure",
            "mac": record.identity.to_string(),
        }),
    };
    json!({
        "id": identity,
        "distance": record.distance,
        "error": record.variance.sqrt(),
        "age": now - record.filter.last_seen,
    })
}
