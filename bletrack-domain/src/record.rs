use crate::identity::BeaconIdentity;
use crate::kalman::KalmanState;
use crate::path_loss::PathModel;

/// The durable per-beacon entity. Created on the first recognized
/// advertisement for an identity, mutated on every subsequent one, and
/// destroyed only by the eviction sweep.
#[derive(Clone, Debug)]
pub struct BeaconRecord {
    pub identity: BeaconIdentity,
    pub filter: KalmanState,
    /// Meters, rederived on every observation.
    pub distance: f64,
    /// Meters², rederived on every observation.
    pub variance: f64,
    /// Reference power averaged over the observations of the current
    /// report cycle.
    pub tx_power: i8,
    /// Advertisements seen since the encoder last consumed this record.
    pub pending_count: u16,
}

impl BeaconRecord {
    pub fn new(identity: BeaconIdentity) -> BeaconRecord {
        BeaconRecord {
            identity,
            filter: KalmanState::default(),
            distance: 0.0,
            variance: 0.0,
            tx_power: 0,
            pending_count: 0,
        }
    }

    /// Fold one advertisement into the record: filter the corrected RSSI,
    /// rederive distance and variance, average the advertised tx power,
    /// and bump the pending counter.
    pub fn observe(&mut self, rssi: i8, tx_power: i8, ts: f64, model: &PathModel) {
        let corrected = f64::from(rssi) + f64::from(model.antenna_correction);
        let level = self.filter.update(corrected, ts);
        self.distance = model.distance(tx_power, level);
        self.variance = model.variance(tx_power, level, self.filter.covariance[0][0]);
        let n = i32::from(self.pending_count);
        self.tx_power =
            ((n * i32::from(self.tx_power) + i32::from(tx_power)) / (n + 1)) as i8;
        self.pending_count = self.pending_count.saturating_add(1);
    }
}
