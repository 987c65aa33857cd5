/// Spectral density of the process noise.
pub const Q_SPECTRAL_DENSITY: f64 = 0.01;
/// Fixed variance of a single RSSI measurement.
pub const MEASUREMENT_VARIANCE: f64 = 9.0;

/// Two-state (level, trend) constant-velocity Kalman filter over RSSI
/// samples arriving at an arbitrary rate. The process noise matrix is
/// rebuilt per sample to account for the variable time step.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct KalmanState {
    pub level: f64,
    pub trend: f64,
    pub covariance: [[f64; 2]; 2],
    pub initialized: bool,
    pub last_seen: f64,
}

impl KalmanState {
    /// Fold in one measurement `z` observed at `ts`, returning the
    /// smoothed signal level. The first observation passes through
    /// unfiltered.
    pub fn update(&mut self, z: f64, ts: f64) -> f64 {
        if !self.initialized {
            self.level = z;
            self.trend = 0.0;
            // Initial covariance calibrated against a usb dongle and a dev board
            self.covariance = [[1.2, 0.45], [0.45, 0.34]];
            self.last_seen = ts;
            self.initialized = true;
            return z;
        }
        let dt = ts - self.last_seen;
        self.last_seen = ts;

        let q = [
            [
                Q_SPECTRAL_DENSITY * dt * dt * dt / 3.0,
                Q_SPECTRAL_DENSITY * dt * dt / 2.0,
            ],
            [Q_SPECTRAL_DENSITY * dt * dt / 2.0, Q_SPECTRAL_DENSITY * dt],
        ];

        // Predict
        let level_est = self.level + self.trend * dt;
        let trend_est = self.trend;
        let p = &self.covariance;
        let p_est = [
            [
                p[0][0] + (p[1][0] + p[0][1]) * dt + p[1][1] * dt * dt + q[0][0],
                p[0][1] + p[1][1] * dt + q[0][1],
            ],
            [p[1][0] + p[1][1] * dt + q[1][0], p[1][1] + q[1][1]],
        ];

        // Update
        let k0 = p_est[0][0] / (p_est[0][0] + MEASUREMENT_VARIANCE);
        let k1 = p_est[1][0] / (p_est[0][0] + MEASUREMENT_VARIANCE);
        self.level = k0 * (z - level_est) + level_est;
        self.trend = k1 * (z - level_est) + trend_est;
        self.covariance = [
            [p_est[0][0] * (1.0 - k0), p_est[0][1] * (1.0 - k0)],
            [
                p_est[1][0] - p_est[0][0] * k1,
                p_est[1][1] - p_est[0][1] * k1,
            ],
        ];
        self.level
    }
}
