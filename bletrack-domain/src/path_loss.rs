/// Log-distance propagation model plus the fixed antenna geometry of the
/// listener: a height-above-antenna-baseline (HAAB) correction and a dB
/// offset folded into every raw RSSI sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PathModel {
    pub path_loss_exponent: f64,
    pub haab: f64,
    pub antenna_correction: i8,
}

impl Default for PathModel {
    fn default() -> PathModel {
        PathModel {
            path_loss_exponent: 3.2,
            haab: 0.0,
            antenna_correction: 0,
        }
    }
}

impl PathModel {
    /// Straight-line distance implied by the path-loss model, before any
    /// height correction.
    pub fn raw_distance(&self, tx_power: i8, level: f64) -> f64 {
        10f64.powf((f64::from(tx_power) - level) / (10.0 * self.path_loss_exponent))
    }

    /// Ground distance after the HAAB Pythagorean correction. A radicand
    /// below zero (beacon inside the antenna baseline) clamps to 0 rather
    /// than going NaN.
    pub fn distance(&self, tx_power: i8, level: f64) -> f64 {
        let raw = self.raw_distance(tx_power, level);
        (raw * raw - self.haab * self.haab).max(0.0).sqrt()
    }

    /// Distance variance in meters², linearizing the nonlinear RSSI map
    /// near the current estimate: evaluate one standard deviation to
    /// either side of the level and average the squared deviations.
    pub fn variance(&self, tx_power: i8, level: f64, level_variance: f64) -> f64 {
        let stddev = level_variance.sqrt();
        let center = self.raw_distance(tx_power, level);
        let below = self.raw_distance(tx_power, level - stddev);
        let above = self.raw_distance(tx_power, level + stddev);
        ((above - center).powi(2) + (below - center).powi(2)) / 2.0
    }
}
