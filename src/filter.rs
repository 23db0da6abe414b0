//! Per-frame detection filter: gating, scalar Kalman velocity smoothing,
//! and wrap-safe azimuth smoothing.

use crate::wire::RawTarget;

/// Direction inferred from the sign of the raw (pre-smoothing) velocity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Direction {
    /// `velocity_m_s > 0`.
    Incoming,
    /// `velocity_m_s < 0`.
    Outgoing,
    /// `velocity_m_s == 0`.
    Static,
}

impl Direction {
    fn from_signed_velocity(v: f32) -> Direction {
        if v > 0.0 {
            Direction::Incoming
        } else if v < 0.0 {
            Direction::Outgoing
        } else {
            Direction::Static
        }
    }
}

/// Velocity gate: restricts detections to moving-only or static-only
/// targets. The two modes are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VelocityGate {
    #[default]
    /// No velocity-based gating.
    Any,
    /// Drop targets with zero velocity.
    MovingOnly,
    /// Drop targets with nonzero velocity.
    StaticOnly,
}

/// Thresholds applied by [`gate`] before any smoothing runs.
#[derive(Debug, Clone, Copy)]
pub struct GateConfig {
    /// Single-sided signal-strength floor (default 18 dB).
    pub signal_strength_threshold: f32,
    /// Optional bracket gate lower bound; `None` disables the bracket gate.
    pub min_signal_strength: Option<f32>,
    /// Optional bracket gate upper bound.
    pub max_signal_strength: Option<f32>,
    /// Hard range ceiling in meters.
    pub max_range_m: f32,
    /// Hard azimuth magnitude ceiling in degrees.
    pub max_azimuth_deg: f32,
    /// Moving/static-only gate.
    pub velocity_gate: VelocityGate,
}

impl Default for GateConfig {
    fn default() -> Self {
        GateConfig {
            signal_strength_threshold: 18.0,
            min_signal_strength: None,
            max_signal_strength: None,
            max_range_m: 150.0,
            max_azimuth_deg: 75.0,
            velocity_gate: VelocityGate::Any,
        }
    }
}

/// Applies the edge-triggered gating sequence of §4.C steps 1-5. Returns
/// `None` if the target should be dropped.
pub fn gate(target: &RawTarget, cfg: &GateConfig) -> Option<RawTarget> {
    if target.is_empty_sentinel() {
        return None;
    }
    if target.signal_strength_db < cfg.signal_strength_threshold {
        return None;
    }
    if let (Some(min), Some(max)) = (cfg.min_signal_strength, cfg.max_signal_strength) {
        if target.signal_strength_db < min || target.signal_strength_db > max {
            return None;
        }
    }
    if target.range_m > cfg.max_range_m || target.range_m < 0.0 {
        return None;
    }
    if target.azimuth_deg.abs() > cfg.max_azimuth_deg {
        return None;
    }
    match cfg.velocity_gate {
        VelocityGate::Any => {}
        VelocityGate::MovingOnly => {
            if target.velocity_m_s == 0.0 {
                return None;
            }
        }
        VelocityGate::StaticOnly => {
            if target.velocity_m_s != 0.0 {
                return None;
            }
        }
    }
    Some(*target)
}

/// Scalar Kalman filter over a single measurement estimate.
///
/// Re-initialized per frame: the first [`update`](ScalarKalman::update)
/// call on a freshly constructed filter adopts the measurement directly, so
/// long-term smoothing of the radial velocity lives entirely in the
/// per-track filter of the tracker (component F); this stage only damps
/// noise across any repeated reads within a single frame.
#[derive(Debug, Clone, Copy)]
pub struct ScalarKalman {
    process_noise: f64,
    measurement_noise: f64,
    estimate: f64,
    error_estimate: f64,
    initialized: bool,
}

impl ScalarKalman {
    /// Constructs a fresh filter with the given noise parameters.
    pub fn new(process_noise: f64, measurement_noise: f64) -> Self {
        ScalarKalman {
            process_noise,
            measurement_noise,
            estimate: 0.0,
            error_estimate: 1.0,
            initialized: false,
        }
    }

    /// The filter used by the detection filter for smoothing raw velocity:
    /// `process_noise=1e-5, measurement_noise=0.1`.
    pub fn velocity() -> Self {
        ScalarKalman::new(1e-5, 0.1)
    }

    /// Folds in one measurement and returns the updated estimate.
    pub fn update(&mut self, measurement: f64) -> f64 {
        if !self.initialized {
            self.estimate = measurement;
            self.initialized = true;
            return self.estimate;
        }
        let prediction = self.estimate;
        let error_estimate = self.error_estimate + self.process_noise;
        let kalman_gain = error_estimate / (error_estimate + self.measurement_noise);
        self.estimate = prediction + kalman_gain * (measurement - prediction);
        self.error_estimate = (1.0 - kalman_gain) * error_estimate;
        self.estimate
    }
}

/// Wrap-safe sliding-window azimuth smoother (§4.C step 8, §9).
#[derive(Debug, Clone)]
pub struct AngleFilter {
    window_size: usize,
    history: Vec<f64>,
}

impl AngleFilter {
    /// Constructs a smoother with the given window size.
    pub fn new(window_size: usize) -> Self {
        AngleFilter {
            window_size,
            history: Vec::with_capacity(window_size),
        }
    }

    /// The window-3 smoother used by the detection filter.
    pub fn default_window() -> Self {
        AngleFilter::new(3)
    }

    /// Pushes `new_angle`, unwrapping it relative to the last pushed value,
    /// and returns the window mean renormalized into `[-180, 180]`.
    pub fn filter(&mut self, new_angle: f64) -> f64 {
        let mut angle = new_angle;
        if let Some(&last) = self.history.last() {
            if (angle - last).abs() > 180.0 {
                if angle > last {
                    angle -= 360.0;
                } else {
                    angle += 360.0;
                }
            }
        }

        self.history.push(angle);
        if self.history.len() > self.window_size {
            self.history.remove(0);
        }

        let mut smoothed = self.history.iter().sum::<f64>() / self.history.len() as f64;
        while smoothed > 180.0 {
            smoothed -= 360.0;
        }
        while smoothed < -180.0 {
            smoothed += 360.0;
        }
        smoothed
    }
}

/// A gated measurement ready for projection (§4.C output). Azimuth is the
/// raw gated value; per-track wrap-safe smoothing is applied once a
/// detection has been associated to a track (see `Track::azimuth_filter`),
/// not here — this stage runs before association, so it has no track to
/// smooth against yet.
#[derive(Debug, Clone, Copy)]
pub struct FilteredTarget {
    /// Signal strength, passed through unchanged.
    pub signal_strength_db: f32,
    /// Range, passed through unchanged.
    pub range_m: f32,
    /// Raw (unsmoothed) gated azimuth, degrees.
    pub azimuth_deg: f64,
    /// Kalman-smoothed absolute speed.
    pub speed_m_s: f64,
    /// Raw signed velocity (pre-smoothing sign is authoritative for direction).
    pub velocity_signed: f32,
    /// Direction derived from the sign of the raw velocity.
    pub direction: Direction,
}

/// Applies gating and velocity smoothing to one raw target.
pub fn filter_target(target: &RawTarget, cfg: &GateConfig) -> Option<FilteredTarget> {
    let gated = gate(target, cfg)?;

    let direction = Direction::from_signed_velocity(gated.velocity_m_s);
    let mut velocity_kalman = ScalarKalman::velocity();
    let speed_m_s = velocity_kalman.update(gated.velocity_m_s as f64).abs();

    Some(FilteredTarget {
        signal_strength_db: gated.signal_strength_db,
        range_m: gated.range_m,
        azimuth_deg: gated.azimuth_deg as f64,
        speed_m_s,
        velocity_signed: gated.velocity_m_s,
        direction,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sentinel_is_dropped() {
        let cfg = GateConfig::default();
        let target = RawTarget::new(0.0, 0.0, 0.0, 0.0);
        assert!(gate(&target, &cfg).is_none());
    }

    #[test]
    fn signal_strength_boundary() {
        let cfg = GateConfig::default();
        let just_below = RawTarget::new(18.0 - f32::EPSILON, 10.0, 1.0, 0.0);
        assert!(gate(&just_below, &cfg).is_none());
        let at_threshold = RawTarget::new(18.0, 10.0, 1.0, 0.0);
        assert!(gate(&at_threshold, &cfg).is_some());
    }

    #[test]
    fn azimuth_boundary() {
        let cfg = GateConfig::default();
        let at_max = RawTarget::new(30.0, 10.0, 1.0, 75.0);
        assert!(gate(&at_max, &cfg).is_some());
        let beyond_max = RawTarget::new(30.0, 10.0, 1.0, 75.1);
        assert!(gate(&beyond_max, &cfg).is_none());
    }

    #[test]
    fn range_bounds() {
        let cfg = GateConfig::default();
        let too_far = RawTarget::new(30.0, 150.1, 1.0, 0.0);
        assert!(gate(&too_far, &cfg).is_none());
    }

    #[test]
    fn moving_only_drops_static() {
        let cfg = GateConfig {
            velocity_gate: VelocityGate::MovingOnly,
            ..GateConfig::default()
        };
        let static_target = RawTarget::new(30.0, 10.0, 0.0, 0.0);
        assert!(gate(&static_target, &cfg).is_none());
    }

    #[test]
    fn direction_from_sign() {
        assert_eq!(Direction::from_signed_velocity(5.0), Direction::Incoming);
        assert_eq!(Direction::from_signed_velocity(-5.0), Direction::Outgoing);
        assert_eq!(Direction::from_signed_velocity(0.0), Direction::Static);
    }

    #[test]
    fn scalar_kalman_adopts_first_measurement() {
        let mut k = ScalarKalman::velocity();
        assert_eq!(k.update(5.0), 5.0);
    }

    #[test]
    fn scalar_kalman_smooths_subsequent_measurements() {
        let mut k = ScalarKalman::new(1e-5, 0.1);
        k.update(5.0);
        let second = k.update(6.0);
        assert!(second > 5.0 && second < 6.0);
    }

    #[test]
    fn angle_filter_idempotent_on_constant_sequence() {
        let mut a = AngleFilter::default_window();
        a.filter(10.0);
        a.filter(10.0);
        let once = a.filter(10.0);

        let mut b = AngleFilter::default_window();
        b.filter(10.0);
        b.filter(10.0);
        b.filter(10.0);
        let twice = b.filter(10.0);
        assert!((once - twice).abs() < 1e-9);
    }

    #[test]
    fn angle_filter_handles_wrap() {
        let mut a = AngleFilter::default_window();
        a.filter(179.9);
        a.filter(-179.9);
        let smoothed = a.filter(179.9);
        assert!((smoothed - 179.9).abs() < 1.0);
    }
}
