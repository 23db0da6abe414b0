//! Per-track 6-state constant-acceleration Kalman filter: `(x, y, vx, vy,
//! ax, ay)` at a fixed Δt = 0.1 s.

use nalgebra::{Matrix2, Matrix2x6, Matrix6, SMatrix, Vector2, Vector6};

/// Fixed frame period assumed by the transition model.
pub const DT: f64 = 0.1;

/// Process-noise scalar. The spec allows any fixed value in `[1e-4,
/// 1e-2]`; `1e-3` is the value this implementation documents and uses.
pub const PROCESS_NOISE_Q: f64 = 1e-3;

fn transition_matrix() -> Matrix6<f64> {
    let dt = DT;
    let dt2 = 0.5 * dt * dt;
    #[rustfmt::skip]
    let f = Matrix6::new(
        1.0, 0.0, dt,  0.0, dt2, 0.0,
        0.0, 1.0, 0.0, dt,  0.0, dt2,
        0.0, 0.0, 1.0, 0.0, dt,  0.0,
        0.0, 0.0, 0.0, 1.0, 0.0, dt,
        0.0, 0.0, 0.0, 0.0, 1.0, 0.0,
        0.0, 0.0, 0.0, 0.0, 0.0, 1.0,
    );
    f
}

fn measurement_matrix() -> Matrix2x6<f64> {
    #[rustfmt::skip]
    let h = Matrix2x6::new(
        1.0, 0.0, 0.0, 0.0, 0.0, 0.0,
        0.0, 1.0, 0.0, 0.0, 0.0, 0.0,
    );
    h
}

/// Discretized white-noise-acceleration process covariance for a
/// constant-acceleration model with scalar intensity `q`.
fn process_noise(q: f64) -> Matrix6<f64> {
    let dt = DT;
    let dt2 = dt * dt;
    let dt3 = dt2 * dt;
    let dt4 = dt2 * dt2;
    #[rustfmt::skip]
    let block = SMatrix::<f64, 3, 3>::new(
        dt4 / 4.0, dt3 / 2.0, dt2 / 2.0,
        dt3 / 2.0, dt2,       dt,
        dt2 / 2.0, dt,        1.0,
    ) * q;

    let mut q6 = Matrix6::<f64>::zeros();
    for i in 0..3 {
        for j in 0..3 {
            q6[(2 * i, 2 * j)] = block[(i, j)];
            q6[(2 * i + 1, 2 * j + 1)] = block[(i, j)];
        }
    }
    q6
}

/// 6-state Kalman filter owned by one track.
#[derive(Debug, Clone)]
pub struct TrackKalman {
    /// `(x, y, vx, vy, ax, ay)`.
    pub state: Vector6<f64>,
    /// State covariance.
    pub covariance: Matrix6<f64>,
}

impl TrackKalman {
    /// Initializes a new filter from an `(x, y)` measurement with zero
    /// velocity/acceleration and `P = 10*I` (§4.F).
    pub fn new(x: f64, y: f64) -> Self {
        let state = Vector6::new(x, y, 0.0, 0.0, 0.0, 0.0);
        let covariance = Matrix6::identity() * 10.0;
        TrackKalman { state, covariance }
    }

    /// Advances the state by one Δt step (predict-only, §4.F).
    pub fn predict(&mut self) {
        let f = transition_matrix();
        self.state = f * self.state;
        self.covariance = f * self.covariance * f.transpose() + process_noise(PROCESS_NOISE_Q);
    }

    /// Returns the predicted `(x, y)` position and its 2x2 covariance
    /// without mutating state, for gating/cost computation before
    /// association commits to an update.
    pub fn projected_position(&self) -> (Vector2<f64>, Matrix2<f64>) {
        let h = measurement_matrix();
        let mean = h * self.state;
        let cov = h * self.covariance * h.transpose();
        (mean, cov)
    }

    /// Kalman update given a position measurement and its adaptive
    /// measurement noise `r` (so `R = diag(r, r)`).
    pub fn update(&mut self, measurement: Vector2<f64>, r: f64) {
        let h = measurement_matrix();
        let rr = Matrix2::identity() * r;

        let innovation = measurement - h * self.state;
        let s = h * self.covariance * h.transpose() + rr;
        let s_inv = match s.try_inverse() {
            Some(inv) => inv,
            None => return,
        };
        let kalman_gain = self.covariance * h.transpose() * s_inv;

        self.state += kalman_gain * innovation;
        let identity = Matrix6::identity();
        self.covariance = (identity - kalman_gain * h) * self.covariance;
    }

    /// `x`/`y` convenience accessors.
    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.state[0], self.state[1])
    }

    /// `vx`/`vy` convenience accessor.
    pub fn velocity(&self) -> Vector2<f64> {
        Vector2::new(self.state[2], self.state[3])
    }
}

/// Adaptive measurement noise per §4.F: stronger signal narrows `r`.
pub fn adaptive_measurement_noise(signal_strength_db: f32) -> f64 {
    2.0 * (0.5f64).max(((100.0 - signal_strength_db as f64) / 100.0).max(0.0))
}

/// Squared Mahalanobis distance between `measurement` and the filter's
/// projected position, falling back to squared Euclidean distance when the
/// position covariance is singular.
pub fn gating_distance(mean: &Vector2<f64>, cov: &Matrix2<f64>, measurement: &Vector2<f64>) -> f64 {
    let residual = measurement - mean;
    match cov.try_inverse() {
        Some(cov_inv) => (residual.transpose() * cov_inv * residual)[(0, 0)],
        None => residual.dot(&residual),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predict_advances_position_by_velocity() {
        let mut k = TrackKalman::new(0.0, 0.0);
        k.state[2] = 10.0; // vx
        k.predict();
        assert!((k.state[0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn update_pulls_state_toward_measurement() {
        let mut k = TrackKalman::new(0.0, 0.0);
        k.predict();
        k.update(Vector2::new(10.0, 0.0), 0.5);
        assert!(k.state[0] > 0.0 && k.state[0] < 10.0);
    }

    #[test]
    fn adaptive_noise_shrinks_with_strong_signal() {
        let strong = adaptive_measurement_noise(95.0);
        let weak = adaptive_measurement_noise(10.0);
        assert!(strong < weak);
        assert!(strong >= 1.0); // floor of 2*0.5
    }

    #[test]
    fn gating_distance_falls_back_to_euclidean_when_singular() {
        let mean = Vector2::new(0.0, 0.0);
        let cov = Matrix2::zeros();
        let measurement = Vector2::new(3.0, 4.0);
        let d = gating_distance(&mean, &cov, &measurement);
        assert!((d - 25.0).abs() < 1e-9);
    }
}
