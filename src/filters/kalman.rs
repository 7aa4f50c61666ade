use super::GazeFilter;
use crate::constants::DEFAULT_FPS;
use nalgebra::{Matrix2, Matrix4, Vector2, Vector4};

type Matrix2x4<T> = nalgebra::Matrix<T, nalgebra::U2, nalgebra::U4, nalgebra::ArrayStorage<T, 2, 4>>;

/// Initial position/velocity uncertainty
const INITIAL_COVARIANCE: f64 = 1.0;

/// Kalman filter tracking gaze offset and its velocity
pub struct KalmanFilter {
    // State: [x, y, vx, vy]
    state: Vector4<f64>,
    covariance: Matrix4<f64>,
    process_noise: Matrix4<f64>,
    measurement_noise: Matrix2<f64>,
    transition: Matrix4<f64>,
    measurement: Matrix2x4<f64>,
    initialized: bool,
}

impl KalmanFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::with_noise(1.0 / DEFAULT_FPS, 50.0, 0.01)
    }

    /// Filter for a frame interval `dt` (seconds), process noise `q` and
    /// measurement noise variance `r` (in squared normalized offset units)
    #[must_use]
    #[rustfmt::skip]
    pub fn with_noise(dt: f64, q: f64, r: f64) -> Self {
        let transition = Matrix4::new(
            1.0, 0.0, dt, 0.0,
            0.0, 1.0, 0.0, dt,
            0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        );

        // Only the position is measured
        let measurement = Matrix2x4::new(
            1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
        );

        let process_noise = Matrix4::new(
            q * dt.powi(4) / 4.0, 0.0, q * dt.powi(3) / 2.0, 0.0,
            0.0, q * dt.powi(4) / 4.0, 0.0, q * dt.powi(3) / 2.0,
            q * dt.powi(3) / 2.0, 0.0, q * dt.powi(2), 0.0,
            0.0, q * dt.powi(3) / 2.0, 0.0, q * dt.powi(2),
        );

        Self {
            state: Vector4::zeros(),
            covariance: Matrix4::identity() * INITIAL_COVARIANCE,
            process_noise,
            measurement_noise: Matrix2::identity() * r,
            transition,
            measurement,
            initialized: false,
        }
    }

    fn predict(&mut self) {
        self.state = self.transition * self.state;
        self.covariance = self.transition * self.covariance * self.transition.transpose() + self.process_noise;
    }

    fn update(&mut self, measurement: Vector2<f64>) {
        let innovation = measurement - self.measurement * self.state;
        let innovation_cov = self.measurement * self.covariance * self.measurement.transpose() + self.measurement_noise;

        let Some(inverse) = innovation_cov.try_inverse() else {
            log::warn!("Kalman innovation covariance is singular, skipping update");
            return;
        };
        let gain = self.covariance * self.measurement.transpose() * inverse;

        self.state += gain * innovation;
        self.covariance = (Matrix4::identity() - gain * self.measurement) * self.covariance;
    }
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl GazeFilter for KalmanFilter {
    fn apply(&mut self, x: f64, y: f64) -> (f64, f64) {
        if !self.initialized {
            // Start at rest on the first measurement
            self.state = Vector4::new(x, y, 0.0, 0.0);
            self.initialized = true;
            return (x, y);
        }

        self.predict();
        self.update(Vector2::new(x, y));
        (self.state[0], self.state[1])
    }

    fn reset(&mut self) {
        self.state = Vector4::zeros();
        self.covariance = Matrix4::identity() * INITIAL_COVARIANCE;
        self.initialized = false;
    }

    fn name(&self) -> &str {
        "KalmanFilter"
    }
}
