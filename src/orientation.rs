//! Accelerometer + magnetometer orientation estimate.
//!
//! The two vectors are written from the sensor callback context and read from
//! the GNSS measurement context. Each lives in its own atomic cell so a reader
//! always sees a whole vector, never a mix of old and new components.

use crossbeam::atomic::AtomicCell;
use nalgebra::{Matrix3, Vector3};

/// Below this the horizontal field is too weak to define north
/// (free fall, or close to the magnetic pole).
const MIN_HORIZONTAL_NORM: f32 = 0.1;

/// Latest raw readings, no history
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationSample {
    pub accel: Vector3<f32>,
    pub mag: Vector3<f32>,
}

/// Derived orientation, recomputed on every request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationState {
    pub rotation_matrix: Matrix3<f32>,
    /// Azimuth, pitch, roll in degrees
    pub angles_deg: Vector3<f32>,
}

impl OrientationState {
    fn from_rotation(rotation_matrix: Matrix3<f32>) -> Self {
        let r = &rotation_matrix;
        let azimuth = r[(0, 1)].atan2(r[(1, 1)]);
        let pitch = (-r[(2, 1)]).clamp(-1.0, 1.0).asin();
        let roll = (-r[(2, 0)]).atan2(r[(2, 2)]);

        Self {
            rotation_matrix,
            angles_deg: Vector3::new(azimuth.to_degrees(), pitch.to_degrees(), roll.to_degrees()),
        }
    }

    pub fn azimuth(&self) -> f32 {
        self.angles_deg.x
    }

    pub fn pitch(&self) -> f32 {
        self.angles_deg.y
    }

    pub fn roll(&self) -> f32 {
        self.angles_deg.z
    }
}

pub struct OrientationEstimator {
    accel: AtomicCell<Vector3<f32>>,
    mag: AtomicCell<Vector3<f32>>,
    last_good: AtomicCell<Matrix3<f32>>,
}

impl OrientationEstimator {
    pub fn new() -> Self {
        Self {
            accel: AtomicCell::new(Vector3::zeros()),
            mag: AtomicCell::new(Vector3::zeros()),
            last_good: AtomicCell::new(Matrix3::identity()),
        }
    }

    /// Replace the cached accelerometer vector. Zero vectors are accepted as-is.
    pub fn update_accelerometer(&self, accel: Vector3<f32>) {
        self.accel.store(accel);
    }

    /// Replace the cached magnetometer vector.
    pub fn update_magnetometer(&self, mag: Vector3<f32>) {
        self.mag.store(mag);
    }

    pub fn accelerometer(&self) -> Vector3<f32> {
        self.accel.load()
    }

    pub fn magnetometer(&self) -> Vector3<f32> {
        self.mag.load()
    }

    pub fn sample(&self) -> OrientationSample {
        OrientationSample {
            accel: self.accel.load(),
            mag: self.mag.load(),
        }
    }

    /// Orientation from the latest readings.
    ///
    /// Degenerate geometry reuses the last good rotation matrix (identity
    /// until the first good fix) so no NaN reaches the log.
    pub fn current_orientation(&self) -> OrientationState {
        let sample = self.sample();
        let rotation = match rotation_matrix(&sample.accel, &sample.mag) {
            Some(rotation) => {
                self.last_good.store(rotation);
                rotation
            }
            None => {
                log::debug!(
                    "Degenerate orientation input (accel={:?}, mag={:?}), reusing last rotation",
                    sample.accel.as_slice(),
                    sample.mag.as_slice()
                );
                self.last_good.load()
            }
        };
        OrientationState::from_rotation(rotation)
    }
}

impl Default for OrientationEstimator {
    fn default() -> Self {
        Self::new()
    }
}

/// Rotation from device frame to world frame (east, north, up).
///
/// Rows are H = E x A (east), M = A x H (north) and A (up), all normalized.
pub fn rotation_matrix(gravity: &Vector3<f32>, geomagnetic: &Vector3<f32>) -> Option<Matrix3<f32>> {
    let h = geomagnetic.cross(gravity);
    let norm_h = h.norm();
    // also rejects NaN
    if !(norm_h >= MIN_HORIZONTAL_NORM) {
        return None;
    }
    let h = h / norm_h;
    let a = gravity.normalize();
    let m = a.cross(&h);

    Some(Matrix3::from_rows(&[h.transpose(), m.transpose(), a.transpose()]))
}
