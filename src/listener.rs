//! Narrow callback capabilities for the two producer contexts.

use nalgebra::Vector3;

use crate::error::LogResult;
use crate::gnss_time::GnssClockSnapshot;
use crate::logger::BatchReport;
use crate::measurement::MeasurementInput;

/// Receives one GNSS epoch at a time
pub trait MeasurementBatchListener: Send + Sync {
    fn on_measurement_batch(
        &self,
        clock: &GnssClockSnapshot,
        measurements: &[MeasurementInput],
        gps_only: bool,
    ) -> LogResult<BatchReport>;
}

/// Receives raw inertial and magnetic samples
pub trait SensorSampleListener: Send + Sync {
    fn on_accelerometer_sample(&self, accel: Vector3<f32>);

    fn on_magnetometer_sample(&self, mag: Vector3<f32>);
}
