// GNSS Logger native core
// Turns GNSS measurement epochs and orientation sensor samples into log files

pub mod android_jni;
pub mod config;
pub mod error;
pub mod gnss_time;
pub mod listener;
pub mod logger;
pub mod measurement;
pub mod orientation;
pub mod sensor_feed;
pub mod session;

pub use config::{DeviceInfo, LoggerConfig};
pub use error::{LogError, LogResult};
pub use gnss_time::{to_utc_millis, GnssClockSnapshot};
pub use listener::{MeasurementBatchListener, SensorSampleListener};
pub use logger::{BatchReport, ElapsedRealtime, MeasurementLogger, SyncedRealtimeClock};
pub use measurement::{Constellation, MeasurementInput, MeasurementRecord};
pub use orientation::{OrientationEstimator, OrientationSample, OrientationState};
pub use sensor_feed::{SampleCounts, SensorEvent, SensorFeed};
pub use session::LogSession;
