use std::mem;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use crossbeam::atomic::AtomicCell;

use crate::config::LoggerConfig;
use crate::error::{LogError, LogResult};
use crate::gnss_time::{to_utc_millis, GnssClockSnapshot};
use crate::listener::MeasurementBatchListener;
use crate::measurement::{MeasurementInput, MeasurementRecord};
use crate::orientation::OrientationEstimator;
use crate::session::LogSession;

/// Millisecond source stamped on every record
pub trait ElapsedRealtime: Send + Sync {
    fn elapsed_realtime_millis(&self) -> i64;
}

impl<T: ElapsedRealtime + ?Sized> ElapsedRealtime for Arc<T> {
    fn elapsed_realtime_millis(&self) -> i64 {
        (**self).elapsed_realtime_millis()
    }
}

/// The host's elapsed realtime (milliseconds since boot, deep sleep
/// included), extrapolated from the last sync with a local monotonic clock.
///
/// Reads 0 at creation until the host first syncs it.
pub struct SyncedRealtimeClock {
    anchor: AtomicCell<(i64, Instant)>,
}

impl SyncedRealtimeClock {
    pub fn new() -> Self {
        Self::anchored_at(0)
    }

    pub fn anchored_at(elapsed_realtime_millis: i64) -> Self {
        Self {
            anchor: AtomicCell::new((elapsed_realtime_millis, Instant::now())),
        }
    }

    /// Re-anchor on a fresh reading from the host
    pub fn sync(&self, elapsed_realtime_millis: i64) {
        self.anchor.store((elapsed_realtime_millis, Instant::now()));
    }
}

impl Default for SyncedRealtimeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ElapsedRealtime for SyncedRealtimeClock {
    fn elapsed_realtime_millis(&self) -> i64 {
        let (base, at) = self.anchor.load();
        let since = i64::try_from(at.elapsed().as_millis()).unwrap_or(i64::MAX);
        base.saturating_add(since)
    }
}

/// File subsystem state machine
enum LoggerState {
    NoSession,
    SessionOpen(LogSession),
}

/// Outcome of one measurement batch
#[derive(Debug, Default)]
pub struct BatchReport {
    /// False when the batch arrived before logging started
    pub session_active: bool,
    pub written: usize,
    /// Dropped by the GPS-only policy
    pub filtered: usize,
    /// Every write failure, in measurement order
    pub failures: Vec<LogError>,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Turns measurement batches into log lines in the active session
pub struct MeasurementLogger {
    config: LoggerConfig,
    estimator: Arc<OrientationEstimator>,
    clock: Box<dyn ElapsedRealtime>,
    state: Mutex<LoggerState>,
}

impl MeasurementLogger {
    pub fn new(config: LoggerConfig, estimator: Arc<OrientationEstimator>) -> Self {
        Self {
            config,
            estimator,
            clock: Box::new(SyncedRealtimeClock::new()),
            state: Mutex::new(LoggerState::NoSession),
        }
    }

    pub fn with_clock(mut self, clock: impl ElapsedRealtime + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    fn lock_state(&self) -> LogResult<MutexGuard<'_, LoggerState>> {
        self.state
            .lock()
            .map_err(|_| LogError::lock_poisoned("log session"))
    }

    /// Close the open session (if any) and open a new file.
    ///
    /// A failed close aborts the rotation and leaves no session open.
    pub fn start_new_log(&self, base_directory: &Path) -> LogResult<PathBuf> {
        self.rotate_to(|| LogSession::start(base_directory, &self.config))
    }

    fn rotate_to(&self, open: impl FnOnce() -> LogResult<LogSession>) -> LogResult<PathBuf> {
        let mut state = self.lock_state()?;

        let previous = mem::replace(&mut *state, LoggerState::NoSession);
        if let LoggerState::SessionOpen(mut previous) = previous {
            if let Err(e) = previous.close() {
                log::error!("Unable to close {}: {}", previous.path().display(), e);
                return Err(e);
            }
            log::info!(
                "Closed {} ({} records)",
                previous.path().display(),
                previous.records_written()
            );
        }

        let session = open().map_err(|e| {
            log::error!("{}", e);
            e
        })?;
        let path = session.path().to_path_buf();
        log::info!("File opened: {}", path.display());

        *state = LoggerState::SessionOpen(session);
        Ok(path)
    }

    /// Append one record per accepted measurement, in arrival order.
    ///
    /// Without an open session the batch is discarded. A failed write is
    /// logged and reported but does not stop the rest of the epoch.
    pub fn handle_measurement_batch(
        &self,
        clock: &GnssClockSnapshot,
        measurements: &[MeasurementInput],
        gps_only: bool,
    ) -> LogResult<BatchReport> {
        let mut state = self.lock_state()?;
        let session = match &mut *state {
            LoggerState::NoSession => {
                log::debug!("No active session, dropping {} measurements", measurements.len());
                return Ok(BatchReport::default());
            }
            LoggerState::SessionOpen(session) => session,
        };

        let mut report = BatchReport {
            session_active: true,
            ..Default::default()
        };
        let utc_time_millis = to_utc_millis(clock);

        for measurement in measurements {
            if gps_only && !measurement.constellation.is_gps() {
                report.filtered += 1;
                continue;
            }

            let orientation = self.estimator.current_orientation();
            let record = MeasurementRecord {
                elapsed_realtime_millis: self.clock.elapsed_realtime_millis(),
                utc_time_millis,
                svid: measurement.svid,
                cn0_db_hz: measurement.cn0_db_hz,
                azimuth: orientation.azimuth(),
                pitch: orientation.pitch(),
                roll: orientation.roll(),
            };

            match session.append(&record) {
                Ok(()) => report.written += 1,
                Err(e) => {
                    log::error!("Problem writing svid {} to file: {}", measurement.svid, e);
                    report.failures.push(e);
                }
            }
        }

        if report.written > 0 {
            if let Err(e) = session.flush() {
                log::error!("{}", e);
                report.failures.push(e);
            }
        }

        Ok(report)
    }

    /// Hand off the active file path, then flush and close the session.
    pub fn export_and_close(&self) -> LogResult<PathBuf> {
        let mut state = self.lock_state()?;

        match mem::replace(&mut *state, LoggerState::NoSession) {
            LoggerState::NoSession => Err(LogError::NoActiveSession),
            LoggerState::SessionOpen(mut session) => {
                let path = session.path().to_path_buf();
                session.close().map_err(|e| {
                    log::error!("Unable to close {}: {}", path.display(), e);
                    e
                })?;
                log::info!(
                    "Exported {} ({} records)",
                    path.display(),
                    session.records_written()
                );
                Ok(path)
            }
        }
    }

    /// Path of the open file, if logging
    pub fn active_path(&self) -> LogResult<Option<PathBuf>> {
        let state = self.lock_state()?;
        Ok(match &*state {
            LoggerState::NoSession => None,
            LoggerState::SessionOpen(session) => Some(session.path().to_path_buf()),
        })
    }

    pub fn is_logging(&self) -> LogResult<bool> {
        Ok(self.active_path()?.is_some())
    }

    pub fn estimator(&self) -> &Arc<OrientationEstimator> {
        &self.estimator
    }
}

impl MeasurementBatchListener for MeasurementLogger {
    fn on_measurement_batch(
        &self,
        clock: &GnssClockSnapshot,
        measurements: &[MeasurementInput],
        gps_only: bool,
    ) -> LogResult<BatchReport> {
        self.handle_measurement_batch(clock, measurements, gps_only)
    }
}
