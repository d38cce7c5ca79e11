use crossbeam::channel::Receiver;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::listener::SensorSampleListener;
use crate::orientation::OrientationEstimator;

/// Raw sample from the platform sensor callback
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorEvent {
    Accelerometer(Vector3<f32>),
    Magnetometer(Vector3<f32>),
}

/// Samples accepted since creation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleCounts {
    pub accel: u64,
    pub mag: u64,
}

/// Forwards accelerometer and magnetometer samples into the estimator while
/// registered. Runs independently of the measurement logger.
pub struct SensorFeed {
    estimator: Arc<OrientationEstimator>,
    registered: AtomicBool,
    accel_count: AtomicU64,
    mag_count: AtomicU64,
}

impl SensorFeed {
    /// New feed, unregistered
    pub fn new(estimator: Arc<OrientationEstimator>) -> Self {
        Self {
            estimator,
            registered: AtomicBool::new(false),
            accel_count: AtomicU64::new(0),
            mag_count: AtomicU64::new(0),
        }
    }

    /// Start accepting samples. Returns false if already registered.
    pub fn register(&self) -> bool {
        let changed = !self.registered.swap(true, Ordering::AcqRel);
        if changed {
            log::info!("Orientation sensor listener registered");
        }
        changed
    }

    /// Stop accepting samples. Returns false if not registered.
    pub fn unregister(&self) -> bool {
        let changed = self.registered.swap(false, Ordering::AcqRel);
        if changed {
            log::info!("Orientation sensor listener unregistered");
        }
        changed
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    pub fn counts(&self) -> SampleCounts {
        SampleCounts {
            accel: self.accel_count.load(Ordering::Relaxed),
            mag: self.mag_count.load(Ordering::Relaxed),
        }
    }

    pub fn dispatch(&self, event: SensorEvent) {
        match event {
            SensorEvent::Accelerometer(accel) => self.on_accelerometer_sample(accel),
            SensorEvent::Magnetometer(mag) => self.on_magnetometer_sample(mag),
        }
    }

    /// Drain `rx` on a dedicated thread until every sender is dropped.
    ///
    /// The handle yields the number of events consumed.
    pub fn spawn_pump(self: &Arc<Self>, rx: Receiver<SensorEvent>) -> io::Result<JoinHandle<u64>> {
        let feed = Arc::clone(self);
        thread::Builder::new()
            .name("sensor-feed".to_string())
            .spawn(move || {
                let mut consumed = 0u64;
                for event in rx.iter() {
                    feed.dispatch(event);
                    consumed += 1;
                    if consumed % 1000 == 0 {
                        log::trace!("[sensor-feed] {} events", consumed);
                    }
                }
                log::debug!("[sensor-feed] channel closed after {} events", consumed);
                consumed
            })
    }
}

impl SensorSampleListener for SensorFeed {
    fn on_accelerometer_sample(&self, accel: Vector3<f32>) {
        if !self.is_registered() {
            return;
        }
        self.estimator.update_accelerometer(accel);
        self.accel_count.fetch_add(1, Ordering::Relaxed);
    }

    fn on_magnetometer_sample(&self, mag: Vector3<f32>) {
        if !self.is_registered() {
            return;
        }
        self.estimator.update_magnetometer(mag);
        self.mag_count.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;

    #[test]
    fn test_samples_ignored_until_registered() {
        let estimator = Arc::new(OrientationEstimator::new());
        let feed = SensorFeed::new(Arc::clone(&estimator));

        feed.on_accelerometer_sample(Vector3::new(0.0, 0.0, 9.81));
        assert_eq!(estimator.accelerometer(), Vector3::zeros());
        assert_eq!(feed.counts(), SampleCounts::default());

        assert!(feed.register());
        assert!(!feed.register());
        feed.on_accelerometer_sample(Vector3::new(0.0, 0.0, 9.81));
        feed.on_magnetometer_sample(Vector3::new(0.0, 22.0, -40.0));
        assert_eq!(estimator.accelerometer(), Vector3::new(0.0, 0.0, 9.81));
        assert_eq!(estimator.magnetometer(), Vector3::new(0.0, 22.0, -40.0));
        assert_eq!(feed.counts(), SampleCounts { accel: 1, mag: 1 });
    }

    #[test]
    fn test_unregister_stops_updates() {
        let estimator = Arc::new(OrientationEstimator::new());
        let feed = SensorFeed::new(Arc::clone(&estimator));
        feed.register();
        feed.on_magnetometer_sample(Vector3::new(1.0, 2.0, 3.0));

        assert!(feed.unregister());
        assert!(!feed.unregister());
        feed.on_magnetometer_sample(Vector3::new(9.0, 9.0, 9.0));
        assert_eq!(estimator.magnetometer(), Vector3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_pump_drains_channel() {
        let estimator = Arc::new(OrientationEstimator::new());
        let feed = Arc::new(SensorFeed::new(Arc::clone(&estimator)));
        feed.register();

        let (tx, rx) = channel::bounded(64);
        let handle = feed.spawn_pump(rx).unwrap();
        for k in 0..100 {
            let v = k as f32;
            tx.send(SensorEvent::Accelerometer(Vector3::new(v, 0.0, 9.81))).unwrap();
        }
        tx.send(SensorEvent::Magnetometer(Vector3::new(0.0, 22.0, -40.0))).unwrap();
        drop(tx);

        assert_eq!(handle.join().unwrap(), 101);
        assert_eq!(estimator.accelerometer(), Vector3::new(99.0, 0.0, 9.81));
        assert_eq!(feed.counts(), SampleCounts { accel: 100, mag: 1 });
    }
}
