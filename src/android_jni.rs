use crate::config::LoggerConfig;
use crate::error::{throw_java_exception, LogError, LogResult};
use crate::gnss_time::GnssClockSnapshot;
use crate::listener::{MeasurementBatchListener, SensorSampleListener};
use crate::logger::{MeasurementLogger, SyncedRealtimeClock};
use crate::measurement::{Constellation, MeasurementInput};
use crate::orientation::OrientationEstimator;
use crate::sensor_feed::SensorFeed;
use jni::objects::{JClass, JDoubleArray, JIntArray, JString};
use jni::sys::{jboolean, jfloat, jfloatArray, jint, jlong, jstring, JNI_FALSE, JNI_VERSION_1_6};
use jni::{JNIEnv, JavaVM};
use nalgebra::Vector3;
use std::ffi::c_void;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Everything the app talks to, wired together once per process
struct NativeLogger {
    estimator: Arc<OrientationEstimator>,
    feed: Arc<SensorFeed>,
    realtime: Arc<SyncedRealtimeClock>,
    logger: MeasurementLogger,
    gps_only: AtomicBool,
}

impl NativeLogger {
    fn new(config: LoggerConfig) -> Self {
        let estimator = Arc::new(OrientationEstimator::new());
        let feed = Arc::new(SensorFeed::new(Arc::clone(&estimator)));
        let realtime = Arc::new(SyncedRealtimeClock::new());
        let gps_only = AtomicBool::new(config.gps_only);
        let logger = MeasurementLogger::new(config, Arc::clone(&estimator))
            .with_clock(Arc::clone(&realtime));
        Self {
            estimator,
            feed,
            realtime,
            logger,
            gps_only,
        }
    }
}

// Global logger state - stored as static to persist across JNI calls
lazy_static::lazy_static! {
    static ref GLOBAL_LOGGER: Mutex<Option<Arc<NativeLogger>>> = Mutex::new(None);
}

/// Get or create the process logger
fn get_logger() -> LogResult<Arc<NativeLogger>> {
    let mut guard = GLOBAL_LOGGER
        .lock()
        .map_err(|_| LogError::lock_poisoned("global logger"))?;

    match guard.as_ref() {
        Some(logger) => Ok(Arc::clone(logger)),
        None => {
            let logger = Arc::new(NativeLogger::new(LoggerConfig::default()));
            *guard = Some(Arc::clone(&logger));
            Ok(logger)
        }
    }
}

#[cfg(target_os = "android")]
fn init_logging() {
    let _ = android_log::init("GnssLogger");
}

#[cfg(not(target_os = "android"))]
fn init_logging() {}

#[no_mangle]
pub extern "system" fn JNI_OnLoad(_vm: JavaVM, _reserved: *mut c_void) -> jint {
    init_logging();
    JNI_VERSION_1_6
}

fn to_jstring(env: &mut JNIEnv, value: &str) -> jstring {
    match env.new_string(value) {
        Ok(jstr) => jstr.into_raw(),
        Err(_) => {
            let _ = throw_java_exception(
                env,
                &LogError::JniError("Failed to create Java string".to_string()),
            );
            std::ptr::null_mut()
        }
    }
}

/// JNI: Replace the process logger with one built from a JSON config
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_google_android_apps_location_gps_gnsslogger_JniBinding_nativeInit(
    mut env: JNIEnv,
    _class: JClass,
    config_json: JString,
) -> jint {
    match native_init_impl(&mut env, &config_json) {
        Ok(_) => 0,
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            -1
        }
    }
}

fn native_init_impl(env: &mut JNIEnv, config_json: &JString) -> LogResult<()> {
    let json: String = env
        .get_string(config_json)
        .map_err(|e| LogError::JniError(e.to_string()))?
        .into();
    let config = LoggerConfig::from_json(&json)?;

    let mut guard = GLOBAL_LOGGER
        .lock()
        .map_err(|_| LogError::lock_poisoned("global logger"))?;
    if let Some(previous) = guard.take() {
        previous.feed.unregister();
        match previous.logger.export_and_close() {
            Ok(path) => log::info!("Closed {} on re-init", path.display()),
            Err(LogError::NoActiveSession) => {}
            Err(e) => log::error!("Closing previous session on re-init: {}", e),
        }
    }
    *guard = Some(Arc::new(NativeLogger::new(config)));
    Ok(())
}

/// JNI: Start a new log file in `baseDir`, closing the current one
/// Returns: file path, or null on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_google_android_apps_location_gps_gnsslogger_JniBinding_startNewLog(
    mut env: JNIEnv,
    _class: JClass,
    base_dir: JString,
) -> jstring {
    match start_new_log_impl(&mut env, &base_dir) {
        Ok(path) => to_jstring(&mut env, &path),
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            std::ptr::null_mut()
        }
    }
}

fn start_new_log_impl(env: &mut JNIEnv, base_dir: &JString) -> LogResult<String> {
    let dir: String = env
        .get_string(base_dir)
        .map_err(|e| LogError::JniError(e.to_string()))?
        .into();
    let logger = get_logger()?;
    let path = logger.logger.start_new_log(Path::new(&dir))?;
    Ok(path.to_string_lossy().into_owned())
}

/// JNI: Close the current file and hand its path over for sharing
/// Returns: file path, or null on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_google_android_apps_location_gps_gnsslogger_JniBinding_exportAndClose(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    match export_and_close_impl() {
        Ok(path) => to_jstring(&mut env, &path),
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            std::ptr::null_mut()
        }
    }
}

fn export_and_close_impl() -> LogResult<String> {
    let logger = get_logger()?;
    let path = logger.logger.export_and_close()?;
    Ok(path.to_string_lossy().into_owned())
}

/// JNI: Path of the file being written
/// Returns: file path, or null when not logging
#[no_mangle]
pub extern "C" fn Java_com_google_android_apps_location_gps_gnsslogger_JniBinding_getActivePath(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    match get_logger().and_then(|logger| logger.logger.active_path()) {
        Ok(Some(path)) => to_jstring(&mut env, &path.to_string_lossy()),
        Ok(None) => std::ptr::null_mut(),
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            std::ptr::null_mut()
        }
    }
}

/// JNI: Start forwarding orientation sensor samples
#[no_mangle]
pub extern "C" fn Java_com_google_android_apps_location_gps_gnsslogger_JniBinding_registerSensorFeed(
    mut env: JNIEnv,
    _class: JClass,
) -> jint {
    match get_logger() {
        Ok(logger) => {
            logger.feed.register();
            0
        }
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            -1
        }
    }
}

/// JNI: Stop forwarding orientation sensor samples
#[no_mangle]
pub extern "C" fn Java_com_google_android_apps_location_gps_gnsslogger_JniBinding_unregisterSensorFeed(
    mut env: JNIEnv,
    _class: JClass,
) -> jint {
    match get_logger() {
        Ok(logger) => {
            logger.feed.unregister();
            0
        }
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            -1
        }
    }
}

/// JNI: Push accelerometer sample (m/s²)
#[no_mangle]
pub extern "C" fn Java_com_google_android_apps_location_gps_gnsslogger_JniBinding_pushAccelerometerSample(
    mut env: JNIEnv,
    _class: JClass,
    x: jfloat,
    y: jfloat,
    z: jfloat,
) -> jint {
    match get_logger() {
        Ok(logger) => {
            logger.feed.on_accelerometer_sample(Vector3::new(x, y, z));
            0
        }
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            -1
        }
    }
}

/// JNI: Push magnetometer sample (µT)
#[no_mangle]
pub extern "C" fn Java_com_google_android_apps_location_gps_gnsslogger_JniBinding_pushMagnetometerSample(
    mut env: JNIEnv,
    _class: JClass,
    x: jfloat,
    y: jfloat,
    z: jfloat,
) -> jint {
    match get_logger() {
        Ok(logger) => {
            logger.feed.on_magnetometer_sample(Vector3::new(x, y, z));
            0
        }
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            -1
        }
    }
}

/// JNI: Toggle the GPS-only constellation filter
#[no_mangle]
pub extern "C" fn Java_com_google_android_apps_location_gps_gnsslogger_JniBinding_setGpsOnly(
    mut env: JNIEnv,
    _class: JClass,
    gps_only: jboolean,
) -> jint {
    match get_logger() {
        Ok(logger) => {
            logger.gps_only.store(gps_only != JNI_FALSE, Ordering::Release);
            0
        }
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            -1
        }
    }
}

/// JNI: Log one GNSS epoch
/// Parameters: host SystemClock.elapsedRealtime(), clock fields, then parallel
/// arrays of svid, constellation type and C/N0
/// Returns: number of records written, -1 on error (throws Java exception)
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub extern "C" fn Java_com_google_android_apps_location_gps_gnsslogger_JniBinding_onMeasurementBatch(
    mut env: JNIEnv,
    _class: JClass,
    elapsed_realtime_millis: jlong,
    time_nanos: jlong,
    full_bias_nanos: jlong,
    has_leap_second: jboolean,
    leap_second: jint,
    svids: JIntArray,
    constellation_types: JIntArray,
    cn0s: JDoubleArray,
) -> jint {
    let clock = GnssClockSnapshot {
        time_nanos,
        full_bias_nanos,
        has_leap_second: has_leap_second != JNI_FALSE,
        leap_second,
    };

    match on_measurement_batch_impl(
        &mut env,
        elapsed_realtime_millis,
        &clock,
        &svids,
        &constellation_types,
        &cn0s,
    ) {
        Ok(written) => written,
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            -1
        }
    }
}

fn on_measurement_batch_impl(
    env: &mut JNIEnv,
    elapsed_realtime_millis: i64,
    clock: &GnssClockSnapshot,
    svids: &JIntArray,
    constellation_types: &JIntArray,
    cn0s: &JDoubleArray,
) -> LogResult<jint> {
    let jni_err = |e: jni::errors::Error| LogError::JniError(e.to_string());

    let len = env.get_array_length(svids).map_err(jni_err)?;
    if env.get_array_length(constellation_types).map_err(jni_err)? != len
        || env.get_array_length(cn0s).map_err(jni_err)? != len
    {
        return Err(LogError::InvalidParameters(
            "Measurement arrays differ in length".to_string(),
        ));
    }

    let mut svid_buf = vec![0; len as usize];
    let mut type_buf = vec![0; len as usize];
    let mut cn0_buf = vec![0.0; len as usize];
    env.get_int_array_region(svids, 0, &mut svid_buf).map_err(jni_err)?;
    env.get_int_array_region(constellation_types, 0, &mut type_buf)
        .map_err(jni_err)?;
    env.get_double_array_region(cn0s, 0, &mut cn0_buf).map_err(jni_err)?;

    let measurements: Vec<MeasurementInput> = svid_buf
        .iter()
        .zip(type_buf.iter())
        .zip(cn0_buf.iter())
        .map(|((&svid, &constellation_type), &cn0)| {
            MeasurementInput::new(svid, Constellation::from_android_type(constellation_type), cn0)
        })
        .collect();

    let logger = get_logger()?;
    logger.realtime.sync(elapsed_realtime_millis);
    let gps_only = logger.gps_only.load(Ordering::Acquire);
    let report = logger
        .logger
        .on_measurement_batch(clock, &measurements, gps_only)?;

    if !report.is_clean() {
        let details = report
            .failures
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(LogError::io(
            format!("{} record(s) failed to write", report.failures.len()),
            io::Error::new(io::ErrorKind::Other, details),
        ));
    }

    Ok(report.written as jint)
}

/// JNI: Current orientation [azimuth, pitch, roll] in degrees
/// Returns: jfloatArray with 3 elements, or null on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_google_android_apps_location_gps_gnsslogger_JniBinding_getOrientation(
    mut env: JNIEnv,
    _class: JClass,
) -> jfloatArray {
    match get_orientation_impl(&mut env) {
        Ok(arr) => arr,
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            std::ptr::null_mut()
        }
    }
}

fn get_orientation_impl(env: &mut JNIEnv) -> LogResult<jfloatArray> {
    let jni_err = |e: jni::errors::Error| LogError::JniError(e.to_string());

    let logger = get_logger()?;
    let state = logger.estimator.current_orientation();
    let angles = [state.azimuth(), state.pitch(), state.roll()];

    let arr = env.new_float_array(3).map_err(jni_err)?;
    env.set_float_array_region(&arr, 0, &angles).map_err(jni_err)?;
    Ok(arr.into_raw())
}
