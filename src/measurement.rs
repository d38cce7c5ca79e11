use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display, LowerExp};

/// Satellite system, numbered as Android's `GnssStatus.CONSTELLATION_*`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Constellation {
    Unknown,
    Gps,
    Sbas,
    Glonass,
    Qzss,
    BeiDou,
    Galileo,
    Irnss,
}

impl Constellation {
    pub fn from_android_type(constellation_type: i32) -> Self {
        match constellation_type {
            1 => Constellation::Gps,
            2 => Constellation::Sbas,
            3 => Constellation::Glonass,
            4 => Constellation::Qzss,
            5 => Constellation::BeiDou,
            6 => Constellation::Galileo,
            7 => Constellation::Irnss,
            _ => Constellation::Unknown,
        }
    }

    pub fn is_gps(&self) -> bool {
        matches!(self, Constellation::Gps)
    }
}

/// One satellite measurement from an epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasurementInput {
    pub svid: i32,
    pub constellation: Constellation,
    pub cn0_db_hz: f64,
}

impl MeasurementInput {
    pub fn new(svid: i32, constellation: Constellation, cn0_db_hz: f64) -> Self {
        Self {
            svid,
            constellation,
            cn0_db_hz,
        }
    }
}

/// One data line of the log file
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub elapsed_realtime_millis: i64,
    pub utc_time_millis: i64,
    pub svid: i32,
    pub cn0_db_hz: f64,
    pub azimuth: f32,
    pub pitch: f32,
    pub roll: f32,
}

impl Display for MeasurementRecord {
    /// `ElapsedRealtimeMillis,UtcTimeMillis,Svid,Cn0DbHz,angleZ,angleX,angleY`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{},{}",
            self.elapsed_realtime_millis,
            self.utc_time_millis,
            self.svid,
            java_decimal(self.cn0_db_hz),
            java_decimal(self.azimuth),
            java_decimal(self.pitch),
            java_decimal(self.roll),
        )
    }
}

/// Renders a float the way `Float.toString` / `Double.toString` do, so files
/// stay byte-compatible with the existing GnssLogger output.
pub fn java_decimal<T>(value: T) -> String
where
    T: Copy + Debug + LowerExp + Into<f64>,
{
    let wide: f64 = value.into();
    if wide.is_nan() {
        return "NaN".to_string();
    }
    if wide.is_infinite() {
        return if wide > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }

    let magnitude = wide.abs();
    if magnitude == 0.0 || (1e-3..1e7).contains(&magnitude) {
        return format!("{:?}", value);
    }

    let scientific = format!("{:e}", value);
    match scientific.split_once('e') {
        Some((mantissa, exponent)) if mantissa.contains('.') => {
            format!("{}E{}", mantissa, exponent)
        }
        Some((mantissa, exponent)) => format!("{}.0E{}", mantissa, exponent),
        None => scientific,
    }
}
