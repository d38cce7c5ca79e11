use chrono::{DateTime, Local};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::{DeviceInfo, LoggerConfig};
use crate::error::{LogError, LogResult};
use crate::measurement::MeasurementRecord;

const COMMENT_START: &str = "# ";
const VERSION_TAG: &str = "Version: ";
const COLUMNS: &str = "ElapsedRealtimeMillis,UtcTimeMillis,Svid,Cn0DbHz,angleZ,angleX,angleY";
const FILE_TIMESTAMP_FORMAT: &str = "%Y_%m_%d_%H_%M_%S";
const MAX_NAME_ATTEMPTS: u32 = 1000;
const WRITE_BUFFER_CAPACITY: usize = 8 * 1024;

/// Comment block written at the top of every log file
pub fn header(device: &DeviceInfo) -> String {
    let mut header = String::new();
    for line in [
        String::new(),
        "Header Description:".to_string(),
        String::new(),
        format!("{}{}", VERSION_TAG, device.version_line()),
        String::new(),
        COLUMNS.to_string(),
        String::new(),
    ] {
        header.push_str(COMMENT_START);
        header.push_str(&line);
        header.push('\n');
    }
    header
}

/// `<prefix>_yyyy_MM_dd_HH_mm_ss.txt`, with `_<n>` before the extension on collision
pub fn file_name(prefix: &str, now: &DateTime<Local>, attempt: u32) -> String {
    let timestamp = now.format(FILE_TIMESTAMP_FORMAT);
    if attempt == 0 {
        format!("{}_{}.txt", prefix, timestamp)
    } else {
        format!("{}_{}_{}.txt", prefix, timestamp, attempt)
    }
}

/// One open log file
pub struct LogSession {
    path: PathBuf,
    writer: Option<BufWriter<Box<dyn Write + Send>>>,
    header_written: bool,
    records_written: u64,
}

impl LogSession {
    /// Create a new log file in `base_directory` and write its header.
    ///
    /// The directory must already exist and be writable. When the header
    /// cannot be written the file is removed and no session is returned.
    pub fn start(base_directory: &Path, config: &LoggerConfig) -> LogResult<Self> {
        Self::start_at(base_directory, config, &Local::now())
    }

    pub fn start_at(
        base_directory: &Path,
        config: &LoggerConfig,
        now: &DateTime<Local>,
    ) -> LogResult<Self> {
        let (path, file) = create_unique(base_directory, &config.file_prefix, now)?;
        Self::with_writer(path, file, WRITE_BUFFER_CAPACITY, &config.device)
    }

    /// Session over an already opened sink for `path`.
    ///
    /// Writes the header immediately. On failure the sink is dropped, any
    /// file at `path` is removed and no session is returned.
    pub fn with_writer<W: Write + Send + 'static>(
        path: PathBuf,
        sink: W,
        buffer_capacity: usize,
        device: &DeviceInfo,
    ) -> LogResult<Self> {
        let sink: Box<dyn Write + Send> = Box::new(sink);
        let mut writer = BufWriter::with_capacity(buffer_capacity, sink);

        let written = writer
            .write_all(header(device).as_bytes())
            .and_then(|_| writer.flush());
        if let Err(e) = written {
            drop(writer);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(remove_err) if remove_err.kind() == io::ErrorKind::NotFound => {}
                Err(remove_err) => {
                    log::warn!("Could not remove {}: {}", path.display(), remove_err)
                }
            }
            return Err(LogError::io(
                format!("Could not initialize file: {}", path.display()),
                e,
            ));
        }

        Ok(LogSession {
            path,
            writer: Some(writer),
            header_written: true,
            records_written: 0,
        })
    }

    /// Write one record as a single line
    pub fn append(&mut self, record: &MeasurementRecord) -> LogResult<()> {
        let writer = self.writer.as_mut().ok_or(LogError::NoActiveSession)?;
        // one write per line: a failed write leaves none of it buffered
        let line = format!("{}\n", record);
        writer
            .write_all(line.as_bytes())
            .map_err(|e| LogError::io("Problem writing to file", e))?;
        self.records_written += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> LogResult<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer
                .flush()
                .map_err(|e| LogError::io("Unable to flush file stream", e))?;
        }
        Ok(())
    }

    /// Flush and release the file. Closing twice is a no-op.
    ///
    /// The file is released even when the final flush fails.
    pub fn close(&mut self) -> LogResult<()> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .flush()
                .map_err(|e| LogError::io("Unable to close file stream", e))?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    pub fn header_written(&self) -> bool {
        self.header_written
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }
}

impl Drop for LogSession {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("Dropping log session {}: {}", self.path.display(), e);
        }
    }
}

fn create_unique(
    base_directory: &Path,
    prefix: &str,
    now: &DateTime<Local>,
) -> LogResult<(PathBuf, File)> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let path = base_directory.join(file_name(prefix, now, attempt));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(LogError::io(
                    format!("Could not open file: {}", path.display()),
                    e,
                ))
            }
        }
    }
    Err(LogError::io(
        format!("Could not open file in {}", base_directory.display()),
        io::Error::new(io::ErrorKind::AlreadyExists, "no free file name"),
    ))
}


#[cfg(test)]
mod tests {
    use super::fault::FaultyWriter;
    use super::*;
    use chrono::TimeZone;
    use std::env;

    fn test_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("gnss_logger_session_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn test_config() -> LoggerConfig {
        LoggerConfig::default().with_device(DeviceInfo {
            app_version: "v3.0.5.6".to_string(),
            platform_release: "14".to_string(),
            manufacturer: "Google".to_string(),
            model: "Pixel 8".to_string(),
        })
    }

    fn record(svid: i32) -> MeasurementRecord {
        MeasurementRecord {
            elapsed_realtime_millis: 1000 + svid as i64,
            utc_time_millis: 1_700_000_000_000,
            svid,
            cn0_db_hz: 40.25,
            azimuth: 10.0,
            pitch: -2.5,
            roll: 1.0,
        }
    }

    #[test]
    fn test_file_name_pattern() {
        let now = Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 2).unwrap();
        assert_eq!(file_name("custom_log", &now, 0), "custom_log_2024_03_07_09_05_02.txt");
        assert_eq!(file_name("custom_log", &now, 2), "custom_log_2024_03_07_09_05_02_2.txt");
    }

    #[test]
    fn test_header_block() {
        let expected = "# \n\
                        # Header Description:\n\
                        # \n\
                        # Version: v3.0.5.6 Platform: 14 Manufacturer: Google Model: Pixel 8\n\
                        # \n\
                        # ElapsedRealtimeMillis,UtcTimeMillis,Svid,Cn0DbHz,angleZ,angleX,angleY\n\
                        # \n";
        assert_eq!(header(&test_config().device), expected);
    }

    #[test]
    fn test_start_writes_header() {
        let dir = test_dir("header");
        let mut session = LogSession::start(&dir, &test_config()).unwrap();
        assert!(session.is_open());
        assert!(session.header_written());

        let name = session.path().file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("custom_log_"));
        assert!(name.ends_with(".txt"));

        session.close().unwrap();
        let content = fs::read_to_string(session.path()).unwrap();
        assert_eq!(content, header(&test_config().device));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_append_then_close() {
        let dir = test_dir("append");
        let mut session = LogSession::start(&dir, &test_config()).unwrap();

        for svid in 1..=5 {
            session.append(&record(svid)).unwrap();
        }
        assert_eq!(session.records_written(), 5);
        session.close().unwrap();

        let content = fs::read_to_string(session.path()).unwrap();
        let data: Vec<&str> = content.lines().filter(|l| !l.starts_with("# ")).collect();
        assert_eq!(data.len(), 5);
        assert_eq!(data[0], "1001,1700000000000,1,40.25,10.0,-2.5,1.0");
        assert!(data.iter().all(|l| l.split(',').count() == 7));
        assert_eq!(content.matches("Header Description:").count(), 1);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = test_dir("close");
        let mut session = LogSession::start(&dir, &test_config()).unwrap();

        session.close().unwrap();
        session.close().unwrap();
        assert!(!session.is_open());
        assert!(matches!(session.append(&record(1)), Err(LogError::NoActiveSession)));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_same_second_does_not_truncate() {
        let dir = test_dir("collision");
        let now = Local::now();

        let mut first = LogSession::start_at(&dir, &test_config(), &now).unwrap();
        first.append(&record(7)).unwrap();
        first.close().unwrap();

        let second = LogSession::start_at(&dir, &test_config(), &now).unwrap();
        assert_ne!(first.path(), second.path());
        assert!(fs::read_to_string(first.path()).unwrap().contains(",7,"));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_directory_fails() {
        let dir = env::temp_dir().join(format!("gnss_logger_missing_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);

        let result = LogSession::start(&dir, &test_config());
        assert!(matches!(result, Err(LogError::Io { .. })));
    }

    #[test]
    fn test_header_failure_removes_file() {
        let dir = test_dir("header_failure");
        let path = dir.join("custom_log_2024_03_07_09_05_02.txt");
        fs::write(&path, "").unwrap();

        let result = LogSession::with_writer(
            path.clone(),
            FaultyWriter::rejecting("Header Description"),
            0,
            &test_config().device,
        );
        assert!(matches!(result, Err(LogError::Io { .. })));
        assert!(!path.exists());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_failed_append_leaves_nothing_buffered() {
        let sink = FaultyWriter::default();
        let mut session = LogSession::with_writer(
            env::temp_dir().join("gnss_logger_unused.txt"),
            sink.clone(),
            64,
            &test_config().device,
        )
        .unwrap();

        session.append(&record(1)).unwrap();
        // buffer cannot hold a second line, so this append has to flush the first
        sink.set_fail_writes(true);
        assert!(matches!(session.append(&record(2)), Err(LogError::Io { .. })));
        sink.set_fail_writes(false);
        session.append(&record(3)).unwrap();
        session.close().unwrap();

        let content = sink.contents();
        let data: Vec<&str> = content.lines().filter(|l| !l.starts_with("# ")).collect();
        assert_eq!(
            data,
            vec![
                "1001,1700000000000,1,40.25,10.0,-2.5,1.0",
                "1003,1700000000000,3,40.25,10.0,-2.5,1.0",
            ]
        );
        assert_eq!(session.records_written(), 2);
    }

    #[test]
    fn test_close_failure_still_releases_writer() {
        let sink = FaultyWriter::default();
        let mut session = LogSession::with_writer(
            env::temp_dir().join("gnss_logger_unused.txt"),
            sink.clone(),
            WRITE_BUFFER_CAPACITY,
            &test_config().device,
        )
        .unwrap();
        session.append(&record(1)).unwrap();

        sink.set_fail_flush(true);
        assert!(matches!(session.close(), Err(LogError::Io { .. })));
        assert!(!session.is_open());
        session.close().unwrap();
    }
}
