use jni::JNIEnv;
use std::io;
use thiserror::Error;

/// Logger error types
#[derive(Error, Debug)]
pub enum LogError {
    /// Reported by the caller when external storage is not mounted read-write.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("No active log session")]
    NoActiveSession,

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("JNI error: {0}")]
    JniError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LogError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        LogError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn lock_poisoned(what: &str) -> Self {
        LogError::Internal(format!("Failed to acquire {} lock", what))
    }
}

/// Result type for logger operations
pub type LogResult<T> = Result<T, LogError>;

/// Throw Java exception from Rust error
pub fn throw_java_exception(env: &mut JNIEnv, error: &LogError) -> LogResult<()> {
    let exception_class = match error {
        LogError::NoActiveSession => "java/lang/IllegalStateException",
        LogError::InvalidParameters(_) => "java/lang/IllegalArgumentException",
        LogError::StorageUnavailable(_) | LogError::Io { .. } => "java/io/IOException",
        LogError::JniError(_) | LogError::Internal(_) => "java/lang/RuntimeException",
    };

    let message = error.to_string();
    env.throw_new(exception_class, message)
        .map_err(|_| LogError::JniError("Failed to throw exception".to_string()))?;

    Ok(())
}
