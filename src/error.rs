use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// The local store could not be opened or written. Callers degrade to
    /// remote-only operation instead of treating this as fatal.
    #[error("Local store unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Collection '{0}' not found")]
    CollectionNotFound(String),

    #[error("Record with key '{0}' not found")]
    RecordNotFound(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Expected steady state for an offline-first client, not a failure.
    #[error("Network unavailable")]
    NetworkUnavailable,

    /// Transient remote failure, retried per the owning component's policy.
    #[error("Remote request failed ({status}): {message}")]
    RemoteRequestFailed { status: u16, message: String },

    /// Replication stopped before the full dataset arrived. Reported as a
    /// warning state; cached data stays searchable.
    #[error("Sync incomplete: {0}")]
    SyncIncomplete(String),

    /// A queued mutation exhausted its retry budget. Surfaced for manual
    /// intervention, never silently dropped.
    #[error("Mutation '{0}' permanently failed: {1}")]
    MutationPermanentlyFailed(String, String),

    /// Cold start: nothing cached and no connectivity.
    #[error("No data available: store is empty and the network is down")]
    NoDataAvailable,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Build a remote failure from an HTTP status and message.
    pub fn remote(status: u16, message: impl Into<String>) -> Self {
        CoreError::RemoteRequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Whether a retry against the remote system can reasonably succeed.
    /// Timeouts, rate limiting and server errors are transient; client
    /// errors are permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreError::RemoteRequestFailed { status, .. } => {
                matches!(status, 0 | 408 | 429 | 500..=599)
            }
            CoreError::NetworkUnavailable => true,
            _ => false,
        }
    }
}

impl From<rocksdb::Error> for CoreError {
    fn from(err: rocksdb::Error) -> Self {
        CoreError::StorageUnavailable(err.into_string())
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(err: reqwest::Error) -> Self {
        // Transport-level failures carry no HTTP status; status 0 marks them
        // retryable in `is_retryable`.
        let status = err.status().map(|s| s.as_u16()).unwrap_or(0);
        CoreError::RemoteRequestFailed {
            status,
            message: err.to_string(),
        }
    }
}

impl serde::Serialize for CoreError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}
