use std::io;
use std::path::PathBuf;

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced while resolving or reading a byte source.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The URI could not be parsed.
    #[error("invalid URI {uri}: {reason}")]
    InvalidUri { uri: String, reason: String },

    /// The URI scheme is not one of file, http, https, s3 or s3a.
    #[error("unsupported URI scheme: {0}")]
    UnsupportedScheme(String),

    /// The metadata probe did not report an exact object size.
    #[error("{0} did not return Content-Length")]
    MissingContentLength(String),

    /// The remote end answered with a non-success status.
    #[error("upstream returned status {status} for {resource}")]
    Upstream { status: u16, resource: String },

    /// No stored profile could reach the bucket.
    #[error("no access to bucket {bucket} (tried profiles: {})", tried_profiles.join(", "))]
    NoAccessToBucket {
        bucket: String,
        tried_profiles: Vec<String>,
    },

    /// The profile store exists but could not be read or decoded.
    #[error("failed to decode profile store {}: {reason}", path.display())]
    ConfigDecode { path: PathBuf, reason: String },

    /// The profile store could not be written.
    #[error("failed to write profile store {}: {source}", path.display())]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A read was requested at or past the end of the source.
    #[error("end of data")]
    EndOfData,

    /// The connection was reset and the single reconnect attempt failed as well.
    #[error("connection reset while streaming object: {0}")]
    ConnectionReset(#[source] io::Error),

    /// The downloaded body does not match the size reported by the probe.
    #[error("expected {expected} bytes from {resource}, received {actual}")]
    SizeMismatch {
        resource: String,
        expected: u64,
        actual: u64,
    },

    /// Object-storage transport failure that carried no HTTP status.
    #[error("object storage request failed: {0}")]
    ObjectStore(String),

    /// The caller-supplied cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// `EndOfData` signals normal completion rather than a failure.
    pub fn is_end_of_data(&self) -> bool {
        matches!(self, Error::EndOfData)
    }

    /// The OS error kind for local I/O failures such as `NotFound` or `PermissionDenied`.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Error::Io(e) | Error::ConnectionReset(e) => Some(e.kind()),
            Error::ConfigWrite { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}
