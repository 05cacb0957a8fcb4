mod http;
mod local;
mod object;
mod s3;

pub use http::HttpRangeReader;
pub use local::LocalFileReader;
pub use object::{Connector, ObjectBody, ObjectClient, S3Client, S3Connector};
pub use s3::S3RangeReader;

use std::future::Future;
use std::io::SeekFrom;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Trait for random access reading from a data source
#[async_trait]
pub trait ReadAt: Send {
    /// Read data at the specified offset into the buffer.
    ///
    /// Returns `min(buf.len(), size - offset)` bytes, or [`Error::EndOfData`]
    /// when `offset` is at or past the end of the source.
    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;
}

/// Logical cursor positioning.
pub trait Seek {
    /// Move the cursor, clamping the result to `[0, size]`.
    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;
}

/// Resolve `pos` against the current cursor and clamp it to `[0, size]`.
pub(crate) fn clamp_seek(current: u64, size: u64, pos: SeekFrom) -> u64 {
    let target = match pos {
        SeekFrom::Start(n) => i128::from(n),
        SeekFrom::Current(delta) => i128::from(current) + i128::from(delta),
        SeekFrom::End(delta) => i128::from(size) + i128::from(delta),
    };
    target.clamp(0, i128::from(size)) as u64
}

/// Race a network future against the caller's cancellation token.
pub(crate) async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        res = fut => res,
    }
}

/// True if `err`, or any error wrapped inside it, is a connection reset.
pub(crate) fn is_connection_reset(err: &std::io::Error) -> bool {
    let mut next: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(cause) = next {
        next = match cause.downcast_ref::<std::io::Error>() {
            Some(io) if io.kind() == std::io::ErrorKind::ConnectionReset => return true,
            // io::Error::source skips the wrapped error itself
            Some(io) => io
                .get_ref()
                .map(|inner| inner as &(dyn std::error::Error + 'static)),
            None => cause.source(),
        };
    }
    false
}
