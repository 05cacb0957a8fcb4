use std::io::{self, SeekFrom};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{ObjectBody, ObjectClient, ReadAt, Seek, cancellable, clamp_seek, is_connection_reset};
use crate::error::{Error, Result};

/// How many times a sequential read reopens the stream after a connection reset.
const MAX_RESET_RETRIES: u32 = 1;

/// Ranged reader over a single object-storage object.
///
/// `read_at` issues one bounded range request per call and leaves the
/// logical offset untouched, closing any open sequential stream first.
/// `read` keeps a streaming body open from the current offset to the end of
/// the object and survives a single connection reset by reopening at the
/// current offset.
pub struct S3RangeReader {
    client: Arc<dyn ObjectClient>,
    bucket: String,
    key: String,
    size: u64,
    offset: u64,
    body: Option<ObjectBody>,
    cancel: CancellationToken,
}

impl S3RangeReader {
    /// Probe the object's size and create a reader positioned at 0.
    pub async fn open(
        client: Arc<dyn ObjectClient>,
        bucket: &str,
        key: &str,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let size = cancellable(&cancel, client.head_object(bucket, key)).await?;
        Ok(Self::with_size(client, bucket, key, size, cancel))
    }

    /// Create a reader for an object whose size is already known.
    pub fn with_size(
        client: Arc<dyn ObjectClient>,
        bucket: &str,
        key: &str,
        size: u64,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            size,
            offset: 0,
            body: None,
            cancel,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current logical offset.
    pub fn position(&self) -> u64 {
        self.offset
    }

    /// Sequential read from the logical offset.
    ///
    /// Returns `Ok(0)` once the offset reaches the end of the object.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || self.offset >= self.size {
            return Ok(0);
        }

        let mut resets = 0;
        loop {
            let mut body = match self.body.take() {
                Some(body) => body,
                None => self.open_range(self.offset, self.size - 1).await?,
            };

            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                read = body.read(buf) => read,
            };

            match read {
                Ok(0) => {
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!(
                            "s3://{}/{} ended at {} of {} bytes",
                            self.bucket, self.key, self.offset, self.size
                        ),
                    )));
                }
                Ok(n) => {
                    self.offset += n as u64;
                    self.body = Some(body);
                    return Ok(n);
                }
                Err(err) if is_connection_reset(&err) => {
                    if resets >= MAX_RESET_RETRIES {
                        return Err(Error::ConnectionReset(err));
                    }
                    resets += 1;
                    warn!(
                        bucket = %self.bucket,
                        key = %self.key,
                        offset = self.offset,
                        "connection reset, reopening stream"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Release the open streaming body, if any.
    pub fn close(&mut self) {
        if self.body.take().is_some() {
            debug!(bucket = %self.bucket, key = %self.key, "closed stream");
        }
    }

    // &mut keeps the future Send; an open body is not Sync
    async fn open_range(&mut self, start: u64, end: u64) -> Result<ObjectBody> {
        cancellable(
            &self.cancel,
            self.client.get_range(&self.bucket, &self.key, start, end),
        )
        .await
    }
}

#[async_trait]
impl ReadAt for S3RangeReader {
    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if offset >= self.size {
            return Err(Error::EndOfData);
        }

        let end = offset
            .saturating_add(buf.len() as u64 - 1)
            .min(self.size - 1);
        let count = (end - offset + 1) as usize;

        // at most one stream per reader; `read` reopens at `self.offset`
        self.close();
        let mut body = self.open_range(offset, end).await?;
        let buf = &mut buf[..count];
        cancellable(&self.cancel, async {
            body.read_exact(buf).await?;
            Ok(())
        })
        .await?;
        Ok(count)
    }

    fn size(&self) -> u64 {
        self.size
    }
}

impl Seek for S3RangeReader {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = clamp_seek(self.offset, self.size, pos);
        if target != self.offset {
            self.offset = target;
            self.close();
        }
        Ok(self.offset)
    }
}
