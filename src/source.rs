use std::fmt;
use std::io::SeekFrom;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::io::{HttpRangeReader, LocalFileReader, ReadAt, S3RangeReader, Seek};

/// An opened byte source, selected once by scheme at open time.
pub enum Source {
    Local(LocalFileReader),
    Http(HttpRangeReader),
    S3(S3RangeReader),
}

impl Source {
    /// Current logical offset.
    pub fn position(&self) -> u64 {
        match self {
            Source::Local(r) => r.position(),
            Source::Http(r) => r.position(),
            Source::S3(r) => r.position(),
        }
    }

    /// Sequential read from the logical offset; `Ok(0)` at the end.
    ///
    /// Object-storage sources stream; the others read positionally and
    /// advance the cursor.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if let Source::S3(r) = self {
            return r.read(buf).await;
        }
        let offset = self.position();
        match self.read_at(offset, buf).await {
            Ok(n) => {
                self.seek(SeekFrom::Current(n as i64))?;
                Ok(n)
            }
            Err(Error::EndOfData) => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Release any open network stream. Safe to call more than once.
    pub fn close(&mut self) {
        if let Source::S3(r) = self {
            r.close();
        }
    }
}

#[async_trait]
impl ReadAt for Source {
    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        match self {
            Source::Local(r) => r.read_at(offset, buf).await,
            Source::Http(r) => r.read_at(offset, buf).await,
            Source::S3(r) => r.read_at(offset, buf).await,
        }
    }

    fn size(&self) -> u64 {
        match self {
            Source::Local(r) => r.size(),
            Source::Http(r) => r.size(),
            Source::S3(r) => r.size(),
        }
    }
}

impl Seek for Source {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        match self {
            Source::Local(r) => r.seek(pos),
            Source::Http(r) => r.seek(pos),
            Source::S3(r) => r.seek(pos),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Local(r) => write!(f, "{}", r.path().display()),
            Source::Http(r) => f.write_str(r.url()),
            Source::S3(r) => write!(f, "s3://{}/{}", r.bucket(), r.key()),
        }
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Source::Local(_) => "Local",
            Source::Http(_) => "Http",
            Source::S3(_) => "S3",
        };
        f.debug_struct("Source")
            .field("kind", &kind)
            .field("location", &self.to_string())
            .field("size", &self.size())
            .field("position", &self.position())
            .finish()
    }
}
