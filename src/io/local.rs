use std::fs::File;
use std::io::{Seek as _, SeekFrom};
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{ReadAt, Seek, clamp_seek};
use crate::error::{Error, Result};

/// Local file reader with random access support
pub struct LocalFileReader {
    file: File,
    path: PathBuf,
    size: u64,
    offset: u64,
}

impl LocalFileReader {
    /// Open `path`; `NotFound` and `PermissionDenied` surface as [`Error::Io`].
    pub fn new(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            file,
            path: path.to_path_buf(),
            size,
            offset: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current logical offset.
    pub fn position(&self) -> u64 {
        self.offset
    }
}

#[async_trait]
impl ReadAt for LocalFileReader {
    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if offset >= self.size {
            return Err(Error::EndOfData);
        }

        let want = (self.size - offset).min(buf.len() as u64) as usize;
        let mut filled = 0;
        while filled < want {
            let n = pread(&self.file, &mut buf[filled..want], offset + filled as u64)?;
            if n == 0 {
                // file shrank underneath us
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    fn size(&self) -> u64 {
        self.size
    }
}

impl Seek for LocalFileReader {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = clamp_seek(self.offset, self.size, pos);
        self.offset = self.file.seek(SeekFrom::Start(target))?;
        Ok(self.offset)
    }
}

fn pread(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileExt;
        file.read_at(buf, offset)
    }

    #[cfg(windows)]
    {
        // seek_read moves the OS cursor; Seek re-positions explicitly
        use std::os::windows::fs::FileExt;
        file.seek_read(buf, offset)
    }

    #[cfg(not(any(unix, windows)))]
    {
        use std::io::Read;
        let mut file = file;
        file.seek(SeekFrom::Start(offset))?;
        file.read(buf)
    }
}
