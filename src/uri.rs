use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use percent_encoding::percent_decode_str;
use url::Url;

use crate::error::{Error, Result};

/// A parsed source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceUri {
    /// Bare path or `file://` URI.
    Local(PathBuf),
    /// `http://` or `https://` URL.
    Http(Url),
    /// `s3://bucket/key` or `s3a://bucket/key`.
    S3 { bucket: String, key: String },
}

impl SourceUri {
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidUri {
            uri: raw.to_owned(),
            reason,
        };

        let url = match Url::parse(raw) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                return Ok(SourceUri::Local(PathBuf::from(raw)));
            }
            Err(e) => return Err(invalid(e.to_string())),
        };

        match url.scheme() {
            "file" => url
                .to_file_path()
                .map(SourceUri::Local)
                .map_err(|()| invalid("not a local file path".to_owned())),
            "http" | "https" => Ok(SourceUri::Http(url)),
            "s3" | "s3a" => {
                let bucket = url
                    .host_str()
                    .filter(|b| !b.is_empty())
                    .ok_or_else(|| invalid("missing bucket".to_owned()))?;
                let key = percent_decode_str(url.path().trim_start_matches('/'))
                    .decode_utf8()
                    .map_err(|e| invalid(e.to_string()))?;
                if key.is_empty() {
                    return Err(invalid("missing object key".to_owned()));
                }
                Ok(SourceUri::S3 {
                    bucket: bucket.to_owned(),
                    key: key.into_owned(),
                })
            }
            // drive letters such as C:\data.parquet
            scheme if cfg!(windows) && scheme.len() == 1 => {
                Ok(SourceUri::Local(PathBuf::from(raw)))
            }
            scheme => Err(Error::UnsupportedScheme(scheme.to_owned())),
        }
    }
}

impl FromStr for SourceUri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for SourceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceUri::Local(path) => write!(f, "{}", path.display()),
            SourceUri::Http(url) => write!(f, "{url}"),
            SourceUri::S3 { bucket, key } => write!(f, "s3://{bucket}/{key}"),
        }
    }
}
