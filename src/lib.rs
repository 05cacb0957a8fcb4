//! # rangeread
//!
//! Random-access byte sources over local files, HTTP objects and
//! S3-compatible object storage.
//!
//! A downstream format parser (typically a Parquet reader) gets one
//! [`Source`] per URI and only ever calls [`ReadAt::read_at`] and
//! [`Seek::seek`] on it, whatever is behind it.
//!
//! ## Sources
//!
//! - Local paths and `file://` URIs read the file positionally
//! - `http://` and `https://` URLs are probed with HEAD and downloaded in
//!   full on the first read, then served from memory
//! - `s3://` and `s3a://` URIs use inclusive byte-range requests; sequential
//!   reads survive one connection reset by reopening at the current offset
//!
//! ## Profiles
//!
//! Object-storage credentials come from an ordered list of connection
//! profiles (see [`scope`]). The resolver learns which profile reaches which
//! bucket and records it, so later opens go straight to the right profile.
//!
//! ## Example
//!
//! ```no_run
//! use rangeread::{FileScopeStore, ReadAt, SourceResolver};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let resolver = SourceResolver::new(FileScopeStore::new(FileScopeStore::default_path()));
//!     let mut source = resolver.resolve("s3://bucket/data.parquet").await?;
//!
//!     // Parquet files end with the footer length and magic
//!     let mut tail = [0u8; 8];
//!     source.read_at(source.size() - 8, &mut tail).await?;
//!     println!("{:?}", &tail[4..]);
//!
//!     source.close();
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod io;
pub mod resolver;
pub mod scope;
pub mod source;
pub mod uri;

#[cfg(test)]
mod testing;

pub use cli::Cli;
pub use error::{Error, Result};
pub use io::{HttpRangeReader, LocalFileReader, ReadAt, S3RangeReader, Seek};
pub use resolver::SourceResolver;
pub use scope::{AccessScopeStore, ConnectionProfile, FileScopeStore};
pub use source::Source;
pub use uri::SourceUri;
