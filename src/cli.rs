use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "rangeread")]
#[command(version)]
#[command(about = "Open local, HTTP and S3 objects as random-access sources", long_about = None)]
#[command(after_help = "Examples:\n  \
  rangeread data.parquet s3://bucket/part-0.parquet   print the size of each source\n  \
  rangeread --head 4 https://example.com/x.parquet    dump the first 4 bytes\n\n\
Set RUST_LOG=rangeread=debug to trace requests.")]
pub struct Cli {
    /// Local path, file://, http(s)://, s3:// or s3a:// URI
    #[arg(value_name = "URI", required = true, num_args = 1..)]
    pub uris: Vec<String>,

    /// Object-storage profile store (default: ~/.rangeread/s3.toml)
    #[arg(long = "s3-config", value_name = "FILE")]
    pub s3_config: Option<PathBuf>,

    /// Write the first N bytes of each source to stdout
    #[arg(long, value_name = "N")]
    pub head: Option<usize>,
}
