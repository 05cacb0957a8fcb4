//! Main entry point for the rangeread CLI application.
//!
//! Resolves each URI given on the command line into a byte source and
//! reports its size, optionally dumping its first bytes.

use anyhow::{Result, bail};
use clap::Parser;
use tokio::io::AsyncWriteExt;
use tracing_subscriber::EnvFilter;

use rangeread::{Cli, FileScopeStore, ReadAt, Source, SourceResolver};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let store = match &cli.s3_config {
        Some(path) => FileScopeStore::new(path),
        None => {
            // first run: leave an example store for the user to edit
            let store = FileScopeStore::new(FileScopeStore::default_path());
            store.ensure_exists()?;
            store
        }
    };
    let resolver = SourceResolver::new(store);

    let results = resolver.resolve_all(&cli.uris).await;
    let mut failed = 0usize;
    for (uri, result) in cli.uris.iter().zip(results) {
        match result {
            Ok(mut source) => {
                println!("{uri}\t{}", source.size());
                if let Some(n) = cli.head {
                    dump_head(&mut source, n).await?;
                }
                source.close();
            }
            Err(e) => {
                eprintln!("{uri}: {e}");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} sources could not be opened", cli.uris.len());
    }
    Ok(())
}

/// Copy up to `limit` bytes from the start of `source` to stdout.
async fn dump_head(source: &mut Source, limit: usize) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut buf = vec![0u8; limit.min(64 * 1024)];
    let mut remaining = limit;
    while remaining > 0 {
        let want = remaining.min(buf.len());
        let n = source.read(&mut buf[..want]).await?;
        if n == 0 {
            break;
        }
        stdout.write_all(&buf[..n]).await?;
        remaining -= n;
    }
    stdout.flush().await?;
    Ok(())
}
