use std::io::SeekFrom;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use reqwest::header::{CONTENT_LENGTH, HeaderMap};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{ReadAt, Seek, cancellable, clamp_seek};
use crate::error::{Error, Result};

/// HTTP reader for remote objects.
///
/// Only the size is probed up front. The first `read_at` pulls the whole
/// object with a single GET; once that succeeds every later read is served
/// from memory and the instance never downloads the object again.
pub struct HttpRangeReader {
    client: Client,
    url: String,
    size: u64,
    offset: u64,
    data: Option<Bytes>,
    transferred_bytes: u64,
    cancel: CancellationToken,
}

impl HttpRangeReader {
    /// Create a new HTTP reader with a default client and no cancellation.
    ///
    /// This will send a HEAD request to get the file size
    pub async fn new(url: String) -> Result<Self> {
        Self::with_client(Client::new(), url, CancellationToken::new()).await
    }

    /// Create a reader sharing `client`; every request is raced against `cancel`.
    pub async fn with_client(
        client: Client,
        url: String,
        cancel: CancellationToken,
    ) -> Result<Self> {
        debug!(url = %url, "probing HTTP object");
        let resp = cancellable(&cancel, async { Ok(client.head(&url).send().await?) }).await?;

        if !resp.status().is_success() {
            return Err(Error::Upstream {
                status: resp.status().as_u16(),
                resource: url,
            });
        }

        let size = content_length(resp.headers())
            .ok_or_else(|| Error::MissingContentLength(url.clone()))?;

        Ok(Self {
            client,
            url,
            size,
            offset: 0,
            data: None,
            transferred_bytes: 0,
            cancel,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current logical offset.
    pub fn position(&self) -> u64 {
        self.offset
    }

    /// Get total bytes transferred from network
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes
    }

    async fn download(&mut self) -> Result<Bytes> {
        debug!(url = %self.url, size = self.size, "downloading whole object");
        let client = &self.client;
        let url = &self.url;
        let data = cancellable(&self.cancel, async {
            let resp = client.get(url).send().await?;
            if !resp.status().is_success() {
                return Err(Error::Upstream {
                    status: resp.status().as_u16(),
                    resource: url.clone(),
                });
            }
            Ok(resp.bytes().await?)
        })
        .await?;

        self.transferred_bytes += data.len() as u64;
        if data.len() as u64 != self.size {
            return Err(Error::SizeMismatch {
                resource: self.url.clone(),
                expected: self.size,
                actual: data.len() as u64,
            });
        }
        Ok(data)
    }
}

#[async_trait]
impl ReadAt for HttpRangeReader {
    async fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if offset >= self.size {
            return Err(Error::EndOfData);
        }

        let data = match &self.data {
            Some(data) => data.clone(),
            None => {
                let data = self.download().await?;
                self.data = Some(data.clone());
                data
            }
        };

        let start = offset as usize;
        let n = buf.len().min((self.size - offset) as usize);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.size
    }
}

impl Seek for HttpRangeReader {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.offset = clamp_seek(self.offset, self.size, pos);
        Ok(self.offset)
    }
}

/// Exact object size from the `Content-Length` header.
fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::Router;
    use axum::body::Body;
    use axum::extract::State;
    use axum::http::Method;
    use axum::routing::get;
    use reqwest::header::HeaderValue;
    use tokio::net::TcpListener;
    use tokio_util::io::ReaderStream;

    struct TestObject {
        data: Bytes,
        gets: AtomicUsize,
    }

    async fn serve_object(State(object): State<Arc<TestObject>>, method: Method) -> Bytes {
        if method == Method::GET {
            object.gets.fetch_add(1, Ordering::SeqCst);
        }
        object.data.clone()
    }

    /// Streamed body, so no `Content-Length` is sent.
    async fn serve_unsized(State(object): State<Arc<TestObject>>) -> Body {
        Body::from_stream(ReaderStream::new(std::io::Cursor::new(object.data.clone())))
    }

    /// Advertises the full length on HEAD but sends half of it on GET.
    async fn serve_truncated(State(object): State<Arc<TestObject>>, method: Method) -> Bytes {
        if method == Method::GET {
            object.gets.fetch_add(1, Ordering::SeqCst);
            return object.data.slice(..object.data.len() / 2);
        }
        object.data.clone()
    }

    /// Start a test HTTP server serving one object at `/data.bin`, a streamed
    /// copy at `/unsized.bin` and a short copy at `/truncated.bin`
    async fn start_test_server(len: usize) -> (String, Arc<TestObject>) {
        let data: Vec<u8> = (0..len).map(|i| (i * 7 % 256) as u8).collect();
        let object = Arc::new(TestObject {
            data: Bytes::from(data),
            gets: AtomicUsize::new(0),
        });
        let app = Router::new()
            .route("/data.bin", get(serve_object))
            .route("/unsized.bin", get(serve_unsized))
            .route("/truncated.bin", get(serve_truncated))
            .with_state(object.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}/data.bin"), object)
    }

    #[tokio::test]
    async fn many_reads_download_once() {
        let (url, object) = start_test_server(100_003).await;
        let mut reader = HttpRangeReader::new(url).await.unwrap();
        assert_eq!(reader.size(), 100_003);
        assert_eq!(object.gets.load(Ordering::SeqCst), 0);

        let reads = [(0u64, 100usize), (99_990, 64), (4_096, 4_096), (100_002, 1), (17, 1)];
        for (offset, len) in reads {
            let mut buf = vec![0u8; len];
            let n = reader.read_at(offset, &mut buf).await.unwrap();
            let expected = len.min((100_003 - offset) as usize);
            assert_eq!(n, expected);
            assert_eq!(&buf[..n], &object.data[offset as usize..offset as usize + n]);
        }

        assert_eq!(object.gets.load(Ordering::SeqCst), 1);
        assert_eq!(reader.transferred_bytes(), 100_003);
    }

    #[tokio::test]
    async fn seek_and_end_of_data_do_no_io() {
        let (url, object) = start_test_server(1_000).await;
        let mut reader = HttpRangeReader::new(url).await.unwrap();

        assert_eq!(reader.seek(SeekFrom::End(0)).unwrap(), 1_000);
        assert_eq!(reader.seek(SeekFrom::Current(10)).unwrap(), 1_000);
        assert_eq!(reader.seek(SeekFrom::Start(0)).unwrap(), 0);
        assert_eq!(reader.seek(SeekFrom::Current(-1)).unwrap(), 0);

        let mut buf = [0u8; 8];
        assert!(reader.read_at(1_000, &mut buf).await.unwrap_err().is_end_of_data());
        assert_eq!(object.gets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_object_is_upstream_error() {
        let (url, _) = start_test_server(16).await;
        let url = url.replace("data.bin", "missing.bin");
        match HttpRangeReader::new(url).await {
            Err(Error::Upstream { status, .. }) => assert_eq!(status, 404),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected upstream error"),
        }
    }

    #[tokio::test]
    async fn probe_without_length_is_rejected() {
        let (url, object) = start_test_server(4_096).await;
        let url = url.replace("data.bin", "unsized.bin");
        match HttpRangeReader::new(url.clone()).await {
            Err(Error::MissingContentLength(resource)) => assert_eq!(resource, url),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(reader) => panic!("expected missing length, got size {}", reader.size()),
        }
        assert_eq!(object.gets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn short_download_is_size_mismatch() {
        let (url, object) = start_test_server(1_000).await;
        let url = url.replace("data.bin", "truncated.bin");
        let mut reader = HttpRangeReader::new(url).await.unwrap();
        assert_eq!(reader.size(), 1_000);

        let mut buf = [0u8; 16];
        match reader.read_at(0, &mut buf).await {
            Err(Error::SizeMismatch { expected, actual, .. }) => {
                assert_eq!((expected, actual), (1_000, 500));
            }
            other => panic!("expected size mismatch, got {other:?}"),
        }
        assert_eq!(object.gets.load(Ordering::SeqCst), 1);

        // nothing cached, the next read downloads again
        assert!(reader.read_at(0, &mut buf).await.is_err());
        assert_eq!(object.gets.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancelled_probe_fails_fast() {
        let (url, _) = start_test_server(16).await;
        let token = CancellationToken::new();
        token.cancel();
        let res = HttpRangeReader::with_client(Client::new(), url, token).await;
        assert!(matches!(res, Err(Error::Cancelled)));
    }

    #[test]
    fn content_length_requires_exact_number() {
        let mut headers = HeaderMap::new();
        assert_eq!(content_length(&headers), None);
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("abc"));
        assert_eq!(content_length(&headers), None);
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("4096"));
        assert_eq!(content_length(&headers), Some(4096));
    }
}
