//! In-memory fakes shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, ReadBuf};

use crate::error::{Error, Result};
use crate::io::{Connector, ObjectBody, ObjectClient};
use crate::scope::{AccessScopeStore, ConnectionProfile};

/// Deterministic test payload.
pub fn pattern(len: usize) -> Bytes {
    (0..len).map(|i| (i * 31 % 251) as u8).collect::<Vec<_>>().into()
}

/// Object store keeping objects in memory.
///
/// Records every range request, counts HEADs and live streams (and the peak
/// number open at once), and can inject connection resets at absolute object
/// offsets.
#[derive(Default)]
pub struct FakeObjectClient {
    objects: HashMap<(String, String), Bytes>,
    heads: AtomicUsize,
    ranges: Mutex<Vec<(u64, u64)>>,
    resets: Mutex<VecDeque<u64>>,
    live: Arc<AtomicUsize>,
    peak: AtomicUsize,
    wrap_resets: bool,
}

impl FakeObjectClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(mut self, bucket: &str, key: &str, data: Bytes) -> Self {
        self.objects.insert((bucket.to_owned(), key.to_owned()), data);
        self
    }

    /// Each queued offset resets the first stream opened at or before it.
    pub fn with_resets(self, offsets: impl IntoIterator<Item = u64>) -> Self {
        self.resets.lock().unwrap().extend(offsets);
        self
    }

    /// Report injected resets nested inside a transport error, the way the
    /// SDK's byte stream surfaces them.
    pub fn with_wrapped_resets(mut self) -> Self {
        self.wrap_resets = true;
        self
    }

    pub fn heads(&self) -> usize {
        self.heads.load(Ordering::SeqCst)
    }

    pub fn ranges(&self) -> Vec<(u64, u64)> {
        self.ranges.lock().unwrap().clone()
    }

    pub fn open_streams(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn peak_streams(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn object(&self, bucket: &str, key: &str) -> Result<&Bytes> {
        self.objects
            .get(&(bucket.to_owned(), key.to_owned()))
            .ok_or_else(|| Error::Upstream {
                status: 404,
                resource: format!("s3://{bucket}/{key}"),
            })
    }
}

#[async_trait]
impl ObjectClient for FakeObjectClient {
    async fn head_object(&self, bucket: &str, key: &str) -> Result<u64> {
        self.heads.fetch_add(1, Ordering::SeqCst);
        Ok(self.object(bucket, key)?.len() as u64)
    }

    async fn get_range(
        &self,
        bucket: &str,
        key: &str,
        start: u64,
        end: u64,
    ) -> Result<ObjectBody> {
        let data = self.object(bucket, key)?;
        self.ranges.lock().unwrap().push((start, end));

        let reset_at = {
            let mut resets = self.resets.lock().unwrap();
            match resets.front() {
                Some(&at) if at >= start && at <= end => {
                    resets.pop_front();
                    Some((at - start) as usize)
                }
                _ => None,
            }
        };

        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(live, Ordering::SeqCst);
        Ok(Box::pin(FakeBody {
            data: data.slice(start as usize..=end as usize),
            pos: 0,
            reset_at,
            wrap_reset: self.wrap_resets,
            live: self.live.clone(),
        }))
    }
}

struct FakeBody {
    data: Bytes,
    pos: usize,
    reset_at: Option<usize>,
    wrap_reset: bool,
    live: Arc<AtomicUsize>,
}

impl AsyncRead for FakeBody {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.reset_at == Some(this.pos) {
            let reset = io::Error::from(io::ErrorKind::ConnectionReset);
            let err = if this.wrap_reset {
                io::Error::other(TransportError(reset))
            } else {
                reset
            };
            return Poll::Ready(Err(err));
        }
        let limit = this.reset_at.unwrap_or(this.data.len());
        let n = (limit - this.pos).min(buf.remaining());
        buf.put_slice(&this.data[this.pos..this.pos + n]);
        this.pos += n;
        Poll::Ready(Ok(()))
    }
}

/// Non-io error carrying the underlying socket error as its source.
#[derive(Debug)]
pub struct TransportError(pub io::Error);

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("transport error")
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl Drop for FakeBody {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Connector mapping profile endpoints to fake clients.
///
/// Unknown endpoints get an empty client, so every probe answers 404.
#[derive(Default)]
pub struct FakeConnector {
    clients: HashMap<String, Arc<FakeObjectClient>>,
    connects: AtomicUsize,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(mut self, endpoint: &str, client: Arc<FakeObjectClient>) -> Self {
        self.clients.insert(endpoint.to_owned(), client);
        self
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Connector for FakeConnector {
    fn connect(&self, profile: &ConnectionProfile) -> Arc<dyn ObjectClient> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match self.clients.get(&profile.endpoint) {
            Some(client) => client.clone(),
            None => Arc::new(FakeObjectClient::new()),
        }
    }
}

/// Store kept in memory, counting loads and saves.
#[derive(Default)]
pub struct MemoryScopeStore {
    profiles: Mutex<Vec<ConnectionProfile>>,
    loads: AtomicUsize,
    saves: AtomicUsize,
}

impl MemoryScopeStore {
    pub fn new(profiles: Vec<ConnectionProfile>) -> Self {
        Self {
            profiles: Mutex::new(profiles),
            ..Self::default()
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccessScopeStore for MemoryScopeStore {
    async fn load(&self) -> Result<Vec<ConnectionProfile>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.profiles.lock().unwrap().clone())
    }

    async fn save(&self, profiles: &[ConnectionProfile]) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.profiles.lock().unwrap() = profiles.to_vec();
        Ok(())
    }
}
