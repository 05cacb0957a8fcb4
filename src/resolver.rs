//! Turns URIs into opened [`Source`]s.
//!
//! Object-storage URIs need a connection profile. A profile whose scope
//! already lists the bucket is used as-is; otherwise profiles are probed in
//! stored order and the first one that can see the object wins and has the
//! bucket recorded in its scope.

use std::sync::Arc;

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::io::{
    Connector, HttpRangeReader, LocalFileReader, ObjectClient, S3Connector, S3RangeReader,
    cancellable,
};
use crate::scope::AccessScopeStore;
use crate::source::Source;
use crate::uri::SourceUri;

/// Opens byte sources for local paths, HTTP URLs and object-storage URIs.
pub struct SourceResolver<S, C = S3Connector> {
    store: S,
    connector: C,
    http: Client,
    cancel: CancellationToken,
}

impl<S: AccessScopeStore> SourceResolver<S> {
    pub fn new(store: S) -> Self {
        Self::with_connector(store, S3Connector)
    }
}

impl<S: AccessScopeStore, C: Connector> SourceResolver<S, C> {
    pub fn with_connector(store: S, connector: C) -> Self {
        Self {
            store,
            connector,
            http: Client::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Thread `token` through every network call made by the resolver and
    /// the sources it opens.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Open one source.
    pub async fn resolve(&self, uri: &str) -> Result<Source> {
        match SourceUri::parse(uri)? {
            SourceUri::Local(path) => Ok(Source::Local(LocalFileReader::new(&path)?)),
            SourceUri::Http(url) => {
                let reader = HttpRangeReader::with_client(
                    self.http.clone(),
                    url.into(),
                    self.cancel.clone(),
                )
                .await?;
                Ok(Source::Http(reader))
            }
            SourceUri::S3 { bucket, key } => {
                Ok(Source::S3(self.resolve_object(&bucket, &key).await?))
            }
        }
    }

    /// Open every URI independently; a failure never stops the others.
    pub async fn resolve_all<I>(&self, uris: I) -> Vec<Result<Source>>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut sources = Vec::new();
        for uri in uris {
            let uri = uri.as_ref();
            let result = self.resolve(uri).await;
            if let Err(err) = &result {
                debug!(uri, %err, "failed to open source");
            }
            sources.push(result);
        }
        sources
    }

    async fn resolve_object(&self, bucket: &str, key: &str) -> Result<S3RangeReader> {
        let profiles = self.store.load().await?;

        if let Some(profile) = profiles.iter().find(|p| p.has_scope(bucket)) {
            debug!(bucket, profile = %profile.label(), "bucket in profile scope");
            let client = self.connector.connect(profile);
            return S3RangeReader::open(client, bucket, key, self.cancel.clone()).await;
        }

        let mut tried_profiles = Vec::with_capacity(profiles.len());
        for profile in &profiles {
            let client = self.connector.connect(profile);
            match self.probe(&client, bucket, key).await {
                Ok(size) => {
                    self.store.add_scope(profile, bucket).await?;
                    info!(bucket, profile = %profile.label(), "learned bucket scope");
                    return Ok(S3RangeReader::with_size(
                        client,
                        bucket,
                        key,
                        size,
                        self.cancel.clone(),
                    ));
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(err) => {
                    debug!(bucket, profile = %profile.label(), %err, "probe failed");
                    tried_profiles.push(profile.label());
                }
            }
        }

        Err(Error::NoAccessToBucket {
            bucket: bucket.to_owned(),
            tried_profiles,
        })
    }

    async fn probe(
        &self,
        client: &Arc<dyn ObjectClient>,
        bucket: &str,
        key: &str,
    ) -> Result<u64> {
        cancellable(&self.cancel, client.head_object(bucket, key)).await
    }
}
