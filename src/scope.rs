//! Connection profiles and the bucket scopes learned for them.
//!
//! Profiles live in a human-editable TOML file:
//!
//! ```toml
//! [[s3]]
//! endpoint = "http://127.0.0.1:9000"
//! region = "us-east-1"
//! access_key = "ak1"
//! secret_key = "sk1"
//! disable_ssl = true
//! force_path_style = true
//! scopes = ["bucket1", "bucket2"]
//! ```
//!
//! Order matters: the resolver probes profiles in file order. A bucket is
//! appended to `scopes` the first time a profile is confirmed to reach it and
//! is never removed automatically.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

const DEFAULT_REGION: &str = "us-east-1";

/// Example written to a freshly created store.
const STORE_TEMPLATE: &str = r#"# rangeread object-storage profiles.
# Profiles are tried in order; `scopes` lists buckets each profile is known
# to reach and is extended automatically.
[[s3]]
endpoint = "http://127.0.0.1:9000"
region = "us-east-1"
access_key = "ak1"
secret_key = "sk1"
disable_ssl = true
force_path_style = true
scopes = ["bucket1", "bucket2"]

[[s3]]
endpoint = "http://127.0.0.1:9000"
region = "us-east-1"
access_key = "ak2"
secret_key = "sk2"
disable_ssl = true
force_path_style = true
scopes = ["bucket3", "bucket4"]
"#;

/// Endpoint, credentials and learned bucket scope for one storage backend.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProfile {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub disable_ssl: bool,
    #[serde(default)]
    pub force_path_style: bool,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl ConnectionProfile {
    pub fn has_scope(&self, bucket: &str) -> bool {
        self.scopes.iter().any(|b| b == bucket)
    }

    /// Short identifier safe to log: endpoint and access key, never the secret.
    pub fn label(&self) -> String {
        let endpoint = if self.endpoint.is_empty() {
            "<default endpoint>"
        } else {
            &self.endpoint
        };
        format!("{endpoint} [{}]", self.access_key)
    }

    /// Whether `other` describes the same backend and credentials.
    pub fn same_identity(&self, other: &ConnectionProfile) -> bool {
        self.endpoint == other.endpoint
            && self.region == other.region
            && self.access_key == other.access_key
    }

    pub fn region_or_default(&self) -> &str {
        if self.region.is_empty() {
            DEFAULT_REGION
        } else {
            &self.region
        }
    }

    /// Endpoint with an explicit scheme; `disable_ssl` forces plain http.
    pub fn endpoint_url(&self) -> Option<String> {
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return None;
        }
        let host = endpoint
            .strip_prefix("http://")
            .or_else(|| endpoint.strip_prefix("https://"));
        Some(match host {
            Some(host) if self.disable_ssl => format!("http://{host}"),
            Some(_) => endpoint.to_owned(),
            None if self.disable_ssl => format!("http://{endpoint}"),
            None => format!("https://{endpoint}"),
        })
    }
}

impl fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("disable_ssl", &self.disable_ssl)
            .field("force_path_style", &self.force_path_style)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Persistent, ordered list of connection profiles.
#[async_trait]
pub trait AccessScopeStore: Send + Sync {
    /// Read the whole profile list.
    async fn load(&self) -> Result<Vec<ConnectionProfile>>;

    /// Replace the whole profile list.
    async fn save(&self, profiles: &[ConnectionProfile]) -> Result<()>;

    /// Record that `profile` reaches `bucket`.
    ///
    /// Reloads the store, appends the bucket to the matching profile and
    /// writes the whole list back. Returns `false` if nothing changed.
    async fn add_scope(&self, profile: &ConnectionProfile, bucket: &str) -> Result<bool> {
        let mut profiles = self.load().await?;
        if !append_scope(&mut profiles, profile, bucket) {
            return Ok(false);
        }
        self.save(&profiles).await?;
        Ok(true)
    }
}

fn append_scope(
    profiles: &mut [ConnectionProfile],
    profile: &ConnectionProfile,
    bucket: &str,
) -> bool {
    let Some(stored) = profiles.iter_mut().find(|p| p.same_identity(profile)) else {
        warn!(profile = %profile.label(), "profile no longer in store, scope not recorded");
        return false;
    };
    if stored.has_scope(bucket) {
        return false;
    }
    stored.scopes.push(bucket.to_owned());
    true
}

#[derive(Deserialize, Default)]
struct StoreFile {
    #[serde(default)]
    s3: Vec<ConnectionProfile>,
}

#[derive(Serialize)]
struct StoreFileRef<'a> {
    s3: &'a [ConnectionProfile],
}

/// TOML file store.
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the store, and every write holds an exclusive advisory lock on a
/// sidecar `<name>.lock` file, so concurrent processes never lose scopes.
#[derive(Debug, Clone)]
pub struct FileScopeStore {
    path: PathBuf,
}

impl FileScopeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.rangeread/s3.toml`, or relative to the working directory without a home.
    pub fn default_path() -> PathBuf {
        std::env::home_dir()
            .unwrap_or_else(|| PathBuf::from("./"))
            .join(".rangeread")
            .join("s3.toml")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the store with an example template if it does not exist yet.
    pub fn ensure_exists(&self) -> Result<bool> {
        if self.path.exists() {
            return Ok(false);
        }
        let write_err = |source: io::Error| Error::ConfigWrite {
            path: self.path.clone(),
            source,
        };

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            create_private_dir(dir).map_err(write_err)?;
        }

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        match options.open(&self.path) {
            Ok(mut file) => {
                file.write_all(STORE_TEMPLATE.as_bytes()).map_err(write_err)?;
                info!(path = %self.path.display(), "created profile store");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(write_err(e)),
        }
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "s3.toml".into());
        name.push(".lock");
        self.path.with_file_name(name)
    }

    fn lock(&self) -> Result<StoreLock> {
        let write_err = |source: io::Error| Error::ConfigWrite {
            path: self.path.clone(),
            source,
        };
        let lock_path = self.lock_path();
        if let Some(dir) = lock_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(write_err)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(write_err)?;
        FileExt::lock_exclusive(&file).map_err(write_err)?;
        Ok(StoreLock { file })
    }

    /// Run `f` in the blocking pool while holding the store lock.
    async fn locked<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&FileScopeStore) -> Result<T> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            let _lock = store.lock()?;
            f(&store)
        })
        .await
        .map_err(|e| Error::ConfigWrite {
            path: self.path.clone(),
            source: io::Error::other(e),
        })?
    }

    fn read_profiles(&self) -> Result<Vec<ConnectionProfile>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => self.decode(&text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "profile store missing, no profiles");
                Ok(Vec::new())
            }
            Err(e) => Err(Error::ConfigDecode {
                path: self.path.clone(),
                reason: e.to_string(),
            }),
        }
    }

    fn decode(&self, text: &str) -> Result<Vec<ConnectionProfile>> {
        toml::from_str::<StoreFile>(text)
            .map(|file| file.s3)
            .map_err(|e| Error::ConfigDecode {
                path: self.path.clone(),
                reason: e.to_string(),
            })
    }

    fn write_profiles(&self, profiles: &[ConnectionProfile]) -> Result<()> {
        let write_err = |source: io::Error| Error::ConfigWrite {
            path: self.path.clone(),
            source,
        };
        let text = toml::to_string_pretty(&StoreFileRef { s3: profiles })
            .map_err(|e| write_err(io::Error::other(e)))?;

        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(write_err)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
        tmp.write_all(text.as_bytes()).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;
        debug!(path = %self.path.display(), profiles = profiles.len(), "wrote profile store");
        Ok(())
    }
}

#[async_trait]
impl AccessScopeStore for FileScopeStore {
    async fn load(&self) -> Result<Vec<ConnectionProfile>> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.read_profiles())
            .await
            .map_err(|e| Error::ConfigDecode {
                path: self.path.clone(),
                reason: e.to_string(),
            })?
    }

    async fn save(&self, profiles: &[ConnectionProfile]) -> Result<()> {
        let profiles = profiles.to_vec();
        self.locked(move |store| store.write_profiles(&profiles)).await
    }

    async fn add_scope(&self, profile: &ConnectionProfile, bucket: &str) -> Result<bool> {
        let profile = profile.clone();
        let bucket = bucket.to_owned();
        self.locked(move |store| {
            let mut profiles = store.read_profiles()?;
            if !append_scope(&mut profiles, &profile, &bucket) {
                return Ok(false);
            }
            store.write_profiles(&profiles)?;
            Ok(true)
        })
        .await
    }
}

/// Exclusive advisory lock, released on drop.
struct StoreLock {
    file: File,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn create_private_dir(dir: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir)
}
