//! Content-addressed GIF storage boundary.
//!
//! Objects are keyed by checksum and never rewritten: every upload checks for
//! an existing object first and skips it, so a rerun after a partial failure
//! only sends what is missing.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::bulkjob::BulkJobLine;
use crate::jsonl::{for_each_jsonl, open_gz_lines, shard_name};

#[cfg(feature = "s3")]
mod s3;
#[cfg(feature = "s3")]
pub use s3::S3ObjectStore;

/// Content type every GIF is stored with.
pub const GIF_CONTENT_TYPE: &str = "image/gif";

/// Bucket the GIFs live in unless told otherwise.
pub const DEFAULT_BUCKET: &str = "gifcities";

const DEFAULT_REGION: &str = "us-east-1";

/// Errors surfaced by an object store.
#[derive(Debug)]
pub enum StoreError {
    /// Key is empty or would escape the store.
    InvalidKey(String),
    /// The store root is missing or not a directory.
    Unavailable(PathBuf),
    /// Required connection settings are missing or invalid.
    Config(String),
    /// A remote store rejected or failed a request.
    Remote(String),
    /// Underlying I/O failed.
    Io(io::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidKey(key) => write!(f, "invalid object key '{key}'"),
            Self::Unavailable(root) => write!(f, "object store root {:?} is unavailable", root),
            Self::Config(msg) => write!(f, "object store config error: {msg}"),
            Self::Remote(msg) => write!(f, "object store request failed: {msg}"),
            Self::Io(err) => write!(f, "object store io error: {err}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::InvalidKey(_) | Self::Unavailable(_) | Self::Config(_) | Self::Remote(_) => {
                None
            }
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// Minimal interface the uploader needs from a blob store.
pub trait ObjectStore {
    /// True when an object is already stored under `key`.
    fn exists(&self, key: &str) -> Result<bool, StoreError>;
    /// Stores `bytes` under `key`, replacing nothing that exists.
    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), StoreError>;
}

/// Directory-backed store: one file per key.
///
/// The filesystem carries no metadata, so the content type is not recorded.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Opens an existing store directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(StoreError::Unavailable(root));
        }
        Ok(Self { root })
    }

    /// Store root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        if !valid_key(key) {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }
}

impl ObjectStore for FsObjectStore {
    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.path_for(key)?.is_file())
    }

    fn put(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        write_atomic(&path, bytes)?;
        Ok(())
    }
}

/// Connection settings for an S3-compatible bucket.
///
/// Read from `S3_ENDPOINT`, `S3_ACCESS_KEY` and `S3_SECRET_KEY` (all required)
/// plus an optional `S3_REGION`. An endpoint without a scheme is plain HTTP.
#[derive(Clone, PartialEq, Eq)]
pub struct S3Settings {
    /// Endpoint host, with or without a scheme.
    pub endpoint: String,
    /// Access key id.
    pub access_key: String,
    /// Secret access key.
    pub secret_key: String,
    /// Signing region.
    pub region: String,
    /// Target bucket.
    pub bucket: String,
}

impl S3Settings {
    /// Reads settings from the process environment.
    pub fn from_env(bucket: impl Into<String>) -> Result<Self, StoreError> {
        Self::from_lookup(bucket, |name| std::env::var(name).ok())
    }

    /// Reads settings through `lookup`, failing on the first missing value.
    pub fn from_lookup<F>(bucket: impl Into<String>, lookup: F) -> Result<Self, StoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let require =
            |name: &str| value(name).ok_or_else(|| StoreError::Config(format!("need {name} in env")));

        let bucket = bucket.into();
        if bucket.trim().is_empty() {
            return Err(StoreError::Config("bucket name is empty".to_string()));
        }
        Ok(Self {
            access_key: require("S3_ACCESS_KEY")?,
            secret_key: require("S3_SECRET_KEY")?,
            endpoint: require("S3_ENDPOINT")?,
            region: value("S3_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            bucket,
        })
    }

    /// Endpoint as a URL the client can dial.
    pub fn endpoint_url(&self) -> String {
        if self.endpoint.contains("://") {
            self.endpoint.clone()
        } else {
            format!("http://{}", self.endpoint)
        }
    }
}

impl fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Settings")
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .finish()
    }
}

fn valid_key(key: &str) -> bool {
    !key.trim().is_empty() && !key.contains('/') && !key.contains('\\') && !key.contains("..")
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), io::Error> {
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "bad filename"))?;
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.tmp.{}.{nanos}", std::process::id()));
    {
        let mut f = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(tmp, path)
}

/// Running totals reported after every object.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    /// Index (1-based) of the source file being processed.
    pub file: usize,
    /// Number of source files in the run.
    pub files_total: usize,
    /// Objects read so far.
    pub read: usize,
    /// Objects skipped because they were already stored.
    pub previously_seen: usize,
    /// Objects written.
    pub uploaded: usize,
}

/// What happened to one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Already present; nothing written.
    Skipped,
    /// Written by this call.
    Uploaded,
}

/// Idempotent uploader that records every decision in a hash log.
///
/// Hash log lines are `skip\t<key>`, `success\t<key>` or `fail\t<key>`.
pub struct Uploader<S, L> {
    store: S,
    hash_log: L,
    max_attempts: usize,
    progress: UploadProgress,
}

impl<S: ObjectStore, L: Write> Uploader<S, L> {
    /// Creates an uploader making at most `max_attempts` puts per object.
    pub fn new(store: S, hash_log: L, max_attempts: usize) -> Self {
        Self {
            store,
            hash_log,
            max_attempts: max_attempts.max(1),
            progress: UploadProgress::default(),
        }
    }

    /// Totals so far.
    pub fn progress(&self) -> UploadProgress {
        self.progress
    }

    /// Releases the store and hash log.
    pub fn into_parts(self) -> (S, L) {
        (self.store, self.hash_log)
    }

    /// Uploads one object unless it already exists.
    ///
    /// `payload` is only invoked when the object has to be written.
    pub fn upload_with<F>(&mut self, key: &str, payload: F) -> Result<UploadOutcome>
    where
        F: FnOnce() -> Result<Vec<u8>>,
    {
        self.progress.read += 1;
        if self.store.exists(key)? {
            self.progress.previously_seen += 1;
            writeln!(self.hash_log, "skip\t{key}")?;
            return Ok(UploadOutcome::Skipped);
        }
        let bytes = payload()?;
        match self.put_with_retry(key, &bytes) {
            Ok(()) => {
                self.progress.uploaded += 1;
                writeln!(self.hash_log, "success\t{key}")?;
                Ok(UploadOutcome::Uploaded)
            }
            Err(err) => {
                writeln!(self.hash_log, "fail\t{key}")?;
                Err(err).with_context(|| format!("put object failed for '{key}'"))
            }
        }
    }

    /// Uploads every line of the given gzip bulk-job shards, in order.
    pub fn upload_encoded_shards<F>(&mut self, shards: &[PathBuf], mut on_progress: F) -> Result<()>
    where
        F: FnMut(&UploadProgress),
    {
        self.progress.files_total = shards.len();
        for (idx, shard) in shards.iter().enumerate() {
            self.progress.file = idx + 1;
            let name = shard_name(shard);
            let reader = open_gz_lines(shard)?;
            for_each_jsonl(reader, &name, |line: BulkJobLine| {
                self.upload_with(&line.hash, || {
                    line.decode_payload()
                        .with_context(|| format!("invalid base64 payload for '{}'", line.hash))
                })?;
                on_progress(&self.progress);
                Ok(())
            })?;
        }
        Ok(())
    }

    /// Uploads every regular file in `dir`, keyed by filename.
    pub fn upload_dir<F>(&mut self, dir: &Path, mut on_progress: F) -> Result<()>
    where
        F: FnMut(&UploadProgress),
    {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir).with_context(|| format!("could not read {:?}", dir))? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        self.progress.files_total = files.len();
        for (idx, path) in files.iter().enumerate() {
            self.progress.file = idx + 1;
            let key = shard_name(path);
            self.upload_with(&key, || {
                fs::read(path).with_context(|| format!("failed to read {:?}", path))
            })?;
            on_progress(&self.progress);
        }
        Ok(())
    }

    fn put_with_retry(&mut self, key: &str, bytes: &[u8]) -> Result<()> {
        let mut attempt = 1;
        loop {
            match self.store.put(key, bytes, GIF_CONTENT_TYPE) {
                Ok(()) => return Ok(()),
                Err(err) if attempt < self.max_attempts => {
                    warn!(key, attempt, error = %err, "put failed; retrying");
                    attempt += 1;
                    // an earlier attempt may have landed before failing
                    if self.store.exists(key)? {
                        debug!(key, "object present after failed put");
                        return Ok(());
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}
