//! Blob storage simulator
//!
//! Content is read fully, encoded as a base64 `data:` URL (the text-safe form
//! every backend stores) and addressed by `bucket/path`.

use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::backend::Backend;
use crate::error::DbError;
use crate::response::{guarded, Response};
use crate::DbResult;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Composite `bucket/path` key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobKey {
    bucket: String,
    path: String,
}

impl BlobKey {
    /// Leading slashes on `path` are dropped so `media//a` never occurs.
    pub fn new(bucket: impl Into<String>, path: &str) -> DbResult<Self> {
        let bucket = bucket.into();
        let path = path.trim_start_matches('/');
        if bucket.is_empty() || bucket.contains('/') {
            return Err(DbError::invalid(format!("invalid bucket name: {bucket:?}")));
        }
        if path.is_empty() {
            return Err(DbError::invalid("object path must not be empty"));
        }
        Ok(Self {
            bucket,
            path: path.to_string(),
        })
    }

    /// Split `bucket/path` back into a key.
    pub fn parse(key: &str) -> DbResult<Self> {
        let (bucket, path) = key
            .split_once('/')
            .ok_or_else(|| DbError::invalid(format!("not a bucket/path key: {key}")))?;
        Self::new(bucket, path)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.path)
    }
}

/// Content type guessed from the path extension.
pub fn content_type_for(path: &str) -> &'static str {
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "txt" => "text/plain",
        "json" => "application/json",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

pub fn encode_data_url(content: &[u8], content_type: &str) -> String {
    format!("data:{content_type};base64,{}", STANDARD.encode(content))
}

pub fn decode_data_url(url: &str) -> DbResult<Vec<u8>> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| DbError::invalid("not a data URL"))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| DbError::invalid("data URL has no payload"))?;
    if !meta.ends_with(";base64") {
        return Err(DbError::invalid("data URL is not base64 encoded"));
    }
    STANDARD
        .decode(payload)
        .map_err(|e| DbError::invalid(format!("bad base64 payload: {e}")))
}

#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Overrides the extension-based guess.
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicUrl {
    pub public_url: String,
}

/// `client.storage()`
#[derive(Clone)]
pub struct Storage {
    backend: Arc<dyn Backend>,
}

impl Storage {
    pub(crate) fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub fn from(&self, bucket: impl Into<String>) -> Bucket {
        Bucket {
            backend: self.backend.clone(),
            bucket: bucket.into(),
        }
    }

    /// Bytes behind a locator from [`Bucket::get_public_url`].
    pub async fn resolve_public_url(&self, url: &str) -> Response<Vec<u8>> {
        guarded("storage.resolve", self.backend.resolve_public_url(url))
            .await
            .into()
    }
}

/// `client.storage().from(bucket)`
#[derive(Clone)]
pub struct Bucket {
    backend: Arc<dyn Backend>,
    bucket: String,
}

impl Bucket {
    pub fn name(&self) -> &str {
        &self.bucket
    }

    /// Read `content` to the end, then store it. Completes once, after the
    /// whole read and the store have finished.
    pub async fn upload<R>(&self, path: &str, content: R) -> Response<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.upload_with(path, content, UploadOptions::default())
            .await
    }

    pub async fn upload_with<R>(&self, path: &str, mut content: R, options: UploadOptions) -> Response<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        let result = async {
            let key = BlobKey::new(self.bucket.clone(), path)?;
            let mut bytes = Vec::new();
            content
                .read_to_end(&mut bytes)
                .await
                .map_err(|e| DbError::invalid(format!("failed to read upload content: {e}")))?;
            let content_type = options
                .content_type
                .unwrap_or_else(|| content_type_for(key.path()).to_string());
            guarded(
                "storage.upload",
                self.backend.upload(&key, bytes, &content_type),
            )
            .await
        }
        .await;
        Response::unit(result)
    }

    pub async fn upload_bytes(&self, path: &str, content: impl AsRef<[u8]>) -> Response<()> {
        self.upload(path, content.as_ref()).await
    }

    /// Synchronous locator lookup; an unknown key yields an empty locator
    /// rather than an error.
    pub fn get_public_url(&self, path: &str) -> Response<PublicUrl> {
        let public_url = BlobKey::new(self.bucket.clone(), path)
            .map(|key| self.backend.public_url(&key))
            .unwrap_or_default();
        Response::ok(PublicUrl { public_url })
    }

    pub async fn download(&self, path: &str) -> Response<Vec<u8>> {
        let result = match BlobKey::new(self.bucket.clone(), path) {
            Ok(key) => guarded("storage.download", self.backend.download(&key)).await,
            Err(err) => Err(err),
        };
        result.into()
    }
}
