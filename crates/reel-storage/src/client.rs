//! R2 client implementation.

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};
use crate::store::ArtifactStore;

/// Smallest part size S3-compatible stores accept (except for the last part).
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Configuration for R2 client.
#[derive(Debug, Clone)]
pub struct R2Config {
    /// R2 endpoint URL (S3 API endpoint)
    pub endpoint_url: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Public base URL objects are served from
    pub public_url: String,
    /// Region (usually "auto" for R2)
    pub region: String,
}

impl R2Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: required("R2_ENDPOINT_URL")?,
            access_key_id: required("R2_ACCESS_KEY_ID")?,
            secret_access_key: required("R2_SECRET_ACCESS_KEY")?,
            bucket_name: required("R2_BUCKET_NAME")?,
            public_url: required("R2_PUBLIC_URL")?,
            region: std::env::var("R2_REGION").unwrap_or_else(|_| "auto".to_string()),
        })
    }
}

fn required(name: &str) -> StorageResult<String> {
    std::env::var(name).map_err(|_| StorageError::config_error(format!("{} not set", name)))
}

/// Cloudflare R2 storage client.
#[derive(Clone)]
pub struct R2Client {
    client: Client,
    bucket: String,
    public_url: String,
}

impl R2Client {
    /// Create a new R2 client from configuration.
    pub async fn new(config: R2Config) -> StorageResult<Self> {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "r2",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
            public_url: config.public_url,
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> StorageResult<Self> {
        Self::new(R2Config::from_env()?).await
    }

    /// Upload a file with a single `PutObject`.
    pub async fn put_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<()> {
        debug!("Uploading {} to {}", path.display(), key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        Ok(())
    }

    /// Upload a file as a multipart upload of `part_size`-byte parts.
    ///
    /// The upload is aborted if any part fails.
    pub async fn put_file_multipart(
        &self,
        path: &Path,
        key: &str,
        content_type: &str,
        part_size: usize,
    ) -> StorageResult<()> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        let upload_id = created
            .upload_id()
            .ok_or_else(|| StorageError::upload_failed("store returned no upload id"))?
            .to_string();

        match self.upload_parts(path, key, &upload_id, part_size).await {
            Ok(parts) => {
                self.client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(CompletedMultipartUpload::builder().set_parts(Some(parts)).build())
                    .send()
                    .await
                    .map_err(|e| StorageError::upload_failed(e.to_string()))?;
                Ok(())
            }
            Err(e) => {
                warn!(key, error = %e, "Multipart upload failed, aborting");
                if let Err(abort) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(key, error = %abort, "Failed to abort multipart upload");
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        path: &Path,
        key: &str,
        upload_id: &str,
        part_size: usize,
    ) -> StorageResult<Vec<CompletedPart>> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut parts = Vec::new();
        let mut part_number: i32 = 1;

        loop {
            let mut chunk = Vec::with_capacity(part_size);
            (&mut file).take(part_size as u64).read_to_end(&mut chunk).await?;
            if chunk.is_empty() {
                break;
            }

            debug!(key, part_number, bytes = chunk.len(), "Uploading part");

            let uploaded = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk))
                .send()
                .await
                .map_err(|e| StorageError::upload_failed(format!("part {}: {}", part_number, e)))?;

            parts.push(
                CompletedPart::builder()
                    .set_e_tag(uploaded.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build(),
            );
            part_number += 1;
        }

        Ok(parts)
    }

    /// Public URL for an object key.
    pub fn public_url_for(&self, key: &str) -> String {
        public_url(&self.public_url, key)
    }
}

#[async_trait]
impl ArtifactStore for R2Client {
    async fn upload_artifact(&self, path: &Path, folder: &str, chunk_size: usize) -> StorageResult<String> {
        let key = object_key(folder, path)?;
        let content_type = content_type_for(path);
        let size = tokio::fs::metadata(path).await?.len();
        let part_size = effective_part_size(chunk_size);

        if size > part_size as u64 {
            self.put_file_multipart(path, &key, content_type, part_size).await?;
        } else {
            self.put_file(path, &key, content_type).await?;
        }

        let url = self.public_url_for(&key);
        info!(key = %key, bytes = size, url = %url, "Uploaded artifact");
        Ok(url)
    }

    async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::Unreachable(format!("R2 connectivity check failed: {}", e)))?;
        Ok(())
    }
}

/// `<folder>/<file name>`, with stray slashes removed.
pub fn object_key(folder: &str, path: &Path) -> StorageResult<String> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| StorageError::InvalidKey(format!("{} has no file name", path.display())))?;

    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        Ok(name)
    } else {
        Ok(format!("{}/{}", folder, name))
    }
}

pub fn public_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key)
}

/// Part size actually used for a requested chunk size.
pub fn effective_part_size(chunk_size: usize) -> usize {
    if chunk_size < MIN_PART_SIZE {
        warn!(chunk_size, min = MIN_PART_SIZE, "Chunk size below store minimum, raising");
        MIN_PART_SIZE
    } else {
        chunk_size
    }
}

pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .as_deref()
    {
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("mp3") => "audio/mpeg",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_object_key() {
        let path = PathBuf::from("/tmp/reel/abc_video.mp4");
        assert_eq!(object_key("ugc", &path).unwrap(), "ugc/abc_video.mp4");
        assert_eq!(object_key("/ugc/", &path).unwrap(), "ugc/abc_video.mp4");
        assert_eq!(object_key("", &path).unwrap(), "abc_video.mp4");
        assert!(object_key("ugc", Path::new("/")).is_err());
    }

    #[test]
    fn test_public_url() {
        assert_eq!(
            public_url("https://cdn.example.com/", "ugc/a.mp4"),
            "https://cdn.example.com/ugc/a.mp4"
        );
        assert_eq!(public_url("https://cdn.example.com", "a.mp4"), "https://cdn.example.com/a.mp4");
    }

    #[test]
    fn test_effective_part_size() {
        assert_eq!(effective_part_size(6_000_000), 6_000_000);
        assert_eq!(effective_part_size(1024), MIN_PART_SIZE);
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type_for(Path::new("a.MP4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("a.mp3")), "audio/mpeg");
        assert_eq!(content_type_for(Path::new("a")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_public_url_for_uses_configured_base() {
        let client = R2Client::new(R2Config {
            endpoint_url: "https://account.r2.cloudflarestorage.com".into(),
            access_key_id: "key".into(),
            secret_access_key: "secret".into(),
            bucket_name: "reels".into(),
            public_url: "https://media.example.com".into(),
            region: "auto".into(),
        })
        .await
        .unwrap();

        assert_eq!(client.public_url_for("ugc/x.mp4"), "https://media.example.com/ugc/x.mp4");
    }
}
