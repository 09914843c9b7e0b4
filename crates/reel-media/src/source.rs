//! Materialize declared inputs as local temporary files.

use std::time::Duration;

use reel_models::{ContentKind, InputSpec};
use tracing::{debug, info};

use crate::assets::{AssetLedger, MaterializedAsset};
use crate::error::{MediaError, MediaResult};

/// Default timeout for remote fetches.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(120);

/// Turns an [`InputSpec`] into a file under the job's work directory.
#[derive(Debug, Clone)]
pub struct SourceResolver {
    client: reqwest::Client,
}

impl SourceResolver {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Build a resolver with its own client and the given fetch timeout.
    pub fn with_timeout(timeout: Duration) -> MediaResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MediaError::internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::new(client))
    }

    /// Materialize one input.
    ///
    /// Remote content is fetched in full before a path is allocated, so a
    /// failed fetch leaves nothing behind. Once allocated, the path is in the
    /// ledger before the write starts.
    pub async fn resolve(
        &self,
        spec: &InputSpec,
        kind: ContentKind,
        ledger: &AssetLedger,
    ) -> MediaResult<MaterializedAsset> {
        let owned;
        let content: &[u8] = match spec {
            InputSpec::InlineBytes { content, .. } => content,
            InputSpec::RemoteUrl { uri, .. } => {
                owned = self.fetch(uri).await?;
                &owned
            }
        };

        let asset = ledger.allocate(kind, spec.extension());
        ledger.fs().write(&asset.path, content).await?;

        info!(
            job_id = %ledger.job_id(),
            kind = %kind,
            bytes = content.len(),
            remote = spec.is_remote(),
            path = %asset.path.display(),
            "Materialized input"
        );

        Ok(asset)
    }

    /// Resolve an optional input.
    pub async fn resolve_optional(
        &self,
        spec: Option<&InputSpec>,
        kind: ContentKind,
        ledger: &AssetLedger,
    ) -> MediaResult<Option<MaterializedAsset>> {
        match spec {
            Some(spec) => self.resolve(spec, kind, ledger).await.map(Some),
            None => Ok(None),
        }
    }

    async fn fetch(&self, uri: &str) -> MediaResult<Vec<u8>> {
        debug!(uri, "Fetching remote input");

        let response = self
            .client
            .get(uri)
            .send()
            .await
            .map_err(|e| request_error(uri, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::fetch_failed(uri, format!("HTTP {}", status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| request_error(uri, e))?;

        Ok(body.to_vec())
    }
}

/// Short summary of a client error; the full text travels as diagnostics.
fn request_error(uri: &str, err: reqwest::Error) -> MediaError {
    let summary = if err.is_timeout() {
        "request timed out"
    } else if err.is_connect() {
        "could not connect"
    } else if err.is_body() || err.is_decode() {
        "response body could not be read"
    } else {
        "request failed"
    };
    MediaError::fetch_failed_with_detail(uri, summary, err.to_string())
}
