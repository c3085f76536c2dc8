use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use log::{debug, info, warn};
use reqwest::StatusCode;
use tokio::sync::mpsc;

use crate::config::UpdaterSettings;
use crate::integrity::IntegrityVerifier;
use crate::manifest::ReleaseManifest;
use crate::transfer::{TransferResult, UpdateProgress};

/// Where a release manifest is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestSource {
    Remote(String),
    Local(PathBuf),
}

impl ManifestSource {
    #[must_use]
    pub fn remote(url: impl Into<String>) -> Self {
        Self::Remote(url.into())
    }

    #[must_use]
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::Local(path.into())
    }
}

impl std::fmt::Display for ManifestSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remote(url) => write!(f, "{url}"),
            Self::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Retrieves manifests and installer packages. Each call is one round trip;
/// nothing is retried.
///
/// Response bodies are used exactly as sent. The workspace builds `reqwest`
/// without its content-decoding features, so a package served with a
/// `Content-Encoding` header is still hashed as the stored bytes.
#[derive(Debug, Clone)]
pub struct ManifestFetcher {
    client: reqwest::Client,
}

impl ManifestFetcher {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    #[must_use]
    pub fn from_settings(settings: &UpdaterSettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(settings.http_timeout())
            .connect_timeout(settings.connect_timeout())
            .user_agent(settings.user_agent())
            .build()
            .unwrap_or_default();
        Self::new(client)
    }

    #[must_use]
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub async fn fetch_manifest(&self, source: &ManifestSource) -> TransferResult {
        match source {
            ManifestSource::Remote(url) => self.fetch_remote_manifest(url).await,
            ManifestSource::Local(path) => read_local_manifest(path),
        }
    }

    async fn fetch_remote_manifest(&self, url: &str) -> TransferResult {
        info!("Fetching release manifest from {url}");
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(error) => return transport_failure("manifest request failed", &error),
        };

        let status = response.status();
        if !status.is_success() {
            warn!("Manifest fetch from {url} returned HTTP {status}");
            return TransferResult::failed(Some(status), reason(status));
        }

        let document = match response.text().await {
            Ok(document) => document,
            Err(error) => return transport_failure("failed to read manifest body", &error),
        };

        match ReleaseManifest::from_document(&document) {
            Ok(manifest) => {
                debug!(
                    "Remote manifest declares {} {}",
                    manifest.executable_name, manifest.version
                );
                TransferResult::manifest(Some(status), manifest)
            }
            Err(error) => {
                warn!("Manifest from {url} is malformed: {error}");
                TransferResult::failed(Some(status), error.to_string())
            }
        }
    }

    /// Download an installer package and check it against `expected_checksum`.
    ///
    /// An empty `expected_checksum` skips verification. The whole body is
    /// buffered, whether or not the server sends a `Content-Length`.
    pub async fn fetch_package(&self, url: &str, expected_checksum: &str) -> TransferResult {
        self.download_package(url, expected_checksum, None).await
    }

    /// Like [`ManifestFetcher::fetch_package`], reporting a
    /// [`UpdateProgress::Downloading`] event per received chunk. `total` is 0
    /// when the server sends no `Content-Length`.
    pub async fn fetch_package_with_progress(
        &self,
        url: &str,
        expected_checksum: &str,
        progress: &mpsc::Sender<UpdateProgress>,
    ) -> TransferResult {
        self.download_package(url, expected_checksum, Some(progress))
            .await
    }

    async fn download_package(
        &self,
        url: &str,
        expected_checksum: &str,
        progress: Option<&mpsc::Sender<UpdateProgress>>,
    ) -> TransferResult {
        info!("Downloading installer package from {url}");
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(error) => return transport_failure("download request failed", &error),
        };

        let status = response.status();
        if !status.is_success() {
            warn!("Package download from {url} returned HTTP {status}");
            return TransferResult::failed(Some(status), reason(status));
        }

        let total = response.content_length().unwrap_or(0);
        let mut downloaded: u64 = 0;
        let mut content = Vec::with_capacity(usize::try_from(total).unwrap_or(0));

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(error) => return transport_failure("download stream error", &error),
            };
            content.extend_from_slice(&chunk);
            downloaded += chunk.len() as u64;
            if let Some(progress) = progress {
                let _ = progress
                    .send(UpdateProgress::Downloading { downloaded, total })
                    .await;
            }
        }
        info!("Download complete: {downloaded} bytes");

        if !expected_checksum.trim().is_empty() {
            let verifier = IntegrityVerifier::for_checksum(expected_checksum);
            let actual = verifier.digest(&content);
            if !IntegrityVerifier::matches(&actual, expected_checksum) {
                warn!("Checksum mismatch for package downloaded from {url}");
                return TransferResult::failed(
                    Some(status),
                    format!(
                        "Remote package checksum ({actual}) does not match expected checksum from the release manifest ({})",
                        expected_checksum.trim().to_ascii_lowercase()
                    ),
                );
            }
            debug!("Package checksum verified ({actual})");
        }

        let result = TransferResult::package(Some(status), content);
        match status.canonical_reason() {
            Some(phrase) => result.with_message(phrase),
            None => result,
        }
    }
}

fn read_local_manifest(path: &Path) -> TransferResult {
    info!("Reading release manifest from {}", path.display());
    match ReleaseManifest::from_file(path) {
        Ok(manifest) => TransferResult::manifest(None, manifest),
        Err(error) => TransferResult::failed(None, error.to_string()),
    }
}

fn transport_failure(context: &str, error: &reqwest::Error) -> TransferResult {
    warn!("{context}: {error}");
    let status = error.status().unwrap_or(StatusCode::BAD_REQUEST);
    TransferResult::failed(Some(status), format!("{context}: {error}"))
}

fn reason(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(phrase) => format!("HTTP {}: {phrase}", status.as_u16()),
        None => format!("HTTP {}", status.as_u16()),
    }
}
