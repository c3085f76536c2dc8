use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::UpdaterSettings;
use crate::fetch::{ManifestFetcher, ManifestSource};
use crate::install::{InstallError, PackageInstaller};
use crate::integrity::IntegrityVerifier;
use crate::manifest::ReleaseManifest;
use crate::transfer::{TransferResult, UpdateProgress};
use crate::version::VersionTag;

const FALLBACK_PACKAGE_NAME: &str = "update-package";

/// Result of comparing the running version against a release manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateDecision {
    Available {
        manifest: ReleaseManifest,
        required: bool,
    },
    UpToDate {
        manifest: ReleaseManifest,
    },
    Failed {
        status: Option<StatusCode>,
        message: String,
    },
}

impl UpdateDecision {
    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available { .. })
    }

    #[must_use]
    pub fn manifest(&self) -> Option<&ReleaseManifest> {
        match self {
            Self::Available { manifest, .. } | Self::UpToDate { manifest } => Some(manifest),
            Self::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateStage {
    Download,
    Persist,
    Verify,
    Decompress,
    Launch,
}

impl std::fmt::Display for UpdateStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Download => "download",
            Self::Persist => "persist",
            Self::Verify => "verify",
            Self::Decompress => "decompress",
            Self::Launch => "launch",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("package download failed: {message}")]
    Download {
        status: Option<StatusCode>,
        message: String,
    },
    #[error("failed to store package at {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("stored package checksum ({actual}) does not match the release manifest ({expected})")]
    Integrity { expected: String, actual: String },
    #[error(transparent)]
    Install(#[from] InstallError),
    #[error("no release manifest has been fetched yet")]
    NoManifest,
}

impl UpdateError {
    fn persist(path: &Path, source: std::io::Error) -> Self {
        Self::Persist {
            path: path.to_path_buf(),
            source,
        }
    }

    /// The stage of the update flow that failed. A missing manifest is
    /// reported as a download failure since nothing could be retrieved.
    #[must_use]
    pub fn stage(&self) -> UpdateStage {
        match self {
            Self::Download { .. } | Self::NoManifest => UpdateStage::Download,
            Self::Persist { .. } => UpdateStage::Persist,
            Self::Integrity { .. } => UpdateStage::Verify,
            Self::Install(InstallError::Decompression { .. }) => UpdateStage::Decompress,
            Self::Install(InstallError::Launch { .. } | InstallError::UnsupportedHandler { .. }) => {
                UpdateStage::Launch
            }
        }
    }
}

/// An installer that was started and left running on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchedInstaller {
    pub version: VersionTag,
    pub package_path: PathBuf,
    pub installer_path: PathBuf,
}

/// One check-then-apply flow against a release manifest.
#[derive(Debug)]
pub struct UpdateSession {
    fetcher: ManifestFetcher,
    installer: PackageInstaller,
    last_manifest: Option<ReleaseManifest>,
    last_transfer: Option<TransferResult>,
    progress: Option<mpsc::Sender<UpdateProgress>>,
}

impl UpdateSession {
    #[must_use]
    pub fn new(fetcher: ManifestFetcher, installer: PackageInstaller) -> Self {
        Self {
            fetcher,
            installer,
            last_manifest: None,
            last_transfer: None,
            progress: None,
        }
    }

    #[must_use]
    pub fn from_settings(settings: &UpdaterSettings) -> Self {
        Self::new(
            ManifestFetcher::from_settings(settings),
            PackageInstaller::from_settings(settings),
        )
    }

    #[must_use]
    pub fn with_progress(mut self, progress: mpsc::Sender<UpdateProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    #[must_use]
    pub fn fetcher(&self) -> &ManifestFetcher {
        &self.fetcher
    }

    #[must_use]
    pub fn installer(&self) -> &PackageInstaller {
        &self.installer
    }

    /// Manifest from the most recent successful check.
    #[must_use]
    pub fn last_manifest(&self) -> Option<&ReleaseManifest> {
        self.last_manifest.as_ref()
    }

    /// Result of the most recent manifest or package transfer.
    #[must_use]
    pub fn last_transfer(&self) -> Option<&TransferResult> {
        self.last_transfer.as_ref()
    }

    pub async fn check_for_update(
        &mut self,
        local_version: VersionTag,
        source: &ManifestSource,
    ) -> UpdateDecision {
        let result = self.fetcher.fetch_manifest(source).await;
        let decision = match result.payload_manifest() {
            Some(manifest) => {
                self.last_manifest = Some(manifest.clone());
                if manifest.needs_update(&local_version) {
                    info!(
                        "Update available: {local_version} -> {} (required: {})",
                        manifest.version, manifest.is_required
                    );
                    UpdateDecision::Available {
                        manifest: manifest.clone(),
                        required: manifest.is_required,
                    }
                } else {
                    debug!("{local_version} is up to date with {source}");
                    UpdateDecision::UpToDate {
                        manifest: manifest.clone(),
                    }
                }
            }
            None => {
                let message = result
                    .message()
                    .unwrap_or("manifest transfer failed")
                    .to_string();
                warn!("Update check against {source} failed: {message}");
                UpdateDecision::Failed {
                    status: result.status(),
                    message,
                }
            }
        };
        self.last_transfer = Some(result);
        decision
    }

    /// Download, store, verify, decompress and launch the package described
    /// by `manifest`. Returns once the installer process has started.
    ///
    /// # Errors
    /// Returns the first failing step as an [`UpdateError`]; see
    /// [`UpdateError::stage`]. A checksum mismatch during download stops the
    /// flow before anything is written to disk.
    pub async fn apply_update(
        &mut self,
        manifest: &ReleaseManifest,
    ) -> Result<LaunchedInstaller, UpdateError> {
        match self.run_update(manifest).await {
            Ok(launched) => {
                self.emit(UpdateProgress::Complete).await;
                Ok(launched)
            }
            Err(error) => {
                warn!("Update failed at {} stage: {error}", error.stage());
                self.emit(UpdateProgress::Failed(error.to_string())).await;
                Err(error)
            }
        }
    }

    /// Apply the manifest remembered from the last successful check.
    ///
    /// # Errors
    /// Returns [`UpdateError::NoManifest`] when no check has succeeded, and
    /// otherwise whatever [`UpdateSession::apply_update`] returns.
    pub async fn apply_pending_update(&mut self) -> Result<LaunchedInstaller, UpdateError> {
        let Some(manifest) = self.last_manifest.clone() else {
            let error = UpdateError::NoManifest;
            warn!("{error}");
            self.emit(UpdateProgress::Failed(error.to_string())).await;
            return Err(error);
        };
        self.apply_update(&manifest).await
    }

    async fn run_update(
        &mut self,
        manifest: &ReleaseManifest,
    ) -> Result<LaunchedInstaller, UpdateError> {
        let expected = manifest.package_checksum.trim();
        let result = match &self.progress {
            Some(progress) => {
                self.fetcher
                    .fetch_package_with_progress(&manifest.remote_package_url, expected, progress)
                    .await
            }
            None => {
                self.fetcher
                    .fetch_package(&manifest.remote_package_url, expected)
                    .await
            }
        };

        let package_path = self.installer.scratch_dir().join(package_file_name(manifest));
        let persisted = match result.payload_bytes() {
            Some(bytes) => persist_package(&package_path, bytes).await,
            None => Err(UpdateError::Download {
                status: result.status(),
                message: result
                    .message()
                    .unwrap_or("package transfer failed")
                    .to_string(),
            }),
        };
        self.last_transfer = Some(result);
        persisted?;

        self.emit(UpdateProgress::Verifying).await;
        verify_stored_package(&package_path, expected)?;

        if PackageInstaller::resolve_archive_format(&package_path).is_some() {
            self.emit(UpdateProgress::Extracting).await;
        }
        let installer_path = self.installer.decompress(&package_path)?;

        self.emit(UpdateProgress::Launching).await;
        self.installer.launch(&installer_path)?;
        info!(
            "Installer for {} {} started from {}",
            manifest.executable_name,
            manifest.version,
            installer_path.display()
        );

        Ok(LaunchedInstaller {
            version: manifest.version,
            package_path,
            installer_path,
        })
    }

    async fn emit(&self, event: UpdateProgress) {
        if let Some(progress) = &self.progress {
            let _ = progress.send(event).await;
        }
    }
}

async fn persist_package(path: &Path, bytes: &[u8]) -> Result<(), UpdateError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|error| UpdateError::persist(parent, error))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|error| UpdateError::persist(path, error))?;
    debug!("Stored {} bytes at {}", bytes.len(), path.display());
    Ok(())
}

fn verify_stored_package(path: &Path, expected: &str) -> Result<(), UpdateError> {
    if expected.is_empty() {
        debug!("Release manifest declares no checksum; skipping on-disk verification");
        return Ok(());
    }
    let actual = IntegrityVerifier::for_checksum(expected)
        .digest_file(path)
        .map_err(|error| UpdateError::persist(path, error))?;
    if IntegrityVerifier::matches(&actual, expected) {
        Ok(())
    } else {
        Err(UpdateError::Integrity {
            expected: expected.to_ascii_lowercase(),
            actual,
        })
    }
}

/// File name the package is stored under: the declared package name, or the
/// last segment of its URL.
fn package_file_name(manifest: &ReleaseManifest) -> String {
    let declared = manifest.package_name.trim();
    let candidate = if declared.is_empty() {
        manifest
            .remote_package_url
            .split(['?', '#'])
            .next()
            .and_then(|url| url.rsplit('/').next())
            .unwrap_or_default()
    } else {
        declared
    };

    Path::new(candidate)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty() && !name.contains(".."))
        .unwrap_or(FALLBACK_PACKAGE_NAME)
        .to_string()
}
