//! Self-update core for desktop applications.
//!
//! A host asks an [`UpdateSession`] whether a newer release is published in a
//! JSON release manifest, and if so has it download the package, check its
//! checksum, expand it when compressed and start the installer:
//! - [`VersionTag`] parsing and ordering.
//! - [`ReleaseManifest`] documents, including producing them for a build.
//! - [`ManifestFetcher`] for remote and local manifests and packages.
//! - [`IntegrityVerifier`] checksums (MD5, or SHA-256 when declared).
//! - [`PackageInstaller`] decompression and hand-off to the OS.
//!
//! The core never exits or restarts the host; that decision stays with the
//! caller once an installer has been launched.

pub mod archive;
mod config;
pub mod fetch;
pub mod install;
mod integrity;
pub mod logging;
mod manifest;
pub mod session;
mod transfer;
mod version;

/// Compressed package formats and their codec errors.
pub use archive::{ArchiveError, ArchiveFormat};
/// Updater settings persisted next to the host's own configuration.
pub use config::UpdaterSettings;
/// Manifest and package retrieval.
pub use fetch::{ManifestFetcher, ManifestSource};
/// Installer decompression and launch.
pub use install::{InstallError, Launcher, PackageInstaller, SystemLauncher};
/// Package checksums.
pub use integrity::{Checksum, DigestAlgorithm, IntegrityVerifier};
/// Release manifest model and producer.
pub use manifest::{ExecutableInspection, MANIFEST_EXTENSION, ManifestError, ReleaseManifest};
/// Check-then-apply orchestration.
pub use session::{LaunchedInstaller, UpdateDecision, UpdateError, UpdateSession, UpdateStage};
/// Transfer outcomes and progress events.
pub use transfer::{TransferPayload, TransferResult, UpdateProgress};
/// Four-part version numbers.
pub use version::VersionTag;
