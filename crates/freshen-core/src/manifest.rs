use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::integrity::IntegrityVerifier;
use crate::version::VersionTag;

pub const MANIFEST_EXTENSION: &str = "json";

/// Describes one release: which executable it targets, its version, and the
/// single installer package that delivers it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReleaseManifest {
    #[serde(rename = "executable", alias = "Executable")]
    pub executable_name: String,
    #[serde(alias = "Version")]
    pub version: VersionTag,
    #[serde(alias = "RemoteURLSourcePackage")]
    pub remote_package_url: String,
    #[serde(alias = "FilePackageName")]
    pub package_name: String,
    #[serde(alias = "FilePackageSize")]
    pub package_size: u64,
    #[serde(alias = "FilePackageChecksum")]
    pub package_checksum: String,
    #[serde(alias = "IsRequired")]
    pub is_required: bool,
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to parse release manifest: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("failed to serialize release manifest: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("{context} {}: {source}", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} has no file name", .path.display())]
    MissingFileName { path: PathBuf },
}

impl ManifestError {
    fn io(context: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Inputs for authoring a manifest from a built executable and its package.
#[derive(Debug, Clone)]
pub struct ExecutableInspection<'a> {
    pub executable_path: &'a Path,
    pub version: VersionTag,
    pub package_path: &'a Path,
    pub remote_package_url: &'a str,
    pub is_required: bool,
}

impl ReleaseManifest {
    /// Parse a manifest document. Absent fields take their zero value and a
    /// leading byte order mark is ignored.
    ///
    /// # Errors
    /// Returns [`ManifestError::Parse`] when the document is not a valid
    /// manifest object.
    pub fn from_document(document: &str) -> Result<Self, ManifestError> {
        let document = document.strip_prefix('\u{feff}').unwrap_or(document);
        serde_json::from_str(document).map_err(ManifestError::Parse)
    }

    /// Read and parse a manifest document stored on disk.
    ///
    /// # Errors
    /// Returns an error when the file cannot be read or does not parse.
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let document = std::fs::read_to_string(path)
            .map_err(|error| ManifestError::io("failed to read manifest", path, error))?;
        Self::from_document(&document)
    }

    /// Build the manifest for a release by inspecting its executable and
    /// package on disk.
    ///
    /// # Errors
    /// Returns an error when either path lacks a file name or the package
    /// cannot be read.
    pub fn from_executable_inspection(
        inspection: &ExecutableInspection<'_>,
    ) -> Result<Self, ManifestError> {
        let package_path = inspection.package_path;
        let metadata = std::fs::metadata(package_path)
            .map_err(|error| ManifestError::io("failed to inspect package", package_path, error))?;
        let package_checksum = IntegrityVerifier::default()
            .digest_file(package_path)
            .map_err(|error| ManifestError::io("failed to checksum package", package_path, error))?;

        let manifest = Self {
            executable_name: file_name(inspection.executable_path)?,
            version: inspection.version,
            remote_package_url: inspection.remote_package_url.to_string(),
            package_name: file_name(package_path)?,
            package_size: metadata.len(),
            package_checksum,
            is_required: inspection.is_required,
        };
        debug!(
            "Built manifest for {} {} ({} bytes, checksum {})",
            manifest.executable_name,
            manifest.version,
            manifest.package_size,
            manifest.package_checksum
        );
        Ok(manifest)
    }

    /// Serialize to the manifest document format.
    ///
    /// # Errors
    /// Returns an error only if JSON serialization itself fails.
    pub fn to_document(&self) -> Result<String, ManifestError> {
        serde_json::to_string_pretty(self).map_err(ManifestError::Serialize)
    }

    /// Write the manifest document to `target` and return the file written.
    ///
    /// An existing directory receives `<executable stem>.json`; a target
    /// without an extension gets `.json` appended.
    ///
    /// # Errors
    /// Returns an error when serialization or the write fails.
    pub fn write_to_file(&self, target: &Path) -> Result<PathBuf, ManifestError> {
        let path = self.output_path(target);
        let document = self.to_document()?;
        std::fs::write(&path, document)
            .map_err(|error| ManifestError::io("failed to write manifest", &path, error))?;
        Ok(path)
    }

    fn output_path(&self, target: &Path) -> PathBuf {
        if target.is_dir() {
            let stem = Path::new(&self.executable_name)
                .file_stem()
                .map_or_else(|| "manifest".into(), std::ffi::OsStr::to_os_string);
            let mut path = target.join(stem);
            path.set_extension(MANIFEST_EXTENSION);
            path
        } else if target.extension().is_none() {
            let mut name = target.as_os_str().to_os_string();
            name.push(".");
            name.push(MANIFEST_EXTENSION);
            PathBuf::from(name)
        } else {
            target.to_path_buf()
        }
    }

    #[must_use]
    pub fn needs_update(&self, local_version: &VersionTag) -> bool {
        self.version.is_newer_than(local_version)
    }

    fn verifier(&self) -> IntegrityVerifier {
        IntegrityVerifier::for_checksum(&self.package_checksum)
    }

    #[must_use]
    pub fn package_is_valid(&self, package: &[u8]) -> bool {
        let actual = self.verifier().digest(package);
        IntegrityVerifier::matches(&actual, &self.package_checksum)
    }

    /// Check a package file on disk against the declared checksum. An
    /// unreadable file is never valid.
    #[must_use]
    pub fn package_file_is_valid(&self, path: &Path) -> bool {
        self.verifier()
            .digest_file(path)
            .is_ok_and(|actual| IntegrityVerifier::matches(&actual, &self.package_checksum))
    }
}

fn file_name(path: &Path) -> Result<String, ManifestError> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| ManifestError::MissingFileName {
            path: path.to_path_buf(),
        })
}
