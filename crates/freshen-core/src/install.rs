use std::path::{Path, PathBuf};

use log::{info, warn};
use thiserror::Error;

use crate::archive::{ArchiveError, ArchiveFormat};
use crate::config::UpdaterSettings;

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("failed to decompress {format} package {}: {source}", .path.display())]
    Decompression {
        format: ArchiveFormat,
        path: PathBuf,
        #[source]
        source: ArchiveError,
    },
    #[error("failed to launch installer {}: {details}", .path.display())]
    Launch { path: PathBuf, details: String },
    #[error("{handler} installers are not supported on this platform")]
    UnsupportedHandler { handler: &'static str },
}

impl InstallError {
    fn launch(path: &Path, details: impl Into<String>) -> Self {
        Self::Launch {
            path: path.to_path_buf(),
            details: details.into(),
        }
    }
}

/// Starts a resolved installer artifact as an independent process.
pub trait Launcher: Send + Sync {
    /// Start `path` without waiting for it to finish.
    ///
    /// # Errors
    /// Returns [`InstallError::Launch`] when the process cannot be started.
    fn launch(&self, path: &Path) -> Result<(), InstallError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LaunchHandler {
    MsiExec,
    SystemOpener,
    Direct,
}

impl LaunchHandler {
    fn for_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("msi") => Self::MsiExec,
            Some("pkg" | "dmg") => Self::SystemOpener,
            _ => Self::Direct,
        }
    }
}

/// Launches installers with the platform's native handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    fn launch(&self, path: &Path) -> Result<(), InstallError> {
        match LaunchHandler::for_path(path) {
            LaunchHandler::MsiExec => launch_msi(path),
            LaunchHandler::SystemOpener => {
                info!("Opening installer with system handler: {}", path.display());
                open::that_detached(path)
                    .map_err(|error| InstallError::launch(path, error.to_string()))
            }
            LaunchHandler::Direct => launch_direct(path),
        }
    }
}

#[cfg(target_os = "windows")]
fn launch_msi(msi_path: &Path) -> Result<(), InstallError> {
    info!("Launching MSI installer: {}", msi_path.display());
    std::process::Command::new("msiexec")
        .arg("/i")
        .arg(msi_path)
        .spawn()
        .map_err(|error| InstallError::launch(msi_path, error.to_string()))?;
    Ok(())
}

#[cfg(not(target_os = "windows"))]
fn launch_msi(msi_path: &Path) -> Result<(), InstallError> {
    log::debug!("Refusing to launch {} outside Windows", msi_path.display());
    Err(InstallError::UnsupportedHandler { handler: "msiexec" })
}

fn launch_direct(path: &Path) -> Result<(), InstallError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755));
    }

    info!("Launching installer: {}", path.display());
    std::process::Command::new(path)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .map_err(|error| InstallError::launch(path, error.to_string()))?;
    Ok(())
}

/// Turns a received installer artifact into a running installer process:
/// decompress if needed, then launch.
pub struct PackageInstaller {
    scratch_dir: PathBuf,
    launcher: Box<dyn Launcher>,
    last_error: Option<String>,
}

impl std::fmt::Debug for PackageInstaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageInstaller")
            .field("scratch_dir", &self.scratch_dir)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

impl PackageInstaller {
    #[must_use]
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            launcher: Box::new(SystemLauncher),
            last_error: None,
        }
    }

    #[must_use]
    pub fn from_settings(settings: &UpdaterSettings) -> Self {
        Self::new(settings.scratch_dir())
    }

    #[must_use]
    pub fn with_launcher(mut self, launcher: impl Launcher + 'static) -> Self {
        self.launcher = Box::new(launcher);
        self
    }

    /// Where downloaded and extracted packages are written.
    #[must_use]
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Message of the most recent decompress or launch failure.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    #[must_use]
    pub fn resolve_archive_format(path: &Path) -> Option<ArchiveFormat> {
        ArchiveFormat::resolve(path)
    }

    /// Expand a compressed package and return the installer inside it. An
    /// uncompressed package is returned unchanged.
    ///
    /// # Errors
    /// Returns [`InstallError::Decompression`] when the archive or stream
    /// cannot be expanded. The input file is left in place.
    pub fn decompress(&mut self, path: &Path) -> Result<PathBuf, InstallError> {
        self.last_error = None;
        let Some(format) = ArchiveFormat::resolve(path) else {
            return Ok(path.to_path_buf());
        };

        info!("Decompressing {format} package {}", path.display());
        let extract_dir = self.extract_dir_for(path);
        format
            .decompress(path, &extract_dir)
            .map_err(|source| {
                self.record(InstallError::Decompression {
                    format,
                    path: path.to_path_buf(),
                    source,
                })
            })
    }

    /// Start the installer at `path` and return without waiting for it.
    ///
    /// # Errors
    /// Returns [`InstallError::Launch`] when the file is missing or empty, or
    /// when the operating system refuses to start it.
    /// [`InstallError::UnsupportedHandler`] is returned for installer types
    /// the current platform cannot run.
    pub fn launch(&mut self, path: &Path) -> Result<(), InstallError> {
        self.last_error = None;
        let result = check_launchable(path).and_then(|()| self.launcher.launch(path));
        result.map_err(|error| self.record(error))
    }

    /// Decompress `path` if needed and launch the result. Returns the path
    /// that was launched.
    ///
    /// # Errors
    /// Returns the first decompress or launch failure.
    pub fn install(&mut self, path: &Path) -> Result<PathBuf, InstallError> {
        let installer = self.decompress(path)?;
        self.launch(&installer)?;
        Ok(installer)
    }

    fn extract_dir_for(&self, path: &Path) -> PathBuf {
        let stem = path
            .file_stem()
            .map_or_else(|| "package".into(), |stem| stem.to_string_lossy());
        self.scratch_dir.join(format!("{stem}-extracted"))
    }

    fn record(&mut self, error: InstallError) -> InstallError {
        warn!("{error}");
        self.last_error = Some(error.to_string());
        error
    }
}

fn check_launchable(path: &Path) -> Result<(), InstallError> {
    let metadata = std::fs::metadata(path)
        .map_err(|error| InstallError::launch(path, error.to_string()))?;
    if !metadata.is_file() {
        return Err(InstallError::launch(path, "installer artifact is not a file"));
    }
    if metadata.len() == 0 {
        return Err(InstallError::launch(
            path,
            "installer artifact is empty and cannot be executed",
        ));
    }
    Ok(())
}
