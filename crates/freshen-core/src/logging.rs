//! `simplelog` wiring for hosts that want the updater's log records on disk.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use freshen_platform::AppPaths;
#[cfg(debug_assertions)]
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use simplelog::{CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, WriteLogger};

use crate::config::UpdaterSettings;

/// Appends to a log file, reopening it if something deleted it while the
/// host was running.
struct ReopeningLogWriter {
    path: PathBuf,
    file: Mutex<File>,
}

impl ReopeningLogWriter {
    fn open(path: PathBuf) -> io::Result<Self> {
        let file = open_append(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    fn with_file<T>(&self, action: impl FnOnce(&mut File) -> io::Result<T>) -> io::Result<T> {
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.path.exists() {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            *file = open_append(&self.path)?;
        }
        action(&mut file)
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

impl Write for ReopeningLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with_file(|file| file.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with_file(File::flush)
    }
}

/// Keep the newer half of `log_path`, cut at a line boundary, once it grows
/// past `max_size` bytes. Returns whether the file was trimmed.
fn trim_oversized_log(log_path: &Path, max_size: u64) -> bool {
    let oversized = std::fs::metadata(log_path).is_ok_and(|metadata| metadata.len() > max_size);
    if !oversized {
        return false;
    }
    let Ok(contents) = std::fs::read(log_path) else {
        return false;
    };

    let half = contents.len() / 2;
    let keep_from = contents[half..]
        .iter()
        .position(|&byte| byte == b'\n')
        .map_or(half, |offset| half + offset + 1);
    std::fs::write(log_path, &contents[keep_from..]).is_ok()
}

/// Install a global logger writing the `freshen` crates' records to
/// [`AppPaths::log_file`]. Debug builds also log to the terminal.
///
/// Returns the log file path when a file logger was installed. Does nothing
/// if another global logger is already set.
pub fn init_logging(paths: &AppPaths, settings: &UpdaterSettings) -> Option<PathBuf> {
    let log_path = paths.log_file();
    let _ = paths.ensure_dirs();
    trim_oversized_log(&log_path, settings.max_log_size_bytes);

    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .add_filter_allow_str("freshen")
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();

    #[cfg(debug_assertions)]
    loggers.push(TermLogger::new(
        LevelFilter::Debug,
        config.clone(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ));

    let file_logger = ReopeningLogWriter::open(log_path.clone())
        .ok()
        .map(|writer| WriteLogger::new(LevelFilter::Debug, config, writer));
    let has_file_logger = file_logger.is_some();
    if let Some(file_logger) = file_logger {
        loggers.push(file_logger);
    }

    if loggers.is_empty() || CombinedLogger::init(loggers).is_err() {
        return None;
    }

    set_logging_enabled(settings.debug_logging);
    if settings.debug_logging {
        log::debug!("Updater debug logging enabled, writing to {}", log_path.display());
    }

    has_file_logger.then_some(log_path)
}

/// Switch between debug-level and info-level output.
pub fn set_logging_enabled(debug: bool) {
    if debug {
        log::set_max_level(log::LevelFilter::Debug);
    } else {
        log::set_max_level(log::LevelFilter::Info);
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::{ReopeningLogWriter, set_logging_enabled, trim_oversized_log};

    #[test]
    fn writer_reopens_deleted_log_file() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let log_path = temp.path().join("logs").join("updater.log");
        std::fs::create_dir_all(temp.path().join("logs")).expect("log dir should be created");
        let mut writer =
            ReopeningLogWriter::open(log_path.clone()).expect("writer should open log file");

        writer
            .write_all(b"checking\n")
            .expect("initial write should succeed");
        std::fs::remove_dir_all(temp.path().join("logs")).expect("log dir should be removable");
        writer
            .write_all(b"downloading\n")
            .expect("writer should recreate the log file");
        writer.flush().expect("flush should succeed");

        let contents = std::fs::read_to_string(&log_path).expect("log file should be readable");
        assert_eq!(contents, "downloading\n");
    }

    #[test]
    fn oversized_log_keeps_newer_lines() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let log_path = temp.path().join("updater.log");
        std::fs::write(&log_path, "check-1\ncheck-2\ncheck-3\ncheck-4\ncheck-5\n")
            .expect("log file should be written");

        assert!(trim_oversized_log(&log_path, 10));

        let trimmed = std::fs::read_to_string(&log_path).expect("log file should be readable");
        assert!(!trimmed.contains("check-1"));
        assert!(trimmed.ends_with("check-5\n"));
    }

    #[test]
    fn small_or_missing_log_is_left_alone() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let log_path = temp.path().join("updater.log");
        assert!(!trim_oversized_log(&log_path, 10));

        std::fs::write(&log_path, "short\n").expect("log file should be written");
        assert!(!trim_oversized_log(&log_path, 1024));
        assert_eq!(
            std::fs::read_to_string(&log_path).expect("log file should be readable"),
            "short\n"
        );
    }

    #[test]
    fn set_logging_enabled_updates_global_level() {
        set_logging_enabled(true);
        assert_eq!(log::max_level(), log::LevelFilter::Debug);

        set_logging_enabled(false);
        assert_eq!(log::max_level(), log::LevelFilter::Info);
    }
}
