//! Compressed package formats recognised by file extension.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::{MultiGzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use log::{debug, warn};
use thiserror::Error;

const BROTLI_BUFFER_SIZE: usize = 4096;
const BROTLI_QUALITY: u32 = 11;
const BROTLI_WINDOW: u32 = 22;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    /// Zip container; the installer is one of its entries.
    Zip,
    Gzip,
    Brotli,
    Zlib,
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("{context} {}: {source}", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{context}: {source}")]
    Zip {
        context: &'static str,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("compressed package {} contains no files", .path.display())]
    Empty { path: PathBuf },
    #[error("cannot derive an output name from {}", .path.display())]
    NoOutputName { path: PathBuf },
}

impl ArchiveError {
    fn io(context: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            context,
            path: path.to_path_buf(),
            source,
        }
    }

    fn zip(context: &'static str, source: zip::result::ZipError) -> Self {
        Self::Zip { context, source }
    }
}

impl ArchiveFormat {
    /// Classify `path` by its final extension. `None` means the file is not
    /// compressed.
    #[must_use]
    pub fn resolve(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "zip" => Some(Self::Zip),
            "gz" | "gzip" => Some(Self::Gzip),
            "br" => Some(Self::Brotli),
            "zlib" => Some(Self::Zlib),
            _ => None,
        }
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Gzip => "gzip",
            Self::Brotli => "brotli",
            Self::Zlib => "zlib",
        }
    }

    /// Expand `path`. Zip entries go to `extract_dir`; single-stream formats
    /// are written beside the input with the compression extension removed.
    ///
    /// Returns the path of the installer artifact.
    ///
    /// # Errors
    /// Returns an error when the input cannot be read or decoded or the
    /// output cannot be written.
    pub fn decompress(self, path: &Path, extract_dir: &Path) -> Result<PathBuf, ArchiveError> {
        match self {
            Self::Zip => extract_zip(path, extract_dir),
            Self::Gzip => decode_stream(path, MultiGzDecoder::new),
            Self::Brotli => decode_stream(path, |file| {
                brotli::Decompressor::new(file, BROTLI_BUFFER_SIZE)
            }),
            Self::Zlib => decode_stream(path, ZlibDecoder::new),
        }
    }

    /// Compress `source` into `dest` in this format. Zip archives hold a
    /// single entry named after `source`.
    ///
    /// # Errors
    /// Returns an error when reading `source` or writing `dest` fails.
    pub fn compress(self, source: &Path, dest: &Path) -> Result<(), ArchiveError> {
        let mut input = BufReader::new(
            File::open(source)
                .map_err(|error| ArchiveError::io("failed to open package", source, error))?,
        );
        let output = File::create(dest)
            .map_err(|error| ArchiveError::io("failed to create compressed package", dest, error))?;
        let write_error =
            |error: io::Error| ArchiveError::io("failed to write compressed package", dest, error);

        match self {
            Self::Zip => {
                let entry_name = source
                    .file_name()
                    .and_then(|name| name.to_str())
                    .ok_or_else(|| ArchiveError::NoOutputName {
                        path: source.to_path_buf(),
                    })?;
                let mut writer = zip::ZipWriter::new(output);
                let options = zip::write::SimpleFileOptions::default()
                    .compression_method(zip::CompressionMethod::Deflated);
                writer
                    .start_file(entry_name, options)
                    .map_err(|error| ArchiveError::zip("failed to start zip entry", error))?;
                io::copy(&mut input, &mut writer).map_err(write_error)?;
                writer
                    .finish()
                    .map_err(|error| ArchiveError::zip("failed to finalize zip archive", error))?;
            }
            Self::Gzip => {
                let mut encoder = GzEncoder::new(output, Compression::best());
                io::copy(&mut input, &mut encoder).map_err(write_error)?;
                encoder.finish().map_err(write_error)?;
            }
            Self::Brotli => {
                let mut encoder = brotli::CompressorWriter::new(
                    output,
                    BROTLI_BUFFER_SIZE,
                    BROTLI_QUALITY,
                    BROTLI_WINDOW,
                );
                io::copy(&mut input, &mut encoder).map_err(write_error)?;
                encoder.flush().map_err(write_error)?;
                encoder.into_inner().sync_all().map_err(write_error)?;
            }
            Self::Zlib => {
                let mut encoder = ZlibEncoder::new(output, Compression::best());
                io::copy(&mut input, &mut encoder).map_err(write_error)?;
                encoder.finish().map_err(write_error)?;
            }
        }

        debug!("Compressed {} as {}", source.display(), self.label());
        Ok(())
    }
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

fn decode_stream<R, F>(path: &Path, decoder: F) -> Result<PathBuf, ArchiveError>
where
    R: Read,
    F: FnOnce(BufReader<File>) -> R,
{
    let output_path = path.with_extension("");
    if output_path.file_name().is_none() || output_path == path {
        return Err(ArchiveError::NoOutputName {
            path: path.to_path_buf(),
        });
    }

    let input = File::open(path)
        .map_err(|error| ArchiveError::io("failed to open compressed package", path, error))?;
    let mut reader = decoder(BufReader::new(input));

    let output = File::create(&output_path).map_err(|error| {
        ArchiveError::io("failed to create decompressed package", &output_path, error)
    })?;
    let mut writer = BufWriter::new(output);

    let written = io::copy(&mut reader, &mut writer)
        .map_err(|error| ArchiveError::io("failed to decompress package", path, error))?;
    writer.flush().map_err(|error| {
        ArchiveError::io("failed to flush decompressed package", &output_path, error)
    })?;

    debug!(
        "Decompressed {} to {} ({written} bytes)",
        path.display(),
        output_path.display()
    );
    Ok(output_path)
}

fn extract_zip(zip_path: &Path, dest: &Path) -> Result<PathBuf, ArchiveError> {
    let file = File::open(zip_path)
        .map_err(|error| ArchiveError::io("failed to open zip file", zip_path, error))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|error| ArchiveError::zip("failed to read zip archive", error))?;

    std::fs::create_dir_all(dest)
        .map_err(|error| ArchiveError::io("failed to create extraction directory", dest, error))?;

    let mut last_extracted = None;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|error| ArchiveError::zip("failed to read zip entry", error))?;
        let Some(name) = entry.enclosed_name() else {
            warn!("Skipping zip entry with unsafe path");
            continue;
        };
        let out_path = dest.join(name);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|error| {
                ArchiveError::io("failed to create extraction directory", &out_path, error)
            })?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                ArchiveError::io("failed to create extraction parent directory", parent, error)
            })?;
        }
        let mut outfile = File::create(&out_path).map_err(|error| {
            ArchiveError::io("failed to create extracted file", &out_path, error)
        })?;
        io::copy(&mut entry, &mut outfile).map_err(|error| {
            ArchiveError::io("failed to extract archive entry", &out_path, error)
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                let _ = std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode));
            }
        }

        last_extracted = Some(out_path);
    }

    let extracted = last_extracted.ok_or_else(|| ArchiveError::Empty {
        path: zip_path.to_path_buf(),
    })?;
    debug!(
        "Extraction complete to {}, installer is {}",
        dest.display(),
        extracted.display()
    );
    Ok(extracted)
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;
    use std::path::Path;

    use super::{ArchiveError, ArchiveFormat, extract_zip};

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let zip_file = std::fs::File::create(path).expect("zip file should be created");
        let mut writer = zip::ZipWriter::new(zip_file);
        let options = zip::write::SimpleFileOptions::default().unix_permissions(0o644);
        for (name, content) in entries {
            if name.ends_with('/') {
                writer
                    .add_directory(*name, options)
                    .expect("directory entry should be written");
            } else {
                writer
                    .start_file(*name, options)
                    .expect("file entry should be started");
                writer
                    .write_all(content.as_bytes())
                    .expect("file entry should be written");
            }
        }
        writer.finish().expect("zip archive should be finalized");
    }

    #[test]
    fn resolve_classifies_known_extensions() {
        let cases = [
            ("setup.zip", Some(ArchiveFormat::Zip)),
            ("setup.ZIP", Some(ArchiveFormat::Zip)),
            ("setup.msi.gz", Some(ArchiveFormat::Gzip)),
            ("setup.msi.gzip", Some(ArchiveFormat::Gzip)),
            ("setup.msi.br", Some(ArchiveFormat::Brotli)),
            ("setup.msi.zlib", Some(ArchiveFormat::Zlib)),
            ("setup.msi", None),
            ("setup", None),
            ("archive.tar", None),
        ];
        for (name, expected) in cases {
            assert_eq!(ArchiveFormat::resolve(Path::new(name)), expected, "{name}");
        }
    }

    #[test]
    fn extract_zip_returns_last_extracted_file() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("update.zip");
        let extract_dir = temp.path().join("extract");
        write_zip(
            &zip_path,
            &[
                ("nested/", ""),
                ("nested/readme.txt", "notes"),
                ("setup.msi", "installer"),
            ],
        );

        let installer = extract_zip(&zip_path, &extract_dir).expect("zip should extract");

        assert_eq!(installer, extract_dir.join("setup.msi"));
        assert_eq!(
            std::fs::read(&installer).expect("installer should be readable"),
            b"installer"
        );
        assert!(extract_dir.join("nested/readme.txt").is_file());
    }

    #[test]
    fn extract_zip_skips_unsafe_paths() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("unsafe.zip");
        let extract_dir = temp.path().join("extract");
        write_zip(
            &zip_path,
            &[("../outside.txt", "escape"), ("setup.exe", "ok")],
        );

        let installer = extract_zip(&zip_path, &extract_dir).expect("zip extraction should not fail");

        assert_eq!(installer, extract_dir.join("setup.exe"));
        assert!(
            !temp.path().join("outside.txt").exists(),
            "unsafe path should not be extracted outside destination"
        );
    }

    #[test]
    fn extract_zip_without_files_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("empty.zip");
        write_zip(&zip_path, &[("only-a-dir/", "")]);

        let result = extract_zip(&zip_path, &temp.path().join("extract"));
        assert!(matches!(result, Err(ArchiveError::Empty { .. })));
    }

    #[test]
    fn corrupt_zip_is_reported() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let zip_path = temp.path().join("corrupt.zip");
        std::fs::write(&zip_path, b"definitely not a zip").expect("file should be written");

        let result = ArchiveFormat::Zip.decompress(&zip_path, &temp.path().join("extract"));
        assert!(matches!(result, Err(ArchiveError::Zip { .. })));
        assert!(zip_path.exists(), "corrupt input should be left in place");
    }

    #[test]
    fn single_stream_formats_strip_their_extension() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let original = temp.path().join("setup.msi");
        let payload = b"installer bytes ".repeat(512);
        std::fs::write(&original, &payload).expect("package should be written");

        for (format, extension) in [
            (ArchiveFormat::Gzip, "gz"),
            (ArchiveFormat::Brotli, "br"),
            (ArchiveFormat::Zlib, "zlib"),
        ] {
            let compressed = temp.path().join(format!("setup.msi.{extension}"));
            format
                .compress(&original, &compressed)
                .expect("package should compress");
            std::fs::remove_file(&original).expect("original should be removable");

            let restored = format
                .decompress(&compressed, temp.path())
                .expect("package should decompress");
            assert_eq!(restored, original, "{format}");
            assert_eq!(
                std::fs::read(&restored).expect("restored package should be readable"),
                payload,
                "{format}"
            );
        }
    }

    #[test]
    fn corrupt_gzip_stream_is_reported() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let compressed = temp.path().join("setup.exe.gz");
        std::fs::write(&compressed, b"not gzip at all").expect("file should be written");

        let result = ArchiveFormat::Gzip.decompress(&compressed, temp.path());
        assert!(matches!(result, Err(ArchiveError::Io { .. })));
        assert!(compressed.exists());
    }

    #[test]
    fn compress_zip_holds_single_entry_named_after_source() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let original = temp.path().join("setup.exe");
        std::fs::write(&original, b"MZ payload").expect("package should be written");
        let archive = temp.path().join("setup.zip");

        ArchiveFormat::Zip
            .compress(&original, &archive)
            .expect("package should compress");
        let installer = ArchiveFormat::Zip
            .decompress(&archive, &temp.path().join("out"))
            .expect("archive should extract");

        assert_eq!(installer, temp.path().join("out").join("setup.exe"));
        assert_eq!(
            std::fs::read(installer).expect("installer should be readable"),
            b"MZ payload"
        );
    }
}
