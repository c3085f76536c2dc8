//! Content checksums for installer packages.
//!
//! Checksums detect accidental corruption only. They are not a signature and
//! do not prove who produced a package.

use std::io::Read;
use std::path::Path;

use md5::Md5;
use sha2::{Digest, Sha256};

const READ_BUFFER_SIZE: usize = 8192;
const SHA256_HEX_LEN: usize = 64;

/// Lowercase hexadecimal digest of some content.
pub type Checksum = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestAlgorithm {
    /// The manifest format's native checksum.
    #[default]
    Md5,
    Sha256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntegrityVerifier {
    algorithm: DigestAlgorithm,
}

impl IntegrityVerifier {
    #[must_use]
    pub const fn new(algorithm: DigestAlgorithm) -> Self {
        Self { algorithm }
    }

    /// Pick the algorithm a declared checksum was produced with.
    ///
    /// A 64-character hex string is a SHA-256 digest; anything else is
    /// treated as MD5.
    #[must_use]
    pub fn for_checksum(expected: &str) -> Self {
        let expected = expected.trim();
        let algorithm = if expected.len() == SHA256_HEX_LEN
            && expected.chars().all(|ch| ch.is_ascii_hexdigit())
        {
            DigestAlgorithm::Sha256
        } else {
            DigestAlgorithm::Md5
        };
        Self::new(algorithm)
    }

    #[must_use]
    pub const fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    #[must_use]
    pub fn digest(&self, bytes: &[u8]) -> Checksum {
        match self.algorithm {
            DigestAlgorithm::Md5 => format!("{:x}", Md5::digest(bytes)),
            DigestAlgorithm::Sha256 => format!("{:x}", Sha256::digest(bytes)),
        }
    }

    /// Digest a file without holding its whole contents in memory.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or read.
    pub fn digest_file(&self, path: &Path) -> std::io::Result<Checksum> {
        match self.algorithm {
            DigestAlgorithm::Md5 => stream_digest::<Md5>(path),
            DigestAlgorithm::Sha256 => stream_digest::<Sha256>(path),
        }
    }

    #[must_use]
    pub fn matches(checksum_a: &str, checksum_b: &str) -> bool {
        checksum_a.trim().eq_ignore_ascii_case(checksum_b.trim())
    }
}

fn stream_digest<D: Digest>(path: &Path) -> std::io::Result<Checksum>
where
    sha2::digest::Output<D>: std::fmt::LowerHex,
{
    let mut file = std::fs::File::open(path)?;
    let mut hasher = D::new();
    let mut buffer = [0_u8; READ_BUFFER_SIZE];

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
