//! Checksum primitives and sidecar files
//!
//! Sidecars use the coreutils layout (`<hex>  <file name>`), so an archive can
//! be checked by hand with `sha256sum -c backup-...tar.gz.md5`.

use anyhow::{Context, Result};
use sha2::Digest;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumAlgorithm {
    #[default]
    Sha256,
    Sha1,
    Blake3,
}

/// Unknown algorithm name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported checksum algorithm '{0}' (expected sha256, sha1 or blake3)")]
pub struct UnknownAlgorithm(pub String);

impl ChecksumAlgorithm {
    pub fn name(self) -> &'static str {
        match self {
            ChecksumAlgorithm::Sha256 => "sha256",
            ChecksumAlgorithm::Sha1 => "sha1",
            ChecksumAlgorithm::Blake3 => "blake3",
        }
    }

    /// Length of the hex digest
    pub fn hex_len(self) -> usize {
        match self {
            ChecksumAlgorithm::Sha256 | ChecksumAlgorithm::Blake3 => 64,
            ChecksumAlgorithm::Sha1 => 40,
        }
    }

    /// Hash a file (streaming) and return the lowercase hex digest
    pub fn hash_file(self, path: &Path) -> Result<String> {
        let digest = match self {
            ChecksumAlgorithm::Sha256 => {
                let mut hasher = sha2::Sha256::new();
                stream_file(path, |chunk| hasher.update(chunk))?;
                hex::encode(hasher.finalize())
            }
            ChecksumAlgorithm::Sha1 => {
                let mut hasher = sha1::Sha1::new();
                stream_file(path, |chunk| hasher.update(chunk))?;
                hex::encode(hasher.finalize())
            }
            ChecksumAlgorithm::Blake3 => {
                let mut hasher = blake3::Hasher::new();
                stream_file(path, |chunk| {
                    hasher.update(chunk);
                })?;
                hasher.finalize().to_hex().to_string()
            }
        };
        Ok(digest)
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = UnknownAlgorithm;

    /// Accepts bare names and the matching coreutils-style commands
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha256" | "sha256sum" => Ok(ChecksumAlgorithm::Sha256),
            "sha1" | "sha1sum" => Ok(ChecksumAlgorithm::Sha1),
            "blake3" | "b3sum" => Ok(ChecksumAlgorithm::Blake3),
            _ => Err(UnknownAlgorithm(s.trim().to_string())),
        }
    }
}

/// Read a file in 8KB chunks
fn stream_file(path: &Path, mut sink: impl FnMut(&[u8])) -> Result<u64> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file);

    let mut buffer = [0u8; 8192];
    let mut total = 0u64;
    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if bytes_read == 0 {
            break;
        }
        sink(&buffer[..bytes_read]);
        total += bytes_read as u64;
    }
    Ok(total)
}

/// Digest of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumRecord {
    pub algorithm: ChecksumAlgorithm,
    /// Lowercase hex digest
    pub digest: String,
    /// File name the digest refers to (no directory part)
    pub file_name: String,
}

impl ChecksumRecord {
    /// Sidecar line: `<digest>  <file name>\n`
    pub fn to_sidecar_line(&self) -> String {
        format!("{}  {}\n", self.digest, self.file_name)
    }

    /// Write the sidecar file, replacing any previous one
    pub fn write_sidecar(&self, sidecar: &Path) -> Result<()> {
        std::fs::write(sidecar, self.to_sidecar_line())
            .with_context(|| format!("Failed to write checksum file {}", sidecar.display()))
    }

    /// Parse a sidecar file written for `algorithm`
    pub fn read_sidecar(sidecar: &Path, algorithm: ChecksumAlgorithm) -> Result<Self> {
        let contents = std::fs::read_to_string(sidecar)
            .with_context(|| format!("Failed to read checksum file {}", sidecar.display()))?;
        Self::parse_line(&contents, algorithm)
            .with_context(|| format!("Malformed checksum file {}", sidecar.display()))
    }

    /// Parse the first non-empty line of a sidecar
    ///
    /// Accepts both text (`<hex>  name`) and binary (`<hex> *name`) markers.
    pub fn parse_line(contents: &str, algorithm: ChecksumAlgorithm) -> Result<Self> {
        let line = contents
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .context("checksum file is empty")?;

        let (digest, rest) = line
            .split_once(char::is_whitespace)
            .context("expected '<digest>  <file name>'")?;
        let file_name = rest.trim_start().trim_start_matches('*').to_string();

        if digest.len() != algorithm.hex_len() {
            anyhow::bail!(
                "{} digest must be {} hex characters, found {}",
                algorithm,
                algorithm.hex_len(),
                digest.len()
            );
        }
        if !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
            anyhow::bail!("digest contains non-hex characters");
        }

        Ok(Self {
            algorithm,
            digest: digest.to_ascii_lowercase(),
            file_name,
        })
    }
}

/// Checksum collaborator used by the backup and restore flows
pub trait Checksummer {
    /// Compute the checksum of a file
    fn compute(&self, path: &Path) -> Result<ChecksumRecord>;

    /// Recompute and compare; `Ok(false)` means the contents differ
    fn verify(&self, path: &Path, record: &ChecksumRecord) -> Result<bool>;

    fn algorithm(&self) -> ChecksumAlgorithm;
}

impl Checksummer for ChecksumAlgorithm {
    fn compute(&self, path: &Path) -> Result<ChecksumRecord> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .with_context(|| format!("{} has no file name", path.display()))?;

        Ok(ChecksumRecord {
            algorithm: *self,
            digest: self.hash_file(path)?,
            file_name,
        })
    }

    fn verify(&self, path: &Path, record: &ChecksumRecord) -> Result<bool> {
        let actual = record.algorithm.hash_file(path)?;
        Ok(actual.eq_ignore_ascii_case(&record.digest))
    }

    fn algorithm(&self) -> ChecksumAlgorithm {
        *self
    }
}
