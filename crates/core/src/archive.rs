//! Gzip-compressed tar archives
//!
//! Archives hold the source directory under its own base name, so extracting
//! `backup-...tar.gz` into `/restore` produces `/restore/<source name>/...`.

use crate::exclude::ExcludeRules;
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const STAGING_PREFIX: &str = ".cairn-";
const STAGING_SUFFIX: &str = ".partial";

/// Temporary file an archive is written to before it gets its real name
///
/// One left in the destination belongs to a run that was killed.
pub fn is_staging_name(name: &str) -> bool {
    name.len() > STAGING_PREFIX.len() + STAGING_SUFFIX.len()
        && name.starts_with(STAGING_PREFIX)
        && name.ends_with(STAGING_SUFFIX)
}

/// What went into an archive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    pub files: u64,
    pub directories: u64,
    pub symlinks: u64,
    /// Uncompressed size of regular file contents
    pub bytes: u64,
}

/// Archive collaborator used by the backup and restore flows
pub trait ArchiveCodec {
    /// Archive `source` into `dest`, skipping excluded paths
    ///
    /// `dest` only appears once the archive is complete.
    fn compress_directory(
        &self,
        source: &Path,
        excludes: &ExcludeRules,
        dest: &Path,
    ) -> Result<ArchiveStats>;

    /// Read every entry of an archive without writing anything to disk
    ///
    /// Returns the number of entries.
    fn test_integrity(&self, archive: &Path) -> Result<u64>;

    /// Unpack an archive into `dest_dir`
    fn extract(&self, archive: &Path, dest_dir: &Path) -> Result<()>;
}

/// tar + gzip codec
#[derive(Debug, Clone, Copy)]
pub struct TarGz {
    level: Compression,
}

impl TarGz {
    pub fn new(level: Compression) -> Self {
        Self { level }
    }
}

impl Default for TarGz {
    fn default() -> Self {
        Self::new(Compression::default())
    }
}

impl ArchiveCodec for TarGz {
    fn compress_directory(
        &self,
        source: &Path,
        excludes: &ExcludeRules,
        dest: &Path,
    ) -> Result<ArchiveStats> {
        let source = source
            .canonicalize()
            .with_context(|| format!("Source directory not found: {}", source.display()))?;
        if !source.is_dir() {
            anyhow::bail!("Source is not a directory: {}", source.display());
        }

        let dest_dir = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let dest_dir = dest_dir
            .canonicalize()
            .with_context(|| format!("Destination directory not found: {}", dest_dir.display()))?;

        let root_name = source
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("root"));
        let matcher = excludes.matcher(&source)?;

        // Written under a temporary name so an interrupted run never leaves
        // something that looks like a finished backup
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(STAGING_SUFFIX)
            .tempfile_in(&dest_dir)
            .context("Failed to create temporary archive file")?;

        let mut stats = ArchiveStats::default();
        {
            let encoder = GzEncoder::new(BufWriter::new(staging.as_file()), self.level);
            let mut builder = tar::Builder::new(encoder);
            builder.follow_symlinks(false);

            let walker = WalkDir::new(&source)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|entry| {
                    if entry.depth() == 0 {
                        return true;
                    }
                    // Never archive the backup destination into itself
                    if entry.path() == dest_dir {
                        return false;
                    }
                    !matcher.is_excluded(entry.path(), entry.file_type().is_dir())
                });

            for entry in walker {
                let entry = entry.context("Failed to walk source directory")?;
                let relative = entry
                    .path()
                    .strip_prefix(&source)
                    .context("Walked outside the source directory")?;
                let name = root_name.join(relative);
                let file_type = entry.file_type();

                if file_type.is_dir() {
                    builder
                        .append_dir(&name, entry.path())
                        .with_context(|| format!("Failed to archive {}", entry.path().display()))?;
                    stats.directories += 1;
                } else if file_type.is_file() || file_type.is_symlink() {
                    builder
                        .append_path_with_name(entry.path(), &name)
                        .with_context(|| format!("Failed to archive {}", entry.path().display()))?;
                    if file_type.is_file() {
                        stats.files += 1;
                        stats.bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
                    } else {
                        stats.symlinks += 1;
                    }
                } else {
                    tracing::warn!("Skipping special file {}", entry.path().display());
                }
            }

            let encoder = builder.into_inner().context("Failed to finish tar stream")?;
            let mut writer = encoder.finish().context("Failed to finish gzip stream")?;
            writer.flush().context("Failed to flush archive")?;
        }

        staging
            .as_file()
            .sync_all()
            .context("Failed to sync archive to disk")?;
        staging
            .persist_noclobber(dest)
            .with_context(|| format!("Failed to move archive into place at {}", dest.display()))?;

        Ok(stats)
    }

    fn test_integrity(&self, archive: &Path) -> Result<u64> {
        let file = File::open(archive)
            .with_context(|| format!("Failed to open archive {}", archive.display()))?;
        let mut tar = tar::Archive::new(GzDecoder::new(BufReader::new(file)));

        let mut entries = 0u64;
        for entry in tar.entries().context("Failed to read archive")? {
            let mut entry = entry.context("Corrupt archive entry")?;
            io::copy(&mut entry, &mut io::sink()).context("Corrupt archive entry data")?;
            entries += 1;
        }
        if entries == 0 {
            anyhow::bail!("Archive {} contains no entries", archive.display());
        }

        // Drain to the end so the gzip trailer (CRC, length) is checked too
        let mut rest = tar.into_inner();
        io::copy(&mut rest, &mut io::sink()).context("Corrupt gzip trailer")?;

        Ok(entries)
    }

    fn extract(&self, archive: &Path, dest_dir: &Path) -> Result<()> {
        let file = File::open(archive)
            .with_context(|| format!("Failed to open archive {}", archive.display()))?;
        let mut tar = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
        tar.set_preserve_permissions(true);
        tar.set_overwrite(true);
        tar.unpack(dest_dir)
            .with_context(|| format!("Failed to extract into {}", dest_dir.display()))
    }
}
