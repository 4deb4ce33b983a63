//! Archive extraction for source tarballs.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Unsupported archive format: {0}")]
    UnsupportedFormat(String),

    #[error("Archive error: {0}")]
    Archive(String),
}

/// Source archive formats kiln can unpack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    Tar,
}

/// Guess the archive format from a file name or URL.
pub fn detect_format(name: &str) -> Option<ArchiveFormat> {
    let lower = name.to_lowercase();
    if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
        Some(ArchiveFormat::TarGz)
    } else if lower.ends_with(".tar") {
        Some(ArchiveFormat::Tar)
    } else {
        None
    }
}

/// Extract `archive_path` into `dest_dir`, then hoist a single top-level
/// directory (`tinyxml/` in `tinyxml_2_6_2.tar.gz`) so the tree starts at
/// `dest_dir`.
///
/// `name_hint` is the URL or file name used to pick the format.
pub fn extract_source(
    archive_path: &Path,
    name_hint: &str,
    dest_dir: &Path,
) -> Result<Vec<PathBuf>, ExtractError> {
    let format = detect_format(name_hint)
        .ok_or_else(|| ExtractError::UnsupportedFormat(name_hint.to_string()))?;

    let file = File::open(archive_path)?;
    let reader = BufReader::new(file);
    let files = match format {
        ArchiveFormat::TarGz => extract_tar(flate2::read::GzDecoder::new(reader), dest_dir)?,
        ArchiveFormat::Tar => extract_tar(reader, dest_dir)?,
    };

    strip_components(dest_dir)?;
    Ok(files)
}

/// Extract a tar archive from a reader
fn extract_tar<R: Read>(reader: R, dest_dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    fs::create_dir_all(dest_dir)?;

    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);
    let mut extracted = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let relative_path: PathBuf = entry.path()?.components().collect();

        if entry.header().entry_type().is_dir() {
            continue;
        }

        let absolute_path = dest_dir.join(&relative_path);

        // Reject entries that would escape the destination (`../` traversal).
        if relative_path
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir | std::path::Component::RootDir))
        {
            return Err(ExtractError::Archive(format!(
                "Invalid path in archive: {}",
                relative_path.display()
            )));
        }

        if let Some(parent) = absolute_path.parent() {
            fs::create_dir_all(parent)?;
        }

        entry.unpack(&absolute_path)?;
        extracted.push(relative_path);
    }

    Ok(extracted)
}

/// If `dir` holds exactly one visible entry and it is a directory, move its
/// contents up one level.
pub fn strip_components(dir: &Path) -> io::Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.filter_map(Result::ok).collect();

    // Hidden files (.DS_Store, pax headers) never count as the top level.
    entries.retain(|e| !e.file_name().to_string_lossy().starts_with('.'));

    if entries.len() == 1 && entries[0].file_type()?.is_dir() {
        let top_level = entries[0].path();
        let sub_entries: Vec<_> = fs::read_dir(&top_level)?.filter_map(Result::ok).collect();

        for entry in sub_entries {
            let target = dir.join(entry.file_name());
            fs::rename(entry.path(), target)?;
        }

        fs::remove_dir(top_level)?;
    }

    Ok(())
}
