//! Source normalisation: directory archiving and setup-file detection.

use std::fs::{self, File};
use std::io::{self, Seek, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::PackageError;

/// Entries at or above this size need zip64 records.
const ZIP64_THRESHOLD: u64 = 0xFFFF_FFFF;

/// Zip `dir` into a temporary file with maximum deflate compression.
///
/// Entry names are relative to `dir`, use `/` separators and are written in
/// sorted order. The file is removed when the returned handle drops.
pub fn zip_directory(dir: &Path) -> Result<NamedTempFile, PackageError> {
    let archive = NamedTempFile::new()?;
    let mut writer = ZipWriter::new(archive.reopen()?);

    let mut entries = 0usize;
    add_directory(&mut writer, dir, "", &mut entries)?;

    let mut file = writer.finish()?;
    file.flush()?;
    let size = file.stream_position()?;

    info!(
        source = %dir.display(),
        entries,
        archive_size = size,
        "Source directory archived"
    );
    Ok(archive)
}

fn add_directory<W: Write + Seek>(
    writer: &mut ZipWriter<W>,
    dir: &Path,
    prefix: &str,
    entries: &mut usize,
) -> Result<(), PackageError> {
    for path in sorted_entries(dir)? {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return Err(PackageError::InvalidPackage(format!(
                "non UTF-8 file name in {}",
                dir.display()
            )));
        };
        let entry_name = format!("{prefix}{name}");
        let metadata = fs::metadata(&path)?;

        if metadata.is_dir() {
            let options = SimpleFileOptions::default();
            writer.add_directory(format!("{entry_name}/"), options)?;
            add_directory(writer, &path, &format!("{entry_name}/"), entries)?;
        } else {
            let options = SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(9))
                .large_file(metadata.len() >= ZIP64_THRESHOLD);
            writer.start_file(entry_name.as_str(), options)?;
            io::copy(&mut File::open(&path)?, writer)?;
            debug!(entry = %entry_name, size = metadata.len(), "Archived file");
        }
        *entries += 1;
    }
    Ok(())
}

/// First `*.msi`, else first `*.exe`, directly inside `dir` in name order.
pub fn detect_setup_file(dir: &Path) -> Result<Option<PathBuf>, PackageError> {
    let files: Vec<PathBuf> = sorted_entries(dir)?
        .into_iter()
        .filter(|p| p.is_file())
        .collect();

    let found = ["msi", "exe"]
        .iter()
        .find_map(|ext| files.iter().find(|p| has_extension(p, ext)).cloned());

    match &found {
        Some(path) => debug!(setup_file = %path.display(), "Detected setup file"),
        None => debug!(source = %dir.display(), "No installer found in source directory"),
    }
    Ok(found)
}

/// Case-insensitive extension check.
pub fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, PackageError> {
    let mut paths = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, io::Error>>()?;
    paths.sort();
    Ok(paths)
}
