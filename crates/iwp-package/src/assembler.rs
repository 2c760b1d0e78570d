//! Turning a source file or directory into a [`ContentPackage`].

use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::descriptor::{AppDescriptor, InstallExperience, MobileInstallerApp, Win32App};
use crate::error::PackageError;
use crate::manifest::installer_manifest;
use crate::metadata::{MetadataProvider, MsiInfo};
use crate::package::{ContentPackage, PayloadKind};
use crate::source::{detect_setup_file, has_extension, zip_directory};

/// Payload resolved from the caller's source path.
struct ResolvedSource {
    /// File that gets encrypted.
    payload: PathBuf,
    /// Setup file on disk.
    setup_file: PathBuf,
    /// Setup file name as recorded in the package.
    setup_name: String,
    /// Temporary archive of a source directory; removed on drop.
    archive: Option<NamedTempFile>,
}

/// Builds encrypted content packages from installer sources.
pub struct PackageAssembler {
    metadata: Arc<dyn MetadataProvider>,
}

impl PackageAssembler {
    pub fn new(metadata: Arc<dyn MetadataProvider>) -> Self {
        Self { metadata }
    }

    /// Package `source`, a single installer file or a directory.
    ///
    /// Directories are archived first. Without an explicit `setup_file` the
    /// first `*.msi`, then the first `*.exe` directly inside the directory is
    /// used. A bare MSI with readable metadata becomes a
    /// [`MobileInstallerApp`]; everything else is a [`Win32App`].
    pub fn assemble(&self, source: &Path, setup_file: Option<&Path>) -> Result<ContentPackage, PackageError> {
        debug!(source = %source.display(), "Assembling content package");
        let resolved = resolve_source(source, setup_file)?;
        let from_directory = resolved.archive.is_some();
        let payload_kind = if from_directory {
            PayloadKind::Archive
        } else {
            PayloadKind::File
        };

        let mut payload = File::open(&resolved.payload)?;
        let cleartext_size = payload.metadata()?.len();
        let mut encrypted = tempfile::tempfile()?;
        let encryption_info = iwp_crypto::encrypt(&mut payload, &mut encrypted)?;
        let encrypted_size = encrypted.seek(SeekFrom::End(0))?;
        drop(payload);
        // Archive is no longer needed once encrypted.
        drop(resolved.archive);

        let msi_info = if has_extension(&resolved.setup_file, "msi") {
            self.metadata.read_installer_info(&resolved.setup_file)?
        } else {
            None
        };

        let manifest = msi_info.as_ref().map(installer_manifest).transpose()?;
        let app = describe(&resolved.setup_name, msi_info, from_directory);

        info!(
            kind = %app.kind(),
            setup_file = %resolved.setup_name,
            cleartext_size,
            encrypted_size,
            "Content package assembled"
        );

        Ok(ContentPackage::new(
            Box::new(encrypted),
            cleartext_size,
            encrypted_size,
            app,
            manifest,
            encryption_info,
            resolved.setup_name,
        )
        .with_payload_kind(payload_kind))
    }
}

fn resolve_source(source: &Path, setup_file: Option<&Path>) -> Result<ResolvedSource, PackageError> {
    if source.is_dir() {
        let setup_file = match setup_file {
            Some(setup) if setup.is_relative() => Some(source.join(setup)),
            Some(setup) => Some(setup.to_path_buf()),
            None => detect_setup_file(source)?,
        };
        if let Some(setup) = &setup_file {
            if !setup.is_file() {
                return Err(PackageError::NotFound(setup.clone()));
            }
        }

        let archive = zip_directory(source)?;
        let payload = archive.path().to_path_buf();
        // No installer found: the archive itself stands in as setup file.
        let (setup_file, setup_name) = match setup_file {
            Some(setup) => {
                let name = relative_name(source, &setup);
                (setup, name)
            }
            None => (payload.clone(), archive_setup_name(source)),
        };

        debug!(setup_file = %setup_name, "Resolved directory source");
        Ok(ResolvedSource {
            payload,
            setup_file,
            setup_name,
            archive: Some(archive),
        })
    } else {
        if !source.is_file() {
            return Err(PackageError::NotFound(source.to_path_buf()));
        }
        let setup_file = setup_file.unwrap_or(source).to_path_buf();
        let setup_name = relative_name(source.parent().unwrap_or(Path::new("")), &setup_file);

        Ok(ResolvedSource {
            payload: source.to_path_buf(),
            setup_file,
            setup_name,
            archive: None,
        })
    }
}

/// `<directory name>.zip`, the setup name of a directory without installer.
fn archive_setup_name(dir: &Path) -> String {
    let stem = dir
        .canonicalize()
        .ok()
        .as_deref()
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "IntunePackage".to_string());
    format!("{stem}.zip")
}

/// `path` relative to `base` with `/` separators, or its file name when it
/// lies elsewhere.
fn relative_name(base: &Path, path: &Path) -> String {
    match path.strip_prefix(base) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        _ => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    }
}

fn describe(setup_name: &str, msi_info: Option<MsiInfo>, from_directory: bool) -> AppDescriptor {
    let display_name = msi_info
        .as_ref()
        .and_then(|m| m.product_name.clone())
        .unwrap_or_else(|| file_stem(setup_name));

    match msi_info {
        Some(msi) if !from_directory => {
            AppDescriptor::MobileInstallerApp(MobileInstallerApp::new(display_name, setup_name, msi))
        }
        msi_info => {
            let mut app = Win32App::new(display_name, setup_name);
            if let Some(msi) = &msi_info {
                app.install_experience = InstallExperience::from_scope(msi.install_scope);
                app.publisher = msi.publisher.clone();
            }
            app.msi_info = msi_info;
            AppDescriptor::Win32App(app)
        }
    }
}

fn file_stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string())
}
