//! Portal packages: the `.intunewin` zip uploaded through the admin portal.
//!
//! ```text
//! IntuneWinPackage/Contents/IntunePackage.intunewin   (stored)
//! IntuneWinPackage/Metadata/Detection.xml             (deflated)
//! ```

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use iwp_crypto::HEADER_LEN;

use crate::descriptor::{AppDescriptor, InstallExperience, Win32App, PACKAGE_FILE_NAME};
use crate::detection::{ApplicationInfo, EncryptionInfoXml, MsiInfoXml, TOOL_VERSION};
use crate::error::PackageError;
use crate::metadata::MsiInfo;
use crate::package::{ContentPackage, PayloadKind};

pub const CONTENTS_ENTRY: &str = "IntuneWinPackage/Contents/IntunePackage.intunewin";
pub const DETECTION_ENTRY: &str = "IntuneWinPackage/Metadata/Detection.xml";

/// Extension of portal package files.
pub const PORTAL_EXTENSION: &str = "intunewin";

/// `Detection.xml` document for `package`.
pub fn application_info(package: &ContentPackage) -> ApplicationInfo {
    ApplicationInfo {
        tool_version: TOOL_VERSION.to_string(),
        name: package.app().display_name().to_string(),
        unencrypted_content_size: package.cleartext_size(),
        file_name: PACKAGE_FILE_NAME.to_string(),
        setup_file: package.setup_file().to_string(),
        encryption_info: EncryptionInfoXml::from(package.encryption_info()),
        msi_info: package.app().msi_info().map(MsiInfoXml::from),
    }
}

/// Write `package` into a portal package zip.
pub fn write_portal_package_to<W: Write + Seek>(
    package: &mut ContentPackage,
    writer: W,
) -> Result<W, PackageError> {
    let detection = application_info(package).to_xml()?;
    let encrypted_size = package.encrypted_size();

    let mut zip = ZipWriter::new(writer);

    let contents = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .large_file(encrypted_size >= u32::MAX as u64);
    zip.start_file(CONTENTS_ENTRY, contents)?;
    let copied = io::copy(package.reader()?, &mut zip)?;

    let metadata = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(DETECTION_ENTRY, metadata)?;
    zip.write_all(detection.as_bytes())?;

    debug!(contents_size = copied, "Portal package entries written");
    Ok(zip.finish()?)
}

/// Write `package` to `<output_dir>/<setup file stem>.intunewin`.
pub fn write_portal_package(package: &mut ContentPackage, output_dir: &Path) -> Result<PathBuf, PackageError> {
    fs::create_dir_all(output_dir)?;
    let stem = Path::new(package.setup_file())
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "IntunePackage".to_string());
    let path = output_dir.join(format!("{stem}.{PORTAL_EXTENSION}"));

    let mut file = write_portal_package_to(package, File::create(&path)?)?;
    file.flush()?;

    info!(path = %path.display(), "Portal package written");
    Ok(path)
}

/// Load a portal package back into a [`ContentPackage`].
///
/// The encrypted payload is copied into an anonymous temp file and its MAC
/// checked against `Detection.xml` before the package is returned. Loaded
/// packages always describe a [`Win32App`].
pub fn read_portal_package(path: &Path) -> Result<ContentPackage, PackageError> {
    if !path.is_file() {
        return Err(PackageError::NotFound(path.to_path_buf()));
    }
    let mut archive = ZipArchive::new(File::open(path)?)?;

    let mut xml = Vec::new();
    copy_entry(&mut archive, DETECTION_ENTRY, &mut xml)?;
    let xml = String::from_utf8(xml).map_err(|e| PackageError::Metadata(e.to_string()))?;
    let detection = ApplicationInfo::from_xml(&xml)?;
    let encryption_info = detection.encryption_info.to_encryption_info()?;

    let mut data = tempfile::tempfile()?;
    let encrypted_size = copy_entry(&mut archive, CONTENTS_ENTRY, &mut data)?;
    if encrypted_size < HEADER_LEN as u64 {
        return Err(PackageError::InvalidPackage(format!(
            "encrypted content is only {encrypted_size} bytes"
        )));
    }
    data.seek(SeekFrom::Start(0))?;
    iwp_crypto::verify_mac(&mut data, &encryption_info)?;

    let msi_info = detection.msi_info.as_ref().map(MsiInfo::from);
    let mut app = Win32App::new(detection.name, detection.setup_file.clone());
    if let Some(msi) = &msi_info {
        app.install_experience = InstallExperience::from_scope(msi.install_scope);
        app.publisher = msi.publisher.clone();
    }
    app.msi_info = msi_info;

    debug!(
        path = %path.display(),
        setup_file = %detection.setup_file,
        encrypted_size,
        "Portal package loaded"
    );

    Ok(ContentPackage::new(
        Box::new(data),
        detection.unencrypted_content_size,
        encrypted_size,
        AppDescriptor::Win32App(app),
        None,
        encryption_info,
        detection.setup_file,
    ))
}

fn copy_entry<R: Read + Seek, W: Write>(
    archive: &mut ZipArchive<R>,
    name: &str,
    out: &mut W,
) -> Result<u64, PackageError> {
    let mut file = archive.by_name(name).map_err(|e| match e {
        ZipError::FileNotFound => PackageError::InvalidPackage(format!("missing entry {name}")),
        other => other.into(),
    })?;
    Ok(io::copy(&mut file, out)?)
}

/// Decrypt the payload of `package` into `output_dir`.
///
/// An archived directory is unpacked; a bare installer is written under its
/// setup file name. Without a recorded [`PayloadKind`] the payload counts as
/// an archive when it is a zip holding the setup file. Returns the extracted
/// paths' root.
pub fn extract_payload(package: &mut ContentPackage, output_dir: &Path) -> Result<PathBuf, PackageError> {
    fs::create_dir_all(output_dir)?;

    let mut cleartext = tempfile::tempfile()?;
    let info = package.encryption_info().clone();
    iwp_crypto::decrypt(&mut package.reader()?, &info, &mut cleartext)?;

    cleartext.seek(SeekFrom::Start(0))?;
    let is_archive = match package.payload_kind() {
        Some(kind) => kind == PayloadKind::Archive,
        None => archive_holds(&mut cleartext, package.setup_file()),
    };
    cleartext.seek(SeekFrom::Start(0))?;

    if is_archive {
        ZipArchive::new(cleartext)?.extract(output_dir)?;
        info!(output = %output_dir.display(), "Payload archive extracted");
        return Ok(output_dir.to_path_buf());
    }

    let name = Path::new(package.setup_file())
        .file_name()
        .map(|n| n.to_os_string())
        .ok_or_else(|| PackageError::InvalidPackage("package has no setup file name".to_string()))?;
    let target = output_dir.join(name);
    io::copy(&mut cleartext, &mut File::create(&target)?)?;

    info!(path = %target.display(), "Payload extracted");
    Ok(target)
}

fn archive_holds(payload: &mut File, setup_file: &str) -> bool {
    match ZipArchive::new(payload) {
        Ok(archive) => archive.file_names().any(|name| name == setup_file),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::PackageAssembler;
    use crate::metadata::NoMetadata;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_missing_entry_is_invalid_package() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.intunewin");
        let mut zip = ZipWriter::new(File::create(&path).unwrap());
        zip.start_file(DETECTION_ENTRY, SimpleFileOptions::default()).unwrap();
        zip.write_all(b"<ApplicationInfo/>").unwrap();
        zip.finish().unwrap();

        let result = read_portal_package(&path);
        assert!(matches!(
            result,
            Err(PackageError::InvalidPackage(_)) | Err(PackageError::Metadata(_))
        ));
    }

    #[test]
    fn test_contents_entry_is_stored() {
        let dir = TempDir::new().unwrap();
        let exe = dir.path().join("setup.exe");
        fs::write(&exe, vec![0x4D; 4096]).unwrap();

        let mut package = PackageAssembler::new(Arc::new(NoMetadata)).assemble(&exe, None).unwrap();
        let path = write_portal_package(&mut package, &dir.path().join("out")).unwrap();
        assert_eq!(path.file_name().unwrap(), "setup.intunewin");

        let mut archive = ZipArchive::new(File::open(&path).unwrap()).unwrap();
        let contents = archive.by_name(CONTENTS_ENTRY).unwrap();
        assert_eq!(contents.compression(), CompressionMethod::Stored);
        assert_eq!(contents.size(), package.encrypted_size());
        drop(contents);
        let detection = archive.by_name(DETECTION_ENTRY).unwrap();
        assert_eq!(detection.compression(), CompressionMethod::Deflated);
    }

    #[test]
    fn test_tampered_contents_rejected() {
        let dir = TempDir::new().unwrap();
        let exe = dir.path().join("setup.exe");
        fs::write(&exe, b"payload").unwrap();
        let mut package = PackageAssembler::new(Arc::new(NoMetadata)).assemble(&exe, None).unwrap();

        let detection = application_info(&package).to_xml().unwrap();
        let mut encrypted = Vec::new();
        package.reader().unwrap().read_to_end(&mut encrypted).unwrap();
        let last = encrypted.len() - 1;
        encrypted[last] ^= 0x01;

        let path = dir.path().join("tampered.intunewin");
        let mut zip = ZipWriter::new(File::create(&path).unwrap());
        zip.start_file(CONTENTS_ENTRY, SimpleFileOptions::default()).unwrap();
        zip.write_all(&encrypted).unwrap();
        zip.start_file(DETECTION_ENTRY, SimpleFileOptions::default()).unwrap();
        zip.write_all(detection.as_bytes()).unwrap();
        zip.finish().unwrap();

        assert!(matches!(
            read_portal_package(&path),
            Err(PackageError::Crypto(iwp_crypto::CryptoError::MacMismatch))
        ));
    }
}
