//! Integration tests for packaging flows.
//!
//! - Directory packaging with setup detection and manifest policy
//! - Portal package write, reload and payload extraction

use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use iwp_package::{
    extract_payload, read_portal_package, write_portal_package, AppDescriptor, InstallExperience,
    InstallScope, MsiInfo, NoMetadata, PackageAssembler, PackageError, PayloadKind, StaticMetadata,
};

fn per_user_msi() -> MsiInfo {
    let mut info = MsiInfo::new("{0F1E2D3C-4B5A-6978-8796-A5B4C3D2E1F0}", "7.2.0");
    info.install_scope = InstallScope::PerUser;
    info.publisher = Some("Contoso".to_string());
    info
}

/// Test: a directory with setup.msi packages as a Win32 app without manifest
#[test]
fn integration_directory_with_msi() {
    let source = TempDir::new().unwrap();
    fs::write(source.path().join("setup.msi"), vec![0xD0; 2048]).unwrap();
    fs::write(source.path().join("readme.txt"), b"read me").unwrap();
    fs::create_dir(source.path().join("tools")).unwrap();
    fs::write(source.path().join("tools").join("helper.exe"), b"MZ").unwrap();

    let assembler = PackageAssembler::new(Arc::new(StaticMetadata(per_user_msi())));
    let package = assembler.assemble(source.path(), None).unwrap();

    assert_eq!(package.setup_file(), "setup.msi");
    assert!(package.installer_manifest().is_none());

    let AppDescriptor::Win32App(app) = package.app() else {
        panic!("directory sources must produce a Win32 app");
    };
    assert_eq!(app.setup_file_path, "setup.msi");
    assert_eq!(app.install_experience, InstallExperience::User);
    assert_eq!(app.publisher.as_deref(), Some("Contoso"));
    assert_eq!(
        app.msi_info.as_ref().map(|m| m.product_version.as_str()),
        Some("7.2.0")
    );
    assert!(package.encrypted_size() >= package.cleartext_size() + 48);
}

/// Test: directory without any installer falls back to the archive as setup file
#[test]
fn integration_directory_without_installer() {
    let source = TempDir::new().unwrap();
    fs::write(source.path().join("script.ps1"), b"Write-Host hi").unwrap();

    let package = PackageAssembler::new(Arc::new(NoMetadata))
        .assemble(source.path(), None)
        .unwrap();

    let dir_name = source.path().file_name().unwrap().to_string_lossy().to_string();
    assert_eq!(package.setup_file(), format!("{dir_name}.zip"));
    assert_eq!(package.payload_kind(), Some(PayloadKind::Archive));
}

/// Test: a bare installer that is itself a zip extracts as one file
#[test]
fn integration_bare_zip_installer_is_not_unpacked() {
    let work = TempDir::new().unwrap();
    let installer = work.path().join("bundle.zip");
    let mut zip = ZipWriter::new(fs::File::create(&installer).unwrap());
    zip.start_file("inner.txt", SimpleFileOptions::default()).unwrap();
    zip.write_all(b"inside the bundle").unwrap();
    zip.finish().unwrap();
    let body = fs::read(&installer).unwrap();

    let mut package = PackageAssembler::new(Arc::new(NoMetadata))
        .assemble(&installer, None)
        .unwrap();
    assert_eq!(package.payload_kind(), Some(PayloadKind::File));

    let target = extract_payload(&mut package, &work.path().join("direct")).unwrap();
    assert_eq!(target.file_name().unwrap(), "bundle.zip");
    assert_eq!(fs::read(&target).unwrap(), body);

    let portal = write_portal_package(&mut package, &work.path().join("out")).unwrap();
    let mut loaded = read_portal_package(&portal).unwrap();
    assert_eq!(loaded.payload_kind(), None);

    let reloaded = work.path().join("reloaded");
    let target = extract_payload(&mut loaded, &reloaded).unwrap();
    assert_eq!(fs::read(&target).unwrap(), body);
    assert!(!reloaded.join("inner.txt").exists());
}

/// Test: portal package round trip for a directory source
#[test]
fn integration_portal_round_trip_directory() {
    let source = TempDir::new().unwrap();
    fs::write(source.path().join("install.exe"), b"MZ installer body").unwrap();
    fs::create_dir(source.path().join("assets")).unwrap();
    fs::write(source.path().join("assets").join("logo.png"), vec![0x89; 300]).unwrap();

    let work = TempDir::new().unwrap();
    let mut package = PackageAssembler::new(Arc::new(NoMetadata))
        .assemble(source.path(), None)
        .unwrap();
    let portal = write_portal_package(&mut package, &work.path().join("out")).unwrap();
    assert_eq!(portal.file_name().unwrap(), "install.intunewin");

    let mut loaded = read_portal_package(&portal).unwrap();
    assert_eq!(loaded.setup_file(), "install.exe");
    assert_eq!(loaded.cleartext_size(), package.cleartext_size());
    assert_eq!(loaded.encrypted_size(), package.encrypted_size());
    assert_eq!(loaded.encryption_info(), package.encryption_info());

    let extracted = work.path().join("extracted");
    extract_payload(&mut loaded, &extracted).unwrap();
    assert_eq!(
        fs::read(extracted.join("install.exe")).unwrap(),
        b"MZ installer body"
    );
    assert_eq!(
        fs::read(extracted.join("assets").join("logo.png")).unwrap(),
        vec![0x89; 300]
    );
}

/// Test: a bare installer extracts under its own name
#[test]
fn integration_portal_round_trip_bare_file() {
    let work = TempDir::new().unwrap();
    let exe = work.path().join("agent.exe");
    let body: Vec<u8> = (0..70_000u32).map(|i| (i % 251) as u8).collect();
    fs::write(&exe, &body).unwrap();

    let mut package = PackageAssembler::new(Arc::new(NoMetadata))
        .assemble(&exe, None)
        .unwrap();
    let portal = write_portal_package(&mut package, work.path()).unwrap();

    let mut loaded = read_portal_package(&portal).unwrap();
    let target = extract_payload(&mut loaded, &work.path().join("x")).unwrap();

    let mut extracted = Vec::new();
    fs::File::open(&target)
        .unwrap()
        .read_to_end(&mut extracted)
        .unwrap();
    assert_eq!(extracted, body);
}

/// Test: reading a missing portal package reports NotFound
#[test]
fn integration_missing_portal_package() {
    let result = read_portal_package(Path::new("/nonexistent/pkg.intunewin"));
    assert!(matches!(result, Err(PackageError::NotFound(_))));
}
