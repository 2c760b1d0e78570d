//! Installer metadata sources.
//!
//! Reading an MSI database is platform specific, so the assembler only sees
//! the [`MetadataProvider`] trait. A provider that cannot read metadata on
//! this host returns `Ok(None)`; that is not an error, the package is then
//! described with filename-derived defaults.

use std::collections::HashMap;
use std::path::Path;
use std::process::Command;

use tracing::{debug, warn};

use crate::error::PackageError;

/// How an MSI package installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstallScope {
    PerUser,
    #[default]
    PerMachine,
    DualPurpose,
}

/// Metadata read from an MSI installer database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsiInfo {
    pub product_code: String,
    pub product_version: String,
    pub upgrade_code: Option<String>,
    pub product_name: Option<String>,
    pub publisher: Option<String>,
    pub install_scope: InstallScope,
    pub requires_reboot: bool,
    pub contains_system_paths: bool,
    pub contains_system_registry_keys: bool,
    pub includes_services: bool,
    pub includes_odbc_data_source: bool,
}

impl MsiInfo {
    /// Minimal record with the given product code and version.
    pub fn new(product_code: impl Into<String>, product_version: impl Into<String>) -> Self {
        Self {
            product_code: product_code.into(),
            product_version: product_version.into(),
            upgrade_code: None,
            product_name: None,
            publisher: None,
            install_scope: InstallScope::PerMachine,
            requires_reboot: false,
            contains_system_paths: false,
            contains_system_registry_keys: false,
            includes_services: false,
            includes_odbc_data_source: false,
        }
    }

    pub fn is_machine_install(&self) -> bool {
        matches!(self.install_scope, InstallScope::PerMachine | InstallScope::DualPurpose)
    }

    pub fn is_user_install(&self) -> bool {
        matches!(self.install_scope, InstallScope::PerUser | InstallScope::DualPurpose)
    }
}

/// Source of installer metadata for a setup file.
pub trait MetadataProvider: Send + Sync {
    /// Read metadata for `path`.
    ///
    /// Returns `Ok(None)` when metadata is unavailable on this host and
    /// [`PackageError::InvalidInstallerData`] when the file is unreadable.
    fn read_installer_info(&self, path: &Path) -> Result<Option<MsiInfo>, PackageError>;
}

/// Provider for hosts without any installer database reader.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMetadata;

impl MetadataProvider for NoMetadata {
    fn read_installer_info(&self, path: &Path) -> Result<Option<MsiInfo>, PackageError> {
        debug!(path = %path.display(), "Installer metadata unavailable on this host");
        Ok(None)
    }
}

/// Provider returning a fixed record for every file.
#[derive(Debug, Clone)]
pub struct StaticMetadata(pub MsiInfo);

impl MetadataProvider for StaticMetadata {
    fn read_installer_info(&self, _path: &Path) -> Result<Option<MsiInfo>, PackageError> {
        Ok(Some(self.0.clone()))
    }
}

/// Reads MSI metadata with the `msiinfo` tool from msitools.
///
/// A missing tool means metadata is unavailable; a tool failure means the
/// database is invalid.
#[derive(Debug, Clone)]
pub struct MsiToolsProvider {
    program: String,
}

impl Default for MsiToolsProvider {
    fn default() -> Self {
        Self {
            program: "msiinfo".to_string(),
        }
    }
}

impl MsiToolsProvider {
    /// Use a specific `msiinfo` executable.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run `msiinfo <subcommand> <path> [table]`; `Ok(None)` when the tool
    /// is not installed.
    fn run(&self, subcommand: &str, path: &Path, table: Option<&str>) -> Result<Option<String>, PackageError> {
        let mut command = Command::new(&self.program);
        command.arg(subcommand).arg(path);
        if let Some(table) = table {
            command.arg(table);
        }

        let output = match command.output() {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(program = %self.program, "msiinfo not installed, skipping MSI metadata");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(path = %path.display(), %stderr, "msiinfo failed");
            return Err(PackageError::invalid_installer(path, stderr));
        }

        Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
    }
}

impl MetadataProvider for MsiToolsProvider {
    fn read_installer_info(&self, path: &Path) -> Result<Option<MsiInfo>, PackageError> {
        if !path.exists() {
            return Err(PackageError::NotFound(path.to_path_buf()));
        }

        let Some(property_table) = self.run("export", path, Some("Property"))? else {
            return Ok(None);
        };
        let tables = self.run("tables", path, None)?.unwrap_or_default();

        msi_info_from_tables(path, &property_table, &tables).map(Some)
    }
}

/// Build an [`MsiInfo`] from `msiinfo export <msi> Property` output (IDT
/// format: three header lines, then tab separated name/value rows) and the
/// `msiinfo tables` listing.
pub fn msi_info_from_tables(
    path: &Path,
    property_table: &str,
    table_list: &str,
) -> Result<MsiInfo, PackageError> {
    let properties: HashMap<&str, &str> = property_table
        .lines()
        .skip(3)
        .filter_map(|line| line.split_once('\t'))
        .map(|(name, value)| (name.trim(), value.trim_end_matches('\r')))
        .collect();

    let product_code = properties
        .get("ProductCode")
        .filter(|code| !code.is_empty())
        .ok_or_else(|| PackageError::invalid_installer(path, "Property table has no ProductCode"))?;
    let product_version = properties.get("ProductVersion").copied().unwrap_or_default();

    let install_scope = match properties.get("ALLUSERS").copied() {
        Some("1") => InstallScope::PerMachine,
        Some("2") if properties.get("MSIINSTALLPERUSER").copied() == Some("1") => {
            InstallScope::PerUser
        }
        Some("2") => InstallScope::DualPurpose,
        _ => InstallScope::PerUser,
    };

    let tables: Vec<&str> = table_list.lines().map(str::trim).collect();
    let has_table = |name: &str| tables.iter().any(|t| *t == name);
    let non_empty = |key: &str| {
        properties
            .get(key)
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string())
    };

    Ok(MsiInfo {
        product_code: product_code.to_string(),
        product_version: product_version.to_string(),
        upgrade_code: non_empty("UpgradeCode"),
        product_name: non_empty("ProductName"),
        publisher: non_empty("Manufacturer"),
        install_scope,
        requires_reboot: properties
            .get("REBOOT")
            .is_some_and(|v| v.eq_ignore_ascii_case("force")),
        contains_system_paths: false,
        contains_system_registry_keys: has_table("Registry") && install_scope != InstallScope::PerUser,
        includes_services: has_table("ServiceInstall"),
        includes_odbc_data_source: has_table("ODBCDataSource"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROPERTY_EXPORT: &str = "Property\tValue\ns72\tl0\nProperty\tProperty\n\
ProductCode\t{11111111-2222-3333-4444-555555555555}\n\
ProductVersion\t2.4.1\n\
ProductName\tContoso Agent\n\
Manufacturer\tContoso Ltd\n\
UpgradeCode\t{AAAAAAAA-BBBB-CCCC-DDDD-EEEEEEEEEEEE}\n\
ALLUSERS\t1\n\
REBOOT\tForce\n";

    #[test]
    fn test_parse_property_table() {
        let info = msi_info_from_tables(
            Path::new("agent.msi"),
            PROPERTY_EXPORT,
            "Property\nServiceInstall\nRegistry\n",
        )
        .unwrap();

        assert_eq!(info.product_code, "{11111111-2222-3333-4444-555555555555}");
        assert_eq!(info.product_version, "2.4.1");
        assert_eq!(info.product_name.as_deref(), Some("Contoso Agent"));
        assert_eq!(info.publisher.as_deref(), Some("Contoso Ltd"));
        assert_eq!(info.install_scope, InstallScope::PerMachine);
        assert!(info.requires_reboot);
        assert!(info.includes_services);
        assert!(info.contains_system_registry_keys);
        assert!(!info.includes_odbc_data_source);
    }

    #[test]
    fn test_scope_detection() {
        let table = |extra: &str| {
            format!("Property\tValue\ns72\tl0\nProperty\tProperty\nProductCode\t{{X}}\n{extra}")
        };
        let scope = |extra: &str| {
            msi_info_from_tables(Path::new("a.msi"), &table(extra), "")
                .unwrap()
                .install_scope
        };

        assert_eq!(scope(""), InstallScope::PerUser);
        assert_eq!(scope("ALLUSERS\t2\n"), InstallScope::DualPurpose);
        assert_eq!(scope("ALLUSERS\t2\nMSIINSTALLPERUSER\t1\n"), InstallScope::PerUser);
        assert_eq!(scope("ALLUSERS\t1\n"), InstallScope::PerMachine);
    }

    #[test]
    fn test_missing_product_code_is_invalid() {
        let result = msi_info_from_tables(
            Path::new("broken.msi"),
            "Property\tValue\ns72\tl0\nProperty\tProperty\nProductVersion\t1.0\n",
            "",
        );
        assert!(matches!(result, Err(PackageError::InvalidInstallerData { .. })));
    }

    #[test]
    fn test_missing_tool_means_no_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let msi = dir.path().join("setup.msi");
        std::fs::write(&msi, b"not really an msi").unwrap();

        let provider = MsiToolsProvider::with_program("iwp-test-msiinfo-does-not-exist");
        assert_eq!(provider.read_installer_info(&msi).unwrap(), None);
    }

    #[test]
    fn test_machine_and_user_flags() {
        let mut info = MsiInfo::new("{X}", "1.0");
        assert!(info.is_machine_install());
        assert!(!info.is_user_install());

        info.install_scope = InstallScope::DualPurpose;
        assert!(info.is_machine_install());
        assert!(info.is_user_install());
    }
}
