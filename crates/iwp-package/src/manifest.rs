//! Installer manifest for bare MSI apps.
//!
//! The backend expects a single `<MobileMsiData/>` element whose attributes
//! summarize how the MSI installs.

use serde::{Deserialize, Serialize};

use crate::error::PackageError;
use crate::metadata::{InstallScope, MsiInfo};

/// Execution context attribute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MsiExecutionContext {
    System,
    User,
    Any,
}

impl From<InstallScope> for MsiExecutionContext {
    fn from(scope: InstallScope) -> Self {
        match scope {
            InstallScope::PerMachine => MsiExecutionContext::System,
            InstallScope::PerUser => MsiExecutionContext::User,
            InstallScope::DualPurpose => MsiExecutionContext::Any,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "MobileMsiData")]
pub struct MobileMsiData {
    #[serde(rename = "@MsiExecutionContext")]
    pub execution_context: MsiExecutionContext,
    #[serde(rename = "@MsiRequiresReboot")]
    pub requires_reboot: bool,
    #[serde(rename = "@MsiUpgradeCode", default, skip_serializing_if = "Option::is_none")]
    pub upgrade_code: Option<String>,
    #[serde(rename = "@MsiIsMachineInstall")]
    pub is_machine_install: bool,
    #[serde(rename = "@MsiIsUserInstall")]
    pub is_user_install: bool,
    #[serde(rename = "@MsiIncludesServices")]
    pub includes_services: bool,
    #[serde(rename = "@MsiContainsSystemRegistryKeys")]
    pub contains_system_registry_keys: bool,
    #[serde(rename = "@MsiContainsSystemFolders")]
    pub contains_system_folders: bool,
}

impl From<&MsiInfo> for MobileMsiData {
    fn from(info: &MsiInfo) -> Self {
        Self {
            execution_context: info.install_scope.into(),
            requires_reboot: info.requires_reboot,
            upgrade_code: info.upgrade_code.clone(),
            is_machine_install: info.is_machine_install(),
            is_user_install: info.is_user_install(),
            includes_services: info.includes_services,
            contains_system_registry_keys: info.contains_system_registry_keys,
            contains_system_folders: info.contains_system_paths,
        }
    }
}

/// Serialize the installer manifest for `info`.
pub fn installer_manifest(info: &MsiInfo) -> Result<Vec<u8>, PackageError> {
    let xml = quick_xml::se::to_string(&MobileMsiData::from(info))
        .map_err(|e| PackageError::Metadata(e.to_string()))?;
    Ok(xml.into_bytes())
}

/// Parse a manifest produced by [`installer_manifest`].
pub fn parse_installer_manifest(bytes: &[u8]) -> Result<MobileMsiData, PackageError> {
    let xml = std::str::from_utf8(bytes).map_err(|e| PackageError::Metadata(e.to_string()))?;
    quick_xml::de::from_str(xml).map_err(|e| PackageError::Metadata(e.to_string()))
}
