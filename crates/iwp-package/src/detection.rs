//! `Detection.xml`, the metadata document of a portal package.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use iwp_crypto::{EncryptionInfo, DIGEST_ALGORITHM, PROFILE_IDENTIFIER};

use crate::error::PackageError;
use crate::manifest::MsiExecutionContext;
use crate::metadata::{InstallScope, MsiInfo};

/// Packaging tool version recorded in `Detection.xml`.
pub const TOOL_VERSION: &str = "1.8.6.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "ApplicationInfo", rename_all = "PascalCase")]
pub struct ApplicationInfo {
    #[serde(rename = "@ToolVersion")]
    pub tool_version: String,
    pub name: String,
    pub unencrypted_content_size: u64,
    pub file_name: String,
    pub setup_file: String,
    pub encryption_info: EncryptionInfoXml,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msi_info: Option<MsiInfoXml>,
}

/// Base64 rendering of [`EncryptionInfo`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EncryptionInfoXml {
    pub encryption_key: String,
    pub mac_key: String,
    pub initialization_vector: String,
    pub mac: String,
    pub profile_identifier: String,
    pub file_digest: String,
    pub file_digest_algorithm: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MsiInfoXml {
    pub msi_product_code: String,
    pub msi_product_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msi_upgrade_code: Option<String>,
    pub msi_execution_context: MsiExecutionContext,
    pub msi_requires_reboot: bool,
    pub msi_is_machine_install: bool,
    pub msi_is_user_install: bool,
    pub msi_includes_services: bool,
    #[serde(rename = "MsiIncludesODBCDataSource")]
    pub msi_includes_odbc_data_source: bool,
    pub msi_contains_system_registry_keys: bool,
    pub msi_contains_system_folders: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msi_publisher: Option<String>,
}

impl From<&EncryptionInfo> for EncryptionInfoXml {
    fn from(info: &EncryptionInfo) -> Self {
        Self {
            encryption_key: BASE64.encode(info.encryption_key),
            mac_key: BASE64.encode(info.mac_key),
            initialization_vector: BASE64.encode(info.initialization_vector),
            mac: BASE64.encode(info.mac),
            profile_identifier: info.profile_identifier.to_string(),
            file_digest: BASE64.encode(info.file_digest),
            file_digest_algorithm: info.file_digest_algorithm.to_string(),
        }
    }
}

impl EncryptionInfoXml {
    /// Decode back into key material.
    pub fn to_encryption_info(&self) -> Result<EncryptionInfo, PackageError> {
        if self.profile_identifier != PROFILE_IDENTIFIER {
            return Err(PackageError::InvalidPackage(format!(
                "unsupported encryption profile {}",
                self.profile_identifier
            )));
        }
        if self.file_digest_algorithm != DIGEST_ALGORITHM {
            return Err(PackageError::InvalidPackage(format!(
                "unsupported digest algorithm {}",
                self.file_digest_algorithm
            )));
        }

        Ok(EncryptionInfo::from_parts(
            decode_fixed("EncryptionKey", &self.encryption_key)?,
            decode_fixed("MacKey", &self.mac_key)?,
            decode_fixed("InitializationVector", &self.initialization_vector)?,
            decode_fixed("Mac", &self.mac)?,
            decode_fixed("FileDigest", &self.file_digest)?,
        ))
    }
}

fn decode_fixed<const N: usize>(field: &str, value: &str) -> Result<[u8; N], PackageError> {
    let bytes = BASE64
        .decode(value.trim())
        .map_err(|e| PackageError::InvalidPackage(format!("{field}: {e}")))?;
    bytes.try_into().map_err(|bytes: Vec<u8>| {
        PackageError::InvalidPackage(format!("{field}: expected {N} bytes, got {}", bytes.len()))
    })
}

impl From<&MsiInfo> for MsiInfoXml {
    fn from(info: &MsiInfo) -> Self {
        Self {
            msi_product_code: info.product_code.clone(),
            msi_product_version: info.product_version.clone(),
            msi_upgrade_code: info.upgrade_code.clone(),
            msi_execution_context: info.install_scope.into(),
            msi_requires_reboot: info.requires_reboot,
            msi_is_machine_install: info.is_machine_install(),
            msi_is_user_install: info.is_user_install(),
            msi_includes_services: info.includes_services,
            msi_includes_odbc_data_source: info.includes_odbc_data_source,
            msi_contains_system_registry_keys: info.contains_system_registry_keys,
            msi_contains_system_folders: info.contains_system_paths,
            msi_publisher: info.publisher.clone(),
        }
    }
}

impl From<&MsiInfoXml> for MsiInfo {
    fn from(xml: &MsiInfoXml) -> Self {
        let install_scope = match xml.msi_execution_context {
            MsiExecutionContext::System => InstallScope::PerMachine,
            MsiExecutionContext::User => InstallScope::PerUser,
            MsiExecutionContext::Any => InstallScope::DualPurpose,
        };
        MsiInfo {
            product_code: xml.msi_product_code.clone(),
            product_version: xml.msi_product_version.clone(),
            upgrade_code: xml.msi_upgrade_code.clone(),
            product_name: None,
            publisher: xml.msi_publisher.clone(),
            install_scope,
            requires_reboot: xml.msi_requires_reboot,
            contains_system_paths: xml.msi_contains_system_folders,
            contains_system_registry_keys: xml.msi_contains_system_registry_keys,
            includes_services: xml.msi_includes_services,
            includes_odbc_data_source: xml.msi_includes_odbc_data_source,
        }
    }
}

impl ApplicationInfo {
    pub fn to_xml(&self) -> Result<String, PackageError> {
        let body = quick_xml::se::to_string(self).map_err(|e| PackageError::Metadata(e.to_string()))?;
        Ok(format!("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n{body}"))
    }

    pub fn from_xml(xml: &str) -> Result<Self, PackageError> {
        quick_xml::de::from_str(xml).map_err(|e| PackageError::Metadata(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ApplicationInfo {
        let info = EncryptionInfo::from_parts([1; 32], [2; 32], [3; 16], [4; 32], [5; 32]);
        let mut msi = MsiInfo::new("{P}", "2.0");
        msi.includes_odbc_data_source = true;
        ApplicationInfo {
            tool_version: TOOL_VERSION.to_string(),
            name: "Agent".to_string(),
            unencrypted_content_size: 1234,
            file_name: "IntunePackage.intunewin".to_string(),
            setup_file: "agent.msi".to_string(),
            encryption_info: EncryptionInfoXml::from(&info),
            msi_info: Some(MsiInfoXml::from(&msi)),
        }
    }

    #[test]
    fn test_detection_xml_shape() {
        let xml = sample().to_xml().unwrap();

        assert!(xml.contains("<ApplicationInfo ToolVersion=\"1.8.6.0\">"));
        assert!(xml.contains("<UnencryptedContentSize>1234</UnencryptedContentSize>"));
        assert!(xml.contains("<SetupFile>agent.msi</SetupFile>"));
        assert!(xml.contains("<ProfileIdentifier>ProfileVersion1</ProfileIdentifier>"));
        assert!(xml.contains("<FileDigestAlgorithm>SHA256</FileDigestAlgorithm>"));
        assert!(xml.contains("<MsiIncludesODBCDataSource>true</MsiIncludesODBCDataSource>"));
        assert!(xml.contains("<MsiExecutionContext>System</MsiExecutionContext>"));
    }

    #[test]
    fn test_detection_xml_parses_back() {
        let original = sample();
        let parsed = ApplicationInfo::from_xml(&original.to_xml().unwrap()).unwrap();
        assert_eq!(parsed, original);

        let info = parsed.encryption_info.to_encryption_info().unwrap();
        assert_eq!(info.initialization_vector, [3; 16]);
        assert_eq!(info.file_digest, [5; 32]);
    }

    #[test]
    fn test_msi_info_is_optional() {
        let mut app = sample();
        app.msi_info = None;
        let xml = app.to_xml().unwrap();
        assert!(!xml.contains("MsiInfo"));
        assert_eq!(ApplicationInfo::from_xml(&xml).unwrap().msi_info, None);
    }

    #[test]
    fn test_short_key_rejected() {
        let mut xml = sample().encryption_info;
        xml.mac_key = BASE64.encode([0u8; 16]);
        assert!(matches!(
            xml.to_encryption_info(),
            Err(PackageError::InvalidPackage(_))
        ));
    }
}
