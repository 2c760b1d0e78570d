//! Device-management backend: app records, content versions, content files.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use iwp_crypto::EncryptionInfo;
use iwp_package::{AppDescriptor, AppKind};

use crate::error::PublishError;

/// Concrete type of a remote app record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RemoteAppKind {
    Win32LobApp,
    WindowsMobileMsi,
    Other(String),
}

impl RemoteAppKind {
    /// OData type name without the `#microsoft.graph.` prefix.
    pub fn type_name(&self) -> &str {
        match self {
            RemoteAppKind::Win32LobApp => "win32LobApp",
            RemoteAppKind::WindowsMobileMsi => "windowsMobileMSI",
            RemoteAppKind::Other(name) => name,
        }
    }

    pub fn odata_type(&self) -> String {
        format!("#microsoft.graph.{}", self.type_name())
    }

    pub fn from_odata_type(odata_type: &str) -> Self {
        match odata_type.trim_start_matches("#microsoft.graph.") {
            "win32LobApp" => RemoteAppKind::Win32LobApp,
            "windowsMobileMSI" => RemoteAppKind::WindowsMobileMsi,
            other => RemoteAppKind::Other(other.to_string()),
        }
    }

    pub fn matches(&self, kind: AppKind) -> bool {
        matches!(
            (self, kind),
            (RemoteAppKind::Win32LobApp, AppKind::Win32)
                | (RemoteAppKind::WindowsMobileMsi, AppKind::MobileInstaller)
        )
    }
}

impl From<AppKind> for RemoteAppKind {
    fn from(kind: AppKind) -> Self {
        match kind {
            AppKind::Win32 => RemoteAppKind::Win32LobApp,
            AppKind::MobileInstaller => RemoteAppKind::WindowsMobileMsi,
        }
    }
}

impl fmt::Display for RemoteAppKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Remote app record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteApp {
    pub id: String,
    pub display_name: String,
    pub kind: RemoteAppKind,
    pub committed_content_version: Option<String>,
}

/// One upload revision of an app's payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentVersion {
    pub id: String,
}

impl ContentVersion {
    /// Numeric ordering key; non-numeric ids sort first.
    pub fn sequence(&self) -> Option<u64> {
        self.id.parse().ok()
    }
}

/// Upload state of a content file as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UploadState {
    Success,
    TransientError,
    Error,
    Unknown,
    AzureStorageUriRequestSuccess,
    AzureStorageUriRequestPending,
    AzureStorageUriRequestFailed,
    AzureStorageUriRequestTimedOut,
    AzureStorageUriRenewalSuccess,
    AzureStorageUriRenewalPending,
    AzureStorageUriRenewalFailed,
    AzureStorageUriRenewalTimedOut,
    CommitFileSuccess,
    CommitFilePending,
    CommitFileFailed,
    CommitFileTimedOut,
    /// Any state this client does not know; treated as pending.
    #[serde(other)]
    Unrecognized,
}

impl UploadState {
    /// States that end the upload protocol with a failure.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            UploadState::AzureStorageUriRequestFailed
                | UploadState::AzureStorageUriRenewalFailed
                | UploadState::CommitFileFailed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadState::Success => "success",
            UploadState::TransientError => "transientError",
            UploadState::Error => "error",
            UploadState::Unknown => "unknown",
            UploadState::AzureStorageUriRequestSuccess => "azureStorageUriRequestSuccess",
            UploadState::AzureStorageUriRequestPending => "azureStorageUriRequestPending",
            UploadState::AzureStorageUriRequestFailed => "azureStorageUriRequestFailed",
            UploadState::AzureStorageUriRequestTimedOut => "azureStorageUriRequestTimedOut",
            UploadState::AzureStorageUriRenewalSuccess => "azureStorageUriRenewalSuccess",
            UploadState::AzureStorageUriRenewalPending => "azureStorageUriRenewalPending",
            UploadState::AzureStorageUriRenewalFailed => "azureStorageUriRenewalFailed",
            UploadState::AzureStorageUriRenewalTimedOut => "azureStorageUriRenewalTimedOut",
            UploadState::CommitFileSuccess => "commitFileSuccess",
            UploadState::CommitFilePending => "commitFilePending",
            UploadState::CommitFileFailed => "commitFileFailed",
            UploadState::CommitFileTimedOut => "commitFileTimedOut",
            UploadState::Unrecognized => "unrecognized",
        }
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content file resource inside a content version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentFile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub upload_state: UploadState,
    #[serde(default)]
    pub azure_storage_uri: Option<String>,
    #[serde(default)]
    pub is_committed: bool,
}

/// Registration request for a new content file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFileRequest {
    pub name: String,
    pub size: u64,
    pub size_encrypted: u64,
    pub manifest: Option<Vec<u8>>,
}

/// Backend operations used by the publishing protocol.
#[async_trait]
pub trait DeviceManagementBackend: Send + Sync {
    /// Fetch an app; `Ok(None)` when it does not exist.
    async fn get_app(&self, app_id: &str) -> Result<Option<RemoteApp>, PublishError>;

    async fn create_app(&self, app: &AppDescriptor) -> Result<RemoteApp, PublishError>;

    async fn delete_app(&self, app_id: &str) -> Result<(), PublishError>;

    /// Re-apply display version, detection rules and icon from `app`.
    async fn update_app(&self, remote: &RemoteApp, app: &AppDescriptor) -> Result<(), PublishError>;

    async fn list_content_versions(&self, app: &RemoteApp) -> Result<Vec<ContentVersion>, PublishError>;

    async fn create_content_version(&self, app: &RemoteApp) -> Result<ContentVersion, PublishError>;

    async fn delete_content_version(&self, app: &RemoteApp, version_id: &str) -> Result<(), PublishError>;

    async fn list_content_files(&self, app: &RemoteApp, version_id: &str) -> Result<Vec<ContentFile>, PublishError>;

    async fn create_content_file(
        &self,
        app: &RemoteApp,
        version_id: &str,
        request: &ContentFileRequest,
    ) -> Result<ContentFile, PublishError>;

    async fn get_content_file(
        &self,
        app: &RemoteApp,
        version_id: &str,
        file_id: &str,
    ) -> Result<ContentFile, PublishError>;

    async fn commit_content_file(
        &self,
        app: &RemoteApp,
        version_id: &str,
        file_id: &str,
        encryption_info: &EncryptionInfo,
    ) -> Result<(), PublishError>;

    /// Point the app at a committed content version.
    async fn set_committed_content_version(&self, app: &RemoteApp, version_id: &str) -> Result<(), PublishError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_state_wire_names() {
        let state: UploadState = serde_json::from_str("\"azureStorageUriRequestSuccess\"").unwrap();
        assert_eq!(state, UploadState::AzureStorageUriRequestSuccess);

        let state: UploadState = serde_json::from_str("\"someFutureState\"").unwrap();
        assert_eq!(state, UploadState::Unrecognized);
        assert!(!state.is_failure());

        assert_eq!(
            serde_json::to_string(&UploadState::CommitFileFailed).unwrap(),
            "\"commitFileFailed\""
        );
    }

    #[test]
    fn test_failure_states() {
        assert!(UploadState::AzureStorageUriRequestFailed.is_failure());
        assert!(UploadState::AzureStorageUriRenewalFailed.is_failure());
        assert!(UploadState::CommitFileFailed.is_failure());
        assert!(!UploadState::CommitFilePending.is_failure());
        assert!(!UploadState::CommitFileTimedOut.is_failure());
    }

    #[test]
    fn test_content_file_json() {
        let file: ContentFile = serde_json::from_str(
            r#"{"id":"f1","name":"IntunePackage.intunewin","uploadState":"azureStorageUriRequestSuccess",
                "azureStorageUri":"https://blob/x?sig=1","isCommitted":false,"size":10}"#,
        )
        .unwrap();
        assert_eq!(file.id, "f1");
        assert_eq!(file.azure_storage_uri.as_deref(), Some("https://blob/x?sig=1"));
    }

    #[test]
    fn test_kind_matching() {
        assert!(RemoteAppKind::Win32LobApp.matches(AppKind::Win32));
        assert!(!RemoteAppKind::Win32LobApp.matches(AppKind::MobileInstaller));
        assert!(!RemoteAppKind::Other("iosLobApp".into()).matches(AppKind::Win32));
        assert_eq!(
            RemoteAppKind::from_odata_type("#microsoft.graph.windowsMobileMSI"),
            RemoteAppKind::WindowsMobileMsi
        );
        assert_eq!(RemoteAppKind::Win32LobApp.odata_type(), "#microsoft.graph.win32LobApp");
    }
}
