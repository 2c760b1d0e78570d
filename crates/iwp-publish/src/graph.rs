//! Microsoft Graph implementation of [`DeviceManagementBackend`].

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use iwp_crypto::EncryptionInfo;
use iwp_package::{
    AppDescriptor, AppIcon, DetectionRule, InstallExperience, InstallScope, MobileInstallerApp, MsiInfo,
    Win32App,
};

use crate::backend::{
    ContentFile, ContentFileRequest, ContentVersion, DeviceManagementBackend, RemoteApp, RemoteAppKind,
};
use crate::error::PublishError;

/// Production Graph endpoint.
pub const DEFAULT_GRAPH_URL: &str = "https://graph.microsoft.com/beta/";

/// Graph client authenticated with a bearer token.
pub struct GraphBackend {
    client: reqwest::Client,
    base_url: Url,
    token: String,
}

#[derive(Deserialize)]
struct Collection<T> {
    value: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppResource {
    id: String,
    #[serde(rename = "@odata.type")]
    odata_type: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    committed_content_version: Option<String>,
}

impl From<AppResource> for RemoteApp {
    fn from(resource: AppResource) -> Self {
        RemoteApp {
            id: resource.id,
            display_name: resource.display_name,
            kind: RemoteAppKind::from_odata_type(&resource.odata_type),
            committed_content_version: resource.committed_content_version,
        }
    }
}

impl GraphBackend {
    pub fn new(base_url: &str, token: impl Into<String>, timeout: Duration) -> Result<Self, PublishError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| PublishError::ConfigError(format!("Graph base URL: {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!("iwp-publish/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url,
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> Result<Url, PublishError> {
        self.base_url
            .join(path)
            .map_err(|e| PublishError::ConfigError(format!("invalid request path {path}: {e}")))
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, PublishError> {
        Ok(self
            .client
            .request(method, self.url(path)?)
            .bearer_auth(&self.token))
    }

    fn app_path(app_id: &str) -> String {
        format!("deviceAppManagement/mobileApps/{app_id}")
    }

    fn versions_path(app: &RemoteApp) -> String {
        let segment = app.kind.odata_type();
        format!(
            "{}/{}/contentVersions",
            Self::app_path(&app.id),
            segment.trim_start_matches('#')
        )
    }

    fn files_path(app: &RemoteApp, version_id: &str) -> String {
        format!("{}/{version_id}/files", Self::versions_path(app))
    }

    async fn send(operation: &str, request: RequestBuilder) -> Result<Response, PublishError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            debug!(operation, status = status.as_u16(), "Graph request succeeded");
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(PublishError::Backend {
            operation: operation.to_string(),
            status: status.as_u16(),
            message,
        })
    }

    async fn send_json<T: DeserializeOwned>(operation: &str, request: RequestBuilder) -> Result<T, PublishError> {
        let response = Self::send(operation, request).await?;
        response
            .json()
            .await
            .map_err(|e| PublishError::InvalidResponse(format!("{operation}: {e}")))
    }
}

#[async_trait]
impl DeviceManagementBackend for GraphBackend {
    async fn get_app(&self, app_id: &str) -> Result<Option<RemoteApp>, PublishError> {
        let response = self.request(Method::GET, &Self::app_path(app_id))?.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Backend {
                operation: "get app".to_string(),
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        let resource: AppResource = response
            .json()
            .await
            .map_err(|e| PublishError::InvalidResponse(format!("get app: {e}")))?;
        Ok(Some(resource.into()))
    }

    async fn create_app(&self, app: &AppDescriptor) -> Result<RemoteApp, PublishError> {
        let body = app_body(app);
        let request = self.request(Method::POST, "deviceAppManagement/mobileApps")?.json(&body);
        let resource: AppResource = Self::send_json("create app", request).await?;
        Ok(resource.into())
    }

    async fn delete_app(&self, app_id: &str) -> Result<(), PublishError> {
        Self::send("delete app", self.request(Method::DELETE, &Self::app_path(app_id))?).await?;
        Ok(())
    }

    async fn update_app(&self, remote: &RemoteApp, app: &AppDescriptor) -> Result<(), PublishError> {
        let mut body = json!({ "@odata.type": remote.kind.odata_type() });
        if let Some(version) = app.display_version() {
            body["displayVersion"] = json!(version);
        }
        if let Some(icon) = app.large_icon() {
            body["largeIcon"] = icon_json(icon);
        }
        match app {
            AppDescriptor::Win32App(win32) if !win32.detection_rules.is_empty() => {
                body["detectionRules"] =
                    Value::Array(win32.detection_rules.iter().map(detection_rule_json).collect());
            }
            _ => {}
        }

        let request = self.request(Method::PATCH, &Self::app_path(&remote.id))?.json(&body);
        Self::send("update app", request).await?;
        Ok(())
    }

    async fn list_content_versions(&self, app: &RemoteApp) -> Result<Vec<ContentVersion>, PublishError> {
        let request = self.request(Method::GET, &Self::versions_path(app))?;
        let versions: Collection<ContentVersion> = Self::send_json("list content versions", request).await?;
        Ok(versions.value)
    }

    async fn create_content_version(&self, app: &RemoteApp) -> Result<ContentVersion, PublishError> {
        let request = self.request(Method::POST, &Self::versions_path(app))?.json(&json!({}));
        Self::send_json("create content version", request).await
    }

    async fn delete_content_version(&self, app: &RemoteApp, version_id: &str) -> Result<(), PublishError> {
        let path = format!("{}/{version_id}", Self::versions_path(app));
        Self::send("delete content version", self.request(Method::DELETE, &path)?).await?;
        Ok(())
    }

    async fn list_content_files(&self, app: &RemoteApp, version_id: &str) -> Result<Vec<ContentFile>, PublishError> {
        let request = self.request(Method::GET, &Self::files_path(app, version_id))?;
        let files: Collection<ContentFile> = Self::send_json("list content files", request).await?;
        Ok(files.value)
    }

    async fn create_content_file(
        &self,
        app: &RemoteApp,
        version_id: &str,
        request: &ContentFileRequest,
    ) -> Result<ContentFile, PublishError> {
        let body = json!({
            "@odata.type": "#microsoft.graph.mobileAppContentFile",
            "name": request.name,
            "size": request.size,
            "sizeEncrypted": request.size_encrypted,
            "manifest": request.manifest.as_ref().map(|m| BASE64.encode(m)),
            "isDependency": false,
        });
        let http = self.request(Method::POST, &Self::files_path(app, version_id))?.json(&body);
        Self::send_json("create content file", http).await
    }

    async fn get_content_file(
        &self,
        app: &RemoteApp,
        version_id: &str,
        file_id: &str,
    ) -> Result<ContentFile, PublishError> {
        let path = format!("{}/{file_id}", Self::files_path(app, version_id));
        Self::send_json("get content file", self.request(Method::GET, &path)?).await
    }

    async fn commit_content_file(
        &self,
        app: &RemoteApp,
        version_id: &str,
        file_id: &str,
        encryption_info: &EncryptionInfo,
    ) -> Result<(), PublishError> {
        let path = format!("{}/{file_id}/commit", Self::files_path(app, version_id));
        let body = json!({ "fileEncryptionInfo": encryption_info_json(encryption_info) });
        Self::send("commit content file", self.request(Method::POST, &path)?.json(&body)).await?;
        Ok(())
    }

    async fn set_committed_content_version(&self, app: &RemoteApp, version_id: &str) -> Result<(), PublishError> {
        let body = json!({
            "@odata.type": app.kind.odata_type(),
            "committedContentVersion": version_id,
        });
        let request = self.request(Method::PATCH, &Self::app_path(&app.id))?.json(&body);
        Self::send("set committed content version", request).await?;
        Ok(())
    }
}

/// Request body creating the remote record for `app`.
pub fn app_body(app: &AppDescriptor) -> Value {
    match app {
        AppDescriptor::Win32App(win32) => win32_body(win32),
        AppDescriptor::MobileInstallerApp(msi) => mobile_msi_body(msi),
    }
}

fn win32_body(app: &Win32App) -> Value {
    let run_as = match app.install_experience {
        InstallExperience::System => "system",
        InstallExperience::User => "user",
    };
    let mut body = json!({
        "@odata.type": "#microsoft.graph.win32LobApp",
        "displayName": app.display_name,
        "description": app.description.as_deref().unwrap_or(&app.display_name),
        "publisher": app.publisher,
        "displayVersion": app.display_version,
        "fileName": app.file_name,
        "setupFilePath": app.setup_file_path,
        "installCommandLine": app.install_command_line,
        "uninstallCommandLine": app.uninstall_command_line,
        "applicableArchitectures": "x86,x64",
        "minimumSupportedWindowsRelease": "1607",
        "installExperience": {
            "runAsAccount": run_as,
            "deviceRestartBehavior": "suppress",
        },
        "detectionRules": app.detection_rules.iter().map(detection_rule_json).collect::<Vec<_>>(),
        "returnCodes": [
            { "returnCode": 0, "type": "success" },
            { "returnCode": 1707, "type": "success" },
            { "returnCode": 3010, "type": "softReboot" },
            { "returnCode": 1641, "type": "hardReboot" },
            { "returnCode": 1618, "type": "retry" },
        ],
    });
    if let Some(msi) = &app.msi_info {
        body["msiInformation"] = msi_information_json(msi);
    }
    if let Some(icon) = &app.large_icon {
        body["largeIcon"] = icon_json(icon);
    }
    body
}

fn mobile_msi_body(app: &MobileInstallerApp) -> Value {
    let mut body = json!({
        "@odata.type": "#microsoft.graph.windowsMobileMSI",
        "displayName": app.display_name,
        "description": app.description.as_deref().unwrap_or(&app.display_name),
        "publisher": app.publisher,
        "displayVersion": app.display_version,
        "fileName": app.file_name,
        "commandLine": app.command_line,
        "productCode": app.msi_info.product_code,
        "productVersion": app.msi_info.product_version,
        "identityVersion": app.msi_info.product_version,
        "ignoreVersionDetection": app.ignore_version_detection,
        "useDeviceContext": app.msi_info.is_machine_install(),
    });
    if let Some(icon) = &app.large_icon {
        body["largeIcon"] = icon_json(icon);
    }
    body
}

fn msi_information_json(msi: &MsiInfo) -> Value {
    let package_type = match msi.install_scope {
        InstallScope::PerMachine => "perMachine",
        InstallScope::PerUser => "perUser",
        InstallScope::DualPurpose => "dualPurpose",
    };
    json!({
        "productCode": msi.product_code,
        "productVersion": msi.product_version,
        "upgradeCode": msi.upgrade_code,
        "requiresReboot": msi.requires_reboot,
        "packageType": package_type,
        "productName": msi.product_name,
        "publisher": msi.publisher,
    })
}

fn detection_rule_json(rule: &DetectionRule) -> Value {
    match rule {
        DetectionRule::MsiProductCode {
            product_code,
            product_version,
        } => {
            let operator = match product_version {
                Some(_) => "equal",
                None => "notConfigured",
            };
            json!({
                "@odata.type": "#microsoft.graph.win32LobAppProductCodeDetection",
                "productCode": product_code,
                "productVersionOperator": operator,
                "productVersion": product_version,
            })
        }
        DetectionRule::PowerShellScript {
            script_content,
            enforce_signature_check,
            run_as_32_bit,
        } => json!({
            "@odata.type": "#microsoft.graph.win32LobAppPowerShellScriptDetection",
            "scriptContent": BASE64.encode(script_content),
            "enforceSignatureCheck": enforce_signature_check,
            "runAs32Bit": run_as_32_bit,
        }),
        DetectionRule::FileExists {
            path,
            file_or_folder_name,
        } => json!({
            "@odata.type": "#microsoft.graph.win32LobAppFileSystemDetection",
            "path": path,
            "fileOrFolderName": file_or_folder_name,
            "check32BitOn64System": false,
            "detectionType": "exists",
        }),
    }
}

fn icon_json(icon: &AppIcon) -> Value {
    json!({
        "@odata.type": "#microsoft.graph.mimeContent",
        "type": icon.mime_type,
        "value": BASE64.encode(&icon.data),
    })
}

/// `fileEncryptionInfo` payload of the commit request.
pub fn encryption_info_json(info: &EncryptionInfo) -> Value {
    json!({
        "@odata.type": "#microsoft.graph.fileEncryptionInfo",
        "encryptionKey": BASE64.encode(info.encryption_key),
        "macKey": BASE64.encode(info.mac_key),
        "initializationVector": BASE64.encode(info.initialization_vector),
        "mac": BASE64.encode(info.mac),
        "profileIdentifier": info.profile_identifier,
        "fileDigest": BASE64.encode(info.file_digest),
        "fileDigestAlgorithm": info.file_digest_algorithm,
    })
}
