//! Testing utilities for backends and blob destinations.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use iwp_crypto::EncryptionInfo;
use iwp_package::{AppDescriptor, ContentPackage, MobileInstallerApp, MsiInfo, Win32App};

use crate::backend::{
    ContentFile, ContentFileRequest, ContentVersion, DeviceManagementBackend, RemoteApp, RemoteAppKind,
    UploadState,
};
use crate::blob::{BlobConnector, BlobDestination, BlockId};
use crate::error::{BlobError, PublishError};

/// Win32 package over an in-memory stream holding `data`.
pub fn sample_package(data: Vec<u8>) -> ContentPackage {
    let size = data.len() as u64;
    ContentPackage::new(
        Box::new(Cursor::new(data)),
        size,
        size,
        AppDescriptor::Win32App(Win32App::new("Sample", "setup.exe")),
        None,
        sample_encryption_info(),
        "setup.exe",
    )
}

/// Mobile MSI package over `data` carrying `manifest`.
pub fn sample_msi_package(data: Vec<u8>, manifest: Vec<u8>) -> ContentPackage {
    let size = data.len() as u64;
    let msi = MsiInfo::new("{6E1A3F0C-0B7E-4F6B-9C55-3C4C1A0D2E11}", "2.4.1");
    ContentPackage::new(
        Box::new(Cursor::new(data)),
        size,
        size,
        AppDescriptor::MobileInstallerApp(MobileInstallerApp::new("Sample MSI", "sample.msi", msi)),
        Some(manifest),
        sample_encryption_info(),
        "sample.msi",
    )
}

fn sample_encryption_info() -> EncryptionInfo {
    EncryptionInfo::from_parts([1; 32], [2; 32], [3; 16], [4; 32], [5; 32])
}

/// Blob destination that records blocks in memory
pub struct RecordingBlobDestination {
    blocks: Mutex<Vec<(BlockId, Bytes)>>,
    attempts: Mutex<HashMap<BlockId, u32>>,
    failures: Mutex<HashMap<BlockId, (u32, u16)>>,
    committed: Mutex<Option<Vec<BlockId>>>,
}

impl RecordingBlobDestination {
    pub fn new() -> Self {
        Self {
            blocks: Mutex::new(Vec::new()),
            attempts: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            committed: Mutex::new(None),
        }
    }

    /// Fail the next `times` puts of `block_id` with HTTP `status`
    pub fn fail_block(&self, block_id: BlockId, times: u32, status: u16) {
        self.failures.lock().insert(block_id, (times, status));
    }

    /// Put attempts seen for `block_id`, failed ones included
    pub fn attempts(&self, block_id: BlockId) -> u32 {
        self.attempts.lock().get(&block_id).copied().unwrap_or(0)
    }

    /// Successfully staged blocks in arrival order
    pub fn blocks(&self) -> Vec<(BlockId, Bytes)> {
        self.blocks.lock().clone()
    }

    /// Committed block list, if any
    pub fn committed(&self) -> Option<Vec<BlockId>> {
        self.committed.lock().clone()
    }

    /// Blob content as assembled from the committed block list
    pub fn committed_content(&self) -> Vec<u8> {
        let blocks = self.blocks.lock();
        let mut content = Vec::new();
        for id in self.committed().unwrap_or_default() {
            if let Some((_, data)) = blocks.iter().rev().find(|(staged, _)| *staged == id) {
                content.extend_from_slice(data);
            }
        }
        content
    }
}

impl Default for RecordingBlobDestination {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobDestination for RecordingBlobDestination {
    async fn put_block(&self, block_id: BlockId, data: Bytes) -> Result<(), BlobError> {
        *self.attempts.lock().entry(block_id).or_insert(0) += 1;

        if let Some((remaining, status)) = self.failures.lock().get_mut(&block_id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(BlobError::Status {
                    status: *status,
                    message: "injected failure".to_string(),
                });
            }
        }

        self.blocks.lock().push((block_id, data));
        Ok(())
    }

    async fn commit_block_list(&self, block_ids: &[BlockId]) -> Result<(), BlobError> {
        *self.committed.lock() = Some(block_ids.to_vec());
        Ok(())
    }
}

/// Connector handing out one shared [`RecordingBlobDestination`]
pub struct RecordingBlobConnector {
    destination: Arc<RecordingBlobDestination>,
    uris: Mutex<Vec<String>>,
}

impl RecordingBlobConnector {
    pub fn new() -> Self {
        Self {
            destination: Arc::new(RecordingBlobDestination::new()),
            uris: Mutex::new(Vec::new()),
        }
    }

    pub fn destination(&self) -> Arc<RecordingBlobDestination> {
        self.destination.clone()
    }

    /// Signed URIs connected to so far
    pub fn uris(&self) -> Vec<String> {
        self.uris.lock().clone()
    }
}

impl Default for RecordingBlobConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobConnector for RecordingBlobConnector {
    fn connect(&self, signed_uri: &str) -> Result<Arc<dyn BlobDestination>, PublishError> {
        self.uris.lock().push(signed_uri.to_string());
        Ok(self.destination.clone())
    }
}

struct StoredFile {
    file: ContentFile,
    request: ContentFileRequest,
    /// Fetches left before a pending state resolves
    pending_polls: u32,
}

struct StoredApp {
    remote: RemoteApp,
    descriptor: AppDescriptor,
    versions: BTreeMap<u64, Vec<StoredFile>>,
    next_version: u64,
}

#[derive(Default)]
struct BackendState {
    apps: BTreeMap<String, StoredApp>,
    next_app: u64,
    next_file: u64,
    calls: Vec<String>,
    fail_next: HashSet<String>,
    deleted_apps: Vec<String>,
}

/// In-memory device-management backend
///
/// Content files start in `azureStorageUriRequestPending` and resolve to the
/// configured outcome after a number of fetches; commits do the same with
/// `commitFilePending`.
pub struct InMemoryBackend {
    state: Mutex<BackendState>,
    uri_polls: u32,
    uri_outcome: UploadState,
    commit_polls: u32,
    commit_outcome: UploadState,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BackendState::default()),
            uri_polls: 0,
            uri_outcome: UploadState::AzureStorageUriRequestSuccess,
            commit_polls: 0,
            commit_outcome: UploadState::CommitFileSuccess,
        }
    }

    /// Pending fetches before the storage URI request resolves to `outcome`.
    /// A pending `outcome` never resolves.
    pub fn with_uri_outcome(mut self, polls: u32, outcome: UploadState) -> Self {
        self.uri_polls = polls;
        self.uri_outcome = outcome;
        self
    }

    /// Pending fetches before a commit resolves to `outcome`
    pub fn with_commit_outcome(mut self, polls: u32, outcome: UploadState) -> Self {
        self.commit_polls = polls;
        self.commit_outcome = outcome;
        self
    }

    /// Make the next call of `operation` fail with a 500
    pub fn fail_next(&self, operation: &str) {
        self.state.lock().fail_next.insert(operation.to_string());
    }

    /// Seed an existing app with one committed content version
    pub fn insert_app(&self, descriptor: AppDescriptor, kind: RemoteAppKind) -> RemoteApp {
        let mut state = self.state.lock();
        state.next_app += 1;
        let remote = RemoteApp {
            id: format!("app-{}", state.next_app),
            display_name: descriptor.display_name().to_string(),
            kind,
            committed_content_version: Some("1".to_string()),
        };
        let mut versions = BTreeMap::new();
        versions.insert(1, Vec::new());
        state.apps.insert(
            remote.id.clone(),
            StoredApp {
                remote: remote.clone(),
                descriptor,
                versions,
                next_version: 2,
            },
        );
        remote
    }

    /// Add an uncommitted content version holding one file in `state`
    pub fn insert_partial_version(&self, app_id: &str, upload_state: UploadState) -> Option<String> {
        let mut state = self.state.lock();
        state.next_file += 1;
        let file_id = format!("file-{}", state.next_file);
        let app = state.apps.get_mut(app_id)?;
        let version = app.next_version;
        app.next_version += 1;
        app.versions.insert(
            version,
            vec![StoredFile {
                file: ContentFile {
                    id: file_id,
                    name: None,
                    upload_state,
                    azure_storage_uri: None,
                    is_committed: false,
                },
                request: ContentFileRequest {
                    name: String::new(),
                    size: 0,
                    size_encrypted: 0,
                    manifest: None,
                },
                pending_polls: 0,
            }],
        );
        Some(version.to_string())
    }

    pub fn app(&self, app_id: &str) -> Option<RemoteApp> {
        self.state.lock().apps.get(app_id).map(|app| app.remote.clone())
    }

    pub fn app_ids(&self) -> Vec<String> {
        self.state.lock().apps.keys().cloned().collect()
    }

    pub fn descriptor(&self, app_id: &str) -> Option<AppDescriptor> {
        self.state.lock().apps.get(app_id).map(|app| app.descriptor.clone())
    }

    pub fn deleted_apps(&self) -> Vec<String> {
        self.state.lock().deleted_apps.clone()
    }

    /// Content version ids of `app_id` in ascending order
    pub fn version_ids(&self, app_id: &str) -> Vec<String> {
        self.state
            .lock()
            .apps
            .get(app_id)
            .map(|app| app.versions.keys().map(u64::to_string).collect())
            .unwrap_or_default()
    }

    /// Registration requests for content files of `app_id`, oldest first
    pub fn file_requests(&self, app_id: &str) -> Vec<ContentFileRequest> {
        self.state
            .lock()
            .apps
            .get(app_id)
            .map(|app| {
                app.versions
                    .values()
                    .flatten()
                    .map(|stored| stored.request.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Names of every backend operation called, in order
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    fn enter(&self, operation: &str) -> Result<parking_lot::MutexGuard<'_, BackendState>, PublishError> {
        let mut state = self.state.lock();
        state.calls.push(operation.to_string());
        if state.fail_next.remove(operation) {
            return Err(PublishError::Backend {
                operation: operation.to_string(),
                status: 500,
                message: "injected failure".to_string(),
            });
        }
        Ok(state)
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(operation: &str, what: &str) -> PublishError {
    PublishError::Backend {
        operation: operation.to_string(),
        status: 404,
        message: format!("{what} not found"),
    }
}

fn version_key(operation: &str, version_id: &str) -> Result<u64, PublishError> {
    version_id
        .parse()
        .map_err(|_| not_found(operation, "content version"))
}

impl BackendState {
    fn app_mut(&mut self, operation: &str, app_id: &str) -> Result<&mut StoredApp, PublishError> {
        self.apps.get_mut(app_id).ok_or_else(|| not_found(operation, "app"))
    }

    fn file_mut(
        &mut self,
        operation: &str,
        app_id: &str,
        version_id: &str,
        file_id: &str,
    ) -> Result<&mut StoredFile, PublishError> {
        let key = version_key(operation, version_id)?;
        self.app_mut(operation, app_id)?
            .versions
            .get_mut(&key)
            .and_then(|files| files.iter_mut().find(|stored| stored.file.id == file_id))
            .ok_or_else(|| not_found(operation, "content file"))
    }
}

#[async_trait]
impl DeviceManagementBackend for InMemoryBackend {
    async fn get_app(&self, app_id: &str) -> Result<Option<RemoteApp>, PublishError> {
        let state = self.enter("get_app")?;
        Ok(state.apps.get(app_id).map(|app| app.remote.clone()))
    }

    async fn create_app(&self, app: &AppDescriptor) -> Result<RemoteApp, PublishError> {
        let mut state = self.enter("create_app")?;
        state.next_app += 1;
        let remote = RemoteApp {
            id: format!("app-{}", state.next_app),
            display_name: app.display_name().to_string(),
            kind: RemoteAppKind::from(app.kind()),
            committed_content_version: None,
        };
        state.apps.insert(
            remote.id.clone(),
            StoredApp {
                remote: remote.clone(),
                descriptor: app.clone(),
                versions: BTreeMap::new(),
                next_version: 1,
            },
        );
        Ok(remote)
    }

    async fn delete_app(&self, app_id: &str) -> Result<(), PublishError> {
        let mut state = self.enter("delete_app")?;
        state
            .apps
            .remove(app_id)
            .ok_or_else(|| not_found("delete_app", "app"))?;
        state.deleted_apps.push(app_id.to_string());
        Ok(())
    }

    async fn update_app(&self, remote: &RemoteApp, app: &AppDescriptor) -> Result<(), PublishError> {
        let mut state = self.enter("update_app")?;
        state.app_mut("update_app", &remote.id)?.descriptor = app.clone();
        Ok(())
    }

    async fn list_content_versions(&self, app: &RemoteApp) -> Result<Vec<ContentVersion>, PublishError> {
        let mut state = self.enter("list_content_versions")?;
        let stored = state.app_mut("list_content_versions", &app.id)?;
        Ok(stored
            .versions
            .keys()
            .map(|key| ContentVersion { id: key.to_string() })
            .collect())
    }

    async fn create_content_version(&self, app: &RemoteApp) -> Result<ContentVersion, PublishError> {
        let mut state = self.enter("create_content_version")?;
        let stored = state.app_mut("create_content_version", &app.id)?;
        let key = stored.next_version;
        stored.next_version += 1;
        stored.versions.insert(key, Vec::new());
        Ok(ContentVersion { id: key.to_string() })
    }

    async fn delete_content_version(&self, app: &RemoteApp, version_id: &str) -> Result<(), PublishError> {
        let mut state = self.enter("delete_content_version")?;
        let key = version_key("delete_content_version", version_id)?;
        state
            .app_mut("delete_content_version", &app.id)?
            .versions
            .remove(&key)
            .ok_or_else(|| not_found("delete_content_version", "content version"))?;
        Ok(())
    }

    async fn list_content_files(&self, app: &RemoteApp, version_id: &str) -> Result<Vec<ContentFile>, PublishError> {
        let mut state = self.enter("list_content_files")?;
        let key = version_key("list_content_files", version_id)?;
        let files = state
            .app_mut("list_content_files", &app.id)?
            .versions
            .get(&key)
            .ok_or_else(|| not_found("list_content_files", "content version"))?;
        Ok(files.iter().map(|stored| stored.file.clone()).collect())
    }

    async fn create_content_file(
        &self,
        app: &RemoteApp,
        version_id: &str,
        request: &ContentFileRequest,
    ) -> Result<ContentFile, PublishError> {
        let mut state = self.enter("create_content_file")?;
        state.next_file += 1;
        let file = ContentFile {
            id: format!("file-{}", state.next_file),
            name: Some(request.name.clone()),
            upload_state: UploadState::AzureStorageUriRequestPending,
            azure_storage_uri: None,
            is_committed: false,
        };
        let key = version_key("create_content_file", version_id)?;
        let files = state
            .app_mut("create_content_file", &app.id)?
            .versions
            .get_mut(&key)
            .ok_or_else(|| not_found("create_content_file", "content version"))?;
        files.push(StoredFile {
            file: file.clone(),
            request: request.clone(),
            pending_polls: self.uri_polls,
        });
        Ok(file)
    }

    async fn get_content_file(
        &self,
        app: &RemoteApp,
        version_id: &str,
        file_id: &str,
    ) -> Result<ContentFile, PublishError> {
        let mut state = self.enter("get_content_file")?;
        let stored = state.file_mut("get_content_file", &app.id, version_id, file_id)?;

        let outcome = match stored.file.upload_state {
            UploadState::AzureStorageUriRequestPending => Some(self.uri_outcome),
            UploadState::CommitFilePending => Some(self.commit_outcome),
            _ => None,
        };
        if let Some(outcome) = outcome {
            if stored.pending_polls > 0 {
                stored.pending_polls -= 1;
            } else {
                stored.file.upload_state = outcome;
                match outcome {
                    UploadState::AzureStorageUriRequestSuccess => {
                        stored.file.azure_storage_uri =
                            Some(format!("https://blob.test/{}/{}?sig=test", app.id, file_id));
                    }
                    UploadState::CommitFileSuccess => stored.file.is_committed = true,
                    _ => {}
                }
            }
        }
        Ok(stored.file.clone())
    }

    async fn commit_content_file(
        &self,
        app: &RemoteApp,
        version_id: &str,
        file_id: &str,
        _encryption_info: &EncryptionInfo,
    ) -> Result<(), PublishError> {
        let mut state = self.enter("commit_content_file")?;
        let stored = state.file_mut("commit_content_file", &app.id, version_id, file_id)?;
        stored.file.upload_state = UploadState::CommitFilePending;
        stored.pending_polls = self.commit_polls;
        Ok(())
    }

    async fn set_committed_content_version(&self, app: &RemoteApp, version_id: &str) -> Result<(), PublishError> {
        let mut state = self.enter("set_committed_content_version")?;
        state
            .app_mut("set_committed_content_version", &app.id)?
            .remote
            .committed_content_version = Some(version_id.to_string());
        Ok(())
    }
}
