//! End-to-end publish and update protocol.
//!
//! ```text
//! NotCreated -> ContentVersionOpen -> AwaitingUploadUri -> Uploading -> Committing -> Committed
//!      |                 |                    |                |            |
//! CreateFailed    UriRequestFailed    UriRequestFailed    CommitFailed  CommitFailed
//! ```
//!
//! A failure on the create path deletes the app record created by the
//! call. A failure on the update path leaves the record alone; a partially
//! committed content version is detected and deleted by the next attempt.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use iwp_package::ContentPackage;

use crate::backend::{
    ContentFile, ContentFileRequest, ContentVersion, DeviceManagementBackend, RemoteApp, RemoteAppKind,
    UploadState,
};
use crate::blob::BlobConnector;
use crate::error::PublishError;
use crate::poll::{poll_until, PollPolicy, PollStep};
use crate::upload::{ContentUploader, UploadConfig};

/// Progress of one publish or update call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishState {
    NotCreated,
    ContentVersionOpen,
    AwaitingUploadUri,
    Uploading,
    Committing,
    Committed,
    CreateFailed,
    UriRequestFailed,
    CommitFailed,
}

impl PublishState {
    /// Failure state reached when the step after `self` fails.
    pub fn failed(self) -> Self {
        match self {
            PublishState::NotCreated => PublishState::CreateFailed,
            PublishState::ContentVersionOpen | PublishState::AwaitingUploadUri => PublishState::UriRequestFailed,
            PublishState::Uploading | PublishState::Committing | PublishState::Committed => {
                PublishState::CommitFailed
            }
            failed => failed,
        }
    }

    pub fn is_failure(self) -> bool {
        matches!(
            self,
            PublishState::CreateFailed | PublishState::UriRequestFailed | PublishState::CommitFailed
        )
    }
}

impl fmt::Display for PublishState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// State tracker that traces every transition.
struct Progress {
    app_id: String,
    state: PublishState,
}

impl Progress {
    fn new(app_id: &str) -> Self {
        debug!(app_id, state = %PublishState::NotCreated, "Publish started");
        Self {
            app_id: app_id.to_string(),
            state: PublishState::NotCreated,
        }
    }

    fn advance(&mut self, next: PublishState) {
        info!(app_id = %self.app_id, from = %self.state, to = %next, "Publish state changed");
        self.state = next;
    }

    fn fail(&mut self, err: &PublishError) {
        let next = self.state.failed();
        error!(app_id = %self.app_id, from = %self.state, to = %next, error = %err, "Publish failed");
        self.state = next;
    }
}

/// Drives the remote protocol for publishing content packages.
pub struct PublishingOrchestrator {
    backend: Arc<dyn DeviceManagementBackend>,
    blobs: Arc<dyn BlobConnector>,
    uploader: ContentUploader,
    poll: PollPolicy,
}

impl PublishingOrchestrator {
    pub fn new(backend: Arc<dyn DeviceManagementBackend>, blobs: Arc<dyn BlobConnector>) -> Self {
        Self {
            backend,
            blobs,
            uploader: ContentUploader::default(),
            poll: PollPolicy::default(),
        }
    }

    pub fn with_upload_config(mut self, config: UploadConfig) -> Self {
        self.uploader = ContentUploader::new(config);
        self
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Create a new app for `package` and commit its content.
    ///
    /// Required fields the package leaves unset get defaults first. Any
    /// failure after the app record exists deletes it again.
    pub async fn publish(&self, mut package: ContentPackage) -> Result<RemoteApp, PublishError> {
        package.app_mut().apply_defaults();
        let mut progress = Progress::new("<new>");

        let mut app = match self.backend.create_app(package.app()).await {
            Ok(app) => app,
            Err(e) => {
                progress.fail(&e);
                return Err(e);
            }
        };
        progress.app_id = app.id.clone();
        info!(app_id = %app.id, kind = %app.kind, "App record created");

        let result = self.publish_content(&app, &mut package, &mut progress).await;
        release(package);

        match result {
            Ok(version_id) => {
                app.committed_content_version = Some(version_id);
                Ok(app)
            }
            Err(e) => {
                progress.fail(&e);
                self.delete_created_app(&app.id).await;
                Err(e)
            }
        }
    }

    /// Commit new content for the existing app `app_id`.
    ///
    /// Falls back to [`publish`](Self::publish) when the app does not
    /// exist. Defaults are applied before the record's display version and
    /// detection rules are patched. A kind mismatch between app and package fails with
    /// [`PublishError::TypeMismatch`] before anything is modified.
    pub async fn update(&self, app_id: &str, mut package: ContentPackage) -> Result<RemoteApp, PublishError> {
        let Some(mut app) = self.backend.get_app(app_id).await? else {
            warn!(app_id, "App not found, publishing as a new app");
            return self.publish(package).await;
        };

        let expected = package.app().kind();
        if !app.kind.matches(expected) {
            warn!(app_id, remote = %app.kind, package = %expected, "App kind mismatch");
            return Err(PublishError::TypeMismatch {
                app_id: app_id.to_string(),
                expected: expected.to_string(),
                actual: app.kind.to_string(),
            });
        }

        package.app_mut().apply_defaults();
        let mut progress = Progress::new(&app.id);
        let result = match self.backend.update_app(&app, package.app()).await {
            Ok(()) => self.publish_content(&app, &mut package, &mut progress).await,
            Err(e) => Err(e),
        };
        release(package);

        match result {
            Ok(version_id) => {
                app.committed_content_version = Some(version_id);
                Ok(app)
            }
            Err(e) => {
                progress.fail(&e);
                Err(e)
            }
        }
    }

    /// Content steps shared by create and update. Returns the committed
    /// content version id.
    async fn publish_content(
        &self,
        app: &RemoteApp,
        package: &mut ContentPackage,
        progress: &mut Progress,
    ) -> Result<String, PublishError> {
        let version = self.open_content_version(app).await?;
        progress.advance(PublishState::ContentVersionOpen);

        // Only mobile MSI records take a manifest, whatever the package holds.
        let manifest = match app.kind {
            RemoteAppKind::WindowsMobileMsi => package.installer_manifest().map(<[u8]>::to_vec),
            _ => {
                if package.installer_manifest().is_some() {
                    debug!(app_id = %app.id, kind = %app.kind, "Dropping installer manifest");
                }
                None
            }
        };
        let request = ContentFileRequest {
            name: package.app().file_name().to_string(),
            size: package.cleartext_size(),
            size_encrypted: package.encrypted_size(),
            manifest,
        };
        let file = self.backend.create_content_file(app, &version.id, &request).await?;
        progress.advance(PublishState::AwaitingUploadUri);

        let file = self
            .wait_for_file_state(app, &version.id, &file.id, UploadState::AzureStorageUriRequestSuccess)
            .await?;
        let uri = file.azure_storage_uri.clone().ok_or_else(|| {
            PublishError::InvalidResponse(format!("content file {} has no storage URI", file.id))
        })?;
        progress.advance(PublishState::Uploading);

        let destination = self.blobs.connect(&uri)?;
        self.uploader.upload(package, destination.as_ref()).await?;
        progress.advance(PublishState::Committing);

        self.backend
            .commit_content_file(app, &version.id, &file.id, package.encryption_info())
            .await?;
        self.wait_for_file_state(app, &version.id, &file.id, UploadState::CommitFileSuccess)
            .await?;

        self.backend.set_committed_content_version(app, &version.id).await?;
        progress.advance(PublishState::Committed);
        Ok(version.id)
    }

    /// Reuse the newest uncommitted content version when it has no files,
    /// otherwise delete it and open a fresh one.
    async fn open_content_version(&self, app: &RemoteApp) -> Result<ContentVersion, PublishError> {
        let committed = app.committed_content_version.as_deref();
        let committed_seq = committed.and_then(|id| id.parse::<u64>().ok());

        let mut versions = self.backend.list_content_versions(app).await?;
        versions.retain(|v| {
            Some(v.id.as_str()) != committed
                && match (v.sequence(), committed_seq) {
                    (Some(seq), Some(committed)) => seq > committed,
                    _ => true,
                }
        });
        versions.sort_by_key(ContentVersion::sequence);

        if let Some(newest) = versions.pop() {
            let files = self.backend.list_content_files(app, &newest.id).await?;
            if files.is_empty() {
                info!(app_id = %app.id, version_id = %newest.id, "Reusing content version");
                return Ok(newest);
            }
            warn!(
                app_id = %app.id,
                version_id = %newest.id,
                files = files.len(),
                "Deleting partially committed content version"
            );
            self.backend.delete_content_version(app, &newest.id).await?;
        }

        let version = self.backend.create_content_version(app).await?;
        info!(app_id = %app.id, version_id = %version.id, "Content version created");
        Ok(version)
    }

    async fn wait_for_file_state(
        &self,
        app: &RemoteApp,
        version_id: &str,
        file_id: &str,
        expected: UploadState,
    ) -> Result<ContentFile, PublishError> {
        let backend = self.backend.as_ref();
        poll_until(self.poll, expected.as_str(), || async move {
            let file = backend.get_content_file(app, version_id, file_id).await?;
            debug!(file_id, state = %file.upload_state, "Content file state");
            Ok(if file.upload_state == expected {
                PollStep::Ready(file)
            } else if file.upload_state.is_failure() {
                PollStep::Failed(file.upload_state.to_string())
            } else {
                PollStep::Pending
            })
        })
        .await
    }

    async fn delete_created_app(&self, app_id: &str) {
        match self.backend.delete_app(app_id).await {
            Ok(()) => info!(app_id, "Deleted partially created app"),
            Err(e) => warn!(app_id, error = %e, "Failed to delete partially created app"),
        }
    }
}

/// Drop the package and with it the encrypted stream.
fn release(package: ContentPackage) {
    debug!(setup_file = package.setup_file(), "Releasing content stream");
    drop(package);
}
