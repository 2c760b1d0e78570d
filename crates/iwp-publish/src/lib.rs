//! Publishing of content packages to a device-management service.
//!
//! [`PublishingOrchestrator`] drives the remote protocol: create or update
//! the app record, open a content version, register the content file, wait
//! for a signed storage URI, upload the encrypted stream in blocks with
//! [`ContentUploader`], commit, and point the app at the new version.
//!
//! The backend and the blob store sit behind [`DeviceManagementBackend`]
//! and [`BlobConnector`]; [`GraphBackend`] and [`AzureBlobConnector`] are
//! the HTTP implementations, [`testing`] has in-memory ones.

pub mod backend;
pub mod blob;
pub mod error;
pub mod graph;
pub mod orchestrator;
pub mod poll;
pub mod retry;
pub mod testing;
pub mod upload;

#[cfg(test)]
mod proptests;

pub use backend::{
    ContentFile, ContentFileRequest, ContentVersion, DeviceManagementBackend, RemoteApp, RemoteAppKind,
    UploadState,
};
pub use blob::{AzureBlobConnector, AzureBlobDestination, BlobConnector, BlobDestination, BlockId, MAX_BLOCK_COUNT};
pub use error::{BlobError, PublishError};
pub use graph::{GraphBackend, DEFAULT_GRAPH_URL};
pub use orchestrator::{PublishState, PublishingOrchestrator};
pub use poll::{poll_until, PollPolicy, PollStep, DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT};
pub use retry::{retry_fixed, RetryError, RetryPolicy};
pub use upload::{ContentUploader, UploadConfig, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY};
