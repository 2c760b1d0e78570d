//! Block blob destinations.
//!
//! Content is uploaded to a time-limited signed URI with the two block blob
//! operations: put a block by id, then commit the ordered block list.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::error::{BlobError, PublishError};

/// Highest block count whose ids all render with four digits. Block ids of
/// one blob must share a length, which caps a payload at this many chunks.
pub const MAX_BLOCK_COUNT: u32 = 10_000;

/// Zero-padded decimal block id: `"0000"`, `"0001"`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn index(&self) -> u32 {
        self.0
    }

    /// Base64 form used on the wire.
    pub fn encoded(&self) -> String {
        BASE64.encode(self.to_string())
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

/// Block-oriented upload target.
#[async_trait]
pub trait BlobDestination: Send + Sync {
    /// Stage one block.
    async fn put_block(&self, block_id: BlockId, data: Bytes) -> Result<(), BlobError>;

    /// Commit staged blocks in the given order.
    async fn commit_block_list(&self, block_ids: &[BlockId]) -> Result<(), BlobError>;
}

/// Opens a [`BlobDestination`] for a signed URI returned by the backend.
pub trait BlobConnector: Send + Sync {
    fn connect(&self, signed_uri: &str) -> Result<Arc<dyn BlobDestination>, PublishError>;
}

#[derive(Serialize)]
#[serde(rename = "BlockList")]
struct BlockList {
    #[serde(rename = "Latest")]
    latest: Vec<String>,
}

/// Request body committing `block_ids` as the latest blocks.
pub fn block_list_xml(block_ids: &[BlockId]) -> Result<String, BlobError> {
    let list = BlockList {
        latest: block_ids.iter().map(BlockId::encoded).collect(),
    };
    let body = quick_xml::se::to_string(&list).map_err(|e| BlobError::Serialize(e.to_string()))?;
    Ok(format!("<?xml version=\"1.0\" encoding=\"utf-8\"?>{body}"))
}

/// Azure block blob behind a SAS URI.
pub struct AzureBlobDestination {
    client: reqwest::Client,
    sas_uri: Url,
}

impl AzureBlobDestination {
    pub fn new(client: reqwest::Client, sas_uri: &str) -> Result<Self, BlobError> {
        let sas_uri = Url::parse(sas_uri).map_err(|e| BlobError::InvalidUri(e.to_string()))?;
        Ok(Self { client, sas_uri })
    }

    /// SAS URI with extra query parameters appended.
    fn url_with(&self, params: &[(&str, &str)]) -> Url {
        let mut url = self.sas_uri.clone();
        url.query_pairs_mut().extend_pairs(params);
        url
    }

    async fn check(response: reqwest::Response) -> Result<(), BlobError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let message = response.text().await.unwrap_or_default();
        Err(BlobError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl BlobDestination for AzureBlobDestination {
    async fn put_block(&self, block_id: BlockId, data: Bytes) -> Result<(), BlobError> {
        let encoded = block_id.encoded();
        let url = self.url_with(&[("comp", "block"), ("blockid", &encoded)]);
        let len = data.len();

        let response = self
            .client
            .put(url)
            .header("x-ms-blob-type", "BlockBlob")
            .body(data)
            .send()
            .await?;
        Self::check(response).await?;

        debug!(block_id = %block_id, len, "Block staged");
        Ok(())
    }

    async fn commit_block_list(&self, block_ids: &[BlockId]) -> Result<(), BlobError> {
        let url = self.url_with(&[("comp", "blocklist")]);
        let body = block_list_xml(block_ids)?;

        let response = self
            .client
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, "application/xml")
            .body(body)
            .send()
            .await?;
        Self::check(response).await?;

        debug!(blocks = block_ids.len(), "Block list committed");
        Ok(())
    }
}

/// Creates [`AzureBlobDestination`]s sharing one HTTP client.
pub struct AzureBlobConnector {
    client: reqwest::Client,
}

impl AzureBlobConnector {
    pub fn new(timeout: Duration) -> Result<Self, PublishError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!("iwp-publish/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl BlobConnector for AzureBlobConnector {
    fn connect(&self, signed_uri: &str) -> Result<Arc<dyn BlobDestination>, PublishError> {
        Ok(Arc::new(AzureBlobDestination::new(self.client.clone(), signed_uri)?))
    }
}
