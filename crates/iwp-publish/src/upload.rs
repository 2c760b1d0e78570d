//! Chunked content upload with per-block retry.

use std::io::Read;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info};

use iwp_package::ContentPackage;

use crate::blob::{BlobDestination, BlockId, MAX_BLOCK_COUNT};
use crate::error::PublishError;
use crate::retry::{retry_fixed, RetryError, RetryPolicy};

/// Size of every block except possibly the last.
pub const DEFAULT_CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// Retries per block after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 50;

/// Pause between attempts of the same block.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Uploader settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadConfig {
    pub chunk_size: usize,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl UploadConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_delay)
    }

    /// Number of blocks for a payload of `size` bytes.
    pub fn block_count(&self, size: u64) -> u64 {
        size.div_ceil(self.chunk_size.max(1) as u64)
    }
}

/// Streams an encrypted package into a blob destination block by block.
#[derive(Debug, Clone, Default)]
pub struct ContentUploader {
    config: UploadConfig,
}

impl ContentUploader {
    pub fn new(config: UploadConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Upload the encrypted stream of `package` and commit the block list.
    ///
    /// Blocks are read whole into memory, uploaded strictly in order, and
    /// retried on transient errors. Payloads needing more than
    /// [`MAX_BLOCK_COUNT`] blocks are rejected before anything is sent.
    /// Returns the committed block ids.
    pub async fn upload(
        &self,
        package: &mut ContentPackage,
        destination: &dyn BlobDestination,
    ) -> Result<Vec<BlockId>, PublishError> {
        let total = package.encrypted_size();
        let block_count = self.config.block_count(total);
        if block_count > u64::from(MAX_BLOCK_COUNT) {
            return Err(PublishError::ConfigError(format!(
                "{total} bytes need {block_count} blocks of {} bytes, more than the {MAX_BLOCK_COUNT} block limit",
                self.config.chunk_size
            )));
        }
        let last_block_id = BlockId(block_count.saturating_sub(1) as u32);
        info!(
            total_size = total,
            chunk_size = self.config.chunk_size,
            blocks = block_count,
            last_block_id = %last_block_id,
            "Starting content upload"
        );

        let reader = package.reader()?;
        let mut block_ids = Vec::with_capacity(block_count as usize);
        let mut uploaded: u64 = 0;

        loop {
            let mut chunk = Vec::with_capacity(self.config.chunk_size);
            Read::take(&mut *reader, self.config.chunk_size as u64).read_to_end(&mut chunk)?;
            if chunk.is_empty() {
                break;
            }

            let block_id = BlockId(block_ids.len() as u32);
            let len = chunk.len();
            self.put_block(destination, block_id, Bytes::from(chunk)).await?;

            uploaded += len as u64;
            block_ids.push(block_id);
            debug!(block_id = %block_id, len, uploaded, total_size = total, "Block uploaded");
        }

        destination.commit_block_list(&block_ids).await?;
        info!(blocks = block_ids.len(), uploaded, "Content upload committed");
        Ok(block_ids)
    }

    async fn put_block(
        &self,
        destination: &dyn BlobDestination,
        block_id: BlockId,
        data: Bytes,
    ) -> Result<(), PublishError> {
        let operation = format!("put block {block_id}");
        let result = retry_fixed(
            self.config.retry_policy(),
            &operation,
            |_attempt| {
                let data = data.clone();
                async move {
                    destination.put_block(block_id, data).await.map_err(|e| {
                        if e.is_transient() {
                            PublishError::TransientUpload {
                                block_id: block_id.to_string(),
                                source: e,
                            }
                        } else {
                            PublishError::Blob(e)
                        }
                    })
                }
            },
            PublishError::is_transient,
        )
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(RetryError::Fatal(e)) => Err(e),
            Err(RetryError::Exhausted { attempts, last }) => Err(PublishError::UploadFailed {
                block_id: block_id.to_string(),
                attempts,
                last_error: last.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BlobError;
    use crate::testing::{sample_package, RecordingBlobDestination};

    fn fast(chunk_size: usize) -> ContentUploader {
        ContentUploader::new(UploadConfig {
            chunk_size,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::ZERO,
        })
    }

    #[test]
    fn test_block_count() {
        let config = UploadConfig::default();
        assert_eq!(config.block_count(0), 0);
        assert_eq!(config.block_count(1), 1);
        assert_eq!(config.block_count(DEFAULT_CHUNK_SIZE as u64), 1);
        assert_eq!(config.block_count(DEFAULT_CHUNK_SIZE as u64 + 1), 2);
    }

    #[tokio::test]
    async fn test_default_chunking() {
        let data: Vec<u8> = (0..(DEFAULT_CHUNK_SIZE * 2 + 100)).map(|i| i as u8).collect();
        let mut package = sample_package(data.clone());
        let destination = RecordingBlobDestination::new();

        let ids = ContentUploader::default()
            .upload(&mut package, &destination)
            .await
            .unwrap();

        assert_eq!(ids, vec![BlockId(0), BlockId(1), BlockId(2)]);
        assert_eq!(destination.committed(), Some(ids));
        assert_eq!(destination.committed_content(), data);
        let sizes: Vec<usize> = destination.blocks().iter().map(|(_, b)| b.len()).collect();
        assert_eq!(sizes, vec![DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_SIZE, 100]);
    }

    #[tokio::test]
    async fn test_block_limit() {
        let limit = MAX_BLOCK_COUNT as usize;
        let mut package = sample_package(vec![6u8; limit]);
        let destination = RecordingBlobDestination::new();
        let ids = fast(1).upload(&mut package, &destination).await.unwrap();
        assert_eq!(ids.len(), limit);
        assert_eq!(ids.last().map(BlockId::to_string).as_deref(), Some("9999"));

        let mut package = sample_package(vec![6u8; limit + 1]);
        let destination = RecordingBlobDestination::new();
        let result = fast(1).upload(&mut package, &destination).await;
        assert!(matches!(result, Err(PublishError::ConfigError(_))));
        assert_eq!(destination.attempts(BlockId(0)), 0);
        assert_eq!(destination.committed(), None);
    }

    #[tokio::test]
    async fn test_49_transient_failures_then_success() {
        let mut package = sample_package(vec![1u8; 300]);
        let destination = RecordingBlobDestination::new();
        destination.fail_block(BlockId(1), 49, 403);

        fast(100).upload(&mut package, &destination).await.unwrap();

        assert_eq!(destination.attempts(BlockId(1)), 50);
        assert_eq!(destination.committed_content(), vec![1u8; 300]);
    }

    #[tokio::test]
    async fn test_50_transient_failures_still_succeed() {
        let mut package = sample_package(vec![2u8; 50]);
        let destination = RecordingBlobDestination::new();
        destination.fail_block(BlockId(0), 50, 307);

        fast(100).upload(&mut package, &destination).await.unwrap();
        assert_eq!(destination.attempts(BlockId(0)), 51);
    }

    #[tokio::test]
    async fn test_51_transient_failures_fail_upload() {
        let mut package = sample_package(vec![3u8; 250]);
        let destination = RecordingBlobDestination::new();
        destination.fail_block(BlockId(2), 51, 400);

        let result = fast(100).upload(&mut package, &destination).await;

        assert!(matches!(
            result,
            Err(PublishError::UploadFailed { ref block_id, attempts: 51, .. }) if block_id == "0002"
        ));
        assert_eq!(destination.attempts(BlockId(2)), 51);
        assert_eq!(destination.committed(), None);
    }

    #[tokio::test]
    async fn test_fatal_status_aborts_without_retry() {
        let mut package = sample_package(vec![4u8; 250]);
        let destination = RecordingBlobDestination::new();
        destination.fail_block(BlockId(1), 1, 500);

        let result = fast(100).upload(&mut package, &destination).await;

        assert!(matches!(
            result,
            Err(PublishError::Blob(BlobError::Status { status: 500, .. }))
        ));
        assert_eq!(destination.attempts(BlockId(1)), 1);
        assert_eq!(destination.attempts(BlockId(2)), 0);
        assert_eq!(destination.committed(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_waits_fixed_delay() {
        let mut package = sample_package(vec![5u8; 10]);
        let destination = RecordingBlobDestination::new();
        destination.fail_block(BlockId(0), 3, 403);

        let start = tokio::time::Instant::now();
        ContentUploader::default()
            .upload(&mut package, &destination)
            .await
            .unwrap();

        assert!(start.elapsed() >= DEFAULT_RETRY_DELAY * 3);
    }

    #[tokio::test]
    async fn test_stream_rewound_before_upload() {
        let mut package = sample_package(vec![6u8; 120]);
        let mut sink = Vec::new();
        package.reader().unwrap().read_to_end(&mut sink).unwrap();

        let destination = RecordingBlobDestination::new();
        fast(64).upload(&mut package, &destination).await.unwrap();

        assert_eq!(destination.committed_content(), vec![6u8; 120]);
    }
}
