//! Property-based tests for iwp-publish.
//!
//! - Uploaded blocks are full-size except the last, numbered from zero, and
//!   concatenate to the encrypted stream.
//! - Any block failing transiently fewer than 51 times is still uploaded.

#![cfg(test)]

use std::time::Duration;

use proptest::prelude::*;

use crate::blob::BlockId;
use crate::testing::{sample_package, RecordingBlobDestination};
use crate::upload::{ContentUploader, UploadConfig, DEFAULT_MAX_RETRIES};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn uploader(chunk_size: usize) -> ContentUploader {
    ContentUploader::new(UploadConfig {
        chunk_size,
        max_retries: DEFAULT_MAX_RETRIES,
        retry_delay: Duration::ZERO,
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_chunking(data in prop::collection::vec(any::<u8>(), 0..4096), chunk_size in 1usize..512) {
        let destination = RecordingBlobDestination::new();
        let mut package = sample_package(data.clone());

        let ids = runtime()
            .block_on(uploader(chunk_size).upload(&mut package, &destination))
            .unwrap();

        let expected_blocks = data.len().div_ceil(chunk_size);
        prop_assert_eq!(ids.len(), expected_blocks);
        let expected_ids: Vec<BlockId> = (0..expected_blocks as u32).map(BlockId).collect();
        prop_assert_eq!(&ids, &expected_ids);

        let blocks = destination.blocks();
        for (i, (id, block)) in blocks.iter().enumerate() {
            prop_assert_eq!(*id, BlockId(i as u32));
            if i + 1 < blocks.len() {
                prop_assert_eq!(block.len(), chunk_size);
            } else {
                prop_assert!(!block.is_empty() && block.len() <= chunk_size);
            }
        }
        prop_assert_eq!(destination.committed_content(), data);
    }

    #[test]
    fn prop_transient_failures_below_limit_recover(
        blocks in 1u32..6,
        failing in 0u32..6,
        failures in 0u32..=DEFAULT_MAX_RETRIES,
        status in prop_oneof![Just(307u16), Just(400u16), Just(403u16)],
    ) {
        let data = vec![7u8; (blocks * 16) as usize];
        let failing = BlockId(failing % blocks);
        let destination = RecordingBlobDestination::new();
        destination.fail_block(failing, failures, status);
        let mut package = sample_package(data.clone());

        runtime()
            .block_on(uploader(16).upload(&mut package, &destination))
            .unwrap();

        prop_assert_eq!(destination.attempts(failing), failures + 1);
        prop_assert_eq!(destination.committed_content(), data);
    }
}
