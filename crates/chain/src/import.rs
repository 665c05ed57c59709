//! Streaming replay of externally supplied block ranges.

use crate::{
    BlockMru, BlockValidator, ChainError, ChainHandle, ChainReader, ImportError, SyncCoordinator,
};
use derive_more::Constructor;
use lode_protocol::Block;
use std::{fs::File, io::BufReader, path::Path, sync::Arc};

/// Replays ordered block sequences — from a peer or a dump file — into the
/// chain through the actor.
///
/// Known blocks are skipped, unknown ones are validated against their
/// predecessor and submitted synchronously with relaying disabled. A
/// validation failure halts the run; blocks already installed stay
/// installed.
#[derive(Constructor, Debug)]
pub struct BlockImporter {
    /// Handle used for synchronous block submission.
    handle: ChainHandle,
    /// Read path for known-block checks and parent binding.
    reader: ChainReader,
    /// The external validator.
    validator: Arc<dyn BlockValidator>,
    /// Coordinator whose slot the importer claims for the run.
    sync: Arc<SyncCoordinator>,
    /// Capacity of the per-run block cache.
    task_cache_capacity: usize,
}

impl BlockImporter {
    /// Imports an ordered sequence of blocks.
    ///
    /// Returns the final block of the run: the last block submitted, or the
    /// last known block when the whole source was already installed. Claims
    /// the active-sync slot for the duration when it is free, and releases
    /// it afterwards either way.
    pub async fn import_blocks<I>(&self, source: I) -> Result<Arc<Block>, ImportError>
    where
        I: IntoIterator<Item = Block>,
    {
        let lease = self.sync.acquire();
        let result = self.run(source).await;
        if let Some(lease) = lease {
            self.sync.finish(lease);
        }
        result
    }

    /// Imports the framed block dump at `path`.
    pub async fn import_file(&self, path: impl AsRef<Path>) -> Result<Arc<Block>, ImportError> {
        let path = path.as_ref();
        info!(target: "import", path = %path.display(), "Importing block dump");
        let reader = lode_protocol::FramedReader::new(BufReader::new(
            File::open(path).map_err(lode_protocol::CodecError::from)?,
        ));
        let blocks = reader.collect::<Result<Vec<_>, _>>()?;
        self.import_blocks(blocks).await
    }

    async fn run<I>(&self, source: I) -> Result<Arc<Block>, ImportError>
    where
        I: IntoIterator<Item = Block>,
    {
        let mut mru = BlockMru::new(self.task_cache_capacity);
        let mut prev: Option<Arc<Block>> = None;
        let mut last: Option<Arc<Block>> = None;
        let mut installed = 0u64;
        let mut skipped = 0u64;

        for block in source {
            let hash = block.hash();
            if self.reader.is_block_known(&hash).map_err(ChainError::from)? {
                // Adopt the stored instance so validation of the next block
                // sees canonical data, not whatever the source carried.
                let stored = self
                    .reader
                    .block_by_hash_cached(&mut mru, &hash)
                    .map_err(ChainError::from)?
                    .ok_or_else(|| {
                        ChainError::from(crate::StoreError::EntryNotFound(hash.to_string()))
                    })?;
                prev = Some(Arc::clone(&stored));
                last = Some(stored);
                skipped += 1;
                continue;
            }

            // First unknown block: bind its parent through the read path.
            if prev.is_none() {
                prev = self
                    .reader
                    .block_by_hash_cached(&mut mru, &block.parent_hash())
                    .map_err(ChainError::from)?;
            }

            let number = block.number();
            let verified = self.validator.validate(block, prev.as_deref()).map_err(|err| {
                warn!(target: "import", %err, number, "Validation failed, halting import");
                err
            })?;

            self.handle.add_block(verified.clone(), false).await?;
            installed += 1;
            #[cfg(feature = "metrics")]
            metrics::counter!(crate::metrics::CHAIN_IMPORTED_BLOCKS).increment(1);

            let verified = Arc::new(verified);
            mru.put(Arc::clone(&verified));
            prev = Some(Arc::clone(&verified));
            last = Some(verified);
        }

        let last = last.ok_or(ImportError::EmptySource)?;
        info!(
            target: "import",
            installed,
            skipped,
            final_hash = %last.hash(),
            final_number = last.number(),
            "Import finished"
        );
        Ok(last)
    }
}
