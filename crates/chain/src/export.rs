//! Bulk export of the main chain.
//!
//! Two consumers share the framed codec: a secondary store fed in chunked
//! transactions (rows `(number, payload)`), and flat dump files that
//! [`crate::BlockImporter::import_file`] can replay.

use crate::{error::SourceError, ChainReader, ExportError, StoreError};
use alloy_primitives::Bytes;
use lode_protocol::{Block, CodecError, FramedWriter};
use std::{fmt::Debug, fs::File, io::BufWriter, path::Path};

/// A secondary store receiving exported block rows.
///
/// Each [`ExportSink::write_chunk`] call must be atomic: either every row of
/// the chunk lands or none does. There is no ordering guarantee between
/// chunks.
pub trait ExportSink: Send + Sync + Debug {
    /// The highest block number already recorded, or `None` when empty.
    fn last_number(&self) -> Result<Option<u64>, SourceError>;

    /// Writes one chunk of `(number, payload)` rows in a single transaction.
    fn write_chunk(&self, rows: &[(u64, Bytes)]) -> Result<(), SourceError>;
}

/// Streams main-chain blocks into the sink, peak first, descending.
///
/// Resumes from the sink's highest recorded number: blocks at or below it
/// are not re-exported. Returns the number of rows written.
pub fn export_blocks(
    reader: &ChainReader,
    sink: &dyn ExportSink,
    chunk_size: usize,
) -> Result<u64, ExportError> {
    let resume_above = sink.last_number().map_err(ExportError::Sink)?;
    let mut chunk: Vec<(u64, Bytes)> = Vec::with_capacity(chunk_size);
    let mut written = 0u64;

    for block in reader.blocks() {
        let block = block?;
        if resume_above.is_some_and(|recorded| block.number() <= recorded) {
            break;
        }
        chunk.push((block.number(), block.export()));
        if chunk.len() == chunk_size {
            sink.write_chunk(&chunk).map_err(ExportError::Sink)?;
            written += chunk.len() as u64;
            chunk.clear();
        }
    }
    if !chunk.is_empty() {
        sink.write_chunk(&chunk).map_err(ExportError::Sink)?;
        written += chunk.len() as u64;
    }

    info!(target: "export", written, "Exported main-chain blocks");
    Ok(written)
}

/// Dumps the entire main chain to a framed file, genesis first.
///
/// The ascending order makes the file directly replayable by
/// [`crate::BlockImporter::import_file`]. Returns the number of blocks
/// written.
pub fn write_chain_file(reader: &ChainReader, path: impl AsRef<Path>) -> Result<u64, ExportError> {
    let path = path.as_ref();
    let mut writer =
        FramedWriter::new(BufWriter::new(File::create(path).map_err(CodecError::from)?));

    let peak_number = reader.peak().number();
    let mut written = 0u64;
    for number in 0..=peak_number {
        let block = reader
            .block(number)?
            .ok_or_else(|| StoreError::EntryNotFound(format!("main block {number}")))?;
        writer.write_block(&block)?;
        written += 1;
    }
    writer.finish()?;

    info!(target: "export", path = %path.display(), written, "Wrote chain dump");
    Ok(written)
}

/// Reads every block from a framed dump file, in file order.
pub fn restore_chain_file(path: impl AsRef<Path>) -> Result<Vec<Block>, CodecError> {
    let reader = lode_protocol::FramedReader::new(std::io::BufReader::new(File::open(path)?));
    reader.collect()
}
