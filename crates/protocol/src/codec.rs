//! Framed block records for bulk export and replay.
//!
//! The on-disk format is a plain sequence of records, each a big-endian
//! `u32` length followed by that many bytes of RLP-encoded block. There is
//! no trailer; end of input ends the stream.

use crate::Block;
use std::io::{self, Read, Write};
use thiserror::Error;

/// Records larger than this are treated as corruption rather than allocated.
const MAX_RECORD_LEN: u32 = 64 * 1024 * 1024;

/// Errors produced while reading or writing framed block records.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Underlying I/O failure.
    #[error("framed record i/o failed")]
    Io(#[from] io::Error),

    /// A record declared an implausible length.
    #[error("framed record length {0} exceeds the {MAX_RECORD_LEN} byte limit")]
    OversizedRecord(u32),

    /// The record payload was not a valid block encoding.
    #[error("framed record payload is not a valid block: {0}")]
    Decode(#[from] alloy_rlp::Error),
}

/// Writes `{u32 size, payload}` block records to an [`io::Write`] sink.
#[derive(Debug)]
pub struct FramedWriter<W> {
    inner: W,
}

impl<W: Write> FramedWriter<W> {
    /// Wraps the given sink.
    pub const fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Appends one block record.
    pub fn write_block(&mut self, block: &Block) -> Result<(), CodecError> {
        let payload = block.export();
        self.inner.write_all(&(payload.len() as u32).to_be_bytes())?;
        self.inner.write_all(&payload)?;
        Ok(())
    }

    /// Flushes and returns the underlying sink.
    pub fn finish(mut self) -> Result<W, CodecError> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Reads `{u32 size, payload}` block records from an [`io::Read`] source.
///
/// Iteration yields blocks in the order they appear in the stream and stops
/// at end of input. The stream is forward-only; create a new reader for a
/// second pass.
#[derive(Debug)]
pub struct FramedReader<R> {
    inner: R,
}

impl<R: Read> FramedReader<R> {
    /// Wraps the given source.
    pub const fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Reads the next record, or `None` at end of input.
    pub fn read_block(&mut self) -> Result<Option<Block>, CodecError> {
        let mut len_buf = [0u8; 4];
        match self.inner.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(err) => return Err(err.into()),
        }
        let len = u32::from_be_bytes(len_buf);
        if len > MAX_RECORD_LEN {
            return Err(CodecError::OversizedRecord(len));
        }
        let mut payload = vec![0u8; len as usize];
        self.inner.read_exact(&mut payload)?;
        Ok(Some(Block::from_export(&payload)?))
    }
}

impl<R: Read> Iterator for FramedReader<R> {
    type Item = Result<Block, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_block().transpose()
    }
}
