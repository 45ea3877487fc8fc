//! The compiled control buffer and its device image (all little-endian).

use crate::error::{Error, Result};

use super::encode::{decode_block, Block, BLOCK_WORDS};
use super::record::WorkRecord;

/// Bytes per record block on the device.
pub const BLOCK_BYTES: usize = BLOCK_WORDS * 4;

#[inline]
pub fn read_u32_le(buf: &[u8], offset: usize) -> Option<u32> {
    let b = buf.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

#[inline]
pub fn write_u32_le(buf: &mut Vec<u8>, val: u32) {
    buf.extend_from_slice(&val.to_le_bytes());
}

/// Flat sequence of 32-bit words, 64 per record. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ControlBuffer {
    words: Vec<u32>,
}

impl ControlBuffer {
    pub(crate) fn from_words(words: Vec<u32>) -> Self {
        debug_assert_eq!(words.len() % BLOCK_WORDS, 0);
        ControlBuffer { words }
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn record_count(&self) -> usize {
        self.words.len() / BLOCK_WORDS
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> + '_ {
        self.words
            .chunks_exact(BLOCK_WORDS)
            .filter_map(|chunk| <&Block>::try_from(chunk).ok())
    }

    /// Decode every block back into its record, in buffer order.
    pub fn decode(&self) -> Vec<WorkRecord> {
        self.blocks().map(decode_block).collect()
    }

    /// Device image: each word little-endian, blocks back to back.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.words.len() * 4);
        for &word in &self.words {
            write_u32_le(&mut buf, word);
        }
        buf
    }

    pub fn from_le_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() % BLOCK_BYTES != 0 {
            return Err(Error::Truncated { len: bytes.len() });
        }
        let words = (0..bytes.len())
            .step_by(4)
            .filter_map(|offset| read_u32_le(bytes, offset))
            .collect();
        Ok(ControlBuffer { words })
    }
}
