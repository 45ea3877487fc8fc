//! Bit-plane encoding of work records.
//!
//! A record is laid out as 32 fields of 64 bits and transposed into 64
//! words of 32 bits: word `k` gathers bit `k` of every field, field slot
//! `j` landing on bit `31 - j`. Scalars keep their bit order; lane masks are
//! reversed so that lane 0 (the mask MSB) lands on word 0.
//!
//! The slot assignment below is the kernel's wire contract. Do not renumber.

use super::record::{WorkRecord, INPUT_CLIP_GROUPS, OUTPUT_CLIP_GROUPS};
use super::wire::ControlBuffer;
use super::{IN_TILE_H, LANES, OUT_TILE_H};

/// Fields per record block.
pub const SLOTS: usize = 32;
/// Words per record block, one per lane.
pub const BLOCK_WORDS: usize = LANES;

pub type Block = [u32; BLOCK_WORDS];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    LoadOffset,
    StoreOffset,
    RowWrap,
    BatchWrap,
    InputClip { group: usize, row: usize },
    OutputClip { group: usize, row: usize },
    Tag,
    Reserved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOrder {
    /// Field bit `k` goes to word `k`.
    Preserved,
    /// Field bit `k` goes to word `63 - k`.
    Reversed,
}

use BitOrder::{Preserved, Reversed};
use Field::*;

const fn input(group: usize, row: usize) -> (Field, BitOrder) {
    (InputClip { group, row }, Reversed)
}

const fn output(group: usize, row: usize) -> (Field, BitOrder) {
    (OutputClip { group, row }, Reversed)
}

/// Slot `j` of every block.
pub static FIELD_TABLE: [(Field, BitOrder); SLOTS] = [
    (LoadOffset, Preserved),
    (StoreOffset, Preserved),
    (RowWrap, Reversed),
    (BatchWrap, Reversed),
    input(0, 0),
    input(0, 1),
    input(0, 2),
    input(0, 3),
    input(1, 0),
    input(1, 1),
    input(1, 2),
    input(1, 3),
    input(2, 0),
    input(2, 1),
    input(2, 2),
    input(2, 3),
    input(3, 0),
    input(3, 1),
    input(3, 2),
    input(3, 3),
    output(0, 0),
    output(0, 1),
    output(1, 0),
    output(1, 1),
    (Tag, Preserved),
    (Reserved, Preserved),
    (Reserved, Preserved),
    (Reserved, Preserved),
    (Reserved, Preserved),
    (Reserved, Preserved),
    (Reserved, Preserved),
    (Reserved, Preserved),
];

// every clip word must have a slot
const _: () = assert!(
    4 + INPUT_CLIP_GROUPS * IN_TILE_H as usize + OUTPUT_CLIP_GROUPS * OUT_TILE_H as usize + 1
        <= SLOTS
);

impl Field {
    pub fn read(self, record: &WorkRecord) -> u64 {
        match self {
            LoadOffset => record.load_offset as u64,
            StoreOffset => record.store_offset as u64,
            RowWrap => record.row_wrap,
            BatchWrap => record.batch_wrap,
            InputClip { group, row } => record.input_clip[group][row],
            OutputClip { group, row } => record.output_clip[group][row],
            Tag => record.tag as u64,
            Reserved => 0,
        }
    }

    pub fn write(self, record: &mut WorkRecord, value: u64) {
        match self {
            LoadOffset => record.load_offset = value as i64,
            StoreOffset => record.store_offset = value as i64,
            RowWrap => record.row_wrap = value,
            BatchWrap => record.batch_wrap = value,
            InputClip { group, row } => record.input_clip[group][row] = value,
            OutputClip { group, row } => record.output_clip[group][row] = value,
            Tag => record.tag = value as u32,
            Reserved => {}
        }
    }
}

#[inline]
fn word_index(order: BitOrder, bit: usize) -> usize {
    match order {
        Preserved => bit,
        Reversed => BLOCK_WORDS - 1 - bit,
    }
}

/// Transpose one record into its 64-word block.
pub fn encode_record(record: &WorkRecord) -> Block {
    let mut block = [0u32; BLOCK_WORDS];
    for (slot, &(field, order)) in FIELD_TABLE.iter().enumerate() {
        let value = field.read(record);
        let plane = 31 - slot as u32;
        for bit in 0..BLOCK_WORDS {
            let b = ((value >> bit) & 1) as u32;
            block[word_index(order, bit)] |= b << plane;
        }
    }
    block
}

/// Inverse of [`encode_record`]. Reserved slots are ignored.
pub fn decode_block(block: &Block) -> WorkRecord {
    let mut record = WorkRecord::default();
    for (slot, &(field, order)) in FIELD_TABLE.iter().enumerate() {
        let plane = 31 - slot as u32;
        let mut value = 0u64;
        for bit in 0..BLOCK_WORDS {
            let b = (block[word_index(order, bit)] >> plane) & 1;
            value |= (b as u64) << bit;
        }
        field.write(&mut record, value);
    }
    record
}

/// Encode records in sequence order into a control buffer.
pub fn encode(records: &[WorkRecord]) -> ControlBuffer {
    let mut words = Vec::with_capacity(records.len() * BLOCK_WORDS);
    for record in records {
        words.extend_from_slice(&encode_record(record));
    }
    ControlBuffer::from_words(words)
}
