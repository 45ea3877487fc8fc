//! Work record: one outer step of the tiled walk, covering 64 lanes.
//!
//! Every per-lane bitmask follows the kernel's ordering: lane 0 sits in the
//! most significant bit. Clip masks pack several lanes per word:
//!
//! - input clip word `[g][row]`: lanes `16g..16g+16`, 4 column bits each
//! - output clip word `[g][row]`: lanes `32g..32g+32`, 2 column bits each

use super::{IN_TILE_H, IN_TILE_W, LANES, OUT_TILE_H, OUT_TILE_W};

/// Number of 64-bit words needed per tile row to hold every lane's input cells.
pub const INPUT_CLIP_GROUPS: usize = LANES * IN_TILE_W as usize / u64::BITS as usize;
/// Number of 64-bit words needed per tile row to hold every lane's output cells.
pub const OUTPUT_CLIP_GROUPS: usize = LANES * OUT_TILE_W as usize / u64::BITS as usize;

const INPUT_LANES_PER_WORD: usize = LANES / INPUT_CLIP_GROUPS;
const OUTPUT_LANES_PER_WORD: usize = LANES / OUTPUT_CLIP_GROUPS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkRecord {
    /// Generation index, kept through interleaving.
    pub tag: u32,
    /// Byte offset of lane 0's input tile origin.
    pub load_offset: i64,
    /// Byte offset of lane 0's output tile origin.
    pub store_offset: i64,
    /// Lanes whose step wrapped to the next tile row.
    pub row_wrap: u64,
    /// Lanes whose step wrapped to the next batch element.
    pub batch_wrap: u64,
    pub input_clip: [[u64; IN_TILE_H as usize]; INPUT_CLIP_GROUPS],
    pub output_clip: [[u64; OUT_TILE_H as usize]; OUTPUT_CLIP_GROUPS],
}

#[inline]
fn lane_bit(lane: usize) -> u64 {
    1u64 << (LANES - 1 - lane)
}

#[inline]
fn input_cell(lane: usize, col: usize) -> (usize, u64) {
    let group = lane / INPUT_LANES_PER_WORD;
    let pos = (lane % INPUT_LANES_PER_WORD) * IN_TILE_W as usize + col;
    (group, 1u64 << (63 - pos))
}

#[inline]
fn output_cell(lane: usize, col: usize) -> (usize, u64) {
    let group = lane / OUTPUT_LANES_PER_WORD;
    let pos = (lane % OUTPUT_LANES_PER_WORD) * OUT_TILE_W as usize + col;
    (group, 1u64 << (63 - pos))
}

impl WorkRecord {
    pub fn set_row_wrap(&mut self, lane: usize) {
        self.row_wrap |= lane_bit(lane);
    }

    pub fn set_batch_wrap(&mut self, lane: usize) {
        self.batch_wrap |= lane_bit(lane);
    }

    pub fn row_wrapped(&self, lane: usize) -> bool {
        self.row_wrap & lane_bit(lane) != 0
    }

    pub fn batch_wrapped(&self, lane: usize) -> bool {
        self.batch_wrap & lane_bit(lane) != 0
    }

    pub fn clip_input(&mut self, lane: usize, col: usize, row: usize) {
        let (group, bit) = input_cell(lane, col);
        self.input_clip[group][row] |= bit;
    }

    pub fn clip_output(&mut self, lane: usize, col: usize, row: usize) {
        let (group, bit) = output_cell(lane, col);
        self.output_clip[group][row] |= bit;
    }

    pub fn input_clipped(&self, lane: usize, col: usize, row: usize) -> bool {
        let (group, bit) = input_cell(lane, col);
        self.input_clip[group][row] & bit != 0
    }

    pub fn output_clipped(&self, lane: usize, col: usize, row: usize) -> bool {
        let (group, bit) = output_cell(lane, col);
        self.output_clip[group][row] & bit != 0
    }

    /// A lane is active when its tile origin lies inside the output tensor.
    /// The origin cell of a real tile is never clipped, so it decides.
    pub fn is_active(&self, lane: usize) -> bool {
        !self.output_clipped(lane, 0, 0)
    }

    pub fn active_lanes(&self) -> usize {
        (0..LANES).filter(|&lane| self.is_active(lane)).count()
    }

    /// Total clipped input and output cells across all lanes.
    pub fn clipped_cells(&self) -> (u32, u32) {
        let input = self.input_clip.iter().flatten().map(|w| w.count_ones()).sum();
        let output = self.output_clip.iter().flatten().map(|w| w.count_ones()).sum();
        (input, output)
    }
}
