//! Control-stream compiler.
//!
//! Three stages, run in order by [`compile`]:
//! 1. **generate**: tiled walk of the output, one [`WorkRecord`] per 64 tiles
//! 2. **interleave**: reorder records across worker groups
//! 3. **encode**: bit-plane transpose into 64-word blocks
//!
//! The result is a [`ControlBuffer`] the kernel streams through instead of
//! computing loop bounds and boundary conditions per lane.

pub mod encode;
pub mod generate;
pub mod interleave;
pub mod record;
pub mod wire;

pub use encode::{decode_block, encode, encode_record, Block, BLOCK_WORDS};
pub use generate::{generate, TileOrigin, TileStep, TileWalk};
pub use interleave::{interleave, interleave_order};
pub use record::WorkRecord;
pub use wire::ControlBuffer;

use crate::error::{Error, Result};
use crate::problem::Geometry;

/// Lanes (parallel workers) sharing one work record.
pub const LANES: usize = 64;

pub const OUT_TILE_W: u32 = 2;
pub const OUT_TILE_H: u32 = 2;
pub const IN_TILE_W: u32 = 4;
pub const IN_TILE_H: u32 = 4;

/// How records are spread over the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// Worker groups the kernel is launched with.
    pub groups: u32,
    /// Stride used to spread neighbouring records across groups.
    pub interleave: u32,
}

impl Schedule {
    pub fn new(groups: u32, interleave: u32) -> Self {
        Schedule { groups, interleave }
    }

    pub fn validate(&self) -> Result<()> {
        if self.groups == 0 || self.interleave == 0 {
            return Err(Error::InvalidSchedule {
                groups: self.groups,
                interleave: self.interleave,
            });
        }
        Ok(())
    }
}

/// Compile one convolution's control stream.
///
/// Pure and deterministic: equal inputs give byte-identical buffers.
pub fn compile(geometry: &Geometry, schedule: Schedule) -> Result<ControlBuffer> {
    schedule.validate()?;

    let records = generate(geometry)?;
    log::debug!(
        "generated {} records for {} tiles ({}x{}x{} output, pad {}x{})",
        records.len(),
        geometry.tile_count(),
        geometry.n,
        geometry.out_h,
        geometry.out_w,
        geometry.pad_h,
        geometry.pad_w
    );

    let records = interleave(records, schedule.groups, schedule.interleave)?;
    let buffer = encode(&records);
    log::debug!(
        "encoded {} words ({} groups, interleave {})",
        buffer.words().len(),
        schedule.groups,
        schedule.interleave
    );
    Ok(buffer)
}
