//! Tile iteration: walks the output tensor in 2x2 tiles and packs 64
//! consecutive tiles into each work record.
//!
//! Lane `l` of record `r` processes tile `64 * r + l` in raster order
//! (batch, row, column). The walk stops at a record boundary once the
//! cursor leaves the batch; lanes past the last tile keep stepping, so
//! they come out fully clipped but still report the wraps they cross.

use crate::error::{Error, Result};
use crate::problem::Geometry;

use super::record::WorkRecord;
use super::{IN_TILE_H, IN_TILE_W, LANES, OUT_TILE_H, OUT_TILE_W};

/// Output tile origin. Signed so input coordinates can go negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileOrigin {
    pub batch: i64,
    pub row: i64,
    pub col: i64,
}

/// One tile visited by the walk, with the wraps taken while leaving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileStep {
    pub origin: TileOrigin,
    pub load_offset: i64,
    pub store_offset: i64,
    pub row_wrap: bool,
    pub batch_wrap: bool,
}

/// Raster-order cursor over output tiles. Never ends on its own: past the
/// last batch element it keeps producing out-of-range tiles.
pub struct TileWalk<'a> {
    geometry: &'a Geometry,
    cursor: TileOrigin,
}

impl<'a> TileWalk<'a> {
    pub fn new(geometry: &'a Geometry) -> Self {
        TileWalk {
            geometry,
            cursor: TileOrigin::default(),
        }
    }

    /// True once the cursor has left the output volume.
    pub fn exhausted(&self) -> bool {
        let g = self.geometry;
        !(self.cursor.col < g.out_w as i64
            && self.cursor.row < g.out_h as i64
            && self.cursor.batch < g.n as i64)
    }

    /// Input tile origin for an output tile origin.
    pub fn input_origin(&self, origin: TileOrigin) -> TileOrigin {
        TileOrigin {
            batch: origin.batch,
            row: origin.row - self.geometry.pad_h as i64,
            col: origin.col - self.geometry.pad_w as i64,
        }
    }

    pub fn next_step(&mut self) -> TileStep {
        let g = self.geometry;
        let origin = self.cursor;
        let input = self.input_origin(origin);

        let mut row_wrap = false;
        let mut batch_wrap = false;
        self.cursor.col += OUT_TILE_W as i64;
        if self.cursor.col >= g.out_w as i64 {
            row_wrap = true;
            self.cursor.col = 0;
            self.cursor.row += OUT_TILE_H as i64;
        }
        if self.cursor.row >= g.out_h as i64 {
            batch_wrap = true;
            self.cursor.row = 0;
            self.cursor.batch += 1;
        }

        TileStep {
            origin,
            load_offset: g.input.offset(input.batch, input.row, input.col),
            store_offset: g.output.offset(origin.batch, origin.row, origin.col),
            row_wrap,
            batch_wrap,
        }
    }
}

impl Iterator for TileWalk<'_> {
    type Item = TileStep;

    fn next(&mut self) -> Option<TileStep> {
        Some(self.next_step())
    }
}

/// Mark every cell of the lane's input and output tiles that falls outside
/// its tensor. Out-of-batch lanes are clipped entirely.
fn clip_lane(record: &mut WorkRecord, lane: usize, walk: &TileWalk, origin: TileOrigin) {
    let g = walk.geometry;
    let batch_out = origin.batch < 0 || origin.batch >= g.n as i64;
    let input = walk.input_origin(origin);

    for col in 0..IN_TILE_W as usize {
        for row in 0..IN_TILE_H as usize {
            let x = input.col + col as i64;
            let y = input.row + row as i64;
            if batch_out || x < 0 || x >= g.w as i64 || y < 0 || y >= g.h as i64 {
                record.clip_input(lane, col, row);
            }
        }
    }
    for col in 0..OUT_TILE_W as usize {
        for row in 0..OUT_TILE_H as usize {
            let x = origin.col + col as i64;
            let y = origin.row + row as i64;
            if batch_out || x >= g.out_w as i64 || y >= g.out_h as i64 {
                record.clip_output(lane, col, row);
            }
        }
    }
}

/// Generate the work records for one convolution, in walk order.
pub fn generate(geometry: &Geometry) -> Result<Vec<WorkRecord>> {
    let mut walk = TileWalk::new(geometry);
    let mut records = Vec::with_capacity(geometry.tile_count().div_ceil(LANES as u64) as usize);

    while !walk.exhausted() {
        let tag = u32::try_from(records.len()).map_err(|_| Error::TagOverflow {
            records: records.len() + 1,
        })?;
        let mut record = WorkRecord {
            tag,
            ..Default::default()
        };

        for lane in 0..LANES {
            let step = walk.next_step();
            if lane == 0 {
                record.load_offset = step.load_offset;
                record.store_offset = step.store_offset;
            }
            clip_lane(&mut record, lane, &walk, step.origin);
            if step.row_wrap {
                record.set_row_wrap(lane);
            }
            if step.batch_wrap {
                record.set_batch_wrap(lane);
            }
        }

        log::trace!(
            "record {}: load {} store {} active lanes {}",
            record.tag,
            record.load_offset,
            record.store_offset,
            record.active_lanes()
        );
        records.push(record);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{AxisStrides, BufferLayout};
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn geometry(n: u32, h: u32, w: u32, out_h: u32, out_w: u32, pad: u32) -> Geometry {
        Geometry {
            n,
            h,
            w,
            out_h,
            out_w,
            pad_h: pad,
            pad_w: pad,
            input: BufferLayout::nchw(1, h, w, 2).axis_strides(),
            output: BufferLayout::nchw(1, out_h, out_w, 2).axis_strides(),
        }
    }

    /// Raster position of global tile `t`, derived independently of the walk.
    fn tile_origin(g: &Geometry, t: u64) -> (i64, i64, i64) {
        let per_row = g.out_w.div_ceil(OUT_TILE_W) as u64;
        let per_image = g.tiles_per_image();
        let batch = t / per_image;
        let rem = t % per_image;
        (
            batch as i64,
            (rem / per_row) as i64 * OUT_TILE_H as i64,
            (rem % per_row) as i64 * OUT_TILE_W as i64,
        )
    }

    #[test]
    fn eight_by_eight_fits_one_record() {
        // 16 tiles, one record of 64 lanes
        let g = geometry(1, 8, 8, 8, 8, 1);
        let records = generate(&g).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].active_lanes(), 16);
    }

    #[test]
    fn record_count_is_tiles_over_lanes() {
        // 3 * 10 * 13 tiles = 390 -> 7 records
        let g = geometry(3, 20, 26, 20, 26, 0);
        assert_eq!(g.tile_count(), 390);
        let records = generate(&g).unwrap();
        assert_eq!(records.len(), 7);
        let tags: Vec<u32> = records.iter().map(|r| r.tag).collect();
        assert_eq!(tags, (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn empty_output_yields_no_records() {
        assert!(generate(&geometry(1, 4, 4, 0, 4, 0)).unwrap().is_empty());
        assert!(generate(&geometry(0, 4, 4, 4, 4, 0)).unwrap().is_empty());
    }

    #[test]
    fn six_by_six_pad_one_offsets() {
        // fp16 NCHW single channel: input w/h strides 2/12, output 2/8
        let g = geometry(1, 6, 6, 4, 4, 1);
        let steps: Vec<TileStep> = TileWalk::new(&g).take(4).collect();

        let stores: Vec<i64> = steps.iter().map(|s| s.store_offset).collect();
        assert_eq!(stores, vec![0, 2 * 2, 2 * 8, 2 * 8 + 2 * 2]);
        assert!(!steps[0].row_wrap);
        assert!(steps[1].row_wrap);
        assert!(steps[3].batch_wrap);

        // input origin (-1, -1)
        assert_eq!(steps[0].load_offset, -2 - 12);

        let record = &generate(&g).unwrap()[0];
        assert_eq!(record.store_offset, 0);
        assert_eq!(record.load_offset, -14);
        assert!(record.row_wrapped(1));
        assert!(record.row_wrapped(3) && record.batch_wrapped(3));
        assert_eq!(record.active_lanes(), 4);
    }

    #[test]
    fn six_by_six_pad_one_input_clips() {
        let g = geometry(1, 6, 6, 4, 4, 1);
        let record = &generate(&g).unwrap()[0];

        for lane in 0..4 {
            let (_, row, col) = tile_origin(&g, lane as u64);
            for c in 0..4 {
                for r in 0..4 {
                    let x = col - 1 + c as i64;
                    let y = row - 1 + r as i64;
                    let outside = !(0..6).contains(&x) || !(0..6).contains(&y);
                    assert_eq!(record.input_clipped(lane, c, r), outside, "lane {lane} ({c},{r})");
                }
            }
        }
        // lane 3 sits fully inside the input
        assert!((0..4).all(|c| (0..4).all(|r| !record.input_clipped(3, c, r))));
        // 4x4 output has no partial tiles
        for lane in 0..4 {
            assert!((0..2).all(|c| (0..2).all(|r| !record.output_clipped(lane, c, r))));
        }
    }

    #[test]
    fn padding_lanes_fully_clipped() {
        let g = geometry(1, 6, 6, 4, 4, 1);
        let record = &generate(&g).unwrap()[0];
        for lane in 4..LANES {
            assert!((0..4).all(|c| (0..4).all(|r| record.input_clipped(lane, c, r))));
            assert!((0..2).all(|c| (0..2).all(|r| record.output_clipped(lane, c, r))));
        }
    }

    #[test]
    fn padding_lanes_still_record_wraps() {
        // Lanes past the last tile keep walking a phantom batch. Their wrap
        // bits are kept as the kernel has always seen them.
        let g = geometry(1, 4, 4, 4, 4, 0);
        let record = &generate(&g).unwrap()[0];
        // 2 tiles per row, 4 per image: every odd lane wraps a row,
        // every fourth lane wraps the batch.
        for lane in 0..LANES {
            assert_eq!(record.row_wrapped(lane), lane % 2 == 1, "lane {lane}");
            assert_eq!(record.batch_wrapped(lane), lane % 4 == 3, "lane {lane}");
        }
    }

    #[test]
    fn odd_output_clips_partial_tiles() {
        let g = geometry(1, 5, 5, 3, 3, 1);
        let record = &generate(&g).unwrap()[0];
        // lane 1 covers columns 2..4 of a 3-wide output
        assert!(!record.output_clipped(1, 0, 0));
        assert!(record.output_clipped(1, 1, 0));
        // lane 2 covers rows 2..4
        assert!(!record.output_clipped(2, 0, 0));
        assert!(record.output_clipped(2, 0, 1));
        assert!(record.output_clipped(3, 1, 1));
    }

    #[test]
    fn zero_strides_still_walk() {
        let mut g = geometry(2, 4, 4, 4, 4, 0);
        g.input = AxisStrides::default();
        g.output = AxisStrides::default();
        let records = generate(&g).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].active_lanes(), 8);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn active_lanes_cover_output_exactly_once(
            n in 1u32..4,
            out_h in 1u32..20,
            out_w in 1u32..20,
            pad in 0u32..3,
        ) {
            let g = geometry(n, out_h + 2, out_w + 2, out_h, out_w, pad);
            let records = generate(&g).unwrap();
            prop_assert_eq!(records.len() as u64, g.tile_count().div_ceil(LANES as u64));

            let mut seen = HashSet::new();
            for (r, record) in records.iter().enumerate() {
                for lane in 0..LANES {
                    let (batch, row, col) = tile_origin(&g, (r * LANES + lane) as u64);
                    for c in 0..2 {
                        for rr in 0..2 {
                            if !record.output_clipped(lane, c, rr) {
                                prop_assert!(batch < n as i64);
                                let cell = (batch, row + rr as i64, col + c as i64);
                                prop_assert!(seen.insert(cell), "duplicate {:?}", cell);
                            }
                        }
                    }
                }
            }
            prop_assert_eq!(seen.len() as u64, n as u64 * out_h as u64 * out_w as u64);
        }

        #[test]
        fn clip_bit_iff_outside_tensor(
            n in 1u32..3,
            h in 1u32..12,
            w in 1u32..12,
            out_h in 1u32..12,
            out_w in 1u32..12,
            pad in 0u32..3,
        ) {
            let g = geometry(n, h, w, out_h, out_w, pad);
            let records = generate(&g).unwrap();
            for (r, record) in records.iter().enumerate() {
                for lane in 0..LANES {
                    let (batch, row, col) = tile_origin(&g, (r * LANES + lane) as u64);
                    let batch_out = batch >= n as i64;
                    for c in 0..4 {
                        for rr in 0..4 {
                            let x = col - pad as i64 + c as i64;
                            let y = row - pad as i64 + rr as i64;
                            let outside = batch_out
                                || !(0..w as i64).contains(&x)
                                || !(0..h as i64).contains(&y);
                            prop_assert_eq!(record.input_clipped(lane, c, rr), outside);
                        }
                    }
                    for c in 0..2 {
                        for rr in 0..2 {
                            let outside = batch_out
                                || col + c as i64 >= out_w as i64
                                || row + rr as i64 >= out_h as i64;
                            prop_assert_eq!(record.output_clipped(lane, c, rr), outside);
                        }
                    }
                }
            }
        }

        #[test]
        fn record_offsets_follow_lane_zero(
            n in 1u32..3,
            out_h in 1u32..16,
            out_w in 1u32..16,
            pad in 0u32..3,
        ) {
            let g = geometry(n, out_h + 2, out_w + 2, out_h, out_w, pad);
            let records = generate(&g).unwrap();
            for (r, record) in records.iter().enumerate() {
                let (batch, row, col) = tile_origin(&g, (r * LANES) as u64);
                prop_assert_eq!(record.store_offset, g.output.offset(batch, row, col));
                prop_assert_eq!(
                    record.load_offset,
                    g.input.offset(batch, row - pad as i64, col - pad as i64)
                );
            }
        }
    }
}
