//! Launch-side view of a compiled convolution: the kernel arguments, pitches
//! and launch geometry that accompany the control buffer.
//!
//! Eligibility (which problems the kernel supports) and device buffer
//! management belong to the caller.

pub mod tuning;

pub use tuning::{TuningConfig, MAX_GROUPS, PERF_VALS_ENV};

use crate::control::{self, ControlBuffer, OUT_TILE_H, OUT_TILE_W};
use crate::error::{Error, Result};
use crate::problem::{BufferLayout, Geometry};

/// Kernel symbol the control stream is built for.
pub const KERNEL_NAME: &str = "ultra_winograd_f2x3_fp16_pk_stride1";
/// Assembly source holding [`KERNEL_NAME`].
pub const KERNEL_FILE: &str = "ultra_winograd_f2x3_fp16_pk_stride1.s";

/// Work-items per worker group.
pub const WORKGROUP_SIZE: usize = 256;

/// Reflect the filter along R.
pub const F_REVERSE_R: u32 = 1 << 0;
/// Reflect the filter along S.
pub const F_REVERSE_S: u32 = 1 << 1;
/// Swap the filter's K and C axes.
pub const F_FLIP_K_C: u32 = 1 << 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    BackwardData,
    BackwardWeights,
}

impl Direction {
    /// Kernel-side coordinate reflection for this direction.
    pub fn flags(self) -> u32 {
        match self {
            Direction::Forward => 0,
            Direction::BackwardData | Direction::BackwardWeights => {
                F_REVERSE_R | F_REVERSE_S | F_FLIP_K_C
            }
        }
    }
}

/// A single 2D convolution, NCHW, unit stride, no dilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvProblem {
    pub n: u32,
    pub c: u32,
    pub k: u32,
    pub h: u32,
    pub w: u32,
    pub out_h: u32,
    pub out_w: u32,
    pub r: u32,
    pub s: u32,
    pub pad_h: u32,
    pub pad_w: u32,
    pub elem_bytes: u32,
}

impl ConvProblem {
    pub fn input_layout(&self) -> BufferLayout {
        BufferLayout::nchw(self.c, self.h, self.w, self.elem_bytes)
    }

    pub fn output_layout(&self) -> BufferLayout {
        BufferLayout::nchw(self.k, self.out_h, self.out_w, self.elem_bytes)
    }

    pub fn geometry(&self) -> Geometry {
        Geometry {
            n: self.n,
            h: self.h,
            w: self.w,
            out_h: self.out_h,
            out_w: self.out_w,
            pad_h: self.pad_h,
            pad_w: self.pad_w,
            input: self.input_layout().axis_strides(),
            output: self.output_layout().axis_strides(),
        }
    }

    pub fn tile_grid(&self) -> TileGrid {
        TileGrid {
            per_row: self.out_w.div_ceil(OUT_TILE_W),
            per_column: self.out_h.div_ceil(OUT_TILE_H),
        }
    }
}

/// Output tiles along each axis of one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    pub per_row: u32,
    pub per_column: u32,
}

/// Pitches the kernel adds to its running address for one tensor.
///
/// `step_1` moves from past the end of a tile row to the start of the
/// next; `step_2` moves from past the last tile row to the next image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorPitches {
    pub channel: u32,
    pub row: u32,
    pub step_1: i32,
    pub step_2: i32,
}

fn narrow_i32(name: &'static str, value: i64) -> Result<i32> {
    i32::try_from(value).map_err(|_| Error::PitchOverflow { name, value })
}

fn narrow_u32(name: &'static str, value: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::PitchOverflow {
        name,
        value: value as i64,
    })
}

impl TensorPitches {
    pub fn derive(layout: &BufferLayout, grid: TileGrid) -> Result<Self> {
        let (n, c, h, w) = (
            layout.n as i64,
            layout.c as i64,
            layout.h as i64,
            layout.w as i64,
        );
        let tile_w = OUT_TILE_W as i64;
        let tile_h = OUT_TILE_H as i64;
        let step_1 = tile_h * h - grid.per_row as i64 * tile_w * w;
        let step_2 = n - grid.per_column as i64 * tile_h * h;
        Ok(TensorPitches {
            channel: narrow_u32("channel", c as u64)?,
            row: narrow_u32("row", h as u64)?,
            step_1: narrow_i32("step_1", step_1)?,
            step_2: narrow_i32("step_2", step_2)?,
        })
    }
}

/// Scalar kernel arguments, in the kernel's parameter order. Tensor, filter
/// and control buffer addresses are bound by the dispatcher between
/// `output` and `relu_alpha`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelArgs {
    pub c: u32,
    pub k: u32,
    pub groups: u32,
    pub works: u32,
    pub input: TensorPitches,
    pub output: TensorPitches,
    pub relu_alpha: f32,
    pub flags: u32,
    pub r: u32,
    pub s: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchGeometry {
    pub global: [usize; 3],
    pub local: [usize; 3],
}

impl LaunchGeometry {
    pub fn for_groups(groups: u32) -> Self {
        LaunchGeometry {
            global: [WORKGROUP_SIZE * groups as usize, 1, 1],
            local: [WORKGROUP_SIZE, 1, 1],
        }
    }
}

/// Everything needed to launch the kernel once.
#[derive(Debug, Clone)]
pub struct KernelPlan {
    pub control: ControlBuffer,
    pub args: KernelArgs,
    pub launch: LaunchGeometry,
}

/// Compile the control stream and derive the launch parameters.
pub fn plan(
    problem: &ConvProblem,
    config: &TuningConfig,
    direction: Direction,
) -> Result<KernelPlan> {
    let control = control::compile(&problem.geometry(), config.schedule())?;
    let works = u32::try_from(control.record_count()).map_err(|_| Error::TagOverflow {
        records: control.record_count(),
    })?;

    let grid = problem.tile_grid();
    let args = KernelArgs {
        c: problem.c,
        k: problem.k,
        groups: config.groups,
        works,
        input: TensorPitches::derive(&problem.input_layout(), grid)?,
        output: TensorPitches::derive(&problem.output_layout(), grid)?,
        relu_alpha: 1.0,
        flags: direction.flags(),
        r: problem.r,
        s: problem.s,
    };
    log::debug!("{KERNEL_NAME}: {args:?}");

    Ok(KernelPlan {
        control,
        args,
        launch: LaunchGeometry::for_groups(config.groups),
    })
}

/// Caller-held "warn once" state for devices wider than [`MAX_GROUPS`].
#[derive(Debug, Default)]
pub struct ComputeUnitNotice {
    warned: bool,
}

impl ComputeUnitNotice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs a warning the first time an oversized device is seen.
    /// Returns whether a warning was emitted by this call.
    pub fn check(&mut self, compute_units: u32) -> bool {
        if self.warned {
            return false;
        }
        self.warned = true;
        if compute_units > MAX_GROUPS {
            log::warn!(
                "{KERNEL_NAME}: device has {compute_units} compute units, \
                 kernel supports at most {MAX_GROUPS}; performance may be sub-optimal"
            );
            return true;
        }
        false
    }
}
