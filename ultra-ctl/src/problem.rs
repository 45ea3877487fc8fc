//! Convolution geometry as seen by the control-stream compiler.
//!
//! The compiler only needs the spatial/batch extents of both tensors, the
//! left/top padding, and the byte strides along N, H and W. Channels never
//! enter the tiled walk: the kernel loops over them itself.

/// Byte strides of a tensor along the three axes the tiled walk moves on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxisStrides {
    pub n: u64,
    pub h: u64,
    pub w: u64,
}

impl AxisStrides {
    /// Signed byte offset of element (batch, row, col). Coordinates may be
    /// negative when padding pushes the tile origin off the tensor.
    pub fn offset(&self, batch: i64, row: i64, col: i64) -> i64 {
        col * self.w as i64 + row * self.h as i64 + batch * self.n as i64
    }
}

/// Everything the tiled walk needs to know about one convolution.
///
/// Preconditions (checked by the caller's eligibility logic, not here):
/// sizes are non-zero and strides describe real, non-overlapping buffers.
/// Violating them gives an unspecified but memory-safe buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub n: u32,
    pub h: u32,
    pub w: u32,
    pub out_h: u32,
    pub out_w: u32,
    pub pad_h: u32,
    pub pad_w: u32,
    pub input: AxisStrides,
    pub output: AxisStrides,
}

impl Geometry {
    /// Number of 2x2 output tiles in one batch element.
    pub fn tiles_per_image(&self) -> u64 {
        let rows = self.out_h.div_ceil(crate::control::OUT_TILE_H) as u64;
        let cols = self.out_w.div_ceil(crate::control::OUT_TILE_W) as u64;
        rows * cols
    }

    /// Number of 2x2 output tiles across the whole batch.
    pub fn tile_count(&self) -> u64 {
        self.tiles_per_image() * self.n as u64
    }
}

/// Per-axis byte strides of a packed NCHW buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLayout {
    pub n: u64,
    pub c: u64,
    pub h: u64,
    pub w: u64,
}

impl BufferLayout {
    /// Packed NCHW: W is innermost, each batch element holds `c` planes.
    pub fn nchw(c: u32, h: u32, w: u32, elem_bytes: u32) -> Self {
        let w_stride = elem_bytes as u64;
        let h_stride = w as u64 * w_stride;
        let c_stride = h as u64 * h_stride;
        let n_stride = c as u64 * c_stride;
        BufferLayout {
            n: n_stride,
            c: c_stride,
            h: h_stride,
            w: w_stride,
        }
    }

    pub fn axis_strides(&self) -> AxisStrides {
        AxisStrides {
            n: self.n,
            h: self.h,
            w: self.w,
        }
    }
}
