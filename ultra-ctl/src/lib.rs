//! Control-stream compiler for the tiled Winograd F(2x2, 3x3) kernel.
//!
//! Given a convolution's shapes, strides and padding, produces the flat
//! `u32` stream the kernel reads to find each lane's tile, its boundary
//! clips and its row/batch wraps.

pub mod codegen;
pub mod control;
pub mod error;
pub mod problem;
pub mod solver;

pub use control::{compile, ControlBuffer, Schedule, WorkRecord};
pub use error::{Error, Result};
pub use problem::{AxisStrides, BufferLayout, Geometry};
pub use solver::{plan, ConvProblem, Direction, KernelPlan, TuningConfig};
