//! Pipelined FP32 tensor tile built from DSP48E1-style MAC lanes.
//!
//! # Modules
//!
//! - [`format`]: element format descriptors
//! - [`timing`]: stage latencies and enables
//! - [`pipeline`]: per-stage delay lines
//! - [`model`]: the lane grid with `step` and `gemm`
//! - [`selftest`]: built-in 2×2×3 GEMM check
//!
//! # Example
//!
//! ```
//! use dsp48_emu::tensor::{Matrix, MatrixMut, PipelineConfig, TensorUnit};
//!
//! let mut unit = TensorUnit::new(PipelineConfig::instant(), 1, 1, 2).unwrap();
//! let mut dst = [0.0f32];
//! unit.gemm(
//!     Matrix::new(&[1.0, 2.0], 2),
//!     Matrix::new(&[3.0, 4.0], 1),
//!     None,
//!     MatrixMut::new(&mut dst, 1),
//! )
//! .unwrap();
//! assert_eq!(dst[0], 11.0);
//! ```

pub mod error;
pub mod format;
pub mod model;
pub mod pipeline;
pub mod selftest;
pub mod timing;

pub use error::{ErrorKind, ModelError};
pub use format::{FormatDesc, FormatKind};
pub use model::{saturate, LaneState, Matrix, MatrixMut, StepOutput, TensorUnit};
pub use pipeline::{Slot, Stage, StageBuffer};
pub use selftest::{self_test, SelfTestError};
pub use timing::PipelineConfig;
