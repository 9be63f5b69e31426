//! Tensor unit error types.

use thiserror::Error;

use super::format::FormatKind;

/// Error category, used by the C ABI to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad dimensions, unsupported format, or use of a released model.
    Configuration,
    /// A buffer could not be reserved.
    Allocation,
    /// An index, stride or slice length is out of range.
    Bounds,
}

/// Errors from the tensor unit model.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A grid dimension is zero.
    #[error("invalid dimensions {rows}x{cols}x{depth}: every dimension must be non-zero")]
    ZeroDimension {
        rows: usize,
        cols: usize,
        depth: usize,
    },

    /// The element format is described but not executable.
    #[error("unsupported element format: {0}")]
    UnsupportedFormat(FormatKind),

    /// The model's buffers have been released.
    #[error("model has been released")]
    Released,

    /// A stage buffer could not be reserved.
    #[error("cannot allocate {what}: {lanes} lanes x {slots} slots")]
    Allocation {
        /// Buffer being reserved.
        what: &'static str,
        lanes: usize,
        slots: usize,
    },

    /// A lane coordinate lies outside the grid.
    #[error("lane ({row}, {col}) outside {rows}x{cols} grid")]
    LaneOutOfRange {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    /// A matrix row stride is shorter than a row.
    #[error("{matrix} stride {stride} is smaller than row length {min}")]
    StrideTooSmall {
        matrix: &'static str,
        stride: usize,
        min: usize,
    },

    /// A slice is shorter than its layout requires.
    #[error("{matrix} buffer holds {len} elements, layout needs {needed}")]
    BufferTooSmall {
        matrix: &'static str,
        len: usize,
        needed: usize,
    },
}

impl ModelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModelError::ZeroDimension { .. }
            | ModelError::UnsupportedFormat(_)
            | ModelError::Released => ErrorKind::Configuration,
            ModelError::Allocation { .. } => ErrorKind::Allocation,
            ModelError::LaneOutOfRange { .. }
            | ModelError::StrideTooSmall { .. }
            | ModelError::BufferTooSmall { .. } => ErrorKind::Bounds,
        }
    }
}
