//! Built-in GEMM self check.
//!
//! Runs a fixed 2×2×3 product through the default pipeline (rounding off)
//! and compares every lane with a scalar dot product.

use thiserror::Error;

use super::error::ModelError;
use super::model::{Matrix, MatrixMut, TensorUnit};
use super::timing::PipelineConfig;

const ROWS: usize = 2;
const COLS: usize = 2;
const DEPTH: usize = 3;

const LHS: [f32; ROWS * DEPTH] = [1.0, 2.0, 3.0, -1.0, -2.0, -3.0];
const RHS: [f32; DEPTH * COLS] = [4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
const BIAS: [f32; COLS] = [0.5, -0.5];

/// Allowed absolute difference from the scalar result.
pub const SELF_TEST_TOLERANCE: f32 = 1e-4;

#[derive(Debug, Error)]
pub enum SelfTestError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("self test mismatch at ({row}, {col}): expected {expected}, got {actual}")]
    Mismatch {
        row: usize,
        col: usize,
        expected: f32,
        actual: f32,
    },
}

/// Run the self check and return the computed tile.
pub fn self_test() -> Result<[f32; ROWS * COLS], SelfTestError> {
    let config = PipelineConfig::default().with_rounding(false);
    let mut unit = TensorUnit::new(config, ROWS, COLS, DEPTH)?;

    let mut dst = [0.0f32; ROWS * COLS];
    unit.gemm(
        Matrix::new(&LHS, DEPTH),
        Matrix::new(&RHS, COLS),
        Some(&BIAS),
        MatrixMut::new(&mut dst, COLS),
    )?;

    for row in 0..ROWS {
        for col in 0..COLS {
            let expected = BIAS[col]
                + (0..DEPTH)
                    .map(|k| LHS[row * DEPTH + k] * RHS[k * COLS + col])
                    .sum::<f32>();
            let actual = dst[row * COLS + col];
            if (expected - actual).abs() > SELF_TEST_TOLERANCE {
                return Err(SelfTestError::Mismatch {
                    row,
                    col,
                    expected,
                    actual,
                });
            }
        }
    }

    log::info!("self test passed in {} cycles: {:?}", unit.cycle(), dst);
    Ok(dst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_test_passes() {
        let dst = self_test().unwrap();
        assert_eq!(dst, [40.5, 45.5, -39.5, -46.5]);
    }

    #[test]
    fn test_mismatch_message() {
        let err = SelfTestError::Mismatch {
            row: 1,
            col: 0,
            expected: -39.5,
            actual: -40.0,
        };
        assert_eq!(
            err.to_string(),
            "self test mismatch at (1, 0): expected -39.5, got -40"
        );
    }
}
