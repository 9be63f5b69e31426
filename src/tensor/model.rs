//! Cycle-accurate FP32 tensor tile.
//!
//! A [`TensorUnit`] is a `rows × cols` grid of independent multiply-accumulate
//! lanes. Every lane owns an accumulator, a contribution counter and one slot
//! range in each stage's delay line. [`TensorUnit::step`] advances one lane by
//! one cycle; [`TensorUnit::gemm`] drives the whole grid through a matrix
//! product and drains the pipeline.
//!
//! # Step Data Flow
//!
//! ```text
//! a*b ──► multiply ──(+ addend)──► add ──► accumulator += value
//!                                               │
//!          out ◄── saturate? ◄── round ◄── round? ◄── accumulate
//! ```
//!
//! The validity bit travels beside the value through every delay line. A lane
//! only accumulates when the add stage emits a valid slot.
//!
//! # GEMM Schedule
//!
//! Operands are issued in depth, row, column order: round `k` steps every
//! lane once with `lhs[row][k]` and `rhs[k][col]`. After `depth` rounds,
//! `total_latency + 1` bubble rounds drain the pipeline. The bias joins the
//! depth-0 product on the round that product leaves the multiply stage, so
//! it is accumulated exactly once for any multiplier latency.

use super::error::ModelError;
use super::pipeline::{Slot, Stage, StageBuffer};
use super::timing::PipelineConfig;

/// Externally visible state of one lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LaneState {
    /// No data accepted since the last reset.
    #[default]
    Idle,
    /// Data in flight, output not valid this cycle.
    Filling,
    /// The output stage emitted a valid value this cycle.
    Valid,
}

/// Result of one [`TensorUnit::step`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutput {
    pub valid: bool,
    /// Output value, 0.0 whenever `valid` is false.
    pub value: f32,
}

/// Read-only row-major matrix view.
#[derive(Debug, Clone, Copy)]
pub struct Matrix<'a> {
    pub data: &'a [f32],
    /// Elements between the starts of consecutive rows.
    pub stride: usize,
}

impl<'a> Matrix<'a> {
    pub fn new(data: &'a [f32], stride: usize) -> Self {
        Self { data, stride }
    }
}

/// Writable row-major matrix view.
#[derive(Debug)]
pub struct MatrixMut<'a> {
    pub data: &'a mut [f32],
    pub stride: usize,
}

impl<'a> MatrixMut<'a> {
    pub fn new(data: &'a mut [f32], stride: usize) -> Self {
        Self { data, stride }
    }
}

/// Pipelined grid of FP32 multiply-accumulate lanes.
#[derive(Debug)]
pub struct TensorUnit {
    config: PipelineConfig,
    rows: usize,
    cols: usize,
    depth: usize,
    accumulators: Vec<f32>,
    contributions: Vec<usize>,
    states: Vec<LaneState>,
    multiply: StageBuffer,
    add: StageBuffer,
    accumulate: StageBuffer,
    round: StageBuffer,
    saturate: StageBuffer,
    cycle: u64,
}

impl TensorUnit {
    /// Allocate a grid for `rows × cols` lanes with contraction depth `depth`.
    ///
    /// Every buffer is reserved up front; nothing is allocated afterwards.
    pub fn new(
        config: PipelineConfig,
        rows: usize,
        cols: usize,
        depth: usize,
    ) -> Result<Self, ModelError> {
        if rows == 0 || cols == 0 || depth == 0 {
            return Err(ModelError::ZeroDimension { rows, cols, depth });
        }
        if !config.format.is_executable() {
            return Err(ModelError::UnsupportedFormat(config.format.kind));
        }

        let lanes = rows.checked_mul(cols).ok_or(ModelError::Allocation {
            what: "lane grid",
            lanes: usize::MAX,
            slots: 1,
        })?;

        let unit = Self {
            config,
            rows,
            cols,
            depth,
            accumulators: try_filled("accumulators", lanes, 0.0)?,
            contributions: try_filled("contribution counters", lanes, 0)?,
            states: try_filled("lane states", lanes, LaneState::Idle)?,
            multiply: StageBuffer::try_new(
                Stage::Multiply,
                lanes,
                config.multiplier_latency as usize,
            )?,
            add: StageBuffer::try_new(Stage::Add, lanes, config.adder_latency as usize)?,
            accumulate: StageBuffer::try_new(
                Stage::Accumulate,
                lanes,
                config.accumulator_latency as usize,
            )?,
            round: StageBuffer::try_new(Stage::Round, lanes, config.rounding_latency as usize)?,
            saturate: StageBuffer::try_new(
                Stage::Saturate,
                lanes,
                config.saturation_latency as usize,
            )?,
            cycle: 0,
        };

        log::debug!(
            "tensor unit {}x{}x{} allocated, latencies {:?}, rounding={} saturation={}",
            rows,
            cols,
            depth,
            config.latencies(),
            config.enable_rounding,
            config.enable_saturation
        );
        for (stage, latency) in Stage::ALL.iter().zip(config.latencies()) {
            log::trace!("  {} stage: {} cycles", stage.name(), latency);
        }
        Ok(unit)
    }

    /// Zero every accumulator, counter, slot and the cycle counter.
    pub fn reset(&mut self) {
        self.accumulators.fill(0.0);
        self.contributions.fill(0);
        self.states.fill(LaneState::Idle);
        for stage in self.stages_mut() {
            stage.clear();
        }
        self.cycle = 0;
    }

    /// Release all buffers. The model keeps answering accessors but refuses
    /// to step or run a GEMM. Calling this twice is harmless.
    pub fn free(&mut self) {
        if !self.is_allocated() {
            return;
        }
        self.accumulators = Vec::new();
        self.contributions = Vec::new();
        self.states = Vec::new();
        for stage in self.stages_mut() {
            stage.release();
        }
        self.rows = 0;
        self.cols = 0;
        self.depth = 0;
        self.cycle = 0;
        log::debug!("tensor unit released");
    }

    pub fn is_allocated(&self) -> bool {
        self.rows != 0
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Steps executed since the last reset, across all lanes.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Running (unrounded) accumulator of a lane.
    pub fn accumulator(&self, row: usize, col: usize) -> Result<f32, ModelError> {
        Ok(self.accumulators[self.lane_index(row, col)?])
    }

    /// Number of valid values accumulated by a lane, saturating at `usize::MAX`.
    pub fn contributions(&self, row: usize, col: usize) -> Result<usize, ModelError> {
        Ok(self.contributions[self.lane_index(row, col)?])
    }

    pub fn lane_state(&self, row: usize, col: usize) -> Result<LaneState, ModelError> {
        Ok(self.states[self.lane_index(row, col)?])
    }

    // ========================================================================
    // Cycle Step
    // ========================================================================

    /// Advance lane `(row, col)` by one cycle.
    ///
    /// A valid input enters the multiply stage as `a * b`; `addend` is added
    /// to whatever leaves the multiply stage this cycle. An out-of-range lane
    /// fails without touching any state.
    pub fn step(
        &mut self,
        row: usize,
        col: usize,
        input_valid: bool,
        a: f32,
        b: f32,
        addend: f32,
    ) -> Result<StepOutput, ModelError> {
        let lane = self.lane_index(row, col)?;

        let mul_ready = self.multiply.shift(lane, Slot::new(a * b, input_valid));
        let add_ready = self
            .add
            .shift(lane, Slot::new(mul_ready.value + addend, mul_ready.valid));

        let mut accum_input = self.accumulators[lane];
        if add_ready.valid {
            accum_input += add_ready.value;
            self.accumulators[lane] = accum_input;
            self.contributions[lane] = self.contributions[lane].saturating_add(1);
        }
        let accum_ready = self
            .accumulate
            .shift(lane, Slot::new(accum_input, add_ready.valid));

        let mut round_input = accum_ready;
        if round_input.valid && self.config.enable_rounding {
            round_input.value = round_input.value.round_ties_even();
        }
        let round_ready = self.round.shift(lane, round_input);

        let mut sat_input = round_ready;
        if sat_input.valid && self.config.enable_saturation {
            sat_input.value = saturate(sat_input.value);
        }
        let out = self.saturate.shift(lane, sat_input);

        self.cycle += 1;
        let state = &mut self.states[lane];
        *state = if out.valid {
            LaneState::Valid
        } else if *state == LaneState::Idle && !input_valid {
            LaneState::Idle
        } else {
            LaneState::Filling
        };

        log::trace!(
            "cycle {} lane ({}, {}): in={} a={} b={} addend={} acc={} -> valid={} value={}",
            self.cycle,
            row,
            col,
            input_valid,
            a,
            b,
            addend,
            self.accumulators[lane],
            out.valid,
            out.value
        );

        Ok(StepOutput {
            valid: out.valid,
            value: if out.valid { out.value } else { 0.0 },
        })
    }

    // ========================================================================
    // GEMM Driver
    // ========================================================================

    /// Compute `dst = lhs · rhs + bias` through the pipeline.
    ///
    /// `lhs` is `rows × depth`, `rhs` is `depth × cols`, `bias` holds at
    /// least `cols` values and `dst` is `rows × cols`. The model is reset
    /// first; afterwards it holds the drained pipeline state.
    pub fn gemm(
        &mut self,
        lhs: Matrix<'_>,
        rhs: Matrix<'_>,
        bias: Option<&[f32]>,
        dst: MatrixMut<'_>,
    ) -> Result<(), ModelError> {
        if !self.is_allocated() {
            return Err(ModelError::Released);
        }
        let (rows, cols, depth) = (self.rows, self.cols, self.depth);

        check_layout("lhs", lhs.data.len(), lhs.stride, rows, depth)?;
        check_layout("rhs", rhs.data.len(), rhs.stride, depth, cols)?;
        check_layout("dst", dst.data.len(), dst.stride, rows, cols)?;
        if let Some(bias) = bias {
            if bias.len() < cols {
                return Err(ModelError::BufferTooSmall {
                    matrix: "bias",
                    len: bias.len(),
                    needed: cols,
                });
            }
        }

        self.reset();

        let bias_round = self.config.multiplier_latency as u64;
        let drain_rounds = self.config.total_latency() + 1;
        let mut last = try_filled("gemm results", rows * cols, 0.0)?;

        log::debug!(
            "gemm {}x{}x{}: {} issue rounds, {} drain rounds",
            rows,
            cols,
            depth,
            depth,
            drain_rounds
        );

        let total_rounds = depth as u64 + drain_rounds;
        for round in 0..total_rounds {
            let issue = round < depth as u64;
            let k = round as usize;
            for row in 0..rows {
                for col in 0..cols {
                    let addend = match bias {
                        Some(bias) if round == bias_round => bias[col],
                        _ => 0.0,
                    };
                    let (a, b) = if issue {
                        (lhs.data[row * lhs.stride + k], rhs.data[k * rhs.stride + col])
                    } else {
                        (0.0, 0.0)
                    };
                    let out = self.step(row, col, issue, a, b, addend)?;
                    if out.valid {
                        last[row * cols + col] = out.value;
                    }
                }
            }
        }

        for row in 0..rows {
            let dst_row = &mut dst.data[row * dst.stride..row * dst.stride + cols];
            dst_row.copy_from_slice(&last[row * cols..(row + 1) * cols]);
        }

        log::debug!("gemm finished after {} cycles", self.cycle);
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn lane_index(&self, row: usize, col: usize) -> Result<usize, ModelError> {
        if !self.is_allocated() {
            return Err(ModelError::Released);
        }
        if row >= self.rows || col >= self.cols {
            return Err(ModelError::LaneOutOfRange {
                row,
                col,
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(row * self.cols + col)
    }

    fn stages_mut(&mut self) -> [&mut StageBuffer; 5] {
        [
            &mut self.multiply,
            &mut self.add,
            &mut self.accumulate,
            &mut self.round,
            &mut self.saturate,
        ]
    }
}

/// Clamp a value to the finite f32 range, keeping its sign.
///
/// NaN is not greater than zero and saturates to `-f32::MAX`.
pub fn saturate(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(-f32::MAX, f32::MAX)
    } else if value > 0.0 {
        f32::MAX
    } else {
        -f32::MAX
    }
}

fn try_filled<T: Clone>(what: &'static str, len: usize, value: T) -> Result<Vec<T>, ModelError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| ModelError::Allocation {
        what,
        lanes: len,
        slots: 1,
    })?;
    buf.resize(len, value);
    Ok(buf)
}

/// Check that `len` elements hold `rows` rows of `row_len` at `stride`.
fn check_layout(
    matrix: &'static str,
    len: usize,
    stride: usize,
    rows: usize,
    row_len: usize,
) -> Result<(), ModelError> {
    if stride < row_len {
        return Err(ModelError::StrideTooSmall {
            matrix,
            stride,
            min: row_len,
        });
    }
    let needed = (rows - 1)
        .checked_mul(stride)
        .and_then(|n| n.checked_add(row_len))
        .unwrap_or(usize::MAX);
    if len < needed {
        return Err(ModelError::BufferTooSmall {
            matrix,
            len,
            needed,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::error::ErrorKind;
    use crate::tensor::format::FormatDesc;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn no_rounding() -> PipelineConfig {
        PipelineConfig::default().with_rounding(false)
    }

    /// Scalar reference: dst[r][c] = bias[c] + sum_k lhs[r][k] * rhs[k][c]
    fn reference(
        lhs: &[f32],
        rhs: &[f32],
        bias: Option<&[f32]>,
        rows: usize,
        cols: usize,
        depth: usize,
    ) -> Vec<f64> {
        let mut out = vec![0.0f64; rows * cols];
        for r in 0..rows {
            for c in 0..cols {
                let mut sum = bias.map_or(0.0, |b| b[c] as f64);
                for k in 0..depth {
                    sum += lhs[r * depth + k] as f64 * rhs[k * cols + c] as f64;
                }
                out[r * cols + c] = sum;
            }
        }
        out
    }

    #[test]
    fn test_new_rejects_zero_dimensions() {
        for (r, c, d) in [(0, 1, 1), (1, 0, 1), (1, 1, 0)] {
            let err = TensorUnit::new(PipelineConfig::default(), r, c, d).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration);
        }
    }

    #[test]
    fn test_new_rejects_unexecutable_format() {
        let mut config = PipelineConfig::default();
        config.format = FormatDesc::bfloat16();
        let err = TensorUnit::new(config, 2, 2, 2).unwrap_err();
        assert!(matches!(err, ModelError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_new_reports_allocation_overflow() {
        let err = TensorUnit::new(PipelineConfig::default(), usize::MAX, 2, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Allocation);

        let err = TensorUnit::new(PipelineConfig::default(), usize::MAX / 2, 1, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Allocation);
    }

    #[test]
    fn test_pipeline_fill_timing() {
        for latencies in [[2, 1, 1, 1, 0], [0, 0, 0, 0, 0], [3, 2, 1, 0, 2], [1, 1, 1, 1, 1]] {
            let config = no_rounding().with_latencies(latencies);
            let total = config.total_latency();
            let mut unit = TensorUnit::new(config, 2, 2, 1).unwrap();

            let first = unit.step(1, 0, true, 3.0, 4.0, 0.0).unwrap();
            let mut outputs = vec![first];
            for _ in 0..total + 2 {
                outputs.push(unit.step(1, 0, false, 0.0, 0.0, 0.0).unwrap());
            }

            let total = total as usize;
            for (i, out) in outputs.iter().enumerate() {
                if i == total {
                    assert!(out.valid, "{:?}: step {} should be valid", latencies, i);
                    assert_eq!(out.value, 12.0);
                } else {
                    assert!(!out.valid, "{:?}: step {} should be a bubble", latencies, i);
                    assert_eq!(out.value, 0.0);
                }
            }

            // Other lanes untouched
            assert_eq!(unit.lane_state(0, 0).unwrap(), LaneState::Idle);
            assert_eq!(unit.accumulator(0, 1).unwrap(), 0.0);
            assert_eq!(unit.contributions(1, 0).unwrap(), 1);
        }
    }

    #[test]
    fn test_cycle_counter_is_model_wide() {
        let mut unit = TensorUnit::new(PipelineConfig::default(), 2, 3, 1).unwrap();
        unit.step(0, 0, true, 1.0, 1.0, 0.0).unwrap();
        unit.step(1, 2, false, 0.0, 0.0, 0.0).unwrap();
        unit.step(0, 1, true, 1.0, 1.0, 0.0).unwrap();
        assert_eq!(unit.cycle(), 3);
    }

    #[test]
    fn test_out_of_range_step_mutates_nothing() {
        let mut unit = TensorUnit::new(PipelineConfig::default(), 2, 2, 1).unwrap();
        let err = unit.step(2, 0, true, 1.0, 1.0, 0.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Bounds);
        assert!(unit.step(0, 2, true, 1.0, 1.0, 0.0).is_err());
        assert_eq!(unit.cycle(), 0);
    }

    #[test]
    fn test_accumulates_across_steps() {
        let mut unit = TensorUnit::new(PipelineConfig::instant(), 1, 1, 1).unwrap();
        let mut last = 0.0;
        for (a, b) in [(1.0, 2.0), (3.0, 4.0), (-1.0, 0.5)] {
            let out = unit.step(0, 0, true, a, b, 0.0).unwrap();
            assert!(out.valid);
            last = out.value;
        }
        assert_eq!(last, 13.5);
        assert_eq!(unit.contributions(0, 0).unwrap(), 3);

        // Bubbles leave the accumulator alone
        let out = unit.step(0, 0, false, 9.0, 9.0, 9.0).unwrap();
        assert!(!out.valid);
        assert_eq!(unit.accumulator(0, 0).unwrap(), 13.5);
    }

    #[test]
    fn test_rounding_half_to_even() {
        let config = PipelineConfig::instant().with_rounding(true);
        let mut unit = TensorUnit::new(config, 1, 1, 1).unwrap();
        assert_eq!(unit.step(0, 0, true, 2.5, 1.0, 0.0).unwrap().value, 2.0);
        // Accumulator keeps the unrounded sum: 2.5 + 1.0
        assert_eq!(unit.step(0, 0, true, 1.0, 1.0, 0.0).unwrap().value, 4.0);
        assert_eq!(unit.accumulator(0, 0).unwrap(), 3.5);
        assert_eq!(unit.step(0, 0, true, -1.0, 1.0, 0.0).unwrap().value, 2.0);
    }

    #[test]
    fn test_saturation_clamps_overflow() {
        let config = PipelineConfig::instant().with_saturation(true);
        let mut unit = TensorUnit::new(config, 1, 2, 1).unwrap();
        let out = unit.step(0, 0, true, f32::MAX, 2.0, 0.0).unwrap();
        assert_eq!(out.value, f32::MAX);
        let out = unit.step(0, 1, true, f32::MAX, -2.0, 0.0).unwrap();
        assert_eq!(out.value, -f32::MAX);

        let mut unit = TensorUnit::new(PipelineConfig::instant(), 1, 1, 1).unwrap();
        let out = unit.step(0, 0, true, f32::MAX, 2.0, 0.0).unwrap();
        assert_eq!(out.value, f32::INFINITY);
    }

    #[test]
    fn test_saturation_maps_nan_to_negative_max() {
        let config = PipelineConfig::instant().with_saturation(true);
        let mut unit = TensorUnit::new(config, 1, 2, 1).unwrap();
        let out = unit.step(0, 0, true, f32::NAN, 1.0, 0.0).unwrap();
        assert!(out.valid);
        assert_eq!(out.value, -f32::MAX);
        let out = unit.step(0, 1, true, f32::INFINITY, 0.0, 0.0).unwrap();
        assert_eq!(out.value, -f32::MAX);
    }

    #[test]
    fn test_saturate_helper() {
        assert_eq!(saturate(1.5), 1.5);
        assert_eq!(saturate(f32::INFINITY), f32::MAX);
        assert_eq!(saturate(f32::NEG_INFINITY), -f32::MAX);
        assert_eq!(saturate(f32::NAN), -f32::MAX);
        assert_eq!(saturate(-f32::NAN), -f32::MAX);
    }

    #[test]
    fn test_contribution_counter_saturates() {
        let mut unit = TensorUnit::new(PipelineConfig::instant(), 1, 1, 1).unwrap();
        unit.contributions[0] = usize::MAX - 1;
        unit.step(0, 0, true, 1.0, 1.0, 0.0).unwrap();
        unit.step(0, 0, true, 1.0, 1.0, 0.0).unwrap();
        assert_eq!(unit.contributions(0, 0).unwrap(), usize::MAX);
    }

    #[test]
    fn test_lane_state_machine() {
        let mut unit = TensorUnit::new(no_rounding(), 1, 2, 1).unwrap();
        assert_eq!(unit.lane_state(0, 0).unwrap(), LaneState::Idle);

        // Bubbles on an idle lane keep it idle
        unit.step(0, 0, false, 0.0, 0.0, 0.0).unwrap();
        assert_eq!(unit.lane_state(0, 0).unwrap(), LaneState::Idle);

        unit.step(0, 0, true, 1.0, 1.0, 0.0).unwrap();
        assert_eq!(unit.lane_state(0, 0).unwrap(), LaneState::Filling);

        let mut saw_valid = false;
        for _ in 0..10 {
            let out = unit.step(0, 0, false, 0.0, 0.0, 0.0).unwrap();
            let state = unit.lane_state(0, 0).unwrap();
            if out.valid {
                assert_eq!(state, LaneState::Valid);
                saw_valid = true;
            } else {
                assert_eq!(state, LaneState::Filling);
            }
        }
        assert!(saw_valid);
        assert_eq!(unit.lane_state(0, 1).unwrap(), LaneState::Idle);

        unit.reset();
        assert_eq!(unit.lane_state(0, 0).unwrap(), LaneState::Idle);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut unit = TensorUnit::new(PipelineConfig::default(), 2, 2, 2).unwrap();
        for _ in 0..3 {
            unit.step(1, 1, true, 2.0, 3.0, 1.0).unwrap();
        }
        unit.reset();
        let snapshot = (
            unit.accumulators.clone(),
            unit.contributions.clone(),
            unit.states.clone(),
            unit.cycle,
        );
        unit.reset();
        assert_eq!(
            snapshot,
            (
                unit.accumulators.clone(),
                unit.contributions.clone(),
                unit.states.clone(),
                unit.cycle,
            )
        );
        assert_eq!(unit.cycle(), 0);
        assert!(unit.accumulators.iter().all(|&v| v == 0.0));

        // A fresh input after reset sees an empty pipeline
        let out = unit.step(1, 1, true, 1.0, 1.0, 0.0).unwrap();
        assert!(!out.valid);
    }

    #[test]
    fn test_free_is_idempotent() {
        let mut unit = TensorUnit::new(PipelineConfig::default(), 2, 2, 2).unwrap();
        unit.free();
        unit.free();
        assert!(!unit.is_allocated());
        assert_eq!((unit.rows(), unit.cols(), unit.depth()), (0, 0, 0));

        let err = unit.step(0, 0, true, 1.0, 1.0, 0.0).unwrap_err();
        assert_eq!(err, ModelError::Released);

        let mut dst = [0.0f32; 4];
        let err = unit
            .gemm(
                Matrix::new(&[0.0; 4], 2),
                Matrix::new(&[0.0; 4], 2),
                None,
                MatrixMut::new(&mut dst, 2),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_gemm_two_by_two_by_three() {
        let mut unit = TensorUnit::new(no_rounding(), 2, 2, 3).unwrap();
        let lhs: [f32; 6] = [1.0, 2.0, 3.0, -1.0, -2.0, -3.0];
        let rhs: [f32; 6] = [4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        let bias: [f32; 2] = [0.5, -0.5];
        let mut dst = [0.0f32; 4];

        unit.gemm(
            Matrix::new(&lhs, 3),
            Matrix::new(&rhs, 2),
            Some(&bias),
            MatrixMut::new(&mut dst, 2),
        )
        .unwrap();

        assert_eq!(dst, [40.5, 45.5, -39.5, -46.5]);
        // (depth + total latency + 1) rounds over four lanes
        assert_eq!(unit.cycle(), (3 + 5 + 1) * 4);
        assert_eq!(unit.contributions(0, 0).unwrap(), 3);
    }

    #[test]
    fn test_gemm_with_rounding_rounds_output() {
        let mut unit = TensorUnit::new(PipelineConfig::default(), 2, 2, 3).unwrap();
        let lhs: [f32; 6] = [1.0, 2.0, 3.0, -1.0, -2.0, -3.0];
        let rhs: [f32; 6] = [4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        let bias: [f32; 2] = [0.5, -0.5];
        let mut dst = [0.0f32; 4];
        unit.gemm(
            Matrix::new(&lhs, 3),
            Matrix::new(&rhs, 2),
            Some(&bias),
            MatrixMut::new(&mut dst, 2),
        )
        .unwrap();
        assert_eq!(dst, [40.0, 46.0, -40.0, -46.0]);
    }

    #[test]
    fn test_gemm_respects_strides() {
        let mut unit = TensorUnit::new(PipelineConfig::instant(), 2, 1, 2).unwrap();
        // lhs stride 3, rhs stride 2, dst stride 4
        let lhs: [f32; 5] = [1.0, 2.0, 99.0, 3.0, 4.0];
        let rhs: [f32; 3] = [5.0, 99.0, 6.0];
        let mut dst = [-1.0f32; 5];
        unit.gemm(
            Matrix::new(&lhs, 3),
            Matrix::new(&rhs, 2),
            None,
            MatrixMut::new(&mut dst, 4),
        )
        .unwrap();
        assert_eq!(dst, [17.0, -1.0, -1.0, -1.0, 39.0]);
    }

    #[test]
    fn test_gemm_layout_errors() {
        let mut unit = TensorUnit::new(PipelineConfig::default(), 2, 2, 3).unwrap();
        let lhs = [0.0f32; 6];
        let rhs = [0.0f32; 6];
        let mut dst = [0.0f32; 4];

        let err = unit
            .gemm(
                Matrix::new(&lhs, 2),
                Matrix::new(&rhs, 2),
                None,
                MatrixMut::new(&mut dst, 2),
            )
            .unwrap_err();
        assert!(matches!(err, ModelError::StrideTooSmall { matrix: "lhs", .. }));

        let err = unit
            .gemm(
                Matrix::new(&lhs, 3),
                Matrix::new(&rhs, 1),
                None,
                MatrixMut::new(&mut dst, 2),
            )
            .unwrap_err();
        assert!(matches!(err, ModelError::StrideTooSmall { matrix: "rhs", .. }));

        let err = unit
            .gemm(
                Matrix::new(&lhs, 3),
                Matrix::new(&rhs, 2),
                None,
                MatrixMut::new(&mut dst, 1),
            )
            .unwrap_err();
        assert!(matches!(err, ModelError::StrideTooSmall { matrix: "dst", .. }));

        let err = unit
            .gemm(
                Matrix::new(&lhs[..5], 3),
                Matrix::new(&rhs, 2),
                None,
                MatrixMut::new(&mut dst, 2),
            )
            .unwrap_err();
        assert!(matches!(err, ModelError::BufferTooSmall { matrix: "lhs", .. }));

        let err = unit
            .gemm(
                Matrix::new(&lhs, 3),
                Matrix::new(&rhs, 2),
                Some(&[1.0]),
                MatrixMut::new(&mut dst, 2),
            )
            .unwrap_err();
        assert!(matches!(err, ModelError::BufferTooSmall { matrix: "bias", .. }));
        assert_eq!(err.kind(), ErrorKind::Bounds);

        // Nothing ran
        assert_eq!(unit.cycle(), 0);
    }

    #[test]
    fn test_random_gemm_matches_reference() {
        let mut rng = StdRng::seed_from_u64(0xD5B4_8E1);
        for _ in 0..40 {
            let rows = rng.gen_range(1..=8);
            let cols = rng.gen_range(1..=8);
            let depth = rng.gen_range(1..=8);
            let latencies = [
                rng.gen_range(0..4),
                rng.gen_range(0..4),
                rng.gen_range(0..4),
                rng.gen_range(0..4),
                rng.gen_range(0..4),
            ];
            let config = PipelineConfig::instant().with_latencies(latencies);

            let lhs: Vec<f32> = (0..rows * depth).map(|_| rng.gen_range(-4.0..4.0)).collect();
            let rhs: Vec<f32> = (0..depth * cols).map(|_| rng.gen_range(-4.0..4.0)).collect();
            let bias: Vec<f32> = (0..cols).map(|_| rng.gen_range(-1.0..1.0)).collect();
            let use_bias = rng.gen_bool(0.5);
            let bias = use_bias.then_some(bias.as_slice());

            let mut unit = TensorUnit::new(config, rows, cols, depth).unwrap();
            let mut dst = vec![0.0f32; rows * cols];
            unit.gemm(
                Matrix::new(&lhs, depth),
                Matrix::new(&rhs, cols),
                bias,
                MatrixMut::new(&mut dst, cols),
            )
            .unwrap();

            let want = reference(&lhs, &rhs, bias, rows, cols, depth);
            for (i, (&got, &want)) in dst.iter().zip(want.iter()).enumerate() {
                let tolerance = 1e-4 * want.abs().max(1.0);
                assert!(
                    (got as f64 - want).abs() <= tolerance,
                    "{}x{}x{} {:?} lane {}: got {} want {}",
                    rows,
                    cols,
                    depth,
                    latencies,
                    i,
                    got,
                    want
                );
            }
        }
    }
}
