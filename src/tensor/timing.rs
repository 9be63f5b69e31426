//! Stage latencies of the tensor tile pipeline.
//!
//! Each lane pushes its operands through five delay lines:
//!
//! ```text
//! ┌──────────┐  ┌─────────┐  ┌────────────┐  ┌──────────┐  ┌──────────┐
//! │ Multiply │─►│ Add     │─►│ Accumulate │─►│ Round    │─►│ Saturate │─► out
//! │ (2 cyc)  │  │ (1 cyc) │  │ (1 cyc)    │  │ (1 cyc)  │  │ (0 cyc)  │
//! └──────────┘  └─────────┘  └────────────┘  └──────────┘  └──────────┘
//! ```
//!
//! A latency of zero makes a stage combinational: its value passes straight
//! through in the same cycle.

use super::format::FormatDesc;

/// Default multiplier latency in cycles.
pub const LATENCY_MULTIPLIER: u32 = 2;

/// Default adder latency in cycles.
pub const LATENCY_ADDER: u32 = 1;

/// Default accumulator latency in cycles.
pub const LATENCY_ACCUMULATOR: u32 = 1;

/// Default rounding latency in cycles.
pub const LATENCY_ROUNDING: u32 = 1;

/// Default saturation latency in cycles.
pub const LATENCY_SATURATION: u32 = 0;

/// Tensor tile pipeline configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Element format (only FP32 executes)
    pub format: FormatDesc,

    /// Cycles through the multiply stage
    pub multiplier_latency: u32,

    /// Cycles through the bias/addend stage
    pub adder_latency: u32,

    /// Cycles through the accumulate stage
    pub accumulator_latency: u32,

    /// Cycles through the rounding stage
    pub rounding_latency: u32,

    /// Cycles through the saturation stage
    pub saturation_latency: u32,

    /// Round accumulated values half to even
    pub enable_rounding: bool,

    /// Clamp accumulated values to the finite f32 range
    pub enable_saturation: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            format: FormatDesc::fp32(),
            multiplier_latency: LATENCY_MULTIPLIER,
            adder_latency: LATENCY_ADDER,
            accumulator_latency: LATENCY_ACCUMULATOR,
            rounding_latency: LATENCY_ROUNDING,
            saturation_latency: LATENCY_SATURATION,
            enable_rounding: true,
            enable_saturation: false,
        }
    }
}

impl PipelineConfig {
    /// Create instant timing (no delays) with rounding and saturation off.
    pub fn instant() -> Self {
        Self {
            format: FormatDesc::fp32(),
            multiplier_latency: 0,
            adder_latency: 0,
            accumulator_latency: 0,
            rounding_latency: 0,
            saturation_latency: 0,
            enable_rounding: false,
            enable_saturation: false,
        }
    }

    pub fn with_rounding(mut self, enable: bool) -> Self {
        self.enable_rounding = enable;
        self
    }

    pub fn with_saturation(mut self, enable: bool) -> Self {
        self.enable_saturation = enable;
        self
    }

    /// Set all five stage latencies at once.
    pub fn with_latencies(mut self, latencies: [u32; 5]) -> Self {
        let [m, a, c, r, s] = latencies;
        self.multiplier_latency = m;
        self.adder_latency = a;
        self.accumulator_latency = c;
        self.rounding_latency = r;
        self.saturation_latency = s;
        self
    }

    /// Latencies in stage order.
    pub fn latencies(&self) -> [u32; 5] {
        [
            self.multiplier_latency,
            self.adder_latency,
            self.accumulator_latency,
            self.rounding_latency,
            self.saturation_latency,
        ]
    }

    /// Cycles from an accepted input to its output.
    pub fn total_latency(&self) -> u64 {
        self.latencies().iter().map(|&l| l as u64).sum()
    }
}
