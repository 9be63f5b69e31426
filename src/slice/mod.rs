//! Bit-exact model of one DSP48E1 slice.
//!
//! The slice is a pre-adder, a 25x18 multiplier and a 48-bit three-input
//! ALU, steered by the OPMODE, ALUMODE, INMODE and CARRYINSEL fields. This
//! module evaluates the combinational path for one set of inputs; it keeps no
//! pipeline registers.
//!
//! # Modules
//!
//! - [`operand`]: port widths and two's-complement helpers
//! - [`control`]: typed decoding of the control fields
//! - [`datapath`]: the evaluation itself
//!
//! # Example
//!
//! ```
//! use dsp48_emu::slice::{evaluate, SliceControl, SliceInputs};
//!
//! // P = A * B (OPMODE X = M, Y = M, Z = 0)
//! let inputs = SliceInputs::new(3, 5, 0, 0);
//! let control = SliceControl::from_raw(0b000_0101, 0, 0, 0);
//! assert_eq!(evaluate(&inputs, &control), 15);
//! ```

pub mod control;
pub mod datapath;
pub mod operand;

pub use control::{
    AluMode, ArithFunction, Capture, CarryInSel, CarrySource, InMode, LogicFunction, OpMode,
    SliceControl, XSelect, YSelect, ZSelect,
};
pub use datapath::{evaluate, evaluate_traced, AluFunction, SliceInputs, SliceTrace};
pub use operand::{p_to_signed, P_MASK, P_WIDTH};
