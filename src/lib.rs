//! dsp48-emu library
//!
//! Bit-exact model of the Xilinx DSP48E1 slice and a cycle-accurate FP32
//! tensor tile built from pipelined multiply-accumulate lanes.

pub mod config;
pub mod ffi;
pub mod fmul;
pub mod slice;
pub mod tensor;
