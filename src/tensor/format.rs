//! Numeric format descriptors for the tensor tile.
//!
//! A descriptor records the bit layout of one element format. Only FP32 is
//! executed by [`super::TensorUnit`]; the others describe formats a tile
//! could be configured for and are rejected at construction.
//!
//! | Format | Total | Exponent | Mantissa | Bias |
//! |--------|-------|----------|----------|------|
//! | FP32 | 32 | 8 | 23 | 127 |
//! | BF16 | 16 | 8 | 7 | 127 |
//! | FP16 | 16 | 5 | 10 | 15 |
//! | INT8 | 8 | 0 | 0 | 0 |

use std::fmt;

/// Element format family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatKind {
    Fp32,
    Bfloat16,
    Fp16,
    Int8,
    /// User-described fixed- or floating-point layout.
    Custom,
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FormatKind::Fp32 => "fp32",
            FormatKind::Bfloat16 => "bf16",
            FormatKind::Fp16 => "fp16",
            FormatKind::Int8 => "int8",
            FormatKind::Custom => "custom",
        };
        f.write_str(name)
    }
}

/// Bit layout of an element format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormatDesc {
    pub kind: FormatKind,
    /// Total storage bits.
    pub total_bits: u8,
    pub exponent_bits: u8,
    /// Stored mantissa bits (hidden bit excluded).
    pub mantissa_bits: u8,
    /// Fractional bits for fixed-point layouts.
    pub fractional_bits: u8,
    /// Exponent bias.
    pub bias: i32,
}

impl FormatDesc {
    pub const fn fp32() -> Self {
        Self {
            kind: FormatKind::Fp32,
            total_bits: 32,
            exponent_bits: 8,
            mantissa_bits: 23,
            fractional_bits: 0,
            bias: 127,
        }
    }

    pub const fn bfloat16() -> Self {
        Self {
            kind: FormatKind::Bfloat16,
            total_bits: 16,
            exponent_bits: 8,
            mantissa_bits: 7,
            fractional_bits: 0,
            bias: 127,
        }
    }

    pub const fn fp16() -> Self {
        Self {
            kind: FormatKind::Fp16,
            total_bits: 16,
            exponent_bits: 5,
            mantissa_bits: 10,
            fractional_bits: 0,
            bias: 15,
        }
    }

    pub const fn int8() -> Self {
        Self {
            kind: FormatKind::Int8,
            total_bits: 8,
            exponent_bits: 0,
            mantissa_bits: 0,
            fractional_bits: 0,
            bias: 0,
        }
    }

    /// Whether the tensor unit can execute this format.
    pub fn is_executable(&self) -> bool {
        self.kind == FormatKind::Fp32
    }
}

impl Default for FormatDesc {
    fn default() -> Self {
        Self::fp32()
    }
}
