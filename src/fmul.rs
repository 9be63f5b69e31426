//! IEEE-754 single-precision multiply on the DSP48E1 slice.
//!
//! The 24-bit significands do not fit the 25×18 multiplier in one pass, so
//! the B significand is split at bit 17 and the product is assembled over two
//! slice evaluations, the second one folding the first partial product in
//! through the 17-bit-shifted P path (OPMODE Z = 6):
//!
//! ```text
//! P1 = Ma * Mb[23:17]
//! P  = Ma * Mb[16:0] + (P1 << 17)      = Ma * Mb   (48 bits)
//! ```
//!
//! With both hidden bits set the product lies in `[2^46, 2^48)`. Rounding is
//! round-half-to-even. Subnormal operands are read as zero and subnormal
//! results flush to zero; every other case matches `a * b` bit for bit.

use crate::slice::{evaluate, OpMode, SliceControl, SliceInputs};

const SIGN_MASK: u32 = 0x8000_0000;
const EXP_MASK: u32 = 0xFF;
const EXP_SHIFT: u32 = 23;
const FRAC_MASK: u32 = 0x007F_FFFF;
const HIDDEN_BIT: u32 = 1 << EXP_SHIFT;
const QUIET_BIT: u32 = 0x0040_0000;
const EXP_BIAS: i32 = 127;
const EXP_MAX: i32 = 0xFF;

const INFINITY_BITS: u32 = 0x7F80_0000;
const DEFAULT_NAN_BITS: u32 = 0x7FC0_0000;

/// Low part of the split B significand.
const B_SPLIT: u32 = 17;

/// Significand product scale: 1.0 is 2^46.
const PRODUCT_TWO: i64 = 1 << 47;

/// P = A * B
const OP_MULTIPLY: OpMode = OpMode::from_parts(1, 1, 0);

/// P = A * B + (P << 17)
const OP_MULTIPLY_ADD_SHIFTED: OpMode = OpMode::from_parts(1, 1, 6);

#[derive(Debug, Clone, Copy)]
struct Unpacked {
    sign: u32,
    exp: u32,
    frac: u32,
}

impl Unpacked {
    fn new(bits: u32) -> Self {
        Self {
            sign: bits & SIGN_MASK,
            exp: (bits >> EXP_SHIFT) & EXP_MASK,
            frac: bits & FRAC_MASK,
        }
    }

    fn is_nan(&self) -> bool {
        self.exp == EXP_MASK && self.frac != 0
    }

    fn is_infinite(&self) -> bool {
        self.exp == EXP_MASK && self.frac == 0
    }

    /// Zero or subnormal.
    fn is_zero(&self) -> bool {
        self.exp == 0
    }

    fn significand(&self) -> u32 {
        self.frac | HIDDEN_BIT
    }
}

/// Multiply two `f32` values through the slice model.
pub fn fmul(a: f32, b: f32) -> f32 {
    f32::from_bits(fmul_bits(a.to_bits(), b.to_bits()))
}

/// Multiply two IEEE-754 single-precision bit patterns through the slice model.
pub fn fmul_bits(a: u32, b: u32) -> u32 {
    let x = Unpacked::new(a);
    let y = Unpacked::new(b);
    let sign = x.sign ^ y.sign;

    if x.is_nan() {
        return a | QUIET_BIT;
    }
    if y.is_nan() {
        return b | QUIET_BIT;
    }
    if x.is_infinite() || y.is_infinite() {
        if x.is_zero() || y.is_zero() {
            return DEFAULT_NAN_BITS;
        }
        return sign | INFINITY_BITS;
    }
    if x.is_zero() || y.is_zero() {
        return sign;
    }

    let product = significand_product(x.significand(), y.significand());

    let mut exp = x.exp as i32 + y.exp as i32 - EXP_BIAS;
    let shift = if product >= PRODUCT_TWO {
        exp += 1;
        EXP_SHIFT + 1
    } else {
        EXP_SHIFT
    };

    let mut mant = product >> shift;
    let rem = product & ((1i64 << shift) - 1);
    let half = 1i64 << (shift - 1);
    if rem > half || (rem == half && mant & 1 == 1) {
        mant += 1;
    }
    if mant == 1i64 << (EXP_SHIFT + 1) {
        mant >>= 1;
        exp += 1;
    }

    log::trace!(
        "fmul {:#010x} * {:#010x}: product={:#014x} exp={} mant={:#08x}",
        a,
        b,
        product,
        exp,
        mant
    );

    if exp >= EXP_MAX {
        return sign | INFINITY_BITS;
    }
    if exp <= 0 {
        return sign;
    }
    sign | ((exp as u32) << EXP_SHIFT) | (mant as u32 & FRAC_MASK)
}

/// 24×24-bit unsigned product from two slice evaluations.
fn significand_product(ma: u32, mb: u32) -> i64 {
    let b_lo = mb & ((1 << B_SPLIT) - 1);
    let b_hi = mb >> B_SPLIT;

    let high = SliceInputs::new(ma as i64, b_hi as i64, 0, 0);
    let control = SliceControl::from_raw(OP_MULTIPLY.raw(), 0, 0, 0);
    let p1 = evaluate(&high, &control);

    let low = SliceInputs {
        p: p1,
        ..SliceInputs::new(ma as i64, b_lo as i64, 0, 0)
    };
    let control = SliceControl::from_raw(OP_MULTIPLY_ADD_SHIFTED.raw(), 0, 0, 0);
    evaluate(&low, &control)
}
