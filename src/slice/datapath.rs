//! Combinational datapath of one DSP48E1 slice.
//!
//! One evaluation walks the operand path the way the hardware does:
//!
//! ```text
//!  A1/A2 ──► A select ──┬──────────────────────────────┐
//!                       ▼                              │ A:B
//!  D ──────────────► pre-adder ──► multiplier ◄── B select ◄── B1/B2
//!                                     │ M
//!                       ┌─────────────┼──────────────┐
//!                       ▼             ▼              ▼
//!                     X mux         Y mux          Z mux ◄── P, PCIN, C
//!                       └─────────► ALU ◄────────────┘ ◄── carry select
//!                                    │
//!                                    ▼ P (48 bits)
//! ```
//!
//! The model holds no state: registers, clock enables and resets of the real
//! slice are the caller's business. Reserved encodings resolve to the values
//! documented on each multiplexer, never to a panic.

use super::control::{
    ArithFunction, Capture, CarrySource, LogicFunction, SliceControl, XSelect, YSelect, ZSelect,
};
use super::operand::{
    bit, mask, sign_extend, A_PREADDER_WIDTH, A_WIDTH, AB_WIDTH, B_WIDTH, CASCADE_SHIFT, C_WIDTH,
    D_WIDTH, P_MASK, P_SIGN_BIT, P_WIDTH,
};

/// Bit of the selected A that feeds the multiplier-sign carry (A[24]).
const A_CARRY_BIT: u32 = A_PREADDER_WIDTH - 1;

/// Bit of the selected B that feeds the multiplier-sign carry (B[17]).
const B_CARRY_BIT: u32 = B_WIDTH - 1;

/// Operand and feedback ports for one evaluation.
///
/// Values may be given either as raw bit patterns or as signed integers; each
/// port is masked to its width and sign-extended before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SliceInputs {
    /// First A capture (30 bits).
    pub a1: i64,
    /// Registered A copy (30 bits).
    pub a2: i64,
    /// First B capture (18 bits).
    pub b1: i64,
    /// Registered B copy (18 bits).
    pub b2: i64,
    /// C operand (48 bits).
    pub c: i64,
    /// D operand (25 bits).
    pub d: i64,
    /// Accumulator feedback: the previous P output (48 bits).
    pub p: i64,
    /// Cascade input from the neighbouring slice (48 bits).
    pub pcin: i64,
    /// Cascade carry-out fed back to the carry select.
    pub carrycascout: bool,
}

impl SliceInputs {
    /// Inputs with A and B driven on the registered copies (A2/B2).
    pub fn new(a: i64, b: i64, c: i64, d: i64) -> Self {
        Self {
            a2: a,
            b2: b,
            c,
            d,
            ..Self::default()
        }
    }
}

/// Every intermediate of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceTrace {
    /// Selected A, sign-extended from 30 bits (zero when forced).
    pub a: i64,
    /// Selected B, sign-extended from 18 bits.
    pub b: i64,
    /// Pre-adder output (25 bits, sign-extended).
    pub preadder: i64,
    /// Full multiplier product.
    pub product: i64,
    /// X multiplexer output.
    pub x: i64,
    /// Y multiplexer output.
    pub y: i64,
    /// Z multiplexer output.
    pub z: i64,
    /// Carry-in bit (0 or 1).
    pub carry: i64,
    /// Second-stage function, `None` when the encoding is reserved.
    pub function: Option<AluFunction>,
    /// Low 48 bits of the ALU output.
    pub p: i64,
}

/// Function performed by the second stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluFunction {
    Arithmetic(ArithFunction),
    Logic(LogicFunction),
}

/// Multiplier output as two partial products.
///
/// The hardware hands the X and Y multiplexers two partial products whose sum
/// is the product; here the whole product rides on the X half.
#[derive(Debug, Clone, Copy)]
struct PartialProducts {
    x: i64,
    y: i64,
}

impl PartialProducts {
    fn new(product: i64) -> Self {
        Self { x: product, y: 0 }
    }
}

/// Evaluate the slice and return the 48-bit P output.
///
/// The result is the low 48 bits as a non-negative `i64`; use
/// [`super::operand::p_to_signed`] to read it as a signed value.
pub fn evaluate(inputs: &SliceInputs, control: &SliceControl) -> i64 {
    evaluate_traced(inputs, control).p
}

/// Evaluate the slice and return every intermediate value.
pub fn evaluate_traced(inputs: &SliceInputs, control: &SliceControl) -> SliceTrace {
    let a = select_a(inputs, control);
    let b = select_b(inputs, control);
    let preadder = pre_adder(a, inputs.d, control);
    let product = preadder * b;
    let partials = PartialProducts::new(product);

    let p_feedback = sign_extend(inputs.p, P_WIDTH);
    let pcin = sign_extend(inputs.pcin, P_WIDTH);
    let c = sign_extend(inputs.c, C_WIDTH);

    let opmode = control.opmode;
    let x = x_mux(opmode.x(), opmode.y(), &partials, p_feedback, concat_ab(a, b));
    let y = y_mux(opmode.y(), opmode.x(), &partials, c);
    let z = z_mux(opmode.z(), opmode.x(), opmode.y(), p_feedback, pcin, c);
    let carry = carry_in(control, inputs, a, b);

    let (function, result) = alu(control, x, y, z, carry);
    let p = result & P_MASK;

    log::trace!(
        "slice opmode={:07b} alumode={:04b} inmode={:05b} carryinsel={:03b}: \
         a={} b={} ad={} m={} x={:#x} y={:#x} z={:#x} cin={} -> p={:#014x}",
        opmode.raw(),
        control.alumode.raw(),
        control.inmode.raw(),
        control.carryinsel.raw(),
        a,
        b,
        preadder,
        product,
        x,
        y,
        z,
        carry,
        p
    );

    SliceTrace {
        a,
        b,
        preadder,
        product,
        x,
        y,
        z,
        carry,
        function,
        p,
    }
}

// ============================================================================
// Operand Selection
// ============================================================================

fn select_a(inputs: &SliceInputs, control: &SliceControl) -> i64 {
    if control.inmode.zero_a() {
        return 0;
    }
    let raw = match control.inmode.a_capture() {
        Capture::First => inputs.a1,
        Capture::Second => inputs.a2,
    };
    sign_extend(raw, A_WIDTH)
}

fn select_b(inputs: &SliceInputs, control: &SliceControl) -> i64 {
    let raw = match control.inmode.b_capture() {
        Capture::First => inputs.b1,
        Capture::Second => inputs.b2,
    };
    sign_extend(raw, B_WIDTH)
}

/// D ± A on the 25-bit pre-adder.
fn pre_adder(a: i64, d: i64, control: &SliceControl) -> i64 {
    let a = sign_extend(a, A_PREADDER_WIDTH);
    let d = if control.inmode.d_enabled() {
        sign_extend(d, D_WIDTH)
    } else {
        0
    };
    let sum = if control.inmode.subtract() { d - a } else { d + a };
    sign_extend(sum, A_PREADDER_WIDTH)
}

/// A in bits 47:18, B in bits 17:0.
fn concat_ab(a: i64, b: i64) -> i64 {
    let ab = ((a & mask(A_WIDTH)) << B_WIDTH) | (b & mask(B_WIDTH));
    sign_extend(ab, AB_WIDTH)
}

// ============================================================================
// Second-Stage Multiplexers
// ============================================================================

fn x_mux(x: XSelect, y: YSelect, partials: &PartialProducts, p: i64, ab: i64) -> i64 {
    match x {
        XSelect::Zero => 0,
        XSelect::Multiplier if y == YSelect::Multiplier => partials.x,
        XSelect::Multiplier => 0,
        XSelect::P => p,
        XSelect::Concat => ab,
    }
}

fn y_mux(y: YSelect, x: XSelect, partials: &PartialProducts, c: i64) -> i64 {
    match y {
        YSelect::Zero => 0,
        YSelect::Multiplier if x == XSelect::Multiplier => partials.y,
        YSelect::Multiplier => 0,
        YSelect::AllOnes => P_MASK,
        YSelect::C => c,
    }
}

fn z_mux(z: ZSelect, x: XSelect, y: YSelect, p: i64, pcin: i64, c: i64) -> i64 {
    match z {
        ZSelect::Zero => 0,
        ZSelect::Pcin => pcin,
        ZSelect::P => p,
        ZSelect::C => c,
        ZSelect::PMaccExtend if x == XSelect::Zero && y == YSelect::AllOnes => p,
        ZSelect::PMaccExtend => 0,
        ZSelect::PcinShifted => pcin.wrapping_shl(CASCADE_SHIFT),
        ZSelect::PShifted => p.wrapping_shl(CASCADE_SHIFT),
        ZSelect::Reserved => 0,
    }
}

fn carry_in(control: &SliceControl, inputs: &SliceInputs, a: i64, b: i64) -> i64 {
    let pcin_sign = bit(inputs.pcin, P_SIGN_BIT);
    let p_sign = bit(inputs.p, P_SIGN_BIT);
    match control.carryinsel.source() {
        CarrySource::CarryIn => control.carryin as i64,
        CarrySource::NotPcinSign => pcin_sign ^ 1,
        CarrySource::CarryCascIn => control.carrycascin as i64,
        CarrySource::PcinSign => pcin_sign,
        CarrySource::CarryCascOut => inputs.carrycascout as i64,
        CarrySource::NotPSign => p_sign ^ 1,
        CarrySource::MultiplierSign => bit(a, A_CARRY_BIT) ^ bit(b, B_CARRY_BIT),
        CarrySource::PSign => p_sign,
    }
}

// ============================================================================
// Second-Stage ALU
// ============================================================================

fn alu(control: &SliceControl, x: i64, y: i64, z: i64, carry: i64) -> (Option<AluFunction>, i64) {
    let opmode = control.opmode;
    if opmode.is_arithmetic() {
        let Some(function) = control.alumode.arithmetic() else {
            return (None, 0);
        };
        let xyc = x.wrapping_add(y).wrapping_add(carry);
        let result = match function {
            ArithFunction::Add => xyc.wrapping_add(z),
            ArithFunction::AddNotZ => xyc.wrapping_add(!z),
            ArithFunction::NotAdd => !xyc.wrapping_add(z),
            ArithFunction::Subtract => z.wrapping_sub(xyc),
        };
        (Some(AluFunction::Arithmetic(function)), result)
    } else {
        match control.alumode.logic(opmode.y()) {
            Some(function) => (Some(AluFunction::Logic(function)), function.apply(x, z)),
            None => (None, 0),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
