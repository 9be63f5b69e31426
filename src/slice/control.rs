//! Control-field decoding for the DSP48E1 slice.
//!
//! The slice is configured by four multi-bit fields plus two raw carry bits.
//! Each field is wrapped in a newtype that masks the raw value to its declared
//! width on construction and exposes typed accessors for the sub-fields, so
//! every 7/4/5/3-bit encoding maps to a defined selection.
//!
//! # Field Layout (UG479 Ch2)
//!
//! | Field | Width | Layout |
//! |-------|-------|--------|
//! | OPMODE | 7 | `[6:4]` Z select, `[3:2]` Y select, `[1:0]` X select |
//! | ALUMODE | 4 | arithmetic (low 2 bits) or logic (all 4 bits) function |
//! | INMODE | 5 | `[4]` B1/B2, `[3]` subtract, `[2]` D enable, `[1]` zero A, `[0]` A1/A2 |
//! | CARRYINSEL | 3 | carry-in source |

// ============================================================================
// Field Widths and Bit Positions
// ============================================================================

/// OPMODE field width.
pub const OPMODE_BITS: u32 = 7;

/// ALUMODE field width.
pub const ALUMODE_BITS: u32 = 4;

/// INMODE field width.
pub const INMODE_BITS: u32 = 5;

/// CARRYINSEL field width.
pub const CARRYINSEL_BITS: u32 = 3;

/// OPMODE X select: bits [1:0]
pub const OPMODE_X_SHIFT: u32 = 0;
pub const OPMODE_X_MASK: u8 = 0b11;

/// OPMODE Y select: bits [3:2]
pub const OPMODE_Y_SHIFT: u32 = 2;
pub const OPMODE_Y_MASK: u8 = 0b11;

/// OPMODE Z select: bits [6:4]
pub const OPMODE_Z_SHIFT: u32 = 4;
pub const OPMODE_Z_MASK: u8 = 0b111;

/// INMODE[0]: 1 selects the first A capture (A1), 0 the registered copy (A2).
pub const INMODE_A1_SELECT: u8 = 1 << 0;

/// INMODE[1]: force the selected A to zero.
pub const INMODE_ZERO_A: u8 = 1 << 1;

/// INMODE[2]: enable D into the pre-adder.
pub const INMODE_D_ENABLE: u8 = 1 << 2;

/// INMODE[3]: pre-adder computes D - A instead of D + A.
pub const INMODE_SUBTRACT: u8 = 1 << 3;

/// INMODE[4]: 1 selects the first B capture (B1), 0 the registered copy (B2).
pub const INMODE_B1_SELECT: u8 = 1 << 4;

#[inline]
const fn field_mask(bits: u32) -> u8 {
    ((1u16 << bits) - 1) as u8
}

// ============================================================================
// OPMODE
// ============================================================================

/// X multiplexer selection (OPMODE[1:0]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XSelect {
    /// Constant zero.
    Zero,
    /// Multiplier partial product (legal only together with `YSelect::Multiplier`).
    Multiplier,
    /// Accumulator feedback (P).
    P,
    /// A:B concatenation.
    Concat,
}

/// Y multiplexer selection (OPMODE[3:2]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YSelect {
    /// Constant zero.
    Zero,
    /// Multiplier partial product (legal only together with `XSelect::Multiplier`).
    Multiplier,
    /// All 48 bits set.
    AllOnes,
    /// C operand.
    C,
}

/// Z multiplexer selection (OPMODE[6:4]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZSelect {
    /// Constant zero.
    Zero,
    /// Cascade input (PCIN).
    Pcin,
    /// Accumulator feedback (P).
    P,
    /// C operand.
    C,
    /// P, only when X selects zero and Y selects all-ones (MACC extend).
    PMaccExtend,
    /// PCIN shifted by 17.
    PcinShifted,
    /// P shifted by 17.
    PShifted,
    /// Reserved encoding (7).
    Reserved,
}

/// OPMODE control field (7 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OpMode(u8);

impl OpMode {
    /// Wrap a raw value, keeping the low 7 bits.
    pub const fn new(raw: u8) -> Self {
        Self(raw & field_mask(OPMODE_BITS))
    }

    /// Build from the three sub-field codes.
    pub const fn from_parts(x: u8, y: u8, z: u8) -> Self {
        Self::new(
            ((z & OPMODE_Z_MASK) << OPMODE_Z_SHIFT)
                | ((y & OPMODE_Y_MASK) << OPMODE_Y_SHIFT)
                | ((x & OPMODE_X_MASK) << OPMODE_X_SHIFT),
        )
    }

    /// Raw field value.
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// X select code (0-3).
    pub const fn x_code(self) -> u8 {
        (self.0 >> OPMODE_X_SHIFT) & OPMODE_X_MASK
    }

    /// Y select code (0-3).
    pub const fn y_code(self) -> u8 {
        (self.0 >> OPMODE_Y_SHIFT) & OPMODE_Y_MASK
    }

    /// Z select code (0-7).
    pub const fn z_code(self) -> u8 {
        (self.0 >> OPMODE_Z_SHIFT) & OPMODE_Z_MASK
    }

    pub fn x(self) -> XSelect {
        match self.x_code() {
            0 => XSelect::Zero,
            1 => XSelect::Multiplier,
            2 => XSelect::P,
            _ => XSelect::Concat,
        }
    }

    pub fn y(self) -> YSelect {
        match self.y_code() {
            0 => YSelect::Zero,
            1 => YSelect::Multiplier,
            2 => YSelect::AllOnes,
            _ => YSelect::C,
        }
    }

    pub fn z(self) -> ZSelect {
        match self.z_code() {
            0 => ZSelect::Zero,
            1 => ZSelect::Pcin,
            2 => ZSelect::P,
            3 => ZSelect::C,
            4 => ZSelect::PMaccExtend,
            5 => ZSelect::PcinShifted,
            6 => ZSelect::PShifted,
            _ => ZSelect::Reserved,
        }
    }

    /// Whether the multiplier output is routed (X and Y both select it).
    pub fn uses_multiplier(self) -> bool {
        self.x() == XSelect::Multiplier && self.y() == YSelect::Multiplier
    }

    /// Whether the second stage runs the three-input adder (Y = 1 or 3).
    pub fn is_arithmetic(self) -> bool {
        matches!(self.y(), YSelect::Multiplier | YSelect::C)
    }
}

// ============================================================================
// ALUMODE
// ============================================================================

/// Three-input arithmetic function (ALUMODE 0-3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithFunction {
    /// Z + X + Y + CIN
    Add,
    /// X + Y + NOT(Z) + CIN
    AddNotZ,
    /// NOT(Z + X + Y + CIN)
    NotAdd,
    /// Z - (X + Y + CIN)
    Subtract,
}

/// Two-input bitwise function of X and Z.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicFunction {
    Xor,
    Xnor,
    And,
    /// X AND NOT(Z)
    AndNotZ,
    Nand,
    /// NOT(X) OR Z
    NotXOrZ,
    Or,
    /// X OR NOT(Z)
    OrNotZ,
    Nor,
    /// NOT(X) AND Z
    NotXAndZ,
}

impl LogicFunction {
    /// Apply the function to two operands.
    pub fn apply(self, x: i64, z: i64) -> i64 {
        match self {
            LogicFunction::Xor => x ^ z,
            LogicFunction::Xnor => !(x ^ z),
            LogicFunction::And => x & z,
            LogicFunction::AndNotZ => x & !z,
            LogicFunction::Nand => !(x & z),
            LogicFunction::NotXOrZ => !x | z,
            LogicFunction::Or => x | z,
            LogicFunction::OrNotZ => x | !z,
            LogicFunction::Nor => !(x | z),
            LogicFunction::NotXAndZ => !x & z,
        }
    }
}

/// ALUMODE control field (4 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AluMode(u8);

impl AluMode {
    pub const ADD: AluMode = AluMode(0b0000);
    pub const ADD_NOT_Z: AluMode = AluMode(0b0001);
    pub const NOT_ADD: AluMode = AluMode(0b0010);
    pub const SUBTRACT: AluMode = AluMode(0b0011);

    /// Wrap a raw value, keeping the low 4 bits.
    pub const fn new(raw: u8) -> Self {
        Self(raw & field_mask(ALUMODE_BITS))
    }

    /// Raw field value.
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Arithmetic function, or `None` for the reserved codes 4-15.
    pub fn arithmetic(self) -> Option<ArithFunction> {
        match self {
            AluMode::ADD => Some(ArithFunction::Add),
            AluMode::ADD_NOT_Z => Some(ArithFunction::AddNotZ),
            AluMode::NOT_ADD => Some(ArithFunction::NotAdd),
            AluMode::SUBTRACT => Some(ArithFunction::Subtract),
            _ => None,
        }
    }

    /// Logic function for the given Y selection, or `None` for reserved codes.
    ///
    /// The Y = all-ones column mirrors the Y = 0 column: XOR and XNOR swap and
    /// the AND family becomes the OR family.
    pub fn logic(self, y: YSelect) -> Option<LogicFunction> {
        let inverted = match y {
            YSelect::Zero => false,
            YSelect::AllOnes => true,
            YSelect::Multiplier | YSelect::C => return None,
        };

        let function = match (self.0, inverted) {
            (0b0100, false) | (0b0111, false) => LogicFunction::Xor,
            (0b0101, false) | (0b0110, false) => LogicFunction::Xnor,
            (0b1100, false) => LogicFunction::And,
            (0b1101, false) => LogicFunction::AndNotZ,
            (0b1110, false) => LogicFunction::Nand,
            (0b1111, false) => LogicFunction::NotXOrZ,
            (0b0100, true) | (0b0111, true) => LogicFunction::Xnor,
            (0b0101, true) | (0b0110, true) => LogicFunction::Xor,
            (0b1100, true) => LogicFunction::Or,
            (0b1101, true) => LogicFunction::OrNotZ,
            (0b1110, true) => LogicFunction::Nor,
            (0b1111, true) => LogicFunction::NotXAndZ,
            _ => return None,
        };
        Some(function)
    }
}

// ============================================================================
// INMODE
// ============================================================================

/// Which captured copy of an input operand is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capture {
    /// First capture (A1 / B1).
    First,
    /// Registered copy (A2 / B2).
    Second,
}

/// INMODE control field (5 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct InMode(u8);

impl InMode {
    /// Wrap a raw value, keeping the low 5 bits.
    pub const fn new(raw: u8) -> Self {
        Self(raw & field_mask(INMODE_BITS))
    }

    /// Raw field value.
    pub const fn raw(self) -> u8 {
        self.0
    }

    pub const fn a_capture(self) -> Capture {
        if self.0 & INMODE_A1_SELECT != 0 {
            Capture::First
        } else {
            Capture::Second
        }
    }

    pub const fn zero_a(self) -> bool {
        self.0 & INMODE_ZERO_A != 0
    }

    pub const fn d_enabled(self) -> bool {
        self.0 & INMODE_D_ENABLE != 0
    }

    pub const fn subtract(self) -> bool {
        self.0 & INMODE_SUBTRACT != 0
    }

    pub const fn b_capture(self) -> Capture {
        if self.0 & INMODE_B1_SELECT != 0 {
            Capture::First
        } else {
            Capture::Second
        }
    }
}

// ============================================================================
// CARRYINSEL
// ============================================================================

/// Carry-in source (CARRYINSEL).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarrySource {
    /// External CARRYIN bit.
    CarryIn,
    /// NOT PCIN[47] (round cascade towards infinity).
    NotPcinSign,
    /// CARRYCASCIN from the neighbouring slice.
    CarryCascIn,
    /// PCIN[47] (round cascade towards zero).
    PcinSign,
    /// CARRYCASCOUT fed back.
    CarryCascOut,
    /// NOT P[47] (round accumulator towards infinity).
    NotPSign,
    /// A[24] XOR B[17] (symmetric multiplier rounding).
    MultiplierSign,
    /// P[47] (round accumulator towards zero).
    PSign,
}

/// CARRYINSEL control field (3 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CarryInSel(u8);

impl CarryInSel {
    /// Wrap a raw value, keeping the low 3 bits.
    pub const fn new(raw: u8) -> Self {
        Self(raw & field_mask(CARRYINSEL_BITS))
    }

    /// Raw field value.
    pub const fn raw(self) -> u8 {
        self.0
    }

    pub fn source(self) -> CarrySource {
        match self.0 {
            0 => CarrySource::CarryIn,
            1 => CarrySource::NotPcinSign,
            2 => CarrySource::CarryCascIn,
            3 => CarrySource::PcinSign,
            4 => CarrySource::CarryCascOut,
            5 => CarrySource::NotPSign,
            6 => CarrySource::MultiplierSign,
            _ => CarrySource::PSign,
        }
    }
}

// ============================================================================
// Combined Control
// ============================================================================

/// All control inputs for one slice evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SliceControl {
    pub opmode: OpMode,
    pub alumode: AluMode,
    pub inmode: InMode,
    pub carryinsel: CarryInSel,
    /// Raw CARRYIN bit.
    pub carryin: bool,
    /// Raw CARRYCASCIN bit.
    pub carrycascin: bool,
}

impl SliceControl {
    /// Control word from raw field values (each masked to its width).
    pub const fn from_raw(opmode: u8, alumode: u8, inmode: u8, carryinsel: u8) -> Self {
        Self {
            opmode: OpMode::new(opmode),
            alumode: AluMode::new(alumode),
            inmode: InMode::new(inmode),
            carryinsel: CarryInSel::new(carryinsel),
            carryin: false,
            carrycascin: false,
        }
    }

    /// Set the raw carry bits.
    pub const fn with_carries(mut self, carryin: bool, carrycascin: bool) -> Self {
        self.carryin = carryin;
        self.carrycascin = carrycascin;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
