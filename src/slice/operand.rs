//! Operand port widths and two's-complement helpers.
//!
//! Every slice port is a fixed-width two's-complement field. Values handed to
//! the datapath are masked to the declared width and sign-extended to the
//! 64-bit working width before any arithmetic, so a caller may pass either a
//! raw bit pattern (`0x3FFF_FFFF` for A) or the signed value (`-1`) and get the
//! same result.

// ============================================================================
// Port Widths (UG479 Ch2)
// ============================================================================

/// A port width (A register, A:B concatenation).
pub const A_WIDTH: u32 = 30;

/// A view seen by the pre-adder and multiplier.
pub const A_PREADDER_WIDTH: u32 = 25;

/// B port width.
pub const B_WIDTH: u32 = 18;

/// C port width.
pub const C_WIDTH: u32 = 48;

/// D port width.
pub const D_WIDTH: u32 = 25;

/// P output, PCIN cascade and ALU width.
pub const P_WIDTH: u32 = 48;

/// Width of the A:B concatenation fed to the X multiplexer.
pub const AB_WIDTH: u32 = A_WIDTH + B_WIDTH;

/// Shift applied by the Z multiplexer's wide-cascade selections.
pub const CASCADE_SHIFT: u32 = 17;

/// Low 48 bits set.
pub const P_MASK: i64 = mask(P_WIDTH);

/// Bit index of the P/PCIN sign bit.
pub const P_SIGN_BIT: u32 = P_WIDTH - 1;

// ============================================================================
// Helper Functions
// ============================================================================

/// Mask with the low `width` bits set.
#[inline]
pub const fn mask(width: u32) -> i64 {
    if width >= 64 {
        -1
    } else {
        (1i64 << width) - 1
    }
}

/// Truncate `value` to `width` bits and sign-extend the result to 64 bits.
///
/// Width must be in `1..=64`.
#[inline]
pub const fn sign_extend(value: i64, width: u32) -> i64 {
    let shift = 64 - width;
    value.wrapping_shl(shift).wrapping_shr(shift)
}

/// Extract a single bit as 0 or 1.
#[inline]
pub const fn bit(value: i64, index: u32) -> i64 {
    (value >> index) & 1
}

/// Reinterpret a 48-bit P result as a signed value.
#[inline]
pub const fn p_to_signed(p: i64) -> i64 {
    sign_extend(p, P_WIDTH)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const WIDTHS: [u32; 6] = [A_WIDTH, A_PREADDER_WIDTH, B_WIDTH, C_WIDTH, D_WIDTH, AB_WIDTH];

    #[test]
    fn test_mask_widths() {
        assert_eq!(mask(18), 0x3FFFF);
        assert_eq!(mask(25), 0x1FF_FFFF);
        assert_eq!(mask(30), 0x3FFF_FFFF);
        assert_eq!(P_MASK, 0xFFFF_FFFF_FFFF);
        assert_eq!(mask(64), -1);
    }

    #[test]
    fn test_sign_extend_positive_unchanged() {
        for width in WIDTHS {
            let max = mask(width - 1);
            for value in [0, 1, 5, max / 2, max] {
                assert_eq!(sign_extend(value, width), value, "width {}", width);
            }
        }
    }

    #[test]
    fn test_sign_extend_negative_matches_low_bits() {
        for width in WIDTHS {
            let top = 1i64 << (width - 1);
            for low in [0, 1, 0x55, top - 1] {
                let raw = top | low;
                let extended = sign_extend(raw, width);
                assert!(extended < 0, "width {} raw {:#x}", width, raw);
                // Same low bits, and value = raw - 2^width
                assert_eq!(extended & mask(width), raw);
                assert_eq!(extended, raw - (1i64 << width));
            }
        }
    }

    #[test]
    fn test_sign_extend_discards_bits_above_width() {
        // Junk above bit 17 must not leak into an 18-bit B operand
        assert_eq!(sign_extend(0x7_FFFC_0005, B_WIDTH), 5);
        assert_eq!(sign_extend(-1, B_WIDTH), -1);
        assert_eq!(sign_extend(0x3FFFF, B_WIDTH), -1);
        assert_eq!(sign_extend(0x20000, B_WIDTH), -(1 << 17));
    }

    #[test]
    fn test_bit_and_p_to_signed() {
        assert_eq!(bit(0x8000_0000_0000, P_SIGN_BIT), 1);
        assert_eq!(bit(0x7FFF_FFFF_FFFF, P_SIGN_BIT), 0);
        assert_eq!(bit(-1, 0), 1);
        assert_eq!(p_to_signed(P_MASK), -1);
        assert_eq!(p_to_signed(0xFFFF_FFFF_FFF1), -15);
        assert_eq!(p_to_signed(42), 42);
    }
}
