//! Z80 flag register bits.

/// Sign flag (bit 7) - set if result is negative.
pub const SF: u8 = 0b1000_0000;

/// Zero flag (bit 6) - set if result is zero.
pub const ZF: u8 = 0b0100_0000;

/// Undocumented flag (bit 5) - copy of bit 5 of result.
pub const YF: u8 = 0b0010_0000;

/// Half-carry flag (bit 4) - carry from bit 3 to bit 4.
pub const HF: u8 = 0b0001_0000;

/// Undocumented flag (bit 3) - copy of bit 3 of result.
pub const XF: u8 = 0b0000_1000;

/// Parity/Overflow flag (bit 2).
pub const PF: u8 = 0b0000_0100;

/// Add/Subtract flag (bit 1).
pub const NF: u8 = 0b0000_0010;

/// Carry flag (bit 0).
pub const CF: u8 = 0b0000_0001;

/// Sign, zero and undocumented bits for a result.
#[must_use]
pub const fn sz53(value: u8) -> u8 {
    let mut f = value & (SF | YF | XF);
    if value == 0 {
        f |= ZF;
    }
    f
}

/// `sz53` plus even parity in P/V.
#[must_use]
pub const fn sz53p(value: u8) -> u8 {
    let mut f = sz53(value);
    if value.count_ones().is_multiple_of(2) {
        f |= PF;
    }
    f
}
