//! 8-bit ALU operations.

use crate::flags::{CF, HF, NF, PF, XF, YF, sz53, sz53p};

/// Result of an ALU operation with flags.
#[derive(Debug, Clone, Copy)]
pub struct AluResult {
    pub value: u8,
    pub flags: u8,
}

#[must_use]
pub fn add8(a: u8, b: u8, carry: bool) -> AluResult {
    let c = u8::from(carry);
    let wide = u16::from(a) + u16::from(b) + u16::from(c);
    let value = wide as u8;
    let mut flags = sz53(value);
    if (a & 0x0F) + (b & 0x0F) + c > 0x0F {
        flags |= HF;
    }
    if (a ^ b) & 0x80 == 0 && (a ^ value) & 0x80 != 0 {
        flags |= PF;
    }
    if wide > 0xFF {
        flags |= CF;
    }
    AluResult { value, flags }
}

#[must_use]
pub fn sub8(a: u8, b: u8, carry: bool) -> AluResult {
    let c = u8::from(carry);
    let value = a.wrapping_sub(b).wrapping_sub(c);
    let mut flags = sz53(value) | NF;
    if (a & 0x0F) < (b & 0x0F) + c {
        flags |= HF;
    }
    if (a ^ b) & 0x80 != 0 && (a ^ value) & 0x80 != 0 {
        flags |= PF;
    }
    if u16::from(a) < u16::from(b) + u16::from(c) {
        flags |= CF;
    }
    AluResult { value, flags }
}

/// Dispatch one of the eight accumulator operations by its opcode field
/// (ADD, ADC, SUB, SBC, AND, XOR, OR, CP).
#[must_use]
pub fn accumulate(op: u8, a: u8, operand: u8, carry_in: bool) -> AluResult {
    match op & 7 {
        0 => add8(a, operand, false),
        1 => add8(a, operand, carry_in),
        2 => sub8(a, operand, false),
        3 => sub8(a, operand, carry_in),
        4 => {
            let value = a & operand;
            AluResult {
                value,
                flags: sz53p(value) | HF,
            }
        }
        5 => {
            let value = a ^ operand;
            AluResult {
                value,
                flags: sz53p(value),
            }
        }
        6 => {
            let value = a | operand;
            AluResult {
                value,
                flags: sz53p(value),
            }
        }
        _ => {
            // CP: flags of the subtraction, X/Y from the operand, A unchanged.
            let result = sub8(a, operand, false);
            AluResult {
                value: a,
                flags: (result.flags & !(XF | YF)) | (operand & (XF | YF)),
            }
        }
    }
}

/// INC r. Carry is preserved by the caller.
#[must_use]
pub fn inc8(value: u8) -> AluResult {
    let result = value.wrapping_add(1);
    let mut flags = sz53(result);
    if value & 0x0F == 0x0F {
        flags |= HF;
    }
    if value == 0x7F {
        flags |= PF;
    }
    AluResult {
        value: result,
        flags,
    }
}

/// DEC r. Carry is preserved by the caller.
#[must_use]
pub fn dec8(value: u8) -> AluResult {
    let result = value.wrapping_sub(1);
    let mut flags = sz53(result) | NF;
    if value & 0x0F == 0 {
        flags |= HF;
    }
    if value == 0x80 {
        flags |= PF;
    }
    AluResult {
        value: result,
        flags,
    }
}
