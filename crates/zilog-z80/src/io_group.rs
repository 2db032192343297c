//! Decode table for the Z80 I/O instruction group.
//!
//! The CPU executes every port instruction through [`decode`], and a bus
//! that wants to start a port cycle early calls the same function with the
//! same bytes and registers. Both sides therefore always agree on the port,
//! the data and the memory address involved.

use emu_core::RegisterView;

/// The port cycle an I/O instruction performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoAccess {
    /// `IN r,(C)`, `IN (C)` or `IN A,(n)`.
    In { port: u16 },
    /// `OUT (C),r`, `OUT (C),0` or `OUT (n),A`.
    Out { port: u16, value: u8 },
    /// One iteration of INI/IND/INIR/INDR.
    BlockIn {
        port: u16,
        dest: u16,
        decrement: bool,
        repeat: bool,
    },
    /// One iteration of OUTI/OUTD/OTIR/OTDR. B is decremented before the
    /// port address is driven, so `port` carries the new B.
    BlockOut {
        port: u16,
        src: u16,
        decrement: bool,
        repeat: bool,
    },
}

impl IoAccess {
    /// The 16-bit port address the cycle drives.
    #[must_use]
    pub const fn port(&self) -> u16 {
        match *self {
            IoAccess::In { port }
            | IoAccess::Out { port, .. }
            | IoAccess::BlockIn { port, .. }
            | IoAccess::BlockOut { port, .. } => port,
        }
    }

    /// True for cycles that read from the port.
    #[must_use]
    pub const fn is_input(&self) -> bool {
        matches!(self, IoAccess::In { .. } | IoAccess::BlockIn { .. })
    }
}

/// First bytes that can start an I/O instruction.
#[must_use]
pub const fn is_candidate(opcode: u8) -> bool {
    matches!(opcode, 0xD3 | 0xDB | 0xED)
}

/// Decode an I/O instruction from its first byte and the byte after it
/// (the ED suffix or the immediate port number).
///
/// Returns `None` for anything outside the I/O group.
#[must_use]
pub fn decode(opcode: u8, next: u8, regs: &RegisterView) -> Option<IoAccess> {
    match opcode {
        // IN A,(n): A drives the upper address byte
        0xDB => Some(IoAccess::In {
            port: u16::from_be_bytes([regs.a, next]),
        }),
        // OUT (n),A
        0xD3 => Some(IoAccess::Out {
            port: u16::from_be_bytes([regs.a, next]),
            value: regs.a,
        }),
        0xED => decode_ed(next, regs),
        _ => None,
    }
}

fn decode_ed(op: u8, regs: &RegisterView) -> Option<IoAccess> {
    match op {
        0x40 | 0x48 | 0x50 | 0x58 | 0x60 | 0x68 | 0x70 | 0x78 => {
            Some(IoAccess::In { port: regs.bc() })
        }
        0x41 | 0x49 | 0x51 | 0x59 | 0x61 | 0x69 | 0x71 | 0x79 => Some(IoAccess::Out {
            port: regs.bc(),
            value: regs.by_index(op >> 3),
        }),
        0xA2 | 0xAA | 0xB2 | 0xBA => Some(IoAccess::BlockIn {
            port: regs.bc(),
            dest: regs.hl(),
            decrement: op & 0x08 != 0,
            repeat: op & 0x10 != 0,
        }),
        0xA3 | 0xAB | 0xB3 | 0xBB => Some(IoAccess::BlockOut {
            port: u16::from_be_bytes([regs.b.wrapping_sub(1), regs.c]),
            src: regs.hl(),
            decrement: op & 0x08 != 0,
            repeat: op & 0x10 != 0,
        }),
        _ => None,
    }
}
