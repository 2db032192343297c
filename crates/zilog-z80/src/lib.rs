//! Instruction-stepped Z80 core.
//!
//! Each call to `step()` executes one whole instruction against a borrowed
//! bus. The core covers the loads, arithmetic, control flow and the complete
//! I/O group; it exists to drive a host bus, not to pass exhaustive
//! instruction suites. Opcodes outside the implemented set execute as NOP.
//!
//! The I/O group is decoded through [`io_group::decode`], which is public so
//! a bus can predict the exact port cycle an instruction is about to make.

mod alu;
mod cpu;
mod flags;
pub mod io_group;
mod registers;

pub use cpu::Z80;
pub use flags::{CF, HF, NF, PF, SF, XF, YF, ZF};
pub use io_group::IoAccess;
pub use registers::Registers;
