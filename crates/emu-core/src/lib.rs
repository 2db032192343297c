//! Core traits and types for host-bus Z80 emulation.
//!
//! A CPU core never touches memory directly. Every opcode fetch, operand
//! fetch, read, write and port access goes through a [`Bus`], which decides
//! whether the cycle is serviced locally or forwarded to real hardware.

mod bus;
mod cpu;
mod observable;

pub use bus::{Bus, RegisterView, SimpleBus};
pub use cpu::Cpu;
pub use observable::{Observable, Value};
