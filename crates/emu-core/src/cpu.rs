//! CPU core trait.

use crate::Bus;

/// A CPU core.
///
/// CPUs execute whole instructions against a borrowed bus. The bus decides
/// where each cycle goes, so the same core runs against flat test memory or
/// against a machine whose address space is split between local copies and
/// real hardware.
pub trait Cpu {
    /// The type used for register inspection.
    type Registers;

    /// Execute one instruction, or accept one pending interrupt.
    ///
    /// Returns the number of T-states the instruction takes on a real part.
    fn step<B: Bus>(&mut self, bus: &mut B) -> u32;

    /// Returns the current program counter.
    fn pc(&self) -> u16;

    /// Move execution to `pc`. Clears the HALT state.
    fn set_pc(&mut self, pc: u16);

    /// Returns a snapshot of all registers for inspection.
    fn registers(&self) -> Self::Registers;

    /// Returns true if the CPU is halted.
    fn is_halted(&self) -> bool;

    /// Request a maskable interrupt. Returns true if accepted.
    fn interrupt(&mut self) -> bool;

    /// Request a non-maskable interrupt.
    fn nmi(&mut self);

    /// Reset the CPU to its power-on state.
    fn reset(&mut self);
}
