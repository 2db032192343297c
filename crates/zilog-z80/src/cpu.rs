//! Z80 CPU core, one instruction per step.

mod execute;

use emu_core::{Bus, Cpu, Observable, Value};

use crate::registers::Registers;

/// Z80 CPU.
///
/// The CPU does not own the bus. The bus is passed to `step()` so the same
/// core can run against flat memory in tests or against a split host bus.
pub struct Z80 {
    pub(crate) regs: Registers,
    /// EI takes effect after the following instruction.
    ei_delay: bool,
    int_pending: bool,
    nmi_pending: bool,
    /// Instructions executed since reset.
    instructions: u64,
}

impl Z80 {
    #[must_use]
    pub fn new() -> Self {
        Self {
            regs: Registers::default(),
            ei_delay: false,
            int_pending: false,
            nmi_pending: false,
            instructions: 0,
        }
    }

    /// Mutable register access for loaders and tests.
    pub fn regs_mut(&mut self) -> &mut Registers {
        &mut self.regs
    }

    #[must_use]
    pub const fn instructions(&self) -> u64 {
        self.instructions
    }

    fn fetch_byte<B: Bus>(&mut self, bus: &mut B) -> u8 {
        let value = bus.fetch(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        value
    }

    fn fetch_word<B: Bus>(&mut self, bus: &mut B) -> u16 {
        let lo = self.fetch_byte(bus);
        let hi = self.fetch_byte(bus);
        u16::from_le_bytes([lo, hi])
    }

    /// M1 fetch at PC; bumps the refresh counter.
    fn fetch_opcode<B: Bus>(&mut self, bus: &mut B) -> u8 {
        let opcode = bus.fetch_opcode(self.regs.pc, &self.regs.view());
        self.regs.pc = self.regs.pc.wrapping_add(1);
        self.regs.r = (self.regs.r & 0x80) | (self.regs.r.wrapping_add(1) & 0x7F);
        opcode
    }

    /// M1 fetch of the byte after a prefix.
    fn fetch_prefixed<B: Bus>(&mut self, bus: &mut B) -> u8 {
        let opcode = bus.fetch_prefixed(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        self.regs.r = (self.regs.r & 0x80) | (self.regs.r.wrapping_add(1) & 0x7F);
        opcode
    }

    fn read_word<B: Bus>(bus: &mut B, address: u16) -> u16 {
        let lo = bus.read(address);
        let hi = bus.read(address.wrapping_add(1));
        u16::from_le_bytes([lo, hi])
    }

    fn write_word<B: Bus>(bus: &mut B, address: u16, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        bus.write(address, lo);
        bus.write(address.wrapping_add(1), hi);
    }

    fn push<B: Bus>(&mut self, bus: &mut B, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        bus.write(self.regs.sp, hi);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        bus.write(self.regs.sp, lo);
    }

    fn pop<B: Bus>(&mut self, bus: &mut B) -> u16 {
        let lo = bus.read(self.regs.sp);
        self.regs.sp = self.regs.sp.wrapping_add(1);
        let hi = bus.read(self.regs.sp);
        self.regs.sp = self.regs.sp.wrapping_add(1);
        u16::from_le_bytes([lo, hi])
    }

    /// 8-bit operand by opcode field; 6 is `(HL)`.
    fn reg8<B: Bus>(&mut self, bus: &mut B, index: u8) -> u8 {
        match index & 7 {
            0 => self.regs.b,
            1 => self.regs.c,
            2 => self.regs.d,
            3 => self.regs.e,
            4 => self.regs.h,
            5 => self.regs.l,
            6 => bus.read(self.regs.hl()),
            _ => self.regs.a,
        }
    }

    fn set_reg8<B: Bus>(&mut self, bus: &mut B, index: u8, value: u8) {
        match index & 7 {
            0 => self.regs.b = value,
            1 => self.regs.c = value,
            2 => self.regs.d = value,
            3 => self.regs.e = value,
            4 => self.regs.h = value,
            5 => self.regs.l = value,
            6 => bus.write(self.regs.hl(), value),
            _ => self.regs.a = value,
        }
    }

    /// Register pair by opcode field: BC, DE, HL, SP.
    fn reg16(&self, index: u8) -> u16 {
        match index & 3 {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => self.regs.hl(),
            _ => self.regs.sp,
        }
    }

    fn set_reg16(&mut self, index: u8, value: u16) {
        match index & 3 {
            0 => self.regs.set_bc(value),
            1 => self.regs.set_de(value),
            2 => self.regs.set_hl(value),
            _ => self.regs.sp = value,
        }
    }

    /// Condition code by opcode field: NZ, Z, NC, C, PO, PE, P, M.
    fn condition(&self, cc: u8) -> bool {
        use crate::flags::{CF, PF, SF, ZF};
        let f = self.regs.f;
        match cc & 7 {
            0 => f & ZF == 0,
            1 => f & ZF != 0,
            2 => f & CF == 0,
            3 => f & CF != 0,
            4 => f & PF == 0,
            5 => f & PF != 0,
            6 => f & SF == 0,
            _ => f & SF != 0,
        }
    }

    fn accept_interrupts<B: Bus>(&mut self, bus: &mut B) -> Option<u32> {
        if self.nmi_pending {
            self.nmi_pending = false;
            self.regs.halted = false;
            self.regs.iff2 = self.regs.iff1;
            self.regs.iff1 = false;
            self.push(bus, self.regs.pc);
            self.regs.pc = 0x0066;
            return Some(11);
        }
        if self.int_pending && self.regs.iff1 && !self.ei_delay {
            self.int_pending = false;
            self.regs.halted = false;
            self.regs.iff1 = false;
            self.regs.iff2 = false;
            self.push(bus, self.regs.pc);
            if self.regs.im == 2 {
                // No device drives the data bus, so the vector low byte floats high.
                let table = u16::from_be_bytes([self.regs.i, 0xFF]);
                self.regs.pc = Self::read_word(bus, table);
                return Some(19);
            }
            self.regs.pc = 0x0038;
            return Some(13);
        }
        None
    }
}

impl Default for Z80 {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu for Z80 {
    type Registers = Registers;

    fn step<B: Bus>(&mut self, bus: &mut B) -> u32 {
        if let Some(cycles) = self.accept_interrupts(bus) {
            return cycles;
        }
        self.ei_delay = false;
        if self.regs.halted {
            // HALT repeats NOP refresh cycles until an interrupt arrives.
            bus.refresh(self.regs.pc);
            return 4;
        }
        self.instructions += 1;
        let opcode = self.fetch_opcode(bus);
        self.execute(bus, opcode)
    }

    fn pc(&self) -> u16 {
        self.regs.pc
    }

    fn set_pc(&mut self, pc: u16) {
        self.regs.pc = pc;
        self.regs.halted = false;
    }

    fn registers(&self) -> Registers {
        self.regs
    }

    fn is_halted(&self) -> bool {
        self.regs.halted
    }

    fn interrupt(&mut self) -> bool {
        if self.regs.iff1 {
            self.int_pending = true;
        }
        self.regs.iff1
    }

    fn nmi(&mut self) {
        self.nmi_pending = true;
    }

    fn reset(&mut self) {
        self.regs = Registers {
            a: 0xFF,
            f: 0xFF,
            sp: 0xFFFF,
            ..Registers::default()
        };
        self.ei_delay = false;
        self.int_pending = false;
        self.nmi_pending = false;
        self.instructions = 0;
    }
}

impl Observable for Z80 {
    fn query(&self, path: &str) -> Option<Value> {
        let r = &self.regs;
        match path {
            "pc" => Some(r.pc.into()),
            "sp" => Some(r.sp.into()),
            "af" => Some(r.af().into()),
            "bc" => Some(r.bc().into()),
            "de" => Some(r.de().into()),
            "hl" => Some(r.hl().into()),
            "ix" => Some(r.ix.into()),
            "iy" => Some(r.iy.into()),
            "i" => Some(r.i.into()),
            "r" => Some(r.r.into()),
            "im" => Some(r.im.into()),
            "iff1" => Some(r.iff1.into()),
            "halted" => Some(r.halted.into()),
            "instructions" => Some(self.instructions.into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "pc",
            "sp",
            "af",
            "bc",
            "de",
            "hl",
            "ix",
            "iy",
            "i",
            "r",
            "im",
            "iff1",
            "halted",
            "instructions",
        ]
    }
}
