//! Instruction execution for the Z80.

use emu_core::Bus;

use crate::alu;
use crate::flags::{CF, HF, NF, PF, SF, XF, YF, ZF, sz53, sz53p};
use crate::io_group::{self, IoAccess};

use super::Z80;

/// Which index register a DD/FD prefix selects.
#[derive(Clone, Copy)]
enum Index {
    Ix,
    Iy,
}

impl Z80 {
    /// Execute an instruction whose opcode has just been fetched.
    pub(super) fn execute<B: Bus>(&mut self, bus: &mut B, op: u8) -> u32 {
        match op {
            0x00 => {
                bus.refresh(self.regs.pc.wrapping_sub(1));
                4
            }

            // LD rr,nn
            0x01 | 0x11 | 0x21 | 0x31 => {
                let value = self.fetch_word(bus);
                self.set_reg16(op >> 4, value);
                10
            }

            // LD (BC),A / LD (DE),A
            0x02 | 0x12 => {
                let address = self.reg16(op >> 4);
                bus.write(address, self.regs.a);
                7
            }

            // LD A,(BC) / LD A,(DE)
            0x0A | 0x1A => {
                let address = self.reg16(op >> 4);
                self.regs.a = bus.read(address);
                7
            }

            // INC rr / DEC rr
            0x03 | 0x13 | 0x23 | 0x33 => {
                let value = self.reg16(op >> 4).wrapping_add(1);
                self.set_reg16(op >> 4, value);
                6
            }
            0x0B | 0x1B | 0x2B | 0x3B => {
                let value = self.reg16(op >> 4).wrapping_sub(1);
                self.set_reg16(op >> 4, value);
                6
            }

            // INC r / DEC r
            0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x34 | 0x3C => {
                let r = op >> 3;
                let value = self.reg8(bus, r);
                let result = alu::inc8(value);
                self.set_reg8(bus, r, result.value);
                self.regs.f = (self.regs.f & CF) | result.flags;
                if r & 7 == 6 { 11 } else { 4 }
            }
            0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x35 | 0x3D => {
                let r = op >> 3;
                let value = self.reg8(bus, r);
                let result = alu::dec8(value);
                self.set_reg8(bus, r, result.value);
                self.regs.f = (self.regs.f & CF) | result.flags;
                if r & 7 == 6 { 11 } else { 4 }
            }

            // LD r,n
            0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x36 | 0x3E => {
                let value = self.fetch_byte(bus);
                self.set_reg8(bus, op >> 3, value);
                if op == 0x36 { 10 } else { 7 }
            }

            // RLCA, RRCA, RLA, RRA
            0x07 | 0x0F | 0x17 | 0x1F => {
                let a = self.regs.a;
                let carry_in = self.regs.f & CF != 0;
                let (value, carry) = match op {
                    0x07 => (a.rotate_left(1), a & 0x80 != 0),
                    0x0F => (a.rotate_right(1), a & 0x01 != 0),
                    0x17 => (a << 1 | u8::from(carry_in), a & 0x80 != 0),
                    _ => (a >> 1 | u8::from(carry_in) << 7, a & 0x01 != 0),
                };
                self.regs.a = value;
                self.regs.f =
                    (self.regs.f & (SF | ZF | PF)) | (value & (YF | XF)) | u8::from(carry);
                4
            }

            // EX AF,AF'
            0x08 => {
                let af = self.regs.af();
                self.regs.set_af(self.regs.af_alt);
                self.regs.af_alt = af;
                4
            }

            // ADD HL,rr
            0x09 | 0x19 | 0x29 | 0x39 => {
                let hl = self.regs.hl();
                let rr = self.reg16(op >> 4);
                let result = self.add16(hl, rr);
                self.regs.set_hl(result);
                11
            }

            // DJNZ e
            0x10 => {
                let offset = self.fetch_byte(bus) as i8;
                self.regs.b = self.regs.b.wrapping_sub(1);
                if self.regs.b != 0 {
                    self.regs.pc = self.regs.pc.wrapping_add_signed(i16::from(offset));
                    13
                } else {
                    8
                }
            }

            // JR e / JR cc,e
            0x18 | 0x20 | 0x28 | 0x30 | 0x38 => {
                let offset = self.fetch_byte(bus) as i8;
                if op == 0x18 || self.condition((op >> 3) & 3) {
                    self.regs.pc = self.regs.pc.wrapping_add_signed(i16::from(offset));
                    12
                } else {
                    7
                }
            }

            // LD (nn),HL / LD HL,(nn)
            0x22 => {
                let address = self.fetch_word(bus);
                Self::write_word(bus, address, self.regs.hl());
                16
            }
            0x2A => {
                let address = self.fetch_word(bus);
                let value = Self::read_word(bus, address);
                self.regs.set_hl(value);
                16
            }

            // LD (nn),A / LD A,(nn)
            0x32 => {
                let address = self.fetch_word(bus);
                bus.write(address, self.regs.a);
                13
            }
            0x3A => {
                let address = self.fetch_word(bus);
                self.regs.a = bus.read(address);
                13
            }

            0x27 => {
                self.daa();
                4
            }

            // CPL
            0x2F => {
                self.regs.a = !self.regs.a;
                self.regs.f = (self.regs.f & (SF | ZF | PF | CF))
                    | HF
                    | NF
                    | (self.regs.a & (YF | XF));
                4
            }

            // SCF / CCF
            0x37 => {
                self.regs.f = (self.regs.f & (SF | ZF | PF)) | (self.regs.a & (YF | XF)) | CF;
                4
            }
            0x3F => {
                let carry = self.regs.f & CF;
                let half = if carry != 0 { HF } else { 0 };
                self.regs.f =
                    (self.regs.f & (SF | ZF | PF)) | (self.regs.a & (YF | XF)) | half | (carry ^ CF);
                4
            }

            0x76 => {
                self.regs.halted = true;
                bus.halt();
                4
            }

            // LD r,r'
            0x40..=0x7F => {
                let value = self.reg8(bus, op);
                self.set_reg8(bus, op >> 3, value);
                if op & 7 == 6 || (op >> 3) & 7 == 6 { 7 } else { 4 }
            }

            // ALU A,r
            0x80..=0xBF => {
                let operand = self.reg8(bus, op);
                self.accumulate(op >> 3, operand);
                if op & 7 == 6 { 7 } else { 4 }
            }

            // RET cc
            0xC0 | 0xC8 | 0xD0 | 0xD8 | 0xE0 | 0xE8 | 0xF0 | 0xF8 => {
                if self.condition(op >> 3) {
                    self.regs.pc = self.pop(bus);
                    11
                } else {
                    5
                }
            }

            // POP rr (AF in place of SP)
            0xC1 | 0xD1 | 0xE1 | 0xF1 => {
                let value = self.pop(bus);
                if op == 0xF1 {
                    self.regs.set_af(value);
                } else {
                    self.set_reg16((op >> 4) & 3, value);
                }
                10
            }

            // JP cc,nn / JP nn
            0xC2 | 0xCA | 0xD2 | 0xDA | 0xE2 | 0xEA | 0xF2 | 0xFA | 0xC3 => {
                let target = self.fetch_word(bus);
                if op == 0xC3 || self.condition(op >> 3) {
                    self.regs.pc = target;
                }
                10
            }

            // CALL cc,nn / CALL nn
            0xC4 | 0xCC | 0xD4 | 0xDC | 0xE4 | 0xEC | 0xF4 | 0xFC | 0xCD => {
                let target = self.fetch_word(bus);
                if op == 0xCD || self.condition(op >> 3) {
                    self.push(bus, self.regs.pc);
                    self.regs.pc = target;
                    17
                } else {
                    10
                }
            }

            // PUSH rr (AF in place of SP)
            0xC5 | 0xD5 | 0xE5 | 0xF5 => {
                let value = if op == 0xF5 {
                    self.regs.af()
                } else {
                    self.reg16((op >> 4) & 3)
                };
                self.push(bus, value);
                11
            }

            // ALU A,n
            0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => {
                let operand = self.fetch_byte(bus);
                self.accumulate(op >> 3, operand);
                7
            }

            // RST p
            0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
                self.push(bus, self.regs.pc);
                self.regs.pc = u16::from(op & 0x38);
                11
            }

            0xC9 => {
                self.regs.pc = self.pop(bus);
                10
            }

            0xCB => self.execute_cb(bus),

            // OUT (n),A / IN A,(n)
            0xD3 | 0xDB => {
                let n = self.fetch_byte(bus);
                match io_group::decode(op, n, &self.regs.view()) {
                    Some(access) => self.execute_io(bus, op, n, access),
                    None => 11,
                }
            }

            // EXX
            0xD9 => {
                let (bc, de, hl) = (self.regs.bc(), self.regs.de(), self.regs.hl());
                self.regs.set_bc(self.regs.bc_alt);
                self.regs.set_de(self.regs.de_alt);
                self.regs.set_hl(self.regs.hl_alt);
                self.regs.bc_alt = bc;
                self.regs.de_alt = de;
                self.regs.hl_alt = hl;
                4
            }

            0xDD => self.execute_index(bus, Index::Ix),
            0xFD => self.execute_index(bus, Index::Iy),

            // EX (SP),HL
            0xE3 => {
                let value = Self::read_word(bus, self.regs.sp);
                Self::write_word(bus, self.regs.sp, self.regs.hl());
                self.regs.set_hl(value);
                19
            }

            // JP (HL)
            0xE9 => {
                self.regs.pc = self.regs.hl();
                4
            }

            // EX DE,HL
            0xEB => {
                let de = self.regs.de();
                self.regs.set_de(self.regs.hl());
                self.regs.set_hl(de);
                4
            }

            0xED => self.execute_ed(bus),

            // DI / EI
            0xF3 => {
                self.regs.iff1 = false;
                self.regs.iff2 = false;
                4
            }
            0xFB => {
                self.regs.iff1 = true;
                self.regs.iff2 = true;
                self.ei_delay = true;
                4
            }

            // LD SP,HL
            0xF9 => {
                self.regs.sp = self.regs.hl();
                6
            }
        }
    }

    fn accumulate(&mut self, op: u8, operand: u8) {
        let result = alu::accumulate(op, self.regs.a, operand, self.regs.f & CF != 0);
        self.regs.a = result.value;
        self.regs.f = result.flags;
    }

    fn add16(&mut self, a: u16, b: u16) -> u16 {
        let wide = u32::from(a) + u32::from(b);
        let result = wide as u16;
        let mut f = self.regs.f & (SF | ZF | PF);
        f |= ((result >> 8) as u8) & (YF | XF);
        if (a & 0x0FFF) + (b & 0x0FFF) > 0x0FFF {
            f |= HF;
        }
        if wide > 0xFFFF {
            f |= CF;
        }
        self.regs.f = f;
        result
    }

    fn daa(&mut self) {
        let a = self.regs.a;
        let f = self.regs.f;
        let mut correction = 0u8;
        let mut carry = f & CF != 0;
        if f & HF != 0 || a & 0x0F > 9 {
            correction |= 0x06;
        }
        if carry || a > 0x99 {
            correction |= 0x60;
            carry = true;
        }
        let value = if f & NF != 0 {
            a.wrapping_sub(correction)
        } else {
            a.wrapping_add(correction)
        };
        let half = if f & NF != 0 {
            f & HF != 0 && a & 0x0F < 6
        } else {
            a & 0x0F > 9
        };
        self.regs.a = value;
        self.regs.f = sz53p(value)
            | (f & NF)
            | if half { HF } else { 0 }
            | u8::from(carry);
    }

    /// Run one port instruction decoded by the shared I/O table.
    fn execute_io<B: Bus>(&mut self, bus: &mut B, op: u8, next: u8, access: IoAccess) -> u32 {
        match access {
            IoAccess::In { port } => {
                let value = bus.io_read(port);
                if op == 0xDB {
                    self.regs.a = value;
                    return 11;
                }
                let r = (next >> 3) & 7;
                if r != 6 {
                    self.set_reg8(bus, r, value);
                }
                self.regs.f = (self.regs.f & CF) | sz53p(value);
                12
            }
            IoAccess::Out { port, value } => {
                bus.io_write(port, value);
                if op == 0xD3 { 11 } else { 12 }
            }
            IoAccess::BlockIn {
                port,
                dest,
                decrement,
                repeat,
            } => {
                let value = bus.block_in(port, dest);
                self.regs.b = self.regs.b.wrapping_sub(1);
                self.regs.set_hl(Self::step_pointer(dest, decrement));
                self.block_io_flags(value);
                self.repeat_block(repeat)
            }
            IoAccess::BlockOut {
                port,
                src,
                decrement,
                repeat,
            } => {
                self.regs.b = self.regs.b.wrapping_sub(1);
                let value = bus.block_out(port, src);
                self.regs.set_hl(Self::step_pointer(src, decrement));
                self.block_io_flags(value);
                self.repeat_block(repeat)
            }
        }
    }

    fn step_pointer(address: u16, decrement: bool) -> u16 {
        if decrement {
            address.wrapping_sub(1)
        } else {
            address.wrapping_add(1)
        }
    }

    /// Z, S and the undocumented bits follow B; N copies bit 7 of the data.
    fn block_io_flags(&mut self, value: u8) {
        let mut f = sz53(self.regs.b) | (self.regs.f & CF);
        if value & 0x80 != 0 {
            f |= NF;
        }
        self.regs.f = f;
    }

    fn repeat_block(&mut self, repeat: bool) -> u32 {
        if repeat && self.regs.b != 0 {
            self.regs.pc = self.regs.pc.wrapping_sub(2);
            21
        } else {
            16
        }
    }

    fn execute_ed<B: Bus>(&mut self, bus: &mut B) -> u32 {
        let op = self.fetch_prefixed(bus);
        if let Some(access) = io_group::decode(0xED, op, &self.regs.view()) {
            return self.execute_io(bus, 0xED, op, access);
        }
        match op {
            // SBC HL,rr / ADC HL,rr
            0x42 | 0x52 | 0x62 | 0x72 | 0x4A | 0x5A | 0x6A | 0x7A => {
                let hl = self.regs.hl();
                let rr = self.reg16(op >> 4);
                let carry = u32::from(self.regs.f & CF);
                let subtract = op & 0x08 == 0;
                let wide = if subtract {
                    u32::from(hl).wrapping_sub(u32::from(rr)).wrapping_sub(carry)
                } else {
                    u32::from(hl) + u32::from(rr) + carry
                };
                let result = wide as u16;
                let mut f = ((result >> 8) as u8) & (SF | YF | XF);
                if result == 0 {
                    f |= ZF;
                }
                if subtract {
                    f |= NF;
                }
                if wide > 0xFFFF {
                    f |= CF;
                }
                self.regs.f = f;
                self.regs.set_hl(result);
                15
            }

            // LD (nn),rr / LD rr,(nn)
            0x43 | 0x53 | 0x63 | 0x73 => {
                let address = self.fetch_word(bus);
                Self::write_word(bus, address, self.reg16(op >> 4));
                20
            }
            0x4B | 0x5B | 0x6B | 0x7B => {
                let address = self.fetch_word(bus);
                let value = Self::read_word(bus, address);
                self.set_reg16(op >> 4, value);
                20
            }

            // NEG
            0x44 => {
                let result = alu::sub8(0, self.regs.a, false);
                self.regs.a = result.value;
                self.regs.f = result.flags;
                8
            }

            // RETN / RETI
            0x45 | 0x4D => {
                self.regs.iff1 = self.regs.iff2;
                self.regs.pc = self.pop(bus);
                14
            }

            // IM 0/1/2
            0x46 => {
                self.regs.im = 0;
                8
            }
            0x56 => {
                self.regs.im = 1;
                8
            }
            0x5E => {
                self.regs.im = 2;
                8
            }

            // LD I,A / LD A,I
            0x47 => {
                self.regs.i = self.regs.a;
                9
            }
            0x57 => {
                self.regs.a = self.regs.i;
                let parity = if self.regs.iff2 { PF } else { 0 };
                self.regs.f = (self.regs.f & CF) | sz53(self.regs.a) | parity;
                9
            }

            // LDI / LDD / LDIR / LDDR
            0xA0 | 0xA8 | 0xB0 | 0xB8 => {
                let value = bus.read(self.regs.hl());
                bus.write(self.regs.de(), value);
                let decrement = op & 0x08 != 0;
                self.regs
                    .set_hl(Self::step_pointer(self.regs.hl(), decrement));
                self.regs
                    .set_de(Self::step_pointer(self.regs.de(), decrement));
                let count = self.regs.bc().wrapping_sub(1);
                self.regs.set_bc(count);
                let mut f = self.regs.f & (SF | ZF | CF);
                if count != 0 {
                    f |= PF;
                }
                self.regs.f = f;
                if op & 0x10 != 0 && count != 0 {
                    self.regs.pc = self.regs.pc.wrapping_sub(2);
                    21
                } else {
                    16
                }
            }

            _ => 8,
        }
    }

    fn execute_cb<B: Bus>(&mut self, bus: &mut B) -> u32 {
        let op = self.fetch_prefixed(bus);
        let r = op & 7;
        let bit = (op >> 3) & 7;
        let value = self.reg8(bus, r);
        let cycles = if r == 6 { 15 } else { 8 };
        match op >> 6 {
            0 => {
                let carry_in = self.regs.f & CF != 0;
                let (result, carry) = match bit {
                    0 => (value.rotate_left(1), value & 0x80 != 0),
                    1 => (value.rotate_right(1), value & 0x01 != 0),
                    2 => (value << 1 | u8::from(carry_in), value & 0x80 != 0),
                    3 => (value >> 1 | u8::from(carry_in) << 7, value & 0x01 != 0),
                    4 => (value << 1, value & 0x80 != 0),
                    5 => (((value as i8) >> 1) as u8, value & 0x01 != 0),
                    6 => (value << 1 | 1, value & 0x80 != 0),
                    _ => (value >> 1, value & 0x01 != 0),
                };
                self.set_reg8(bus, r, result);
                self.regs.f = sz53p(result) | u8::from(carry);
                cycles
            }
            1 => {
                let set = value & (1 << bit) != 0;
                let mut f = (self.regs.f & CF) | HF | (value & (YF | XF));
                if !set {
                    f |= ZF | PF;
                }
                if bit == 7 && set {
                    f |= SF;
                }
                self.regs.f = f;
                if r == 6 { 12 } else { 8 }
            }
            2 => {
                self.set_reg8(bus, r, value & !(1 << bit));
                cycles
            }
            _ => {
                self.set_reg8(bus, r, value | (1 << bit));
                cycles
            }
        }
    }

    fn index(&self, which: Index) -> u16 {
        match which {
            Index::Ix => self.regs.ix,
            Index::Iy => self.regs.iy,
        }
    }

    fn set_index(&mut self, which: Index, value: u16) {
        match which {
            Index::Ix => self.regs.ix = value,
            Index::Iy => self.regs.iy = value,
        }
    }

    fn indexed_address<B: Bus>(&mut self, bus: &mut B, which: Index) -> u16 {
        let d = self.fetch_byte(bus) as i8;
        self.index(which).wrapping_add_signed(i16::from(d))
    }

    /// DD/FD page: the common IX/IY forms. Anything else runs as the
    /// unprefixed opcode, which is what the prefix does to most of the page.
    fn execute_index<B: Bus>(&mut self, bus: &mut B, which: Index) -> u32 {
        let op = self.fetch_prefixed(bus);
        match op {
            // LD IX,nn
            0x21 => {
                let value = self.fetch_word(bus);
                self.set_index(which, value);
                14
            }
            // LD (nn),IX / LD IX,(nn)
            0x22 => {
                let address = self.fetch_word(bus);
                Self::write_word(bus, address, self.index(which));
                20
            }
            0x2A => {
                let address = self.fetch_word(bus);
                let value = Self::read_word(bus, address);
                self.set_index(which, value);
                20
            }
            // INC IX / DEC IX
            0x23 => {
                self.set_index(which, self.index(which).wrapping_add(1));
                10
            }
            0x2B => {
                self.set_index(which, self.index(which).wrapping_sub(1));
                10
            }
            // ADD IX,rr
            0x09 | 0x19 | 0x29 | 0x39 => {
                let base = self.index(which);
                let rr = match op >> 4 {
                    2 => base,
                    n => self.reg16(n),
                };
                let result = self.add16(base, rr);
                self.set_index(which, result);
                15
            }
            // LD (IX+d),n
            0x36 => {
                let address = self.indexed_address(bus, which);
                let value = self.fetch_byte(bus);
                bus.write(address, value);
                19
            }
            // LD r,(IX+d)
            0x46 | 0x4E | 0x56 | 0x5E | 0x66 | 0x6E | 0x7E => {
                let address = self.indexed_address(bus, which);
                let value = bus.read(address);
                self.set_reg8(bus, op >> 3, value);
                19
            }
            // LD (IX+d),r
            0x70..=0x75 | 0x77 => {
                let address = self.indexed_address(bus, which);
                let value = self.reg8(bus, op);
                bus.write(address, value);
                19
            }
            // ALU A,(IX+d)
            0x86 | 0x8E | 0x96 | 0x9E | 0xA6 | 0xAE | 0xB6 | 0xBE => {
                let address = self.indexed_address(bus, which);
                let operand = bus.read(address);
                self.accumulate(op >> 3, operand);
                19
            }
            // POP IX / PUSH IX / EX (SP),IX / JP (IX) / LD SP,IX
            0xE1 => {
                let value = self.pop(bus);
                self.set_index(which, value);
                14
            }
            0xE5 => {
                self.push(bus, self.index(which));
                15
            }
            0xE3 => {
                let value = Self::read_word(bus, self.regs.sp);
                Self::write_word(bus, self.regs.sp, self.index(which));
                self.set_index(which, value);
                23
            }
            0xE9 => {
                self.regs.pc = self.index(which);
                8
            }
            0xF9 => {
                self.regs.sp = self.index(which);
                10
            }
            _ => 4 + self.execute(bus, op),
        }
    }
}
