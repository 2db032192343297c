//! Z80 bus interface.

/// The 8-bit register file as seen by the bus at an opcode fetch.
///
/// A bus that pre-issues I/O cycles needs the register values the next
/// instruction will use to form its port address and output data. The CPU
/// hands over a copy at every M1 cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterView {
    pub a: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
}

impl RegisterView {
    /// BC register pair.
    #[must_use]
    pub const fn bc(&self) -> u16 {
        (self.b as u16) << 8 | self.c as u16
    }

    /// DE register pair.
    #[must_use]
    pub const fn de(&self) -> u16 {
        (self.d as u16) << 8 | self.e as u16
    }

    /// HL register pair.
    #[must_use]
    pub const fn hl(&self) -> u16 {
        (self.h as u16) << 8 | self.l as u16
    }

    /// Register selected by a 3-bit opcode field (B, C, D, E, H, L, -, A).
    ///
    /// Index 6 encodes `(HL)` in most instructions and the constant 0 in
    /// `OUT (C),0`; it reads as 0 here.
    #[must_use]
    pub const fn by_index(&self, index: u8) -> u8 {
        match index & 7 {
            0 => self.b,
            1 => self.c,
            2 => self.d,
            3 => self.e,
            4 => self.h,
            5 => self.l,
            7 => self.a,
            _ => 0,
        }
    }
}

/// Memory and I/O bus interface for a Z80.
///
/// The CPU distinguishes the cycle types a real Z80 puts on its control
/// lines so the bus can treat them differently: M1 opcode fetches are
/// throttled and inspected, operand fetches may be served from a cache,
/// and refresh/halt cycles are forwarded to hardware that needs them.
pub trait Bus {
    /// M1 opcode fetch. `regs` is the register file before the instruction
    /// executes.
    fn fetch_opcode(&mut self, address: u16, regs: &RegisterView) -> u8 {
        let _ = regs;
        self.read(address)
    }

    /// M1 fetch of the opcode byte after a CB, DD, ED or FD prefix.
    ///
    /// The byte is not the start of an instruction, so a bus must not
    /// predict I/O from it.
    fn fetch_prefixed(&mut self, address: u16) -> u8 {
        self.read(address)
    }

    /// Operand fetch (immediate bytes, displacements, addresses).
    fn fetch(&mut self, address: u16) -> u8 {
        self.read(address)
    }

    /// Read a byte from memory.
    fn read(&mut self, address: u16) -> u8;

    /// Write a byte to memory.
    fn write(&mut self, address: u16, value: u8);

    /// Read a byte from an I/O port. The full 16-bit port address is used.
    fn io_read(&mut self, port: u16) -> u8;

    /// Write a byte to an I/O port.
    fn io_write(&mut self, port: u16, value: u8);

    /// One iteration of INI/IND/INIR/INDR: read `port`, store at `dest`.
    /// Returns the byte transferred.
    fn block_in(&mut self, port: u16, dest: u16) -> u8 {
        let value = self.io_read(port);
        self.write(dest, value);
        value
    }

    /// One iteration of OUTI/OUTD/OTIR/OTDR: read `src`, write to `port`.
    /// Returns the byte transferred.
    fn block_out(&mut self, port: u16, src: u16) -> u8 {
        let value = self.read(src);
        self.io_write(port, value);
        value
    }

    /// Refresh cycle of a NOP at `address`.
    fn refresh(&mut self, address: u16) {
        let _ = address;
    }

    /// The CPU entered the HALT state.
    fn halt(&mut self) {}
}

/// Flat 64K memory plus a 64K port latch. Useful for CPU tests.
pub struct SimpleBus {
    pub memory: Vec<u8>,
    pub ports: Vec<u8>,
    /// Every port write, in order.
    pub port_writes: Vec<(u16, u8)>,
    pub halts: u32,
}

impl SimpleBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            memory: vec![0; 0x10000],
            ports: vec![0xFF; 0x10000],
            port_writes: Vec::new(),
            halts: 0,
        }
    }

    /// Copy `bytes` into memory starting at `address`.
    pub fn load(&mut self, address: u16, bytes: &[u8]) {
        for (i, &byte) in bytes.iter().enumerate() {
            self.memory[address.wrapping_add(i as u16) as usize] = byte;
        }
    }
}

impl Default for SimpleBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for SimpleBus {
    fn read(&mut self, address: u16) -> u8 {
        self.memory[address as usize]
    }

    fn write(&mut self, address: u16, value: u8) {
        self.memory[address as usize] = value;
    }

    fn io_read(&mut self, port: u16) -> u8 {
        self.ports[port as usize]
    }

    fn io_write(&mut self, port: u16, value: u8) {
        self.ports[port as usize] = value;
        self.port_writes.push((port, value));
    }

    fn halt(&mut self) {
        self.halts += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_pairs() {
        let regs = RegisterView {
            a: 0x01,
            b: 0x12,
            c: 0x34,
            d: 0x56,
            e: 0x78,
            h: 0x9A,
            l: 0xBC,
        };
        assert_eq!(regs.bc(), 0x1234);
        assert_eq!(regs.de(), 0x5678);
        assert_eq!(regs.hl(), 0x9ABC);
        assert_eq!(regs.by_index(7), 0x01);
        assert_eq!(regs.by_index(6), 0);
        assert_eq!(regs.by_index(1), 0x34);
    }

    #[test]
    fn default_block_in_reads_port_then_writes_memory() {
        let mut bus = SimpleBus::new();
        bus.ports[0x10FE] = 0x5A;
        assert_eq!(bus.block_in(0x10FE, 0x4000), 0x5A);
        assert_eq!(bus.memory[0x4000], 0x5A);
    }

    #[test]
    fn default_block_out_reads_memory_then_writes_port() {
        let mut bus = SimpleBus::new();
        bus.memory[0x8000] = 0xC3;
        assert_eq!(bus.block_out(0x00E0, 0x8000), 0xC3);
        assert_eq!(bus.port_writes, vec![(0x00E0, 0xC3)]);
    }
}
