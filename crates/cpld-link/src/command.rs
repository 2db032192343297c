//! Command encoding and decoding.

/// Command opcodes (low byte of every frame).
pub mod opcode {
    pub const NOP: u8 = 0x00;
    pub const FETCH_OPCODE: u8 = 0x10;
    pub const WRITE: u8 = 0x18;
    pub const READ: u8 = 0x20;
    pub const WRITE_PORT: u8 = 0x28;
    pub const READ_PORT: u8 = 0x30;
    pub const READ_PORT_TO_MEMORY: u8 = 0x38;
    pub const HALT: u8 = 0x50;
    pub const REFRESH: u8 = 0x51;
    pub const SET_AUTO_REFRESH: u8 = 0xF1;
    pub const CLEAR_AUTO_REFRESH: u8 = 0xF2;
    pub const LOOPBACK: u8 = 0xFE;
}

/// Ports below this use the short command forms.
///
/// The test is on the full 16-bit port. A short frame has no room for the
/// high byte, so a port such as 0x0103 takes the long form to keep A8-A15
/// on the host bus.
const SHORT_PORT_LIMIT: u16 = 8;

/// One transfer to the CPLD. The width is part of the protocol: the CPLD
/// tells the forms apart by how many bits were clocked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    Byte(u8),
    Half(u16),
    Word(u32),
}

impl Frame {
    /// Command opcode carried in the low byte.
    #[must_use]
    pub const fn opcode(self) -> u8 {
        match self {
            Frame::Byte(b) => b,
            Frame::Half(h) => h as u8,
            Frame::Word(w) => w as u8,
        }
    }
}

const fn word(address: u16, data: u8, opcode: u8) -> Frame {
    Frame::Word((address as u32) << 16 | (data as u32) << 8 | opcode as u32)
}

/// A transaction on the host bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Nop,
    /// M1 cycle at `address`.
    FetchOpcode { address: u16 },
    Write { address: u16, data: u8 },
    Read { address: u16 },
    WritePort { port: u16, data: u8 },
    ReadPort { port: u16 },
    /// Read `port` and store the byte at `dest` in host memory in one
    /// transaction (INI/INIR into host RAM).
    ReadPortToMemory { port: u16, dest: u16 },
    /// The guest executed HALT.
    Halt,
    /// One refresh cycle.
    Refresh,
    SetAutoRefresh,
    ClearAutoRefresh,
    /// Echo `data` back without touching the bus.
    Loopback { data: u8 },
}

/// Frames for one command. At most two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoded {
    frames: [Frame; 2],
    len: usize,
}

impl Encoded {
    const fn one(frame: Frame) -> Self {
        Self {
            frames: [frame, Frame::Byte(opcode::NOP)],
            len: 1,
        }
    }

    #[must_use]
    pub fn frames(&self) -> &[Frame] {
        &self.frames[..self.len]
    }
}

impl Command {
    /// Encode into the frame(s) the CPLD expects.
    #[must_use]
    pub const fn encode(self) -> Encoded {
        match self {
            Command::Nop => Encoded::one(Frame::Byte(opcode::NOP)),
            Command::FetchOpcode { address } => {
                Encoded::one(word(address, 0, opcode::FETCH_OPCODE))
            }
            Command::Write { address, data } => Encoded::one(word(address, data, opcode::WRITE)),
            Command::Read { address } => Encoded::one(word(address, 0, opcode::READ)),
            Command::WritePort { port, data } => {
                if port < SHORT_PORT_LIMIT {
                    Encoded::one(Frame::Half(
                        (data as u16) << 8 | (opcode::WRITE_PORT as u16 + port),
                    ))
                } else {
                    Encoded::one(word(port, data, opcode::WRITE_PORT))
                }
            }
            Command::ReadPort { port } => {
                if port < SHORT_PORT_LIMIT {
                    Encoded::one(Frame::Byte(opcode::READ_PORT + port as u8))
                } else {
                    Encoded::one(word(port, 0, opcode::READ_PORT))
                }
            }
            Command::ReadPortToMemory { port, dest } => Encoded {
                frames: [
                    word(port, 0, opcode::READ_PORT_TO_MEMORY),
                    Frame::Word((dest as u32) << 16),
                ],
                len: 2,
            },
            Command::Halt => Encoded::one(Frame::Byte(opcode::HALT)),
            Command::Refresh => Encoded::one(Frame::Byte(opcode::REFRESH)),
            Command::SetAutoRefresh => Encoded::one(Frame::Byte(opcode::SET_AUTO_REFRESH)),
            Command::ClearAutoRefresh => Encoded::one(Frame::Byte(opcode::CLEAR_AUTO_REFRESH)),
            Command::Loopback { data } => {
                Encoded::one(Frame::Half((data as u16) << 8 | opcode::LOOPBACK as u16))
            }
        }
    }

    /// True if the response byte carries data the caller needs.
    #[must_use]
    pub const fn expects_data(self) -> bool {
        matches!(
            self,
            Command::FetchOpcode { .. }
                | Command::Read { .. }
                | Command::ReadPort { .. }
                | Command::ReadPortToMemory { .. }
                | Command::Loopback { .. }
        )
    }
}

/// Reassembles commands from a stream of frames, the way the CPLD sees
/// them. `ReadPortToMemory` spans two frames, so the decoder is stateful.
#[derive(Debug, Default)]
pub struct Decoder {
    /// Port of a `ReadPortToMemory` still waiting for its destination word.
    partial: Option<u16>,
}

impl Decoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a two-frame command is half received.
    #[must_use]
    pub const fn is_partial(&self) -> bool {
        self.partial.is_some()
    }

    /// Feed one frame. Returns the command once it is complete, or `None`
    /// for the first half of a two-frame command and for unknown frames.
    pub fn push(&mut self, frame: Frame) -> Option<Command> {
        if let Some(port) = self.partial.take() {
            return match frame {
                Frame::Word(w) => Some(Command::ReadPortToMemory {
                    port,
                    dest: (w >> 16) as u16,
                }),
                _ => None,
            };
        }
        match frame {
            Frame::Byte(b) => match b {
                opcode::NOP => Some(Command::Nop),
                0x30..=0x37 => Some(Command::ReadPort {
                    port: u16::from(b - opcode::READ_PORT),
                }),
                opcode::HALT => Some(Command::Halt),
                opcode::REFRESH => Some(Command::Refresh),
                opcode::SET_AUTO_REFRESH => Some(Command::SetAutoRefresh),
                opcode::CLEAR_AUTO_REFRESH => Some(Command::ClearAutoRefresh),
                _ => None,
            },
            Frame::Half(h) => {
                let [op, data] = h.to_le_bytes();
                match op {
                    0x28..=0x2F => Some(Command::WritePort {
                        port: u16::from(op - opcode::WRITE_PORT),
                        data,
                    }),
                    opcode::LOOPBACK => Some(Command::Loopback { data }),
                    _ => None,
                }
            }
            Frame::Word(w) => {
                let address = (w >> 16) as u16;
                let data = (w >> 8) as u8;
                match w as u8 {
                    opcode::FETCH_OPCODE => Some(Command::FetchOpcode { address }),
                    opcode::WRITE => Some(Command::Write { address, data }),
                    opcode::READ => Some(Command::Read { address }),
                    opcode::WRITE_PORT => Some(Command::WritePort {
                        port: address,
                        data,
                    }),
                    opcode::READ_PORT => Some(Command::ReadPort { port: address }),
                    opcode::READ_PORT_TO_MEMORY => {
                        self.partial = Some(address);
                        None
                    }
                    _ => None,
                }
            }
        }
    }
}
