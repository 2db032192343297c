//! Bus protocol for a CPLD that drives a real host computer's Z80 bus.
//!
//! The controlling process never touches the host bus directly. It sends
//! command frames to the CPLD (8, 16 or 32 bits wide), polls a ready line
//! and reads back one data byte per transaction.
//!
//! # Command words
//!
//! | Command           | Opcode      | Frame                                  |
//! |-------------------|-------------|----------------------------------------|
//! | Nop               | 0x00        | 8-bit                                  |
//! | FetchOpcode       | 0x10        | 32-bit `addr<<16 \| op`                 |
//! | Write             | 0x18        | 32-bit `addr<<16 \| data<<8 \| op`      |
//! | Read              | 0x20        | 32-bit `addr<<16 \| op`                 |
//! | WritePort         | 0x28 (+0-7) | 16-bit short form or 32-bit            |
//! | ReadPort          | 0x30 (+0-7) | 8-bit short form or 32-bit             |
//! | ReadPortToMemory  | 0x38        | two 32-bit words: port, then dest<<16  |
//! | Halt              | 0x50        | 8-bit                                  |
//! | Refresh           | 0x51        | 8-bit                                  |
//! | SetAutoRefresh    | 0xF1        | 8-bit                                  |
//! | ClearAutoRefresh  | 0xF2        | 8-bit                                  |
//! | Loopback          | 0xFE        | 16-bit `data<<8 \| op`                  |
//!
//! Ports 0-7 use the short forms, with the port folded into the opcode.
//!
//! There is no timeout anywhere in the protocol: a CPLD that never raises
//! ready is a hardware fault and the poll spins forever.

pub mod codec;
pub mod command;
pub mod link;
pub mod sim;

pub use codec::Codec;
pub use command::{Command, Decoder, Encoded, Frame};
pub use link::{ControlLines, Link};
pub use sim::SimLink;
