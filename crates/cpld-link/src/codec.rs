//! Blocking and split-phase transactions over a [`Link`].
//!
//! Every transaction is issue, poll ready, transfer one byte. [`Codec::issue`]
//! and [`Codec::collect`] expose the two halves separately so a caller can
//! start a port cycle early and pick up the result later. At most one
//! transaction is outstanding: issuing a new one first settles the old.

use log::trace;

use crate::command::{Command, Frame};
use crate::link::{ControlLines, Link};

/// Response byte returned when nothing was outstanding.
const FLOATING_BUS: u8 = 0xFF;

pub struct Codec<L> {
    link: L,
    outstanding: Option<Command>,
    transactions: u64,
}

impl<L: Link> Codec<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            outstanding: None,
            transactions: 0,
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn into_inner(self) -> L {
        self.link
    }

    /// Transactions issued since construction.
    #[must_use]
    pub const fn transactions(&self) -> u64 {
        self.transactions
    }

    /// The transaction issued but not yet collected, if any.
    #[must_use]
    pub const fn outstanding(&self) -> Option<Command> {
        self.outstanding
    }

    pub fn is_ready(&mut self) -> bool {
        self.link.is_ready()
    }

    /// Spin until the CPLD raises ready. No timeout.
    pub fn wait_ready(&mut self) {
        while !self.link.is_ready() {
            std::hint::spin_loop();
        }
    }

    /// Start a transaction without waiting for it to finish.
    pub fn issue(&mut self, command: Command) {
        self.settle();
        trace!("issue {command:?}");
        for &frame in command.encode().frames() {
            self.link.send(frame);
        }
        self.outstanding = Some(command);
        self.transactions += 1;
    }

    /// Finish the outstanding transaction and return its response byte.
    pub fn collect(&mut self) -> u8 {
        let Some(command) = self.outstanding.take() else {
            return FLOATING_BUS;
        };
        self.wait_ready();
        let data = self.link.read_data();
        if command.expects_data() {
            trace!("collect {command:?} -> {data:#04X}");
        }
        data
    }

    /// Issue and collect in one step.
    pub fn transact(&mut self, command: Command) -> u8 {
        self.issue(command);
        self.collect()
    }

    fn settle(&mut self) {
        if self.outstanding.is_some() {
            self.collect();
        }
    }

    /// Send a raw 8-bit command and return the response byte.
    pub fn send_command(&mut self, opcode: u8) -> u8 {
        self.send_frame(Frame::Byte(opcode))
    }

    /// Send a raw 32-bit command word `address<<16 | data<<8 | opcode`.
    pub fn send32(&mut self, address: u16, data_and_opcode: u16) -> u8 {
        self.send_frame(Frame::Word(
            u32::from(address) << 16 | u32::from(data_and_opcode),
        ))
    }

    fn send_frame(&mut self, frame: Frame) -> u8 {
        self.settle();
        trace!("raw {frame:?}");
        self.link.send(frame);
        self.transactions += 1;
        self.wait_ready();
        self.link.read_data()
    }

    pub fn fetch_opcode(&mut self, address: u16) -> u8 {
        self.transact(Command::FetchOpcode { address })
    }

    pub fn read_byte(&mut self, address: u16) -> u8 {
        self.transact(Command::Read { address })
    }

    /// Writes are posted: the next transaction settles them.
    pub fn write_byte(&mut self, address: u16, data: u8) {
        self.issue(Command::Write { address, data });
    }

    pub fn read_port(&mut self, port: u16) -> u8 {
        self.transact(Command::ReadPort { port })
    }

    pub fn write_port(&mut self, port: u16, data: u8) {
        self.issue(Command::WritePort { port, data });
    }

    pub fn read_port_to_memory(&mut self, port: u16, dest: u16) -> u8 {
        self.transact(Command::ReadPortToMemory { port, dest })
    }

    pub fn halt_notify(&mut self) {
        self.issue(Command::Halt);
    }

    pub fn refresh(&mut self) {
        self.issue(Command::Refresh);
    }

    pub fn set_auto_refresh(&mut self, enabled: bool) {
        self.issue(if enabled {
            Command::SetAutoRefresh
        } else {
            Command::ClearAutoRefresh
        });
    }

    /// Echo a byte through the CPLD without touching the host bus.
    pub fn loopback(&mut self, data: u8) -> u8 {
        self.transact(Command::Loopback { data })
    }

    pub fn lines(&mut self) -> ControlLines {
        self.link.lines()
    }
}
