//! Software model of the CPLD and the host bus behind it.
//!
//! `SimLink` decodes frames exactly as the CPLD would and applies them to a
//! flat 64K host memory and a 64K port space. Every decoded command is
//! logged so tests can assert on the traffic the engine produced.

use log::warn;

use crate::command::{Command, Decoder, Frame};
use crate::link::{ControlLines, Link};

pub struct SimLink {
    memory: Vec<u8>,
    /// Value returned by a read of each port.
    port_inputs: Vec<u8>,
    /// Last value written to each port.
    port_outputs: Vec<u8>,
    commands: Vec<Command>,
    logging: bool,
    decoder: Decoder,
    data: u8,
    auto_refresh: bool,
    lines: ControlLines,
    /// Polls that report busy before each transaction completes.
    busy_polls: u32,
    busy_remaining: u32,
    polls: u64,
}

impl SimLink {
    #[must_use]
    pub fn new() -> Self {
        Self {
            memory: vec![0; 0x10000],
            port_inputs: vec![0xFF; 0x10000],
            port_outputs: vec![0; 0x10000],
            commands: Vec::new(),
            logging: true,
            decoder: Decoder::new(),
            data: 0xFF,
            auto_refresh: false,
            lines: ControlLines::default(),
            busy_polls: 0,
            busy_remaining: 0,
            polls: 0,
        }
    }

    /// Every command decoded so far, oldest first.
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Turn the command log on or off. On by default.
    pub fn set_logging(&mut self, enabled: bool) {
        self.logging = enabled;
    }

    /// Port writes in the command log, in order.
    #[must_use]
    pub fn port_writes(&self) -> Vec<(u16, u8)> {
        self.commands
            .iter()
            .filter_map(|c| match *c {
                Command::WritePort { port, data } => Some((port, data)),
                _ => None,
            })
            .collect()
    }

    pub fn set_port_input(&mut self, port: u16, value: u8) {
        self.port_inputs[port as usize] = value;
    }

    #[must_use]
    pub fn port_output(&self, port: u16) -> u8 {
        self.port_outputs[port as usize]
    }

    #[must_use]
    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    #[must_use]
    pub const fn auto_refresh(&self) -> bool {
        self.auto_refresh
    }

    pub fn set_lines(&mut self, lines: ControlLines) {
        self.lines = lines;
    }

    /// Make each transaction report busy for `polls` ready checks.
    pub fn set_busy_polls(&mut self, polls: u32) {
        self.busy_polls = polls;
    }

    /// Ready checks made so far.
    #[must_use]
    pub const fn polls(&self) -> u64 {
        self.polls
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::FetchOpcode { address } | Command::Read { address } => {
                self.data = self.memory[address as usize];
            }
            Command::Write { address, data } => {
                self.memory[address as usize] = data;
            }
            Command::WritePort { port, data } => {
                self.port_outputs[port as usize] = data;
            }
            Command::ReadPort { port } => {
                self.data = self.port_inputs[port as usize];
            }
            Command::ReadPortToMemory { port, dest } => {
                let value = self.port_inputs[port as usize];
                self.memory[dest as usize] = value;
                self.data = value;
            }
            Command::SetAutoRefresh => self.auto_refresh = true,
            Command::ClearAutoRefresh => self.auto_refresh = false,
            Command::Loopback { data } => self.data = data,
            Command::Nop | Command::Halt | Command::Refresh => {}
        }
        if self.logging {
            self.commands.push(command);
        }
    }
}

impl Default for SimLink {
    fn default() -> Self {
        Self::new()
    }
}

impl Link for SimLink {
    fn send(&mut self, frame: Frame) {
        let partial = self.decoder.is_partial();
        match self.decoder.push(frame) {
            Some(command) => self.apply(command),
            None if !partial && self.decoder.is_partial() => {}
            None => warn!("sim: unknown frame {frame:?}"),
        }
        self.busy_remaining = self.busy_polls;
    }

    fn is_ready(&mut self) -> bool {
        self.polls += 1;
        if self.busy_remaining > 0 {
            self.busy_remaining -= 1;
            return false;
        }
        true
    }

    fn read_data(&mut self) -> u8 {
        self.data
    }

    /// INT is a level; NMI and RESET clear once sampled.
    fn lines(&mut self) -> ControlLines {
        let lines = self.lines;
        self.lines.nmi = false;
        self.lines.reset = false;
        lines
    }
}
