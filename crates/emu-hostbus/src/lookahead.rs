//! Early issue of port transactions.
//!
//! When an opcode fetch is served from local memory the engine has time to
//! spare, so it decodes the instruction with the CPU's own I/O table and
//! starts the port transaction right away. The execute path later asks for
//! the same [`PortRequest`] and finds it already in flight.
//!
//! Both paths build requests through [`plan`] and
//! [`Planner::input_request`], so a pending request either matches the
//! executed one exactly or is never issued.

use cpld_link::Command;
use zilog_z80::IoAccess;

/// A port transaction as the engine issues it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortRequest {
    Read { port: u16 },
    Write { port: u16, value: u8 },
    /// Port read whose data the companion chip also stores at `dest`.
    ReadToMemory { port: u16, dest: u16 },
}

impl PortRequest {
    #[must_use]
    pub const fn command(self) -> Command {
        match self {
            PortRequest::Read { port } => Command::ReadPort { port },
            PortRequest::Write { port, value } => Command::WritePort { port, data: value },
            PortRequest::ReadToMemory { port, dest } => Command::ReadPortToMemory { port, dest },
        }
    }

    #[must_use]
    pub const fn port(self) -> u16 {
        match self {
            PortRequest::Read { port }
            | PortRequest::Write { port, .. }
            | PortRequest::ReadToMemory { port, .. } => port,
        }
    }
}

/// What planning needs to know about the current mapping.
pub trait Planner {
    fn is_physical_port(&self, port: u16) -> bool;

    /// Memory readable without a bus transaction.
    fn peek(&self, address: u16) -> Option<u8>;

    /// The request for one block-input iteration storing at `dest`.
    fn input_request(&self, port: u16, dest: u16) -> PortRequest;
}

/// The transaction `access` will perform, if it goes to the host and can
/// be formed without touching the bus.
pub fn plan(access: IoAccess, planner: &impl Planner) -> Option<PortRequest> {
    if !planner.is_physical_port(access.port()) {
        return None;
    }
    match access {
        IoAccess::In { port } => Some(PortRequest::Read { port }),
        IoAccess::Out { port, value } => Some(PortRequest::Write { port, value }),
        IoAccess::BlockIn { port, dest, .. } => Some(planner.input_request(port, dest)),
        IoAccess::BlockOut { port, src, .. } => planner
            .peek(src)
            .map(|value| PortRequest::Write { port, value }),
    }
}
