//! Host machine models.
//!
//! A model knows three things about its host: how the 64K address space
//! looks in each banking state, which guest accesses change that state,
//! and which ports it emulates itself. The engine asks the model to decode
//! every physical access after the transaction completes; virtual ports go
//! straight to [`MachineModel::read`] and [`MachineModel::write`].

mod keyboard;
mod mz1500;
mod mz2000;
mod mz700;
mod pcw;
mod ram_file;

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::HostError;
use crate::governor::DelayTable;
use crate::page::ModeSet;
use crate::store::DEFAULT_RAM_SIZE;

pub use keyboard::{Hotkey, HotkeyMonitor};
pub use mz700::Mz700;
pub use mz1500::Mz1500;
pub use mz2000::Mz2000;
pub use pcw::Pcw;
pub use ram_file::RamFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelId {
    Mz700,
    Mz1500,
    Mz2000,
    Pcw,
}

impl ModelId {
    pub const ALL: [ModelId; 4] = [ModelId::Mz700, ModelId::Mz1500, ModelId::Mz2000, ModelId::Pcw];

    /// A fresh model with all decoder state cleared.
    #[must_use]
    pub fn create(self) -> Box<dyn MachineModel> {
        match self {
            ModelId::Mz700 => Box::new(Mz700::new()),
            ModelId::Mz1500 => Box::new(Mz1500::new()),
            ModelId::Mz2000 => Box::new(Mz2000::new()),
            ModelId::Pcw => Box::new(Pcw::new()),
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelId::Mz700 => "MZ-700",
            ModelId::Mz1500 => "MZ-1500",
            ModelId::Mz2000 => "MZ-2000",
            ModelId::Pcw => "PCW",
        })
    }
}

impl FromStr for ModelId {
    type Err = HostError;

    /// Case-insensitive; the dash is optional (`mz700`, `MZ-700`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name: String = s
            .chars()
            .filter(|&c| c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match name.as_str() {
            "mz700" => Ok(ModelId::Mz700),
            "mz1500" => Ok(ModelId::Mz1500),
            "mz2000" => Ok(ModelId::Mz2000),
            "pcw" => Ok(ModelId::Pcw),
            _ => Err(HostError::UnknownModel(s.to_string())),
        }
    }
}

/// Whether a model's RAM and ROM are the in-process copies or the host's
/// own memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryProfile {
    #[default]
    Virtual,
    Physical,
}

#[derive(Debug, Error)]
#[error("unknown memory profile '{0}' (expected virtual or physical)")]
pub struct UnknownProfile(pub String);

impl FromStr for MemoryProfile {
    type Err = UnknownProfile;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "virtual" => Ok(MemoryProfile::Virtual),
            "physical" => Ok(MemoryProfile::Physical),
            _ => Err(UnknownProfile(s.to_string())),
        }
    }
}

impl fmt::Display for MemoryProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MemoryProfile::Virtual => "virtual",
            MemoryProfile::Physical => "physical",
        })
    }
}

/// Who keeps the host's DRAM refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// The companion chip refreshes on its own.
    Auto,
    /// The engine sends a refresh command on each refresh cycle.
    Manual,
    /// The host machine has its own refresh; nothing to do.
    Host,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    MemoryRead,
    MemoryWrite,
    PortRead,
    PortWrite,
}

/// A completed physical access, as seen by a decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub kind: AccessKind,
    pub address: u16,
    pub data: u8,
}

impl Access {
    #[must_use]
    pub const fn memory_read(address: u16, data: u8) -> Self {
        Self {
            kind: AccessKind::MemoryRead,
            address,
            data,
        }
    }

    #[must_use]
    pub const fn memory_write(address: u16, data: u8) -> Self {
        Self {
            kind: AccessKind::MemoryWrite,
            address,
            data,
        }
    }

    #[must_use]
    pub const fn port_read(port: u16, data: u8) -> Self {
        Self {
            kind: AccessKind::PortRead,
            address: port,
            data,
        }
    }

    #[must_use]
    pub const fn port_write(port: u16, data: u8) -> Self {
        Self {
            kind: AccessKind::PortWrite,
            address: port,
            data,
        }
    }

    /// Low byte of the address; models decode ports on A0-A7.
    #[must_use]
    pub const fn low(&self) -> u8 {
        self.address as u8
    }
}

/// Events raised towards the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum HostEvent {
    ServiceRequest(u8),
    SystemRequest(u8),
    Hotkey(Hotkey),
}

/// What a decoder did with an access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Decoded {
    /// Drop the governor's remaining skip credit.
    pub cancel_skip: bool,
    pub event: Option<HostEvent>,
}

impl Decoded {
    pub const NONE: Decoded = Decoded {
        cancel_skip: false,
        event: None,
    };
}

/// One step of bringing the in-process store in line with the host when a
/// model is selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStep {
    /// Read host memory `host` into virtual RAM starting at `offset`.
    MirrorRam { host: RangeInclusive<u16>, offset: u32 },
    /// Read host memory `host` into virtual ROM starting at `offset`.
    MirrorRom { host: RangeInclusive<u16>, offset: u32 },
    ClearRam,
    WritePort { port: u16, value: u8 },
}

pub trait MachineModel: Send {
    fn id(&self) -> ModelId;

    /// Install every precomputed mode for `profile`, default first.
    fn setup_memory(&mut self, profile: MemoryProfile, modes: &mut ModeSet);

    /// Update banking state after a physical access.
    fn decode_access(&mut self, access: Access, modes: &mut ModeSet) -> Decoded;

    /// Read an emulated (virtual) port.
    fn read(&mut self, port: u16) -> u8 {
        let _ = port;
        0xFF
    }

    /// Write an emulated (virtual) port.
    fn write(&mut self, port: u16, value: u8) -> Option<HostEvent> {
        let _ = (port, value);
        None
    }

    fn host_sync(&self, profile: MemoryProfile) -> Vec<SyncStep>;

    fn refresh_policy(&self, profile: MemoryProfile) -> RefreshPolicy;

    fn delay_table(&self) -> &'static DelayTable;

    /// Physical RAM is read from the store and written through to the host.
    fn caches_physical_ram(&self) -> bool {
        false
    }

    fn ram_size(&self) -> usize {
        DEFAULT_RAM_SIZE
    }

    /// Clear decoder state. The caller reinstalls the modes.
    fn reset(&mut self);
}
