//! Sharp MZ-700.
//!
//! Ports E0-E6 switch the low 4K between monitor ROM and DRAM and the top
//! 12K between memory-mapped I/O and DRAM. E5 freezes the top 12K (reads
//! 0xFF, writes dropped) until E6. The MZ-1500 shares the layouts and
//! adds its own use of E5/E6.

use std::sync::Arc;

use log::debug;

use super::keyboard::HotkeyMonitor;
use super::ram_file::RamFile;
use super::{
    Access, AccessKind, Decoded, HostEvent, MachineModel, MemoryProfile, ModelId, RefreshPolicy,
    SyncStep,
};
use crate::governor::{DelayTable, MZ_DELAYS};
use crate::page::{MemoryMode, ModeId, ModeSet, PageKind, PortKind, PortMap};

/// What sits in 0000-0FFF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Low {
    Monitor,
    Dram,
}

/// What sits in D000-FFFF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum High {
    Mmio,
    Dram,
    Inhibit,
    /// MZ-1500 PCG plane: the whole window goes to the host.
    Pcg,
}

pub(super) const KEY_STROBE: u16 = 0xE000;
pub(super) const KEY_SCAN: u16 = 0xE001;

const ROM_LOW: std::ops::RangeInclusive<u16> = 0x0000..=0x0FFF;
const RAM_MAIN: std::ops::RangeInclusive<u16> = 0x1000..=0xCFFF;

fn ram_kind(profile: MemoryProfile) -> PageKind {
    match profile {
        MemoryProfile::Virtual => PageKind::VirtualRam,
        MemoryProfile::Physical => PageKind::PhysicalRam,
    }
}

fn rom_kind(profile: MemoryProfile) -> PageKind {
    match profile {
        MemoryProfile::Virtual => PageKind::VirtualRom,
        MemoryProfile::Physical => PageKind::PhysicalRom,
    }
}

/// The RAM-file board is emulated when running from virtual memory.
pub(super) fn port_map(profile: MemoryProfile) -> Arc<PortMap> {
    let mut ports = PortMap::physical();
    if profile == MemoryProfile::Virtual {
        ports.set_low_byte(0xEA, PortKind::Virtual);
        ports.set_low_byte(0xEB, PortKind::Virtual);
    }
    Arc::new(ports)
}

/// One banking state. Virtual offsets equal the address, so a block keeps
/// its data when it moves between ROM and RAM views.
pub(super) fn layout(
    name: &'static str,
    low: Low,
    high: High,
    profile: MemoryProfile,
    ports: Arc<PortMap>,
) -> MemoryMode {
    let ram = ram_kind(profile);
    let rom = rom_kind(profile);
    let mode = MemoryMode::new(name, ram, ports).map(RAM_MAIN, ram, 0x1000);
    let mode = match low {
        Low::Monitor => mode.map(ROM_LOW, rom, 0x0000),
        Low::Dram => mode.map(ROM_LOW, ram, 0x0000),
    };
    match high {
        High::Mmio => mode
            .map(0xD000..=0xDFFF, PageKind::PhysicalVram, 0xD000)
            .map(0xE000..=0xE7FF, PageKind::PhysicalHw, 0xE000)
            .map(0xE800..=0xFFFF, rom, 0xE800),
        High::Dram => mode.map(0xD000..=0xFFFF, ram, 0xD000),
        High::Inhibit => mode.map(0xD000..=0xFFFF, PageKind::Inhibit, 0),
        High::Pcg => mode.map(0xD000..=0xFFFF, PageKind::PhysicalHw, 0xD000),
    }
}

/// Install the six banking states. `blocked` is the state of the top
/// window while E1/E3 are locked out.
pub(super) fn install(
    modes: &mut ModeSet,
    profile: MemoryProfile,
    blocked: High,
    names: [&'static str; 6],
) {
    let ports = port_map(profile);
    let states = [
        (Low::Monitor, High::Mmio),
        (Low::Dram, High::Dram),
        (Low::Dram, High::Mmio),
        (Low::Dram, blocked),
        (Low::Monitor, High::Dram),
        (Low::Monitor, blocked),
    ];
    let mut all = states
        .iter()
        .zip(names)
        .map(|(&(low, high), name)| layout(name, low, high, profile, ports.clone()));
    let Some(default) = all.next() else {
        return;
    };
    modes.install(default, all.collect());
}

/// Mode for the flag combination; ids follow the order in [`install`].
pub(super) const fn mode_id(low_dram: bool, high_dram: bool, blocked: bool) -> ModeId {
    match (blocked, low_dram, high_dram) {
        (true, true, _) => 3,
        (true, false, _) => 5,
        (false, false, false) => 0,
        (false, true, true) => 1,
        (false, true, false) => 2,
        (false, false, true) => 4,
    }
}

pub(super) fn host_sync(profile: MemoryProfile) -> Vec<SyncStep> {
    match profile {
        MemoryProfile::Virtual => vec![
            SyncStep::MirrorRam {
                host: RAM_MAIN,
                offset: 0x1000,
            },
            SyncStep::MirrorRom {
                host: ROM_LOW,
                offset: 0x0000,
            },
            SyncStep::MirrorRom {
                host: 0xE800..=0xFFFF,
                offset: 0xE800,
            },
            SyncStep::WritePort {
                port: 0x00E4,
                value: 0x00,
            },
        ],
        MemoryProfile::Physical => Vec::new(),
    }
}

/// Keyboard strobe and scan at E000/E001.
pub(super) fn keyboard(monitor: &mut HotkeyMonitor, access: Access) -> Option<HostEvent> {
    match (access.kind, access.address) {
        (AccessKind::MemoryWrite, KEY_STROBE) => {
            monitor.strobe(access.data);
            None
        }
        (AccessKind::MemoryRead, KEY_SCAN) => {
            monitor.mz700_scan(access.data).map(HostEvent::Hotkey)
        }
        _ => None,
    }
}

const NAMES: [&str; 6] = [
    "mon/mmio",
    "dram/dram",
    "dram/mmio",
    "dram/inhibit",
    "mon/dram",
    "mon/inhibit",
];

pub struct Mz700 {
    low_dram: bool,
    high_dram: bool,
    frozen: bool,
    keyboard: HotkeyMonitor,
    ram_file: RamFile,
}

impl Mz700 {
    #[must_use]
    pub fn new() -> Self {
        Self {
            low_dram: false,
            high_dram: false,
            frozen: false,
            keyboard: HotkeyMonitor::new(),
            ram_file: RamFile::new(),
        }
    }

    fn bank(&mut self, port: u8, modes: &mut ModeSet) {
        match port {
            0xE0 => self.low_dram = true,
            0xE1 if !self.frozen => self.high_dram = true,
            0xE2 => self.low_dram = false,
            0xE3 if !self.frozen => self.high_dram = false,
            0xE4 => {
                self.low_dram = false;
                self.high_dram = false;
                self.frozen = false;
                modes.drop_shadow();
            }
            0xE5 => {
                if !self.frozen {
                    self.frozen = true;
                    modes.inhibit(0xD000..=0xFFFF);
                }
                return;
            }
            0xE6 => {
                if self.frozen {
                    self.frozen = false;
                    modes.restore(0xD000..=0xFFFF);
                }
                return;
            }
            _ => return,
        }
        debug!(
            "mz700: low {} high {} frozen {}",
            if self.low_dram { "dram" } else { "mon" },
            if self.high_dram { "dram" } else { "mmio" },
            self.frozen
        );
        modes.switch_mode(mode_id(self.low_dram, self.high_dram, self.frozen));
    }
}

impl Default for Mz700 {
    fn default() -> Self {
        Self::new()
    }
}

impl MachineModel for Mz700 {
    fn id(&self) -> ModelId {
        ModelId::Mz700
    }

    fn setup_memory(&mut self, profile: MemoryProfile, modes: &mut ModeSet) {
        install(modes, profile, High::Inhibit, NAMES);
    }

    fn decode_access(&mut self, access: Access, modes: &mut ModeSet) -> Decoded {
        match access.kind {
            AccessKind::PortWrite => {
                self.bank(access.low(), modes);
                Decoded::NONE
            }
            AccessKind::MemoryRead | AccessKind::MemoryWrite => Decoded {
                cancel_skip: false,
                event: keyboard(&mut self.keyboard, access),
            },
            AccessKind::PortRead => Decoded::NONE,
        }
    }

    fn read(&mut self, port: u16) -> u8 {
        self.ram_file.read(port)
    }

    fn write(&mut self, port: u16, value: u8) -> Option<HostEvent> {
        self.ram_file.write(port, value);
        None
    }

    fn host_sync(&self, profile: MemoryProfile) -> Vec<SyncStep> {
        host_sync(profile)
    }

    fn refresh_policy(&self, profile: MemoryProfile) -> RefreshPolicy {
        match profile {
            MemoryProfile::Virtual => RefreshPolicy::Auto,
            MemoryProfile::Physical => RefreshPolicy::Manual,
        }
    }

    fn delay_table(&self) -> &'static DelayTable {
        &MZ_DELAYS
    }

    fn reset(&mut self) {
        self.low_dram = false;
        self.high_dram = false;
        self.frozen = false;
        self.keyboard = HotkeyMonitor::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Hotkey;

    fn selected(profile: MemoryProfile) -> (Mz700, ModeSet) {
        let mut model = Mz700::new();
        let mut modes = ModeSet::passthrough();
        model.setup_memory(profile, &mut modes);
        (model, modes)
    }

    fn out(model: &mut Mz700, modes: &mut ModeSet, port: u16) {
        model.decode_access(Access::port_write(port, 0), modes);
    }

    #[test]
    fn default_layout() {
        let (_, modes) = selected(MemoryProfile::Virtual);
        assert_eq!(modes.classify(0x0000).kind, PageKind::VirtualRom);
        assert_eq!(modes.classify(0x1000).kind, PageKind::VirtualRam);
        assert_eq!(modes.classify(0xD000).kind, PageKind::PhysicalVram);
        assert_eq!(modes.classify(0xE000).kind, PageKind::PhysicalHw);
        assert_eq!(modes.classify(0xE800).kind, PageKind::VirtualRom);
        assert_eq!(modes.classify(0xF000).offset, 0xF000);
        assert_eq!(modes.port_kind(0x00EA), PortKind::Virtual);
        assert_eq!(modes.port_kind(0x00E0), PortKind::Physical);
    }

    #[test]
    fn physical_profile_keeps_everything_on_the_host() {
        let (_, modes) = selected(MemoryProfile::Physical);
        assert!(modes.active().pages().iter().all(|p| p.kind.is_physical()));
        assert_eq!(modes.port_kind(0x00EB), PortKind::Physical);
    }

    #[test]
    fn each_port_selects_its_state() {
        let (mut model, mut modes) = selected(MemoryProfile::Virtual);
        out(&mut model, &mut modes, 0x00E0);
        assert_eq!(modes.active().name, "dram/mmio");
        out(&mut model, &mut modes, 0x00E1);
        assert_eq!(modes.active().name, "dram/dram");
        out(&mut model, &mut modes, 0x00E2);
        assert_eq!(modes.active().name, "mon/dram");
        out(&mut model, &mut modes, 0x00E3);
        assert_eq!(modes.active().name, "mon/mmio");
        out(&mut model, &mut modes, 0x00E0);
        out(&mut model, &mut modes, 0x00E4);
        assert_eq!(modes.active_id(), 0);
    }

    #[test]
    fn freeze_locks_out_the_high_selects() {
        let (mut model, mut modes) = selected(MemoryProfile::Virtual);
        out(&mut model, &mut modes, 0x00E5);
        assert_eq!(modes.classify(0xD000).kind, PageKind::Inhibit);
        out(&mut model, &mut modes, 0x00E1);
        assert_eq!(modes.classify(0xE800).kind, PageKind::Inhibit);
        out(&mut model, &mut modes, 0x00E0);
        assert_eq!(modes.active().name, "dram/inhibit");
        out(&mut model, &mut modes, 0x00E6);
        assert_eq!(modes.classify(0xE800).kind, PageKind::VirtualRom);
        assert_eq!(modes.classify(0x0000).kind, PageKind::VirtualRam);
        assert_eq!(
            modes.active().pages(),
            modes.mode(2).map(MemoryMode::pages).unwrap()
        );
    }

    #[test]
    fn keyboard_hotkey_from_memory_mapped_scan() {
        let (mut model, mut modes) = selected(MemoryProfile::Virtual);
        model.decode_access(Access::memory_write(KEY_STROBE, 0xF8), &mut modes);
        model.decode_access(Access::memory_read(KEY_SCAN, 0xBF), &mut modes);
        model.decode_access(Access::memory_write(KEY_STROBE, 0xF5), &mut modes);
        let decoded = model.decode_access(Access::memory_read(KEY_SCAN, 0xEF), &mut modes);
        assert_eq!(decoded.event, Some(HostEvent::Hotkey(Hotkey::Linux)));
    }
}
