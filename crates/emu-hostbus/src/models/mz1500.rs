//! Sharp MZ-1500: MZ-700 banking with the PCG plane on E5/E6.

use log::debug;

use super::keyboard::HotkeyMonitor;
use super::mz700::{self, High};
use super::ram_file::RamFile;
use super::{
    Access, AccessKind, Decoded, HostEvent, MachineModel, MemoryProfile, ModelId, RefreshPolicy,
    SyncStep,
};
use crate::governor::{DelayTable, MZ_DELAYS};
use crate::page::ModeSet;

const NAMES: [&str; 6] = [
    "mon/mmio",
    "dram/dram",
    "dram/mmio",
    "dram/pcg",
    "mon/dram",
    "mon/pcg",
];

pub struct Mz1500 {
    low_dram: bool,
    high_dram: bool,
    pcg: bool,
    keyboard: HotkeyMonitor,
    ram_file: RamFile,
}

impl Mz1500 {
    #[must_use]
    pub fn new() -> Self {
        Self {
            low_dram: false,
            high_dram: false,
            pcg: false,
            keyboard: HotkeyMonitor::new(),
            ram_file: RamFile::new(),
        }
    }

    /// Returns true for ports whose writes must not run on skip credit.
    fn bank(&mut self, port: u8, modes: &mut ModeSet) -> bool {
        match port {
            0xE0 => self.low_dram = true,
            0xE1 if !self.pcg => self.high_dram = true,
            0xE2 => self.low_dram = false,
            0xE3 => self.high_dram = false,
            0xE4 => {
                self.low_dram = false;
                self.high_dram = false;
                self.pcg = false;
            }
            0xE5 => self.pcg = true,
            0xE6 => self.pcg = false,
            0xE1 => return true,
            // PSG
            0xF4..=0xF7 => return true,
            _ => return false,
        }
        debug!(
            "mz1500: low {} high {} pcg {}",
            if self.low_dram { "dram" } else { "mon" },
            if self.high_dram { "dram" } else { "mmio" },
            self.pcg
        );
        modes.switch_mode(mz700::mode_id(self.low_dram, self.high_dram, self.pcg));
        true
    }
}

impl Default for Mz1500 {
    fn default() -> Self {
        Self::new()
    }
}

impl MachineModel for Mz1500 {
    fn id(&self) -> ModelId {
        ModelId::Mz1500
    }

    fn setup_memory(&mut self, profile: MemoryProfile, modes: &mut ModeSet) {
        mz700::install(modes, profile, High::Pcg, NAMES);
    }

    fn decode_access(&mut self, access: Access, modes: &mut ModeSet) -> Decoded {
        match access.kind {
            AccessKind::PortWrite => Decoded {
                cancel_skip: self.bank(access.low(), modes),
                event: None,
            },
            AccessKind::MemoryRead | AccessKind::MemoryWrite => Decoded {
                cancel_skip: false,
                event: mz700::keyboard(&mut self.keyboard, access),
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
        mz700::host_sync(profile)
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
        self.pcg = false;
        self.keyboard = HotkeyMonitor::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageKind;

    fn out(model: &mut Mz1500, modes: &mut ModeSet, port: u16) -> Decoded {
        model.decode_access(Access::port_write(port, 0), modes)
    }

    #[test]
    fn pcg_plane_maps_the_top_window_to_the_host() {
        let mut model = Mz1500::new();
        let mut modes = ModeSet::passthrough();
        model.setup_memory(MemoryProfile::Virtual, &mut modes);
        out(&mut model, &mut modes, 0x00E5);
        assert_eq!(modes.active().name, "mon/pcg");
        assert_eq!(modes.classify(0xF000).kind, PageKind::PhysicalHw);
        // E1 is ignored while the PCG plane is in.
        out(&mut model, &mut modes, 0x00E1);
        assert_eq!(modes.active().name, "mon/pcg");
        out(&mut model, &mut modes, 0x00E6);
        assert_eq!(modes.active().name, "mon/mmio");
        out(&mut model, &mut modes, 0x00E1);
        assert_eq!(modes.active().name, "mon/dram");
    }

    #[test]
    fn control_and_psg_writes_cancel_credit() {
        let mut model = Mz1500::new();
        let mut modes = ModeSet::passthrough();
        model.setup_memory(MemoryProfile::Virtual, &mut modes);
        assert!(out(&mut model, &mut modes, 0x00E0).cancel_skip);
        assert!(out(&mut model, &mut modes, 0x00F6).cancel_skip);
        assert!(!out(&mut model, &mut modes, 0x00FE).cancel_skip);
    }
}
