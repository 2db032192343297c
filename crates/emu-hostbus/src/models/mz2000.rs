//! Sharp MZ-2000.
//!
//! The machine boots in IPL mode with the boot ROM at 0000 and the first
//! 32K of RAM aliased at 8000. Setting the 8255's NST bit leaves IPL mode
//! and maps RAM 1:1. The PIO's port A pages video RAM into the high bank.

use std::sync::Arc;

use log::debug;

use super::keyboard::HotkeyMonitor;
use super::{
    Access, AccessKind, Decoded, HostEvent, MachineModel, MemoryProfile, ModelId, RefreshPolicy,
    SyncStep,
};
use crate::governor::{DelayTable, MZ_DELAYS};
use crate::page::{MemoryMode, ModeId, ModeSet, PageKind, PortKind, PortMap};

/// Video RAM paged into the high bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Vram {
    Off,
    /// Character plane at D000-D7FF.
    Char,
    /// Graphics planes at C000-FFFF.
    Graphics,
}

impl Vram {
    const ALL: [Vram; 3] = [Vram::Off, Vram::Char, Vram::Graphics];

    const fn index(self) -> usize {
        match self {
            Vram::Off => 0,
            Vram::Char => 1,
            Vram::Graphics => 2,
        }
    }
}

const SERVICE_PORT: u8 = 0x68;
const SYSTEM_PORT: u8 = 0x6A;

const NAMES: [[&str; 3]; 2] = [
    ["ipl/ram", "ipl/char", "ipl/gfx"],
    ["run/ram", "run/char", "run/gfx"],
];

fn layout(boot: bool, vram: Vram, profile: MemoryProfile, ports: Arc<PortMap>) -> MemoryMode {
    let name = NAMES[usize::from(!boot)][vram.index()];
    let mode = match (profile, boot) {
        (MemoryProfile::Virtual, true) => MemoryMode::new(name, PageKind::VirtualRom, ports)
            .map(0x0000..=0x7FFF, PageKind::VirtualRom, 0x0000)
            .map(0x8000..=0xFFFF, PageKind::VirtualRam, 0x0000),
        (MemoryProfile::Virtual, false) => MemoryMode::new(name, PageKind::VirtualRam, ports),
        (MemoryProfile::Physical, true) => MemoryMode::new(name, PageKind::PhysicalRam, ports)
            .map(0x0000..=0x7FFF, PageKind::PhysicalRom, 0x0000),
        (MemoryProfile::Physical, false) => MemoryMode::new(name, PageKind::PhysicalRam, ports),
    };
    match vram {
        Vram::Off => mode,
        Vram::Char => mode.map(0xD000..=0xD7FF, PageKind::PhysicalVram, 0xD000),
        Vram::Graphics => mode.map(0xC000..=0xFFFF, PageKind::PhysicalVram, 0xC000),
    }
}

const fn mode_id(boot: bool, vram: Vram) -> ModeId {
    (if boot { 0 } else { 3 }) + vram.index()
}

pub struct Mz2000 {
    boot: bool,
    vram: Vram,
    keyboard: HotkeyMonitor,
}

impl Mz2000 {
    #[must_use]
    pub fn new() -> Self {
        Self {
            boot: true,
            vram: Vram::Off,
            keyboard: HotkeyMonitor::new(),
        }
    }

    /// 8255 bit set/reset on port E3.
    fn bit_control(&mut self, data: u8) {
        if data & 0x80 != 0 {
            return;
        }
        match ((data >> 1) & 7, data & 1 != 0) {
            (1, true) => self.boot = false,
            (3, false) => self.boot = true,
            _ => {}
        }
    }

    fn port_write(&mut self, port: u8, data: u8, modes: &mut ModeSet) {
        match port {
            0xE3 => self.bit_control(data),
            0xE2 => {
                if data & 0x01 != 0 {
                    self.bit_control(0x03);
                } else if data & 0x08 == 0 {
                    self.bit_control(0x06);
                } else {
                    return;
                }
            }
            0xE8 => {
                self.keyboard.strobe(data);
                self.vram = if data & 0x80 == 0 {
                    Vram::Off
                } else if data & 0x40 != 0 {
                    Vram::Char
                } else {
                    Vram::Graphics
                };
            }
            _ => return,
        }
        debug!("mz2000: {} vram {:?}", if self.boot { "ipl" } else { "run" }, self.vram);
        modes.switch_mode(mode_id(self.boot, self.vram));
    }
}

impl Default for Mz2000 {
    fn default() -> Self {
        Self::new()
    }
}

impl MachineModel for Mz2000 {
    fn id(&self) -> ModelId {
        ModelId::Mz2000
    }

    fn setup_memory(&mut self, profile: MemoryProfile, modes: &mut ModeSet) {
        let mut ports = PortMap::physical();
        ports.set_low_byte(SERVICE_PORT, PortKind::Virtual);
        ports.set_low_byte(SYSTEM_PORT, PortKind::Virtual);
        let ports = Arc::new(ports);
        let mut all = [true, false].into_iter().flat_map(|boot| {
            let ports = ports.clone();
            Vram::ALL
                .into_iter()
                .map(move |vram| layout(boot, vram, profile, ports.clone()))
        });
        let Some(default) = all.next() else {
            return;
        };
        modes.install(default, all.collect());
    }

    fn decode_access(&mut self, access: Access, modes: &mut ModeSet) -> Decoded {
        match access.kind {
            AccessKind::PortWrite => {
                self.port_write(access.low(), access.data, modes);
                Decoded::NONE
            }
            AccessKind::PortRead if access.low() == 0xEA => Decoded {
                cancel_skip: false,
                event: self.keyboard.mz2000_scan(access.data).map(HostEvent::Hotkey),
            },
            _ => Decoded::NONE,
        }
    }

    fn write(&mut self, port: u16, value: u8) -> Option<HostEvent> {
        match port as u8 {
            SERVICE_PORT => Some(HostEvent::ServiceRequest(value)),
            SYSTEM_PORT => Some(HostEvent::SystemRequest(value)),
            _ => None,
        }
    }

    fn host_sync(&self, profile: MemoryProfile) -> Vec<SyncStep> {
        match profile {
            MemoryProfile::Virtual => vec![
                SyncStep::MirrorRom {
                    host: 0x0000..=0x7FFF,
                    offset: 0x0000,
                },
                SyncStep::MirrorRam {
                    host: 0x8000..=0xFFFF,
                    offset: 0x0000,
                },
            ],
            MemoryProfile::Physical => Vec::new(),
        }
    }

    fn refresh_policy(&self, profile: MemoryProfile) -> RefreshPolicy {
        match profile {
            MemoryProfile::Virtual => RefreshPolicy::Host,
            MemoryProfile::Physical => RefreshPolicy::Manual,
        }
    }

    fn delay_table(&self) -> &'static DelayTable {
        &MZ_DELAYS
    }

    fn reset(&mut self) {
        self.boot = true;
        self.vram = Vram::Off;
        self.keyboard = HotkeyMonitor::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selected() -> (Mz2000, ModeSet) {
        let mut model = Mz2000::new();
        let mut modes = ModeSet::passthrough();
        model.setup_memory(MemoryProfile::Virtual, &mut modes);
        (model, modes)
    }

    #[test]
    fn ipl_aliases_low_ram_at_8000() {
        let (_, modes) = selected();
        assert_eq!(modes.fixed_modes(), 6);
        assert_eq!(modes.classify(0x0000).kind, PageKind::VirtualRom);
        let high = modes.classify(0x8000);
        assert_eq!(high.kind, PageKind::VirtualRam);
        assert_eq!(high.backing(0x8123), 0x0123);
    }

    #[test]
    fn nst_and_ipl_through_either_port() {
        let (mut model, mut modes) = selected();
        model.decode_access(Access::port_write(0x00E3, 0x03), &mut modes);
        assert_eq!(modes.active().name, "run/ram");
        assert_eq!(modes.classify(0x8000).backing(0x8000), 0x8000);
        model.decode_access(Access::port_write(0x00E3, 0x06), &mut modes);
        assert_eq!(modes.active().name, "ipl/ram");
        model.decode_access(Access::port_write(0x00E2, 0x01), &mut modes);
        assert_eq!(modes.active().name, "run/ram");
        model.decode_access(Access::port_write(0x00E2, 0x00), &mut modes);
        assert_eq!(modes.active().name, "ipl/ram");
        // Bit 7 set is a mode word, not a bit operation.
        model.decode_access(Access::port_write(0x00E3, 0x83), &mut modes);
        assert_eq!(modes.active().name, "ipl/ram");
    }

    #[test]
    fn vram_planes() {
        let (mut model, mut modes) = selected();
        model.decode_access(Access::port_write(0x00E3, 0x03), &mut modes);
        model.decode_access(Access::port_write(0x00E8, 0xC0), &mut modes);
        assert_eq!(modes.classify(0xD000).kind, PageKind::PhysicalVram);
        assert_eq!(modes.classify(0xD800).kind, PageKind::VirtualRam);
        model.decode_access(Access::port_write(0x00E8, 0x80), &mut modes);
        assert_eq!(modes.classify(0xC000).kind, PageKind::PhysicalVram);
        model.decode_access(Access::port_write(0x00E8, 0x00), &mut modes);
        assert_eq!(modes.active().name, "run/ram");
    }

    #[test]
    fn service_ports_raise_events() {
        let (mut model, modes) = selected();
        assert_eq!(modes.port_kind(0x0168), PortKind::Virtual);
        assert_eq!(model.write(0x0068, 7), Some(HostEvent::ServiceRequest(7)));
        assert_eq!(model.write(0x006A, 1), Some(HostEvent::SystemRequest(1)));
        assert_eq!(model.read(0x0068), 0xFF);
    }
}
