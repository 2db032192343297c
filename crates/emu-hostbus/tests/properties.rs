//! Page-table properties over random banking sequences.

use emu_hostbus::models::Access;
use emu_hostbus::page::BLOCKS;
use emu_hostbus::store::{ROM_SIZE, capacity_for};
use emu_hostbus::{MachineModel, MemoryMode, MemoryProfile, ModeSet, ModelId, PageKind};
use proptest::prelude::*;

fn selected(id: ModelId, profile: MemoryProfile) -> (Box<dyn MachineModel>, ModeSet) {
    let mut model = id.create();
    let mut modes = ModeSet::passthrough();
    model.setup_memory(profile, &mut modes);
    (model, modes)
}

fn model_id() -> impl Strategy<Value = ModelId> {
    prop::sample::select(ModelId::ALL.to_vec())
}

fn profile() -> impl Strategy<Value = MemoryProfile> {
    prop_oneof![Just(MemoryProfile::Virtual), Just(MemoryProfile::Physical)]
}

/// Port writes that move the banking of some model.
fn banking_write() -> impl Strategy<Value = (u8, u8)> {
    (
        prop::sample::select(vec![
            0xE0u8, 0xE1, 0xE2, 0xE3, 0xE4, 0xE5, 0xE6, 0xE8, 0xF0, 0xF1, 0xF2, 0xF3,
        ]),
        any::<u8>(),
    )
}

/// The MZ-700 banking flags, tracked independently of the page tables.
#[derive(Debug, Default)]
struct Flags {
    low_dram: bool,
    high_dram: bool,
    frozen: bool,
}

impl Flags {
    fn apply(&mut self, port: u8) {
        match port {
            0xE0 => self.low_dram = true,
            0xE1 if !self.frozen => self.high_dram = true,
            0xE2 => self.low_dram = false,
            0xE3 if !self.frozen => self.high_dram = false,
            0xE4 => *self = Flags::default(),
            0xE5 => self.frozen = true,
            0xE6 => self.frozen = false,
            _ => {}
        }
    }

    fn mode_name(&self) -> String {
        let low = if self.low_dram { "dram" } else { "mon" };
        let high = match (self.frozen, self.high_dram) {
            (true, _) => "inhibit",
            (false, true) => "dram",
            (false, false) => "mmio",
        };
        format!("{low}/{high}")
    }
}

/// The MZ-1500 flags: MZ-700 banking, PCG plane instead of the freeze.
#[derive(Debug, Default)]
struct PcgFlags {
    low_dram: bool,
    high_dram: bool,
    pcg: bool,
}

impl PcgFlags {
    fn apply(&mut self, port: u8) {
        match port {
            0xE0 => self.low_dram = true,
            0xE1 if !self.pcg => self.high_dram = true,
            0xE2 => self.low_dram = false,
            0xE3 => self.high_dram = false,
            0xE4 => *self = PcgFlags::default(),
            0xE5 => self.pcg = true,
            0xE6 => self.pcg = false,
            _ => {}
        }
    }

    fn mode_name(&self) -> String {
        let low = if self.low_dram { "dram" } else { "mon" };
        let high = match (self.pcg, self.high_dram) {
            (true, _) => "pcg",
            (false, true) => "dram",
            (false, false) => "mmio",
        };
        format!("{low}/{high}")
    }
}

/// MZ-2000 IPL state and video RAM paging.
#[derive(Debug)]
struct IplFlags {
    boot: bool,
    vram: &'static str,
}

impl IplFlags {
    fn apply(&mut self, port: u8, data: u8) {
        match port {
            // 8255 bit set/reset: NST is PC1, IPL is PC3.
            0xE3 if data & 0x80 == 0 => match ((data >> 1) & 7, data & 1) {
                (1, 1) => self.boot = false,
                (3, 0) => self.boot = true,
                _ => {}
            },
            0xE2 if data & 0x01 != 0 => self.boot = false,
            0xE2 if data & 0x08 == 0 => self.boot = true,
            0xE8 => {
                self.vram = match (data & 0x80 != 0, data & 0x40 != 0) {
                    (false, _) => "ram",
                    (true, true) => "char",
                    (true, false) => "gfx",
                }
            }
            _ => {}
        }
    }

    fn mode_name(&self) -> String {
        format!("{}/{}", if self.boot { "ipl" } else { "run" }, self.vram)
    }
}

fn fixed_mode<'a>(modes: &'a ModeSet, name: &str) -> Option<&'a MemoryMode> {
    (0..modes.fixed_modes())
        .filter_map(|id| modes.mode(id))
        .find(|mode| mode.name == name)
}

proptest! {
    /// Every address lands on exactly one entry, and virtual entries stay
    /// inside the store.
    #[test]
    fn virtual_pages_stay_in_the_store(
        id in model_id(),
        profile in profile(),
        writes in prop::collection::vec(banking_write(), 0..32),
    ) {
        let (mut model, mut modes) = selected(id, profile);
        let ram = capacity_for(model.ram_size()) as u32;
        for (port, data) in writes {
            model.decode_access(Access::port_write(u16::from(port), data), &mut modes);
            let pages = modes.active().pages();
            prop_assert_eq!(pages.len(), BLOCKS);
            for address in (0..=0xFFFFu16).step_by(0x100) {
                let entry = modes.classify(address);
                prop_assert_eq!(entry, pages[usize::from(address >> 11)]);
                match entry.kind {
                    PageKind::VirtualRam => prop_assert!(entry.backing(address) < ram),
                    PageKind::VirtualRom => prop_assert!(entry.backing(address) < ROM_SIZE as u32),
                    _ => {}
                }
            }
        }
    }

    /// After any sequence of MZ-700 bank writes the page table is exactly
    /// the precomputed mode for the resulting flags.
    #[test]
    fn mz700_banking_matches_flag_model(
        profile in profile(),
        ports in prop::collection::vec(0xE0u8..=0xE6, 0..48),
    ) {
        let (mut model, mut modes) = selected(ModelId::Mz700, profile);
        let mut flags = Flags::default();
        for port in ports {
            model.decode_access(Access::port_write(u16::from(port), 0), &mut modes);
            flags.apply(port);

            let name = flags.mode_name();
            let expected = fixed_mode(&modes, &name);
            prop_assert!(expected.is_some(), "no mode {}", name);
            if let Some(expected) = expected {
                prop_assert_eq!(modes.active().pages(), expected.pages());
            }
            prop_assert_eq!(modes.is_inhibited(), flags.frozen);
        }
    }

    #[test]
    fn mz1500_banking_matches_flag_model(
        profile in profile(),
        ports in prop::collection::vec(0xE0u8..=0xE6, 0..48),
    ) {
        let (mut model, mut modes) = selected(ModelId::Mz1500, profile);
        let mut flags = PcgFlags::default();
        for port in ports {
            model.decode_access(Access::port_write(u16::from(port), 0), &mut modes);
            flags.apply(port);

            let name = flags.mode_name();
            let expected = fixed_mode(&modes, &name);
            prop_assert!(expected.is_some(), "no mode {}", name);
            if let Some(expected) = expected {
                prop_assert_eq!(modes.active().pages(), expected.pages());
            }
            if flags.pcg {
                prop_assert_eq!(modes.classify(0xF000).kind, PageKind::PhysicalHw);
            }
            prop_assert!(!modes.is_inhibited());
        }
    }

    #[test]
    fn mz2000_banking_matches_flag_model(
        profile in profile(),
        writes in prop::collection::vec(
            (prop::sample::select(vec![0xE2u8, 0xE3, 0xE8]), any::<u8>()),
            0..48,
        ),
    ) {
        let (mut model, mut modes) = selected(ModelId::Mz2000, profile);
        let mut flags = IplFlags { boot: true, vram: "ram" };
        for (port, data) in writes {
            model.decode_access(Access::port_write(u16::from(port), data), &mut modes);
            flags.apply(port, data);

            let name = flags.mode_name();
            let expected = fixed_mode(&modes, &name);
            prop_assert!(expected.is_some(), "no mode {}", name);
            if let Some(expected) = expected {
                prop_assert_eq!(modes.active().pages(), expected.pages());
            }
            // IPL aliases the first 32K of RAM at 8000 wherever VRAM is not paged in.
            let entry = modes.classify(0x8123);
            if flags.boot && profile == MemoryProfile::Virtual {
                prop_assert_eq!(entry.kind, PageKind::VirtualRam);
                prop_assert_eq!(entry.backing(0x8123), 0x0123);
            } else if !flags.boot {
                prop_assert_eq!(entry.backing(0x8123), 0x8123);
            }
        }
    }

    /// Every block of a PCW window follows the bank written to its register.
    #[test]
    fn pcw_banking_matches_window_model(
        writes in prop::collection::vec((0xF0u8..=0xF3, any::<u8>()), 0..32),
    ) {
        let (mut model, mut modes) = selected(ModelId::Pcw, MemoryProfile::Virtual);
        let mut banks = [0u8, 1, 2, 3];
        for (port, data) in writes {
            model.decode_access(Access::port_write(u16::from(port), data), &mut modes);
            if data & 0x80 != 0 {
                banks[usize::from(port - 0xF0)] = data & 0x7F;
            }

            for address in (0..=0xFFFFu16).step_by(0x200) {
                let bank = banks[usize::from(address >> 14)];
                let within = u32::from(address & 0x3FFF);
                let kind = if bank == 3 && within >= 0x3800 {
                    PageKind::PhysicalHw
                } else if bank >= 8 {
                    PageKind::VirtualRam
                } else {
                    PageKind::PhysicalRam
                };
                let entry = modes.classify(address);
                prop_assert_eq!(entry.kind, kind, "at {:#06X}", address);
                prop_assert_eq!(entry.backing(address), u32::from(bank) * 0x4000 + within);
            }
        }
    }

    /// Inhibiting a range and restoring it puts every entry back.
    #[test]
    fn inhibit_then_restore_is_identity(
        id in model_id(),
        profile in profile(),
        start in 0u16..32,
        len in 1u16..8,
    ) {
        let (_, mut modes) = selected(id, profile);
        let before = *modes.active().pages();
        let first = start << 11;
        let last = (u32::from(start + len).min(32) * 0x800 - 1) as u16;
        modes.inhibit(first..=last);
        prop_assert_eq!(modes.classify(first).kind, PageKind::Inhibit);
        prop_assert_eq!(modes.classify(last).kind, PageKind::Inhibit);
        modes.restore(first..=last);
        prop_assert_eq!(*modes.active().pages(), before);
        prop_assert!(!modes.is_inhibited());
    }
}
