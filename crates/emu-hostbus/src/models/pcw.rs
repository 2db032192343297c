//! Amstrad PCW.
//!
//! Four 16K windows, each pointed at any 16K block by ports F0-F3. The
//! first 128K is the host's own RAM (cached here, written through); higher
//! blocks are expansion RAM held in process. With 128 possible blocks per
//! window the mapping is derived on each bank write rather than
//! precomputed.

use std::sync::Arc;

use log::{debug, info};

use super::{
    Access, AccessKind, Decoded, MachineModel, MemoryProfile, ModelId, RefreshPolicy, SyncStep,
};
use crate::governor::{DelayTable, PCW_DELAYS};
use crate::page::{BLOCK_SIZE, MemoryMode, ModeSet, PageKind, PortMap, block_of};

const BANK_SIZE: u32 = 0x4000;
const BLOCKS_PER_WINDOW: usize = (BANK_SIZE / BLOCK_SIZE) as usize;
/// Blocks below this are host RAM.
const HOST_BANKS: u8 = 8;
/// The keyboard answers in the top 16 bytes of host bank 3, so the last
/// block of whichever window maps that bank stays on the host.
const KEYBOARD_BANK: u8 = 3;
const RAM_SIZE: usize = 0x20_0000;

pub struct Pcw {
    banks: [u8; 4],
    lock: u8,
    roller: u8,
}

impl Pcw {
    #[must_use]
    pub fn new() -> Self {
        Self {
            banks: [0, 1, 2, 3],
            lock: 0,
            roller: 0,
        }
    }

    #[must_use]
    pub fn banks(&self) -> [u8; 4] {
        self.banks
    }

    #[must_use]
    pub fn lock(&self) -> u8 {
        self.lock
    }

    #[must_use]
    pub fn roller(&self) -> u8 {
        self.roller
    }

    fn apply_window(mode: &mut MemoryMode, window: usize, bank: u8) {
        let kind = if bank >= HOST_BANKS {
            PageKind::VirtualRam
        } else {
            PageKind::PhysicalRam
        };
        for i in 0..BLOCKS_PER_WINDOW {
            let block = window * BLOCKS_PER_WINDOW + i;
            let kind = if bank == KEYBOARD_BANK && i == BLOCKS_PER_WINDOW - 1 {
                PageKind::PhysicalHw
            } else {
                kind
            };
            mode.set_entry(block, kind, u32::from(bank) * BANK_SIZE + i as u32 * BLOCK_SIZE);
        }
    }

    fn boot_mode() -> MemoryMode {
        let mut mode =
            MemoryMode::new("pcw", PageKind::PhysicalRam, Arc::new(PortMap::physical()));
        let keyboard = mode.entry(0xF800);
        mode.set_entry(block_of(0xF800), PageKind::PhysicalHw, keyboard.offset);
        mode
    }
}

impl Default for Pcw {
    fn default() -> Self {
        Self::new()
    }
}

impl MachineModel for Pcw {
    fn id(&self) -> ModelId {
        ModelId::Pcw
    }

    fn setup_memory(&mut self, _profile: MemoryProfile, modes: &mut ModeSet) {
        modes.install(Self::boot_mode(), Vec::new());
    }

    fn decode_access(&mut self, access: Access, modes: &mut ModeSet) -> Decoded {
        if access.kind != AccessKind::PortWrite {
            return Decoded::NONE;
        }
        let data = access.data;
        match access.low() {
            port @ 0xF0..=0xF3 => {
                let window = usize::from(port - 0xF0);
                if data & 0x80 == 0 {
                    debug!("pcw: F{window} split read/write bank {data:#04X} ignored");
                    return Decoded::NONE;
                }
                let bank = data & 0x7F;
                self.banks[window] = bank;
                debug!("pcw: window {window} -> bank {bank}");
                modes.derive("pcw-banked", |mode| Self::apply_window(mode, window, bank));
            }
            0xF4 => {
                self.lock = data;
                debug!("pcw: lock {data:#04X}");
            }
            0xF5 => {
                self.roller = data;
                debug!("pcw: roller RAM at {:#06X}", u16::from(data) << 9);
            }
            0xF6..=0xF8 => debug!("pcw: port {:#04X} <- {data:#04X}", access.low()),
            _ => {}
        }
        Decoded::NONE
    }

    fn host_sync(&self, _profile: MemoryProfile) -> Vec<SyncStep> {
        vec![
            SyncStep::ClearRam,
            SyncStep::WritePort {
                port: 0x00F8,
                value: 0x00,
            },
        ]
    }

    fn refresh_policy(&self, _profile: MemoryProfile) -> RefreshPolicy {
        RefreshPolicy::Host
    }

    fn delay_table(&self) -> &'static DelayTable {
        &PCW_DELAYS
    }

    fn caches_physical_ram(&self) -> bool {
        true
    }

    fn ram_size(&self) -> usize {
        RAM_SIZE
    }

    fn reset(&mut self) {
        info!("pcw: banks reset");
        *self = Self::new();
    }
}
