//! In-process RAM and ROM behind the virtual page kinds.

use std::fmt;

use log::error;
use serde::{Deserialize, Serialize};

use crate::error::HostError;

/// 512K: eight 64K banks.
pub const DEFAULT_RAM_SIZE: usize = 0x8_0000;
pub const ROM_SIZE: usize = 0x1_0000;
/// RAM size used when the requested size cannot be allocated.
pub const MIN_RAM_SIZE: usize = 0x1_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Ram,
    Rom,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StoreKind::Ram => "RAM",
            StoreKind::Rom => "ROM",
        })
    }
}

/// Flat RAM and ROM arrays. Offsets wrap at the array size, which is
/// always a power of two.
pub struct VirtualStore {
    ram: Vec<u8>,
    rom: Vec<u8>,
}

/// RAM size actually allocated for a requested size.
#[must_use]
pub fn capacity_for(ram_size: usize) -> usize {
    ram_size.max(MIN_RAM_SIZE).next_power_of_two()
}

fn allocate(size: usize) -> Option<Vec<u8>> {
    let mut buffer = Vec::new();
    buffer.try_reserve_exact(size).ok()?;
    buffer.resize(size, 0);
    Some(buffer)
}

impl VirtualStore {
    /// `ram_size` is rounded up to a power of two.
    #[must_use]
    pub fn new(ram_size: usize) -> Self {
        let wanted = capacity_for(ram_size);
        let ram = allocate(wanted).unwrap_or_else(|| {
            error!("cannot allocate {wanted} bytes of virtual RAM, using {MIN_RAM_SIZE}");
            vec![0; MIN_RAM_SIZE]
        });
        Self {
            ram,
            rom: vec![0; ROM_SIZE],
        }
    }

    #[must_use]
    pub fn ram_len(&self) -> usize {
        self.ram.len()
    }

    #[must_use]
    pub fn read_ram(&self, offset: u32) -> u8 {
        self.ram[offset as usize & (self.ram.len() - 1)]
    }

    pub fn write_ram(&mut self, offset: u32, value: u8) {
        let mask = self.ram.len() - 1;
        self.ram[offset as usize & mask] = value;
    }

    #[must_use]
    pub fn read_rom(&self, offset: u32) -> u8 {
        self.rom[offset as usize & (ROM_SIZE - 1)]
    }

    /// Host-side ROM update (mirroring). Guest writes never reach ROM.
    pub fn write_rom(&mut self, offset: u32, value: u8) {
        self.rom[offset as usize & (ROM_SIZE - 1)] = value;
    }

    #[must_use]
    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    #[must_use]
    pub fn rom(&self) -> &[u8] {
        &self.rom
    }

    pub fn clear_ram(&mut self) {
        self.ram.fill(0);
    }

    /// Copy `bytes` verbatim to `offset`. The whole image must fit.
    pub fn load(&mut self, kind: StoreKind, offset: u32, bytes: &[u8]) -> Result<(), HostError> {
        let target = match kind {
            StoreKind::Ram => &mut self.ram,
            StoreKind::Rom => &mut self.rom,
        };
        let start = offset as usize;
        let capacity = target.len();
        match start.checked_add(bytes.len()) {
            Some(end) if end <= capacity => {
                target[start..end].copy_from_slice(bytes);
                Ok(())
            }
            _ => Err(HostError::ImageOutOfRange {
                kind,
                offset,
                len: bytes.len(),
                capacity,
            }),
        }
    }
}

impl Default for VirtualStore {
    fn default() -> Self {
        Self::new(DEFAULT_RAM_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_round_to_powers_of_two() {
        assert_eq!(VirtualStore::new(0x30000).ram_len(), 0x40000);
        assert_eq!(VirtualStore::new(0).ram_len(), MIN_RAM_SIZE);
        assert_eq!(VirtualStore::default().ram_len(), DEFAULT_RAM_SIZE);
    }

    #[test]
    fn offsets_wrap() {
        let mut store = VirtualStore::new(MIN_RAM_SIZE);
        store.write_ram(0x1_0005, 0xAB);
        assert_eq!(store.read_ram(0x0005), 0xAB);
        store.write_rom(0x1_FFFF, 0xCD);
        assert_eq!(store.read_rom(0xFFFF), 0xCD);
    }

    #[test]
    fn load_rejects_images_past_the_end() {
        let mut store = VirtualStore::default();
        assert!(store.load(StoreKind::Rom, 0xE800, &[0x55; 0x1800]).is_ok());
        assert_eq!(store.read_rom(0xFFFF), 0x55);
        let err = store
            .load(StoreKind::Rom, 0xF000, &[0; 0x1001])
            .unwrap_err();
        assert!(matches!(
            err,
            HostError::ImageOutOfRange {
                kind: StoreKind::Rom,
                capacity: ROM_SIZE,
                ..
            }
        ));
        assert!(store.load(StoreKind::Ram, u32::MAX, &[1]).is_err());
    }
}
