//! Page table: where every address and port is serviced.
//!
//! The 64K address space is split into 32 blocks of 2K. A [`MemoryMode`]
//! holds one [`PageEntry`] per block plus a shared port map, and is never
//! edited once the dispatcher can see it. A [`ModeSet`] holds all of a
//! model's precomputed modes and an index to the active one; switching is
//! a single index store.
//!
//! Modes that cannot be precomputed (inhibit, PCW bank registers) are built
//! by [`ModeSet::derive`] into one of two scratch slots, alternating, and
//! then made active.

use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

use log::{debug, error, warn};

pub const BLOCK_SHIFT: u32 = 11;
pub const BLOCK_SIZE: u32 = 1 << BLOCK_SHIFT;
pub const BLOCKS: usize = 0x10000 >> BLOCK_SHIFT;
pub const PORTS: usize = 0x10000;

/// Scratch slots for derived modes.
const SCRATCH_SLOTS: usize = 2;

/// Index of a mode within a [`ModeSet`].
pub type ModeId = usize;

/// The mode every model installs first and every fallback returns to.
pub const DEFAULT_MODE: ModeId = 0;

/// Block index of an address.
#[must_use]
pub const fn block_of(address: u16) -> usize {
    (address >> BLOCK_SHIFT) as usize
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageKind {
    /// Host RAM over the bus.
    PhysicalRam,
    /// Host ROM over the bus.
    PhysicalRom,
    /// Host video RAM over the bus.
    PhysicalVram,
    /// Memory-mapped host peripherals over the bus.
    PhysicalHw,
    /// In-process RAM.
    VirtualRam,
    /// In-process ROM. Guest writes are dropped.
    VirtualRom,
    /// Reads 0xFF, writes dropped.
    Inhibit,
}

impl PageKind {
    #[must_use]
    pub const fn is_physical(self) -> bool {
        matches!(
            self,
            PageKind::PhysicalRam | PageKind::PhysicalRom | PageKind::PhysicalVram | PageKind::PhysicalHw
        )
    }

    #[must_use]
    pub const fn is_virtual(self) -> bool {
        matches!(self, PageKind::VirtualRam | PageKind::VirtualRom)
    }
}

impl fmt::Display for PageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PageKind::PhysicalRam => "physical-ram",
            PageKind::PhysicalRom => "physical-rom",
            PageKind::PhysicalVram => "physical-vram",
            PageKind::PhysicalHw => "physical-hw",
            PageKind::VirtualRam => "virtual-ram",
            PageKind::VirtualRom => "virtual-rom",
            PageKind::Inhibit => "inhibit",
        })
    }
}

/// One block's mapping. `offset` is the backing-store offset of the block's
/// first byte; inhibited blocks have no backing and always carry 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageEntry {
    pub kind: PageKind,
    pub offset: u32,
}

impl PageEntry {
    #[must_use]
    pub const fn new(kind: PageKind, offset: u32) -> Self {
        let offset = match kind {
            PageKind::Inhibit => 0,
            _ => offset,
        };
        Self { kind, offset }
    }

    /// Backing-store offset of `address` within this block.
    #[must_use]
    pub const fn backing(&self, address: u16) -> u32 {
        self.offset + (address as u32 & (BLOCK_SIZE - 1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    Physical,
    Virtual,
}

/// Kind of each of the 65536 port addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMap {
    kinds: Vec<PortKind>,
}

impl PortMap {
    /// Every port on the host bus.
    #[must_use]
    pub fn physical() -> Self {
        Self {
            kinds: vec![PortKind::Physical; PORTS],
        }
    }

    #[must_use]
    pub fn kind(&self, port: u16) -> PortKind {
        self.kinds[port as usize]
    }

    pub fn set(&mut self, port: u16, kind: PortKind) {
        self.kinds[port as usize] = kind;
    }

    /// Set every port whose low byte is `low`, whatever is on A8-A15.
    pub fn set_low_byte(&mut self, low: u8, kind: PortKind) {
        for high in 0..=0xFFu16 {
            self.kinds[(high << 8 | u16::from(low)) as usize] = kind;
        }
    }
}

/// A complete mapping of memory and ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryMode {
    pub name: &'static str,
    pages: [PageEntry; BLOCKS],
    ports: Arc<PortMap>,
}

impl MemoryMode {
    /// Every block `kind`, with offsets equal to the block address.
    #[must_use]
    pub fn new(name: &'static str, kind: PageKind, ports: Arc<PortMap>) -> Self {
        let mut pages = [PageEntry::new(kind, 0); BLOCKS];
        for (block, entry) in pages.iter_mut().enumerate() {
            entry.offset = (block as u32) << BLOCK_SHIFT;
        }
        Self { name, pages, ports }
    }

    /// Host RAM everywhere, every port physical. Used with no model selected.
    #[must_use]
    pub fn passthrough() -> Self {
        Self::new("passthrough", PageKind::PhysicalRam, Arc::new(PortMap::physical()))
    }

    /// Map `range` (block aligned) to `kind`, backing offsets starting at
    /// `base` for the first block.
    #[must_use]
    pub fn map(mut self, range: RangeInclusive<u16>, kind: PageKind, base: u32) -> Self {
        self.set_range(range, kind, base);
        self
    }

    pub fn set_range(&mut self, range: RangeInclusive<u16>, kind: PageKind, base: u32) {
        let first = block_of(*range.start());
        for block in first..=block_of(*range.end()) {
            let offset = base + ((block - first) as u32) * BLOCK_SIZE;
            self.pages[block] = PageEntry::new(kind, offset);
        }
    }

    pub fn set_entry(&mut self, block: usize, kind: PageKind, offset: u32) {
        self.pages[block] = PageEntry::new(kind, offset);
    }

    #[must_use]
    pub fn entry(&self, address: u16) -> PageEntry {
        self.pages[block_of(address)]
    }

    #[must_use]
    pub fn pages(&self) -> &[PageEntry; BLOCKS] {
        &self.pages
    }

    #[must_use]
    pub fn port_kind(&self, port: u16) -> PortKind {
        self.ports.kind(port)
    }

    #[must_use]
    pub fn ports(&self) -> &Arc<PortMap> {
        &self.ports
    }
}

/// Entries displaced by [`ModeSet::inhibit`].
#[derive(Debug, Clone)]
struct Shadow {
    entries: Vec<(usize, PageEntry)>,
}

/// A model's modes and the active one.
#[derive(Debug, Clone)]
pub struct ModeSet {
    /// Fixed modes followed by the scratch slots.
    slots: Vec<MemoryMode>,
    fixed: usize,
    active: usize,
    next_scratch: usize,
    shadow: Option<Shadow>,
}

impl ModeSet {
    /// A set holding only the passthrough mode.
    #[must_use]
    pub fn passthrough() -> Self {
        let mut set = Self {
            slots: Vec::new(),
            fixed: 0,
            active: DEFAULT_MODE,
            next_scratch: 0,
            shadow: None,
        };
        set.install(MemoryMode::passthrough(), Vec::new());
        set
    }

    /// Replace all modes. `default` becomes [`DEFAULT_MODE`], `subs` follow
    /// in order, and the default is made active. If the slots cannot be
    /// allocated only the default is installed.
    pub fn install(&mut self, default: MemoryMode, subs: Vec<MemoryMode>) {
        let wanted = 1 + subs.len() + SCRATCH_SLOTS;
        let mut slots = Vec::new();
        if slots.try_reserve_exact(wanted).is_ok() {
            slots.push(default);
            slots.extend(subs);
        } else {
            error!(
                "cannot allocate {wanted} memory modes, running '{}' only",
                default.name
            );
            slots.push(default);
        }
        self.fixed = slots.len();
        for _ in 0..SCRATCH_SLOTS {
            slots.push(slots[DEFAULT_MODE].clone());
        }
        self.slots = slots;
        self.active = DEFAULT_MODE;
        self.next_scratch = 0;
        self.shadow = None;
    }

    /// Number of precomputed modes.
    #[must_use]
    pub fn fixed_modes(&self) -> usize {
        self.fixed
    }

    #[must_use]
    pub fn mode(&self, id: ModeId) -> Option<&MemoryMode> {
        self.slots[..self.fixed].get(id)
    }

    #[must_use]
    pub fn active(&self) -> &MemoryMode {
        &self.slots[self.active]
    }

    /// Active slot index. Values at or past [`fixed_modes`](Self::fixed_modes)
    /// are scratch slots.
    #[must_use]
    pub fn active_id(&self) -> ModeId {
        self.active
    }

    /// Make a precomputed mode active. Unknown ids select the default.
    pub fn switch_mode(&mut self, id: ModeId) {
        if id < self.fixed {
            if id != self.active {
                debug!("mode -> {}", self.slots[id].name);
            }
            self.active = id;
        } else {
            warn!("no memory mode {id}, using '{}'", self.slots[DEFAULT_MODE].name);
            self.active = DEFAULT_MODE;
        }
    }

    #[must_use]
    pub fn classify(&self, address: u16) -> PageEntry {
        self.slots[self.active].entry(address)
    }

    #[must_use]
    pub fn port_kind(&self, port: u16) -> PortKind {
        self.slots[self.active].port_kind(port)
    }

    /// Copy the active mode into a scratch slot, let `edit` change it, and
    /// make the result active.
    pub fn derive(&mut self, name: &'static str, edit: impl FnOnce(&mut MemoryMode)) {
        let target = self.fixed + self.next_scratch;
        self.next_scratch = (self.next_scratch + 1) % SCRATCH_SLOTS;
        let mut mode = self.slots[self.active].clone();
        mode.name = name;
        edit(&mut mode);
        self.slots[target] = mode;
        self.active = target;
        debug!("mode -> {name} (derived)");
    }

    /// Replace `range` with [`PageKind::Inhibit`], remembering what was
    /// there for [`restore`](Self::restore).
    pub fn inhibit(&mut self, range: RangeInclusive<u16>) {
        let blocks = block_of(*range.start())..=block_of(*range.end());
        let active = &self.slots[self.active];
        let entries = blocks.clone().map(|b| (b, active.pages[b])).collect();
        self.shadow = Some(Shadow { entries });
        self.derive("inhibit", |mode| {
            for block in blocks {
                mode.pages[block] = PageEntry::new(PageKind::Inhibit, 0);
            }
        });
    }

    /// Put back the entries [`inhibit`](Self::inhibit) displaced within
    /// `range`. Does nothing if nothing is inhibited.
    pub fn restore(&mut self, range: RangeInclusive<u16>) {
        let Some(shadow) = self.shadow.take() else {
            debug!("restore with nothing inhibited");
            return;
        };
        let blocks = block_of(*range.start())..=block_of(*range.end());
        self.derive("restored", |mode| {
            for (block, entry) in shadow.entries {
                if blocks.contains(&block) {
                    mode.pages[block] = entry;
                }
            }
        });
    }

    /// Forget any inhibited entries without restoring them.
    pub fn drop_shadow(&mut self) {
        self.shadow = None;
    }

    #[must_use]
    pub fn is_inhibited(&self) -> bool {
        self.shadow.is_some()
    }
}

impl Default for ModeSet {
    fn default() -> Self {
        Self::passthrough()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_modes() -> ModeSet {
        let ports = Arc::new(PortMap::physical());
        let rom_low = MemoryMode::new("ram", PageKind::VirtualRam, ports.clone()).map(
            0x0000..=0x0FFF,
            PageKind::VirtualRom,
            0,
        );
        let all_ram = MemoryMode::new("all-ram", PageKind::VirtualRam, ports);
        let mut set = ModeSet::passthrough();
        set.install(rom_low, vec![all_ram]);
        set
    }

    #[test]
    fn map_assigns_consecutive_offsets() {
        let mode = MemoryMode::passthrough().map(0x8000..=0xFFFF, PageKind::VirtualRam, 0);
        assert_eq!(mode.entry(0x8000), PageEntry::new(PageKind::VirtualRam, 0));
        assert_eq!(mode.entry(0x8800).offset, 0x0800);
        assert_eq!(mode.entry(0xFFFF).backing(0xFFFF), 0x7FFF);
        assert_eq!(mode.entry(0x7FFF).backing(0x7FFF), 0x7FFF);
    }

    #[test]
    fn switch_repoints_and_unknown_falls_back() {
        let mut set = two_modes();
        assert_eq!(set.classify(0x0000).kind, PageKind::VirtualRom);
        set.switch_mode(1);
        assert_eq!(set.classify(0x0000).kind, PageKind::VirtualRam);
        set.switch_mode(9);
        assert_eq!(set.active_id(), DEFAULT_MODE);
    }

    #[test]
    fn derive_alternates_scratch_slots() {
        let mut set = two_modes();
        set.derive("a", |m| m.set_entry(0, PageKind::Inhibit, 0));
        let first = set.active_id();
        set.derive("b", |m| m.set_entry(1, PageKind::Inhibit, 0));
        assert_ne!(set.active_id(), first);
        assert!(set.active_id() >= set.fixed_modes());
        // Derived from the previous derived mode.
        assert_eq!(set.classify(0x0000).kind, PageKind::Inhibit);
        assert_eq!(set.classify(0x0800).kind, PageKind::Inhibit);
        assert_eq!(set.active().name, "b");
    }

    #[test]
    fn inhibit_then_restore_is_verbatim() {
        let mut set = two_modes();
        let before = *set.active().pages();
        set.inhibit(0x0000..=0x17FF);
        assert!(set.is_inhibited());
        assert_eq!(set.classify(0x1000).kind, PageKind::Inhibit);
        assert_eq!(set.classify(0x1800).kind, PageKind::VirtualRam);
        set.restore(0x0000..=0x17FF);
        assert_eq!(*set.active().pages(), before);
        assert!(!set.is_inhibited());
    }

    #[test]
    fn low_byte_port_assignment_covers_every_page() {
        let mut ports = PortMap::physical();
        ports.set_low_byte(0xEA, PortKind::Virtual);
        assert_eq!(ports.kind(0x00EA), PortKind::Virtual);
        assert_eq!(ports.kind(0x7FEA), PortKind::Virtual);
        assert_eq!(ports.kind(0x00EB), PortKind::Physical);
    }
}
