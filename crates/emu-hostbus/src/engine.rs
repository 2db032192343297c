//! Bus dispatch: route every CPU cycle to local memory or the host.
//!
//! Each access is classified through the active memory mode. Virtual
//! pages are served from the [`VirtualStore`] with no bus traffic; physical
//! pages become transactions on the [`Codec`]. After a physical access
//! completes the selected model decodes it, which may switch the mode for
//! the next access.

use std::collections::VecDeque;
use std::ops::RangeInclusive;

use cpld_link::{Codec, ControlLines, Link};
use emu_core::{Bus, RegisterView};
use log::{debug, info, trace, warn};
use zilog_z80::io_group;

use crate::error::HostError;
use crate::governor::{Governor, MZ_DELAYS};
use crate::lookahead::{self, PortRequest, Planner};
use crate::models::{
    Access, HostEvent, Hotkey, MachineModel, MemoryProfile, ModelId, RefreshPolicy, SyncStep,
};
use crate::page::{ModeSet, PageEntry, PageKind, PortKind};
use crate::store::{self, StoreKind, VirtualStore};

/// Events kept for the control plane before the oldest are dropped.
const EVENT_QUEUE: usize = 64;

pub struct Engine<L> {
    codec: Codec<L>,
    modes: ModeSet,
    store: VirtualStore,
    governor: Governor,
    model: Option<Box<dyn MachineModel>>,
    profile: MemoryProfile,
    refresh: RefreshPolicy,
    /// Serve physical RAM from the store, writing through.
    caches: bool,
    lookahead: bool,
    pending: Option<PortRequest>,
    events: VecDeque<HostEvent>,
    hotkey: Option<Hotkey>,
}

impl<L: Link> Engine<L> {
    /// An engine with no model: every access goes to the host.
    pub fn new(link: L) -> Self {
        Self {
            codec: Codec::new(link),
            modes: ModeSet::passthrough(),
            store: VirtualStore::default(),
            governor: Governor::new(&MZ_DELAYS),
            model: None,
            profile: MemoryProfile::default(),
            refresh: RefreshPolicy::Host,
            caches: false,
            lookahead: true,
            pending: None,
            events: VecDeque::new(),
            hotkey: None,
        }
    }

    // -----------------------------------------------------------------------
    // Control
    // -----------------------------------------------------------------------

    /// Install `model` and mirror host memory into the store.
    pub fn select_model(&mut self, mut model: Box<dyn MachineModel>, profile: MemoryProfile) {
        self.settle();
        if self.store.ram_len() != store::capacity_for(model.ram_size()) {
            self.store = VirtualStore::new(model.ram_size());
        }
        model.reset();
        model.setup_memory(profile, &mut self.modes);
        self.governor.set_table(model.delay_table());
        self.governor.cancel();
        self.refresh = model.refresh_policy(profile);
        self.caches = model.caches_physical_ram();
        self.profile = profile;
        match self.refresh {
            RefreshPolicy::Auto => self.codec.set_auto_refresh(true),
            RefreshPolicy::Manual => self.codec.set_auto_refresh(false),
            RefreshPolicy::Host => {}
        }
        for step in model.host_sync(profile) {
            self.sync_step(step);
        }
        self.codec.collect();
        info!(
            "selected {} ({profile} memory, {} modes)",
            model.id(),
            self.modes.fixed_modes()
        );
        self.model = Some(model);
    }

    /// Remove the model and return to passthrough.
    pub fn deselect_model(&mut self) -> Option<ModelId> {
        self.settle();
        let id = self.model.take().map(|m| m.id());
        self.modes = ModeSet::passthrough();
        self.refresh = RefreshPolicy::Host;
        self.caches = false;
        self.governor.set_table(&MZ_DELAYS);
        self.governor.cancel();
        if let Some(id) = id {
            info!("deselected {id}");
        }
        id
    }

    /// Clear decoder state and reinstall the default mode.
    pub fn reset(&mut self) {
        self.settle();
        self.governor.cancel();
        self.hotkey = None;
        match self.model.as_mut() {
            Some(model) => {
                model.reset();
                model.setup_memory(self.profile, &mut self.modes);
                info!("reset {}", model.id());
            }
            None => self.modes = ModeSet::passthrough(),
        }
    }

    /// Switch profile, reselecting the current model under it.
    pub fn set_profile(&mut self, profile: MemoryProfile) {
        match self.model.take() {
            Some(model) => self.select_model(model, profile),
            None => self.profile = profile,
        }
    }

    pub fn load_image(
        &mut self,
        kind: StoreKind,
        offset: u32,
        bytes: &[u8],
    ) -> Result<(), HostError> {
        self.store.load(kind, offset, bytes)?;
        info!("loaded {} bytes into {kind} at {offset:#X}", bytes.len());
        Ok(())
    }

    /// Read host memory directly, whatever the page table says.
    pub fn dump_range(&mut self, start: u16, length: usize) -> Vec<u8> {
        self.settle();
        (0..length.min(0x1_0000))
            .map(|i| self.codec.read_byte(start.wrapping_add(i as u16)))
            .collect()
    }

    /// Copy virtual RAM in `range` to the same addresses on the host.
    /// Returns the number of bytes written.
    pub fn sync_to_host(&mut self, range: RangeInclusive<u16>) -> usize {
        self.settle();
        let mut written = 0;
        for address in range {
            let entry = self.modes.classify(address);
            if entry.kind == PageKind::VirtualRam {
                let value = self.store.read_ram(entry.backing(address));
                self.codec.write_byte(address, value);
                written += 1;
            }
        }
        self.codec.collect();
        debug!("synced {written} bytes to the host");
        written
    }

    /// Send a raw 32-bit command word and return the response byte.
    pub fn send_raw(&mut self, word: u32) -> u8 {
        self.settle();
        self.codec.send32((word >> 16) as u16, word as u16)
    }

    pub fn loopback_test(&mut self, value: u8) -> Result<(), HostError> {
        self.settle();
        let received = self.codec.loopback(value);
        if received == value {
            Ok(())
        } else {
            Err(HostError::Loopback {
                sent: value,
                received,
            })
        }
    }

    pub fn take_events(&mut self) -> Vec<HostEvent> {
        self.events.drain(..).collect()
    }

    pub fn take_hotkey(&mut self) -> Option<Hotkey> {
        self.hotkey.take()
    }

    pub fn set_lookahead(&mut self, enabled: bool) {
        self.lookahead = enabled;
    }

    pub fn lines(&mut self) -> ControlLines {
        self.codec.lines()
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn model_id(&self) -> Option<ModelId> {
        self.model.as_ref().map(|m| m.id())
    }

    #[must_use]
    pub fn profile(&self) -> MemoryProfile {
        self.profile
    }

    #[must_use]
    pub fn refresh_policy(&self) -> RefreshPolicy {
        self.refresh
    }

    #[must_use]
    pub fn lookahead_enabled(&self) -> bool {
        self.lookahead
    }

    #[must_use]
    pub fn pending(&self) -> Option<PortRequest> {
        self.pending
    }

    #[must_use]
    pub fn modes(&self) -> &ModeSet {
        &self.modes
    }

    pub fn modes_mut(&mut self) -> &mut ModeSet {
        &mut self.modes
    }

    #[must_use]
    pub fn store(&self) -> &VirtualStore {
        &self.store
    }

    #[must_use]
    pub fn governor(&self) -> &Governor {
        &self.governor
    }

    pub fn governor_mut(&mut self) -> &mut Governor {
        &mut self.governor
    }

    #[must_use]
    pub fn codec(&self) -> &Codec<L> {
        &self.codec
    }

    pub fn codec_mut(&mut self) -> &mut Codec<L> {
        &mut self.codec
    }

    // -----------------------------------------------------------------------
    // Dispatch internals
    // -----------------------------------------------------------------------

    fn is_cached(&self, kind: PageKind) -> bool {
        kind.is_virtual() || (kind == PageKind::PhysicalRam && self.caches)
    }

    fn load(&self, entry: PageEntry, address: u16) -> u8 {
        match entry.kind {
            PageKind::VirtualRom => self.store.read_rom(entry.backing(address)),
            PageKind::Inhibit => 0xFF,
            _ => self.store.read_ram(entry.backing(address)),
        }
    }

    /// Finish anything in flight before a transaction the lookahead did
    /// not plan.
    fn settle(&mut self) {
        if let Some(stale) = self.pending.take() {
            debug!("lookahead {stale:?} superseded");
        }
        self.codec.collect();
    }

    fn decode(&mut self, access: Access) {
        let Some(model) = self.model.as_mut() else {
            return;
        };
        let decoded = model.decode_access(access, &mut self.modes);
        if decoded.cancel_skip {
            self.governor.cancel();
        }
        if let Some(event) = decoded.event {
            self.raise(event);
        }
    }

    fn raise(&mut self, event: HostEvent) {
        debug!("event {event:?}");
        if let HostEvent::Hotkey(key) = event {
            self.hotkey = Some(key);
        }
        if self.events.len() == EVENT_QUEUE {
            warn!("event queue full, dropping {:?}", self.events.front());
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Run a port request, collecting it if the lookahead already issued it.
    fn complete(&mut self, request: PortRequest) -> u8 {
        match self.pending.take() {
            Some(pending) if pending == request => {}
            Some(stale) => {
                debug!("lookahead {stale:?} does not match {request:?}");
                self.codec.collect();
                self.codec.issue(request.command());
            }
            None => self.codec.issue(request.command()),
        }
        self.governor.credit();
        let data = self.codec.collect();
        match request {
            PortRequest::Read { port } => self.decode(Access::port_read(port, data)),
            PortRequest::Write { port, value } => self.decode(Access::port_write(port, value)),
            PortRequest::ReadToMemory { port, dest } => {
                self.decode(Access::port_read(port, data));
                self.decode(Access::memory_write(dest, data));
            }
        }
        data
    }

    /// M1 cycle. `regs` is present only when `address` starts an
    /// instruction; prefixed opcode bytes are never looked ahead.
    fn fetch_m1(&mut self, address: u16, regs: Option<&RegisterView>) -> u8 {
        let entry = self.modes.classify(address);
        match entry.kind {
            PageKind::Inhibit => 0xFF,
            kind if self.is_cached(kind) => {
                let opcode = self.load(entry, address);
                let issued =
                    regs.is_some_and(|regs| self.look_ahead(address, opcode, regs));
                self.governor.pace(kind == PageKind::VirtualRom, issued);
                opcode
            }
            _ => {
                self.settle();
                let opcode = self.codec.fetch_opcode(address);
                self.governor.credit();
                opcode
            }
        }
    }

    /// Try to issue the port transaction of the instruction at `address`.
    fn look_ahead(&mut self, address: u16, opcode: u8, regs: &RegisterView) -> bool {
        if !self.lookahead || self.pending.is_some() || !io_group::is_candidate(opcode) {
            return false;
        }
        let Some(next) = self.peek(address.wrapping_add(1)) else {
            return false;
        };
        let Some(access) = io_group::decode(opcode, next, regs) else {
            return false;
        };
        let Some(request) = lookahead::plan(access, &*self) else {
            return false;
        };
        trace!("lookahead {request:?} at {address:#06X}");
        self.codec.issue(request.command());
        self.pending = Some(request);
        true
    }

    fn sync_step(&mut self, step: SyncStep) {
        match step {
            SyncStep::MirrorRam { host, offset } => {
                let start = *host.start();
                for address in host {
                    let value = self.codec.read_byte(address);
                    self.store.write_ram(offset + u32::from(address - start), value);
                }
            }
            SyncStep::MirrorRom { host, offset } => {
                let start = *host.start();
                for address in host {
                    let value = self.codec.read_byte(address);
                    self.store.write_rom(offset + u32::from(address - start), value);
                }
            }
            SyncStep::ClearRam => self.store.clear_ram(),
            SyncStep::WritePort { port, value } => self.codec.write_port(port, value),
        }
    }
}

impl<L: Link> Planner for Engine<L> {
    fn is_physical_port(&self, port: u16) -> bool {
        self.modes.port_kind(port) == PortKind::Physical
    }

    fn peek(&self, address: u16) -> Option<u8> {
        let entry = self.modes.classify(address);
        self.is_cached(entry.kind).then(|| self.load(entry, address))
    }

    fn input_request(&self, port: u16, dest: u16) -> PortRequest {
        let kind = self.modes.classify(dest).kind;
        if kind == PageKind::PhysicalRam && !self.caches {
            PortRequest::ReadToMemory { port, dest }
        } else {
            PortRequest::Read { port }
        }
    }
}

impl<L: Link> Bus for Engine<L> {
    fn fetch_opcode(&mut self, address: u16, regs: &RegisterView) -> u8 {
        self.fetch_m1(address, Some(regs))
    }

    fn fetch_prefixed(&mut self, address: u16) -> u8 {
        self.fetch_m1(address, None)
    }

    fn fetch(&mut self, address: u16) -> u8 {
        let entry = self.modes.classify(address);
        if entry.kind == PageKind::Inhibit || self.is_cached(entry.kind) {
            return self.load(entry, address);
        }
        self.settle();
        let value = self.codec.read_byte(address);
        self.governor.credit();
        value
    }

    fn read(&mut self, address: u16) -> u8 {
        let entry = self.modes.classify(address);
        if entry.kind == PageKind::Inhibit || self.is_cached(entry.kind) {
            return self.load(entry, address);
        }
        self.settle();
        let value = self.codec.read_byte(address);
        self.governor.credit();
        self.decode(Access::memory_read(address, value));
        value
    }

    fn write(&mut self, address: u16, value: u8) {
        let entry = self.modes.classify(address);
        match entry.kind {
            PageKind::VirtualRam => self.store.write_ram(entry.backing(address), value),
            PageKind::VirtualRom | PageKind::Inhibit => {}
            kind => {
                self.settle();
                self.codec.write_byte(address, value);
                self.governor.credit();
                if kind == PageKind::PhysicalRam {
                    self.store.write_ram(entry.backing(address), value);
                }
                self.decode(Access::memory_write(address, value));
            }
        }
    }

    fn io_read(&mut self, port: u16) -> u8 {
        match self.modes.port_kind(port) {
            PortKind::Physical => self.complete(PortRequest::Read { port }),
            PortKind::Virtual => self.model.as_mut().map_or(0xFF, |m| m.read(port)),
        }
    }

    fn io_write(&mut self, port: u16, value: u8) {
        match self.modes.port_kind(port) {
            PortKind::Physical => {
                self.complete(PortRequest::Write { port, value });
            }
            PortKind::Virtual => {
                if let Some(event) = self.model.as_mut().and_then(|m| m.write(port, value)) {
                    self.raise(event);
                }
            }
        }
    }

    fn block_in(&mut self, port: u16, dest: u16) -> u8 {
        if self.modes.port_kind(port) == PortKind::Physical {
            if let request @ PortRequest::ReadToMemory { .. } = self.input_request(port, dest) {
                let value = self.complete(request);
                let entry = self.modes.classify(dest);
                self.store.write_ram(entry.backing(dest), value);
                return value;
            }
        }
        let value = self.io_read(port);
        self.write(dest, value);
        value
    }

    fn refresh(&mut self, address: u16) {
        if self.refresh == RefreshPolicy::Manual
            && self.modes.classify(address).kind.is_physical()
        {
            self.settle();
            self.codec.refresh();
        }
    }

    fn halt(&mut self) {
        self.settle();
        self.codec.halt_notify();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governor::CountingWaiter;
    use cpld_link::{Command, SimLink};

    fn engine() -> Engine<SimLink> {
        let mut engine = Engine::new(SimLink::new());
        engine
            .governor_mut()
            .set_waiter(Box::new(CountingWaiter::new()));
        engine
    }

    fn regs() -> RegisterView {
        RegisterView::default()
    }

    #[test]
    fn passthrough_sends_everything_to_the_host() {
        let mut engine = engine();
        engine.codec_mut().link_mut().memory_mut()[0x1234] = 0x3E;
        assert_eq!(engine.fetch_opcode(0x1234, &regs()), 0x3E);
        engine.write(0x8000, 0x55);
        assert_eq!(engine.read(0x8000), 0x55);
        assert_eq!(engine.codec().transactions(), 3);
    }

    #[test]
    fn inhibited_pages_read_ff_and_drop_writes() {
        let mut engine = engine();
        engine.modes_mut().inhibit(0xD000..=0xFFFF);
        engine.write(0xD000, 0x12);
        assert_eq!(engine.read(0xD000), 0xFF);
        assert_eq!(engine.fetch_opcode(0xF000, &regs()), 0xFF);
        assert_eq!(engine.codec().transactions(), 0);
    }

    #[test]
    fn lookahead_issues_at_fetch_and_collects_at_execute() {
        let mut engine = engine();
        engine
            .modes_mut()
            .derive("low-virtual", |m| m.set_range(0x0000..=0x7FFF, PageKind::VirtualRam, 0));
        engine
            .load_image(StoreKind::Ram, 0x0100, &[0xDB, 0xE8])
            .unwrap();
        engine.codec_mut().link_mut().set_port_input(0x00E8, 0x42);

        engine.fetch_opcode(0x0100, &regs());
        assert_eq!(engine.pending(), Some(PortRequest::Read { port: 0x00E8 }));
        assert_eq!(engine.codec().transactions(), 1);

        assert_eq!(engine.io_read(0x00E8), 0x42);
        assert_eq!(engine.pending(), None);
        assert_eq!(engine.codec().transactions(), 1);
        assert_eq!(engine.governor().skip(), crate::governor::IO_SKIP_CREDIT);
    }

    #[test]
    fn mismatched_pending_request_is_replaced() {
        let mut engine = engine();
        engine
            .modes_mut()
            .derive("low-virtual", |m| m.set_range(0x0000..=0x7FFF, PageKind::VirtualRam, 0));
        engine
            .load_image(StoreKind::Ram, 0, &[0xD3, 0x10])
            .unwrap();
        engine.fetch_opcode(0x0000, &regs());
        engine.io_write(0x0011, 0x00);
        assert_eq!(
            engine.codec().link().commands(),
            &[
                Command::WritePort {
                    port: 0x0010,
                    data: 0
                },
                Command::WritePort {
                    port: 0x0011,
                    data: 0
                },
            ]
        );
    }

    #[test]
    fn prefixed_opcode_bytes_are_not_looked_ahead() {
        use emu_core::Cpu;
        use zilog_z80::Z80;

        let mut engine = engine();
        engine
            .modes_mut()
            .derive("low-virtual", |m| m.set_range(0x0000..=0x7FFF, PageKind::VirtualRam, 0));
        // SET 2,E ; SET 3,E ; SET 5,L ; IX+ forms of LD A,n and IN A,(n)
        engine
            .load_image(
                StoreKind::Ram,
                0,
                &[0xCB, 0xD3, 0xCB, 0xDB, 0xCB, 0xED, 0xDD, 0x3E, 0xD3],
            )
            .unwrap();
        let mut cpu = Z80::new();
        for _ in 0..4 {
            cpu.step(&mut engine);
            assert_eq!(engine.pending(), None);
        }
        assert!(engine.codec().link().commands().is_empty());
        assert_eq!(cpu.registers().e, 0x0C);
        assert_eq!(cpu.registers().l, 0x20);
        assert_eq!(cpu.registers().a, 0xD3);
    }

    #[test]
    fn block_in_to_host_ram_uses_read_to_memory() {
        let mut engine = engine();
        engine.codec_mut().link_mut().set_port_input(0x02FE, 0x99);
        assert_eq!(engine.block_in(0x02FE, 0x9000), 0x99);
        assert_eq!(engine.codec().link().memory()[0x9000], 0x99);
        assert_eq!(
            engine.codec().link().commands(),
            &[Command::ReadPortToMemory {
                port: 0x02FE,
                dest: 0x9000
            }]
        );
    }

    #[test]
    fn sync_writes_only_virtual_ram() {
        let mut engine = engine();
        engine
            .modes_mut()
            .derive("split", |m| m.set_range(0x8000..=0x87FF, PageKind::VirtualRam, 0));
        engine.load_image(StoreKind::Ram, 0, &[7; 0x800]).unwrap();
        assert_eq!(engine.sync_to_host(0x7FFF..=0x8001), 2);
        assert_eq!(engine.codec().link().memory()[0x8001], 7);
        assert_eq!(engine.codec().link().memory()[0x7FFF], 0);
    }

    #[test]
    fn raw_and_loopback_commands() {
        let mut engine = engine();
        assert!(engine.loopback_test(0xA5).is_ok());
        assert_eq!(engine.send_raw(0x1234_5618), 0xA5);
    }
}
