//! Control plane: owns the dispatch thread and the machine.
//!
//! The dispatch thread runs the machine in short slices, taking the machine
//! lock per slice. Reconfiguration requires the loop parked, so the lock
//! is never contended on the hot path.

use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use cpld_link::{Codec, Link};
use emu_core::{Cpu, Observable, Value};
use log::{debug, info, warn};

use crate::error::HostError;
use crate::machine::{Machine, SliceOutcome};
use crate::models::{HostEvent, MemoryProfile, ModelId};
use crate::run_state::{LoopAction, RunControl, RunState};
use crate::store::StoreKind;

/// Instructions per run slice.
const SLICE: u32 = 1024;

pub struct Host<L: Link + 'static> {
    machine: Arc<Mutex<Machine<L>>>,
    control: Arc<RunControl>,
    thread: Option<JoinHandle<()>>,
}

fn lock<L>(machine: &Mutex<Machine<L>>) -> MutexGuard<'_, Machine<L>> {
    machine.lock().unwrap_or_else(PoisonError::into_inner)
}

fn dispatch_loop<L: Link>(machine: &Mutex<Machine<L>>, control: &RunControl) {
    loop {
        match control.acknowledge() {
            LoopAction::Exit => break,
            LoopAction::Park => control.park(),
            LoopAction::Run => {
                let outcome = lock(machine).run_slice(SLICE);
                match outcome {
                    SliceOutcome::Completed => {}
                    SliceOutcome::Hotkey(key) => {
                        info!("hotkey {key:?}, stopping");
                        control.set(RunState::Stopped);
                    }
                    SliceOutcome::Reset => info!("host reset"),
                }
                thread::yield_now();
            }
        }
    }
    debug!("dispatch loop exited");
}

impl<L: Link + 'static> Host<L> {
    /// Start the dispatch thread, parked.
    pub fn new(link: L) -> Result<Self, HostError> {
        let machine = Arc::new(Mutex::new(Machine::new(link)));
        let control = Arc::new(RunControl::new());
        let thread = {
            let machine = Arc::clone(&machine);
            let control = Arc::clone(&control);
            thread::Builder::new()
                .name("z80-dispatch".to_string())
                .spawn(move || dispatch_loop(&machine, &control))
                .map_err(HostError::Spawn)?
        };
        Ok(Self {
            machine,
            control,
            thread: Some(thread),
        })
    }

    fn require_stopped(&self) -> Result<(), HostError> {
        match self.control.state() {
            RunState::Stopped => Ok(()),
            state => Err(HostError::NotStopped(state)),
        }
    }

    // -----------------------------------------------------------------------
    // Run state
    // -----------------------------------------------------------------------

    pub fn start(&self) {
        self.control.request(RunState::Continuing);
    }

    /// Stop and wait until the loop has parked.
    pub fn stop(&self) {
        self.control.stop_and_wait();
    }

    pub fn pause(&self) {
        if !self.control.state().is_parked() {
            self.control.request(RunState::Pausing);
            self.control.wait_parked();
        }
    }

    pub fn resume(&self) {
        if self.control.state() == RunState::Paused {
            self.control.request(RunState::Continuing);
        }
    }

    #[must_use]
    pub fn run_state(&self) -> RunState {
        self.control.state()
    }

    // -----------------------------------------------------------------------
    // Configuration (machine stopped)
    // -----------------------------------------------------------------------

    pub fn select_model(&self, id: ModelId, profile: MemoryProfile) -> Result<(), HostError> {
        self.require_stopped()?;
        let mut machine = lock(&self.machine);
        machine.engine_mut().select_model(id.create(), profile);
        machine.cpu_mut().reset();
        Ok(())
    }

    pub fn deselect_model(&self, id: ModelId) -> Result<(), HostError> {
        self.require_stopped()?;
        let mut machine = lock(&self.machine);
        match machine.engine().model_id() {
            Some(current) if current == id => {
                machine.engine_mut().deselect_model();
                Ok(())
            }
            Some(_) => Err(HostError::ModelNotSelected(id)),
            None => Err(HostError::NoModel),
        }
    }

    pub fn load_image(
        &self,
        kind: StoreKind,
        offset: u32,
        bytes: &[u8],
    ) -> Result<(), HostError> {
        self.require_stopped()?;
        lock(&self.machine)
            .engine_mut()
            .load_image(kind, offset, bytes)
    }

    /// Stop, rebuild, resume.
    pub fn set_profile(&self, profile: MemoryProfile) {
        let prior = self.control.stop_and_wait();
        lock(&self.machine).engine_mut().set_profile(profile);
        self.control.restore(prior);
    }

    /// Stop, reset decoders and CPU, resume.
    pub fn reset_machine(&self) {
        let prior = self.control.stop_and_wait();
        lock(&self.machine).reset();
        info!("machine reset");
        self.control.restore(prior);
    }

    /// Returns the multiplier in effect.
    pub fn set_speed_multiplier(&self, multiplier: u8) -> u8 {
        lock(&self.machine)
            .engine_mut()
            .governor_mut()
            .set_multiplier(multiplier)
    }

    pub fn set_lookahead(&self, enabled: bool) {
        lock(&self.machine).engine_mut().set_lookahead(enabled);
    }

    pub fn set_pc(&self, pc: u16) -> Result<(), HostError> {
        let state = self.control.state();
        if !state.is_parked() {
            return Err(HostError::NotStopped(state));
        }
        lock(&self.machine).cpu_mut().set_pc(pc);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Host bus
    // -----------------------------------------------------------------------

    pub fn dump_range(&self, start: u16, length: usize) -> Vec<u8> {
        lock(&self.machine).engine_mut().dump_range(start, length)
    }

    pub fn sync_to_host(&self, range: RangeInclusive<u16>) -> usize {
        lock(&self.machine).engine_mut().sync_to_host(range)
    }

    pub fn send_raw(&self, word: u32) -> u8 {
        lock(&self.machine).engine_mut().send_raw(word)
    }

    pub fn loopback_test(&self, value: u8) -> Result<(), HostError> {
        lock(&self.machine).engine_mut().loopback_test(value)
    }

    /// Run `f` with exclusive use of the bus. The dispatch loop waits at
    /// its next slice until `f` returns.
    pub fn with_bus<R>(&self, f: impl FnOnce(&mut Codec<L>) -> R) -> R {
        f(lock(&self.machine).engine_mut().codec_mut())
    }

    pub fn with_machine<R>(&self, f: impl FnOnce(&mut Machine<L>) -> R) -> R {
        f(&mut lock(&self.machine))
    }

    pub fn take_events(&self) -> Vec<HostEvent> {
        lock(&self.machine).engine_mut().take_events()
    }

    /// Query machine state; `run_state` is answered here.
    pub fn query(&self, path: &str) -> Option<Value> {
        if path == "run_state" {
            return Some(self.run_state().to_string().into());
        }
        lock(&self.machine).query(path)
    }

    /// Stop the dispatch thread and wait for it.
    pub fn shutdown(&mut self) {
        self.control.shutdown();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("dispatch thread panicked");
            }
        }
    }
}

impl<L: Link + 'static> Drop for Host<L> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
