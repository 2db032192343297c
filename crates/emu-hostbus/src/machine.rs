//! The emulated machine: a Z80 running against the dispatch engine.

use cpld_link::Link;
use emu_core::{Cpu, Observable, Value};
use zilog_z80::Z80;

use crate::engine::Engine;
use crate::models::Hotkey;

/// Why a run slice ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceOutcome {
    Completed,
    /// The guest pressed a hotkey; control goes back to the host.
    Hotkey(Hotkey),
    /// The host pulled RESET.
    Reset,
}

pub struct Machine<L> {
    engine: Engine<L>,
    cpu: Z80,
}

impl<L: Link> Machine<L> {
    pub fn new(link: L) -> Self {
        Self {
            engine: Engine::new(link),
            cpu: Z80::new(),
        }
    }

    pub fn engine(&self) -> &Engine<L> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine<L> {
        &mut self.engine
    }

    #[must_use]
    pub fn cpu(&self) -> &Z80 {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Z80 {
        &mut self.cpu
    }

    /// Execute one instruction. Returns T-states.
    pub fn step(&mut self) -> u32 {
        self.cpu.step(&mut self.engine)
    }

    /// Run up to `instructions` instructions, sampling the host's
    /// interrupt lines before each.
    pub fn run_slice(&mut self, instructions: u32) -> SliceOutcome {
        for _ in 0..instructions {
            let lines = self.engine.lines();
            if lines.reset {
                self.reset();
                return SliceOutcome::Reset;
            }
            if lines.nmi {
                self.cpu.nmi();
            }
            if lines.int {
                self.cpu.interrupt();
            }
            self.cpu.step(&mut self.engine);
            if let Some(key) = self.engine.take_hotkey() {
                return SliceOutcome::Hotkey(key);
            }
        }
        SliceOutcome::Completed
    }

    /// Reset decoders and the CPU. PC returns to 0000.
    pub fn reset(&mut self) {
        self.engine.reset();
        self.cpu.reset();
    }
}

impl<L: Link> Observable for Machine<L> {
    fn query(&self, path: &str) -> Option<Value> {
        if let Some(rest) = path.strip_prefix("cpu.") {
            return self.cpu.query(rest);
        }
        if let Some(hex) = path.strip_prefix("page.") {
            let address = u16::from_str_radix(hex.trim_start_matches("0x"), 16).ok()?;
            let entry = self.engine.modes().classify(address);
            return Some(format!("{} {:#X}", entry.kind, entry.offset).into());
        }
        let engine = &self.engine;
        match path {
            "model" => Some(
                engine
                    .model_id()
                    .map_or_else(|| "none".to_string(), |id| id.to_string())
                    .into(),
            ),
            "profile" => Some(engine.profile().to_string().into()),
            "mode" => Some(engine.modes().active().name.into()),
            "mode.id" => Some((engine.modes().active_id() as u64).into()),
            "mode.inhibited" => Some(engine.modes().is_inhibited().into()),
            "governor.skip" => Some(engine.governor().skip().into()),
            "governor.multiplier" => Some(engine.governor().multiplier().into()),
            "governor.table" => Some(engine.governor().table().name.into()),
            "lookahead" => Some(engine.lookahead_enabled().into()),
            "lookahead.pending" => Some(
                engine
                    .pending()
                    .map_or_else(|| "none".to_string(), |r| format!("{r:?}"))
                    .into(),
            ),
            "transactions" => Some(engine.codec().transactions().into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "model",
            "profile",
            "mode",
            "mode.id",
            "mode.inhibited",
            "governor.skip",
            "governor.multiplier",
            "governor.table",
            "lookahead",
            "lookahead.pending",
            "transactions",
            "cpu.<reg>",
            "page.<address>",
        ]
    }
}
