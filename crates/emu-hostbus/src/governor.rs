//! Opcode-fetch pacing for code running from in-process memory.
//!
//! A virtual fetch costs far less than a real bus cycle, so each one waits
//! a tuned number of host cycles to keep the guest near its original speed.
//! A physical transaction costs far more, so afterwards the next
//! [`IO_SKIP_CREDIT`] fetches skip the wait to keep the average right.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{info, warn};

/// Fetches that skip the delay after a physical transaction.
pub const IO_SKIP_CREDIT: u32 = 8;

/// Valid speed multipliers, slowest first. Index = table column.
pub const MULTIPLIERS: [u8; 8] = [1, 2, 4, 8, 16, 32, 64, 128];

/// Per-multiplier delays in host spin cycles.
#[derive(Debug)]
pub struct DelayTable {
    pub name: &'static str,
    pub rom: [u32; 8],
    pub ram: [u32; 8],
}

/// Sharp MZ series, 3.54 MHz.
pub static MZ_DELAYS: DelayTable = DelayTable {
    name: "mz-3.54mhz",
    rom: [253, 126, 63, 32, 16, 8, 4, 1],
    ram: [253, 126, 63, 32, 16, 8, 4, 1],
};

/// Amstrad PCW, 4 MHz.
pub static PCW_DELAYS: DelayTable = DelayTable {
    name: "pcw-4mhz",
    rom: [243, 122, 61, 30, 15, 7, 3, 1],
    ram: [218, 112, 56, 28, 14, 7, 3, 1],
};

/// Busy-wait primitive.
pub trait Waiter: Send {
    fn wait(&mut self, cycles: u32);
}

pub struct SpinWaiter;

impl Waiter for SpinWaiter {
    fn wait(&mut self, cycles: u32) {
        for _ in 0..cycles {
            std::hint::spin_loop();
        }
    }
}

/// Records waits instead of spinning. Clones share the same counters.
#[derive(Clone, Default)]
pub struct CountingWaiter {
    calls: Arc<AtomicU64>,
    cycles: Arc<AtomicU64>,
}

impl CountingWaiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }
}

impl Waiter for CountingWaiter {
    fn wait(&mut self, cycles: u32) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.cycles.fetch_add(u64::from(cycles), Ordering::Relaxed);
    }
}

pub struct Governor {
    table: &'static DelayTable,
    column: usize,
    skip: u32,
    waiter: Box<dyn Waiter>,
}

impl Governor {
    #[must_use]
    pub fn new(table: &'static DelayTable) -> Self {
        Self::with_waiter(table, Box::new(SpinWaiter))
    }

    #[must_use]
    pub fn with_waiter(table: &'static DelayTable, waiter: Box<dyn Waiter>) -> Self {
        Self {
            table,
            column: 0,
            skip: 0,
            waiter,
        }
    }

    pub fn set_waiter(&mut self, waiter: Box<dyn Waiter>) {
        self.waiter = waiter;
    }

    /// Switch delay tables, keeping the multiplier.
    pub fn set_table(&mut self, table: &'static DelayTable) {
        self.table = table;
    }

    #[must_use]
    pub fn table(&self) -> &'static DelayTable {
        self.table
    }

    /// Select a speed multiplier. Anything not in [`MULTIPLIERS`] runs at 1x.
    /// Returns the multiplier in effect.
    pub fn set_multiplier(&mut self, multiplier: u8) -> u8 {
        self.column = if let Some(column) = MULTIPLIERS.iter().position(|&m| m == multiplier) {
            info!("speed {multiplier}x ({})", self.table.name);
            column
        } else {
            warn!("invalid speed multiplier {multiplier}, using 1x");
            0
        };
        MULTIPLIERS[self.column]
    }

    #[must_use]
    pub fn multiplier(&self) -> u8 {
        MULTIPLIERS[self.column]
    }

    /// `(rom, ram)` delay for the current multiplier.
    #[must_use]
    pub fn delays(&self) -> (u32, u32) {
        (self.table.rom[self.column], self.table.ram[self.column])
    }

    #[must_use]
    pub fn skip(&self) -> u32 {
        self.skip
    }

    /// Pace one virtual opcode fetch.
    pub fn pace(&mut self, rom: bool, lookahead_issued: bool) {
        if self.skip > 0 {
            self.skip -= 1;
        } else if lookahead_issued {
            self.skip = IO_SKIP_CREDIT;
        } else {
            let (delay_rom, delay_ram) = self.delays();
            self.waiter.wait(if rom { delay_rom } else { delay_ram });
        }
    }

    /// A physical transaction just completed.
    pub fn credit(&mut self) {
        self.skip = IO_SKIP_CREDIT;
    }

    /// Drop any remaining credit.
    pub fn cancel(&mut self) {
        self.skip = 0;
    }
}
