//! Z80 bus dispatch between a real host computer and in-process memory.
//!
//! A Z80 core runs in this process while a CPLD drives the host machine's
//! bus. Every memory and I/O access the CPU makes is classified through
//! the active memory mode: virtual pages are served from local RAM/ROM,
//! physical pages become CPLD transactions. Per-model decoders watch
//! physical accesses to follow the host's own bank switching.
//!
//! # Layers
//!
//! - [`page`]: 2 KiB page tables, memory modes, port maps.
//! - [`store`]: the virtual RAM and ROM behind virtual pages.
//! - [`governor`]: paces virtual accesses to the host's clock.
//! - [`models`]: MZ-700, MZ-1500, MZ-2000 and PCW decoders.
//! - [`engine`]: the [`emu_core::Bus`] the CPU runs against.
//! - [`host`]: the dispatch thread and the control plane.
//! - [`rpc`]: JSON-RPC over stdio for the control plane.

pub mod config;
pub mod dump;
pub mod engine;
pub mod error;
pub mod governor;
pub mod host;
pub mod lookahead;
pub mod machine;
pub mod models;
pub mod page;
pub mod rpc;
pub mod run_state;
pub mod store;

pub use config::{ConfigError, ImageConfig, MachineConfig};
pub use dump::format_dump;
pub use engine::Engine;
pub use error::HostError;
pub use governor::{CountingWaiter, DelayTable, Governor, SpinWaiter, Waiter};
pub use host::Host;
pub use machine::{Machine, SliceOutcome};
pub use models::{HostEvent, Hotkey, MachineModel, MemoryProfile, ModelId};
pub use page::{MemoryMode, ModeSet, PageEntry, PageKind, PortKind};
pub use rpc::RpcServer;
pub use run_state::RunState;
pub use store::{StoreKind, VirtualStore};
