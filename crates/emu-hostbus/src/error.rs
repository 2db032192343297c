//! Control-plane errors. Bus accesses never fail.

use std::io;

use thiserror::Error;

use crate::models::ModelId;
use crate::run_state::RunState;
use crate::store::StoreKind;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("operation needs the machine stopped (currently {0})")]
    NotStopped(RunState),

    #[error("model {0} is not the selected model")]
    ModelNotSelected(ModelId),

    #[error("no model selected")]
    NoModel,

    #[error("{len}-byte {kind} image at {offset:#X} exceeds the {capacity}-byte store")]
    ImageOutOfRange {
        kind: StoreKind,
        offset: u32,
        len: usize,
        capacity: usize,
    },

    #[error("unknown model '{0}'")]
    UnknownModel(String),

    #[error("loopback sent {sent:#04X}, received {received:#04X}")]
    Loopback { sent: u8, received: u8 },

    #[error("cannot start dispatch thread: {0}")]
    Spawn(#[source] io::Error),
}
