//! Federate lifecycle, time synchronization, and the per-step control
//! pipelines of the three participants.

pub mod dispatch;
/// Synthetic grid federate used by the demo binary and integration tests.
pub mod feeder;
/// Federate identity, state machine, and bus resource handles.
pub mod federate;
pub mod lindistflow;
pub mod opf;
pub mod publish;
pub mod recorder;
/// Per-step aggregation of subscription payloads into solver inputs.
pub mod snapshot;
pub mod timeloop;

pub use federate::{Federate, FederateError, FederateState, Publication, Subscription};
pub use timeloop::{GateMode, Horizon, PipelineGate, SyncClock};

use thiserror::Error;

use crate::config::ConfigError;
use crate::fed::dispatch::SolverError;
use crate::fed::snapshot::SnapshotError;
use crate::wire::WireError;

/// Fatal failure of a federate pipeline. There is no local recovery: the
/// error propagates out of the run loop and the process exits.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Federate(#[from] FederateError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("output error: {0}")]
    Io(#[from] std::io::Error),
}
