use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::conduit::Backend;

/// Startup-time errors. Fatal: nothing is scheduled when one of these is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("grid dimension {name} must be at least 1, got {value}")]
    InvalidDimension { name: &'static str, value: usize },

    #[error("window for {class} ducts must fit in memory, got {value}")]
    InvalidWindow { class: &'static str, value: usize },

    #[error("inlet resolves to {inlet:?} backend but outlet resolves to {outlet:?}")]
    BackendMismatch { inlet: Backend, outlet: Backend },

    #[error("inlet and outlet are not bound to the same buffer")]
    UnpairedEndpoints,

    #[error("unknown service `{0}`")]
    UnknownService(String),

    #[error("unknown layout `{0}`")]
    UnknownLayout(String),

    #[error("unknown backend `{0}`")]
    UnknownBackend(String),

    #[error("service registry is empty")]
    EmptyRegistry,

    #[error("worker count must be at least 1")]
    NoWorkers,

    #[error("{name} must lie in [0, 1], got {value}")]
    OutOfUnitRange { name: &'static str, value: f64 },

    #[error("{name} must be finite and non-negative, got {value}")]
    InvalidQuantity { name: &'static str, value: f64 },
}

/// A single service invocation failing for a single cell.
///
/// Contained by the scheduler: recorded on the cell, never propagated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ServiceFailure {
    #[error("malformed genome: {0}")]
    MalformedGenome(String),

    #[error("invalid cell state: {0}")]
    InvalidState(String),

    #[error("injected fault")]
    Injected,

    #[error("service panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Other(String),
}

/// Returned by the epoch controller when the barrier has not been reached.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EpochError {
    #[error("tick {tick} is incomplete: {pending} cells did not reach TickDone")]
    Incomplete { tick: u64, pending: usize },

    #[error("tick report is for tick {report} but the controller is at tick {current}")]
    StaleReport { report: u64, current: u64 },
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no complete checkpoint found")]
    Missing,

    #[error("checkpoint digest mismatch: expected {expected}, computed {computed}")]
    DigestMismatch { expected: String, computed: String },

    #[error("checkpoint layout does not match the configured topology: {0}")]
    LayoutMismatch(String),

    #[error("refusing to checkpoint non-finite value: {0}")]
    NonFinite(String),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}
