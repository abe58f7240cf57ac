//! Cell-grid simulation over windowed message ducts.
//!
//! Cells sit on a fixed topology and talk only through ducts: an inlet that
//! appends without bound and an outlet that sees at most `W` unread
//! messages, skipping older ones. Each tick the scheduler runs an ordered
//! service battery over every cell, containing failures per cell; the epoch
//! controller then publishes a read-only snapshot.

pub mod cell;
pub mod checkpoint;
pub mod conduit;
pub mod config;
pub mod cursor;
pub mod epoch;
pub mod error;
pub mod fault;
pub mod lineage;
pub mod logging;
pub mod reliability;
pub mod scheduler;
pub mod service;
pub mod simulation;
pub mod snapshot;
pub mod storage;
pub mod topology;
pub mod verify;

pub use cell::{Cell, CellState, Genome, LineageCounter};
pub use conduit::{Backend, Duct, Inlet, Message, Outlet, Window};
pub use config::{Config, Windows};
pub use error::{CheckpointError, ConfigurationError, EpochError, ServiceFailure};
pub use scheduler::{CancelToken, Scheduler, TickReport};
pub use service::{CellContext, Registry, Service, ServiceKind};
pub use simulation::Simulation;
pub use snapshot::{CellView, Snapshot};
pub use topology::{CellId, Direction, LayoutKind, Topology};
