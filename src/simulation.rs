//! Config -> Topology -> Scheduler -> EpochController, wired together.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;

use crate::checkpoint;
use crate::config::Config;
use crate::epoch::{EpochController, SnapshotHandle};
use crate::error::{CheckpointError, ConfigurationError, EpochError};
use crate::logging::log_checkpoint;
use crate::scheduler::{CancelToken, Scheduler, TickReport};
use crate::snapshot::Snapshot;
use crate::topology::Topology;

pub struct Simulation {
    config: Config,
    topology: Topology,
    scheduler: Scheduler,
    controller: EpochController,
    cancel: CancelToken,
    last_report: Option<TickReport>,
}

impl Simulation {
    pub fn new(config: Config) -> Result<Self, ConfigurationError> {
        let topology = Topology::new(&config)?;
        Self::assemble(config, topology, 0)
    }

    fn assemble(config: Config, mut topology: Topology, tick: u64) -> Result<Self, ConfigurationError> {
        let scheduler = Scheduler::from_config(&config)?;
        let mut controller = EpochController::starting_at(tick, config.compact_buffers);
        controller.prime(&mut topology);
        Ok(Self {
            config,
            topology,
            scheduler,
            controller,
            cancel: CancelToken::new(),
            last_report: None,
        })
    }

    /// Run one tick and advance the epoch. If the previous attempt at this
    /// tick was cancelled, finish it instead of starting over.
    pub fn step(&mut self) -> Result<Arc<Snapshot>, EpochError> {
        let tick = self.controller.tick();
        let report = match self.last_report.take() {
            Some(prior) if prior.tick == tick && !prior.is_complete() => {
                self.scheduler
                    .resume_tick(&mut self.topology, &self.config, &prior, &self.cancel)
            }
            _ => self
                .scheduler
                .run_tick(&mut self.topology, &self.config, tick, &self.cancel),
        };
        let result = self.controller.advance_epoch(&mut self.topology, &report);
        self.last_report = Some(report);
        result
    }

    /// Run up to `epochs` ticks, stopping at the first one that does not complete.
    pub fn run(&mut self, epochs: u64) -> Result<Arc<Snapshot>, EpochError> {
        let mut latest = match self.controller.latest() {
            Some(snap) => snap,
            None => self.controller.prime(&mut self.topology),
        };
        for _ in 0..epochs {
            latest = self.step()?;
        }
        Ok(latest)
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn snapshot(&self) -> SnapshotHandle {
        self.controller.latest()
    }

    pub fn subscribe(&self) -> watch::Receiver<SnapshotHandle> {
        self.controller.subscribe()
    }

    pub fn tick(&self) -> u64 {
        self.controller.tick()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn controller(&self) -> &EpochController {
        &self.controller
    }

    pub fn last_report(&self) -> Option<&TickReport> {
        self.last_report.as_ref()
    }

    /// Append a checkpoint at the current tick. Returns its digest.
    pub fn checkpoint(&mut self, path: &Path) -> Result<String, CheckpointError> {
        checkpoint::write_checkpoint(path, &mut self.topology, self.controller.tick(), &self.config)
    }

    /// Resume from the last complete checkpoint in `path`.
    pub fn restore(path: &Path, config: Config) -> Result<Self, CheckpointError> {
        let saved = checkpoint::read_checkpoint(path)?;
        let tick = saved.tick;
        let digest = saved.digest.clone();
        let topology = checkpoint::restore(saved, &config)?;
        let sim = Self::assemble(config, topology, tick)?;
        log_checkpoint("checkpoint_restored", &path.to_string_lossy(), tick, &digest);
        Ok(sim)
    }
}
