//! Epoch controller: the barrier between ticks.
//!
//! `advance_epoch` only proceeds once every cell has finished the tick. It
//! then does buffer housekeeping, bumps the tick, and publishes a snapshot.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::watch;

use crate::config::Config;
use crate::error::EpochError;
use crate::logging::{log, log_epoch, log_overflow, obj, Domain, Level};
use crate::scheduler::TickReport;
use crate::snapshot::Snapshot;
use crate::topology::Topology;

pub type SnapshotHandle = Option<Arc<Snapshot>>;

#[derive(Debug)]
pub struct EpochController {
    tick: u64,
    compact: bool,
    seen_skips: u64,
    total_skips: u64,
    total_failures: u64,
    tx: watch::Sender<SnapshotHandle>,
}

impl EpochController {
    pub fn new(compact: bool) -> Self {
        Self::starting_at(0, compact)
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.compact_buffers)
    }

    /// Resume counting from `tick`, e.g. after a restore.
    pub fn starting_at(tick: u64, compact: bool) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            tick,
            compact,
            seen_skips: 0,
            total_skips: 0,
            total_failures: 0,
            tx,
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn total_skips(&self) -> u64 {
        self.total_skips
    }

    pub fn total_failures(&self) -> u64 {
        self.total_failures
    }

    pub fn subscribe(&self) -> watch::Receiver<SnapshotHandle> {
        self.tx.subscribe()
    }

    pub fn latest(&self) -> SnapshotHandle {
        self.tx.borrow().clone()
    }

    /// Publish a snapshot of the current state without advancing.
    pub fn prime(&mut self, topo: &mut Topology) -> Arc<Snapshot> {
        self.seen_skips = topo.overflow_skips();
        let snapshot = Arc::new(Snapshot::capture(topo, self.tick, 0, 0));
        self.tx.send_replace(Some(snapshot.clone()));
        snapshot
    }

    pub fn advance_epoch(&mut self, topo: &mut Topology, report: &TickReport) -> Result<Arc<Snapshot>, EpochError> {
        if report.tick != self.tick {
            return Err(EpochError::StaleReport { report: report.tick, current: self.tick });
        }
        let missing = topo.len().saturating_sub(report.cells.len());
        if report.cancelled || report.pending() > 0 || missing > 0 {
            return Err(EpochError::Incomplete {
                tick: self.tick,
                pending: report.pending() + missing,
            });
        }

        let skips_now = topo.overflow_skips();
        let skipped = skips_now.saturating_sub(self.seen_skips);
        self.seen_skips = skips_now;
        self.total_skips += skipped;
        if skipped > 0 {
            log_overflow(self.tick, skipped);
        }

        if self.compact {
            let released = topo.compact();
            if released > 0 {
                log(
                    Level::Trace,
                    Domain::Conduit,
                    "compacted",
                    obj(&[("tick", json!(self.tick)), ("released", json!(released))]),
                );
            }
        }

        let failures = report.failure_count();
        self.total_failures += failures as u64;
        self.tick += 1;
        topo.set_generation(self.tick);

        let snapshot = Arc::new(Snapshot::capture(topo, self.tick, skipped, failures));
        log_epoch(
            self.tick,
            snapshot.live_count(),
            snapshot.total_stock(),
            failures,
            &snapshot.digest,
        );
        self.tx.send_replace(Some(snapshot.clone()));
        Ok(snapshot)
    }
}
