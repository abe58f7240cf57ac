//! Per-tick scheduler.
//!
//! Every cell walks the registry in declared order:
//! `Pending -> Running(i) -> Committed | Failed -> ... -> TickDone`.
//! A failed service rolls back its own edits to the cell's state and the
//! cell moves on to the next service. Cells are split across scoped worker
//! threads; one cell's services never leave the worker that owns it.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::cell::{Cell, Diagnostic};
use crate::config::Config;
use crate::error::{ConfigurationError, ServiceFailure};
use crate::logging::{log, log_service_failure, log_tick_cancelled, obj, Domain, Level, ProfileScope};
use crate::service::{CellContext, Registry, Service};
use crate::topology::{CellId, Topology};

/// Tick-level cancellation. Checked between services, never inside one.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellPhase {
    Pending,
    Running(usize),
    TickDone,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Committed,
    Failed { failure: ServiceFailure },
    /// Not run: the cell was dead and the service does not serve dead cells.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceOutcome {
    pub service: String,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellReport {
    pub cell: CellId,
    pub phase: CellPhase,
    pub outcomes: Vec<ServiceOutcome>,
}

impl CellReport {
    fn new(cell: CellId) -> Self {
        Self { cell, phase: CellPhase::Pending, outcomes: Vec::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub tick: u64,
    pub cells: Vec<CellReport>,
    pub cancelled: bool,
}

impl TickReport {
    pub fn failures(&self) -> Vec<(CellId, &str, &ServiceFailure)> {
        self.cells
            .iter()
            .flat_map(|c| {
                c.outcomes.iter().filter_map(move |o| match &o.outcome {
                    Outcome::Failed { failure } => Some((c.cell, o.service.as_str(), failure)),
                    _ => None,
                })
            })
            .collect()
    }

    pub fn failure_count(&self) -> usize {
        self.cells
            .iter()
            .flat_map(|c| c.outcomes.iter())
            .filter(|o| matches!(o.outcome, Outcome::Failed { .. }))
            .count()
    }

    /// Cells that did not reach `TickDone`.
    pub fn pending(&self) -> usize {
        self.cells
            .iter()
            .filter(|c| c.phase != CellPhase::TickDone)
            .count()
    }

    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.pending() == 0
    }

    pub fn cell(&self, id: CellId) -> Option<&CellReport> {
        self.cells.iter().find(|c| c.cell == id)
    }
}

#[derive(Debug)]
pub struct Scheduler {
    registry: Registry,
    workers: usize,
}

impl Scheduler {
    pub fn new(registry: Registry, workers: usize) -> Result<Self, ConfigurationError> {
        if registry.is_empty() {
            return Err(ConfigurationError::EmptyRegistry);
        }
        if workers == 0 {
            return Err(ConfigurationError::NoWorkers);
        }
        Ok(Self { registry, workers })
    }

    pub fn from_config(cfg: &Config) -> Result<Self, ConfigurationError> {
        Self::new(Registry::from_config(cfg)?, cfg.workers)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run one tick over every cell. Never fails: service failures land in
    /// the report and on the cells.
    pub fn run_tick(&self, topo: &mut Topology, cfg: &Config, tick: u64, cancel: &CancelToken) -> TickReport {
        self.serve_all(topo, cfg, tick, None, cancel)
    }

    /// Finish a tick that was cancelled part way. Cells that reached
    /// `TickDone` are left alone; the rest pick up at the first service
    /// they had not run.
    pub fn resume_tick(
        &self,
        topo: &mut Topology,
        cfg: &Config,
        prior: &TickReport,
        cancel: &CancelToken,
    ) -> TickReport {
        log(
            Level::Info,
            Domain::Scheduler,
            "tick_resumed",
            obj(&[("tick", json!(prior.tick)), ("pending", json!(prior.pending()))]),
        );
        self.serve_all(topo, cfg, prior.tick, Some(prior), cancel)
    }

    fn serve_all(
        &self,
        topo: &mut Topology,
        cfg: &Config,
        tick: u64,
        prior: Option<&TickReport>,
        cancel: &CancelToken,
    ) -> TickReport {
        let _prof = ProfileScope::with_context("run_tick", &[("tick", json!(tick))]);
        let cells = topo.cells_mut();
        let n = cells.len();
        let chunk = n.div_ceil(self.workers).max(1);
        let seeds: Vec<CellReport> = cells
            .iter()
            .map(|c| {
                prior
                    .and_then(|p| p.cell(c.id))
                    .cloned()
                    .unwrap_or_else(|| CellReport::new(c.id))
            })
            .collect();

        let mut reports: Vec<CellReport> = if self.workers == 1 || n <= 1 {
            cells
                .iter_mut()
                .zip(seeds)
                .map(|(cell, seed)| self.serve_cell(cell, seed, cfg, tick, cancel))
                .collect()
        } else {
            thread::scope(|s| {
                let handles: Vec<_> = cells
                    .chunks_mut(chunk)
                    .zip(seeds.chunks(chunk))
                    .map(|(part, part_seeds)| {
                        s.spawn(move || {
                            part.iter_mut()
                                .zip(part_seeds.iter().cloned())
                                .map(|(cell, seed)| self.serve_cell(cell, seed, cfg, tick, cancel))
                                .collect::<Vec<_>>()
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .flat_map(|h| h.join().unwrap_or_default())
                    .collect()
            })
        };
        reports.sort_by_key(|r| r.cell);

        let cancelled = cancel.is_cancelled();
        let report = TickReport { tick, cells: reports, cancelled };
        if cancelled {
            log_tick_cancelled(tick, report.pending());
        }
        log(
            Level::Debug,
            Domain::Scheduler,
            "tick_run",
            obj(&[
                ("tick", json!(tick)),
                ("cells", json!(n)),
                ("failures", json!(report.failure_count())),
                ("workers", json!(self.workers)),
            ]),
        );
        report
    }

    /// Walk the registry for one cell, starting after the last outcome
    /// already in `report`.
    fn serve_cell(
        &self,
        cell: &mut Cell,
        mut report: CellReport,
        cfg: &Config,
        tick: u64,
        cancel: &CancelToken,
    ) -> CellReport {
        if report.phase == CellPhase::TickDone {
            return report;
        }
        let start = report.outcomes.len();
        for (slot, service) in self.registry.iter().enumerate().skip(start) {
            if cancel.is_cancelled() {
                report.phase = CellPhase::Cancelled;
                return report;
            }
            let name = service.name().to_string();
            if !cell.state.alive && !service.runs_on_dead() {
                report.outcomes.push(ServiceOutcome { service: name, outcome: Outcome::Skipped });
                continue;
            }
            report.phase = CellPhase::Running(slot);
            let outcome = run_contained(service, cell, cfg, tick, slot);
            report.outcomes.push(ServiceOutcome { service: name, outcome });
        }
        report.phase = CellPhase::TickDone;
        report
    }
}

/// Run one service on one cell. On failure the cell's state goes back to
/// what it was before the service started.
fn run_contained(service: &dyn Service, cell: &mut Cell, cfg: &Config, tick: u64, slot: usize) -> Outcome {
    let committed = cell.state.clone();
    let result = catch_unwind(AssertUnwindSafe(|| {
        let mut cx = CellContext::new(cell, tick, cfg, slot);
        service.run(&mut cx)
    }))
    .unwrap_or_else(|payload| Err(ServiceFailure::Panicked(panic_message(&*payload))));

    match result {
        Ok(()) => {
            if let Some((_, breaker)) = cell.breakers.iter_mut().find(|(n, _)| n == service.name()) {
                breaker.record_success();
            }
            Outcome::Committed
        }
        Err(failure) => {
            cell.state = committed;
            let breaker = cell.breaker_mut(service.name(), cfg.max_consecutive_failures);
            breaker.record_failure();
            let streak = breaker.streak;
            log_service_failure(tick, cell.id.0, service.name(), &failure.to_string(), streak);
            cell.last_failure = Some(Diagnostic {
                tick,
                service: service.name().to_string(),
                failure: failure.clone(),
            });
            Outcome::Failed { failure }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
