//! Service ordering and per-cell failure containment.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use ductwork::config::Config;
use ductwork::error::ServiceFailure;
use ductwork::scheduler::{CancelToken, CellPhase, Outcome, Scheduler};
use ductwork::service::{CellContext, Registry, Service, ServiceKind};
use ductwork::topology::{CellId, LayoutKind, Topology};

type Trace = Arc<Mutex<Vec<(u64, usize, &'static str)>>>;

/// Appends (tick, cell, name) every time it runs.
struct Recorder {
    name: &'static str,
    trace: Trace,
}

impl Service for Recorder {
    fn name(&self) -> &str {
        self.name
    }

    fn run(&self, cx: &mut CellContext<'_>) -> Result<(), ServiceFailure> {
        self.trace
            .lock()
            .unwrap()
            .push((cx.tick, cx.cell.id.0, self.name));
        Ok(())
    }
}

/// Scribbles on one cell's state, then fails or panics for it.
struct Saboteur {
    target: usize,
    panic: bool,
}

impl Service for Saboteur {
    fn name(&self) -> &str {
        if self.panic {
            "Panicker"
        } else {
            "Saboteur"
        }
    }

    fn run(&self, cx: &mut CellContext<'_>) -> Result<(), ServiceFailure> {
        if cx.cell.id.0 != self.target {
            return Ok(());
        }
        cx.cell.state.stock = 1e9;
        cx.cell.state.age = 77;
        if self.panic {
            panic!("sabotaged cell {}", self.target);
        }
        Err(ServiceFailure::InvalidState("sabotaged".to_string()))
    }
}

fn ring(width: usize) -> Config {
    Config {
        layout: LayoutKind::Ring,
        width,
        height: 1,
        workers: 1,
        ..Config::default()
    }
}

fn recorder(name: &'static str, trace: &Trace) -> Box<dyn Service> {
    Box::new(Recorder { name, trace: trace.clone() })
}

#[test]
fn test_services_run_in_registry_order_per_cell() {
    let cfg = ring(3);
    let mut topo = Topology::new(&cfg).unwrap();
    let trace: Trace = Arc::default();
    let mut registry = Registry::new();
    registry.push(recorder("first", &trace));
    registry.push(recorder("second", &trace));
    registry.push(recorder("third", &trace));
    let scheduler = Scheduler::new(registry, 1).unwrap();

    for tick in 0..2 {
        let report = scheduler.run_tick(&mut topo, &cfg, tick, &CancelToken::new());
        assert!(report.is_complete());
    }

    let trace = trace.lock().unwrap();
    assert_eq!(trace.len(), 2 * 3 * 3);
    for tick in 0..2u64 {
        for cell in 0..3usize {
            let names: Vec<&str> = trace
                .iter()
                .filter(|(t, c, _)| *t == tick && *c == cell)
                .map(|(_, _, n)| *n)
                .collect();
            assert_eq!(names, vec!["first", "second", "third"]);
        }
    }
}

#[test]
fn test_order_holds_with_parallel_workers() {
    let cfg = Config { workers: 4, ..ring(9) };
    let mut topo = Topology::new(&cfg).unwrap();
    let trace: Trace = Arc::default();
    let mut registry = Registry::new();
    registry.push(recorder("a", &trace));
    registry.push(recorder("b", &trace));
    let scheduler = Scheduler::new(registry, 4).unwrap();

    let report = scheduler.run_tick(&mut topo, &cfg, 0, &CancelToken::new());
    assert_eq!(report.cells.len(), 9);
    assert!(report.cells.windows(2).all(|w| w[0].cell < w[1].cell));

    let trace = trace.lock().unwrap();
    for cell in 0..9usize {
        let names: Vec<&str> = trace
            .iter()
            .filter(|(_, c, _)| *c == cell)
            .map(|(_, _, n)| *n)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}

#[test]
fn test_failure_rolls_back_and_later_services_still_run() {
    let cfg = ring(4);
    let mut topo = Topology::new(&cfg).unwrap();
    let trace: Trace = Arc::default();
    let mut registry = Registry::new();
    registry.push(Box::new(Saboteur { target: 2, panic: false }));
    registry.push(Box::new(ServiceKind::ResourceHarvesting));
    registry.push(recorder("after", &trace));
    let scheduler = Scheduler::new(registry, 1).unwrap();

    let report = scheduler.run_tick(&mut topo, &cfg, 0, &CancelToken::new());
    assert!(report.is_complete());
    assert_eq!(report.failure_count(), 1);
    let (cell, service, failure) = report.failures()[0];
    assert_eq!(cell, CellId(2));
    assert_eq!(service, "Saboteur");
    assert!(matches!(failure, ServiceFailure::InvalidState(_)));

    let expected = cfg.initial_stock + cfg.harvest_amount;
    for c in topo.cells() {
        assert!((c.state.stock - expected).abs() < 1e-12);
        assert_eq!(c.state.age, 0);
    }
    let sabotaged = topo.cell(CellId(2)).unwrap();
    assert_eq!(sabotaged.last_failure.as_ref().unwrap().service, "Saboteur");
    assert!(topo.cell(CellId(1)).unwrap().last_failure.is_none());
    assert_eq!(trace.lock().unwrap().len(), 4);
}

#[test]
fn test_panic_is_contained_to_one_cell() {
    let cfg = Config { workers: 2, ..ring(6) };
    let mut topo = Topology::new(&cfg).unwrap();
    let mut registry = Registry::new();
    registry.push(Box::new(Saboteur { target: 5, panic: true }));
    registry.push(Box::new(ServiceKind::CellAge));
    let scheduler = Scheduler::new(registry, 2).unwrap();

    let report = scheduler.run_tick(&mut topo, &cfg, 0, &CancelToken::new());
    assert!(report.is_complete());
    let failed = report.cell(CellId(5)).unwrap();
    assert!(matches!(
        failed.outcomes[0].outcome,
        Outcome::Failed { failure: ServiceFailure::Panicked(_) }
    ));
    assert_eq!(failed.outcomes[1].outcome, Outcome::Committed);
    for c in topo.cells() {
        assert_eq!(c.state.age, 1);
        assert!(c.state.stock < 2.0);
    }
}

#[test]
fn test_repeated_failures_trip_breaker_and_kill() {
    let cfg = Config { max_consecutive_failures: 2, ..ring(3) };
    let mut topo = Topology::new(&cfg).unwrap();
    let mut registry = Registry::new();
    registry.push(Box::new(Saboteur { target: 0, panic: false }));
    registry.push(Box::new(ServiceKind::CellDeath));
    let scheduler = Scheduler::new(registry, 1).unwrap();

    scheduler.run_tick(&mut topo, &cfg, 0, &CancelToken::new());
    assert!(topo.cell(CellId(0)).unwrap().state.alive);
    scheduler.run_tick(&mut topo, &cfg, 1, &CancelToken::new());
    assert!(!topo.cell(CellId(0)).unwrap().state.alive);
    assert!(topo.cell(CellId(1)).unwrap().state.alive);

    let report = scheduler.run_tick(&mut topo, &cfg, 2, &CancelToken::new());
    let dead = report.cell(CellId(0)).unwrap();
    assert!(dead.outcomes.iter().all(|o| o.outcome == Outcome::Skipped));
}

#[test]
fn test_cancelled_tick_leaves_cells_unfinished() {
    let cfg = ring(3);
    let mut topo = Topology::new(&cfg).unwrap();
    let scheduler = Scheduler::new(Registry::from_kinds(&[ServiceKind::CellAge]), 1).unwrap();
    let cancel = CancelToken::new();
    cancel.cancel();

    let report = scheduler.run_tick(&mut topo, &cfg, 0, &cancel);
    assert!(report.cancelled);
    assert!(!report.is_complete());
    assert!(report.cells.iter().all(|c| c.phase == CellPhase::Cancelled));
    assert!(topo.cells().iter().all(|c| c.state.age == 0));
}

/// Cancels the shared token the first time it runs on `target`.
struct Interrupter {
    target: usize,
    token: CancelToken,
    fired: AtomicBool,
}

impl Service for Interrupter {
    fn name(&self) -> &str {
        "Interrupter"
    }

    fn run(&self, cx: &mut CellContext<'_>) -> Result<(), ServiceFailure> {
        if cx.cell.id.0 == self.target && !self.fired.swap(true, Ordering::SeqCst) {
            self.token.cancel();
        }
        Ok(())
    }
}

#[test]
fn test_resumed_tick_runs_each_service_once_per_cell() {
    let cfg = ring(4);
    let mut topo = Topology::new(&cfg).unwrap();
    let trace: Trace = Arc::default();
    let cancel = CancelToken::new();
    let mut registry = Registry::new();
    registry.push(recorder("before", &trace));
    registry.push(Box::new(Interrupter {
        target: 2,
        token: cancel.clone(),
        fired: AtomicBool::new(false),
    }));
    registry.push(recorder("after", &trace));
    let scheduler = Scheduler::new(registry, 1).unwrap();

    let cut = scheduler.run_tick(&mut topo, &cfg, 0, &cancel);
    assert!(!cut.is_complete());
    assert_eq!(cut.pending(), 2);

    cancel.reset();
    let done = scheduler.resume_tick(&mut topo, &cfg, &cut, &cancel);
    assert!(done.is_complete());

    let trace = trace.lock().unwrap();
    assert_eq!(trace.len(), 4 * 2);
    for cell in 0..4usize {
        let names: Vec<&str> = trace
            .iter()
            .filter(|(_, c, _)| *c == cell)
            .map(|(_, _, n)| *n)
            .collect();
        assert_eq!(names, vec!["before", "after"], "cell {cell}");
    }
}
