//! Cells, their genomes, and the payloads their ducts carry.

use serde::{Deserialize, Serialize};

use crate::conduit::{Inlet, Outlet};
use crate::error::ServiceFailure;
use crate::reliability::circuit::FailureBreaker;
use crate::topology::{CellId, Coord, Direction};

/// Insertion/deletion tally carried by a genome. Only ever incremented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineageCounter {
    pub insertions: u64,
    pub deletions: u64,
}

impl LineageCounter {
    pub fn record_insertion(&mut self) {
        self.insertions += 1;
    }

    pub fn record_deletion(&mut self) {
        self.deletions += 1;
    }

    /// Total mutation events along this lineage line.
    pub fn elapsed(&self) -> u64 {
        self.insertions + self.deletions
    }

    /// True when neither counter went backwards from `earlier`.
    pub fn dominates(&self, earlier: &LineageCounter) -> bool {
        self.insertions >= earlier.insertions && self.deletions >= earlier.deletions
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genome {
    pub program: Vec<u8>,
    /// Cell the founding genome was seeded into.
    pub root_id: usize,
    pub generation: u64,
    pub counter: LineageCounter,
}

impl Genome {
    pub fn founder(root_id: usize, program: Vec<u8>) -> Self {
        Self {
            program,
            root_id,
            generation: 0,
            counter: LineageCounter::default(),
        }
    }

    /// Copy for an offspring, one generation down the line.
    pub fn offspring(&self) -> Self {
        Self {
            program: self.program.clone(),
            root_id: self.root_id,
            generation: self.generation + 1,
            counter: self.counter,
        }
    }
}

/// Flags the genome program raises for the other services to act on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Controls {
    pub share: bool,
    pub hoard: bool,
    pub apoptosis: bool,
}

/// Last failure seen on a cell, surfaced to viewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub tick: u64,
    pub service: String,
    pub failure: ServiceFailure,
}

/// Mutable per-cell simulation state. Services edit this; ducts live beside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellState {
    pub stock: f64,
    pub alive: bool,
    pub age: u64,
    pub genome: Genome,
    pub controls: Controls,
    /// Live neighbors plus self, as of the last quorum round.
    pub quorum: u32,
    /// Last stock each neighbor reported, indexed like the cell's ports.
    pub neighbor_stock: Vec<Option<f64>>,
    pub births: u64,
}

impl CellState {
    pub fn founder(root_id: usize, stock: f64, program: Vec<u8>, degree: usize) -> Self {
        Self {
            stock,
            alive: true,
            age: 0,
            genome: Genome::founder(root_id, program),
            controls: Controls::default(),
            quorum: 1,
            neighbor_stock: vec![None; degree],
            births: 0,
        }
    }

    pub fn lineage(&self) -> LineageCounter {
        self.genome.counter
    }

    pub fn kill(&mut self) {
        self.alive = false;
        self.controls = Controls::default();
    }
}

/// What a cell tells its neighbors every tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatePacket {
    pub stock: f64,
    pub alive: bool,
    pub age: u64,
    pub quorum: u32,
}

/// Offer to occupy a dead neighbor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnPacket {
    pub genome: Genome,
    pub endowment: f64,
}

/// One half of a directional link: an outgoing inlet and/or an incoming outlet.
#[derive(Debug)]
pub struct Link<T> {
    pub inlet: Option<Inlet<T>>,
    pub outlet: Option<Outlet<T>>,
}

impl<T> Default for Link<T> {
    fn default() -> Self {
        Self { inlet: None, outlet: None }
    }
}

/// Every duct class a cell holds toward one direction.
#[derive(Debug)]
pub struct Port {
    pub direction: Direction,
    pub neighbor: CellId,
    pub resource: Link<f64>,
    pub state: Link<StatePacket>,
    pub spawn: Link<SpawnPacket>,
}

impl Port {
    pub(crate) fn new(direction: Direction, neighbor: CellId) -> Self {
        Self {
            direction,
            neighbor,
            resource: Link::default(),
            state: Link::default(),
            spawn: Link::default(),
        }
    }
}

/// A cell: identity, state, and the duct endpoints it holds.
#[derive(Debug)]
pub struct Cell {
    pub id: CellId,
    pub coord: Coord,
    pub state: CellState,
    pub ports: Vec<Port>,
    /// Consecutive-failure breakers, one per service name.
    pub breakers: Vec<(String, FailureBreaker)>,
    pub last_failure: Option<Diagnostic>,
}

impl Cell {
    pub fn port(&self, direction: Direction) -> Option<&Port> {
        self.ports.iter().find(|p| p.direction == direction)
    }

    pub fn port_mut(&mut self, direction: Direction) -> Option<&mut Port> {
        self.ports.iter_mut().find(|p| p.direction == direction)
    }

    pub fn breaker_mut(&mut self, service: &str, threshold: u32) -> &mut FailureBreaker {
        let idx = match self.breakers.iter().position(|(name, _)| name == service) {
            Some(idx) => idx,
            None => {
                self.breakers
                    .push((service.to_string(), FailureBreaker::new(threshold)));
                self.breakers.len() - 1
            }
        };
        &mut self.breakers[idx].1
    }

    /// Any service failing often enough in a row to trip its breaker.
    pub fn tripped_breaker(&self) -> Option<&str> {
        self.breakers
            .iter()
            .find(|(_, b)| b.is_tripped())
            .map(|(name, _)| name.as_str())
    }
}
