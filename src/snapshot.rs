//! Read-only epoch snapshots for viewers.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::cell::{Diagnostic, LineageCounter, Link};
use crate::lineage::{LineageCursor, Lineaged};
use crate::topology::{CellId, Coord, Direction, Layout, Topology};

/// Unread backlog on one incoming port, per duct class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortOccupancy {
    pub direction: Direction,
    pub resource: usize,
    pub state: usize,
    pub spawn: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellView {
    pub id: CellId,
    pub coord: Coord,
    pub stock: f64,
    pub alive: bool,
    pub age: u64,
    pub lineage: LineageCounter,
    pub last_failure: Option<Diagnostic>,
    pub occupancy: Vec<PortOccupancy>,
}

impl CellView {
    pub fn occupancy_toward(&self, direction: Direction) -> Option<&PortOccupancy> {
        self.occupancy.iter().find(|o| o.direction == direction)
    }
}

impl Lineaged for CellView {
    fn cell_id(&self) -> CellId {
        self.id
    }

    fn lineage(&self) -> LineageCounter {
        self.lineage
    }

    fn is_alive(&self) -> bool {
        self.alive
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Ticks completed when this snapshot was taken.
    pub tick: u64,
    pub layout: Layout,
    pub cells: Vec<CellView>,
    /// Messages dropped unread during the tick that produced this snapshot.
    pub overflow_skips: u64,
    pub failures: usize,
    pub digest: String,
}

fn backlog<T: Clone>(link: &mut Link<T>) -> usize {
    link.outlet.as_mut().map_or(0, |o| o.occupancy())
}

impl Snapshot {
    pub fn capture(topo: &mut Topology, tick: u64, overflow_skips: u64, failures: usize) -> Self {
        let layout = topo.layout();
        let cells: Vec<CellView> = topo
            .cells_mut()
            .iter_mut()
            .map(|cell| CellView {
                id: cell.id,
                coord: cell.coord,
                stock: cell.state.stock,
                alive: cell.state.alive,
                age: cell.state.age,
                lineage: cell.state.lineage(),
                last_failure: cell.last_failure.clone(),
                occupancy: cell
                    .ports
                    .iter_mut()
                    .map(|p| PortOccupancy {
                        direction: p.direction,
                        resource: backlog(&mut p.resource),
                        state: backlog(&mut p.state),
                        spawn: backlog(&mut p.spawn),
                    })
                    .collect(),
            })
            .collect();
        let digest = digest_cells(tick, &cells);
        Self { tick, layout, cells, overflow_skips, failures, digest }
    }

    pub fn cell(&self, id: CellId) -> Option<&CellView> {
        self.cells.get(id.0)
    }

    /// Cells with ids in `range`, clamped to the population.
    pub fn range(&self, range: Range<usize>) -> &[CellView] {
        let end = range.end.min(self.cells.len());
        let start = range.start.min(end);
        &self.cells[start..end]
    }

    pub fn live(&self) -> impl Iterator<Item = &CellView> {
        self.cells.iter().filter(|c| c.alive)
    }

    pub fn live_count(&self) -> usize {
        self.live().count()
    }

    pub fn lineage(&self) -> LineageCursor<'_, CellView> {
        LineageCursor::new(&self.cells)
    }

    pub fn total_stock(&self) -> f64 {
        self.live().map(|c| c.stock).sum()
    }
}

fn digest_cells(tick: u64, cells: &[CellView]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tick.to_le_bytes());
    for cell in cells {
        let line = serde_json::to_string(cell).unwrap_or_default();
        hasher.update(line.as_bytes());
    }
    hex::encode(hasher.finalize())
}
