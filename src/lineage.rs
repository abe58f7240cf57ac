//! Read-only traversal over lineage counters of a population.

use crate::cell::{Cell, LineageCounter};
use crate::cursor::IndexCursor;
use crate::topology::CellId;

/// Anything that carries a lineage counter and a liveness flag.
pub trait Lineaged {
    fn cell_id(&self) -> CellId;
    fn lineage(&self) -> LineageCounter;
    fn is_alive(&self) -> bool;
}

impl Lineaged for Cell {
    fn cell_id(&self) -> CellId {
        self.id
    }

    fn lineage(&self) -> LineageCounter {
        self.state.lineage()
    }

    fn is_alive(&self) -> bool {
        self.state.alive
    }
}

/// Restartable cursor yielding `(cell, counter)` for each live item.
///
/// Liveness is fixed when the cursor is built, so stepping back and forth
/// always sees the same enumeration.
#[derive(Debug, Clone)]
pub struct LineageCursor<'a, L> {
    live: Vec<&'a L>,
    cursor: IndexCursor,
}

impl<'a, L: Lineaged> LineageCursor<'a, L> {
    pub fn new(population: &'a [L]) -> Self {
        let live: Vec<&'a L> = population.iter().filter(|item| item.is_alive()).collect();
        let cursor = IndexCursor::new(live.len());
        Self { live, cursor }
    }

    pub fn get(&self) -> Option<(CellId, LineageCounter)> {
        self.cursor
            .index()
            .map(|i| (self.live[i].cell_id(), self.live[i].lineage()))
    }

    pub fn advance(&mut self) {
        self.cursor.advance();
    }

    pub fn retreat(&mut self) {
        self.cursor.retreat();
    }

    /// Copy of this cursor moved `k` places.
    pub fn offset(&self, k: isize) -> Self {
        Self { live: self.live.clone(), cursor: self.cursor.offset(k) }
    }

    pub fn rewind(&mut self) {
        self.cursor.rewind();
    }

    pub fn position(&self) -> isize {
        self.cursor.position()
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Counter `k` places from the current position without moving.
    pub fn peek(&self, k: isize) -> Option<LineageCounter> {
        self.cursor.offset(k).index().map(|i| self.live[i].lineage())
    }
}

impl<L: Lineaged> Iterator for LineageCursor<'_, L> {
    type Item = (CellId, LineageCounter);

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.get()?;
        self.advance();
        Some(item)
    }

    /// `next` yields nothing once the cursor has stepped off either end.
    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = if self.cursor.index().is_some() { self.cursor.remaining() } else { 0 };
        (n, Some(n))
    }
}
