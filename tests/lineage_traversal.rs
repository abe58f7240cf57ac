//! Lineage counters across epochs and the restartable cursor over them.

use std::collections::HashMap;

use ductwork::config::Config;
use ductwork::topology::{CellId, LayoutKind};
use ductwork::verify::invariants::assert_lineage_monotonic;
use ductwork::Simulation;

fn busy_torus() -> Config {
    Config {
        layout: LayoutKind::Torus,
        width: 4,
        height: 4,
        workers: 1,
        seed: 3,
        mutation_rate: 0.5,
        ..Config::default()
    }
}

#[test]
fn test_counters_never_go_back_for_a_surviving_cell() {
    let mut sim = Simulation::new(busy_torus()).unwrap();
    let mut prev = sim.snapshot().unwrap();
    let mut mutated = false;

    for _ in 0..20 {
        let next = sim.step().unwrap();
        for (a, b) in prev.cells.iter().zip(next.cells.iter()) {
            if a.alive && b.alive {
                assert_lineage_monotonic(a.lineage, b.lineage)
                    .unwrap_or_else(|v| panic!("cell {}: {}", a.id, v));
            }
            mutated |= b.lineage.elapsed() > 0;
        }
        prev = next;
    }
    assert!(mutated, "a 0.5 mutation rate should mutate something in 20 ticks");
}

#[test]
fn test_cursor_enumerates_live_cells_and_restarts() {
    let mut sim = Simulation::new(busy_torus()).unwrap();
    let snap = sim.run(10).unwrap();

    let mut cursor = snap.lineage();
    assert_eq!(cursor.len(), snap.live_count());

    let first: Vec<(CellId, _)> = cursor.by_ref().collect();
    assert_eq!(first.len(), snap.live_count());
    assert!(cursor.get().is_none());

    let expected: HashMap<CellId, _> = snap.live().map(|c| (c.id, c.lineage)).collect();
    for (id, counter) in &first {
        assert_eq!(expected.get(id), Some(counter));
    }

    cursor.rewind();
    let second: Vec<_> = cursor.by_ref().collect();
    assert_eq!(first, second);
}

#[test]
fn test_cursor_offsets_and_peeks() {
    let mut sim = Simulation::new(busy_torus()).unwrap();
    let snap = sim.run(4).unwrap();
    let all: Vec<_> = snap.lineage().collect();
    if all.len() < 3 {
        return;
    }

    let mut cursor = snap.lineage();
    assert_eq!(cursor.peek(2), Some(all[2].1));
    let ahead = cursor.offset(2);
    assert_eq!(ahead.get(), Some(all[2]));
    assert_eq!(cursor.get(), Some(all[0]));

    cursor.advance();
    cursor.advance();
    cursor.retreat();
    assert_eq!(cursor.get(), Some(all[1]));
    assert_eq!(cursor.position(), 1);
}
