use crate::cell::LineageCounter;
use crate::snapshot::Snapshot;

#[derive(Debug, Clone, PartialEq)]
pub struct InvariantViolation {
    pub msg: String,
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.msg)
    }
}

fn violation(msg: impl Into<String>) -> Result<(), InvariantViolation> {
    Err(InvariantViolation { msg: msg.into() })
}

/// `read_head <= write_head` and the visible window is `min(W, backlog)`.
pub fn assert_buffer_invariants(
    read_head: u64,
    write_head: u64,
    window_len: usize,
    window: usize,
) -> Result<(), InvariantViolation> {
    if read_head > write_head {
        return violation(format!("read_head {read_head} ahead of write_head {write_head}"));
    }
    if window_len > window {
        return violation(format!("window holds {window_len} messages, limit is {window}"));
    }
    let expected = ((write_head - read_head) as usize).min(window);
    if window_len != expected {
        return violation(format!("window holds {window_len} messages, expected {expected}"));
    }
    Ok(())
}

pub fn assert_lineage_monotonic(prev: LineageCounter, next: LineageCounter) -> Result<(), InvariantViolation> {
    if next.insertions < prev.insertions {
        return violation(format!("insertions went back from {} to {}", prev.insertions, next.insertions));
    }
    if next.deletions < prev.deletions {
        return violation(format!("deletions went back from {} to {}", prev.deletions, next.deletions));
    }
    Ok(())
}

/// Structural checks on a published snapshot.
pub fn assert_snapshot_invariants(snap: &Snapshot) -> Result<(), InvariantViolation> {
    if snap.cells.len() != snap.layout.len() {
        return violation(format!(
            "snapshot has {} cells, layout has {}",
            snap.cells.len(),
            snap.layout.len()
        ));
    }
    for (i, cell) in snap.cells.iter().enumerate() {
        if cell.id.0 != i {
            return violation(format!("cell at position {i} has id {}", cell.id));
        }
        if cell.alive && cell.stock.is_nan() {
            return violation(format!("live cell {} has NaN stock", cell.id));
        }
        if cell.occupancy.len() != snap.layout.port_directions().len() {
            return violation(format!("cell {} reports {} ports", cell.id, cell.occupancy.len()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::topology::Topology;

    #[test]
    fn test_buffer_invariants() {
        assert!(assert_buffer_invariants(0, 5, 2, 2).is_ok());
        assert!(assert_buffer_invariants(4, 5, 1, 2).is_ok());
        assert!(assert_buffer_invariants(6, 5, 0, 2).is_err());
        assert!(assert_buffer_invariants(0, 5, 3, 2).is_err());
        assert!(assert_buffer_invariants(0, 5, 1, 2).is_err());
    }

    #[test]
    fn test_lineage_monotonic() {
        let a = LineageCounter { insertions: 2, deletions: 1 };
        let b = LineageCounter { insertions: 3, deletions: 1 };
        assert!(assert_lineage_monotonic(a, b).is_ok());
        assert!(assert_lineage_monotonic(b, a).is_err());
    }

    #[test]
    fn test_fresh_snapshot_passes() {
        let cfg = Config { width: 3, height: 2, workers: 1, ..Config::default() };
        let mut topo = Topology::new(&cfg).unwrap();
        let snap = Snapshot::capture(&mut topo, 0, 0, 0);
        assert!(assert_snapshot_invariants(&snap).is_ok());
    }
}
