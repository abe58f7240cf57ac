//! Checkpoint file: JSON lines, appended write-ahead style.
//!
//! One checkpoint is a `header`, one `cell` record per cell, one `duct`
//! record per provisioned duct, and a `footer` carrying the SHA-256 of every
//! line before it. Several checkpoints may share a file; the last one with a
//! valid footer wins and a torn tail is ignored.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::cell::{CellState, Diagnostic, SpawnPacket, StatePacket};
use crate::conduit::{Backend, SavedDuct};
use crate::config::{Config, Windows};
use crate::error::CheckpointError;
use crate::logging::{log_checkpoint, ts_now};
use crate::reliability::circuit::FailureBreaker;
use crate::topology::{CellId, Direction, Layout, Topology};

/// Window-bounded contents of one duct, by class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class", content = "saved", rename_all = "snake_case")]
pub enum SavedContents {
    Resource(SavedDuct<f64>),
    State(SavedDuct<StatePacket>),
    Spawn(SavedDuct<SpawnPacket>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum CheckpointRecord {
    Header {
        ts: String,
        tick: u64,
        layout: Layout,
        backend: Backend,
        windows: Windows,
        fingerprint: String,
    },
    Cell {
        id: CellId,
        state: CellState,
        #[serde(default)]
        breakers: Vec<(String, FailureBreaker)>,
        #[serde(default)]
        last_failure: Option<Diagnostic>,
    },
    Duct {
        from: CellId,
        direction: Direction,
        contents: SavedContents,
    },
    Footer {
        tick: u64,
        cells: usize,
        ducts: usize,
        digest: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedCell {
    pub id: CellId,
    pub state: CellState,
    pub breakers: Vec<(String, FailureBreaker)>,
    pub last_failure: Option<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedDuctRecord {
    pub from: CellId,
    pub direction: Direction,
    pub contents: SavedContents,
}

/// One complete, digest-checked checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub tick: u64,
    pub layout: Layout,
    pub backend: Backend,
    pub windows: Windows,
    pub fingerprint: String,
    pub cells: Vec<SavedCell>,
    pub ducts: Vec<SavedDuctRecord>,
    pub digest: String,
}

impl Checkpoint {
    pub fn live_cells(&self) -> usize {
        self.cells.iter().filter(|c| c.state.alive).count()
    }

    pub fn total_stock(&self) -> f64 {
        self.cells
            .iter()
            .filter(|c| c.state.alive)
            .map(|c| c.state.stock)
            .sum()
    }

    pub fn buffered_messages(&self) -> usize {
        self.ducts
            .iter()
            .map(|d| match &d.contents {
                SavedContents::Resource(s) => s.messages.len(),
                SavedContents::State(s) => s.messages.len(),
                SavedContents::Spawn(s) => s.messages.len(),
            })
            .sum()
    }
}

fn capture(topo: &mut Topology, tick: u64, cfg: &Config) -> Vec<CheckpointRecord> {
    let layout = topo.layout();
    let mut records = vec![CheckpointRecord::Header {
        ts: ts_now(),
        tick,
        layout,
        backend: topo.backend(),
        windows: topo.windows(),
        fingerprint: cfg.fingerprint(),
    }];
    for cell in topo.cells() {
        records.push(CheckpointRecord::Cell {
            id: cell.id,
            state: cell.state.clone(),
            breakers: cell.breakers.clone(),
            last_failure: cell.last_failure.clone(),
        });
    }
    for i in 0..topo.len() {
        let from = CellId(i);
        for &direction in layout.send_directions() {
            let saved = [
                topo.save_duct::<f64>(from, direction).map(SavedContents::Resource),
                topo.save_duct::<StatePacket>(from, direction).map(SavedContents::State),
                topo.save_duct::<SpawnPacket>(from, direction).map(SavedContents::Spawn),
            ];
            for contents in saved.into_iter().flatten() {
                records.push(CheckpointRecord::Duct { from, direction, contents });
            }
        }
    }
    records
}

/// Names the first float in `record` that JSON cannot carry.
fn non_finite(record: &CheckpointRecord) -> Option<String> {
    match record {
        CheckpointRecord::Cell { id, state, .. } => {
            if !state.stock.is_finite() {
                return Some(format!("cell {} stock {}", id.0, state.stock));
            }
            state
                .neighbor_stock
                .iter()
                .flatten()
                .find(|v| !v.is_finite())
                .map(|v| format!("cell {} neighbor stock {}", id.0, v))
        }
        CheckpointRecord::Duct { from, direction, contents } => {
            let mut floats: Box<dyn Iterator<Item = f64> + '_> = match contents {
                SavedContents::Resource(s) => Box::new(s.messages.iter().map(|m| m.payload)),
                SavedContents::State(s) => Box::new(s.messages.iter().map(|m| m.payload.stock)),
                SavedContents::Spawn(s) => Box::new(s.messages.iter().map(|m| m.payload.endowment)),
            };
            let bad = floats.find(|v| !v.is_finite());
            bad.map(|v| format!("duct {}->{:?} payload {}", from.0, direction, v))
        }
        _ => None,
    }
}

/// Append a checkpoint of `topo` at `tick`. Returns the body digest.
///
/// Nothing is written if any captured float is NaN or infinite.
pub fn write_checkpoint(path: &Path, topo: &mut Topology, tick: u64, cfg: &Config) -> Result<String, CheckpointError> {
    let records = capture(topo, tick, cfg);
    if let Some(what) = records.iter().find_map(non_finite) {
        return Err(CheckpointError::NonFinite(what));
    }
    let mut hasher = Sha256::new();
    let mut body = String::new();
    let mut cells = 0;
    let mut ducts = 0;
    for record in &records {
        match record {
            CheckpointRecord::Cell { .. } => cells += 1,
            CheckpointRecord::Duct { .. } => ducts += 1,
            _ => {}
        }
        let line = serde_json::to_string(record)?;
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
        body.push_str(&line);
        body.push('\n');
    }
    let digest = hex::encode(hasher.finalize());
    let footer = CheckpointRecord::Footer { tick, cells, ducts, digest: digest.clone() };
    body.push_str(&serde_json::to_string(&footer)?);
    body.push('\n');

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(body.as_bytes())?;
    file.flush()?;
    file.sync_all()?;

    log_checkpoint("checkpoint_written", &path.to_string_lossy(), tick, &digest);
    Ok(digest)
}

struct Partial {
    hasher: Sha256,
    header: CheckpointRecord,
    cells: Vec<SavedCell>,
    ducts: Vec<SavedDuctRecord>,
}

/// Read the last complete checkpoint in `path`.
pub fn read_checkpoint(path: &Path) -> Result<Checkpoint, CheckpointError> {
    if !path.exists() {
        return Err(CheckpointError::Missing);
    }
    let reader = BufReader::new(File::open(path)?);
    let mut latest: Option<Checkpoint> = None;
    let mut partial: Option<Partial> = None;

    for line in reader.lines() {
        let line = line?;
        let Ok(record) = serde_json::from_str::<CheckpointRecord>(&line) else {
            // torn or foreign line: whatever was in progress is unusable
            partial = None;
            continue;
        };
        match record {
            header @ CheckpointRecord::Header { .. } => {
                let mut hasher = Sha256::new();
                hasher.update(line.as_bytes());
                hasher.update(b"\n");
                partial = Some(Partial { hasher, header, cells: Vec::new(), ducts: Vec::new() });
            }
            CheckpointRecord::Cell { id, state, breakers, last_failure } => {
                if let Some(p) = partial.as_mut() {
                    p.hasher.update(line.as_bytes());
                    p.hasher.update(b"\n");
                    p.cells.push(SavedCell { id, state, breakers, last_failure });
                }
            }
            CheckpointRecord::Duct { from, direction, contents } => {
                if let Some(p) = partial.as_mut() {
                    p.hasher.update(line.as_bytes());
                    p.hasher.update(b"\n");
                    p.ducts.push(SavedDuctRecord { from, direction, contents });
                }
            }
            CheckpointRecord::Footer { digest, cells, ducts, .. } => {
                let Some(p) = partial.take() else {
                    continue;
                };
                let computed = hex::encode(p.hasher.finalize());
                if computed != digest || cells != p.cells.len() || ducts != p.ducts.len() {
                    return Err(CheckpointError::DigestMismatch { expected: digest, computed });
                }
                if let CheckpointRecord::Header { tick, layout, backend, windows, fingerprint, .. } = p.header {
                    latest = Some(Checkpoint {
                        tick,
                        layout,
                        backend,
                        windows,
                        fingerprint,
                        cells: p.cells,
                        ducts: p.ducts,
                        digest,
                    });
                }
            }
        }
    }
    latest.ok_or(CheckpointError::Missing)
}

/// Rebuild a topology from a checkpoint under `cfg`. The layout must match;
/// backend and windows come from `cfg`.
pub fn restore(checkpoint: Checkpoint, cfg: &Config) -> Result<Topology, CheckpointError> {
    let expected = Layout::from_config(cfg);
    if expected != checkpoint.layout {
        return Err(CheckpointError::LayoutMismatch(format!(
            "checkpoint has {:?} {}x{}, config has {:?} {}x{}",
            checkpoint.layout.kind,
            checkpoint.layout.width,
            checkpoint.layout.height,
            expected.kind,
            expected.width,
            expected.height
        )));
    }
    let mut topo = Topology::new(cfg)?;
    if checkpoint.cells.len() != topo.len() {
        return Err(CheckpointError::LayoutMismatch(format!(
            "checkpoint has {} cells, topology has {}",
            checkpoint.cells.len(),
            topo.len()
        )));
    }
    let degree = topo.layout().port_directions().len();
    for saved in checkpoint.cells {
        let Some(cell) = topo.cells_mut().get_mut(saved.id.0) else {
            return Err(CheckpointError::LayoutMismatch(format!("no cell {}", saved.id)));
        };
        if saved.state.neighbor_stock.len() != degree {
            return Err(CheckpointError::LayoutMismatch(format!(
                "cell {} has {} neighbor slots, layout has {}",
                saved.id,
                saved.state.neighbor_stock.len(),
                degree
            )));
        }
        cell.state = saved.state;
        cell.breakers = saved.breakers;
        cell.last_failure = saved.last_failure;
    }
    for duct in checkpoint.ducts {
        match duct.contents {
            SavedContents::Resource(s) => topo.restore_duct(duct.from, duct.direction, s)?,
            SavedContents::State(s) => topo.restore_duct(duct.from, duct.direction, s)?,
            SavedContents::Spawn(s) => topo.restore_duct(duct.from, duct.direction, s)?,
        }
    }
    topo.set_generation(checkpoint.tick);
    Ok(topo)
}
