//! Aging, reproduction, and death.

use rand::seq::SliceRandom;
use rand::Rng;

use super::CellContext;
use crate::cell::{CellState, SpawnPacket};
use crate::error::ServiceFailure;
use crate::fault::inject::{should_fault, FaultProfile};

pub fn age(cx: &mut CellContext<'_>) -> Result<(), ServiceFailure> {
    cx.cell.state.age += 1;
    Ok(())
}

/// Offer one offspring to a neighbor not heard alive, paying `spawn_cost`.
pub fn send_spawn(cx: &mut CellContext<'_>) -> Result<(), ServiceFailure> {
    let cost = cx.config.spawn_cost;
    let cell = &mut *cx.cell;
    if cell.state.stock < 2.0 * cost {
        return Ok(());
    }
    let candidates: Vec<usize> = cell
        .ports
        .iter()
        .enumerate()
        .filter(|(i, p)| {
            p.spawn.inlet.is_some()
                && cell.state.neighbor_stock.get(*i).map_or(true, |s| s.is_none())
        })
        .map(|(i, _)| i)
        .collect();
    let Some(&target) = candidates.choose(&mut cx.rng) else {
        return Ok(());
    };
    let packet = SpawnPacket {
        genome: cell.state.genome.offspring(),
        endowment: cost,
    };
    if let Some(inlet) = cell.ports[target].spawn.inlet.as_mut() {
        inlet.put(packet);
        cell.state.stock -= cost;
    }
    Ok(())
}

/// Dead cells adopt the richest offer in their spawn windows; live cells
/// just clear theirs.
pub fn birth(cx: &mut CellContext<'_>) -> Result<(), ServiceFailure> {
    let cell = &mut *cx.cell;
    let mut best: Option<SpawnPacket> = None;
    for port in cell.ports.iter_mut() {
        let Some(outlet) = port.spawn.outlet.as_mut() else {
            continue;
        };
        for offer in outlet.consume().into_messages() {
            let better = best
                .as_ref()
                .map_or(true, |b| offer.payload.endowment > b.endowment);
            if better {
                best = Some(offer.payload);
            }
        }
    }
    if cell.state.alive {
        return Ok(());
    }
    if let Some(offer) = best {
        let degree = cell.ports.len();
        let births = cell.state.births + 1;
        let mut state = CellState::founder(offer.genome.root_id, offer.endowment, Vec::new(), degree);
        state.genome = offer.genome;
        state.births = births;
        cell.state = state;
        // A fresh occupant starts with clean failure history.
        cell.breakers.clear();
    }
    Ok(())
}

pub fn apoptosis(cx: &mut CellContext<'_>) -> Result<(), ServiceFailure> {
    let cap = cx.config.quorum_cap;
    let state = &mut cx.cell.state;
    if state.controls.apoptosis || state.quorum > cap {
        state.kill();
    }
    Ok(())
}

/// The death policy for starved, corrupt, and repeatedly failing cells.
pub fn death(cx: &mut CellContext<'_>) -> Result<(), ServiceFailure> {
    let stock = cx.cell.state.stock;
    let corrupt = !stock.is_finite();
    if corrupt || stock <= 0.0 || cx.cell.tripped_breaker().is_some() {
        cx.cell.state.kill();
    }
    // A corpse keeps no stock worth recording.
    if corrupt {
        cx.cell.state.stock = 0.0;
    }
    Ok(())
}

pub fn inject_fault(cx: &mut CellContext<'_>) -> Result<(), ServiceFailure> {
    let profile = FaultProfile::from_config(cx.config);
    if !profile.is_enabled() {
        return Ok(());
    }
    if should_fault(cx.rng.gen(), profile.service_fault_rate) {
        return Err(ServiceFailure::Injected);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::service::testing::{cell_mut, fixture};
    use crate::topology::LayoutKind;

    fn ring() -> Config {
        Config {
            layout: LayoutKind::Ring,
            width: 3,
            workers: 1,
            spawn_cost: 1.0,
            ..Config::default()
        }
    }

    #[test]
    fn test_spawn_reaches_dead_neighbor() {
        let (mut topo, cfg) = fixture(ring());
        cell_mut(&mut topo, 1).state.kill();
        {
            let cell = cell_mut(&mut topo, 0);
            cell.state.stock = 5.0;
            cell.state.genome.counter.record_insertion();
            let mut cx = CellContext::new(cell, 0, &cfg, 0);
            send_spawn(&mut cx).unwrap();
            assert_eq!(cx.cell.state.stock, 4.0);
        }
        // With neither neighbor heard, the offer went east or west; feed both
        // dead cells so whichever got it is reborn.
        cell_mut(&mut topo, 2).state.kill();
        let mut reborn = 0;
        for id in [1, 2] {
            let cell = cell_mut(&mut topo, id);
            let mut cx = CellContext::new(cell, 0, &cfg, 0);
            birth(&mut cx).unwrap();
            if cx.cell.state.alive {
                reborn += 1;
                assert_eq!(cx.cell.state.genome.generation, 1);
                assert_eq!(cx.cell.state.genome.counter.insertions, 1);
                assert_eq!(cx.cell.state.stock, 1.0);
                assert_eq!(cx.cell.state.births, 1);
            }
        }
        assert_eq!(reborn, 1);
    }

    #[test]
    fn test_poor_cell_does_not_spawn() {
        let (mut topo, cfg) = fixture(ring());
        let cell = cell_mut(&mut topo, 0);
        cell.state.stock = 1.5;
        let mut cx = CellContext::new(cell, 0, &cfg, 0);
        send_spawn(&mut cx).unwrap();
        assert_eq!(cx.cell.state.stock, 1.5);
    }

    #[test]
    fn test_apoptosis_on_flag_and_crowding() {
        let (mut topo, cfg) = fixture(ring());
        {
            let cell = cell_mut(&mut topo, 0);
            cell.state.controls.apoptosis = true;
            let mut cx = CellContext::new(cell, 0, &cfg, 0);
            apoptosis(&mut cx).unwrap();
            assert!(!cx.cell.state.alive);
        }
        let cell = cell_mut(&mut topo, 1);
        cell.state.quorum = cfg.quorum_cap + 1;
        let mut cx = CellContext::new(cell, 0, &cfg, 0);
        apoptosis(&mut cx).unwrap();
        assert!(!cx.cell.state.alive);
    }

    #[test]
    fn test_death_on_tripped_breaker() {
        let (mut topo, cfg) = fixture(ring());
        let cell = cell_mut(&mut topo, 0);
        let breaker = cell.breaker_mut("CpuExecution", 2);
        breaker.record_failure();
        breaker.record_failure();
        let mut cx = CellContext::new(cell, 0, &cfg, 0);
        death(&mut cx).unwrap();
        assert!(!cx.cell.state.alive);
    }

    #[test]
    fn test_death_on_nan_stock() {
        let (mut topo, cfg) = fixture(ring());
        let cell = cell_mut(&mut topo, 0);
        cell.state.stock = f64::NAN;
        let mut cx = CellContext::new(cell, 0, &cfg, 0);
        death(&mut cx).unwrap();
        assert!(!cx.cell.state.alive);
        assert_eq!(cx.cell.state.stock, 0.0);
    }

    #[test]
    fn test_certain_fault_injection() {
        let cfg = Config { fault_rate: 1.0, ..ring() };
        let (mut topo, cfg) = fixture(cfg);
        let cell = cell_mut(&mut topo, 0);
        let mut cx = CellContext::new(cell, 0, &cfg, 0);
        assert_eq!(inject_fault(&mut cx), Err(ServiceFailure::Injected));
    }
}
