//! State broadcast between neighbors and quorum counting.

use super::CellContext;
use crate::cell::StatePacket;
use crate::error::ServiceFailure;

pub fn put_state(cx: &mut CellContext<'_>) -> Result<(), ServiceFailure> {
    let s = &cx.cell.state;
    let packet = StatePacket {
        stock: s.stock,
        alive: s.alive,
        age: s.age,
        quorum: s.quorum,
    };
    for port in cx.cell.ports.iter_mut() {
        if let Some(inlet) = port.state.inlet.as_mut() {
            inlet.put(packet);
        }
    }
    Ok(())
}

/// Jump straight to the freshest packet on each port. Anything older in the
/// window is passed over.
pub fn jump_state(cx: &mut CellContext<'_>) -> Result<(), ServiceFailure> {
    let cell = &mut *cx.cell;
    if cell.state.neighbor_stock.len() != cell.ports.len() {
        return Err(ServiceFailure::InvalidState(format!(
            "{} neighbor slots for {} ports",
            cell.state.neighbor_stock.len(),
            cell.ports.len()
        )));
    }
    for (slot, port) in cell.state.neighbor_stock.iter_mut().zip(cell.ports.iter_mut()) {
        let Some(outlet) = port.state.outlet.as_mut() else {
            continue;
        };
        let window = outlet.consume();
        if let Some(latest) = window.last() {
            *slot = latest.payload.alive.then_some(latest.payload.stock);
        }
    }
    Ok(())
}

/// Self plus every neighbor last heard alive.
pub fn quorum(cx: &mut CellContext<'_>) -> Result<(), ServiceFailure> {
    let state = &mut cx.cell.state;
    let heard = state.neighbor_stock.iter().filter(|s| s.is_some()).count();
    state.quorum = 1 + heard as u32;
    Ok(())
}
