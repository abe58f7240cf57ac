//! Resource stock: decay, harvest, and exchange over resource ducts.

use super::CellContext;
use crate::error::ServiceFailure;

pub fn decay(cx: &mut CellContext<'_>) -> Result<(), ServiceFailure> {
    let state = &mut cx.cell.state;
    state.stock *= 1.0 - cx.config.decay_rate;
    Ok(())
}

pub fn harvest(cx: &mut CellContext<'_>) -> Result<(), ServiceFailure> {
    cx.cell.state.stock += cx.config.harvest_amount;
    Ok(())
}

/// Take in everything neighbors sent that is still inside the window.
pub fn receive(cx: &mut CellContext<'_>) -> Result<(), ServiceFailure> {
    let mut received = 0.0;
    for port in cx.cell.ports.iter_mut() {
        if let Some(outlet) = port.resource.outlet.as_mut() {
            received += outlet.consume().payloads().sum::<f64>();
        }
    }
    if !received.is_finite() || received < 0.0 {
        return Err(ServiceFailure::InvalidState(format!(
            "received non-physical amount {received}"
        )));
    }
    cx.cell.state.stock += received;
    Ok(())
}

/// Share a fraction of stock evenly with every neighbor this cell sends to.
pub fn send(cx: &mut CellContext<'_>) -> Result<(), ServiceFailure> {
    let cfg = cx.config;
    let state = &cx.cell.state;
    if !state.controls.share || state.controls.hoard || state.stock <= cfg.send_threshold {
        return Ok(());
    }
    let outgoing = cx
        .cell
        .ports
        .iter()
        .filter(|p| p.resource.inlet.is_some())
        .count();
    if outgoing == 0 {
        return Ok(());
    }
    let amount = state.stock * cfg.send_fraction;
    let each = amount / outgoing as f64;
    for port in cx.cell.ports.iter_mut() {
        if let Some(inlet) = port.resource.inlet.as_mut() {
            inlet.put(each);
        }
    }
    cx.cell.state.stock -= amount;
    Ok(())
}
