//! Summarize the last complete checkpoint in a file.
//!
//! Usage:
//!   inspect [checkpoint.jsonl]       (defaults to $CHECKPOINT_PATH)
//!   inspect <file> --cells           also list every cell

use std::path::PathBuf;

use anyhow::{bail, Result};

use ductwork::checkpoint::read_checkpoint;

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let show_cells = args.iter().any(|a| a == "--cells");
    let path = match args.iter().find(|a| !a.starts_with("--")) {
        Some(p) => PathBuf::from(p),
        None => match std::env::var("CHECKPOINT_PATH") {
            Ok(p) => PathBuf::from(p),
            Err(_) => bail!("usage: inspect <checkpoint> [--cells]"),
        },
    };

    let ckpt = read_checkpoint(&path)?;
    println!("checkpoint   {}", path.display());
    println!("tick         {}", ckpt.tick);
    println!(
        "layout       {} {}x{}",
        ckpt.layout.kind.as_str(),
        ckpt.layout.width,
        ckpt.layout.height
    );
    println!("backend      {}", ckpt.backend.as_str());
    println!(
        "windows      resource={} state={} spawn={}",
        ckpt.windows.resource, ckpt.windows.state, ckpt.windows.spawn
    );
    println!("live cells   {}/{}", ckpt.live_cells(), ckpt.cells.len());
    println!("total stock  {:.4}", ckpt.total_stock());
    println!("buffered     {} messages in {} ducts", ckpt.buffered_messages(), ckpt.ducts.len());
    println!("fingerprint  {}", ckpt.fingerprint);
    println!("digest       {}", ckpt.digest);

    if show_cells {
        println!();
        println!("{:>6} {:>6} {:>12} {:>6} {:>8} {:>8}  last_failure", "cell", "alive", "stock", "age", "births", "mutations");
        for cell in &ckpt.cells {
            let failure = cell
                .last_failure
                .as_ref()
                .map(|d| format!("{}@{}", d.service, d.tick))
                .unwrap_or_default();
            println!(
                "{:>6} {:>6} {:>12.4} {:>6} {:>8} {:>8}  {}",
                cell.id.to_string(),
                cell.state.alive,
                cell.state.stock,
                cell.state.age,
                cell.state.births,
                cell.state.lineage().elapsed(),
                failure
            );
        }
    }
    Ok(())
}
