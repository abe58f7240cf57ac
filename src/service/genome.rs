//! Genome interpretation and mutation.
//!
//! Programs are byte strings. One instruction runs per tick, picked by the
//! cell's age, and raises control flags for the services after it.

use rand::Rng;

use super::CellContext;
use crate::error::ServiceFailure;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Nop,
    Share,
    Hoard,
    Apoptose,
}

impl Instruction {
    pub fn decode(byte: u8) -> Self {
        match byte {
            0 => Instruction::Apoptose,
            b if b % 2 == 1 => Instruction::Share,
            b if b % 4 == 2 => Instruction::Hoard,
            _ => Instruction::Nop,
        }
    }
}

pub fn execute(cx: &mut CellContext<'_>) -> Result<(), ServiceFailure> {
    let max_len = cx.config.max_genome_len;
    let state = &mut cx.cell.state;
    let program = &state.genome.program;
    if program.is_empty() {
        return Err(ServiceFailure::MalformedGenome("empty program".to_string()));
    }
    if program.len() > max_len {
        return Err(ServiceFailure::MalformedGenome(format!(
            "program length {} exceeds {}",
            program.len(),
            max_len
        )));
    }
    let pc = (state.age % program.len() as u64) as usize;
    let op = Instruction::decode(program[pc]);

    state.controls.share = false;
    state.controls.hoard = false;
    match op {
        Instruction::Nop => {}
        Instruction::Share => state.controls.share = true,
        Instruction::Hoard => state.controls.hoard = true,
        Instruction::Apoptose => state.controls.apoptosis = true,
    }
    Ok(())
}

/// Insert or delete one byte with probability `mutation_rate`, bumping the
/// matching lineage counter.
pub fn mutate(cx: &mut CellContext<'_>) -> Result<(), ServiceFailure> {
    if !cx.rng.gen_bool(cx.config.mutation_rate) {
        return Ok(());
    }
    let max_len = cx.config.max_genome_len;
    let genome = &mut cx.cell.state.genome;
    let len = genome.program.len();
    let can_insert = len < max_len;
    let can_delete = len > 1;
    let insert = match (can_insert, can_delete) {
        (true, true) => cx.rng.gen_bool(0.5),
        (true, false) => true,
        (false, true) => false,
        (false, false) => return Ok(()),
    };
    if insert {
        let at = cx.rng.gen_range(0..=len);
        let byte: u8 = cx.rng.gen();
        genome.program.insert(at, byte);
        genome.counter.record_insertion();
    } else {
        let at = cx.rng.gen_range(0..len);
        genome.program.remove(at);
        genome.counter.record_deletion();
    }
    Ok(())
}
