//! Backward fixed-point liveness analysis over a procedure's flat
//! instruction list, used by the register allocator to build live ranges.
//!
//! Grounded on `original_source/src/LivenessAnalyzer.py`.

use crate::common::{Id, Set};
use crate::middle::ir::Instruction;

/// A maximal straight-line run of instructions: control only enters at the
/// first instruction and only leaves at the last.
#[derive(Debug)]
pub struct Block {
    pub start: usize,
    pub end: usize,
    pub successors: Vec<usize>,
}

/// Per-instruction live-in/live-out sets, indexed the same way as the
/// procedure's instruction list.
#[derive(Debug, Default)]
pub struct Liveness {
    pub live_in: Vec<Set<Id>>,
    pub live_out: Vec<Set<Id>>,
}

impl Liveness {
    /// Does `var` live across `instructions[at]` (i.e. is it live-out of
    /// that instruction)? Used by the allocator to compute each variable's
    /// [start, end] range.
    pub fn live_range(&self, var: Id) -> Option<(usize, usize)> {
        let mut start = None;
        let mut end = None;
        for (i, outs) in self.live_out.iter().enumerate() {
            if self.live_in[i].contains(&var) || outs.contains(&var) {
                start.get_or_insert(i);
                end = Some(i);
            }
        }
        start.zip(end)
    }
}

/// A name is a real variable operand unless it parses as a plain integer
/// literal (list/attribute indices are frequently constants disguised as
/// operands at the IR level).
fn is_literal_operand(id: &Id) -> bool {
    id.as_str().parse::<i64>().is_ok()
}

fn real_uses(insn: &Instruction) -> Vec<Id> {
    insn.uses().into_iter().filter(|v| !is_literal_operand(v)).collect()
}

/// Instruction indices that begin a new block: the first instruction,
/// every label, and every instruction immediately following a jump,
/// conditional jump, or return.
fn leaders(instructions: &[Instruction]) -> Vec<usize> {
    let mut leaders = vec![0];
    for (i, insn) in instructions.iter().enumerate() {
        if insn.is_label() {
            leaders.push(i);
        }
        if insn.is_terminator() && i + 1 < instructions.len() {
            leaders.push(i + 1);
        }
    }
    leaders.sort_unstable();
    leaders.dedup();
    leaders
}

/// Builds the control-flow graph of a single procedure's instructions.
pub fn build_cfg(instructions: &[Instruction]) -> Vec<Block> {
    if instructions.is_empty() {
        return vec![];
    }
    let starts = leaders(instructions);
    let mut label_index = std::collections::HashMap::new();
    for (i, insn) in instructions.iter().enumerate() {
        if let Instruction::Label(name) = insn {
            label_index.insert(*name, i);
        }
    }

    let mut blocks = Vec::with_capacity(starts.len());
    for (b, &start) in starts.iter().enumerate() {
        let end = starts.get(b + 1).copied().unwrap_or(instructions.len()) - 1;
        let last = &instructions[end];
        let mut successors = vec![];
        for target in last.targets() {
            if let Some(&idx) = label_index.get(&target) {
                successors.push(idx);
            }
        }
        if !last.is_terminator() && end + 1 < instructions.len() {
            successors.push(end + 1);
        }
        blocks.push(Block { start, end, successors });
    }
    blocks
}

/// Computes per-instruction live-in/live-out sets for a procedure's
/// instructions via iterative backward data-flow to a fixed point.
pub fn analyze(instructions: &[Instruction]) -> Liveness {
    let n = instructions.len();
    let mut live_in = vec![Set::new(); n];
    let mut live_out = vec![Set::new(); n];
    if n == 0 {
        return Liveness { live_in, live_out };
    }

    let blocks = build_cfg(instructions);
    let mut block_of = vec![0usize; n];
    for (b, block) in blocks.iter().enumerate() {
        for i in block.start..=block.end {
            block_of[i] = b;
        }
    }
    let succ_start_of_block = |b: usize| blocks[b].start;
    let _ = succ_start_of_block;

    let mut changed = true;
    while changed {
        changed = false;
        for i in (0..n).rev() {
            let insn = &instructions[i];
            let mut out = Set::new();
            if i + 1 < n && !insn.is_terminator() {
                out.extend(live_in[i + 1].iter().copied());
            }
            let block = &blocks[block_of[i]];
            if i == block.end {
                for &succ in &block.successors {
                    out.extend(live_in[succ].iter().copied());
                }
            }

            let mut inn = out.clone();
            if let Some(def) = insn.def() {
                inn.remove(&def);
            }
            for used in real_uses(insn) {
                inn.insert(used);
            }

            if inn != live_in[i] {
                live_in[i] = inn;
                changed = true;
            }
            if out != live_out[i] {
                live_out[i] = out;
                changed = true;
            }
        }
    }

    Liveness { live_in, live_out }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Id;
    use crate::middle::ir::Instruction::*;

    fn id(s: &str) -> Id {
        Id::from(s.to_string())
    }

    #[test]
    fn straight_line_temp_dies_after_its_use() {
        let instrs = vec![
            Constant { dst: id("t0"), value: 1 },
            Constant { dst: id("t1"), value: 2 },
            BinaryOp { op: crate::front::ast::BinOp::Add, dst: id("t2"), lhs: id("t0"), rhs: id("t1") },
            Return(Some(id("t2"))),
        ];
        let live = analyze(&instrs);
        assert!(!live.live_out[2].contains(&id("t0")));
        assert!(live.live_in[2].contains(&id("t0")));
    }

    #[test]
    fn loop_back_edge_keeps_the_counter_live() {
        let instrs = vec![
            Label(id("head")),
            CondJump { cond: id("i"), if_true: id("body"), if_false: id("end") },
            Label(id("body")),
            BinaryOp { op: crate::front::ast::BinOp::Add, dst: id("i"), lhs: id("i"), rhs: id("one") },
            Jump(id("head")),
            Label(id("end")),
        ];
        let live = analyze(&instrs);
        // `i` must still be live at the jump back to the head, since the
        // next iteration reads it again.
        assert!(live.live_out[4].contains(&id("i")));
    }

    #[test]
    fn numeric_index_operand_is_not_a_use() {
        let instrs = vec![IndexedStore { base: id("list"), index: id("0"), src: id("v") }];
        let live = analyze(&instrs);
        assert!(!live.live_in[0].contains(&id("0")));
        assert!(live.live_in[0].contains(&id("v")));
    }

    #[test]
    fn indexed_store_base_is_not_a_use_either() {
        // `base` names the array, resolved directly to an address by
        // codegen; it never needs to be loaded into a register.
        let instrs = vec![IndexedStore { base: id("list"), index: id("i"), src: id("v") }];
        let live = analyze(&instrs);
        assert!(!live.live_in[0].contains(&id("list")));
    }
}
