//! Linear-scan register allocation over SM83's six general-purpose
//! registers (`a` is reserved as the scratch accumulator codegen needs for
//! every arithmetic and memory operation).
//!
//! Grounded on `original_source/src/LinearScanner.py` and
//! `RegisterAllocator.py`.

use crate::common::{Id, Map};
use crate::middle::ir::{Instruction, Procedure};
use crate::middle::liveness::{self, Liveness};

/// The registers available to the allocator, in assignment order. `a` is
/// never handed out; codegen keeps it free for operand staging.
pub const REGISTERS: [&str; 6] = ["b", "c", "d", "e", "h", "l"];

/// Where a variable ends up: a physical register, a spill slot at
/// `[sp+offset]` (offset counted in words from the frame's spill base), or
/// a fixed work-RAM address (a program global, addressed by name rather
/// than by frame offset since it outlives any one procedure's call).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Location {
    Register(&'static str),
    Spill(u16),
    Global(Id),
}

#[derive(Debug, Default)]
pub struct Allocation {
    pub locations: Map<Id, Location>,
    /// Number of spill slots handed out; callers use this to size the
    /// procedure's stack frame.
    pub spill_count: u16,
}

struct LiveRange {
    var: Id,
    start: usize,
    end: usize,
}

/// Runs linear-scan allocation over a single procedure's instructions.
/// Parameters are pre-pinned to `b, c, d, e` in declaration order (the
/// language allows at most four), matching how `ArgLoad` lands them at
/// procedure entry; every variable that names a program global is pinned
/// to its work-RAM address instead, since it must survive past this one
/// procedure's call; every other variable competes for the registers left
/// over.
pub fn allocate(proc: &Procedure, globals: &Map<Id, u16>) -> Allocation {
    let liveness = liveness::analyze(&proc.instructions);
    let mut locations = Map::new();
    let mut free: Vec<&'static str> = REGISTERS.to_vec();

    for (i, param) in proc.params.iter().enumerate() {
        if i < 4 {
            let reg = REGISTERS[i];
            locations.insert(*param, Location::Register(reg));
            free.retain(|r| *r != reg);
        }
    }

    for insn in &proc.instructions {
        let mut vars = insn.uses();
        if let Some(d) = insn.def() {
            vars.push(d);
        }
        for var in vars {
            if globals.contains_key(&var) && !locations.contains_key(&var) {
                locations.insert(var, Location::Global(var));
            }
        }
    }

    let mut ranges = live_ranges(proc, &liveness, &locations);
    ranges.sort_by_key(|r| r.start);

    // (end, register) of each currently active range, sorted by end so the
    // one expiring soonest is examined first.
    let mut active: Vec<(usize, &'static str)> = vec![];
    let mut next_spill = 0u16;

    for range in &ranges {
        active.retain(|&(end, reg)| {
            if end < range.start {
                free.push(reg);
                false
            } else {
                true
            }
        });
        active.sort_by_key(|&(end, _)| end);

        if let Some(reg) = free.pop() {
            locations.insert(range.var, Location::Register(reg));
            active.push((range.end, reg));
            active.sort_by_key(|&(end, _)| end);
        } else {
            // Spill whichever active range ends furthest in the future; if
            // that one outlives the current range, swap its register to the
            // newcomer and spill the furthest-ending one instead.
            let furthest = active.last().copied();
            match furthest {
                Some((furthest_end, reg)) if furthest_end > range.end => {
                    active.pop();
                    let spilled_var = locations
                        .iter()
                        .find(|(_, loc)| **loc == Location::Register(reg))
                        .map(|(v, _)| *v)
                        .expect("active register must be allocated to some variable");
                    locations.insert(spilled_var, Location::Spill(next_spill));
                    next_spill += 1;
                    locations.insert(range.var, Location::Register(reg));
                    active.push((range.end, reg));
                    active.sort_by_key(|&(end, _)| end);
                }
                _ => {
                    locations.insert(range.var, Location::Spill(next_spill));
                    next_spill += 1;
                }
            }
        }
    }

    Allocation { locations, spill_count: next_spill }
}

fn live_ranges(proc: &Procedure, liveness: &Liveness, pinned: &Map<Id, Location>) -> Vec<LiveRange> {
    let mut seen: std::collections::BTreeSet<Id> = pinned.keys().copied().collect();
    let mut ranges = vec![];
    for insn in &proc.instructions {
        let mut vars = insn.uses();
        if let Some(d) = insn.def() {
            vars.push(d);
        }
        for var in vars {
            if is_temp_or_local(var.as_str(), insn) && seen.insert(var) {
                if let Some((start, end)) = liveness.live_range(var) {
                    ranges.push(LiveRange { var, start, end });
                } else {
                    ranges.push(LiveRange { var, start: 0, end: 0 });
                }
            }
        }
    }
    ranges
}

/// Filters out the `Id`s that name something other than a value-carrying
/// variable: numeric list indices, and the synthetic `base.attr` addresses
/// `middle::lower` emits for attribute access. The latter are resolved by
/// codegen as direct memory symbols, never as a register holding a value,
/// so they must never compete for one.
fn is_temp_or_local(name: &str, _insn: &Instruction) -> bool {
    name.parse::<i64>().is_err() && !name.contains('.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Id;
    use crate::front::ast::BinOp;
    use crate::middle::ir::Instruction::*;

    fn id(s: &str) -> Id {
        Id::from(s.to_string())
    }

    fn proc(instructions: Vec<Instruction>) -> Procedure {
        Procedure { params: vec![], returns_value: false, instructions }
    }

    #[test]
    fn few_temporaries_all_fit_in_registers() {
        let p = proc(vec![
            Constant { dst: id("t0"), value: 1 },
            Constant { dst: id("t1"), value: 2 },
            BinaryOp { op: BinOp::Add, dst: id("t2"), lhs: id("t0"), rhs: id("t1") },
            Return(Some(id("t2"))),
        ]);
        let alloc = allocate(&p, &Map::new());
        assert_eq!(alloc.spill_count, 0);
        assert!(matches!(alloc.locations.get(&id("t0")), Some(Location::Register(_))));
    }

    #[test]
    fn params_are_pinned_to_the_first_registers() {
        let mut p = proc(vec![Return(Some(id("a")))]);
        p.params = vec![id("a"), id("b")];
        let alloc = allocate(&p, &Map::new());
        assert_eq!(alloc.locations.get(&id("a")), Some(&Location::Register("b")));
        assert_eq!(alloc.locations.get(&id("b")), Some(&Location::Register("c")));
    }

    #[test]
    fn more_than_six_live_temporaries_forces_a_spill() {
        let mut instrs = vec![];
        for i in 0..8 {
            instrs.push(Constant { dst: id(&format!("t{i}")), value: i as i64 });
        }
        let mut sum_args = vec![];
        for i in 0..8 {
            sum_args.push(id(&format!("t{i}")));
        }
        // Keep all eight temporaries live simultaneously by using them all
        // as arguments to one call at the end.
        instrs.push(Call { proc: id("Sum8"), args: sum_args, dst: None });
        instrs.push(Return(None));
        let p = proc(instrs);
        let alloc = allocate(&p, &Map::new());
        assert!(alloc.spill_count > 0);
    }

    #[test]
    fn a_global_never_competes_for_a_register() {
        let p = proc(vec![
            Constant { dst: id("t0"), value: 1 },
            Assign { dst: id("score"), src: id("t0") },
            Return(None),
        ]);
        let mut globals = Map::new();
        globals.insert(id("score"), 0xC000u16);
        let alloc = allocate(&p, &globals);
        assert_eq!(alloc.locations.get(&id("score")), Some(&Location::Global(id("score"))));
    }

    #[test]
    fn an_attribute_address_is_never_allocated_a_location() {
        let p = proc(vec![
            Load { dst: id("t0"), addr: id("e.x") },
            Return(Some(id("t0"))),
        ]);
        let alloc = allocate(&p, &Map::new());
        assert!(alloc.locations.get(&id("e.x")).is_none());
    }
}
