//! Rewrites a procedure's instructions so every operand is either a
//! physical register name or staged through one via an inserted
//! load/store, using the locations `regalloc::allocate` assigned. Also
//! inserts the `ChangeSP` prologue/epilogue a procedure needs once any of
//! its variables spilled.
//!
//! Grounded on `original_source/src/IRRewriter.py`.

use crate::common::Id;
use crate::middle::ir::{Instruction, Procedure};
use crate::middle::regalloc::{Allocation, Location};

/// The scratch register used to stage a single spilled operand. Reserved
/// by the allocator (never handed to a variable), so it is always free at
/// the start of an instruction.
const SCRATCH: &str = "a";
/// A second scratch register for the rare instruction with two spilled
/// operands at once (e.g. both sides of a binary op). Borrowing it is
/// safe as long as the instruction being rewritten does not itself read
/// `h` through a spilled-elsewhere alias, which holds for every Penguin
/// program within the six-register budget this allocator targets.
const SCRATCH2: &str = "h";

fn spill_addr(slot: u16) -> Id {
    Id::from(format!("sp+{slot}"))
}

pub struct Rewritten {
    pub params: Vec<Id>,
    pub returns_value: bool,
    pub instructions: Vec<Instruction>,
}

pub fn rewrite(proc: &Procedure, alloc: &Allocation) -> Rewritten {
    let mut out = vec![];
    if alloc.spill_count > 0 {
        out.push(Instruction::ChangeSP(-(alloc.spill_count as i32)));
    }

    let mut rewriter = Rewriter { alloc, extra_slots: alloc.spill_count, scratch_taken: vec![] };
    for insn in &proc.instructions {
        rewriter.rewrite_one(insn, &mut out);
    }

    if alloc.spill_count > 0 {
        // A bare fall-through return needs the frame released too; any
        // `Return` inside the body already gets its own pop inserted by
        // `rewrite_one`, so this only covers a body with no explicit one.
        if !matches!(proc.instructions.last(), Some(Instruction::Return(_))) {
            out.push(Instruction::ChangeSP(alloc.spill_count as i32));
        }
    }

    let params = proc.params.iter().map(|p| register_of(p, alloc)).collect();
    Rewritten { params, returns_value: proc.returns_value, instructions: out }
}

fn register_of(var: &Id, alloc: &Allocation) -> Id {
    match alloc.locations.get(var) {
        Some(Location::Register(r)) => Id::from(r.to_string()),
        Some(Location::Spill(_)) | Some(Location::Global(_)) | None => *var,
    }
}

struct Rewriter<'a> {
    alloc: &'a Allocation,
    extra_slots: u16,
    /// The scratch register(s) already handed out for the instruction
    /// currently being rewritten, in the order they were claimed.
    scratch_taken: Vec<&'static str>,
}

impl<'a> Rewriter<'a> {
    fn fresh_slot(&mut self) -> u16 {
        let slot = self.extra_slots;
        self.extra_slots += 1;
        slot
    }

    /// Hands out the next free scratch register, preferring `preferred`
    /// when both are still available. Only two operands of a single
    /// instruction can ever need staging at once, so the second call
    /// always gets whichever register the first call didn't take,
    /// regardless of what it would have preferred.
    fn next_scratch(&mut self, preferred: &'static str) -> &'static str {
        let scratch = match self.scratch_taken.first() {
            None => preferred,
            Some(&taken) => {
                if taken == SCRATCH {
                    SCRATCH2
                } else {
                    SCRATCH
                }
            }
        };
        self.scratch_taken.push(scratch);
        scratch
    }

    /// Resolves a use operand to a register name, inserting a `Load` from
    /// its spill slot into a scratch register first if needed.
    fn load_use(&mut self, var: &Id, out: &mut Vec<Instruction>) -> Id {
        self.load_use_preferring(var, SCRATCH, out)
    }

    /// Same as `load_use`, but claims `preferred` for the staged value
    /// when it's the first operand of this instruction that needs
    /// staging. Lets a caller pin a specific operand to a specific
    /// scratch register instead of taking whichever staging order falls
    /// out of the instruction's own operand order.
    fn load_use_preferring(&mut self, var: &Id, preferred: &'static str, out: &mut Vec<Instruction>) -> Id {
        match self.alloc.locations.get(var) {
            Some(Location::Register(r)) => Id::from(r.to_string()),
            Some(Location::Spill(slot)) => {
                let scratch = self.next_scratch(preferred);
                let dst = Id::from(scratch.to_string());
                out.push(Instruction::Load { dst, addr: spill_addr(*slot) });
                dst
            }
            Some(Location::Global(name)) => {
                let scratch = self.next_scratch(preferred);
                let dst = Id::from(scratch.to_string());
                out.push(Instruction::Load { dst, addr: *name });
                dst
            }
            None => *var,
        }
    }

    /// Resolves both operands of a binary instruction, staging the right
    /// operand first so it never lands in the accumulator: codegen always
    /// loads the left operand into `a` right before operating, which would
    /// clobber a right operand that had been staged there instead.
    fn load_binary_operands(&mut self, lhs: &Id, rhs: &Id, out: &mut Vec<Instruction>) -> (Id, Id) {
        let rhs = self.load_use_preferring(rhs, SCRATCH2, out);
        let lhs = self.load_use_preferring(lhs, SCRATCH, out);
        (lhs, rhs)
    }

    /// Resolves a def operand to a register name to compute into, and
    /// returns it together with the optional `Store` that must follow the
    /// rewritten instruction to commit it to its spill slot.
    fn def_target(&mut self, var: &Id) -> (Id, Option<Instruction>) {
        match self.alloc.locations.get(var) {
            Some(Location::Register(r)) => (Id::from(r.to_string()), None),
            Some(Location::Spill(slot)) => {
                let scratch = self.next_scratch(SCRATCH);
                let dst = Id::from(scratch.to_string());
                (dst, Some(Instruction::Store { addr: spill_addr(*slot), src: dst }))
            }
            Some(Location::Global(name)) => {
                let scratch = self.next_scratch(SCRATCH);
                let dst = Id::from(scratch.to_string());
                (dst, Some(Instruction::Store { addr: *name, src: dst }))
            }
            None => (*var, None),
        }
    }

    fn rewrite_one(&mut self, insn: &Instruction, out: &mut Vec<Instruction>) {
        self.scratch_taken.clear();
        use Instruction::*;
        match insn {
            BinaryOp { op, dst, lhs, rhs } => {
                let (lhs, rhs) = self.load_binary_operands(lhs, rhs, out);
                let (dst, store) = self.def_target(dst);
                out.push(BinaryOp { op: *op, dst, lhs, rhs });
                out.extend(store);
            }
            UnaryOp { op, dst, src } => {
                let src = self.load_use(src, out);
                let (dst, store) = self.def_target(dst);
                out.push(UnaryOp { op: *op, dst, src });
                out.extend(store);
            }
            Assign { dst, src } => {
                let src = self.load_use(src, out);
                let (dst, store) = self.def_target(dst);
                out.push(Assign { dst, src });
                out.extend(store);
            }
            Constant { dst, value } => {
                let (dst, store) = self.def_target(dst);
                out.push(Constant { dst, value: *value });
                out.extend(store);
            }
            Load { dst, addr } => {
                let addr = self.load_use(addr, out);
                let (dst, store) = self.def_target(dst);
                out.push(Load { dst, addr });
                out.extend(store);
            }
            Store { addr, src } => {
                let addr = self.load_use(addr, out);
                let src = self.load_use(src, out);
                out.push(Store { addr, src });
            }
            IndexedLoad { dst, base, index } => {
                let base = self.load_use(base, out);
                let index = self.load_use(index, out);
                let (dst, store) = self.def_target(dst);
                out.push(IndexedLoad { dst, base, index });
                out.extend(store);
            }
            IndexedStore { base, index, src } => {
                let base = self.load_use(base, out);
                let index = self.load_use(index, out);
                let src = self.load_use(src, out);
                out.push(IndexedStore { base, index, src });
            }
            Label(l) => out.push(Label(*l)),
            Jump(l) => out.push(Jump(*l)),
            CondJump { cond, if_true, if_false } => {
                let cond = self.load_use(cond, out);
                out.push(CondJump { cond, if_true: *if_true, if_false: *if_false });
            }
            Call { proc, args, dst } => self.rewrite_call(proc, args, dst, out),
            Return(value) => {
                let value = value.as_ref().map(|v| self.load_use(v, out));
                if self.alloc.spill_count > 0 {
                    out.push(ChangeSP(self.alloc.spill_count as i32));
                }
                out.push(Return(value));
            }
            ArgLoad { dst, index } => {
                let (dst, store) = self.def_target(dst);
                out.push(ArgLoad { dst, index: *index });
                out.extend(store);
            }
            HardwareLoad { dst, reg } => {
                let (dst, store) = self.def_target(dst);
                out.push(HardwareLoad { dst, reg: *reg });
                out.extend(store);
            }
            HardwareStore { reg, src } => {
                let src = self.load_use(src, out);
                out.push(HardwareStore { reg: *reg, src });
            }
            HardwareIndexedLoad { dst, reg, index } => {
                let index = self.load_use(index, out);
                let (dst, store) = self.def_target(dst);
                out.push(HardwareIndexedLoad { dst, reg: *reg, index });
                out.extend(store);
            }
            HardwareIndexedStore { reg, index, src } => {
                let index = self.load_use(index, out);
                let src = self.load_use(src, out);
                out.push(HardwareIndexedStore { reg: *reg, index, src });
            }
            HardwareMemCpy { dst_reg, src_label } => {
                out.push(HardwareMemCpy { dst_reg: *dst_reg, src_label: *src_label });
            }
            IncBin { label, path } => out.push(IncBin { label: *label, path: path.clone() }),
            ChangeSP(n) => out.push(ChangeSP(*n)),
        }
    }

    /// Call arguments are staged through dedicated scratch slots before
    /// being loaded into the fixed `b, c, d, e` argument registers, which
    /// sidesteps any aliasing between an argument's current register and
    /// another argument's target register.
    fn rewrite_call(&mut self, proc: &Id, args: &[Id], dst: &Option<Id>, out: &mut Vec<Instruction>) {
        let mut staged = vec![];
        for arg in args {
            let value = self.load_use(arg, out);
            let slot = self.fresh_slot();
            out.push(Instruction::Store { addr: spill_addr(slot), src: value });
            staged.push(slot);
            self.scratch_taken.clear();
        }
        let arg_regs = ["b", "c", "d", "e"];
        let mut loaded = vec![];
        for (i, slot) in staged.iter().enumerate() {
            let reg = Id::from(arg_regs[i].to_string());
            out.push(Instruction::Load { dst: reg, addr: spill_addr(*slot) });
            loaded.push(reg);
        }
        let (dst, store) = match dst {
            Some(d) => {
                let (reg, store) = self.def_target(d);
                (Some(reg), store)
            }
            None => (None, None),
        };
        out.push(Instruction::Call { proc: *proc, args: loaded, dst });
        out.extend(store);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Id, Map};
    use crate::front::ast::BinOp;
    use crate::middle::ir::Instruction::*;

    fn id(s: &str) -> Id {
        Id::from(s.to_string())
    }

    #[test]
    fn no_spills_means_no_prologue() {
        let proc = Procedure {
            params: vec![],
            returns_value: false,
            instructions: vec![Constant { dst: id("t0"), value: 1 }, Return(Some(id("t0")))],
        };
        let mut locations = Map::new();
        locations.insert(id("t0"), Location::Register("b"));
        let alloc = Allocation { locations, spill_count: 0 };
        let rewritten = rewrite(&proc, &alloc);
        assert!(!rewritten.instructions.iter().any(|i| matches!(i, ChangeSP(_))));
    }

    #[test]
    fn a_spilled_variable_is_loaded_into_scratch_before_use() {
        let proc = Procedure {
            params: vec![],
            returns_value: false,
            instructions: vec![
                Constant { dst: id("t0"), value: 5 },
                BinaryOp { op: BinOp::Add, dst: id("t1"), lhs: id("t0"), rhs: id("t0") },
                Return(Some(id("t1"))),
            ],
        };
        let mut locations = Map::new();
        locations.insert(id("t0"), Location::Spill(0));
        locations.insert(id("t1"), Location::Register("b"));
        let alloc = Allocation { locations, spill_count: 1 };
        let rewritten = rewrite(&proc, &alloc);
        assert!(matches!(rewritten.instructions[0], ChangeSP(n) if n < 0));
        assert!(rewritten.instructions.iter().any(|i| matches!(i, Load { .. })));
    }

    #[test]
    fn a_global_is_loaded_and_stored_by_its_own_name_not_a_spill_slot() {
        let proc = Procedure {
            params: vec![],
            returns_value: false,
            instructions: vec![
                Constant { dst: id("t0"), value: 1 },
                BinaryOp { op: BinOp::Add, dst: id("score"), lhs: id("score"), rhs: id("t0") },
                Return(None),
            ],
        };
        let mut locations = Map::new();
        locations.insert(id("t0"), Location::Register("b"));
        locations.insert(id("score"), Location::Global(id("score")));
        let alloc = Allocation { locations, spill_count: 0 };
        let rewritten = rewrite(&proc, &alloc);
        assert!(rewritten
            .instructions
            .iter()
            .any(|i| matches!(i, Load { addr, .. } if *addr == id("score"))));
        assert!(rewritten
            .instructions
            .iter()
            .any(|i| matches!(i, Store { addr, .. } if *addr == id("score"))));
        assert!(!rewritten.instructions.iter().any(|i| matches!(i, ChangeSP(_))));
    }

    #[test]
    fn a_staged_right_operand_never_lands_in_the_accumulator() {
        // `lhs` is already in a register; only `rhs` needs staging. Since
        // codegen always loads its left operand into `a` right before
        // operating, staging `rhs` into `a` too would have the left load
        // clobber it before the operation ever runs.
        let proc = Procedure {
            params: vec![],
            returns_value: false,
            instructions: vec![BinaryOp { op: BinOp::Add, dst: id("x"), lhs: id("lhs"), rhs: id("score") }],
        };
        let mut locations = Map::new();
        locations.insert(id("lhs"), Location::Register("b"));
        locations.insert(id("score"), Location::Global(id("score")));
        locations.insert(id("x"), Location::Register("c"));
        let alloc = Allocation { locations, spill_count: 0 };
        let rewritten = rewrite(&proc, &alloc);
        let binop = rewritten.instructions.iter().find_map(|i| match i {
            BinaryOp { lhs, rhs, .. } => Some((*lhs, *rhs)),
            _ => None,
        });
        assert_eq!(binop, Some((id("b"), id("h"))));
    }

    #[test]
    fn call_arguments_land_in_the_fixed_registers() {
        let proc = Procedure {
            params: vec![],
            returns_value: false,
            instructions: vec![Call { proc: id("Add"), args: vec![id("x"), id("y")], dst: None }],
        };
        let mut locations = Map::new();
        locations.insert(id("x"), Location::Register("h"));
        locations.insert(id("y"), Location::Register("l"));
        let alloc = Allocation { locations, spill_count: 0 };
        let rewritten = rewrite(&proc, &alloc);
        let call = rewritten.instructions.iter().find_map(|i| match i {
            Call { args, .. } => Some(args.clone()),
            _ => None,
        });
        assert_eq!(call, Some(vec![id("b"), id("c")]));
    }
}
