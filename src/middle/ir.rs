//! The intermediate representation: a flat, three-address instruction set
//! with dedicated hardware-access opcodes.
//!
//! Grounded on `original_source/src/IRProgram.py` (the `IRInstruction`
//! hierarchy and `IRProgram`'s pretty-printed `__str__`).

use crate::common::{Id, Map};
use crate::front::ast::{BinOp, UnOp};

/// First work-RAM address handed out to user globals.
pub const GLOBALS_BASE: u16 = 0xC000;
/// Bytes reserved per global (every Penguin scalar/list head is one word).
pub const GLOBAL_SIZE: u16 = 2;

#[derive(Clone, Debug)]
pub enum Instruction {
    BinaryOp { op: BinOp, dst: Id, lhs: Id, rhs: Id },
    UnaryOp { op: UnOp, dst: Id, src: Id },
    Assign { dst: Id, src: Id },
    Constant { dst: Id, value: i64 },
    Load { dst: Id, addr: Id },
    Store { addr: Id, src: Id },
    IndexedLoad { dst: Id, base: Id, index: Id },
    IndexedStore { base: Id, index: Id, src: Id },
    Label(Id),
    Jump(Id),
    CondJump { cond: Id, if_true: Id, if_false: Id },
    Call { proc: Id, args: Vec<Id>, dst: Option<Id> },
    Return(Option<Id>),
    ArgLoad { dst: Id, index: usize },
    HardwareLoad { dst: Id, reg: Id },
    HardwareStore { reg: Id, src: Id },
    HardwareIndexedLoad { dst: Id, reg: Id, index: Id },
    HardwareIndexedStore { reg: Id, index: Id, src: Id },
    HardwareMemCpy { dst_reg: Id, src_label: Id },
    IncBin { label: Id, path: String },
    ChangeSP(i32),
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instruction::BinaryOp { op, dst, lhs, rhs } => write!(f, "{dst} = {lhs} {op:?} {rhs}"),
            Instruction::UnaryOp { op, dst, src } => write!(f, "{dst} = {op:?} {src}"),
            Instruction::Assign { dst, src } => write!(f, "{dst} = {src}"),
            Instruction::Constant { dst, value } => write!(f, "{dst} = {value}"),
            Instruction::Load { dst, addr } => write!(f, "{dst} = load {addr}"),
            Instruction::Store { addr, src } => write!(f, "store {addr}, {src}"),
            Instruction::IndexedLoad { dst, base, index } => write!(f, "{dst} = {base}[{index}]"),
            Instruction::IndexedStore { base, index, src } => write!(f, "{base}[{index}] = {src}"),
            Instruction::Label(l) => write!(f, "{l}:"),
            Instruction::Jump(l) => write!(f, "jump {l}"),
            Instruction::CondJump { cond, if_true, if_false } => {
                write!(f, "if {cond} jump {if_true} else {if_false}")
            }
            Instruction::Call { proc, args, dst } => {
                let arg_list = args.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ");
                match dst {
                    Some(d) => write!(f, "{d} = call {proc}({arg_list})"),
                    None => write!(f, "call {proc}({arg_list})"),
                }
            }
            Instruction::Return(value) => match value {
                Some(v) => write!(f, "return {v}"),
                None => write!(f, "return"),
            },
            Instruction::ArgLoad { dst, index } => write!(f, "{dst} = arg {index}"),
            Instruction::HardwareLoad { dst, reg } => write!(f, "{dst} = hw.load {reg}"),
            Instruction::HardwareStore { reg, src } => write!(f, "hw.store {reg}, {src}"),
            Instruction::HardwareIndexedLoad { dst, reg, index } => {
                write!(f, "{dst} = hw.load {reg}[{index}]")
            }
            Instruction::HardwareIndexedStore { reg, index, src } => {
                write!(f, "hw.store {reg}[{index}], {src}")
            }
            Instruction::HardwareMemCpy { dst_reg, src_label } => {
                write!(f, "hw.memcpy {dst_reg} <- {src_label}")
            }
            Instruction::IncBin { label, path } => write!(f, "incbin {label} \"{path}\""),
            Instruction::ChangeSP(n) => write!(f, "sp += {n}"),
        }
    }
}

impl Instruction {
    /// Every variable name this instruction reads, in evaluation order.
    /// Numeric/label operands are never included. Grounded on
    /// `LivenessAnalyzer.py::_analyze_instr_def_use`.
    pub fn uses(&self) -> Vec<Id> {
        use Instruction::*;
        match self {
            BinaryOp { lhs, rhs, .. } => vec![*lhs, *rhs],
            UnaryOp { src, .. } => vec![*src],
            Assign { src, .. } => vec![*src],
            Constant { .. } => vec![],
            Load { addr, .. } => vec![*addr],
            Store { addr, src } => vec![*addr, *src],
            // `base` names the array/list itself, resolved directly to a
            // fixed address by codegen (global lookup), never loaded as a
            // value — consistent with how the hardware-indexed variants
            // below exclude their own `reg` field.
            IndexedLoad { index, .. } => vec![*index],
            IndexedStore { index, src, .. } => vec![*index, *src],
            Label(_) | Jump(_) => vec![],
            CondJump { cond, .. } => vec![*cond],
            Call { args, .. } => args.clone(),
            Return(value) => value.iter().copied().collect(),
            ArgLoad { .. } => vec![],
            HardwareLoad { .. } => vec![],
            HardwareStore { src, .. } => vec![*src],
            HardwareIndexedLoad { index, .. } => vec![*index],
            HardwareIndexedStore { index, src, .. } => vec![*index, *src],
            HardwareMemCpy { .. } => vec![],
            IncBin { .. } => vec![],
            ChangeSP(_) => vec![],
        }
    }

    /// The single variable this instruction defines, if any.
    pub fn def(&self) -> Option<Id> {
        use Instruction::*;
        match self {
            BinaryOp { dst, .. }
            | UnaryOp { dst, .. }
            | Assign { dst, .. }
            | Constant { dst, .. }
            | Load { dst, .. }
            | IndexedLoad { dst, .. }
            | ArgLoad { dst, .. }
            | HardwareLoad { dst, .. }
            | HardwareIndexedLoad { dst, .. } => Some(*dst),
            Call { dst, .. } => *dst,
            _ => None,
        }
    }

    pub fn is_label(&self) -> bool {
        matches!(self, Instruction::Label(_))
    }

    /// Jump targets this instruction can transfer control to, as label
    /// names (resolved to indices by the CFG builder).
    pub fn targets(&self) -> Vec<Id> {
        match self {
            Instruction::Jump(l) => vec![*l],
            Instruction::CondJump { if_true, if_false, .. } => vec![*if_true, *if_false],
            _ => vec![],
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(self, Instruction::Jump(_) | Instruction::CondJump { .. } | Instruction::Return(_))
    }
}

#[derive(Clone, Debug)]
pub struct Procedure {
    pub params: Vec<Id>,
    pub returns_value: bool,
    pub instructions: Vec<Instruction>,
}

#[derive(Clone, Debug, Default)]
pub struct Program {
    pub main: Vec<Instruction>,
    pub procedures: Map<Id, Procedure>,
    /// User global name -> work-RAM address, assigned in declaration order.
    pub globals: Map<Id, u16>,
}

impl Program {
    pub fn new() -> Self {
        Program::default()
    }

    pub fn dump(&self) -> String {
        let mut out = String::new();
        out.push_str("// Globals\n");
        for (name, addr) in &self.globals {
            out.push_str(&format!("{name} @ {addr:#06x}\n"));
        }
        out.push_str("\n// Main\n");
        for insn in &self.main {
            out.push_str(&format!("{insn}\n"));
        }
        for (name, proc) in &self.procedures {
            out.push_str(&format!("\n// Procedure {name}\n"));
            for insn in &proc.instructions {
                out.push_str(&format!("{insn}\n"));
            }
        }
        out
    }
}
