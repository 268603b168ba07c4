//! AST -> IR generator. Runs after `front::check` has annotated every
//! expression with its resolved type and handed back the procedure table;
//! lowering itself only needs names, not types, since the language's
//! closed type set was already enforced by the checker.
//!
//! Grounded on `original_source/src/IRProgram.py::IRGenerator`.

use crate::common::{Id, Map};
use crate::error::{CompileError, Result};
use crate::front::ast::{Call, Expr, Init, LValue, Program as AstProgram, Stmt};
use crate::front::check::canonical_callee_name;
use crate::front::env::ProcedureEnv;
use crate::front::hardware;
use crate::front::types::Type;
use crate::middle::ir::{self, Instruction, Procedure, Program};

pub fn lower(program: &AstProgram, procs: &ProcedureEnv) -> Result<Program> {
    let mut lowerer = Lowerer::new(procs);
    lowerer.lower_program(program)?;
    Ok(lowerer.program)
}

fn internal(detail: impl Into<String>) -> CompileError {
    CompileError::Internal { detail: detail.into() }
}

struct Lowerer<'a> {
    procs: &'a ProcedureEnv,
    program: Program,
    current_proc: Option<Id>,
    next_temp: usize,
    next_label: usize,
    next_global_addr: u16,
    /// Variable names that were initialised from a binary-asset literal,
    /// mapped to the `IncBin` label holding the asset. Reading one of these
    /// names as the source of a hardware store becomes a `HardwareMemCpy`
    /// instead of a plain load/store pair.
    assets: Map<Id, Id>,
}

impl<'a> Lowerer<'a> {
    fn new(procs: &'a ProcedureEnv) -> Self {
        Lowerer {
            procs,
            program: Program::new(),
            current_proc: None,
            next_temp: 0,
            next_label: 0,
            next_global_addr: ir::GLOBALS_BASE,
            assets: Map::new(),
        }
    }

    fn new_temp(&mut self) -> Id {
        let n = self.next_temp;
        self.next_temp += 1;
        Id::from(format!("t{n}"))
    }

    fn new_label(&mut self) -> Id {
        self.new_label_named("L")
    }

    fn new_label_named(&mut self, prefix: &str) -> Id {
        let n = self.next_label;
        self.next_label += 1;
        Id::from(format!("{prefix}{n}"))
    }

    fn emit(&mut self, insn: Instruction) {
        match self.current_proc {
            Some(name) => self.program.procedures.get_mut(&name).expect("procedure pre-registered").instructions.push(insn),
            None => self.program.main.push(insn),
        }
    }

    fn lower_program(&mut self, ast: &AstProgram) -> Result<()> {
        // Pre-pass: every top-level procedure gets an empty shell (so
        // forward/self/mutually-recursive calls have somewhere to lower
        // into) and every top-level non-asset declaration gets a work-RAM
        // address, both before any statement is actually lowered.
        for stmt in &ast.stmts {
            match stmt {
                Stmt::ProcDef { name, params, ret, .. } => {
                    // The calling convention only has four argument
                    // registers (`b, c, d, e`); a fifth parameter would
                    // never be loaded by a caller and is a checker/grammar
                    // inconsistency, not something a real program can hit.
                    if params.len() > 4 {
                        return Err(internal(format!(
                            "procedure '{name}' has {} parameters, but the calling convention only supports 4",
                            params.len()
                        )));
                    }
                    self.program.procedures.insert(
                        *name,
                        Procedure {
                            params: params.iter().map(|(_, n)| *n).collect(),
                            returns_value: *ret != Type::Void,
                            instructions: vec![],
                        },
                    );
                }
                Stmt::Decl { ty, name, init, .. } if !ty.is_binary_asset() => {
                    // An `oamentry` needs one byte per attribute (x, y,
                    // tile); a `list<int>` needs one byte per element;
                    // every other storable type is a single word.
                    let size = match (ty, init) {
                        (Type::OamEntry, _) => 3,
                        (Type::ListInt, Some(Init::List(elems))) => elems.len().max(1) as u16,
                        (Type::ListInt, _) => ir::GLOBAL_SIZE,
                        _ => ir::GLOBAL_SIZE,
                    };
                    let addr = self.next_global_addr;
                    self.next_global_addr += size;
                    self.program.globals.insert(*name, addr);
                }
                _ => {}
            }
        }

        for stmt in &ast.stmts {
            self.lower_stmt(stmt)?;
        }
        Ok(())
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Decl { ty, name, init, .. } => self.lower_decl(*ty, *name, init),
            Stmt::Assign { target, value, .. } => self.lower_assign(target, value),
            Stmt::If { cond, then_body, else_body, .. } => self.lower_if(cond, then_body, else_body),
            Stmt::Loop { cond, body, .. } => self.lower_loop(cond, body),
            Stmt::Return { value, .. } => self.lower_return(value),
            Stmt::ProcDef { name, body, .. } => self.lower_proc_def(*name, body),
            Stmt::Call { call, .. } => self.lower_call(call).map(|_| ()),
        }
    }

    fn lower_decl(&mut self, ty: Type, name: Id, init: &Option<Init>) -> Result<()> {
        match init {
            None => Ok(()),
            Some(Init::List(elems)) => {
                for (i, elem) in elems.iter().enumerate() {
                    let v = self.lower_expr(elem)?;
                    self.emit(Instruction::IndexedStore { base: name, index: Id::from(i.to_string()), src: v });
                }
                Ok(())
            }
            Some(Init::Expr(e)) => {
                if ty.is_binary_asset() {
                    let Expr::Str(path, _) = e else {
                        return Err(internal("binary-asset initialiser must be a string literal"));
                    };
                    let label = self.new_label_named("Asset");
                    self.emit(Instruction::IncBin { label, path: path.clone() });
                    self.assets.insert(name, label);
                    Ok(())
                } else {
                    let v = self.lower_expr(e)?;
                    self.emit(Instruction::Assign { dst: name, src: v });
                    Ok(())
                }
            }
        }
    }

    fn lower_assign(&mut self, target: &LValue, value: &Expr) -> Result<()> {
        // Loading a whole binary asset into a hardware destination is a
        // single block copy, not a scalar load/store.
        if let (LValue::Var(target_name), Expr::Var(value_name, _)) = (target, value) {
            if hardware::is_hardware_symbol(target_name.as_str()) {
                if let Some(label) = self.assets.get(value_name).copied() {
                    self.emit(Instruction::HardwareMemCpy { dst_reg: *target_name, src_label: label });
                    return Ok(());
                }
            }
        }
        let v = self.lower_expr(value)?;
        self.store_lvalue(target, v)
    }

    fn store_lvalue(&mut self, target: &LValue, value: Id) -> Result<()> {
        match target {
            LValue::Var(name) => {
                if hardware::is_hardware_symbol(name.as_str()) {
                    self.emit(Instruction::HardwareStore { reg: *name, src: value });
                } else {
                    self.emit(Instruction::Assign { dst: *name, src: value });
                }
                Ok(())
            }
            LValue::Index(base, idx) => {
                let idx_v = self.lower_expr(idx)?;
                let base_name = lvalue_root(base)?;
                if hardware::is_hardware_symbol(base_name.as_str()) {
                    self.emit(Instruction::HardwareIndexedStore { reg: base_name, index: idx_v, src: value });
                } else {
                    self.emit(Instruction::IndexedStore { base: base_name, index: idx_v, src: value });
                }
                Ok(())
            }
            LValue::Attr(base, attr) => {
                let base_name = lvalue_root(base)?;
                let addr = Id::from(format!("{base_name}.{attr}"));
                self.emit(Instruction::Store { addr, src: value });
                Ok(())
            }
        }
    }

    fn lower_expr(&mut self, expr: &Expr) -> Result<Id> {
        match expr {
            Expr::Int(v, _) => {
                let t = self.new_temp();
                self.emit(Instruction::Constant { dst: t, value: *v });
                Ok(t)
            }
            Expr::Str(_, _) => Err(internal("string literal used outside a binary-asset initialiser")),
            Expr::Var(name, _) => {
                if hardware::is_hardware_symbol(name.as_str()) {
                    let t = self.new_temp();
                    self.emit(Instruction::HardwareLoad { dst: t, reg: *name });
                    Ok(t)
                } else {
                    Ok(*name)
                }
            }
            Expr::Index(base, idx, _) => {
                let idx_v = self.lower_expr(idx)?;
                let base_name = expr_root(base)?;
                let t = self.new_temp();
                if hardware::is_hardware_symbol(base_name.as_str()) {
                    self.emit(Instruction::HardwareIndexedLoad { dst: t, reg: base_name, index: idx_v });
                } else {
                    self.emit(Instruction::IndexedLoad { dst: t, base: base_name, index: idx_v });
                }
                Ok(t)
            }
            Expr::Attr(base, attr, _) => {
                let base_name = expr_root(base)?;
                let addr = Id::from(format!("{base_name}.{attr}"));
                let t = self.new_temp();
                self.emit(Instruction::Load { dst: t, addr });
                Ok(t)
            }
            Expr::Unary(op, operand, _) => {
                let v = self.lower_expr(operand)?;
                let t = self.new_temp();
                self.emit(Instruction::UnaryOp { op: *op, dst: t, src: v });
                Ok(t)
            }
            Expr::Binary(op, lhs, rhs, _) => {
                let lv = self.lower_expr(lhs)?;
                let rv = self.lower_expr(rhs)?;
                let t = self.new_temp();
                self.emit(Instruction::BinaryOp { op: *op, dst: t, lhs: lv, rhs: rv });
                Ok(t)
            }
            Expr::Call(call, _) => {
                self.lower_call(call)?.ok_or_else(|| internal("void procedure call used as an expression"))
            }
        }
    }

    fn lower_call(&mut self, call: &Call) -> Result<Option<Id>> {
        let name = canonical_callee_name(&call.callee);
        let mut args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            args.push(self.lower_expr(arg)?);
        }
        let entry = self.procs.get(name).ok_or(CompileError::UndeclaredProcedure { name })?;
        if entry.ret == Type::Void {
            self.emit(Instruction::Call { proc: name, args, dst: None });
            Ok(None)
        } else {
            let t = self.new_temp();
            self.emit(Instruction::Call { proc: name, args, dst: Some(t) });
            Ok(Some(t))
        }
    }

    fn lower_if(&mut self, cond: &Expr, then_body: &[Stmt], else_body: &[Stmt]) -> Result<()> {
        let cond_v = self.lower_expr(cond)?;
        let true_l = self.new_label();
        let end_l = self.new_label();
        if else_body.is_empty() {
            self.emit(Instruction::CondJump { cond: cond_v, if_true: true_l, if_false: end_l });
            self.emit(Instruction::Label(true_l));
            for s in then_body {
                self.lower_stmt(s)?;
            }
            self.emit(Instruction::Label(end_l));
        } else {
            let false_l = self.new_label();
            self.emit(Instruction::CondJump { cond: cond_v, if_true: true_l, if_false: false_l });
            self.emit(Instruction::Label(true_l));
            for s in then_body {
                self.lower_stmt(s)?;
            }
            self.emit(Instruction::Jump(end_l));
            self.emit(Instruction::Label(false_l));
            for s in else_body {
                self.lower_stmt(s)?;
            }
            self.emit(Instruction::Label(end_l));
        }
        Ok(())
    }

    fn lower_loop(&mut self, cond: &Expr, body: &[Stmt]) -> Result<()> {
        let head_l = self.new_label();
        let body_l = self.new_label();
        let end_l = self.new_label();
        self.emit(Instruction::Label(head_l));
        let cond_v = self.lower_expr(cond)?;
        self.emit(Instruction::CondJump { cond: cond_v, if_true: body_l, if_false: end_l });
        self.emit(Instruction::Label(body_l));
        for s in body {
            self.lower_stmt(s)?;
        }
        self.emit(Instruction::Jump(head_l));
        self.emit(Instruction::Label(end_l));
        Ok(())
    }

    fn lower_return(&mut self, value: &Option<Expr>) -> Result<()> {
        let v = match value {
            Some(e) => Some(self.lower_expr(e)?),
            None => None,
        };
        self.emit(Instruction::Return(v));
        Ok(())
    }

    fn lower_proc_def(&mut self, name: Id, body: &[Stmt]) -> Result<()> {
        let saved = self.current_proc.replace(name);
        let params = self.program.procedures.get(&name).expect("procedure pre-registered").params.clone();
        for (i, p) in params.iter().enumerate() {
            self.emit(Instruction::ArgLoad { dst: *p, index: i });
        }
        for s in body {
            self.lower_stmt(s)?;
        }
        self.current_proc = saved;
        Ok(())
    }
}

/// Walks an lvalue chain down to the variable it roots at. Indexing and
/// attribute access never nest past one level in this language, but the
/// recursion costs nothing and keeps the assumption explicit.
fn lvalue_root(lvalue: &LValue) -> Result<Id> {
    match lvalue {
        LValue::Var(name) => Ok(*name),
        LValue::Index(base, _) => lvalue_root(base),
        LValue::Attr(base, _) => lvalue_root(base),
    }
}

fn expr_root(expr: &Expr) -> Result<Id> {
    match expr {
        Expr::Var(name, _) => Ok(*name),
        Expr::Index(base, _, _) => expr_root(base),
        Expr::Attr(base, _, _) => expr_root(base),
        _ => Err(internal("indexed/attribute base did not resolve to a variable")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::{check, parse};

    fn lower_source(src: &str) -> Program {
        let ast = parse(src).expect("parse");
        let procs = check(&ast).expect("check");
        lower(&ast, &procs).expect("lower")
    }

    #[test]
    fn declares_a_global_with_an_address() {
        let ir = lower_source("int score = 0;");
        let name = Id::from("score".to_string());
        assert_eq!(ir.globals.get(&name), Some(&ir::GLOBALS_BASE));
        assert!(matches!(ir.main[0], Instruction::Constant { .. }));
        assert!(matches!(ir.main[1], Instruction::Assign { .. }));
    }

    #[test]
    fn two_globals_get_distinct_addresses() {
        let ir = lower_source("int a = 1; int b = 2;");
        let a = ir.globals.get(&Id::from("a".to_string())).copied().unwrap();
        let b = ir.globals.get(&Id::from("b".to_string())).copied().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn procedure_call_without_return_has_no_dst() {
        let ir = lower_source("procedure Noop() { return; } Noop();");
        let found = ir.main.iter().any(|i| matches!(i, Instruction::Call { dst: None, .. }));
        assert!(found);
    }

    #[test]
    fn procedure_call_with_return_gets_a_temp() {
        let ir = lower_source("procedure int One() { return 1; } int x = One();");
        let found = ir.main.iter().any(|i| matches!(i, Instruction::Call { dst: Some(_), .. }));
        assert!(found);
    }

    #[test]
    fn a_fifth_parameter_is_rejected_before_register_allocation_ever_runs() {
        let ast = parse("procedure Five(int a, int b, int c, int d, int e) { return; }").expect("parse");
        let procs = check(&ast).expect("check");
        assert!(lower(&ast, &procs).is_err());
    }

    #[test]
    fn hardware_dotted_call_canonicalises() {
        let ir = lower_source("control.LCDon();");
        let found = ir.main.iter().any(|i| matches!(i, Instruction::Call { proc, .. } if proc.as_str() == "control_LCDon"));
        assert!(found);
    }

    #[test]
    fn loop_emits_head_body_and_end_labels() {
        let ir = lower_source("int i = 0; loop (i < 10) { i := i + 1; }");
        let labels = ir.main.iter().filter(|i| i.is_label()).count();
        assert_eq!(labels, 3);
    }

    #[test]
    fn if_without_else_emits_two_labels() {
        let ir = lower_source("int i = 0; if (i == 0) { i := 1; }");
        let labels = ir.main.iter().filter(|i| i.is_label()).count();
        assert_eq!(labels, 2);
    }

    #[test]
    fn tileset_declaration_emits_incbin_not_a_global() {
        let ir = lower_source(r#"tileset t = "tiles.2bpp";"#);
        assert!(ir.globals.get(&Id::from("t".to_string())).is_none());
        assert!(ir.main.iter().any(|i| matches!(i, Instruction::IncBin { .. })));
    }

    #[test]
    fn loading_tileset_into_hardware_emits_memcpy() {
        let ir = lower_source(
            r#"tileset t = "tiles.2bpp"; display_tileset_block_0 := t;"#,
        );
        assert!(ir.main.iter().any(|i| matches!(i, Instruction::HardwareMemCpy { .. })));
    }

    #[test]
    fn assigning_to_hardware_list_element_emits_hardware_indexed_store() {
        let ir = lower_source("display_oam_x[0] := 10;");
        assert!(ir.main.iter().any(|i| matches!(i, Instruction::HardwareIndexedStore { .. })));
    }

    #[test]
    fn reading_hardware_scalar_emits_hardware_load() {
        let ir = lower_source("int r = input_A;");
        assert!(ir.main.iter().any(|i| matches!(i, Instruction::HardwareLoad { .. })));
    }

    #[test]
    fn procedure_params_get_arg_loads() {
        let ir = lower_source("procedure int Add(int a, int b) { return a + b; }");
        let name = Id::from("Add".to_string());
        let proc = ir.procedures.get(&name).unwrap();
        let arg_loads = proc.instructions.iter().filter(|i| matches!(i, Instruction::ArgLoad { .. })).count();
        assert_eq!(arg_loads, 2);
    }
}
