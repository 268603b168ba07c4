//! Type and scope checking. Walks the AST once, annotating every
//! expression node with its resolved type in place (`Expr::set_resolved_ty`)
//! and rejecting any program that violates the rules below.
//!
//! Grounded on `original_source/src/astTypeChecker.py`.

use crate::common::Id;
use crate::error::{CompileError, Result};
use crate::front::ast::*;
use crate::front::env::{ProcEntry, ProcedureEnv, TypeEnv};
use crate::front::hardware;
use crate::front::types::Type;

pub fn check(program: &Program) -> Result<ProcedureEnv> {
    let mut proc_env = ProcedureEnv::new();
    for (name, sig) in hardware::hardware_procedures() {
        let id = Id::from(name.to_string());
        let params = sig.params.into_iter().map(|t| (t, Id::from(String::new()))).collect();
        proc_env.define(id, ProcEntry { params, ret: sig.ret });
    }

    // Pre-pass: register every top-level procedure header before checking
    // any body, so forward calls resolve.
    for stmt in &program.stmts {
        if let Stmt::ProcDef { name, params, ret, .. } = stmt {
            if proc_env.contains(*name) {
                return Err(CompileError::DuplicateDeclaration { name: *name });
            }
            proc_env.define(*name, ProcEntry { params: params.clone(), ret: *ret });
        }
    }

    let mut type_env = TypeEnv::new();
    for (name, ty) in hardware::hardware_symbols() {
        type_env.define(Id::from(name.to_string()), ty);
    }

    let mut checker = Checker { type_env, proc_env, current_return: None };
    for stmt in &program.stmts {
        checker.check_stmt(stmt)?;
    }
    Ok(checker.proc_env)
}

struct Checker {
    type_env: TypeEnv,
    proc_env: ProcedureEnv,
    current_return: Option<Type>,
}

impl Checker {
    fn check_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Decl { ty, name, init, .. } => self.check_decl(*ty, *name, init),
            Stmt::Assign { target, value, .. } => self.check_assign(target, value),
            Stmt::If { cond, then_body, else_body, .. } => {
                self.expect_int(cond, "if condition")?;
                self.check_block(then_body)?;
                self.check_block(else_body)
            }
            Stmt::Loop { cond, body, .. } => {
                self.expect_int(cond, "loop condition")?;
                self.check_block(body)
            }
            Stmt::Return { value, .. } => self.check_return(value),
            Stmt::ProcDef { name: _, params, ret, body, .. } => self.check_proc_def(params, *ret, body),
            Stmt::Call { call, .. } => self.check_call(call).map(|_| ()),
        }
    }

    fn check_block(&mut self, stmts: &[Stmt]) -> Result<()> {
        self.type_env.push();
        let result = stmts.iter().try_for_each(|s| self.check_stmt(s));
        self.type_env.pop();
        result
    }

    fn check_decl(&mut self, ty: Type, name: Id, init: &Option<Init>) -> Result<()> {
        if self.type_env.declared_in_current_scope(name) {
            return Err(CompileError::DuplicateDeclaration { name });
        }
        match init {
            Some(Init::Expr(e)) => {
                let value_ty = self.check_expr(e)?;
                if !ty.accepts_init(value_ty) {
                    return Err(CompileError::TypeMismatch {
                        context: format!("initialisation of '{name}'"),
                        expected: ty,
                        found: value_ty,
                    });
                }
            }
            Some(Init::List(elems)) => {
                if ty != Type::ListInt {
                    return Err(CompileError::TypeMismatch {
                        context: format!("initialisation of '{name}'"),
                        expected: ty,
                        found: Type::ListInt,
                    });
                }
                for elem in elems {
                    self.expect_int(elem, "list element")?;
                }
            }
            None => {}
        }
        self.type_env.define(name, ty);
        Ok(())
    }

    fn check_assign(&mut self, target: &LValue, value: &Expr) -> Result<()> {
        let target_ty = self.check_lvalue(target)?;
        if let LValue::Var(name) = target {
            if target_ty.is_binary_asset() && !hardware::is_hardware_symbol(name.as_str()) {
                return Err(CompileError::TypeMismatch {
                    context: "reassignment of a binary-asset variable".to_string(),
                    expected: target_ty,
                    found: target_ty,
                });
            }
        }
        let value_ty = self.check_expr(value)?;
        if target_ty != value_ty {
            return Err(CompileError::TypeMismatch {
                context: "assignment".to_string(),
                expected: target_ty,
                found: value_ty,
            });
        }
        Ok(())
    }

    fn check_return(&mut self, value: &Option<Expr>) -> Result<()> {
        let Some(ret_ty) = self.current_return else {
            return Err(CompileError::ReturnOutsideProcedure);
        };
        match value {
            Some(e) => {
                let found = self.check_expr(e)?;
                if found != ret_ty {
                    return Err(CompileError::TypeMismatch {
                        context: "return value".to_string(),
                        expected: ret_ty,
                        found,
                    });
                }
            }
            None if ret_ty != Type::Void => {
                return Err(CompileError::TypeMismatch {
                    context: "return value".to_string(),
                    expected: ret_ty,
                    found: Type::Void,
                });
            }
            None => {}
        }
        Ok(())
    }

    fn check_proc_def(&mut self, params: &[(Type, Id)], ret: Type, body: &[Stmt]) -> Result<()> {
        self.type_env.push();
        for (ty, name) in params {
            self.type_env.define(*name, *ty);
        }
        let saved_return = self.current_return.replace(ret);
        let result = body.iter().try_for_each(|s| self.check_stmt(s));
        self.current_return = saved_return;
        self.type_env.pop();
        result
    }

    fn check_call(&mut self, call: &Call) -> Result<Type> {
        let name = canonical_callee_name(&call.callee);
        let Some(entry) = self.proc_env.get(name).cloned() else {
            return Err(CompileError::UndeclaredProcedure { name });
        };
        if entry.params.len() != call.args.len() {
            return Err(CompileError::ArgCountMismatch {
                name,
                expected: entry.params.len(),
                found: call.args.len(),
            });
        }
        for ((param_ty, _), arg) in entry.params.iter().zip(&call.args) {
            let arg_ty = self.check_expr(arg)?;
            if *param_ty != arg_ty {
                return Err(CompileError::TypeMismatch {
                    context: format!("argument to '{name}'"),
                    expected: *param_ty,
                    found: arg_ty,
                });
            }
        }
        Ok(entry.ret)
    }

    fn check_lvalue(&mut self, lvalue: &LValue) -> Result<Type> {
        match lvalue {
            LValue::Var(name) => {
                self.type_env.lookup(*name).ok_or(CompileError::UndeclaredVariable { name: *name })
            }
            LValue::Index(base, idx) => {
                let base_ty = self.check_lvalue(base)?;
                self.expect_int(idx, "index")?;
                base_ty.index_result().ok_or(CompileError::TypeMismatch {
                    context: "indexing".to_string(),
                    expected: Type::ListInt,
                    found: base_ty,
                })
            }
            LValue::Attr(base, attr) => {
                let base_ty = self.check_lvalue(base)?;
                base_ty
                    .attr_type(attr.as_str())
                    .ok_or(CompileError::InvalidAttribute { ty: base_ty, attr: *attr })
            }
        }
    }

    fn expect_int(&mut self, expr: &Expr, context: &str) -> Result<()> {
        let ty = self.check_expr(expr)?;
        if ty != Type::Int {
            return Err(CompileError::TypeMismatch { context: context.to_string(), expected: Type::Int, found: ty });
        }
        Ok(())
    }

    fn check_expr(&mut self, expr: &Expr) -> Result<Type> {
        let ty = match expr {
            Expr::Int(_, _) => Type::Int,
            Expr::Str(_, _) => Type::String,
            Expr::Var(name, _) => {
                self.type_env.lookup(*name).ok_or(CompileError::UndeclaredVariable { name: *name })?
            }
            Expr::Index(base, idx, _) => {
                let base_ty = self.check_expr(base)?;
                self.expect_int(idx, "index")?;
                base_ty.index_result().ok_or(CompileError::TypeMismatch {
                    context: "indexing".to_string(),
                    expected: Type::ListInt,
                    found: base_ty,
                })?
            }
            Expr::Attr(base, attr, _) => {
                let base_ty = self.check_expr(base)?;
                base_ty
                    .attr_type(attr.as_str())
                    .ok_or(CompileError::InvalidAttribute { ty: base_ty, attr: *attr })?
            }
            Expr::Unary(_, operand, _) => {
                self.expect_int(operand, "unary operand")?;
                Type::Int
            }
            Expr::Binary(_, lhs, rhs, _) => {
                self.expect_int(lhs, "binary operand")?;
                self.expect_int(rhs, "binary operand")?;
                Type::Int
            }
            Expr::Call(call, _) => self.check_call(call)?,
        };
        expr.set_resolved_ty(ty);
        Ok(ty)
    }
}

/// Flattens a callee into the single name under which it is looked up:
/// `Add(...)` stays `Add`; `control.LCDon()` becomes `control_LCDon`. This
/// is the only place hardware-module call syntax is canonicalised.
pub fn canonical_callee_name(callee: &Callee) -> Id {
    match callee {
        Callee::Plain(name) => *name,
        Callee::Dotted(module, func) => Id::from(format!("{module}_{func}")),
    }
}
