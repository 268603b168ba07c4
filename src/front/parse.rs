//! The recursive-descent parser. Builds `ast::Program` directly out of the
//! token stream; there is no separate untyped parse tree (see `front::ast`).

use crate::common::Id;
use crate::error::{CompileError, Result};
use crate::front::ast::*;
use crate::front::lex::{Lexer, Token, TokenKind};
use crate::front::types::Type;

pub fn parse(input: &str) -> Result<Program> {
    let mut lexer = Lexer::new(input);
    let mut tokens = vec![];
    while let Some(tok) = lexer.next()? {
        tokens.push(tok);
    }
    let mut parser = Parser { tokens, pos: 0 };
    parser.parse_program()
}

struct Parser<'src> {
    tokens: Vec<Token<'src>>,
    pos: usize,
}

impl<'src> Parser<'src> {
    fn peek(&self) -> Option<&Token<'src>> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn advance(&mut self) -> Option<Token<'src>> {
        let tok = self.tokens.get(self.pos).copied();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn pos_of_err(&self) -> (usize, usize) {
        match self.peek() {
            Some(t) => (t.line, t.col),
            None => match self.tokens.last() {
                Some(t) => (t.line, t.col + t.text.len()),
                None => (1, 1),
            },
        }
    }

    fn err_expected(&self, expected: impl Into<String>) -> CompileError {
        let (line, col) = self.pos_of_err();
        let found = match self.peek() {
            Some(t) => format!("{}", t.kind),
            None => "end of input".to_string(),
        };
        CompileError::Parse { line, col, expected: expected.into(), found }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token<'src>> {
        if self.peek_kind() == Some(kind) {
            Ok(self.advance().unwrap())
        } else {
            Err(self.err_expected(format!("{}", kind)))
        }
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn line(&self) -> usize {
        self.peek().map(|t| t.line).unwrap_or(1)
    }

    fn ident(&mut self) -> Result<Id> {
        let tok = self.expect(TokenKind::Ident)?;
        Ok(Id::from(tok.text.to_string()))
    }

    // ---- top level -----------------------------------------------------

    fn parse_program(&mut self) -> Result<Program> {
        let mut stmts = vec![];
        while !self.at_end() {
            stmts.push(self.parse_stmt()?);
        }
        Ok(Program { stmts })
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>> {
        self.expect(TokenKind::LBrace)?;
        let mut stmts = vec![];
        while self.peek_kind() != Some(TokenKind::RBrace) {
            if self.at_end() {
                return Err(self.err_expected("'}'"));
            }
            stmts.push(self.parse_stmt()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(stmts)
    }

    fn type_name(&mut self) -> Result<Type> {
        use TokenKind::*;
        let kind = self.peek_kind().ok_or_else(|| self.err_expected("a type name"))?;
        let ty = match kind {
            KwInt => Type::Int,
            KwString => Type::String,
            KwVoid => Type::Void,
            KwTileset => Type::Tileset,
            KwTilemap => Type::Tilemap,
            KwSprite => Type::Sprite,
            KwOamEntry => Type::OamEntry,
            KwList => Type::ListInt,
            _ => return Err(self.err_expected("a type name")),
        };
        self.advance();
        Ok(ty)
    }

    fn at_type_name(&self) -> bool {
        use TokenKind::*;
        matches!(
            self.peek_kind(),
            Some(KwInt | KwString | KwVoid | KwTileset | KwTilemap | KwSprite | KwOamEntry | KwList)
        )
    }

    fn parse_stmt(&mut self) -> Result<Stmt> {
        use TokenKind::*;
        match self.peek_kind() {
            Some(KwProcedure) => self.parse_proc_def(),
            Some(KwIf) => self.parse_if(),
            Some(KwLoop) => self.parse_loop(),
            Some(KwReturn) => self.parse_return(),
            _ if self.at_type_name() => self.parse_decl(),
            Some(Ident) => self.parse_assign_or_call(),
            _ => Err(self.err_expected("a statement")),
        }
    }

    fn parse_decl(&mut self) -> Result<Stmt> {
        let line = self.line();
        let ty = self.type_name()?;
        let name = self.ident()?;
        let init = if self.eat(TokenKind::Equals) {
            if self.peek_kind() == Some(TokenKind::LBracket) {
                Some(Init::List(self.parse_list_lit()?))
            } else {
                Some(Init::Expr(self.parse_expr()?))
            }
        } else {
            None
        };
        self.expect(TokenKind::Semi)?;
        Ok(Stmt::Decl { ty, name, init, line })
    }

    fn parse_list_lit(&mut self) -> Result<Vec<Expr>> {
        self.expect(TokenKind::LBracket)?;
        let mut elems = vec![];
        if self.peek_kind() != Some(TokenKind::RBracket) {
            elems.push(self.parse_expr()?);
            while self.eat(TokenKind::Comma) {
                elems.push(self.parse_expr()?);
            }
        }
        self.expect(TokenKind::RBracket)?;
        Ok(elems)
    }

    fn parse_if(&mut self) -> Result<Stmt> {
        let line = self.line();
        self.expect(TokenKind::KwIf)?;
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        let then_body = self.parse_block()?;
        let else_body = if self.eat(TokenKind::KwElse) { self.parse_block()? } else { vec![] };
        Ok(Stmt::If { cond, then_body, else_body, line })
    }

    fn parse_loop(&mut self) -> Result<Stmt> {
        let line = self.line();
        self.expect(TokenKind::KwLoop)?;
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        let body = self.parse_block()?;
        Ok(Stmt::Loop { cond, body, line })
    }

    fn parse_return(&mut self) -> Result<Stmt> {
        let line = self.line();
        self.expect(TokenKind::KwReturn)?;
        let value = if self.peek_kind() != Some(TokenKind::Semi) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(TokenKind::Semi)?;
        Ok(Stmt::Return { value, line })
    }

    fn parse_proc_def(&mut self) -> Result<Stmt> {
        let line = self.line();
        self.expect(TokenKind::KwProcedure)?;
        let ret = if self.at_type_name() { self.type_name()? } else { Type::Void };
        let name = self.ident()?;
        self.expect(TokenKind::LParen)?;
        let mut params = vec![];
        if self.peek_kind() != Some(TokenKind::RParen) {
            params.push(self.parse_param()?);
            while self.eat(TokenKind::Comma) {
                params.push(self.parse_param()?);
            }
        }
        self.expect(TokenKind::RParen)?;
        let body = self.parse_block()?;
        Ok(Stmt::ProcDef { name, params, ret, body, line })
    }

    fn parse_param(&mut self) -> Result<(Type, Id)> {
        let ty = self.type_name()?;
        let name = self.ident()?;
        Ok((ty, name))
    }

    /// An identifier-led statement is either an assignment to an lvalue or
    /// a bare procedure call; both start by parsing a postfix expression
    /// and then looking at what follows.
    fn parse_assign_or_call(&mut self) -> Result<Stmt> {
        let line = self.line();
        let expr = self.parse_postfix()?;
        if self.eat(TokenKind::Assign) {
            let target = expr_to_lvalue(expr, self)?;
            let value = self.parse_expr()?;
            self.expect(TokenKind::Semi)?;
            return Ok(Stmt::Assign { target, value, line });
        }
        self.expect(TokenKind::Semi)?;
        match expr {
            Expr::Call(call, _) => Ok(Stmt::Call { call, line }),
            _ => Err(self.err_expected("':=' or a procedure call")),
        }
    }

    // ---- expressions, precedence climbing -------------------------------

    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while self.eat(TokenKind::KwOr) {
            let rhs = self.parse_and()?;
            lhs = Expr::binary(BinOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_bitor()?;
        while self.eat(TokenKind::KwAnd) {
            let rhs = self.parse_bitor()?;
            lhs = Expr::binary(BinOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_bitor(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_bitxor()?;
        while self.eat(TokenKind::Pipe) {
            let rhs = self.parse_bitxor()?;
            lhs = Expr::binary(BinOp::BitOr, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_bitxor(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_bitand()?;
        while self.eat(TokenKind::Caret) {
            let rhs = self.parse_bitand()?;
            lhs = Expr::binary(BinOp::BitXor, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_bitand(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_eq()?;
        while self.eat(TokenKind::Amp) {
            let rhs = self.parse_eq()?;
            lhs = Expr::binary(BinOp::BitAnd, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_eq(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_rel()?;
        loop {
            let op = if self.eat(TokenKind::Eq) {
                BinOp::Eq
            } else if self.eat(TokenKind::Ne) {
                BinOp::Ne
            } else {
                break;
            };
            let rhs = self.parse_rel()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_rel(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_shift()?;
        loop {
            let op = if self.eat(TokenKind::Lt) {
                BinOp::Lt
            } else if self.eat(TokenKind::Gt) {
                BinOp::Gt
            } else if self.eat(TokenKind::Le) {
                BinOp::Le
            } else if self.eat(TokenKind::Ge) {
                BinOp::Ge
            } else {
                break;
            };
            let rhs = self.parse_shift()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_shift(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_add()?;
        loop {
            let op = if self.eat(TokenKind::Shl) {
                BinOp::Shl
            } else if self.eat(TokenKind::Shr) {
                BinOp::Shr
            } else {
                break;
            };
            let rhs = self.parse_add()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_add(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = if self.eat(TokenKind::Plus) {
                BinOp::Add
            } else if self.eat(TokenKind::Minus) {
                BinOp::Sub
            } else {
                break;
            };
            let rhs = self.parse_mul()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = if self.eat(TokenKind::Star) {
                BinOp::Mul
            } else if self.eat(TokenKind::Slash) {
                BinOp::Div
            } else {
                break;
            };
            let rhs = self.parse_unary()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let op = if self.eat(TokenKind::Minus) {
            Some(UnOp::Neg)
        } else if self.eat(TokenKind::Plus) {
            Some(UnOp::Plus)
        } else if self.eat(TokenKind::Tilde) {
            Some(UnOp::BitNot)
        } else if self.eat(TokenKind::KwNot) {
            Some(UnOp::Not)
        } else {
            None
        };
        match op {
            Some(op) => Ok(Expr::unary(op, self.parse_unary()?)),
            None => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut base = self.parse_atom()?;
        loop {
            if self.eat(TokenKind::Dot) {
                let name = self.ident()?;
                if self.peek_kind() == Some(TokenKind::LParen) {
                    let module = match base {
                        Expr::Var(id, _) => id,
                        _ => return Err(self.err_expected("a module name before '.'")),
                    };
                    self.advance();
                    let args = self.parse_args()?;
                    self.expect(TokenKind::RParen)?;
                    base = Expr::call(Call { callee: Callee::Dotted(module, name), args });
                } else {
                    base = Expr::attr(base, name);
                }
            } else if self.eat(TokenKind::LBracket) {
                let idx = self.parse_expr()?;
                self.expect(TokenKind::RBracket)?;
                base = Expr::index(base, idx);
            } else {
                break;
            }
        }
        Ok(base)
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>> {
        let mut args = vec![];
        if self.peek_kind() != Some(TokenKind::RParen) {
            args.push(self.parse_expr()?);
            while self.eat(TokenKind::Comma) {
                args.push(self.parse_expr()?);
            }
        }
        Ok(args)
    }

    fn parse_atom(&mut self) -> Result<Expr> {
        use TokenKind::*;
        match self.peek_kind() {
            Some(Int) => {
                let tok = self.advance().unwrap();
                let v: i64 = tok
                    .text
                    .parse()
                    .map_err(|_| CompileError::Internal { detail: format!("bad integer literal '{}'", tok.text) })?;
                Ok(Expr::int(v))
            }
            Some(Str) => {
                let tok = self.advance().unwrap();
                Ok(Expr::str(unescape(tok.text)))
            }
            Some(Ident) => {
                let tok = self.advance().unwrap();
                let id = Id::from(tok.text.to_string());
                if self.eat(TokenKind::LParen) {
                    let args = self.parse_args()?;
                    self.expect(TokenKind::RParen)?;
                    Ok(Expr::call(Call { callee: Callee::Plain(id), args }))
                } else {
                    Ok(Expr::var(id))
                }
            }
            Some(LParen) => {
                self.advance();
                let e = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(e)
            }
            _ => Err(self.err_expected("an expression")),
        }
    }
}

/// Strips the surrounding quotes and resolves `\"`/`\\` escapes; string
/// literals only ever carry file paths, so no other escapes are needed.
fn unescape(text: &str) -> String {
    let inner = &text[1..text.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Converts a parsed postfix expression into an lvalue, once we know (by
/// seeing `:=` follow it) that it was used as an assignment target.
fn expr_to_lvalue(expr: Expr, parser: &Parser) -> Result<LValue> {
    match expr {
        Expr::Var(id, _) => Ok(LValue::Var(id)),
        Expr::Index(base, idx, _) => Ok(LValue::Index(Box::new(expr_to_lvalue(*base, parser)?), idx)),
        Expr::Attr(base, name, _) => Ok(LValue::Attr(Box::new(expr_to_lvalue(*base, parser)?), name)),
        _ => Err(parser.err_expected("an assignable expression")),
    }
}
