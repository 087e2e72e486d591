//! Recursive-descent parser with precedence climbing for expressions
//! (spec.md §4.2).

use crate::ast::*;
use crate::diagnostics::{Diagnostic, DiagnosticBag, FileLocation};
use crate::lexer::token::{decode_char_escape, decode_string_escapes};
use crate::lexer::{Token, TokenKind};

pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

type PResult<T> = Result<T, ()>;

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Parser { tokens, pos: 0 }
    }

    pub fn parse_module(tokens: &'a [Token], bag: &mut DiagnosticBag) -> Module {
        let mut parser = Parser::new(tokens);
        let mut module = Module::default();
        while !parser.at(TokenKind::Eof) {
            if bag.should_stop() {
                break;
            }
            match parser.parse_top_level_decl(bag) {
                Ok(decl) => module.decls.push(decl),
                Err(()) => {
                    // Error recovery (spec §4.2): advance exactly one
                    // token and continue.
                    parser.advance();
                }
            }
        }
        module
    }

    // ---- token helpers ----

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn loc(&self) -> FileLocation {
        self.peek().location.clone()
    }

    fn expect(&mut self, kind: TokenKind, what: &str, bag: &mut DiagnosticBag) -> PResult<Token> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            bag.push(Diagnostic::error(
                self.loc(),
                format!("unexpected token '{}', expected {}", self.peek().text, what),
            ));
            Err(())
        }
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    // ---- top level ----

    fn parse_top_level_decl(&mut self, bag: &mut DiagnosticBag) -> PResult<TopLevelDecl> {
        if self.at(TokenKind::Import) {
            return self.parse_bare_import(bag).map(TopLevelDecl::Import);
        }
        if self.at(TokenKind::Foreign) {
            return self.parse_foreign_block(bag).map(TopLevelDecl::Foreign);
        }
        if self.at(TokenKind::Identifier) {
            let name_tok = self.advance();
            let name = name_tok.text.clone();
            if self.eat(TokenKind::ColonColon) {
                if self.at(TokenKind::Import) {
                    self.advance();
                    let path = self.expect_string_literal(bag)?;
                    self.expect(TokenKind::Semicolon, "';'", bag)?;
                    return Ok(TopLevelDecl::Import(ImportDecl {
                        module_name: path,
                        alias: Some(name),
                        location: name_tok.location,
                    }));
                }
                if self.at(TokenKind::Struct) {
                    self.advance();
                    return self.parse_struct_body(name, name_tok.location, bag).map(TopLevelDecl::Struct);
                }
                return self.parse_function(name, name_tok.location, bag, false).map(TopLevelDecl::Function);
            }
            if self.at(TokenKind::Colon) || self.at(TokenKind::ColonEq) {
                return self.parse_var_decl_rest(name, name_tok.location, bag).map(TopLevelDecl::Var);
            }
            bag.push(Diagnostic::error(name_tok.location, "expected ':', '::' or ':=' after name"));
            return Err(());
        }
        bag.push(Diagnostic::error(self.loc(), format!("unexpected token '{}'", self.peek().text)));
        Err(())
    }

    fn expect_string_literal(&mut self, bag: &mut DiagnosticBag) -> PResult<String> {
        let tok = self.expect(TokenKind::StringLit, "a string literal", bag)?;
        Ok(decode_string_escapes(&tok.text))
    }

    fn parse_bare_import(&mut self, bag: &mut DiagnosticBag) -> PResult<ImportDecl> {
        let start = self.loc();
        self.advance(); // 'import'
        let path = self.expect_string_literal(bag)?;
        self.expect(TokenKind::Semicolon, "';'", bag)?;
        Ok(ImportDecl {
            module_name: path,
            alias: None,
            location: start,
        })
    }

    fn parse_foreign_block(&mut self, bag: &mut DiagnosticBag) -> PResult<Vec<FunctionDecl>> {
        self.advance(); // 'foreign'
        self.expect(TokenKind::OpenBlock, "'{'", bag)?;
        let mut fns = Vec::new();
        while !self.at(TokenKind::CloseBlock) && !self.at(TokenKind::Eof) {
            if bag.should_stop() {
                break;
            }
            let name_tok = self.expect(TokenKind::Identifier, "a function name", bag)?;
            self.expect(TokenKind::ColonColon, "'::'", bag)?;
            let f = self.parse_function(name_tok.text.clone(), name_tok.location, bag, true)?;
            fns.push(f);
        }
        self.expect(TokenKind::CloseBlock, "'}'", bag)?;
        Ok(fns)
    }

    fn parse_struct_body(&mut self, name: String, location: FileLocation, bag: &mut DiagnosticBag) -> PResult<StructDecl> {
        self.expect(TokenKind::OpenBlock, "'{'", bag)?;
        let mut fields = Vec::new();
        while !self.at(TokenKind::CloseBlock) && !self.at(TokenKind::Eof) {
            if bag.should_stop() {
                break;
            }
            let field_tok = self.expect(TokenKind::Identifier, "a field name", bag)?;
            self.expect(TokenKind::Colon, "':'", bag)?;
            let type_expr = self.parse_type_expr(bag)?;
            self.eat(TokenKind::Comma);
            fields.push(StructField {
                name: field_tok.text,
                type_expr,
                location: field_tok.location,
            });
        }
        self.expect(TokenKind::CloseBlock, "'}'", bag)?;
        Ok(StructDecl { name, fields, location })
    }

    fn parse_function(
        &mut self,
        name: String,
        location: FileLocation,
        bag: &mut DiagnosticBag,
        is_foreign: bool,
    ) -> PResult<FunctionDecl> {
        self.expect(TokenKind::OpenParen, "'('", bag)?;
        let mut params = Vec::new();
        while !self.at(TokenKind::CloseParen) && !self.at(TokenKind::Eof) {
            if bag.should_stop() {
                break;
            }
            let p_tok = self.expect(TokenKind::Identifier, "a parameter name", bag)?;
            self.expect(TokenKind::Colon, "':'", bag)?;
            let type_expr = self.parse_type_expr(bag)?;
            params.push(Param {
                name: p_tok.text,
                type_expr,
                location: p_tok.location,
                resolved_symbol: None,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::CloseParen, "')'", bag)?;
        let return_type = if self.eat(TokenKind::Colon) {
            Some(self.parse_type_expr(bag)?)
        } else {
            None
        };
        if is_foreign {
            self.expect(TokenKind::Semicolon, "';'", bag)?;
            return Ok(FunctionDecl {
                name,
                params,
                return_type,
                body: Vec::new(),
                location,
                is_foreign: true,
            });
        }
        let body = self.parse_block_stmts(bag)?;
        Ok(FunctionDecl {
            name,
            params,
            return_type,
            body,
            location,
            is_foreign: false,
        })
    }

    fn parse_var_decl_rest(&mut self, name: String, location: FileLocation, bag: &mut DiagnosticBag) -> PResult<VarDecl> {
        if self.eat(TokenKind::ColonEq) {
            let init = self.parse_expr(bag)?;
            self.expect(TokenKind::Semicolon, "';'", bag)?;
            return Ok(VarDecl {
                name,
                type_expr: None,
                init: Some(init),
                location,
            });
        }
        self.expect(TokenKind::Colon, "':'", bag)?;
        let type_expr = self.parse_type_expr(bag)?;
        let init = if self.eat(TokenKind::Eq) {
            Some(self.parse_expr(bag)?)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon, "';'", bag)?;
        Ok(VarDecl {
            name,
            type_expr: Some(type_expr),
            init,
            location,
        })
    }

    // ---- types ----

    fn parse_type_expr(&mut self, bag: &mut DiagnosticBag) -> PResult<TypeExpr> {
        if self.eat(TokenKind::Star) {
            return Ok(TypeExpr::Pointer(Box::new(self.parse_type_expr(bag)?)));
        }
        if self.eat(TokenKind::OpenBracket) {
            self.expect(TokenKind::CloseBracket, "']'", bag)?;
            return Ok(TypeExpr::Slice(Box::new(self.parse_type_expr(bag)?)));
        }
        if self.eat(TokenKind::OpenParen) {
            let mut params = Vec::new();
            while !self.at(TokenKind::CloseParen) && !self.at(TokenKind::Eof) {
                params.push(self.parse_type_expr(bag)?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::CloseParen, "')'", bag)?;
            self.expect(TokenKind::Colon, "':'", bag)?;
            let ret = self.parse_type_expr(bag)?;
            return Ok(TypeExpr::Function {
                params,
                ret: Box::new(ret),
            });
        }
        let tok = self.advance();
        let name = match tok.kind {
            TokenKind::Identifier => tok.text,
            TokenKind::TypeBool => "bool".into(),
            TokenKind::TypeChar => "char".into(),
            TokenKind::TypeS8 => "s8".into(),
            TokenKind::TypeU8 => "u8".into(),
            TokenKind::TypeS16 => "s16".into(),
            TokenKind::TypeU16 => "u16".into(),
            TokenKind::TypeS32 => "s32".into(),
            TokenKind::TypeU32 => "u32".into(),
            TokenKind::TypeS64 => "s64".into(),
            TokenKind::TypeU64 => "u64".into(),
            TokenKind::TypeF32 => "f32".into(),
            TokenKind::TypeF64 => "f64".into(),
            TokenKind::TypeString => "string".into(),
            _ => {
                bag.push(Diagnostic::error(tok.location, format!("expected a type name, found '{}'", tok.text)));
                return Err(());
            }
        };
        Ok(TypeExpr::Name(name))
    }

    // ---- statements ----

    fn parse_block_stmts(&mut self, bag: &mut DiagnosticBag) -> PResult<Vec<Stmt>> {
        self.expect(TokenKind::OpenBlock, "'{'", bag)?;
        let mut stmts = Vec::new();
        while !self.at(TokenKind::CloseBlock) && !self.at(TokenKind::Eof) {
            if bag.should_stop() {
                break;
            }
            match self.parse_stmt(bag) {
                Ok(s) => stmts.push(s),
                Err(()) => self.advance_one_for_recovery(),
            }
        }
        self.expect(TokenKind::CloseBlock, "'}'", bag)?;
        Ok(stmts)
    }

    fn advance_one_for_recovery(&mut self) {
        if !self.at(TokenKind::Eof) {
            self.advance();
        }
    }

    fn parse_stmt(&mut self, bag: &mut DiagnosticBag) -> PResult<Stmt> {
        let loc = self.loc();
        match self.peek_kind() {
            TokenKind::OpenBlock => Ok(Stmt::new(StmtKind::Block(self.parse_block_stmts(bag)?), loc)),
            TokenKind::If => self.parse_if(bag),
            TokenKind::While => self.parse_while(bag),
            TokenKind::For => self.parse_for(bag),
            TokenKind::Return => {
                self.advance();
                let value = if self.at(TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expr(bag)?)
                };
                self.expect(TokenKind::Semicolon, "';'", bag)?;
                Ok(Stmt::new(StmtKind::Return(value), loc))
            }
            TokenKind::Break => {
                self.advance();
                self.expect(TokenKind::Semicolon, "';'", bag)?;
                Ok(Stmt::new(StmtKind::Break, loc))
            }
            TokenKind::Continue => {
                self.advance();
                self.expect(TokenKind::Semicolon, "';'", bag)?;
                Ok(Stmt::new(StmtKind::Continue, loc))
            }
            TokenKind::Identifier if self.is_decl_ahead() => self.parse_local_var_decl(bag),
            _ => {
                let expr = self.parse_expr(bag)?;
                self.expect(TokenKind::Semicolon, "';'", bag)?;
                Ok(Stmt::new(StmtKind::ExprStmt(expr), loc))
            }
        }
    }

    /// Lookahead to distinguish `name : T` / `name := expr` (a
    /// declaration) from `name = expr` or any other expression
    /// statement starting with an identifier.
    fn is_decl_ahead(&self) -> bool {
        matches!(
            self.tokens.get(self.pos + 1).map(|t| t.kind),
            Some(TokenKind::Colon) | Some(TokenKind::ColonEq)
        )
    }

    fn parse_local_var_decl(&mut self, bag: &mut DiagnosticBag) -> PResult<Stmt> {
        let name_tok = self.advance();
        let decl = self.parse_var_decl_rest(name_tok.text, name_tok.location.clone(), bag)?;
        Ok(Stmt::new(
            StmtKind::VarDecl {
                name: decl.name,
                type_expr: decl.type_expr,
                init: decl.init,
                resolved_type: None,
                resolved_symbol: None,
            },
            name_tok.location,
        ))
    }

    fn parse_if(&mut self, bag: &mut DiagnosticBag) -> PResult<Stmt> {
        let loc = self.loc();
        self.advance();
        self.expect(TokenKind::OpenParen, "'('", bag)?;
        let cond = self.parse_expr(bag)?;
        self.expect(TokenKind::CloseParen, "')'", bag)?;
        let then_branch = Box::new(self.parse_braced_or_single(bag)?);
        let else_branch = if self.eat(TokenKind::Else) {
            if self.at(TokenKind::If) {
                Some(Box::new(self.parse_if(bag)?))
            } else {
                Some(Box::new(self.parse_braced_or_single(bag)?))
            }
        } else {
            None
        };
        Ok(Stmt::new(
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            },
            loc,
        ))
    }

    fn parse_braced_or_single(&mut self, bag: &mut DiagnosticBag) -> PResult<Stmt> {
        if self.at(TokenKind::OpenBlock) {
            let loc = self.loc();
            Ok(Stmt::new(StmtKind::Block(self.parse_block_stmts(bag)?), loc))
        } else {
            self.parse_stmt(bag)
        }
    }

    fn parse_while(&mut self, bag: &mut DiagnosticBag) -> PResult<Stmt> {
        let loc = self.loc();
        self.advance();
        self.expect(TokenKind::OpenParen, "'('", bag)?;
        let cond = self.parse_expr(bag)?;
        self.expect(TokenKind::CloseParen, "')'", bag)?;
        let body = Box::new(self.parse_braced_or_single(bag)?);
        Ok(Stmt::new(StmtKind::While { cond, body }, loc))
    }

    fn parse_for(&mut self, bag: &mut DiagnosticBag) -> PResult<Stmt> {
        let loc = self.loc();
        self.advance();
        self.expect(TokenKind::OpenParen, "'('", bag)?;
        let mut induction_var = None;
        let init = if self.at(TokenKind::Semicolon) {
            self.advance();
            None
        } else if self.at(TokenKind::Identifier) && self.is_decl_ahead() {
            let stmt = self.parse_local_var_decl(bag)?;
            if let StmtKind::VarDecl { name, .. } = &stmt.kind {
                induction_var = Some(name.clone());
            }
            Some(Box::new(stmt))
        } else {
            let expr = self.parse_expr(bag)?;
            self.expect(TokenKind::Semicolon, "';'", bag)?;
            Some(Box::new(Stmt::new(StmtKind::ExprStmt(expr), loc.clone())))
        };
        let cond = if self.at(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expr(bag)?)
        };
        self.expect(TokenKind::Semicolon, "';'", bag)?;
        let step = if self.at(TokenKind::CloseParen) {
            None
        } else {
            Some(self.parse_expr(bag)?)
        };
        self.expect(TokenKind::CloseParen, "')'", bag)?;
        let body = Box::new(self.parse_braced_or_single(bag)?);
        Ok(Stmt::new(
            StmtKind::For {
                induction_var,
                init,
                cond,
                step,
                body,
            },
            loc,
        ))
    }

    // ---- expressions: precedence climbing (spec §4.2 table) ----

    fn parse_expr(&mut self, bag: &mut DiagnosticBag) -> PResult<Expr> {
        self.parse_assignment(bag)
    }

    fn parse_assignment(&mut self, bag: &mut DiagnosticBag) -> PResult<Expr> {
        let lhs = self.parse_binary(0, bag)?;
        let op = match self.peek_kind() {
            TokenKind::Eq => AssignOp::Assign,
            TokenKind::PlusEq => AssignOp::AddAssign,
            TokenKind::MinusEq => AssignOp::SubAssign,
            TokenKind::StarEq => AssignOp::MulAssign,
            TokenKind::SlashEq => AssignOp::DivAssign,
            TokenKind::PercentEq => AssignOp::ModAssign,
            TokenKind::AmpersandEq => AssignOp::AndAssign,
            TokenKind::HatEq => AssignOp::XorAssign,
            TokenKind::PipeEq => AssignOp::OrAssign,
            _ => return Ok(lhs),
        };
        let loc = self.loc();
        self.advance();
        // Right-associative: recurse into assignment again.
        let rhs = self.parse_assignment(bag)?;
        Ok(Expr::new(
            ExprKind::Assign {
                op,
                target: Box::new(lhs),
                value: Box::new(rhs),
            },
            loc,
        ))
    }

    fn binop_for(kind: TokenKind) -> Option<(BinOp, u8, bool)> {
        // (operator, precedence level [higher binds tighter], left_assoc)
        use TokenKind::*;
        Some(match kind {
            PipePipe => (BinOp::Or, 2, true),
            AmpersandAmpersand => (BinOp::And, 3, true),
            EqEq => (BinOp::Eq, 4, true),
            BangEq => (BinOp::Neq, 4, true),
            Less => (BinOp::Lt, 4, true),
            LessEq => (BinOp::Leq, 4, true),
            Greater => (BinOp::Gt, 4, true),
            GreaterEq => (BinOp::Geq, 4, true),
            Pipe => (BinOp::BitOr, 5, true),
            Hat => (BinOp::BitXor, 5, true),
            Ampersand => (BinOp::BitAnd, 6, true),
            LessLess => (BinOp::Shl, 7, true),
            GreaterGreater => (BinOp::Shr, 7, true),
            Plus => (BinOp::Add, 8, true),
            Minus => (BinOp::Sub, 8, true),
            Star => (BinOp::Mul, 9, true),
            Slash => (BinOp::Div, 9, true),
            Percent => (BinOp::Mod, 9, true),
            _ => return None,
        })
    }

    fn parse_binary(&mut self, min_prec: u8, bag: &mut DiagnosticBag) -> PResult<Expr> {
        let mut lhs = self.parse_unary(bag)?;
        loop {
            let Some((op, prec, left_assoc)) = Self::binop_for(self.peek_kind()) else {
                break;
            };
            if prec < min_prec {
                break;
            }
            let loc = self.loc();
            self.advance();
            let next_min = if left_assoc { prec + 1 } else { prec };
            let rhs = self.parse_binary(next_min, bag)?;
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                loc,
            );
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self, bag: &mut DiagnosticBag) -> PResult<Expr> {
        let loc = self.loc();
        let op = match self.peek_kind() {
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::Compl),
            TokenKind::Ampersand => Some(UnaryOp::Addr),
            TokenKind::At => Some(UnaryOp::Deref),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary(bag)?;
            return Ok(Expr::new(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                loc,
            ));
        }
        self.parse_postfix(bag)
    }

    fn parse_postfix(&mut self, bag: &mut DiagnosticBag) -> PResult<Expr> {
        let mut expr = self.parse_primary(bag)?;
        loop {
            let loc = self.loc();
            match self.peek_kind() {
                TokenKind::OpenParen => {
                    self.advance();
                    let mut args = Vec::new();
                    while !self.at(TokenKind::CloseParen) && !self.at(TokenKind::Eof) {
                        args.push(self.parse_expr(bag)?);
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::CloseParen, "')'", bag)?;
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        loc,
                    );
                }
                TokenKind::OpenBracket => {
                    self.advance();
                    let index = self.parse_expr(bag)?;
                    self.expect(TokenKind::CloseBracket, "']'", bag)?;
                    expr = Expr::new(
                        ExprKind::Subscript {
                            base: Box::new(expr),
                            index: Box::new(index),
                        },
                        loc,
                    );
                }
                TokenKind::Period => {
                    self.advance();
                    let field = self.expect(TokenKind::Identifier, "a field name", bag)?;
                    expr = Expr::new(
                        ExprKind::Member {
                            base: Box::new(expr),
                            field: field.text,
                        },
                        loc,
                    );
                }
                TokenKind::Arrow => {
                    self.advance();
                    let type_expr = self.parse_type_expr(bag)?;
                    expr = Expr::new(
                        ExprKind::Cast {
                            type_expr: Some(type_expr),
                            resolved_type: None,
                            operand: Box::new(expr),
                            explicit: true,
                        },
                        loc,
                    );
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self, bag: &mut DiagnosticBag) -> PResult<Expr> {
        let tok = self.peek().clone();
        let loc = tok.location.clone();
        match tok.kind {
            TokenKind::IntegerLit => {
                self.advance();
                let value: u64 = tok.text.parse().unwrap_or(0);
                Ok(Expr::new(ExprKind::Literal(Literal::Integer(value)), loc))
            }
            TokenKind::Float32Lit => {
                self.advance();
                let text = tok.text.trim_end_matches('f');
                Ok(Expr::new(ExprKind::Literal(Literal::Float32(text.parse().unwrap_or(0.0))), loc))
            }
            TokenKind::Float64Lit => {
                self.advance();
                let text = tok.text.trim_end_matches('d');
                Ok(Expr::new(ExprKind::Literal(Literal::Float64(text.parse().unwrap_or(0.0))), loc))
            }
            TokenKind::StringLit => {
                self.advance();
                Ok(Expr::new(ExprKind::Literal(Literal::String(decode_string_escapes(&tok.text))), loc))
            }
            TokenKind::CharLit => {
                self.advance();
                Ok(Expr::new(ExprKind::Literal(Literal::Char(decode_char_escape(&tok.text))), loc))
            }
            TokenKind::TrueLit => {
                self.advance();
                Ok(Expr::new(ExprKind::Literal(Literal::Bool(true)), loc))
            }
            TokenKind::FalseLit => {
                self.advance();
                Ok(Expr::new(ExprKind::Literal(Literal::Bool(false)), loc))
            }
            TokenKind::NullLit => {
                self.advance();
                Ok(Expr::new(ExprKind::Literal(Literal::Null), loc))
            }
            TokenKind::Identifier => {
                self.advance();
                Ok(Expr::new(ExprKind::Name(tok.text), loc))
            }
            TokenKind::OpenParen => {
                self.advance();
                let inner = self.parse_expr(bag)?;
                self.expect(TokenKind::CloseParen, "')'", bag)?;
                Ok(inner)
            }
            _ => {
                bag.push(Diagnostic::error(loc, format!("unexpected token '{}' in expression", tok.text)));
                Err(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::SourceId;
    use crate::lexer::Lexer;
    use std::rc::Rc;

    fn parse(src: &str) -> (Module, DiagnosticBag) {
        let source = Rc::new(SourceId { path: "t.hp".into() });
        let mut bytes = src.as_bytes().to_vec();
        bytes.push(0);
        let mut bag = DiagnosticBag::new(6, 4);
        let tokens = Lexer::new(source, &bytes).tokenize(&mut bag);
        let module = Parser::parse_module(&tokens, &mut bag);
        (module, bag)
    }

    #[test]
    fn s1_hello_main_parses_with_zero_diagnostics() {
        let (module, bag) = parse("main :: () : s32 { return 0; }");
        assert_eq!(bag.error_count(), 0);
        assert_eq!(module.decls.len(), 1);
        match &module.decls[0] {
            TopLevelDecl::Function(f) => {
                assert_eq!(f.name, "main");
                assert_eq!(f.body.len(), 1);
                assert!(matches!(f.body[0].kind, StmtKind::Return(Some(_))));
            }
            other => panic!("expected function decl, got {other:?}"),
        }
    }

    #[test]
    fn s5_parse_failure_recovers_with_one_diagnostic() {
        let (_module, bag) = parse("main :: () { 1 + ; }");
        assert_eq!(bag.error_count(), 1);
    }

    #[test]
    fn binary_precedence_groups_multiplication_tighter_than_addition() {
        let (module, bag) = parse("x := 1 + 2 * 3;");
        assert_eq!(bag.error_count(), 0);
        let TopLevelDecl::Var(v) = &module.decls[0] else {
            panic!("expected var decl");
        };
        let ExprKind::Binary { op: BinOp::Add, rhs, .. } = &v.init.as_ref().unwrap().kind else {
            panic!("expected top-level '+' ");
        };
        assert!(matches!(rhs.kind, ExprKind::Binary { op: BinOp::Mul, .. }));
    }

    #[test]
    fn assignment_is_right_associative() {
        let (module, bag) = parse("main :: () { a = b = 1; }");
        assert_eq!(bag.error_count(), 0);
        let TopLevelDecl::Function(f) = &module.decls[0] else {
            panic!("expected function");
        };
        let StmtKind::ExprStmt(expr) = &f.body[0].kind else {
            panic!("expected expr stmt");
        };
        let ExprKind::Assign { value, .. } = &expr.kind else {
            panic!("expected assignment");
        };
        assert!(matches!(value.kind, ExprKind::Assign { .. }));
    }

    #[test]
    fn struct_decl_parses_ordered_members() {
        let (module, bag) = parse("Point :: struct { x: s32, y: s32 }");
        assert_eq!(bag.error_count(), 0);
        let TopLevelDecl::Struct(s) = &module.decls[0] else {
            panic!("expected struct decl");
        };
        assert_eq!(s.fields.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(), vec!["x", "y"]);
    }

    #[test]
    fn pointer_and_function_type_grammar_parses() {
        let (module, bag) = parse("f :: (p: *s32, g: (s32) : s32) : *s32 { return p; }");
        assert_eq!(bag.error_count(), 0);
        let TopLevelDecl::Function(f) = &module.decls[0] else {
            panic!("expected function");
        };
        assert!(matches!(f.params[0].type_expr, TypeExpr::Pointer(_)));
        assert!(matches!(f.params[1].type_expr, TypeExpr::Function { .. }));
    }

    #[test]
    fn for_loop_with_own_induction_variable_parses() {
        let (module, bag) = parse("main :: () { for (i := 0; i < 10; i += 1) { } }");
        assert_eq!(bag.error_count(), 0);
        let TopLevelDecl::Function(f) = &module.decls[0] else {
            panic!("expected function");
        };
        let StmtKind::For { induction_var, .. } = &f.body[0].kind else {
            panic!("expected for loop");
        };
        assert_eq!(induction_var.as_deref(), Some("i"));
    }

    #[test]
    fn explicit_cast_via_arrow_parses() {
        let (module, bag) = parse("x := 1 -> f32;");
        assert_eq!(bag.error_count(), 0);
        let TopLevelDecl::Var(v) = &module.decls[0] else {
            panic!("expected var decl");
        };
        assert!(matches!(v.init.as_ref().unwrap().kind, ExprKind::Cast { explicit: true, .. }));
    }
}
