//! Semantic analyzer: name resolution, type inference/coercion,
//! overload resolution, and AST rewriting to make coercions explicit
//! (spec.md §4.4).

pub mod coercion;
pub mod overload;

use hollow_core::Name;

use crate::ast::*;
use crate::diagnostics::{Diagnostic, DiagnosticBag, FileLocation};
use crate::symbols::{Environment, ScopeId, Symbol, SymbolFlags, SymbolId, SymbolKind};
use crate::types::{StructMember, Type, TypeId};
use coercion::{is_pointer_or_null, numeric_result_type};
use overload::{OverloadOutcome, resolve_overload};

/// What a deferred expression (spec §4.4 "Expressions deferred for
/// inference") was waiting on: the function or global whose body/init
/// still contains a `Pending(None)` node after a walk. Re-checking
/// re-runs the whole body/init rather than chasing a raw pointer to
/// the individual node — see ast.rs's module doc for why the AST uses
/// plain ownership instead of an arena-plus-index scheme.
#[derive(Debug, Clone, Copy)]
enum DeferredItem {
    Function(usize),
    Global(usize),
}

pub struct Analyzer<'a> {
    env: &'a mut Environment,
    bag: &'a mut DiagnosticBag,
    loop_depth: u32,
    function_symbols: Vec<SymbolId>,
}

impl<'a> Analyzer<'a> {
    pub fn new(env: &'a mut Environment, bag: &'a mut DiagnosticBag) -> Self {
        Analyzer {
            env,
            bag,
            loop_depth: 0,
            function_symbols: Vec::new(),
        }
    }

    /// Runs the full semantic pass over an already-flattened `Program`
    /// (spec §4.4 walk order: top-level declarations in file order,
    /// then statements in order within each function).
    pub fn analyze(&mut self, program: &mut Program) {
        self.declare_structs(program);
        self.function_symbols = self.declare_function_signatures(program);
        let global_symbols = self.declare_globals(program);

        let mut deferred = Vec::new();
        for i in 0..program.functions.len() {
            if self.bag.should_stop() {
                break;
            }
            if !self.check_function_body(program, i) {
                deferred.push(DeferredItem::Function(i));
            }
        }
        for i in 0..program.globals.len() {
            if self.bag.should_stop() {
                break;
            }
            if !self.check_global_init(program, i, global_symbols[i]) {
                deferred.push(DeferredItem::Global(i));
            }
        }

        // Re-check deferred items up to ten rounds (spec §4.4).
        for _round in 0..10 {
            if deferred.is_empty() || self.bag.should_stop() {
                break;
            }
            let mut still_pending = Vec::new();
            for item in deferred.drain(..) {
                let resolved = match item {
                    DeferredItem::Function(i) => self.check_function_body(program, i),
                    DeferredItem::Global(i) => self.check_global_init(program, i, global_symbols[i]),
                };
                if !resolved {
                    still_pending.push(item);
                }
            }
            deferred = still_pending;
        }
        if let Some(item) = deferred.first() {
            let loc = match *item {
                DeferredItem::Function(i) => program.functions[i].location.clone(),
                DeferredItem::Global(i) => program.globals[i].location.clone(),
            };
            self.bag.push(Diagnostic::error(loc, "could not infer type of expression"));
        }
    }

    // ---- declaration passes ----

    fn declare_structs(&mut self, program: &mut Program) {
        let mut ids = Vec::with_capacity(program.structs.len());
        for s in &program.structs {
            let id = self.env.types.declare_struct(s.name.clone(), Vec::new());
            ids.push(id);
            let _ = self.env.declare(
                self.env.global,
                Symbol {
                    name: Name::from(s.name.as_str()),
                    kind: SymbolKind::Struct,
                    ty: id,
                    location: s.location.clone(),
                    flags: SymbolFlags::IS_GLOBAL,
                    next_overload: None,
                },
            );
        }
        for (s, id) in program.structs.iter().zip(ids) {
            let mut members = Vec::new();
            for field in &s.fields {
                let ty = self.resolve_type_expr(&field.type_expr, self.env.global, &field.location);
                members.push(StructMember { name: field.name.clone(), ty });
            }
            if let Type::Struct { members: slot, .. } = self.env.types.get_mut(id) {
                *slot = members;
            }
        }
    }

    fn declare_function_signatures(&mut self, program: &mut Program) -> Vec<SymbolId> {
        let mut ids = Vec::with_capacity(program.functions.len() + program.foreign_functions.len());
        for f in &program.functions {
            ids.push(self.declare_function_signature(f, SymbolKind::Function));
        }
        for f in &program.foreign_functions {
            self.declare_function_signature(f, SymbolKind::ForeignFunction);
        }
        ids
    }

    fn declare_function_signature(&mut self, f: &FunctionDecl, kind: SymbolKind) -> SymbolId {
        let params: Vec<TypeId> = f
            .params
            .iter()
            .map(|p| self.resolve_type_expr(&p.type_expr, self.env.global, &p.location))
            .collect();
        let ret = match &f.return_type {
            Some(te) => self.resolve_type_expr(te, self.env.global, &f.location),
            None => self.env.types.new_pending(None),
        };
        let fn_ty = self.env.types.function(params, ret);
        self.env
            .declare(
                self.env.global,
                Symbol {
                    name: Name::from(f.name.as_str()),
                    kind,
                    ty: fn_ty,
                    location: f.location.clone(),
                    flags: SymbolFlags::IS_GLOBAL,
                    next_overload: None,
                },
            )
            .unwrap_or_else(|existing| existing)
    }

    fn declare_globals(&mut self, program: &mut Program) -> Vec<SymbolId> {
        let mut ids = Vec::with_capacity(program.globals.len());
        for g in &program.globals {
            let ty = match &g.type_expr {
                Some(te) => self.resolve_type_expr(te, self.env.global, &g.location),
                None => self.env.types.new_pending(None),
            };
            let id = self
                .env
                .declare(
                    self.env.global,
                    Symbol {
                        name: Name::from(g.name.as_str()),
                        kind: SymbolKind::Variable,
                        ty,
                        location: g.location.clone(),
                        flags: SymbolFlags::IS_GLOBAL,
                        next_overload: None,
                    },
                )
                .unwrap_or_else(|existing| existing);
            ids.push(id);
        }
        ids
    }

    fn check_global_init(&mut self, program: &mut Program, index: usize, symbol: SymbolId) -> bool {
        let Some(init) = program.globals[index].init.as_mut() else {
            return true;
        };
        let mut resolved = true;
        self.infer_expr(init, self.env.global, &mut resolved);
        let declared_ty = self.env.symbol(symbol).ty;
        if matches!(self.env.types.get(declared_ty), Type::Pending(None)) {
            if let Some(init_ty) = init.expr_type {
                if let Some(base) = self.env.types.resolved_base(init_ty) {
                    self.env.types.resolve_pending(declared_ty, base);
                } else {
                    resolved = false;
                }
            }
        } else if let Some(init_ty) = init.expr_type {
            self.coerce_expr_in_place(init, declared_ty);
            let _ = init_ty;
        }
        resolved
    }

    // ---- type-expr resolution ----

    fn resolve_type_expr(&mut self, te: &TypeExpr, scope: ScopeId, loc: &FileLocation) -> TypeId {
        let p = self.env.types.primitives();
        match te {
            TypeExpr::Name(name) => match name.as_str() {
                "bool" => p.bool_,
                "char" => p.char_,
                "s8" => p.s8,
                "u8" => p.u8,
                "s16" => p.s16,
                "u16" => p.u16,
                "s32" => p.s32,
                "u32" => p.u32,
                "s64" => p.s64,
                "u64" => p.u64,
                "f32" => p.f32,
                "f64" => p.f64,
                "string" => p.string,
                "void" => p.void,
                other => match self.env.lookup(scope, other) {
                    Some(sym) if matches!(self.env.symbol(sym).kind, SymbolKind::Struct | SymbolKind::TypeAlias) => {
                        self.env.symbol(sym).ty
                    }
                    _ => {
                        self.bag.push(Diagnostic::error(loc.clone(), format!("'{other}' is not a type name")));
                        p.none
                    }
                },
            },
            TypeExpr::Pointer(inner) => {
                let base = self.resolve_type_expr(inner, scope, loc);
                self.env.types.pointer_to(base)
            }
            TypeExpr::Slice(inner) => {
                // Treated as a pointer to the element type (spec §4.2
                // notes slices get "current semantic treatment" as
                // pointer-like; no separate runtime representation).
                let base = self.resolve_type_expr(inner, scope, loc);
                self.env.types.pointer_to(base)
            }
            TypeExpr::Function { params, ret } => {
                let params: Vec<TypeId> = params.iter().map(|p| self.resolve_type_expr(p, scope, loc)).collect();
                let ret = self.resolve_type_expr(ret, scope, loc);
                self.env.types.function(params, ret)
            }
        }
    }

    // ---- function bodies ----

    /// Returns `true` if the body resolved without leaving any
    /// `Pending(None)` expression behind.
    fn check_function_body(&mut self, program: &mut Program, index: usize) -> bool {
        let symbol = self.function_symbols[index];
        let fn_ty = self.env.symbol(symbol).ty;
        let Type::Function { params: param_types, ret } = self.env.types.get(fn_ty).clone() else {
            return true;
        };

        let scope = self.env.open_function_scope();
        self.env.scope_mut(scope).return_type = Some(ret);
        self.env.scope_mut(scope).return_type_infer_location = Some(program.functions[index].location.clone());

        {
            let f = &mut program.functions[index];
            for (param, ty) in f.params.iter_mut().zip(&param_types) {
                let id = self
                    .env
                    .declare(
                        scope,
                        Symbol {
                            name: Name::from(param.name.as_str()),
                            kind: SymbolKind::Parameter,
                            ty: *ty,
                            location: param.location.clone(),
                            flags: SymbolFlags::empty(),
                            next_overload: None,
                        },
                    )
                    .unwrap_or_else(|existing| existing);
                param.resolved_symbol = Some(id);
            }
        }

        let mut resolved = true;
        let mut saw_return_null = false;
        let mut first_non_null_return_type: Option<TypeId> = None;

        // Borrow the body out of `program` for the walk, since
        // `self.check_stmt` also needs `&mut self.env`/`self.bag`.
        let mut body = std::mem::take(&mut program.functions[index].body);
        for stmt in &mut body {
            self.check_stmt(
                &mut body_return_state(&mut saw_return_null, &mut first_non_null_return_type),
                stmt,
                scope,
                &mut resolved,
            );
        }
        program.functions[index].body = body;

        let was_pending = matches!(self.env.types.get(ret), Type::Pending(None));
        if was_pending {
            if let Some(base) = first_non_null_return_type {
                self.env.types.resolve_pending(ret, base);
            } else if !saw_return_null {
                // No return statements, or only bare `return;`s: void.
                self.env.types.resolve_pending(ret, self.env.types.primitives().void);
            } else {
                self.bag.push(Diagnostic::error(
                    program.functions[index].location.clone(),
                    format!("could not infer return type of '{}': every path returns null", program.functions[index].name),
                ));
                resolved = false;
            }
        }

        self.env.close_function_scope();
        resolved
    }

    // ---- statements ----

    fn check_stmt(&mut self, ret_state: &mut ReturnState<'_>, stmt: &mut Stmt, scope: ScopeId, resolved: &mut bool) {
        match &mut stmt.kind {
            StmtKind::ExprStmt(e) => self.infer_expr(e, scope, resolved),
            StmtKind::VarDecl {
                name,
                type_expr,
                init,
                resolved_type,
                resolved_symbol,
            } => {
                let declared = type_expr.as_ref().map(|te| self.resolve_type_expr(te, scope, &stmt.location));
                if let Some(init) = init.as_mut() {
                    self.infer_expr(init, scope, resolved);
                }
                let final_ty = match (declared, init.as_ref().and_then(|i| i.expr_type)) {
                    (Some(d), Some(init_ty)) => {
                        if let Some(init_mut) = init.as_mut() {
                            self.coerce_expr_in_place(init_mut, d);
                        }
                        let _ = init_ty;
                        d
                    }
                    (Some(d), None) => d,
                    (None, Some(init_ty)) => init_ty,
                    (None, None) => self.env.types.primitives().none,
                };
                *resolved_type = Some(final_ty);
                let id = self
                    .env
                    .declare(
                        scope,
                        Symbol {
                            name: Name::from(name.as_str()),
                            kind: SymbolKind::Variable,
                            ty: final_ty,
                            location: stmt.location.clone(),
                            flags: SymbolFlags::empty(),
                            next_overload: None,
                        },
                    )
                    .unwrap_or_else(|existing| existing);
                *resolved_symbol = Some(id);
            }
            StmtKind::Block(stmts) => {
                let inner = self.env.open_scope();
                for s in stmts {
                    self.check_stmt(ret_state, s, inner, resolved);
                }
                self.env.close_scope();
            }
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.infer_expr(cond, scope, resolved);
                self.expect_bool(cond);
                self.check_stmt(ret_state, then_branch, scope, resolved);
                if let Some(else_branch) = else_branch {
                    self.check_stmt(ret_state, else_branch, scope, resolved);
                }
            }
            StmtKind::While { cond, body } => {
                self.infer_expr(cond, scope, resolved);
                self.expect_bool(cond);
                self.loop_depth += 1;
                self.check_stmt(ret_state, body, scope, resolved);
                self.loop_depth -= 1;
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
                ..
            } => {
                let inner = self.env.open_scope();
                if let Some(init) = init {
                    self.check_stmt(ret_state, init, inner, resolved);
                }
                if let Some(cond) = cond {
                    self.infer_expr(cond, inner, resolved);
                    self.expect_bool(cond);
                }
                if let Some(step) = step {
                    self.infer_expr(step, inner, resolved);
                }
                self.loop_depth += 1;
                self.check_stmt(ret_state, body, inner, resolved);
                self.loop_depth -= 1;
                self.env.close_scope();
            }
            StmtKind::Return(value) => {
                let return_scope = self.env.current_function_scope().unwrap_or(scope);
                let declared_ret = self.env.scope(return_scope).return_type;
                match value {
                    None => {}
                    Some(expr) => {
                        self.infer_expr(expr, scope, resolved);
                        let is_literal_null = matches!(expr.kind, ExprKind::Literal(Literal::Null));
                        if is_literal_null {
                            ret_state.record_null_return();
                        } else {
                            ret_state.record_non_null_type(expr.expr_type);
                        }
                        if let Some(declared_ret) = declared_ret {
                            if !matches!(self.env.types.get(declared_ret), Type::Pending(None)) {
                                self.coerce_expr_in_place(expr, declared_ret);
                            }
                        }
                    }
                }
                if let Some(scope_id) = self.env.current_function_scope() {
                    self.env.scope_mut(scope_id).return_statement_count += 1;
                }
            }
            StmtKind::Break => {
                if self.loop_depth == 0 {
                    self.bag.push(Diagnostic::error(stmt.location.clone(), "'break' outside of a loop"));
                }
            }
            StmtKind::Continue => {
                if self.loop_depth == 0 {
                    self.bag.push(Diagnostic::error(stmt.location.clone(), "'continue' outside of a loop"));
                }
            }
        }
    }

    fn expect_bool(&mut self, expr: &Expr) {
        let p = self.env.types.primitives();
        if let Some(ty) = expr.expr_type {
            if ty != p.bool_ && ty != p.none {
                self.bag.push(Diagnostic::error(expr.location.clone(), "condition must be of type bool"));
            }
        }
    }

    // ---- expressions ----

    fn infer_expr(&mut self, expr: &mut Expr, scope: ScopeId, resolved: &mut bool) {
        let p = self.env.types.primitives();
        let (ty, category) = match &mut expr.kind {
            ExprKind::Literal(lit) => self.infer_literal(lit),
            ExprKind::Name(name) => match self.env.lookup(scope, name) {
                Some(sym) => {
                    let sym_ref = self.env.symbol(sym);
                    let category = match sym_ref.kind {
                        SymbolKind::Variable | SymbolKind::Parameter => ast::ValueCategory::Assignable,
                        _ => ast::ValueCategory::NonAssignable,
                    };
                    (sym_ref.ty, category)
                }
                None => {
                    self.bag.push(Diagnostic::error(expr.location.clone(), format!("undefined reference to '{name}'")));
                    (p.none, ast::ValueCategory::NonAssignable)
                }
            },
            ExprKind::Unary { op, operand } => self.infer_unary(op, operand, scope, resolved),
            ExprKind::Binary { op, lhs, rhs } => self.infer_binary(op, lhs, rhs, scope, resolved),
            ExprKind::Assign { target, value, .. } => {
                self.infer_expr(target, scope, resolved);
                self.infer_expr(value, scope, resolved);
                if target.value_category != ast::ValueCategory::Assignable {
                    self.bag.push(Diagnostic::error(target.location.clone(), "left-hand side of assignment is not assignable"));
                }
                let target_ty = target.expr_type.unwrap_or(p.none);
                self.coerce_expr_in_place(value, target_ty);
                (target_ty, ast::ValueCategory::NonAssignable)
            }
            ExprKind::Call { callee, args } => self.infer_call(callee, args, scope, resolved),
            ExprKind::Member { base, field } => self.infer_member(base, field, scope, resolved),
            ExprKind::Subscript { base, index } => self.infer_subscript(base, index, scope, resolved),
            ExprKind::Cast {
                type_expr,
                resolved_type,
                operand,
                ..
            } => {
                self.infer_expr(operand, scope, resolved);
                let ty = match (type_expr.as_ref(), *resolved_type) {
                    (Some(te), _) => {
                        let resolved_ty = self.resolve_type_expr(te, scope, &expr.location);
                        *resolved_type = Some(resolved_ty);
                        resolved_ty
                    }
                    (None, Some(ty)) => ty,
                    (None, None) => p.none,
                };
                (ty, ast::ValueCategory::NonAssignable)
            }
        };
        expr.expr_type = Some(ty);
        expr.value_category = category;
        if matches!(self.env.types.get(ty), Type::Pending(None)) {
            *resolved = false;
        }
    }

    fn infer_literal(&mut self, lit: &Literal) -> (TypeId, ast::ValueCategory) {
        let p = self.env.types.primitives();
        let ty = match lit {
            Literal::Integer(v) => self.env.types.natural_integer_type(*v, false),
            Literal::UnsignedInteger(v) => self.env.types.natural_integer_type(*v, true),
            Literal::Float32(_) => p.f32,
            Literal::Float64(_) => p.f64,
            Literal::Bool(_) => p.bool_,
            Literal::Char(_) => p.char_,
            Literal::String(_) => p.string,
            Literal::Null => p.null,
        };
        (ty, ast::ValueCategory::NonAssignable)
    }

    fn infer_unary(&mut self, op: &UnaryOp, operand: &mut Expr, scope: ScopeId, resolved: &mut bool) -> (TypeId, ast::ValueCategory) {
        self.infer_expr(operand, scope, resolved);
        let p = self.env.types.primitives();
        let operand_ty = operand.expr_type.unwrap_or(p.none);
        match op {
            UnaryOp::Plus | UnaryOp::Neg => {
                if !self.env.types.get(operand_ty).is_numeric() && operand_ty != p.none {
                    self.bag.push(Diagnostic::error(operand.location.clone(), "unary '+'/'-' requires a numeric operand"));
                }
                (operand_ty, ast::ValueCategory::NonAssignable)
            }
            UnaryOp::Not => {
                if operand_ty != p.bool_ && operand_ty != p.none {
                    self.bag.push(Diagnostic::error(operand.location.clone(), "'!' requires a bool operand"));
                }
                (p.bool_, ast::ValueCategory::NonAssignable)
            }
            UnaryOp::Compl => {
                if !self.env.types.get(operand_ty).is_integer() && operand_ty != p.none {
                    self.bag.push(Diagnostic::error(operand.location.clone(), "'~' requires an integer operand"));
                }
                (operand_ty, ast::ValueCategory::NonAssignable)
            }
            UnaryOp::Addr => {
                if operand.value_category != ast::ValueCategory::Assignable {
                    self.bag.push(Diagnostic::error(operand.location.clone(), "cannot take the address of a non-assignable expression"));
                }
                (self.env.types.pointer_to(operand_ty), ast::ValueCategory::NonAssignable)
            }
            UnaryOp::Deref => {
                let base = match self.env.types.get(operand_ty) {
                    Type::Pointer(inner) => *inner,
                    Type::None => p.none,
                    _ => {
                        self.bag.push(Diagnostic::error(operand.location.clone(), "'@' requires a pointer operand"));
                        p.none
                    }
                };
                (base, ast::ValueCategory::Assignable)
            }
        }
    }

    fn infer_binary(&mut self, op: &BinOp, lhs: &mut Expr, rhs: &mut Expr, scope: ScopeId, resolved: &mut bool) -> (TypeId, ast::ValueCategory) {
        self.infer_expr(lhs, scope, resolved);
        self.infer_expr(rhs, scope, resolved);
        let p = self.env.types.primitives();
        let lt = lhs.expr_type.unwrap_or(p.none);
        let rt = rhs.expr_type.unwrap_or(p.none);
        if lt == p.none || rt == p.none {
            return (p.none, ast::ValueCategory::NonAssignable);
        }

        match op {
            BinOp::And | BinOp::Or => {
                if lt != p.bool_ || rt != p.bool_ {
                    self.bag.push(Diagnostic::error(lhs.location.clone(), "'&&'/'||' require bool operands on both sides"));
                }
                (p.bool_, ast::ValueCategory::NonAssignable)
            }
            BinOp::Eq | BinOp::Neq | BinOp::Lt | BinOp::Leq | BinOp::Gt | BinOp::Geq => {
                if is_pointer_or_null(&self.env.types, lt) && is_pointer_or_null(&self.env.types, rt) {
                    return (p.bool_, ast::ValueCategory::NonAssignable);
                }
                if self.env.types.get(lt).is_numeric() && self.env.types.get(rt).is_numeric() {
                    match numeric_result_type(&p, &self.env.types, lt, rt) {
                        Ok(r) => {
                            if r.lhs_needs_cast {
                                self.insert_cast(lhs, r.result_type);
                            }
                            if r.rhs_needs_cast {
                                self.insert_cast(rhs, r.result_type);
                            }
                        }
                        Err(msg) => self.bag.push(Diagnostic::error(lhs.location.clone(), msg)),
                    }
                    return (p.bool_, ast::ValueCategory::NonAssignable);
                }
                self.bag.push(Diagnostic::error(
                    lhs.location.clone(),
                    format!("incompatible operand types for comparison: {:?} and {:?}", self.env.types.get(lt), self.env.types.get(rt)),
                ));
                (p.none, ast::ValueCategory::NonAssignable)
            }
            BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::Shl | BinOp::Shr | BinOp::Mod => {
                if !self.env.types.get(lt).is_integer() || !self.env.types.get(rt).is_integer() {
                    self.bag.push(Diagnostic::error(lhs.location.clone(), "bitwise/shift/modulo operators require integer operands"));
                    return (p.none, ast::ValueCategory::NonAssignable);
                }
                match numeric_result_type(&p, &self.env.types, lt, rt) {
                    Ok(r) => {
                        if r.lhs_needs_cast {
                            self.insert_cast(lhs, r.result_type);
                        }
                        if r.rhs_needs_cast {
                            self.insert_cast(rhs, r.result_type);
                        }
                        (r.result_type, ast::ValueCategory::NonAssignable)
                    }
                    Err(msg) => {
                        self.bag.push(Diagnostic::error(lhs.location.clone(), msg));
                        (p.none, ast::ValueCategory::NonAssignable)
                    }
                }
            }
            BinOp::Add | BinOp::Sub => {
                if self.env.types.get(lt).is_pointer() && self.env.types.get(rt).is_integer() {
                    return (lt, ast::ValueCategory::NonAssignable);
                }
                if *op == BinOp::Add && self.env.types.get(rt).is_pointer() && self.env.types.get(lt).is_integer() {
                    return (rt, ast::ValueCategory::NonAssignable);
                }
                if self.env.types.get(lt).is_numeric() && self.env.types.get(rt).is_numeric() {
                    match numeric_result_type(&p, &self.env.types, lt, rt) {
                        Ok(r) => {
                            if r.lhs_needs_cast {
                                self.insert_cast(lhs, r.result_type);
                            }
                            if r.rhs_needs_cast {
                                self.insert_cast(rhs, r.result_type);
                            }
                            return (r.result_type, ast::ValueCategory::NonAssignable);
                        }
                        Err(msg) => {
                            self.bag.push(Diagnostic::error(lhs.location.clone(), msg));
                            return (p.none, ast::ValueCategory::NonAssignable);
                        }
                    }
                }
                self.bag.push(Diagnostic::error(
                    lhs.location.clone(),
                    format!("incompatible operand types for '{op:?}': {:?} and {:?}", self.env.types.get(lt), self.env.types.get(rt)),
                ));
                (p.none, ast::ValueCategory::NonAssignable)
            }
            BinOp::Mul | BinOp::Div => {
                if !self.env.types.get(lt).is_numeric() || !self.env.types.get(rt).is_numeric() {
                    self.bag.push(Diagnostic::error(lhs.location.clone(), format!("'{op:?}' requires numeric operands")));
                    return (p.none, ast::ValueCategory::NonAssignable);
                }
                match numeric_result_type(&p, &self.env.types, lt, rt) {
                    Ok(r) => {
                        if r.lhs_needs_cast {
                            self.insert_cast(lhs, r.result_type);
                        }
                        if r.rhs_needs_cast {
                            self.insert_cast(rhs, r.result_type);
                        }
                        (r.result_type, ast::ValueCategory::NonAssignable)
                    }
                    Err(msg) => {
                        self.bag.push(Diagnostic::error(lhs.location.clone(), msg));
                        (p.none, ast::ValueCategory::NonAssignable)
                    }
                }
            }
        }
    }

    /// Wraps `expr` in place with a synthetic, implicit cast node to
    /// `target_type` (spec §4.4: "a synthetic typecast node is
    /// inserted in its place").
    fn insert_cast(&mut self, expr: &mut Expr, target_type: TypeId) {
        let loc = expr.location.clone();
        let inner = std::mem::replace(expr, Expr::new(ExprKind::Literal(Literal::Null), loc.clone()));
        *expr = Expr {
            kind: ExprKind::Cast {
                type_expr: None,
                resolved_type: Some(target_type),
                operand: Box::new(inner),
                explicit: false,
            },
            location: loc,
            expr_type: Some(target_type),
            value_category: ast::ValueCategory::NonAssignable,
        };
    }

    fn coerce_expr_in_place(&mut self, expr: &mut Expr, target_type: TypeId) {
        let p = self.env.types.primitives();
        let Some(from) = expr.expr_type else { return };
        if from == target_type || target_type == p.none || from == p.none {
            return;
        }
        if self.env.types.check_coercion(from, target_type) {
            self.insert_cast(expr, target_type);
        } else {
            self.bag.push(Diagnostic::error(
                expr.location.clone(),
                format!("cannot coerce {:?} to {:?}", self.env.types.get(from), self.env.types.get(target_type)),
            ));
        }
    }

    fn infer_call(&mut self, callee: &mut Expr, args: &mut [Expr], scope: ScopeId, resolved: &mut bool) -> (TypeId, ast::ValueCategory) {
        for arg in args.iter_mut() {
            self.infer_expr(arg, scope, resolved);
        }
        let p = self.env.types.primitives();
        let arg_types: Vec<TypeId> = args.iter().map(|a| a.expr_type.unwrap_or(p.none)).collect();

        if let ExprKind::Name(name) = &callee.kind {
            if let Some(head) = self.env.lookup(scope, name) {
                let is_function = matches!(self.env.symbol(head).kind, SymbolKind::Function | SymbolKind::ForeignFunction);
                if is_function {
                    match resolve_overload(self.env, head, &arg_types) {
                        OverloadOutcome::Resolved(sym) => {
                            let fn_ty = self.env.symbol(sym).ty;
                            let Type::Function { params, ret } = self.env.types.get(fn_ty).clone() else {
                                return (p.none, ast::ValueCategory::NonAssignable);
                            };
                            for (arg, param_ty) in args.iter_mut().zip(&params) {
                                self.coerce_expr_in_place(arg, *param_ty);
                            }
                            callee.expr_type = Some(fn_ty);
                            callee.value_category = ast::ValueCategory::NonAssignable;
                            return (ret, ast::ValueCategory::NonAssignable);
                        }
                        OverloadOutcome::NoMatch => {
                            self.bag.push(Diagnostic::error(callee.location.clone(), format!("no overload of '{name}' matches the given arguments")));
                            return (p.none, ast::ValueCategory::NonAssignable);
                        }
                        OverloadOutcome::Ambiguous(a, b) => {
                            self.bag.push(Diagnostic::error(
                                callee.location.clone(),
                                format!(
                                    "ambiguous call to '{name}': candidates at {} and {}",
                                    self.env.symbol(a).location.file,
                                    self.env.symbol(b).location.file
                                ),
                            ));
                            return (p.none, ast::ValueCategory::NonAssignable);
                        }
                    }
                }
            }
        }

        self.infer_expr(callee, scope, resolved);
        match self.env.types.get(callee.expr_type.unwrap_or(p.none)) {
            Type::Function { ret, .. } => (*ret, ast::ValueCategory::NonAssignable),
            Type::None => (p.none, ast::ValueCategory::NonAssignable),
            _ => {
                self.bag.push(Diagnostic::error(callee.location.clone(), "expression is not callable"));
                (p.none, ast::ValueCategory::NonAssignable)
            }
        }
    }

    fn infer_member(&mut self, base: &mut Expr, field: &str, scope: ScopeId, resolved: &mut bool) -> (TypeId, ast::ValueCategory) {
        self.infer_expr(base, scope, resolved);
        let p = self.env.types.primitives();
        let base_ty = base.expr_type.unwrap_or(p.none);
        let struct_ty = match self.env.types.get(base_ty) {
            Type::Struct { .. } => base_ty,
            Type::Pointer(inner) if matches!(self.env.types.get(*inner), Type::Struct { .. }) => *inner,
            Type::None => return (p.none, ast::ValueCategory::NonAssignable),
            _ => {
                self.bag.push(Diagnostic::error(base.location.clone(), "member access on a non-struct type"));
                return (p.none, ast::ValueCategory::NonAssignable);
            }
        };
        if let Type::Struct { members, .. } = self.env.types.get(struct_ty) {
            if let Some(m) = members.iter().find(|m| m.name == field) {
                return (m.ty, ast::ValueCategory::Assignable);
            }
        }
        self.bag.push(Diagnostic::error(base.location.clone(), format!("no member named '{field}'")));
        (p.none, ast::ValueCategory::NonAssignable)
    }

    fn infer_subscript(&mut self, base: &mut Expr, index: &mut Expr, scope: ScopeId, resolved: &mut bool) -> (TypeId, ast::ValueCategory) {
        self.infer_expr(base, scope, resolved);
        self.infer_expr(index, scope, resolved);
        let p = self.env.types.primitives();
        let base_ty = base.expr_type.unwrap_or(p.none);
        if !self.env.types.get(index.expr_type.unwrap_or(p.none)).is_integer() {
            self.bag.push(Diagnostic::error(index.location.clone(), "subscript index must be an integer"));
        }
        match self.env.types.get(base_ty) {
            Type::Pointer(inner) => (*inner, ast::ValueCategory::Assignable),
            Type::None => (p.none, ast::ValueCategory::NonAssignable),
            _ => {
                self.bag.push(Diagnostic::error(base.location.clone(), "subscript requires a pointer/slice operand"));
                (p.none, ast::ValueCategory::NonAssignable)
            }
        }
    }
}

/// Tracks return-statement observations for the function currently
/// being checked, used to drive return-type inference (spec §4.4).
struct ReturnState<'a> {
    saw_return_null: &'a mut bool,
    first_non_null_return_type: &'a mut Option<TypeId>,
}

impl<'a> ReturnState<'a> {
    fn record_null_return(&mut self) {
        *self.saw_return_null = true;
    }

    fn record_non_null_type(&mut self, ty: Option<TypeId>) {
        if self.first_non_null_return_type.is_none() {
            *self.first_non_null_return_type = ty;
        }
    }
}

fn body_return_state<'a>(saw_return_null: &'a mut bool, first_non_null_return_type: &'a mut Option<TypeId>) -> ReturnState<'a> {
    ReturnState {
        saw_return_null,
        first_non_null_return_type,
    }
}
