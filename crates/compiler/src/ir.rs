//! Three-address intermediate representation and the lowering pass
//! from the checked AST (spec.md §4.5).
//!
//! Unlike the AST, instructions within one routine sit in a single flat
//! `Vec`, and forward jump targets are not known until the block they
//! jump into has been emitted. A `Label` is therefore a `(RoutineId,
//! InstrIndex)` pair into that flat buffer rather than an owned node —
//! the one place in this compiler that earns the arena-plus-index
//! pattern the AST deliberately avoids (see ast.rs's module doc).

use crate::ast::*;
use crate::symbols::{Environment, SymbolId, SymbolKind};
use crate::types::{Type, TypeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutineId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstrIndex(pub u32);

/// A placeholder jump target, backpatched once the destination
/// instruction is known (spec §4.5 "forward jumps").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label {
    pub routine: RoutineId,
    pub index: InstrIndex,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Variable(SymbolId),
    Temp(u32),
    ImmInt(i64),
    ImmFloat(f64),
    ImmBool(bool),
    LabelRef(Label),
    Routine(SymbolId),
    ForeignRoutine(SymbolId),
    Null,
}

/// A cast opcode is named after its source/destination widths, mirroring
/// the original lowering's mnemonic style (`S_TO_F32`, `U64_TO_F64`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastKind {
    SignedToFloat,
    UnsignedToFloat,
    FloatToSigned,
    FloatToUnsigned,
    FloatWiden,
    FloatNarrow,
    IntWiden,
    IntNarrow,
    Bitcast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Lt,
    Leq,
    Gt,
    Geq,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    Not,
    Compl,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Compare(CompareOp),
    Mov,
    Cast(CastKind),
    Addr,
    Load,
    Store,
    MemberAddr { offset_of: String },
    Jump,
    JumpIfTrue,
    JumpIfFalse,
    LabelMark,
    Arg,
    Call,
    Return,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub op: Op,
    pub target: Option<Operand>,
    pub oper1: Option<Operand>,
    pub oper2: Option<Operand>,
    pub comment: Option<String>,
}

impl Instruction {
    fn new(op: Op) -> Self {
        Instruction {
            op,
            target: None,
            oper1: None,
            oper2: None,
            comment: None,
        }
    }
}

pub struct Routine {
    pub name: String,
    pub params: Vec<SymbolId>,
    pub instructions: Vec<Instruction>,
    pub temp_counter: u32,
    pub is_foreign: bool,
}

impl Routine {
    fn new(name: String, params: Vec<SymbolId>, is_foreign: bool) -> Self {
        Routine {
            name,
            params,
            instructions: Vec::new(),
            temp_counter: 0,
            is_foreign,
        }
    }

    fn fresh_temp(&mut self) -> Operand {
        let id = self.temp_counter;
        self.temp_counter += 1;
        Operand::Temp(id)
    }

    fn emit(&mut self, instr: Instruction) -> InstrIndex {
        let idx = InstrIndex(self.instructions.len() as u32);
        self.instructions.push(instr);
        idx
    }

    fn here(&self) -> InstrIndex {
        InstrIndex(self.instructions.len() as u32)
    }
}

pub struct IrProgram {
    pub routines: Vec<Routine>,
}

#[derive(Default)]
struct LoopContext {
    break_jumps: Vec<InstrIndex>,
    continue_jumps: Vec<InstrIndex>,
}

/// Lowers a whole, already type-checked `Program` to IR (spec §4.5).
/// One `Routine` per function; `&&`/`||` lower to branches rather than
/// bitwise ops to preserve short-circuit evaluation, and `if`/`while`/
/// `for` lower to compare-then-branch sequences with the label fixed
/// up once the following block's start index is known.
pub struct IrGenerator<'a> {
    env: &'a Environment,
    routine_id: RoutineId,
    loop_stack: Vec<LoopContext>,
}

impl<'a> IrGenerator<'a> {
    pub fn new(env: &'a Environment) -> Self {
        IrGenerator {
            env,
            routine_id: RoutineId(0),
            loop_stack: Vec::new(),
        }
    }

    pub fn lower_program(&mut self, program: &Program) -> IrProgram {
        let mut routines = Vec::new();
        for f in &program.foreign_functions {
            let params = self.lookup_params(f);
            routines.push(Routine::new(f.name.clone(), params, true));
        }
        for f in &program.functions {
            let params = self.lookup_params(f);
            let mut routine = Routine::new(f.name.clone(), params, false);
            self.routine_id = RoutineId(routines.len() as u32);
            let mut locals: Vec<(String, SymbolId)> = f
                .params
                .iter()
                .filter_map(|p| p.resolved_symbol.map(|id| (p.name.clone(), id)))
                .collect();
            for stmt in &f.body {
                self.lower_stmt(stmt, &mut routine, &mut locals);
            }
            routine.emit(Instruction::new(Op::Return));
            routines.push(routine);
        }
        IrProgram { routines }
    }

    /// Parameter symbols are declared by semantic analysis in the
    /// function's own scope (`sema::Analyzer::check_function_body`) and
    /// written back onto the AST's `Param::resolved_symbol`; this just
    /// reads them off in declaration order.
    fn lookup_params(&self, f: &FunctionDecl) -> Vec<SymbolId> {
        f.params.iter().filter_map(|p| p.resolved_symbol).collect()
    }

    fn lower_stmt(&mut self, stmt: &Stmt, routine: &mut Routine, locals: &mut Vec<(String, SymbolId)>) {
        match &stmt.kind {
            StmtKind::ExprStmt(e) => {
                self.lower_expr(e, routine, locals);
            }
            StmtKind::VarDecl { name, init, resolved_symbol, .. } => {
                let sym = resolved_symbol.expect("sema declares a symbol for every local before lowering");
                locals.push((name.clone(), sym));
                if let Some(init) = init {
                    let value = self.lower_expr(init, routine, locals);
                    let mut instr = Instruction::new(Op::Mov);
                    instr.target = Some(Operand::Variable(sym));
                    instr.oper1 = Some(value);
                    routine.emit(instr);
                }
            }
            StmtKind::Block(stmts) => {
                for s in stmts {
                    self.lower_stmt(s, routine, locals);
                }
            }
            StmtKind::If { cond, then_branch, else_branch } => {
                let cond_val = self.lower_expr(cond, routine, locals);
                let mut branch_to_else = Instruction::new(Op::JumpIfFalse);
                branch_to_else.oper1 = Some(cond_val);
                let branch_idx = routine.emit(branch_to_else);
                self.lower_stmt(then_branch, routine, locals);
                if let Some(else_branch) = else_branch {
                    let jump_idx = routine.emit(Instruction::new(Op::Jump));
                    let else_start = routine.here();
                    self.patch_target(routine, branch_idx, else_start);
                    self.lower_stmt(else_branch, routine, locals);
                    let end = routine.here();
                    self.patch_target(routine, jump_idx, end);
                } else {
                    let end = routine.here();
                    self.patch_target(routine, branch_idx, end);
                }
            }
            StmtKind::While { cond, body } => {
                let loop_start = routine.here();
                let cond_val = self.lower_expr(cond, routine, locals);
                let mut branch_out = Instruction::new(Op::JumpIfFalse);
                branch_out.oper1 = Some(cond_val);
                let branch_idx = routine.emit(branch_out);
                self.loop_stack.push(LoopContext::default());
                self.lower_stmt(body, routine, locals);
                let ctx = self.loop_stack.pop().unwrap();
                for idx in ctx.continue_jumps {
                    self.patch_target(routine, idx, loop_start);
                }
                let mut back = Instruction::new(Op::Jump);
                back.target = Some(Operand::LabelRef(Label {
                    routine: self.routine_id,
                    index: loop_start,
                }));
                routine.emit(back);
                let end = routine.here();
                self.patch_target(routine, branch_idx, end);
                for idx in ctx.break_jumps {
                    self.patch_target(routine, idx, end);
                }
            }
            StmtKind::For { init, cond, step, body, .. } => {
                if let Some(init) = init {
                    self.lower_stmt(init, routine, locals);
                }
                let loop_start = routine.here();
                let branch_idx = if let Some(cond) = cond {
                    let cond_val = self.lower_expr(cond, routine, locals);
                    let mut branch_out = Instruction::new(Op::JumpIfFalse);
                    branch_out.oper1 = Some(cond_val);
                    Some(routine.emit(branch_out))
                } else {
                    None
                };
                self.loop_stack.push(LoopContext::default());
                self.lower_stmt(body, routine, locals);
                let ctx = self.loop_stack.pop().unwrap();
                // `continue` must still run the step before re-checking
                // the condition, so it targets here rather than loop_start.
                let step_start = routine.here();
                for idx in ctx.continue_jumps {
                    self.patch_target(routine, idx, step_start);
                }
                if let Some(step) = step {
                    self.lower_expr(step, routine, locals);
                }
                let mut back = Instruction::new(Op::Jump);
                back.target = Some(Operand::LabelRef(Label {
                    routine: self.routine_id,
                    index: loop_start,
                }));
                routine.emit(back);
                let end = routine.here();
                if let Some(branch_idx) = branch_idx {
                    self.patch_target(routine, branch_idx, end);
                }
                for idx in ctx.break_jumps {
                    self.patch_target(routine, idx, end);
                }
            }
            StmtKind::Return(value) => {
                let mut instr = Instruction::new(Op::Return);
                if let Some(value) = value {
                    let v = self.lower_expr(value, routine, locals);
                    instr.oper1 = Some(v);
                }
                routine.emit(instr);
            }
            StmtKind::Break => {
                let idx = routine.emit(Instruction::new(Op::Jump));
                if let Some(ctx) = self.loop_stack.last_mut() {
                    ctx.break_jumps.push(idx);
                }
            }
            StmtKind::Continue => {
                let idx = routine.emit(Instruction::new(Op::Jump));
                if let Some(ctx) = self.loop_stack.last_mut() {
                    ctx.continue_jumps.push(idx);
                }
            }
        }
    }

    fn patch_target(&self, routine: &mut Routine, instr_idx: InstrIndex, target: InstrIndex) {
        routine.instructions[instr_idx.0 as usize].target = Some(Operand::LabelRef(Label {
            routine: self.routine_id,
            index: target,
        }));
    }

    /// Lowers `&&`/`||` to branches (short-circuit) and every other
    /// expression to a flat three-address sequence, returning the
    /// operand holding its value.
    fn lower_expr(&mut self, expr: &Expr, routine: &mut Routine, locals: &mut Vec<(String, SymbolId)>) -> Operand {
        match &expr.kind {
            ExprKind::Literal(lit) => self.lower_literal(lit),
            ExprKind::Name(name) => locals
                .iter()
                .rev()
                .find(|(n, _)| n == name)
                .map(|(_, sym)| Operand::Variable(*sym))
                .unwrap_or(Operand::Null),
            ExprKind::Binary { op, lhs, rhs } if matches!(op, BinOp::And | BinOp::Or) => {
                self.lower_short_circuit(op, lhs, rhs, routine, locals)
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let l = self.lower_expr(lhs, routine, locals);
                let r = self.lower_expr(rhs, routine, locals);
                let dest = routine.fresh_temp();
                let mut instr = Instruction::new(binop_to_op(op));
                instr.target = Some(dest);
                instr.oper1 = Some(l);
                instr.oper2 = Some(r);
                routine.emit(instr);
                dest
            }
            ExprKind::Unary { op, operand } => {
                let v = self.lower_expr(operand, routine, locals);
                match op {
                    UnaryOp::Plus => v,
                    UnaryOp::Addr => {
                        let dest = routine.fresh_temp();
                        let mut instr = Instruction::new(Op::Addr);
                        instr.target = Some(dest);
                        instr.oper1 = Some(v);
                        routine.emit(instr);
                        dest
                    }
                    UnaryOp::Deref => {
                        let dest = routine.fresh_temp();
                        let mut instr = Instruction::new(Op::Load);
                        instr.target = Some(dest);
                        instr.oper1 = Some(v);
                        routine.emit(instr);
                        dest
                    }
                    _ => {
                        let dest = routine.fresh_temp();
                        let ir_op = match op {
                            UnaryOp::Neg => Op::Neg,
                            UnaryOp::Not => Op::Not,
                            UnaryOp::Compl => Op::Compl,
                            _ => unreachable!(),
                        };
                        let mut instr = Instruction::new(ir_op);
                        instr.target = Some(dest);
                        instr.oper1 = Some(v);
                        routine.emit(instr);
                        dest
                    }
                }
            }
            ExprKind::Assign { target, value, .. } => {
                let v = self.lower_expr(value, routine, locals);
                let dest = self.lower_expr(target, routine, locals);
                let mut instr = Instruction::new(Op::Mov);
                instr.target = Some(dest);
                instr.oper1 = Some(v);
                routine.emit(instr);
                dest
            }
            ExprKind::Call { callee, args } => {
                for a in args {
                    let v = self.lower_expr(a, routine, locals);
                    let mut arg_instr = Instruction::new(Op::Arg);
                    arg_instr.oper1 = Some(v);
                    routine.emit(arg_instr);
                }
                let callee_operand = match &callee.kind {
                    ExprKind::Name(name) => self.resolve_call_target(name, callee.expr_type),
                    _ => self.lower_expr(callee, routine, locals),
                };
                let dest = routine.fresh_temp();
                let mut instr = Instruction::new(Op::Call);
                instr.target = Some(dest);
                instr.oper1 = Some(callee_operand);
                routine.emit(instr);
                dest
            }
            ExprKind::Member { base, field } => {
                let base_operand = self.lower_expr(base, routine, locals);
                let dest = routine.fresh_temp();
                let mut instr = Instruction::new(Op::MemberAddr { offset_of: field.clone() });
                instr.target = Some(dest);
                instr.oper1 = Some(base_operand);
                routine.emit(instr);
                dest
            }
            ExprKind::Subscript { base, index } => {
                let base_operand = self.lower_expr(base, routine, locals);
                let index_operand = self.lower_expr(index, routine, locals);
                let addr = routine.fresh_temp();
                let mut addr_instr = Instruction::new(Op::Add);
                addr_instr.target = Some(addr);
                addr_instr.oper1 = Some(base_operand);
                addr_instr.oper2 = Some(index_operand);
                routine.emit(addr_instr);
                let dest = routine.fresh_temp();
                let mut load_instr = Instruction::new(Op::Load);
                load_instr.target = Some(dest);
                load_instr.oper1 = Some(addr);
                routine.emit(load_instr);
                dest
            }
            ExprKind::Cast { operand, resolved_type, .. } => {
                let v = self.lower_expr(operand, routine, locals);
                let from = operand.expr_type;
                let to = *resolved_type;
                match (from, to) {
                    (Some(from), Some(to)) => {
                        let dest = routine.fresh_temp();
                        let mut instr = Instruction::new(Op::Cast(self.classify_cast(from, to)));
                        instr.target = Some(dest);
                        instr.oper1 = Some(v);
                        routine.emit(instr);
                        dest
                    }
                    _ => v,
                }
            }
        }
    }

    /// Re-resolves a called-by-name callee back to the overload the
    /// semantic analyzer picked, matching on the callee's recorded
    /// function type since `infer_call` (sema/mod.rs) only stores the
    /// resolved type on the AST node, not the winning `SymbolId`.
    fn resolve_call_target(&self, name: &str, resolved_ty: Option<TypeId>) -> Operand {
        let Some(head) = self.env.lookup(self.env.global, name) else {
            return Operand::Null;
        };
        let chosen = self
            .env
            .overloads(head)
            .into_iter()
            .find(|s| Some(self.env.symbol(*s).ty) == resolved_ty)
            .unwrap_or(head);
        match &self.env.symbol(chosen).kind {
            SymbolKind::ForeignFunction => Operand::ForeignRoutine(chosen),
            _ => Operand::Routine(chosen),
        }
    }

    fn classify_cast(&self, from: TypeId, to: TypeId) -> CastKind {
        let from_ty = self.env.types.get(from);
        let to_ty = self.env.types.get(to);
        match (from_ty, to_ty) {
            (f, t) if f.is_signed_integer() && t.is_float() => CastKind::SignedToFloat,
            (f, t) if f.is_unsigned() && t.is_float() => CastKind::UnsignedToFloat,
            (f, t) if f.is_float() && t.is_signed_integer() => CastKind::FloatToSigned,
            (f, t) if f.is_float() && t.is_unsigned() => CastKind::FloatToUnsigned,
            (Type::F32, Type::F64) => CastKind::FloatWiden,
            (Type::F64, Type::F32) => CastKind::FloatNarrow,
            (f, t) if f.is_integer() && t.is_integer() => {
                let fw = f.int_width().unwrap_or(0);
                let tw = t.int_width().unwrap_or(0);
                if fw <= tw { CastKind::IntWiden } else { CastKind::IntNarrow }
            }
            _ => CastKind::Bitcast,
        }
    }

    fn lower_literal(&mut self, lit: &Literal) -> Operand {
        match lit {
            Literal::Integer(v) | Literal::UnsignedInteger(v) => Operand::ImmInt(*v as i64),
            Literal::Float32(v) => Operand::ImmFloat(*v as f64),
            Literal::Float64(v) => Operand::ImmFloat(*v),
            Literal::Bool(v) => Operand::ImmBool(*v),
            Literal::Char(v) => Operand::ImmInt(*v as i64),
            Literal::String(_) => Operand::Null,
            Literal::Null => Operand::Null,
        }
    }

    /// `a && b` -> compute `a`; if false, result is false without
    /// evaluating `b`. `a || b` -> compute `a`; if true, result is true
    /// without evaluating `b`. Otherwise the result is `b` (spec §4.5
    /// "short-circuit evaluation").
    fn lower_short_circuit(&mut self, op: &BinOp, lhs: &Expr, rhs: &Expr, routine: &mut Routine, locals: &mut Vec<(String, SymbolId)>) -> Operand {
        let dest = routine.fresh_temp();
        let l = self.lower_expr(lhs, routine, locals);
        let mut set_l = Instruction::new(Op::Mov);
        set_l.target = Some(dest);
        set_l.oper1 = Some(l);
        routine.emit(set_l);

        let branch_op = if *op == BinOp::And { Op::JumpIfFalse } else { Op::JumpIfTrue };
        let mut branch = Instruction::new(branch_op);
        branch.oper1 = Some(l);
        let branch_idx = routine.emit(branch);

        let r = self.lower_expr(rhs, routine, locals);
        let mut set_r = Instruction::new(Op::Mov);
        set_r.target = Some(dest);
        set_r.oper1 = Some(r);
        routine.emit(set_r);

        let end = routine.here();
        self.patch_target(routine, branch_idx, end);
        dest
    }
}

fn binop_to_op(op: &BinOp) -> Op {
    match op {
        BinOp::Add => Op::Add,
        BinOp::Sub => Op::Sub,
        BinOp::Mul => Op::Mul,
        BinOp::Div => Op::Div,
        BinOp::Mod => Op::Mod,
        BinOp::Eq => Op::Compare(CompareOp::Eq),
        BinOp::Neq => Op::Compare(CompareOp::Neq),
        BinOp::Lt => Op::Compare(CompareOp::Lt),
        BinOp::Leq => Op::Compare(CompareOp::Leq),
        BinOp::Gt => Op::Compare(CompareOp::Gt),
        BinOp::Geq => Op::Compare(CompareOp::Geq),
        BinOp::BitAnd => Op::BitAnd,
        BinOp::BitOr => Op::BitOr,
        BinOp::BitXor => Op::BitXor,
        BinOp::Shl => Op::Shl,
        BinOp::Shr => Op::Shr,
        BinOp::And | BinOp::Or => unreachable!("short-circuit ops are lowered separately"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{FileLocation, SourceId};
    use std::path::PathBuf;
    use std::rc::Rc;

    fn loc() -> FileLocation {
        FileLocation::new(Rc::new(SourceId { path: PathBuf::from("t.hp") }), 1, 1, 0, 0)
    }

    #[test]
    fn short_circuit_and_emits_a_branch() {
        let env = Environment::new();
        let mut gen = IrGenerator::new(&env);
        let mut routine = Routine::new("f".into(), vec![], false);
        let mut locals = Vec::new();
        let lhs = Expr::new(ExprKind::Literal(Literal::Bool(true)), loc());
        let rhs = Expr::new(ExprKind::Literal(Literal::Bool(false)), loc());
        gen.lower_short_circuit(&BinOp::And, &lhs, &rhs, &mut routine, &mut locals);
        assert!(routine.instructions.iter().any(|i| matches!(i.op, Op::JumpIfFalse)));
    }

    #[test]
    fn if_without_else_patches_branch_to_fallthrough() {
        let env = Environment::new();
        let mut gen = IrGenerator::new(&env);
        let mut routine = Routine::new("f".into(), vec![], false);
        let mut locals = Vec::new();
        let cond = Stmt::new(
            StmtKind::If {
                cond: Expr::new(ExprKind::Literal(Literal::Bool(true)), loc()),
                then_branch: Box::new(Stmt::new(StmtKind::Block(vec![]), loc())),
                else_branch: None,
            },
            loc(),
        );
        gen.lower_stmt(&cond, &mut routine, &mut locals);
        let branch = routine.instructions.iter().find(|i| matches!(i.op, Op::JumpIfFalse)).unwrap();
        match branch.target {
            Some(Operand::LabelRef(label)) => assert_eq!(label.index, routine.here()),
            _ => panic!("expected a patched label target"),
        }
    }

    #[test]
    fn while_loop_jumps_back_to_condition() {
        let env = Environment::new();
        let mut gen = IrGenerator::new(&env);
        let mut routine = Routine::new("f".into(), vec![], false);
        let mut locals = Vec::new();
        let stmt = Stmt::new(
            StmtKind::While {
                cond: Expr::new(ExprKind::Literal(Literal::Bool(true)), loc()),
                body: Box::new(Stmt::new(StmtKind::Block(vec![]), loc())),
            },
            loc(),
        );
        gen.lower_stmt(&stmt, &mut routine, &mut locals);
        let back_jump = routine.instructions.iter().find(|i| matches!(i.op, Op::Jump)).unwrap();
        match back_jump.target {
            Some(Operand::LabelRef(label)) => assert_eq!(label.index, InstrIndex(0)),
            _ => panic!("expected a label target on the back edge"),
        }
    }
}
