//! AMD64 instruction selection (spec.md §4.7): lowers one `ir::Routine`
//! plus its register allocation into a flat list of `AsmLine`s. Each
//! IR instruction maps to a short, fixed sequence of real AMD64
//! instructions; there is no peephole pass (spec §4.7 "Non-goals").

use crate::codegen::abi::{self, Reg};
use crate::codegen::regalloc::Allocation;
use crate::config::Target;
use crate::ir::{CastKind, CompareOp, Instruction, Label, Op, Operand, Routine};

#[derive(Debug, Clone)]
pub enum AsmLine {
    Label(String),
    Instr { mnemonic: String, operands: Vec<String> },
    Directive(String),
    Blank,
}

impl AsmLine {
    fn instr(mnemonic: impl Into<String>, operands: Vec<String>) -> Self {
        AsmLine::Instr { mnemonic: mnemonic.into(), operands }
    }
}

fn local_label(routine_name: &str, idx: u32) -> String {
    format!(".L{routine_name}_{idx}")
}

/// Where an `Operand` lives once temporaries have been assigned
/// registers or spill slots.
fn operand_text(op: &Operand, alloc: &Allocation, routine_name: &str) -> String {
    match op {
        Operand::Variable(sym) => match alloc.var_slots.get(&sym.0) {
            Some(offset) => format!("[rbp-{offset}]"),
            None => format!("; unassigned var{}", sym.0),
        },
        Operand::Temp(id) => {
            if let Some(reg) = alloc.int_regs.get(id) {
                reg.name64()
            } else if let Some(xmm) = alloc.xmm_regs.get(id) {
                format!("xmm{xmm}")
            } else if let Some(offset) = alloc.spill_slots.get(id) {
                format!("[rbp-{offset}]")
            } else {
                format!("; unassigned t{id}")
            }
        }
        Operand::ImmInt(v) => v.to_string(),
        Operand::ImmFloat(v) => format!("{v}"),
        Operand::ImmBool(v) => if *v { "1".into() } else { "0".into() },
        Operand::LabelRef(Label { index, .. }) => local_label(routine_name, index.0),
        Operand::Routine(sym) => format!("fn_{}", sym.0),
        Operand::ForeignRoutine(sym) => format!("extern_{}", sym.0),
        Operand::Null => "0".to_string(),
    }
}

struct Selector<'a> {
    alloc: &'a Allocation,
    target: Target,
    routine_name: &'a str,
    out: Vec<AsmLine>,
}

impl<'a> Selector<'a> {
    fn text(&self, op: &Operand) -> String {
        operand_text(op, self.alloc, self.routine_name)
    }

    fn emit(&mut self, mnemonic: &str, operands: Vec<String>) {
        self.out.push(AsmLine::instr(mnemonic, operands));
    }

    fn select(&mut self, instr: &Instruction) {
        match &instr.op {
            Op::Mov => {
                let dst = self.text(instr.target.as_ref().expect("mov needs a target"));
                let src = self.text(instr.oper1.as_ref().expect("mov needs a source"));
                self.emit("mov", vec![dst, src]);
            }
            Op::Add | Op::Sub | Op::BitAnd | Op::BitOr | Op::BitXor => {
                let dst = self.text(instr.target.as_ref().unwrap());
                let a = self.text(instr.oper1.as_ref().unwrap());
                let b = self.text(instr.oper2.as_ref().unwrap());
                let mnemonic = match instr.op {
                    Op::Add => "add",
                    Op::Sub => "sub",
                    Op::BitAnd => "and",
                    Op::BitOr => "or",
                    Op::BitXor => "xor",
                    _ => unreachable!(),
                };
                self.emit("mov", vec![dst.clone(), a]);
                self.emit(mnemonic, vec![dst, b]);
            }
            Op::Mul => {
                let dst = self.text(instr.target.as_ref().unwrap());
                let a = self.text(instr.oper1.as_ref().unwrap());
                let b = self.text(instr.oper2.as_ref().unwrap());
                self.emit("mov", vec![dst.clone(), a]);
                self.emit("imul", vec![dst, b]);
            }
            Op::Div | Op::Mod => {
                let dst = self.text(instr.target.as_ref().unwrap());
                let a = self.text(instr.oper1.as_ref().unwrap());
                let b = self.text(instr.oper2.as_ref().unwrap());
                self.emit("mov", vec![Reg::Rax.name64(), a]);
                self.emit("cqo", vec![]);
                self.emit("idiv", vec![b]);
                let result_reg = if matches!(instr.op, Op::Div) { Reg::Rax } else { Reg::Rdx };
                self.emit("mov", vec![dst, result_reg.name64()]);
            }
            Op::Shl | Op::Shr => {
                let dst = self.text(instr.target.as_ref().unwrap());
                let a = self.text(instr.oper1.as_ref().unwrap());
                let b = self.text(instr.oper2.as_ref().unwrap());
                let mnemonic = if matches!(instr.op, Op::Shl) { "shl" } else { "sar" };
                self.emit("mov", vec![dst.clone(), a]);
                self.emit("mov", vec![Reg::Rcx.name64(), b]);
                self.emit(mnemonic, vec![dst, "cl".to_string()]);
            }
            Op::Neg | Op::Not | Op::Compl => {
                let dst = self.text(instr.target.as_ref().unwrap());
                let a = self.text(instr.oper1.as_ref().unwrap());
                let mnemonic = match instr.op {
                    Op::Neg => "neg",
                    Op::Compl => "not",
                    Op::Not => "xor",
                    _ => unreachable!(),
                };
                self.emit("mov", vec![dst.clone(), a]);
                if matches!(instr.op, Op::Not) {
                    // Boolean negation: dst ^= 1 (operands are 0/1).
                    self.emit(mnemonic, vec![dst, "1".to_string()]);
                } else {
                    self.emit(mnemonic, vec![dst]);
                }
            }
            Op::Compare(cmp) => {
                let dst = self.text(instr.target.as_ref().unwrap());
                let a = self.text(instr.oper1.as_ref().unwrap());
                let b = self.text(instr.oper2.as_ref().unwrap());
                self.emit("mov", vec![dst.clone(), "0".to_string()]);
                self.emit("cmp", vec![a, b]);
                let set_mnemonic = match cmp {
                    CompareOp::Eq => "sete",
                    CompareOp::Neq => "setne",
                    CompareOp::Lt => "setl",
                    CompareOp::Leq => "setle",
                    CompareOp::Gt => "setg",
                    CompareOp::Geq => "setge",
                };
                self.emit(set_mnemonic, vec!["al".to_string()]);
                self.emit("movzx", vec![dst, "al".to_string()]);
            }
            Op::Cast(kind) => self.select_cast(*kind, instr),
            Op::Addr => {
                let dst = self.text(instr.target.as_ref().unwrap());
                let src = self.text(instr.oper1.as_ref().unwrap());
                self.emit("lea", vec![dst, src]);
            }
            Op::Load => {
                let dst = self.text(instr.target.as_ref().unwrap());
                let src = self.text(instr.oper1.as_ref().unwrap());
                self.emit("mov", vec![dst, format!("[{src}]")]);
            }
            Op::Store => {
                let dst = self.text(instr.target.as_ref().unwrap());
                let src = self.text(instr.oper1.as_ref().unwrap());
                self.emit("mov", vec![format!("[{dst}]"), src]);
            }
            Op::MemberAddr { offset_of } => {
                let dst = self.text(instr.target.as_ref().unwrap());
                let base = self.text(instr.oper1.as_ref().unwrap());
                self.emit("lea", vec![dst, format!("[{base}+{offset_of}]")]);
            }
            Op::Jump => {
                let target = self.text(instr.target.as_ref().expect("jump needs a target"));
                self.emit("jmp", vec![target]);
            }
            Op::JumpIfTrue | Op::JumpIfFalse => {
                let cond = self.text(instr.oper1.as_ref().unwrap());
                let target = self.text(instr.target.as_ref().expect("branch needs a target"));
                self.emit("cmp", vec![cond, "0".to_string()]);
                let mnemonic = if matches!(instr.op, Op::JumpIfTrue) { "jne" } else { "je" };
                self.emit(mnemonic, vec![target]);
            }
            Op::LabelMark => {}
            Op::Arg => {
                // Argument placement (which register/stack slot) is
                // resolved per-call by counting Arg instructions back
                // to the preceding Call; see `select_call_args`.
            }
            Op::Call => self.select_call(instr),
            Op::Return => {
                if let Some(v) = &instr.oper1 {
                    let src = self.text(v);
                    self.emit("mov", vec![Reg::Rax.name64(), src]);
                }
                self.emit("jmp", vec![format!(".L{}_epilogue", self.routine_name)]);
            }
        }
    }

    fn select_cast(&mut self, kind: CastKind, instr: &Instruction) {
        let dst = self.text(instr.target.as_ref().unwrap());
        let src = self.text(instr.oper1.as_ref().unwrap());
        match kind {
            CastKind::SignedToFloat => self.emit("cvtsi2sd", vec![dst, src]),
            CastKind::UnsignedToFloat => {
                // No direct unsigned-int-to-double instruction; widen
                // through a zero-extended 64-bit temporary first.
                self.emit("movzx", vec![dst.clone(), src]);
                self.emit("cvtsi2sd", vec![dst.clone(), dst]);
            }
            CastKind::FloatToSigned => self.emit("cvttsd2si", vec![dst, src]),
            CastKind::FloatToUnsigned => self.emit("cvttsd2si", vec![dst, src]),
            CastKind::FloatWiden => self.emit("cvtss2sd", vec![dst, src]),
            CastKind::FloatNarrow => self.emit("cvtsd2ss", vec![dst, src]),
            CastKind::IntWiden => self.emit("movsx", vec![dst, src]),
            CastKind::IntNarrow | CastKind::Bitcast => self.emit("mov", vec![dst, src]),
        }
    }

    fn select_call(&mut self, instr: &Instruction) {
        let callee = self.text(instr.oper1.as_ref().expect("call needs a callee"));
        let shadow = abi::shadow_space_bytes(self.target);
        if shadow > 0 {
            self.emit("sub", vec![Reg::Rsp.name64(), shadow.to_string()]);
        }
        self.emit("call", vec![callee]);
        if shadow > 0 {
            self.emit("add", vec![Reg::Rsp.name64(), shadow.to_string()]);
        }
        if let Some(dst) = &instr.target {
            let dst = self.text(dst);
            self.emit("mov", vec![dst, Reg::Rax.name64()]);
        }
    }
}

/// Selects AMD64 instructions for `routine`, labelling every
/// instruction index that some jump in the routine targets.
pub fn select_routine(routine: &Routine, alloc: &Allocation, target: Target) -> Vec<AsmLine> {
    let jump_targets = collect_jump_targets(routine);
    let mut selector = Selector { alloc, target, routine_name: &routine.name, out: Vec::new() };

    selector.out.push(AsmLine::Label(routine.name.clone()));
    emit_prologue(&mut selector, alloc, routine);

    for (i, instr) in routine.instructions.iter().enumerate() {
        let idx = i as u32;
        if jump_targets.contains(&idx) {
            selector.out.push(AsmLine::Label(local_label(&routine.name, idx)));
        }
        if matches!(instr.op, Op::Arg) {
            continue; // folded into the following Call by select_call_args
        }
        if matches!(instr.op, Op::Call) {
            select_call_args(&mut selector, routine, i);
        }
        selector.select(instr);
    }

    selector.out.push(AsmLine::Label(format!(".L{}_epilogue", routine.name)));
    emit_epilogue(&mut selector, alloc);
    selector.out.push(AsmLine::Blank);
    selector.out
}

fn collect_jump_targets(routine: &Routine) -> std::collections::HashSet<u32> {
    let mut targets = std::collections::HashSet::new();
    for instr in &routine.instructions {
        for operand in [&instr.target, &instr.oper1, &instr.oper2] {
            if let Some(Operand::LabelRef(label)) = operand {
                targets.insert(label.index.0);
            }
        }
    }
    targets
}

/// Walks backward from a `Call` instruction over the immediately
/// preceding `Arg` instructions (emitted left-to-right by `ir::lower_expr`)
/// and places each into its ABI argument register or, past the
/// register count, a stack slot (spec §4.6).
fn select_call_args(selector: &mut Selector<'_>, routine: &Routine, call_idx: usize) {
    let mut start = call_idx;
    while start > 0 && matches!(routine.instructions[start - 1].op, Op::Arg) {
        start -= 1;
    }
    let args: Vec<&Operand> = routine.instructions[start..call_idx]
        .iter()
        .filter_map(|i| i.oper1.as_ref())
        .collect();
    let int_regs = abi::integer_arg_registers(selector.target);
    for (i, arg) in args.iter().enumerate() {
        let src = selector.text(arg);
        if i < int_regs.len() {
            selector.emit("mov", vec![int_regs[i].name64(), src]);
        } else {
            selector.emit("push", vec![src]);
        }
    }
}

fn emit_prologue(selector: &mut Selector<'_>, alloc: &Allocation, routine: &Routine) {
    selector.emit("push", vec![Reg::Rbp.name64()]);
    selector.emit("mov", vec![Reg::Rbp.name64(), Reg::Rsp.name64()]);
    if alloc.frame_size > 0 {
        selector.emit("sub", vec![Reg::Rsp.name64(), alloc.frame_size.to_string()]);
    }
    for reg in &alloc.callee_saved_used {
        selector.emit("push", vec![reg.name64()]);
    }
    // The register allocator never hands a temp one of these registers
    // (see regalloc::candidate_pool), so storing them once here is safe
    // against any later instruction clobbering the incoming value.
    let arg_regs = abi::integer_arg_registers(selector.target);
    for (param, reg) in routine.params.iter().zip(arg_regs.iter()) {
        let dst = selector.text(&Operand::Variable(*param));
        selector.emit("mov", vec![dst, reg.name64()]);
    }
}

fn emit_epilogue(selector: &mut Selector<'_>, alloc: &Allocation) {
    for reg in alloc.callee_saved_used.iter().rev() {
        selector.emit("pop", vec![reg.name64()]);
    }
    selector.emit("mov", vec![Reg::Rsp.name64(), Reg::Rbp.name64()]);
    selector.emit("pop", vec![Reg::Rbp.name64()]);
    selector.emit("ret", vec![]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::SymbolId;
    use std::collections::HashMap;

    fn test_alloc() -> Allocation {
        Allocation {
            int_regs: HashMap::new(),
            xmm_regs: HashMap::new(),
            spill_slots: HashMap::new(),
            var_slots: HashMap::new(),
            callee_saved_used: Vec::new(),
            frame_size: 0,
        }
    }

    fn test_routine(params: Vec<SymbolId>) -> Routine {
        Routine {
            name: "f".into(),
            params,
            instructions: Vec::new(),
            temp_counter: 0,
            is_foreign: false,
        }
    }

    #[test]
    fn mov_with_temp_and_immediate_operands() {
        let alloc = test_alloc();
        let mut selector = Selector { alloc: &alloc, target: Target::Amd64Unix, routine_name: "f", out: Vec::new() };
        let instr = Instruction {
            op: Op::Mov,
            target: Some(Operand::Temp(0)),
            oper1: Some(Operand::ImmInt(5)),
            oper2: None,
            comment: None,
        };
        selector.select(&instr);
        assert!(matches!(&selector.out[0], AsmLine::Instr { mnemonic, .. } if mnemonic == "mov"));
    }

    #[test]
    fn division_uses_cqo_and_idiv() {
        let alloc = test_alloc();
        let mut selector = Selector { alloc: &alloc, target: Target::Amd64Unix, routine_name: "f", out: Vec::new() };
        let instr = Instruction {
            op: Op::Div,
            target: Some(Operand::Temp(0)),
            oper1: Some(Operand::Temp(1)),
            oper2: Some(Operand::Temp(2)),
            comment: None,
        };
        selector.select(&instr);
        assert!(selector.out.iter().any(|l| matches!(l, AsmLine::Instr { mnemonic, .. } if mnemonic == "idiv")));
    }

    #[test]
    fn prologue_stores_incoming_arg_registers_into_param_slots() {
        let mut alloc = test_alloc();
        alloc.var_slots.insert(7, 8);
        let routine = test_routine(vec![SymbolId(7)]);
        let mut selector = Selector { alloc: &alloc, target: Target::Amd64Unix, routine_name: "f", out: Vec::new() };
        emit_prologue(&mut selector, &alloc, &routine);
        assert!(selector.out.iter().any(
            |l| matches!(l, AsmLine::Instr { mnemonic, operands } if mnemonic == "mov" && operands[0] == "[rbp-8]" && operands[1] == "rdi")
        ));
    }

    #[test]
    fn shadow_space_wraps_calls_on_windows_only() {
        let alloc = test_alloc();
        let mut selector = Selector { alloc: &alloc, target: Target::Amd64Windows, routine_name: "f", out: Vec::new() };
        let instr = Instruction { op: Op::Call, target: None, oper1: Some(Operand::Routine(SymbolId(0))), oper2: None, comment: None };
        selector.select(&instr);
        assert!(selector.out.iter().any(|l| matches!(l, AsmLine::Instr { mnemonic, operands } if mnemonic == "sub" && operands[1] == "32")));
    }
}
