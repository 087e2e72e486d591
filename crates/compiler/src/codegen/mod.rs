//! AMD64 code generation (spec.md §4.6, §4.7): register allocation,
//! instruction selection, and textual printing, run per routine over
//! the IR produced by [`crate::ir`].

pub mod abi;
pub mod amd64;
pub mod printer;
pub mod regalloc;

use crate::config::Target;
use crate::ir::{IrProgram, Operand};

/// A temporary is treated as float-valued if anything ever moves an
/// `ImmFloat` into it or casts its value to a float kind; this is a
/// coarse approximation (spec §4.7 leaves exact float-temp tracking to
/// the instruction selector) good enough to steer allocation between
/// the integer and xmm register files.
fn float_temps(routine: &crate::ir::Routine) -> std::collections::HashSet<u32> {
    let mut floats = std::collections::HashSet::new();
    for instr in &routine.instructions {
        let produces_float = matches!(instr.oper1, Some(Operand::ImmFloat(_)))
            || matches!(
                instr.op,
                crate::ir::Op::Cast(crate::ir::CastKind::SignedToFloat)
                    | crate::ir::Op::Cast(crate::ir::CastKind::UnsignedToFloat)
                    | crate::ir::Op::Cast(crate::ir::CastKind::FloatWiden)
                    | crate::ir::Op::Cast(crate::ir::CastKind::FloatNarrow)
            );
        if produces_float {
            if let Some(Operand::Temp(id)) = instr.target {
                floats.insert(id);
            }
        }
    }
    floats
}

/// Generates the final assembly text for a whole lowered program.
pub fn generate(program: &IrProgram, target: Target) -> String {
    let mut routine_lines = Vec::new();
    for routine in &program.routines {
        if routine.is_foreign {
            continue;
        }
        let floats = float_temps(routine);
        let alloc = regalloc::allocate(routine, target, |id| floats.contains(&id));
        routine_lines.push(amd64::select_routine(routine, &alloc, target));
    }
    printer::print_program(program, &routine_lines, target)
}
