//! Linear-scan register allocation over one already-selected routine
//! (spec.md §4.7 "register allocation"): a single forward pass assigns
//! each temporary a physical register from a small caller-saved pool,
//! spilling to a stack slot the temporary whose next use is farthest
//! away when the pool runs out.

use std::collections::HashMap;

use crate::codegen::abi::Reg;
use crate::config::Target;
use crate::ir::{Operand, Routine};

/// General-purpose registers available to the allocator, in
/// assignment-preference order: caller-saved scratch registers first
/// (cheapest to use, since they need no prologue/epilogue save),
/// callee-saved registers last (only spent when scratch runs out).
fn candidate_pool(target: Target) -> Vec<Reg> {
    let mut pool = vec![Reg::Rax, Reg::R10, Reg::R11];
    match target {
        Target::Amd64Windows => pool.extend([Reg::Rdi, Reg::Rsi, Reg::Rbx, Reg::R12, Reg::R13, Reg::R14, Reg::R15]),
        Target::Amd64Unix => pool.extend([Reg::Rbx, Reg::R12, Reg::R13, Reg::R14, Reg::R15]),
    }
    pool
}

fn candidate_xmm_pool() -> Vec<u8> {
    (0..=7).collect()
}

pub struct Allocation {
    pub int_regs: HashMap<u32, Reg>,
    pub xmm_regs: HashMap<u32, u8>,
    pub spill_slots: HashMap<u32, i64>,
    /// Stack offset for each named variable (parameters and locals),
    /// keyed by the `SymbolId` backing its `Operand::Variable`. Unlike
    /// temporaries, variables are never register-allocated: every
    /// reference addresses the same memory slot for the routine's whole
    /// lifetime, so they get one slot apiece up front.
    pub var_slots: HashMap<u32, i64>,
    pub callee_saved_used: Vec<Reg>,
    pub frame_size: i64,
}

struct LiveRange {
    temp: u32,
    start: usize,
    end: usize,
}

fn operand_temp(op: &Operand) -> Option<u32> {
    match op {
        Operand::Temp(id) => Some(*id),
        _ => None,
    }
}

fn collect_live_ranges(routine: &Routine) -> Vec<LiveRange> {
    let mut first_def: HashMap<u32, usize> = HashMap::new();
    let mut last_use: HashMap<u32, usize> = HashMap::new();
    for (i, instr) in routine.instructions.iter().enumerate() {
        if let Some(t) = instr.target.as_ref().and_then(operand_temp) {
            first_def.entry(t).or_insert(i);
            last_use.entry(t).and_modify(|e| *e = (*e).max(i)).or_insert(i);
        }
        for operand in [&instr.oper1, &instr.oper2] {
            if let Some(t) = operand.as_ref().and_then(operand_temp) {
                last_use.entry(t).and_modify(|e| *e = (*e).max(i)).or_insert(i);
                first_def.entry(t).or_insert(i);
            }
        }
    }
    let mut ranges: Vec<LiveRange> = first_def
        .into_iter()
        .map(|(temp, start)| LiveRange {
            temp,
            start,
            end: *last_use.get(&temp).unwrap_or(&start),
        })
        .collect();
    ranges.sort_by_key(|r| r.start);
    ranges
}

/// A temporary is a float-typed value if every definition of it comes
/// from a `Cast` to a float kind or an immediate float; lacking type
/// information on `Operand` itself, the caller-provided `is_float`
/// predicate (backed by the instruction selector's per-temp type
/// table) makes the call instead of this module guessing from opcodes.
pub fn allocate(routine: &Routine, target: Target, is_float_temp: impl Fn(u32) -> bool) -> Allocation {
    let ranges = collect_live_ranges(routine);
    let int_pool = candidate_pool(target);
    let xmm_pool = candidate_xmm_pool();

    let mut int_regs: HashMap<u32, Reg> = HashMap::new();
    let mut xmm_regs: HashMap<u32, u8> = HashMap::new();
    let mut spill_slots: HashMap<u32, i64> = HashMap::new();
    let mut callee_saved_used: Vec<Reg> = Vec::new();
    let mut next_spill_offset: i64 = 8;

    // active[reg] = end index of the range currently holding it
    let mut int_active: HashMap<Reg, usize> = HashMap::new();
    let mut xmm_active: HashMap<u8, usize> = HashMap::new();

    for range in &ranges {
        // Retire registers whose owning range has already ended.
        int_active.retain(|_, end| *end >= range.start);
        xmm_active.retain(|_, end| *end >= range.start);

        if is_float_temp(range.temp) {
            if let Some(&reg) = xmm_pool.iter().find(|r| !xmm_active.contains_key(*r)) {
                xmm_active.insert(reg, range.end);
                xmm_regs.insert(range.temp, reg);
                continue;
            }
            spill_slots.insert(range.temp, next_spill_offset);
            next_spill_offset += 8;
            continue;
        }

        if let Some(&reg) = int_pool.iter().find(|r| !int_active.contains_key(*r)) {
            int_active.insert(reg, range.end);
            int_regs.insert(range.temp, reg);
            if reg.is_callee_saved(target) && !callee_saved_used.contains(&reg) {
                callee_saved_used.push(reg);
            }
            continue;
        }

        // Pool exhausted: spill whichever active register's range ends
        // farthest in the future, freeing it for `range` if doing so
        // helps (classic linear-scan spill heuristic).
        if let Some((&farthest_reg, &farthest_end)) = int_active.iter().max_by_key(|(_, end)| **end) {
            if farthest_end > range.end {
                let spilled_temp = int_regs
                    .iter()
                    .find(|(_, r)| **r == farthest_reg)
                    .map(|(t, _)| *t);
                if let Some(spilled_temp) = spilled_temp {
                    spill_slots.insert(spilled_temp, next_spill_offset);
                    next_spill_offset += 8;
                    int_regs.remove(&spilled_temp);
                    int_active.remove(&farthest_reg);
                    int_active.insert(farthest_reg, range.end);
                    int_regs.insert(range.temp, farthest_reg);
                    continue;
                }
            }
        }
        spill_slots.insert(range.temp, next_spill_offset);
        next_spill_offset += 8;
    }

    // Variables never share a temp's register; each gets its own slot,
    // continuing the same stack-offset counter used for spills.
    let mut var_ids: Vec<u32> = routine.params.iter().map(|s| s.0).collect();
    for instr in &routine.instructions {
        for operand in [instr.target.as_ref(), instr.oper1.as_ref(), instr.oper2.as_ref()] {
            if let Some(Operand::Variable(sym)) = operand {
                if !var_ids.contains(&sym.0) {
                    var_ids.push(sym.0);
                }
            }
        }
    }
    let mut var_slots: HashMap<u32, i64> = HashMap::new();
    for id in var_ids {
        var_slots.insert(id, next_spill_offset);
        next_spill_offset += 8;
    }

    // `emit_prologue` pushes one callee-saved register per entry in
    // `callee_saved_used` AFTER `sub rsp, frame_size`, so those bytes
    // must be folded into the 16-byte alignment here, then subtracted
    // back out of what `sub` itself reserves (spec's rsp%16==0-at-call
    // invariant).
    let callee_saved_bytes = (callee_saved_used.len() as i64) * 8;
    let frame_size = crate::codegen::abi::align_to_16(next_spill_offset + callee_saved_bytes) - callee_saved_bytes;
    Allocation {
        int_regs,
        xmm_regs,
        spill_slots,
        var_slots,
        callee_saved_used,
        frame_size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Instruction, Op};

    fn instr(op: Op, target: Option<Operand>, o1: Option<Operand>, o2: Option<Operand>) -> Instruction {
        Instruction { op, target, oper1: o1, oper2: o2, comment: None }
    }

    fn test_routine() -> Routine {
        Routine {
            name: "f".into(),
            params: Vec::new(),
            instructions: Vec::new(),
            temp_counter: 0,
            is_foreign: false,
        }
    }

    #[test]
    fn disjoint_live_ranges_share_a_register() {
        let mut routine = test_routine();
        routine.instructions.push(instr(Op::Mov, Some(Operand::Temp(0)), Some(Operand::ImmInt(1)), None));
        routine.instructions.push(instr(Op::Mov, None, Some(Operand::Temp(0)), None));
        routine.instructions.push(instr(Op::Mov, Some(Operand::Temp(1)), Some(Operand::ImmInt(2)), None));
        routine.instructions.push(instr(Op::Mov, None, Some(Operand::Temp(1)), None));
        let alloc = allocate(&routine, Target::Amd64Unix, |_| false);
        assert_eq!(alloc.int_regs.get(&0), alloc.int_regs.get(&1));
    }

    #[test]
    fn overlapping_ranges_get_distinct_registers() {
        let mut routine = test_routine();
        routine.instructions.push(instr(Op::Mov, Some(Operand::Temp(0)), Some(Operand::ImmInt(1)), None));
        routine.instructions.push(instr(Op::Mov, Some(Operand::Temp(1)), Some(Operand::ImmInt(2)), None));
        routine.instructions.push(instr(Op::Add, Some(Operand::Temp(2)), Some(Operand::Temp(0)), Some(Operand::Temp(1))));
        let alloc = allocate(&routine, Target::Amd64Unix, |_| false);
        assert_ne!(alloc.int_regs.get(&0), alloc.int_regs.get(&1));
    }
}
