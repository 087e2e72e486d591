//! Function overload resolution (spec.md §4.4 "Overload resolution").

use crate::symbols::{Environment, SymbolId};
use crate::types::{Type, TypeId};

pub enum OverloadOutcome {
    Resolved(SymbolId),
    NoMatch,
    Ambiguous(SymbolId, SymbolId),
}

/// Per-argument score: exact type equality = 3; coercion preserving
/// integral signedness = 2; any other accepted coercion = 1; no
/// coercion makes the whole candidate ineligible.
fn score_arg(env: &Environment, param_ty: TypeId, arg_ty: TypeId) -> Option<i64> {
    if env.types.types_equal(param_ty, arg_ty) {
        return Some(3);
    }
    if !env.types.check_coercion(arg_ty, param_ty) {
        return None;
    }
    let param = env.types.get(param_ty);
    let arg = env.types.get(arg_ty);
    let preserves_signedness = param.is_integer() && arg.is_integer() && param.is_unsigned() == arg.is_unsigned();
    Some(if preserves_signedness { 2 } else { 1 })
}

fn score_candidate(env: &Environment, candidate: SymbolId, arg_types: &[TypeId]) -> Option<i64> {
    let Type::Function { params, .. } = env.types.get(env.symbol(candidate).ty) else {
        return None;
    };
    if params.len() != arg_types.len() {
        return None;
    }
    let params = params.clone();
    let mut total = 0i64;
    for (param_ty, arg_ty) in params.iter().zip(arg_types) {
        total += score_arg(env, *param_ty, *arg_ty)?;
    }
    Some(total)
}

/// Resolves a call `f(a1..an)` where `f`'s symbol heads an overload
/// chain. The strictly-highest-scoring candidate wins; a tie among
/// candidates scoring >= 1 is reported as ambiguous.
pub fn resolve_overload(env: &Environment, head: SymbolId, arg_types: &[TypeId]) -> OverloadOutcome {
    let candidates = env.overloads(head);
    let scored: Vec<(SymbolId, i64)> = candidates
        .into_iter()
        .filter_map(|c| score_candidate(env, c, arg_types).map(|s| (c, s)))
        .collect();
    if scored.is_empty() {
        return OverloadOutcome::NoMatch;
    }
    let max = scored.iter().map(|(_, s)| *s).max().unwrap();
    let winners: Vec<SymbolId> = scored.iter().filter(|(_, s)| *s == max).map(|(c, _)| *c).collect();
    if winners.len() > 1 {
        OverloadOutcome::Ambiguous(winners[0], winners[1])
    } else {
        OverloadOutcome::Resolved(winners[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::SourceId;
    use crate::symbols::{Symbol, SymbolFlags, SymbolKind};
    use hollow_core::Name;
    use std::path::PathBuf;
    use std::rc::Rc;

    fn loc() -> crate::diagnostics::FileLocation {
        crate::diagnostics::FileLocation::new(Rc::new(SourceId { path: PathBuf::from("t.hp") }), 1, 1, 0, 0)
    }

    fn declare_fn(env: &mut Environment, name: &str, params: Vec<TypeId>, ret: TypeId) -> SymbolId {
        let ty = env.types.function(params, ret);
        env.declare(
            env.global,
            Symbol {
                name: Name::from(name),
                kind: SymbolKind::Function,
                ty,
                location: loc(),
                flags: SymbolFlags::empty(),
                next_overload: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn s4_exact_match_picked_over_other_overload() {
        let mut env = Environment::new();
        let p = env.types.primitives();
        let f_s32 = declare_fn(&mut env, "f", vec![p.s32], p.s32);
        declare_fn(&mut env, "f", vec![p.f32], p.f32);
        match resolve_overload(&env, f_s32, &[p.s32]) {
            OverloadOutcome::Resolved(sym) => assert_eq!(env.symbol(sym).ty, env.symbol(f_s32).ty),
            _ => panic!("expected a resolved overload"),
        }
    }

    #[test]
    fn no_matching_arity_is_no_match() {
        let mut env = Environment::new();
        let p = env.types.primitives();
        let head = declare_fn(&mut env, "f", vec![p.s32], p.s32);
        assert!(matches!(resolve_overload(&env, head, &[p.s32, p.s32]), OverloadOutcome::NoMatch));
    }

    #[test]
    fn equally_good_coercions_are_ambiguous() {
        let mut env = Environment::new();
        let p = env.types.primitives();
        // u8 -> u16 and u8 -> u32 are both signedness-preserving
        // coercions (score 2 each) for a single-arg call with a u8 literal.
        let head = declare_fn(&mut env, "g", vec![p.u16], p.void);
        declare_fn(&mut env, "g", vec![p.u32], p.void);
        assert!(matches!(resolve_overload(&env, head, &[p.u8]), OverloadOutcome::Ambiguous(_, _)));
    }
}
