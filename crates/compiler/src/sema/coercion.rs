//! Binary-operator type coercion (spec.md §4.4 "Binary-operator type
//! coercion").

use crate::types::{PrimitiveIds, Type, TypeId, TypeTable};

/// Result of computing a binary operator's numeric result type: the
/// chosen type plus, for each operand, whether it needs a synthetic
/// cast inserted (its current type differs from the result).
pub struct NumericResult {
    pub result_type: TypeId,
    pub lhs_needs_cast: bool,
    pub rhs_needs_cast: bool,
}

/// Computes the result type of a numeric binary operator applied to
/// `ltype`/`rtype`, per the ordered, commutative rule list in spec
/// §4.4: f64 dominates; else f32; else u64 (mixing a signed operand in
/// is an error); else s64; else u32 promotes a signed operand to s64
/// (otherwise the pair becomes u32); else s32 (the default, both
/// operands cast to s32 if not already there).
pub fn numeric_result_type(p: &PrimitiveIds, table: &TypeTable, ltype: TypeId, rtype: TypeId) -> Result<NumericResult, String> {
    if !table.get(ltype).is_numeric() || !table.get(rtype).is_numeric() {
        return Err("binary operator requires numeric operands".into());
    }
    let result = if ltype == p.f64 || rtype == p.f64 {
        p.f64
    } else if ltype == p.f32 || rtype == p.f32 {
        p.f32
    } else if ltype == p.u64 || rtype == p.u64 {
        let (u64_side, other) = if ltype == p.u64 { (ltype, rtype) } else { (rtype, ltype) };
        let _ = u64_side;
        if table.get(other).is_signed_integer() {
            return Err("cannot mix a signed integer with u64".into());
        }
        p.u64
    } else if ltype == p.s64 || rtype == p.s64 {
        p.s64
    } else if ltype == p.u32 || rtype == p.u32 {
        let other = if ltype == p.u32 { rtype } else { ltype };
        if table.get(other).is_signed_integer() {
            p.s64
        } else {
            p.u32
        }
    } else {
        p.s32
    };
    Ok(NumericResult {
        result_type: result,
        lhs_needs_cast: ltype != result,
        rhs_needs_cast: rtype != result,
    })
}

pub fn is_pointer_or_null(table: &TypeTable, id: TypeId) -> bool {
    matches!(table.get(id), Type::Pointer(_) | Type::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s2_two_s32_literals_need_no_cast() {
        let table = TypeTable::new();
        let p = table.primitives();
        let r = numeric_result_type(&p, &table, p.s32, p.s32).unwrap();
        assert_eq!(r.result_type, p.s32);
        assert!(!r.lhs_needs_cast && !r.rhs_needs_cast);
    }

    #[test]
    fn s3_u32_plus_s16_promotes_both_to_s64() {
        let table = TypeTable::new();
        let p = table.primitives();
        let r = numeric_result_type(&p, &table, p.u32, p.s16).unwrap();
        assert_eq!(r.result_type, p.s64);
        assert!(r.lhs_needs_cast && r.rhs_needs_cast);
    }

    #[test]
    fn f64_dominates_over_any_other_numeric() {
        let table = TypeTable::new();
        let p = table.primitives();
        assert_eq!(numeric_result_type(&p, &table, p.f64, p.s8).unwrap().result_type, p.f64);
        assert_eq!(numeric_result_type(&p, &table, p.s64, p.f64).unwrap().result_type, p.f64);
    }

    #[test]
    fn mixing_signed_with_u64_is_an_error() {
        let table = TypeTable::new();
        let p = table.primitives();
        assert!(numeric_result_type(&p, &table, p.u64, p.s8).is_err());
    }

    #[test]
    fn u32_with_unsigned_other_stays_u32() {
        let table = TypeTable::new();
        let p = table.primitives();
        let r = numeric_result_type(&p, &table, p.u32, p.u8).unwrap();
        assert_eq!(r.result_type, p.u32);
    }
}
