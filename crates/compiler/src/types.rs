//! Type system: the `Type` variant, a deduplicating type table, and
//! `check_type_coercion` (spec.md §3 "Type", §4.3).

use std::collections::HashMap;

/// A canonical type handle. Two handles compare equal iff the
/// environment produced them from equal constructions — i.e.
/// referential equality implies semantic equality, except that each
/// textual `struct` definition gets its own distinct handle even if
/// structurally identical to another (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructMember {
    pub name: String,
    pub ty: TypeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    /// Error placeholder. Implicitly "compatible with anything" so a
    /// single mistake does not cascade into unrelated diagnostics.
    None,
    /// Inference placeholder; `Some(base)` once resolved (spec §4.4
    /// return-type inference).
    Pending(Option<TypeId>),
    Null,
    Void,
    Bool,
    Char,
    S8,
    U8,
    S16,
    U16,
    S32,
    U32,
    S64,
    U64,
    F32,
    F64,
    String,
    Pointer(TypeId),
    Struct {
        name: String,
        members: Vec<StructMember>,
    },
    Function {
        params: Vec<TypeId>,
        ret: TypeId,
    },
}

impl Type {
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Type::S8 | Type::U8 | Type::S16 | Type::U16 | Type::S32 | Type::U32 | Type::S64 | Type::U64
        )
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(self, Type::U8 | Type::U16 | Type::U32 | Type::U64)
    }

    pub fn is_signed_integer(&self) -> bool {
        matches!(self, Type::S8 | Type::S16 | Type::S32 | Type::S64)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::F32 | Type::F64)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer(_))
    }

    /// Bit width of an integer type, used by codegen to pick mnemonic
    /// suffixes and by the coercion table to compare widths.
    pub fn int_width(&self) -> Option<u8> {
        Some(match self {
            Type::S8 | Type::U8 => 8,
            Type::S16 | Type::U16 => 16,
            Type::S32 | Type::U32 => 32,
            Type::S64 | Type::U64 => 64,
            _ => return None,
        })
    }
}

/// Owns every canonical type. Pointer types are deduplicated by base
/// handle, function types by (return, params) sequence; `struct` types
/// are never deduplicated against each other (spec §4.3).
pub struct TypeTable {
    types: Vec<Type>,
    pointer_cache: HashMap<TypeId, TypeId>,
    function_cache: HashMap<(TypeId, Vec<TypeId>), TypeId>,
    primitives: PrimitiveIds,
}

#[derive(Debug, Clone, Copy)]
pub struct PrimitiveIds {
    pub none: TypeId,
    pub null: TypeId,
    pub void: TypeId,
    pub bool_: TypeId,
    pub char_: TypeId,
    pub s8: TypeId,
    pub u8: TypeId,
    pub s16: TypeId,
    pub u16: TypeId,
    pub s32: TypeId,
    pub u32: TypeId,
    pub s64: TypeId,
    pub u64: TypeId,
    pub f32: TypeId,
    pub f64: TypeId,
    pub string: TypeId,
}

impl TypeTable {
    pub fn new() -> Self {
        let mut types = Vec::new();
        let mut push = |t: Type, types: &mut Vec<Type>| -> TypeId {
            let id = TypeId(types.len() as u32);
            types.push(t);
            id
        };
        let none = push(Type::None, &mut types);
        let null = push(Type::Null, &mut types);
        let void = push(Type::Void, &mut types);
        let bool_ = push(Type::Bool, &mut types);
        let char_ = push(Type::Char, &mut types);
        let s8 = push(Type::S8, &mut types);
        let u8 = push(Type::U8, &mut types);
        let s16 = push(Type::S16, &mut types);
        let u16 = push(Type::U16, &mut types);
        let s32 = push(Type::S32, &mut types);
        let u32 = push(Type::U32, &mut types);
        let s64 = push(Type::S64, &mut types);
        let u64 = push(Type::U64, &mut types);
        let f32 = push(Type::F32, &mut types);
        let f64 = push(Type::F64, &mut types);
        let string = push(Type::String, &mut types);
        TypeTable {
            types,
            pointer_cache: HashMap::new(),
            function_cache: HashMap::new(),
            primitives: PrimitiveIds {
                none,
                null,
                void,
                bool_,
                char_,
                s8,
                u8,
                s16,
                u16,
                s32,
                u32,
                s64,
                u64,
                f32,
                f64,
                string,
            },
        }
    }

    pub fn primitives(&self) -> PrimitiveIds {
        self.primitives
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: TypeId) -> &mut Type {
        &mut self.types[id.0 as usize]
    }

    fn intern(&mut self, t: Type) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(t);
        id
    }

    pub fn pointer_to(&mut self, base: TypeId) -> TypeId {
        if let Some(&id) = self.pointer_cache.get(&base) {
            return id;
        }
        let id = self.intern(Type::Pointer(base));
        self.pointer_cache.insert(base, id);
        id
    }

    pub fn function(&mut self, params: Vec<TypeId>, ret: TypeId) -> TypeId {
        let key = (ret, params.clone());
        if let Some(&id) = self.function_cache.get(&key) {
            return id;
        }
        let id = self.intern(Type::Function { params, ret });
        self.function_cache.insert(key, id);
        id
    }

    /// Every textual `struct` definition gets a fresh, distinct handle
    /// (spec §3: "struct types by identity").
    pub fn declare_struct(&mut self, name: String, members: Vec<StructMember>) -> TypeId {
        self.intern(Type::Struct { name, members })
    }

    pub fn new_pending(&mut self, base: Option<TypeId>) -> TypeId {
        self.intern(Type::Pending(base))
    }

    pub fn resolve_pending(&mut self, pending: TypeId, base: TypeId) {
        self.types[pending.0 as usize] = Type::Pending(Some(base));
    }

    /// Follows `Pending` chains down to the first non-pending type, or
    /// returns `None` if the chain never resolved.
    pub fn resolved_base(&self, mut id: TypeId) -> Option<TypeId> {
        loop {
            match self.get(id) {
                Type::Pending(Some(base)) => id = *base,
                Type::Pending(None) => return None,
                _ => return Some(id),
            }
        }
    }

    pub fn types_equal(&self, a: TypeId, b: TypeId) -> bool {
        if a == b {
            return true;
        }
        match (self.get(a), self.get(b)) {
            (Type::Pending(Some(ba)), _) => self.types_equal(*ba, b),
            (_, Type::Pending(Some(bb))) => self.types_equal(a, *bb),
            _ => false,
        }
    }

    /// `CheckTypeCoercion(from, to)` (spec §4.3): total predicate over
    /// the type variant, exactly the table in the spec.
    pub fn check_coercion(&self, from: TypeId, to: TypeId) -> bool {
        if self.types_equal(from, to) {
            return true;
        }
        match self.get(from) {
            Type::None => return true,
            Type::Pending(Some(base)) => return self.check_coercion(*base, to),
            Type::Pending(None) => return false,
            _ => {}
        }
        if matches!(self.get(to), Type::None) {
            return true;
        }
        if matches!(self.get(to), Type::Pending(Some(base)) if self.check_coercion(from, *base)) {
            return true;
        }
        if matches!(self.get(from), Type::Null) && matches!(self.get(to), Type::Pointer(_)) {
            return true;
        }
        if let (Type::Pointer(a), Type::Pointer(b)) = (self.get(from), self.get(to)) {
            return self.types_equal(*a, *b);
        }
        let (fw, tw) = (self.get(from).int_width(), self.get(to).int_width());
        if let (Some(fw), Some(tw)) = (fw, tw) {
            let from_unsigned = self.get(from).is_unsigned();
            let to_unsigned = self.get(to).is_unsigned();
            if from_unsigned && to_unsigned {
                return fw <= tw;
            }
            if !from_unsigned && !to_unsigned {
                return fw <= tw;
            }
            if from_unsigned && !to_unsigned {
                // uK -> sL only if the signed type is strictly wider.
                return fw < tw;
            }
            return false;
        }
        if matches!(self.get(from), Type::F32) && matches!(self.get(to), Type::F64) {
            return true;
        }
        false
    }

    /// Smallest type in (s32, s64, u64) [or (u32, u64) if
    /// `explicitly_unsigned`] that holds `value` (spec §4.3 "Integer
    /// literal typing").
    pub fn natural_integer_type(&self, value: u64, explicitly_unsigned: bool) -> TypeId {
        let p = self.primitives;
        if explicitly_unsigned {
            if value <= u32::MAX as u64 {
                p.u32
            } else {
                p.u64
            }
        } else if value <= i32::MAX as u64 {
            p.s32
        } else if value <= i64::MAX as u64 {
            p.s64
        } else {
            p.u64
        }
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_types_dedup_by_base() {
        let mut table = TypeTable::new();
        let p = table.primitives();
        let a = table.pointer_to(p.s32);
        let b = table.pointer_to(p.s32);
        assert_eq!(a, b);
        let c = table.pointer_to(p.u32);
        assert_ne!(a, c);
    }

    #[test]
    fn struct_types_never_dedup() {
        let mut table = TypeTable::new();
        let a = table.declare_struct("Point".into(), vec![]);
        let b = table.declare_struct("Point".into(), vec![]);
        assert_ne!(a, b);
    }

    #[test]
    fn coercion_table_matches_spec() {
        let mut table = TypeTable::new();
        let p = table.primitives();
        assert!(table.check_coercion(p.u8, p.u32));
        assert!(!table.check_coercion(p.u32, p.u8));
        assert!(table.check_coercion(p.s8, p.s64));
        assert!(table.check_coercion(p.u8, p.s64)); // uK -> sL, K<L
        assert!(!table.check_coercion(p.u64, p.s64)); // same width, signed not wider
        assert!(table.check_coercion(p.f32, p.f64));
        assert!(!table.check_coercion(p.f64, p.f32));
        let ptr_s32 = table.pointer_to(p.s32);
        assert!(table.check_coercion(p.null, ptr_s32));
        assert!(!table.check_coercion(p.bool_, p.s32));
    }

    #[test]
    fn none_absorbs_errors_both_directions() {
        let table = TypeTable::new();
        let p = table.primitives();
        assert!(table.check_coercion(p.none, p.s32));
        assert!(table.check_coercion(p.s32, p.none));
    }

    #[test]
    fn natural_integer_type_picks_smallest_fit() {
        let table = TypeTable::new();
        let p = table.primitives();
        assert_eq!(table.natural_integer_type(3, false), p.s32);
        assert_eq!(table.natural_integer_type(i64::MAX as u64, false), p.s64);
        assert_eq!(table.natural_integer_type(u64::MAX, false), p.u64);
        assert_eq!(table.natural_integer_type(3, true), p.u32);
        assert_eq!(table.natural_integer_type(u64::MAX, true), p.u64);
    }

    #[test]
    fn coercion_is_reflexive_for_every_non_none_type() {
        let mut table = TypeTable::new();
        let p = table.primitives();
        let universe = [
            p.null, p.void, p.bool_, p.char_, p.s8, p.u8, p.s16, p.u16, p.s32, p.u32, p.s64, p.u64, p.f32, p.f64,
            p.string,
        ];
        for &t in &universe {
            assert!(table.check_coercion(t, t), "{t:?} should coerce to itself");
        }
        let ptr = table.pointer_to(p.s32);
        assert!(table.check_coercion(ptr, ptr));
    }

    #[test]
    fn widening_is_transitive_over_the_integer_universe() {
        let table = TypeTable::new();
        let p = table.primitives();
        let universe = [p.s8, p.u8, p.s16, p.u16, p.s32, p.u32, p.s64, p.u64, p.f32, p.f64];
        for &a in &universe {
            for &b in &universe {
                for &c in &universe {
                    if table.check_coercion(a, b) && table.check_coercion(b, c) {
                        assert!(
                            table.check_coercion(a, c),
                            "expected transitivity: {a:?} -> {b:?} -> {c:?}"
                        );
                    }
                }
            }
        }
    }
}
