//! Interned names: a string plus a precomputed hash, used as the
//! lookup key in every symbol table (spec.md §3 "Name").
//!
//! Two `Name`s compare equal iff byte-equal. The precomputed FNV hash
//! rides alongside the text for diagnostics that want a stable,
//! platform-independent fingerprint; `HashMap` bucket placement still
//! goes through the text itself (see the `Hash` impl below), so a
//! `Name` and the `&str` it borrows as always land in the same bucket.

use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};

/// FNV-1a, 32-bit. Stable across runs and platforms, which matters
/// because some diagnostics reference the hash for overload-name
/// disambiguation.
const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// An interned name: owned text plus its precomputed hash.
///
/// `Name` is cheap to clone (an `Rc`-free owned `Box<str>` copy).
/// `Eq` compares the raw bytes; `hash32()` exposes the precomputed FNV
/// value separately from the `Hash` impl used for map lookups.
#[derive(Debug, Clone)]
pub struct Name {
    text: Box<str>,
    hash: u32,
}

impl Name {
    pub fn new(text: impl AsRef<str>) -> Self {
        let text = text.as_ref();
        Name {
            text: text.into(),
            hash: fnv1a_32(text.as_bytes()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn hash32(&self) -> u32 {
        self.hash
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}
impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Must match `str`'s `Hash` impl byte-for-byte: `Borrow<str>`
        // below lets callers look a `Name` up by `&str`, and `HashMap`
        // hashes the query key with its own `Hash` impl, not `Name`'s —
        // if the two disagreed, a lookup by `&str` would probe the
        // wrong bucket and silently miss an entry that's actually there.
        self.text.hash(state);
    }
}

impl Borrow<str> for Name {
    fn borrow(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Name::new(s)
    }
}

impl From<String> for Name {
    fn from(s: String) -> Self {
        Name::new(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn equal_names_have_equal_hash_and_bytes() {
        let a = Name::new("foo");
        let b = Name::new("foo");
        assert_eq!(a, b);
        assert_eq!(a.hash32(), b.hash32());
    }

    #[test]
    fn distinct_names_compare_unequal() {
        assert_ne!(Name::new("foo"), Name::new("bar"));
    }

    #[test]
    fn usable_as_hashmap_key() {
        let mut map: HashMap<Name, i32> = HashMap::new();
        map.insert(Name::new("x"), 1);
        assert_eq!(map.get("x").copied(), Some(1));
    }

    #[test]
    fn fnv_is_stable_for_known_input() {
        // FNV-1a 32-bit of the empty string is the offset basis.
        assert_eq!(fnv1a_32(b""), FNV_OFFSET_BASIS);
    }
}
