//! Source file loading and module path resolution (spec.md §4.4, §6).

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::diagnostics::SourceId;

/// A loaded `.hp` source file: its resolved path and a NUL-terminated
/// in-memory byte buffer (the trailing `\0` terminates the lexer's FSM
/// and is not part of the file's logical contents, spec §6).
pub struct SourceFile {
    pub id: Rc<SourceId>,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn load(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let mut bytes = fs::read(&path)?;
        bytes.push(0);
        Ok(SourceFile {
            id: Rc::new(SourceId { path }),
            bytes,
        })
    }

    pub fn from_memory(path: impl Into<PathBuf>, text: &str) -> Self {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        SourceFile {
            id: Rc::new(SourceId { path: path.into() }),
            bytes,
        }
    }

    /// Source text without the trailing NUL, used by diagnostics to
    /// echo a source line.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes[..self.bytes.len().saturating_sub(1)]).into_owned()
    }
}

/// Resolves `import "foo"` in `importing_file` to a sibling `foo.hp`
/// and deduplicates by canonicalized path so a module already under
/// compilation (or completed) is skipped (spec §4.4, §5).
pub struct ModuleResolver {
    compiled: HashSet<PathBuf>,
}

impl ModuleResolver {
    pub fn new() -> Self {
        ModuleResolver {
            compiled: HashSet::new(),
        }
    }

    pub fn resolve(&self, importing_file: &Path, module_name: &str) -> PathBuf {
        let dir = importing_file.parent().unwrap_or_else(|| Path::new("."));
        dir.join(format!("{module_name}.hp"))
    }

    /// Returns `true` the first time `path` is seen, `false` on every
    /// subsequent call (duplicate imports are silently idempotent).
    pub fn should_compile(&mut self, path: &Path) -> bool {
        let canon = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        self.compiled.insert(canon)
    }
}

impl Default for ModuleResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_appends_hp_extension_relative_to_importer() {
        let resolver = ModuleResolver::new();
        let resolved = resolver.resolve(Path::new("path/to/x.hp"), "foo");
        assert_eq!(resolved, PathBuf::from("path/to/foo.hp"));
    }

    #[test]
    fn duplicate_imports_are_idempotent() {
        let mut resolver = ModuleResolver::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foo.hp");
        std::fs::write(&path, "").unwrap();
        assert!(resolver.should_compile(&path));
        assert!(!resolver.should_compile(&path));
    }

    #[test]
    fn from_memory_appends_nul_terminator() {
        let f = SourceFile::from_memory("mem.hp", "abc");
        assert_eq!(f.bytes, b"abc\0");
    }
}
