//! Diagnostic collection and formatting (spec.md §6/§7).
//!
//! Errors are plain data, not a trait-object error type: every phase
//! pushes a [`Diagnostic`] onto the shared [`DiagnosticBag`] and keeps
//! going in a reduced mode (spec §7 "errors are reported immediately...
//! downstream code continues"). The bag's running count is what later
//! phases check to decide whether to bail out (spec §5 cancellation).

use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// A 1-based (line, column) position plus byte offsets, attached to
/// every token, AST node, IR instruction and diagnostic (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLocation {
    pub file: Rc<SourceId>,
    pub line: u32,
    pub column: u32,
    pub offset_start: u32,
    pub offset_end: u32,
}

impl FileLocation {
    pub fn new(file: Rc<SourceId>, line: u32, column: u32, offset_start: u32, offset_end: u32) -> Self {
        FileLocation {
            file,
            line,
            column,
            offset_start,
            offset_end,
        }
    }
}

/// Identifies a source file for diagnostic printing without owning its
/// contents (the lexer owns the byte buffer separately).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceId {
    pub path: PathBuf,
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Severity is always "error" in this compiler (spec has no warnings),
/// but the field exists so the printer has a single formatting path to
/// extend if that ever changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub location: FileLocation,
    pub message: String,
}

impl Diagnostic {
    pub fn error(location: FileLocation, message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            location,
            message: message.into(),
        }
    }
}

/// Collects diagnostics for the whole compilation and decides when a
/// phase should stop early (spec §5/§6 `max_error_count`).
pub struct DiagnosticBag {
    diagnostics: Vec<Diagnostic>,
    max_error_count: usize,
    max_line_arrow_error_count: usize,
}

impl DiagnosticBag {
    pub fn new(max_error_count: usize, max_line_arrow_error_count: usize) -> Self {
        DiagnosticBag {
            diagnostics: Vec::new(),
            max_error_count,
            max_line_arrow_error_count,
        }
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    /// True once the configured cap is reached; phases call this at
    /// their natural per-item continuation point and stop producing
    /// further diagnostics for the current compilation unit.
    pub fn should_stop(&self) -> bool {
        self.diagnostics.len() >= self.max_error_count
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Writes every collected diagnostic to `out` in the format
    /// `filename:line:col: message`, padded to at least 7 characters
    /// after the second colon. The first `max_line_arrow_error_count`
    /// diagnostics additionally echo the source line and a caret
    /// column indicator, read back from `source_text`.
    pub fn print(&self, out: &mut dyn fmt::Write, source_text: impl Fn(&Path) -> Option<String>) {
        for (i, d) in self.diagnostics.iter().enumerate() {
            let prefix = format!("{}:{}:{}:", d.location.file.path.display(), d.location.line, d.location.column);
            let pad_to = prefix.len() + (7usize.saturating_sub(digits_len(d.location.line) + digits_len(d.location.column) + 2));
            let _ = write!(out, "{}", prefix);
            for _ in prefix.len()..pad_to.max(prefix.len() + 1) {
                let _ = write!(out, " ");
            }
            let _ = writeln!(out, " {}", d.message);

            if i < self.max_line_arrow_error_count {
                if let Some(text) = source_text(&d.location.file.path) {
                    if let Some(line) = text.lines().nth((d.location.line as usize).saturating_sub(1)) {
                        let _ = writeln!(out, "{}", line);
                        let col = d.location.column as usize;
                        if col > 0 && col < 81 {
                            let _ = writeln!(out, "{}^", "-".repeat(col - 1));
                        }
                    }
                }
            }
        }
    }
}

fn digits_len(mut n: u32) -> usize {
    if n == 0 {
        return 1;
    }
    let mut len = 0;
    while n > 0 {
        len += 1;
        n /= 10;
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(line: u32, column: u32) -> FileLocation {
        FileLocation::new(
            Rc::new(SourceId { path: PathBuf::from("t.hp") }),
            line,
            column,
            0,
            0,
        )
    }

    #[test]
    fn should_stop_once_max_reached() {
        let mut bag = DiagnosticBag::new(2, 4);
        assert!(!bag.should_stop());
        bag.push(Diagnostic::error(loc(1, 1), "a"));
        assert!(!bag.should_stop());
        bag.push(Diagnostic::error(loc(2, 1), "b"));
        assert!(bag.should_stop());
    }

    #[test]
    fn print_pads_location_prefix() {
        let mut bag = DiagnosticBag::new(6, 4);
        bag.push(Diagnostic::error(loc(1, 1), "bad token"));
        let mut out = String::new();
        bag.print(&mut out, |_| None);
        assert!(out.starts_with("t.hp:1:1:"));
        assert!(out.contains("bad token"));
    }
}
