//! Phase sequencing (spec.md §5 "Driver", §6): lex -> parse -> analyze
//! -> generate IR -> select & allocate -> print, recursively pulling in
//! imported modules at the parse stage and stopping at whichever phase
//! `CompilerConfig::stop_after` names or the diagnostic cap is hit
//! first (spec §5 "error cancellation").

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Instant;

use hollow_core::{Arena, ArenaStats};

use crate::ast::Program;
use crate::codegen;
use crate::config::{CompilerConfig, StopAfter};
use crate::diagnostics::DiagnosticBag;
use crate::ir::IrGenerator;
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::sema::Analyzer;
use crate::source::{ModuleResolver, SourceFile};
use crate::symbols::Environment;

/// Result of one whole-program compilation: the generated assembly (if
/// every phase up to the configured `stop_after` succeeded without
/// exceeding the error cap) and the formatted diagnostics to show the
/// user regardless.
pub struct CompileOutcome {
    pub assembly: Option<String>,
    pub diagnostic_text: String,
    pub error_count: usize,
    pub reached: StopAfter,
    pub phase_timings: Vec<(&'static str, std::time::Duration)>,
    /// Arena usage for the loaded source text, present only when
    /// `CompilerConfig::diagnose_memory` is set.
    pub memory_stats: Option<ArenaStats>,
}

impl CompileOutcome {
    pub fn succeeded(&self) -> bool {
        self.assembly.is_some() && self.error_count == 0
    }
}

struct Timer {
    enabled: bool,
    marks: Vec<(&'static str, std::time::Duration)>,
}

impl Timer {
    fn new(enabled: bool) -> Self {
        Timer { enabled, marks: Vec::new() }
    }

    fn time<T>(&mut self, phase: &'static str, f: impl FnOnce() -> T) -> T {
        if !self.enabled {
            return f();
        }
        let start = Instant::now();
        let result = f();
        self.marks.push((phase, start.elapsed()));
        result
    }
}

/// Compiles the program rooted at `entry_path` according to `config`.
pub fn compile_source(entry_path: &Path, config: &CompilerConfig) -> CompileOutcome {
    let mut bag = DiagnosticBag::new(config.max_error_count, config.max_line_arrow_error_count);
    let mut timer = Timer::new(config.profile_time);
    // Source text is copied into this arena purely so `--diagnose-memory`
    // has something concrete to report; diagnostics borrow straight out
    // of it instead of holding their own `String` copies.
    let arena = Arena::new();
    let mut texts: HashMap<PathBuf, &str> = HashMap::new();

    let entry_file = match SourceFile::load(entry_path) {
        Ok(f) => f,
        Err(e) => {
            let mut text = String::new();
            text.push_str(&format!("{}: could not read file: {e}\n", entry_path.display()));
            return CompileOutcome {
                assembly: None,
                diagnostic_text: text,
                error_count: 1,
                reached: StopAfter::Lex,
                phase_timings: Vec::new(),
                memory_stats: None,
            };
        }
    };
    texts.insert(entry_path.to_path_buf(), arena.alloc_str(&entry_file.text()));

    let entry_tokens = timer.time("lex", || Lexer::new(entry_file.id.clone(), &entry_file.bytes).tokenize(&mut bag));
    if config.stop_after == StopAfter::Lex || bag.should_stop() {
        return finish(bag, None, StopAfter::Lex, &texts, timer, &arena, config.diagnose_memory);
    }

    let mut program = Program::default();
    let mut resolver = ModuleResolver::new();
    resolver.should_compile(entry_path);

    let entry_module = timer.time("parse", || Parser::parse_module(&entry_tokens, &mut bag));
    program.absorb(entry_module.clone());

    let mut pending: VecDeque<(PathBuf, String)> = entry_module
        .decls
        .iter()
        .filter_map(|d| match d {
            crate::ast::TopLevelDecl::Import(import) => Some((resolver.resolve(entry_path, &import.module_name), import.module_name.clone())),
            _ => None,
        })
        .collect();

    while let Some((path, _module_name)) = pending.pop_front() {
        if bag.should_stop() {
            break;
        }
        if !resolver.should_compile(&path) {
            continue;
        }
        let file = match SourceFile::load(&path) {
            Ok(f) => f,
            Err(e) => {
                bag.push(crate::diagnostics::Diagnostic::error(
                    crate::diagnostics::FileLocation::new(entry_file.id.clone(), 1, 1, 0, 0),
                    format!("cannot open imported module '{}': {e}", path.display()),
                ));
                continue;
            }
        };
        texts.insert(path.clone(), arena.alloc_str(&file.text()));
        let tokens = timer.time("lex", || Lexer::new(file.id.clone(), &file.bytes).tokenize(&mut bag));
        let module = timer.time("parse", || Parser::parse_module(&tokens, &mut bag));
        for decl in &module.decls {
            if let crate::ast::TopLevelDecl::Import(import) = decl {
                pending.push_back((resolver.resolve(&path, &import.module_name), import.module_name.clone()));
            }
        }
        program.absorb(module);
    }

    if config.stop_after == StopAfter::Parse || bag.should_stop() {
        return finish(bag, None, StopAfter::Parse, &texts, timer, &arena, config.diagnose_memory);
    }

    let mut env = Environment::new();
    timer.time("check", || Analyzer::new(&mut env, &mut bag).analyze(&mut program));
    if config.stop_after == StopAfter::Check || bag.should_stop() || bag.has_errors() {
        return finish(bag, None, StopAfter::Check, &texts, timer, &arena, config.diagnose_memory);
    }

    let ir_program = timer.time("ir", || IrGenerator::new(&env).lower_program(&program));
    if config.stop_after == StopAfter::Ir {
        return finish(bag, None, StopAfter::Ir, &texts, timer, &arena, config.diagnose_memory);
    }

    let assembly = timer.time("codegen", || codegen::generate(&ir_program, config.target));
    if config.stop_after == StopAfter::Codegen {
        return finish(bag, Some(assembly), StopAfter::Codegen, &texts, timer, &arena, config.diagnose_memory);
    }

    // Assembling and linking are delegated to external tools (spec §5
    // "Non-goals"); reaching `StopAfter::Link` just means the text this
    // driver is responsible for is ready to hand off.
    finish(bag, Some(assembly), StopAfter::Link, &texts, timer, &arena, config.diagnose_memory)
}

fn finish(
    bag: DiagnosticBag,
    assembly: Option<String>,
    reached: StopAfter,
    texts: &HashMap<PathBuf, &str>,
    timer: Timer,
    arena: &Arena,
    diagnose_memory: bool,
) -> CompileOutcome {
    let mut diagnostic_text = String::new();
    bag.print(&mut diagnostic_text, |path| texts.get(path).map(|s| s.to_string()));
    CompileOutcome {
        assembly,
        diagnostic_text,
        error_count: bag.error_count(),
        reached,
        phase_timings: timer.marks,
        memory_stats: if diagnose_memory { Some(arena.stats()) } else { None },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Target;

    #[test]
    fn lex_only_stop_reports_no_assembly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.hp");
        std::fs::write(&path, "main :: () { return; }").unwrap();
        let config = CompilerConfig::new(Target::Amd64Unix).with_stop_after(StopAfter::Lex);
        let outcome = compile_source(&path, &config);
        assert!(outcome.assembly.is_none());
        assert_eq!(outcome.reached, StopAfter::Lex);
    }

    #[test]
    fn diagnose_memory_reports_nonzero_arena_usage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.hp");
        std::fs::write(&path, "main :: () : s32 { return 0; }").unwrap();
        let config = CompilerConfig::new(Target::Amd64Unix).with_diagnose_memory(true);
        let outcome = compile_source(&path, &config);
        assert!(outcome.memory_stats.unwrap().allocated_bytes > 0);
    }

    #[test]
    fn missing_entry_file_is_one_diagnostic() {
        let outcome = compile_source(Path::new("/nonexistent/path/x.hp"), &CompilerConfig::default());
        assert_eq!(outcome.error_count, 1);
        assert!(outcome.assembly.is_none());
    }

    #[test]
    fn clean_program_reaches_codegen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.hp");
        std::fs::write(&path, "main :: () : s32 { return 0; }").unwrap();
        let config = CompilerConfig::new(Target::Amd64Unix);
        let outcome = compile_source(&path, &config);
        assert_eq!(outcome.error_count, 0);
        assert!(outcome.assembly.is_some());
    }
}
