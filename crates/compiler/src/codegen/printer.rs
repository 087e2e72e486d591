//! Textual assembly emission (spec.md §4.7 "printer"): renders the
//! selected `AsmLine`s for every routine as NASM-flavoured Intel-syntax
//! text, one `.asm` file per compiled program.

use crate::codegen::amd64::AsmLine;
use crate::config::Target;
use crate::ir::IrProgram;

fn line_text(line: &AsmLine) -> String {
    match line {
        AsmLine::Label(name) => format!("{name}:"),
        AsmLine::Instr { mnemonic, operands } => {
            if operands.is_empty() {
                format!("    {mnemonic}")
            } else {
                format!("    {mnemonic} {}", operands.join(", "))
            }
        }
        AsmLine::Directive(text) => text.clone(),
        AsmLine::Blank => String::new(),
    }
}

/// Prints a whole selected program. `routine_lines` holds one
/// `Vec<AsmLine>` per non-foreign `ir::Routine`, produced by
/// [`crate::codegen::amd64::select_routine`]; foreign routines
/// contribute only their `extern` declaration, not a body.
pub fn print_program(program: &IrProgram, routine_lines: &[Vec<AsmLine>], target: Target) -> String {
    let mut out = String::new();
    out.push_str("bits 64\n");
    out.push_str("default rel\n\n");

    let externs: Vec<&str> = program
        .routines
        .iter()
        .filter(|r| r.is_foreign)
        .map(|r| r.name.as_str())
        .collect();
    for name in &externs {
        out.push_str(&format!("extern {name}\n"));
    }
    if !externs.is_empty() {
        out.push('\n');
    }

    out.push_str(&format!("; target: {}\n", target.banner()));
    out.push_str("section .text\n");
    for routine in &program.routines {
        if !routine.is_foreign {
            out.push_str(&format!("global {}\n", routine.name));
        }
    }
    out.push('\n');

    for lines in routine_lines {
        for line in lines {
            out.push_str(&line_text(line));
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::amd64::AsmLine;

    #[test]
    fn instr_with_operands_is_indented_and_comma_joined() {
        let line = AsmLine::Instr { mnemonic: "mov".into(), operands: vec!["rax".into(), "5".into()] };
        assert_eq!(line_text(&line), "    mov rax, 5");
    }

    #[test]
    fn label_has_no_indentation() {
        let line = AsmLine::Label("main".into());
        assert_eq!(line_text(&line), "main:");
    }

    #[test]
    fn program_header_declares_foreign_routines_as_extern() {
        let program = IrProgram { routines: Vec::new() };
        let text = print_program(&program, &[], Target::Amd64Unix);
        assert!(text.contains("bits 64"));
    }
}
