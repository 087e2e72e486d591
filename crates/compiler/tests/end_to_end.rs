//! End-to-end pipeline tests: compile a small `.hp` program all the
//! way to assembly text and check the result shape (spec.md §2 "Design
//! goals"), rather than re-checking individual phase internals (those
//! have their own unit tests alongside the code).

use std::path::Path;

use hollowc::{CompilerConfig, StopAfter, Target, compile_source};

fn write_fixture(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn arithmetic_program_compiles_clean() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(
        &dir,
        "main.hp",
        r#"
        add :: (a: s32, b: s32) : s32 {
            return a + b;
        }

        main :: () : s32 {
            x := add(2, 3);
            return x;
        }
        "#,
    );
    let config = CompilerConfig::new(Target::Amd64Unix);
    let outcome = compile_source(&path, &config);
    assert_eq!(outcome.error_count, 0, "{}", outcome.diagnostic_text);
    let asm = outcome.assembly.expect("clean program should produce assembly");
    assert!(asm.contains("global main"));
    assert!(asm.contains("global add"));
}

#[test]
fn control_flow_and_loops_lower_without_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(
        &dir,
        "main.hp",
        r#"
        sum_to :: (n: s32) : s32 {
            total := 0;
            i := 0;
            while (i < n) {
                if (i == 5) {
                    i = i + 1;
                    continue;
                }
                total = total + i;
                i = i + 1;
            }
            return total;
        }

        main :: () : s32 {
            return sum_to(10);
        }
        "#,
    );
    let config = CompilerConfig::new(Target::Amd64Unix);
    let outcome = compile_source(&path, &config);
    assert_eq!(outcome.error_count, 0, "{}", outcome.diagnostic_text);
    assert!(outcome.assembly.is_some());
}

#[test]
fn short_circuit_boolean_operators_compile() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(
        &dir,
        "main.hp",
        r#"
        either :: (a: bool, b: bool) : bool {
            return a || b;
        }

        main :: () : s32 {
            ok := either(true, false) && !false;
            if (ok) {
                return 0;
            }
            return 1;
        }
        "#,
    );
    let config = CompilerConfig::new(Target::Amd64Unix);
    let outcome = compile_source(&path, &config);
    assert_eq!(outcome.error_count, 0, "{}", outcome.diagnostic_text);
}

#[test]
fn foreign_function_emits_extern_directive() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(
        &dir,
        "main.hp",
        r#"
        foreign {
            putchar :: (c: s32) : s32;
        }

        main :: () : s32 {
            return putchar(65);
        }
        "#,
    );
    let config = CompilerConfig::new(Target::Amd64Unix);
    let outcome = compile_source(&path, &config);
    assert_eq!(outcome.error_count, 0, "{}", outcome.diagnostic_text);
    let asm = outcome.assembly.unwrap();
    assert!(asm.contains("extern putchar"));
    assert!(!asm.contains("global putchar"));
}

#[test]
fn struct_field_access_compiles() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(
        &dir,
        "main.hp",
        r#"
        Point :: struct {
            x: s32,
            y: s32
        }

        manhattan :: (p: Point) : s32 {
            return p.x + p.y;
        }

        main :: () : s32 {
            p : Point;
            p.x = 3;
            p.y = 4;
            return manhattan(p);
        }
        "#,
    );
    let config = CompilerConfig::new(Target::Amd64Unix);
    let outcome = compile_source(&path, &config);
    assert_eq!(outcome.error_count, 0, "{}", outcome.diagnostic_text);
}

#[test]
fn parameter_is_stored_from_its_abi_register_in_the_prologue() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(
        &dir,
        "main.hp",
        r#"
        identity :: (x: s32) : s32 {
            return x;
        }

        main :: () : s32 {
            return identity(9);
        }
        "#,
    );
    let unix_asm = compile_source(&path, &CompilerConfig::new(Target::Amd64Unix))
        .assembly
        .expect("unix build should succeed");
    // The prologue must move the incoming arg register into the
    // parameter's stack slot, and the `return x;` must read it back
    // from that same slot rather than from a literal 0.
    assert!(unix_asm.contains("mov [rbp-8], rdi"), "{unix_asm}");
    assert!(unix_asm.contains("mov rax, [rbp-8]"), "{unix_asm}");

    let windows_asm = compile_source(&path, &CompilerConfig::new(Target::Amd64Windows))
        .assembly
        .expect("windows build should succeed");
    assert!(windows_asm.contains("mov [rbp-8], rcx"), "{windows_asm}");
}

#[test]
fn windows_and_unix_targets_both_produce_distinct_assembly() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(
        &dir,
        "main.hp",
        r#"
        add3 :: (a: s32, b: s32, c: s32) : s32 {
            return a + b + c;
        }

        main :: () : s32 {
            return add3(1, 2, 3);
        }
        "#,
    );
    let unix_asm = compile_source(&path, &CompilerConfig::new(Target::Amd64Unix))
        .assembly
        .expect("unix build should succeed");
    let windows_asm = compile_source(&path, &CompilerConfig::new(Target::Amd64Windows))
        .assembly
        .expect("windows build should succeed");
    assert!(unix_asm.contains("AMD64 Unix"));
    assert!(windows_asm.contains("AMD64 Windows"));
    assert_ne!(unix_asm, windows_asm);
}

#[test]
fn stop_after_check_skips_codegen_on_clean_program() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(&dir, "main.hp", "main :: () : s32 { return 0; }");
    let config = CompilerConfig::new(Target::Amd64Unix).with_stop_after(StopAfter::Check);
    let outcome = compile_source(&path, &config);
    assert_eq!(outcome.error_count, 0);
    assert!(outcome.assembly.is_none());
    assert_eq!(outcome.reached, StopAfter::Check);
}

#[test]
fn undeclared_name_is_reported_and_produces_no_assembly() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(
        &dir,
        "main.hp",
        r#"
        main :: () : s32 {
            return undeclared_thing;
        }
        "#,
    );
    let outcome = compile_source(&path, &CompilerConfig::default());
    assert!(outcome.error_count > 0);
    assert!(outcome.assembly.is_none());
}

#[test]
fn imported_module_contributes_to_overload_resolution() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(
        &dir,
        "mathlib.hp",
        r#"
        square :: (x: s32) : s32 {
            return x * x;
        }
        "#,
    );
    let path = write_fixture(
        &dir,
        "main.hp",
        r#"
        import "mathlib";

        main :: () : s32 {
            return square(7);
        }
        "#,
    );
    let outcome = compile_source(&path, &CompilerConfig::default());
    assert_eq!(outcome.error_count, 0, "{}", outcome.diagnostic_text);
    let asm = outcome.assembly.unwrap();
    assert!(asm.contains("global square"));
}

#[test]
fn diagnostics_echo_source_line_for_early_errors() {
    let outcome = compile_source(Path::new("/does/not/exist.hp"), &CompilerConfig::default());
    assert!(outcome.diagnostic_text.contains("could not read file"));
}
