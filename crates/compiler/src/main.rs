//! hollowc CLI
//!
//! Command-line front end for the hollow compiler (spec.md §6):
//! `build` compiles one source file (pulling in its transitive imports)
//! down to AMD64 assembly text for a chosen target.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{Shell, generate};
use std::io;
use std::path::PathBuf;
use std::process;
use std::str::FromStr;

use hollowc::{CompilerConfig, ConfigFile, StopAfter, Target, compile_source};

#[derive(ClapParser)]
#[command(name = "hollowc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "hollow compiler - lower hollow programs to AMD64 assembly", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a .hp file (and its imports) to AMD64 assembly
    Build {
        /// Input .hp source file
        input: PathBuf,

        /// Output assembly path (defaults to input filename with .asm extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Project config file (TOML); CLI flags below override its settings
        #[arg(long)]
        config: Option<PathBuf>,

        /// Target calling convention
        #[arg(long)]
        target: Option<String>,

        /// Stop the maximum number of diagnostics reported before bailing out
        #[arg(long)]
        max_errors: Option<usize>,

        /// Maximum number of diagnostics that additionally echo a source line and caret
        #[arg(long)]
        max_line_arrows: Option<usize>,

        /// Phase after which to stop (lex, parse, check, ir, codegen, link)
        #[arg(long)]
        stop_after: Option<String>,

        /// Print allocator diagnostics to stderr after compiling
        #[arg(long)]
        diagnose_memory: bool,

        /// Print a per-phase timing breakdown to stderr after compiling
        #[arg(long)]
        profile_time: bool,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            output,
            config,
            target,
            max_errors,
            max_line_arrows,
            stop_after,
            diagnose_memory,
            profile_time,
        } => run_build(BuildArgs {
            input,
            output,
            config,
            target,
            max_errors,
            max_line_arrows,
            stop_after,
            diagnose_memory,
            profile_time,
        }),
        Commands::Completions { shell } => run_completions(shell),
    }
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "hollowc", &mut io::stdout());
}

struct BuildArgs {
    input: PathBuf,
    output: Option<PathBuf>,
    config: Option<PathBuf>,
    target: Option<String>,
    max_errors: Option<usize>,
    max_line_arrows: Option<usize>,
    stop_after: Option<String>,
    diagnose_memory: bool,
    profile_time: bool,
}

fn run_build(args: BuildArgs) {
    let mut config = CompilerConfig::default();

    if let Some(path) = &args.config {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) => {
                eprintln!("Error reading config file {}: {e}", path.display());
                process::exit(1);
            }
        };
        let file = match ConfigFile::from_toml(&text) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        };
        config = match file.apply_to(config) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        };
    }

    if let Some(target) = &args.target {
        match Target::from_str(target) {
            Ok(t) => config.target = t,
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
    }
    if let Some(stop_after) = &args.stop_after {
        match StopAfter::from_str(stop_after) {
            Ok(s) => config.stop_after = s,
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
    }
    if let Some(n) = args.max_errors {
        config.max_error_count = n;
    }
    if let Some(n) = args.max_line_arrows {
        config.max_line_arrow_error_count = n;
    }
    if args.diagnose_memory {
        config.diagnose_memory = true;
    }
    if args.profile_time {
        config.profile_time = true;
    }

    let outcome = compile_source(&args.input, &config);

    if !outcome.diagnostic_text.is_empty() {
        eprint!("{}", outcome.diagnostic_text);
    }

    if config.profile_time {
        for (phase, elapsed) in &outcome.phase_timings {
            eprintln!("  {phase}: {elapsed:?}");
        }
    }

    if let Some(stats) = outcome.memory_stats {
        eprintln!("  arena: {} bytes", stats.allocated_bytes);
    }

    let Some(assembly) = outcome.assembly else {
        process::exit(1);
    };

    let output = args.output.unwrap_or_else(|| args.input.with_extension("asm"));
    if let Err(e) = std::fs::write(&output, assembly) {
        eprintln!("Error writing {}: {e}", output.display());
        process::exit(1);
    }
    println!("Compiled {} -> {}", args.input.display(), output.display());

    if outcome.error_count > 0 {
        process::exit(1);
    }
}
