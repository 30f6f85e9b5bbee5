//! llforth compiler CLI
//!
//! Compiles llforth source to LLVM IR, runs it on the bytecode VM, prints
//! inferred signatures, or starts an interactive session.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{Shell, generate};
use llforthc::{CompileError, CompilerConfig, Session, VmBackend};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(name = "llforthc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "llforth compiler - infer stack effects and generate code", long_about = None)]
struct Cli {
    /// Compiler configuration (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log compilation progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a source file to LLVM IR
    Build {
        /// Input source file
        input: PathBuf,

        /// Output .ll path (defaults to the input with a .ll extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run a source file on the bytecode VM
    Run {
        /// Input source file
        input: PathBuf,
    },

    /// Print the inferred signature of every word in a source file
    Check {
        /// Input source file
        input: PathBuf,
    },

    /// Start an interactive session
    Repl,

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match cli.config.as_deref().map(CompilerConfig::load).transpose() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => fail(&e),
    };

    match cli.command {
        Commands::Build { input, output } => {
            let output = output.unwrap_or_else(|| input.with_extension("ll"));
            run_build(&input, &output, &config);
        }
        Commands::Run { input } => run_file(&input, &config),
        Commands::Check { input } => run_check(&input, &config),
        Commands::Repl => run_repl(config),
        Commands::Completions { shell } => run_completions(shell),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "llforthc=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn fail(error: &CompileError) -> ! {
    eprintln!("Error: {}", error);
    process::exit(1);
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "llforthc", &mut io::stdout());
}

fn run_build(input: &Path, output: &Path, config: &CompilerConfig) {
    match llforthc::compile_file(input, output, config) {
        Ok(()) => println!("Compiled {} -> {}", input.display(), output.display()),
        Err(e) => fail(&e),
    }
}

fn run_file(input: &Path, config: &CompilerConfig) {
    let result =
        llforthc::read_source(input).and_then(|source| llforthc::run_source(&source, config));
    match result {
        Ok(output) => print!("{}", output),
        Err(e) => fail(&e),
    }
}

fn run_check(input: &Path, config: &CompilerConfig) {
    let result =
        llforthc::read_source(input).and_then(|source| llforthc::check_source(&source, config));
    match result {
        Ok(words) => {
            for (name, signature) in words {
                println!("{} {}", name, signature);
            }
        }
        Err(e) => fail(&e),
    }
}

fn run_repl(config: CompilerConfig) {
    let mut session = match Session::with_config(VmBackend::new(), config) {
        Ok(session) => session,
        Err(e) => fail(&e),
    };
    let mut rl = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("Error initializing readline: {}", e);
            process::exit(1);
        }
    };

    info!("starting repl");
    println!("llforth {} - Ctrl-D to exit", env!("CARGO_PKG_VERSION"));

    let mut pending = String::new();
    loop {
        let prompt = if pending.is_empty() { "ok> " } else { "..> " };
        match rl.readline(prompt) {
            Ok(line) => {
                if line.trim().is_empty() && pending.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line.as_str());
                pending.push_str(&line);
                pending.push('\n');
                // Keep reading until the definition is closed
                if llforthc::driver::is_incomplete(&pending) {
                    continue;
                }

                let source = std::mem::take(&mut pending);
                let result = session.run(&source);
                let output = session.take_output();
                print!("{}", output);
                match result {
                    Ok(()) => {
                        if !output.is_empty() && !output.ends_with('\n') {
                            println!();
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "input rejected");
                        println!("Error: {}", e);
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                pending.clear();
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }
}
