//! Fourg CLI: run or disassemble a resolved program.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::rc::Rc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use log::info;

use fourg::config::VmConfig;
use fourg::error::FourgError;
use fourg::vm::{disassemble, NativeRegistry, Vm};

#[derive(Parser, Debug)]
#[command(name = "fourg", version)]
#[command(about = "Bytecode VM for resolved fourg programs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile and run a program given as resolved-tree JSON
    Run {
        program: PathBuf,

        /// Print the disassembly before running
        #[arg(long)]
        disassemble: bool,

        /// Print heap statistics after the run
        #[arg(long)]
        stats: bool,

        /// Print the heap statistics as JSON instead
        #[arg(long, requires = "stats")]
        json: bool,

        /// Live objects before the first collection
        #[arg(long)]
        gc_threshold: Option<usize>,

        /// Amount the threshold grows by after every collection
        #[arg(long)]
        gc_increment: Option<usize>,

        /// Stack limit in slots
        #[arg(long)]
        max_stack: Option<usize>,
    },
    /// Print the disassembly of a program
    Disasm {
        program: PathBuf,

        /// Dump the whole executable as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = execute(cli.command) {
        eprintln!("{} {}", "error:".red().bold(), e);
        process::exit(1);
    }
}

fn execute(command: Command) -> Result<(), FourgError> {
    match command {
        Command::Run {
            program,
            disassemble: show_code,
            stats,
            json,
            gc_threshold,
            gc_increment,
            max_stack,
        } => {
            let exe = Rc::new(load(&program)?);
            if show_code {
                println!("{}", disassemble(&exe));
            }

            let defaults = VmConfig::default();
            let config = VmConfig {
                gc_threshold: gc_threshold.unwrap_or(defaults.gc_threshold),
                gc_threshold_increment: gc_increment.unwrap_or(defaults.gc_threshold_increment),
                max_stack_size: max_stack.unwrap_or(defaults.max_stack_size),
                echo_output: true,
                ..defaults
            };
            let mut vm = Vm::new(exe, config);
            vm.link(&NativeRegistry::with_defaults())?;
            vm.run()?;

            if stats && json {
                eprintln!("{}", serde_json::to_string_pretty(&vm.heap_stats())?);
            } else if stats {
                let stats = vm.heap_stats();
                eprintln!(
                    "{} {} cycles, {} allocated, {} freed, {} live, threshold {}",
                    "gc:".cyan(),
                    stats.cycles,
                    stats.allocated,
                    stats.freed,
                    stats.live,
                    stats.threshold
                );
            }
            Ok(())
        }
        Command::Disasm { program, json } => {
            let exe = load(&program)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&exe)?);
            } else {
                print!("{}", disassemble(&exe));
            }
            Ok(())
        }
    }
}

fn load(path: &Path) -> Result<fourg::vm::Executable, FourgError> {
    let source = fs::read_to_string(path)?;
    let program = fourg::load_program(&source)?;
    let exe = fourg::compile(&program)?;
    info!("loaded {}", path.display());
    Ok(exe)
}
