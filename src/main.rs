//! cavedbg - Live codecave debugger
//!
//! Entry point that parses the project description and starts the REPL.

use std::path::PathBuf;

use clap::Parser;

use cavedbg::core::connection::{Emulator, EmulatorConnections};
use cavedbg::debug::DebuggerEngine;
use cavedbg::project::{Codecave, Platform, Project};
use cavedbg::ui::cli::run_cli;

/// cavedbg: source-level breakpoints in running emulators
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Mod project root directory
    #[arg(short, long)]
    project: PathBuf,

    /// Target platform (ps1, ps2, gc, wii, n64)
    #[arg(long, default_value = "ps1")]
    platform: Platform,

    /// Codecave as ADDR:SIZE or NAME=ADDR:SIZE (hex); the first hosts the handler
    #[arg(short, long)]
    codecave: Vec<Codecave>,

    /// Compiled ELF, if not at the project's default build output
    #[arg(long)]
    elf: Option<PathBuf>,

    /// Emulator to connect to instead of scanning all known ones
    #[arg(short, long)]
    emulator: Option<Emulator>,

    /// Host address of emulated main RAM (hex), overrides auto-detection
    #[arg(long, value_parser = parse_ram_base)]
    ram_base: Option<u64>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_ram_base(s: &str) -> Result<u64, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u64::from_str_radix(digits, 16).map_err(|e| format!("invalid RAM base '{}': {}", s, e))
}

fn main() -> anyhow::Result<()> {
    // 1. Parse command line arguments
    let args = Args::parse();

    // 2. Initialize logger with verbosity level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        match args.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        },
    ))
    .init();

    log::info!("cavedbg v{}", env!("CARGO_PKG_VERSION"));
    log::debug!("Project: {}", args.project.display());
    log::debug!("Codecaves: {:?}", args.codecave);

    // 3. Describe the project
    let mut project = Project::new(&args.project, args.platform, args.codecave);
    if let Some(elf) = args.elf {
        project = project.with_elf_path(elf);
    }

    let connections = EmulatorConnections::new()
        .with_preferred(args.emulator)
        .with_ram_base(args.ram_base);

    // 4. Load debug info and run the REPL
    let mut engine = DebuggerEngine::new(project, connections);
    engine.initialize()?;

    println!(
        "[*] Loaded {} ({} functions)",
        engine.project().elf_path().display(),
        engine.dwarf().map_or(0, |d| d.functions().len())
    );
    if !engine.is_handler_injected() && !engine.project().handler_path().exists() {
        println!("[*] Debug handler not in project yet; run 'inject' and rebuild");
    }

    run_cli(engine)?;

    Ok(())
}
