//! CLI - reedline-based REPL interface
//!
//! Drives a debugger session: breakpoints by source line, polling for hits,
//! register and variable inspection.

use anyhow::Result;
use colored::Colorize;
use reedline::{Prompt, PromptHistorySearch, PromptHistorySearchStatus, Reedline, Signal};
use std::borrow::Cow;
use std::thread;
use std::time::{Duration, Instant};

use crate::core::connection::ConnectionManager;
use crate::debug::{DebuggerEngine, DebuggerState, Removal};

/// Interval between control block polls while waiting for a hit
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_WAIT_MS: u64 = 10_000;

/// Prompt showing the engine state and the last hit address
pub struct CavePrompt {
    state: DebuggerState,
    stopped_at: Option<u32>,
}

impl CavePrompt {
    pub fn new() -> Self {
        Self {
            state: DebuggerState::Idle,
            stopped_at: None,
        }
    }

    pub fn update(&mut self, state: DebuggerState, stopped_at: Option<u32>) {
        self.state = state;
        self.stopped_at = stopped_at;
    }
}

impl Default for CavePrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompt for CavePrompt {
    fn render_prompt_left(&self) -> Cow<'_, str> {
        let status = match self.state {
            DebuggerState::Idle => "---",
            DebuggerState::Running => "run",
            DebuggerState::BreakpointHit => "brk",
            DebuggerState::Stepping => "stp",
        };
        match self.stopped_at {
            Some(address) => Cow::Owned(format!("[{}:0x{:08X}]", status, address)),
            None => Cow::Owned(format!("[{}]", status)),
        }
    }

    fn render_prompt_right(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, _prompt_mode: reedline::PromptEditMode) -> Cow<'_, str> {
        Cow::Borrowed("> ")
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<'_, str> {
        Cow::Borrowed("... ")
    }

    fn render_prompt_history_search_indicator(
        &self,
        history_search: PromptHistorySearch,
    ) -> Cow<'_, str> {
        let prefix = match history_search.status {
            PromptHistorySearchStatus::Passing => "",
            PromptHistorySearchStatus::Failing => "(failed) ",
        };
        Cow::Owned(format!("(search: {}{}) ", prefix, history_search.term))
    }
}

/// Command parsing result
#[derive(Debug, PartialEq, Eq)]
pub enum ParsedCommand {
    /// Add breakpoint: b <file>:<line>
    BreakpointAdd(String, u32),
    /// Remove breakpoint: b- <id>
    BreakpointRemove(u32),
    /// Enable (inject) breakpoint: be <id>
    BreakpointEnable(u32),
    /// Disable breakpoint: bd <id>
    BreakpointDisable(u32),
    /// List breakpoints: bl
    BreakpointList,
    /// Resume after a hit: c
    Continue,
    /// Step over: n
    StepOver,
    /// Show saved registers: dr
    Registers,
    /// Show variables: dv
    Variables,
    /// Poll until a hit or timeout: w [ms]
    Wait(u64),
    /// Poll once: poll
    Poll,
    /// Write the handler into the project: inject
    InjectHandler,
    /// Remove the handler from the project: uninject
    RemoveHandler,
    /// List functions: fn
    Functions,
    /// Show the line table of a file: lines <file>
    Lines(String),
    /// Show the control block layout: layout
    Layout,
    /// Help: ? or help
    Help,
    /// Quit: q or exit
    Quit,
    /// Unknown command
    Unknown(String),
}

/// Parse a command string into a structured command
pub fn parse_command(input: &str) -> ParsedCommand {
    let input = input.trim();

    let parts: Vec<&str> = input.splitn(2, ' ').collect();
    let cmd = parts.first().copied().unwrap_or("");
    let arg = parts.get(1).map(|s| s.trim()).filter(|s| !s.is_empty());
    let id = || arg.and_then(|s| s.trim_start_matches('#').parse::<u32>().ok());
    let unknown = || ParsedCommand::Unknown(input.to_string());

    match cmd {
        "b" | "break" => arg
            .and_then(|target| {
                let (file, line) = target.rsplit_once(':')?;
                Some(ParsedCommand::BreakpointAdd(file.to_string(), line.parse().ok()?))
            })
            .unwrap_or_else(unknown),
        "b-" => id().map(ParsedCommand::BreakpointRemove).unwrap_or_else(unknown),
        "be" => id().map(ParsedCommand::BreakpointEnable).unwrap_or_else(unknown),
        "bd" => id().map(ParsedCommand::BreakpointDisable).unwrap_or_else(unknown),
        "bl" => ParsedCommand::BreakpointList,

        "c" | "continue" => ParsedCommand::Continue,
        "n" | "next" => ParsedCommand::StepOver,
        "w" | "wait" => match arg {
            None => ParsedCommand::Wait(DEFAULT_WAIT_MS),
            Some(ms) => ms.parse().map(ParsedCommand::Wait).unwrap_or_else(|_| unknown()),
        },
        "poll" => ParsedCommand::Poll,

        "dr" | "regs" => ParsedCommand::Registers,
        "dv" | "vars" => ParsedCommand::Variables,

        "inject" => ParsedCommand::InjectHandler,
        "uninject" => ParsedCommand::RemoveHandler,

        "fn" => ParsedCommand::Functions,
        "lines" => arg
            .map(|file| ParsedCommand::Lines(file.to_string()))
            .unwrap_or_else(unknown),
        "layout" => ParsedCommand::Layout,

        "?" | "help" => ParsedCommand::Help,
        "q" | "quit" | "exit" => ParsedCommand::Quit,

        _ => unknown(),
    }
}

/// Print the help message
fn print_help() {
    println!("{}", "cavedbg Commands".bold().cyan());
    println!("{}", "═".repeat(50).cyan());

    println!("\n{}", "Breakpoints:".bold().yellow());
    println!("  {}  Add breakpoint at a source line", "b <file>:<line>".green());
    println!("  {}         Remove breakpoint", "b- <id>".green());
    println!("  {}         Enable (inject into memory)", "be <id>".green());
    println!("  {}         Disable (restore memory)", "bd <id>".green());
    println!("  {}              List breakpoints", "bl".green());

    println!("\n{}", "Execution:".bold().yellow());
    println!("  {}          Wait for a hit (default 10s)", "w [ms]".green());
    println!("  {}            Check once for a hit", "poll".green());
    println!("  {}               Continue after a hit", "c".green());
    println!("  {}               Step over", "n".green());

    println!("\n{}", "Inspection:".bold().yellow());
    println!("  {}              Show saved registers", "dr".green());
    println!("  {}              Show variables", "dv".green());
    println!("  {}              List functions", "fn".green());
    println!("  {}    Show line table of a file", "lines <file>".green());
    println!("  {}          Show control block layout", "layout".green());

    println!("\n{}", "Project:".bold().yellow());
    println!("  {}          Write debug handler into the project", "inject".green());
    println!("  {}        Remove debug handler from the project", "uninject".green());

    println!("\n{}", "Other:".bold().yellow());
    println!("  {}               Show this help", "?".green());
    println!("  {}               Restore memory and quit", "q".green());
}

fn report<T>(result: Result<T, crate::debug::DebugError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            println!("{} {}", "[!]".red(), e);
            None
        }
    }
}

fn describe_removal(id: u32, removal: Removal) {
    match removal {
        Removal::Restored => println!("[*] Breakpoint #{} restored", id),
        Removal::AlreadyClean => println!("[*] Breakpoint #{} was not injected", id),
        Removal::Forgotten => println!(
            "{} Emulator not connected; breakpoint #{} removed from list only",
            "[!]".yellow(),
            id
        ),
    }
}

fn print_hit<M: ConnectionManager>(engine: &DebuggerEngine<M>) {
    if let Some(bp) = engine.last_hit_breakpoint() {
        println!("{} {}", "[HIT]".bold().red(), bp);
    }
    for line in engine.last_hit_source_lines() {
        println!("      {}", line.to_string().dimmed());
    }
}

/// Execute a parsed command. Returns false when the session should end.
fn execute_command<M: ConnectionManager>(engine: &mut DebuggerEngine<M>, cmd: ParsedCommand) -> bool {
    match cmd {
        ParsedCommand::BreakpointAdd(file, line) => {
            if let Some(bp) = report(engine.add_breakpoint(&file, line)) {
                println!("[*] Breakpoint #{} at {}", bp.id(), bp.location());
            }
        }
        ParsedCommand::BreakpointRemove(id) => {
            if let Some(removal) = report(engine.remove_breakpoint(id)) {
                describe_removal(id, removal);
            }
        }
        ParsedCommand::BreakpointEnable(id) => {
            if report(engine.enable_breakpoint(id)).is_some() {
                println!("[*] Breakpoint #{} enabled", id);
            }
        }
        ParsedCommand::BreakpointDisable(id) => {
            if let Some(removal) = report(engine.disable_breakpoint(id)) {
                describe_removal(id, removal);
            }
        }
        ParsedCommand::BreakpointList => {
            if engine.breakpoints().is_empty() {
                println!("    {}", "(no breakpoints)".dimmed());
            }
            for bp in engine.breakpoints().iter() {
                match engine.breakpoint_file_offset(bp.id()) {
                    Some(offset) => println!("  {} (file offset {:#x})", bp, offset),
                    None => println!("  {}", bp),
                }
            }
        }
        ParsedCommand::Continue => {
            if report(engine.resume_execution()).is_some() {
                println!("[*] Continuing execution...");
            }
        }
        ParsedCommand::StepOver => {
            report(engine.step_over());
        }
        ParsedCommand::Registers => match engine.get_register_values() {
            Some(registers) => {
                for (index, (name, value)) in registers.iter().enumerate() {
                    print!("  {:>5} = {:08X}", name.cyan(), value);
                    if index % 4 == 3 {
                        println!();
                    }
                }
            }
            None => println!("    {}", "(not stopped at a breakpoint)".dimmed()),
        },
        ParsedCommand::Variables => {
            let values = engine.get_variable_values();
            if values.is_empty() {
                println!("    {}", "(nothing to show)".dimmed());
            }
            for (name, value) in values {
                let scope = if value.is_global {
                    "global"
                } else if value.is_parameter {
                    "param"
                } else {
                    "local"
                };
                println!("  {:<6} {} {}", scope.dimmed(), name.green(), value);
            }
        }
        ParsedCommand::Wait(ms) => {
            let deadline = Instant::now() + Duration::from_millis(ms);
            loop {
                if engine.poll_breakpoint_hit().is_some() {
                    print_hit(engine);
                    break;
                }
                if Instant::now() >= deadline {
                    println!("[*] No breakpoint hit within {} ms", ms);
                    break;
                }
                thread::sleep(POLL_INTERVAL);
            }
        }
        ParsedCommand::Poll => {
            if engine.poll_breakpoint_hit().is_some() {
                print_hit(engine);
            } else {
                println!("    {}", "(no hit)".dimmed());
            }
        }
        ParsedCommand::InjectHandler => {
            if let Some(update) = report(engine.inject_debug_handler()) {
                println!("[*] {}", update.message());
            }
        }
        ParsedCommand::RemoveHandler => {
            if report(engine.remove_debug_handler()).is_some() {
                println!("[*] Debug codecave removed from project");
            }
        }
        ParsedCommand::Functions => match engine.dwarf() {
            Some(dwarf) => {
                for function in dwarf.functions() {
                    println!(
                        "  0x{:08X}-0x{:08X}  {}  {}:{}",
                        function.start_address,
                        function.end_address,
                        function.name.green(),
                        function.file_path,
                        function.line_number
                    );
                }
            }
            None => println!("    {}", "(not initialized)".dimmed()),
        },
        ParsedCommand::Lines(file) => match engine.dwarf() {
            Some(dwarf) => {
                let table = dwarf.line_program();
                let matched: Vec<_> = table
                    .iter()
                    .filter(|(path, _)| path.ends_with(file.as_str()))
                    .collect();
                if matched.is_empty() {
                    println!("    {}", "(no lines for that file)".dimmed());
                }
                for (path, lines) in matched {
                    println!("{}", path.bold());
                    for line in lines {
                        println!(
                            "  {:>5}  0x{:08X}-0x{:08X}",
                            line.line_number, line.asm_address_start, line.asm_address_end
                        );
                    }
                }
            }
            None => println!("    {}", "(not initialized)".dimmed()),
        },
        ParsedCommand::Layout => match engine.layout() {
            Some(layout) => {
                for (name, address) in layout.entries() {
                    println!("  {:<22} 0x{:08X}", name, address);
                }
                println!("  {:<22} 0x{:08X}", "handler_entry", engine.entry_address());
            }
            None => println!("    {}", "(not initialized)".dimmed()),
        },
        ParsedCommand::Help => {
            print_help();
        }
        ParsedCommand::Quit => {
            println!("[*] Shutting down...");
            for failure in engine.shutdown() {
                println!("{} {}", "[!]".red(), failure);
            }
            return false;
        }
        ParsedCommand::Unknown(input) => {
            println!("{} Unknown command: '{}'", "[!]".red(), input);
            println!("    Type '?' for help");
        }
    }
    true
}

/// Run the CLI REPL
pub fn run_cli<M: ConnectionManager>(mut engine: DebuggerEngine<M>) -> Result<()> {
    let mut line_editor = Reedline::create();
    let mut prompt = CavePrompt::new();

    println!(
        "{}",
        "╔══════════════════════════════════════════════════════════════╗".cyan()
    );
    println!(
        "{}",
        "║  cavedbg - Type '?' for help, 'q' to quit                    ║".cyan()
    );
    println!(
        "{}",
        "╚══════════════════════════════════════════════════════════════╝".cyan()
    );

    loop {
        let stopped_at = engine.last_hit_breakpoint().map(|bp| bp.address());
        prompt.update(engine.state(), stopped_at);

        let sig = line_editor.read_line(&prompt)?;
        match sig {
            Signal::Success(buffer) => {
                let input = buffer.trim();
                if input.is_empty() {
                    continue;
                }

                let cmd = parse_command(input);
                if !execute_command(&mut engine, cmd) {
                    break;
                }
            }
            Signal::CtrlD | Signal::CtrlC => {
                println!("\n[*] Interrupted");
                for failure in engine.shutdown() {
                    println!("{} {}", "[!]".red(), failure);
                }
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_breakpoint_commands() {
        assert_eq!(
            parse_command("b src/main.c:42"),
            ParsedCommand::BreakpointAdd("src/main.c".into(), 42)
        );
        assert_eq!(
            parse_command("b C:/mods/demo/src/main.c:7"),
            ParsedCommand::BreakpointAdd("C:/mods/demo/src/main.c".into(), 7)
        );
        assert_eq!(parse_command("b- 3"), ParsedCommand::BreakpointRemove(3));
        assert_eq!(parse_command("be #2"), ParsedCommand::BreakpointEnable(2));
        assert_eq!(parse_command("bd 2"), ParsedCommand::BreakpointDisable(2));
        assert!(matches!(parse_command("b main.c"), ParsedCommand::Unknown(_)));
        assert!(matches!(parse_command("be"), ParsedCommand::Unknown(_)));
    }

    #[test]
    fn test_parse_other_commands() {
        assert_eq!(parse_command("w"), ParsedCommand::Wait(DEFAULT_WAIT_MS));
        assert_eq!(parse_command("w 250"), ParsedCommand::Wait(250));
        assert_eq!(parse_command("  c  "), ParsedCommand::Continue);
        assert_eq!(parse_command("lines main.c"), ParsedCommand::Lines("main.c".into()));
        assert_eq!(parse_command("q"), ParsedCommand::Quit);
        assert!(matches!(parse_command("frobnicate"), ParsedCommand::Unknown(_)));
    }
}
