//! cavedbg - live source-level debugger for console mods
//!
//! Breakpoints are software jumps patched into emulated RAM that lead into a
//! trap handler compiled into the mod's codecave. The handler parks the CPU in
//! a busy-wait loop and publishes its state through a control block that this
//! crate reads out of the emulator process.

pub mod analysis;
pub mod arch;
pub mod core;
pub mod debug;
pub mod project;
pub mod ui;
