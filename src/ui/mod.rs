//! UI module - Command Line Interface
//!
//! Provides the reedline-based REPL driving a debugger session.

pub mod cli;
