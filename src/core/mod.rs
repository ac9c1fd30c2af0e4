//! Core module - Emulator process access
//!
//! Process discovery, out-of-process memory access and the emulator
//! connection manager the debugger engine talks through.

pub mod connection;
pub mod memory;
pub mod process;

pub use connection::{ConnectionError, ConnectionManager, Emulator, EmulatorConnections};
pub use memory::{MemoryError, TargetMemory};
