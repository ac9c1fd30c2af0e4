//! Debug module - live source-level debugging of codecave mods.
//!
//! - Breakpoint model and bounded registry
//! - Codecave control block layout, trap handler and jump generation
//! - The engine driving a session against a running emulator

pub mod breakpoint;
pub mod codecave;
pub mod engine;
pub mod types;

pub use breakpoint::{Breakpoint, BreakpointLocation, BreakpointRegistry, MAX_BREAKPOINTS};
pub use codecave::CodecaveLayout;
pub use engine::{DebugError, DebuggerEngine, HandlerUpdate, Removal};
pub use types::{DebuggerState, RegisterSnapshot, VariableValue};
