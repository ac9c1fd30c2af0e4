//! Architecture module - Target CPU knowledge
//!
//! Only MIPS (PS1/PS2) is supported by the live debugger.

pub mod mips;
