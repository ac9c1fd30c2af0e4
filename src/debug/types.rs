//! Common types for debugging functionality.

use std::fmt;

use crate::analysis::dwarf::Location;
use crate::arch::mips::{REGISTER_COUNT, REGISTER_NAMES};

/// Debugger engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebuggerState {
    #[default]
    Idle,
    Running,
    BreakpointHit,
    /// Reserved; nothing transitions here yet
    Stepping,
}

impl fmt::Display for DebuggerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DebuggerState::Idle => "idle",
            DebuggerState::Running => "running",
            DebuggerState::BreakpointHit => "breakpoint hit",
            DebuggerState::Stepping => "stepping",
        };
        f.write_str(name)
    }
}

/// The 32 general purpose registers saved by the trap handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterSnapshot {
    values: [u32; REGISTER_COUNT],
}

impl RegisterSnapshot {
    pub fn new(values: [u32; REGISTER_COUNT]) -> Self {
        Self { values }
    }

    /// Slice a 128-byte saved-register block into little-endian words.
    ///
    /// Returns `None` unless exactly 128 bytes are given.
    pub fn from_le_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != REGISTER_COUNT * 4 {
            return None;
        }
        let mut values = [0u32; REGISTER_COUNT];
        for (value, chunk) in values.iter_mut().zip(bytes.chunks_exact(4)) {
            *value = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Some(Self { values })
    }

    pub fn get(&self, index: u8) -> Option<u32> {
        self.values.get(index as usize).copied()
    }

    /// Value by ABI name (`$sp`, `$a0`, ...)
    pub fn by_name(&self, name: &str) -> Option<u32> {
        crate::arch::mips::register_index(name).and_then(|i| self.get(i))
    }

    /// `(name, value)` pairs in register order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u32)> + '_ {
        REGISTER_NAMES.iter().copied().zip(self.values.iter().copied())
    }

    pub fn values(&self) -> &[u32; REGISTER_COUNT] {
        &self.values
    }
}

/// A variable value read at a breakpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableValue {
    pub type_name: String,
    /// Sign- or zero-extended according to the declared type
    pub value: i64,
    pub location: Location,
    pub is_parameter: bool,
    pub is_global: bool,
}

impl fmt::Display for VariableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) {} [{}]", self.type_name, self.value, self.location)?;
        if self.value > 9 || self.value < 0 {
            write!(f, " = {:#x}", self.value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_from_bytes() {
        let mut bytes = vec![0u8; 128];
        bytes[29 * 4..30 * 4].copy_from_slice(&0x801F_FF00u32.to_le_bytes());
        bytes[31 * 4..].copy_from_slice(&0x8001_0040u32.to_le_bytes());

        let snapshot = RegisterSnapshot::from_le_bytes(&bytes).unwrap();
        assert_eq!(snapshot.by_name("$sp"), Some(0x801F_FF00));
        assert_eq!(snapshot.get(31), Some(0x8001_0040));
        assert_eq!(snapshot.get(32), None);
        assert_eq!(snapshot.iter().count(), 32);
        assert_eq!(snapshot.iter().nth(4), Some(("$a0", 0)));

        assert!(RegisterSnapshot::from_le_bytes(&bytes[..124]).is_none());
    }
}
