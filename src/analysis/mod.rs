//! Analysis Module - Build output analysis
//!
//! Contains binary loading and DWARF debug information reading.

pub mod dwarf;
pub mod loader;

pub use dwarf::{DwarfError, DwarfReader, FunctionInfo, Variable};
pub use loader::{LoadedBinary, SectionInfo, SymbolInfo};
