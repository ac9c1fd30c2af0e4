//! Debugger engine.
//!
//! Drives a debugging session against a running emulator:
//! - resolves source lines to addresses through the DWARF reader
//! - patches and restores breakpoint jumps in emulated RAM
//! - polls the trap handler's control block for hits and resumes
//! - reads saved registers and variable values at a hit
//!
//! The engine never schedules anything itself; callers poll
//! `poll_breakpoint_hit` on their own cadence.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::analysis::dwarf::{DwarfError, DwarfReader, Location, SourceLine, Variable};
use crate::analysis::loader::{LoadedBinary, SectionInfo};
use crate::arch::mips::{strip_kernel_segment, FP, REGISTER_COUNT, SP};
use crate::core::connection::{ConnectionError, ConnectionManager};
use crate::core::memory::{MemoryError, TargetMemory};
use crate::debug::breakpoint::{
    Breakpoint, BreakpointLocation, BreakpointRegistry, MAX_BREAKPOINTS, PATCH_SIZE,
};
use crate::debug::codecave::{self, CodecaveLayout, ENTRY_SYMBOL};
use crate::debug::types::{DebuggerState, RegisterSnapshot, VariableValue};
use crate::project::{Platform, Project, HANDLER_RELATIVE_PATH};

/// Debugger engine errors
#[derive(Error, Debug)]
pub enum DebugError {
    #[error("Platform '{0}' not supported for debugging (only PS1/PS2)")]
    UnsupportedPlatform(Platform),

    #[error("Could not find compiled ELF at {0}. Please compile the project first.")]
    ElfNotFound(PathBuf),

    #[error("Failed to load debug symbols: {0}")]
    DwarfParseFailed(#[source] DwarfError),

    #[error("No codecaves defined in the build. The debugger needs one to host its handler.")]
    NoCodecaveDefined,

    #[error("Codecave of {size:#x} bytes is too small for the 256-byte control block")]
    CodecaveTooSmall { size: u32 },

    #[error("Debugger not initialized. Call initialize() first.")]
    NotInitialized,

    #[error("No assembly code found for {file}:{line}")]
    NoAddress { file: String, line: u32 },

    #[error("Maximum breakpoints reached ({0})")]
    MaxBreakpoints(usize),

    #[error("Breakpoint {0} not found")]
    BreakpointNotFound(u32),

    #[error("No running emulator found. Please start the game first.")]
    NoEmulator,

    #[error("Failed to connect to emulator: {0}")]
    ConnectionFailed(String),

    #[error("Emulator not connected")]
    NotConnected,

    #[error("Failed to read memory at 0x{address:08X}: {reason}")]
    MemoryReadFailed { address: u32, reason: String },

    #[error("Failed to write memory at 0x{address:08X}: {reason}")]
    MemoryWriteFailed { address: u32, reason: String },

    #[error("Breakpoint {0} has no saved original instructions")]
    MissingOriginalInstructions(u32),

    #[error("Not currently stopped at a breakpoint")]
    NotAtBreakpoint,

    #[error("{0} not yet implemented")]
    NotImplemented(&'static str),

    #[error("Failed to update debug handler {path}: {source}")]
    HandlerIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl From<ConnectionError> for DebugError {
    fn from(e: ConnectionError) -> Self {
        match e {
            ConnectionError::NoEmulatorFound | ConnectionError::ProcessNotFound(_) => {
                DebugError::NoEmulator
            }
            other => DebugError::ConnectionFailed(other.to_string()),
        }
    }
}

/// Result of writing the handler source into the project.
///
/// Registration lives in the in-memory [`Project`] only, so `Added` is
/// reported again whenever the project is rebuilt from arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerUpdate {
    /// First time: the codecave gained a new source input
    Added,
    /// The source was regenerated in place
    Updated,
}

impl HandlerUpdate {
    pub fn message(self) -> &'static str {
        match self {
            HandlerUpdate::Added => "Debug codecave added to project. Please rebuild to include it.",
            HandlerUpdate::Updated => "Debug codecave updated. Please rebuild to update.",
        }
    }
}

/// What happened to a breakpoint's patch when it was taken out of memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// Original instructions written back
    Restored,
    /// Nothing was patched
    AlreadyClean,
    /// No connection; dropped from the model while memory may still be patched
    Forgotten,
}

/// Why a variable was left out of `get_variable_values`
#[derive(Debug)]
enum Skip {
    NoLocation(Location),
    Unsupported(String),
    BadRegister(u8),
    Memory(MemoryError),
}

impl std::fmt::Display for Skip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Skip::NoLocation(location) => write!(f, "location {} not readable", location),
            Skip::Unsupported(type_name) => write!(f, "type {} not readable as a scalar", type_name),
            Skip::BadRegister(register) => write!(f, "register {} out of range", register),
            Skip::Memory(e) => write!(f, "{}", e),
        }
    }
}

/// Host address of a console address
fn physical_address(connection: &impl TargetMemory, address: u32) -> u64 {
    connection.main_ram_base() + strip_kernel_segment(address) as u64
}

/// Sign- or zero-extend the low `width` bytes of `raw`
fn extend(raw: u64, width: usize, signed: bool) -> i64 {
    let bits = (width * 8) as u32;
    if bits == 0 || bits >= 64 {
        return raw as i64;
    }
    let mask = (1u64 << bits) - 1;
    let value = raw & mask;
    if signed && (value >> (bits - 1)) & 1 == 1 {
        (value | !mask) as i64
    } else {
        value as i64
    }
}

/// Live debugger for one project
pub struct DebuggerEngine<M: ConnectionManager> {
    project: Project,
    connections: M,
    registry: BreakpointRegistry,
    dwarf: Option<DwarfReader>,
    layout: Option<CodecaveLayout>,
    /// Jump target of injected breakpoints
    entry_address: u32,
    elf_sections: Vec<SectionInfo>,
    state: DebuggerState,
    is_initialized: bool,
    codecave_injected: bool,
    last_hit_breakpoint: Option<u32>,
}

impl<M: ConnectionManager> DebuggerEngine<M> {
    pub fn new(project: Project, connections: M) -> Self {
        Self {
            project,
            connections,
            registry: BreakpointRegistry::new(),
            dwarf: None,
            layout: None,
            entry_address: 0,
            elf_sections: Vec::new(),
            state: DebuggerState::Idle,
            is_initialized: false,
            codecave_injected: false,
            last_hit_breakpoint: None,
        }
    }

    // ---- accessors ----

    pub fn state(&self) -> DebuggerState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }

    pub fn is_handler_injected(&self) -> bool {
        self.codecave_injected
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn breakpoints(&self) -> &BreakpointRegistry {
        &self.registry
    }

    pub fn dwarf(&self) -> Option<&DwarfReader> {
        self.dwarf.as_ref()
    }

    pub fn layout(&self) -> Option<&CodecaveLayout> {
        self.layout.as_ref()
    }

    pub fn entry_address(&self) -> u32 {
        self.entry_address
    }

    pub fn connections(&mut self) -> &mut M {
        &mut self.connections
    }

    pub fn last_hit_breakpoint(&self) -> Option<&Breakpoint> {
        self.last_hit_breakpoint
            .and_then(|id| self.registry.find_by_id(id))
    }

    /// Source lines covering the last hit breakpoint's address
    pub fn last_hit_source_lines(&self) -> Vec<&SourceLine> {
        match (self.last_hit_breakpoint(), &self.dwarf) {
            (Some(bp), Some(dwarf)) => dwarf.source_lines_for_address(bp.address()),
            _ => Vec::new(),
        }
    }

    /// Offset of a breakpoint's patched instructions in the ELF file
    pub fn breakpoint_file_offset(&self, id: u32) -> Option<u64> {
        let bp = self.registry.find_by_id(id)?;
        let address = bp.address() as u64;
        let section = self.elf_sections.iter().find(|s| s.contains(address))?;
        Some(
            bp.location()
                .file_offset(strip_kernel_segment(section.virtual_address as u32), section.file_offset),
        )
    }

    // ---- session setup ----

    /// Load the build's debug information and lay out the control block.
    ///
    /// A missing emulator is not an error here; connection is retried when
    /// a breakpoint is enabled.
    pub fn initialize(&mut self) -> Result<(), DebugError> {
        let platform = self.project.platform();
        if !platform.supports_debugging() {
            return Err(DebugError::UnsupportedPlatform(platform));
        }

        let elf_path = self.project.elf_path();
        if !elf_path.is_file() {
            return Err(DebugError::ElfNotFound(elf_path));
        }
        let binary = LoadedBinary::from_file(&elf_path)
            .map_err(|e| DebugError::DwarfParseFailed(DwarfError::Parse(e.to_string())))?;
        let dwarf = DwarfReader::from_binary(&binary).map_err(DebugError::DwarfParseFailed)?;

        let codecave = self
            .project
            .first_codecave()
            .ok_or(DebugError::NoCodecaveDefined)?;
        let layout = CodecaveLayout::compute(codecave.memory_address, codecave.size)
            .ok_or(DebugError::CodecaveTooSmall {
                size: codecave.size,
            })?;

        self.entry_address = match binary.find_symbol(ENTRY_SYMBOL) {
            Some(symbol) => symbol.address as u32,
            None => {
                log::info!(
                    "{} not in {}; breakpoints will jump to codecave base 0x{:08X}",
                    ENTRY_SYMBOL,
                    elf_path.display(),
                    codecave.memory_address
                );
                codecave.memory_address
            }
        };

        log::info!(
            "Debugger initialized: codecave '{}' at 0x{:08X}, control block at 0x{:08X}",
            codecave.name,
            codecave.memory_address,
            layout.control_block_start()
        );

        self.elf_sections = binary.sections.clone();
        self.dwarf = Some(dwarf);
        self.layout = Some(layout);
        self.is_initialized = true;
        self.state = DebuggerState::Running;

        if self.connections.current().is_none() {
            if let Err(e) = self.connections.connect_any() {
                log::info!("No emulator connection yet: {}", e);
            }
        }
        Ok(())
    }

    /// Write the trap handler source into the project and register it with
    /// the first codecave. Safe to call repeatedly.
    pub fn inject_debug_handler(&mut self) -> Result<HandlerUpdate, DebugError> {
        let layout = self.layout.ok_or(DebugError::NotInitialized)?;
        let source = codecave::generate_handler_source(self.project.platform(), &layout);

        let path = self.project.handler_path();
        let io_error = |source: io::Error| DebugError::HandlerIo {
            path: path.clone(),
            source,
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(io_error)?;
        }
        fs::write(&path, source).map_err(io_error)?;

        let codecave = self
            .project
            .first_codecave_mut()
            .ok_or(DebugError::NoCodecaveDefined)?;
        let update = if codecave.add_code_file(HANDLER_RELATIVE_PATH) {
            HandlerUpdate::Added
        } else {
            HandlerUpdate::Updated
        };

        self.codecave_injected = true;
        log::info!("Debug handler written to {} ({:?})", path.display(), update);
        Ok(update)
    }

    /// Delete the generated handler and unregister it. No-op when absent.
    pub fn remove_debug_handler(&mut self) -> Result<(), DebugError> {
        let path = self.project.handler_path();
        if path.exists() {
            fs::remove_file(&path).map_err(|source| DebugError::HandlerIo {
                path: path.clone(),
                source,
            })?;
        }
        if let Some(codecave) = self.project.first_codecave_mut() {
            codecave.remove_code_file(HANDLER_RELATIVE_PATH);
        }
        self.codecave_injected = false;
        Ok(())
    }

    // ---- breakpoints ----

    /// Resolve `file:line` and register a (disabled) breakpoint there.
    pub fn add_breakpoint(&mut self, file: &str, line: u32) -> Result<&Breakpoint, DebugError> {
        let dwarf = self.dwarf.as_ref().ok_or(DebugError::NotInitialized)?;

        let addresses = dwarf.address_for_line(file, line);
        let Some(&address) = addresses.first() else {
            return Err(DebugError::NoAddress {
                file: file.to_string(),
                line,
            });
        };
        if addresses.len() > 1 {
            log::warn!(
                "{}:{} maps to {} addresses; using 0x{:08X}",
                file,
                line,
                addresses.len(),
                address
            );
        }

        let bp = self
            .registry
            .add(BreakpointLocation::new(file, line, address))
            .map_err(|_| DebugError::MaxBreakpoints(MAX_BREAKPOINTS))?;
        Ok(bp)
    }

    /// Drop a breakpoint. An injected breakpoint is restored first; if that
    /// fails it stays registered.
    pub fn remove_breakpoint(&mut self, id: u32) -> Result<Removal, DebugError> {
        if self.registry.find_by_id(id).is_none() {
            return Err(DebugError::BreakpointNotFound(id));
        }
        let removal = self.remove_from_memory(id)?;
        self.registry.remove(id);
        if self.last_hit_breakpoint == Some(id) {
            self.last_hit_breakpoint = None;
        }
        log::info!("Removed breakpoint #{} ({:?})", id, removal);
        Ok(removal)
    }

    /// Enable and patch a breakpoint; stays disabled if patching fails.
    pub fn enable_breakpoint(&mut self, id: u32) -> Result<(), DebugError> {
        self.registry
            .find_by_id_mut(id)
            .ok_or(DebugError::BreakpointNotFound(id))?
            .enable();

        if let Err(e) = self.inject_into_memory(id) {
            if let Some(bp) = self.registry.find_by_id_mut(id) {
                bp.disable();
            }
            return Err(e);
        }
        Ok(())
    }

    /// Restore a breakpoint's original instructions and disable it.
    pub fn disable_breakpoint(&mut self, id: u32) -> Result<Removal, DebugError> {
        if self.registry.find_by_id(id).is_none() {
            return Err(DebugError::BreakpointNotFound(id));
        }
        let removal = self.remove_from_memory(id)?;
        if let Some(bp) = self.registry.find_by_id_mut(id) {
            bp.disable();
        }
        Ok(removal)
    }

    fn inject_into_memory(&mut self, id: u32) -> Result<(), DebugError> {
        let bp = self
            .registry
            .find_by_id(id)
            .ok_or(DebugError::BreakpointNotFound(id))?;
        if bp.is_injected() {
            return Ok(());
        }
        let address = bp.address();

        if self.connections.current().is_none() {
            self.connections.connect_any()?;
        }
        let connection = self.connections.current().ok_or(DebugError::NotConnected)?;
        let physical = physical_address(connection, address);

        // Original bytes must be known before anything is overwritten
        let original: [u8; PATCH_SIZE] = connection
            .read(physical, PATCH_SIZE)
            .map_err(|e| DebugError::MemoryReadFailed {
                address,
                reason: e.to_string(),
            })?
            .try_into()
            .map_err(|bytes: Vec<u8>| DebugError::MemoryReadFailed {
                address,
                reason: format!("got {} bytes", bytes.len()),
            })?;

        let injected = codecave::generate_injected_jump(self.entry_address, id);
        connection
            .write(physical, &injected)
            .map_err(|e| DebugError::MemoryWriteFailed {
                address,
                reason: e.to_string(),
            })?;

        log::debug!(
            "Injected breakpoint #{} at 0x{:08X} (host {:#x}): {} -> {}",
            id,
            address,
            physical,
            hex::encode(original),
            hex::encode(injected)
        );
        if let Some(bp) = self.registry.find_by_id_mut(id) {
            bp.mark_injected(original, injected);
        }
        Ok(())
    }

    fn remove_from_memory(&mut self, id: u32) -> Result<Removal, DebugError> {
        let bp = self
            .registry
            .find_by_id(id)
            .ok_or(DebugError::BreakpointNotFound(id))?;
        if !bp.is_injected() {
            return Ok(Removal::AlreadyClean);
        }
        let original = *bp
            .original_instructions()
            .ok_or(DebugError::MissingOriginalInstructions(id))?;
        let address = bp.address();

        let Some(connection) = self.connections.current() else {
            log::warn!(
                "Emulator not connected; breakpoint #{} at 0x{:08X} forgotten without restoring memory",
                id,
                address
            );
            if let Some(bp) = self.registry.find_by_id_mut(id) {
                bp.mark_removed();
            }
            return Ok(Removal::Forgotten);
        };

        let physical = physical_address(connection, address);
        connection
            .write(physical, &original)
            .map_err(|e| DebugError::MemoryWriteFailed {
                address,
                reason: e.to_string(),
            })?;

        log::debug!(
            "Restored breakpoint #{} at 0x{:08X}: {}",
            id,
            address,
            hex::encode(original)
        );
        if let Some(bp) = self.registry.find_by_id_mut(id) {
            bp.mark_removed();
        }
        Ok(Removal::Restored)
    }

    // ---- execution control ----

    /// Check the control block for a hit. Cheap and non-blocking: at most two
    /// 4-byte reads.
    pub fn poll_breakpoint_hit(&mut self) -> Option<Breakpoint> {
        if !self.is_initialized {
            return None;
        }
        let layout = self.layout?;
        let connection = self.connections.current()?;

        let flag = match connection.read_u32(physical_address(connection, layout.breakpoint_hit_flag)) {
            Ok(flag) => flag,
            Err(e) => {
                log::trace!("Hit flag unreadable: {}", e);
                return None;
            }
        };
        if flag == 0 {
            return None;
        }

        let id = match connection.read_u32(physical_address(connection, layout.current_breakpoint_id)) {
            Ok(id) => id,
            Err(e) => {
                log::trace!("Breakpoint id unreadable: {}", e);
                return None;
            }
        };

        // Still parked on the same hit
        if self.state == DebuggerState::BreakpointHit && self.last_hit_breakpoint == Some(id) {
            return self.registry.find_by_id(id).cloned();
        }

        let Some(bp) = self.registry.find_by_id_mut(id) else {
            log::warn!("Hit flag set for unknown breakpoint id {}", id);
            return None;
        };
        bp.record_hit();
        let bp = bp.clone();

        self.state = DebuggerState::BreakpointHit;
        self.last_hit_breakpoint = Some(id);
        log::info!("Breakpoint hit: {}", bp);
        Some(bp)
    }

    /// Release the handler's wait loop by clearing the hit flag.
    pub fn resume_execution(&mut self) -> Result<(), DebugError> {
        if self.state != DebuggerState::BreakpointHit {
            return Err(DebugError::NotAtBreakpoint);
        }
        let layout = self.layout.ok_or(DebugError::NotInitialized)?;
        let connection = self.connections.current().ok_or(DebugError::NotConnected)?;

        let address = layout.breakpoint_hit_flag;
        connection
            .write_u32(physical_address(connection, address), 0)
            .map_err(|e| DebugError::MemoryWriteFailed {
                address,
                reason: e.to_string(),
            })?;

        self.state = DebuggerState::Running;
        self.last_hit_breakpoint = None;
        log::info!("Resumed execution");
        Ok(())
    }

    pub fn step_over(&mut self) -> Result<(), DebugError> {
        Err(DebugError::NotImplemented("Step-over"))
    }

    // ---- inspection ----

    /// Registers saved by the handler; `None` when not stopped or not connected.
    pub fn get_register_values(&mut self) -> Option<RegisterSnapshot> {
        if self.state != DebuggerState::BreakpointHit {
            return None;
        }
        let layout = self.layout?;
        let connection = self.connections.current()?;

        let address = physical_address(connection, layout.saved_registers);
        match connection.read(address, REGISTER_COUNT * 4) {
            Ok(bytes) => RegisterSnapshot::from_le_bytes(&bytes),
            Err(e) => {
                log::warn!("Failed to read saved registers: {}", e);
                None
            }
        }
    }

    /// Values of the stopped function's parameters and locals, plus globals.
    ///
    /// Variables that cannot be read are left out. Locals shadow globals of
    /// the same name.
    pub fn get_variable_values(&mut self) -> BTreeMap<String, VariableValue> {
        let mut values = BTreeMap::new();

        let Some(address) = self.last_hit_breakpoint().map(Breakpoint::address) else {
            return values;
        };
        let Some(registers) = self.get_register_values() else {
            return values;
        };
        let (Some(dwarf), Some(connection)) = (self.dwarf.as_ref(), self.connections.current())
        else {
            return values;
        };

        let mut collect = |variable: &Variable| match read_variable(connection, &registers, variable) {
            Ok(value) => {
                values.insert(variable.name.clone(), value);
            }
            Err(skip) => log::debug!("Skipping {}: {}", variable.name, skip),
        };

        dwarf.global_variables().iter().for_each(&mut collect);
        match dwarf.function_at_address(address) {
            Some(function) => function
                .parameters
                .iter()
                .chain(function.locals.iter())
                .for_each(&mut collect),
            None => log::debug!("No function covers 0x{:08X}", address),
        }

        values
    }

    // ---- teardown ----

    /// Restore every injected breakpoint, clear the registry, remove the
    /// handler source and go idle. Continues past failures and returns them.
    ///
    /// The session ends here; `initialize` must run again before further use.
    pub fn shutdown(&mut self) -> Vec<DebugError> {
        let mut failures = Vec::new();

        for id in self.registry.injected_ids() {
            match self.remove_from_memory(id) {
                Ok(removal) => log::debug!("Shutdown: breakpoint #{} {:?}", id, removal),
                Err(e) => {
                    log::warn!("Shutdown: breakpoint #{}: {}", id, e);
                    failures.push(e);
                }
            }
        }
        self.registry.clear();

        if let Err(e) = self.remove_debug_handler() {
            log::warn!("Shutdown: {}", e);
            failures.push(e);
        }

        self.state = DebuggerState::Idle;
        self.last_hit_breakpoint = None;
        self.is_initialized = false;
        self.dwarf = None;
        self.layout = None;
        self.elf_sections.clear();
        log::info!("Debugger shut down ({} failures)", failures.len());
        failures
    }
}

/// Read one variable's current value
fn read_variable(
    connection: &impl TargetMemory,
    registers: &RegisterSnapshot,
    variable: &Variable,
) -> Result<VariableValue, Skip> {
    let type_info = &variable.type_info;
    let width = match type_info.byte_size {
        _ if type_info.is_aggregate => return Err(Skip::Unsupported(type_info.name.clone())),
        0 => 4,
        n @ (1 | 2 | 4 | 8) => n as usize,
        _ => return Err(Skip::Unsupported(type_info.name.clone())),
    };

    let register = |index: u8| registers.get(index).ok_or(Skip::BadRegister(index));
    let read = |address: u32| -> Result<u64, Skip> {
        let bytes = connection
            .read(physical_address(connection, address), width)
            .map_err(Skip::Memory)?;
        let mut buffer = [0u8; 8];
        let len = bytes.len().min(width);
        buffer[..len].copy_from_slice(&bytes[..len]);
        Ok(u64::from_le_bytes(buffer))
    };
    let offset_from = |base: u32, offset: i64| (base as i64).wrapping_add(offset) as u32;

    let (raw, width) = match variable.location {
        Location::Address(address) => (read(address)?, width),
        // Registers are 32 bits wide
        Location::Register(index) => (register(index)? as u64, width.min(4)),
        Location::RegisterOffset { register: index, offset } => {
            (read(offset_from(register(index)?, offset))?, width)
        }
        Location::FrameOffset(offset) => {
            let frame_pointer = register(FP)?;
            let base = if frame_pointer != 0 {
                frame_pointer
            } else {
                register(SP)?
            };
            if base == 0 {
                return Err(Skip::NoLocation(variable.location));
            }
            (read(offset_from(base, offset))?, width)
        }
        location @ (Location::Unknown(_) | Location::Unavailable) => {
            return Err(Skip::NoLocation(location))
        }
    };

    Ok(VariableValue {
        type_name: type_info.name.clone(),
        value: extend(raw, width, type_info.is_signed),
        location: variable.location,
        is_parameter: variable.is_parameter,
        is_global: variable.is_global,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extend() {
        assert_eq!(extend(0xFF, 1, true), -1);
        assert_eq!(extend(0xFF, 1, false), 255);
        assert_eq!(extend(0x8000, 2, true), -32768);
        assert_eq!(extend(0x1_2345, 2, false), 0x2345);
        assert_eq!(extend(0xFFFF_FFF8, 4, true), -8);
        assert_eq!(extend(0xFFFF_FFF8, 4, false), 0xFFFF_FFF8);
        assert_eq!(extend(u64::MAX, 8, true), -1);
    }

    #[test]
    fn test_connection_errors_map_to_engine_errors() {
        assert!(matches!(
            DebugError::from(ConnectionError::NoEmulatorFound),
            DebugError::NoEmulator
        ));
        assert!(matches!(
            DebugError::from(ConnectionError::Memory(MemoryError::NoProcess)),
            DebugError::ConnectionFailed(_)
        ));
    }

    #[test]
    fn test_handler_update_messages_differ() {
        assert_ne!(HandlerUpdate::Added.message(), HandlerUpdate::Updated.message());
    }
}
