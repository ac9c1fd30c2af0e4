//! Emulator connections.
//!
//! Each supported emulator is a closed variant with its own strategy for
//! locating console RAM inside the emulator process. A `ConnectionManager`
//! owns at most one live connection and is passed to the engine explicitly.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use super::memory::{EmulatorMemory, MemoryError, ProcessMemory, TargetMemory};
use super::process::{self, ProcessInfo};
use crate::analysis::loader::LoadedBinary;
use crate::project::Platform;

/// Connection errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("No supported emulator is running")]
    NoEmulatorFound,

    #[error("{0} is not running")]
    ProcessNotFound(Emulator),

    #[error("Could not locate {emulator} RAM: {reason}")]
    RamBaseUnavailable { emulator: Emulator, reason: String },

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// How console RAM is found inside an emulator process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RamBase {
    /// Fixed host address
    Fixed(u64),
    /// Base address of a loaded module plus an offset
    ModuleOffset { module: &'static str, offset: u64 },
    /// Exported pointer variable of the main executable holding the RAM address
    ExportedPointer { symbol: &'static str },
    /// Only an explicit override works
    Manual,
}

/// Supported emulators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Emulator {
    DuckStation,
    Pcsx2,
    Mednafen129,
    Mednafen131,
    BizHawk,
    Dolphin,
}

impl Emulator {
    pub const ALL: [Emulator; 6] = [
        Emulator::DuckStation,
        Emulator::Pcsx2,
        Emulator::Mednafen129,
        Emulator::Mednafen131,
        Emulator::BizHawk,
        Emulator::Dolphin,
    ];

    /// Executable name prefix used to find the process
    pub fn process_prefix(self) -> &'static str {
        match self {
            Emulator::DuckStation => "duckstation",
            // pcsx2.exe and pcsx2-qt.exe
            Emulator::Pcsx2 => "pcsx2",
            Emulator::Mednafen129 | Emulator::Mednafen131 => "mednafen",
            Emulator::BizHawk => "emuhawk",
            Emulator::Dolphin => "dolphin",
        }
    }

    pub fn platform(self) -> Platform {
        match self {
            Emulator::DuckStation
            | Emulator::Mednafen129
            | Emulator::Mednafen131
            | Emulator::BizHawk => Platform::Ps1,
            Emulator::Pcsx2 => Platform::Ps2,
            Emulator::Dolphin => Platform::GameCube,
        }
    }

    pub fn ram_base(self) -> RamBase {
        match self {
            Emulator::DuckStation => RamBase::ExportedPointer { symbol: "RAM" },
            Emulator::Pcsx2 => RamBase::ExportedPointer { symbol: "EEmem" },
            Emulator::Mednafen129 => RamBase::Fixed(0x0200_3E80),
            Emulator::Mednafen131 => RamBase::Fixed(0x0203_4E80),
            Emulator::BizHawk => RamBase::ModuleOffset {
                module: "octoshock.dll",
                offset: 0x31_0F80,
            },
            Emulator::Dolphin => RamBase::Manual,
        }
    }
}

impl fmt::Display for Emulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Emulator::DuckStation => "DuckStation",
            Emulator::Pcsx2 => "PCSX2",
            Emulator::Mednafen129 => "Mednafen 1.29",
            Emulator::Mednafen131 => "Mednafen 1.31",
            Emulator::BizHawk => "BizHawk",
            Emulator::Dolphin => "Dolphin",
        };
        f.write_str(name)
    }
}

impl FromStr for Emulator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        match key.as_str() {
            "duckstation" => Ok(Emulator::DuckStation),
            "pcsx2" => Ok(Emulator::Pcsx2),
            "mednafen" | "mednafen129" => Ok(Emulator::Mednafen129),
            "mednafen131" => Ok(Emulator::Mednafen131),
            "bizhawk" | "emuhawk" => Ok(Emulator::BizHawk),
            "dolphin" => Ok(Emulator::Dolphin),
            _ => Err(format!("unknown emulator '{}'", s)),
        }
    }
}

/// Owner of the current emulator connection
pub trait ConnectionManager {
    type Connection: TargetMemory;

    /// The live connection; a connection whose process has exited is dropped
    /// and `None` is returned
    fn current(&mut self) -> Option<&Self::Connection>;

    /// Emulators with a running process
    fn scan(&mut self) -> Vec<Emulator>;

    fn connect(&mut self, emulator: Emulator) -> Result<&Self::Connection, ConnectionError>;

    fn disconnect(&mut self);

    /// Connect to the first running emulator found by `scan`
    fn connect_any(&mut self) -> Result<&Self::Connection, ConnectionError> {
        let Some(emulator) = self.scan().into_iter().next() else {
            return Err(ConnectionError::NoEmulatorFound);
        };
        self.connect(emulator)
    }
}

/// A live connection to one emulator process
pub struct EmulatorConnection {
    emulator: Emulator,
    memory: EmulatorMemory,
}

impl EmulatorConnection {
    pub fn emulator(&self) -> Emulator {
        self.emulator
    }

    pub fn pid(&self) -> u32 {
        self.memory.pid()
    }
}

impl TargetMemory for EmulatorConnection {
    fn main_ram_base(&self) -> u64 {
        self.memory.main_ram_base()
    }

    fn is_alive(&self) -> bool {
        self.memory.is_alive()
    }

    fn read(&self, address: u64, len: usize) -> Result<Vec<u8>, MemoryError> {
        self.memory.read(address, len)
    }

    fn write(&self, address: u64, data: &[u8]) -> Result<(), MemoryError> {
        self.memory.write(address, data)
    }
}

/// Connection manager backed by real emulator processes
#[derive(Default)]
pub struct EmulatorConnections {
    connection: Option<EmulatorConnection>,
    /// Restrict discovery to one emulator
    preferred: Option<Emulator>,
    /// Explicit RAM base; skips discovery
    ram_base_override: Option<u64>,
}

impl EmulatorConnections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_preferred(mut self, emulator: Option<Emulator>) -> Self {
        self.preferred = emulator;
        self
    }

    pub fn with_ram_base(mut self, ram_base: Option<u64>) -> Self {
        self.ram_base_override = ram_base;
        self
    }

    fn resolve_ram_base(&self, emulator: Emulator, info: &ProcessInfo) -> Result<u64, ConnectionError> {
        if let Some(base) = self.ram_base_override {
            return Ok(base);
        }

        let unavailable = |reason: String| ConnectionError::RamBaseUnavailable { emulator, reason };

        match emulator.ram_base() {
            RamBase::Fixed(address) => Ok(address),
            RamBase::ModuleOffset { module, offset } => process::module_base(info.pid, module)
                .map(|base| base + offset)
                .ok_or_else(|| unavailable(format!("module {} is not loaded", module))),
            RamBase::ExportedPointer { symbol } => {
                let exe_path = info
                    .exe_path
                    .as_ref()
                    .ok_or_else(|| unavailable("executable path is not readable".into()))?;
                let binary = LoadedBinary::from_file(exe_path)
                    .map_err(|e| unavailable(format!("{}: {}", exe_path.display(), e)))?;
                let rva = binary
                    .symbol_rva(symbol)
                    .ok_or_else(|| unavailable(format!("export {} not found", symbol)))?;
                let exe_name = exe_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| info.name.clone());
                let module_base = process::module_base(info.pid, &exe_name)
                    .ok_or_else(|| unavailable("main module base not found".into()))?;

                let process = ProcessMemory::open(info.pid)?;
                let ram = process.read_pointer(module_base + rva)?;
                if ram == 0 {
                    return Err(unavailable(format!("{} is null; is a game running?", symbol)));
                }
                Ok(ram)
            }
            RamBase::Manual => Err(unavailable("pass --ram-base explicitly".into())),
        }
    }
}

impl ConnectionManager for EmulatorConnections {
    type Connection = EmulatorConnection;

    fn current(&mut self) -> Option<&EmulatorConnection> {
        if let Some(connection) = &self.connection {
            if !connection.is_alive() {
                log::warn!("{} (pid {}) exited; dropping connection", connection.emulator, connection.pid());
                self.connection = None;
            }
        }
        self.connection.as_ref()
    }

    fn scan(&mut self) -> Vec<Emulator> {
        let processes = process::enumerate_processes();
        let candidates: Vec<Emulator> = match self.preferred {
            Some(emulator) => vec![emulator],
            None => Emulator::ALL.to_vec(),
        };

        let found: Vec<Emulator> = candidates
            .into_iter()
            .filter(|e| processes.iter().any(|p| p.name_starts_with(e.process_prefix())))
            .collect();
        log::debug!("Emulator scan found: {:?}", found);
        found
    }

    fn connect(&mut self, emulator: Emulator) -> Result<&EmulatorConnection, ConnectionError> {
        self.disconnect();

        let info = process::find_by_prefix(emulator.process_prefix())
            .ok_or(ConnectionError::ProcessNotFound(emulator))?;
        let main_ram_base = self.resolve_ram_base(emulator, &info)?;
        let process = ProcessMemory::open(info.pid)?;

        log::info!(
            "Connected to {} (pid {}), RAM base {:#x}",
            emulator,
            info.pid,
            main_ram_base
        );
        Ok(self.connection.insert(EmulatorConnection {
            emulator,
            memory: EmulatorMemory::new(process, main_ram_base),
        }))
    }

    fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            log::info!("Disconnected from {}", connection.emulator);
        }
    }
}
