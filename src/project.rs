//! Project model - the slice of a mod project the debugger needs.
//!
//! Project files, build versions and packaging belong to the build tooling;
//! the debugger only needs the project root, the target platform and the
//! codecaves of the current build.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// ELF produced by the build, relative to the project root
pub const ELF_RELATIVE_PATH: &str = ".config/output/object_files/MyMod.elf";
/// Generated trap handler source, relative to the project root
pub const HANDLER_RELATIVE_PATH: &str = "asm/debug_codecave.s";

/// Target console
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Ps1,
    Ps2,
    GameCube,
    Wii,
    N64,
}

impl Platform {
    /// Whether a trap handler can be generated for this platform.
    ///
    /// PS1 and PS2 are little-endian MIPS; everything else is not supported.
    pub fn supports_debugging(self) -> bool {
        matches!(self, Platform::Ps1 | Platform::Ps2)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::Ps1 => "PS1",
            Platform::Ps2 => "PS2",
            Platform::GameCube => "GameCube",
            Platform::Wii => "Wii",
            Platform::N64 => "N64",
        };
        f.write_str(name)
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ps1" | "psx" => Ok(Platform::Ps1),
            "ps2" => Ok(Platform::Ps2),
            "gamecube" | "gc" => Ok(Platform::GameCube),
            "wii" => Ok(Platform::Wii),
            "n64" => Ok(Platform::N64),
            other => Err(format!("unknown platform '{}'", other)),
        }
    }
}

/// A memory region the build links custom code into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Codecave {
    pub name: String,
    pub memory_address: u32,
    pub size: u32,
    /// Source inputs, relative to the project root
    pub code_files: Vec<String>,
}

impl Codecave {
    pub fn new(name: impl Into<String>, memory_address: u32, size: u32) -> Self {
        Self {
            name: name.into(),
            memory_address,
            size,
            code_files: Vec::new(),
        }
    }

    pub fn has_code_file(&self, path: &str) -> bool {
        self.code_files.iter().any(|f| f == path)
    }

    /// Add a source input; returns false when it was already present
    pub fn add_code_file(&mut self, path: &str) -> bool {
        if self.has_code_file(path) {
            return false;
        }
        self.code_files.push(path.to_string());
        true
    }

    /// Remove a source input; returns whether it was present
    pub fn remove_code_file(&mut self, path: &str) -> bool {
        let before = self.code_files.len();
        self.code_files.retain(|f| f != path);
        before != self.code_files.len()
    }
}

impl FromStr for Codecave {
    type Err = String;

    /// Parse `ADDR:SIZE` or `NAME=ADDR:SIZE`, both numbers in hex
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, range) = match s.split_once('=') {
            Some((name, range)) => (name.trim(), range),
            None => ("debug", s),
        };
        let (address, size) = range
            .split_once(':')
            .ok_or_else(|| format!("expected ADDR:SIZE, got '{}'", s))?;
        let address = parse_hex_u32(address)?;
        let size = parse_hex_u32(size)?;
        if size == 0 {
            return Err("codecave size must be non-zero".into());
        }
        Ok(Codecave::new(name, address, size))
    }
}

/// Parse a hex number with or without a `0x` prefix
pub fn parse_hex_u32(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u32::from_str_radix(digits, 16).map_err(|e| format!("invalid hex number '{}': {}", s, e))
}

/// The parts of a mod project the debugger reads and edits
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
    platform: Platform,
    codecaves: Vec<Codecave>,
    elf_override: Option<PathBuf>,
}

impl Project {
    pub fn new(root: impl Into<PathBuf>, platform: Platform, codecaves: Vec<Codecave>) -> Self {
        Self {
            root: root.into(),
            platform,
            codecaves,
            elf_override: None,
        }
    }

    /// Use a specific ELF instead of the conventional build output
    pub fn with_elf_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.elf_override = Some(path.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn codecaves(&self) -> &[Codecave] {
        &self.codecaves
    }

    pub fn first_codecave(&self) -> Option<&Codecave> {
        self.codecaves.first()
    }

    pub fn first_codecave_mut(&mut self) -> Option<&mut Codecave> {
        self.codecaves.first_mut()
    }

    pub fn elf_path(&self) -> PathBuf {
        self.elf_override
            .clone()
            .unwrap_or_else(|| self.root.join(ELF_RELATIVE_PATH))
    }

    pub fn handler_path(&self) -> PathBuf {
        self.root.join(HANDLER_RELATIVE_PATH)
    }
}
