//! Binary Loader Module
//!
//! Parses ELF and PE files using goblin and extracts:
//! - Sections, with their raw bytes (DWARF sections for the mod ELF)
//! - Symbols and exports (codecave entry labels, emulator RAM exports)
//! - Machine and endianness information

use anyhow::{anyhow, Result};
use std::fs;
use std::path::Path;

/// A named symbol or export found in the binary
#[derive(Debug, Clone)]
pub struct SymbolInfo {
    /// Symbol name
    pub name: String,
    /// Virtual address (image base included)
    pub address: u64,
    /// Size in bytes (0 if unknown)
    pub size: u64,
    /// Whether this is a global/exported symbol
    pub is_export: bool,
}

/// Information about a section in the binary
#[derive(Debug, Clone)]
pub struct SectionInfo {
    /// Section name
    pub name: String,
    /// Virtual address
    pub virtual_address: u64,
    /// Size in memory
    pub virtual_size: u64,
    /// Offset in file
    pub file_offset: u64,
    /// Size in file (0 for NOBITS sections)
    pub file_size: u64,
    /// Is this section executable?
    pub is_executable: bool,
}

impl SectionInfo {
    pub fn contains(&self, address: u64) -> bool {
        self.virtual_address != 0
            && address >= self.virtual_address
            && address < self.virtual_address + self.virtual_size
    }
}

/// Parsed binary information
#[derive(Debug)]
pub struct LoadedBinary {
    /// Original file path
    pub path: String,
    /// Raw bytes of the file
    pub data: Vec<u8>,
    /// ELF e_machine / PE machine
    pub machine: u16,
    /// Entry point address
    pub entry_point: u64,
    /// Image base address
    pub image_base: u64,
    /// Symbols and exports
    pub symbols: Vec<SymbolInfo>,
    /// All sections
    pub sections: Vec<SectionInfo>,
    /// Is this a 64-bit binary?
    pub is_64bit: bool,
    pub is_little_endian: bool,
    /// Binary format (PE, ELF)
    pub format: String,
}

impl LoadedBinary {
    /// Load and parse a binary file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let data = fs::read(&path)?;
        Self::from_bytes(data, path_str)
    }

    /// Parse binary from bytes
    pub fn from_bytes(data: Vec<u8>, path: String) -> Result<Self> {
        if data.len() < 4 {
            return Err(anyhow!("File too small"));
        }

        // MZ header
        if data[0] == 0x4D && data[1] == 0x5A {
            return Self::parse_pe(data, path);
        }

        if data[0..4] == [0x7F, b'E', b'L', b'F'] {
            return Self::parse_elf(data, path);
        }

        Err(anyhow!("Unknown binary format"))
    }

    /// Parse PE (Windows emulator executables)
    fn parse_pe(data: Vec<u8>, path: String) -> Result<Self> {
        let pe = goblin::pe::PE::parse(&data)?;

        let is_64bit = pe.is_64;
        let image_base = pe.image_base as u64;
        let entry_point = image_base + pe.entry as u64;
        let machine = pe.header.coff_header.machine;

        let sections = pe
            .sections
            .iter()
            .map(|section| {
                let name = String::from_utf8_lossy(&section.name)
                    .trim_end_matches('\0')
                    .to_string();
                SectionInfo {
                    name,
                    virtual_address: image_base + section.virtual_address as u64,
                    virtual_size: section.virtual_size as u64,
                    file_offset: section.pointer_to_raw_data as u64,
                    file_size: section.size_of_raw_data as u64,
                    is_executable: (section.characteristics & 0x2000_0000) != 0,
                }
            })
            .collect();

        let symbols = pe
            .exports
            .iter()
            .filter_map(|export| {
                export.name.map(|name| SymbolInfo {
                    name: name.to_string(),
                    address: image_base + export.rva as u64,
                    size: export.size as u64,
                    is_export: true,
                })
            })
            .collect();

        Ok(Self {
            path,
            data,
            machine,
            entry_point,
            image_base,
            symbols,
            sections,
            is_64bit,
            is_little_endian: true,
            format: "PE".to_string(),
        })
    }

    /// Parse ELF (mod builds and Linux emulator executables)
    fn parse_elf(data: Vec<u8>, path: String) -> Result<Self> {
        let elf = goblin::elf::Elf::parse(&data)?;

        let is_64bit = elf.is_64;
        let is_little_endian = elf.little_endian;
        let entry_point = elf.entry;
        let machine = elf.header.e_machine;

        let image_base = elf
            .program_headers
            .iter()
            .filter(|ph| ph.p_type == goblin::elf::program_header::PT_LOAD)
            .map(|ph| ph.p_vaddr)
            .min()
            .unwrap_or(0);

        let sections = elf
            .section_headers
            .iter()
            .map(|section| {
                let name = elf.shdr_strtab.get_at(section.sh_name).unwrap_or("").to_string();
                let file_size = if section.sh_type == goblin::elf::section_header::SHT_NOBITS {
                    0
                } else {
                    section.sh_size
                };
                SectionInfo {
                    name,
                    virtual_address: section.sh_addr,
                    virtual_size: section.sh_size,
                    file_offset: section.sh_offset,
                    file_size,
                    is_executable: (section.sh_flags
                        & goblin::elf::section_header::SHF_EXECINSTR as u64)
                        != 0,
                }
            })
            .collect();

        let mut symbols: Vec<SymbolInfo> = Vec::new();
        let tables = [(&elf.syms, &elf.strtab), (&elf.dynsyms, &elf.dynstrtab)];
        for (syms, strtab) in tables {
            for sym in syms.iter() {
                if sym.st_shndx == goblin::elf::section_header::SHN_UNDEF as usize {
                    continue;
                }
                let name = strtab.get_at(sym.st_name).unwrap_or("");
                if name.is_empty() || symbols.iter().any(|s| s.name == name) {
                    continue;
                }
                symbols.push(SymbolInfo {
                    name: name.to_string(),
                    address: sym.st_value,
                    size: sym.st_size,
                    is_export: sym.st_bind() == goblin::elf::sym::STB_GLOBAL,
                });
            }
        }

        Ok(Self {
            path,
            data,
            machine,
            entry_point,
            image_base,
            symbols,
            sections,
            is_64bit,
            is_little_endian,
            format: "ELF".to_string(),
        })
    }

    /// Find a section by name
    pub fn section(&self, name: &str) -> Option<&SectionInfo> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Raw file bytes of a section, `None` when absent or out of bounds
    pub fn section_data(&self, name: &str) -> Option<&[u8]> {
        let section = self.section(name)?;
        let start = section.file_offset as usize;
        let end = start.checked_add(section.file_size as usize)?;
        self.data.get(start..end)
    }

    /// The allocated section whose address range contains `address`
    pub fn section_containing(&self, address: u64) -> Option<&SectionInfo> {
        self.sections.iter().find(|s| s.contains(address))
    }

    /// Find a symbol by name
    pub fn find_symbol(&self, name: &str) -> Option<&SymbolInfo> {
        self.symbols.iter().find(|s| s.name == name)
    }

    /// Offset of a symbol from the image base, as it appears relative to the
    /// module base once mapped
    pub fn symbol_rva(&self, name: &str) -> Option<u64> {
        self.find_symbol(name)
            .map(|s| s.address.wrapping_sub(self.image_base))
    }

    /// Get bytes at a given address
    pub fn get_bytes(&self, address: u64, size: usize) -> Option<&[u8]> {
        let section = self.section_containing(address)?;
        let start = (section.file_offset + (address - section.virtual_address)) as usize;
        let end = start.checked_add(size)?;
        self.data.get(start..end)
    }

    /// Get summary string
    pub fn summary(&self) -> String {
        format!(
            "{} {} binary ({}, machine {:#x})\n\
             Entry: 0x{:x}\n\
             Image Base: 0x{:x}\n\
             Sections: {}\n\
             Symbols: {}",
            if self.is_64bit { "64-bit" } else { "32-bit" },
            self.format,
            if self.is_little_endian { "LE" } else { "BE" },
            self.machine,
            self.entry_point,
            self.image_base,
            self.sections.len(),
            self.symbols.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_self() {
        // Parse the test executable itself
        let exe_path = std::env::current_exe().unwrap();
        let result = LoadedBinary::from_file(&exe_path);

        if let Ok(binary) = result {
            println!("{}", binary.summary());
            assert!(!binary.sections.is_empty());
            assert!(binary.section(".text").is_some() || binary.format == "PE");
        } else {
            println!("Could not parse self: {:?}", result);
        }
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(LoadedBinary::from_bytes(vec![1, 2], "tiny".into()).is_err());
        assert!(LoadedBinary::from_bytes(vec![0; 64], "zeros".into()).is_err());
    }
}
