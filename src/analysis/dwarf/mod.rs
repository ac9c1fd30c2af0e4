//! DWARF Reader - debug information of the built mod ELF
//!
//! Uses goblin to locate the debug sections and gimli to walk them.
//! Everything is extracted once when the reader is opened:
//! - the line table (source line ↔ address intervals)
//! - functions with their parameters and locals
//! - global variables
//!
//! Malformed entries are skipped so one bad DIE does not hide the rest of
//! the program.

pub mod line_table;
pub mod location;
pub mod types;

use std::path::{Path, PathBuf};

use gimli::{constants, AttributeValue, EndianSlice, RunTimeEndian};
use thiserror::Error;

use crate::analysis::loader::LoadedBinary;

pub use line_table::{LineRow, LineTable, SourceLine};
pub use location::Location;
pub use types::TypeInfo;

use types::TypeResolver;

pub(crate) type Reader<'a> = EndianSlice<'a, RunTimeEndian>;

/// DWARF reader errors
#[derive(Error, Debug)]
pub enum DwarfError {
    #[error("ELF file not found: {0}")]
    NotFound(PathBuf),

    #[error("No DWARF debug information in {0}")]
    NoDebugInfo(String),

    #[error("Failed to parse debug information: {0}")]
    Parse(String),
}

impl From<gimli::Error> for DwarfError {
    fn from(e: gimli::Error) -> Self {
        DwarfError::Parse(e.to_string())
    }
}

/// A variable, parameter or global described by DWARF
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub type_info: TypeInfo,
    pub location: Location,
    pub is_parameter: bool,
    pub is_global: bool,
}

impl Variable {
    pub fn type_name(&self) -> &str {
        &self.type_info.name
    }
}

/// A function with a concrete address range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub name: String,
    pub start_address: u32,
    /// Exclusive
    pub end_address: u32,
    pub file_path: String,
    pub line_number: u32,
    pub parameters: Vec<Variable>,
    pub locals: Vec<Variable>,
}

impl FunctionInfo {
    pub fn contains(&self, address: u32) -> bool {
        self.start_address <= address && address < self.end_address
    }
}

/// Debug information extracted from one ELF
#[derive(Debug, Clone)]
pub struct DwarfReader {
    path: String,
    line_table: LineTable,
    functions: Vec<FunctionInfo>,
    globals: Vec<Variable>,
}

impl DwarfReader {
    /// Open and parse an ELF file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DwarfError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(DwarfError::NotFound(path.to_path_buf()));
        }
        let binary = LoadedBinary::from_file(path).map_err(|e| DwarfError::Parse(e.to_string()))?;
        Self::from_binary(&binary)
    }

    /// Parse an in-memory ELF image.
    pub fn from_bytes(data: Vec<u8>, name: &str) -> Result<Self, DwarfError> {
        let binary = LoadedBinary::from_bytes(data, name.to_string())
            .map_err(|e| DwarfError::Parse(e.to_string()))?;
        Self::from_binary(&binary)
    }

    pub fn from_binary(binary: &LoadedBinary) -> Result<Self, DwarfError> {
        if binary.section_data(".debug_info").map_or(true, <[u8]>::is_empty) {
            return Err(DwarfError::NoDebugInfo(binary.path.clone()));
        }

        let endian = if binary.is_little_endian {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };
        let dwarf = gimli::Dwarf::load(|id| {
            let data = binary.section_data(id.name()).unwrap_or(&[]);
            Ok::<_, gimli::Error>(EndianSlice::new(data, endian))
        })?;

        let mut reader = Self {
            path: binary.path.clone(),
            line_table: LineTable::new(),
            functions: Vec::new(),
            globals: Vec::new(),
        };

        let mut units = dwarf.units();
        while let Some(header) = units.next()? {
            let unit = match dwarf.unit(header) {
                Ok(unit) => unit,
                Err(e) => {
                    log::warn!("Skipping compilation unit: {}", e);
                    continue;
                }
            };
            let walker = UnitWalker {
                dwarf: &dwarf,
                unit: &unit,
            };

            match walker.line_rows() {
                Ok(rows) => reader.line_table.add_rows(rows),
                Err(e) => log::warn!("Skipping line program: {}", e),
            }
            if let Err(e) = walker.collect(&mut reader.functions, &mut reader.globals) {
                log::warn!("Debug info walk stopped early: {}", e);
            }
        }

        log::info!(
            "Loaded DWARF from {}: {} lines, {} functions, {} globals",
            reader.path,
            reader.line_table.len(),
            reader.functions.len(),
            reader.globals.len()
        );
        Ok(reader)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The line table, grouped per source file
    pub fn line_program(&self) -> &LineTable {
        &self.line_table
    }

    /// Start addresses generated for a source line
    pub fn address_for_line(&self, file_path: &str, line: u32) -> Vec<u32> {
        self.line_table.address_for_line(file_path, line)
    }

    /// Source lines whose address interval contains `address`
    pub fn source_lines_for_address(&self, address: u32) -> Vec<&SourceLine> {
        self.line_table.lines_for_address(address)
    }

    pub fn functions(&self) -> &[FunctionInfo] {
        &self.functions
    }

    /// The function whose `[start, end)` range contains `address`
    pub fn function_at_address(&self, address: u32) -> Option<&FunctionInfo> {
        self.functions.iter().find(|f| f.contains(address))
    }

    pub fn find_function(&self, name: &str) -> Option<&FunctionInfo> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn global_variables(&self) -> &[Variable] {
        &self.globals
    }
}

/// Walks one compilation unit
struct UnitWalker<'a, 'd> {
    dwarf: &'a gimli::Dwarf<Reader<'d>>,
    unit: &'a gimli::Unit<Reader<'d>>,
}

type Entry<'a, 'u, 'd> = gimli::DebuggingInformationEntry<'a, 'u, Reader<'d>>;

impl<'a, 'd> UnitWalker<'a, 'd> {
    fn string(&self, value: AttributeValue<Reader<'d>>) -> Result<String, gimli::Error> {
        Ok(self
            .dwarf
            .attr_string(self.unit, value)?
            .to_string_lossy()
            .into_owned())
    }

    fn name_of(&self, entry: &Entry<'_, '_, 'd>) -> Result<Option<String>, gimli::Error> {
        match entry.attr_value(constants::DW_AT_name)? {
            Some(value) => self.string(value).map(Some),
            None => Ok(None),
        }
    }

    /// Path of a line-program file entry; the directory is joined only for
    /// entries that name one explicitly.
    fn file_path(
        &self,
        header: &gimli::LineProgramHeader<Reader<'d>>,
        file: &gimli::FileEntry<Reader<'d>>,
    ) -> Result<String, gimli::Error> {
        let name = self.string(file.path_name())?;
        if file.directory_index() != 0 {
            if let Some(directory) = file.directory(header) {
                let directory = self.string(directory)?;
                return Ok(line_table::join_path(&directory, &name));
            }
        }
        Ok(name)
    }

    fn line_rows(&self) -> Result<Vec<LineRow>, gimli::Error> {
        let Some(program) = self.unit.line_program.clone() else {
            return Ok(Vec::new());
        };

        let mut rows = program.rows();
        let mut out = Vec::new();
        while let Some((header, row)) = rows.next_row()? {
            let file_path = match row.file(header) {
                Some(file) => self.file_path(header, file)?,
                None => String::new(),
            };
            out.push(LineRow {
                file_path,
                line: row.line().map(|l| l.get() as u32).unwrap_or(0),
                address: row.address() as u32,
                column: match row.column() {
                    gimli::ColumnType::LeftEdge => 0,
                    gimli::ColumnType::Column(c) => c.get() as u32,
                },
                end_sequence: row.end_sequence(),
            });
        }
        Ok(out)
    }

    fn decl_file(&self, value: AttributeValue<Reader<'d>>) -> Option<String> {
        let index = match value {
            AttributeValue::FileIndex(index) => index,
            other => other.udata_value()?,
        };
        let program = self.unit.line_program.as_ref()?;
        let header = program.header();
        let file = header.file(index)?;
        self.file_path(header, file).ok()
    }

    fn variable(
        &self,
        entry: &Entry<'_, '_, 'd>,
        is_parameter: bool,
        is_global: bool,
    ) -> Result<Option<Variable>, gimli::Error> {
        let Some(name) = self.name_of(entry)? else {
            return Ok(None);
        };

        let resolver = TypeResolver {
            dwarf: self.dwarf,
            unit: self.unit,
        };
        let type_info = resolver.resolve_attr(entry.attr_value(constants::DW_AT_type)?);

        let address_size = self.unit.header.address_size();
        let location = match entry.attr_value(constants::DW_AT_location)? {
            Some(AttributeValue::Exprloc(expression)) => {
                location::decode_location(expression.0.slice(), address_size)
            }
            Some(AttributeValue::Block(block)) => {
                location::decode_location(block.slice(), address_size)
            }
            _ => Location::Unavailable,
        };

        Ok(Some(Variable {
            name,
            type_info,
            location,
            is_parameter,
            is_global,
        }))
    }

    /// Address range, name and declaration of a subprogram with code
    fn function_header(&self, entry: &Entry<'_, '_, 'd>) -> Result<Option<FunctionInfo>, gimli::Error> {
        let low_pc = match entry.attr_value(constants::DW_AT_low_pc)? {
            Some(value) => self.dwarf.attr_address(self.unit, value)?,
            None => None,
        };
        let Some(low_pc) = low_pc else {
            return Ok(None);
        };
        let high_pc = match entry.attr_value(constants::DW_AT_high_pc)? {
            Some(AttributeValue::Addr(address)) => address,
            Some(other) => match other.udata_value() {
                Some(length) => low_pc + length,
                None => return Ok(None),
            },
            None => return Ok(None),
        };

        let name = self
            .name_of(entry)?
            .unwrap_or_else(|| "<unknown>".to_string());
        let file_path = entry
            .attr_value(constants::DW_AT_decl_file)?
            .and_then(|value| self.decl_file(value))
            .unwrap_or_default();
        let line_number = entry
            .attr_value(constants::DW_AT_decl_line)?
            .and_then(|value| value.udata_value())
            .unwrap_or(0) as u32;

        Ok(Some(FunctionInfo {
            name,
            start_address: low_pc as u32,
            end_address: high_pc as u32,
            file_path,
            line_number,
            parameters: Vec::new(),
            locals: Vec::new(),
        }))
    }

    /// Collect functions (at any depth) and top-level globals.
    fn collect(
        &self,
        functions: &mut Vec<FunctionInfo>,
        globals: &mut Vec<Variable>,
    ) -> Result<(), gimli::Error> {
        let mut tree = self.unit.entries_tree(None)?;
        let root = tree.root()?;
        self.walk(root, true, functions, globals)
    }

    fn walk(
        &self,
        node: gimli::EntriesTreeNode<'_, '_, '_, Reader<'d>>,
        top_level: bool,
        functions: &mut Vec<FunctionInfo>,
        globals: &mut Vec<Variable>,
    ) -> Result<(), gimli::Error> {
        let mut children = node.children();
        while let Some(child) = children.next()? {
            let entry = child.entry().clone();
            match entry.tag() {
                constants::DW_TAG_subprogram => {
                    let header = match self.function_header(&entry) {
                        Ok(header) => header,
                        Err(e) => {
                            log::debug!("Skipping subprogram at {:?}: {}", entry.offset(), e);
                            None
                        }
                    };
                    match header {
                        Some(mut function) => {
                            self.members(child, &mut function, functions)?;
                            functions.push(function);
                        }
                        None => self.walk(child, false, functions, globals)?,
                    }
                }
                constants::DW_TAG_variable if top_level => match self.variable(&entry, false, true) {
                    Ok(Some(variable)) => globals.push(variable),
                    Ok(None) => {}
                    Err(e) => log::debug!("Skipping global at {:?}: {}", entry.offset(), e),
                },
                _ => self.walk(child, false, functions, globals)?,
            }
        }
        Ok(())
    }

    /// Parameters and locals are the direct children of the subprogram;
    /// nested subprograms are collected as functions of their own.
    fn members(
        &self,
        node: gimli::EntriesTreeNode<'_, '_, '_, Reader<'d>>,
        function: &mut FunctionInfo,
        functions: &mut Vec<FunctionInfo>,
    ) -> Result<(), gimli::Error> {
        let mut children = node.children();
        while let Some(child) = children.next()? {
            let entry = child.entry().clone();
            let is_parameter = match entry.tag() {
                constants::DW_TAG_formal_parameter => true,
                constants::DW_TAG_variable => false,
                constants::DW_TAG_subprogram => {
                    if let Ok(Some(mut nested)) = self.function_header(&entry) {
                        self.members(child, &mut nested, functions)?;
                        functions.push(nested);
                    }
                    continue;
                }
                _ => continue,
            };

            match self.variable(&entry, is_parameter, false) {
                Ok(Some(variable)) if is_parameter => function.parameters.push(variable),
                Ok(Some(variable)) => function.locals.push(variable),
                Ok(None) => {}
                Err(e) => log::debug!("Skipping variable in {}: {}", function.name, e),
            }
        }
        Ok(())
    }
}
