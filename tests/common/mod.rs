//! Shared fixtures for integration tests
//!
//! - `SimulatedRam`: console RAM held in a buffer, behind `TargetMemory`
//! - `SimulatedConnections`: a `ConnectionManager` over one `SimulatedRam`
//! - `build_test_elf`: a small ELF32 MIPS image with DWARF v2 for `test.c`

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::path::Path;

use cavedbg::arch::mips::strip_kernel_segment;
use cavedbg::core::connection::{ConnectionError, ConnectionManager, Emulator};
use cavedbg::core::memory::{MemoryError, TargetMemory};
use cavedbg::project::{Codecave, Platform, Project, ELF_RELATIVE_PATH};

/// Host address the simulated RAM is "mapped" at
pub const HOST_RAM_BASE: u64 = 0x7F00_0000_0000;
pub const RAM_SIZE: usize = 0x20_0000;

/// `foo` in test.c: lines 10..=15, one word each
pub const FOO_START: u32 = 0x8001_0000;
pub const FOO_END: u32 = 0x8001_0018;
pub const GLOBAL_COUNTER: u32 = 0x8005_0000;

pub const CODECAVE_BASE: u32 = 0x8010_0000;
pub const CODECAVE_SIZE: u32 = 0x1_0000;
pub const CONTROL_BLOCK: u32 = CODECAVE_BASE + CODECAVE_SIZE - 256;
pub const HIT_FLAG: u32 = CONTROL_BLOCK + 128;
pub const BREAKPOINT_ID: u32 = CONTROL_BLOCK + 140;
pub const HANDLER_ENTRY: u32 = CODECAVE_BASE + 0x40;

/// Address of `test.c:line` inside `foo`
pub fn line_address(line: u32) -> u32 {
    FOO_START + (line - 10) * 4
}

/// Emulated console RAM
pub struct SimulatedRam {
    bytes: RefCell<Vec<u8>>,
    pub fail_reads: Cell<bool>,
    pub fail_writes: Cell<bool>,
    pub writes: Cell<usize>,
}

impl SimulatedRam {
    pub fn new() -> Self {
        Self {
            bytes: RefCell::new(vec![0; RAM_SIZE]),
            fail_reads: Cell::new(false),
            fail_writes: Cell::new(false),
            writes: Cell::new(0),
        }
    }

    fn offset(address: u32) -> usize {
        strip_kernel_segment(address) as usize
    }

    /// Console-side view: read bytes at a console address
    pub fn peek(&self, address: u32, len: usize) -> Vec<u8> {
        let start = Self::offset(address);
        self.bytes.borrow()[start..start + len].to_vec()
    }

    pub fn peek_u32(&self, address: u32) -> u32 {
        let bytes = self.peek(address, 4);
        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    /// Console-side view: store bytes at a console address
    pub fn poke(&self, address: u32, data: &[u8]) {
        let start = Self::offset(address);
        self.bytes.borrow_mut()[start..start + data.len()].copy_from_slice(data);
    }

    pub fn poke_u32(&self, address: u32, value: u32) {
        self.poke(address, &value.to_le_bytes());
    }

    /// What the trap handler does on a hit
    pub fn simulate_hit(&self, id: u32, registers: &[u32; 32]) {
        for (index, value) in registers.iter().enumerate() {
            self.poke_u32(CONTROL_BLOCK + index as u32 * 4, *value);
        }
        self.poke_u32(BREAKPOINT_ID, id);
        self.poke_u32(HIT_FLAG, 1);
    }

    fn range(&self, address: u64, len: usize) -> Option<std::ops::Range<usize>> {
        let start = address.checked_sub(HOST_RAM_BASE)? as usize;
        let end = start.checked_add(len)?;
        (end <= RAM_SIZE).then_some(start..end)
    }
}

impl Default for SimulatedRam {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetMemory for SimulatedRam {
    fn main_ram_base(&self) -> u64 {
        HOST_RAM_BASE
    }

    fn is_alive(&self) -> bool {
        true
    }

    fn read(&self, address: u64, len: usize) -> Result<Vec<u8>, MemoryError> {
        if self.fail_reads.get() {
            return Err(MemoryError::ReadFailed {
                address,
                reason: "simulated failure".into(),
            });
        }
        let range = self.range(address, len).ok_or(MemoryError::ReadFailed {
            address,
            reason: "outside RAM".into(),
        })?;
        Ok(self.bytes.borrow()[range].to_vec())
    }

    fn write(&self, address: u64, data: &[u8]) -> Result<(), MemoryError> {
        if self.fail_writes.get() {
            return Err(MemoryError::WriteFailed {
                address,
                reason: "simulated failure".into(),
            });
        }
        let range = self.range(address, data.len()).ok_or(MemoryError::WriteFailed {
            address,
            reason: "outside RAM".into(),
        })?;
        self.bytes.borrow_mut()[range].copy_from_slice(data);
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }
}

/// One simulated DuckStation that can be started and stopped
pub struct SimulatedConnections {
    pub ram: SimulatedRam,
    pub running: bool,
    pub connected: bool,
}

impl SimulatedConnections {
    pub fn running() -> Self {
        Self {
            ram: SimulatedRam::new(),
            running: true,
            connected: false,
        }
    }

    pub fn absent() -> Self {
        Self {
            running: false,
            ..Self::running()
        }
    }
}

impl ConnectionManager for SimulatedConnections {
    type Connection = SimulatedRam;

    fn current(&mut self) -> Option<&SimulatedRam> {
        if !self.running {
            self.connected = false;
        }
        self.connected.then_some(&self.ram)
    }

    fn scan(&mut self) -> Vec<Emulator> {
        if self.running {
            vec![Emulator::DuckStation]
        } else {
            Vec::new()
        }
    }

    fn connect(&mut self, emulator: Emulator) -> Result<&SimulatedRam, ConnectionError> {
        if !self.running {
            return Err(ConnectionError::ProcessNotFound(emulator));
        }
        self.connected = true;
        Ok(&self.ram)
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }
}

// ---- ELF / DWARF fixture ----

fn uleb(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

fn sleb(out: &mut Vec<u8>, mut value: i64) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
        if done {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

fn cstr(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

fn u16le(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn u32le(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

// Abbreviation codes
const AB_COMPILE_UNIT: u64 = 1;
const AB_BASE_TYPE: u64 = 2;
const AB_SUBPROGRAM: u64 = 3;
const AB_VARIABLE: u64 = 4;
const AB_PARAMETER: u64 = 5;
const AB_STRUCT: u64 = 6;

fn debug_abbrev() -> Vec<u8> {
    // (code, tag, has_children, [(attribute, form)])
    let table: [(u64, u64, u8, &[(u64, u64)]); 6] = [
        (
            AB_COMPILE_UNIT,
            0x11,
            1,
            &[(0x03, 0x08), (0x1b, 0x08), (0x10, 0x06), (0x11, 0x01), (0x12, 0x01)],
        ),
        (AB_BASE_TYPE, 0x24, 0, &[(0x03, 0x08), (0x3e, 0x0b), (0x0b, 0x0b)]),
        (
            AB_SUBPROGRAM,
            0x2e,
            1,
            &[(0x03, 0x08), (0x3a, 0x0b), (0x3b, 0x0b), (0x11, 0x01), (0x12, 0x01)],
        ),
        (AB_VARIABLE, 0x34, 0, &[(0x03, 0x08), (0x49, 0x13), (0x02, 0x0a)]),
        (AB_PARAMETER, 0x05, 0, &[(0x03, 0x08), (0x49, 0x13), (0x02, 0x0a)]),
        (AB_STRUCT, 0x13, 0, &[(0x03, 0x08), (0x0b, 0x0b)]),
    ];

    let mut out = Vec::new();
    for (code, tag, children, attributes) in table {
        uleb(&mut out, code);
        uleb(&mut out, tag);
        out.push(children);
        for &(attribute, form) in attributes {
            uleb(&mut out, attribute);
            uleb(&mut out, form);
        }
        out.extend_from_slice(&[0, 0]);
    }
    out.push(0);
    out
}

const CU_HEADER_SIZE: usize = 11;

fn variable_die(out: &mut Vec<u8>, abbrev: u64, name: &str, type_offset: usize, location: &[u8]) {
    uleb(out, abbrev);
    cstr(out, name);
    u32le(out, type_offset as u32);
    out.push(location.len() as u8);
    out.extend_from_slice(location);
}

/// One CU for test.c:
/// - `int counter` at `GLOBAL_COUNTER`, `struct pos origin` next to it
/// - `int foo(int a)` with `int x` at fbreg -8 and `unsigned char flags` at fbreg -1
fn debug_info() -> Vec<u8> {
    let mut dies = Vec::new();

    uleb(&mut dies, AB_COMPILE_UNIT);
    cstr(&mut dies, "test.c");
    cstr(&mut dies, "/home/modder/project");
    u32le(&mut dies, 0);
    u32le(&mut dies, FOO_START);
    u32le(&mut dies, FOO_END);

    let int_type = CU_HEADER_SIZE + dies.len();
    uleb(&mut dies, AB_BASE_TYPE);
    cstr(&mut dies, "int");
    dies.push(0x05); // DW_ATE_signed
    dies.push(4);

    let uchar_type = CU_HEADER_SIZE + dies.len();
    uleb(&mut dies, AB_BASE_TYPE);
    cstr(&mut dies, "unsigned char");
    dies.push(0x08); // DW_ATE_unsigned_char
    dies.push(1);

    let struct_type = CU_HEADER_SIZE + dies.len();
    uleb(&mut dies, AB_STRUCT);
    cstr(&mut dies, "pos");
    dies.push(8);

    let mut addr_op = vec![0x03];
    addr_op.extend_from_slice(&GLOBAL_COUNTER.to_le_bytes());
    variable_die(&mut dies, AB_VARIABLE, "counter", int_type, &addr_op);

    let mut addr_op = vec![0x03];
    addr_op.extend_from_slice(&(GLOBAL_COUNTER + 4).to_le_bytes());
    variable_die(&mut dies, AB_VARIABLE, "origin", struct_type, &addr_op);

    uleb(&mut dies, AB_SUBPROGRAM);
    cstr(&mut dies, "foo");
    dies.push(1);
    dies.push(9);
    u32le(&mut dies, FOO_START);
    u32le(&mut dies, FOO_END);
    // a in $a0
    variable_die(&mut dies, AB_PARAMETER, "a", int_type, &[0x54]);
    variable_die(&mut dies, AB_VARIABLE, "x", int_type, &[0x91, 0x78]);
    variable_die(&mut dies, AB_VARIABLE, "flags", uchar_type, &[0x91, 0x7f]);
    dies.push(0);

    dies.push(0);

    let mut out = Vec::new();
    u32le(&mut out, (2 + 4 + 1 + dies.len()) as u32);
    u16le(&mut out, 2);
    u32le(&mut out, 0);
    out.push(4);
    out.extend_from_slice(&dies);
    out
}

/// Line program: test.c lines 10..=15 at consecutive words from `FOO_START`
fn debug_line() -> Vec<u8> {
    let mut header = Vec::new();
    header.push(1); // minimum_instruction_length
    header.push(1); // default_is_stmt
    header.push((-5i8) as u8); // line_base
    header.push(14); // line_range
    header.push(13); // opcode_base
    header.extend_from_slice(&[0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1]);
    header.push(0); // no include directories
    cstr(&mut header, "test.c");
    header.extend_from_slice(&[0, 0, 0]);
    header.push(0);

    let mut program = Vec::new();
    // DW_LNE_set_address
    program.extend_from_slice(&[0x00, 5, 0x02]);
    u32le(&mut program, FOO_START);
    // DW_LNS_advance_line, DW_LNS_copy
    program.push(0x03);
    sleb(&mut program, 9);
    program.push(0x01);
    for _ in 11..=15 {
        program.extend_from_slice(&[0x02, 4]);
        program.push(0x03);
        sleb(&mut program, 1);
        program.push(0x01);
    }
    program.extend_from_slice(&[0x02, 4]);
    // DW_LNE_end_sequence
    program.extend_from_slice(&[0x00, 1, 0x01]);

    let mut out = Vec::new();
    u32le(&mut out, (2 + 4 + header.len() + program.len()) as u32);
    u16le(&mut out, 2);
    u32le(&mut out, header.len() as u32);
    out.extend_from_slice(&header);
    out.extend_from_slice(&program);
    out
}

struct Section {
    name: &'static str,
    kind: u32,
    flags: u32,
    address: u32,
    data: Vec<u8>,
    link: u32,
    info: u32,
    entry_size: u32,
}

impl Section {
    fn new(name: &'static str, kind: u32, data: Vec<u8>) -> Self {
        Self {
            name,
            kind,
            flags: 0,
            address: 0,
            data,
            link: 0,
            info: 0,
            entry_size: 0,
        }
    }
}

fn symbol_tables(symbols: &[(&str, u32)]) -> (Vec<u8>, Vec<u8>) {
    let mut strtab = vec![0u8];
    let mut symtab = vec![0u8; 16];
    for &(name, address) in symbols {
        let name_offset = strtab.len() as u32;
        cstr(&mut strtab, name);
        u32le(&mut symtab, name_offset);
        u32le(&mut symtab, address);
        u32le(&mut symtab, 0);
        symtab.push(0x12); // STB_GLOBAL, STT_FUNC
        symtab.push(0);
        u16le(&mut symtab, 1); // .text
    }
    (symtab, strtab)
}

/// Serialize a little-endian ELF32 MIPS executable
fn write_elf(mut sections: Vec<Section>) -> Vec<u8> {
    let mut shstrtab = vec![0u8];
    let mut name_offsets = vec![0u32];
    for section in &sections {
        name_offsets.push(shstrtab.len() as u32);
        cstr(&mut shstrtab, section.name);
    }
    name_offsets.push(shstrtab.len() as u32);
    cstr(&mut shstrtab, ".shstrtab");
    sections.push(Section::new(".shstrtab", 3, shstrtab));

    let mut body = Vec::new();
    let mut offsets = Vec::new();
    for section in &sections {
        while (52 + body.len()) % 4 != 0 {
            body.push(0);
        }
        offsets.push((52 + body.len()) as u32);
        body.extend_from_slice(&section.data);
    }
    while (52 + body.len()) % 4 != 0 {
        body.push(0);
    }
    let section_headers_offset = (52 + body.len()) as u32;
    let section_count = sections.len() as u16 + 1;

    let mut out = Vec::new();
    out.extend_from_slice(&[0x7F, b'E', b'L', b'F', 1, 1, 1, 0]);
    out.extend_from_slice(&[0; 8]);
    u16le(&mut out, 2); // ET_EXEC
    u16le(&mut out, 8); // EM_MIPS
    u32le(&mut out, 1);
    u32le(&mut out, FOO_START);
    u32le(&mut out, 0);
    u32le(&mut out, section_headers_offset);
    u32le(&mut out, 0);
    u16le(&mut out, 52);
    u16le(&mut out, 32);
    u16le(&mut out, 0);
    u16le(&mut out, 40);
    u16le(&mut out, section_count);
    u16le(&mut out, section_count - 1);
    out.extend_from_slice(&body);

    out.extend_from_slice(&[0; 40]);
    for (index, section) in sections.iter().enumerate() {
        u32le(&mut out, name_offsets[index + 1]);
        u32le(&mut out, section.kind);
        u32le(&mut out, section.flags);
        u32le(&mut out, section.address);
        u32le(&mut out, offsets[index]);
        u32le(&mut out, section.data.len() as u32);
        u32le(&mut out, section.link);
        u32le(&mut out, section.info);
        u32le(&mut out, 4);
        u32le(&mut out, section.entry_size);
    }
    out
}

/// ELF image with debug info for `foo` in test.c.
///
/// With `with_entry_symbol`, `debug_codecave_entry` is defined at
/// `HANDLER_ENTRY`.
pub fn build_test_elf(with_entry_symbol: bool) -> Vec<u8> {
    let mut text = Section::new(".text", 1, vec![0; (FOO_END - FOO_START) as usize]);
    text.flags = 0x6; // SHF_ALLOC | SHF_EXECINSTR
    text.address = FOO_START;

    let mut symbols = vec![("foo", FOO_START)];
    if with_entry_symbol {
        symbols.push(("debug_codecave_entry", HANDLER_ENTRY));
    }
    let (symtab_data, strtab_data) = symbol_tables(&symbols);

    // Section indices: 1 .text, 2-4 debug, 5 .symtab, 6 .strtab
    let mut symtab = Section::new(".symtab", 2, symtab_data);
    symtab.link = 6;
    symtab.info = 1;
    symtab.entry_size = 16;

    write_elf(vec![
        text,
        Section::new(".debug_abbrev", 1, debug_abbrev()),
        Section::new(".debug_info", 1, debug_info()),
        Section::new(".debug_line", 1, debug_line()),
        symtab,
        Section::new(".strtab", 3, strtab_data),
    ])
}

/// ELF image with no debug sections
pub fn build_stripped_elf() -> Vec<u8> {
    let mut text = Section::new(".text", 1, vec![0; 8]);
    text.flags = 0x6;
    text.address = FOO_START;
    write_elf(vec![text])
}

/// A PS1 project under `root` with one codecave and the fixture ELF at the
/// default build output path
pub fn write_project(root: &Path, elf: &[u8]) -> Project {
    let elf_path = root.join(ELF_RELATIVE_PATH);
    if let Some(parent) = elf_path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&elf_path, elf).unwrap();
    Project::new(
        root,
        Platform::Ps1,
        vec![Codecave::new("debug", CODECAVE_BASE, CODECAVE_SIZE)],
    )
}
