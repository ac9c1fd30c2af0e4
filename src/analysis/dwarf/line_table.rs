//! Source line ↔ address mapping built from the DWARF line-number program.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// One row of a decoded line-number program (state machine output)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRow {
    pub file_path: String,
    /// 0 when the row has no source line
    pub line: u32,
    pub address: u32,
    pub column: u32,
    /// Marks the first address past a sequence; carries no source position
    pub end_sequence: bool,
}

/// A C source line and the half-open address interval generated for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub file_path: String,
    pub line_number: u32,
    pub asm_address_start: u32,
    /// Exclusive
    pub asm_address_end: u32,
    pub column: u32,
}

impl SourceLine {
    pub fn contains(&self, address: u32) -> bool {
        self.asm_address_start <= address && address < self.asm_address_end
    }
}

impl fmt::Display for SourceLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} @ 0x{:08X}-0x{:08X}",
            file_name(&self.file_path),
            self.line_number,
            self.asm_address_start,
            self.asm_address_end
        )
    }
}

/// Per-file ordered source lines
#[derive(Debug, Clone, Default)]
pub struct LineTable {
    files: BTreeMap<String, Vec<SourceLine>>,
}

impl LineTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from the rows of one or more complete sequences.
    pub fn from_rows<I: IntoIterator<Item = LineRow>>(rows: I) -> Self {
        let mut table = Self::new();
        table.add_rows(rows);
        table
    }

    /// Append the rows of one compilation unit's line program.
    ///
    /// Each row ends at the next row's address when both belong to the same
    /// file. Rows crossing into another file, and the last row before an
    /// end-of-sequence marker in another file, are not bridged.
    pub fn add_rows<I: IntoIterator<Item = LineRow>>(&mut self, rows: I) {
        let mut previous: Option<LineRow> = None;

        for row in rows {
            if let Some(prev) = previous.take() {
                let same_file = row.end_sequence || prev.file_path == row.file_path;
                if same_file && prev.line != 0 {
                    self.files
                        .entry(prev.file_path.clone())
                        .or_default()
                        .push(SourceLine {
                            file_path: prev.file_path,
                            line_number: prev.line,
                            asm_address_start: prev.address,
                            asm_address_end: row.address,
                            column: prev.column,
                        });
                }
            }

            if !row.end_sequence {
                previous = Some(row);
            }
        }
    }

    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn lines(&self, file_path: &str) -> Option<&[SourceLine]> {
        self.files.get(file_path).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[SourceLine])> {
        self.files.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Files matching `file`: exact (normalized) path first, basename as a fallback.
    fn matching_files<'a>(&'a self, file: &str) -> Vec<&'a [SourceLine]> {
        let wanted = normalize_path(file);
        let exact: Vec<_> = self
            .files
            .iter()
            .filter(|(path, _)| normalize_path(path) == wanted)
            .map(|(_, lines)| lines.as_slice())
            .collect();
        if !exact.is_empty() {
            return exact;
        }

        let wanted_name = file_name(file);
        self.files
            .iter()
            .filter(|(path, _)| file_name(path) == wanted_name)
            .map(|(_, lines)| lines.as_slice())
            .collect()
    }

    /// Every start address generated for `file:line`, in line-program order.
    ///
    /// Several addresses are common with inlining and unrolled loops.
    pub fn address_for_line(&self, file: &str, line: u32) -> Vec<u32> {
        let mut addresses = Vec::new();
        for lines in self.matching_files(file) {
            for source_line in lines.iter().filter(|l| l.line_number == line) {
                if !addresses.contains(&source_line.asm_address_start) {
                    addresses.push(source_line.asm_address_start);
                }
            }
        }
        addresses
    }

    /// Source lines whose interval contains `address`
    pub fn lines_for_address(&self, address: u32) -> Vec<&SourceLine> {
        self.files
            .values()
            .flat_map(|lines| lines.iter())
            .filter(|line| line.contains(address))
            .collect()
    }
}

/// Final path component, or the whole string when there is none
pub fn file_name(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
}

/// Lexically normalize a path: drop `.` components and fold `..`.
pub fn normalize_path(path: &str) -> String {
    let mut out = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out.to_string_lossy().into_owned()
}

/// Join a compilation directory and a file name the way the line program intends
pub fn join_path(directory: &str, name: &str) -> String {
    normalize_path(&Path::new(directory).join(name).to_string_lossy())
}
