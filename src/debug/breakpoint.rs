//! Breakpoint model and registry.
//!
//! A breakpoint is a source location resolved to a MIPS address, plus the
//! bookkeeping needed to patch and un-patch two instructions in live memory.
//! Nothing in this module performs I/O; the engine owns memory access.

use std::fmt;

use crate::arch::mips::strip_kernel_segment;

/// Number of bytes overwritten at a breakpoint (two MIPS instructions)
pub const PATCH_SIZE: usize = 8;

/// Hard cap on simultaneous breakpoints (one id slot per breakpoint in the control block)
pub const MAX_BREAKPOINTS: usize = 20;

/// Where a breakpoint lives: source position and the address it resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointLocation {
    /// Absolute path of the C/C++ source file
    pub source_file: String,
    /// 1-based line number
    pub line_number: u32,
    /// Address of the first instruction generated for the line
    pub assembly_address: u32,
}

impl BreakpointLocation {
    pub fn new(source_file: impl Into<String>, line_number: u32, assembly_address: u32) -> Self {
        Self {
            source_file: source_file.into(),
            line_number,
            assembly_address,
        }
    }

    /// File offset of the patched instructions inside a section of the built binary.
    pub fn file_offset(&self, section_base_vma: u32, section_file_offset: u64) -> u64 {
        let address = strip_kernel_segment(self.assembly_address);
        let offset_in_section = address.wrapping_sub(section_base_vma) as u64;
        section_file_offset + offset_in_section
    }

    pub fn matches(&self, source_file: &str, line_number: u32) -> bool {
        self.source_file == source_file && self.line_number == line_number
    }
}

impl fmt::Display for BreakpointLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = std::path::Path::new(&self.source_file)
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| self.source_file.as_str().into());
        write!(f, "{}:{} @ 0x{:08X}", file, self.line_number, self.assembly_address)
    }
}

/// A single software breakpoint
#[derive(Debug, Clone)]
pub struct Breakpoint {
    id: u32,
    location: BreakpointLocation,
    enabled: bool,
    is_injected: bool,
    hit_count: u32,
    original_instructions: Option<[u8; PATCH_SIZE]>,
    injected_instructions: Option<[u8; PATCH_SIZE]>,
}

impl Breakpoint {
    fn new(id: u32, location: BreakpointLocation) -> Self {
        Self {
            id,
            location,
            enabled: false,
            is_injected: false,
            hit_count: 0,
            original_instructions: None,
            injected_instructions: None,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn location(&self) -> &BreakpointLocation {
        &self.location
    }

    pub fn address(&self) -> u32 {
        self.location.assembly_address
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_injected(&self) -> bool {
        self.is_injected
    }

    pub fn hit_count(&self) -> u32 {
        self.hit_count
    }

    /// The 8 bytes that were in memory before the jump was written
    pub fn original_instructions(&self) -> Option<&[u8; PATCH_SIZE]> {
        self.original_instructions.as_ref()
    }

    /// The 8 bytes of the jump sequence last written
    pub fn injected_instructions(&self) -> Option<&[u8; PATCH_SIZE]> {
        self.injected_instructions.as_ref()
    }

    pub(crate) fn enable(&mut self) {
        self.enabled = true;
    }

    pub(crate) fn disable(&mut self) {
        self.enabled = false;
    }

    pub(crate) fn record_hit(&mut self) {
        self.hit_count = self.hit_count.saturating_add(1);
    }

    /// Record a successful patch. Both byte sequences are stored together so
    /// an injected breakpoint always has its original instructions.
    pub(crate) fn mark_injected(&mut self, original: [u8; PATCH_SIZE], injected: [u8; PATCH_SIZE]) {
        self.original_instructions = Some(original);
        self.injected_instructions = Some(injected);
        self.is_injected = true;
    }

    pub(crate) fn mark_removed(&mut self) {
        self.is_injected = false;
    }
}

impl fmt::Display for Breakpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} [{}{}] hits={}",
            self.id,
            self.location,
            if self.enabled { "enabled" } else { "disabled" },
            if self.is_injected { ", injected" } else { "" },
            self.hit_count
        )
    }
}

/// Registry rejected a new breakpoint because all slots are taken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryFull;

/// Bounded, order-preserving collection of breakpoints
#[derive(Debug)]
pub struct BreakpointRegistry {
    breakpoints: Vec<Breakpoint>,
    next_id: u32,
    capacity: usize,
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        Self::with_capacity(MAX_BREAKPOINTS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            breakpoints: Vec::with_capacity(capacity),
            next_id: 1,
            capacity,
        }
    }

    /// Add a breakpoint, or return the existing one at the same file and line.
    pub fn add(&mut self, location: BreakpointLocation) -> Result<&mut Breakpoint, RegistryFull> {
        if let Some(index) = self
            .breakpoints
            .iter()
            .position(|bp| bp.location.matches(&location.source_file, location.line_number))
        {
            return Ok(&mut self.breakpoints[index]);
        }

        if self.breakpoints.len() >= self.capacity {
            return Err(RegistryFull);
        }

        let id = self.next_id;
        self.next_id += 1;
        log::debug!("Registered breakpoint #{} at {}", id, location);

        self.breakpoints.push(Breakpoint::new(id, location));
        let last = self.breakpoints.len() - 1;
        Ok(&mut self.breakpoints[last])
    }

    /// Drop a breakpoint from the model. Live memory is not touched.
    pub fn remove(&mut self, id: u32) -> bool {
        let before = self.breakpoints.len();
        self.breakpoints.retain(|bp| bp.id != id);
        self.breakpoints.len() != before
    }

    pub fn find_by_id(&self, id: u32) -> Option<&Breakpoint> {
        self.breakpoints.iter().find(|bp| bp.id == id)
    }

    pub fn find_by_id_mut(&mut self, id: u32) -> Option<&mut Breakpoint> {
        self.breakpoints.iter_mut().find(|bp| bp.id == id)
    }

    pub fn find_by_location(&self, source_file: &str, line_number: u32) -> Option<&Breakpoint> {
        self.breakpoints
            .iter()
            .find(|bp| bp.location.matches(source_file, line_number))
    }

    pub fn find_by_address(&self, address: u32) -> Option<&Breakpoint> {
        self.breakpoints
            .iter()
            .find(|bp| bp.location.assembly_address == address)
    }

    pub fn enabled(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.iter().filter(|bp| bp.enabled)
    }

    pub fn injected(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.iter().filter(|bp| bp.is_injected)
    }

    /// Ids of injected breakpoints, for callers that need to mutate while iterating
    pub fn injected_ids(&self) -> Vec<u32> {
        self.injected().map(|bp| bp.id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.iter()
    }

    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Forget every breakpoint and restart id allocation at 1
    pub fn clear(&mut self) {
        self.breakpoints.clear();
        self.next_id = 1;
    }
}

impl Default for BreakpointRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(line: u32) -> BreakpointLocation {
        BreakpointLocation::new("/proj/src/main.c", line, 0x8001_0000 + line * 4)
    }

    #[test]
    fn test_ids_are_sequential() {
        let mut registry = BreakpointRegistry::new();
        let a = registry.add(location(10)).unwrap().id();
        let b = registry.add(location(11)).unwrap().id();
        assert_eq!((a, b), (1, 2));

        assert!(registry.remove(a));
        let c = registry.add(location(12)).unwrap().id();
        assert_eq!(c, 3, "ids are never reused before clear()");
    }

    #[test]
    fn test_duplicate_location_returns_existing() {
        let mut registry = BreakpointRegistry::new();
        let first = registry.add(location(42)).unwrap().id();
        let second = registry.add(location(42)).unwrap().id();
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_capacity_is_enforced() {
        let mut registry = BreakpointRegistry::new();
        for line in 1..=MAX_BREAKPOINTS as u32 {
            registry.add(location(line)).unwrap();
        }
        assert_eq!(registry.add(location(100)).unwrap_err(), RegistryFull);
        assert_eq!(registry.len(), MAX_BREAKPOINTS);

        // An existing location is still returned when full
        assert!(registry.add(location(1)).is_ok());
        assert_eq!(registry.len(), MAX_BREAKPOINTS);
    }

    #[test]
    fn test_lookups() {
        let mut registry = BreakpointRegistry::new();
        registry.add(location(5)).unwrap();
        let id = registry.add(location(6)).unwrap().id();

        assert_eq!(registry.find_by_id(id).unwrap().location().line_number, 6);
        assert_eq!(registry.find_by_location("/proj/src/main.c", 5).unwrap().id(), 1);
        assert!(registry.find_by_location("/proj/src/other.c", 5).is_none());
        assert_eq!(registry.find_by_address(0x8001_0000 + 24).unwrap().id(), id);
        assert!(registry.find_by_id(99).is_none());
        assert!(!registry.remove(99));
    }

    #[test]
    fn test_filtered_views_and_clear() {
        let mut registry = BreakpointRegistry::new();
        registry.add(location(1)).unwrap().enable();
        let bp = registry.add(location(2)).unwrap();
        bp.enable();
        bp.mark_injected([0; PATCH_SIZE], [1; PATCH_SIZE]);
        registry.add(location(3)).unwrap();

        assert_eq!(registry.enabled().count(), 2);
        assert_eq!(registry.injected_ids(), vec![2]);

        registry.clear();
        assert!(registry.is_empty());
        assert_eq!(registry.add(location(9)).unwrap().id(), 1);
    }

    #[test]
    fn test_injection_keeps_original_bytes() {
        let mut registry = BreakpointRegistry::new();
        let bp = registry.add(location(7)).unwrap();
        bp.mark_injected([1, 2, 3, 4, 5, 6, 7, 8], [9; PATCH_SIZE]);
        bp.mark_removed();
        assert!(!bp.is_injected());
        assert_eq!(bp.original_instructions(), Some(&[1, 2, 3, 4, 5, 6, 7, 8]));
    }

    #[test]
    fn test_file_offset_strips_kernel_segment() {
        let loc = BreakpointLocation::new("a.c", 1, 0x8001_0040);
        assert_eq!(loc.file_offset(0x0001_0000, 0x1000), 0x1040);

        let loc = BreakpointLocation::new("a.c", 1, 0x0001_0040);
        assert_eq!(loc.file_offset(0x0001_0000, 0x800), 0x840);
    }
}
