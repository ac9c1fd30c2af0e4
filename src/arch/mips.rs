//! MIPS R3000/R5900 helpers shared by the codecave generator and the DWARF reader.
//!
//! Provides:
//! - The fixed 32-entry ABI register table (DWARF register numbers map 1:1)
//! - Instruction-word encoders for the injected breakpoint jump
//! - Kernel-segment address stripping used for every emulator RAM access

/// Number of general purpose registers
pub const REGISTER_COUNT: usize = 32;

/// ABI names, indexed by hardware (and DWARF) register number
pub const REGISTER_NAMES: [&str; REGISTER_COUNT] = [
    "$zero", "$at", "$v0", "$v1", "$a0", "$a1", "$a2", "$a3",
    "$t0", "$t1", "$t2", "$t3", "$t4", "$t5", "$t6", "$t7",
    "$s0", "$s1", "$s2", "$s3", "$s4", "$s5", "$s6", "$s7",
    "$t8", "$t9", "$k0", "$k1", "$gp", "$sp", "$fp", "$ra",
];

pub const ZERO: u8 = 0;
/// Kernel scratch register; carries the breakpoint id into the handler
pub const K0: u8 = 26;
/// Kernel scratch register; used for addressing inside the handler
pub const K1: u8 = 27;
pub const SP: u8 = 29;
pub const FP: u8 = 30;

/// Start of the kernel-mapped RAM window (KSEG0)
pub const KSEG0_BASE: u32 = 0x8000_0000;

/// Strip the top byte of a KSEG0 address, giving the offset into emulator RAM.
///
/// Addresses below `0x80000000` are returned unchanged.
pub fn strip_kernel_segment(address: u32) -> u32 {
    if address >= KSEG0_BASE {
        address & 0x00FF_FFFF
    } else {
        address
    }
}

/// ABI name for a register number, or `None` when out of range
pub fn register_name(index: u8) -> Option<&'static str> {
    REGISTER_NAMES.get(index as usize).copied()
}

/// Register number for an ABI name (accepts `$s8` as an alias of `$fp`)
pub fn register_index(name: &str) -> Option<u8> {
    if name == "$s8" {
        return Some(FP);
    }
    REGISTER_NAMES
        .iter()
        .position(|n| *n == name)
        .map(|i| i as u8)
}

/// Split a 32-bit value into the (upper, lower) halves for a `lui`/`ori` pair
pub fn split_immediate(value: u32) -> (u16, u16) {
    ((value >> 16) as u16, (value & 0xFFFF) as u16)
}

fn reg(index: u8) -> u32 {
    debug_assert!((index as usize) < REGISTER_COUNT, "invalid MIPS register {index}");
    index as u32 & 0x1F
}

/// `ori rt, rs, imm`
pub fn encode_ori(rt: u8, rs: u8, imm: u16) -> u32 {
    0x3400_0000 | (reg(rs) << 21) | (reg(rt) << 16) | imm as u32
}

/// `j target`; the target must lie in the same 256MB segment as the jump
pub fn encode_j(target: u32) -> u32 {
    0x0800_0000 | ((target & 0x0FFF_FFFF) >> 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_kernel_segment() {
        assert_eq!(strip_kernel_segment(0x8010_0000), 0x0010_0000);
        assert_eq!(strip_kernel_segment(0x80FF_FFFF), 0x00FF_FFFF);
        assert_eq!(strip_kernel_segment(0x0001_2345), 0x0001_2345);
        assert_eq!(strip_kernel_segment(0x7FFF_FFFF), 0x7FFF_FFFF);

        for address in (0x8000_0000u32..=0x80FF_FFFF).step_by(0x1_2345) {
            assert_eq!(strip_kernel_segment(address), address & 0x00FF_FFFF);
        }
    }

    #[test]
    fn test_register_table() {
        assert_eq!(register_name(K0), Some("$k0"));
        assert_eq!(register_name(FP), Some("$fp"));
        assert_eq!(register_name(32), None);
        assert_eq!(register_index("$ra"), Some(31));
        assert_eq!(register_index("$s8"), Some(FP));
        assert_eq!(register_index("$bogus"), None);
    }

    #[test]
    fn test_known_encodings() {
        // ori $k1, $k1, 0x00FC
        assert_eq!(encode_ori(K1, K1, 0x00FC), 0x377B_00FC);
        // ori $k0, $zero, 5
        assert_eq!(encode_ori(K0, ZERO, 5), 0x341A_0005);
        // j 0x80100000
        assert_eq!(encode_j(0x8010_0000), 0x0804_0000);
        // j 0x00100000 (already stripped)
        assert_eq!(encode_j(0x0010_0000), 0x0804_0000);
    }
}
