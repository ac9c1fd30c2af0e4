//! Debug codecave generator.
//!
//! The debug codecave is the trap handler every breakpoint jumps into. It is
//! compiled into the mod like any other codecave source, saves the CPU state
//! into a control block at the end of the codecave, raises a flag and spins
//! until the debugger clears it.
//!
//! Control block (last 256 bytes of the codecave):
//!
//! | field                 | offset | size |
//! |-----------------------|--------|------|
//! | saved_registers[32]   | 0      | 128  |
//! | breakpoint_hit_flag   | 128    | 4    |
//! | resume_address        | 132    | 4    |
//! | step_mode_flag        | 136    | 4    |
//! | current_breakpoint_id | 140    | 4    |

use std::fmt::Write;

use crate::arch::mips::{
    self, encode_j, encode_ori, split_immediate, strip_kernel_segment, K0, K1, REGISTER_COUNT,
    REGISTER_NAMES,
};
use crate::debug::breakpoint::PATCH_SIZE;
use crate::project::Platform;

/// Size of the control block reserved at the end of the codecave
pub const CONTROL_BLOCK_SIZE: u32 = 256;
/// Bytes used by the saved general purpose registers
pub const SAVED_REGISTERS_SIZE: u32 = (REGISTER_COUNT * 4) as u32;

pub const HIT_FLAG_OFFSET: u32 = 128;
pub const RESUME_ADDRESS_OFFSET: u32 = 132;
pub const STEP_MODE_OFFSET: u32 = 136;
pub const BREAKPOINT_ID_OFFSET: u32 = 140;

/// Label of the handler entry point in the generated assembly
pub const ENTRY_SYMBOL: &str = "debug_codecave_entry";

/// Absolute addresses of every control block field for one codecave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecaveLayout {
    pub base_address: u32,
    pub total_size: u32,
    pub saved_registers: u32,
    pub breakpoint_hit_flag: u32,
    pub resume_address: u32,
    pub step_mode_flag: u32,
    pub current_breakpoint_id: u32,
}

impl CodecaveLayout {
    /// Reserve the last 256 bytes of `[base, base + size)` as the control block.
    ///
    /// Returns `None` when the codecave is too small to hold it.
    pub fn compute(base_address: u32, total_size: u32) -> Option<Self> {
        if total_size < CONTROL_BLOCK_SIZE {
            return None;
        }
        // The whole region must fit in the 32-bit address space
        base_address.checked_add(total_size - 1)?;
        let start = base_address + (total_size - CONTROL_BLOCK_SIZE);

        Some(Self {
            base_address,
            total_size,
            saved_registers: start,
            breakpoint_hit_flag: start + HIT_FLAG_OFFSET,
            resume_address: start + RESUME_ADDRESS_OFFSET,
            step_mode_flag: start + STEP_MODE_OFFSET,
            current_breakpoint_id: start + BREAKPOINT_ID_OFFSET,
        })
    }

    pub fn control_block_start(&self) -> u32 {
        self.saved_registers
    }

    /// Address where register `index` is saved, `None` for an invalid register
    pub fn register_address(&self, index: u8) -> Option<u32> {
        ((index as usize) < REGISTER_COUNT).then(|| self.saved_registers + index as u32 * 4)
    }

    /// Named fields, in control block order
    pub fn entries(&self) -> [(&'static str, u32); 6] {
        [
            ("codecave_base", self.base_address),
            ("saved_registers", self.saved_registers),
            ("breakpoint_hit_flag", self.breakpoint_hit_flag),
            ("resume_address", self.resume_address),
            ("step_mode_flag", self.step_mode_flag),
            ("current_breakpoint_id", self.current_breakpoint_id),
        ]
    }
}

/// The two instruction words written over a breakpoint address:
/// `ori $k0, $zero, id` followed by `j entry`.
pub fn generate_injected_jump(codecave_entry_address: u32, breakpoint_id: u32) -> [u8; PATCH_SIZE] {
    let load_id = encode_ori(K0, mips::ZERO, (breakpoint_id & 0xFFFF) as u16);
    let jump = encode_j(codecave_entry_address);

    let mut bytes = [0u8; PATCH_SIZE];
    bytes[..4].copy_from_slice(&load_id.to_le_bytes());
    bytes[4..].copy_from_slice(&jump.to_le_bytes());
    bytes
}

/// Registers the handler must not save or restore: they hold the breakpoint id
/// and the control block address while the others are being saved.
fn is_handler_scratch(index: usize) -> bool {
    index == K0 as usize || index == K1 as usize
}

/// Emit `lui`/`ori` loading a (kernel-stripped) address into `reg`
fn load_address(out: &mut String, reg: &str, address: u32) {
    let (hi, lo) = split_immediate(strip_kernel_segment(address));
    let _ = writeln!(out, "    lui {reg}, 0x{hi:04X}");
    let _ = writeln!(out, "    ori {reg}, {reg}, 0x{lo:04X}");
}

/// Generate the MIPS trap handler for `platform` placed in `layout`.
pub fn generate_handler_source(platform: Platform, layout: &CodecaveLayout) -> String {
    let k0 = REGISTER_NAMES[K0 as usize];
    let k1 = REGISTER_NAMES[K1 as usize];
    let mut asm = String::with_capacity(8 * 1024);

    let _ = writeln!(asm, "# Debug codecave for {}", platform);
    let _ = writeln!(asm, "# Generated by cavedbg - software breakpoint trap handler");
    let _ = writeln!(asm, "# Codecave base: 0x{:08X}, size: 0x{:X}", layout.base_address, layout.total_size);
    let _ = writeln!(asm, "# Control block: 0x{:08X}", layout.control_block_start());
    asm.push_str("# Regenerated on every injection; edits will be lost.\n\n");

    asm.push_str(".text\n.set noreorder\n.set noat\n\n");
    let _ = writeln!(asm, ".global {ENTRY_SYMBOL}");
    asm.push_str(".global debug_resume\n.global debug_step_resume\n\n");

    // Entry: $k0 holds the breakpoint id loaded by the injected jump
    let _ = writeln!(asm, "{ENTRY_SYMBOL}:");
    asm.push_str("    # $k0 = breakpoint id, store it before $k0 is reused\n");
    load_address(&mut asm, k1, layout.current_breakpoint_id);
    let _ = writeln!(asm, "    sw {k0}, 0({k1})");
    asm.push('\n');

    asm.push_str("    # Save registers; slot n lives at saved_registers + 4*n\n");
    load_address(&mut asm, k0, layout.saved_registers);
    for (index, name) in REGISTER_NAMES.iter().enumerate() {
        if is_handler_scratch(index) {
            continue;
        }
        let _ = writeln!(asm, "    sw {name}, {}({k0})", index * 4);
    }
    asm.push('\n');

    asm.push_str("    # Raise the hit flag\n");
    load_address(&mut asm, k1, layout.breakpoint_hit_flag);
    let _ = writeln!(asm, "    ori {k0}, $zero, 1");
    let _ = writeln!(asm, "    sw {k0}, 0({k1})");
    asm.push('\n');

    // Busy-wait until the debugger clears the flag
    asm.push_str("debug_loop:\n");
    asm.push_str("    nop\n    nop\n    nop\n    nop\n");
    load_address(&mut asm, k1, layout.breakpoint_hit_flag);
    let _ = writeln!(asm, "    lw {k0}, 0({k1})");
    asm.push_str("    nop\n");
    let _ = writeln!(asm, "    bnez {k0}, debug_loop");
    asm.push_str("    nop\n\n");

    asm.push_str("    # Flag cleared: check for step mode\n");
    load_address(&mut asm, k1, layout.step_mode_flag);
    let _ = writeln!(asm, "    lw {k0}, 0({k1})");
    asm.push_str("    nop\n");
    let _ = writeln!(asm, "    bnez {k0}, debug_step_resume");
    asm.push_str("    nop\n");
    asm.push_str("    j debug_resume\n    nop\n\n");

    asm.push_str("debug_resume:\n");
    load_address(&mut asm, k0, layout.saved_registers);
    for (index, name) in REGISTER_NAMES.iter().enumerate().rev() {
        // $zero is hardwired
        if index == 0 || is_handler_scratch(index) {
            continue;
        }
        let _ = writeln!(asm, "    lw {name}, {}({k0})", index * 4);
    }
    asm.push_str("    # Addressing registers last\n");
    load_address(&mut asm, k1, layout.resume_address);
    let _ = writeln!(asm, "    lw {k1}, 0({k1})");
    asm.push_str("    nop\n");
    let _ = writeln!(asm, "    jr {k1}");
    asm.push_str("    nop\n\n");

    asm.push_str("debug_step_resume:\n");
    asm.push_str("    # TODO: single-step support; for now clear step mode and resume normally\n");
    load_address(&mut asm, k1, layout.step_mode_flag);
    let _ = writeln!(asm, "    sw $zero, 0({k1})");
    asm.push_str("    j debug_resume\n    nop\n\n");

    let _ = writeln!(asm, "# Control block, expected at 0x{:08X}", layout.control_block_start());
    asm.push_str(".data\n.align 4\n\n");
    let _ = writeln!(asm, "saved_registers:\n    .space {SAVED_REGISTERS_SIZE}\n");
    asm.push_str("breakpoint_hit_flag:\n    .word 0\n\n");
    asm.push_str("resume_address:\n    .word 0\n\n");
    asm.push_str("step_mode_flag:\n    .word 0\n\n");
    asm.push_str("current_breakpoint_id:\n    .word 0\n");

    asm
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_offsets() {
        for (base, size) in [
            (0x8010_0000u32, 0x1_0000u32),
            (0x8000_A000, 0x1234),
            (0x0009_0000, 0x301),
            (0x8003_0000, 0x100),
        ] {
            let layout = CodecaveLayout::compute(base, size).unwrap();
            let start = base + size - 256;
            assert_eq!(layout.saved_registers, start);
            assert_eq!(layout.breakpoint_hit_flag, start + 128);
            assert_eq!(layout.resume_address, start + 132);
            assert_eq!(layout.step_mode_flag, start + 136);
            assert_eq!(layout.current_breakpoint_id, start + 140);
        }
    }

    #[test]
    fn test_layout_rejects_small_codecave() {
        assert!(CodecaveLayout::compute(0x8010_0000, 0xFF).is_none());
        assert!(CodecaveLayout::compute(0xFFFF_FF00, 0x200).is_none());
    }

    #[test]
    fn test_register_address() {
        let layout = CodecaveLayout::compute(0x8010_0000, 0x1000).unwrap();
        assert_eq!(layout.register_address(0), Some(0x8010_0F00));
        assert_eq!(layout.register_address(30), Some(0x8010_0F00 + 120));
        assert_eq!(layout.register_address(32), None);
    }

    #[test]
    fn test_injected_jump_encoding() {
        let bytes = generate_injected_jump(0x8010_0000, 5);
        let word1 = u32::from_le_bytes(bytes[..4].try_into().unwrap());
        let word2 = u32::from_le_bytes(bytes[4..].try_into().unwrap());

        // ori $k0, $zero, 5
        assert_eq!(word1 >> 26, 0x0D);
        assert_eq!((word1 >> 21) & 0x1F, 0);
        assert_eq!((word1 >> 16) & 0x1F, K0 as u32);
        assert_eq!(word1 & 0xFFFF, 5);

        // j 0x00100000
        assert_eq!(word2 >> 26, 0x02);
        assert_eq!((word2 & 0x03FF_FFFF) << 2, 0x0010_0000);

        assert_eq!(bytes, [0x05, 0x00, 0x1A, 0x34, 0x00, 0x00, 0x04, 0x08]);
    }

    #[test]
    fn test_injected_jump_truncates_id() {
        let bytes = generate_injected_jump(0x8010_0000, 0x1_0003);
        assert_eq!(&bytes[..2], &[0x03, 0x00]);
    }

    #[test]
    fn test_handler_source_shape() {
        let layout = CodecaveLayout::compute(0x8010_0000, 0x1_0000).unwrap();
        let asm = generate_handler_source(Platform::Ps1, &layout);

        assert!(asm.starts_with("# Debug codecave for PS1"));
        for label in ["debug_codecave_entry:", "debug_resume:", "debug_step_resume:", "debug_loop:"] {
            assert!(asm.contains(label), "missing {label}");
        }

        // Control block at 0x8010FF00, stripped to 0x0010FF00
        assert!(asm.contains("lui $k0, 0x0010\n    ori $k0, $k0, 0xFF00"));
        // Hit flag at +128
        assert!(asm.contains("ori $k1, $k1, 0xFF80"));
        // Breakpoint id at +140
        assert!(asm.contains("ori $k1, $k1, 0xFF8C"));

        assert!(asm.contains("sw $fp, 120($k0)"));
        assert!(asm.contains("lw $ra, 124($k0)"));
        assert!(!asm.contains("sw $k1, 108($k0)"));
        assert!(!asm.contains("lw $zero"));
        assert!(asm.contains(".space 128"));
    }

    #[test]
    fn test_handler_is_deterministic() {
        let layout = CodecaveLayout::compute(0x8010_0000, 0x2000).unwrap();
        assert_eq!(
            generate_handler_source(Platform::Ps2, &layout),
            generate_handler_source(Platform::Ps2, &layout)
        );
    }
}
