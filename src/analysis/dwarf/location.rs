//! Decoding of the DWARF location expressions GCC emits for MIPS variables.
//!
//! Only the leading operation is evaluated: a fixed address, a register
//! (`DW_OP_reg*`, `DW_OP_regx`), a register plus offset (`DW_OP_breg*`,
//! `DW_OP_bregx`) or a frame-base offset. Anything else
//! is reported as unknown with its leading opcode.

use std::fmt;

use gimli::{EndianSlice, LittleEndian, Operation};

use crate::arch::mips::register_name;

const OP_BREG0: u8 = gimli::constants::DW_OP_breg0.0;
const OP_BREG31: u8 = gimli::constants::DW_OP_breg31.0;
const OP_FBREG: u8 = gimli::constants::DW_OP_fbreg.0;

/// Where a variable lives at run time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Fixed target address
    Address(u32),
    /// Held in a register
    Register(u8),
    /// In memory at register + offset
    RegisterOffset { register: u8, offset: i64 },
    /// In memory at frame base + offset
    FrameOffset(i64),
    /// Expression led by an opcode this reader does not evaluate
    Unknown(u8),
    /// No location attribute, or an empty or truncated expression
    Unavailable,
}

impl Location {
    /// Fixed address, when the variable has one
    pub fn address(&self) -> Option<u32> {
        match self {
            Location::Address(address) => Some(*address),
            _ => None,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Address(address) => write!(f, "address:0x{:08X}", address),
            Location::Register(register) => write!(f, "register:{}", reg_name(*register)),
            Location::RegisterOffset { register, offset } => {
                write!(f, "register:{}{:+}", reg_name(*register), offset)
            }
            Location::FrameOffset(offset) => write!(f, "stack:{}", offset),
            Location::Unknown(opcode) => write!(f, "unknown:op=0x{:02X}", opcode),
            Location::Unavailable => f.write_str("unknown"),
        }
    }
}

fn reg_name(register: u8) -> String {
    register_name(register)
        .map(str::to_string)
        .unwrap_or_else(|| format!("$r{}", register))
}

/// Decode a location expression. `address_size` is the unit's address width in bytes.
pub fn decode_location(expression: &[u8], address_size: u8) -> Location {
    let Some(&opcode) = expression.first() else {
        return Location::Unavailable;
    };

    // Base-register opcodes with the offset operand missing
    if expression.len() == 1 {
        match opcode {
            OP_BREG0..=OP_BREG31 => return Location::Register(opcode - OP_BREG0),
            OP_FBREG => return Location::FrameOffset(0),
            _ => {}
        }
    }

    let encoding = gimli::Encoding {
        format: gimli::Format::Dwarf32,
        version: 2,
        address_size,
    };
    let mut reader = EndianSlice::new(expression, LittleEndian);

    match Operation::parse(&mut reader, encoding) {
        Ok(Operation::Address { address }) => Location::Address(address as u32),
        Ok(Operation::Register { register }) => match u8::try_from(register.0) {
            Ok(register) => Location::Register(register),
            Err(_) => Location::Unknown(opcode),
        },
        Ok(Operation::RegisterOffset { register, offset, .. }) => match u8::try_from(register.0) {
            Ok(register) => Location::RegisterOffset { register, offset },
            Err(_) => Location::Unknown(opcode),
        },
        Ok(Operation::FrameOffset { offset }) => Location::FrameOffset(offset),
        Ok(_) => Location::Unknown(opcode),
        Err(gimli::Error::UnexpectedEof(_)) | Err(gimli::Error::UnsupportedAddressSize(_)) => {
            Location::Unavailable
        }
        Err(_) => Location::Unknown(opcode),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address() {
        let location = decode_location(&[0x03, 0x00, 0x10, 0x01, 0x80], 4);
        assert_eq!(location, Location::Address(0x8001_1000));
        assert_eq!(location.address(), Some(0x8001_1000));
        assert_eq!(location.to_string(), "address:0x80011000");

        assert_eq!(decode_location(&[0x03, 0x00, 0x10], 4), Location::Unavailable);
    }

    #[test]
    fn test_registers() {
        assert_eq!(decode_location(&[0x54], 4).to_string(), "register:$a0");
        assert_eq!(decode_location(&[0x6F], 4).to_string(), "register:$ra");

        // DW_OP_breg29 8
        let location = decode_location(&[0x8D, 0x08], 4);
        assert_eq!(location, Location::RegisterOffset { register: 29, offset: 8 });
        assert_eq!(location.to_string(), "register:$sp+8");
        assert_eq!(decode_location(&[0x8D, 0x78], 4).to_string(), "register:$sp-8");
        assert_eq!(decode_location(&[0x8E], 4), Location::Register(30));
    }

    #[test]
    fn test_extended_registers() {
        // DW_OP_regx 29
        assert_eq!(decode_location(&[0x90, 0x1D], 4), Location::Register(29));
        assert_eq!(decode_location(&[0x90, 0x1D], 4).to_string(), "register:$sp");

        // DW_OP_bregx 29 -8
        let location = decode_location(&[0x92, 0x1D, 0x78], 4);
        assert_eq!(location, Location::RegisterOffset { register: 29, offset: -8 });
        assert_eq!(location.to_string(), "register:$sp-8");

        // DW_OP_bregx 30 128, two-byte offset
        assert_eq!(
            decode_location(&[0x92, 0x1E, 0x80, 0x01], 4),
            Location::RegisterOffset { register: 30, offset: 128 }
        );

        // Register numbers past the GPRs are not addressable here
        assert_eq!(decode_location(&[0x90, 0x80, 0x02], 4), Location::Unknown(0x90));
        assert_eq!(decode_location(&[0x92, 0x1D], 4), Location::Unavailable);
    }

    #[test]
    fn test_frame_base() {
        assert_eq!(decode_location(&[0x91, 0x78], 4), Location::FrameOffset(-8));
        assert_eq!(decode_location(&[0x91, 0x78], 4).to_string(), "stack:-8");
        assert_eq!(decode_location(&[0x91, 0x10], 4).to_string(), "stack:16");
        assert_eq!(decode_location(&[0x91], 4), Location::FrameOffset(0));
    }

    #[test]
    fn test_unknown_and_empty() {
        // DW_OP_lit0
        assert_eq!(decode_location(&[0x30], 4).to_string(), "unknown:op=0x30");
        assert_eq!(decode_location(&[], 4).to_string(), "unknown");
        assert_eq!(Location::Unavailable.address(), None);
    }
}
