// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Instruction decoding
//!
//! Splits a code section into instructions using the immediate widths from
//! the [`OpcodeTable`]. Decoding never fails: an immediate running past the
//! end of the section is clipped, and it is up to the scanner to reject it.

use crate::opcode::{OpCode, OpcodeTable};

/// A decoded instruction with its location information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedInstruction<'a> {
    /// Offset from start of code section (in bytes)
    pub offset: usize,
    pub opcode: OpCode,
    /// Immediate bytes, clipped to the end of the section.
    ///
    /// For [`OpCode::RJUMPV`] this covers the branch count and the jump table.
    pub immediate: &'a [u8],
}

impl DecodedInstruction<'_> {
    /// Offset of the byte following this instruction.
    pub fn end(&self) -> usize {
        self.offset + 1 + self.immediate.len()
    }
}

/// Iterator over the instructions of a code section.
#[derive(Debug, Clone)]
pub struct Instructions<'a> {
    code: &'a [u8],
    table: &'a OpcodeTable,
    offset: usize,
}

impl<'a> Iterator for Instructions<'a> {
    type Item = DecodedInstruction<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.offset;
        let opcode = OpCode(*self.code.get(offset)?);
        let width = immediate_width(self.code, offset, self.table);
        let start = (offset + 1).min(self.code.len());
        let end = (offset + 1 + width).min(self.code.len());
        self.offset = offset + 1 + width;

        Some(DecodedInstruction {
            offset,
            opcode,
            immediate: &self.code[start..end],
        })
    }
}

/// Decode all instructions from a code section.
pub fn decode_instructions<'a>(code: &'a [u8], table: &'a OpcodeTable) -> Instructions<'a> {
    Instructions {
        code,
        table,
        offset: 0,
    }
}

/// Full immediate width of the instruction at `offset`, including the jump
/// table of [`OpCode::RJUMPV`] when its branch count is present.
pub(crate) fn immediate_width(code: &[u8], offset: usize, table: &OpcodeTable) -> usize {
    let opcode = OpCode(code[offset]);
    let width = usize::from(table[opcode].immediate);
    if opcode == OpCode::RJUMPV && width > 0 {
        if let Some(&branches) = code.get(offset + 1) {
            return width + 2 * usize::from(branches);
        }
    }
    width
}

/// Reads a big-endian `u16` at `offset`.
pub(crate) fn read_u16(code: &[u8], offset: usize) -> Option<u16> {
    let bytes = code.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Reads a big-endian `i16` at `offset`.
pub(crate) fn read_i16(code: &[u8], offset: usize) -> Option<i16> {
    read_u16(code, offset).map(|value| value as i16)
}

/// Resolves a relative jump measured from `from`.
///
/// Returns `None` if the destination would be negative.
pub(crate) fn relative_target(from: usize, relative: i16) -> Option<usize> {
    from.checked_add_signed(isize::from(relative))
}

#[cfg(test)]
mod tests {
    use super::{decode_instructions, read_i16, read_u16, relative_target};
    use crate::opcode::{OpCode, test_table};

    #[test]
    fn test_decode_simple_sequence() {
        let table = test_table();
        // PUSH1 0x2a; PUSH0; ADD; STOP
        let code = [0x60, 0x2a, 0x5f, 0x01, 0x00];
        let instructions: Vec<_> = decode_instructions(&code, &table).collect();

        assert_eq!(instructions.len(), 4);
        assert_eq!(instructions[0].opcode, OpCode::PUSH1);
        assert_eq!(instructions[0].immediate, &[0x2a]);
        assert_eq!(instructions[1].offset, 2);
        assert_eq!(instructions[3].offset, 4);
        assert_eq!(instructions[3].end(), 5);
    }

    #[test]
    fn test_decode_jump_table() {
        let table = test_table();
        // PUSH0; RJUMPV [0, 1]; STOP; STOP
        let code = [0x5f, 0xe2, 0x02, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00];
        let instructions: Vec<_> = decode_instructions(&code, &table).collect();

        assert_eq!(instructions.len(), 4);
        assert_eq!(instructions[1].opcode, OpCode::RJUMPV);
        assert_eq!(instructions[1].immediate.len(), 5);
        assert_eq!(instructions[2].offset, 7);
    }

    #[test]
    fn test_decode_clips_truncated_immediate() {
        let table = test_table();
        // PUSH2 with only one immediate byte
        let code = [0x61, 0xff];
        let instructions: Vec<_> = decode_instructions(&code, &table).collect();

        assert_eq!(instructions.len(), 1);
        assert_eq!(instructions[0].immediate, &[0xff]);
    }

    #[test]
    fn test_decode_undefined_opcode_has_no_immediate() {
        let table = test_table();
        let code = [0x0c, 0x0c];
        assert_eq!(decode_instructions(&code, &table).count(), 2);
    }

    #[test]
    fn test_read_immediates() {
        let code = [0xff, 0xfd, 0x01];
        assert_eq!(read_u16(&code, 0), Some(0xfffd));
        assert_eq!(read_i16(&code, 0), Some(-3));
        assert_eq!(read_i16(&code, 1), Some(0xfd01_u16 as i16));
        assert_eq!(read_u16(&code, 2), None);
        assert_eq!(read_u16(&code, usize::MAX), None);
    }

    #[test]
    fn test_relative_target() {
        assert_eq!(relative_target(3, -3), Some(0));
        assert_eq!(relative_target(3, 4), Some(7));
        assert_eq!(relative_target(3, -4), None, "negative target should return None");
    }
}
