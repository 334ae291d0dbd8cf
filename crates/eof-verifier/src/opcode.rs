// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Opcode metadata
//!
//! Validation is driven by an [`OpcodeTable`]: one [`OperationMetadata`]
//! record per byte value describing the immediate width and the stack bounds
//! of that opcode under the active ruleset. The table is supplied by the
//! caller; this crate only names the opcodes whose immediates it interprets.

use std::{fmt, ops::Index};

/// Default ceiling on the number of stack items.
pub const STACK_LIMIT: usize = 1024;

/// A single opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpCode(pub u8);

impl OpCode {
    pub const STOP: OpCode = OpCode(0x00);
    pub const ADD: OpCode = OpCode(0x01);
    pub const POP: OpCode = OpCode(0x50);
    pub const PUSH0: OpCode = OpCode(0x5f);
    pub const PUSH1: OpCode = OpCode(0x60);
    pub const PUSH2: OpCode = OpCode(0x61);
    pub const PUSH32: OpCode = OpCode(0x7f);
    pub const DATALOADN: OpCode = OpCode(0xd1);
    /// Unconditional relative jump.
    pub const RJUMP: OpCode = OpCode(0xe0);
    /// Conditional relative jump.
    pub const RJUMPI: OpCode = OpCode(0xe1);
    /// Relative jump table.
    pub const RJUMPV: OpCode = OpCode(0xe2);
    /// Call into another code section.
    pub const CALLF: OpCode = OpCode(0xe3);
    /// Return from a code section.
    pub const RETF: OpCode = OpCode(0xe4);
    /// Tail call into another code section.
    pub const JUMPF: OpCode = OpCode(0xe5);
    /// Create from a sub-container.
    pub const EOFCREATE: OpCode = OpCode(0xec);
    /// Deploy a sub-container.
    pub const RETURNCONTRACT: OpCode = OpCode(0xee);
    pub const RETURN: OpCode = OpCode(0xf3);
    pub const REVERT: OpCode = OpCode(0xfd);
    pub const INVALID: OpCode = OpCode(0xfe);

    /// Returns the mnemonic of this opcode, if it has a fixed name.
    pub fn mnemonic(self) -> Option<&'static str> {
        let name = match self {
            Self::STOP => "STOP",
            Self::ADD => "ADD",
            Self::POP => "POP",
            Self::PUSH0 => "PUSH0",
            Self::DATALOADN => "DATALOADN",
            Self::RJUMP => "RJUMP",
            Self::RJUMPI => "RJUMPI",
            Self::RJUMPV => "RJUMPV",
            Self::CALLF => "CALLF",
            Self::RETF => "RETF",
            Self::JUMPF => "JUMPF",
            Self::EOFCREATE => "EOFCREATE",
            Self::RETURNCONTRACT => "RETURNCONTRACT",
            Self::RETURN => "RETURN",
            Self::REVERT => "REVERT",
            Self::INVALID => "INVALID",
            _ => return None,
        };
        Some(name)
    }
}

impl From<u8> for OpCode {
    fn from(byte: u8) -> Self {
        OpCode(byte)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mnemonic() {
            Some(name) => f.write_str(name),
            None if (Self::PUSH1.0..=Self::PUSH32.0).contains(&self.0) => {
                write!(f, "PUSH{}", self.0 - Self::PUSH0.0)
            }
            None => write!(f, "{:#04x}", self.0),
        }
    }
}

/// Static properties of one opcode under the active ruleset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationMetadata {
    /// The opcode is not part of the ruleset.
    pub undefined: bool,
    /// Width of the immediate following the opcode, in bytes.
    ///
    /// For [`OpCode::RJUMPV`] this is the width of the branch count only; the
    /// jump table that follows is accounted separately.
    pub immediate: u8,
    /// Minimum stack height required before execution.
    pub min_stack: usize,
    /// Maximum stack height tolerated before execution.
    ///
    /// Encodes the net stack effect: executing the opcode changes the height
    /// by `stack_limit - max_stack`.
    pub max_stack: usize,
    /// Control cannot continue to the next byte after this opcode.
    pub terminal: bool,
}

impl OperationMetadata {
    /// Metadata for an opcode outside the ruleset.
    pub const UNDEFINED: Self = Self {
        undefined: true,
        immediate: 0,
        min_stack: 0,
        max_stack: 0,
        terminal: false,
    };

    /// Metadata for an opcode popping `pops` and pushing `pushes` items,
    /// relative to the default [`STACK_LIMIT`].
    pub const fn new(pops: usize, pushes: usize) -> Self {
        Self::with_stack_limit(pops, pushes, STACK_LIMIT)
    }

    /// Metadata for an opcode popping `pops` and pushing `pushes` items,
    /// relative to a custom stack ceiling.
    ///
    /// `max_stack` saturates at `usize::MAX`.
    pub const fn with_stack_limit(pops: usize, pushes: usize, limit: usize) -> Self {
        Self {
            undefined: false,
            immediate: 0,
            min_stack: pops,
            max_stack: limit.saturating_add(pops).saturating_sub(pushes),
            terminal: false,
        }
    }

    /// Sets the immediate width.
    pub const fn with_immediate(mut self, width: u8) -> Self {
        self.immediate = width;
        self
    }

    /// Marks the opcode as terminal.
    pub const fn as_terminal(mut self) -> Self {
        self.terminal = true;
        self
    }
}

/// Opcode metadata for all 256 byte values.
///
/// Every entry starts out [`OperationMetadata::UNDEFINED`]; the ruleset
/// fills in the opcodes it supports with [`OpcodeTable::insert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpcodeTable {
    operations: [OperationMetadata; 256],
    stack_limit: usize,
}

impl OpcodeTable {
    /// Creates an empty table with the default [`STACK_LIMIT`].
    pub fn new() -> Self {
        Self::with_stack_limit(STACK_LIMIT)
    }

    /// Creates an empty table with a custom stack ceiling.
    ///
    /// Entries should then be built with
    /// [`OperationMetadata::with_stack_limit`] using the same ceiling.
    pub fn with_stack_limit(stack_limit: usize) -> Self {
        Self {
            operations: [OperationMetadata::UNDEFINED; 256],
            stack_limit,
        }
    }

    /// Defines (or redefines) an opcode.
    pub fn insert(&mut self, opcode: OpCode, metadata: OperationMetadata) -> &mut Self {
        self.operations[usize::from(opcode.0)] = metadata;
        self
    }

    /// Returns the metadata of an opcode.
    pub fn get(&self, opcode: OpCode) -> &OperationMetadata {
        &self.operations[usize::from(opcode.0)]
    }

    /// The global stack ceiling all `max_stack` values are relative to.
    pub fn stack_limit(&self) -> usize {
        self.stack_limit
    }
}

impl Default for OpcodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<OpCode> for OpcodeTable {
    type Output = OperationMetadata;

    fn index(&self, opcode: OpCode) -> &Self::Output {
        self.get(opcode)
    }
}

/// Table covering the opcodes exercised by the unit tests.
#[cfg(test)]
pub(crate) fn test_table() -> OpcodeTable {
    let mut table = OpcodeTable::new();
    table
        .insert(OpCode::STOP, OperationMetadata::new(0, 0).as_terminal())
        .insert(OpCode::ADD, OperationMetadata::new(2, 1))
        .insert(OpCode::POP, OperationMetadata::new(1, 0))
        .insert(OpCode::PUSH0, OperationMetadata::new(0, 1))
        .insert(OpCode::PUSH1, OperationMetadata::new(0, 1).with_immediate(1))
        .insert(OpCode::PUSH2, OperationMetadata::new(0, 1).with_immediate(2))
        .insert(OpCode::DATALOADN, OperationMetadata::new(0, 1).with_immediate(2))
        .insert(
            OpCode::RJUMP,
            OperationMetadata::new(0, 0).with_immediate(2).as_terminal(),
        )
        .insert(OpCode::RJUMPI, OperationMetadata::new(1, 0).with_immediate(2))
        .insert(OpCode::RJUMPV, OperationMetadata::new(1, 0).with_immediate(1))
        .insert(OpCode::CALLF, OperationMetadata::new(0, 0).with_immediate(2))
        .insert(OpCode::RETF, OperationMetadata::new(0, 0).as_terminal())
        .insert(
            OpCode::JUMPF,
            OperationMetadata::new(0, 0).with_immediate(2).as_terminal(),
        )
        .insert(OpCode::EOFCREATE, OperationMetadata::new(4, 1).with_immediate(1))
        .insert(
            OpCode::RETURNCONTRACT,
            OperationMetadata::new(2, 0).with_immediate(1).as_terminal(),
        )
        .insert(OpCode::RETURN, OperationMetadata::new(2, 0).as_terminal())
        .insert(OpCode::REVERT, OperationMetadata::new(2, 0).as_terminal())
        .insert(OpCode::INVALID, OperationMetadata::new(0, 0).as_terminal());
    table
}
