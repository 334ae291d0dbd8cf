// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for code validation

use thiserror::Error;

use crate::opcode::OpCode;

/// Reasons a code section is rejected.
///
/// Offsets are byte offsets from the start of the section being validated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("code section {section} does not exist (container has {count} sections)")]
    UnknownSection { section: usize, count: usize },

    #[error("undefined instruction {opcode} at {offset:#x}")]
    UndefinedInstruction { offset: usize, opcode: OpCode },

    #[error("truncated immediate for {opcode} at {offset:#x}")]
    TruncatedImmediate { offset: usize, opcode: OpCode },

    #[error(
        "invalid jump destination at {offset:#x}: relative offset {relative} targets {target}"
    )]
    InvalidJumpDest {
        offset: usize,
        relative: i16,
        target: isize,
    },

    #[error("invalid number of branches in jump table at {offset:#x}: must not be 0")]
    InvalidBranchCount { offset: usize },

    #[error("invalid section argument {section} at {offset:#x} (container has {count} sections)")]
    InvalidSectionArgument {
        offset: usize,
        section: usize,
        count: usize,
    },

    #[error("call into non-returning section {section} at {offset:#x}")]
    InvalidCallArgument { offset: usize, section: usize },

    #[error("invalid data load argument {argument} at {offset:#x} (data is {data_len} bytes)")]
    InvalidDataloadNArgument {
        offset: usize,
        argument: usize,
        data_len: usize,
    },

    #[error(
        "create with truncated sub-container {container} at {offset:#x}: have {actual} data bytes, declared {declared}"
    )]
    EOFCreateWithTruncatedSection {
        offset: usize,
        container: usize,
        actual: usize,
        declared: usize,
    },

    /// `opcode` is `None` for an empty section.
    #[error("invalid code termination: last instruction at {offset:#x} is not terminal")]
    InvalidCodeTermination {
        offset: usize,
        opcode: Option<OpCode>,
    },

    #[error("conflicting stack height at {offset:#x}: have {have}, want {want}")]
    ConflictingStack {
        offset: usize,
        have: usize,
        want: usize,
    },

    #[error("stack underflow at {offset:#x}: height {height}, required {required}")]
    StackUnderflow {
        offset: usize,
        height: usize,
        required: usize,
    },

    #[error("stack overflow at {offset:#x}: height {height}, limit {limit}")]
    StackOverflow {
        offset: usize,
        height: usize,
        limit: usize,
    },

    #[error("invalid number of outputs at {offset:#x}: have {have}, want {want}")]
    InvalidOutputs {
        offset: usize,
        have: usize,
        want: usize,
    },

    #[error("invalid max stack height in section {section}: computed {computed}, declared {declared}")]
    InvalidMaxStackHeight {
        section: usize,
        computed: usize,
        declared: usize,
    },

    #[error("unreachable code: {0}")]
    UnreachableCode(Unreachable),
}

/// Cause of a [`ValidationError::UnreachableCode`] rejection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Unreachable {
    /// The stack analysis reached fewer instructions than the scan counted.
    #[error("only {reached} of {count} instructions are reachable")]
    Instructions { reached: usize, count: usize },

    /// `RETURNCONTRACT` or `EOFCREATE` names a sub-container that does not exist.
    #[error("sub-container {container} referenced at {offset:#x} does not exist (container has {count})")]
    SubContainer {
        offset: usize,
        container: usize,
        count: usize,
    },
}

/// Reasons a whole container is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContainerError {
    #[error("container has no code sections")]
    NoCodeSections,

    #[error("container has {types} type entries but {sections} code sections")]
    SectionCountMismatch { types: usize, sections: usize },

    #[error("invalid code section {section}: {source}")]
    Section {
        section: usize,
        #[source]
        source: ValidationError,
    },

    #[error("code section {section} is unreachable from section 0")]
    UnreachableSection { section: usize },
}
