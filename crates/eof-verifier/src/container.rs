// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Decoded container model
//!
//! A [`Container`] is produced by the container decoder and consumed
//! read-only by the verifier. Sizes and counts are whatever the decoder
//! found; nothing here is validated on construction.

/// Output marker for sections that never return to their caller.
pub const NON_RETURNING: u8 = 0x80;

/// Type metadata of one code section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionMetadata {
    /// Number of stack items the section consumes on entry.
    pub input: u8,
    /// Number of stack items left on return, or [`NON_RETURNING`].
    pub output: u8,
    /// Declared maximum stack height reached by the section.
    pub max_stack_height: u16,
}

impl FunctionMetadata {
    pub const fn new(input: u8, output: u8, max_stack_height: u16) -> Self {
        Self {
            input,
            output,
            max_stack_height,
        }
    }

    /// Metadata for a section that never returns.
    pub const fn non_returning(input: u8, max_stack_height: u16) -> Self {
        Self::new(input, NON_RETURNING, max_stack_height)
    }

    /// Returns true if the section returns to its caller.
    pub fn is_returning(&self) -> bool {
        self.output != NON_RETURNING
    }
}

/// An already-decoded bytecode container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Container {
    /// One entry per code section, in section order.
    pub types: Vec<FunctionMetadata>,
    /// Code of each section.
    pub code_sections: Vec<Vec<u8>>,
    /// Nested containers, addressed by 8-bit index.
    pub sub_containers: Vec<Container>,
    /// Data section bytes actually present.
    pub data: Vec<u8>,
    /// Data section size declared in the header.
    pub data_size: usize,
}

impl Container {
    /// Creates a container with a single code section and no data.
    pub fn with_code(metadata: FunctionMetadata, code: Vec<u8>) -> Self {
        Self {
            types: vec![metadata],
            code_sections: vec![code],
            ..Self::default()
        }
    }

    /// Appends a code section.
    pub fn push_section(&mut self, metadata: FunctionMetadata, code: Vec<u8>) -> &mut Self {
        self.types.push(metadata);
        self.code_sections.push(code);
        self
    }

    /// Sets the data section, declaring exactly its length.
    pub fn set_data(&mut self, data: Vec<u8>) -> &mut Self {
        self.data_size = data.len();
        self.data = data;
        self
    }

    /// Returns true if fewer (or more) data bytes are present than declared.
    pub fn is_data_truncated(&self) -> bool {
        self.data.len() != self.data_size
    }
}
