// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Segment map: opcode bytes vs immediate bytes
//!
//! Jump destinations must land on an opcode, never inside an immediate. The
//! map records one bit per byte offset, set for immediate bytes.

use crate::{decode::decode_instructions, opcode::OpcodeTable};

/// Classification of every byte offset of a code section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentMap {
    immediates: Vec<u64>,
    len: usize,
}

impl SegmentMap {
    /// Walks `code` and marks the immediate bytes of every instruction.
    pub fn new(code: &[u8], table: &OpcodeTable) -> Self {
        let mut map = Self {
            immediates: vec![0; code.len().div_ceil(64)],
            len: code.len(),
        };
        for instruction in decode_instructions(code, table) {
            for offset in instruction.offset + 1..instruction.end() {
                map.set(offset);
            }
        }
        map
    }

    /// Returns true if an instruction starts at `offset`.
    pub fn is_instruction_start(&self, offset: usize) -> bool {
        offset < self.len && !self.is_immediate(offset)
    }

    /// Returns true if `offset` lies inside an instruction's immediate.
    pub fn is_immediate(&self, offset: usize) -> bool {
        if offset >= self.len {
            return false;
        }
        (self.immediates[offset / 64] >> (offset % 64)) & 1 == 1
    }

    fn set(&mut self, offset: usize) {
        self.immediates[offset / 64] |= 1_u64 << (offset % 64);
    }
}

/// A [`SegmentMap`] built on first use and dropped with the validation call.
pub(crate) struct LazySegmentMap<'a> {
    code: &'a [u8],
    table: &'a OpcodeTable,
    map: Option<SegmentMap>,
}

impl<'a> LazySegmentMap<'a> {
    pub(crate) fn new(code: &'a [u8], table: &'a OpcodeTable) -> Self {
        Self {
            code,
            table,
            map: None,
        }
    }

    pub(crate) fn get(&mut self) -> &SegmentMap {
        let (code, table) = (self.code, self.table);
        self.map.get_or_insert_with(|| SegmentMap::new(code, table))
    }

    pub(crate) fn is_built(&self) -> bool {
        self.map.is_some()
    }
}
