// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Static stack height verification
//!
//! Explores every control-flow path of a section from its entry and proves
//! that each instruction is reached with a single, statically known stack
//! height that stays within the bounds of the instruction. This lets the
//! executor skip stack checks at runtime.
//!
//! The analyzer assumes the section already passed the linear scan: opcodes
//! are defined, immediates are in bounds and jump destinations land on
//! instructions. It still fails with an error rather than panicking when
//! these assumptions are violated.

use tracing::trace;

use crate::{
    container::FunctionMetadata,
    decode::{read_i16, read_u16, relative_target},
    error::ValidationError,
    opcode::{OpCode, OpcodeTable},
};

/// A path still to be explored: start offset and stack height on entry.
#[derive(Debug, Clone, Copy)]
struct WorkItem {
    offset: usize,
    height: usize,
}

/// Analyzes stack heights for a single code section.
pub struct StackAnalyzer<'a> {
    code: &'a [u8],
    section: usize,
    types: &'a [FunctionMetadata],
    table: &'a OpcodeTable,
}

impl<'a> StackAnalyzer<'a> {
    pub fn new(
        code: &'a [u8],
        section: usize,
        types: &'a [FunctionMetadata],
        table: &'a OpcodeTable,
    ) -> Self {
        Self {
            code,
            section,
            types,
            table,
        }
    }

    /// Run stack height verification.
    ///
    /// On success, returns the number of distinct instruction offsets reached
    /// from the section entry.
    pub fn verify(&self) -> Result<usize, ValidationError> {
        let metadata = self.function(self.section, 0)?;
        let code = self.code;
        let limit = self.table.stack_limit();
        let input = usize::from(metadata.input);

        let mut heights: Vec<Option<usize>> = vec![None; code.len()];
        let mut reached = 0;
        let mut max_height = input;
        let mut worklist = vec![WorkItem {
            offset: 0,
            height: input,
        }];

        while let Some(WorkItem { mut offset, mut height }) = worklist.pop() {
            trace!(offset, height, "exploring path");

            while offset < code.len() {
                // A program point has exactly one height; a revisit ends the path.
                match heights[offset] {
                    Some(want) if want != height => {
                        return Err(ValidationError::ConflictingStack {
                            offset,
                            have: height,
                            want,
                        });
                    }
                    Some(_) => break,
                    None => {
                        heights[offset] = Some(height);
                        reached += 1;
                    }
                }

                let opcode = OpCode(code[offset]);
                let operation = self.table[opcode];
                if height < operation.min_stack {
                    return Err(ValidationError::StackUnderflow {
                        offset,
                        height,
                        required: operation.min_stack,
                    });
                }
                if height > operation.max_stack {
                    return Err(ValidationError::StackOverflow {
                        offset,
                        height,
                        limit: operation.max_stack,
                    });
                }
                // height <= max_stack was checked above
                height = limit
                    .checked_sub(operation.max_stack - height)
                    .ok_or_else(|| ValidationError::StackUnderflow {
                        offset,
                        height,
                        required: operation.max_stack.saturating_sub(limit),
                    })?;

                match opcode {
                    OpCode::CALLF => {
                        let section = self.immediate_u16(offset, opcode)?;
                        let callee = self.function(section, offset)?;
                        let (inputs, outputs) =
                            (usize::from(callee.input), usize::from(callee.output));
                        if height < inputs {
                            return Err(ValidationError::StackUnderflow {
                                offset,
                                height,
                                required: inputs,
                            });
                        }
                        let returned = (height - inputs).saturating_add(outputs);
                        if returned > limit {
                            return Err(ValidationError::StackOverflow {
                                offset,
                                height: returned,
                                limit,
                            });
                        }
                        height = returned;
                        offset += 3;
                    }
                    OpCode::RETF => {
                        // The raw output byte is compared, so a non-returning
                        // section holding exactly NON_RETURNING items may RETF.
                        let want = usize::from(metadata.output);
                        if height != want {
                            return Err(ValidationError::InvalidOutputs {
                                offset,
                                have: height,
                                want,
                            });
                        }
                        break;
                    }
                    OpCode::RJUMP => {
                        offset = self.destination(offset, opcode, offset + 1, offset + 3)?;
                    }
                    OpCode::RJUMPI => {
                        let target = self.destination(offset, opcode, offset + 1, offset + 3)?;
                        worklist.push(WorkItem {
                            offset: target,
                            height,
                        });
                        offset += 3;
                    }
                    OpCode::RJUMPV => {
                        let branches = usize::from(
                            *code
                                .get(offset + 1)
                                .ok_or(ValidationError::TruncatedImmediate { offset, opcode })?,
                        );
                        let table_end = offset + 2 + 2 * branches;
                        for branch in 0..branches {
                            let immediate = offset + 2 + 2 * branch;
                            let target = self.destination(offset, opcode, immediate, table_end)?;
                            worklist.push(WorkItem {
                                offset: target,
                                height,
                            });
                        }
                        offset = table_end;
                    }
                    _ => {
                        offset += 1 + usize::from(operation.immediate);
                        if operation.terminal {
                            break;
                        }
                    }
                }
                max_height = max_height.max(height);
            }
        }

        let declared = usize::from(metadata.max_stack_height);
        if max_height != declared {
            return Err(ValidationError::InvalidMaxStackHeight {
                section: self.section,
                computed: max_height,
                declared,
            });
        }

        trace!(reached, max_height, "stack analysis passed");
        Ok(reached)
    }

    fn function(
        &self,
        section: usize,
        offset: usize,
    ) -> Result<&'a FunctionMetadata, ValidationError> {
        self.types
            .get(section)
            .ok_or(ValidationError::InvalidSectionArgument {
                offset,
                section,
                count: self.types.len(),
            })
    }

    fn immediate_u16(&self, offset: usize, opcode: OpCode) -> Result<usize, ValidationError> {
        read_u16(self.code, offset + 1)
            .map(usize::from)
            .ok_or(ValidationError::TruncatedImmediate { offset, opcode })
    }

    /// Resolve the relative jump stored at `immediate`, measured from `from`.
    fn destination(
        &self,
        offset: usize,
        opcode: OpCode,
        immediate: usize,
        from: usize,
    ) -> Result<usize, ValidationError> {
        let relative = read_i16(self.code, immediate)
            .ok_or(ValidationError::TruncatedImmediate { offset, opcode })?;
        match relative_target(from, relative) {
            Some(target) if target < self.code.len() => Ok(target),
            _ => Err(ValidationError::InvalidJumpDest {
                offset,
                relative,
                target: from as isize + isize::from(relative),
            }),
        }
    }
}
