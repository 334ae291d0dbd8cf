// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Linear scan of a code section
//!
//! A single left-to-right pass that checks every instruction in isolation:
//! definedness, immediate bounds, jump destinations and the section, data and
//! sub-container arguments. Control flow is left to the
//! [`StackAnalyzer`](crate::StackAnalyzer), which relies on the guarantees
//! established here.

use std::collections::BTreeSet;

use tracing::trace;

use crate::{
    container::Container,
    decode::{read_i16, read_u16, relative_target},
    error::{Unreachable, ValidationError},
    opcode::{OpCode, OpcodeTable},
    segment::LazySegmentMap,
};

/// Number of bytes loaded by [`OpCode::DATALOADN`].
const DATALOADN_WIDTH: usize = 32;

/// Result of a successful linear scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Number of instructions (opcode-starting offsets) in the section.
    pub instruction_count: usize,
    /// Sections referenced by `CALLF` or `JUMPF`.
    pub visited_sections: BTreeSet<usize>,
}

/// Scans one code section of `container`.
///
/// This is the linear pass only. Stack heights and reachability are not
/// checked here; a passing scan is not a valid section until
/// [`Verifier::validate_code`](crate::Verifier::validate_code) has also run
/// the [`StackAnalyzer`](crate::StackAnalyzer) over it.
pub fn scan_code(
    code: &[u8],
    container: &Container,
    table: &OpcodeTable,
) -> Result<ScanSummary, ValidationError> {
    LinearScanner::new(code, container, table).scan()
}

/// Performs the linear checks on a single code section.
pub struct LinearScanner<'a> {
    code: &'a [u8],
    container: &'a Container,
    table: &'a OpcodeTable,
    segments: LazySegmentMap<'a>,
}

impl<'a> LinearScanner<'a> {
    pub fn new(code: &'a [u8], container: &'a Container, table: &'a OpcodeTable) -> Self {
        Self {
            code,
            container,
            table,
            segments: LazySegmentMap::new(code, table),
        }
    }

    /// Run the scan, consuming the scanner and its segment map.
    pub fn scan(mut self) -> Result<ScanSummary, ValidationError> {
        let code = self.code;
        let mut summary = ScanSummary::default();
        let mut last = None;
        let mut offset = 0;

        while offset < code.len() {
            summary.instruction_count += 1;
            let opcode = OpCode(code[offset]);
            let metadata = self.table[opcode];
            last = Some((offset, opcode));

            if metadata.undefined {
                return Err(ValidationError::UndefinedInstruction { offset, opcode });
            }

            let width = usize::from(metadata.immediate);
            if width != 0 {
                if code.len() <= offset + width {
                    return Err(ValidationError::TruncatedImmediate { offset, opcode });
                }
                offset += self.check_immediate(offset, opcode, &mut summary)?;
                offset += width;
            }
            offset += 1;
        }

        // Code may not fall off the end of the section.
        match last {
            Some((_, opcode)) if self.table[opcode].terminal => {}
            Some((offset, opcode)) => {
                return Err(ValidationError::InvalidCodeTermination {
                    offset,
                    opcode: Some(opcode),
                });
            }
            None => {
                return Err(ValidationError::InvalidCodeTermination {
                    offset: 0,
                    opcode: None,
                });
            }
        }

        trace!(
            instructions = summary.instruction_count,
            segment_map = self.segments.is_built(),
            "linear scan passed"
        );
        Ok(summary)
    }

    /// Validate the immediate of the instruction at `offset`.
    ///
    /// Returns the number of bytes the instruction occupies beyond its
    /// table-declared immediate (the jump table of `RJUMPV`).
    fn check_immediate(
        &mut self,
        offset: usize,
        opcode: OpCode,
        summary: &mut ScanSummary,
    ) -> Result<usize, ValidationError> {
        let code = self.code;
        let truncated = ValidationError::TruncatedImmediate { offset, opcode };

        match opcode {
            OpCode::RJUMP | OpCode::RJUMPI => {
                self.check_destination(offset, opcode, offset + 1, offset + 3)?;
            }
            OpCode::RJUMPV => {
                let branches = usize::from(*code.get(offset + 1).ok_or(truncated.clone())?);
                if branches == 0 {
                    return Err(ValidationError::InvalidBranchCount { offset });
                }
                let table_end = offset + 2 + 2 * branches;
                if code.len() < table_end {
                    return Err(truncated);
                }
                for branch in 0..branches {
                    self.check_destination(offset, opcode, offset + 2 + 2 * branch, table_end)?;
                }
                return Ok(2 * branches);
            }
            OpCode::CALLF | OpCode::JUMPF => {
                let section = usize::from(read_u16(code, offset + 1).ok_or(truncated)?);
                let count = self.container.types.len();
                let Some(target) = self.container.types.get(section) else {
                    return Err(ValidationError::InvalidSectionArgument {
                        offset,
                        section,
                        count,
                    });
                };
                if opcode == OpCode::CALLF && !target.is_returning() {
                    return Err(ValidationError::InvalidCallArgument { offset, section });
                }
                summary.visited_sections.insert(section);
            }
            OpCode::DATALOADN => {
                let argument = usize::from(read_u16(code, offset + 1).ok_or(truncated)?);
                let data_len = self.container.data.len();
                if argument + DATALOADN_WIDTH > data_len {
                    return Err(ValidationError::InvalidDataloadNArgument {
                        offset,
                        argument,
                        data_len,
                    });
                }
            }
            OpCode::RETURNCONTRACT | OpCode::EOFCREATE => {
                let index = usize::from(*code.get(offset + 1).ok_or(truncated)?);
                let count = self.container.sub_containers.len();
                let Some(sub_container) = self.container.sub_containers.get(index) else {
                    // A missing sub-container can never run.
                    let cause = Unreachable::SubContainer {
                        offset,
                        container: index,
                        count,
                    };
                    return Err(ValidationError::UnreachableCode(cause));
                };
                if opcode == OpCode::EOFCREATE && sub_container.is_data_truncated() {
                    return Err(ValidationError::EOFCreateWithTruncatedSection {
                        offset,
                        container: index,
                        actual: sub_container.data.len(),
                        declared: sub_container.data_size,
                    });
                }
            }
            _ => {}
        }
        Ok(0)
    }

    /// Check the relative jump stored at `immediate`, measured from `from`.
    fn check_destination(
        &mut self,
        offset: usize,
        opcode: OpCode,
        immediate: usize,
        from: usize,
    ) -> Result<(), ValidationError> {
        let relative = read_i16(self.code, immediate)
            .ok_or(ValidationError::TruncatedImmediate { offset, opcode })?;

        match relative_target(from, relative) {
            Some(target) if self.segments.get().is_instruction_start(target) => Ok(()),
            _ => Err(ValidationError::InvalidJumpDest {
                offset,
                relative,
                target: from as isize + isize::from(relative),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::scan_code;
    use crate::{
        Unreachable, ValidationError,
        container::{Container, FunctionMetadata},
        opcode::{OpCode, test_table},
    };

    fn container(code: &[u8]) -> Container {
        Container::with_code(FunctionMetadata::new(0, 0, 0), code.to_vec())
    }

    fn scan(code: &[u8]) -> Result<super::ScanSummary, ValidationError> {
        let container = container(code);
        scan_code(code, &container, &test_table())
    }

    #[test]
    fn test_counts_instructions() {
        // PUSH1 1; PUSH2 2; ADD; STOP
        let summary = scan(&[0x60, 0x01, 0x61, 0x00, 0x02, 0x01, 0x00]).unwrap();
        assert_eq!(summary.instruction_count, 4);
        assert!(summary.visited_sections.is_empty());
    }

    #[test]
    fn test_undefined_instruction() {
        let result = scan(&[0x5f, 0x0c, 0x00]);
        assert_eq!(
            result,
            Err(ValidationError::UndefinedInstruction {
                offset: 1,
                opcode: OpCode(0x0c)
            })
        );
    }

    #[test]
    fn test_truncated_push() {
        // PUSH2 with a single immediate byte
        let result = scan(&[0x00, 0x61, 0x01]);
        assert_eq!(
            result,
            Err(ValidationError::TruncatedImmediate {
                offset: 1,
                opcode: OpCode::PUSH2
            })
        );
    }

    #[test]
    fn test_forward_and_backward_jumps() {
        // RJUMPI +1 skips the STOP at 4, lands on RJUMP -8 which loops to 0
        let code = [
            0x5f, // PUSH0          [0]
            0xe1, 0x00, 0x01, // RJUMPI +1      [1] -> 5
            0x00, // STOP           [4]
            0xe0, 0xff, 0xf8, // RJUMP -8       [5] -> 0
        ];
        assert_eq!(scan(&code).unwrap().instruction_count, 4);
    }

    #[test]
    fn test_jump_out_of_bounds() {
        // RJUMP +0 from offset 3 would land past the end
        let result = scan(&[0xe0, 0x00, 0x00]);
        assert!(matches!(
            result,
            Err(ValidationError::InvalidJumpDest { offset: 0, target: 3, .. })
        ));

        // RJUMP -4 lands before the start
        let result = scan(&[0xe0, 0xff, 0xfc]);
        assert!(matches!(
            result,
            Err(ValidationError::InvalidJumpDest { target: -1, .. })
        ));
    }

    #[test]
    fn test_jump_into_immediate() {
        // RJUMP +1 lands on the first immediate byte of PUSH1
        let result = scan(&[0xe0, 0x00, 0x01, 0x60, 0x00, 0x00]);
        assert!(matches!(
            result,
            Err(ValidationError::InvalidJumpDest { relative: 1, target: 4, .. })
        ));
    }

    #[test]
    fn test_jump_table_zero_branches() {
        let result = scan(&[0x5f, 0xe2, 0x00, 0x00]);
        assert_eq!(result, Err(ValidationError::InvalidBranchCount { offset: 1 }));
    }

    #[test]
    fn test_jump_table_truncated() {
        // Two branches declared, one present
        let result = scan(&[0x5f, 0xe2, 0x02, 0x00, 0x00, 0x00]);
        assert_eq!(
            result,
            Err(ValidationError::TruncatedImmediate {
                offset: 1,
                opcode: OpCode::RJUMPV
            })
        );
    }

    #[test]
    fn test_jump_table_entries_checked() {
        // PUSH0; RJUMPV [0, 1]; STOP; STOP
        let valid = [0x5f, 0xe2, 0x02, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00];
        assert_eq!(scan(&valid).unwrap().instruction_count, 4);

        // Second entry points into the jump table itself
        let invalid = [0x5f, 0xe2, 0x02, 0x00, 0x00, 0xff, 0xfd, 0x00, 0x00];
        assert!(matches!(
            scan(&invalid),
            Err(ValidationError::InvalidJumpDest { offset: 1, target: 4, .. })
        ));
    }

    #[test]
    fn test_call_arguments() {
        let table = test_table();
        let mut container = container(&[]);
        container.push_section(FunctionMetadata::new(0, 0, 0), vec![0xe4]);
        container.push_section(FunctionMetadata::non_returning(0, 0), vec![0x00]);

        // CALLF 1; JUMPF 2
        let code = [0xe3, 0x00, 0x01, 0xe5, 0x00, 0x02];
        let summary = scan_code(&code, &container, &table).unwrap();
        assert_eq!(summary.visited_sections.into_iter().collect::<Vec<_>>(), vec![1, 2]);

        // CALLF 2 targets a non-returning section
        let code = [0xe3, 0x00, 0x02, 0x00];
        assert_eq!(
            scan_code(&code, &container, &table),
            Err(ValidationError::InvalidCallArgument {
                offset: 0,
                section: 2
            })
        );

        // JUMPF 3 is out of range
        let code = [0xe5, 0x00, 0x03];
        assert_eq!(
            scan_code(&code, &container, &table),
            Err(ValidationError::InvalidSectionArgument {
                offset: 0,
                section: 3,
                count: 3
            })
        );
    }

    #[test]
    fn test_dataloadn_bounds() {
        let table = test_table();
        let mut container = container(&[]);
        container.set_data(vec![0; 40]);

        // DATALOADN 8 reads bytes 8..40
        let code = [0xd1, 0x00, 0x08, 0x00];
        assert!(scan_code(&code, &container, &table).is_ok());

        let code = [0xd1, 0x00, 0x09, 0x00];
        assert_eq!(
            scan_code(&code, &container, &table),
            Err(ValidationError::InvalidDataloadNArgument {
                offset: 0,
                argument: 9,
                data_len: 40
            })
        );
    }

    #[test]
    fn test_scan_ignores_reachability_and_heights() {
        // RJUMP +1; STOP; POP; STOP: unreachable STOP, POP on an empty stack
        let summary = scan(&[0xe0, 0x00, 0x01, 0x00, 0x50, 0x00]).unwrap();
        assert_eq!(summary.instruction_count, 4);
    }

    #[test]
    fn test_sub_container_arguments() {
        let table = test_table();
        let mut container = container(&[]);
        container.sub_containers.push(Container::default());

        // PUSH0 x2; RETURNCONTRACT 1
        let code = [0x5f, 0x5f, 0xee, 0x01];
        assert_eq!(
            scan_code(&code, &container, &table),
            Err(ValidationError::UnreachableCode(Unreachable::SubContainer {
                offset: 2,
                container: 1,
                count: 1
            }))
        );

        let code = [0x5f, 0x5f, 0xee, 0x00];
        assert!(scan_code(&code, &container, &table).is_ok());
    }

    #[test]
    fn test_invalid_code_termination() {
        let result = scan(&[0x5f, 0x50]);
        assert_eq!(
            result,
            Err(ValidationError::InvalidCodeTermination {
                offset: 1,
                opcode: Some(OpCode::POP)
            })
        );

        assert_eq!(
            scan(&[]),
            Err(ValidationError::InvalidCodeTermination {
                offset: 0,
                opcode: None
            })
        );
    }

    #[test]
    fn test_segment_map_only_built_for_jumps() {
        let table = test_table();
        let code = [0x60, 0x01, 0x00];
        let container = container(&code);
        let mut scanner = super::LinearScanner::new(&code, &container, &table);
        assert!(!scanner.segments.is_built());
        scanner.check_destination(0, OpCode::RJUMP, 1, 3).unwrap_err();
        assert!(scanner.segments.is_built());
    }
}
