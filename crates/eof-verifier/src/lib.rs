// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Static verifier for stack-machine bytecode containers
//!
//! Checks the code sections of a container before deployment so that the
//! interpreter can execute them without per-instruction runtime checks. The
//! rules an opcode obeys (stack effect, immediate width, whether it ends a
//! path) come from an [`OpcodeTable`] supplied by the caller; the verifier
//! only hard-codes the control-flow and section-referencing opcodes.
//!
//! # Verification Checklist
//!
//! | Check | Description |
//! |-------|-------------|
//! | **Defined opcodes** | Every opcode is defined in the opcode table |
//! | **Immediates in bounds** | No immediate, jump table included, runs past the section |
//! | **Relative jumps** | `RJUMP`/`RJUMPI`/`RJUMPV` land on an opcode inside the section |
//! | **Section arguments** | `CALLF`/`JUMPF` name an existing section; `CALLF` never targets a non-returning one |
//! | **Data arguments** | `DATALOADN` reads 32 bytes within the declared data |
//! | **Sub-container arguments** | `RETURNCONTRACT`/`EOFCREATE` name an existing sub-container |
//! | **Termination** | The last instruction ends its path |
//! | **Stack heights** | Each instruction has one static height, never under- or overflowing |
//! | **Function contracts** | `CALLF` inputs are available and `RETF` returns the declared outputs |
//! | **Max stack height** | The computed maximum matches the declared one |
//! | **No unreachable code** | Every instruction is reached from the section entry |
//! | **No unreachable sections** | Every section is reachable from section 0 |
//!
//! Sub-containers are not verified recursively.

mod call_graph;
mod container;
mod decode;
mod error;
mod opcode;
mod scan;
mod segment;
mod stack;
mod verify;

pub use container::{Container, FunctionMetadata, NON_RETURNING};
pub use decode::{DecodedInstruction, Instructions, decode_instructions};
pub use error::{ContainerError, Unreachable, ValidationError};
pub use opcode::{OpCode, OperationMetadata, OpcodeTable, STACK_LIMIT};
pub use scan::{LinearScanner, ScanSummary, scan_code};
pub use segment::SegmentMap;
pub use stack::StackAnalyzer;
pub use verify::Verifier;
