// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Validation of code sections and containers
//!
//! Provides [`Verifier`] which runs the checks described in the crate-level
//! documentation.

use std::collections::BTreeSet;

use tracing::{debug, instrument};

use crate::{
    call_graph::SectionCallGraph,
    container::Container,
    error::{ContainerError, Unreachable, ValidationError},
    opcode::OpcodeTable,
    scan::LinearScanner,
    stack::StackAnalyzer,
};

/// Verifier for the code sections of one container
///
/// Holds no mutable state: every call allocates its own segment map,
/// worklist and height table, so a verifier can be shared across threads.
#[derive(Debug, Clone, Copy)]
pub struct Verifier<'a> {
    container: &'a Container,
    table: &'a OpcodeTable,
}

impl<'a> Verifier<'a> {
    /// Create a new verifier for `container` under the ruleset in `table`.
    pub fn new(container: &'a Container, table: &'a OpcodeTable) -> Self {
        Self { container, table }
    }

    /// Validate a single code section.
    ///
    /// On success, returns the sections this one calls or tail-calls. Whether
    /// those are reachable from the container entry is checked by
    /// [`Verifier::validate_container`].
    #[instrument(level = "debug", skip(self))]
    pub fn validate_code(&self, section: usize) -> Result<BTreeSet<usize>, ValidationError> {
        let count = self.container.code_sections.len();
        let code = self
            .container
            .code_sections
            .get(section)
            .ok_or(ValidationError::UnknownSection { section, count })?;

        let summary = LinearScanner::new(code, self.container, self.table).scan()?;

        let reached =
            StackAnalyzer::new(code, section, &self.container.types, self.table).verify()?;
        if reached != summary.instruction_count {
            return Err(ValidationError::UnreachableCode(Unreachable::Instructions {
                reached,
                count: summary.instruction_count,
            }));
        }

        debug!(
            instructions = summary.instruction_count,
            calls = summary.visited_sections.len(),
            "code section valid"
        );
        Ok(summary.visited_sections)
    }

    /// Validate every code section, then check that all sections are
    /// reachable from section 0.
    ///
    /// Sub-containers are not validated; they are separate containers.
    #[instrument(
        level = "debug",
        skip(self),
        fields(sections = self.container.code_sections.len())
    )]
    pub fn validate_container(&self) -> Result<(), ContainerError> {
        let sections = self.container.code_sections.len();
        let types = self.container.types.len();
        if sections == 0 {
            return Err(ContainerError::NoCodeSections);
        }
        if types != sections {
            return Err(ContainerError::SectionCountMismatch { types, sections });
        }

        let calls = (0..sections)
            .map(|section| {
                self.validate_code(section)
                    .map_err(|source| ContainerError::Section { section, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(&section) = SectionCallGraph::new(&calls).unreachable_sections().first() {
            return Err(ContainerError::UnreachableSection { section });
        }

        debug!("container valid");
        Ok(())
    }
}
