//! Pattern instructions used to select and decorate header entries.
//!
//! An instruction is one clause of an instruction header such as
//! `Export-Package: !com.acme.impl, com.acme.*;version=1.2`. Its name is a
//! glob, a regular expression or a literal. Instructions are tried in
//! declaration order and the first match wins.

mod instructions;
mod pattern;

pub use instructions::Instructions;
pub use pattern::Instruction;

use thiserror::Error;

use crate::header::HeaderError;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InstructionError {
    #[error("invalid instruction pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("empty instruction")]
    Empty,

    #[error(transparent)]
    Header(#[from] HeaderError),
}

pub type InstructionResult<T> = Result<T, InstructionError>;
