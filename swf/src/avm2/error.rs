use thiserror::Error;

use crate::error::ReadError;

/// Failure parsing an ABC module.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("truncated ABC data: {0}")]
    Truncated(#[from] ReadError),

    #[error("unknown kind byte {byte:#04x} for {what} at offset {offset}")]
    BadKind {
        what: &'static str,
        byte: u8,
        offset: usize,
    },

    #[error("invalid UTF-8 string at offset {offset}")]
    BadUtf8 { offset: usize },

    #[error("index {index} out of range for {what} (len {len})")]
    BadIndex {
        what: &'static str,
        index: u32,
        len: usize,
    },
}

/// Failure decoding one instruction from a code cursor.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unknown opcode {opcode:#04x} at offset {offset}")]
    BadOpcode { opcode: u8, offset: usize },

    #[error("truncated instruction at offset {offset}: {source}")]
    Truncated { offset: usize, source: ReadError },
}
