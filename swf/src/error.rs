use thiserror::Error;

/// Failure reading primitive values out of a byte slice.
///
/// This is the lowest layer of the error taxonomy: every other parse/decode
/// error in this crate either wraps one of these or is reported alongside a
/// byte offset obtained from the same reader.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum ReadError {
    #[error("unexpected end of buffer at offset {offset}")]
    EndOfBuffer { offset: usize },

    #[error("invalid UTF-8 in string at offset {offset}")]
    BadUtf8 { offset: usize },
}
