//! SWF container tags and the AVM2 ABC bytecode format they carry.
//!
//! This crate covers the wire-format half of the system: reading bytes
//! (`reader`), the minimal SWF tag boundary needed to pull a `DoAbc` tag's
//! body out of a file (`tag`), and the ABC module format itself (`avm2`).
//! None of this executes bytecode; that's `avm2-core`.

pub mod avm2;
pub mod error;
pub mod reader;
pub mod tag;

pub use error::ReadError;
pub use reader::Reader;
pub use tag::{decode_tags, DoAbc, DoAbcFlag, Signature, SwfError, SwfHeader, Tag};
