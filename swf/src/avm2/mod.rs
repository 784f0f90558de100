//! AVM2 ABC module: data model, enums, parser, and instruction decoder.

pub mod enums;
pub mod error;
pub mod opcode;
pub mod read;
pub mod types;

pub use enums::{ConstantKind, MultinameKind, NamespaceKind, TraitKind};
pub use error::{DecodeError, ParseError};
pub use opcode::{decode_instruction, Instruction};
pub use read::parse_abc;
pub use types::*;
