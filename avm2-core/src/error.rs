//! The runtime error taxonomy (`spec.md` §7).

use thiserror::Error;

use crate::value::Value;
use swf::avm2::{DecodeError, ParseError};

/// Everything that can end an execution abnormally.
#[derive(Debug, Error)]
pub enum VmError {
    /// The ABC module itself was malformed; VM construction fails.
    #[error("malformed ABC module: {0}")]
    Parse(#[from] ParseError),

    /// An instruction in a method body's code couldn't be decoded.
    #[error("decode error during execution: {0}")]
    Decode(#[from] DecodeError),

    /// A type error, missing property on a non-dynamic object, register out
    /// of range, or operand stack underflow.
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// A value thrown by bytecode that no active exception record caught.
    #[error("uncaught AVM2 exception: {0:?}")]
    Thrown(Value),

    /// An opcode this engine doesn't implement yet.
    #[error("unimplemented opcode {opcode:#04x} at pc {pc}")]
    Unimplemented { opcode: u8, pc: usize },
}

/// Errors raised by the engine itself rather than by bytecode (`spec.md` §7
/// `RuntimeError`).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("operand stack underflow")]
    StackUnderflow,

    #[error("register {index} out of range (frame has {len} registers)")]
    RegisterOutOfRange { index: u32, len: usize },

    #[error("constant pool index {index} out of range for {what} (len {len})")]
    PoolIndexOutOfRange { what: &'static str, index: u32, len: usize },

    #[error("method index {0} has no body")]
    NoSuchMethodBody(u32),

    #[error("class index {0} out of range")]
    NoSuchClass(u32),

    #[error("no property named {namespace:?}::{name} on this object")]
    NoSuchProperty { namespace: String, name: String },

    #[error("reference error: {0} is not defined")]
    ReferenceError(String),

    #[error("value is not callable")]
    NotCallable,

    #[error("value is not an object")]
    NotAnObject,

    #[error("`this` must not be null")]
    NullThis,
}
