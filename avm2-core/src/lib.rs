//! AVM2 runtime: the value/object model, constant resolver, linker,
//! activation frames, and the execution engine that runs a parsed ABC
//! module (see the `swf` crate for parsing).

pub mod activation;
pub mod control;
pub mod error;
pub mod linker;
pub mod object;
pub mod resolver;
pub mod value;
pub mod vm;

pub use activation::Activation;
pub use control::ControlFlow;
pub use error::{RuntimeError, VmError};
pub use linker::Linker;
pub use object::{ObjectArena, ObjectHandle, PropertyKey, RuntimeObject};
pub use resolver::{get_constant, resolve_multiname, NameRequest};
pub use value::Value;
pub use vm::VirtualMachine;
