//! The activation frame (`spec.md` §3, §4.G).

use smallvec::SmallVec;

use crate::error::RuntimeError;
use crate::object::ObjectHandle;
use crate::value::Value;

/// Per-call state: registers, the two stacks, and the program counter.
/// Created by `call_method`, destroyed on return or throw.
pub struct Activation {
    registers: Vec<Value>,
    operand_stack: SmallVec<[Value; 8]>,
    scope_stack: SmallVec<[ObjectHandle; 4]>,
    pub pc: usize,
}

impl Activation {
    pub fn new(local_count: u32, global_object: ObjectHandle) -> Self {
        let mut scope_stack = SmallVec::new();
        scope_stack.push(global_object);
        Self {
            registers: vec![Value::Undefined; local_count as usize],
            operand_stack: SmallVec::new(),
            scope_stack,
            pc: 0,
        }
    }

    pub fn register(&self, index: u32) -> Result<&Value, RuntimeError> {
        self.registers
            .get(index as usize)
            .ok_or(RuntimeError::RegisterOutOfRange { index, len: self.registers.len() })
    }

    pub fn set_register(&mut self, index: u32, value: Value) -> Result<(), RuntimeError> {
        let len = self.registers.len();
        let slot = self
            .registers
            .get_mut(index as usize)
            .ok_or(RuntimeError::RegisterOutOfRange { index, len })?;
        *slot = value;
        Ok(())
    }

    pub fn register_count(&self) -> usize {
        self.registers.len()
    }

    pub fn push(&mut self, value: Value) {
        self.operand_stack.push(value);
    }

    pub fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.operand_stack.pop().ok_or(RuntimeError::StackUnderflow)
    }

    pub fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, RuntimeError> {
        if self.operand_stack.len() < n {
            return Err(RuntimeError::StackUnderflow);
        }
        Ok(self.operand_stack.split_off(self.operand_stack.len() - n).into_vec())
    }

    pub fn peek(&self) -> Result<&Value, RuntimeError> {
        self.operand_stack.last().ok_or(RuntimeError::StackUnderflow)
    }

    pub fn push_scope(&mut self, object: ObjectHandle) {
        self.scope_stack.push(object);
    }

    pub fn pop_scope(&mut self) -> Result<ObjectHandle, RuntimeError> {
        self.scope_stack.pop().ok_or(RuntimeError::StackUnderflow)
    }

    /// The scope chain, innermost (most recently pushed) first — the search
    /// order `findproperty`/`findpropstrict` use.
    pub fn scopes_innermost_first(&self) -> impl Iterator<Item = ObjectHandle> + '_ {
        self.scope_stack.iter().rev().copied()
    }

    pub fn scope_at(&self, index: u8) -> Result<ObjectHandle, RuntimeError> {
        self.scope_stack
            .get(index as usize)
            .copied()
            .ok_or(RuntimeError::StackUnderflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use generational_arena::Arena;

    #[test]
    fn registers_default_to_undefined() {
        let mut arena: Arena<()> = Arena::new();
        let global = arena.insert(());
        let frame = Activation::new(3, global);
        assert_eq!(*frame.register(0).unwrap(), Value::Undefined);
        assert_eq!(*frame.register(2).unwrap(), Value::Undefined);
        assert!(frame.register(3).is_err());
    }

    #[test]
    fn operand_stack_push_pop_order() {
        let mut arena: Arena<()> = Arena::new();
        let global = arena.insert(());
        let mut frame = Activation::new(0, global);
        frame.push(Value::Integer(1));
        frame.push(Value::Integer(2));
        assert_eq!(frame.pop().unwrap(), Value::Integer(2));
        assert_eq!(frame.pop().unwrap(), Value::Integer(1));
        assert!(frame.pop().is_err());
    }

    #[test]
    fn scope_stack_seeded_with_global() {
        let mut arena: Arena<()> = Arena::new();
        let global = arena.insert(());
        let frame = Activation::new(0, global);
        assert_eq!(frame.scopes_innermost_first().next(), Some(global));
    }
}
