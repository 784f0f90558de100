//! The execution engine (`spec.md` §4.G) — method activation, opcode
//! dispatch, lazy script/class initialization, and the public VM API
//! (`spec.md` §6).

use fnv::FnvHashMap;
use log::{debug, warn};

use swf::avm2::{AbcFile, ClassIndex, Instruction, Multiname, MethodFlags, MethodIndex, ScriptIndex};

use crate::activation::Activation;
use crate::control::ControlFlow;
use crate::error::{RuntimeError, VmError};
use crate::object::{ObjectArena, ObjectHandle, PropertyKey};
use crate::resolver::{get_constant, resolve_multiname, NameRequest};
use crate::value::Value;
use crate::linker::Linker;

/// One AVM2 virtual machine: one ABC module, one object arena, one global
/// object. Not `Send`/`Sync` (`spec.md` §5: "not safe to share across
/// threads"); separate VMs may run on separate threads over distinct
/// modules.
pub struct VirtualMachine<'a> {
    abc: &'a AbcFile<'a>,
    linker: Linker,
    arena: ObjectArena,
    global_object: ObjectHandle,
    script_objects: FnvHashMap<ScriptIndex, ObjectHandle>,
    class_objects: FnvHashMap<ClassIndex, ObjectHandle>,
    initialized_classes: FnvHashMap<ClassIndex, bool>,
}

impl<'a> VirtualMachine<'a> {
    /// Build a VM over an already-parsed ABC module, running the linker
    /// over it (`spec.md` §6 `new(abc_module) -> VM`).
    pub fn new(abc: &'a AbcFile<'a>) -> Result<Self, VmError> {
        let linker = Linker::build(abc)?;
        let mut arena = ObjectArena::new();
        let global_object = arena.new_object(None);
        Ok(Self {
            abc,
            linker,
            arena,
            global_object,
            script_objects: FnvHashMap::default(),
            class_objects: FnvHashMap::default(),
            initialized_classes: FnvHashMap::default(),
        })
    }

    pub fn global_object(&self) -> ObjectHandle {
        self.global_object
    }

    /// Initialize the entry-point script (the last one in the script table,
    /// `spec.md` §3/§7 supplement, confirmed against
    /// `original_source/avm2/vm.py`'s `init_script(-1)`).
    pub fn call_entry_point(&mut self) -> Result<(), VmError> {
        let script_index = self
            .abc
            .entry_point_script()
            .ok_or_else(|| VmError::Runtime(RuntimeError::ReferenceError("no scripts in ABC module".into())))?;
        self.init_script(script_index)
    }

    pub fn lookup_class(&self, qualified_name: &str) -> Option<ClassIndex> {
        self.linker.name_to_class.get(qualified_name).copied()
    }

    pub fn lookup_method(&self, qualified_name: &str) -> Option<MethodIndex> {
        self.linker.name_to_method.get(qualified_name).copied()
    }

    /// Run a method to completion given an explicit `this` and argument
    /// list (`spec.md` §6 `call_method`).
    pub fn call_method(&mut self, method_index: MethodIndex, this: Value, args: &[Value]) -> Result<Value, VmError> {
        if matches!(this, Value::Null) {
            return Err(VmError::Runtime(RuntimeError::NullThis));
        }
        let body_index = *self
            .linker
            .method_to_body
            .get(&method_index)
            .ok_or(RuntimeError::NoSuchMethodBody(method_index))?;
        let method = self
            .abc
            .methods
            .get(method_index as usize)
            .ok_or(RuntimeError::NoSuchMethodBody(method_index))?;
        let body = self
            .abc
            .method_bodies
            .get(body_index as usize)
            .ok_or(RuntimeError::NoSuchMethodBody(method_index))?;

        let mut frame = Activation::new(body.local_count, self.global_object);
        frame.set_register(0, this)?;

        let param_count = method.param_count as usize;
        let copy_count = args.len().min(param_count);
        for i in 0..copy_count {
            frame.set_register(1 + i as u32, args[i].clone())?;
        }

        // Optional-parameter defaults, aligned to the tail of the parameter
        // list: option i applies to parameter param_count - options.len() + i
        // (`spec.md` §4.G).
        if !method.options.is_empty() {
            let first_optional = param_count - method.options.len();
            for (i, option) in method.options.iter().enumerate() {
                let param_slot = first_optional + i;
                if param_slot >= copy_count {
                    let value = get_constant(&self.abc.constant_pool, option.kind, option.value_index)?;
                    frame.set_register(1 + param_slot as u32, value)?;
                }
            }
        }

        if method.flags.contains(MethodFlags::NEED_REST) {
            let rest_index = (param_count + 1) as u32;
            if (rest_index as usize) < frame.register_count() {
                let rest: Vec<Value> = args.iter().skip(param_count).cloned().collect();
                let handle = self.new_array_object(rest);
                frame.set_register(rest_index, Value::Object(handle))?;
            }
        } else if method.flags.contains(MethodFlags::NEED_ARGUMENTS) {
            let arguments_index = (param_count + 1) as u32;
            if (arguments_index as usize) < frame.register_count() {
                let handle = self.new_array_object(args.to_vec());
                frame.set_register(arguments_index, Value::Object(handle))?;
            }
        }

        self.run(&mut frame, body.code, &body.exceptions)
    }

    /// Construct a new instance of a class, running its instance `init`
    /// method, after ensuring the class (and its owning script) are
    /// initialized (`spec.md` §4.G "Lazy initialization").
    pub fn new_instance(&mut self, class_index: ClassIndex, args: &[Value]) -> Result<ObjectHandle, VmError> {
        self.init_class(class_index)?;
        let instance = self
            .abc
            .instances
            .get(class_index as usize)
            .ok_or(RuntimeError::NoSuchClass(class_index))?;
        let handle = self.arena.new_object(Some(class_index));
        self.call_method(instance.init, Value::Object(handle), args)?;
        Ok(handle)
    }

    fn new_array_object(&mut self, items: Vec<Value>) -> ObjectHandle {
        let handle = self.arena.new_object(None);
        if let Some(object) = self.arena.get_mut(handle) {
            for (i, value) in items.into_iter().enumerate() {
                object.set(("".into(), i.to_string()), value);
            }
        }
        handle
    }

    /// Initialize a script's global traits by calling its `init` method
    /// once, caching the resulting script-object. `this` for a script
    /// initializer is the script's own global/script-object itself
    /// (`spec.md` §9 Open Question (c), confirmed against
    /// `original_source/avm2/vm.py`).
    fn init_script(&mut self, script_index: ScriptIndex) -> Result<(), VmError> {
        if self.script_objects.contains_key(&script_index) {
            return Ok(());
        }
        let handle = self.arena.new_object(None);
        self.script_objects.insert(script_index, handle);
        let script = self
            .abc
            .scripts
            .get(script_index as usize)
            .ok_or_else(|| VmError::Runtime(RuntimeError::ReferenceError(format!("script {script_index} out of range"))))?;
        self.call_method(script.init, Value::Object(handle), &[])?;
        Ok(())
    }

    /// Initialize a class's static state, after its owning script, calling
    /// the class-side `init` method exactly once.
    fn init_class(&mut self, class_index: ClassIndex) -> Result<(), VmError> {
        if *self.initialized_classes.get(&class_index).unwrap_or(&false) {
            return Ok(());
        }
        let script_index = *self
            .linker
            .class_to_script
            .get(&class_index)
            .ok_or(RuntimeError::NoSuchClass(class_index))?;
        self.init_script(script_index)?;

        let handle = self.arena.new_object(Some(class_index));
        self.class_objects.insert(class_index, handle);
        self.initialized_classes.insert(class_index, true);

        let class = self
            .abc
            .classes
            .get(class_index as usize)
            .ok_or(RuntimeError::NoSuchClass(class_index))?;
        self.call_method(class.init, Value::Object(handle), &[])?;
        Ok(())
    }

    /// The dispatch loop: decode, advance PC, execute, act on the resulting
    /// `ControlFlow` (`spec.md` §4.G). `exceptions` is the owning method
    /// body's exception table, consulted whenever a `throw` fires or a
    /// called method propagates an uncaught one.
    fn run(&mut self, frame: &mut Activation, code: &'a [u8], exceptions: &[swf::avm2::ExceptionInfo]) -> Result<Value, VmError> {
        loop {
            let mut reader = swf::Reader::new(code);
            reader.set_position(frame.pc);
            let instruction_start = frame.pc;
            let instruction = swf::avm2::decode_instruction(&mut reader).map_err(VmError::Decode)?;
            let pc_after_operand = reader.position();
            frame.pc = pc_after_operand;

            if log::log_enabled!(log::Level::Trace) {
                log::trace!("pc={instruction_start} {instruction:?}");
            }

            let outcome = self.execute(frame, &instruction, instruction_start);
            let thrown = match outcome {
                Err(VmError::Thrown(value)) => Some(value),
                Ok(ControlFlow::Throw(value)) => Some(value),
                Ok(ControlFlow::Continue) => None,
                Ok(ControlFlow::Jump(offset)) => {
                    // lookupswitch measures its offsets from its own opcode
                    // byte; every other branch measures from the byte after
                    // its operand(s) (`spec.md` §4.C). The lookupswitch arm
                    // below adjusts for that before returning Jump, so here
                    // we can always add to the post-operand PC.
                    let base = if matches!(instruction, Instruction::LookupSwitch { .. }) {
                        instruction_start as i64
                    } else {
                        pc_after_operand as i64
                    };
                    frame.pc = (base + offset as i64) as usize;
                    continue;
                }
                Ok(ControlFlow::Return(value)) => return Ok(value),
                Err(other) => return Err(other),
            };

            let Some(value) = thrown else { continue };

            // Search active exception records covering the throwing
            // instruction's PC; jump to the first match's target with the
            // thrown value pushed, else unwind to the caller (`spec.md`
            // §4.G, §7 `ASThrown`).
            match exceptions
                .iter()
                .find(|e| (e.from as usize) <= instruction_start && instruction_start < (e.to as usize))
            {
                Some(handler) => {
                    frame.pc = handler.target as usize;
                    frame.push(value);
                }
                None => return Err(VmError::Thrown(value)),
            }
        }
    }

    fn execute(
        &mut self,
        frame: &mut Activation,
        instruction: &Instruction,
        pc: usize,
    ) -> Result<ControlFlow, VmError> {
        use Instruction as I;

        Ok(match instruction {
            I::Nop | I::Label | I::Bkpt | I::BkptLine { .. } | I::Timestamp => ControlFlow::Continue,
            I::DebugLine { .. } | I::DebugFile { .. } | I::Debug { .. } => ControlFlow::Continue,

            I::Throw => ControlFlow::Throw(frame.pop()?),

            // --- Arithmetic -------------------------------------------------
            I::Add => {
                let b = frame.pop()?;
                let a = frame.pop()?;
                frame.push(self.add(a, b));
                ControlFlow::Continue
            }
            I::Subtract => self.binary_number(frame, |a, b| a - b)?,
            I::Multiply => self.binary_number(frame, |a, b| a * b)?,
            I::Divide => self.binary_number(frame, |a, b| a / b)?,
            I::Modulo => self.binary_number(frame, |a, b| a % b)?,
            I::AddInteger => self.binary_int(frame, i32::wrapping_add)?,
            I::SubtractInteger => self.binary_int(frame, i32::wrapping_sub)?,
            I::MultiplyInteger => self.binary_int(frame, i32::wrapping_mul)?,
            I::Negate => {
                let v = frame.pop()?;
                frame.push(Value::Double(-v.to_number()));
                ControlFlow::Continue
            }
            I::NegateInteger => {
                let v = frame.pop()?;
                frame.push(Value::Integer(v.to_int32().wrapping_neg()));
                ControlFlow::Continue
            }
            I::Increment => {
                let v = frame.pop()?;
                frame.push(Value::Double(v.to_number() + 1.0));
                ControlFlow::Continue
            }
            I::Decrement => {
                let v = frame.pop()?;
                frame.push(Value::Double(v.to_number() - 1.0));
                ControlFlow::Continue
            }
            I::IncrementInteger => {
                let v = frame.pop()?;
                frame.push(Value::Integer(v.to_int32().wrapping_add(1)));
                ControlFlow::Continue
            }
            I::DecrementInteger => {
                let v = frame.pop()?;
                frame.push(Value::Integer(v.to_int32().wrapping_sub(1)));
                ControlFlow::Continue
            }
            I::IncLocal { index } => {
                let v = frame.register(*index)?.to_number() + 1.0;
                frame.set_register(*index, Value::Double(v))?;
                ControlFlow::Continue
            }
            I::DecLocal { index } => {
                let v = frame.register(*index)?.to_number() - 1.0;
                frame.set_register(*index, Value::Double(v))?;
                ControlFlow::Continue
            }

            // --- Bitwise -----------------------------------------------------
            I::BitAnd => self.binary_int(frame, |a, b| a & b)?,
            I::BitOr => self.binary_int(frame, |a, b| a | b)?,
            I::BitXor => self.binary_int(frame, |a, b| a ^ b)?,
            I::BitNot => {
                let v = frame.pop()?;
                frame.push(Value::Integer(!v.to_int32()));
                ControlFlow::Continue
            }
            I::LShift => self.binary_shift(frame, |a, b| a.wrapping_shl(b))?,
            I::RShift => self.binary_shift(frame, |a, b| a.wrapping_shr(b))?,
            I::URShift => {
                let b = frame.pop()?.to_uint32() & 0x1F;
                let a = frame.pop()?.to_uint32();
                frame.push(Value::Unsigned(a.wrapping_shr(b)));
                ControlFlow::Continue
            }

            // --- Comparison --------------------------------------------------
            I::Equals => self.compare(frame, Value::abstract_equals)?,
            I::StrictEquals => self.compare(frame, Value::strict_equals)?,
            I::LessThan => self.compare_numeric(frame, |a, b| a < b)?,
            I::LessEquals => self.compare_numeric(frame, |a, b| a <= b)?,
            I::GreaterThan => self.compare_numeric(frame, |a, b| a > b)?,
            I::GreaterEquals => self.compare_numeric(frame, |a, b| a >= b)?,
            I::Not => {
                let v = frame.pop()?;
                frame.push(Value::Bool(!v.to_boolean()));
                ControlFlow::Continue
            }

            // --- Control flow --------------------------------------------------
            I::Jump { offset } => ControlFlow::Jump(*offset),
            I::IfTrue { offset } => self.branch_if(frame, *offset, |v| v.to_boolean())?,
            I::IfFalse { offset } => self.branch_if(frame, *offset, |v| !v.to_boolean())?,
            I::IfEq { offset } => self.branch_binary(frame, *offset, |a, b| a.abstract_equals(&b))?,
            I::IfNe { offset } => self.branch_binary(frame, *offset, |a, b| !a.abstract_equals(&b))?,
            I::IfStrictEq { offset } => self.branch_binary(frame, *offset, |a, b| a.strict_equals(&b))?,
            I::IfStrictNe { offset } => self.branch_binary(frame, *offset, |a, b| !a.strict_equals(&b))?,
            I::IfLt { offset } => self.branch_binary(frame, *offset, |a, b| a.to_number() < b.to_number())?,
            I::IfLe { offset } => self.branch_binary(frame, *offset, |a, b| a.to_number() <= b.to_number())?,
            I::IfGt { offset } => self.branch_binary(frame, *offset, |a, b| a.to_number() > b.to_number())?,
            I::IfGe { offset } => self.branch_binary(frame, *offset, |a, b| a.to_number() >= b.to_number())?,
            I::IfNlt { offset } => self.branch_binary(frame, *offset, |a, b| !(a.to_number() < b.to_number()))?,
            I::IfNle { offset } => self.branch_binary(frame, *offset, |a, b| !(a.to_number() <= b.to_number()))?,
            I::IfNgt { offset } => self.branch_binary(frame, *offset, |a, b| !(a.to_number() > b.to_number()))?,
            I::IfNge { offset } => self.branch_binary(frame, *offset, |a, b| !(a.to_number() >= b.to_number()))?,
            I::LookupSwitch { default_offset, case_offsets } => {
                let index = frame.pop()?.to_int32();
                let chosen = if index >= 0 && (index as usize) < case_offsets.len() {
                    case_offsets[index as usize]
                } else {
                    *default_offset
                };
                // Relative to lookupswitch's own opcode byte, not the
                // post-operand PC — `run` special-cases this instruction's
                // jump base accordingly.
                ControlFlow::Jump(chosen)
            }
            I::ReturnVoid => ControlFlow::Return(Value::Undefined),
            I::ReturnValue => ControlFlow::Return(frame.pop()?),

            // --- Stack / registers --------------------------------------------
            I::PushByte { value } => {
                frame.push(Value::Integer(*value as i32));
                ControlFlow::Continue
            }
            I::PushShort { value } => {
                frame.push(Value::Integer(*value));
                ControlFlow::Continue
            }
            I::PushTrue => {
                frame.push(Value::Bool(true));
                ControlFlow::Continue
            }
            I::PushFalse => {
                frame.push(Value::Bool(false));
                ControlFlow::Continue
            }
            I::PushNan => {
                frame.push(Value::Double(f64::NAN));
                ControlFlow::Continue
            }
            I::PushNull => {
                frame.push(Value::Null);
                ControlFlow::Continue
            }
            I::PushUndefined => {
                frame.push(Value::Undefined);
                ControlFlow::Continue
            }
            I::PushString { index } => {
                frame.push(Value::String(self.string_constant(*index)?));
                ControlFlow::Continue
            }
            I::PushInt { index } => {
                let v = self
                    .abc
                    .constant_pool
                    .int(*index)
                    .ok_or(RuntimeError::PoolIndexOutOfRange { what: "int", index: *index, len: self.abc.constant_pool.integers.len() })?;
                frame.push(Value::Integer(v));
                ControlFlow::Continue
            }
            I::PushUint { index } => {
                let v = self.abc.constant_pool.uint(*index).ok_or(RuntimeError::PoolIndexOutOfRange {
                    what: "uint",
                    index: *index,
                    len: self.abc.constant_pool.unsigned_integers.len(),
                })?;
                frame.push(Value::Unsigned(v));
                ControlFlow::Continue
            }
            I::PushDouble { index } => {
                let v = self.abc.constant_pool.double(*index).ok_or(RuntimeError::PoolIndexOutOfRange {
                    what: "double",
                    index: *index,
                    len: self.abc.constant_pool.doubles.len(),
                })?;
                frame.push(Value::Double(v));
                ControlFlow::Continue
            }
            I::PushNamespace { index } => {
                frame.push(Value::Namespace(self.namespace_constant(*index)?));
                ControlFlow::Continue
            }
            I::Pop => {
                frame.pop()?;
                ControlFlow::Continue
            }
            I::Dup => {
                let v = frame.peek()?.clone();
                frame.push(v);
                ControlFlow::Continue
            }
            I::Swap => {
                let b = frame.pop()?;
                let a = frame.pop()?;
                frame.push(b);
                frame.push(a);
                ControlFlow::Continue
            }
            I::GetLocal { index } => {
                frame.push(frame.register(*index)?.clone());
                ControlFlow::Continue
            }
            I::SetLocal { index } => {
                let v = frame.pop()?;
                frame.set_register(*index, v)?;
                ControlFlow::Continue
            }
            I::GetLocal0 => self.get_local_n(frame, 0)?,
            I::GetLocal1 => self.get_local_n(frame, 1)?,
            I::GetLocal2 => self.get_local_n(frame, 2)?,
            I::GetLocal3 => self.get_local_n(frame, 3)?,
            I::SetLocal0 => self.set_local_n(frame, 0)?,
            I::SetLocal1 => self.set_local_n(frame, 1)?,
            I::SetLocal2 => self.set_local_n(frame, 2)?,
            I::SetLocal3 => self.set_local_n(frame, 3)?,
            I::Kill { index } => {
                frame.set_register(*index, Value::Undefined)?;
                ControlFlow::Continue
            }

            // --- Scope ---------------------------------------------------------
            I::PushScope | I::PushWith => {
                let v = frame.pop()?;
                let handle = self.object_handle(&v)?;
                frame.push_scope(handle);
                ControlFlow::Continue
            }
            I::PopScope => {
                frame.pop_scope()?;
                ControlFlow::Continue
            }
            I::GetGlobalScope => {
                frame.push(Value::Object(self.global_object));
                ControlFlow::Continue
            }
            I::GetScopeObject { index } => {
                let handle = frame.scope_at(*index)?;
                frame.push(Value::Object(handle));
                ControlFlow::Continue
            }

            // --- Property / name -------------------------------------------------
            I::FindProperty { index } => {
                let request = self.pop_and_resolve(frame, *index)?;
                let handle = self.find_property_owner(frame, &request).unwrap_or(self.global_object);
                frame.push(Value::Object(handle));
                ControlFlow::Continue
            }
            I::FindPropStrict { index } => {
                let request = self.pop_and_resolve(frame, *index)?;
                let handle = self
                    .find_property_owner(frame, &request)
                    .ok_or_else(|| RuntimeError::ReferenceError(request.local_name.clone()))?;
                frame.push(Value::Object(handle));
                ControlFlow::Continue
            }
            // The "Global" forms skip the scope chain and search the global
            // object directly; `FindDef` resolves a script-level definition
            // the same way `findpropstrict` does. No ABC we build distinguishes
            // these further, so they share `findpropstrict`'s search.
            I::FindPropGlobal { index } => {
                let _ = resolve_multiname(&self.abc.constant_pool, *index, None, None)?;
                frame.push(Value::Object(self.global_object));
                ControlFlow::Continue
            }
            I::FindPropGlobalStrict { index } | I::FindDef { index } => {
                let request = resolve_multiname(&self.abc.constant_pool, *index, None, None)?;
                if !self.object_has_any(self.global_object, &request) {
                    return Err(VmError::Runtime(RuntimeError::ReferenceError(request.local_name)));
                }
                frame.push(Value::Object(self.global_object));
                ControlFlow::Continue
            }
            I::GetLex { index } => {
                let request = resolve_multiname(&self.abc.constant_pool, *index, None, None)?;
                let handle = self
                    .find_property_owner(frame, &request)
                    .ok_or_else(|| RuntimeError::ReferenceError(request.local_name.clone()))?;
                let value = self.get_property_on(handle, &request)?;
                frame.push(value);
                ControlFlow::Continue
            }
            I::GetProperty { index } => {
                let request = self.pop_and_resolve(frame, *index)?;
                let target = frame.pop()?;
                let handle = self.object_handle(&target)?;
                frame.push(self.get_property_on(handle, &request)?);
                ControlFlow::Continue
            }
            I::SetProperty { index } | I::InitProperty { index } => {
                let request = self.pop_and_resolve(frame, *index)?;
                let value = frame.pop()?;
                let target = frame.pop()?;
                let handle = self.object_handle(&target)?;
                self.set_property_on(handle, &request, value)?;
                ControlFlow::Continue
            }
            I::DeleteProperty { index } => {
                let request = self.pop_and_resolve(frame, *index)?;
                let target = frame.pop()?;
                let handle = self.object_handle(&target)?;
                let deleted = self
                    .arena
                    .get_mut(handle)
                    .map(|o| o.delete(&property_key(&request)))
                    .unwrap_or(false);
                frame.push(Value::Bool(deleted));
                ControlFlow::Continue
            }
            I::GetSlot { slot_index } | I::GetGlobalSlot { slot_index } => {
                let target = if matches!(instruction, I::GetGlobalSlot { .. }) {
                    Value::Object(self.global_object)
                } else {
                    frame.pop()?
                };
                let handle = self.object_handle(&target)?;
                let key = ("".to_string(), format!("__slot{slot_index}"));
                let value = self.arena.get(handle).and_then(|o| o.get(&key)).cloned().unwrap_or(Value::Undefined);
                frame.push(value);
                ControlFlow::Continue
            }
            I::SetSlot { slot_index } | I::SetGlobalSlot { slot_index } => {
                let value = frame.pop()?;
                let handle = if matches!(instruction, I::SetGlobalSlot { .. }) {
                    self.global_object
                } else {
                    self.object_handle(&frame.pop()?)?
                };
                if let Some(object) = self.arena.get_mut(handle) {
                    object.set(("".to_string(), format!("__slot{slot_index}")), value);
                }
                ControlFlow::Continue
            }
            I::GetSuper { index } | I::GetDescendants { index } => {
                let request = self.pop_and_resolve(frame, *index)?;
                let target = frame.pop()?;
                let handle = self.object_handle(&target)?;
                frame.push(self.get_property_on(handle, &request)?);
                ControlFlow::Continue
            }
            I::SetSuper { index } => {
                let request = self.pop_and_resolve(frame, *index)?;
                let value = frame.pop()?;
                let target = frame.pop()?;
                let handle = self.object_handle(&target)?;
                self.set_property_on(handle, &request, value)?;
                ControlFlow::Continue
            }
            I::NextName | I::NextValue => {
                let index = frame.pop()?.to_int32();
                let target = frame.pop()?;
                let handle = self.object_handle(&target)?;
                let key = (index as usize)
                    .checked_sub(1)
                    .and_then(|i| self.arena.get(handle).and_then(|o| o.keys().nth(i).cloned()));
                match (key, matches!(instruction, I::NextName)) {
                    (Some((_, name)), true) => frame.push(Value::String(name)),
                    (Some(key), false) => {
                        let value = self.arena.get(handle).and_then(|o| o.get(&key)).cloned().unwrap_or(Value::Undefined);
                        frame.push(value);
                    }
                    (None, _) => frame.push(Value::Undefined),
                }
                ControlFlow::Continue
            }
            I::HasNext => {
                let index = frame.pop()?.to_int32();
                let target = frame.pop()?;
                let handle = self.object_handle(&target)?;
                let len = self.arena.get(handle).map(|o| o.len()).unwrap_or(0);
                frame.push(Value::Integer(if (index as usize) < len { index + 1 } else { 0 }));
                ControlFlow::Continue
            }
            I::HasNext2 { object_reg, index_reg } => {
                let target = frame.register(*object_reg)?.clone();
                let index = frame.register(*index_reg)?.to_int32();
                let handle = self.object_handle(&target)?;
                let len = self.arena.get(handle).map(|o| o.len()).unwrap_or(0);
                let next = if (index as usize) < len { index + 1 } else { 0 };
                frame.set_register(*index_reg, Value::Integer(next))?;
                frame.push(Value::Bool(next != 0));
                ControlFlow::Continue
            }

            // --- Type coercion -----------------------------------------------------
            I::CoerceAny => ControlFlow::Continue,
            I::Coerce { .. } | I::AsType { .. } | I::IsType { .. } => {
                // Non-dynamic class coercion/type-testing needs a live class
                // hierarchy this engine doesn't model in full; these are
                // accepted as a pass-through/boolean-true stand-in rather
                // than left undecodable, since rejecting them would make
                // every typed local variable unusable.
                if matches!(instruction, I::IsType { .. }) {
                    frame.pop()?;
                    frame.push(Value::Bool(true));
                } // Coerce/AsType leave the value on the stack unchanged.
                ControlFlow::Continue
            }
            I::AsTypeLate | I::IsTypeLate => {
                frame.pop()?;
                if matches!(instruction, I::IsTypeLate) {
                    frame.pop()?;
                    frame.push(Value::Bool(true));
                }
                ControlFlow::Continue
            }
            I::CoerceString | I::ConvertString => {
                let v = frame.pop()?;
                frame.push(Value::String(display_string(&v)));
                ControlFlow::Continue
            }
            I::ConvertInteger => {
                let v = frame.pop()?;
                frame.push(Value::Integer(v.to_int32()));
                ControlFlow::Continue
            }
            I::ConvertUnsignedInteger => {
                let v = frame.pop()?;
                frame.push(Value::Unsigned(v.to_uint32()));
                ControlFlow::Continue
            }
            I::ConvertDouble => {
                let v = frame.pop()?;
                frame.push(Value::Double(v.to_number()));
                ControlFlow::Continue
            }
            I::ConvertBoolean => {
                let v = frame.pop()?;
                frame.push(Value::Bool(v.to_boolean()));
                ControlFlow::Continue
            }
            I::ConvertObject => ControlFlow::Continue,
            I::TypeOf => {
                let v = frame.pop()?;
                frame.push(Value::String(type_of(&v).to_string()));
                ControlFlow::Continue
            }
            I::InstanceOf => {
                let type_value = frame.pop()?;
                let value = frame.pop()?;
                let result = match (&value, &type_value) {
                    (Value::Object(a), Value::Object(b)) => {
                        let class_a = self.arena.get(*a).and_then(|o| o.class_index);
                        let class_b = self.arena.get(*b).and_then(|o| o.class_index);
                        class_a.is_some() && class_a == class_b
                    }
                    _ => false,
                };
                frame.push(Value::Bool(result));
                ControlFlow::Continue
            }
            I::In => {
                let target = frame.pop()?;
                let name = frame.pop()?;
                let handle = self.object_handle(&target)?;
                let key = ("".to_string(), display_string(&name));
                let found = self.arena.get(handle).map(|o| o.has(&key)).unwrap_or(false);
                frame.push(Value::Bool(found));
                ControlFlow::Continue
            }
            I::CheckFilter => ControlFlow::Continue,

            // --- Construction / call -----------------------------------------------
            I::NewObject { arg_count } => {
                let mut pairs = frame.pop_n((*arg_count as usize) * 2)?;
                let handle = self.arena.new_object(None);
                let mut iter = pairs.drain(..);
                while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
                    if let Some(object) = self.arena.get_mut(handle) {
                        object.set(("".to_string(), display_string(&key)), value);
                    }
                }
                frame.push(Value::Object(handle));
                ControlFlow::Continue
            }
            I::NewArray { arg_count } => {
                let items = frame.pop_n(*arg_count as usize)?;
                let handle = self.new_array_object(items);
                frame.push(Value::Object(handle));
                ControlFlow::Continue
            }
            I::NewActivation | I::NewCatch { .. } => {
                let handle = self.arena.new_object(None);
                frame.push(Value::Object(handle));
                ControlFlow::Continue
            }
            I::NewClass { index } => {
                self.init_class(*index)?;
                let handle = *self.class_objects.get(index).expect("init_class populates class_objects");
                frame.push(Value::Object(handle));
                ControlFlow::Continue
            }
            I::NewFunction { index } => {
                // Closures aren't modeled as first-class objects here; a
                // method index is pushed directly and `Call`/`CallProperty`
                // know how to invoke it the same as any other method value.
                frame.push(Value::Integer(*index as i32));
                ControlFlow::Continue
            }
            I::Call { arg_count } => {
                let args = frame.pop_n(*arg_count as usize)?;
                let receiver = frame.pop()?;
                let callee = frame.pop()?;
                let Value::Integer(method_index) = callee else {
                    return Err(VmError::Runtime(RuntimeError::NotCallable));
                };
                frame.push(self.call_method(method_index as u32, receiver, &args)?);
                ControlFlow::Continue
            }
            I::Construct { arg_count } => {
                let args = frame.pop_n(*arg_count as usize)?;
                let callee = frame.pop()?;
                let class_index = match callee {
                    Value::Object(handle) => self.arena.get(handle).and_then(|o| o.class_index),
                    _ => None,
                }
                .ok_or(RuntimeError::NotCallable)?;
                let handle = self.new_instance(class_index, &args)?;
                frame.push(Value::Object(handle));
                ControlFlow::Continue
            }
            I::ConstructProp { index, arg_count } => {
                let args = frame.pop_n(*arg_count as usize)?;
                let request = resolve_multiname(&self.abc.constant_pool, *index, None, None)?;
                let class_index = self
                    .linker
                    .name_to_class
                    .get(&qualified(&request))
                    .copied()
                    .ok_or_else(|| RuntimeError::ReferenceError(request.local_name.clone()))?;
                let handle = self.new_instance(class_index, &args)?;
                frame.push(Value::Object(handle));
                ControlFlow::Continue
            }
            I::ConstructSuper { arg_count } => {
                // The superclass initializer chain isn't modeled (no base
                // Object/class hierarchy beyond what's declared in the ABC
                // module); consume the receiver and arguments so the stack
                // stays balanced, matching the effect of an empty super().
                let _args = frame.pop_n(*arg_count as usize)?;
                frame.pop()?;
                ControlFlow::Continue
            }
            I::CallProperty { index, arg_count }
            | I::CallPropLex { index, arg_count }
            | I::CallPropVoid { index, arg_count } => {
                let args = frame.pop_n(*arg_count as usize)?;
                let request = resolve_multiname(&self.abc.constant_pool, *index, None, None)?;
                let receiver = frame.pop()?;
                let handle = self.object_handle(&receiver)?;
                let method_index = self.resolve_method_on(handle, &request)?;
                let result = self.call_method(method_index, Value::Object(handle), &args)?;
                if !matches!(instruction, I::CallPropVoid { .. }) {
                    frame.push(result);
                }
                ControlFlow::Continue
            }
            I::CallMethod { index, arg_count } | I::CallStatic { index, arg_count } => {
                let args = frame.pop_n(*arg_count as usize)?;
                let receiver = frame.pop()?;
                frame.push(self.call_method(*index, receiver, &args)?);
                ControlFlow::Continue
            }
            I::CallSuper { index, arg_count } | I::CallSuperVoid { index, arg_count } => {
                let args = frame.pop_n(*arg_count as usize)?;
                let request = resolve_multiname(&self.abc.constant_pool, *index, None, None)?;
                let receiver = frame.pop()?;
                let handle = self.object_handle(&receiver)?;
                let method_index = self.resolve_method_on(handle, &request)?;
                let result = self.call_method(method_index, Value::Object(handle), &args)?;
                if matches!(instruction, I::CallSuper { .. }) {
                    frame.push(result);
                }
                ControlFlow::Continue
            }
            I::ApplyType { arg_count } => {
                let _ = frame.pop_n(*arg_count as usize)?;
                // Parameterized-type application (e.g. Vector.<T>) collapses
                // to its base type: push the base back.
                ControlFlow::Continue
            }

            // --- Misc / unimplemented ------------------------------------------
            I::Dxns { .. } | I::DxnsLate | I::EscXAttr | I::EscXElem => {
                warn!("ignoring E4X-only opcode at pc {pc}");
                ControlFlow::Continue
            }
            I::Sxi1 | I::Sxi8 | I::Sxi16 => {
                debug!("stack sign-extension opcode treated as no-op at pc {pc}");
                ControlFlow::Continue
            }
        })
    }

    fn add(&self, a: Value, b: Value) -> Value {
        if let (Value::String(_), _) | (_, Value::String(_)) = (&a, &b) {
            Value::String(format!("{}{}", display_string(&a), display_string(&b)))
        } else {
            Value::Double(a.to_number() + b.to_number())
        }
    }

    fn binary_number(
        &self,
        frame: &mut Activation,
        op: impl Fn(f64, f64) -> f64,
    ) -> Result<ControlFlow, VmError> {
        let b = frame.pop()?;
        let a = frame.pop()?;
        frame.push(Value::Double(op(a.to_number(), b.to_number())));
        Ok(ControlFlow::Continue)
    }

    fn binary_int(&self, frame: &mut Activation, op: impl Fn(i32, i32) -> i32) -> Result<ControlFlow, VmError> {
        let b = frame.pop()?;
        let a = frame.pop()?;
        frame.push(Value::Integer(op(a.to_int32(), b.to_int32())));
        Ok(ControlFlow::Continue)
    }

    fn binary_shift(&self, frame: &mut Activation, op: impl Fn(i32, u32) -> i32) -> Result<ControlFlow, VmError> {
        let b = frame.pop()?.to_uint32() & 0x1F;
        let a = frame.pop()?.to_int32();
        frame.push(Value::Integer(op(a, b)));
        Ok(ControlFlow::Continue)
    }

    fn compare(&self, frame: &mut Activation, op: impl Fn(&Value, &Value) -> bool) -> Result<ControlFlow, VmError> {
        let b = frame.pop()?;
        let a = frame.pop()?;
        frame.push(Value::Bool(op(&a, &b)));
        Ok(ControlFlow::Continue)
    }

    fn compare_numeric(&self, frame: &mut Activation, op: impl Fn(f64, f64) -> bool) -> Result<ControlFlow, VmError> {
        let b = frame.pop()?;
        let a = frame.pop()?;
        frame.push(Value::Bool(op(a.to_number(), b.to_number())));
        Ok(ControlFlow::Continue)
    }

    fn branch_if(&self, frame: &mut Activation, offset: i32, pred: impl Fn(Value) -> bool) -> Result<ControlFlow, VmError> {
        let v = frame.pop()?;
        Ok(if pred(v) { ControlFlow::Jump(offset) } else { ControlFlow::Continue })
    }

    fn branch_binary(
        &self,
        frame: &mut Activation,
        offset: i32,
        pred: impl Fn(Value, Value) -> bool,
    ) -> Result<ControlFlow, VmError> {
        let b = frame.pop()?;
        let a = frame.pop()?;
        Ok(if pred(a, b) { ControlFlow::Jump(offset) } else { ControlFlow::Continue })
    }

    fn get_local_n(&self, frame: &mut Activation, index: u32) -> Result<ControlFlow, VmError> {
        frame.push(frame.register(index)?.clone());
        Ok(ControlFlow::Continue)
    }

    fn set_local_n(&self, frame: &mut Activation, index: u32) -> Result<ControlFlow, VmError> {
        let v = frame.pop()?;
        frame.set_register(index, v)?;
        Ok(ControlFlow::Continue)
    }

    fn string_constant(&self, index: u32) -> Result<String, RuntimeError> {
        self.abc
            .constant_pool
            .string(index)
            .map(str::to_owned)
            .ok_or(RuntimeError::PoolIndexOutOfRange { what: "string", index, len: self.abc.constant_pool.strings.len() })
    }

    fn namespace_constant(&self, ns_index: u32) -> Result<String, RuntimeError> {
        let ns = self
            .abc
            .constant_pool
            .namespace(ns_index)
            .ok_or(RuntimeError::PoolIndexOutOfRange { what: "namespace", index: ns_index, len: self.abc.constant_pool.namespaces.len() })?;
        if ns.name == 0 {
            return Ok(String::new());
        }
        self.string_constant(ns.name)
    }

    /// Pop whatever runtime operands a multiname needs off the stack, then
    /// resolve it (`spec.md` §4.D).
    fn pop_and_resolve(&self, frame: &mut Activation, multiname_index: u32) -> Result<NameRequest, VmError> {
        let multiname = self
            .abc
            .constant_pool
            .multiname(multiname_index)
            .ok_or(RuntimeError::PoolIndexOutOfRange {
                what: "multiname",
                index: multiname_index,
                len: self.abc.constant_pool.multinames.len(),
            })?;
        let (name, ns) = match multiname {
            Multiname::RtqName { .. } | Multiname::RtqNameA { .. } => (None, Some(frame.pop()?)),
            Multiname::RtqNameL | Multiname::RtqNameLA => {
                let ns = frame.pop()?;
                let name = frame.pop()?;
                (Some(name), Some(ns))
            }
            Multiname::MultinameL { .. } | Multiname::MultinameLA { .. } => (Some(frame.pop()?), None),
            _ => (None, None),
        };
        Ok(resolve_multiname(&self.abc.constant_pool, multiname_index, name.as_ref(), ns.as_ref())?)
    }

    fn object_handle(&self, value: &Value) -> Result<ObjectHandle, VmError> {
        match value {
            Value::Object(handle) => Ok(*handle),
            _ => Err(VmError::Runtime(RuntimeError::NotAnObject)),
        }
    }

    /// Walk the scope chain innermost-first, then the global object, for the
    /// first object carrying any candidate `(namespace, name)` pair
    /// (`spec.md` §4.G `findproperty`/`findpropstrict`).
    fn find_property_owner(&self, frame: &Activation, request: &NameRequest) -> Option<ObjectHandle> {
        frame
            .scopes_innermost_first()
            .find(|&handle| self.object_has_any(handle, request))
    }

    fn object_has_any(&self, handle: ObjectHandle, request: &NameRequest) -> bool {
        let Some(object) = self.arena.get(handle) else {
            return false;
        };
        if request.namespaces.is_empty() {
            object.keys().any(|(_, name)| name == &request.local_name)
        } else {
            request
                .namespaces
                .iter()
                .any(|ns| object.has(&(ns.clone(), request.local_name.clone())))
        }
    }

    /// `getproperty`: declared traits and dynamic properties are modeled
    /// uniformly in `RuntimeObject`'s property map (`spec.md` §4.E
    /// simplification, see `DESIGN.md`); missing + dynamic => `undefined`.
    fn get_property_on(&self, handle: ObjectHandle, request: &NameRequest) -> Result<Value, VmError> {
        let Some(object) = self.arena.get(handle) else {
            return Err(VmError::Runtime(RuntimeError::NotAnObject));
        };
        for ns in request.namespaces.iter().cloned().chain(std::iter::once(String::new())) {
            if let Some(value) = object.get(&(ns, request.local_name.clone())) {
                return Ok(value.clone());
            }
        }
        Ok(Value::Undefined)
    }

    fn set_property_on(&mut self, handle: ObjectHandle, request: &NameRequest, value: Value) -> Result<(), VmError> {
        let ns = request.namespaces.first().cloned().unwrap_or_default();
        let object = self.arena.get_mut(handle).ok_or(VmError::Runtime(RuntimeError::NotAnObject))?;
        object.set((ns, request.local_name.clone()), value);
        Ok(())
    }

    /// Resolve a `(namespace, name)` request against an object's class to a
    /// method index, for `callproperty`-family opcodes.
    fn resolve_method_on(&self, handle: ObjectHandle, request: &NameRequest) -> Result<MethodIndex, VmError> {
        let class_index = self
            .arena
            .get(handle)
            .and_then(|o| o.class_index)
            .ok_or_else(|| RuntimeError::ReferenceError(request.local_name.clone()))?;
        let instance = self
            .abc
            .instances
            .get(class_index as usize)
            .ok_or(RuntimeError::NoSuchClass(class_index))?;
        let qualified = qualified(request);
        let owner = self.linker.name_to_class.iter().find(|(_, &c)| c == class_index).map(|(n, _)| n.clone());
        let candidate = owner
            .map(|owner_name| format!("{owner_name}.{}", request.local_name))
            .unwrap_or(qualified);
        self.linker
            .name_to_method
            .get(&candidate)
            .copied()
            .or_else(|| {
                instance
                    .traits
                    .iter()
                    .find(|t| self.trait_local_name_matches(t.name, &request.local_name))
                    .and_then(|t| match &t.data {
                        swf::avm2::TraitData::Method { method_index, .. } => Some(*method_index),
                        _ => None,
                    })
            })
            .ok_or_else(|| VmError::Runtime(RuntimeError::ReferenceError(request.local_name.clone())))
    }

    fn trait_local_name_matches(&self, name_index: u32, local_name: &str) -> bool {
        resolve_multiname(&self.abc.constant_pool, name_index, None, None)
            .map(|r| r.local_name == local_name)
            .unwrap_or(false)
    }
}

fn qualified(request: &NameRequest) -> String {
    match request.namespaces.first() {
        Some(ns) if !ns.is_empty() => format!("{ns}.{}", request.local_name),
        _ => request.local_name.clone(),
    }
}

fn property_key(request: &NameRequest) -> PropertyKey {
    (request.namespaces.first().cloned().unwrap_or_default(), request.local_name.clone())
}

fn display_string(value: &Value) -> String {
    match value {
        Value::Undefined => "undefined".to_string(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Unsigned(u) => u.to_string(),
        Value::Double(d) => d.to_string(),
        Value::String(s) => s.clone(),
        Value::Namespace(ns) => ns.clone(),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

fn type_of(value: &Value) -> &'static str {
    match value {
        Value::Undefined => "undefined",
        Value::Null => "object",
        Value::Bool(_) => "boolean",
        Value::Integer(_) | Value::Unsigned(_) | Value::Double(_) => "number",
        Value::String(_) => "string",
        Value::Namespace(_) => "namespace",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swf::avm2::{
        ClassFlags, ClassInfo, ConstantPool, InstanceInfo, MethodBodyInfo, MethodInfo, Namespace, NamespaceKind,
        ScriptInfo, TraitAttributes, TraitData, TraitInfo, TraitKind,
    };

    /// One class, "Battle.Core", with two instance methods
    /// (`getElementalPenetration`, `hitrateIntensity`) and a class-side
    /// initializer that stamps an `initCount` slot on the class object.
    fn fixture() -> AbcFile<'static> {
        let constant_pool = ConstantPool {
            integers: vec![0],
            unsigned_integers: vec![0],
            doubles: vec![f64::NAN],
            strings: vec!["", "Battle", "Core", "getElementalPenetration", "hitrateIntensity", "initCount"],
            namespaces: vec![
                Namespace { kind: NamespaceKind::PrivateNs, name: 0 },
                Namespace { kind: NamespaceKind::PackageNamespace, name: 1 },
            ],
            ns_sets: vec![],
            multinames: vec![
                Multiname::QName { ns: 0, name: 0 },
                Multiname::QName { ns: 1, name: 2 }, // Battle.Core
                Multiname::QName { ns: 0, name: 3 }, // getElementalPenetration
                Multiname::QName { ns: 0, name: 4 }, // hitrateIntensity
                Multiname::QName { ns: 0, name: 5 }, // initCount
            ],
        };

        let trivial_method = || MethodInfo {
            param_count: 0,
            return_type: 0,
            param_types: vec![],
            name: 0,
            flags: MethodFlags::empty(),
            options: vec![],
            param_names: vec![],
        };
        let binary_method = || MethodInfo {
            param_count: 2,
            return_type: 0,
            param_types: vec![0, 0],
            name: 0,
            flags: MethodFlags::empty(),
            options: vec![],
            param_names: vec![],
        };

        let methods = vec![
            trivial_method(),  // 0: instance init
            binary_method(),   // 1: getElementalPenetration
            trivial_method(),  // 2: class init
            trivial_method(),  // 3: script init
            binary_method(),   // 4: hitrateIntensity
        ];

        // getlocal1; getlocal2; iflt +3; getlocal1; returnvalue; pushbyte 1; returnvalue
        let get_elemental_penetration: &[u8] =
            &[0x62, 0x01, 0x62, 0x02, 0x15, 0x03, 0x00, 0x00, 0x62, 0x01, 0x48, 0x24, 0x01, 0x48];
        // getlocal1; getlocal2; divide; returnvalue
        let hitrate_intensity: &[u8] = &[0x62, 0x01, 0x62, 0x02, 0xA3, 0x48];
        // getlocal0; pushbyte 1; setproperty initCount; returnvoid
        let class_init_code: &[u8] = &[0xD0, 0x24, 0x01, 0x61, 0x04, 0x47];
        let returnvoid: &[u8] = &[0x47];

        let method_bodies = vec![
            MethodBodyInfo {
                method: 0,
                max_stack: 1,
                local_count: 1,
                init_scope_depth: 0,
                max_scope_depth: 1,
                code: returnvoid,
                exceptions: vec![],
                traits: vec![],
            },
            MethodBodyInfo {
                method: 1,
                max_stack: 4,
                local_count: 3,
                init_scope_depth: 0,
                max_scope_depth: 1,
                code: get_elemental_penetration,
                exceptions: vec![],
                traits: vec![],
            },
            MethodBodyInfo {
                method: 2,
                max_stack: 2,
                local_count: 1,
                init_scope_depth: 0,
                max_scope_depth: 1,
                code: class_init_code,
                exceptions: vec![],
                traits: vec![],
            },
            MethodBodyInfo {
                method: 3,
                max_stack: 1,
                local_count: 1,
                init_scope_depth: 0,
                max_scope_depth: 1,
                code: returnvoid,
                exceptions: vec![],
                traits: vec![],
            },
            MethodBodyInfo {
                method: 4,
                max_stack: 4,
                local_count: 3,
                init_scope_depth: 0,
                max_scope_depth: 1,
                code: hitrate_intensity,
                exceptions: vec![],
                traits: vec![],
            },
        ];

        let instance = InstanceInfo {
            name: 1,
            super_name: 0,
            flags: ClassFlags::empty(),
            protected_ns: None,
            interfaces: vec![],
            init: 0,
            traits: vec![
                TraitInfo {
                    name: 2,
                    kind: TraitKind::Method,
                    attributes: TraitAttributes::empty(),
                    data: TraitData::Method { disp_id: 0, method_index: 1 },
                    metadata: vec![],
                },
                TraitInfo {
                    name: 3,
                    kind: TraitKind::Method,
                    attributes: TraitAttributes::empty(),
                    data: TraitData::Method { disp_id: 0, method_index: 4 },
                    metadata: vec![],
                },
            ],
        };
        let class = ClassInfo { init: 2, traits: vec![] };
        let script = ScriptInfo {
            init: 3,
            traits: vec![TraitInfo {
                name: 1,
                kind: TraitKind::Class,
                attributes: TraitAttributes::empty(),
                data: TraitData::Class { slot_id: 0, class_index: 0 },
                metadata: vec![],
            }],
        };

        AbcFile {
            minor_version: 16,
            major_version: 46,
            constant_pool,
            methods,
            metadata: vec![],
            instances: vec![instance],
            classes: vec![class],
            scripts: vec![script],
            method_bodies,
        }
    }

    #[test]
    fn lookup_class_and_method_resolve_qualified_names() {
        let abc = fixture();
        let vm = VirtualMachine::new(&abc).unwrap();
        assert_eq!(vm.lookup_class("Battle.Core"), Some(0));
        assert_eq!(vm.lookup_method("Battle.Core.getElementalPenetration"), Some(1));
        assert_eq!(vm.lookup_method("Battle.Core.hitrateIntensity"), Some(4));
    }

    #[test]
    fn get_elemental_penetration_branches_on_comparison() {
        let abc = fixture();
        let mut vm = VirtualMachine::new(&abc).unwrap();
        let method = vm.lookup_method("Battle.Core.getElementalPenetration").unwrap();

        let result = vm.call_method(method, Value::Undefined, &[Value::Integer(2), Value::Integer(300_000)]).unwrap();
        assert_eq!(result, Value::Integer(1));

        let result = vm.call_method(method, Value::Undefined, &[Value::Integer(42), Value::Integer(-100_500)]).unwrap();
        assert_eq!(result, Value::Integer(42));
    }

    #[test]
    fn hitrate_intensity_divides_and_promotes_to_double() {
        let abc = fixture();
        let mut vm = VirtualMachine::new(&abc).unwrap();
        let method = vm.lookup_method("Battle.Core.hitrateIntensity").unwrap();
        let result = vm.call_method(method, Value::Undefined, &[Value::Integer(4), Value::Integer(8)]).unwrap();
        assert_eq!(result, Value::Double(0.5));
    }

    #[test]
    fn new_instance_initializes_class_exactly_once() {
        let abc = fixture();
        let mut vm = VirtualMachine::new(&abc).unwrap();

        let first = vm.new_instance(0, &[]).unwrap();
        let second = vm.new_instance(0, &[]).unwrap();
        assert_ne!(first, second);

        let class_handle = *vm.class_objects.get(&0).unwrap();
        let init_count = vm
            .arena
            .get(class_handle)
            .and_then(|o| o.get(&("".to_string(), "initCount".to_string())))
            .cloned();
        // The class initializer runs once no matter how many instances are
        // constructed afterward.
        assert_eq!(init_count, Some(Value::Integer(1)));
    }

    #[test]
    fn call_entry_point_runs_the_last_script_exactly_once() {
        let abc = fixture();
        let mut vm = VirtualMachine::new(&abc).unwrap();
        vm.call_entry_point().unwrap();
        assert!(vm.script_objects.contains_key(&0));
        // Re-entering must not rebuild the script's global object.
        let object = *vm.script_objects.get(&0).unwrap();
        vm.call_entry_point().unwrap();
        assert_eq!(*vm.script_objects.get(&0).unwrap(), object);
    }

    /// A standalone single-method module whose only method has an exception
    /// table, used to exercise `throw` independently of `fixture()`'s class.
    fn throwing_method_abc(exceptions: Vec<swf::avm2::ExceptionInfo>, code: &'static [u8]) -> AbcFile<'static> {
        let method = MethodInfo {
            param_count: 0,
            return_type: 0,
            param_types: vec![],
            name: 0,
            flags: MethodFlags::empty(),
            options: vec![],
            param_names: vec![],
        };
        let body = MethodBodyInfo {
            method: 0,
            max_stack: 4,
            local_count: 1,
            init_scope_depth: 0,
            max_scope_depth: 1,
            code,
            exceptions,
            traits: vec![],
        };
        AbcFile {
            minor_version: 16,
            major_version: 46,
            constant_pool: ConstantPool {
                integers: vec![0],
                unsigned_integers: vec![0],
                doubles: vec![f64::NAN],
                strings: vec![""],
                namespaces: vec![Namespace { kind: NamespaceKind::PrivateNs, name: 0 }],
                ns_sets: vec![],
                multinames: vec![Multiname::QName { ns: 0, name: 0 }],
            },
            methods: vec![method],
            metadata: vec![],
            instances: vec![],
            classes: vec![],
            scripts: vec![],
            method_bodies: vec![body],
        }
    }

    #[test]
    fn throw_is_caught_by_its_exception_record_target() {
        // pushbyte 1; throw; [target=3] pop; pushbyte 99; returnvalue
        let code: &[u8] = &[0x24, 0x01, 0x03, 0x29, 0x24, 0x63, 0x48];
        let exceptions = vec![swf::avm2::ExceptionInfo { from: 0, to: 3, target: 3, exc_type: 0, var_name: 0 }];
        let abc = throwing_method_abc(exceptions, code);
        let mut vm = VirtualMachine::new(&abc).unwrap();
        let result = vm.call_method(0, Value::Object(vm.global_object()), &[]).unwrap();
        assert_eq!(result, Value::Integer(99));
    }

    #[test]
    fn throw_with_no_matching_record_propagates_to_the_caller() {
        // pushbyte 1; throw
        let code: &[u8] = &[0x24, 0x01, 0x03];
        let abc = throwing_method_abc(vec![], code);
        let mut vm = VirtualMachine::new(&abc).unwrap();
        let err = vm.call_method(0, Value::Object(vm.global_object()), &[]).unwrap_err();
        assert!(matches!(err, VmError::Thrown(Value::Integer(1))));
    }
}

