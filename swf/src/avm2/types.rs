//! The ABC (ActionScript Bytecode) file data model.
//!
//! Everything here borrows from the buffer the `AbcFile` was parsed from —
//! strings are `&str` slices and method bodies carry their raw code as
//! `&[u8]` — so parsing never copies the bytecode itself (`spec.md` design
//! note on borrowed vs. owned bytes). The `AbcFile`'s lifetime parameter
//! therefore has to outlive anything built from it, including a running VM.

use bitflags::bitflags;

use super::enums::{ConstantKind, MultinameKind, NamespaceKind, TraitKind};

/// Index into one of the constant pool's seven tables. Index 0 is always the
/// implicit sentinel entry for that table (`spec.md` §3 invariant 1).
pub type PoolIndex = u32;
pub type MethodIndex = u32;
pub type ClassIndex = u32;
pub type ScriptIndex = u32;

#[derive(Debug, Clone)]
pub struct AbcFile<'a> {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool<'a>,
    pub methods: Vec<MethodInfo>,
    pub metadata: Vec<MetadataInfo>,
    pub instances: Vec<InstanceInfo>,
    pub classes: Vec<ClassInfo>,
    pub scripts: Vec<ScriptInfo>,
    pub method_bodies: Vec<MethodBodyInfo<'a>>,
}

impl<'a> AbcFile<'a> {
    /// The entry-point script: the last one in the script table
    /// (`spec.md` §3, "the last script is the entry point").
    pub fn entry_point_script(&self) -> Option<ScriptIndex> {
        if self.scripts.is_empty() {
            None
        } else {
            Some((self.scripts.len() - 1) as ScriptIndex)
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConstantPool<'a> {
    pub integers: Vec<i32>,
    pub unsigned_integers: Vec<u32>,
    pub doubles: Vec<f64>,
    pub strings: Vec<&'a str>,
    pub namespaces: Vec<Namespace>,
    pub ns_sets: Vec<NamespaceSet>,
    pub multinames: Vec<Multiname>,
}

impl<'a> ConstantPool<'a> {
    pub fn string(&self, index: PoolIndex) -> Option<&'a str> {
        self.strings.get(index as usize).copied()
    }

    pub fn namespace(&self, index: PoolIndex) -> Option<&Namespace> {
        self.namespaces.get(index as usize)
    }

    pub fn ns_set(&self, index: PoolIndex) -> Option<&NamespaceSet> {
        self.ns_sets.get(index as usize)
    }

    pub fn multiname(&self, index: PoolIndex) -> Option<&Multiname> {
        self.multinames.get(index as usize)
    }

    pub fn int(&self, index: PoolIndex) -> Option<i32> {
        self.integers.get(index as usize).copied()
    }

    pub fn uint(&self, index: PoolIndex) -> Option<u32> {
        self.unsigned_integers.get(index as usize).copied()
    }

    pub fn double(&self, index: PoolIndex) -> Option<f64> {
        self.doubles.get(index as usize).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Namespace {
    pub kind: NamespaceKind,
    pub name: PoolIndex,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceSet {
    pub namespaces: Vec<PoolIndex>,
}

/// A name that may bundle multiple candidate namespaces, or defer the
/// namespace and/or name to the operand stack at use time (`spec.md` §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Multiname {
    QName { ns: PoolIndex, name: PoolIndex },
    QNameA { ns: PoolIndex, name: PoolIndex },
    RtqName { name: PoolIndex },
    RtqNameA { name: PoolIndex },
    RtqNameL,
    RtqNameLA,
    Multiname { name: PoolIndex, ns_set: PoolIndex },
    MultinameA { name: PoolIndex, ns_set: PoolIndex },
    MultinameL { ns_set: PoolIndex },
    MultinameLA { ns_set: PoolIndex },
    TypeName { q_name: PoolIndex, params: Vec<PoolIndex> },
}

impl Multiname {
    /// Does this multiname's kind carry the `A` (attribute name, E4X)
    /// marker? Lookup semantics are otherwise identical (`spec.md` §3).
    pub fn is_attribute(&self) -> bool {
        matches!(
            self,
            Multiname::QNameA { .. } | Multiname::RtqNameA { .. } | Multiname::RtqNameLA
                | Multiname::MultinameA { .. } | Multiname::MultinameLA { .. }
        )
    }

    /// Whether resolving this multiname needs one or two values popped off
    /// the operand stack (an L- or RT- form).
    pub fn runtime_operand_count(&self) -> usize {
        match self {
            Multiname::RtqName { .. } | Multiname::RtqNameA { .. } => 1,
            Multiname::RtqNameL | Multiname::RtqNameLA => 2,
            Multiname::MultinameL { .. } | Multiname::MultinameLA { .. } => 1,
            _ => 0,
        }
    }
}

bitflags! {
    pub struct MethodFlags: u8 {
        const NEED_ARGUMENTS = 0x01;
        const NEED_ACTIVATION = 0x02;
        const NEED_REST = 0x04;
        const HAS_OPTIONAL = 0x08;
        const SET_DXNS = 0x40;
        const HAS_PARAM_NAMES = 0x80;
    }
}

#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub param_count: u32,
    pub return_type: PoolIndex,
    pub param_types: Vec<PoolIndex>,
    pub name: PoolIndex,
    pub flags: MethodFlags,
    pub options: Vec<OptionDetail>,
    pub param_names: Vec<PoolIndex>,
}

#[derive(Debug, Clone, Copy)]
pub struct OptionDetail {
    pub value_index: PoolIndex,
    pub kind: ConstantKind,
}

#[derive(Debug, Clone)]
pub struct MetadataInfo {
    pub name: PoolIndex,
    pub items: Vec<ItemInfo>,
}

#[derive(Debug, Clone, Copy)]
pub struct ItemInfo {
    pub key: PoolIndex,
    pub value: PoolIndex,
}

bitflags! {
    pub struct ClassFlags: u8 {
        const SEALED = 0x01;
        const FINAL = 0x02;
        const INTERFACE = 0x04;
        const PROTECTED_NS = 0x08;
    }
}

#[derive(Debug, Clone)]
pub struct InstanceInfo {
    pub name: PoolIndex,
    pub super_name: PoolIndex,
    pub flags: ClassFlags,
    pub protected_ns: Option<PoolIndex>,
    pub interfaces: Vec<PoolIndex>,
    pub init: MethodIndex,
    pub traits: Vec<TraitInfo>,
}

bitflags! {
    pub struct TraitAttributes: u8 {
        const FINAL = 0x1;
        const OVERRIDE = 0x2;
        const METADATA = 0x4;
    }
}

#[derive(Debug, Clone)]
pub struct TraitInfo {
    pub name: PoolIndex,
    pub kind: TraitKind,
    pub attributes: TraitAttributes,
    pub data: TraitData,
    pub metadata: Vec<PoolIndex>,
}

#[derive(Debug, Clone)]
pub enum TraitData {
    Slot {
        slot_id: u32,
        type_name: PoolIndex,
        value_index: PoolIndex,
        value_kind: Option<ConstantKind>,
    },
    Class {
        slot_id: u32,
        class_index: ClassIndex,
    },
    Function {
        slot_id: u32,
        method_index: MethodIndex,
    },
    Method {
        disp_id: u32,
        method_index: MethodIndex,
    },
}

#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub init: MethodIndex,
    pub traits: Vec<TraitInfo>,
}

#[derive(Debug, Clone)]
pub struct ScriptInfo {
    pub init: MethodIndex,
    pub traits: Vec<TraitInfo>,
}

#[derive(Debug, Clone)]
pub struct MethodBodyInfo<'a> {
    pub method: MethodIndex,
    pub max_stack: u32,
    pub local_count: u32,
    pub init_scope_depth: u32,
    pub max_scope_depth: u32,
    pub code: &'a [u8],
    pub exceptions: Vec<ExceptionInfo>,
    pub traits: Vec<TraitInfo>,
}

#[derive(Debug, Clone, Copy)]
pub struct ExceptionInfo {
    pub from: u32,
    pub to: u32,
    pub target: u32,
    pub exc_type: PoolIndex,
    pub var_name: PoolIndex,
}
