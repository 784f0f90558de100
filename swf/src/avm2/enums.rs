//! Byte-tag enums used throughout the ABC wire format.

use num_derive::FromPrimitive;

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum NamespaceKind {
    Namespace = 0x08,
    PackageNamespace = 0x16,
    PackageInternalNs = 0x17,
    ProtectedNamespace = 0x18,
    ExplicitNamespace = 0x19,
    StaticProtectedNs = 0x1A,
    PrivateNs = 0x05,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum MultinameKind {
    QName = 0x07,
    QNameA = 0x0D,
    RtqName = 0x0F,
    RtqNameA = 0x10,
    RtqNameL = 0x11,
    RtqNameLA = 0x12,
    Multiname = 0x09,
    MultinameA = 0x0E,
    MultinameL = 0x1B,
    MultinameLA = 0x1C,
    TypeName = 0x1D,
}

/// Tag byte for a constant-pool-indexed default/option value.
///
/// The `Namespace*` variants share their byte values with `NamespaceKind`;
/// they denote "this default value is a namespace of kind X", not a distinct
/// tag space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum ConstantKind {
    Undefined = 0x00,
    Utf8 = 0x01,
    Int = 0x03,
    UInt = 0x04,
    PrivateNs = 0x05,
    Double = 0x06,
    Namespace = 0x08,
    True = 0x0B,
    False = 0x0A,
    Null = 0x0C,
    PackageNamespace = 0x16,
    PackageInternalNs = 0x17,
    ProtectedNamespace = 0x18,
    ExplicitNamespace = 0x19,
    StaticProtectedNs = 0x1A,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum TraitKind {
    Slot = 0,
    Method = 1,
    Getter = 2,
    Setter = 3,
    Class = 4,
    Function = 5,
    Const = 6,
}
