//! The instruction decoder (`spec.md` §4.C).
//!
//! One opcode byte selects a fixed operand schema; `decode_instruction` reads
//! exactly that schema off a `Reader` and returns a tagged `Instruction`.
//! This is a re-architecture of the source's class-per-opcode-with-registry
//! pattern (`original_source/avm2/abc/instructions.py`) into a single sum
//! type with a `match`-based decoder — no virtual dispatch, no per-opcode
//! struct.
//!
//! Branch offsets are read verbatim here; whether they're relative to the
//! post-operand PC or to the opcode byte itself (`lookupswitch`'s exception)
//! is the execution engine's concern, not the decoder's (`spec.md` §4.C).

use super::error::DecodeError;
use crate::reader::Reader;

pub type PoolIndex = u32;

/// One decoded AVM2 instruction, tagged by its opcode byte.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Bkpt,
    Nop,
    Throw,
    GetSuper { index: PoolIndex },
    SetSuper { index: PoolIndex },
    Dxns { index: PoolIndex },
    DxnsLate,
    Kill { index: u32 },
    Label,
    IfNlt { offset: i32 },
    IfNle { offset: i32 },
    IfNgt { offset: i32 },
    IfNge { offset: i32 },
    Jump { offset: i32 },
    IfTrue { offset: i32 },
    IfFalse { offset: i32 },
    IfEq { offset: i32 },
    IfNe { offset: i32 },
    IfLt { offset: i32 },
    IfLe { offset: i32 },
    IfGt { offset: i32 },
    IfGe { offset: i32 },
    IfStrictEq { offset: i32 },
    IfStrictNe { offset: i32 },
    LookupSwitch { default_offset: i32, case_offsets: Vec<i32> },
    PushWith,
    PopScope,
    NextName,
    HasNext,
    PushNull,
    PushUndefined,
    NextValue,
    PushByte { value: i8 },
    PushShort { value: i32 },
    PushTrue,
    PushFalse,
    PushNan,
    Pop,
    Dup,
    Swap,
    PushString { index: PoolIndex },
    PushInt { index: PoolIndex },
    PushUint { index: PoolIndex },
    PushDouble { index: PoolIndex },
    PushScope,
    PushNamespace { index: PoolIndex },
    HasNext2 { object_reg: u32, index_reg: u32 },
    NewFunction { index: PoolIndex },
    Call { arg_count: u32 },
    Construct { arg_count: u32 },
    CallMethod { index: u32, arg_count: u32 },
    CallStatic { index: PoolIndex, arg_count: u32 },
    CallSuper { index: PoolIndex, arg_count: u32 },
    CallProperty { index: PoolIndex, arg_count: u32 },
    ReturnVoid,
    ReturnValue,
    ConstructSuper { arg_count: u32 },
    ConstructProp { index: PoolIndex, arg_count: u32 },
    CallPropLex { index: PoolIndex, arg_count: u32 },
    CallSuperVoid { index: PoolIndex, arg_count: u32 },
    CallPropVoid { index: PoolIndex, arg_count: u32 },
    Sxi1,
    Sxi8,
    Sxi16,
    ApplyType { arg_count: u32 },
    NewObject { arg_count: u32 },
    NewArray { arg_count: u32 },
    NewActivation,
    NewClass { index: u32 },
    GetDescendants { index: PoolIndex },
    NewCatch { index: u32 },
    FindPropGlobalStrict { index: PoolIndex },
    FindPropGlobal { index: PoolIndex },
    FindPropStrict { index: PoolIndex },
    FindProperty { index: PoolIndex },
    FindDef { index: PoolIndex },
    GetLex { index: PoolIndex },
    SetProperty { index: PoolIndex },
    GetLocal { index: u32 },
    SetLocal { index: u32 },
    GetGlobalScope,
    GetScopeObject { index: u8 },
    GetProperty { index: PoolIndex },
    InitProperty { index: PoolIndex },
    DeleteProperty { index: PoolIndex },
    GetSlot { slot_index: u32 },
    SetSlot { slot_index: u32 },
    GetGlobalSlot { slot_index: u32 },
    SetGlobalSlot { slot_index: u32 },
    ConvertString,
    EscXElem,
    EscXAttr,
    ConvertInteger,
    ConvertUnsignedInteger,
    ConvertDouble,
    ConvertBoolean,
    ConvertObject,
    CheckFilter,
    Coerce { index: PoolIndex },
    CoerceAny,
    CoerceString,
    AsType { index: PoolIndex },
    AsTypeLate,
    Negate,
    Increment,
    IncLocal { index: u32 },
    Decrement,
    DecLocal { index: u32 },
    TypeOf,
    Not,
    BitNot,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    LShift,
    RShift,
    URShift,
    BitAnd,
    BitOr,
    BitXor,
    Equals,
    StrictEquals,
    LessThan,
    LessEquals,
    GreaterThan,
    GreaterEquals,
    InstanceOf,
    IsType { index: PoolIndex },
    IsTypeLate,
    In,
    IncrementInteger,
    DecrementInteger,
    NegateInteger,
    AddInteger,
    SubtractInteger,
    MultiplyInteger,
    GetLocal0,
    GetLocal1,
    GetLocal2,
    GetLocal3,
    SetLocal0,
    SetLocal1,
    SetLocal2,
    SetLocal3,
    Debug { debug_type: u8, index: PoolIndex, register: u8, extra: u32 },
    DebugLine { line_number: u32 },
    DebugFile { index: PoolIndex },
    BkptLine { line_number: u32 },
    Timestamp,
}

/// Decode one instruction from `reader`'s current position.
pub fn decode_instruction(reader: &mut Reader<'_>) -> Result<Instruction, DecodeError> {
    let offset = reader.position();
    let opcode = read_u8(reader, offset)?;

    Ok(match opcode {
        0x01 => Instruction::Bkpt,
        0x02 => Instruction::Nop,
        0x03 => Instruction::Throw,
        0x04 => Instruction::GetSuper { index: read_u30(reader, offset)? },
        0x05 => Instruction::SetSuper { index: read_u30(reader, offset)? },
        0x06 => Instruction::Dxns { index: read_u30(reader, offset)? },
        0x07 => Instruction::DxnsLate,
        0x08 => Instruction::Kill { index: read_u30(reader, offset)? },
        0x09 => Instruction::Label,
        0x0C => Instruction::IfNlt { offset: read_s24(reader, offset)? },
        0x0D => Instruction::IfNle { offset: read_s24(reader, offset)? },
        0x0E => Instruction::IfNgt { offset: read_s24(reader, offset)? },
        0x0F => Instruction::IfNge { offset: read_s24(reader, offset)? },
        0x10 => Instruction::Jump { offset: read_s24(reader, offset)? },
        0x11 => Instruction::IfTrue { offset: read_s24(reader, offset)? },
        0x12 => Instruction::IfFalse { offset: read_s24(reader, offset)? },
        0x13 => Instruction::IfEq { offset: read_s24(reader, offset)? },
        0x14 => Instruction::IfNe { offset: read_s24(reader, offset)? },
        0x15 => Instruction::IfLt { offset: read_s24(reader, offset)? },
        0x16 => Instruction::IfLe { offset: read_s24(reader, offset)? },
        0x17 => Instruction::IfGt { offset: read_s24(reader, offset)? },
        0x18 => Instruction::IfGe { offset: read_s24(reader, offset)? },
        0x19 => Instruction::IfStrictEq { offset: read_s24(reader, offset)? },
        0x1A => Instruction::IfStrictNe { offset: read_s24(reader, offset)? },
        0x1B => {
            let default_offset = read_s24(reader, offset)?;
            let case_count = read_u30(reader, offset)?;
            let mut case_offsets = Vec::with_capacity(case_count as usize + 1);
            for _ in 0..=case_count {
                case_offsets.push(read_s24(reader, offset)?);
            }
            Instruction::LookupSwitch { default_offset, case_offsets }
        }
        0x1C => Instruction::PushWith,
        0x1D => Instruction::PopScope,
        0x1E => Instruction::NextName,
        0x1F => Instruction::HasNext,
        0x20 => Instruction::PushNull,
        0x21 => Instruction::PushUndefined,
        0x23 => Instruction::NextValue,
        0x24 => Instruction::PushByte { value: read_u8(reader, offset)? as i8 },
        0x25 => Instruction::PushShort { value: read_u30(reader, offset)? as i32 },
        0x26 => Instruction::PushTrue,
        0x27 => Instruction::PushFalse,
        0x28 => Instruction::PushNan,
        0x29 => Instruction::Pop,
        0x2A => Instruction::Dup,
        0x2B => Instruction::Swap,
        0x2C => Instruction::PushString { index: read_u30(reader, offset)? },
        0x2D => Instruction::PushInt { index: read_u30(reader, offset)? },
        0x2E => Instruction::PushUint { index: read_u30(reader, offset)? },
        0x2F => Instruction::PushDouble { index: read_u30(reader, offset)? },
        0x30 => Instruction::PushScope,
        0x31 => Instruction::PushNamespace { index: read_u30(reader, offset)? },
        0x32 => Instruction::HasNext2 {
            object_reg: read_u30(reader, offset)?,
            index_reg: read_u30(reader, offset)?,
        },
        0x40 => Instruction::NewFunction { index: read_u30(reader, offset)? },
        0x41 => Instruction::Call { arg_count: read_u30(reader, offset)? },
        0x42 => Instruction::Construct { arg_count: read_u30(reader, offset)? },
        0x43 => Instruction::CallMethod {
            index: read_u30(reader, offset)?,
            arg_count: read_u30(reader, offset)?,
        },
        0x44 => Instruction::CallStatic {
            index: read_u30(reader, offset)?,
            arg_count: read_u30(reader, offset)?,
        },
        0x45 => Instruction::CallSuper {
            index: read_u30(reader, offset)?,
            arg_count: read_u30(reader, offset)?,
        },
        0x46 => Instruction::CallProperty {
            index: read_u30(reader, offset)?,
            arg_count: read_u30(reader, offset)?,
        },
        0x47 => Instruction::ReturnVoid,
        0x48 => Instruction::ReturnValue,
        // See `spec.md` §9 Open Question (a): 0x49 is `constructsuper`, a
        // distinct opcode from 0x42 `construct` despite both taking a single
        // arg_count operand.
        0x49 => Instruction::ConstructSuper { arg_count: read_u30(reader, offset)? },
        0x4A => Instruction::ConstructProp {
            index: read_u30(reader, offset)?,
            arg_count: read_u30(reader, offset)?,
        },
        0x4C => Instruction::CallPropLex {
            index: read_u30(reader, offset)?,
            arg_count: read_u30(reader, offset)?,
        },
        0x4E => Instruction::CallSuperVoid {
            index: read_u30(reader, offset)?,
            arg_count: read_u30(reader, offset)?,
        },
        0x4F => Instruction::CallPropVoid {
            index: read_u30(reader, offset)?,
            arg_count: read_u30(reader, offset)?,
        },
        0x50 => Instruction::Sxi1,
        0x51 => Instruction::Sxi8,
        0x52 => Instruction::Sxi16,
        0x53 => Instruction::ApplyType { arg_count: read_u30(reader, offset)? },
        0x55 => Instruction::NewObject { arg_count: read_u30(reader, offset)? },
        0x56 => Instruction::NewArray { arg_count: read_u30(reader, offset)? },
        0x57 => Instruction::NewActivation,
        0x58 => Instruction::NewClass { index: read_u30(reader, offset)? },
        0x59 => Instruction::GetDescendants { index: read_u30(reader, offset)? },
        0x5A => Instruction::NewCatch { index: read_u30(reader, offset)? },
        0x5B => Instruction::FindPropGlobalStrict { index: read_u30(reader, offset)? },
        0x5C => Instruction::FindPropGlobal { index: read_u30(reader, offset)? },
        0x5D => Instruction::FindPropStrict { index: read_u30(reader, offset)? },
        0x5E => Instruction::FindProperty { index: read_u30(reader, offset)? },
        0x5F => Instruction::FindDef { index: read_u30(reader, offset)? },
        0x60 => Instruction::GetLex { index: read_u30(reader, offset)? },
        0x61 => Instruction::SetProperty { index: read_u30(reader, offset)? },
        0x62 => Instruction::GetLocal { index: read_u30(reader, offset)? },
        0x63 => Instruction::SetLocal { index: read_u30(reader, offset)? },
        0x64 => Instruction::GetGlobalScope,
        0x65 => Instruction::GetScopeObject { index: read_u8(reader, offset)? },
        0x66 => Instruction::GetProperty { index: read_u30(reader, offset)? },
        0x68 => Instruction::InitProperty { index: read_u30(reader, offset)? },
        0x6A => Instruction::DeleteProperty { index: read_u30(reader, offset)? },
        0x6C => Instruction::GetSlot { slot_index: read_u30(reader, offset)? },
        0x6D => Instruction::SetSlot { slot_index: read_u30(reader, offset)? },
        0x6E => Instruction::GetGlobalSlot { slot_index: read_u30(reader, offset)? },
        0x6F => Instruction::SetGlobalSlot { slot_index: read_u30(reader, offset)? },
        0x70 => Instruction::ConvertString,
        0x71 => Instruction::EscXElem,
        0x72 => Instruction::EscXAttr,
        0x73 => Instruction::ConvertInteger,
        0x74 => Instruction::ConvertUnsignedInteger,
        0x75 => Instruction::ConvertDouble,
        0x76 => Instruction::ConvertBoolean,
        0x77 => Instruction::ConvertObject,
        0x78 => Instruction::CheckFilter,
        0x80 => Instruction::Coerce { index: read_u30(reader, offset)? },
        0x82 => Instruction::CoerceAny,
        0x85 => Instruction::CoerceString,
        0x86 => Instruction::AsType { index: read_u30(reader, offset)? },
        0x87 => Instruction::AsTypeLate,
        0x90 => Instruction::Negate,
        0x91 => Instruction::Increment,
        0x92 => Instruction::IncLocal { index: read_u30(reader, offset)? },
        0x93 => Instruction::Decrement,
        0x94 => Instruction::DecLocal { index: read_u30(reader, offset)? },
        0x95 => Instruction::TypeOf,
        0x96 => Instruction::Not,
        0x97 => Instruction::BitNot,
        0xA0 => Instruction::Add,
        0xA1 => Instruction::Subtract,
        0xA2 => Instruction::Multiply,
        0xA3 => Instruction::Divide,
        0xA4 => Instruction::Modulo,
        0xA5 => Instruction::LShift,
        0xA6 => Instruction::RShift,
        0xA7 => Instruction::URShift,
        0xA8 => Instruction::BitAnd,
        0xA9 => Instruction::BitOr,
        0xAA => Instruction::BitXor,
        0xAB => Instruction::Equals,
        0xAC => Instruction::StrictEquals,
        0xAD => Instruction::LessThan,
        0xAE => Instruction::LessEquals,
        0xAF => Instruction::GreaterThan,
        0xB0 => Instruction::GreaterEquals,
        0xB1 => Instruction::InstanceOf,
        0xB2 => Instruction::IsType { index: read_u30(reader, offset)? },
        0xB3 => Instruction::IsTypeLate,
        0xB4 => Instruction::In,
        0xC0 => Instruction::IncrementInteger,
        0xC1 => Instruction::DecrementInteger,
        0xC2 => Instruction::NegateInteger,
        0xC5 => Instruction::AddInteger,
        0xC6 => Instruction::SubtractInteger,
        0xC7 => Instruction::MultiplyInteger,
        0xD0 => Instruction::GetLocal0,
        0xD1 => Instruction::GetLocal1,
        0xD2 => Instruction::GetLocal2,
        0xD3 => Instruction::GetLocal3,
        0xD4 => Instruction::SetLocal0,
        0xD5 => Instruction::SetLocal1,
        0xD6 => Instruction::SetLocal2,
        0xD7 => Instruction::SetLocal3,
        0xEF => Instruction::Debug {
            debug_type: read_u8(reader, offset)?,
            index: read_u30(reader, offset)?,
            register: read_u8(reader, offset)?,
            extra: read_u30(reader, offset)?,
        },
        0xF0 => Instruction::DebugLine { line_number: read_u30(reader, offset)? },
        0xF1 => Instruction::DebugFile { index: read_u30(reader, offset)? },
        0xF2 => Instruction::BkptLine { line_number: read_u30(reader, offset)? },
        0xF3 => Instruction::Timestamp,
        other => return Err(DecodeError::BadOpcode { opcode: other, offset }),
    })
}

fn map_err(offset: usize) -> impl Fn(crate::error::ReadError) -> DecodeError {
    move |source| DecodeError::Truncated { offset, source }
}

fn read_u8(reader: &mut Reader<'_>, offset: usize) -> Result<u8, DecodeError> {
    reader.read_u8().map_err(map_err(offset))
}

fn read_u30(reader: &mut Reader<'_>, offset: usize) -> Result<u32, DecodeError> {
    reader.read_u30().map_err(map_err(offset))
}

fn read_s24(reader: &mut Reader<'_>, offset: usize) -> Result<i32, DecodeError> {
    reader.read_s24().map_err(map_err(offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_getlocal_and_setlocal() {
        let bytes = [0x62, 0x01, 0x63, 0x02];
        let mut reader = Reader::new(&bytes);
        assert_eq!(decode_instruction(&mut reader).unwrap(), Instruction::GetLocal { index: 1 });
        assert_eq!(decode_instruction(&mut reader).unwrap(), Instruction::SetLocal { index: 2 });
    }

    #[test]
    fn distinguishes_construct_from_constructsuper() {
        let bytes = [0x42, 0x00, 0x49, 0x02];
        let mut reader = Reader::new(&bytes);
        assert_eq!(decode_instruction(&mut reader).unwrap(), Instruction::Construct { arg_count: 0 });
        assert_eq!(
            decode_instruction(&mut reader).unwrap(),
            Instruction::ConstructSuper { arg_count: 2 }
        );
    }

    #[test]
    fn decodes_lookupswitch_with_case_count_plus_one_offsets() {
        // default_offset=1, case_count=2 -> 3 trailing s24 offsets.
        let bytes = [
            0x1B, 0x01, 0x00, 0x00, // default_offset = 1
            0x02, // case_count = 2
            0x0A, 0x00, 0x00, // case 0
            0x0B, 0x00, 0x00, // case 1
            0x0C, 0x00, 0x00, // case 2 (case_count + 1 total)
        ];
        let mut reader = Reader::new(&bytes);
        match decode_instruction(&mut reader).unwrap() {
            Instruction::LookupSwitch { default_offset, case_offsets } => {
                assert_eq!(default_offset, 1);
                assert_eq!(case_offsets, vec![0x0A, 0x0B, 0x0C]);
            }
            other => panic!("expected LookupSwitch, got {other:?}"),
        }
    }

    #[test]
    fn pushbyte_is_signed() {
        let bytes = [0x24, 0xFF];
        let mut reader = Reader::new(&bytes);
        assert_eq!(decode_instruction(&mut reader).unwrap(), Instruction::PushByte { value: -1 });
    }

    #[test]
    fn rejects_unknown_opcode() {
        let bytes = [0xFE];
        let mut reader = Reader::new(&bytes);
        let err = decode_instruction(&mut reader).unwrap_err();
        assert!(matches!(err, DecodeError::BadOpcode { opcode: 0xFE, offset: 0 }));
    }

    #[test]
    fn debug_instruction_reads_full_schema() {
        let bytes = [0xEF, 0x01, 0x05, 0x00, 0x2A];
        let mut reader = Reader::new(&bytes);
        assert_eq!(
            decode_instruction(&mut reader).unwrap(),
            Instruction::Debug { debug_type: 1, index: 5, register: 0, extra: 42 }
        );
    }
}
