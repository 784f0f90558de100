//! The ABC file parser (`spec.md` §4.B).
//!
//! A single deterministic pass over a `DoAbc` tag body. Every variable-length
//! table prefix is read the same way: a wire count `N`, then either `N`
//! plain entries (methods, metadata, instances, classes, scripts, method
//! bodies, traits — nothing here has an implicit zero entry) or, for the
//! seven constant pool tables, `N - 1` wire entries preceded by a synthesized
//! default at index 0 (`spec.md` §3 invariant 1). A wire count of 0 always
//! means an empty table either way.

use super::enums::{ConstantKind, MultinameKind, NamespaceKind, TraitKind};
use super::error::ParseError;
use super::types::*;
use crate::reader::Reader;

/// Parse a complete ABC module from a byte slice (the `abc_body` handed over
/// by a `DoAbc` tag).
pub fn parse_abc(bytes: &[u8]) -> Result<AbcFile<'_>, ParseError> {
    let mut reader = Reader::new(bytes);
    let minor_version = reader.read_u16()?;
    let major_version = reader.read_u16()?;
    let constant_pool = read_constant_pool(&mut reader)?;
    let methods = read_plain_array(&mut reader, read_method_info)?;
    let metadata = read_plain_array(&mut reader, read_metadata_info)?;

    let class_count = reader.read_u30()?;
    let instances = read_n(&mut reader, class_count, read_instance_info)?;
    let classes = read_n(&mut reader, class_count, read_class_info)?;

    let scripts = read_plain_array(&mut reader, read_script_info)?;
    let method_bodies = read_plain_array(&mut reader, read_method_body_info)?;

    Ok(AbcFile {
        minor_version,
        major_version,
        constant_pool,
        methods,
        metadata,
        instances,
        classes,
        scripts,
        method_bodies,
    })
}

/// Read a count-prefixed table with no implicit index-0 sentinel: a wire
/// count `N` followed directly by `N` entries.
fn read_plain_array<'a, T>(
    reader: &mut Reader<'a>,
    mut read_one: impl FnMut(&mut Reader<'a>) -> Result<T, ParseError>,
) -> Result<Vec<T>, ParseError> {
    let count = reader.read_u30()?;
    read_n(reader, count, read_one)
}

fn read_n<'a, T>(
    reader: &mut Reader<'a>,
    count: u32,
    mut read_one: impl FnMut(&mut Reader<'a>) -> Result<T, ParseError>,
) -> Result<Vec<T>, ParseError> {
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push(read_one(reader)?);
    }
    Ok(out)
}

/// Read a constant-pool table: wire count `N`; if `N == 0` the table is
/// empty, otherwise it holds a synthesized default at index 0 followed by
/// `N - 1` wire entries.
fn read_pool_array<'a, T: Clone>(
    reader: &mut Reader<'a>,
    default: T,
    mut read_one: impl FnMut(&mut Reader<'a>) -> Result<T, ParseError>,
) -> Result<Vec<T>, ParseError> {
    let count = reader.read_u30()?;
    if count == 0 {
        return Ok(Vec::new());
    }
    let mut out = Vec::with_capacity(count as usize);
    out.push(default);
    for _ in 1..count {
        out.push(read_one(reader)?);
    }
    Ok(out)
}

fn read_constant_pool<'a>(reader: &mut Reader<'a>) -> Result<ConstantPool<'a>, ParseError> {
    let integers = read_pool_array(reader, 0i32, |r| Ok(r.read_s32()?))?;
    let unsigned_integers = read_pool_array(reader, 0u32, |r| Ok(r.read_u30()?))?;
    let doubles = read_pool_array(reader, f64::NAN, |r| Ok(r.read_d64()?))?;
    let strings = read_pool_array(reader, "", |r| Ok(r.read_string()?))?;
    let namespaces = read_pool_array(
        reader,
        Namespace {
            kind: NamespaceKind::PrivateNs,
            name: 0,
        },
        read_namespace,
    )?;
    let ns_sets = read_pool_array(reader, NamespaceSet { namespaces: Vec::new() }, read_namespace_set)?;
    let multinames = read_pool_array(
        reader,
        Multiname::QName { ns: 0, name: 0 },
        read_multiname,
    )?;

    Ok(ConstantPool {
        integers,
        unsigned_integers,
        doubles,
        strings,
        namespaces,
        ns_sets,
        multinames,
    })
}

fn read_namespace_kind(reader: &mut Reader<'_>) -> Result<NamespaceKind, ParseError> {
    let offset = reader.position();
    let byte = reader.read_u8()?;
    num_traits::FromPrimitive::from_u8(byte).ok_or(ParseError::BadKind {
        what: "namespace",
        byte,
        offset,
    })
}

fn read_namespace(reader: &mut Reader<'_>) -> Result<Namespace, ParseError> {
    let kind = read_namespace_kind(reader)?;
    let name = reader.read_u30()?;
    Ok(Namespace { kind, name })
}

fn read_namespace_set(reader: &mut Reader<'_>) -> Result<NamespaceSet, ParseError> {
    let count = reader.read_u30()?;
    let namespaces = read_n(reader, count, |r| Ok(r.read_u30()?))?;
    Ok(NamespaceSet { namespaces })
}

fn read_multiname(reader: &mut Reader<'_>) -> Result<Multiname, ParseError> {
    let offset = reader.position();
    let byte = reader.read_u8()?;
    let kind: MultinameKind = num_traits::FromPrimitive::from_u8(byte).ok_or(ParseError::BadKind {
        what: "multiname",
        byte,
        offset,
    })?;
    Ok(match kind {
        MultinameKind::QName => Multiname::QName {
            ns: reader.read_u30()?,
            name: reader.read_u30()?,
        },
        MultinameKind::QNameA => Multiname::QNameA {
            ns: reader.read_u30()?,
            name: reader.read_u30()?,
        },
        MultinameKind::RtqName => Multiname::RtqName { name: reader.read_u30()? },
        MultinameKind::RtqNameA => Multiname::RtqNameA { name: reader.read_u30()? },
        MultinameKind::RtqNameL => Multiname::RtqNameL,
        MultinameKind::RtqNameLA => Multiname::RtqNameLA,
        MultinameKind::Multiname => Multiname::Multiname {
            name: reader.read_u30()?,
            ns_set: reader.read_u30()?,
        },
        MultinameKind::MultinameA => Multiname::MultinameA {
            name: reader.read_u30()?,
            ns_set: reader.read_u30()?,
        },
        MultinameKind::MultinameL => Multiname::MultinameL { ns_set: reader.read_u30()? },
        MultinameKind::MultinameLA => Multiname::MultinameLA { ns_set: reader.read_u30()? },
        MultinameKind::TypeName => {
            let q_name = reader.read_u30()?;
            let param_count = reader.read_u30()?;
            let params = read_n(reader, param_count, |r| Ok(r.read_u30()?))?;
            Multiname::TypeName { q_name, params }
        }
    })
}

fn read_method_info(reader: &mut Reader<'_>) -> Result<MethodInfo, ParseError> {
    let param_count = reader.read_u30()?;
    let return_type = reader.read_u30()?;
    let param_types = read_n(reader, param_count, |r| Ok(r.read_u30()?))?;
    let name = reader.read_u30()?;
    let flags = MethodFlags::from_bits_truncate(reader.read_u8()?);

    let options = if flags.contains(MethodFlags::HAS_OPTIONAL) {
        read_plain_array(reader, read_option_detail)?
    } else {
        Vec::new()
    };
    let param_names = if flags.contains(MethodFlags::HAS_PARAM_NAMES) {
        read_n(reader, param_count, |r| Ok(r.read_u30()?))?
    } else {
        Vec::new()
    };

    Ok(MethodInfo {
        param_count,
        return_type,
        param_types,
        name,
        flags,
        options,
        param_names,
    })
}

fn read_constant_kind(reader: &mut Reader<'_>) -> Result<ConstantKind, ParseError> {
    let offset = reader.position();
    let byte = reader.read_u8()?;
    num_traits::FromPrimitive::from_u8(byte).ok_or(ParseError::BadKind {
        what: "constant",
        byte,
        offset,
    })
}

fn read_option_detail(reader: &mut Reader<'_>) -> Result<OptionDetail, ParseError> {
    let value_index = reader.read_u30()?;
    let kind = read_constant_kind(reader)?;
    Ok(OptionDetail { value_index, kind })
}

fn read_metadata_info(reader: &mut Reader<'_>) -> Result<MetadataInfo, ParseError> {
    let name = reader.read_u30()?;
    let items = read_plain_array(reader, read_item_info)?;
    Ok(MetadataInfo { name, items })
}

fn read_item_info(reader: &mut Reader<'_>) -> Result<ItemInfo, ParseError> {
    Ok(ItemInfo {
        key: reader.read_u30()?,
        value: reader.read_u30()?,
    })
}

fn read_instance_info(reader: &mut Reader<'_>) -> Result<InstanceInfo, ParseError> {
    let name = reader.read_u30()?;
    let super_name = reader.read_u30()?;
    let flags = ClassFlags::from_bits_truncate(reader.read_u8()?);
    let protected_ns = if flags.contains(ClassFlags::PROTECTED_NS) {
        Some(reader.read_u30()?)
    } else {
        None
    };
    let interfaces = read_plain_array(reader, |r| Ok(r.read_u30()?))?;
    let init = reader.read_u30()?;
    let traits = read_plain_array(reader, read_trait_info)?;

    Ok(InstanceInfo {
        name,
        super_name,
        flags,
        protected_ns,
        interfaces,
        init,
        traits,
    })
}

fn read_trait_info(reader: &mut Reader<'_>) -> Result<TraitInfo, ParseError> {
    let name = reader.read_u30()?;
    let offset = reader.position();
    let kind_byte = reader.read_u8()?;
    let kind: TraitKind = num_traits::FromPrimitive::from_u8(kind_byte & 0x0F).ok_or(ParseError::BadKind {
        what: "trait",
        byte: kind_byte & 0x0F,
        offset,
    })?;
    let attributes = TraitAttributes::from_bits_truncate(kind_byte >> 4);

    let data = match kind {
        TraitKind::Slot | TraitKind::Const => {
            let slot_id = reader.read_u30()?;
            let type_name = reader.read_u30()?;
            let value_index = reader.read_u30()?;
            let value_kind = if value_index != 0 {
                Some(read_constant_kind(reader)?)
            } else {
                None
            };
            TraitData::Slot {
                slot_id,
                type_name,
                value_index,
                value_kind,
            }
        }
        TraitKind::Class => TraitData::Class {
            slot_id: reader.read_u30()?,
            class_index: reader.read_u30()?,
        },
        TraitKind::Function => TraitData::Function {
            slot_id: reader.read_u30()?,
            method_index: reader.read_u30()?,
        },
        TraitKind::Method | TraitKind::Getter | TraitKind::Setter => TraitData::Method {
            disp_id: reader.read_u30()?,
            method_index: reader.read_u30()?,
        },
    };

    let metadata = if attributes.contains(TraitAttributes::METADATA) {
        read_plain_array(reader, |r| Ok(r.read_u30()?))?
    } else {
        Vec::new()
    };

    Ok(TraitInfo {
        name,
        kind,
        attributes,
        data,
        metadata,
    })
}

fn read_class_info(reader: &mut Reader<'_>) -> Result<ClassInfo, ParseError> {
    let init = reader.read_u30()?;
    let traits = read_plain_array(reader, read_trait_info)?;
    Ok(ClassInfo { init, traits })
}

fn read_script_info(reader: &mut Reader<'_>) -> Result<ScriptInfo, ParseError> {
    let init = reader.read_u30()?;
    let traits = read_plain_array(reader, read_trait_info)?;
    Ok(ScriptInfo { init, traits })
}

fn read_method_body_info<'a>(reader: &mut Reader<'a>) -> Result<MethodBodyInfo<'a>, ParseError> {
    let method = reader.read_u30()?;
    let max_stack = reader.read_u30()?;
    let local_count = reader.read_u30()?;
    let init_scope_depth = reader.read_u30()?;
    let max_scope_depth = reader.read_u30()?;
    let code_length = reader.read_u30()?;
    let code = reader.read_slice(code_length as usize)?;
    let exceptions = read_plain_array(reader, read_exception_info)?;
    let traits = read_plain_array(reader, read_trait_info)?;

    Ok(MethodBodyInfo {
        method,
        max_stack,
        local_count,
        init_scope_depth,
        max_scope_depth,
        code,
        exceptions,
        traits,
    })
}

fn read_exception_info(reader: &mut Reader<'_>) -> Result<ExceptionInfo, ParseError> {
    Ok(ExceptionInfo {
        from: reader.read_u30()?,
        to: reader.read_u30()?,
        target: reader.read_u30()?,
        exc_type: reader.read_u30()?,
        var_name: reader.read_u30()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a minimal, hand-assembled ABC module with no methods/classes —
    /// just header + an all-empty constant pool — to exercise the "count 0
    /// means empty table" rule.
    fn empty_abc_bytes() -> Vec<u8> {
        let mut bytes = vec![0x10, 0x00, 0x2E, 0x00]; // minor=16, major=46
        bytes.extend([0u8; 7]); // 7 zero counts for the constant pool tables
        bytes.push(0); // methods count
        bytes.push(0); // metadata count
        bytes.push(0); // class_count
        bytes.push(0); // scripts count
        bytes.push(0); // method_bodies count
        bytes
    }

    #[test]
    fn parses_header_and_empty_tables() {
        let bytes = empty_abc_bytes();
        let abc = parse_abc(&bytes).unwrap();
        assert_eq!(abc.minor_version, 16);
        assert_eq!(abc.major_version, 46);
        assert_eq!(abc.constant_pool.integers.len(), 0);
        assert_eq!(abc.constant_pool.strings.len(), 0);
        assert!(abc.methods.is_empty());
        assert_eq!(abc.entry_point_script(), None);
    }

    #[test]
    fn constant_pool_synthesizes_index_zero() {
        // int_count = 2 -> one real entry (plus synthesized 0)
        let mut bytes = vec![0x10, 0x00, 0x2E, 0x00];
        bytes.push(2); // int_count
        bytes.push(0x2A); // s32 42
        bytes.extend([0u8; 6]); // remaining 6 constant pool counts = 0
        bytes.push(0); // methods
        bytes.push(0); // metadata
        bytes.push(0); // class_count
        bytes.push(0); // scripts
        bytes.push(0); // method_bodies

        let abc = parse_abc(&bytes).unwrap();
        assert_eq!(abc.constant_pool.integers, vec![0, 42]);
    }

    #[test]
    fn double_pool_default_is_nan() {
        let mut bytes = vec![0x10, 0x00, 0x2E, 0x00];
        bytes.extend([0u8; 2]); // int_count, uint_count = 0
        bytes.push(1); // double_count = 1 -> just the synthesized NaN, no wire entries
        bytes.extend([0u8; 4]); // strings, namespaces, ns_sets, multinames = 0
        bytes.push(0);
        bytes.push(0);
        bytes.push(0);
        bytes.push(0);
        bytes.push(0);

        let abc = parse_abc(&bytes).unwrap();
        assert_eq!(abc.constant_pool.doubles.len(), 1);
        assert!(abc.constant_pool.doubles[0].is_nan());
    }

    #[test]
    fn rejects_unknown_namespace_kind() {
        let mut bytes = vec![0x10, 0x00, 0x2E, 0x00];
        bytes.extend([0u8; 4]); // int/uint/double/string counts = 0
        bytes.push(2); // ns_count = 2 -> one wire entry
        bytes.push(0xFF); // bogus kind byte
        bytes.push(0); // name index
        let err = parse_abc(&bytes).unwrap_err();
        assert!(matches!(err, ParseError::BadKind { what: "namespace", .. }));
    }
}
