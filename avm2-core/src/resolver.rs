//! The constant resolver (`spec.md` §4.D).
//!
//! Resolves a multiname index (plus, for L-/RT- forms, operands popped off
//! the caller's operand stack) into a name/namespace-set resolution request.
//! This module never performs the property lookup itself — the engine
//! searches scope and objects against the request this returns.

use swf::avm2::{ConstantKind, ConstantPool, Multiname, PoolIndex};

use crate::error::RuntimeError;
use crate::value::Value;

/// A resolved request: the local name to search for, and the candidate
/// namespace URIs to search it under. An empty `namespaces` list means "any
/// namespace" (the RTQNameL/MultinameL wildcard case resolves at the
/// engine's discretion).
#[derive(Debug, Clone, PartialEq)]
pub struct NameRequest {
    pub local_name: String,
    pub namespaces: Vec<String>,
}

/// Look up the UTF-8 string backing a namespace entry — its "URI" per
/// `spec.md` §4.F/§4.D. Namespace name index 0 is the sentinel (no string);
/// it resolves to the empty (public) namespace URI.
fn namespace_uri(pool: &ConstantPool<'_>, ns_index: PoolIndex) -> Result<String, RuntimeError> {
    let ns = pool.namespace(ns_index).ok_or(RuntimeError::PoolIndexOutOfRange {
        what: "namespace",
        index: ns_index,
        len: pool.namespaces.len(),
    })?;
    if ns.name == 0 {
        return Ok(String::new());
    }
    pool.string(ns.name)
        .map(str::to_owned)
        .ok_or(RuntimeError::PoolIndexOutOfRange {
            what: "string",
            index: ns.name,
            len: pool.strings.len(),
        })
}

fn local_name_string(pool: &ConstantPool<'_>, name_index: PoolIndex) -> Result<String, RuntimeError> {
    pool.string(name_index)
        .map(str::to_owned)
        .ok_or(RuntimeError::PoolIndexOutOfRange {
            what: "string",
            index: name_index,
            len: pool.strings.len(),
        })
}

fn ns_set_uris(pool: &ConstantPool<'_>, ns_set_index: PoolIndex) -> Result<Vec<String>, RuntimeError> {
    let set = pool.ns_set(ns_set_index).ok_or(RuntimeError::PoolIndexOutOfRange {
        what: "ns_set",
        index: ns_set_index,
        len: pool.ns_sets.len(),
    })?;
    set.namespaces.iter().map(|&ns| namespace_uri(pool, ns)).collect()
}

/// Resolve a multiname. `runtime_name`/`runtime_ns` supply the stack-popped
/// operands an L-/RT- form needs, in the order the engine pops them (name
/// first, then namespace, matching `Multiname::runtime_operand_count`'s
/// caller contract).
pub fn resolve_multiname(
    pool: &ConstantPool<'_>,
    multiname_index: PoolIndex,
    runtime_name: Option<&Value>,
    runtime_ns: Option<&Value>,
) -> Result<NameRequest, RuntimeError> {
    let multiname = pool.multiname(multiname_index).ok_or(RuntimeError::PoolIndexOutOfRange {
        what: "multiname",
        index: multiname_index,
        len: pool.multinames.len(),
    })?;

    Ok(match multiname {
        Multiname::QName { ns, name } | Multiname::QNameA { ns, name } => NameRequest {
            local_name: local_name_string(pool, *name)?,
            namespaces: vec![namespace_uri(pool, *ns)?],
        },
        Multiname::RtqName { name } | Multiname::RtqNameA { name } => {
            let ns = runtime_ns.map(value_to_string).unwrap_or_default();
            NameRequest {
                local_name: local_name_string(pool, *name)?,
                namespaces: vec![ns],
            }
        }
        Multiname::RtqNameL | Multiname::RtqNameLA => {
            let name = runtime_name.map(value_to_string).unwrap_or_default();
            let ns = runtime_ns.map(value_to_string).unwrap_or_default();
            NameRequest {
                local_name: name,
                namespaces: vec![ns],
            }
        }
        Multiname::Multiname { name, ns_set } | Multiname::MultinameA { name, ns_set } => NameRequest {
            local_name: local_name_string(pool, *name)?,
            namespaces: ns_set_uris(pool, *ns_set)?,
        },
        Multiname::MultinameL { ns_set } | Multiname::MultinameLA { ns_set } => {
            let name = runtime_name.map(value_to_string).unwrap_or_default();
            NameRequest {
                local_name: name,
                namespaces: ns_set_uris(pool, *ns_set)?,
            }
        }
        Multiname::TypeName { q_name, .. } => {
            // Parameterized types resolve against their base QName; the type
            // parameters themselves aren't needed for property lookup.
            return resolve_multiname(pool, *q_name, runtime_name, runtime_ns);
        }
    })
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Namespace(ns) => ns.clone(),
        other => format!("{:?}", other),
    }
}

/// Materialize a pool constant as a runtime `Value`, per the
/// `ConstantKind`/index pair stored in option defaults and slot-trait
/// defaults (`spec.md` §4.D).
pub fn get_constant(pool: &ConstantPool<'_>, kind: ConstantKind, index: PoolIndex) -> Result<Value, RuntimeError> {
    Ok(match kind {
        ConstantKind::Undefined => Value::Undefined,
        ConstantKind::Null => Value::Null,
        ConstantKind::True => Value::Bool(true),
        ConstantKind::False => Value::Bool(false),
        ConstantKind::Int => Value::Integer(pool.int(index).ok_or(RuntimeError::PoolIndexOutOfRange {
            what: "int",
            index,
            len: pool.integers.len(),
        })?),
        ConstantKind::UInt => Value::Unsigned(pool.uint(index).ok_or(RuntimeError::PoolIndexOutOfRange {
            what: "uint",
            index,
            len: pool.unsigned_integers.len(),
        })?),
        ConstantKind::Double => Value::Double(pool.double(index).ok_or(RuntimeError::PoolIndexOutOfRange {
            what: "double",
            index,
            len: pool.doubles.len(),
        })?),
        ConstantKind::Utf8 => Value::String(local_name_string(pool, index)?),
        ConstantKind::Namespace
        | ConstantKind::PackageNamespace
        | ConstantKind::PackageInternalNs
        | ConstantKind::ProtectedNamespace
        | ConstantKind::ExplicitNamespace
        | ConstantKind::StaticProtectedNs
        | ConstantKind::PrivateNs => Value::Namespace(namespace_uri(pool, index)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use swf::avm2::{Namespace, NamespaceKind, NamespaceSet};

    fn sample_pool() -> ConstantPool<'static> {
        ConstantPool {
            integers: vec![0, 42],
            unsigned_integers: vec![0],
            doubles: vec![f64::NAN],
            strings: vec!["", "battle", "BattleCore"],
            namespaces: vec![
                Namespace { kind: NamespaceKind::PrivateNs, name: 0 },
                Namespace { kind: NamespaceKind::PackageNamespace, name: 1 },
            ],
            ns_sets: vec![NamespaceSet { namespaces: vec![] }, NamespaceSet { namespaces: vec![1] }],
            multinames: vec![
                Multiname::QName { ns: 0, name: 0 },
                Multiname::QName { ns: 1, name: 2 },
            ],
        }
    }

    #[test]
    fn resolves_qname_to_namespace_uri_and_local_name() {
        let pool = sample_pool();
        let req = resolve_multiname(&pool, 1, None, None).unwrap();
        assert_eq!(req.local_name, "BattleCore");
        assert_eq!(req.namespaces, vec!["battle".to_string()]);
    }

    #[test]
    fn materializes_int_constant() {
        let pool = sample_pool();
        assert_eq!(get_constant(&pool, ConstantKind::Int, 1).unwrap(), Value::Integer(42));
    }

    #[test]
    fn sentinel_namespace_name_is_public() {
        let pool = sample_pool();
        assert_eq!(namespace_uri(&pool, 0).unwrap(), "");
    }
}
