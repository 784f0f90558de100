//! The linker (`spec.md` §4.F): builds the auxiliary indices the engine
//! needs to go from "which script/class/method" to "which body/index" in
//! constant time, instead of re-scanning the ABC module on every lookup.

use fnv::FnvHashMap;

use swf::avm2::{AbcFile, ClassIndex, MethodIndex, ScriptIndex, TraitData, TraitKind};

use crate::error::RuntimeError;
use crate::resolver::resolve_multiname;

/// `method_index -> method_body index`, `class_index -> owning script
/// index`, and qualified-name indices for classes and methods.
#[derive(Debug, Default)]
pub struct Linker {
    pub method_to_body: FnvHashMap<MethodIndex, u32>,
    pub class_to_script: FnvHashMap<ClassIndex, ScriptIndex>,
    pub name_to_class: FnvHashMap<String, ClassIndex>,
    pub name_to_method: FnvHashMap<String, MethodIndex>,
}

impl Linker {
    /// Build every index in one pass over the parsed ABC module.
    pub fn build(abc: &AbcFile<'_>) -> Result<Self, RuntimeError> {
        let mut linker = Linker::default();

        for (body_index, body) in abc.method_bodies.iter().enumerate() {
            linker.method_to_body.insert(body.method, body_index as u32);
        }

        for (script_index, script) in abc.scripts.iter().enumerate() {
            for trait_info in &script.traits {
                if let TraitData::Class { class_index, .. } = &trait_info.data {
                    linker.class_to_script.insert(*class_index, script_index as ScriptIndex);
                }
            }
        }

        for (class_index, instance) in abc.instances.iter().enumerate() {
            let qualified = qualified_name(abc, instance.name)?;
            linker.name_to_class.insert(qualified.clone(), class_index as ClassIndex);

            for trait_info in &instance.traits {
                register_method_trait(abc, &qualified, trait_info, &mut linker.name_to_method)?;
            }
        }

        // Class-side (static) method traits, paired with
        // their instance by index (`instances.len() == classes.len()`,
        // `spec.md` §3 invariant 2).
        for (class_index, class) in abc.classes.iter().enumerate() {
            let instance = &abc.instances[class_index];
            let qualified = qualified_name(abc, instance.name)?;
            for trait_info in &class.traits {
                register_method_trait(abc, &qualified, trait_info, &mut linker.name_to_method)?;
            }
        }

        Ok(linker)
    }
}

fn register_method_trait(
    abc: &AbcFile<'_>,
    owner_qualified_name: &str,
    trait_info: &swf::avm2::TraitInfo,
    name_to_method: &mut FnvHashMap<String, MethodIndex>,
) -> Result<(), RuntimeError> {
    if !matches!(trait_info.kind, TraitKind::Method | TraitKind::Getter | TraitKind::Setter) {
        return Ok(());
    }
    let TraitData::Method { method_index, .. } = &trait_info.data else {
        return Ok(());
    };
    // A trait's `name` is an index into the multiname pool, not the string
    // pool directly (`original_source/avm2/abc/traits.py`); only its local
    // name matters here since traits are always found via their owner's
    // qualified name plus this.
    let local_name = resolve_multiname(&abc.constant_pool, trait_info.name, None, None)?.local_name;
    name_to_method.insert(format!("{owner_qualified_name}.{local_name}"), *method_index);
    Ok(())
}

/// Render a QName multiname index as `"<namespace_uri>.<local_name>"`, or
/// just `<local_name>` when the namespace is the empty/public one
/// (`spec.md` §4.F).
fn qualified_name(abc: &AbcFile<'_>, multiname_index: u32) -> Result<String, RuntimeError> {
    let request = resolve_multiname(&abc.constant_pool, multiname_index, None, None)?;
    Ok(match request.namespaces.first() {
        Some(ns) if !ns.is_empty() => format!("{ns}.{}", request.local_name),
        _ => request.local_name,
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use swf::avm2::{
        ClassInfo, ConstantPool, InstanceInfo, Multiname, Namespace, NamespaceKind, ScriptInfo, TraitAttributes,
        TraitInfo,
    };

    fn fixture() -> AbcFile<'static> {
        // A single class "battle.BattleCore" with one instance method
        // "getElementalPenetration", linked into script 0.
        let constant_pool = ConstantPool {
            integers: vec![0],
            unsigned_integers: vec![0],
            doubles: vec![f64::NAN],
            strings: vec!["", "battle", "BattleCore", "getElementalPenetration"],
            namespaces: vec![
                Namespace { kind: NamespaceKind::PrivateNs, name: 0 },
                Namespace { kind: NamespaceKind::PackageNamespace, name: 1 },
            ],
            ns_sets: vec![],
            multinames: vec![
                Multiname::QName { ns: 0, name: 0 },
                Multiname::QName { ns: 1, name: 2 }, // battle.BattleCore
                Multiname::QName { ns: 0, name: 3 }, // getElementalPenetration
            ],
        };

        let method_trait = TraitInfo {
            name: 2,
            kind: TraitKind::Method,
            attributes: TraitAttributes::empty(),
            data: TraitData::Method { disp_id: 0, method_index: 5 },
            metadata: vec![],
        };

        let instance = InstanceInfo {
            name: 1,
            super_name: 0,
            flags: swf::avm2::ClassFlags::empty(),
            protected_ns: None,
            interfaces: vec![],
            init: 0,
            traits: vec![method_trait],
        };
        let class = ClassInfo { init: 1, traits: vec![] };
        let class_trait = TraitInfo {
            name: 1,
            kind: TraitKind::Class,
            attributes: TraitAttributes::empty(),
            data: TraitData::Class { slot_id: 0, class_index: 0 },
            metadata: vec![],
        };
        let script = ScriptInfo { init: 2, traits: vec![class_trait] };

        AbcFile {
            minor_version: 16,
            major_version: 46,
            constant_pool,
            methods: vec![],
            metadata: vec![],
            instances: vec![instance],
            classes: vec![class],
            scripts: vec![script],
            method_bodies: vec![],
        }
    }

    #[test]
    fn links_class_and_method_names() {
        let abc = fixture();
        let linker = Linker::build(&abc).unwrap();
        assert_eq!(linker.name_to_class.get("battle.BattleCore"), Some(&0));
        assert_eq!(linker.class_to_script.get(&0), Some(&0));
        assert_eq!(
            linker.name_to_method.get("battle.BattleCore.getElementalPenetration"),
            Some(&5)
        );
    }
}
