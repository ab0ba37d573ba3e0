use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::collections::ModulesCollection;
use crate::error::TalonError;
use crate::expr::Expr;
use crate::objects::{Export, ObjectData, ObjectId, ObjectNode};

/// Iteratively expands a module's `__all__` list: references to other
/// modules' exports are replaced by their expanded contents, order is
/// preserved and duplicates are dropped in insertion order. Cycles keep the
/// partial result and log a warning.
pub fn expand_exports(modules: &mut ModulesCollection, module_id: ObjectId) {
    let mut in_flight = Vec::new();
    expand_exports_inner(modules, module_id, &mut in_flight);
}

fn expand_exports_inner(modules: &mut ModulesCollection, module_id: ObjectId, in_flight: &mut Vec<ObjectId>) {
    if in_flight.contains(&module_id) {
        warn!(
            "cycle while expanding exports of {}; keeping partial result",
            modules.path(module_id)
        );
        return;
    }
    let Some(exports) = modules.get(module_id).as_module().and_then(|m| m.exports.clone()) else {
        return;
    };
    if exports.iter().all(|e| matches!(e, Export::Name(_))) {
        return;
    }
    in_flight.push(module_id);

    let mut expanded: Vec<Export> = Vec::with_capacity(exports.len());
    let mut push_name = |expanded: &mut Vec<Export>, name: String| {
        let exists = expanded
            .iter()
            .any(|e| matches!(e, Export::Name(existing) if *existing == name));
        if !exists {
            expanded.push(Export::Name(name));
        }
    };
    for export in exports {
        match export {
            Export::Name(name) => push_name(&mut expanded, name),
            Export::Expr(expr) => {
                // `[*other.__all__]` and `other.__all__` both reference the
                // other module's export list.
                let inner = match &expr {
                    Expr::Starred(inner) => inner.as_ref(),
                    other => other,
                };
                let path = inner.canonical_path(modules);
                let Some(module_path) = path.strip_suffix(".__all__") else {
                    warn!(
                        "unsupported export expression '{expr}' in {}",
                        modules.path(module_id)
                    );
                    expanded.push(Export::Expr(expr));
                    continue;
                };
                let target = modules.lookup(module_path).and_then(|id| modules.final_target(id));
                match target {
                    Ok(target) => {
                        expand_exports_inner(modules, target, in_flight);
                        let target_exports = modules
                            .get(target)
                            .as_module()
                            .and_then(|m| m.exports.clone())
                            .unwrap_or_default();
                        for export in target_exports {
                            match export {
                                Export::Name(name) => push_name(&mut expanded, name),
                                expr => expanded.push(expr),
                            }
                        }
                    }
                    Err(err) => {
                        warn!(
                            "could not expand exports of {module_path} into {}: {err}",
                            modules.path(module_id)
                        );
                        expanded.push(Export::Expr(expr));
                    }
                }
            }
        }
    }
    if let Some(data) = modules.get_mut(module_id).as_module_mut() {
        data.exports = Some(expanded);
    }
    in_flight.pop();
}

/// Expands the recorded `from M import *` statements of a module into alias
/// members. Existing bindings win over wildcard-introduced names; imported
/// names are appended after pre-existing members.
pub fn expand_wildcards(modules: &mut ModulesCollection, module_id: ObjectId) {
    let mut in_flight = Vec::new();
    expand_wildcards_inner(modules, module_id, &mut in_flight);
}

fn expand_wildcards_inner(modules: &mut ModulesCollection, module_id: ObjectId, in_flight: &mut Vec<ObjectId>) {
    if in_flight.contains(&module_id) {
        return;
    }
    in_flight.push(module_id);
    let wildcards = match modules.get_mut(module_id).as_module_mut() {
        Some(data) => std::mem::take(&mut data.wildcard_imports),
        None => Vec::new(),
    };
    for wildcard in wildcards {
        let source = match modules.lookup(&wildcard.target).and_then(|id| modules.final_target(id)) {
            Ok(source) => source,
            Err(err) => {
                warn!(
                    "cannot expand wildcard import of {} in {}: {err}",
                    wildcard.target,
                    modules.path(module_id)
                );
                continue;
            }
        };
        // The source module's own wildcards must be expanded first so its
        // member list is complete.
        expand_wildcards_inner(modules, source, in_flight);
        expand_exports(modules, source);

        let names: Vec<String> = match modules.get(source).as_module().and_then(|m| m.exports.as_ref()) {
            Some(exports) => exports
                .iter()
                .filter_map(|export| match export {
                    Export::Name(name) => Some(name.clone()),
                    Export::Expr(_) => None,
                })
                .collect(),
            // Without `__all__`, every member not starting with an
            // underscore is imported; submodules only travel through the
            // wildcard when the source module itself imported them.
            None => modules
                .get(source)
                .members
                .iter()
                .filter(|(name, member)| !modules.get(**member).is_module() && !name.starts_with('_'))
                .map(|(name, _)| name.clone())
                .collect(),
        };
        let source_path = modules.path(source);
        for name in names {
            if modules.get(module_id).members.contains_key(&name) {
                continue;
            }
            let mut alias = ObjectNode::alias(&name, format!("{source_path}.{name}"));
            alias.lineno = wildcard.lineno;
            let id = modules.alloc(alias);
            modules.set_member(module_id, id);
        }
    }
    in_flight.pop();
}

/// Resolves one alias to its final concrete target, memoizing the result.
///
/// Failures are returned to the caller without being recorded: the loader
/// may still load an external package and retry before marking the alias
/// with its resolution error.
pub fn resolve_alias(modules: &mut ModulesCollection, id: ObjectId) -> Result<ObjectId, TalonError> {
    if let Some(target) = modules.get(id).as_alias().and_then(|a| a.target) {
        return Ok(target);
    }
    match modules.final_target(id) {
        Ok(target) => {
            if let Some(alias) = modules.get_mut(id).as_alias_mut() {
                alias.target = Some(target);
                alias.error = None;
            }
            Ok(target)
        }
        Err(err) => Err(err),
    }
}

/// Records a resolution failure on the alias node, logging it only once.
/// Returns true when the error was newly recorded.
pub(crate) fn record_alias_error(modules: &mut ModulesCollection, id: ObjectId, err: &TalonError) -> bool {
    let path = modules.path(id);
    if let Some(alias) = modules.get_mut(id).as_alias_mut() {
        if alias.error.is_none() {
            warn!("{path}: {err}");
            alias.error = Some(err.to_string());
            return true;
        }
    }
    false
}

/// Collects every alias id in the subtree, depth-first in member order.
pub(crate) fn collect_aliases(modules: &ModulesCollection, root: ObjectId, out: &mut Vec<ObjectId>) {
    for &member in modules.get(root).members.values() {
        if modules.get(member).is_alias() {
            out.push(member);
        } else {
            collect_aliases(modules, member, out);
        }
    }
}

/// Whether an alias is listed in its enclosing module's expanded exports,
/// which makes it eligible for eager resolution when implicit resolution is
/// off.
pub(crate) fn is_exported(modules: &ModulesCollection, id: ObjectId) -> bool {
    let name = &modules.get(id).name;
    let Some(parent) = modules.get(id).parent else {
        return false;
    };
    let module = modules.module_of(parent);
    modules
        .get(module)
        .as_module()
        .and_then(|m| m.exports.as_ref())
        .is_some_and(|exports| {
            exports
                .iter()
                .any(|e| matches!(e, Export::Name(export) if export == name))
        })
}

/// Resolves the expressions in a class's `bases` list to class ids, skipping
/// bases that do not resolve to a loaded class.
fn resolved_bases(modules: &mut ModulesCollection, class_id: ObjectId) -> Vec<ObjectId> {
    let bases = match modules.get(class_id).as_class() {
        Some(data) => data.bases.clone(),
        None => return Vec::new(),
    };
    let mut resolved = Vec::new();
    for base in &bases {
        let path = base.canonical_path(modules);
        match modules.lookup(&path).and_then(|id| modules.final_target(id)) {
            Ok(target) if modules.get(target).is_class() => resolved.push(target),
            Ok(_) | Err(_) => {
                debug!(
                    "base class '{path}' of {} is not a loaded class",
                    modules.path(class_id)
                );
            }
        }
    }
    resolved
}

/// Computes the method resolution order of a class with the C3
/// linearization. Unresolvable bases are skipped; an inconsistent hierarchy
/// degrades to the partial merge with a warning.
pub fn mro(modules: &mut ModulesCollection, class_id: ObjectId) -> Vec<ObjectId> {
    let mut seen = Vec::new();
    mro_inner(modules, class_id, &mut seen)
}

fn mro_inner(modules: &mut ModulesCollection, class_id: ObjectId, seen: &mut Vec<ObjectId>) -> Vec<ObjectId> {
    if seen.contains(&class_id) {
        warn!("inheritance cycle through {}", modules.path(class_id));
        return vec![class_id];
    }
    seen.push(class_id);
    let bases = resolved_bases(modules, class_id);
    let mut sequences: Vec<Vec<ObjectId>> = bases
        .iter()
        .map(|&base| mro_inner(modules, base, seen))
        .collect();
    sequences.push(bases);
    seen.pop();

    let mut result = vec![class_id];
    result.extend(c3_merge(modules, class_id, sequences));
    result
}

fn c3_merge(modules: &ModulesCollection, class_id: ObjectId, mut sequences: Vec<Vec<ObjectId>>) -> Vec<ObjectId> {
    let mut result = Vec::new();
    loop {
        sequences.retain(|s| !s.is_empty());
        if sequences.is_empty() {
            return result;
        }
        // A good head appears in no other sequence's tail.
        let head = sequences.iter().map(|s| s[0]).find(|&candidate| {
            !sequences
                .iter()
                .any(|s| s.len() > 1 && s[1..].contains(&candidate))
        });
        let head = match head {
            Some(head) => head,
            None => {
                warn!(
                    "inconsistent class hierarchy for {}; keeping a partial linearization",
                    modules.path(class_id)
                );
                sequences[0][0]
            }
        };
        result.push(head);
        for sequence in &mut sequences {
            sequence.retain(|&id| id != head);
        }
    }
}

/// Materializes the inherited members of a class: the union of ancestors'
/// members the class does not redeclare, nearest ancestor first, each
/// wrapped as an alias marked `inherited`. The result is memoized on the
/// class.
pub fn inherited_members(
    modules: &mut ModulesCollection,
    class_id: ObjectId,
) -> IndexMap<String, ObjectId> {
    if let Some(inherited) = modules.get(class_id).as_class().and_then(|c| c.inherited.clone()) {
        return inherited;
    }
    let linearization = mro(modules, class_id);
    let mut inherited: IndexMap<String, ObjectId> = IndexMap::new();
    for ancestor in linearization.into_iter().skip(1) {
        let members: Vec<(String, ObjectId)> = modules
            .get(ancestor)
            .members
            .iter()
            .map(|(name, id)| (name.clone(), *id))
            .collect();
        for (name, member) in members {
            if modules.get(class_id).members.contains_key(&name) || inherited.contains_key(&name) {
                continue;
            }
            let target_path = modules.canonical_path(member);
            let mut alias = ObjectNode::alias(name.clone(), target_path);
            alias.parent = Some(class_id);
            if let ObjectData::Alias(data) = &mut alias.data {
                data.inherited = true;
                data.target = Some(member);
            }
            let id = modules.alloc(alias);
            inherited.insert(name, id);
        }
    }
    if let Some(data) = modules.get_mut(class_id).as_class_mut() {
        data.inherited = Some(inherited.clone());
    }
    inherited
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{ClassData, FunctionData, ModuleData, WildcardImport};

    fn module(modules: &mut ModulesCollection, name: &str) -> ObjectId {
        let id = modules.alloc(ObjectNode::module(name, None));
        modules.insert_root(id);
        id
    }

    fn class_with_bases(modules: &mut ModulesCollection, parent: ObjectId, name: &str, bases: &[&str]) -> ObjectId {
        let id = modules.alloc(ObjectNode::new(
            name,
            ObjectData::Class(ClassData {
                bases: bases.iter().map(|b| Expr::name(*b, Some(parent))).collect(),
                ..ClassData::default()
            }),
        ));
        modules.set_member(parent, id);
        id
    }

    #[test]
    fn diamond_mro() {
        let mut modules = ModulesCollection::new();
        let root = module(&mut modules, "pkg");
        let a = class_with_bases(&mut modules, root, "A", &[]);
        let b = class_with_bases(&mut modules, root, "B", &["A"]);
        let c = class_with_bases(&mut modules, root, "C", &["A"]);
        let d = class_with_bases(&mut modules, root, "D", &["B", "C"]);

        assert_eq!(mro(&mut modules, d), vec![d, b, c, a]);
        assert_eq!(mro(&mut modules, a), vec![a]);
    }

    #[test]
    fn inherited_members_prefer_nearest_ancestor() {
        let mut modules = ModulesCollection::new();
        let root = module(&mut modules, "pkg");
        let a = class_with_bases(&mut modules, root, "A", &[]);
        let f_a = modules.alloc(ObjectNode::new("f", ObjectData::Function(FunctionData::default())));
        modules.set_member(a, f_a);
        let g_a = modules.alloc(ObjectNode::new("g", ObjectData::Function(FunctionData::default())));
        modules.set_member(a, g_a);
        let b = class_with_bases(&mut modules, root, "B", &["A"]);
        let f_b = modules.alloc(ObjectNode::new("f", ObjectData::Function(FunctionData::default())));
        modules.set_member(b, f_b);
        let c = class_with_bases(&mut modules, root, "C", &["B"]);
        let g_c = modules.alloc(ObjectNode::new("g", ObjectData::Function(FunctionData::default())));
        modules.set_member(c, g_c);

        let inherited = inherited_members(&mut modules, c);
        assert_eq!(inherited.len(), 1);
        let f = inherited["f"];
        let data = modules.get(f).as_alias().unwrap();
        assert!(data.inherited);
        assert_eq!(data.target, Some(f_b));
        assert_eq!(modules.canonical_path(f), "pkg.B.f");
    }

    #[test]
    fn exports_expand_through_other_modules() {
        let mut modules = ModulesCollection::new();
        let root = module(&mut modules, "pkg");
        let sub = modules.alloc(ObjectNode::new(
            "sub",
            ObjectData::Module(ModuleData {
                exports: Some(vec![Export::Name("x".to_string()), Export::Name("y".to_string())]),
                ..ModuleData::default()
            }),
        ));
        modules.set_member(root, sub);
        // pkg.__all__ = ["z", *sub.__all__] with sub imported in pkg.
        modules
            .get_mut(root)
            .imports
            .insert("sub".to_string(), "pkg.sub".to_string());
        let reference = Expr::Starred(Box::new(Expr::Attribute {
            value: Box::new(Expr::name("sub", Some(root))),
            attr: "__all__".to_string(),
        }));
        if let Some(data) = modules.get_mut(root).as_module_mut() {
            data.exports = Some(vec![Export::Name("z".to_string()), Export::Expr(reference)]);
        }

        expand_exports(&mut modules, root);
        let exports = modules.get(root).as_module().unwrap().exports.clone().unwrap();
        let names: Vec<&str> = exports
            .iter()
            .filter_map(|e| match e {
                Export::Name(name) => Some(name.as_str()),
                Export::Expr(_) => None,
            })
            .collect();
        assert_eq!(names, ["z", "x", "y"]);
    }

    #[test]
    fn wildcard_without_all_imports_public_names_only() {
        let mut modules = ModulesCollection::new();
        let root = module(&mut modules, "pkg");
        let source = modules.alloc(ObjectNode::module("src", None));
        modules.set_member(root, source);
        for name in ["visible", "_hidden"] {
            let id = modules.alloc(ObjectNode::new(
                name,
                ObjectData::Function(FunctionData::default()),
            ));
            modules.set_member(source, id);
        }
        if let Some(data) = modules.get_mut(root).as_module_mut() {
            data.wildcard_imports.push(WildcardImport {
                target: "pkg.src".to_string(),
                lineno: Some(1),
            });
        }

        expand_wildcards(&mut modules, root);
        assert!(modules.get(root).members.contains_key("visible"));
        assert!(!modules.get(root).members.contains_key("_hidden"));
        let alias = modules.get(root).members["visible"];
        assert_eq!(modules.get(alias).as_alias().unwrap().target_path, "pkg.src.visible");
    }

    #[test]
    fn existing_bindings_win_over_wildcards() {
        let mut modules = ModulesCollection::new();
        let root = module(&mut modules, "pkg");
        let source = modules.alloc(ObjectNode::module("src", None));
        modules.set_member(root, source);
        let x = modules.alloc(ObjectNode::new("x", ObjectData::Function(FunctionData::default())));
        modules.set_member(source, x);
        let own = modules.alloc(ObjectNode::new("x", ObjectData::Function(FunctionData::default())));
        modules.set_member(root, own);
        if let Some(data) = modules.get_mut(root).as_module_mut() {
            data.wildcard_imports.push(WildcardImport {
                target: "pkg.src".to_string(),
                lineno: None,
            });
        }

        expand_wildcards(&mut modules, root);
        assert_eq!(modules.get(root).members["x"], own);
    }
}
