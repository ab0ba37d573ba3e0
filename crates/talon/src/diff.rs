//! API comparison between two loaded versions of the same package.

use crate::collections::ModulesCollection;
use crate::objects::{ObjectData, ObjectId, Parameter, ParameterKind};

/// The kind of an API breakage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum BreakageKind {
    ObjectRemoved,
    ObjectKindChanged,
    ParameterRemoved,
    ParameterAddedRequired,
    ParameterKindChanged,
    ParameterDefaultRemoved,
    ReturnAnnotationRemoved,
    BaseClassRemoved,
    ExportRemoved,
}

/// One detected breaking change between two package versions.
#[derive(Debug, Clone)]
pub struct Breakage {
    pub kind: BreakageKind,
    /// Path of the object in the old version.
    pub path: String,
    pub detail: String,
    pub lineno: Option<usize>,
}

impl std::fmt::Display for Breakage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}: {}", self.path, self.kind, self.detail)
    }
}

/// Compares two loaded versions of a package and returns the breaking
/// changes from `old` to `new`. Only the public surface is compared:
/// private names are skipped, and `__all__`-listed exports are checked by
/// name.
pub fn check(
    old: &ModulesCollection,
    old_root: ObjectId,
    new: &ModulesCollection,
    new_root: ObjectId,
) -> Vec<Breakage> {
    let mut breakages = Vec::new();
    compare_members(old, old_root, new, new_root, &mut breakages);
    compare_exports(old, old_root, new, new_root, &mut breakages);
    breakages
}

fn compare_exports(
    old: &ModulesCollection,
    old_id: ObjectId,
    new: &ModulesCollection,
    new_id: ObjectId,
    breakages: &mut Vec<Breakage>,
) {
    let export_names = |modules: &ModulesCollection, id: ObjectId| -> Vec<String> {
        modules
            .get(id)
            .as_module()
            .and_then(|m| m.exports.as_ref())
            .map(|exports| {
                exports
                    .iter()
                    .filter_map(|e| match e {
                        crate::objects::Export::Name(name) => Some(name.clone()),
                        crate::objects::Export::Expr(_) => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    };
    let new_names = export_names(new, new_id);
    for name in export_names(old, old_id) {
        if !new_names.contains(&name) {
            breakages.push(Breakage {
                kind: BreakageKind::ExportRemoved,
                path: old.path(old_id),
                detail: format!("'{name}' is no longer exported"),
                lineno: old.get(old_id).lineno,
            });
        }
    }
}

fn compare_members(
    old: &ModulesCollection,
    old_id: ObjectId,
    new: &ModulesCollection,
    new_id: ObjectId,
    breakages: &mut Vec<Breakage>,
) {
    let members: Vec<(String, ObjectId)> = old
        .get(old_id)
        .members
        .iter()
        .map(|(name, id)| (name.clone(), *id))
        .collect();
    for (name, old_member) in members {
        let node = old.get(old_member);
        if !old.is_public(old_member) {
            continue;
        }
        let Some(new_member) = new.get(new_id).members.get(&name).copied() else {
            breakages.push(Breakage {
                kind: BreakageKind::ObjectRemoved,
                path: old.path(old_member),
                detail: "object was removed".to_string(),
                lineno: node.lineno,
            });
            continue;
        };
        compare_object(old, old_member, new, new_member, breakages);
    }
}

fn compare_object(
    old: &ModulesCollection,
    old_id: ObjectId,
    new: &ModulesCollection,
    new_id: ObjectId,
    breakages: &mut Vec<Breakage>,
) {
    let old_node = old.get(old_id);
    let new_node = new.get(new_id);
    if old_node.kind() != new_node.kind() {
        breakages.push(Breakage {
            kind: BreakageKind::ObjectKindChanged,
            path: old.path(old_id),
            detail: format!("kind changed from {} to {}", old_node.kind(), new_node.kind()),
            lineno: old_node.lineno,
        });
        return;
    }
    match (&old_node.data, &new_node.data) {
        (ObjectData::Function(old_data), ObjectData::Function(new_data)) => {
            compare_signature(
                old,
                old_id,
                &old_data.parameters.iter().cloned().collect::<Vec<_>>(),
                &new_data.parameters.iter().cloned().collect::<Vec<_>>(),
                breakages,
            );
            if old_data.returns.is_some() && new_data.returns.is_none() {
                breakages.push(Breakage {
                    kind: BreakageKind::ReturnAnnotationRemoved,
                    path: old.path(old_id),
                    detail: "return annotation was removed".to_string(),
                    lineno: old_node.lineno,
                });
            }
        }
        (ObjectData::Class(old_data), ObjectData::Class(new_data)) => {
            let new_bases: Vec<String> = new_data.bases.iter().map(ToString::to_string).collect();
            for base in &old_data.bases {
                let rendered = base.to_string();
                if !new_bases.contains(&rendered) {
                    breakages.push(Breakage {
                        kind: BreakageKind::BaseClassRemoved,
                        path: old.path(old_id),
                        detail: format!("base class '{rendered}' was removed"),
                        lineno: old_node.lineno,
                    });
                }
            }
            compare_members(old, old_id, new, new_id, breakages);
        }
        (ObjectData::Module(_), ObjectData::Module(_)) => {
            compare_members(old, old_id, new, new_id, breakages);
            compare_exports(old, old_id, new, new_id, breakages);
        }
        _ => {}
    }
}

fn compare_signature(
    old: &ModulesCollection,
    old_id: ObjectId,
    old_params: &[Parameter],
    new_params: &[Parameter],
    breakages: &mut Vec<Breakage>,
) {
    let lineno = old.get(old_id).lineno;
    for old_param in old_params {
        match new_params.iter().find(|p| p.name == old_param.name) {
            None => breakages.push(Breakage {
                kind: BreakageKind::ParameterRemoved,
                path: old.path(old_id),
                detail: format!("parameter '{}' was removed", old_param.name),
                lineno,
            }),
            Some(new_param) => {
                if kind_narrowed(old_param.kind, new_param.kind) {
                    breakages.push(Breakage {
                        kind: BreakageKind::ParameterKindChanged,
                        path: old.path(old_id),
                        detail: format!(
                            "parameter '{}' changed kind from {} to {}",
                            old_param.name, old_param.kind, new_param.kind
                        ),
                        lineno,
                    });
                }
                if old_param.default.is_some() && new_param.default.is_none() && new_param.required() {
                    breakages.push(Breakage {
                        kind: BreakageKind::ParameterDefaultRemoved,
                        path: old.path(old_id),
                        detail: format!("parameter '{}' lost its default value", old_param.name),
                        lineno,
                    });
                }
            }
        }
    }
    for new_param in new_params {
        if new_param.required() && !old_params.iter().any(|p| p.name == new_param.name) {
            breakages.push(Breakage {
                kind: BreakageKind::ParameterAddedRequired,
                path: old.path(old_id),
                detail: format!("required parameter '{}' was added", new_param.name),
                lineno,
            });
        }
    }
}

/// Whether a parameter kind change restricts how callers may pass the
/// argument. Widening (e.g. positional-only to positional-or-keyword) is
/// not breaking.
fn kind_narrowed(old: ParameterKind, new: ParameterKind) -> bool {
    use ParameterKind::{KeywordOnly, PositionalOnly, PositionalOrKeyword, VarKeyword, VarPositional};
    match (old, new) {
        (PositionalOrKeyword, PositionalOnly | KeywordOnly) => true,
        (PositionalOnly, KeywordOnly) | (KeywordOnly, PositionalOnly) => true,
        (VarPositional | VarKeyword, _) if old != new => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;
    use crate::objects::{FunctionData, ObjectNode, Parameters};

    fn graph_with_function(params: Vec<Parameter>) -> (ModulesCollection, ObjectId) {
        let mut modules = ModulesCollection::new();
        let root = modules.alloc(ObjectNode::module("pkg", None));
        modules.insert_root(root);
        let f = modules.alloc(ObjectNode::new(
            "f",
            ObjectData::Function(FunctionData {
                parameters: Parameters::new(params),
                ..FunctionData::default()
            }),
        ));
        modules.set_member(root, f);
        (modules, root)
    }

    #[test]
    fn removed_object_is_reported() {
        let (old, old_root) = graph_with_function(vec![]);
        let mut new = ModulesCollection::new();
        let new_root = new.alloc(ObjectNode::module("pkg", None));
        new.insert_root(new_root);

        let breakages = check(&old, old_root, &new, new_root);
        assert_eq!(breakages.len(), 1);
        assert_eq!(breakages[0].kind, BreakageKind::ObjectRemoved);
        assert_eq!(breakages[0].path, "pkg.f");
    }

    #[test]
    fn added_required_parameter_is_reported() {
        let (old, old_root) = graph_with_function(vec![Parameter::new("a", ParameterKind::PositionalOrKeyword)]);
        let (new, new_root) = graph_with_function(vec![
            Parameter::new("a", ParameterKind::PositionalOrKeyword),
            Parameter::new("b", ParameterKind::PositionalOrKeyword),
        ]);

        let breakages = check(&old, old_root, &new, new_root);
        assert_eq!(breakages.len(), 1);
        assert_eq!(breakages[0].kind, BreakageKind::ParameterAddedRequired);
    }

    #[test]
    fn optional_added_parameter_is_fine() {
        let (old, old_root) = graph_with_function(vec![Parameter::new("a", ParameterKind::PositionalOrKeyword)]);
        let mut optional = Parameter::new("b", ParameterKind::KeywordOnly);
        optional.default = Some(Expr::Constant("None".to_string()));
        let (new, new_root) = graph_with_function(vec![
            Parameter::new("a", ParameterKind::PositionalOrKeyword),
            optional,
        ]);

        assert!(check(&old, old_root, &new, new_root).is_empty());
    }

    #[test]
    fn private_members_are_ignored() {
        let mut old = ModulesCollection::new();
        let old_root = old.alloc(ObjectNode::module("pkg", None));
        old.insert_root(old_root);
        let hidden = old.alloc(ObjectNode::new(
            "_hidden",
            ObjectData::Function(FunctionData::default()),
        ));
        old.set_member(old_root, hidden);
        let mut new = ModulesCollection::new();
        let new_root = new.alloc(ObjectNode::module("pkg", None));
        new.insert_root(new_root);

        assert!(check(&old, old_root, &new, new_root).is_empty());
    }
}
