use tracing::debug;

use crate::collections::ModulesCollection;
use crate::objects::{ObjectData, ObjectId, ObjectKind};

/// Merges a stub module subtree into its concrete counterpart.
///
/// Stubs define the typed API surface, so type information (parameters,
/// return annotations, attribute annotations, base classes, type parameters)
/// comes from the stub, while runtime information (values, docstrings,
/// labels) is kept from the concrete module when present. Members that exist
/// on only one side are kept; a kind mismatch is won by the stub.
pub(crate) fn merge_stubs(modules: &mut ModulesCollection, concrete: ObjectId, stub: ObjectId) {
    debug!(
        "merging stubs of {} into {}",
        modules.path(stub),
        modules.path(concrete)
    );
    merge_members(modules, concrete, stub);
    if modules.get(concrete).docstring.is_none() {
        modules.get_mut(concrete).docstring = modules.get(stub).docstring.clone();
    }
    // Exports declared only in the stub still describe the public surface.
    if let (ObjectData::Module(concrete_data), ObjectData::Module(stub_data)) =
        (&modules.get(concrete).data, &modules.get(stub).data)
    {
        if concrete_data.exports.is_none() && stub_data.exports.is_some() {
            let exports = stub_data.exports.clone();
            if let Some(data) = modules.get_mut(concrete).as_module_mut() {
                data.exports = exports;
            }
        }
    }
}

fn merge_members(modules: &mut ModulesCollection, concrete: ObjectId, stub: ObjectId) {
    let stub_members: Vec<ObjectId> = modules.get(stub).members.values().copied().collect();
    for stub_child in stub_members {
        let name = modules.get(stub_child).name.clone();
        match modules.get(concrete).members.get(&name).copied() {
            None => {
                modules.set_member(concrete, stub_child);
            }
            Some(concrete_child) => merge_member(modules, concrete_child, stub_child),
        }
    }
}

fn merge_member(modules: &mut ModulesCollection, concrete: ObjectId, stub: ObjectId) {
    use ObjectKind::{Attribute, Class, Function, Module, TypeAlias};
    match (modules.get(concrete).kind(), modules.get(stub).kind()) {
        (Module, Module) => merge_stubs(modules, concrete, stub),
        (Class, Class) => {
            let (bases, type_parameters) = match &modules.get(stub).data {
                ObjectData::Class(data) => (data.bases.clone(), data.type_parameters.clone()),
                _ => return,
            };
            if let Some(data) = modules.get_mut(concrete).as_class_mut() {
                data.bases = bases;
                data.type_parameters = type_parameters;
            }
            fill_docstring(modules, concrete, stub);
            merge_members(modules, concrete, stub);
        }
        (Function, Function) => {
            let (parameters, returns, type_parameters) = match &modules.get(stub).data {
                ObjectData::Function(data) => (
                    data.parameters.clone(),
                    data.returns.clone(),
                    data.type_parameters.clone(),
                ),
                _ => return,
            };
            if let Some(data) = modules.get_mut(concrete).as_function_mut() {
                data.parameters = parameters;
                data.returns = returns;
                data.type_parameters = type_parameters;
            }
            if modules.get(concrete).labels.is_empty() {
                let labels = modules.get(stub).labels.clone();
                modules.get_mut(concrete).labels = labels;
            }
            fill_docstring(modules, concrete, stub);
        }
        (Attribute, Attribute) => {
            let annotation = match &modules.get(stub).data {
                ObjectData::Attribute(data) => data.annotation.clone(),
                _ => return,
            };
            if annotation.is_some() {
                if let Some(data) = modules.get_mut(concrete).as_attribute_mut() {
                    data.annotation = annotation;
                }
            }
            fill_docstring(modules, concrete, stub);
        }
        (TypeAlias, TypeAlias) => {
            let (value, type_parameters) = match &modules.get(stub).data {
                ObjectData::TypeAlias(data) => (data.value.clone(), data.type_parameters.clone()),
                _ => return,
            };
            if let ObjectData::TypeAlias(data) = &mut modules.get_mut(concrete).data {
                if value.is_some() {
                    data.value = value;
                }
                data.type_parameters = type_parameters;
            }
            fill_docstring(modules, concrete, stub);
        }
        // Kind mismatch: the stub defines the API contract and replaces the
        // concrete binding in place.
        _ => {
            if let Some(parent) = modules.get(concrete).parent {
                modules.set_member(parent, stub);
            }
        }
    }
}

fn fill_docstring(modules: &mut ModulesCollection, concrete: ObjectId, stub: ObjectId) {
    if modules.get(concrete).docstring.is_none() {
        modules.get_mut(concrete).docstring = modules.get(stub).docstring.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;
    use crate::objects::{
        AttributeData, Docstring, FunctionData, ObjectNode, Parameter, ParameterKind, Parameters,
    };

    fn function_with(parameters: Vec<Parameter>, returns: Option<Expr>) -> ObjectNode {
        ObjectNode::new(
            "f",
            crate::objects::ObjectData::Function(FunctionData {
                parameters: Parameters::new(parameters),
                returns,
                ..FunctionData::default()
            }),
        )
    }

    #[test]
    fn stub_signature_wins_concrete_docstring_stays() {
        let mut modules = ModulesCollection::new();
        let concrete = modules.alloc(ObjectNode::module("m", None));
        let stub = modules.alloc(ObjectNode::module("m", None));

        let mut concrete_f = function_with(vec![Parameter::new("a", ParameterKind::PositionalOrKeyword)], None);
        concrete_f.docstring = Some(Docstring::new("Adds things.", None, None));
        let concrete_f = modules.alloc(concrete_f);
        modules.set_member(concrete, concrete_f);

        let mut typed = Parameter::new("a", ParameterKind::PositionalOrKeyword);
        typed.annotation = Some(Expr::name("int", None));
        let stub_f = modules.alloc(function_with(vec![typed], Some(Expr::name("int", None))));
        modules.set_member(stub, stub_f);

        merge_stubs(&mut modules, concrete, stub);

        let merged = modules.get(concrete).members["f"];
        assert_eq!(merged, concrete_f);
        let data = modules.get(merged).as_function().unwrap();
        assert_eq!(data.returns.as_ref().unwrap().to_string(), "int");
        assert_eq!(
            data.parameters.get("a").unwrap().annotation.as_ref().unwrap().to_string(),
            "int"
        );
        assert_eq!(modules.get(merged).docstring.as_ref().unwrap().value, "Adds things.");
    }

    #[test]
    fn stub_only_members_are_kept() {
        let mut modules = ModulesCollection::new();
        let concrete = modules.alloc(ObjectNode::module("m", None));
        let stub = modules.alloc(ObjectNode::module("m", None));
        let extra = modules.alloc(ObjectNode::new(
            "extra",
            crate::objects::ObjectData::Attribute(AttributeData::default()),
        ));
        modules.set_member(stub, extra);

        merge_stubs(&mut modules, concrete, stub);
        assert_eq!(modules.get(concrete).members["extra"], extra);
        assert_eq!(modules.get(extra).parent, Some(concrete));
    }

    #[test]
    fn kind_mismatch_is_won_by_the_stub() {
        let mut modules = ModulesCollection::new();
        let concrete = modules.alloc(ObjectNode::module("m", None));
        let stub = modules.alloc(ObjectNode::module("m", None));

        let concrete_x = modules.alloc(ObjectNode::new(
            "x",
            crate::objects::ObjectData::Attribute(AttributeData::default()),
        ));
        modules.set_member(concrete, concrete_x);
        let stub_x = modules.alloc(function_with(Vec::new(), None));
        let stub_x_named = {
            modules.get_mut(stub_x).name = "x".to_string();
            stub_x
        };
        modules.set_member(stub, stub_x_named);

        merge_stubs(&mut modules, concrete, stub);
        assert_eq!(modules.get(concrete).members["x"], stub_x);
    }
}
