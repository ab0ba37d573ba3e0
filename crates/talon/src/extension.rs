use tracing::debug;

use crate::collections::ModulesCollection;
use crate::expr::Expr;
use crate::objects::{
    FunctionData, ObjectData, ObjectId, ObjectNode, Parameter, ParameterKind, Parameters,
};

/// A loader extension: hooks called while the object tree is being built.
///
/// Hooks receive the modules collection and the id of the in-progress
/// object; they may mutate members, labels and `extra`. All hooks default to
/// no-ops so extensions implement only what they need. Extensions run in
/// priority order (highest first), then in registration order.
pub trait Extension {
    fn name(&self) -> &'static str;

    /// Higher priorities run first.
    fn priority(&self) -> u32 {
        100
    }

    /// Called for every object right after it is attached to the tree.
    fn on_instance(&self, _modules: &mut ModulesCollection, _id: ObjectId) {}

    /// Called for every attribute object.
    fn on_attribute_instance(&self, _modules: &mut ModulesCollection, _id: ObjectId) {}

    /// Called for every type alias object.
    fn on_type_alias_instance(&self, _modules: &mut ModulesCollection, _id: ObjectId) {}

    /// Called once a class and all of its members have been visited.
    fn on_class_members(&self, _modules: &mut ModulesCollection, _id: ObjectId) {}

    /// Called once a function and its signature have been visited.
    fn on_function_members(&self, _modules: &mut ModulesCollection, _id: ObjectId) {}

    /// Called after a whole module file has been visited.
    fn on_module_loaded(&self, _modules: &mut ModulesCollection, _id: ObjectId) {}

    /// Called after the package and every submodule finished loading.
    fn on_package_loaded(&self, _modules: &mut ModulesCollection, _root: ObjectId) {}
}

/// Instantiates a built-in extension by name.
pub fn builtin(name: &str) -> Option<Box<dyn Extension>> {
    match name {
        "dataclasses" => Some(Box::new(DataclassExtension)),
        "unpack-typeddict" => Some(Box::new(UnpackTypedDictExtension)),
        _ => None,
    }
}

/// Synthesizes `__init__` methods for dataclass-decorated classes from their
/// annotated class attributes, the way the dataclass machinery would at
/// runtime.
pub struct DataclassExtension;

impl Extension for DataclassExtension {
    fn name(&self) -> &'static str {
        "dataclasses"
    }

    fn on_class_members(&self, modules: &mut ModulesCollection, id: ObjectId) {
        let class = modules.get(id);
        if !class.labels.contains("dataclass") || class.members.contains_key("__init__") {
            return;
        }
        let mut parameters = Parameters::default();
        parameters.push(Parameter::new("self", ParameterKind::PositionalOrKeyword));
        let fields: Vec<ObjectId> = class.members.values().copied().collect();
        for member in fields {
            let node = modules.get(member);
            let Some(attribute) = node.as_attribute() else { continue };
            // Only annotated attributes are dataclass fields; `ClassVar`
            // annotations are not instance state.
            let Some(annotation) = attribute.annotation.clone() else { continue };
            if is_class_var(&annotation) {
                continue;
            }
            let mut parameter = Parameter::new(node.name.clone(), ParameterKind::PositionalOrKeyword);
            parameter.default = attribute.value.clone().map(default_from_field);
            parameter.annotation = Some(annotation);
            parameters.push(parameter);
        }
        debug!("synthesizing __init__ for dataclass {}", modules.path(id));
        let mut init = ObjectNode::new(
            "__init__",
            ObjectData::Function(FunctionData {
                parameters,
                returns: Some(Expr::Constant("None".to_string())),
                ..FunctionData::default()
            }),
        );
        init.labels.insert("synthesized".to_string());
        let init_id = modules.alloc(init);
        modules.set_member(id, init_id);
    }
}

fn is_class_var(annotation: &Expr) -> bool {
    match annotation {
        Expr::Subscript { value, .. } => is_class_var(value),
        Expr::Name(name) => name.name == "ClassVar",
        Expr::Attribute { attr, .. } => attr == "ClassVar",
        _ => false,
    }
}

/// Maps a dataclass field value to the parameter default it produces:
/// `field(default_factory=list)` becomes `list()`, `field(default=x)`
/// becomes `x`, anything else is taken verbatim.
fn default_from_field(value: Expr) -> Expr {
    let Expr::Call { function, arguments } = &value else {
        return value;
    };
    let is_field = match function.as_ref() {
        Expr::Name(name) => name.name == "field",
        Expr::Attribute { attr, .. } => attr == "field",
        _ => false,
    };
    if !is_field {
        return value;
    }
    for argument in arguments {
        if let Expr::Keyword { name, value } = argument {
            match name.as_str() {
                "default" => return (**value).clone(),
                "default_factory" => {
                    return Expr::Call {
                        function: value.clone(),
                        arguments: Vec::new(),
                    };
                }
                _ => {}
            }
        }
    }
    value
}

/// Expands `**kwargs: Unpack[SomeTypedDict]` in function signatures into the
/// keyword-only parameters declared by the TypedDict.
pub struct UnpackTypedDictExtension;

impl Extension for UnpackTypedDictExtension {
    fn name(&self) -> &'static str {
        "unpack-typeddict"
    }

    fn on_package_loaded(&self, modules: &mut ModulesCollection, root: ObjectId) {
        let mut functions = Vec::new();
        collect_functions(modules, root, &mut functions);
        for function in functions {
            expand_unpack(modules, function);
        }
    }
}

fn collect_functions(modules: &ModulesCollection, id: ObjectId, out: &mut Vec<ObjectId>) {
    for &member in modules.get(id).members.values() {
        match &modules.get(member).data {
            ObjectData::Function(_) => out.push(member),
            ObjectData::Module(_) | ObjectData::Class(_) => collect_functions(modules, member, out),
            _ => {}
        }
    }
}

fn unpacked_typeddict_path(annotation: &Expr, modules: &ModulesCollection) -> Option<String> {
    let Expr::Subscript { value, slice } = annotation else {
        return None;
    };
    let is_unpack = match value.as_ref() {
        Expr::Name(name) => name.name == "Unpack",
        Expr::Attribute { attr, .. } => attr == "Unpack",
        _ => false,
    };
    is_unpack.then(|| slice.canonical_path(modules))
}

fn expand_unpack(modules: &mut ModulesCollection, function: ObjectId) {
    let Some(data) = modules.get(function).as_function() else { return };
    let Some(kwargs) = data
        .parameters
        .iter()
        .find(|p| matches!(p.kind, ParameterKind::VarKeyword))
    else {
        return;
    };
    let Some(annotation) = &kwargs.annotation else { return };
    let Some(path) = unpacked_typeddict_path(annotation, modules) else {
        return;
    };
    let Ok(typeddict) = modules.lookup(&path).and_then(|id| modules.final_target(id)) else {
        return;
    };
    let mut replacements = Vec::new();
    for &member in modules.get(typeddict).members.values() {
        let node = modules.get(member);
        if let Some(attribute) = node.as_attribute() {
            if let Some(annotation) = &attribute.annotation {
                let mut parameter = Parameter::new(node.name.clone(), ParameterKind::KeywordOnly);
                parameter.annotation = Some(annotation.clone());
                replacements.push(parameter);
            }
        }
    }
    if replacements.is_empty() {
        return;
    }
    debug!("unpacking {path} into {}", modules.path(function));
    let kwargs_name = kwargs.name.clone();
    if let Some(data) = modules.get_mut(function).as_function_mut() {
        let mut parameters = Parameters::default();
        for parameter in data.parameters.iter() {
            if parameter.name != kwargs_name {
                parameters.push(parameter.clone());
            }
        }
        for parameter in replacements {
            parameters.push(parameter);
        }
        data.parameters = parameters;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{AttributeData, ClassData};

    #[test]
    fn dataclass_init_is_synthesized() {
        let mut modules = ModulesCollection::new();
        let root = modules.alloc(ObjectNode::module("pkg", None));
        modules.insert_root(root);
        let mut class = ObjectNode::new("Point", ObjectData::Class(ClassData::default()));
        class.labels.insert("dataclass".to_string());
        let class = modules.alloc(class);
        modules.set_member(root, class);
        for (name, default) in [("x", None), ("y", Some("0"))] {
            let mut node = ObjectNode::new(
                name,
                ObjectData::Attribute(AttributeData {
                    value: default.map(|d| Expr::Constant(d.to_string())),
                    annotation: Some(Expr::name("int", None)),
                }),
            );
            node.labels.insert("class-attribute".to_string());
            let id = modules.alloc(node);
            modules.set_member(class, id);
        }

        DataclassExtension.on_class_members(&mut modules, class);

        let init = modules.get(class).members["__init__"];
        let data = modules.get(init).as_function().unwrap();
        let names: Vec<&str> = data.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["self", "x", "y"]);
        assert_eq!(
            data.parameters.get("y").unwrap().default.as_ref().unwrap().to_string(),
            "0"
        );
        assert!(modules.get(init).labels.contains("synthesized"));
    }

    #[test]
    fn field_defaults_are_unwrapped() {
        let factory = Expr::Call {
            function: Box::new(Expr::name("field", None)),
            arguments: vec![Expr::Keyword {
                name: "default_factory".to_string(),
                value: Box::new(Expr::name("list", None)),
            }],
        };
        assert_eq!(default_from_field(factory).to_string(), "list()");
    }

    #[test]
    fn non_dataclass_is_untouched() {
        let mut modules = ModulesCollection::new();
        let root = modules.alloc(ObjectNode::module("pkg", None));
        modules.insert_root(root);
        let class = modules.alloc(ObjectNode::new("Plain", ObjectData::Class(ClassData::default())));
        modules.set_member(root, class);

        DataclassExtension.on_class_members(&mut modules, class);
        assert!(modules.get(class).members.is_empty());
    }
}
