use serde_json::{Map, Value, json};

use crate::collections::ModulesCollection;
use crate::docstrings::{
    self, DocstringContext, DocstringOptions, DocstringSection, DocstringStyle, ExamplePart, SectionContent,
};
use crate::error::TalonError;
use crate::expr::{Comprehension, Expr, ExprName, ExprParameter, GeneratorFlavor};
use crate::objects::{
    AliasData, AttributeData, ClassData, Decorator, Docstring, Export, FunctionData, ModuleData, ModulePath,
    ObjectData, ObjectId, ObjectNode, Parameter, ParameterKind, Parameters, TypeAliasData, TypeParameter,
    TypeParameterKind,
};

/// Serializes an object subtree to JSON.
///
/// With `full` the docstring is parsed into structured sections using the
/// given style and options; the minimal form only carries the raw text.
pub fn to_json(
    modules: &ModulesCollection,
    id: ObjectId,
    full: bool,
    style: DocstringStyle,
    options: &DocstringOptions,
) -> Value {
    let node = modules.get(id);
    let mut out = Map::new();
    out.insert("kind".to_string(), json!(node.kind().to_string()));
    out.insert("name".to_string(), json!(node.name));
    out.insert("path".to_string(), json!(modules.path(id)));

    if let ObjectData::Alias(alias) = &node.data {
        out.insert("target_path".to_string(), json!(alias.target_path));
        out.insert("inherited".to_string(), json!(alias.inherited));
        if let Some(lineno) = node.lineno {
            out.insert("lineno".to_string(), json!(lineno));
        }
        if let Some(error) = &alias.error {
            out.insert("resolution_error".to_string(), json!(error));
        }
        return Value::Object(out);
    }

    if let Some(lineno) = node.lineno {
        out.insert("lineno".to_string(), json!(lineno));
    }
    if let Some(endlineno) = node.endlineno {
        out.insert("endlineno".to_string(), json!(endlineno));
    }
    if let Some(docstring) = &node.docstring {
        out.insert(
            "docstring".to_string(),
            docstring_to_json(docstring, modules, id, full, style, options),
        );
    }
    if !node.labels.is_empty() {
        out.insert("labels".to_string(), json!(node.labels));
    }
    if !node.runtime {
        out.insert("runtime".to_string(), json!(false));
    }
    if let Some(public) = node.public {
        out.insert("public".to_string(), json!(public));
    }
    if let Some(deprecated) = &node.deprecated {
        out.insert("deprecated".to_string(), json!(deprecated));
    }
    if !node.imports.is_empty() {
        let imports: Map<String, Value> = node
            .imports
            .iter()
            .map(|(name, target)| (name.clone(), json!(target)))
            .collect();
        out.insert("imports".to_string(), Value::Object(imports));
    }
    if !node.extra.is_empty() {
        out.insert("extra".to_string(), json!(node.extra));
    }

    match &node.data {
        ObjectData::Module(data) => {
            match &data.filepath {
                Some(ModulePath::File(path)) => {
                    out.insert("filepath".to_string(), json!(path));
                }
                Some(ModulePath::Namespace(paths)) => {
                    out.insert("filepath".to_string(), json!(paths));
                }
                None => {
                    out.insert("filepath".to_string(), Value::Null);
                }
            }
            if let Some(exports) = &data.exports {
                let exports: Vec<Value> = exports
                    .iter()
                    .map(|export| match export {
                        Export::Name(name) => json!(name),
                        Export::Expr(expr) => expr_to_json(expr),
                    })
                    .collect();
                out.insert("exports".to_string(), Value::Array(exports));
            }
        }
        ObjectData::Class(data) => {
            out.insert(
                "bases".to_string(),
                Value::Array(data.bases.iter().map(expr_to_json).collect()),
            );
            out.insert("decorators".to_string(), decorators_to_json(&data.decorators));
            out.insert(
                "type_parameters".to_string(),
                type_parameters_to_json(&data.type_parameters),
            );
        }
        ObjectData::Function(data) => {
            out.insert("parameters".to_string(), parameters_to_json(&data.parameters));
            out.insert(
                "returns".to_string(),
                data.returns.as_ref().map_or(Value::Null, expr_to_json),
            );
            out.insert("decorators".to_string(), decorators_to_json(&data.decorators));
            out.insert(
                "type_parameters".to_string(),
                type_parameters_to_json(&data.type_parameters),
            );
            if !data.overloads.is_empty() {
                let overloads: Vec<Value> = data
                    .overloads
                    .iter()
                    .map(|&overload| to_json(modules, overload, full, style, options))
                    .collect();
                out.insert("overloads".to_string(), Value::Array(overloads));
            }
        }
        ObjectData::Attribute(data) => {
            out.insert(
                "value".to_string(),
                data.value.as_ref().map_or(Value::Null, expr_to_json),
            );
            out.insert(
                "annotation".to_string(),
                data.annotation.as_ref().map_or(Value::Null, expr_to_json),
            );
        }
        ObjectData::TypeAlias(data) => {
            out.insert(
                "value".to_string(),
                data.value.as_ref().map_or(Value::Null, expr_to_json),
            );
            out.insert(
                "type_parameters".to_string(),
                type_parameters_to_json(&data.type_parameters),
            );
        }
        ObjectData::Alias(_) => unreachable!("aliases serialized above"),
    }

    if !node.members.is_empty() {
        let members: Map<String, Value> = node
            .members
            .iter()
            .map(|(name, &member)| (name.clone(), to_json(modules, member, full, style, options)))
            .collect();
        out.insert("members".to_string(), Value::Object(members));
    }
    Value::Object(out)
}

fn docstring_to_json(
    docstring: &Docstring,
    modules: &ModulesCollection,
    owner: ObjectId,
    full: bool,
    style: DocstringStyle,
    options: &DocstringOptions,
) -> Value {
    let mut out = Map::new();
    out.insert("value".to_string(), json!(docstring.value));
    if let Some(lineno) = docstring.lineno {
        out.insert("lineno".to_string(), json!(lineno));
    }
    if let Some(endlineno) = docstring.endlineno {
        out.insert("endlineno".to_string(), json!(endlineno));
    }
    if full {
        let sections = docstrings::parse(
            docstring,
            style,
            options,
            Some(DocstringContext { modules, owner }),
        );
        out.insert(
            "parsed".to_string(),
            Value::Array(sections.iter().map(section_to_json).collect()),
        );
    }
    Value::Object(out)
}

fn section_to_json(section: &DocstringSection) -> Value {
    let mut out = Map::new();
    out.insert("kind".to_string(), json!(section.kind()));
    if let Some(title) = &section.title {
        out.insert("title".to_string(), json!(title));
    }
    let value = match &section.content {
        SectionContent::Text(text) => json!(text),
        SectionContent::Parameters(items)
        | SectionContent::OtherParameters(items)
        | SectionContent::TypeParameters(items) => Value::Array(
            items
                .iter()
                .map(|item| {
                    json!({
                        "name": item.name,
                        "annotation": item.annotation.as_ref().map_or(Value::Null, expr_to_json),
                        "description": item.description,
                    })
                })
                .collect(),
        ),
        SectionContent::Raises(items) | SectionContent::Warns(items) => Value::Array(
            items
                .iter()
                .map(|item| {
                    json!({
                        "annotation": item.annotation.as_ref().map_or(Value::Null, expr_to_json),
                        "description": item.description,
                    })
                })
                .collect(),
        ),
        SectionContent::Returns(items) | SectionContent::Yields(items) | SectionContent::Receives(items) => {
            Value::Array(
                items
                    .iter()
                    .map(|item| {
                        json!({
                            "name": item.name,
                            "annotation": item.annotation.as_ref().map_or(Value::Null, expr_to_json),
                            "description": item.description,
                        })
                    })
                    .collect(),
            )
        }
        SectionContent::Attributes(items) => Value::Array(
            items
                .iter()
                .map(|item| {
                    json!({
                        "name": item.name,
                        "annotation": item.annotation.as_ref().map_or(Value::Null, expr_to_json),
                        "description": item.description,
                    })
                })
                .collect(),
        ),
        SectionContent::Functions(items)
        | SectionContent::Classes(items)
        | SectionContent::Modules(items)
        | SectionContent::TypeAliases(items) => Value::Array(
            items
                .iter()
                .map(|item| {
                    json!({
                        "name": item.name,
                        "signature": item.signature,
                        "description": item.description,
                    })
                })
                .collect(),
        ),
        SectionContent::Examples(parts) => Value::Array(
            parts
                .iter()
                .map(|part| match part {
                    ExamplePart::Text(text) => json!({"kind": "text", "value": text}),
                    ExamplePart::Code(code) => json!({"kind": "code", "value": code}),
                })
                .collect(),
        ),
        SectionContent::Deprecated { version, text } => json!({
            "version": version,
            "text": text,
        }),
        SectionContent::Admonition { kind, text } => json!({
            "annotation": kind,
            "text": text,
        }),
    };
    out.insert("value".to_string(), value);
    Value::Object(out)
}

fn parameters_to_json(parameters: &Parameters) -> Value {
    Value::Array(
        parameters
            .iter()
            .map(|parameter| {
                let mut out = Map::new();
                out.insert("name".to_string(), json!(parameter.name));
                out.insert("kind".to_string(), json!(parameter.kind.to_string()));
                out.insert(
                    "annotation".to_string(),
                    parameter.annotation.as_ref().map_or(Value::Null, expr_to_json),
                );
                out.insert(
                    "default".to_string(),
                    parameter.default.as_ref().map_or(Value::Null, expr_to_json),
                );
                if let Some(docstring) = &parameter.docstring {
                    out.insert("docstring".to_string(), json!(docstring));
                }
                Value::Object(out)
            })
            .collect(),
    )
}

fn decorators_to_json(decorators: &[Decorator]) -> Value {
    Value::Array(
        decorators
            .iter()
            .map(|decorator| {
                json!({
                    "value": expr_to_json(&decorator.value),
                    "lineno": decorator.lineno,
                    "endlineno": decorator.endlineno,
                })
            })
            .collect(),
    )
}

fn type_parameters_to_json(type_parameters: &[TypeParameter]) -> Value {
    Value::Array(
        type_parameters
            .iter()
            .map(|tp| {
                json!({
                    "name": tp.name,
                    "kind": tp.kind.to_string(),
                    "bound": tp.bound.as_ref().map_or(Value::Null, expr_to_json),
                    "default": tp.default.as_ref().map_or(Value::Null, expr_to_json),
                })
            })
            .collect(),
    )
}

fn opt_expr_to_json(expr: Option<&Expr>) -> Value {
    expr.map_or(Value::Null, expr_to_json)
}

/// Serializes an expression tree, tagging every node with its `cls`.
pub fn expr_to_json(expr: &Expr) -> Value {
    let mut out = Map::new();
    out.insert("cls".to_string(), json!(expr.cls()));
    match expr {
        Expr::Name(name) => {
            out.insert("name".to_string(), json!(name.name));
        }
        Expr::Attribute { value, attr } => {
            out.insert("value".to_string(), expr_to_json(value));
            out.insert("attr".to_string(), json!(attr));
        }
        Expr::Subscript { value, slice } => {
            out.insert("value".to_string(), expr_to_json(value));
            out.insert("slice".to_string(), expr_to_json(slice));
        }
        Expr::Tuple { elements, implicit } => {
            out.insert(
                "elements".to_string(),
                Value::Array(elements.iter().map(expr_to_json).collect()),
            );
            out.insert("implicit".to_string(), json!(implicit));
        }
        Expr::List(elements) | Expr::Set(elements) => {
            out.insert(
                "elements".to_string(),
                Value::Array(elements.iter().map(expr_to_json).collect()),
            );
        }
        Expr::Dict { keys, values } => {
            out.insert(
                "keys".to_string(),
                Value::Array(
                    keys.iter()
                        .map(|key| key.as_ref().map_or(Value::Null, expr_to_json))
                        .collect(),
                ),
            );
            out.insert(
                "values".to_string(),
                Value::Array(values.iter().map(expr_to_json).collect()),
            );
        }
        Expr::Call { function, arguments } => {
            out.insert("function".to_string(), expr_to_json(function));
            out.insert(
                "arguments".to_string(),
                Value::Array(arguments.iter().map(expr_to_json).collect()),
            );
        }
        Expr::Keyword { name, value } => {
            out.insert("name".to_string(), json!(name));
            out.insert("value".to_string(), expr_to_json(value));
        }
        Expr::BinOp { left, operator, right } => {
            out.insert("left".to_string(), expr_to_json(left));
            out.insert("operator".to_string(), json!(operator));
            out.insert("right".to_string(), expr_to_json(right));
        }
        Expr::UnaryOp { operator, operand } => {
            out.insert("operator".to_string(), json!(operator));
            out.insert("operand".to_string(), expr_to_json(operand));
        }
        Expr::BoolOp { operator, values } => {
            out.insert("operator".to_string(), json!(operator));
            out.insert(
                "values".to_string(),
                Value::Array(values.iter().map(expr_to_json).collect()),
            );
        }
        Expr::Compare {
            left,
            operators,
            comparators,
        } => {
            out.insert("left".to_string(), expr_to_json(left));
            out.insert("operators".to_string(), json!(operators));
            out.insert(
                "comparators".to_string(),
                Value::Array(comparators.iter().map(expr_to_json).collect()),
            );
        }
        Expr::Constant(value) | Expr::String(value) => {
            out.insert("value".to_string(), json!(value));
        }
        Expr::Lambda { parameters, body } => {
            out.insert(
                "parameters".to_string(),
                Value::Array(
                    parameters
                        .iter()
                        .map(|p| {
                            json!({
                                "name": p.name,
                                "kind": p.kind.to_string(),
                                "default": p.default.as_ref().map_or(Value::Null, expr_to_json),
                            })
                        })
                        .collect(),
                ),
            );
            out.insert("body".to_string(), expr_to_json(body));
        }
        Expr::Slice { lower, upper, step } => {
            out.insert("lower".to_string(), opt_expr_to_json(lower.as_deref()));
            out.insert("upper".to_string(), opt_expr_to_json(upper.as_deref()));
            out.insert("step".to_string(), opt_expr_to_json(step.as_deref()));
        }
        Expr::Starred(value) | Expr::VarPositional(value) | Expr::VarKeyword(value) => {
            out.insert("value".to_string(), expr_to_json(value));
        }
        Expr::Generator {
            flavor,
            element,
            value,
            generators,
        } => {
            out.insert(
                "flavor".to_string(),
                json!(match flavor {
                    GeneratorFlavor::Generator => "generator",
                    GeneratorFlavor::ListComp => "list",
                    GeneratorFlavor::SetComp => "set",
                    GeneratorFlavor::DictComp => "dict",
                }),
            );
            out.insert("element".to_string(), expr_to_json(element));
            out.insert("value".to_string(), opt_expr_to_json(value.as_deref()));
            out.insert(
                "generators".to_string(),
                Value::Array(
                    generators
                        .iter()
                        .map(|comp| {
                            json!({
                                "target": expr_to_json(&comp.target),
                                "iterable": expr_to_json(&comp.iterable),
                                "conditions": comp.conditions.iter().map(expr_to_json).collect::<Vec<_>>(),
                                "is_async": comp.is_async,
                            })
                        })
                        .collect(),
                ),
            );
        }
        Expr::IfExpr { body, test, orelse } => {
            out.insert("body".to_string(), expr_to_json(body));
            out.insert("test".to_string(), expr_to_json(test));
            out.insert("orelse".to_string(), expr_to_json(orelse));
        }
        Expr::NamedExpr { target, value } => {
            out.insert("target".to_string(), expr_to_json(target));
            out.insert("value".to_string(), expr_to_json(value));
        }
    }
    Value::Object(out)
}

fn malformed(what: &str) -> TalonError {
    TalonError::Load {
        path: "<json>".into(),
        reason: format!("malformed serialized tree: {what}"),
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> Result<&'a str, TalonError> {
    value
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(&format!("missing string field '{key}'")))
}

fn opt_expr_field(value: &Value, key: &str) -> Result<Option<Expr>, TalonError> {
    match value.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(expr) => Ok(Some(expr_from_json(expr)?)),
    }
}

/// Rebuilds a module subtree from its serialized form, returning the root
/// id. The caller registers the returned module as a root when appropriate.
pub fn module_from_json(modules: &mut ModulesCollection, value: &Value) -> Result<ObjectId, TalonError> {
    object_from_json(modules, value)
}

fn object_from_json(modules: &mut ModulesCollection, value: &Value) -> Result<ObjectId, TalonError> {
    let kind = str_field(value, "kind")?;
    let name = str_field(value, "name")?;

    let data = match kind {
        "module" => {
            let filepath = match value.get("filepath") {
                None | Some(Value::Null) => None,
                Some(Value::String(path)) => Some(ModulePath::File(path.into())),
                Some(Value::Array(paths)) => Some(ModulePath::Namespace(
                    paths
                        .iter()
                        .filter_map(Value::as_str)
                        .map(Into::into)
                        .collect(),
                )),
                Some(_) => return Err(malformed("filepath")),
            };
            let exports = match value.get("exports") {
                None | Some(Value::Null) => None,
                Some(Value::Array(items)) => Some(
                    items
                        .iter()
                        .map(|item| match item {
                            Value::String(name) => Ok(Export::Name(name.clone())),
                            other => Ok(Export::Expr(expr_from_json(other)?)),
                        })
                        .collect::<Result<Vec<_>, TalonError>>()?,
                ),
                Some(_) => return Err(malformed("exports")),
            };
            ObjectData::Module(ModuleData {
                filepath,
                exports,
                ..ModuleData::default()
            })
        }
        "class" => ObjectData::Class(ClassData {
            bases: expr_array(value, "bases")?,
            decorators: decorators_from_json(value)?,
            type_parameters: type_parameters_from_json(value)?,
            ..ClassData::default()
        }),
        "function" => ObjectData::Function(FunctionData {
            parameters: parameters_from_json(value)?,
            returns: opt_expr_field(value, "returns")?,
            decorators: decorators_from_json(value)?,
            type_parameters: type_parameters_from_json(value)?,
            overloads: Vec::new(),
        }),
        "attribute" => ObjectData::Attribute(AttributeData {
            value: opt_expr_field(value, "value")?,
            annotation: opt_expr_field(value, "annotation")?,
        }),
        "type-alias" => ObjectData::TypeAlias(TypeAliasData {
            value: opt_expr_field(value, "value")?,
            type_parameters: type_parameters_from_json(value)?,
        }),
        "alias" => ObjectData::Alias(AliasData {
            target_path: str_field(value, "target_path")?.to_string(),
            target: None,
            inherited: value.get("inherited").and_then(Value::as_bool).unwrap_or(false),
            error: None,
        }),
        other => return Err(malformed(&format!("unknown kind '{other}'"))),
    };

    let mut node = ObjectNode::new(name, data);
    node.lineno = value.get("lineno").and_then(Value::as_u64).map(|v| v as usize);
    node.endlineno = value.get("endlineno").and_then(Value::as_u64).map(|v| v as usize);
    node.runtime = value.get("runtime").and_then(Value::as_bool).unwrap_or(true);
    node.public = value.get("public").and_then(Value::as_bool);
    node.deprecated = value
        .get("deprecated")
        .and_then(Value::as_str)
        .map(str::to_string);
    if let Some(Value::Array(labels)) = value.get("labels") {
        node.labels = labels
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
    }
    if let Some(Value::Object(imports)) = value.get("imports") {
        for (local, target) in imports {
            if let Some(target) = target.as_str() {
                node.imports.insert(local.clone(), target.to_string());
            }
        }
    }
    if let Some(docstring) = value.get("docstring") {
        node.docstring = Some(Docstring::new(
            str_field(docstring, "value")?,
            docstring.get("lineno").and_then(Value::as_u64).map(|v| v as usize),
            docstring.get("endlineno").and_then(Value::as_u64).map(|v| v as usize),
        ));
    }

    let id = modules.alloc(node);
    if let Some(Value::Object(members)) = value.get("members") {
        for member in members.values() {
            let child = object_from_json(modules, member)?;
            modules.set_member(id, child);
            // Overload signatures hang off their implementation without
            // being members; they share the implementation's parent.
            let overloads = match &modules.get(child).data {
                ObjectData::Function(data) => data.overloads.clone(),
                _ => Vec::new(),
            };
            for overload in overloads {
                modules.get_mut(overload).parent = Some(id);
            }
        }
    }
    if let Some(Value::Array(items)) = value.get("overloads") {
        let mut overloads = Vec::with_capacity(items.len());
        for item in items {
            overloads.push(object_from_json(modules, item)?);
        }
        if let ObjectData::Function(data) = &mut modules.get_mut(id).data {
            data.overloads = overloads;
        }
    }
    Ok(id)
}

fn expr_array(value: &Value, key: &str) -> Result<Vec<Expr>, TalonError> {
    match value.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items.iter().map(expr_from_json).collect(),
        Some(_) => Err(malformed(key)),
    }
}

fn decorators_from_json(value: &Value) -> Result<Vec<Decorator>, TalonError> {
    let Some(Value::Array(items)) = value.get("decorators") else {
        return Ok(Vec::new());
    };
    items
        .iter()
        .map(|item| {
            Ok(Decorator {
                value: expr_from_json(item.get("value").ok_or_else(|| malformed("decorator value"))?)?,
                lineno: item.get("lineno").and_then(Value::as_u64).map(|v| v as usize),
                endlineno: item.get("endlineno").and_then(Value::as_u64).map(|v| v as usize),
            })
        })
        .collect()
}

fn type_parameters_from_json(value: &Value) -> Result<Vec<TypeParameter>, TalonError> {
    let Some(Value::Array(items)) = value.get("type_parameters") else {
        return Ok(Vec::new());
    };
    items
        .iter()
        .map(|item| {
            let kind = match str_field(item, "kind")? {
                "type-var-tuple" => TypeParameterKind::TypeVarTuple,
                "param-spec" => TypeParameterKind::ParamSpec,
                _ => TypeParameterKind::TypeVar,
            };
            Ok(TypeParameter {
                name: str_field(item, "name")?.to_string(),
                kind,
                bound: opt_expr_field(item, "bound")?,
                default: opt_expr_field(item, "default")?,
            })
        })
        .collect()
}

fn parameter_kind(text: &str) -> ParameterKind {
    text.parse().unwrap_or(ParameterKind::PositionalOrKeyword)
}

fn parameters_from_json(value: &Value) -> Result<Parameters, TalonError> {
    let Some(Value::Array(items)) = value.get("parameters") else {
        return Ok(Parameters::default());
    };
    let mut parameters = Parameters::default();
    for item in items {
        let mut parameter = Parameter::new(
            str_field(item, "name")?.to_string(),
            parameter_kind(str_field(item, "kind")?),
        );
        parameter.annotation = opt_expr_field(item, "annotation")?;
        parameter.default = opt_expr_field(item, "default")?;
        parameter.docstring = item.get("docstring").and_then(Value::as_str).map(str::to_string);
        parameters.push(parameter);
    }
    Ok(parameters)
}

/// Rebuilds an expression from its `cls`-tagged serialized form.
pub fn expr_from_json(value: &Value) -> Result<Expr, TalonError> {
    let cls = str_field(value, "cls")?;
    let expr = match cls {
        "ExprName" => Expr::Name(ExprName::new(str_field(value, "name")?, None)),
        "ExprAttribute" => Expr::Attribute {
            value: Box::new(expr_from_json(value.get("value").ok_or_else(|| malformed("value"))?)?),
            attr: str_field(value, "attr")?.to_string(),
        },
        "ExprSubscript" => Expr::Subscript {
            value: Box::new(expr_from_json(value.get("value").ok_or_else(|| malformed("value"))?)?),
            slice: Box::new(expr_from_json(value.get("slice").ok_or_else(|| malformed("slice"))?)?),
        },
        "ExprTuple" => Expr::Tuple {
            elements: expr_array(value, "elements")?,
            implicit: value.get("implicit").and_then(Value::as_bool).unwrap_or(false),
        },
        "ExprList" => Expr::List(expr_array(value, "elements")?),
        "ExprSet" => Expr::Set(expr_array(value, "elements")?),
        "ExprDict" => {
            let keys = match value.get("keys") {
                Some(Value::Array(items)) => items
                    .iter()
                    .map(|item| match item {
                        Value::Null => Ok(None),
                        other => Ok(Some(expr_from_json(other)?)),
                    })
                    .collect::<Result<Vec<_>, TalonError>>()?,
                _ => Vec::new(),
            };
            Expr::Dict {
                keys,
                values: expr_array(value, "values")?,
            }
        }
        "ExprCall" => Expr::Call {
            function: Box::new(expr_from_json(
                value.get("function").ok_or_else(|| malformed("function"))?,
            )?),
            arguments: expr_array(value, "arguments")?,
        },
        "ExprKeyword" => Expr::Keyword {
            name: str_field(value, "name")?.to_string(),
            value: Box::new(expr_from_json(value.get("value").ok_or_else(|| malformed("value"))?)?),
        },
        "ExprBinOp" => Expr::BinOp {
            left: Box::new(expr_from_json(value.get("left").ok_or_else(|| malformed("left"))?)?),
            operator: str_field(value, "operator")?.to_string(),
            right: Box::new(expr_from_json(value.get("right").ok_or_else(|| malformed("right"))?)?),
        },
        "ExprUnaryOp" => Expr::UnaryOp {
            operator: str_field(value, "operator")?.to_string(),
            operand: Box::new(expr_from_json(
                value.get("operand").ok_or_else(|| malformed("operand"))?,
            )?),
        },
        "ExprBoolOp" => Expr::BoolOp {
            operator: str_field(value, "operator")?.to_string(),
            values: expr_array(value, "values")?,
        },
        "ExprCompare" => Expr::Compare {
            left: Box::new(expr_from_json(value.get("left").ok_or_else(|| malformed("left"))?)?),
            operators: match value.get("operators") {
                Some(Value::Array(items)) => items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
                _ => Vec::new(),
            },
            comparators: expr_array(value, "comparators")?,
        },
        "ExprConstant" => Expr::Constant(str_field(value, "value")?.to_string()),
        "ExprString" => Expr::String(str_field(value, "value")?.to_string()),
        "ExprLambda" => {
            let parameters = match value.get("parameters") {
                Some(Value::Array(items)) => items
                    .iter()
                    .map(|item| {
                        Ok(ExprParameter {
                            name: str_field(item, "name")?.to_string(),
                            kind: parameter_kind(str_field(item, "kind")?),
                            default: opt_expr_field(item, "default")?,
                        })
                    })
                    .collect::<Result<Vec<_>, TalonError>>()?,
                _ => Vec::new(),
            };
            Expr::Lambda {
                parameters,
                body: Box::new(expr_from_json(value.get("body").ok_or_else(|| malformed("body"))?)?),
            }
        }
        "ExprSlice" => Expr::Slice {
            lower: opt_expr_field(value, "lower")?.map(Box::new),
            upper: opt_expr_field(value, "upper")?.map(Box::new),
            step: opt_expr_field(value, "step")?.map(Box::new),
        },
        "ExprStarred" => Expr::Starred(Box::new(expr_from_json(
            value.get("value").ok_or_else(|| malformed("value"))?,
        )?)),
        "ExprVarPositional" => Expr::VarPositional(Box::new(expr_from_json(
            value.get("value").ok_or_else(|| malformed("value"))?,
        )?)),
        "ExprVarKeyword" => Expr::VarKeyword(Box::new(expr_from_json(
            value.get("value").ok_or_else(|| malformed("value"))?,
        )?)),
        "ExprGenerator" => {
            let flavor = match value.get("flavor").and_then(Value::as_str) {
                Some("list") => GeneratorFlavor::ListComp,
                Some("set") => GeneratorFlavor::SetComp,
                Some("dict") => GeneratorFlavor::DictComp,
                _ => GeneratorFlavor::Generator,
            };
            let generators = match value.get("generators") {
                Some(Value::Array(items)) => items
                    .iter()
                    .map(|item| {
                        Ok(Comprehension {
                            target: expr_from_json(item.get("target").ok_or_else(|| malformed("target"))?)?,
                            iterable: expr_from_json(
                                item.get("iterable").ok_or_else(|| malformed("iterable"))?,
                            )?,
                            conditions: expr_array(item, "conditions")?,
                            is_async: item.get("is_async").and_then(Value::as_bool).unwrap_or(false),
                        })
                    })
                    .collect::<Result<Vec<_>, TalonError>>()?,
                _ => Vec::new(),
            };
            Expr::Generator {
                flavor,
                element: Box::new(expr_from_json(
                    value.get("element").ok_or_else(|| malformed("element"))?,
                )?),
                value: opt_expr_field(value, "value")?.map(Box::new),
                generators,
            }
        }
        "ExprIfExp" => Expr::IfExpr {
            body: Box::new(expr_from_json(value.get("body").ok_or_else(|| malformed("body"))?)?),
            test: Box::new(expr_from_json(value.get("test").ok_or_else(|| malformed("test"))?)?),
            orelse: Box::new(expr_from_json(value.get("orelse").ok_or_else(|| malformed("orelse"))?)?),
        },
        "ExprNamedExpr" => Expr::NamedExpr {
            target: Box::new(expr_from_json(value.get("target").ok_or_else(|| malformed("target"))?)?),
            value: Box::new(expr_from_json(value.get("value").ok_or_else(|| malformed("value"))?)?),
        },
        other => return Err(malformed(&format!("unknown expression class '{other}'"))),
    };
    Ok(expr)
}
