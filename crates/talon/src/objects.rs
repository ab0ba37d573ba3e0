use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use indexmap::IndexMap;

use crate::expr::Expr;

/// Index of an object inside the modules collection arena.
///
/// All cross-references in the object tree (parents, members, alias targets,
/// overloads, name scopes) are stored as ids so that ownership stays with the
/// arena and back-references never form retention cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub(crate) u32);

impl ObjectId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// The kind tag of an object node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum ObjectKind {
    Module,
    Class,
    Function,
    Attribute,
    TypeAlias,
    Alias,
}

/// Physical location of a module on disk.
///
/// Regular modules and packages have a single file; namespace packages span
/// one or more directories; builtin modules have no filepath at all (their
/// `filepath` field is `None`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModulePath {
    File(PathBuf),
    Namespace(Vec<PathBuf>),
}

impl ModulePath {
    /// The single file path, if this is a regular file-backed module.
    pub fn as_file(&self) -> Option<&PathBuf> {
        match self {
            Self::File(path) => Some(path),
            Self::Namespace(_) => None,
        }
    }
}

/// One entry of a module's `__all__` list before expansion.
///
/// Literal strings stay as names; anything else (typically a reference to
/// another module's `__all__`, like `other.__all__` inside a concatenation)
/// is kept as an expression for the resolver to expand.
#[derive(Debug, Clone)]
pub enum Export {
    Name(String),
    Expr(Expr),
}

/// A recorded `from M import *` statement, expanded by the alias resolver.
#[derive(Debug, Clone)]
pub struct WildcardImport {
    /// Dotted path of the module the wildcard pulls from.
    pub target: String,
    pub lineno: Option<usize>,
}

/// A raw docstring with its source position.
///
/// Structuring into sections is performed by the docstring parsers on demand;
/// the object tree only stores the cleaned-up raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Docstring {
    pub value: String,
    pub lineno: Option<usize>,
    pub endlineno: Option<usize>,
}

impl Docstring {
    pub fn new(value: impl Into<String>, lineno: Option<usize>, endlineno: Option<usize>) -> Self {
        Self {
            value: value.into(),
            lineno,
            endlineno,
        }
    }
}

/// The kind of a function parameter, in declaration-order categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum ParameterKind {
    PositionalOnly,
    PositionalOrKeyword,
    VarPositional,
    KeywordOnly,
    VarKeyword,
}

/// A single function parameter.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub kind: ParameterKind,
    pub annotation: Option<Expr>,
    pub default: Option<Expr>,
    /// Description attached by docstring parsing, when the enclosing
    /// function's docstring documents this parameter.
    pub docstring: Option<String>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, kind: ParameterKind) -> Self {
        Self {
            name: name.into(),
            kind,
            annotation: None,
            default: None,
            docstring: None,
        }
    }

    /// Whether the parameter must be supplied by the caller.
    pub fn required(&self) -> bool {
        self.default.is_none()
            && !matches!(self.kind, ParameterKind::VarPositional | ParameterKind::VarKeyword)
    }
}

/// An ordered list of parameters with by-name lookup.
#[derive(Debug, Clone, Default)]
pub struct Parameters(Vec<Parameter>);

impl Parameters {
    pub fn new(params: Vec<Parameter>) -> Self {
        Self(params)
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.0.iter().find(|p| p.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.0.iter_mut().find(|p| p.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, param: Parameter) {
        self.0.push(param);
    }
}

impl<'a> IntoIterator for &'a Parameters {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// The kind of a PEP 695 type parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum TypeParameterKind {
    TypeVar,
    TypeVarTuple,
    ParamSpec,
}

/// A type parameter declared with PEP 695 syntax (`def f[T](...)`).
#[derive(Debug, Clone)]
pub struct TypeParameter {
    pub name: String,
    pub kind: TypeParameterKind,
    pub bound: Option<Expr>,
    pub default: Option<Expr>,
}

/// A decorator applied to a function or class, kept as an expression.
#[derive(Debug, Clone)]
pub struct Decorator {
    pub value: Expr,
    pub lineno: Option<usize>,
    pub endlineno: Option<usize>,
}

impl Decorator {
    /// The dotted path of the decorator callable, ignoring call arguments.
    ///
    /// `@app.route("/")` yields `app.route`; `@property` yields `property`.
    pub fn callable_path(&self) -> String {
        match &self.value {
            Expr::Call { function, .. } => function.to_string(),
            other => other.to_string(),
        }
    }
}

/// Kind-specific payload of a module node.
#[derive(Debug, Clone, Default)]
pub struct ModuleData {
    pub filepath: Option<ModulePath>,
    /// The module's `__all__`, once assigned; `None` when no `__all__` was
    /// seen. Expanded in place by the alias resolver.
    pub exports: Option<Vec<Export>>,
    /// Pending `from M import *` statements, consumed by the resolver.
    pub wildcard_imports: Vec<WildcardImport>,
    /// Overload-decorated functions grouped under the final definition name.
    pub overloads: IndexMap<String, Vec<ObjectId>>,
}

/// Kind-specific payload of a class node.
#[derive(Debug, Clone, Default)]
pub struct ClassData {
    pub bases: Vec<Expr>,
    /// Keyword arguments in the class statement head (e.g. `metaclass=...`).
    pub keywords: Vec<Expr>,
    pub decorators: Vec<Decorator>,
    pub type_parameters: Vec<TypeParameter>,
    pub overloads: IndexMap<String, Vec<ObjectId>>,
    /// Memoized inherited members, materialized on first access as alias
    /// nodes marked `inherited`.
    pub inherited: Option<IndexMap<String, ObjectId>>,
}

/// Kind-specific payload of a function node.
#[derive(Debug, Clone, Default)]
pub struct FunctionData {
    pub parameters: Parameters,
    pub returns: Option<Expr>,
    pub decorators: Vec<Decorator>,
    pub type_parameters: Vec<TypeParameter>,
    /// Sibling `@overload` signatures preceding this definition.
    pub overloads: Vec<ObjectId>,
}

/// Kind-specific payload of an attribute node.
#[derive(Debug, Clone, Default)]
pub struct AttributeData {
    pub value: Option<Expr>,
    pub annotation: Option<Expr>,
}

/// Kind-specific payload of a type alias node.
#[derive(Debug, Clone, Default)]
pub struct TypeAliasData {
    pub value: Option<Expr>,
    pub type_parameters: Vec<TypeParameter>,
}

/// Kind-specific payload of an alias node.
///
/// The target is a dotted path resolved lazily through the modules
/// collection; once resolution succeeds the id is memoized. A failed
/// resolution records its error message so consumers see the same failure on
/// every access while the loader logs it only once.
#[derive(Debug, Clone)]
pub struct AliasData {
    pub target_path: String,
    pub target: Option<ObjectId>,
    pub inherited: bool,
    pub error: Option<String>,
}

/// Kind-tagged payload of an object node.
#[derive(Debug, Clone)]
pub enum ObjectData {
    Module(ModuleData),
    Class(ClassData),
    Function(FunctionData),
    Attribute(AttributeData),
    TypeAlias(TypeAliasData),
    Alias(AliasData),
}

impl ObjectData {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Module(_) => ObjectKind::Module,
            Self::Class(_) => ObjectKind::Class,
            Self::Function(_) => ObjectKind::Function,
            Self::Attribute(_) => ObjectKind::Attribute,
            Self::TypeAlias(_) => ObjectKind::TypeAlias,
            Self::Alias(_) => ObjectKind::Alias,
        }
    }
}

/// A node of the object tree: one module, class, function, attribute, type
/// alias or alias, with the fields shared by every kind plus a kind-specific
/// payload.
#[derive(Debug, Clone)]
pub struct ObjectNode {
    pub name: String,
    pub parent: Option<ObjectId>,
    /// Children in source declaration order.
    pub members: IndexMap<String, ObjectId>,
    pub lineno: Option<usize>,
    pub endlineno: Option<usize>,
    pub docstring: Option<Docstring>,
    pub labels: BTreeSet<String>,
    /// False when the object only exists under a type-checking guard.
    pub runtime: bool,
    /// Explicit visibility override; `None` means "compute from the name".
    pub public: Option<bool>,
    pub deprecated: Option<String>,
    /// Namespaced metadata set by extensions.
    pub extra: BTreeMap<String, serde_json::Map<String, serde_json::Value>>,
    /// Local name to canonical dotted path of symbols imported in this scope.
    pub imports: IndexMap<String, String>,
    pub data: ObjectData,
}

impl ObjectNode {
    pub fn new(name: impl Into<String>, data: ObjectData) -> Self {
        Self {
            name: name.into(),
            parent: None,
            members: IndexMap::new(),
            lineno: None,
            endlineno: None,
            docstring: None,
            labels: BTreeSet::new(),
            runtime: true,
            public: None,
            deprecated: None,
            extra: BTreeMap::new(),
            imports: IndexMap::new(),
            data,
        }
    }

    /// Builds a module node backed by a single file.
    pub fn module(name: impl Into<String>, filepath: Option<ModulePath>) -> Self {
        Self::new(
            name,
            ObjectData::Module(ModuleData {
                filepath,
                ..ModuleData::default()
            }),
        )
    }

    /// Builds an alias node pointing at `target_path`.
    pub fn alias(name: impl Into<String>, target_path: impl Into<String>) -> Self {
        Self::new(
            name,
            ObjectData::Alias(AliasData {
                target_path: target_path.into(),
                target: None,
                inherited: false,
                error: None,
            }),
        )
    }

    pub fn kind(&self) -> ObjectKind {
        self.data.kind()
    }

    pub fn is_alias(&self) -> bool {
        matches!(self.data, ObjectData::Alias(_))
    }

    pub fn is_module(&self) -> bool {
        matches!(self.data, ObjectData::Module(_))
    }

    pub fn is_class(&self) -> bool {
        matches!(self.data, ObjectData::Class(_))
    }

    pub fn is_function(&self) -> bool {
        matches!(self.data, ObjectData::Function(_))
    }

    pub fn is_attribute(&self) -> bool {
        matches!(self.data, ObjectData::Attribute(_))
    }

    /// Whether the name is a dunder (`__init__`, `__all__`, ...).
    pub fn is_special(&self) -> bool {
        self.name.len() > 4 && self.name.starts_with("__") && self.name.ends_with("__")
    }

    /// Whether the name is private by convention (leading underscore, not a
    /// dunder).
    pub fn is_private(&self) -> bool {
        self.name.starts_with('_') && !self.is_special()
    }

    /// Whether the name is class-private (`__name` without trailing dunder).
    pub fn is_class_private(&self) -> bool {
        self.name.starts_with("__") && !self.name.ends_with("__")
    }

    /// Name-based visibility, honoring an explicit `public` override.
    pub fn is_public(&self) -> bool {
        match self.public {
            Some(explicit) => explicit,
            None => !self.is_private(),
        }
    }

    pub fn as_module(&self) -> Option<&ModuleData> {
        match &self.data {
            ObjectData::Module(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_module_mut(&mut self) -> Option<&mut ModuleData> {
        match &mut self.data {
            ObjectData::Module(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&ClassData> {
        match &self.data {
            ObjectData::Class(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_class_mut(&mut self) -> Option<&mut ClassData> {
        match &mut self.data {
            ObjectData::Class(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionData> {
        match &self.data {
            ObjectData::Function(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_function_mut(&mut self) -> Option<&mut FunctionData> {
        match &mut self.data {
            ObjectData::Function(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_attribute(&self) -> Option<&AttributeData> {
        match &self.data {
            ObjectData::Attribute(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_attribute_mut(&mut self) -> Option<&mut AttributeData> {
        match &mut self.data {
            ObjectData::Attribute(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_type_alias(&self) -> Option<&TypeAliasData> {
        match &self.data {
            ObjectData::TypeAlias(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_alias(&self) -> Option<&AliasData> {
        match &self.data {
            ObjectData::Alias(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_alias_mut(&mut self) -> Option<&mut AliasData> {
        match &mut self.data {
            ObjectData::Alias(data) => Some(data),
            _ => None,
        }
    }

    /// The type parameters in scope on this object, if its kind has any.
    pub fn type_parameters(&self) -> &[TypeParameter] {
        match &self.data {
            ObjectData::Class(data) => &data.type_parameters,
            ObjectData::Function(data) => &data.type_parameters,
            ObjectData::TypeAlias(data) => &data.type_parameters,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_predicates() {
        let node = ObjectNode::new("__init__", ObjectData::Function(FunctionData::default()));
        assert!(node.is_special());
        assert!(!node.is_private());

        let node = ObjectNode::new("_helper", ObjectData::Function(FunctionData::default()));
        assert!(node.is_private());
        assert!(!node.is_special());

        let node = ObjectNode::new("__mangled", ObjectData::Attribute(AttributeData::default()));
        assert!(node.is_class_private());
        assert!(node.is_private());
    }

    #[test]
    fn public_override_wins_over_name() {
        let mut node = ObjectNode::new("_hidden", ObjectData::Attribute(AttributeData::default()));
        assert!(!node.is_public());
        node.public = Some(true);
        assert!(node.is_public());
    }

    #[test]
    fn parameter_requiredness() {
        let mut param = Parameter::new("x", ParameterKind::PositionalOrKeyword);
        assert!(param.required());
        param.default = Some(Expr::Constant("1".to_string()));
        assert!(!param.required());

        let star = Parameter::new("args", ParameterKind::VarPositional);
        assert!(!star.required());
    }
}
