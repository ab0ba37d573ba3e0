use std::path::Path;

use ruff_python_ast::{self as ast, Expr as AstExpr, Stmt};
use ruff_python_parser::parse_module;
use ruff_text_size::{Ranged, TextRange};

use crate::collections::{LinesCollection, ModulesCollection};
use crate::docstrings;
use crate::error::TalonError;
use crate::expr::{Expr, ExprBuilder};
use crate::objects::{
    AttributeData, ClassData, Decorator, Docstring, Export, FunctionData, ObjectData, ObjectId, ObjectNode,
    Parameter, ParameterKind, Parameters, TypeAliasData, TypeParameter, TypeParameterKind, WildcardImport,
};

/// The Python version used to statically evaluate `sys.version_info` guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PythonVersion {
    pub major: u32,
    pub minor: u32,
}

impl Default for PythonVersion {
    fn default() -> Self {
        Self { major: 3, minor: 12 }
    }
}

impl PythonVersion {
    /// Parses `3.11`-style version strings.
    pub fn parse(text: &str) -> Option<Self> {
        let (major, minor) = text.split_once('.')?;
        Some(Self {
            major: major.trim().parse().ok()?,
            minor: minor.trim().parse().ok()?,
        })
    }

    fn as_tuple(self) -> (u32, u32) {
        (self.major, self.minor)
    }
}

/// Walks the syntax tree of one module and populates its object subtree.
///
/// The visitor keeps a current-parent id instead of a node stack: children
/// are allocated in the arena and bound to the current parent as they are
/// encountered, which preserves source declaration order in `members`.
pub(crate) struct Visitor<'a> {
    code: &'a str,
    modules: &'a mut ModulesCollection,
    current: ObjectId,
    line_starts: Vec<usize>,
    python_version: PythonVersion,
    /// Nesting depth of `if TYPE_CHECKING:` guards; objects created inside
    /// are marked `runtime = false`.
    type_guard_depth: usize,
    /// True while visiting except-handler bodies: bindings from the guarded
    /// branch win over fallback bindings.
    keep_existing: bool,
}

/// Parses and visits one module source file, filling `module_id`'s subtree.
///
/// Returns a load error when the source does not parse; the caller decides
/// whether that is fatal (the root module) or a warning (submodules).
pub(crate) fn visit_module(
    module_id: ObjectId,
    code: &str,
    filepath: &Path,
    modules: &mut ModulesCollection,
    lines: &mut LinesCollection,
    python_version: PythonVersion,
) -> Result<(), TalonError> {
    let parsed = parse_module(code).map_err(|err| TalonError::Load {
        path: filepath.to_path_buf(),
        reason: err.to_string(),
    })?;
    lines.insert(filepath, code);

    let mut line_starts = vec![0usize];
    for (i, byte) in code.bytes().enumerate() {
        if byte == b'\n' {
            line_starts.push(i + 1);
        }
    }

    let module = parsed.into_syntax();
    let mut visitor = Visitor {
        code,
        modules,
        current: module_id,
        line_starts,
        python_version,
        type_guard_depth: 0,
        keep_existing: false,
    };
    visitor.visit_body(&module.body);
    Ok(())
}

impl Visitor<'_> {
    fn lineno(&self, offset: usize) -> usize {
        self.line_starts.partition_point(|start| *start <= offset)
    }

    fn set_positions(&self, node: &mut ObjectNode, range: TextRange) {
        node.lineno = Some(self.lineno(range.start().to_usize()));
        node.endlineno = Some(self.lineno(range.end().to_usize().saturating_sub(1).max(range.start().to_usize())));
    }

    fn value_expr(&self, expression: &AstExpr) -> Expr {
        ExprBuilder::value(self.code, Some(self.current)).build(expression)
    }

    fn annotation_expr(&self, expression: &AstExpr) -> Expr {
        ExprBuilder::annotation(self.code, Some(self.current)).build(expression)
    }

    /// Binds a finished node under the current parent, honoring the
    /// first-branch-wins mode inside except handlers.
    fn bind(&mut self, id: ObjectId) {
        let name = self.modules.get(id).name.clone();
        if self.keep_existing && self.modules.get(self.current).members.contains_key(&name) {
            return;
        }
        self.modules.set_member(self.current, id);
    }

    /// Visits a module, class or function body: the leading string statement
    /// becomes the parent's docstring, the rest are visited normally.
    fn visit_body(&mut self, body: &[Stmt]) {
        let mut statements = body;
        if let Some(Stmt::Expr(ast::StmtExpr { value, .. })) = body.first() {
            if let AstExpr::StringLiteral(literal) = value.as_ref() {
                let docstring = self.docstring_from(literal);
                self.modules.get_mut(self.current).docstring = Some(docstring);
                statements = &body[1..];
            }
        }
        self.visit_statements(statements);
    }

    fn docstring_from(&self, literal: &ast::ExprStringLiteral) -> Docstring {
        let range = literal.range();
        Docstring::new(
            docstrings::clean(&literal.value.to_string()),
            Some(self.lineno(range.start().to_usize())),
            Some(self.lineno(range.end().to_usize().saturating_sub(1))),
        )
    }

    fn visit_statements(&mut self, statements: &[Stmt]) {
        let mut i = 0;
        while i < statements.len() {
            // A string statement directly after an assignment documents the
            // assigned attribute(s).
            let attribute_doc = match statements.get(i + 1) {
                Some(Stmt::Expr(ast::StmtExpr { value, .. })) => match value.as_ref() {
                    AstExpr::StringLiteral(literal)
                        if matches!(statements[i], Stmt::Assign(_) | Stmt::AnnAssign(_) | Stmt::TypeAlias(_)) =>
                    {
                        Some(self.docstring_from(literal))
                    }
                    _ => None,
                },
                _ => None,
            };
            self.visit_statement(&statements[i], attribute_doc.as_ref());
            if attribute_doc.is_some() {
                i += 2;
            } else {
                i += 1;
            }
        }
    }

    fn visit_statement(&mut self, statement: &Stmt, attribute_doc: Option<&Docstring>) {
        match statement {
            Stmt::FunctionDef(function) => self.visit_function(function),
            Stmt::ClassDef(class) => self.visit_class(class),
            Stmt::Assign(assign) => self.visit_assign(assign, attribute_doc),
            Stmt::AnnAssign(assign) => self.visit_ann_assign(assign, attribute_doc),
            Stmt::AugAssign(assign) => self.visit_aug_assign(assign),
            Stmt::TypeAlias(alias) => self.visit_type_alias(alias, attribute_doc),
            Stmt::Import(import) => self.visit_import(import),
            Stmt::ImportFrom(import) => self.visit_import_from(import),
            Stmt::If(branch) => self.visit_if(branch),
            Stmt::Try(block) => self.visit_try(block),
            Stmt::For(ast::StmtFor { body, orelse, .. })
            | Stmt::While(ast::StmtWhile { body, orelse, .. }) => {
                self.visit_statements(body);
                self.visit_statements(orelse);
            }
            Stmt::With(ast::StmtWith { body, .. }) => self.visit_statements(body),
            // Remaining statement kinds carry no API surface.
            _ => {}
        }
    }

    fn decorators(&self, list: &[ast::Decorator]) -> Vec<Decorator> {
        list.iter()
            .map(|decorator| {
                let range = decorator.range();
                Decorator {
                    value: self.value_expr(&decorator.expression),
                    lineno: Some(self.lineno(range.start().to_usize())),
                    endlineno: Some(self.lineno(range.end().to_usize().saturating_sub(1))),
                }
            })
            .collect()
    }

    fn type_parameters(&self, type_params: Option<&ast::TypeParams>) -> Vec<TypeParameter> {
        let Some(type_params) = type_params else {
            return Vec::new();
        };
        type_params
            .type_params
            .iter()
            .map(|param| match param {
                ast::TypeParam::TypeVar(tv) => TypeParameter {
                    name: tv.name.id.to_string(),
                    kind: TypeParameterKind::TypeVar,
                    bound: tv.bound.as_deref().map(|b| self.annotation_expr(b)),
                    default: tv.default.as_deref().map(|d| self.value_expr(d)),
                },
                ast::TypeParam::TypeVarTuple(tv) => TypeParameter {
                    name: tv.name.id.to_string(),
                    kind: TypeParameterKind::TypeVarTuple,
                    bound: None,
                    default: tv.default.as_deref().map(|d| self.value_expr(d)),
                },
                ast::TypeParam::ParamSpec(ps) => TypeParameter {
                    name: ps.name.id.to_string(),
                    kind: TypeParameterKind::ParamSpec,
                    bound: None,
                    default: ps.default.as_deref().map(|d| self.value_expr(d)),
                },
            })
            .collect()
    }

    fn parameters(&self, params: &ast::Parameters) -> Parameters {
        let mut out = Parameters::default();
        let with_default = |p: &ast::ParameterWithDefault, kind: ParameterKind| {
            let mut parameter = Parameter::new(p.parameter.name.id.to_string(), kind);
            parameter.annotation = p.parameter.annotation.as_deref().map(|a| self.annotation_expr(a));
            parameter.default = p.default.as_deref().map(|d| self.value_expr(d));
            parameter
        };
        for p in &params.posonlyargs {
            out.push(with_default(p, ParameterKind::PositionalOnly));
        }
        for p in &params.args {
            out.push(with_default(p, ParameterKind::PositionalOrKeyword));
        }
        if let Some(vararg) = &params.vararg {
            let mut parameter = Parameter::new(vararg.name.id.to_string(), ParameterKind::VarPositional);
            parameter.annotation = vararg.annotation.as_deref().map(|a| self.annotation_expr(a));
            out.push(parameter);
        }
        for p in &params.kwonlyargs {
            out.push(with_default(p, ParameterKind::KeywordOnly));
        }
        if let Some(kwarg) = &params.kwarg {
            let mut parameter = Parameter::new(kwarg.name.id.to_string(), ParameterKind::VarKeyword);
            parameter.annotation = kwarg.annotation.as_deref().map(|a| self.annotation_expr(a));
            out.push(parameter);
        }
        out
    }

    /// Maps a decorator to the label it implies, if any.
    fn decorator_label(path: &str) -> Option<&'static str> {
        let last = path.rsplit('.').next().unwrap_or(path);
        match last {
            "property" => Some("property"),
            "staticmethod" => Some("staticmethod"),
            "classmethod" => Some("classmethod"),
            "abstractmethod" => Some("abstractmethod"),
            "abstractproperty" => Some("abstractmethod"),
            "cached_property" => Some("cached_property"),
            "overload" => Some("typing-overload"),
            "dataclass" => Some("dataclass"),
            _ => None,
        }
    }

    /// Extracts a deprecation message from a `@deprecated("...")` decorator.
    fn deprecation_message(decorator: &Decorator) -> Option<String> {
        if decorator.callable_path().rsplit('.').next() != Some("deprecated") {
            return None;
        }
        match &decorator.value {
            Expr::Call { arguments, .. } => match arguments.first() {
                Some(Expr::String(message)) => Some(message.clone()),
                Some(other) => Some(other.to_string()),
                None => Some(String::new()),
            },
            _ => Some(String::new()),
        }
    }

    fn visit_function(&mut self, function: &ast::StmtFunctionDef) {
        let decorators = self.decorators(&function.decorator_list);
        let mut node = ObjectNode::new(
            function.name.id.to_string(),
            ObjectData::Function(FunctionData {
                parameters: self.parameters(&function.parameters),
                returns: function.returns.as_deref().map(|r| self.annotation_expr(r)),
                decorators: Vec::new(),
                type_parameters: self.type_parameters(function.type_params.as_deref()),
                overloads: Vec::new(),
            }),
        );
        self.set_positions(&mut node, function.range());
        node.runtime = self.type_guard_depth == 0;
        if function.is_async {
            node.labels.insert("async".to_string());
        }
        for decorator in &decorators {
            if let Some(label) = Self::decorator_label(&decorator.callable_path()) {
                node.labels.insert(label.to_string());
            }
            if let Some(message) = Self::deprecation_message(decorator) {
                node.deprecated = Some(message);
            }
        }
        let is_overload = node.labels.contains("typing-overload");
        if let Some(data) = match &mut node.data {
            ObjectData::Function(data) => Some(data),
            _ => None,
        } {
            data.decorators = decorators;
        }

        let id = self.modules.alloc(node);
        let name = function.name.id.to_string();

        if is_overload {
            // Overload signatures accumulate in the enclosing scope until the
            // implementation is defined.
            self.modules.get_mut(id).parent = Some(self.current);
            if let Some(overloads) = self.scope_overloads_mut() {
                overloads.entry(name).or_default().push(id);
            }
        } else {
            let pending = self
                .scope_overloads_mut()
                .and_then(|overloads| overloads.shift_remove(&name))
                .unwrap_or_default();
            if let Some(data) = self.modules.get_mut(id).as_function_mut() {
                data.overloads = pending;
            }
            self.bind(id);
        }

        // The docstring lives in the function body; methods additionally
        // contribute `self.x` instance attributes to the enclosing class.
        if let Some(Stmt::Expr(ast::StmtExpr { value, .. })) = function.body.first() {
            if let AstExpr::StringLiteral(literal) = value.as_ref() {
                let docstring = self.docstring_from(literal);
                self.modules.get_mut(id).docstring = Some(docstring);
            }
        }
        if self.modules.get(self.current).is_class() {
            self.scan_instance_attributes(&function.body);
        }
    }

    fn scope_overloads_mut(&mut self) -> Option<&mut indexmap::IndexMap<String, Vec<ObjectId>>> {
        match &mut self.modules.get_mut(self.current).data {
            ObjectData::Module(data) => Some(&mut data.overloads),
            ObjectData::Class(data) => Some(&mut data.overloads),
            _ => None,
        }
    }

    fn visit_class(&mut self, class: &ast::StmtClassDef) {
        let decorators = self.decorators(&class.decorator_list);
        let (bases, keywords) = match &class.arguments {
            Some(arguments) => (
                arguments.args.iter().map(|base| self.annotation_expr(base)).collect(),
                arguments
                    .keywords
                    .iter()
                    .filter_map(|keyword| {
                        keyword.arg.as_ref().map(|arg| Expr::Keyword {
                            name: arg.id.to_string(),
                            value: Box::new(self.value_expr(&keyword.value)),
                        })
                    })
                    .collect(),
            ),
            None => (Vec::new(), Vec::new()),
        };
        let mut node = ObjectNode::new(
            class.name.id.to_string(),
            ObjectData::Class(ClassData {
                bases,
                keywords,
                decorators: Vec::new(),
                type_parameters: self.type_parameters(class.type_params.as_deref()),
                ..ClassData::default()
            }),
        );
        self.set_positions(&mut node, class.range());
        node.runtime = self.type_guard_depth == 0;
        for decorator in &decorators {
            if let Some(label) = Self::decorator_label(&decorator.callable_path()) {
                node.labels.insert(label.to_string());
            }
            if let Some(message) = Self::deprecation_message(decorator) {
                node.deprecated = Some(message);
            }
        }
        if let Some(data) = node.as_class_mut() {
            data.decorators = decorators;
        }

        let id = self.modules.alloc(node);
        self.bind(id);

        let previous = self.current;
        self.current = id;
        self.visit_body(&class.body);
        self.current = previous;
    }

    /// Records `self.x = ...` statements in a method body as instance
    /// attributes on the enclosing class. Class-level bindings win.
    fn scan_instance_attributes(&mut self, body: &[Stmt]) {
        for statement in body {
            match statement {
                Stmt::Assign(ast::StmtAssign { targets, value, range, .. }) => {
                    for target in targets {
                        if let Some(attr) = self_attribute(target) {
                            self.add_instance_attribute(attr, Some(&**value), None, *range);
                        }
                    }
                }
                Stmt::AnnAssign(ast::StmtAnnAssign {
                    target,
                    annotation,
                    value,
                    range,
                    ..
                }) => {
                    if let Some(attr) = self_attribute(target) {
                        self.add_instance_attribute(attr, value.as_deref(), Some(&**annotation), *range);
                    }
                }
                Stmt::If(ast::StmtIf {
                    body, elif_else_clauses, ..
                }) => {
                    self.scan_instance_attributes(body);
                    for clause in elif_else_clauses {
                        self.scan_instance_attributes(&clause.body);
                    }
                }
                Stmt::For(ast::StmtFor { body, orelse, .. })
                | Stmt::While(ast::StmtWhile { body, orelse, .. }) => {
                    self.scan_instance_attributes(body);
                    self.scan_instance_attributes(orelse);
                }
                Stmt::With(ast::StmtWith { body, .. }) => self.scan_instance_attributes(body),
                Stmt::Try(ast::StmtTry {
                    body,
                    handlers,
                    orelse,
                    finalbody,
                    ..
                }) => {
                    self.scan_instance_attributes(body);
                    for handler in handlers {
                        let ast::ExceptHandler::ExceptHandler(handler) = handler;
                        self.scan_instance_attributes(&handler.body);
                    }
                    self.scan_instance_attributes(orelse);
                    self.scan_instance_attributes(finalbody);
                }
                _ => {}
            }
        }
    }

    fn add_instance_attribute(
        &mut self,
        name: &str,
        value: Option<&AstExpr>,
        annotation: Option<&AstExpr>,
        range: TextRange,
    ) {
        if self.modules.get(self.current).members.contains_key(name) {
            return;
        }
        let mut node = ObjectNode::new(
            name,
            ObjectData::Attribute(AttributeData {
                value: value.map(|v| self.value_expr(v)),
                annotation: annotation.map(|a| self.annotation_expr(a)),
            }),
        );
        self.set_positions(&mut node, range);
        node.runtime = self.type_guard_depth == 0;
        node.labels.insert("instance-attribute".to_string());
        let id = self.modules.alloc(node);
        self.modules.set_member(self.current, id);
    }

    fn attribute_label(&self) -> &'static str {
        if self.modules.get(self.current).is_class() {
            "class-attribute"
        } else {
            "module-attribute"
        }
    }

    fn visit_assign(&mut self, assign: &ast::StmtAssign, attribute_doc: Option<&Docstring>) {
        // `__all__` at module scope becomes the module's exports.
        if self.modules.get(self.current).is_module() {
            if let [AstExpr::Name(ast::ExprName { id, .. })] = assign.targets.as_slice() {
                if id.as_str() == "__all__" {
                    let exports = self.flatten_exports(&assign.value);
                    if let Some(data) = self.modules.get_mut(self.current).as_module_mut() {
                        data.exports = Some(exports);
                    }
                    return;
                }
            }
        }

        let value = self.value_expr(&assign.value);
        for target in &assign.targets {
            match target {
                AstExpr::Name(ast::ExprName { id, .. }) => {
                    self.add_attribute(id.as_str(), Some(value.clone()), None, assign.range(), attribute_doc);
                }
                AstExpr::Tuple(ast::ExprTuple { elts, .. }) | AstExpr::List(ast::ExprList { elts, .. }) => {
                    // Unpacking: each named target records the full right-hand side.
                    for element in elts {
                        if let AstExpr::Name(ast::ExprName { id, .. }) = element {
                            self.add_attribute(id.as_str(), Some(value.clone()), None, assign.range(), attribute_doc);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn visit_ann_assign(&mut self, assign: &ast::StmtAnnAssign, attribute_doc: Option<&Docstring>) {
        let AstExpr::Name(ast::ExprName { id, .. }) = assign.target.as_ref() else {
            return;
        };
        let annotation = self.annotation_expr(&assign.annotation);
        // `x: TypeAlias = ...` declares a type alias, not an attribute.
        if is_type_alias_annotation(&annotation) && assign.value.is_some() {
            let mut node = ObjectNode::new(
                id.as_str(),
                ObjectData::TypeAlias(TypeAliasData {
                    value: assign.value.as_deref().map(|v| self.annotation_expr(v)),
                    type_parameters: Vec::new(),
                }),
            );
            self.set_positions(&mut node, assign.range());
            node.runtime = self.type_guard_depth == 0;
            node.docstring = attribute_doc.cloned();
            let alias_id = self.modules.alloc(node);
            self.bind(alias_id);
            return;
        }
        let value = assign.value.as_deref().map(|v| self.value_expr(v));
        self.add_attribute(id.as_str(), value, Some(annotation), assign.range(), attribute_doc);
    }

    fn visit_aug_assign(&mut self, assign: &ast::StmtAugAssign) {
        // Only `__all__ += [...]` contributes to the model.
        if !self.modules.get(self.current).is_module() {
            return;
        }
        let AstExpr::Name(ast::ExprName { id, .. }) = assign.target.as_ref() else {
            return;
        };
        if id.as_str() != "__all__" || !matches!(assign.op, ast::Operator::Add) {
            return;
        }
        let additions = self.flatten_exports(&assign.value);
        if let Some(data) = self.modules.get_mut(self.current).as_module_mut() {
            data.exports.get_or_insert_with(Vec::new).extend(additions);
        }
    }

    /// Flattens an `__all__` value: lists and tuples contribute their items,
    /// `+` concatenations recurse into both sides, strings become names and
    /// anything else is kept as an expression for the resolver to expand.
    fn flatten_exports(&self, value: &AstExpr) -> Vec<Export> {
        match value {
            AstExpr::List(ast::ExprList { elts, .. }) | AstExpr::Tuple(ast::ExprTuple { elts, .. }) => elts
                .iter()
                .flat_map(|element| match element {
                    AstExpr::StringLiteral(literal) => vec![Export::Name(literal.value.to_string())],
                    other => vec![Export::Expr(self.value_expr(other))],
                })
                .collect(),
            AstExpr::BinOp(ast::ExprBinOp { left, op, right, .. }) if matches!(op, ast::Operator::Add) => {
                let mut exports = self.flatten_exports(left);
                exports.extend(self.flatten_exports(right));
                exports
            }
            other => vec![Export::Expr(self.value_expr(other))],
        }
    }

    fn add_attribute(
        &mut self,
        name: &str,
        value: Option<Expr>,
        annotation: Option<Expr>,
        range: TextRange,
        attribute_doc: Option<&Docstring>,
    ) {
        // A string assigned to `__deprecated__` deprecates the enclosing object.
        if name == "__deprecated__" {
            if let Some(Expr::String(message)) = &value {
                self.modules.get_mut(self.current).deprecated = Some(message.clone());
            }
        }
        let mut node = ObjectNode::new(name, ObjectData::Attribute(AttributeData { value, annotation }));
        self.set_positions(&mut node, range);
        node.runtime = self.type_guard_depth == 0;
        node.labels.insert(self.attribute_label().to_string());
        node.docstring = attribute_doc.cloned();
        let id = self.modules.alloc(node);
        self.bind(id);
    }

    fn visit_type_alias(&mut self, alias: &ast::StmtTypeAlias, attribute_doc: Option<&Docstring>) {
        let AstExpr::Name(ast::ExprName { id: name, .. }) = alias.name.as_ref() else {
            return;
        };
        let mut node = ObjectNode::new(
            name.as_str(),
            ObjectData::TypeAlias(TypeAliasData {
                value: Some(self.annotation_expr(&alias.value)),
                type_parameters: self.type_parameters(alias.type_params.as_deref()),
            }),
        );
        self.set_positions(&mut node, alias.range());
        node.runtime = self.type_guard_depth == 0;
        node.docstring = attribute_doc.cloned();
        let id = self.modules.alloc(node);
        self.bind(id);
    }

    fn visit_import(&mut self, import: &ast::StmtImport) {
        for alias in &import.names {
            let full = alias.name.as_str().to_string();
            let (local, target) = match &alias.asname {
                Some(asname) => (asname.as_str().to_string(), full.clone()),
                // A bare dotted import binds the top-level package.
                None => {
                    let top = full.split('.').next().unwrap_or(&full).to_string();
                    (top.clone(), top)
                }
            };
            if self.keep_existing && self.modules.get(self.current).members.contains_key(&local) {
                continue;
            }
            self.modules
                .get_mut(self.current)
                .imports
                .insert(local.clone(), target.clone());
            let mut node = ObjectNode::alias(local, target);
            self.set_positions(&mut node, import.range());
            node.runtime = self.type_guard_depth == 0;
            let id = self.modules.alloc(node);
            self.bind(id);
        }
    }

    fn visit_import_from(&mut self, import: &ast::StmtImportFrom) {
        let base = self.resolve_relative(import.level, import.module.as_ref().map(|m| m.id.as_str()));
        for alias in &import.names {
            if alias.name.as_str() == "*" {
                let lineno = Some(self.lineno(import.range().start().to_usize()));
                let module_id = self.modules.module_of(self.current);
                if let Some(data) = self.modules.get_mut(module_id).as_module_mut() {
                    data.wildcard_imports.push(WildcardImport {
                        target: base.clone(),
                        lineno,
                    });
                }
                continue;
            }
            let target = format!("{base}.{}", alias.name.as_str());
            let local = alias
                .asname
                .as_ref()
                .map_or_else(|| alias.name.as_str().to_string(), |asname| asname.as_str().to_string());
            if self.keep_existing && self.modules.get(self.current).members.contains_key(&local) {
                continue;
            }
            self.modules
                .get_mut(self.current)
                .imports
                .insert(local.clone(), target.clone());
            let mut node = ObjectNode::alias(local, target);
            self.set_positions(&mut node, import.range());
            node.runtime = self.type_guard_depth == 0;
            let id = self.modules.alloc(node);
            self.bind(id);
        }
    }

    /// Resolves the base module of a (possibly relative) `from` import
    /// against the module currently being visited.
    fn resolve_relative(&self, level: u32, module: Option<&str>) -> String {
        if level == 0 {
            return module.unwrap_or_default().to_string();
        }
        let module_id = self.modules.module_of(self.current);
        let module_path = self.modules.path(module_id);
        let mut parts: Vec<String> = module_path.split('.').map(str::to_string).collect();
        let is_package = self
            .modules
            .get(module_id)
            .as_module()
            .and_then(|data| data.filepath.as_ref())
            .and_then(|fp| fp.as_file())
            .is_none_or(|file| file.file_stem().and_then(|s| s.to_str()) == Some("__init__"));
        if !is_package {
            parts.pop();
        }
        for _ in 1..level {
            parts.pop();
        }
        if let Some(module) = module {
            parts.extend(module.split('.').map(str::to_string));
        }
        parts.join(".")
    }

    fn visit_if(&mut self, branch: &ast::StmtIf) {
        if is_type_checking_guard(&branch.test) {
            self.type_guard_depth += 1;
            self.visit_statements(&branch.body);
            self.type_guard_depth -= 1;
            for clause in &branch.elif_else_clauses {
                self.visit_statements(&clause.body);
            }
            return;
        }
        if let Some(matches_version) = self.evaluate_version_guard(&branch.test) {
            if matches_version {
                self.visit_statements(&branch.body);
            } else {
                for clause in &branch.elif_else_clauses {
                    self.visit_statements(&clause.body);
                }
            }
            return;
        }
        // Undecidable branches are merged with last-wins semantics.
        self.visit_statements(&branch.body);
        for clause in &branch.elif_else_clauses {
            self.visit_statements(&clause.body);
        }
    }

    /// Statically evaluates `sys.version_info >= (3, X)` style guards against
    /// the configured Python version. Returns `None` when the test is not a
    /// recognizable version comparison.
    fn evaluate_version_guard(&self, test: &AstExpr) -> Option<bool> {
        let AstExpr::Compare(ast::ExprCompare {
            left,
            ops,
            comparators,
            ..
        }) = test
        else {
            return None;
        };
        if !is_version_info(left) || ops.len() != 1 || comparators.len() != 1 {
            return None;
        }
        let AstExpr::Tuple(ast::ExprTuple { elts, .. }) = &comparators[0] else {
            return None;
        };
        let mut numbers = elts.iter().map(|e| match e {
            AstExpr::NumberLiteral(ast::ExprNumberLiteral {
                value: ast::Number::Int(int),
                ..
            }) => int.as_i64().and_then(|v| u32::try_from(v).ok()),
            _ => None,
        });
        let major = numbers.next().flatten()?;
        let minor = numbers.next().flatten().unwrap_or(0);
        let target = (major, minor);
        let version = self.python_version.as_tuple();
        Some(match ops[0] {
            ast::CmpOp::GtE => version >= target,
            ast::CmpOp::Gt => version > target,
            ast::CmpOp::LtE => version <= target,
            ast::CmpOp::Lt => version < target,
            ast::CmpOp::Eq => version == target,
            ast::CmpOp::NotEq => version != target,
            _ => return None,
        })
    }

    fn visit_try(&mut self, block: &ast::StmtTry) {
        self.visit_statements(&block.body);
        // Fallback imports in except handlers do not override the bindings
        // made by the guarded body.
        let previous = self.keep_existing;
        self.keep_existing = true;
        for handler in &block.handlers {
            let ast::ExceptHandler::ExceptHandler(handler) = handler;
            self.visit_statements(&handler.body);
        }
        self.keep_existing = previous;
        self.visit_statements(&block.orelse);
        self.visit_statements(&block.finalbody);
    }
}

/// Matches `self.attr` assignment targets.
fn self_attribute(target: &AstExpr) -> Option<&str> {
    let AstExpr::Attribute(ast::ExprAttribute { value, attr, .. }) = target else {
        return None;
    };
    match value.as_ref() {
        AstExpr::Name(ast::ExprName { id, .. }) if id.as_str() == "self" => Some(attr.id.as_str()),
        _ => None,
    }
}

fn is_type_alias_annotation(annotation: &Expr) -> bool {
    match annotation {
        Expr::Name(name) => name.name == "TypeAlias",
        Expr::Attribute { attr, .. } => attr == "TypeAlias",
        _ => false,
    }
}

/// Matches `TYPE_CHECKING` and `typing.TYPE_CHECKING` tests.
fn is_type_checking_guard(test: &AstExpr) -> bool {
    match test {
        AstExpr::Name(ast::ExprName { id, .. }) => id.as_str() == "TYPE_CHECKING",
        AstExpr::Attribute(ast::ExprAttribute { attr, .. }) => attr.id.as_str() == "TYPE_CHECKING",
        _ => false,
    }
}

/// Matches `sys.version_info` (optionally subscripted with `[:2]`).
fn is_version_info(expression: &AstExpr) -> bool {
    match expression {
        AstExpr::Attribute(ast::ExprAttribute { attr, .. }) => attr.id.as_str() == "version_info",
        AstExpr::Name(ast::ExprName { id, .. }) => id.as_str() == "version_info",
        AstExpr::Subscript(ast::ExprSubscript { value, .. }) => is_version_info(value),
        _ => false,
    }
}
