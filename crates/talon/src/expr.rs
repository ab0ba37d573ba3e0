use std::fmt;

use ruff_python_ast::{self as ast, Expr as AstExpr};
use ruff_text_size::Ranged;

use crate::collections::ModulesCollection;
use crate::objects::{ObjectId, ParameterKind};

/// A name appearing in an expression, with a back-reference to the object in
/// whose scope it was produced.
///
/// The scope id is a lookup handle into the modules collection, never an
/// owning pointer; `canonical_path` walks enclosing scopes through it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExprName {
    pub name: String,
    pub scope: Option<ObjectId>,
}

impl ExprName {
    pub fn new(name: impl Into<String>, scope: Option<ObjectId>) -> Self {
        Self {
            name: name.into(),
            scope,
        }
    }
}

/// A parameter of a lambda expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ExprParameter {
    pub name: String,
    pub kind: ParameterKind,
    pub default: Option<Expr>,
}

/// One `for ... in ... [if ...]` clause of a comprehension.
#[derive(Debug, Clone, PartialEq)]
pub struct Comprehension {
    pub target: Expr,
    pub iterable: Expr,
    pub conditions: Vec<Expr>,
    pub is_async: bool,
}

/// Rendering flavor of a comprehension expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorFlavor {
    Generator,
    ListComp,
    SetComp,
    DictComp,
}

/// A structured Python expression, as found in annotations, defaults,
/// decorators and base classes.
///
/// The tree mirrors the syntactic shape of the source expression closely
/// enough to re-render it, while keeping every name resolvable through its
/// scope back-reference. Operators are stored as their source spelling since
/// nothing ever evaluates them.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Name(ExprName),
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Subscript {
        value: Box<Expr>,
        slice: Box<Expr>,
    },
    Tuple {
        elements: Vec<Expr>,
        /// True when the tuple appears without parentheses, e.g. as a
        /// subscript slice (`dict[str, int]`).
        implicit: bool,
    },
    List(Vec<Expr>),
    Set(Vec<Expr>),
    Dict {
        /// A `None` key marks a `**mapping` entry.
        keys: Vec<Option<Expr>>,
        values: Vec<Expr>,
    },
    Call {
        function: Box<Expr>,
        arguments: Vec<Expr>,
    },
    /// A `name=value` argument inside a call.
    Keyword {
        name: String,
        value: Box<Expr>,
    },
    BinOp {
        left: Box<Expr>,
        operator: String,
        right: Box<Expr>,
    },
    UnaryOp {
        operator: String,
        operand: Box<Expr>,
    },
    BoolOp {
        operator: String,
        values: Vec<Expr>,
    },
    Compare {
        left: Box<Expr>,
        operators: Vec<String>,
        comparators: Vec<Expr>,
    },
    /// Any literal other than a string, kept as its source spelling.
    Constant(String),
    /// A string literal; in annotation position these are re-parsed and only
    /// stay opaque when the contents are not a valid expression.
    String(String),
    Lambda {
        parameters: Vec<ExprParameter>,
        body: Box<Expr>,
    },
    Slice {
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    Starred(Box<Expr>),
    Generator {
        flavor: GeneratorFlavor,
        element: Box<Expr>,
        /// Value part of a dict comprehension; unused for other flavors.
        value: Option<Box<Expr>>,
        generators: Vec<Comprehension>,
    },
    IfExpr {
        body: Box<Expr>,
        test: Box<Expr>,
        orelse: Box<Expr>,
    },
    NamedExpr {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    /// A `*args`-style marker in signatures and calls.
    VarPositional(Box<Expr>),
    /// A `**kwargs`-style marker in signatures and calls.
    VarKeyword(Box<Expr>),
}

impl Expr {
    /// The serialization tag of this variant (`ExprName`, `ExprCall`, ...).
    pub fn cls(&self) -> &'static str {
        match self {
            Self::Name(_) => "ExprName",
            Self::Attribute { .. } => "ExprAttribute",
            Self::Subscript { .. } => "ExprSubscript",
            Self::Tuple { .. } => "ExprTuple",
            Self::List(_) => "ExprList",
            Self::Set(_) => "ExprSet",
            Self::Dict { .. } => "ExprDict",
            Self::Call { .. } => "ExprCall",
            Self::Keyword { .. } => "ExprKeyword",
            Self::BinOp { .. } => "ExprBinOp",
            Self::UnaryOp { .. } => "ExprUnaryOp",
            Self::BoolOp { .. } => "ExprBoolOp",
            Self::Compare { .. } => "ExprCompare",
            Self::Constant(_) => "ExprConstant",
            Self::String(_) => "ExprString",
            Self::Lambda { .. } => "ExprLambda",
            Self::Slice { .. } => "ExprSlice",
            Self::Starred(_) => "ExprStarred",
            Self::Generator { .. } => "ExprGenerator",
            Self::IfExpr { .. } => "ExprIfExp",
            Self::NamedExpr { .. } => "ExprNamedExpr",
            Self::VarPositional(_) => "ExprVarPositional",
            Self::VarKeyword(_) => "ExprVarKeyword",
        }
    }

    /// Builds a bare name expression.
    pub fn name(name: impl Into<String>, scope: Option<ObjectId>) -> Self {
        Self::Name(ExprName::new(name, scope))
    }

    /// The dotted path of the place this expression's root is defined, when
    /// the expression is a plain name or attribute chain; otherwise the
    /// rendered expression as a best effort.
    pub fn canonical_path(&self, modules: &ModulesCollection) -> String {
        match self {
            Self::Name(name) => match name.scope {
                Some(scope) => modules
                    .resolve_name(scope, &name.name)
                    .unwrap_or_else(|_| name.name.clone()),
                None => name.name.clone(),
            },
            Self::Attribute { value, attr } => {
                format!("{}.{}", value.canonical_path(modules), attr)
            }
            other => other.to_string(),
        }
    }

    /// Iterates over every name in the expression tree, outermost first.
    pub fn names(&self) -> Vec<&ExprName> {
        let mut out = Vec::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names<'a>(&'a self, out: &mut Vec<&'a ExprName>) {
        match self {
            Self::Name(name) => out.push(name),
            Self::Attribute { value, .. } => value.collect_names(out),
            Self::Subscript { value, slice } => {
                value.collect_names(out);
                slice.collect_names(out);
            }
            Self::Tuple { elements, .. } => {
                for element in elements {
                    element.collect_names(out);
                }
            }
            Self::List(elements) | Self::Set(elements) => {
                for element in elements {
                    element.collect_names(out);
                }
            }
            Self::Dict { keys, values } => {
                for key in keys.iter().flatten() {
                    key.collect_names(out);
                }
                for value in values {
                    value.collect_names(out);
                }
            }
            Self::Call { function, arguments } => {
                function.collect_names(out);
                for argument in arguments {
                    argument.collect_names(out);
                }
            }
            Self::Keyword { value, .. } => value.collect_names(out),
            Self::BinOp { left, right, .. } => {
                left.collect_names(out);
                right.collect_names(out);
            }
            Self::UnaryOp { operand, .. } => operand.collect_names(out),
            Self::BoolOp { values, .. } => {
                for value in values {
                    value.collect_names(out);
                }
            }
            Self::Compare { left, comparators, .. } => {
                left.collect_names(out);
                for comparator in comparators {
                    comparator.collect_names(out);
                }
            }
            Self::Lambda { parameters, body } => {
                for parameter in parameters {
                    if let Some(default) = &parameter.default {
                        default.collect_names(out);
                    }
                }
                body.collect_names(out);
            }
            Self::Slice { lower, upper, step } => {
                for part in [lower, upper, step].into_iter().flatten() {
                    part.collect_names(out);
                }
            }
            Self::Starred(value) | Self::VarPositional(value) | Self::VarKeyword(value) => {
                value.collect_names(out);
            }
            Self::Generator {
                element,
                value,
                generators,
                ..
            } => {
                element.collect_names(out);
                if let Some(value) = value {
                    value.collect_names(out);
                }
                for comp in generators {
                    comp.target.collect_names(out);
                    comp.iterable.collect_names(out);
                    for condition in &comp.conditions {
                        condition.collect_names(out);
                    }
                }
            }
            Self::IfExpr { body, test, orelse } => {
                body.collect_names(out);
                test.collect_names(out);
                orelse.collect_names(out);
            }
            Self::NamedExpr { target, value } => {
                target.collect_names(out);
                value.collect_names(out);
            }
            Self::Constant(_) | Self::String(_) => {}
        }
    }
}

fn join(f: &mut fmt::Formatter<'_>, items: &[Expr], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(&name.name),
            Self::Attribute { value, attr } => write!(f, "{value}.{attr}"),
            Self::Subscript { value, slice } => write!(f, "{value}[{slice}]"),
            Self::Tuple { elements, implicit } => {
                if *implicit {
                    join(f, elements, ", ")
                } else {
                    f.write_str("(")?;
                    join(f, elements, ", ")?;
                    if elements.len() == 1 {
                        f.write_str(",")?;
                    }
                    f.write_str(")")
                }
            }
            Self::List(elements) => {
                f.write_str("[")?;
                join(f, elements, ", ")?;
                f.write_str("]")
            }
            Self::Set(elements) => {
                f.write_str("{")?;
                join(f, elements, ", ")?;
                f.write_str("}")
            }
            Self::Dict { keys, values } => {
                f.write_str("{")?;
                for (i, (key, value)) in keys.iter().zip(values).enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    match key {
                        Some(key) => write!(f, "{key}: {value}")?,
                        None => write!(f, "**{value}")?,
                    }
                }
                f.write_str("}")
            }
            Self::Call { function, arguments } => {
                write!(f, "{function}(")?;
                join(f, arguments, ", ")?;
                f.write_str(")")
            }
            Self::Keyword { name, value } => write!(f, "{name}={value}"),
            Self::BinOp { left, operator, right } => write!(f, "{left} {operator} {right}"),
            Self::UnaryOp { operator, operand } => {
                if operator == "not" {
                    write!(f, "not {operand}")
                } else {
                    write!(f, "{operator}{operand}")
                }
            }
            Self::BoolOp { operator, values } => join(f, values, &format!(" {operator} ")),
            Self::Compare {
                left,
                operators,
                comparators,
            } => {
                write!(f, "{left}")?;
                for (op, comparator) in operators.iter().zip(comparators) {
                    write!(f, " {op} {comparator}")?;
                }
                Ok(())
            }
            Self::Constant(text) => f.write_str(text),
            Self::String(value) => write!(f, "'{value}'"),
            Self::Lambda { parameters, body } => {
                f.write_str("lambda")?;
                if !parameters.is_empty() {
                    f.write_str(" ")?;
                    for (i, parameter) in parameters.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        match parameter.kind {
                            ParameterKind::VarPositional => write!(f, "*{}", parameter.name)?,
                            ParameterKind::VarKeyword => write!(f, "**{}", parameter.name)?,
                            _ => f.write_str(&parameter.name)?,
                        }
                        if let Some(default) = &parameter.default {
                            write!(f, "={default}")?;
                        }
                    }
                }
                write!(f, ": {body}")
            }
            Self::Slice { lower, upper, step } => {
                if let Some(lower) = lower {
                    write!(f, "{lower}")?;
                }
                f.write_str(":")?;
                if let Some(upper) = upper {
                    write!(f, "{upper}")?;
                }
                if let Some(step) = step {
                    write!(f, ":{step}")?;
                }
                Ok(())
            }
            Self::Starred(value) => write!(f, "*{value}"),
            Self::VarPositional(value) => write!(f, "*{value}"),
            Self::VarKeyword(value) => write!(f, "**{value}"),
            Self::Generator {
                flavor,
                element,
                value,
                generators,
            } => {
                let (open, close) = match flavor {
                    GeneratorFlavor::Generator => ("", ""),
                    GeneratorFlavor::ListComp => ("[", "]"),
                    GeneratorFlavor::SetComp | GeneratorFlavor::DictComp => ("{", "}"),
                };
                f.write_str(open)?;
                match value {
                    Some(value) => write!(f, "{element}: {value}")?,
                    None => write!(f, "{element}")?,
                }
                for comp in generators {
                    if comp.is_async {
                        write!(f, " async for {} in {}", comp.target, comp.iterable)?;
                    } else {
                        write!(f, " for {} in {}", comp.target, comp.iterable)?;
                    }
                    for condition in &comp.conditions {
                        write!(f, " if {condition}")?;
                    }
                }
                f.write_str(close)
            }
            Self::IfExpr { body, test, orelse } => write!(f, "{body} if {test} else {orelse}"),
            Self::NamedExpr { target, value } => write!(f, "({target} := {value})"),
        }
    }
}

fn binary_operator(op: ast::Operator) -> &'static str {
    match op {
        ast::Operator::Add => "+",
        ast::Operator::Sub => "-",
        ast::Operator::Mult => "*",
        ast::Operator::MatMult => "@",
        ast::Operator::Div => "/",
        ast::Operator::Mod => "%",
        ast::Operator::Pow => "**",
        ast::Operator::LShift => "<<",
        ast::Operator::RShift => ">>",
        ast::Operator::BitOr => "|",
        ast::Operator::BitXor => "^",
        ast::Operator::BitAnd => "&",
        ast::Operator::FloorDiv => "//",
    }
}

fn unary_operator(op: ast::UnaryOp) -> &'static str {
    match op {
        ast::UnaryOp::Invert => "~",
        ast::UnaryOp::Not => "not",
        ast::UnaryOp::UAdd => "+",
        ast::UnaryOp::USub => "-",
    }
}

fn compare_operator(op: ast::CmpOp) -> &'static str {
    match op {
        ast::CmpOp::Eq => "==",
        ast::CmpOp::NotEq => "!=",
        ast::CmpOp::Lt => "<",
        ast::CmpOp::LtE => "<=",
        ast::CmpOp::Gt => ">",
        ast::CmpOp::GtE => ">=",
        ast::CmpOp::Is => "is",
        ast::CmpOp::IsNot => "is not",
        ast::CmpOp::In => "in",
        ast::CmpOp::NotIn => "not in",
    }
}

/// Whether a subscripted value forbids re-parsing string literals inside its
/// slice (`Literal["a"]` arguments are values, not forward references).
fn is_literal_form(value: &Expr) -> bool {
    match value {
        Expr::Name(name) => name.name == "Literal",
        Expr::Attribute { attr, .. } => attr == "Literal",
        _ => false,
    }
}

/// Converts ruff AST expression nodes into the structured expression graph.
///
/// The builder keeps a reference to the module source so that literals can be
/// kept as their exact source spelling, and nodes the model does not
/// represent (f-strings, awaits, ...) degrade to opaque constants instead of
/// being dropped.
pub(crate) struct ExprBuilder<'a> {
    code: &'a str,
    scope: Option<ObjectId>,
    parse_strings: bool,
}

impl<'a> ExprBuilder<'a> {
    /// Builder for value positions: string literals stay strings.
    pub(crate) fn value(code: &'a str, scope: Option<ObjectId>) -> Self {
        Self {
            code,
            scope,
            parse_strings: false,
        }
    }

    /// Builder for annotation positions: string literals are re-parsed as
    /// forward-reference expressions.
    pub(crate) fn annotation(code: &'a str, scope: Option<ObjectId>) -> Self {
        Self {
            code,
            scope,
            parse_strings: true,
        }
    }

    fn source(&self, node: &impl Ranged) -> String {
        self.code[node.range()].to_string()
    }

    pub(crate) fn build(&self, expression: &AstExpr) -> Expr {
        match expression {
            AstExpr::Name(ast::ExprName { id, .. }) => Expr::name(id.as_str(), self.scope),
            AstExpr::Attribute(ast::ExprAttribute { value, attr, .. }) => Expr::Attribute {
                value: Box::new(self.build(value)),
                attr: attr.id().to_string(),
            },
            AstExpr::Subscript(ast::ExprSubscript { value, slice, .. }) => {
                let value = self.build(value);
                let inner = Self {
                    code: self.code,
                    scope: self.scope,
                    parse_strings: self.parse_strings && !is_literal_form(&value),
                };
                let slice = match slice.as_ref() {
                    // A tuple slice renders without parentheses: `dict[str, int]`.
                    AstExpr::Tuple(ast::ExprTuple { elts, .. }) => Expr::Tuple {
                        elements: elts.iter().map(|e| inner.build(e)).collect(),
                        implicit: true,
                    },
                    other => inner.build(other),
                };
                Expr::Subscript {
                    value: Box::new(value),
                    slice: Box::new(slice),
                }
            }
            AstExpr::Tuple(ast::ExprTuple { elts, .. }) => Expr::Tuple {
                elements: elts.iter().map(|e| self.build(e)).collect(),
                implicit: false,
            },
            AstExpr::List(ast::ExprList { elts, .. }) => {
                Expr::List(elts.iter().map(|e| self.build(e)).collect())
            }
            AstExpr::Set(ast::ExprSet { elts, .. }) => {
                Expr::Set(elts.iter().map(|e| self.build(e)).collect())
            }
            AstExpr::Dict(ast::ExprDict { items, .. }) => {
                let mut keys = Vec::with_capacity(items.len());
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    keys.push(item.key.as_ref().map(|k| self.build(k)));
                    values.push(self.build(&item.value));
                }
                Expr::Dict { keys, values }
            }
            AstExpr::Call(ast::ExprCall { func, arguments, .. }) => {
                let mut args = Vec::new();
                for arg in &*arguments.args {
                    match arg {
                        AstExpr::Starred(ast::ExprStarred { value, .. }) => {
                            args.push(Expr::VarPositional(Box::new(self.build(value))));
                        }
                        other => args.push(self.build(other)),
                    }
                }
                for keyword in &*arguments.keywords {
                    match &keyword.arg {
                        Some(name) => args.push(Expr::Keyword {
                            name: name.id().to_string(),
                            value: Box::new(self.build(&keyword.value)),
                        }),
                        None => args.push(Expr::VarKeyword(Box::new(self.build(&keyword.value)))),
                    }
                }
                Expr::Call {
                    function: Box::new(self.build(func)),
                    arguments: args,
                }
            }
            AstExpr::BinOp(ast::ExprBinOp { left, op, right, .. }) => Expr::BinOp {
                left: Box::new(self.build(left)),
                operator: binary_operator(*op).to_string(),
                right: Box::new(self.build(right)),
            },
            AstExpr::UnaryOp(ast::ExprUnaryOp { op, operand, .. }) => Expr::UnaryOp {
                operator: unary_operator(*op).to_string(),
                operand: Box::new(self.build(operand)),
            },
            AstExpr::BoolOp(ast::ExprBoolOp { op, values, .. }) => Expr::BoolOp {
                operator: match op {
                    ast::BoolOp::And => "and".to_string(),
                    ast::BoolOp::Or => "or".to_string(),
                },
                values: values.iter().map(|v| self.build(v)).collect(),
            },
            AstExpr::Compare(ast::ExprCompare {
                left,
                ops,
                comparators,
                ..
            }) => Expr::Compare {
                left: Box::new(self.build(left)),
                operators: ops.iter().map(|op| compare_operator(*op).to_string()).collect(),
                comparators: comparators.iter().map(|c| self.build(c)).collect(),
            },
            AstExpr::StringLiteral(ast::ExprStringLiteral { value, .. }) => {
                let text = value.to_string();
                if self.parse_strings {
                    self.parse_forward_reference(&text)
                } else {
                    Expr::String(text)
                }
            }
            AstExpr::Lambda(ast::ExprLambda { parameters, body, .. }) => {
                let mut params = Vec::new();
                if let Some(parameters) = parameters {
                    for p in &parameters.posonlyargs {
                        params.push(self.lambda_parameter(p, ParameterKind::PositionalOnly));
                    }
                    for p in &parameters.args {
                        params.push(self.lambda_parameter(p, ParameterKind::PositionalOrKeyword));
                    }
                    if let Some(vararg) = &parameters.vararg {
                        params.push(ExprParameter {
                            name: vararg.name.id().to_string(),
                            kind: ParameterKind::VarPositional,
                            default: None,
                        });
                    }
                    for p in &parameters.kwonlyargs {
                        params.push(self.lambda_parameter(p, ParameterKind::KeywordOnly));
                    }
                    if let Some(kwarg) = &parameters.kwarg {
                        params.push(ExprParameter {
                            name: kwarg.name.id().to_string(),
                            kind: ParameterKind::VarKeyword,
                            default: None,
                        });
                    }
                }
                Expr::Lambda {
                    parameters: params,
                    body: Box::new(self.build(body)),
                }
            }
            AstExpr::Slice(ast::ExprSlice {
                lower, upper, step, ..
            }) => Expr::Slice {
                lower: lower.as_deref().map(|e| Box::new(self.build(e))),
                upper: upper.as_deref().map(|e| Box::new(self.build(e))),
                step: step.as_deref().map(|e| Box::new(self.build(e))),
            },
            AstExpr::Starred(ast::ExprStarred { value, .. }) => {
                Expr::Starred(Box::new(self.build(value)))
            }
            AstExpr::Generator(ast::ExprGenerator { elt, generators, .. }) => {
                self.comprehension(GeneratorFlavor::Generator, elt, None, generators)
            }
            AstExpr::ListComp(ast::ExprListComp { elt, generators, .. }) => {
                self.comprehension(GeneratorFlavor::ListComp, elt, None, generators)
            }
            AstExpr::SetComp(ast::ExprSetComp { elt, generators, .. }) => {
                self.comprehension(GeneratorFlavor::SetComp, elt, None, generators)
            }
            AstExpr::DictComp(ast::ExprDictComp {
                key: Some(key),
                value,
                generators,
                ..
            }) => self.comprehension(GeneratorFlavor::DictComp, key, Some(value), generators),
            AstExpr::DictComp(ast::ExprDictComp {
                key: None,
                value,
                generators,
                ..
            }) => self.comprehension(GeneratorFlavor::DictComp, value, None, generators),
            AstExpr::If(ast::ExprIf {
                test, body, orelse, ..
            }) => Expr::IfExpr {
                body: Box::new(self.build(body)),
                test: Box::new(self.build(test)),
                orelse: Box::new(self.build(orelse)),
            },
            AstExpr::Named(ast::ExprNamed { target, value, .. }) => Expr::NamedExpr {
                target: Box::new(self.build(target)),
                value: Box::new(self.build(value)),
            },
            AstExpr::NumberLiteral(literal) => Expr::Constant(self.source(literal)),
            AstExpr::BooleanLiteral(literal) => Expr::Constant(self.source(literal)),
            AstExpr::NoneLiteral(literal) => Expr::Constant(self.source(literal)),
            AstExpr::EllipsisLiteral(literal) => Expr::Constant(self.source(literal)),
            AstExpr::BytesLiteral(literal) => Expr::Constant(self.source(literal)),
            // F-strings, awaits, yields and anything newer degrade to their
            // source text; they carry no resolvable names we can use.
            other => Expr::Constant(self.source(other)),
        }
    }

    fn lambda_parameter(&self, p: &ast::ParameterWithDefault, kind: ParameterKind) -> ExprParameter {
        ExprParameter {
            name: p.parameter.name.id().to_string(),
            kind,
            default: p.default.as_deref().map(|d| self.build(d)),
        }
    }

    fn comprehension(
        &self,
        flavor: GeneratorFlavor,
        element: &AstExpr,
        value: Option<&AstExpr>,
        generators: &[ast::Comprehension],
    ) -> Expr {
        Expr::Generator {
            flavor,
            element: Box::new(self.build(element)),
            value: value.map(|v| Box::new(self.build(v))),
            generators: generators
                .iter()
                .map(|comp| Comprehension {
                    target: self.build(&comp.target),
                    iterable: self.build(&comp.iter),
                    conditions: comp.ifs.iter().map(|c| self.build(c)).collect(),
                    is_async: comp.is_async,
                })
                .collect(),
        }
    }

    /// Re-parses a string-quoted annotation into a real expression; the
    /// opaque string is kept when the contents do not parse.
    fn parse_forward_reference(&self, text: &str) -> Expr {
        match ruff_python_parser::parse_expression(text) {
            Ok(parsed) => {
                let module = parsed.into_syntax();
                let inner = ExprBuilder {
                    code: text,
                    scope: self.scope,
                    parse_strings: self.parse_strings,
                };
                inner.build(&module.body)
            }
            Err(_) => Expr::String(text.to_string()),
        }
    }
}

/// Parses a free-standing annotation string (as found in docstrings) into an
/// expression whose names resolve in `scope`.
pub fn parse_annotation(text: &str, scope: Option<ObjectId>) -> Expr {
    let trimmed = text.trim();
    match ruff_python_parser::parse_expression(trimmed) {
        Ok(parsed) => {
            let module = parsed.into_syntax();
            ExprBuilder::annotation(trimmed, scope).build(&module.body)
        }
        Err(_) => Expr::String(trimmed.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(code: &str) -> Expr {
        let parsed = ruff_python_parser::parse_expression(code).expect("parse error");
        let module = parsed.into_syntax();
        ExprBuilder::value(code, None).build(&module.body)
    }

    fn build_annotation(code: &str) -> Expr {
        let parsed = ruff_python_parser::parse_expression(code).expect("parse error");
        let module = parsed.into_syntax();
        ExprBuilder::annotation(code, None).build(&module.body)
    }

    #[test]
    fn renders_subscript_with_implicit_tuple() {
        assert_eq!(build("dict[str, int]").to_string(), "dict[str, int]");
    }

    #[test]
    fn renders_binop_with_spaces() {
        assert_eq!(build("int | None").to_string(), "int | None");
    }

    #[test]
    fn renders_call_with_keywords() {
        assert_eq!(
            build("field(default_factory=list, init=False)").to_string(),
            "field(default_factory=list, init=False)"
        );
    }

    #[test]
    fn renders_lambda() {
        assert_eq!(build("lambda x, y=1: x + y").to_string(), "lambda x, y=1: x + y");
    }

    #[test]
    fn renders_comprehension() {
        assert_eq!(build("[x for x in items if x]").to_string(), "[x for x in items if x]");
    }

    #[test]
    fn string_annotation_is_reparsed() {
        let expr = build_annotation("'list[int]'");
        assert_eq!(expr.to_string(), "list[int]");
        assert_eq!(expr.cls(), "ExprSubscript");
    }

    #[test]
    fn literal_strings_are_not_reparsed() {
        let expr = build_annotation("Literal['a', 'b']");
        assert_eq!(expr.to_string(), "Literal['a', 'b']");
    }

    #[test]
    fn constant_keeps_source_spelling() {
        assert_eq!(build("0x2a").to_string(), "0x2a");
        assert_eq!(build("...").to_string(), "...");
    }

    #[test]
    fn names_are_collected_left_to_right() {
        let expr = build("Mapping[str, Sequence[int]]");
        let names: Vec<&str> = expr.names().iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, ["Mapping", "str", "Sequence", "int"]);
    }
}
