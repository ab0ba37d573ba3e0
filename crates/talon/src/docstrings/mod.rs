//! Docstring structuring: detecting the docstring style and parsing the raw
//! text into a sequence of typed sections.

mod google;
mod numpy;
mod sphinx;

use std::sync::LazyLock;

use regex::Regex;

use crate::collections::ModulesCollection;
use crate::expr::Expr;
use crate::objects::{Docstring, ObjectId};

/// The docstring style to parse with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum DocstringStyle {
    Google,
    Numpy,
    Sphinx,
    #[default]
    Auto,
}

/// Options recognized by the docstring parsers. Unknown keys are ignored
/// with a warning so new options stay forward-compatible.
#[derive(Debug, Clone)]
pub struct DocstringOptions {
    /// Skip the summary line of `__init__` docstrings.
    pub ignore_init_summary: bool,
    /// Parse every line of a returns section as a separate item.
    pub returns_multiple_items: bool,
    /// Parse `name: description` items in returns sections as named values.
    pub returns_named_value: bool,
    pub receives_multiple_items: bool,
    pub receives_named_value: bool,
    /// Keep the return type in the summary of property docstrings.
    pub returns_type_in_property_summary: bool,
    /// Strip `# doctest: +FLAG` comments from example blocks.
    pub trim_doctest_flags: bool,
    /// Warn when a documented parameter is missing from the signature.
    pub warn_unknown_params: bool,
    /// Warn when a documented item carries no type information.
    pub warn_missing_types: bool,
    /// Master toggle for all docstring warnings.
    pub warnings: bool,
}

impl Default for DocstringOptions {
    fn default() -> Self {
        Self {
            ignore_init_summary: false,
            returns_multiple_items: true,
            returns_named_value: true,
            receives_multiple_items: true,
            receives_named_value: true,
            returns_type_in_property_summary: false,
            trim_doctest_flags: true,
            warn_unknown_params: true,
            warn_missing_types: false,
            warnings: true,
        }
    }
}

impl DocstringOptions {
    /// Applies a `key=value` option as given on the command line.
    pub fn set(&mut self, key: &str, value: &str) {
        let enabled = matches!(value, "true" | "yes" | "1");
        match key {
            "ignore_init_summary" => self.ignore_init_summary = enabled,
            "returns_multiple_items" => self.returns_multiple_items = enabled,
            "returns_named_value" => self.returns_named_value = enabled,
            "receives_multiple_items" => self.receives_multiple_items = enabled,
            "receives_named_value" => self.receives_named_value = enabled,
            "returns_type_in_property_summary" => self.returns_type_in_property_summary = enabled,
            "trim_doctest_flags" => self.trim_doctest_flags = enabled,
            "warn_unknown_params" => self.warn_unknown_params = enabled,
            "warn_missing_types" => self.warn_missing_types = enabled,
            "warnings" => self.warnings = enabled,
            other => tracing::warn!("unknown docstring option '{other}'"),
        }
    }
}

/// A parameter documented in a docstring section.
#[derive(Debug, Clone, PartialEq)]
pub struct DocstringParameter {
    pub name: String,
    pub annotation: Option<Expr>,
    pub description: String,
}

/// An exception or warning documented in a raises/warns section.
#[derive(Debug, Clone, PartialEq)]
pub struct DocstringException {
    pub annotation: Option<Expr>,
    pub description: String,
}

/// A (possibly named) value documented in a returns/yields/receives section.
#[derive(Debug, Clone, PartialEq)]
pub struct DocstringReturn {
    pub name: Option<String>,
    pub annotation: Option<Expr>,
    pub description: String,
}

/// An attribute documented in an attributes section.
#[derive(Debug, Clone, PartialEq)]
pub struct DocstringAttribute {
    pub name: String,
    pub annotation: Option<Expr>,
    pub description: String,
}

/// A function, class, module or type alias documented in a listing section.
#[derive(Debug, Clone, PartialEq)]
pub struct DocstringNamedElement {
    pub name: String,
    pub signature: Option<String>,
    pub description: String,
}

/// One part of an examples section: prose or a console block.
#[derive(Debug, Clone, PartialEq)]
pub enum ExamplePart {
    Text(String),
    Code(String),
}

/// Kind-specific content of a docstring section.
#[derive(Debug, Clone, PartialEq)]
pub enum SectionContent {
    Text(String),
    Parameters(Vec<DocstringParameter>),
    OtherParameters(Vec<DocstringParameter>),
    TypeParameters(Vec<DocstringParameter>),
    Raises(Vec<DocstringException>),
    Warns(Vec<DocstringException>),
    Returns(Vec<DocstringReturn>),
    Yields(Vec<DocstringReturn>),
    Receives(Vec<DocstringReturn>),
    Examples(Vec<ExamplePart>),
    Attributes(Vec<DocstringAttribute>),
    Functions(Vec<DocstringNamedElement>),
    Classes(Vec<DocstringNamedElement>),
    Modules(Vec<DocstringNamedElement>),
    TypeAliases(Vec<DocstringNamedElement>),
    Deprecated { version: Option<String>, text: String },
    Admonition { kind: String, text: String },
}

/// One section of a structured docstring.
#[derive(Debug, Clone, PartialEq)]
pub struct DocstringSection {
    pub title: Option<String>,
    pub content: SectionContent,
}

impl DocstringSection {
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            title: None,
            content: SectionContent::Text(value.into()),
        }
    }

    /// The serialization tag of this section kind.
    pub fn kind(&self) -> &'static str {
        match &self.content {
            SectionContent::Text(_) => "text",
            SectionContent::Parameters(_) => "parameters",
            SectionContent::OtherParameters(_) => "other parameters",
            SectionContent::TypeParameters(_) => "type parameters",
            SectionContent::Raises(_) => "raises",
            SectionContent::Warns(_) => "warns",
            SectionContent::Returns(_) => "returns",
            SectionContent::Yields(_) => "yields",
            SectionContent::Receives(_) => "receives",
            SectionContent::Examples(_) => "examples",
            SectionContent::Attributes(_) => "attributes",
            SectionContent::Functions(_) => "functions",
            SectionContent::Classes(_) => "classes",
            SectionContent::Modules(_) => "modules",
            SectionContent::TypeAliases(_) => "type aliases",
            SectionContent::Deprecated { .. } => "deprecated",
            SectionContent::Admonition { .. } => "admonition",
        }
    }
}

/// Scope and signature context for docstring parsing: the object owning the
/// docstring, used to resolve type names and to fill missing parameter types
/// from the signature.
#[derive(Clone, Copy)]
pub struct DocstringContext<'a> {
    pub modules: &'a ModulesCollection,
    pub owner: ObjectId,
}

impl DocstringContext<'_> {
    /// The annotation of the named parameter on the owning function.
    pub(crate) fn parameter_annotation(&self, name: &str) -> Option<Expr> {
        let name = name.trim_start_matches('*');
        self.modules
            .get(self.owner)
            .as_function()
            .and_then(|f| f.parameters.get(name))
            .and_then(|p| p.annotation.clone())
    }

    /// The return annotation of the owning function.
    pub(crate) fn return_annotation(&self) -> Option<Expr> {
        self.modules
            .get(self.owner)
            .as_function()
            .and_then(|f| f.returns.clone())
    }

    pub(crate) fn has_parameter(&self, name: &str) -> bool {
        let name = name.trim_start_matches('*');
        self.modules
            .get(self.owner)
            .as_function()
            .is_none_or(|f| f.parameters.get(name).is_some())
    }

    pub(crate) fn scope(&self) -> ObjectId {
        self.owner
    }

    pub(crate) fn path(&self) -> String {
        self.modules.path(self.owner)
    }
}

/// Parses a docstring into typed sections using the given style.
///
/// With `DocstringStyle::Auto` the style is detected first; detection falls
/// back to google when nothing matches.
pub fn parse(
    docstring: &Docstring,
    style: DocstringStyle,
    options: &DocstringOptions,
    context: Option<DocstringContext<'_>>,
) -> Vec<DocstringSection> {
    let style = match style {
        DocstringStyle::Auto => detect_style(&docstring.value),
        other => other,
    };
    match style {
        DocstringStyle::Google => google::parse(&docstring.value, options, context),
        DocstringStyle::Numpy => numpy::parse(&docstring.value, options, context),
        DocstringStyle::Sphinx => sphinx::parse(&docstring.value, options, context),
        DocstringStyle::Auto => unreachable!("auto style resolved above"),
    }
}

static SPHINX_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*:(param|parameter|arg|argument|returns?|rtype|raises?|except|exception|type|var|ivar|cvar)\b[^:\n]*:").unwrap()
});
static GOOGLE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^ *(args|arguments|params|parameters|keyword args|keyword arguments|other parameters|returns|yields|receives|raises|exceptions|warns|warnings|examples|attributes|methods|functions|classes|modules|deprecated)\s*:\s*$").unwrap()
});
static NUMPY_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^ *(parameters|other parameters|returns|yields|receives|raises|warns|warnings|examples|attributes|methods|functions|classes|modules|see also|notes|deprecated)\s*\n *-{3,}\s*$").unwrap()
});

/// Votes on the docstring style by counting style-characteristic section
/// markers. Ties break in the order google, numpy, sphinx; no match at all
/// falls back to google.
pub fn detect_style(text: &str) -> DocstringStyle {
    let votes = [
        (DocstringStyle::Google, GOOGLE_MARKER.find_iter(text).count()),
        (DocstringStyle::Numpy, NUMPY_MARKER.find_iter(text).count()),
        (DocstringStyle::Sphinx, SPHINX_MARKER.find_iter(text).count()),
    ];
    let best = votes.iter().max_by_key(|(_, count)| *count);
    match best {
        Some((style, count)) if *count > 0 => *style,
        _ => DocstringStyle::Google,
    }
}

/// Detects the style by parsing with every candidate parser and keeping the
/// one that recognizes the most sections; ties break in candidate order.
pub fn detect_style_max_sections(
    docstring: &Docstring,
    options: &DocstringOptions,
    order: &[DocstringStyle],
) -> DocstringStyle {
    let mut best = DocstringStyle::Google;
    let mut best_count = 0;
    for style in order {
        let sections = match style {
            DocstringStyle::Google => google::parse(&docstring.value, options, None),
            DocstringStyle::Numpy => numpy::parse(&docstring.value, options, None),
            DocstringStyle::Sphinx => sphinx::parse(&docstring.value, options, None),
            DocstringStyle::Auto => continue,
        };
        let recognized = sections
            .iter()
            .filter(|s| !matches!(s.content, SectionContent::Text(_)))
            .count();
        if recognized > best_count {
            best_count = recognized;
            best = *style;
        }
    }
    best
}

/// Cleans a raw docstring: dedents every line after the first, strips
/// leading and trailing blank lines and trailing whitespace.
pub fn clean(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let indent = lines
        .iter()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);
    let mut cleaned: Vec<String> = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        if i == 0 {
            cleaned.push(line.trim_start().trim_end().to_string());
        } else if line.len() >= indent {
            cleaned.push(line[indent..].trim_end().to_string());
        } else {
            cleaned.push(line.trim_end().to_string());
        }
    }
    while cleaned.first().is_some_and(|line| line.is_empty()) {
        cleaned.remove(0);
    }
    while cleaned.last().is_some_and(|line| line.is_empty()) {
        cleaned.pop();
    }
    cleaned.join("\n")
}

/// Splits a `TYPE: summary` head off a property docstring into a returns
/// section, when the option asks for it and the docstring belongs to a
/// property.
pub(crate) fn split_property_summary(
    sections: &mut Vec<DocstringSection>,
    options: &DocstringOptions,
    context: Option<DocstringContext<'_>>,
) {
    if !options.returns_type_in_property_summary {
        return;
    }
    let Some(context) = context else { return };
    if !context.modules.get(context.owner).labels.contains("property") {
        return;
    }
    let Some(first) = sections.first_mut() else { return };
    let SectionContent::Text(text) = &mut first.content else {
        return;
    };
    let Some(line) = text.lines().next() else { return };
    let Some((head, summary)) = split_item_head(line) else {
        return;
    };
    if head.is_empty() || summary.is_empty() {
        return;
    }
    let annotation = crate::expr::parse_annotation(head, Some(context.scope()));
    let rest: String = text.lines().skip(1).collect::<Vec<_>>().join("\n");
    *text = if rest.is_empty() {
        summary.to_string()
    } else {
        format!("{summary}\n{rest}")
    };
    sections.push(DocstringSection {
        title: None,
        content: SectionContent::Returns(vec![DocstringReturn {
            name: None,
            annotation: Some(annotation),
            description: String::new(),
        }]),
    });
}

/// Emits a docstring warning unless warnings are disabled.
pub(crate) fn emit_warning(options: &DocstringOptions, context: Option<DocstringContext<'_>>, message: &str) {
    if !options.warnings {
        return;
    }
    match context {
        Some(context) => tracing::warn!("{}: {message}", context.path()),
        None => tracing::warn!("{message}"),
    }
}

/// Splits `head: rest` at the first colon that sits outside any brackets,
/// so that `dict[str, int]: description` keeps its type intact.
pub(crate) fn split_item_head(line: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    for (i, c) in line.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ':' if depth == 0 => {
                return Some((line[..i].trim_end(), line[i + 1..].trim_start()));
            }
            _ => {}
        }
    }
    None
}

/// Splits a `name (type)` item head into its name and optional type text.
pub(crate) fn split_name_and_type(head: &str) -> (String, Option<String>) {
    let head = head.trim();
    if let Some(open) = head.find('(') {
        if head.ends_with(')') {
            let name = head[..open].trim().to_string();
            let ty = head[open + 1..head.len() - 1].trim().to_string();
            return (name, (!ty.is_empty()).then_some(ty));
        }
    }
    (head.to_string(), None)
}

/// Splits an examples block into alternating prose and console parts. A
/// console part starts at a `>>>` line and extends to the next blank line.
pub(crate) fn parse_examples(block: &[String], options: &DocstringOptions) -> Vec<ExamplePart> {
    let mut parts = Vec::new();
    let mut text: Vec<String> = Vec::new();
    let mut code: Vec<String> = Vec::new();
    let mut in_code = false;

    fn flush_text(text: &mut Vec<String>, parts: &mut Vec<ExamplePart>) {
        let joined = clean(&text.join("\n"));
        if !joined.is_empty() {
            parts.push(ExamplePart::Text(joined));
        }
        text.clear();
    }
    fn flush_code(code: &mut Vec<String>, parts: &mut Vec<ExamplePart>) {
        if !code.is_empty() {
            parts.push(ExamplePart::Code(code.join("\n")));
        }
        code.clear();
    }

    for line in block {
        let trimmed = line.trim_start();
        if in_code {
            if line.trim().is_empty() {
                in_code = false;
                flush_code(&mut code, &mut parts);
            } else if options.trim_doctest_flags {
                code.push(trim_doctest_line(line));
            } else {
                code.push(line.clone());
            }
        } else if trimmed.starts_with(">>>") {
            in_code = true;
            flush_text(&mut text, &mut parts);
            if options.trim_doctest_flags {
                code.push(trim_doctest_line(line));
            } else {
                code.push(line.clone());
            }
        } else {
            text.push(line.clone());
        }
    }
    flush_code(&mut code, &mut parts);
    flush_text(&mut text, &mut parts);
    parts
}

/// Strips `# doctest: +FLAG` comments from a console line.
pub(crate) fn trim_doctest_line(line: &str) -> String {
    match line.find("# doctest:") {
        Some(pos) => line[..pos].trim_end().to_string(),
        None => line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_dedents_and_strips() {
        let raw = "Summary.\n\n        Body line.\n        More.\n    ";
        assert_eq!(clean(raw), "Summary.\n\nBody line.\nMore.");
    }

    #[test]
    fn detects_google_style() {
        let text = "Do a thing.\n\nArgs:\n    x: A value.\n";
        assert_eq!(detect_style(text), DocstringStyle::Google);
    }

    #[test]
    fn detects_numpy_style() {
        let text = "Do a thing.\n\nParameters\n----------\nx : int\n    A value.\n";
        assert_eq!(detect_style(text), DocstringStyle::Numpy);
    }

    #[test]
    fn detects_sphinx_style() {
        let text = "Do a thing.\n\n:param x: A value.\n:returns: Something.\n";
        assert_eq!(detect_style(text), DocstringStyle::Sphinx);
    }

    #[test]
    fn split_item_head_respects_brackets() {
        assert_eq!(
            split_item_head("data (dict[str, int]): mapping"),
            Some(("data (dict[str, int])", "mapping"))
        );
        assert_eq!(split_item_head("no separator here"), None);
    }

    #[test]
    fn split_name_and_type_variants() {
        assert_eq!(split_name_and_type("x (int)"), ("x".to_string(), Some("int".to_string())));
        assert_eq!(split_name_and_type("x"), ("x".to_string(), None));
    }

    #[test]
    fn unknown_option_is_ignored() {
        let mut options = DocstringOptions::default();
        options.set("warnings", "false");
        assert!(!options.warnings);
        options.set("definitely_not_an_option", "true");
    }
}
