//! Parser for numpy-style docstring sections (`Parameters` over a dashed
//! underline).

use crate::expr::parse_annotation;

use super::{
    DocstringAttribute, DocstringContext, DocstringException, DocstringNamedElement, DocstringOptions,
    DocstringParameter, DocstringReturn, DocstringSection, SectionContent, clean, emit_warning, parse_examples,
};

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn is_underline(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= 3 && trimmed.chars().all(|c| c == '-')
}

/// Parses a numpy-style docstring into sections.
pub(crate) fn parse(
    text: &str,
    options: &DocstringOptions,
    context: Option<DocstringContext<'_>>,
) -> Vec<DocstringSection> {
    let lines: Vec<&str> = text.lines().collect();
    let mut sections = Vec::new();
    let mut current_text: Vec<String> = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let is_header = i + 1 < lines.len()
            && !line.trim().is_empty()
            && is_underline(lines[i + 1])
            && line.trim().chars().all(|c| c.is_alphabetic() || c == ' ');
        if is_header {
            let identifier = line.trim().to_lowercase();
            let (block, next) = read_block(&lines, i + 2, indent_of(line));
            flush_text(&mut sections, &mut current_text);
            sections.push(build_section(&identifier, &block, options, context));
            i = next;
            continue;
        }
        current_text.push(line.to_string());
        i += 1;
    }
    flush_text(&mut sections, &mut current_text);

    if options.ignore_init_summary && is_init_docstring(context) {
        strip_summary(&mut sections);
    }
    super::split_property_summary(&mut sections, options, context);
    sections
}

fn is_init_docstring(context: Option<DocstringContext<'_>>) -> bool {
    context.is_some_and(|c| c.modules.get(c.owner).name == "__init__")
}

fn strip_summary(sections: &mut Vec<DocstringSection>) {
    let Some(first) = sections.first_mut() else { return };
    if let SectionContent::Text(text) = &mut first.content {
        let rest = match text.split_once("\n\n") {
            Some((_, rest)) => rest.to_string(),
            None => String::new(),
        };
        if rest.is_empty() {
            sections.remove(0);
        } else {
            *text = rest;
        }
    }
}

/// Collects the body of a section: everything up to the next underlined
/// header at the section's own indentation level.
fn read_block(lines: &[&str], start: usize, header_indent: usize) -> (Vec<String>, usize) {
    let mut end = start;
    while end < lines.len() {
        let line = lines[end];
        let next_is_header = end + 1 < lines.len()
            && !line.trim().is_empty()
            && indent_of(line) <= header_indent
            && is_underline(lines[end + 1]);
        if next_is_header {
            break;
        }
        end += 1;
    }
    let mut block: Vec<String> = lines[start..end].iter().map(|l| l.trim_end().to_string()).collect();
    while block.first().is_some_and(|line| line.is_empty()) {
        block.remove(0);
    }
    while block.last().is_some_and(|line| line.is_empty()) {
        block.pop();
    }
    (block, end)
}

fn build_section(
    identifier: &str,
    block: &[String],
    options: &DocstringOptions,
    context: Option<DocstringContext<'_>>,
) -> DocstringSection {
    let content = match identifier {
        "parameters" | "args" | "arguments" | "params" => {
            SectionContent::Parameters(parse_parameters(block, options, context, true))
        }
        "other parameters" | "keyword args" | "keyword arguments" => {
            SectionContent::OtherParameters(parse_parameters(block, options, context, false))
        }
        "type parameters" => SectionContent::TypeParameters(parse_parameters(block, options, context, false)),
        "raises" | "exceptions" => SectionContent::Raises(parse_exceptions(block, context)),
        "warns" | "warnings" => SectionContent::Warns(parse_exceptions(block, context)),
        "returns" => SectionContent::Returns(parse_returns(block, context, true)),
        "yields" => SectionContent::Yields(parse_returns(block, context, true)),
        "receives" => SectionContent::Receives(parse_returns(block, context, false)),
        "attributes" => SectionContent::Attributes(parse_attributes(block, context)),
        "functions" | "methods" => SectionContent::Functions(parse_listing(block)),
        "classes" => SectionContent::Classes(parse_listing(block)),
        "modules" => SectionContent::Modules(parse_listing(block)),
        "type aliases" => SectionContent::TypeAliases(parse_listing(block)),
        "examples" => SectionContent::Examples(parse_examples(block, options)),
        "deprecated" => SectionContent::Deprecated {
            version: None,
            text: clean(&block.join("\n")),
        },
        other => SectionContent::Admonition {
            kind: other.replace(' ', "-"),
            text: clean(&block.join("\n")),
        },
    };
    DocstringSection { title: None, content }
}

/// Splits a section body into items: `head` lines at column zero, each
/// followed by an indented description.
fn split_items(block: &[String]) -> Vec<(String, String)> {
    let mut items: Vec<(String, Vec<String>)> = Vec::new();
    for line in block {
        if !line.trim().is_empty() && indent_of(line) == 0 {
            items.push((line.clone(), Vec::new()));
        } else if let Some(last) = items.last_mut() {
            last.1.push(line.trim_start().to_string());
        }
    }
    items
        .into_iter()
        .map(|(head, body)| (head, clean(&body.join("\n"))))
        .collect()
}

/// Splits a `name : type` item head; either side may be empty.
fn split_head(head: &str) -> (Option<String>, Option<String>) {
    match head.split_once(':') {
        Some((name, ty)) => {
            let name = name.trim();
            let ty = ty.trim();
            (
                (!name.is_empty()).then(|| name.to_string()),
                (!ty.is_empty()).then(|| ty.to_string()),
            )
        }
        None => {
            let name = head.trim();
            ((!name.is_empty()).then(|| name.to_string()), None)
        }
    }
}

fn parse_parameters(
    block: &[String],
    options: &DocstringOptions,
    context: Option<DocstringContext<'_>>,
    check_signature: bool,
) -> Vec<DocstringParameter> {
    let mut parameters = Vec::new();
    for (head, description) in split_items(block) {
        let (name, type_text) = split_head(&head);
        let Some(name) = name else {
            emit_warning(options, context, &format!("malformed parameter item: '{head}'"));
            continue;
        };
        // `x, y : int` documents several parameters at once.
        for name in name.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            let mut annotation = type_text
                .as_ref()
                .map(|t| parse_annotation(t, context.map(|c| c.scope())));
            if annotation.is_none() {
                annotation = context.and_then(|c| c.parameter_annotation(name));
            }
            if check_signature && options.warn_unknown_params {
                if let Some(context) = context {
                    if !context.has_parameter(name) {
                        emit_warning(
                            options,
                            Some(context),
                            &format!("parameter '{name}' does not appear in the signature"),
                        );
                    }
                }
            }
            parameters.push(DocstringParameter {
                name: name.to_string(),
                annotation,
                description: description.clone(),
            });
        }
    }
    parameters
}

fn parse_exceptions(block: &[String], context: Option<DocstringContext<'_>>) -> Vec<DocstringException> {
    split_items(block)
        .into_iter()
        .map(|(head, description)| DocstringException {
            annotation: Some(parse_annotation(head.trim(), context.map(|c| c.scope()))),
            description,
        })
        .collect()
}

fn parse_returns(
    block: &[String],
    context: Option<DocstringContext<'_>>,
    fill_from_signature: bool,
) -> Vec<DocstringReturn> {
    let mut returns: Vec<DocstringReturn> = split_items(block)
        .into_iter()
        .map(|(head, description)| {
            let (name, type_text) = split_head(&head);
            // A bare head is a type, not a name: `int` over a description.
            let (name, annotation) = match (name, type_text) {
                (name, Some(ty)) => (name, Some(parse_annotation(&ty, context.map(|c| c.scope())))),
                (Some(single), None) => (
                    None,
                    Some(parse_annotation(&single, context.map(|c| c.scope()))),
                ),
                (None, None) => (None, None),
            };
            DocstringReturn {
                name,
                annotation,
                description,
            }
        })
        .collect();
    if fill_from_signature && returns.len() == 1 && returns[0].annotation.is_none() {
        returns[0].annotation = context.and_then(|c| c.return_annotation());
    }
    returns
}

fn parse_attributes(block: &[String], context: Option<DocstringContext<'_>>) -> Vec<DocstringAttribute> {
    split_items(block)
        .into_iter()
        .filter_map(|(head, description)| {
            let (name, type_text) = split_head(&head);
            let name = name?;
            let annotation = type_text.map(|t| parse_annotation(&t, context.map(|c| c.scope())));
            Some(DocstringAttribute {
                name,
                annotation,
                description,
            })
        })
        .collect()
}

fn parse_listing(block: &[String]) -> Vec<DocstringNamedElement> {
    split_items(block)
        .into_iter()
        .map(|(head, description)| {
            let head = head.trim();
            let (name, signature) = match head.find('(') {
                Some(open) if head.ends_with(')') => (
                    head[..open].trim().to_string(),
                    Some(head[open + 1..head.len() - 1].to_string()),
                ),
                _ => (head.to_string(), None),
            };
            DocstringNamedElement {
                name,
                signature,
                description,
            }
        })
        .collect()
}

fn flush_text(sections: &mut Vec<DocstringSection>, current: &mut Vec<String>) {
    let text = clean(&current.join("\n"));
    if !text.is_empty() {
        sections.push(DocstringSection::text(text));
    }
    current.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_plain(text: &str) -> Vec<DocstringSection> {
        parse(text, &DocstringOptions::default(), None)
    }

    #[test]
    fn parameters_with_types() {
        let sections = parse_plain("Summary.\n\nParameters\n----------\nx : int\n    A value.\ny\n    Untyped.\n");
        assert_eq!(sections.len(), 2);
        let SectionContent::Parameters(params) = &sections[1].content else {
            panic!("expected a parameters section");
        };
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "x");
        assert_eq!(params[0].annotation.as_ref().unwrap().to_string(), "int");
        assert_eq!(params[0].description, "A value.");
        assert_eq!(params[1].name, "y");
        assert!(params[1].annotation.is_none());
    }

    #[test]
    fn combined_parameters_split() {
        let sections = parse_plain("Parameters\n----------\nx, y : int\n    Coordinates.\n");
        let SectionContent::Parameters(params) = &sections[0].content else {
            panic!("expected a parameters section");
        };
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "x");
        assert_eq!(params[1].name, "y");
        assert_eq!(params[1].annotation.as_ref().unwrap().to_string(), "int");
    }

    #[test]
    fn returns_bare_head_is_a_type() {
        let sections = parse_plain("Returns\n-------\nint\n    The count.\n");
        let SectionContent::Returns(returns) = &sections[0].content else {
            panic!("expected a returns section");
        };
        assert_eq!(returns[0].name, None);
        assert_eq!(returns[0].annotation.as_ref().unwrap().to_string(), "int");
    }

    #[test]
    fn consecutive_sections() {
        let sections = parse_plain(
            "Parameters\n----------\nx : int\n    A value.\n\nRaises\n------\nValueError\n    Bad input.\n",
        );
        assert_eq!(sections.len(), 2);
        assert!(matches!(sections[0].content, SectionContent::Parameters(_)));
        let SectionContent::Raises(raises) = &sections[1].content else {
            panic!("expected a raises section");
        };
        assert_eq!(raises[0].annotation.as_ref().unwrap().to_string(), "ValueError");
    }

    #[test]
    fn unknown_header_becomes_admonition() {
        let sections = parse_plain("See Also\n--------\nother_function\n");
        let SectionContent::Admonition { kind, .. } = &sections[0].content else {
            panic!("expected an admonition");
        };
        assert_eq!(kind, "see-also");
    }
}
