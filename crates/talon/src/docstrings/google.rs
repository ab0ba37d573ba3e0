//! Parser for google-style docstring sections (`Args:`, `Returns:`, ...).

use crate::expr::parse_annotation;

use super::{
    DocstringAttribute, DocstringContext, DocstringException, DocstringNamedElement, DocstringOptions,
    DocstringParameter, DocstringReturn, DocstringSection, SectionContent, clean, emit_warning, parse_examples,
    split_item_head, split_name_and_type,
};

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// Parses a google-style docstring into sections.
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
        if let Some((identifier, title)) = section_header(line) {
            let (block, next) = read_block(&lines, i + 1, indent_of(line));
            if !block.is_empty() {
                flush_text(&mut sections, &mut current_text);
                sections.push(build_section(&identifier, title, &block, options, context));
                i = next;
                continue;
            }
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

/// Drops the summary line (and the blank line after it) of the leading text
/// section.
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

/// Recognizes a `Identifier[: title]` section header line. The identifier
/// must be a short run of words; whether the line actually starts a section
/// is decided by the presence of an indented block after it.
fn section_header(line: &str) -> Option<(String, Option<String>)> {
    let trimmed = line.trim();
    let (head, rest) = trimmed.split_once(':')?;
    let head = head.trim();
    if head.is_empty() || head.split_whitespace().count() > 3 {
        return None;
    }
    if !head.split_whitespace().all(|w| w.chars().all(char::is_alphabetic)) {
        return None;
    }
    let title = rest.trim();
    Some((
        head.to_lowercase(),
        (!title.is_empty()).then(|| title.to_string()),
    ))
}

/// Collects the indented block following a section header, stopping at the
/// first non-blank line at or above the header's indentation. The block is
/// returned dedented with surrounding blank lines stripped.
fn read_block(lines: &[&str], start: usize, header_indent: usize) -> (Vec<String>, usize) {
    let mut end = start;
    while end < lines.len() {
        let line = lines[end];
        if !line.trim().is_empty() && indent_of(line) <= header_indent {
            break;
        }
        end += 1;
    }
    let mut block: Vec<&str> = lines[start..end].to_vec();
    while block.first().is_some_and(|line| line.trim().is_empty()) {
        block.remove(0);
    }
    while block.last().is_some_and(|line| line.trim().is_empty()) {
        block.pop();
    }
    let indent = block
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| indent_of(line))
        .min()
        .unwrap_or(0);
    let dedented = block
        .iter()
        .map(|line| {
            if line.len() >= indent {
                line[indent..].trim_end().to_string()
            } else {
                line.trim_end().to_string()
            }
        })
        .collect();
    (dedented, end)
}

fn build_section(
    identifier: &str,
    title: Option<String>,
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
        "raises" | "exceptions" => SectionContent::Raises(parse_exceptions(block, options, context)),
        "warns" | "warnings" => SectionContent::Warns(parse_exceptions(block, options, context)),
        "returns" => SectionContent::Returns(parse_returns(
            block,
            options,
            context,
            options.returns_multiple_items,
            options.returns_named_value,
        )),
        "yields" => SectionContent::Yields(parse_returns(
            block,
            options,
            context,
            options.returns_multiple_items,
            options.returns_named_value,
        )),
        "receives" => SectionContent::Receives(parse_returns(
            block,
            options,
            context,
            options.receives_multiple_items,
            options.receives_named_value,
        )),
        "attributes" => SectionContent::Attributes(parse_attributes(block, context)),
        "functions" | "methods" => SectionContent::Functions(parse_listing(block)),
        "classes" => SectionContent::Classes(parse_listing(block)),
        "modules" => SectionContent::Modules(parse_listing(block)),
        "type aliases" => SectionContent::TypeAliases(parse_listing(block)),
        "examples" => SectionContent::Examples(parse_examples(block, options)),
        "deprecated" => parse_deprecated(block),
        other => SectionContent::Admonition {
            kind: other.replace(' ', "-"),
            text: clean(&block.join("\n")),
        },
    };
    DocstringSection { title, content }
}

/// Splits a dedented block into items: an item starts at column zero and its
/// continuation lines are indented one extra level.
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
        .map(|(head, rest)| (head, rest.join("\n")))
        .collect()
}

fn item_description(first: &str, continuation: &str) -> String {
    if continuation.is_empty() {
        clean(first)
    } else if first.is_empty() {
        clean(continuation)
    } else {
        clean(&format!("{first}\n{continuation}"))
    }
}

fn parse_parameters(
    block: &[String],
    options: &DocstringOptions,
    context: Option<DocstringContext<'_>>,
    check_signature: bool,
) -> Vec<DocstringParameter> {
    let mut parameters = Vec::new();
    for (head_line, continuation) in split_items(block) {
        let Some((head, rest)) = split_item_head(&head_line) else {
            emit_warning(options, context, &format!("malformed parameter item: '{head_line}'"));
            parameters.push(DocstringParameter {
                name: head_line.trim().to_string(),
                annotation: None,
                description: clean(&continuation),
            });
            continue;
        };
        let (name, type_text) = split_name_and_type(head);
        let mut annotation = type_text.map(|t| parse_annotation(&t, context.map(|c| c.scope())));
        if annotation.is_none() {
            annotation = context.and_then(|c| c.parameter_annotation(&name));
        }
        if annotation.is_none() && options.warn_missing_types {
            emit_warning(options, context, &format!("no type for parameter '{name}'"));
        }
        if check_signature && options.warn_unknown_params {
            if let Some(context) = context {
                if !context.has_parameter(&name) {
                    emit_warning(
                        options,
                        Some(context),
                        &format!("parameter '{name}' does not appear in the signature"),
                    );
                }
            }
        }
        parameters.push(DocstringParameter {
            name,
            annotation,
            description: item_description(rest, &continuation),
        });
    }
    parameters
}

fn parse_exceptions(
    block: &[String],
    options: &DocstringOptions,
    context: Option<DocstringContext<'_>>,
) -> Vec<DocstringException> {
    let mut exceptions = Vec::new();
    for (head_line, continuation) in split_items(block) {
        let Some((head, rest)) = split_item_head(&head_line) else {
            emit_warning(options, context, &format!("malformed raises item: '{head_line}'"));
            exceptions.push(DocstringException {
                annotation: None,
                description: item_description(&head_line, &continuation),
            });
            continue;
        };
        exceptions.push(DocstringException {
            annotation: Some(parse_annotation(head, context.map(|c| c.scope()))),
            description: item_description(rest, &continuation),
        });
    }
    exceptions
}

fn parse_returns(
    block: &[String],
    options: &DocstringOptions,
    context: Option<DocstringContext<'_>>,
    multiple_items: bool,
    named_value: bool,
) -> Vec<DocstringReturn> {
    // Without any `x: description` item shape the whole block is one item,
    // regardless of the multiple-items option.
    let has_items = block
        .iter()
        .any(|line| !line.trim().is_empty() && indent_of(line) == 0 && split_item_head(line).is_some());
    if !multiple_items || !has_items {
        return vec![DocstringReturn {
            name: None,
            annotation: context.and_then(|c| c.return_annotation()),
            description: clean(&block.join("\n")),
        }];
    }
    let mut returns = Vec::new();
    for (head_line, continuation) in split_items(block) {
        let item = match split_item_head(&head_line) {
            Some((head, rest)) => {
                let (name, type_text) = split_name_and_type(head);
                let (name, annotation) = match type_text {
                    Some(t) => (
                        Some(name),
                        Some(parse_annotation(&t, context.map(|c| c.scope()))),
                    ),
                    None if named_value => (Some(name), None),
                    None => (
                        None,
                        Some(parse_annotation(&name, context.map(|c| c.scope()))),
                    ),
                };
                DocstringReturn {
                    name,
                    annotation,
                    description: item_description(rest, &continuation),
                }
            }
            // A block without any `x: description` shape is one untyped item.
            None => DocstringReturn {
                name: None,
                annotation: None,
                description: item_description(&head_line, &continuation),
            },
        };
        returns.push(item);
    }
    // A single untyped item inherits the signature's return annotation.
    if returns.len() == 1 && returns[0].annotation.is_none() {
        returns[0].annotation = context.and_then(|c| c.return_annotation());
    }
    returns
}

fn parse_attributes(block: &[String], context: Option<DocstringContext<'_>>) -> Vec<DocstringAttribute> {
    let mut attributes = Vec::new();
    for (head_line, continuation) in split_items(block) {
        let (head, rest) = split_item_head(&head_line).unwrap_or((head_line.as_str(), ""));
        let (name, type_text) = split_name_and_type(head);
        let annotation = type_text.map(|t| parse_annotation(&t, context.map(|c| c.scope())));
        attributes.push(DocstringAttribute {
            name,
            annotation,
            description: item_description(rest, &continuation),
        });
    }
    attributes
}

fn parse_listing(block: &[String]) -> Vec<DocstringNamedElement> {
    let mut elements = Vec::new();
    for (head_line, continuation) in split_items(block) {
        let (head, rest) = split_item_head(&head_line).unwrap_or((head_line.as_str(), ""));
        let head = head.trim();
        let (name, signature) = match head.find('(') {
            Some(open) if head.ends_with(')') => (
                head[..open].trim().to_string(),
                Some(head[open + 1..head.len() - 1].to_string()),
            ),
            _ => (head.to_string(), None),
        };
        elements.push(DocstringNamedElement {
            name,
            signature,
            description: item_description(rest, &continuation),
        });
    }
    elements
}

fn parse_deprecated(block: &[String]) -> SectionContent {
    let text = clean(&block.join("\n"));
    // A leading `1.2: message` marks the version the deprecation landed in.
    if let Some((head, rest)) = text.split_once(':') {
        let head = head.trim();
        if !head.is_empty()
            && !head.contains(' ')
            && head.chars().next().is_some_and(|c| c.is_ascii_digit())
        {
            return SectionContent::Deprecated {
                version: Some(head.to_string()),
                text: clean(rest),
            };
        }
    }
    SectionContent::Deprecated { version: None, text }
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
    use super::super::ExamplePart;
    use super::*;

    fn parse_plain(text: &str) -> Vec<DocstringSection> {
        parse(text, &DocstringOptions::default(), None)
    }

    #[test]
    fn summary_and_parameters() {
        let sections = parse_plain("Greet.\n\nParameters:\n    name: Who.\n    shout: Loudly?\n");
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].content, SectionContent::Text("Greet.".to_string()));
        let SectionContent::Parameters(params) = &sections[1].content else {
            panic!("expected a parameters section");
        };
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "name");
        assert_eq!(params[0].description, "Who.");
        assert_eq!(params[1].name, "shout");
    }

    #[test]
    fn typed_parameter_in_parentheses() {
        let sections = parse_plain("Args:\n    count (int): How many.\n");
        let SectionContent::Parameters(params) = &sections[0].content else {
            panic!("expected a parameters section");
        };
        assert_eq!(params[0].name, "count");
        assert_eq!(params[0].annotation.as_ref().unwrap().to_string(), "int");
    }

    #[test]
    fn continuation_lines_join_the_description() {
        let sections = parse_plain("Args:\n    x: First line.\n        Second line.\n");
        let SectionContent::Parameters(params) = &sections[0].content else {
            panic!("expected a parameters section");
        };
        assert_eq!(params[0].description, "First line.\nSecond line.");
    }

    #[test]
    fn returns_section_with_named_typed_item() {
        let sections = parse_plain("Returns:\n    count (int): The count.\n");
        let SectionContent::Returns(returns) = &sections[0].content else {
            panic!("expected a returns section");
        };
        assert_eq!(returns[0].name.as_deref(), Some("count"));
        assert_eq!(returns[0].annotation.as_ref().unwrap().to_string(), "int");
        assert_eq!(returns[0].description, "The count.");
    }

    #[test]
    fn returns_item_head_is_a_type_when_named_values_are_off() {
        let mut options = DocstringOptions::default();
        options.set("returns_named_value", "false");
        let sections = parse("Returns:\n    int: The count.\n", &options, None);
        let SectionContent::Returns(returns) = &sections[0].content else {
            panic!("expected a returns section");
        };
        assert_eq!(returns[0].name, None);
        assert_eq!(returns[0].annotation.as_ref().unwrap().to_string(), "int");
    }

    #[test]
    fn unknown_identifier_becomes_admonition() {
        let sections = parse_plain("Note:\n    Mind the gap.\n");
        let SectionContent::Admonition { kind, text } = &sections[0].content else {
            panic!("expected an admonition");
        };
        assert_eq!(kind, "note");
        assert_eq!(text, "Mind the gap.");
    }

    #[test]
    fn header_without_block_stays_text() {
        let sections = parse_plain("See also: the docs.\n");
        assert_eq!(sections.len(), 1);
        assert!(matches!(sections[0].content, SectionContent::Text(_)));
    }

    #[test]
    fn raises_section() {
        let sections = parse_plain("Raises:\n    ValueError: On bad input.\n");
        let SectionContent::Raises(raises) = &sections[0].content else {
            panic!("expected a raises section");
        };
        assert_eq!(raises[0].annotation.as_ref().unwrap().to_string(), "ValueError");
        assert_eq!(raises[0].description, "On bad input.");
    }

    #[test]
    fn examples_alternate_text_and_code() {
        let sections =
            parse_plain("Examples:\n    Basic use:\n\n    >>> f(1)  # doctest: +SKIP\n    2\n\n    Done.\n");
        let SectionContent::Examples(parts) = &sections[0].content else {
            panic!("expected an examples section");
        };
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], ExamplePart::Text("Basic use:".to_string()));
        assert_eq!(parts[1], ExamplePart::Code(">>> f(1)\n2".to_string()));
        assert_eq!(parts[2], ExamplePart::Text("Done.".to_string()));
    }

    #[test]
    fn deprecated_with_version() {
        let sections = parse_plain("Deprecated:\n    1.2: Use `new` instead.\n");
        let SectionContent::Deprecated { version, text } = &sections[0].content else {
            panic!("expected a deprecated section");
        };
        assert_eq!(version.as_deref(), Some("1.2"));
        assert_eq!(text, "Use `new` instead.");
    }

    #[test]
    fn section_title_is_kept() {
        let sections = parse_plain("Examples: Quick start\n    >>> 1\n");
        assert_eq!(sections[0].title.as_deref(), Some("Quick start"));
    }
}
