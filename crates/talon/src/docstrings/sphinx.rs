//! Parser for sphinx-style inline fields (`:param x:`, `:returns:`, ...).

use indexmap::IndexMap;

use crate::expr::parse_annotation;

use super::{
    DocstringAttribute, DocstringContext, DocstringException, DocstringOptions, DocstringParameter,
    DocstringReturn, DocstringSection, SectionContent, clean, emit_warning,
};

/// One `:directive argument: body` field.
#[derive(Debug)]
struct Field {
    directive: String,
    argument: Option<String>,
    body: String,
}

fn parse_field_start(line: &str) -> Option<(String, Option<String>, String)> {
    let trimmed = line.trim_start();
    let rest = trimmed.strip_prefix(':')?;
    let end = rest.find(':')?;
    let spec = &rest[..end];
    let body = rest[end + 1..].trim_start().to_string();
    let mut words = spec.split_whitespace();
    let directive = words.next()?.to_lowercase();
    let argument = {
        let remainder = words.collect::<Vec<_>>().join(" ");
        (!remainder.is_empty()).then_some(remainder)
    };
    Some((directive, argument, body))
}

/// Parses a sphinx-style docstring into sections.
///
/// Prose stays a single text section; fields are gathered and emitted as
/// parameters/returns/raises sections in order of first appearance. Types
/// given with `:type name:` and `:rtype:` are merged into the matching
/// parameter or return item.
pub(crate) fn parse(
    text: &str,
    options: &DocstringOptions,
    context: Option<DocstringContext<'_>>,
) -> Vec<DocstringSection> {
    let mut fields: Vec<Field> = Vec::new();
    let mut prose: Vec<String> = Vec::new();

    for line in text.lines() {
        if let Some((directive, argument, body)) = parse_field_start(line) {
            fields.push(Field {
                directive,
                argument,
                body,
            });
        } else if !line.trim().is_empty()
            && line.starts_with(' ')
            && let Some(last) = fields.last_mut()
        {
            // Indented continuation of the previous field body.
            if !last.body.is_empty() {
                last.body.push(' ');
            }
            last.body.push_str(line.trim());
        } else {
            prose.push(line.to_string());
        }
    }

    let scope = context.map(|c| c.scope());
    let mut parameters: IndexMap<String, DocstringParameter> = IndexMap::new();
    let mut param_types: IndexMap<String, String> = IndexMap::new();
    let mut attributes: IndexMap<String, DocstringAttribute> = IndexMap::new();
    let mut attribute_types: IndexMap<String, String> = IndexMap::new();
    let mut raises: Vec<DocstringException> = Vec::new();
    let mut returns: Option<DocstringReturn> = None;
    let mut rtype: Option<String> = None;
    let mut order: Vec<&'static str> = Vec::new();

    let mut record = |order: &mut Vec<&'static str>, kind: &'static str| {
        if !order.contains(&kind) {
            order.push(kind);
        }
    };

    for field in fields {
        match field.directive.as_str() {
            "param" | "parameter" | "arg" | "argument" | "key" | "keyword" => {
                let Some(argument) = field.argument else {
                    emit_warning(options, context, "field directive without a parameter name");
                    continue;
                };
                // `:param str name:` carries the type inline.
                let (name, inline_type) = match argument.rsplit_once(' ') {
                    Some((ty, name)) => (name.to_string(), Some(ty.to_string())),
                    None => (argument, None),
                };
                if let Some(ty) = inline_type {
                    param_types.insert(name.clone(), ty);
                }
                if options.warn_unknown_params {
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
                record(&mut order, "parameters");
                parameters.insert(
                    name.clone(),
                    DocstringParameter {
                        name,
                        annotation: None,
                        description: clean(&field.body),
                    },
                );
            }
            "type" => {
                if let Some(name) = field.argument {
                    param_types.insert(name, field.body);
                }
            }
            "returns" | "return" => {
                record(&mut order, "returns");
                returns = Some(DocstringReturn {
                    name: None,
                    annotation: None,
                    description: clean(&field.body),
                });
            }
            "rtype" => {
                rtype = Some(field.body);
            }
            "raises" | "raise" | "except" | "exception" => {
                record(&mut order, "raises");
                raises.push(DocstringException {
                    annotation: field.argument.map(|a| parse_annotation(&a, scope)),
                    description: clean(&field.body),
                });
            }
            "var" | "ivar" | "cvar" => {
                if let Some(name) = field.argument {
                    record(&mut order, "attributes");
                    attributes.insert(
                        name.clone(),
                        DocstringAttribute {
                            name,
                            annotation: None,
                            description: clean(&field.body),
                        },
                    );
                }
            }
            "vartype" => {
                if let Some(name) = field.argument {
                    attribute_types.insert(name, field.body);
                }
            }
            other => {
                emit_warning(options, context, &format!("unknown field directive ':{other}:'"));
            }
        }
    }

    // Merge `:type:` fields and signature annotations into the parameters.
    for (name, parameter) in &mut parameters {
        parameter.annotation = param_types
            .get(name)
            .map(|t| parse_annotation(t, scope))
            .or_else(|| context.and_then(|c| c.parameter_annotation(name)));
    }
    for (name, attribute) in &mut attributes {
        attribute.annotation = attribute_types.get(name).map(|t| parse_annotation(t, scope));
    }
    if let Some(item) = &mut returns {
        item.annotation = rtype
            .as_ref()
            .map(|t| parse_annotation(t, scope))
            .or_else(|| context.and_then(|c| c.return_annotation()));
    } else if let Some(rtype) = &rtype {
        record(&mut order, "returns");
        returns = Some(DocstringReturn {
            name: None,
            annotation: Some(parse_annotation(rtype, scope)),
            description: String::new(),
        });
    }

    let mut sections = Vec::new();
    let text = clean(&prose.join("\n"));
    if !text.is_empty() {
        sections.push(DocstringSection::text(text));
    }
    for kind in order {
        let content = match kind {
            "parameters" => SectionContent::Parameters(parameters.values().cloned().collect()),
            "returns" => match returns.clone() {
                Some(item) => SectionContent::Returns(vec![item]),
                None => continue,
            },
            "raises" => SectionContent::Raises(std::mem::take(&mut raises)),
            "attributes" => SectionContent::Attributes(attributes.values().cloned().collect()),
            _ => continue,
        };
        sections.push(DocstringSection { title: None, content });
    }
    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_plain(text: &str) -> Vec<DocstringSection> {
        parse(text, &DocstringOptions::default(), None)
    }

    #[test]
    fn params_with_separate_types() {
        let sections = parse_plain("Do it.\n\n:param x: A value.\n:type x: int\n:returns: Nothing.\n");
        assert_eq!(sections.len(), 3);
        let SectionContent::Parameters(params) = &sections[1].content else {
            panic!("expected a parameters section");
        };
        assert_eq!(params[0].name, "x");
        assert_eq!(params[0].annotation.as_ref().unwrap().to_string(), "int");
        let SectionContent::Returns(returns) = &sections[2].content else {
            panic!("expected a returns section");
        };
        assert_eq!(returns[0].description, "Nothing.");
    }

    #[test]
    fn inline_param_type() {
        let sections = parse_plain(":param int count: How many.\n");
        let SectionContent::Parameters(params) = &sections[0].content else {
            panic!("expected a parameters section");
        };
        assert_eq!(params[0].name, "count");
        assert_eq!(params[0].annotation.as_ref().unwrap().to_string(), "int");
    }

    #[test]
    fn raises_with_exception_type() {
        let sections = parse_plain(":raises ValueError: On bad input.\n");
        let SectionContent::Raises(raises) = &sections[0].content else {
            panic!("expected a raises section");
        };
        assert_eq!(raises[0].annotation.as_ref().unwrap().to_string(), "ValueError");
        assert_eq!(raises[0].description, "On bad input.");
    }

    #[test]
    fn continuation_lines_are_joined() {
        let sections = parse_plain(":param x: Start of text\n    and the rest.\n");
        let SectionContent::Parameters(params) = &sections[0].content else {
            panic!("expected a parameters section");
        };
        assert_eq!(params[0].description, "Start of text and the rest.");
    }

    #[test]
    fn rtype_alone_creates_a_returns_section() {
        let sections = parse_plain(":rtype: bool\n");
        let SectionContent::Returns(returns) = &sections[0].content else {
            panic!("expected a returns section");
        };
        assert_eq!(returns[0].annotation.as_ref().unwrap().to_string(), "bool");
    }
}
