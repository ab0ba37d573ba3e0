use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use talon::{
    Docstring, DocstringContext, DocstringOptions, DocstringStyle, Loader, LoaderConfig, SectionContent,
    detect_style, detect_style_max_sections, parse_docstring,
};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn parse_with_function(source: &str, style: DocstringStyle) -> Vec<talon::DocstringSection> {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "pkg/__init__.py", source);
    let mut loader = Loader::new(LoaderConfig {
        search_paths: vec![tmp.path().to_path_buf()],
        ..LoaderConfig::default()
    });
    loader.load("pkg").unwrap();
    let modules = &loader.modules;
    let f = modules.lookup("pkg.f").unwrap();
    let docstring = modules.get(f).docstring.clone().unwrap();
    parse_docstring(
        &docstring,
        style,
        &DocstringOptions::default(),
        Some(DocstringContext { modules, owner: f }),
    )
}

#[test]
fn google_types_fall_back_to_the_signature() {
    let sections = parse_with_function(
        "def f(count: int, label: str = \"x\") -> bool:\n    \"\"\"Count things.\n\n    Args:\n        count: How many.\n        label (str): What to call them.\n    \"\"\"\n",
        DocstringStyle::Google,
    );
    let SectionContent::Parameters(params) = &sections[1].content else {
        panic!("expected a parameters section");
    };
    assert_eq!(params[0].annotation.as_ref().unwrap().to_string(), "int");
    assert_eq!(params[1].annotation.as_ref().unwrap().to_string(), "str");
}

#[test]
fn numpy_style_end_to_end() {
    let sections = parse_with_function(
        "def f(x: int) -> int:\n    \"\"\"Do.\n\n    Parameters\n    ----------\n    x : int\n        A value.\n\n    Returns\n    -------\n    int\n        Twice x.\n    \"\"\"\n",
        DocstringStyle::Numpy,
    );
    assert_eq!(sections.len(), 3);
    assert!(matches!(sections[1].content, SectionContent::Parameters(_)));
    let SectionContent::Returns(returns) = &sections[2].content else {
        panic!("expected a returns section");
    };
    assert_eq!(returns[0].annotation.as_ref().unwrap().to_string(), "int");
    assert_eq!(returns[0].description, "Twice x.");
}

#[test]
fn sphinx_style_merges_types_into_params() {
    let sections = parse_with_function(
        "def f(x):\n    \"\"\"Do.\n\n    :param x: A value.\n    :type x: list[int]\n    :returns: Nothing.\n    :rtype: None\n    \"\"\"\n",
        DocstringStyle::Sphinx,
    );
    let SectionContent::Parameters(params) = &sections[1].content else {
        panic!("expected a parameters section");
    };
    assert_eq!(params[0].annotation.as_ref().unwrap().to_string(), "list[int]");
    let SectionContent::Returns(returns) = &sections[2].content else {
        panic!("expected a returns section");
    };
    assert_eq!(returns[0].annotation.as_ref().unwrap().to_string(), "None");
}

#[test]
fn auto_style_detection_routes_to_the_right_parser() {
    assert_eq!(
        detect_style("Args:\n    x: A value.\n"),
        DocstringStyle::Google
    );
    assert_eq!(
        detect_style("Parameters\n----------\nx : int\n"),
        DocstringStyle::Numpy
    );
    assert_eq!(detect_style(":param x: A value.\n"), DocstringStyle::Sphinx);
}

#[test]
fn max_sections_detection_prefers_the_richer_parse() {
    let docstring = Docstring::new(
        "Summary.\n\nParameters\n----------\nx : int\n    A value.\n\nReturns\n-------\nint\n    Result.\n",
        None,
        None,
    );
    let style = detect_style_max_sections(
        &docstring,
        &DocstringOptions::default(),
        &[DocstringStyle::Google, DocstringStyle::Numpy, DocstringStyle::Sphinx],
    );
    assert_eq!(style, DocstringStyle::Numpy);
}

#[test]
fn unknown_sections_become_admonitions_not_errors() {
    let docstring = Docstring::new("Warning:\n    Here be dragons.\n", None, None);
    let sections = parse_docstring(&docstring, DocstringStyle::Google, &DocstringOptions::default(), None);
    let SectionContent::Admonition { kind, text } = &sections[0].content else {
        panic!("expected an admonition");
    };
    assert_eq!(kind, "warning");
    assert_eq!(text, "Here be dragons.");
}

#[test]
fn property_summary_type_becomes_a_returns_section() {
    let tmp = tempfile::tempdir().unwrap();
    write(
        tmp.path(),
        "pkg/__init__.py",
        "class Box:\n    @property\n    def size(self):\n        \"\"\"int: The number of items.\"\"\"\n",
    );
    let mut loader = Loader::new(LoaderConfig {
        search_paths: vec![tmp.path().to_path_buf()],
        ..LoaderConfig::default()
    });
    loader.load("pkg").unwrap();
    let modules = &loader.modules;
    let size = modules.lookup("pkg.Box.size").unwrap();
    let docstring = modules.get(size).docstring.clone().unwrap();

    let mut options = DocstringOptions::default();
    options.set("returns_type_in_property_summary", "true");
    let sections = parse_docstring(
        &docstring,
        DocstringStyle::Google,
        &options,
        Some(DocstringContext { modules, owner: size }),
    );
    assert_eq!(sections.len(), 2);
    let SectionContent::Text(text) = &sections[0].content else {
        panic!("expected the summary text");
    };
    assert_eq!(text, "The number of items.");
    let SectionContent::Returns(returns) = &sections[1].content else {
        panic!("expected a returns section");
    };
    assert_eq!(returns[0].annotation.as_ref().unwrap().to_string(), "int");
}

#[test]
fn parameter_docstrings_survive_option_toggles() {
    let docstring = Docstring::new(
        "Do.\n\nArgs:\n    x: A value.\n\nExamples:\n    >>> f(1)  # doctest: +SKIP\n    1\n",
        None,
        None,
    );
    let mut options = DocstringOptions::default();
    options.set("trim_doctest_flags", "false");
    let sections = parse_docstring(&docstring, DocstringStyle::Google, &options, None);
    let SectionContent::Examples(parts) = &sections[2].content else {
        panic!("expected an examples section");
    };
    let talon::ExamplePart::Code(code) = &parts[0] else {
        panic!("expected a code part");
    };
    assert!(code.contains("# doctest: +SKIP"));
}
