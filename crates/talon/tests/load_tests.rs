use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use talon::{
    DocstringContext, Loader, LoaderConfig, ObjectKind, ParameterKind, PythonVersion, SectionContent,
    parse_docstring,
};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn loader_for(root: &Path) -> Loader {
    Loader::new(LoaderConfig {
        search_paths: vec![root.to_path_buf()],
        resolve_implicit: true,
        ..LoaderConfig::default()
    })
}

#[test]
fn simple_function_with_docstring() {
    let tmp = tempfile::tempdir().unwrap();
    write(
        tmp.path(),
        "pkg/__init__.py",
        r#"def greet(name: str, shout: bool = False) -> str:
    """Greet.

    Parameters:
        name: Who.
        shout: Loudly?

    Returns:
        Greeting.
    """
"#,
    );

    let mut loader = loader_for(tmp.path());
    let root = loader.load("pkg").unwrap();
    let modules = &loader.modules;

    let greet = modules.lookup("pkg.greet").unwrap();
    let node = modules.get(greet);
    assert_eq!(node.kind(), ObjectKind::Function);
    let data = node.as_function().unwrap();
    assert_eq!(data.parameters.len(), 2);
    let name = data.parameters.get("name").unwrap();
    assert_eq!(name.kind, ParameterKind::PositionalOrKeyword);
    assert_eq!(name.annotation.as_ref().unwrap().to_string(), "str");
    let shout = data.parameters.get("shout").unwrap();
    assert_eq!(shout.annotation.as_ref().unwrap().to_string(), "bool");
    assert_eq!(shout.default.as_ref().unwrap().to_string(), "False");
    assert_eq!(data.returns.as_ref().unwrap().to_string(), "str");

    let docstring = node.docstring.clone().unwrap();
    let sections = parse_docstring(
        &docstring,
        loader.config().docstring_style,
        &loader.config().docstring_options,
        Some(DocstringContext { modules, owner: greet }),
    );
    assert_eq!(sections.len(), 3);
    assert_eq!(sections[0].content, SectionContent::Text("Greet.".to_string()));
    let SectionContent::Parameters(params) = &sections[1].content else {
        panic!("expected a parameters section");
    };
    assert_eq!(params[0].name, "name");
    assert_eq!(params[0].annotation.as_ref().unwrap().to_string(), "str");
    assert_eq!(params[0].description, "Who.");
    assert_eq!(params[1].name, "shout");
    assert_eq!(params[1].annotation.as_ref().unwrap().to_string(), "bool");
    assert_eq!(params[1].description, "Loudly?");
    let SectionContent::Returns(returns) = &sections[2].content else {
        panic!("expected a returns section");
    };
    assert_eq!(returns[0].annotation.as_ref().unwrap().to_string(), "str");
    assert_eq!(returns[0].description, "Greeting.");

    // Reciprocal membership invariant.
    assert_eq!(modules.get(root).members["greet"], greet);
    assert_eq!(modules.get(greet).parent, Some(root));
}

#[test]
fn alias_through_reexport() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "pkg/_impl.py", "def f(): ...\n");
    write(tmp.path(), "pkg/__init__.py", "from pkg._impl import f as g\n");

    let mut loader = loader_for(tmp.path());
    loader.load("pkg").unwrap();
    loader.resolve_aliases();
    let modules = &loader.modules;

    let alias = modules.lookup("pkg").and_then(|root| {
        modules
            .get(root)
            .members
            .get("g")
            .copied()
            .ok_or(talon::TalonError::ModuleNotFound { name: "g".into() })
    });
    let alias = alias.unwrap();
    let data = modules.get(alias).as_alias().unwrap();
    assert_eq!(data.target_path, "pkg._impl.f");
    let target = data.target.expect("alias should be resolved");
    assert_eq!(modules.get(target).kind(), ObjectKind::Function);
    assert_eq!(modules.canonical_path(alias), "pkg._impl.f");
    assert_eq!(modules.path(alias), "pkg.g");
}

#[test]
fn wildcard_expansion_with_all() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "pkg/a.py", "__all__ = [\"x\"]\nx = 1\ny = 2\n");
    write(tmp.path(), "pkg/__init__.py", "from pkg.a import *\n");

    let mut loader = loader_for(tmp.path());
    let root = loader.load("pkg").unwrap();
    let modules = &loader.modules;

    let members = &modules.get(root).members;
    assert!(members.contains_key("x"), "wildcard should introduce x");
    assert!(!members.contains_key("y"), "y is not exported by pkg.a");
    let alias = modules.get(members["x"]).as_alias().unwrap();
    assert_eq!(alias.target_path, "pkg.a.x");
}

#[test]
fn stub_merging() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "pkg/__init__.py", "");
    write(tmp.path(), "pkg/m.py", "def f(a, b):\n    return a + b\n");
    write(tmp.path(), "pkg/m.pyi", "def f(a: int, b: int) -> int: ...\n");

    let mut loader = loader_for(tmp.path());
    loader.load("pkg").unwrap();
    let modules = &loader.modules;

    let f = modules.lookup("pkg.m.f").unwrap();
    let data = modules.get(f).as_function().unwrap();
    assert_eq!(
        data.parameters.get("a").unwrap().annotation.as_ref().unwrap().to_string(),
        "int"
    );
    assert_eq!(
        data.parameters.get("b").unwrap().annotation.as_ref().unwrap().to_string(),
        "int"
    );
    assert_eq!(data.returns.as_ref().unwrap().to_string(), "int");
    assert!(modules.get(f).docstring.is_none());
}

#[test]
fn cyclic_aliases_are_marked_without_looping() {
    let tmp = tempfile::tempdir().unwrap();
    write(
        tmp.path(),
        "pkg/__init__.py",
        "from pkg import x as y\nfrom pkg import y as x\n",
    );

    let mut loader = loader_for(tmp.path());
    let root = loader.load("pkg").unwrap();
    loader.resolve_aliases();
    let modules = &loader.modules;

    for name in ["x", "y"] {
        let alias = modules.get(root).members[name];
        let data = modules.get(alias).as_alias().unwrap();
        assert!(data.target.is_none(), "{name} must stay unresolved");
        let error = data.error.as_ref().expect("cycle should be recorded");
        assert!(error.contains("cyclic"), "unexpected error: {error}");
    }
}

#[test]
fn empty_module() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "pkg/__init__.py", "");

    let mut loader = loader_for(tmp.path());
    let root = loader.load("pkg").unwrap();
    let node = loader.modules.get(root);
    assert!(node.members.is_empty());
    assert!(node.docstring.is_none());
}

#[test]
fn module_with_only_a_docstring() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "pkg/__init__.py", "\"\"\"Package docs.\"\"\"\n");

    let mut loader = loader_for(tmp.path());
    let root = loader.load("pkg").unwrap();
    let node = loader.modules.get(root);
    assert_eq!(node.docstring.as_ref().unwrap().value, "Package docs.");
    assert!(node.members.is_empty());
}

#[test]
fn submodule_shadows_same_named_attribute() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "pkg/__init__.py", "sub = 1\n");
    write(tmp.path(), "pkg/sub.py", "value = 2\n");

    let mut loader = loader_for(tmp.path());
    let root = loader.load("pkg").unwrap();
    let modules = &loader.modules;

    let sub = modules.get(root).members["sub"];
    assert_eq!(modules.get(sub).kind(), ObjectKind::Module);
    assert!(modules.lookup("pkg.sub.value").is_ok());
}

#[test]
fn type_checking_guard_marks_objects_as_non_runtime() {
    let tmp = tempfile::tempdir().unwrap();
    write(
        tmp.path(),
        "pkg/__init__.py",
        "from typing import TYPE_CHECKING\n\nif TYPE_CHECKING:\n    from pkg.sub import Thing\n\nx = 1\n",
    );
    write(tmp.path(), "pkg/sub.py", "class Thing: ...\n");

    let mut loader = loader_for(tmp.path());
    let root = loader.load("pkg").unwrap();
    let modules = &loader.modules;

    let thing = modules.get(root).members["Thing"];
    assert!(!modules.get(thing).runtime);
    let x = modules.get(root).members["x"];
    assert!(modules.get(x).runtime);
}

#[test]
fn version_guards_pick_the_matching_branch() {
    let tmp = tempfile::tempdir().unwrap();
    write(
        tmp.path(),
        "pkg/__init__.py",
        "import sys\n\nif sys.version_info >= (3, 10):\n    A = 1\nelse:\n    A = 2\n\nif sys.version_info < (3, 0):\n    B = 1\nelse:\n    B = 2\n",
    );

    let mut loader = Loader::new(LoaderConfig {
        search_paths: vec![tmp.path().to_path_buf()],
        python_version: PythonVersion { major: 3, minor: 12 },
        ..LoaderConfig::default()
    });
    let root = loader.load("pkg").unwrap();
    let modules = &loader.modules;

    let a = modules.get(modules.get(root).members["A"]).as_attribute().unwrap();
    assert_eq!(a.value.as_ref().unwrap().to_string(), "1");
    let b = modules.get(modules.get(root).members["B"]).as_attribute().unwrap();
    assert_eq!(b.value.as_ref().unwrap().to_string(), "2");
}

#[test]
fn instance_attributes_from_methods() {
    let tmp = tempfile::tempdir().unwrap();
    write(
        tmp.path(),
        "pkg/__init__.py",
        "class Point:\n    def __init__(self, x: int):\n        self.x = x\n        self.label: str = \"origin\"\n",
    );

    let mut loader = loader_for(tmp.path());
    loader.load("pkg").unwrap();
    let modules = &loader.modules;

    let x = modules.lookup("pkg.Point.x").unwrap();
    assert!(modules.get(x).labels.contains("instance-attribute"));
    let label = modules.lookup("pkg.Point.label").unwrap();
    let data = modules.get(label).as_attribute().unwrap();
    assert_eq!(data.annotation.as_ref().unwrap().to_string(), "str");
}

#[test]
fn conditional_import_keeps_the_first_branch() {
    let tmp = tempfile::tempdir().unwrap();
    write(
        tmp.path(),
        "pkg/__init__.py",
        "try:\n    import fastjson as json\nexcept ImportError:\n    import json\n",
    );

    let mut loader = loader_for(tmp.path());
    let root = loader.load("pkg").unwrap();
    let modules = &loader.modules;

    let json = modules.get(root).members["json"];
    assert_eq!(modules.get(json).as_alias().unwrap().target_path, "fastjson");
}

#[test]
fn namespace_package_loads_from_directory() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "ns/mod.py", "x = 1\n");

    let mut loader = loader_for(tmp.path());
    let root = loader.load("ns").unwrap();
    let modules = &loader.modules;

    assert!(modules.get(root).as_module().unwrap().filepath.is_some());
    assert!(modules.lookup("ns.mod.x").is_ok());
}

#[test]
fn parse_error_in_submodule_is_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "pkg/__init__.py", "ok = 1\n");
    write(tmp.path(), "pkg/broken.py", "def broken(:\n");

    let mut loader = loader_for(tmp.path());
    let root = loader.load("pkg").unwrap();
    let modules = &loader.modules;

    assert!(modules.get(root).members.contains_key("ok"));
    // The broken module is bound but empty; loading continued.
    assert!(modules.lookup("pkg.ok").is_ok());
}

#[test]
fn overloads_accumulate_on_the_implementation() {
    let tmp = tempfile::tempdir().unwrap();
    write(
        tmp.path(),
        "pkg/__init__.py",
        "from typing import overload\n\n@overload\ndef f(x: int) -> int: ...\n@overload\ndef f(x: str) -> str: ...\ndef f(x):\n    return x\n",
    );

    let mut loader = loader_for(tmp.path());
    loader.load("pkg").unwrap();
    let modules = &loader.modules;

    let f = modules.lookup("pkg.f").unwrap();
    let data = modules.get(f).as_function().unwrap();
    assert_eq!(data.overloads.len(), 2);
    let first = modules.get(data.overloads[0]).as_function().unwrap();
    assert_eq!(first.returns.as_ref().unwrap().to_string(), "int");
    assert!(modules.get(data.overloads[0]).labels.contains("typing-overload"));
}

#[test]
fn source_is_rendered_from_the_lines_collection() {
    let tmp = tempfile::tempdir().unwrap();
    write(
        tmp.path(),
        "pkg/__init__.py",
        "x = 1\n\n\ndef f(a):\n    return a\n",
    );

    let mut loader = loader_for(tmp.path());
    loader.load("pkg").unwrap();
    let f = loader.modules.lookup("pkg.f").unwrap();
    assert_eq!(loader.source_of(f).as_deref(), Some("def f(a):\n    return a"));
}

#[test]
fn dataclass_extension_synthesizes_init() {
    let tmp = tempfile::tempdir().unwrap();
    write(
        tmp.path(),
        "pkg/__init__.py",
        "from dataclasses import dataclass\n\n@dataclass\nclass Point:\n    x: int\n    y: int = 0\n",
    );

    let mut loader = loader_for(tmp.path());
    loader.add_extension(talon::builtin_extension("dataclasses").unwrap());
    loader.load("pkg").unwrap();
    let modules = &loader.modules;

    let init = modules.lookup("pkg.Point.__init__").unwrap();
    let data = modules.get(init).as_function().unwrap();
    let names: Vec<&str> = data.parameters.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["self", "x", "y"]);
}
