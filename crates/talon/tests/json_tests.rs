use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use talon::{
    DocstringOptions, DocstringStyle, Loader, LoaderConfig, ModulesCollection, module_from_json, to_json,
};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn load_fixture() -> (Loader, talon::ObjectId) {
    let tmp = tempfile::tempdir().unwrap();
    write(
        tmp.path(),
        "pkg/__init__.py",
        r#""""A small package."""

from pkg.impl import helper as exported

__all__ = ["Point", "exported"]


class Point:
    """A 2D point."""

    x: int
    y: int = 0

    def move(self, dx: int, dy: int = 0) -> "Point":
        """Shift the point."""
        self.history = []
        return self
"#,
    );
    write(tmp.path(), "pkg/impl.py", "def helper(items: list[int]) -> int: ...\n");
    let mut loader = Loader::new(LoaderConfig {
        search_paths: vec![tmp.path().to_path_buf()],
        resolve_implicit: true,
        ..LoaderConfig::default()
    });
    let root = loader.load("pkg").unwrap();
    loader.resolve_aliases();
    (loader, root)
}

#[test]
fn serialized_tree_round_trips() {
    let (loader, root) = load_fixture();
    let style = DocstringStyle::Auto;
    let options = DocstringOptions::default();

    let first = to_json(&loader.modules, root, false, style, &options);

    let mut rebuilt = ModulesCollection::new();
    let new_root = module_from_json(&mut rebuilt, &first).unwrap();
    rebuilt.insert_root(new_root);
    let second = to_json(&rebuilt, new_root, false, style, &options);

    assert_eq!(first, second);
}

#[test]
fn required_keys_are_present() {
    let (loader, root) = load_fixture();
    let value = to_json(
        &loader.modules,
        root,
        false,
        DocstringStyle::Auto,
        &DocstringOptions::default(),
    );

    assert_eq!(value["kind"], "module");
    assert_eq!(value["name"], "pkg");
    assert_eq!(value["path"], "pkg");
    let members = value["members"].as_object().unwrap();

    let alias = &members["exported"];
    assert_eq!(alias["kind"], "alias");
    assert_eq!(alias["target_path"], "pkg.impl.helper");
    assert_eq!(alias["inherited"], false);

    let class = &members["Point"];
    assert_eq!(class["kind"], "class");
    let class_members = class["members"].as_object().unwrap();
    let method = &class_members["move"];
    assert_eq!(method["kind"], "function");
    let params = method["parameters"].as_array().unwrap();
    assert_eq!(params[0]["name"], "self");
    assert_eq!(params[1]["kind"], "positional-or-keyword");
    assert_eq!(params[2]["default"]["cls"], "ExprConstant");
    // A quoted return annotation was re-parsed into a name expression.
    assert_eq!(method["returns"]["cls"], "ExprName");
}

#[test]
fn full_output_contains_parsed_docstring_sections() {
    let (loader, root) = load_fixture();
    let value = to_json(
        &loader.modules,
        root,
        true,
        DocstringStyle::Auto,
        &DocstringOptions::default(),
    );
    let parsed = value["docstring"]["parsed"].as_array().unwrap();
    assert_eq!(parsed[0]["kind"], "text");
    assert_eq!(parsed[0]["value"], "A small package.");
}

#[test]
fn overloaded_functions_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    write(
        tmp.path(),
        "pkg/__init__.py",
        "from typing import overload\n\n@overload\ndef f(x: int) -> int: ...\n@overload\ndef f(x: str) -> str: ...\ndef f(x):\n    return x\n",
    );
    let mut loader = Loader::new(LoaderConfig {
        search_paths: vec![tmp.path().to_path_buf()],
        ..LoaderConfig::default()
    });
    let root = loader.load("pkg").unwrap();

    let style = DocstringStyle::Auto;
    let options = DocstringOptions::default();
    let first = to_json(&loader.modules, root, false, style, &options);

    let mut rebuilt = ModulesCollection::new();
    let new_root = module_from_json(&mut rebuilt, &first).unwrap();
    rebuilt.insert_root(new_root);
    let second = to_json(&rebuilt, new_root, false, style, &options);
    assert_eq!(first, second);

    let f = rebuilt.lookup("pkg.f").unwrap();
    let data = rebuilt.get(f).as_function().unwrap();
    assert_eq!(data.overloads.len(), 2);
}

#[test]
fn member_order_is_preserved_in_json() {
    let (loader, root) = load_fixture();
    let value = to_json(
        &loader.modules,
        root,
        false,
        DocstringStyle::Auto,
        &DocstringOptions::default(),
    );
    let keys: Vec<&String> = value["members"].as_object().unwrap().keys().collect();
    let expected: Vec<&String> = loader.modules.get(root).members.keys().collect();
    assert_eq!(keys, expected);
}
