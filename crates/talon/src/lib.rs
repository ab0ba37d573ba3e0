//! talon extracts a structured, navigable model of a Python package's API
//! directly from source code, without importing it.
//!
//! The entry point is the [`Loader`]: give it search paths and a package
//! name and it finds the package on disk, parses every source file with the
//! ruff parser, builds an object tree (modules, classes, functions,
//! attributes, type aliases), merges `.pyi` stubs, expands `__all__` and
//! wildcard imports, and resolves import aliases to their targets.
//! Annotations, defaults, decorators and base classes are kept as
//! resolvable [`Expr`] graphs, and docstrings can be structured into typed
//! sections in the google, numpy and sphinx styles.

mod collections;
mod diff;
mod docstrings;
mod error;
mod expr;
mod extension;
mod finder;
mod loader;
mod merger;
mod objects;
mod resolver;
mod serialize;
mod visitor;

pub use crate::{
    collections::{LinesCollection, ModulesCollection},
    diff::{Breakage, BreakageKind, check},
    docstrings::{
        DocstringAttribute, DocstringContext, DocstringException, DocstringNamedElement, DocstringOptions,
        DocstringParameter, DocstringReturn, DocstringSection, DocstringStyle, ExamplePart, SectionContent,
        detect_style, detect_style_max_sections, parse as parse_docstring,
    },
    error::TalonError,
    expr::{Comprehension, Expr, ExprName, ExprParameter, GeneratorFlavor, parse_annotation},
    extension::{DataclassExtension, Extension, UnpackTypedDictExtension, builtin as builtin_extension},
    finder::{ACCEPTED_EXTENSIONS, FoundModule, ModuleFinder, NamespacePackage, Package, Submodule},
    loader::{LoadStats, Loader, LoaderConfig},
    objects::{
        AliasData, AttributeData, ClassData, Decorator, Docstring, Export, FunctionData, ModuleData,
        ModulePath, ObjectData, ObjectId, ObjectKind, ObjectNode, Parameter, ParameterKind, Parameters,
        TypeAliasData, TypeParameter, TypeParameterKind, WildcardImport,
    },
    resolver::{expand_exports, expand_wildcards, inherited_members, mro, resolve_alias},
    serialize::{expr_from_json, expr_to_json, module_from_json, to_json},
    visitor::PythonVersion,
};
