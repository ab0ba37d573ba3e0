use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::collections::{LinesCollection, ModulesCollection};
use crate::docstrings::{DocstringOptions, DocstringStyle};
use crate::error::TalonError;
use crate::extension::Extension;
use crate::finder::{FoundModule, ModuleFinder, Package, Submodule};
use crate::merger::merge_stubs;
use crate::objects::{ModulePath, ObjectData, ObjectId, ObjectNode};
use crate::resolver;
use crate::visitor::{PythonVersion, visit_module};

/// Loader configuration; every field has a CLI counterpart.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub search_paths: Vec<PathBuf>,
    pub find_stubs_packages: bool,
    /// Whether dynamic inspection may be used as a fallback. Inspection is
    /// not implemented; when it would be needed the static error is
    /// reported instead.
    pub allow_inspection: bool,
    pub force_inspection: bool,
    pub docstring_style: DocstringStyle,
    pub docstring_options: DocstringOptions,
    /// Resolve aliases even when they are not listed in `__all__`.
    pub resolve_implicit: bool,
    /// Load not-yet-loaded packages while resolving aliases. `None` applies
    /// the default rule: only stubs packages are loaded implicitly.
    pub resolve_external: Option<bool>,
    pub python_version: PythonVersion,
    pub store_source: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            find_stubs_packages: false,
            allow_inspection: true,
            force_inspection: false,
            docstring_style: DocstringStyle::Auto,
            docstring_options: DocstringOptions::default(),
            resolve_implicit: false,
            resolve_external: None,
            python_version: PythonVersion::default(),
            store_source: true,
        }
    }
}

/// Counters and timings accumulated while loading.
#[derive(Debug, Default, Clone)]
pub struct LoadStats {
    pub modules_loaded: usize,
    pub aliases_resolved: usize,
    pub aliases_failed: usize,
    pub time_loading: Duration,
    pub time_resolving: Duration,
}

/// Loads packages from source into an object tree.
///
/// The loader owns the modules and lines collections for its session; a
/// caller needing isolated graphs instantiates several loaders. Loading is
/// synchronous: find the package, visit every source file depth-first,
/// merge stubs, expand exports and wildcards, then (on demand) resolve
/// aliases.
pub struct Loader {
    config: LoaderConfig,
    finder: ModuleFinder,
    pub modules: ModulesCollection,
    pub lines: LinesCollection,
    extensions: Vec<Box<dyn Extension>>,
    merged_stubs: HashSet<String>,
    attempted_external: HashSet<String>,
    stats: LoadStats,
}

impl Loader {
    pub fn new(config: LoaderConfig) -> Self {
        let finder = ModuleFinder::new(config.search_paths.clone(), config.find_stubs_packages);
        Self {
            config,
            finder,
            modules: ModulesCollection::new(),
            lines: LinesCollection::new(),
            extensions: Vec::new(),
            merged_stubs: HashSet::new(),
            attempted_external: HashSet::new(),
            stats: LoadStats::default(),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn stats(&self) -> &LoadStats {
        &self.stats
    }

    /// Registers an extension; extensions run by priority, then in
    /// registration order.
    pub fn add_extension(&mut self, extension: Box<dyn Extension>) {
        self.extensions.push(extension);
        self.extensions.sort_by_key(|e| std::cmp::Reverse(e.priority()));
    }

    /// Loads a package (or a dotted object path within one) and returns the
    /// object's id.
    pub fn load(&mut self, name: &str) -> Result<ObjectId, TalonError> {
        if self.config.force_inspection {
            warn!("dynamic inspection was requested but is not supported; analyzing statically");
        }
        let is_path = name.contains(std::path::MAIN_SEPARATOR);
        let top = if is_path {
            name.to_string()
        } else {
            name.split('.').next().unwrap_or(name).to_string()
        };

        let root = if is_path {
            self.load_root(&top)?
        } else {
            match self.modules.root(&top) {
                Some(existing) => existing,
                None => self.load_root(&top)?,
            }
        };
        if !is_path && name.contains('.') {
            return self.modules.lookup(name);
        }
        Ok(root)
    }

    fn load_root(&mut self, name: &str) -> Result<ObjectId, TalonError> {
        let start = Instant::now();
        let found = self.finder.find(name)?;
        let root = match &found {
            FoundModule::Package(package) => self.load_package_root(package).inspect_err(|err| {
                if self.config.allow_inspection {
                    debug!("static analysis of {name} failed and dynamic inspection is unavailable: {err}");
                }
            })?,
            FoundModule::Namespace(namespace) => {
                debug!("loading namespace package {name}");
                self.modules.alloc(ObjectNode::module(
                    &namespace.name,
                    Some(ModulePath::Namespace(namespace.paths.clone())),
                ))
            }
        };
        self.modules.insert_root(root);

        for submodule in self.finder.iter_submodules(&found) {
            self.load_submodule(root, &submodule);
        }
        self.stats.time_loading += start.elapsed();

        self.expand_package(root);
        for extension in &self.extensions {
            extension.on_package_loaded(&mut self.modules, root);
        }
        Ok(root)
    }

    fn load_package_root(&mut self, package: &Package) -> Result<ObjectId, TalonError> {
        let id = self.modules.alloc(ObjectNode::module(
            &package.name,
            Some(ModulePath::File(package.path.clone())),
        ));
        let code = fs::read_to_string(&package.path).map_err(|err| TalonError::Load {
            path: package.path.clone(),
            reason: err.to_string(),
        })?;
        visit_module(
            id,
            &code,
            &package.path,
            &mut self.modules,
            &mut self.lines,
            self.config.python_version,
        )?;
        self.stats.modules_loaded += 1;
        if let Some(stubs) = package.stubs.clone() {
            self.merge_module_stubs(id, &stubs);
        }
        self.run_module_hooks(id);
        Ok(id)
    }

    fn load_submodule(&mut self, root: ObjectId, submodule: &Submodule) {
        let Some((leaf, ancestors)) = submodule.parts.split_last() else {
            return;
        };
        // Ensure the parent chain exists; missing parents are namespace
        // packages (directories without an init file).
        let mut parent = root;
        for (depth, part) in ancestors.iter().enumerate() {
            parent = match self.modules.get(parent).members.get(part).copied() {
                Some(existing) if self.modules.get(existing).is_module() => existing,
                _ => {
                    let levels_up = submodule.parts.len() - depth
                        - usize::from(!is_init_file(&submodule.path));
                    let dir = submodule
                        .path
                        .ancestors()
                        .nth(levels_up)
                        .map(|p| p.to_path_buf())
                        .unwrap_or_default();
                    let namespace = self
                        .modules
                        .alloc(ObjectNode::module(part, Some(ModulePath::Namespace(vec![dir]))));
                    self.modules.set_member(parent, namespace);
                    namespace
                }
            };
        }

        let mut replaced_module = None;
        if let Some(existing) = self.modules.get(parent).members.get(leaf).copied() {
            let existing_node = self.modules.get(existing);
            if existing_node.is_module() {
                warn!(
                    "module {} is being reassigned from {}; merging the definitions",
                    self.modules.path(existing),
                    submodule.path.display()
                );
                replaced_module = Some(existing);
            } else {
                // The submodule shadows a same-named attribute from the
                // parent's init file.
                warn!(
                    "submodule {} shadows the member of the same name in {}",
                    submodule.parts.join("."),
                    self.modules.path(parent)
                );
            }
        }

        let code = match fs::read_to_string(&submodule.path) {
            Ok(code) => code,
            Err(err) => {
                warn!("could not read {}: {err}", submodule.path.display());
                return;
            }
        };
        let id = self.modules.alloc(ObjectNode::module(
            leaf,
            Some(ModulePath::File(submodule.path.clone())),
        ));
        self.modules.set_member(parent, id);
        if let Err(err) = visit_module(
            id,
            &code,
            &submodule.path,
            &mut self.modules,
            &mut self.lines,
            self.config.python_version,
        ) {
            warn!("{err}");
            return;
        }
        self.stats.modules_loaded += 1;
        // A module assigned over an existing one keeps the earlier members
        // it does not redefine.
        if let Some(existing) = replaced_module {
            merge_stubs(&mut self.modules, id, existing);
        }

        // A sibling stub file refines this module's types.
        if submodule.path.extension().and_then(|e| e.to_str()) == Some("py") {
            let stub_path = submodule.path.with_extension("pyi");
            if stub_path.is_file() {
                self.merge_module_stubs(id, &stub_path);
            }
        }
        self.run_module_hooks(id);
    }

    /// Visits a stub file into a detached module tree and merges it into the
    /// concrete module. Merging runs at most once per module.
    fn merge_module_stubs(&mut self, concrete: ObjectId, stub_path: &std::path::Path) {
        let key = self.modules.path(concrete);
        if !self.merged_stubs.insert(key.clone()) {
            warn!("stubs for {key} were already merged; skipping {}", stub_path.display());
            return;
        }
        let code = match fs::read_to_string(stub_path) {
            Ok(code) => code,
            Err(err) => {
                warn!("could not read {}: {err}", stub_path.display());
                return;
            }
        };
        let name = self.modules.get(concrete).name.clone();
        let stub = self
            .modules
            .alloc(ObjectNode::module(name, Some(ModulePath::File(stub_path.to_path_buf()))));
        if let Err(err) = visit_module(
            stub,
            &code,
            stub_path,
            &mut self.modules,
            &mut self.lines,
            self.config.python_version,
        ) {
            warn!("{err}");
            return;
        }
        merge_stubs(&mut self.modules, concrete, stub);
    }

    /// Runs per-object extension hooks over one freshly visited module,
    /// without descending into child modules (they get their own pass).
    fn run_module_hooks(&mut self, module: ObjectId) {
        if self.extensions.is_empty() {
            return;
        }
        let mut stack: Vec<ObjectId> = self
            .modules
            .get(module)
            .members
            .values()
            .copied()
            .filter(|&id| !self.modules.get(id).is_module())
            .collect();
        // Post-order so class hooks run after member hooks.
        let mut ordered = Vec::new();
        while let Some(id) = stack.pop() {
            ordered.push(id);
            stack.extend(
                self.modules
                    .get(id)
                    .members
                    .values()
                    .copied()
                    .filter(|&child| !self.modules.get(child).is_module()),
            );
        }
        ordered.reverse();
        for id in ordered {
            let kind = self.modules.get(id).kind();
            for extension in &self.extensions {
                extension.on_instance(&mut self.modules, id);
                match kind {
                    crate::objects::ObjectKind::Class => extension.on_class_members(&mut self.modules, id),
                    crate::objects::ObjectKind::Function => {
                        extension.on_function_members(&mut self.modules, id);
                    }
                    crate::objects::ObjectKind::Attribute => {
                        extension.on_attribute_instance(&mut self.modules, id);
                    }
                    crate::objects::ObjectKind::TypeAlias => {
                        extension.on_type_alias_instance(&mut self.modules, id);
                    }
                    _ => {}
                }
            }
        }
        for extension in &self.extensions {
            extension.on_module_loaded(&mut self.modules, module);
        }
    }

    /// Expands exports and wildcard imports for every module of a package.
    fn expand_package(&mut self, root: ObjectId) {
        let mut module_ids = Vec::new();
        collect_modules(&self.modules, root, &mut module_ids);
        for &module in &module_ids {
            resolver::expand_exports(&mut self.modules, module);
        }
        for &module in &module_ids {
            resolver::expand_wildcards(&mut self.modules, module);
        }
    }

    /// Resolves aliases across every loaded package, in deterministic
    /// depth-first order. Failures on external targets trigger a load of the
    /// external package when the configuration permits; remaining failures
    /// are recorded on the alias and logged once. Resolution is idempotent.
    pub fn resolve_aliases(&mut self) {
        let start = Instant::now();
        for _round in 0..4 {
            let roots: Vec<ObjectId> = self.modules.roots().map(|(_, id)| id).collect();
            let mut aliases = Vec::new();
            for root in roots {
                resolver::collect_aliases(&self.modules, root, &mut aliases);
            }
            let mut progress = false;
            for alias in aliases {
                if self.modules.get(alias).as_alias().is_none_or(|a| a.target.is_some()) {
                    continue;
                }
                if !self.config.resolve_implicit && !resolver::is_exported(&self.modules, alias) {
                    continue;
                }
                match resolver::resolve_alias(&mut self.modules, alias) {
                    Ok(_) => {
                        self.stats.aliases_resolved += 1;
                        progress = true;
                    }
                    Err(err) => {
                        // An unloaded top-level package may be loadable as an
                        // external dependency; retry the alias next round.
                        if let TalonError::ModuleNotFound { name } = &err {
                            if self.should_load_external(name) {
                                if self.load(&name.clone()).is_ok() {
                                    progress = true;
                                }
                                continue;
                            }
                        }
                        if resolver::record_alias_error(&mut self.modules, alias, &err) {
                            self.stats.aliases_failed += 1;
                        }
                    }
                }
            }
            if !progress {
                break;
            }
        }
        self.stats.time_resolving += start.elapsed();
    }

    /// Renders an object's source text from the cached lines of its module
    /// file. `None` for namespace/builtin modules and synthetic objects.
    pub fn source_of(&self, id: ObjectId) -> Option<String> {
        let node = self.modules.get(id);
        let (lineno, endlineno) = (node.lineno?, node.endlineno?);
        let module = self.modules.module_of(id);
        let filepath = self.modules.get(module).as_module()?.filepath.as_ref()?;
        self.lines.slice(filepath.as_file()?, lineno, endlineno)
    }

    fn should_load_external(&mut self, name: &str) -> bool {
        if self.modules.root(name).is_some() || !self.attempted_external.insert(name.to_string()) {
            return false;
        }
        match self.config.resolve_external {
            Some(allowed) => allowed,
            // The default only chases stubs-only distributions.
            None => name.ends_with("-stubs"),
        }
    }
}

fn is_init_file(path: &std::path::Path) -> bool {
    path.file_stem().and_then(|s| s.to_str()) == Some("__init__")
}

fn collect_modules(modules: &ModulesCollection, id: ObjectId, out: &mut Vec<ObjectId>) {
    if matches!(modules.get(id).data, ObjectData::Module(_)) {
        out.push(id);
        for &member in modules.get(id).members.values() {
            collect_modules(modules, member, out);
        }
    }
}
