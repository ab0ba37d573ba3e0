use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::TalonError;

/// Source file extensions accepted for modules, in priority order: a `.py`
/// file always wins over a compiled or stub variant with the same stem.
pub const ACCEPTED_EXTENSIONS: &[&str] = &["py", "pyc", "pyo", "pyd", "pyi", "so"];

/// A regular package (directory with an init file) or single-file module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    /// The init file for packages, the module file otherwise.
    pub path: PathBuf,
    /// Companion stubs: a sibling `.pyi` file or a `name-stubs` package.
    pub stubs: Option<PathBuf>,
}

/// A package without any init file, possibly spread over several search
/// paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespacePackage {
    pub name: String,
    pub paths: Vec<PathBuf>,
}

/// Result of a successful module search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FoundModule {
    Package(Package),
    Namespace(NamespacePackage),
}

impl FoundModule {
    pub fn name(&self) -> &str {
        match self {
            Self::Package(package) => &package.name,
            Self::Namespace(namespace) => &namespace.name,
        }
    }
}

/// A submodule reachable from a package root: the dotted-name parts relative
/// to the package, and the file that defines it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submodule {
    pub parts: Vec<String>,
    pub path: PathBuf,
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Locates packages and modules on a list of search paths.
///
/// Construction expands `*.pth` files found directly inside each search
/// path: every non-comment, non-`import` line naming an existing directory
/// is appended right after the path that contained it.
#[derive(Debug, Clone)]
pub struct ModuleFinder {
    search_paths: Vec<PathBuf>,
    find_stubs_packages: bool,
}

impl ModuleFinder {
    pub fn new(search_paths: Vec<PathBuf>, find_stubs_packages: bool) -> Self {
        Self {
            search_paths: expand_pth_files(search_paths),
            find_stubs_packages,
        }
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Finds a module by dotted name or by filesystem path.
    pub fn find(&self, name_or_path: &str) -> Result<FoundModule, TalonError> {
        let looks_like_path = name_or_path.contains(std::path::MAIN_SEPARATOR)
            || ACCEPTED_EXTENSIONS
                .iter()
                .any(|ext| name_or_path.strip_suffix(ext).is_some_and(|stem| stem.ends_with('.')));
        if looks_like_path {
            let as_path = Path::new(name_or_path);
            if as_path.exists() {
                return self.find_path(as_path);
            }
            return Err(TalonError::ModuleNotFound {
                name: name_or_path.to_string(),
            });
        }
        self.find_name(name_or_path)
    }

    /// Treats an explicit filesystem path as a module, deriving the module
    /// name from the file stem (or directory name for packages).
    fn find_path(&self, path: &Path) -> Result<FoundModule, TalonError> {
        let not_found = || TalonError::ModuleNotFound {
            name: path.display().to_string(),
        };
        if path.is_dir() {
            let name = path.file_name().and_then(|n| n.to_str()).ok_or_else(not_found)?;
            for init in ["__init__.py", "__init__.pyi"] {
                let init_path = path.join(init);
                if init_path.is_file() {
                    return Ok(FoundModule::Package(Package {
                        name: name.to_string(),
                        path: init_path,
                        stubs: self.stubs_for_dir(path, name),
                    }));
                }
            }
            return Ok(FoundModule::Namespace(NamespacePackage {
                name: name.to_string(),
                paths: vec![path.to_path_buf()],
            }));
        }
        let stem = path.file_stem().and_then(|n| n.to_str()).ok_or_else(not_found)?;
        let name = if stem == "__init__" {
            path.parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
                .ok_or_else(not_found)?
        } else {
            stem
        };
        Ok(FoundModule::Package(Package {
            name: name.to_string(),
            path: path.to_path_buf(),
            stubs: sibling_stubs(path),
        }))
    }

    fn find_name(&self, name: &str) -> Result<FoundModule, TalonError> {
        let mut namespace_paths = Vec::new();
        for search_path in &self.search_paths {
            // An init always wins, even over earlier namespace candidates.
            if let Some(package) = self.find_in_directory(search_path, name) {
                return Ok(FoundModule::Package(package));
            }
            let dir = search_path.join(name);
            if dir.is_dir() {
                namespace_paths.push(dir);
            }
        }
        if self.find_stubs_packages && !name.ends_with("-stubs") {
            // A stubs-only distribution loads as if it were the package.
            if let Ok(FoundModule::Package(stubs)) = self.find_name(&format!("{name}-stubs")) {
                debug!("using stubs-only package for {name}");
                return Ok(FoundModule::Package(Package {
                    name: name.to_string(),
                    path: stubs.path,
                    stubs: None,
                }));
            }
        }
        if namespace_paths.is_empty() {
            Err(TalonError::ModuleNotFound {
                name: name.to_string(),
            })
        } else {
            Ok(FoundModule::Namespace(NamespacePackage {
                name: name.to_string(),
                paths: namespace_paths,
            }))
        }
    }

    fn find_in_directory(&self, search_path: &Path, name: &str) -> Option<Package> {
        let dir = search_path.join(name);
        // A package directory: regular init first, then a pure stub package.
        for init in ["__init__.py", "__init__.pyi"] {
            let init_path = dir.join(init);
            if init_path.is_file() {
                return Some(Package {
                    name: name.to_string(),
                    path: init_path,
                    stubs: self.stubs_for_dir(search_path, name),
                });
            }
        }
        // A single-file module, first accepted extension wins.
        for ext in ACCEPTED_EXTENSIONS {
            let file = search_path.join(format!("{name}.{ext}"));
            if file.is_file() {
                let stubs = if *ext == "pyi" { None } else { sibling_stubs(&file) };
                return Some(Package {
                    name: name.to_string(),
                    path: file,
                    stubs,
                });
            }
        }
        None
    }

    /// Looks for a `name-stubs` package next to a regular package.
    fn stubs_for_dir(&self, search_path: &Path, name: &str) -> Option<PathBuf> {
        if !self.find_stubs_packages {
            return None;
        }
        let stubs_init = search_path.join(format!("{name}-stubs")).join("__init__.pyi");
        stubs_init.is_file().then_some(stubs_init)
    }

    /// Iterates every submodule reachable from the found module's
    /// directories. For namespace packages spread over several paths, a
    /// relative name served by an earlier path shadows later ones.
    pub fn iter_submodules(&self, module: &FoundModule) -> Vec<Submodule> {
        let dirs: Vec<PathBuf> = match module {
            FoundModule::Package(package) => match package.path.parent() {
                Some(parent) if package.path.file_stem().and_then(|s| s.to_str()) == Some("__init__") => {
                    vec![parent.to_path_buf()]
                }
                // A single-file module has no submodules.
                _ => return Vec::new(),
            },
            FoundModule::Namespace(namespace) => namespace.paths.clone(),
        };
        let mut seen = Vec::new();
        let mut result = Vec::new();
        for dir in &dirs {
            let mut submodules = Vec::new();
            collect_submodules(dir, &mut Vec::new(), &mut submodules);
            submodules.sort_by(|a, b| a.parts.cmp(&b.parts));
            for submodule in submodules {
                if seen.contains(&submodule.parts) {
                    debug!(
                        "skipping shadowed submodule {} at {}",
                        submodule.parts.join("."),
                        submodule.path.display()
                    );
                    continue;
                }
                seen.push(submodule.parts.clone());
                result.push(submodule);
            }
        }
        result
    }
}

/// Reads `*.pth` files directly inside each search path and appends the
/// directories they name right after the path that contained them.
fn expand_pth_files(search_paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut expanded = Vec::new();
    for search_path in search_paths {
        let mut extras = Vec::new();
        if let Ok(entries) = fs::read_dir(&search_path) {
            let mut pth_files: Vec<PathBuf> = entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("pth"))
                .collect();
            pth_files.sort();
            for pth in pth_files {
                match fs::read_to_string(&pth) {
                    Ok(content) => {
                        for line in content.lines() {
                            let line = line.trim();
                            if line.is_empty() || line.starts_with('#') || line.starts_with("import ") {
                                continue;
                            }
                            let dir = search_path.join(line);
                            if dir.is_dir() {
                                extras.push(dir);
                            }
                        }
                    }
                    Err(err) => warn!("could not read {}: {err}", pth.display()),
                }
            }
        }
        expanded.push(search_path);
        expanded.extend(extras);
    }
    expanded
}

/// Looks for a sibling `.pyi` stub file next to a regular module file.
fn sibling_stubs(path: &Path) -> Option<PathBuf> {
    let stub = path.with_extension("pyi");
    stub.is_file().then_some(stub)
}

fn collect_submodules(dir: &Path, parts: &mut Vec<String>, out: &mut Vec<Submodule>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    let mut entries: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
    entries.sort();

    // Collect module files first; `.py` shadows compiled or stub variants of
    // the same stem because of the extension priority order.
    let mut taken_stems: Vec<String> = Vec::new();
    for ext in ACCEPTED_EXTENSIONS {
        for entry in &entries {
            if !entry.is_file() || entry.extension().and_then(|e| e.to_str()) != Some(*ext) {
                continue;
            }
            let Some(stem) = entry.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem == "__init__" || !is_identifier(stem) || taken_stems.iter().any(|s| s == stem) {
                continue;
            }
            taken_stems.push(stem.to_string());
            let mut sub_parts = parts.clone();
            sub_parts.push(stem.to_string());
            out.push(Submodule {
                parts: sub_parts,
                path: entry.clone(),
            });
        }
    }

    for entry in &entries {
        if !entry.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        if !is_identifier(name) {
            continue;
        }
        let mut sub_parts = parts.clone();
        sub_parts.push(name.to_string());
        for init in ["__init__.py", "__init__.pyi"] {
            let init_path = entry.join(init);
            if init_path.is_file() {
                out.push(Submodule {
                    parts: sub_parts.clone(),
                    path: init_path,
                });
                break;
            }
        }
        std::mem::swap(parts, &mut sub_parts);
        collect_submodules(entry, parts, out);
        std::mem::swap(parts, &mut sub_parts);
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, "").unwrap();
    }

    #[test]
    fn finds_regular_package() {
        let tmp = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("pkg/__init__.py"));

        let finder = ModuleFinder::new(vec![tmp.path().to_path_buf()], false);
        let found = finder.find("pkg").unwrap();
        match found {
            FoundModule::Package(package) => {
                assert_eq!(package.name, "pkg");
                assert_eq!(package.path, tmp.path().join("pkg/__init__.py"));
            }
            FoundModule::Namespace(_) => panic!("expected a regular package"),
        }
    }

    #[test]
    fn py_wins_over_pyi_for_single_file_modules() {
        let tmp = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("mod.pyi"));
        touch(&tmp.path().join("mod.py"));

        let finder = ModuleFinder::new(vec![tmp.path().to_path_buf()], false);
        match finder.find("mod").unwrap() {
            FoundModule::Package(package) => {
                assert_eq!(package.path, tmp.path().join("mod.py"));
                assert_eq!(package.stubs, Some(tmp.path().join("mod.pyi")));
            }
            FoundModule::Namespace(_) => panic!("expected a file module"),
        }
    }

    #[test]
    fn directory_without_init_is_a_namespace_package() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("ns")).unwrap();

        let finder = ModuleFinder::new(vec![tmp.path().to_path_buf()], false);
        match finder.find("ns").unwrap() {
            FoundModule::Namespace(namespace) => {
                assert_eq!(namespace.paths, vec![tmp.path().join("ns")]);
            }
            FoundModule::Package(_) => panic!("expected a namespace package"),
        }
    }

    #[test]
    fn missing_module_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let finder = ModuleFinder::new(vec![tmp.path().to_path_buf()], false);
        assert!(matches!(
            finder.find("nope"),
            Err(TalonError::ModuleNotFound { .. })
        ));
    }

    #[test]
    fn pth_files_extend_search_paths() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("vendored")).unwrap();
        touch(&tmp.path().join("vendored/extra/__init__.py"));
        fs::write(
            tmp.path().join("site.pth"),
            "# comment\nimport os\nvendored\nmissing-dir\n",
        )
        .unwrap();

        let finder = ModuleFinder::new(vec![tmp.path().to_path_buf()], false);
        assert!(finder.find("extra").is_ok());
    }

    #[test]
    fn stubs_only_package_loads_under_real_name() {
        let tmp = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("thing-stubs/__init__.pyi"));

        let finder = ModuleFinder::new(vec![tmp.path().to_path_buf()], true);
        match finder.find("thing").unwrap() {
            FoundModule::Package(package) => {
                assert_eq!(package.name, "thing");
                assert_eq!(package.path, tmp.path().join("thing-stubs/__init__.pyi"));
            }
            FoundModule::Namespace(_) => panic!("expected the stubs package"),
        }
    }

    #[test]
    fn iter_submodules_walks_the_tree_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("pkg/__init__.py"));
        touch(&tmp.path().join("pkg/b.py"));
        touch(&tmp.path().join("pkg/a.py"));
        touch(&tmp.path().join("pkg/sub/__init__.py"));
        touch(&tmp.path().join("pkg/sub/inner.py"));

        let finder = ModuleFinder::new(vec![tmp.path().to_path_buf()], false);
        let found = finder.find("pkg").unwrap();
        let submodules = finder.iter_submodules(&found);
        let names: Vec<String> = submodules.iter().map(|s| s.parts.join(".")).collect();
        assert_eq!(names, ["a", "b", "sub", "sub.inner"]);
    }

    #[test]
    fn shadowed_stems_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("pkg/__init__.py"));
        touch(&tmp.path().join("pkg/mod.py"));
        touch(&tmp.path().join("pkg/mod.pyc"));

        let finder = ModuleFinder::new(vec![tmp.path().to_path_buf()], false);
        let found = finder.find("pkg").unwrap();
        let submodules = finder.iter_submodules(&found);
        assert_eq!(submodules.len(), 1);
        assert_eq!(submodules[0].path, tmp.path().join("pkg/mod.py"));
    }
}
