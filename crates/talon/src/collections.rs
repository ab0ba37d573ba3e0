use std::collections::HashMap;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::error::TalonError;
use crate::objects::{ObjectData, ObjectId, ObjectNode};

/// Cache of source lines per file, filled once when a module is visited.
///
/// Consumers that render source snippets read from here instead of going back
/// to disk. The collection is append-only.
#[derive(Debug, Default)]
pub struct LinesCollection {
    lines: HashMap<PathBuf, Vec<String>>,
}

impl LinesCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, source: &str) {
        self.lines
            .insert(path.into(), source.lines().map(str::to_string).collect());
    }

    pub fn get(&self, path: &Path) -> Option<&[String]> {
        self.lines.get(path).map(Vec::as_slice)
    }

    /// Renders the source lines of a 1-based, inclusive line span.
    pub fn slice(&self, path: &Path, lineno: usize, endlineno: usize) -> Option<String> {
        let lines = self.lines.get(path)?;
        if lineno == 0 || lineno > endlineno || endlineno > lines.len() {
            return None;
        }
        Some(lines[lineno - 1..endlineno].join("\n"))
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// The root map of loaded packages and the arena owning every object node.
///
/// All object ids are indices into this arena; the collection is therefore
/// the single owner of the object graph, and everything else refers to nodes
/// by id. Nodes are never removed, so ids stay valid for the collection's
/// lifetime.
#[derive(Debug, Default)]
pub struct ModulesCollection {
    nodes: Vec<ObjectNode>,
    roots: IndexMap<String, ObjectId>,
}

impl ModulesCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node to the arena and returns its id.
    pub fn alloc(&mut self, node: ObjectNode) -> ObjectId {
        let id = ObjectId(u32::try_from(self.nodes.len()).unwrap_or_else(|_| {
            // 4 billion objects means something else went wrong long ago.
            unreachable!("object arena overflow")
        }));
        self.nodes.push(node);
        id
    }

    pub fn get(&self, id: ObjectId) -> &ObjectNode {
        &self.nodes[id.index()]
    }

    pub fn get_mut(&mut self, id: ObjectId) -> &mut ObjectNode {
        &mut self.nodes[id.index()]
    }

    /// Registers a top-level module under its name.
    pub fn insert_root(&mut self, id: ObjectId) {
        let name = self.get(id).name.clone();
        self.roots.insert(name, id);
    }

    pub fn root(&self, name: &str) -> Option<ObjectId> {
        self.roots.get(name).copied()
    }

    pub fn roots(&self) -> impl Iterator<Item = (&String, ObjectId)> {
        self.roots.iter().map(|(name, id)| (name, *id))
    }

    pub fn object_count(&self) -> usize {
        self.nodes.len()
    }

    /// Binds `child` as a member of `parent` under the child's own name,
    /// keeping the parent back-reference in sync. Returns the id previously
    /// bound under that name, if any.
    pub fn set_member(&mut self, parent: ObjectId, child: ObjectId) -> Option<ObjectId> {
        let name = self.get(child).name.clone();
        self.get_mut(child).parent = Some(parent);
        self.get_mut(parent).members.insert(name, child)
    }

    /// The lookup path of an object: the dotted chain of names from its root
    /// down to it. For aliases this is where the alias lives, not where its
    /// target is defined.
    pub fn path(&self, id: ObjectId) -> String {
        let mut parts = Vec::new();
        let mut current = Some(id);
        while let Some(cursor) = current {
            let node = self.get(cursor);
            parts.push(node.name.as_str());
            current = node.parent;
        }
        parts.reverse();
        parts.join(".")
    }

    /// The dotted path of the place an object is defined. Equal to `path`
    /// for concrete objects; for an alias it is the target's canonical path
    /// (falling back to the raw target path while unresolved).
    pub fn canonical_path(&self, id: ObjectId) -> String {
        match &self.get(id).data {
            ObjectData::Alias(alias) => match alias.target {
                Some(target) => self.canonical_path(target),
                None => alias.target_path.clone(),
            },
            _ => self.path(id),
        }
    }

    /// The nearest enclosing module of an object (itself when a module).
    pub fn module_of(&self, id: ObjectId) -> ObjectId {
        let mut current = id;
        loop {
            if self.get(current).is_module() {
                return current;
            }
            match self.get(current).parent {
                Some(parent) => current = parent,
                None => return current,
            }
        }
    }

    /// The top-level package an object belongs to.
    pub fn package_of(&self, id: ObjectId) -> ObjectId {
        let mut current = id;
        while let Some(parent) = self.get(current).parent {
            current = parent;
        }
        current
    }

    /// Looks up a member by local name, forwarding through the alias target
    /// when the receiver is an alias.
    pub fn member(&self, id: ObjectId, name: &str) -> Option<ObjectId> {
        let mut seen = Vec::new();
        self.member_guarded(id, name, &mut seen).ok().flatten()
    }

    /// Finds an object by dotted path, walking from the root module and
    /// following aliases at every step.
    pub fn lookup(&self, path: &str) -> Result<ObjectId, TalonError> {
        let mut seen = Vec::new();
        self.lookup_guarded(path, &mut seen)
    }

    fn lookup_guarded(&self, path: &str, seen: &mut Vec<String>) -> Result<ObjectId, TalonError> {
        let mut parts = path.split('.');
        let first = parts.next().unwrap_or_default();
        let mut current = self.root(first).ok_or_else(|| TalonError::ModuleNotFound {
            name: first.to_string(),
        })?;
        for part in parts {
            current = self
                .member_guarded(current, part, seen)?
                .ok_or_else(|| TalonError::alias_resolution(path, format!("{}.{part}", self.path(current))))?;
        }
        Ok(current)
    }

    fn member_guarded(
        &self,
        id: ObjectId,
        name: &str,
        seen: &mut Vec<String>,
    ) -> Result<Option<ObjectId>, TalonError> {
        let holder = match &self.get(id).data {
            ObjectData::Alias(_) => self.target_guarded(id, seen)?,
            _ => id,
        };
        Ok(self.get(holder).members.get(name).copied())
    }

    /// Follows an alias chain to its concrete object without memoizing,
    /// detecting cycles through the in-flight path list.
    pub fn final_target(&self, id: ObjectId) -> Result<ObjectId, TalonError> {
        let mut seen = Vec::new();
        self.target_guarded(id, &mut seen)
    }

    fn target_guarded(&self, id: ObjectId, seen: &mut Vec<String>) -> Result<ObjectId, TalonError> {
        let node = self.get(id);
        let ObjectData::Alias(alias) = &node.data else {
            return Ok(id);
        };
        let own_path = self.path(id);
        if seen.contains(&own_path) {
            seen.push(own_path);
            return Err(TalonError::CyclicAlias { chain: seen.clone() });
        }
        seen.push(own_path);
        let target = match alias.target {
            Some(target) => target,
            None => self.lookup_guarded(&alias.target_path, seen)?,
        };
        self.target_guarded(target, seen)
    }

    /// Whether an object belongs to the public API: an explicit `public`
    /// override wins; next, a module member is public exactly when the
    /// module declares `__all__` and lists it; otherwise naming conventions
    /// decide.
    pub fn is_public(&self, id: ObjectId) -> bool {
        let node = self.get(id);
        if let Some(explicit) = node.public {
            return explicit;
        }
        if let Some(parent) = node.parent {
            if let Some(exports) = self.get(parent).as_module().and_then(|m| m.exports.as_ref()) {
                return exports
                    .iter()
                    .any(|e| matches!(e, crate::objects::Export::Name(name) if *name == node.name));
            }
        }
        !node.is_private()
    }

    /// Resolves a name appearing in the scope of an object to a canonical
    /// dotted path, per the scope lookup order: type parameters first, then
    /// own members, then scope imports, then enclosing scopes up to the root
    /// module. Aliases are not followed transitively; an alias member
    /// resolves to its target path as written.
    pub fn resolve_name(&self, scope: ObjectId, name: &str) -> Result<String, TalonError> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let node = self.get(id);
            if node.type_parameters().iter().any(|tp| tp.name == name) {
                return Ok(format!("{}.{name}", self.path(id)));
            }
            if let Some(&member) = node.members.get(name) {
                return Ok(match &self.get(member).data {
                    ObjectData::Alias(alias) => alias.target_path.clone(),
                    _ => self.path(member),
                });
            }
            if let Some(target) = node.imports.get(name) {
                return Ok(target.clone());
            }
            current = node.parent;
        }
        Err(TalonError::NameResolution {
            name: name.to_string(),
            scope: self.path(scope),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{AttributeData, FunctionData, ObjectNode};

    fn collection_with_module() -> (ModulesCollection, ObjectId) {
        let mut modules = ModulesCollection::new();
        let root = modules.alloc(ObjectNode::module("pkg", None));
        modules.insert_root(root);
        (modules, root)
    }

    #[test]
    fn reciprocal_membership() {
        let (mut modules, root) = collection_with_module();
        let f = modules.alloc(ObjectNode::new("f", ObjectData::Function(FunctionData::default())));
        modules.set_member(root, f);
        assert_eq!(modules.get(root).members["f"], f);
        assert_eq!(modules.get(f).parent, Some(root));
        assert_eq!(modules.path(f), "pkg.f");
    }

    #[test]
    fn lookup_follows_aliases() {
        let (mut modules, root) = collection_with_module();
        let sub = modules.alloc(ObjectNode::module("sub", None));
        modules.set_member(root, sub);
        let x = modules.alloc(ObjectNode::new("x", ObjectData::Attribute(AttributeData::default())));
        modules.set_member(sub, x);
        let alias = modules.alloc(ObjectNode::alias("y", "pkg.sub.x"));
        modules.set_member(root, alias);

        assert_eq!(modules.lookup("pkg.sub.x").unwrap(), x);
        assert_eq!(modules.final_target(alias).unwrap(), x);
        assert_eq!(modules.canonical_path(alias), "pkg.sub.x");
        assert_eq!(modules.path(alias), "pkg.y");
    }

    #[test]
    fn cyclic_aliases_are_detected() {
        let (mut modules, root) = collection_with_module();
        let a = modules.alloc(ObjectNode::alias("a", "pkg.b"));
        modules.set_member(root, a);
        let b = modules.alloc(ObjectNode::alias("b", "pkg.a"));
        modules.set_member(root, b);

        let err = modules.final_target(a).unwrap_err();
        assert!(matches!(err, TalonError::CyclicAlias { .. }));
    }

    #[test]
    fn resolve_name_walks_scopes() {
        let (mut modules, root) = collection_with_module();
        let x = modules.alloc(ObjectNode::new("x", ObjectData::Attribute(AttributeData::default())));
        modules.set_member(root, x);
        let f = modules.alloc(ObjectNode::new("f", ObjectData::Function(FunctionData::default())));
        modules.set_member(root, f);

        assert_eq!(modules.resolve_name(f, "x").unwrap(), "pkg.x");
        assert!(modules.resolve_name(f, "missing").is_err());
    }

    #[test]
    fn exports_govern_module_member_publicness() {
        let (mut modules, root) = collection_with_module();
        let listed = modules.alloc(ObjectNode::new("listed", ObjectData::Function(FunctionData::default())));
        modules.set_member(root, listed);
        let unlisted = modules.alloc(ObjectNode::new(
            "unlisted",
            ObjectData::Function(FunctionData::default()),
        ));
        modules.set_member(root, unlisted);

        // Without __all__, naming conventions decide.
        assert!(modules.is_public(listed));
        assert!(modules.is_public(unlisted));

        if let Some(data) = modules.get_mut(root).as_module_mut() {
            data.exports = Some(vec![crate::objects::Export::Name("listed".to_string())]);
        }
        assert!(modules.is_public(listed));
        assert!(!modules.is_public(unlisted));

        // An explicit override still wins over __all__.
        modules.get_mut(unlisted).public = Some(true);
        assert!(modules.is_public(unlisted));
    }

    #[test]
    fn lines_collection_slices_spans() {
        let mut lines = LinesCollection::new();
        lines.insert("/tmp/mod.py", "a = 1\nb = 2\nc = 3\n");
        let path = Path::new("/tmp/mod.py");
        assert_eq!(lines.slice(path, 2, 3).as_deref(), Some("b = 2\nc = 3"));
        assert_eq!(lines.slice(path, 3, 2), None);
        assert_eq!(lines.slice(path, 1, 99), None);
    }

    #[test]
    fn resolve_name_prefers_imports_over_parents() {
        let (mut modules, root) = collection_with_module();
        let f = modules.alloc(ObjectNode::new("f", ObjectData::Function(FunctionData::default())));
        modules.set_member(root, f);
        modules
            .get_mut(root)
            .imports
            .insert("Sequence".to_string(), "collections.abc.Sequence".to_string());

        assert_eq!(
            modules.resolve_name(f, "Sequence").unwrap(),
            "collections.abc.Sequence"
        );
    }
}
