use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while loading, resolving or navigating an object tree.
///
/// The loader itself downgrades most of these to warnings and keeps going
/// (see the per-phase policies in the loader); they surface as hard errors
/// only when the caller asks for something that cannot be answered, such as
/// resolving a name that does not exist or following a cyclic alias.
#[derive(Debug, Error)]
pub enum TalonError {
    /// A source file could not be read or parsed.
    #[error("failed to load {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    /// The requested module was not found on any search path.
    #[error("module '{name}' not found on any search path")]
    ModuleNotFound { name: String },

    /// Filesystem access was attempted on a module that has no filepath.
    #[error("module '{name}' is a builtin module and has no filepath")]
    BuiltinModule { name: String },

    /// A name could not be resolved in the scope of an object.
    #[error("could not resolve name '{name}' in scope of '{scope}'")]
    NameResolution { name: String, scope: String },

    /// An alias target could not be located in the loaded modules.
    #[error("could not resolve alias '{path}' pointing at '{target}'{}", reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    AliasResolution {
        path: String,
        target: String,
        reason: Option<String>,
    },

    /// A cycle was detected while following a chain of aliases.
    #[error("cyclic aliases detected: {}", chain.join(" -> "))]
    CyclicAlias { chain: Vec<String> },

    /// AST navigation walked past the last sibling of a node.
    #[error("{message}")]
    LastNode { message: String },

    /// An extension hook failed.
    #[error("extension '{name}' failed: {message}")]
    Extension { name: String, message: String },
}

impl TalonError {
    /// Shorthand for an alias resolution failure without a detail message.
    pub fn alias_resolution(path: impl Into<String>, target: impl Into<String>) -> Self {
        Self::AliasResolution {
            path: path.into(),
            target: target.into(),
            reason: None,
        }
    }
}
