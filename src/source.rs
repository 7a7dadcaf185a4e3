//! Source identity and import resolution.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

/// Identity of one source file plus the ability to resolve import names to
/// sibling sources.
///
/// Cache keys are derived from [`SourceOrigin::name`], so names must be
/// unique within one resolution universe (a project, a directory tree).
pub trait SourceOrigin: Send + Sync {
    /// Stable, unique name of this source (typically a path or module name).
    fn name(&self) -> &str;

    /// Resolve an import name to another source. `None` means the import
    /// does not exist, which is a normal, representable outcome - callers
    /// get an empty extraction for it, not an error.
    fn resolve_import(&self, name: &str) -> Option<Arc<dyn SourceOrigin>>;
}

impl fmt::Debug for dyn SourceOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceOrigin({})", self.name())
    }
}

/// An in-memory [`SourceOrigin`] over an explicit import map.
///
/// Useful in tests and for callers whose project model is already resolved.
pub struct MapSource {
    name: SmolStr,
    imports: RwLock<FxHashMap<SmolStr, Arc<dyn SourceOrigin>>>,
}

impl MapSource {
    pub fn new(name: impl Into<SmolStr>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            imports: RwLock::new(FxHashMap::default()),
        })
    }

    /// Register an import under the name it is written as at import sites.
    pub fn add_import(&self, import_name: impl Into<SmolStr>, source: Arc<dyn SourceOrigin>) {
        self.imports.write().insert(import_name.into(), source);
    }
}

impl SourceOrigin for MapSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve_import(&self, name: &str) -> Option<Arc<dyn SourceOrigin>> {
        self.imports.read().get(name).cloned()
    }
}
