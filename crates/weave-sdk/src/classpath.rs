//! Host class path
//!
//! Registry of classes resolvable by name without a dynamic loader.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::class::HostClass;
use crate::error::{HostError, HostResult};

/// Name → class registry. The root class is always present.
pub struct HostClassPath {
    classes: RwLock<FxHashMap<String, Arc<HostClass>>>,
}

impl HostClassPath {
    /// Create a class path holding only the root class
    pub fn new() -> Self {
        let mut classes = FxHashMap::default();
        let root = HostClass::object();
        classes.insert(root.name().to_string(), root);
        Self {
            classes: RwLock::new(classes),
        }
    }

    /// Register a class under its name.
    ///
    /// A different class already registered under the same name is a linkage error.
    pub fn register(&self, class: Arc<HostClass>) -> HostResult<()> {
        let mut classes = self.classes.write();
        if let Some(existing) = classes.get(class.name()) {
            if existing.id() == class.id() {
                return Ok(());
            }
            return Err(HostError::Linkage(format!(
                "duplicate class definition: {}",
                class.name()
            )));
        }
        classes.insert(class.name().to_string(), class);
        Ok(())
    }

    /// Look up a class by name
    pub fn resolve(&self, name: &str) -> Option<Arc<HostClass>> {
        self.classes.read().get(name).cloned()
    }

    /// Remove a class, returning it
    pub fn remove(&self, name: &str) -> Option<Arc<HostClass>> {
        self.classes.write().remove(name)
    }

    /// Whether a class is registered
    pub fn contains(&self, name: &str) -> bool {
        self.classes.read().contains_key(name)
    }

    /// Number of registered classes
    pub fn len(&self) -> usize {
        self.classes.read().len()
    }

    /// Check if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.classes.read().is_empty()
    }

    /// Registered class names
    pub fn names(&self) -> Vec<String> {
        self.classes.read().keys().cloned().collect()
    }
}

impl Default for HostClassPath {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HostClassPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostClassPath")
            .field("classes", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{HostClassBuilder, ROOT_CLASS_NAME};

    #[test]
    fn test_root_always_present() {
        let cp = HostClassPath::new();
        assert!(cp.resolve(ROOT_CLASS_NAME).unwrap().is_root());
        assert_eq!(cp.len(), 1);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let cp = HostClassPath::new();
        let a = HostClassBuilder::new("demo.A").build().unwrap();
        let other = HostClassBuilder::new("demo.A").build().unwrap();
        cp.register(Arc::clone(&a)).unwrap();
        cp.register(a).unwrap();
        assert!(matches!(cp.register(other), Err(HostError::Linkage(_))));
    }
}
