//! Canonical and weak cache tables
//!
//! Four logical maps live behind one [`InternalTables`] contract:
//! host class to canonical wrapper, name to lazy wrapper, listener
//! interface to adapter class, and (object, listener name) to adapter
//! object. The backing decides when a key that is no longer referenced
//! elsewhere disappears from the tables.

pub mod reference;

pub use reference::{ReferenceTables, Retention};

use std::sync::Arc;

use weave_sdk::{HostClass, HostObject};

use crate::defaults::FALLBACK_TABLES;
use crate::object::DynamicClass;

/// Which map an iteration walks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// Host class to canonical wrapper
    Canonical,
    /// Name to lazy wrapper
    Lazy,
    /// Listener interface to adapter class
    AdapterClasses,
    /// (object, listener name) to adapter object
    Adapters,
}

/// Reclamation policy while an iteration is open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    /// Reclaimed entries may be purged during the iteration; they are skipped
    Plain,
    /// Purging is suspended until the iteration ends
    GlobalStable,
}

/// One entry yielded by an iteration
#[derive(Debug, Clone)]
pub enum TableItem {
    /// Canonical wrapper entry
    Canonical {
        /// Host class
        class: Arc<HostClass>,
        /// Its wrapper
        wrapper: Arc<DynamicClass>,
    },
    /// Lazy entry
    Lazy {
        /// Host class name
        name: String,
        /// Placeholder wrapper
        wrapper: Arc<DynamicClass>,
    },
    /// Adapter class entry
    AdapterClass {
        /// Listener interface
        listener: Arc<HostClass>,
        /// Synthesized adapter class
        adapter: Arc<HostClass>,
    },
    /// Adapter object entry
    Adapter {
        /// Event source
        object: HostObject,
        /// Listener interface name
        listener: String,
        /// Adapter object registered with the source
        adapter: HostObject,
    },
}

/// Entry counts and reclamation totals
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableStats {
    /// Backing name
    pub backing: &'static str,
    /// Canonical wrappers
    pub canonical: usize,
    /// Lazy wrappers
    pub lazy: usize,
    /// Adapter classes
    pub adapter_classes: usize,
    /// Adapter objects over all sources
    pub adapters: usize,
    /// Keys the table itself keeps alive
    pub held: usize,
    /// Entries purged after their key was reclaimed
    pub reclaimed: u64,
}

/// Table contract shared by every backing.
///
/// Every operation first purges entries whose keys were reclaimed, unless a
/// [`Stability::GlobalStable`] iteration is open. Iteration follows
/// `begin` → `next` until `None` (optionally `flush_current`) → `end`, one
/// iteration at a time per table.
pub trait InternalTables: Send + Sync {
    /// Backing name
    fn backing(&self) -> &'static str;

    /// Canonical wrapper of `class`
    fn get_canonical(&self, class: &HostClass) -> Option<Arc<DynamicClass>>;

    /// Store the canonical wrapper of `class`, replacing any previous one
    fn put_canonical(&self, class: &Arc<HostClass>, wrapper: Arc<DynamicClass>);

    /// Store `wrapper` unless `class` already has one; returns the entry
    /// that is canonical afterwards
    fn put_canonical_if_absent(&self, class: &Arc<HostClass>, wrapper: Arc<DynamicClass>) -> Arc<DynamicClass>;

    /// Drop the canonical wrapper of `class`
    fn remove_canonical(&self, class: &HostClass) -> Option<Arc<DynamicClass>>;

    /// Lazy wrapper registered under `name`
    fn get_lazy(&self, name: &str) -> Option<Arc<DynamicClass>>;

    /// Register a lazy wrapper
    fn put_lazy(&self, name: &str, wrapper: Arc<DynamicClass>);

    /// Drop a lazy wrapper
    fn remove_lazy(&self, name: &str) -> Option<Arc<DynamicClass>>;

    /// Adapter class synthesized for `listener`
    fn get_adapter_class(&self, listener: &HostClass) -> Option<Arc<HostClass>>;

    /// Record the adapter class of `listener`
    fn put_adapter_class(&self, listener: &Arc<HostClass>, adapter: Arc<HostClass>);

    /// Adapter object registered on `object` for `listener`
    fn get_adapter(&self, object: &HostObject, listener: &str) -> Option<HostObject>;

    /// Record the adapter object registered on `object` for `listener`
    fn put_adapter(&self, object: &HostObject, listener: &str, adapter: HostObject);

    /// Open an iteration over `kind`
    fn begin(&self, kind: TableKind, stability: Stability);

    /// Next live entry, `None` at the end
    fn next(&self) -> Option<TableItem>;

    /// Remove the entry last returned by `next`
    fn flush_current(&self);

    /// Close the open iteration
    fn end(&self);

    /// Release every table-held reference, then purge
    fn force_cleanup(&self);

    /// Release references the backing only keeps while memory allows
    fn memory_pressure(&self);

    /// Current counters
    fn stats(&self) -> TableStats;

    /// Open an iteration over canonical wrappers
    fn begin_canonical(&self, stability: Stability) {
        self.begin(TableKind::Canonical, stability)
    }

    /// Open an iteration over lazy wrappers
    fn begin_lazy(&self, stability: Stability) {
        self.begin(TableKind::Lazy, stability)
    }

    /// Open an iteration over adapter classes
    fn begin_adapter_classes(&self, stability: Stability) {
        self.begin(TableKind::AdapterClasses, stability)
    }

    /// Open an iteration over adapter objects
    fn begin_adapters(&self, stability: Stability) {
        self.begin(TableKind::Adapters, stability)
    }
}

/// Instantiate the first usable backing from a colon-separated list.
///
/// `weak` and `pinned` are always tried after the configured names.
pub fn select_tables(selection: &str) -> Arc<dyn InternalTables> {
    let configured = selection.split(':').map(str::trim).filter(|s| !s.is_empty());
    let retention = configured
        .chain(FALLBACK_TABLES)
        .find_map(|name| match Retention::from_name(name) {
            Some(r) => Some(r),
            None => {
                tracing::warn!(backing = name, "unknown table backing, trying next");
                None
            }
        })
        .unwrap_or(Retention::Pinned);
    tracing::debug!(backing = retention.name(), "selected table backing");
    Arc::new(ReferenceTables::new(retention))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_first_known_backing() {
        assert_eq!(select_tables("soft").backing(), "soft");
        assert_eq!(select_tables("bogus:pinned").backing(), "pinned");
        assert_eq!(select_tables(" : bogus").backing(), "weak");
        assert_eq!(select_tables("").backing(), "weak");
    }
}
