//! Reference-based table backings
//!
//! Entries are keyed by host identity and watch their key through a
//! reclamation queue. What differs between backings is whether the table
//! itself keeps the key alive:
//!
//! - `weak`: never. An entry goes away as soon as its key is dropped elsewhere.
//! - `soft`: until `memory_pressure` or `force_cleanup` releases the hold.
//! - `pinned`: until `force_cleanup` releases the hold.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use weave_sdk::{HostClass, HostObject, ReclaimQueue, WeakHostObject};

use crate::object::DynamicClass;
use crate::tables::{InternalTables, Stability, TableItem, TableKind, TableStats};

/// When the table lets go of its keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// Keys are never held
    Weak,
    /// Keys are held until memory pressure
    Soft,
    /// Keys are held until a forced cleanup
    Pinned,
}

impl Retention {
    /// Parse a backing name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "weak" => Some(Retention::Weak),
            "soft" => Some(Retention::Soft),
            "pinned" => Some(Retention::Pinned),
            _ => None,
        }
    }

    /// Backing name
    pub fn name(self) -> &'static str {
        match self {
            Retention::Weak => "weak",
            Retention::Soft => "soft",
            Retention::Pinned => "pinned",
        }
    }

    fn holds_keys(self) -> bool {
        self != Retention::Weak
    }
}

// ============================================================================
// Entries
// ============================================================================

struct ClassEntry<V> {
    key: Weak<HostClass>,
    hold: Option<Arc<HostClass>>,
    value: V,
}

impl<V: Clone> ClassEntry<V> {
    fn live(&self) -> Option<(Arc<HostClass>, V)> {
        self.key.upgrade().map(|k| (k, self.value.clone()))
    }
}

impl ClassEntry<Weak<HostClass>> {
    /// Adapter classes reference their listener, so the table holds them
    /// weakly; an entry lives while both ends do
    fn live_adapter(&self) -> Option<(Arc<HostClass>, Arc<HostClass>)> {
        Some((self.key.upgrade()?, self.value.upgrade()?))
    }

    fn is_dead(&self) -> bool {
        self.key.strong_count() == 0 || self.value.strong_count() == 0
    }
}

struct AdapterEntry {
    key: WeakHostObject,
    hold: Option<HostObject>,
    adapters: FxHashMap<String, HostObject>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CursorKey {
    Class(u64),
    Name(String),
    Adapter(u64, String),
}

struct Cursor {
    kind: TableKind,
    stability: Stability,
    keys: Vec<CursorKey>,
    pos: usize,
    current: Option<CursorKey>,
}

#[derive(Default)]
struct TableState {
    canonical: FxHashMap<u64, ClassEntry<Arc<DynamicClass>>>,
    lazy: FxHashMap<String, Arc<DynamicClass>>,
    adapter_classes: FxHashMap<u64, ClassEntry<Weak<HostClass>>>,
    adapters: FxHashMap<u64, AdapterEntry>,
    keep_stable: usize,
    cursor: Option<Cursor>,
    reclaimed: u64,
}

impl TableState {
    fn release_holds(&mut self) {
        for e in self.canonical.values_mut() {
            e.hold = None;
        }
        for e in self.adapter_classes.values_mut() {
            e.hold = None;
        }
        for e in self.adapters.values_mut() {
            e.hold = None;
        }
    }

    fn snapshot(&self, kind: TableKind) -> Vec<CursorKey> {
        match kind {
            TableKind::Canonical => self.canonical.keys().map(|k| CursorKey::Class(*k)).collect(),
            TableKind::Lazy => self.lazy.keys().map(|k| CursorKey::Name(k.clone())).collect(),
            TableKind::AdapterClasses => self
                .adapter_classes
                .keys()
                .map(|k| CursorKey::Class(*k))
                .collect(),
            TableKind::Adapters => self
                .adapters
                .iter()
                .flat_map(|(id, e)| e.adapters.keys().map(|l| CursorKey::Adapter(*id, l.clone())))
                .collect(),
        }
    }

    fn item(&self, kind: TableKind, key: &CursorKey) -> Option<TableItem> {
        match (kind, key) {
            (TableKind::Canonical, CursorKey::Class(id)) => {
                let (class, wrapper) = self.canonical.get(id)?.live()?;
                Some(TableItem::Canonical { class, wrapper })
            }
            (TableKind::Lazy, CursorKey::Name(name)) => Some(TableItem::Lazy {
                name: name.clone(),
                wrapper: Arc::clone(self.lazy.get(name)?),
            }),
            (TableKind::AdapterClasses, CursorKey::Class(id)) => {
                let (listener, adapter) = self.adapter_classes.get(id)?.live_adapter()?;
                Some(TableItem::AdapterClass { listener, adapter })
            }
            (TableKind::Adapters, CursorKey::Adapter(id, listener)) => {
                let entry = self.adapters.get(id)?;
                let object = entry.key.upgrade()?;
                let adapter = entry.adapters.get(listener)?.clone();
                Some(TableItem::Adapter {
                    object,
                    listener: listener.clone(),
                    adapter,
                })
            }
            _ => None,
        }
    }

    fn remove(&mut self, kind: TableKind, key: &CursorKey) {
        match (kind, key) {
            (TableKind::Canonical, CursorKey::Class(id)) => {
                self.canonical.remove(id);
            }
            (TableKind::Lazy, CursorKey::Name(name)) => {
                self.lazy.remove(name);
            }
            (TableKind::AdapterClasses, CursorKey::Class(id)) => {
                self.adapter_classes.remove(id);
            }
            (TableKind::Adapters, CursorKey::Adapter(id, listener)) => {
                if let Some(entry) = self.adapters.get_mut(id) {
                    entry.adapters.remove(listener);
                    if entry.adapters.is_empty() {
                        self.adapters.remove(id);
                    }
                }
            }
            _ => {}
        }
    }

    fn held(&self) -> usize {
        self.canonical.values().filter(|e| e.hold.is_some()).count()
            + self.adapter_classes.values().filter(|e| e.hold.is_some()).count()
            + self.adapters.values().filter(|e| e.hold.is_some()).count()
    }

    /// Drop entries whose key died without a notification reaching us
    fn sweep_dead(&mut self) -> usize {
        let before = self.canonical.len() + self.adapter_classes.len() + self.adapters.len();
        self.canonical.retain(|_, e| e.key.strong_count() > 0);
        self.adapter_classes.retain(|_, e| !e.is_dead());
        self.adapters
            .retain(|_, e| e.key.upgrade().is_some() && !e.adapters.is_empty());
        before - (self.canonical.len() + self.adapter_classes.len() + self.adapters.len())
    }
}

// ============================================================================
// ReferenceTables
// ============================================================================

/// Table backing keyed by host identity with configurable retention
pub struct ReferenceTables {
    retention: Retention,
    state: Mutex<TableState>,
    class_queue: ReclaimQueue,
    object_queue: ReclaimQueue,
}

impl ReferenceTables {
    /// Create empty tables
    pub fn new(retention: Retention) -> Self {
        Self {
            retention,
            state: Mutex::new(TableState::default()),
            class_queue: ReclaimQueue::new(),
            object_queue: ReclaimQueue::new(),
        }
    }

    /// Retention policy
    pub fn retention(&self) -> Retention {
        self.retention
    }

    /// Purge entries whose keys were reclaimed, unless a stable iteration
    /// is open
    fn drain(&self, state: &mut TableState) {
        if state.keep_stable > 0 {
            return;
        }
        let mut purged = 0usize;
        for id in self.class_queue.poll() {
            purged += usize::from(state.canonical.remove(&id).is_some());
            purged += usize::from(state.adapter_classes.remove(&id).is_some());
        }
        for id in self.object_queue.poll() {
            if let Some(entry) = state.adapters.remove(&id) {
                purged += entry.adapters.len();
            }
        }
        if purged > 0 {
            state.reclaimed += purged as u64;
            tracing::trace!(backing = self.retention.name(), purged, "purged reclaimed entries");
        }
    }

    fn hold_class(&self, class: &Arc<HostClass>) -> Option<Arc<HostClass>> {
        self.retention.holds_keys().then(|| Arc::clone(class))
    }
}

impl InternalTables for ReferenceTables {
    fn backing(&self) -> &'static str {
        self.retention.name()
    }

    fn get_canonical(&self, class: &HostClass) -> Option<Arc<DynamicClass>> {
        let mut state = self.state.lock();
        self.drain(&mut state);
        state.canonical.get(&class.id()).map(|e| Arc::clone(&e.value))
    }

    fn put_canonical(&self, class: &Arc<HostClass>, wrapper: Arc<DynamicClass>) {
        let mut state = self.state.lock();
        self.drain(&mut state);
        self.class_queue.watch(class.reclaim_hooks());
        state.canonical.insert(
            class.id(),
            ClassEntry {
                key: Arc::downgrade(class),
                hold: self.hold_class(class),
                value: wrapper,
            },
        );
    }

    fn put_canonical_if_absent(&self, class: &Arc<HostClass>, wrapper: Arc<DynamicClass>) -> Arc<DynamicClass> {
        let mut state = self.state.lock();
        self.drain(&mut state);
        if let Some(existing) = state.canonical.get(&class.id()) {
            return Arc::clone(&existing.value);
        }
        self.class_queue.watch(class.reclaim_hooks());
        state.canonical.insert(
            class.id(),
            ClassEntry {
                key: Arc::downgrade(class),
                hold: self.hold_class(class),
                value: Arc::clone(&wrapper),
            },
        );
        wrapper
    }

    fn remove_canonical(&self, class: &HostClass) -> Option<Arc<DynamicClass>> {
        let mut state = self.state.lock();
        self.drain(&mut state);
        state.canonical.remove(&class.id()).map(|e| e.value)
    }

    fn get_lazy(&self, name: &str) -> Option<Arc<DynamicClass>> {
        let mut state = self.state.lock();
        self.drain(&mut state);
        state.lazy.get(name).cloned()
    }

    fn put_lazy(&self, name: &str, wrapper: Arc<DynamicClass>) {
        let mut state = self.state.lock();
        self.drain(&mut state);
        state.lazy.insert(name.to_string(), wrapper);
    }

    fn remove_lazy(&self, name: &str) -> Option<Arc<DynamicClass>> {
        let mut state = self.state.lock();
        self.drain(&mut state);
        state.lazy.remove(name)
    }

    fn get_adapter_class(&self, listener: &HostClass) -> Option<Arc<HostClass>> {
        let mut state = self.state.lock();
        self.drain(&mut state);
        state
            .adapter_classes
            .get(&listener.id())
            .and_then(|e| e.value.upgrade())
    }

    fn put_adapter_class(&self, listener: &Arc<HostClass>, adapter: Arc<HostClass>) {
        let mut state = self.state.lock();
        self.drain(&mut state);
        self.class_queue.watch(listener.reclaim_hooks());
        state.adapter_classes.insert(
            listener.id(),
            ClassEntry {
                key: Arc::downgrade(listener),
                hold: self.hold_class(listener),
                value: Arc::downgrade(&adapter),
            },
        );
    }

    fn get_adapter(&self, object: &HostObject, listener: &str) -> Option<HostObject> {
        let mut state = self.state.lock();
        self.drain(&mut state);
        state
            .adapters
            .get(&object.id())
            .and_then(|e| e.adapters.get(listener))
            .cloned()
    }

    fn put_adapter(&self, object: &HostObject, listener: &str, adapter: HostObject) {
        let mut state = self.state.lock();
        self.drain(&mut state);
        self.object_queue.watch(object.reclaim_hooks());
        let hold = self.retention.holds_keys().then(|| object.clone());
        state
            .adapters
            .entry(object.id())
            .or_insert_with(|| AdapterEntry {
                key: object.downgrade(),
                hold,
                adapters: FxHashMap::default(),
            })
            .adapters
            .insert(listener.to_string(), adapter);
    }

    fn begin(&self, kind: TableKind, stability: Stability) {
        let mut state = self.state.lock();
        if let Some(open) = state.cursor.take() {
            tracing::warn!(kind = ?open.kind, "iteration replaced before end");
            if open.stability == Stability::GlobalStable {
                state.keep_stable -= 1;
            }
        }
        self.drain(&mut state);
        if stability == Stability::GlobalStable {
            state.keep_stable += 1;
        }
        let keys = state.snapshot(kind);
        state.cursor = Some(Cursor {
            kind,
            stability,
            keys,
            pos: 0,
            current: None,
        });
    }

    fn next(&self) -> Option<TableItem> {
        let mut state = self.state.lock();
        self.drain(&mut state);
        let mut cursor = state.cursor.take()?;
        let mut found = None;
        while cursor.pos < cursor.keys.len() {
            let key = cursor.keys[cursor.pos].clone();
            cursor.pos += 1;
            if let Some(item) = state.item(cursor.kind, &key) {
                found = Some((key, item));
                break;
            }
        }
        let item = found.map(|(key, item)| {
            cursor.current = Some(key);
            item
        });
        if item.is_none() {
            cursor.current = None;
        }
        state.cursor = Some(cursor);
        item
    }

    fn flush_current(&self) {
        let mut state = self.state.lock();
        let Some((kind, key)) = state
            .cursor
            .as_mut()
            .and_then(|c| c.current.take().map(|k| (c.kind, k)))
        else {
            return;
        };
        state.remove(kind, &key);
    }

    fn end(&self) {
        let mut state = self.state.lock();
        if let Some(cursor) = state.cursor.take() {
            if cursor.stability == Stability::GlobalStable {
                state.keep_stable -= 1;
            }
        }
        self.drain(&mut state);
    }

    fn force_cleanup(&self) {
        let mut state = self.state.lock();
        state.release_holds();
        self.drain(&mut state);
        if state.keep_stable == 0 {
            let swept = state.sweep_dead();
            state.reclaimed += swept as u64;
        }
        tracing::debug!(backing = self.retention.name(), "forced table cleanup");
    }

    fn memory_pressure(&self) {
        if self.retention != Retention::Soft {
            return;
        }
        let mut state = self.state.lock();
        state.release_holds();
        self.drain(&mut state);
    }

    fn stats(&self) -> TableStats {
        let mut state = self.state.lock();
        self.drain(&mut state);
        TableStats {
            backing: self.retention.name(),
            canonical: state.canonical.len(),
            lazy: state.lazy.len(),
            adapter_classes: state.adapter_classes.values().filter(|e| !e.is_dead()).count(),
            adapters: state.adapters.values().map(|e| e.adapters.len()).sum(),
            held: state.held(),
            reclaimed: state.reclaimed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{HostBinding, Namespace};
    use weave_sdk::{HostClassBuilder, HostConstructor};

    fn wrapper(name: &str) -> Arc<DynamicClass> {
        DynamicClass::new(name, None, vec![], Namespace::default(), HostBinding::None)
    }

    fn class(name: &str) -> Arc<HostClass> {
        HostClassBuilder::new(name)
            .constructor(HostConstructor::new(vec![]))
            .build()
            .unwrap()
    }

    fn drain_items(tables: &ReferenceTables) -> Vec<TableItem> {
        std::iter::from_fn(|| tables.next()).collect()
    }

    #[test]
    fn test_weak_entry_reclaimed_with_key() {
        let tables = ReferenceTables::new(Retention::Weak);
        let c = class("demo.Weak");
        tables.put_canonical(&c, wrapper("Weak"));
        assert!(tables.get_canonical(&c).is_some());
        drop(c);
        let stats = tables.stats();
        assert_eq!(stats.canonical, 0);
        assert_eq!(stats.reclaimed, 1);
    }

    #[test]
    fn test_put_if_absent_keeps_first() {
        let tables = ReferenceTables::new(Retention::Weak);
        let c = class("demo.Once");
        let first = wrapper("First");
        let kept = tables.put_canonical_if_absent(&c, Arc::clone(&first));
        assert!(Arc::ptr_eq(&kept, &first));
        let kept = tables.put_canonical_if_absent(&c, wrapper("Second"));
        assert!(Arc::ptr_eq(&kept, &first));
    }

    #[test]
    fn test_pinned_and_soft_hold_keys() {
        let pinned = ReferenceTables::new(Retention::Pinned);
        let soft = ReferenceTables::new(Retention::Soft);
        let (a, b) = (class("demo.A"), class("demo.B"));
        let a_id = a.id();
        pinned.put_canonical(&a, wrapper("A"));
        soft.put_canonical(&b, wrapper("B"));
        drop(a);
        drop(b);

        pinned.memory_pressure();
        assert_eq!(pinned.stats().canonical, 1);
        soft.memory_pressure();
        assert_eq!(soft.stats().canonical, 0);

        pinned.begin_canonical(Stability::Plain);
        match pinned.next() {
            Some(TableItem::Canonical { class, .. }) => assert_eq!(class.id(), a_id),
            other => panic!("unexpected {other:?}"),
        }
        pinned.end();
        pinned.force_cleanup();
        assert_eq!(pinned.stats().canonical, 0);
    }

    #[test]
    fn test_plain_iteration_skips_reclaimed() {
        let tables = ReferenceTables::new(Retention::Weak);
        let keep: Vec<_> = (0..3).map(|i| class(&format!("demo.K{i}"))).collect();
        for c in &keep {
            tables.put_canonical(c, wrapper(c.name()));
        }
        let doomed = class("demo.Doomed");
        tables.put_canonical(&doomed, wrapper("Doomed"));

        tables.begin_canonical(Stability::Plain);
        drop(doomed);
        let items = drain_items(&tables);
        tables.end();
        assert_eq!(items.len(), 3);
        assert!(items
            .iter()
            .all(|i| matches!(i, TableItem::Canonical { class, .. } if class.name() != "demo.Doomed")));
        assert_eq!(tables.stats().canonical, 3);
    }

    #[test]
    fn test_stable_iteration_defers_purge() {
        let tables = ReferenceTables::new(Retention::Weak);
        let a = class("demo.StableA");
        let b = class("demo.StableB");
        tables.put_canonical(&a, wrapper("A"));
        tables.put_canonical(&b, wrapper("B"));

        tables.begin_canonical(Stability::GlobalStable);
        drop(b);
        let items = drain_items(&tables);
        assert_eq!(items.len(), 1);
        // Purge was deferred while the iteration was open
        assert_eq!(tables.state.lock().canonical.len(), 2);
        tables.end();
        assert_eq!(tables.stats().canonical, 1);
    }

    #[test]
    fn test_flush_current_prunes_adapter_maps() {
        let tables = ReferenceTables::new(Retention::Weak);
        let source = class("demo.Source").instantiate(&[]).unwrap();
        let adapter = class("demo.Adapter").instantiate(&[]).unwrap();
        tables.put_adapter(&source, "demo.ClickListener", adapter.clone());
        assert!(tables.get_adapter(&source, "demo.ClickListener").unwrap().ptr_eq(&adapter));

        tables.begin_adapters(Stability::Plain);
        assert!(matches!(tables.next(), Some(TableItem::Adapter { .. })));
        tables.flush_current();
        assert!(tables.next().is_none());
        tables.end();
        assert_eq!(tables.state.lock().adapters.len(), 0);
    }

    #[test]
    fn test_adapter_entry_dropped_with_source() {
        let tables = ReferenceTables::new(Retention::Weak);
        let source = class("demo.Src").instantiate(&[]).unwrap();
        let adapter = class("demo.Ad").instantiate(&[]).unwrap();
        tables.put_adapter(&source, "L", adapter);
        drop(source);
        assert_eq!(tables.stats().adapters, 0);
        assert!(tables.state.lock().adapters.is_empty());
    }

    #[test]
    fn test_adapter_class_does_not_pin_listener() {
        let tables = ReferenceTables::new(Retention::Weak);
        let listener = HostClassBuilder::interface("demo.ClickListener").build().unwrap();
        let adapter = HostClassBuilder::new("demo.ClickAdapter")
            .implements(Arc::clone(&listener))
            .constructor(HostConstructor::new(vec![]))
            .build()
            .unwrap();
        tables.put_adapter_class(&listener, Arc::clone(&adapter));
        assert!(Arc::ptr_eq(&tables.get_adapter_class(&listener).unwrap(), &adapter));

        let gone = Arc::downgrade(&listener);
        drop(adapter);
        assert!(tables.get_adapter_class(&listener).is_none());
        assert_eq!(tables.stats().adapter_classes, 0);
        drop(listener);
        assert!(gone.upgrade().is_none());
        tables.force_cleanup();
        assert!(tables.state.lock().adapter_classes.is_empty());
    }
}
