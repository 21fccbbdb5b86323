//! Live handler registry with hot reload.
//!
//! The method map is held behind an [`ArcSwap`]. Every dispatch loads one
//! snapshot and works with it until the call is done; writers build a new
//! map and swap it in whole. A dispatch in flight therefore never sees a
//! half-applied update, and readers never block.
//!
//! # Example
//!
//! ```
//! use wirecall::handler::{HandlerEntry, HandlerMap, HandlerRegistry, UpdateMode};
//! use wirecall::HostValue;
//!
//! let mut initial = HandlerMap::new();
//! initial.insert("ping".to_string(), HandlerEntry::from_sync(|_| Ok(HostValue::from("pong"))));
//! let registry = HandlerRegistry::new(initial);
//!
//! let mut extra = HandlerMap::new();
//! extra.insert("echo".to_string(), HandlerEntry::from_sync(|mut p| Ok(p.remove(0))));
//! registry.update(extra, UpdateMode::Merge);
//!
//! assert_eq!(registry.names(), vec!["echo", "ping"]);
//! ```

use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;

use super::dispatch::DispatchOptions;
use super::system::system_handlers;
use super::{HandlerEntry, HandlerMap};

/// How [`HandlerRegistry::update`] combines the new handlers with the live map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Swap in the new map, dropping everything else.
    Replace,
    /// Union the new map over the live one; new entries win on collision.
    Merge,
}

/// Registry mapping method names to handlers.
///
/// Cheap to clone; clones share the same live map.
#[derive(Clone)]
pub struct HandlerRegistry {
    /// Live method map, atomically swappable.
    live: Arc<ArcSwap<HandlerMap>>,
    /// `system.*` handlers, re-applied after every write when enabled.
    system: Option<Arc<HandlerMap>>,
}

impl HandlerRegistry {
    /// Create a registry without system handlers.
    pub fn new(handlers: HandlerMap) -> Self {
        Self {
            live: Arc::new(ArcSwap::from_pointee(handlers)),
            system: None,
        }
    }

    /// Create a registry that also serves `system.listMethods`,
    /// `system.methodHelp`, `system.methodSignature` and `system.multicall`.
    ///
    /// The system handlers read this registry's live map, so introspection
    /// always reflects the current state. They hold only a weak reference;
    /// once every clone of the registry is dropped they report a fault.
    pub fn with_system_handlers(handlers: HandlerMap, options: DispatchOptions) -> Self {
        let mut registry = Self::new(handlers);
        registry.system = Some(Arc::new(system_handlers(registry.downgrade(), options)));

        registry.live.rcu(|current| {
            let mut next = HandlerMap::clone(current);
            registry.overlay_system(&mut next);
            next
        });
        registry
    }

    /// Returns true if system handlers are part of this registry.
    pub fn system_enabled(&self) -> bool {
        self.system.is_some()
    }

    /// Current snapshot of the method map.
    pub fn snapshot(&self) -> Arc<HandlerMap> {
        self.live.load_full()
    }

    /// Look up a handler entry in the current snapshot.
    pub fn get(&self, name: &str) -> Option<HandlerEntry> {
        self.live.load().get(name).cloned()
    }

    /// Returns true if `name` is currently registered.
    pub fn contains(&self, name: &str) -> bool {
        self.live.load().contains_key(name)
    }

    /// Sorted method names in the current snapshot.
    pub fn names(&self) -> Vec<String> {
        self.live.load().keys().cloned().collect()
    }

    /// Number of registered methods, system methods included.
    pub fn len(&self) -> usize {
        self.live.load().len()
    }

    /// Returns true if no method is registered.
    pub fn is_empty(&self) -> bool {
        self.live.load().is_empty()
    }

    /// Replace or merge the live map.
    ///
    /// System handlers are re-applied afterwards, so neither a blanket
    /// replace nor a colliding name can shadow them.
    pub fn update(&self, handlers: HandlerMap, mode: UpdateMode) {
        match mode {
            UpdateMode::Replace => {
                let mut next = handlers;
                self.overlay_system(&mut next);
                self.live.store(Arc::new(next));
            }
            UpdateMode::Merge => {
                self.live.rcu(|current| {
                    let mut next = HandlerMap::clone(current);
                    next.extend(handlers.iter().map(|(k, v)| (k.clone(), v.clone())));
                    self.overlay_system(&mut next);
                    next
                });
            }
        }

        tracing::debug!(?mode, methods = self.len(), "handler registry updated");
    }

    /// Remove one method.
    ///
    /// Returns true if the method was registered and is now gone. System
    /// methods cannot be removed while system handlers are enabled.
    pub fn remove(&self, name: &str) -> bool {
        let previous = self.live.rcu(|current| {
            let mut next = HandlerMap::clone(current);
            next.remove(name);
            self.overlay_system(&mut next);
            next
        });

        let removed = previous.contains_key(name) && !self.is_system(name);
        tracing::debug!(method = name, removed, "handler removal");
        removed
    }

    /// Weak handle for handlers that need to read the registry they live in.
    pub(crate) fn downgrade(&self) -> WeakRegistry {
        WeakRegistry {
            live: Arc::downgrade(&self.live),
        }
    }

    fn is_system(&self, name: &str) -> bool {
        self.system
            .as_ref()
            .map_or(false, |system| system.contains_key(name))
    }

    fn overlay_system(&self, map: &mut HandlerMap) {
        if let Some(system) = &self.system {
            map.extend(system.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }
}

/// Non-owning view of a registry's live map.
#[derive(Clone)]
pub(crate) struct WeakRegistry {
    live: Weak<ArcSwap<HandlerMap>>,
}

impl WeakRegistry {
    /// Current snapshot, or `None` once the registry is gone.
    pub(crate) fn snapshot(&self) -> Option<Arc<HandlerMap>> {
        self.live.upgrade().map(|live| live.load_full())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::system::{LIST_METHODS, MULTICALL};
    use crate::value::HostValue;

    fn entry(tag: &'static str) -> HandlerEntry {
        HandlerEntry::from_sync(move |_| Ok(HostValue::from(tag)))
    }

    fn map(names: &[(&str, &'static str)]) -> HandlerMap {
        names
            .iter()
            .map(|(name, tag)| (name.to_string(), entry(tag)))
            .collect()
    }

    async fn call(registry: &HandlerRegistry, name: &str) -> HostValue {
        let entry = registry.get(name).unwrap();
        entry.handler().call(vec![]).await.unwrap()
    }

    #[test]
    fn test_new_registry() {
        let registry = HandlerRegistry::new(map(&[("a", "1"), ("b", "2")]));

        assert_eq!(registry.names(), vec!["a", "b"]);
        assert!(registry.contains("a"));
        assert!(!registry.system_enabled());
        assert!(registry.get("missing").is_none());
    }

    #[tokio::test]
    async fn test_replace_swaps_whole_map() {
        let registry = HandlerRegistry::new(map(&[("a", "1"), ("b", "2")]));

        registry.update(map(&[("c", "3")]), UpdateMode::Replace);

        assert_eq!(registry.names(), vec!["c"]);
        assert_eq!(call(&registry, "c").await, HostValue::from("3"));
    }

    #[tokio::test]
    async fn test_merge_new_entries_win() {
        let registry = HandlerRegistry::new(map(&[("a", "old"), ("b", "keep")]));

        registry.update(map(&[("a", "new"), ("c", "added")]), UpdateMode::Merge);

        assert_eq!(registry.names(), vec!["a", "b", "c"]);
        assert_eq!(call(&registry, "a").await, HostValue::from("new"));
        assert_eq!(call(&registry, "b").await, HostValue::from("keep"));
    }

    #[test]
    fn test_remove() {
        let registry = HandlerRegistry::new(map(&[("a", "1"), ("b", "2")]));

        assert!(registry.remove("a"));
        assert!(!registry.remove("a"));
        assert_eq!(registry.names(), vec!["b"]);
    }

    #[test]
    fn test_remove_reports_from_the_swapped_map() {
        let registry =
            HandlerRegistry::with_system_handlers(map(&[("a", "1")]), DispatchOptions::default());

        assert!(registry.remove("a"));
        registry.update(map(&[("a", "2")]), UpdateMode::Merge);
        assert!(registry.contains("a"));
        assert!(registry.remove("a"));
        assert!(!registry.remove("missing"));
        assert!(!registry.remove(MULTICALL));
    }

    #[test]
    fn test_snapshot_is_stable_across_updates() {
        let registry = HandlerRegistry::new(map(&[("a", "1")]));
        let before = registry.snapshot();

        registry.update(map(&[("z", "2")]), UpdateMode::Replace);

        assert!(before.contains_key("a"));
        assert!(!before.contains_key("z"));
        assert!(registry.snapshot().contains_key("z"));
    }

    #[test]
    fn test_system_handlers_survive_replace_and_remove() {
        let registry =
            HandlerRegistry::with_system_handlers(map(&[("a", "1")]), DispatchOptions::default());
        assert!(registry.contains(LIST_METHODS));
        assert!(registry.contains(MULTICALL));

        registry.update(map(&[("b", "2")]), UpdateMode::Replace);
        assert!(registry.contains(LIST_METHODS));
        assert!(!registry.contains("a"));

        assert!(!registry.remove(LIST_METHODS));
        assert!(registry.contains(LIST_METHODS));
    }

    #[tokio::test]
    async fn test_system_handlers_cannot_be_shadowed_by_merge() {
        let registry =
            HandlerRegistry::with_system_handlers(map(&[("a", "1")]), DispatchOptions::default());

        registry.update(map(&[(LIST_METHODS, "shadow")]), UpdateMode::Merge);

        let listed = call(&registry, LIST_METHODS).await;
        assert_ne!(listed, HostValue::from("shadow"));
    }

    #[test]
    fn test_weak_registry_expires() {
        let registry = HandlerRegistry::new(map(&[("a", "1")]));
        let weak = registry.downgrade();
        assert!(weak.snapshot().is_some());

        drop(registry);
        assert!(weak.snapshot().is_none());
    }
}
