//! A thread-safe set of observers that does not keep them alive.
//!
//! # Design
//! Entries are keyed by the observer's `Arc` data pointer and hold a `Weak`
//! to it plus a payload (the callback and interest for delegates). Liveness
//! is checked with `Weak::upgrade` while iterating; dead entries are pruned
//! at that point, so nobody has to unregister an observer before dropping it.
//!
//! One registration per observer identity: adding an observer that is
//! already present replaces its payload and keeps its position.
//!
//! Visitors run after the lock is released, so they may add or remove
//! registrations themselves.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

struct Entry<T: ?Sized, P> {
    key: usize,
    target: Weak<T>,
    payload: P,
}

pub struct WeakRegistry<T: ?Sized, P> {
    entries: Mutex<Vec<Entry<T, P>>>,
}

fn identity<T: ?Sized>(observer: &Arc<T>) -> usize {
    Arc::as_ptr(observer) as *const () as usize
}

impl<T: ?Sized, P: Clone> WeakRegistry<T, P> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Register `observer`. Returns `true` when it was not registered yet;
    /// otherwise the stored payload is replaced and `false` is returned.
    pub fn add(&self, observer: &Arc<T>, payload: P) -> bool {
        let key = identity(observer);
        let mut entries = self.entries.lock();
        entries.retain(|e| e.target.strong_count() > 0);
        if let Some(entry) = entries.iter_mut().find(|e| e.key == key) {
            entry.payload = payload;
            return false;
        }
        entries.push(Entry {
            key,
            target: Arc::downgrade(observer),
            payload,
        });
        true
    }

    /// Returns `true` if `observer` was registered.
    pub fn remove(&self, observer: &Arc<T>) -> bool {
        let key = identity(observer);
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| e.key != key);
        entries.len() != before
    }

    pub fn contains(&self, observer: &Arc<T>) -> bool {
        let key = identity(observer);
        self.entries
            .lock()
            .iter()
            .any(|e| e.key == key && e.target.strong_count() > 0)
    }

    /// Number of registered observers that are still alive.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.target.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop entries whose observer is gone. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| e.target.strong_count() > 0);
        before - entries.len()
    }

    /// Visit every live observer in registration order.
    pub fn for_each_live<F>(&self, mut visit: F)
    where
        F: FnMut(Arc<T>, &P),
    {
        let live: Vec<(Arc<T>, P)> = {
            let mut entries = self.entries.lock();
            let mut live = Vec::with_capacity(entries.len());
            entries.retain(|e| match e.target.upgrade() {
                Some(observer) => {
                    live.push((observer, e.payload.clone()));
                    true
                }
                None => false,
            });
            live
        };
        for (observer, payload) in live {
            visit(observer, &payload);
        }
    }
}

impl<T: ?Sized, P: Clone> Default for WeakRegistry<T, P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    trait Listener: Send + Sync {
        fn name(&self) -> &str;
    }

    struct Named(String);

    impl Listener for Named {
        fn name(&self) -> &str {
            &self.0
        }
    }

    fn listener(name: &str) -> Arc<dyn Listener> {
        Arc::new(Named(name.to_string()))
    }

    fn names(registry: &WeakRegistry<dyn Listener, u32>) -> Vec<(String, u32)> {
        let mut out = Vec::new();
        registry.for_each_live(|l, p| out.push((l.name().to_string(), *p)));
        out
    }

    #[test]
    fn dropped_observers_are_skipped() {
        let registry = WeakRegistry::new();
        let a = listener("a");
        let b = listener("b");
        registry.add(&a, 1);
        registry.add(&b, 2);
        drop(a);

        assert_eq!(names(&registry), vec![("b".to_string(), 2)]);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.prune(), 0, "iteration already pruned the dead entry");
    }

    #[test]
    fn registry_does_not_extend_lifetime() {
        let registry = WeakRegistry::<dyn Listener, ()>::new();
        let a = listener("a");
        registry.add(&a, ());
        assert_eq!(Arc::strong_count(&a), 1);
        let weak = Arc::downgrade(&a);
        drop(a);
        assert!(weak.upgrade().is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn re_adding_replaces_payload_and_keeps_position() {
        let registry = WeakRegistry::new();
        let a = listener("a");
        let b = listener("b");
        assert!(registry.add(&a, 1));
        assert!(registry.add(&b, 2));
        assert!(!registry.add(&a, 10));

        assert_eq!(
            names(&registry),
            vec![("a".to_string(), 10), ("b".to_string(), 2)]
        );
    }

    #[test]
    fn remove_excludes_observer() {
        let registry = WeakRegistry::new();
        let a = listener("a");
        registry.add(&a, 1);
        assert!(registry.contains(&a));
        assert!(registry.remove(&a));
        assert!(!registry.remove(&a));
        assert!(!registry.contains(&a));
        assert!(names(&registry).is_empty());
    }

    #[test]
    fn visitor_may_mutate_registry() {
        let registry = Arc::new(WeakRegistry::new());
        let a = listener("a");
        let b = listener("b");
        registry.add(&a, 1);
        registry.add(&b, 2);

        let visits = AtomicUsize::new(0);
        registry.for_each_live(|l, _| {
            visits.fetch_add(1, Ordering::SeqCst);
            registry.remove(&l);
        });
        assert_eq!(visits.load(Ordering::SeqCst), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn concurrent_add_remove_and_iterate() {
        let registry: Arc<WeakRegistry<dyn Listener, u32>> = Arc::new(WeakRegistry::new());
        let keep: Vec<Arc<dyn Listener>> = (0..8).map(|i| listener(&i.to_string())).collect();

        let handles: Vec<_> = keep
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, l)| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for round in 0..200 {
                        registry.add(&l, round);
                        registry.for_each_live(|_, _| {});
                        if i % 2 == 0 {
                            registry.remove(&l);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 4);
    }
}
