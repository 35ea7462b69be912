//! Typed per-session extension data.
//!
//! Subsystems outside the core (policy, address pools, shapers) need to
//! hang their own state off a session. Each one picks a type, implements
//! [`SessionExtension`] for it, and stores at most one value of that type
//! per session. When the session is freed every remaining extension gets
//! its [`release`](SessionExtension::release) call exactly once.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use accel_protocol::SessionId;

/// State a subsystem attaches to a session.
pub trait SessionExtension: Send + 'static {
    /// Called once when the session is freed with this extension still
    /// attached. Extensions removed earlier are not released.
    fn release(&mut self, _session_id: SessionId) {}
}

trait ErasedExtension: Send {
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
    fn release(&mut self, session_id: SessionId);
}

impl<T: SessionExtension> ErasedExtension for T {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn release(&mut self, session_id: SessionId) {
        SessionExtension::release(self, session_id);
    }
}

/// The extension map of one session, keyed by extension type.
#[derive(Default)]
pub(crate) struct Extensions {
    map: HashMap<TypeId, Box<dyn ErasedExtension>>,
}

impl Extensions {
    pub(crate) fn insert<T: SessionExtension>(&mut self, value: T) -> Option<T> {
        self.map
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.into_any().downcast::<T>().ok())
            .map(|old| *old)
    }

    pub(crate) fn get_mut<T: SessionExtension>(&mut self) -> Option<&mut T> {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|ext| ext.as_any_mut().downcast_mut::<T>())
    }

    pub(crate) fn remove<T: SessionExtension>(&mut self) -> Option<T> {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|ext| ext.into_any().downcast::<T>().ok())
            .map(|ext| *ext)
    }

    pub(crate) fn contains<T: SessionExtension>(&self) -> bool {
        self.map.contains_key(&TypeId::of::<T>())
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    /// Releases and drops every extension.
    pub(crate) fn release_all(&mut self, session_id: SessionId) {
        for (_, mut ext) in self.map.drain() {
            ext.release(session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Debug, PartialEq)]
    struct PoolTag(&'static str);
    impl SessionExtension for PoolTag {}

    struct Releasing(Arc<AtomicUsize>);
    impl SessionExtension for Releasing {
        fn release(&mut self, _session_id: SessionId) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_insert_replaces_and_returns_previous_value() {
        let mut exts = Extensions::default();
        assert!(exts.insert(PoolTag("a")).is_none());
        assert_eq!(exts.insert(PoolTag("b")), Some(PoolTag("a")));
        assert_eq!(exts.get_mut::<PoolTag>(), Some(&mut PoolTag("b")));
        assert_eq!(exts.len(), 1);
    }

    #[test]
    fn test_remove_does_not_release() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut exts = Extensions::default();
        exts.insert(Releasing(Arc::clone(&released)));

        assert!(exts.remove::<Releasing>().is_some());
        exts.release_all(SessionId(1));

        assert_eq!(released.load(Ordering::SeqCst), 0);
        assert!(!exts.contains::<Releasing>());
    }

    #[test]
    fn test_release_all_releases_each_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut exts = Extensions::default();
        exts.insert(Releasing(Arc::clone(&released)));
        exts.insert(PoolTag("x"));

        exts.release_all(SessionId(1));
        exts.release_all(SessionId(1));

        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(exts.len(), 0);
    }
}
