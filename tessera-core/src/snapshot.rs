//! Copy-on-write snapshots for shared registries.
//!
//! Readers call [`SnapshotCell::load`] and get an `Arc` to an immutable view
//! without taking any lock. Writers serialize on a mutex, clone the current
//! view, modify the clone and publish it with a single atomic swap, so an
//! in-flight dispatch never observes a half-applied registration.

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::sync::Arc;

pub struct SnapshotCell<T> {
    current: ArcSwap<T>,
    writer: Mutex<()>,
}

impl<T> SnapshotCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            current: ArcSwap::from_pointee(value),
            writer: Mutex::new(()),
        }
    }

    /// Current published view.
    #[inline]
    pub fn load(&self) -> Arc<T> {
        self.current.load_full()
    }

    /// Replace the published view, discarding the previous one.
    pub fn store(&self, value: T) {
        let _guard = self.writer.lock();
        self.current.store(Arc::new(value));
    }
}

impl<T: Clone> SnapshotCell<T> {
    /// Apply `f` to a private copy and publish it when `f` succeeds.
    ///
    /// On error nothing is published and the previous view stays current.
    pub fn update<F, R, E>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut T) -> Result<R, E>,
    {
        let _guard = self.writer.lock();
        let mut next = T::clone(&self.current.load());
        let result = f(&mut next)?;
        self.current.store(Arc::new(next));
        Ok(result)
    }

    /// Infallible [`update`](Self::update).
    pub fn modify<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        let _guard = self.writer.lock();
        let mut next = T::clone(&self.current.load());
        let result = f(&mut next);
        self.current.store(Arc::new(next));
        result
    }
}

impl<T: Default> Default for SnapshotCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for SnapshotCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SnapshotCell")
            .field(&*self.current.load())
            .finish()
    }
}
