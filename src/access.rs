//! Access Serializer: reader/writer discipline for a document's internal fields
//!
//! Readers run concurrently, writers are exclusive. Access is closure-scoped
//! so a guard can never be held across an await point.

use std::sync::{PoisonError, RwLock};

#[derive(Debug, Default)]
pub struct AccessSerializer<T> {
    inner: RwLock<T>,
}

impl<T> AccessSerializer<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: RwLock::new(value),
        }
    }

    /// Run `reader` against a consistent view of the guarded value
    pub fn read<R>(&self, reader: impl FnOnce(&T) -> R) -> R {
        // Writers replace whole values, so a poisoned lock still holds a coherent state
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        reader(&guard)
    }

    /// Run `writer` with exclusive access to the guarded value
    pub fn write<R>(&self, writer: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        writer(&mut guard)
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}
