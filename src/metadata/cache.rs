//! Identity caches and lazily materialized slots.
//!
//! Every node a module materializes is owned here or by a slot of its parent node.
//! [`RowCache`] is the row-id indexed arena used for token identity: slot `rid - 1` is
//! empty until the row is first materialized, and every later dereference returns the same
//! `Arc`. [`LazySlot`] holds one lazily read collection or property of a node.

use std::sync::{Arc, Mutex, OnceLock};

use crate::{metadata::token::Token, Error, Result};

enum SlotState<T> {
    Uninitialized,
    Materializing,
    Cached(Arc<T>),
}

/// A lazily filled value with an explicit `Uninitialized → Materializing → Cached` life
/// cycle.
///
/// A failed materialization returns the slot to `Uninitialized`, so no partially filled
/// value is ever observable. Re-entering a slot from its own materializer is reported as
/// [`Error::ReentrantMaterialization`]. Callers serialize materialization through the
/// module guard before calling [`LazySlot::get_or_materialize`], which is what keeps a
/// second thread from observing `Materializing`.
pub struct LazySlot<T> {
    state: Mutex<SlotState<T>>,
}

impl<T> Default for LazySlot<T> {
    fn default() -> Self {
        LazySlot {
            state: Mutex::new(SlotState::Uninitialized),
        }
    }
}

impl<T> LazySlot<T> {
    /// A slot that has not been read yet
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A slot already holding `value`
    #[must_use]
    pub fn with_value(value: T) -> Self {
        LazySlot {
            state: Mutex::new(SlotState::Cached(Arc::new(value))),
        }
    }

    /// The cached value, if materialized
    pub fn get(&self) -> Option<Arc<T>> {
        match &*self.state.lock().ok()? {
            SlotState::Cached(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// True once the value is cached
    pub fn is_cached(&self) -> bool {
        self.get().is_some()
    }

    /// Return the cached value or run `materialize` to produce it.
    ///
    /// `owner` only labels the re-entrancy error.
    ///
    /// # Errors
    /// Returns [`Error::ReentrantMaterialization`] when called again while `materialize`
    /// is still running, or whatever `materialize` fails with.
    pub fn get_or_materialize<F>(&self, owner: Token, materialize: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Result<T>,
    {
        {
            let mut state = lock!(self.state)?;
            match &*state {
                SlotState::Cached(value) => return Ok(value.clone()),
                SlotState::Materializing => return Err(Error::ReentrantMaterialization(owner)),
                SlotState::Uninitialized => *state = SlotState::Materializing,
            }
        }

        log::trace!("materializing slot of {}", owner);
        let result = materialize();

        let mut state = lock!(self.state)?;
        match result {
            Ok(value) => {
                let value = Arc::new(value);
                *state = SlotState::Cached(value.clone());
                Ok(value)
            }
            Err(error) => {
                *state = SlotState::Uninitialized;
                Err(error)
            }
        }
    }
}

/// Row-id indexed identity cache for one table.
pub struct RowCache<T> {
    slots: Vec<OnceLock<Arc<T>>>,
}

impl<T> RowCache<T> {
    /// A cache with one empty slot per row
    #[must_use]
    pub fn new(rows: u32) -> Self {
        RowCache {
            slots: (0..rows).map(|_| OnceLock::new()).collect(),
        }
    }

    /// Number of rows covered
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if the table has no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The node cached for `rid`, if any
    #[must_use]
    pub fn get(&self, rid: u32) -> Option<Arc<T>> {
        self.slot(rid)?.get().cloned()
    }

    /// Cache `value` for `rid`, returning whichever node ends up cached.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for a row id outside the table.
    pub fn insert(&self, rid: u32, value: Arc<T>) -> Result<Arc<T>> {
        let slot = self
            .slot(rid)
            .ok_or_else(|| malformed_error!("Row {} outside of cache with {} rows", rid, self.len()))?;
        Ok(slot.get_or_init(|| value).clone())
    }

    fn slot(&self, rid: u32) -> Option<&OnceLock<Arc<T>>> {
        if rid == 0 {
            return None;
        }
        self.slots.get(rid as usize - 1)
    }
}

/// One map built by a single table scan, guarded so the scan runs at most once.
pub struct ScanMap<T> {
    value: OnceLock<T>,
}

impl<T> Default for ScanMap<T> {
    fn default() -> Self {
        ScanMap {
            value: OnceLock::new(),
        }
    }
}

impl<T> ScanMap<T> {
    /// Return the map, running `scan` if it has not been built yet.
    ///
    /// # Errors
    /// Whatever `scan` fails with; the map stays unbuilt in that case.
    pub fn get_or_scan<F>(&self, scan: F) -> Result<&T>
    where
        F: FnOnce() -> Result<T>,
    {
        if let Some(value) = self.value.get() {
            return Ok(value);
        }

        let value = scan()?;
        Ok(self.value.get_or_init(|| value))
    }

    /// True once the scan has run
    #[must_use]
    pub fn is_built(&self) -> bool {
        self.value.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn slot_materializes_once() {
        let slot: LazySlot<Vec<u32>> = LazySlot::new();
        let calls = Cell::new(0);

        let first = slot
            .get_or_materialize(Token::new(0x0200_0001), || {
                calls.set(calls.get() + 1);
                Ok(vec![1, 2, 3])
            })
            .unwrap();
        let second = slot
            .get_or_materialize(Token::new(0x0200_0001), || {
                calls.set(calls.get() + 1);
                Ok(vec![4])
            })
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn slot_resets_after_failure() {
        let slot: LazySlot<u32> = LazySlot::new();
        let token = Token::new(0x0400_0001);

        assert!(slot
            .get_or_materialize(token, || Err(malformed_error!("broken")))
            .is_err());
        assert!(!slot.is_cached());
        assert_eq!(*slot.get_or_materialize(token, || Ok(7)).unwrap(), 7);
    }

    #[test]
    fn slot_detects_reentry() {
        let slot: LazySlot<u32> = LazySlot::new();
        let token = Token::new(0x0200_0002);

        let result = slot.get_or_materialize(token, || {
            match slot.get_or_materialize(token, || Ok(1)) {
                Err(Error::ReentrantMaterialization(t)) if t == token => Ok(2),
                _ => Err(malformed_error!("re-entry not detected")),
            }
        });
        assert_eq!(*result.unwrap(), 2);
    }

    #[test]
    fn row_cache_identity() {
        let cache: RowCache<String> = RowCache::new(2);

        assert!(cache.get(1).is_none());
        let first = cache.insert(1, Arc::new("a".to_string())).unwrap();
        let again = cache.insert(1, Arc::new("b".to_string())).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(*cache.get(1).unwrap(), "a");

        assert!(cache.insert(0, Arc::new(String::new())).is_err());
        assert!(cache.insert(3, Arc::new(String::new())).is_err());
    }

    #[test]
    fn scan_map_runs_once() {
        let map: ScanMap<Vec<u32>> = ScanMap::default();
        let calls = Cell::new(0);

        for _ in 0..3 {
            let value = map
                .get_or_scan(|| {
                    calls.set(calls.get() + 1);
                    Ok(vec![1])
                })
                .unwrap();
            assert_eq!(value, &vec![1]);
        }
        assert_eq!(calls.get(), 1);
    }
}
