//! A mutual-exclusion guard that the owning thread may re-enter.
//!
//! Every module serializes its structural reads through one [`ReentrantLock`]. Decoding a
//! signature routinely resolves further tokens of the same module, so the thread already
//! holding the lock has to be able to take it again; any other thread blocks until the
//! outermost guard is dropped.

use std::{
    sync::{Condvar, Mutex},
    thread::{self, ThreadId},
};

use crate::Result;

#[derive(Default)]
struct LockState {
    owner: Option<ThreadId>,
    depth: usize,
}

/// Re-entrant lock built on [`Mutex`] and [`Condvar`].
#[derive(Default)]
pub struct ReentrantLock {
    state: Mutex<LockState>,
    released: Condvar,
}

/// Held while a thread owns a [`ReentrantLock`]; dropping the outermost guard releases it.
pub struct ReentrantGuard<'a> {
    lock: &'a ReentrantLock,
}

impl ReentrantLock {
    /// Create an unowned lock
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock, blocking while another thread owns it.
    ///
    /// # Errors
    /// Returns [`crate::Error::LockError`] if the internal mutex is poisoned.
    pub fn lock(&self) -> Result<ReentrantGuard<'_>> {
        let me = thread::current().id();
        let mut state = lock!(self.state)?;

        loop {
            match state.owner {
                None => {
                    state.owner = Some(me);
                    state.depth = 1;
                    break;
                }
                Some(owner) if owner == me => {
                    state.depth += 1;
                    break;
                }
                Some(_) => {
                    state = self
                        .released
                        .wait(state)
                        .map_err(|_| crate::Error::LockError)?;
                }
            }
        }

        Ok(ReentrantGuard { lock: self })
    }

    /// Nesting depth held by the calling thread, 0 if it does not own the lock
    #[must_use]
    pub fn held_depth(&self) -> usize {
        match self.state.lock() {
            Ok(state) if state.owner == Some(thread::current().id()) => state.depth,
            _ => 0,
        }
    }
}

impl Drop for ReentrantGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.lock.state.lock() {
            state.depth = state.depth.saturating_sub(1);
            if state.depth == 0 {
                state.owner = None;
                self.lock.released.notify_one();
            }
        }
    }
}
