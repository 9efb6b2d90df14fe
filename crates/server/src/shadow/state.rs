//! Analysis state attached to shadow entries
//!
//! Every shadow entry carries one slot an analysis can use to keep its own
//! data about the object between events. Entries handed to analyses are
//! clones of the table's entry; the slot is shared between all clones, so
//! a value stored while handling one event is visible in every later one
//! until the object is freed.
//!
//! The slot is typed at runtime: reading it back as a different type than
//! was stored yields `None`.
//!
//! # Example
//!
//! ```
//! use shadowvm_server::shadow::ShadowState;
//!
//! let state = ShadowState::default();
//! *state.get_or_insert_with(|| 0u32).unwrap() += 1;
//! *state.get_or_insert_with(|| 0u32).unwrap() += 1;
//! assert_eq!(state.get::<u32>(), Some(2));
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

type Slot = Option<Box<dyn Any + Send>>;

/// Shared state slot of one shadow entry
///
/// Guards returned by [`get_mut`](Self::get_mut) and
/// [`get_or_insert_with`](Self::get_or_insert_with) hold the slot locked;
/// touching the same slot again while one is alive deadlocks.
#[derive(Clone, Default)]
pub struct ShadowState(Arc<Mutex<Slot>>);

impl ShadowState {
    /// Whether a value is stored
    pub fn is_set(&self) -> bool {
        self.0.lock().is_some()
    }

    /// Copy of the stored value, if it is a `T`
    pub fn get<T: Any + Clone>(&self) -> Option<T> {
        self.0.lock().as_deref()?.downcast_ref::<T>().cloned()
    }

    /// Locked access to the stored value, if it is a `T`
    pub fn get_mut<T: Any>(&self) -> Option<MappedMutexGuard<'_, T>> {
        MutexGuard::try_map(self.0.lock(), |slot| {
            slot.as_deref_mut()?.downcast_mut::<T>()
        })
        .ok()
    }

    /// Store `value`, returning the previous value
    pub fn set<T: Any + Send>(&self, value: T) -> Option<Box<dyn Any + Send>> {
        self.0.lock().replace(Box::new(value))
    }

    /// Store `value` unless a value is already stored
    ///
    /// Returns `true` if `value` was stored.
    pub fn set_if_absent<T: Any + Send>(&self, value: T) -> bool {
        let mut slot = self.0.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(Box::new(value));
        true
    }

    /// Locked access to the stored `T`, storing `init()` first if empty
    ///
    /// `init` runs at most once and only when nothing is stored. Returns
    /// `None` if a value of another type is already stored.
    pub fn get_or_insert_with<T, F>(&self, init: F) -> Option<MappedMutexGuard<'_, T>>
    where
        T: Any + Send,
        F: FnOnce() -> T,
    {
        MutexGuard::try_map(self.0.lock(), |slot| {
            let value: &mut (dyn Any + Send) = slot.get_or_insert_with(|| Box::new(init()));
            value.downcast_mut::<T>()
        })
        .ok()
    }

    /// Remove and return the stored value
    pub fn take(&self) -> Option<Box<dyn Any + Send>> {
        self.0.lock().take()
    }

    /// Whether `self` and `other` are the same slot
    #[inline]
    pub fn same_slot(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ShadowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowState")
            .field("set", &self.is_set())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_the_slot() {
        let state = ShadowState::default();
        let copy = state.clone();
        assert!(state.same_slot(&copy));

        copy.set(String::from("seen"));
        assert_eq!(state.get::<String>().as_deref(), Some("seen"));
        assert!(!ShadowState::default().same_slot(&state));
    }

    #[test]
    fn test_wrong_type_reads_none() {
        let state = ShadowState::default();
        state.set(7u64);
        assert_eq!(state.get::<u32>(), None);
        assert!(state.get_mut::<u32>().is_none());
        assert!(state.get_or_insert_with(|| 0u32).is_none());
        assert_eq!(state.get::<u64>(), Some(7));
    }

    #[test]
    fn test_set_if_absent_keeps_first() {
        let state = ShadowState::default();
        assert!(state.set_if_absent(1i32));
        assert!(!state.set_if_absent(2i32));
        assert_eq!(state.get::<i32>(), Some(1));
    }

    #[test]
    fn test_set_returns_previous() {
        let state = ShadowState::default();
        assert!(state.set(1i32).is_none());
        let previous = state.set("two").unwrap();
        assert_eq!(previous.downcast_ref::<i32>(), Some(&1));
        assert_eq!(state.get::<&str>(), Some("two"));
    }

    #[test]
    fn test_get_or_insert_runs_init_once() {
        let state = ShadowState::default();
        let mut calls = 0;
        for _ in 0..3 {
            let mut seen = state
                .get_or_insert_with(|| {
                    calls += 1;
                    Vec::<u8>::new()
                })
                .unwrap();
            seen.push(1);
        }
        assert_eq!(calls, 1);
        assert_eq!(state.get::<Vec<u8>>(), Some(vec![1, 1, 1]));
    }

    #[test]
    fn test_take_empties_the_slot() {
        let state = ShadowState::default();
        state.set(5u8);
        assert!(state.take().is_some());
        assert!(!state.is_set());
        assert!(state.get_mut::<u8>().is_none());
    }
}
