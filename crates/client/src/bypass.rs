//! Per-thread reentrancy guard
//!
//! While the flag is set on a thread, that thread is executing the event
//! send path and must not emit events of its own. Instrumentation checks
//! [`is_active`] before calling into the client; the client sets the flag
//! for the duration of every send.
//!
//! With `debug_assertions` enabled, activating an active flag or
//! deactivating an inactive one panics: it means the bracketing is broken
//! somewhere in the instrumentation. Release builds skip the checks.

use std::cell::Cell;
use std::marker::PhantomData;

thread_local! {
    static ACTIVE: Cell<bool> = const { Cell::new(false) };
}

/// Whether the calling thread is inside the send path
#[inline]
pub fn is_active() -> bool {
    ACTIVE.with(Cell::get)
}

/// Mark the calling thread as inside the send path
///
/// # Panics
///
/// With `debug_assertions`, if the flag is already set.
#[inline]
pub fn activate() {
    let was_active = ACTIVE.with(|flag| flag.replace(true));
    debug_assert!(!was_active, "bypass activated while already active");
}

/// Mark the calling thread as outside the send path
///
/// # Panics
///
/// With `debug_assertions`, if the flag is not set.
#[inline]
pub fn deactivate() {
    let was_active = ACTIVE.with(|flag| flag.replace(false));
    debug_assert!(was_active, "bypass deactivated while inactive");
}

/// Scoped activation of the guard
///
/// Deactivates on drop, so early returns and panics unwind the flag
/// correctly. Tied to the thread that created it.
#[derive(Debug)]
#[must_use = "the guard deactivates as soon as it is dropped"]
pub struct BypassGuard {
    _not_send: PhantomData<*const ()>,
}

impl BypassGuard {
    /// Activate the guard, or return `None` if this thread already holds it
    #[inline]
    pub fn enter() -> Option<Self> {
        if is_active() {
            return None;
        }
        activate();
        Some(Self {
            _not_send: PhantomData,
        })
    }
}

impl Drop for BypassGuard {
    #[inline]
    fn drop(&mut self) {
        deactivate();
    }
}
