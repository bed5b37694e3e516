//! Guard Pool
//!
//! A guard records one pending cleanup obligation: a release action paired
//! with the opaque resource handle it applies to. Guards live in a
//! fixed-capacity, thread-private bump pool and are threaded into intrusive
//! LIFO lists, one list per active try region.
//!
//! # Pool discipline
//!
//! The pool is shared by every region on one thread and is reset to empty at
//! the start of each new region; it is not allocated per region. Reset moves
//! the cursor only: slots are plain data and stay inert until overwritten, so
//! resetting has no side effects on resources whose guards were never run.
//! This discipline assumes each region fully completes before significant
//! further registration resumes in an outer region; slots handed to an outer,
//! still-active region are indistinguishable by pool accounting from slots a
//! nested region claims after the reset.

use std::ptr::NonNull;

/// Number of guard slots available to each thread.
pub const GUARD_POOL_CAPACITY: usize = 2048;

/// Opaque handle to a resource tracked by a guard.
///
/// A newtype over a raw address. Zero is the null handle: a guard whose
/// handle is null is skipped at release time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(usize);

impl Handle {
    /// The null handle.
    pub const NULL: Handle = Handle(0);

    /// Wrap a raw pointer.
    pub fn from_ptr<T>(ptr: *mut T) -> Self {
        Handle(ptr as usize)
    }

    /// Wrap a non-null pointer.
    pub fn from_non_null<T>(ptr: NonNull<T>) -> Self {
        Handle(ptr.as_ptr() as usize)
    }

    /// Wrap a raw address.
    pub fn from_raw(raw: usize) -> Self {
        Handle(raw)
    }

    /// Recover the handle as a pointer.
    pub fn as_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }

    /// Get the raw address.
    pub fn as_raw(self) -> usize {
        self.0
    }

    /// Check for the null handle.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// A release action applied to a resource handle.
///
/// # Safety
///
/// The function is invoked at most once per registration, with the handle it
/// was registered with. The registrant promises the handle is still valid to
/// release at that point.
pub type Cleanup = unsafe fn(Handle);

/// One pending cleanup obligation.
///
/// `cleanup` is `Option` so a guard can be retired (disarmed) without
/// disturbing the list it is threaded into, and so release can arm-down each
/// guard exactly once.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Guard {
    /// The release action; `None` once run or retired.
    pub(crate) cleanup: Option<Cleanup>,
    /// The resource the action applies to.
    pub(crate) resource: Handle,
    /// Next guard in the owning region's list (slot index).
    pub(crate) next: Option<u32>,
}

impl Guard {
    const VACANT: Guard = Guard {
        cleanup: None,
        resource: Handle::NULL,
        next: None,
    };
}

/// Fixed-capacity bump allocator of guard slots.
pub(crate) struct GuardPool {
    slots: Vec<Guard>,
    /// Next free slot, invariantly in `[0, capacity]`.
    cursor: usize,
}

impl GuardPool {
    pub(crate) fn new() -> Self {
        Self::with_capacity(GUARD_POOL_CAPACITY)
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![Guard::VACANT; capacity],
            cursor: 0,
        }
    }

    /// Return the pool to empty. Slot contents stay inert until overwritten.
    pub(crate) fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Claim the next slot and fill it; `None` when the pool is exhausted.
    pub(crate) fn acquire(
        &mut self,
        cleanup: Cleanup,
        resource: Handle,
        next: Option<u32>,
    ) -> Option<u32> {
        if self.cursor >= self.slots.len() {
            return None;
        }
        let index = self.cursor;
        self.cursor += 1;
        self.slots[index] = Guard {
            cleanup: Some(cleanup),
            resource,
            next,
        };
        Some(index as u32)
    }

    pub(crate) fn in_use(&self) -> usize {
        self.cursor
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn slot(&self, index: u32) -> &Guard {
        &self.slots[index as usize]
    }

    pub(crate) fn slot_mut(&mut self, index: u32) -> &mut Guard {
        &mut self.slots[index as usize]
    }
}
