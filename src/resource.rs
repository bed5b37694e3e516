//! Guard-Backed Resource Acquisition
//!
//! Typed helpers that acquire a resource, raise a typed error when the
//! acquisition fails, and register the matching release with [`defer`] when
//! it succeeds. The returned handles are raw: the guard system, not the
//! handle, carries the release obligation, and that obligation only runs if
//! the enclosing region unwinds (see [`crate::scope`] on asymmetric
//! cleanup).
//!
//! Heap allocations carry a small header recording their full layout so the
//! release action can reconstruct it from the payload pointer alone.

use std::alloc::{self, Layout};
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::ptr::NonNull;

use crate::error::{ErrorCode, ErrorValue};
use crate::guard::Handle;
use crate::scope::{defer, retire_guard, throw};

/// Alignment of every helper allocation.
const ALLOC_ALIGN: usize = 16;

/// Bytes reserved ahead of each payload for the layout header. Equal to the
/// alignment so the payload stays aligned.
const HEADER_SIZE: usize = 16;

/// Release a helper allocation given its payload handle.
///
/// # Safety
///
/// The handle must have come from one of this module's allocation helpers
/// and must not have been released already.
unsafe fn release_allocation(handle: Handle) {
    let payload = handle.as_ptr::<u8>();
    let base = payload.sub(HEADER_SIZE);
    let total = base.cast::<usize>().read();
    alloc::dealloc(base, Layout::from_size_align_unchecked(total, ALLOC_ALIGN));
}

/// Close a file opened by [`open_file`].
///
/// # Safety
///
/// The handle must have come from [`open_file`] and must not have been
/// released already.
unsafe fn release_file(handle: Handle) {
    drop(Box::from_raw(handle.as_ptr::<File>()));
}

/// Allocate `size + HEADER_SIZE` bytes, record the total ahead of the
/// payload, and return the payload pointer. `None` on any failure.
fn raw_alloc(size: usize, zeroed: bool) -> Option<NonNull<u8>> {
    let total = size.checked_add(HEADER_SIZE)?;
    let layout = Layout::from_size_align(total, ALLOC_ALIGN).ok()?;
    // SAFETY: the layout has non-zero size (HEADER_SIZE > 0).
    let base = unsafe {
        if zeroed {
            alloc::alloc_zeroed(layout)
        } else {
            alloc::alloc(layout)
        }
    };
    let base = NonNull::new(base)?;
    // SAFETY: the block is at least HEADER_SIZE + size bytes.
    unsafe {
        base.as_ptr().cast::<usize>().write(total);
        Some(NonNull::new_unchecked(base.as_ptr().add(HEADER_SIZE)))
    }
}

/// Acquire `size` bytes of heap memory.
///
/// A zero size is promoted to one byte so every call hands back a distinct
/// live allocation. Raises [`ErrorCode::Memory`] on failure; on success a
/// deallocation guard is registered before the pointer is returned.
#[track_caller]
pub fn alloc_bytes(size: usize) -> NonNull<u8> {
    let size = if size == 0 { 1 } else { size };
    let Some(payload) = raw_alloc(size, false) else {
        throw(ErrorValue::new(
            ErrorCode::Memory,
            ErrorCode::Memory.describe(),
        ));
    };
    // SAFETY: the payload was just allocated and is released exactly once by
    // release_allocation.
    unsafe { defer(release_allocation, Handle::from_non_null(payload)) };
    payload
}

/// Acquire `count * size` bytes of zeroed heap memory.
///
/// If either factor is zero both are promoted to one. Raises
/// [`ErrorCode::Memory`] on overflow or allocation failure; on success a
/// deallocation guard is registered before the pointer is returned.
#[track_caller]
pub fn alloc_zeroed(count: usize, size: usize) -> NonNull<u8> {
    let (count, size) = if count == 0 || size == 0 {
        (1, 1)
    } else {
        (count, size)
    };
    let Some(payload) = count
        .checked_mul(size)
        .and_then(|total| raw_alloc(total, true))
    else {
        throw(ErrorValue::new(
            ErrorCode::Memory,
            ErrorCode::Memory.describe(),
        ));
    };
    // SAFETY: as in alloc_bytes.
    unsafe { defer(release_allocation, Handle::from_non_null(payload)) };
    payload
}

/// Grow or shrink an allocation produced by this module.
///
/// Ownership of the release obligation moves with the pointer: on success
/// the old pointer's guard in the current scope is retired and a fresh
/// guard is registered for the new pointer. On failure the old block and
/// its guard are left intact and [`ErrorCode::Memory`] is raised.
///
/// # Safety
///
/// `old` must have come from [`alloc_bytes`], [`alloc_zeroed`],
/// [`realloc_bytes`], or [`dup_text`], and must not have been released.
/// After this call returns, `old` is invalid (unless the block did not
/// move).
#[track_caller]
pub unsafe fn realloc_bytes(old: NonNull<u8>, new_size: usize) -> NonNull<u8> {
    let new_size = if new_size == 0 { 1 } else { new_size };
    let old_base = old.as_ptr().sub(HEADER_SIZE);
    let old_total = old_base.cast::<usize>().read();
    let old_layout = Layout::from_size_align_unchecked(old_total, ALLOC_ALIGN);

    let Some(new_total) = new_size
        .checked_add(HEADER_SIZE)
        .filter(|&total| Layout::from_size_align(total, ALLOC_ALIGN).is_ok())
    else {
        throw(ErrorValue::new(
            ErrorCode::Memory,
            ErrorCode::Memory.describe(),
        ));
    };

    let Some(new_base) = NonNull::new(alloc::realloc(old_base, old_layout, new_total)) else {
        // The old block survives a failed realloc, and so does its guard.
        throw(ErrorValue::new(
            ErrorCode::Memory,
            ErrorCode::Memory.describe(),
        ));
    };
    new_base.as_ptr().cast::<usize>().write(new_total);
    let payload = NonNull::new_unchecked(new_base.as_ptr().add(HEADER_SIZE));

    retire_guard(Handle::from_non_null(old));
    defer(release_allocation, Handle::from_non_null(payload));
    payload
}

/// Duplicate text into a fresh NUL-terminated allocation.
///
/// Raises [`ErrorCode::Memory`] on failure; on success a deallocation guard
/// is registered before the pointer is returned. The allocation holds
/// `text.len() + 1` bytes.
#[track_caller]
pub fn dup_text(text: &str) -> NonNull<u8> {
    let bytes = text.as_bytes();
    let Some(payload) = bytes
        .len()
        .checked_add(1)
        .and_then(|total| raw_alloc(total, false))
    else {
        throw(ErrorValue::new(
            ErrorCode::Memory,
            ErrorCode::Memory.describe(),
        ));
    };
    // SAFETY: the payload holds len + 1 bytes; the source and destination
    // cannot overlap because the payload is freshly allocated.
    unsafe {
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), payload.as_ptr(), bytes.len());
        payload.as_ptr().add(bytes.len()).write(0);
        defer(release_allocation, Handle::from_non_null(payload));
    }
    payload
}

/// Open a file with a C-style mode string and register a close guard.
///
/// Recognized modes: `r`, `r+`, `w`, `w+`, `a`, `a+`. An unrecognized mode
/// raises [`ErrorCode::Invalid`]; an open failure raises
/// [`ErrorCode::File`] with the attempted path and mode in the message. On
/// success the file is owned by its guard: the returned pointer stays valid
/// until the region unwinds, or indefinitely if the region completes
/// normally.
#[track_caller]
pub fn open_file(path: impl AsRef<Path>, mode: &str) -> NonNull<File> {
    let path = path.as_ref();
    let mut options = OpenOptions::new();
    match mode {
        "r" => {
            options.read(true);
        }
        "r+" => {
            options.read(true).write(true);
        }
        "w" => {
            options.write(true).create(true).truncate(true);
        }
        "w+" => {
            options.read(true).write(true).create(true).truncate(true);
        }
        "a" => {
            options.append(true).create(true);
        }
        "a+" => {
            options.read(true).append(true).create(true);
        }
        other => throw(ErrorValue::new(
            ErrorCode::Invalid,
            format!("unrecognized file mode '{other}'"),
        )),
    }

    match options.open(path) {
        Ok(file) => {
            let pointer = NonNull::from(Box::leak(Box::new(file)));
            // SAFETY: the box was just leaked; release_file reclaims it once.
            unsafe { defer(release_file, Handle::from_non_null(pointer)) };
            pointer
        }
        Err(err) => throw(ErrorValue::new(
            ErrorCode::File,
            format!("open('{}', '{mode}') failed: {err}", path.display()),
        )),
    }
}

/// Register a close guard for an externally-acquired file descriptor.
///
/// Performs no open itself; negative descriptors are ignored. Descriptor 0
/// maps to the null handle and its guard never fires.
///
/// # Safety
///
/// The caller must own the descriptor: if the region unwinds it will be
/// closed, and nothing else may close it afterwards.
#[cfg(unix)]
pub unsafe fn watch_fd(fd: std::os::fd::RawFd) {
    if fd < 0 {
        return;
    }
    defer(release_fd, Handle::from_raw(fd as usize));
}

/// Close a watched descriptor.
///
/// # Safety
///
/// The handle must hold a descriptor the caller owned when registering.
#[cfg(unix)]
unsafe fn release_fd(handle: Handle) {
    use std::os::fd::{FromRawFd, OwnedFd, RawFd};
    drop(OwnedFd::from_raw_fd(handle.as_raw() as RawFd));
}
