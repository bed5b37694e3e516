//! Try Regions and the Throw Protocol
//!
//! A try region is a dynamic extent across which errors are caught and
//! resource cleanups are tracked. Entering a region pushes a scope record
//! onto the calling thread's stack and resets the thread's guard pool;
//! raising an error stores an [`ErrorValue`] into the innermost active scope
//! and unwinds back to that region's boundary, releasing the scope's guards
//! most-recently-registered first before the caller sees the error.
//!
//! The unwind is carried by Rust's panic machinery with a private sentinel
//! payload, so it reaches the nearest enclosing region on the same thread
//! and nothing else. A caught throw is silent: runtime initialization
//! installs a panic hook that suppresses the default panic report for the
//! sentinel and forwards everything else, so panics that are not the
//! sentinel pass through regions unchanged and report as usual. The crate
//! therefore requires `panic = "unwind"`.
//!
//! # Asymmetric cleanup
//!
//! Guards are released **only on the error exit**. A region that completes
//! normally closes without running its guard list; resources registered in
//! it stay acquired. Callers that need release-on-success must arrange it
//! themselves.
//!
//! # Example
//!
//! ```rust,ignore
//! use recoil::{try_region, throw, ErrorCode};
//!
//! let outcome = recoil::try_region(|| {
//!     recoil::throw!(ErrorCode::Parse, "unexpected '{}'", ')');
//! });
//! assert_eq!(outcome.unwrap_err().code(), 3);
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::context::{fatal, with_context};
use crate::error::{ErrorCode, ErrorValue};
use crate::guard::{Cleanup, Handle};
use crate::log::{self, LogLevel};

/// Panic payload marking a protocol unwind, as opposed to a foreign panic.
struct ThrowSignal;

/// Whether the sentinel-suppressing panic hook has been installed.
static HOOK_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Install a process-wide panic hook that keeps protocol unwinds silent.
///
/// A throw has no observable side effect of its own; without this hook the
/// default one would report every sentinel unwind as a panic, even when an
/// enclosing region catches it cleanly. Anything that is not the sentinel is
/// forwarded to the previously installed hook, so foreign panics report
/// exactly as before. Called once during runtime initialization.
pub(crate) fn install_unwind_hook() {
    if HOOK_INSTALLED.swap(true, Ordering::SeqCst) {
        return; // Already installed
    }
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        if info.payload().is::<ThrowSignal>() {
            return;
        }
        previous(info);
    }));
}

/// Whether per-region trace events are enabled.
fn region_tracing() -> bool {
    log::would_log(LogLevel::Trace)
        && crate::context::published_config().is_some_and(|config| config.trace_scopes)
}

/// One activation record for a try region.
#[derive(Debug)]
pub(crate) struct Scope {
    /// The error delivered by a throw targeting this scope.
    pub(crate) err: Option<ErrorValue>,
    /// Head of this scope's guard list (pool slot index).
    pub(crate) guards: Option<u32>,
    /// Cleared when the region closes.
    pub(crate) active: bool,
}

/// Run `body` inside a new try region.
///
/// Returns `Ok` with the body's value on normal completion, or `Err` with
/// the raised [`ErrorValue`] after an unwind. On the error path every guard
/// registered in this region has already been released, in reverse order of
/// registration, by the time `Err` is returned. On the success path guards
/// are **not** released (see the module docs).
///
/// Entering a region past the maximum nesting depth aborts the process.
///
/// The body runs behind an `AssertUnwindSafe` boundary: if it shares
/// mutable state with the caller and then panics (outside the throw
/// protocol), that state may be observed mid-update afterwards, as with any
/// use of `catch_unwind`.
pub fn try_region<R>(body: impl FnOnce() -> R) -> Result<R, ErrorValue> {
    let depth = enter_region();
    let outcome = panic::catch_unwind(AssertUnwindSafe(body));
    match outcome {
        Ok(value) => {
            complete_region(depth);
            Ok(value)
        }
        Err(payload) if payload.is::<ThrowSignal>() => Err(unwind_region(depth)),
        Err(payload) => {
            // Not ours: keep the scope stack coherent and let it keep going.
            // Guard release is a throw-path behavior and does not apply.
            complete_region(depth);
            panic::resume_unwind(payload)
        }
    }
}

/// Raise an error, unwinding to the nearest enclosing active region.
///
/// Stores `err` into the innermost active scope on this thread and unwinds
/// to its boundary. When no region is active there is nowhere to deliver
/// the error: it is printed to stderr and the process aborts.
pub fn throw(err: ErrorValue) -> ! {
    if log::would_log(LogLevel::Debug) {
        log::debug(format!("throw: {err}"));
    }
    let undelivered = with_context(|context| match context.scopes.last_mut() {
        Some(scope) if scope.active => {
            scope.err = Some(err);
            None
        }
        _ => Some(err),
    });
    match undelivered {
        None => panic::panic_any(ThrowSignal),
        Some(err) => {
            err.print();
            fatal("error thrown outside of any try region");
        }
    }
}

/// Register a cleanup for `resource` in the current region.
///
/// Claims one guard from the thread's pool and prepends it to the current
/// scope's list, so guards release most-recently-registered first. Raises a
/// [`ErrorCode::Limit`] error when the pool is exhausted. Calling this
/// outside any try region aborts the process.
///
/// # Safety
///
/// `cleanup` runs at most once, during an unwind of the current region, with
/// the given handle. The caller must guarantee the handle is still valid to
/// release at that point, and must accept that the cleanup may instead never
/// run at all, since a region that completes normally does not release its
/// guards.
#[track_caller]
pub unsafe fn defer(cleanup: Cleanup, resource: Handle) {
    enum DeferOutcome {
        Registered { in_use: usize },
        Exhausted { capacity: usize },
        NoScope,
    }

    let outcome = with_context(|context| {
        let Some(current) = context.scopes.len().checked_sub(1) else {
            return DeferOutcome::NoScope;
        };
        let head = context.scopes[current].guards;
        match context.pool.acquire(cleanup, resource, head) {
            Some(index) => {
                context.scopes[current].guards = Some(index);
                DeferOutcome::Registered {
                    in_use: context.pool.in_use(),
                }
            }
            None => DeferOutcome::Exhausted {
                capacity: context.pool.capacity(),
            },
        }
    });

    match outcome {
        DeferOutcome::Registered { in_use } => {
            if log::would_log(LogLevel::Trace) {
                log::trace(format!(
                    "guard registered for {:#x} ({in_use} pool slots in use)",
                    resource.as_raw()
                ));
            }
        }
        DeferOutcome::Exhausted { capacity } => {
            if log::would_log(LogLevel::Debug) {
                log::debug(format!("guard pool exhausted ({capacity} slots)"));
            }
            throw(ErrorValue::new(
                ErrorCode::Limit,
                ErrorCode::Limit.describe(),
            ))
        }
        DeferOutcome::NoScope => fatal("defer called outside of any try region"),
    }
}

/// Disarm the first guard in the current scope that tracks `resource`.
///
/// Used when ownership of a resource moves (reallocation): the guard for
/// the invalidated handle must not fire. Returns whether a guard was
/// retired. Guards belonging to outer scopes are not searched; after a pool
/// reset their slots are already stale by pool accounting.
pub(crate) fn retire_guard(resource: Handle) -> bool {
    with_context(|context| {
        let head = match context.scopes.last() {
            Some(scope) => scope.guards,
            None => return false,
        };
        let mut cursor = head;
        while let Some(index) = cursor {
            let slot = context.pool.slot_mut(index);
            cursor = slot.next;
            if slot.resource == resource && slot.cleanup.is_some() {
                slot.cleanup = None;
                return true;
            }
        }
        false
    })
}

/// Number of active try regions on the calling thread.
pub fn scope_depth() -> usize {
    with_context(|context| context.scopes.len())
}

/// Number of armed guards registered in the current region.
pub fn guard_count() -> usize {
    with_context(|context| {
        let mut count = 0;
        let mut cursor = context.scopes.last().and_then(|scope| scope.guards);
        while let Some(index) = cursor {
            let slot = context.pool.slot(index);
            if slot.cleanup.is_some() {
                count += 1;
            }
            cursor = slot.next;
        }
        count
    })
}

/// Push a scope and reset the pool; the new depth index is returned.
fn enter_region() -> usize {
    with_context(|context| {
        if context.scopes.len() >= crate::context::MAX_SCOPE_DEPTH {
            fatal("try region nesting exceeds the maximum depth");
        }
        context.scopes.push(Scope {
            err: None,
            guards: None,
            active: true,
        });
        context.pool.reset();
        let depth = context.scopes.len() - 1;
        if region_tracing() {
            log::trace(format!("region enter (depth {depth})"));
        }
        depth
    })
}

/// Close a region that completed normally. Guards are left unreleased.
fn complete_region(depth: usize) {
    with_context(|context| {
        debug_assert_eq!(context.scopes.len(), depth + 1);
        if let Some(scope) = context.scopes.last_mut() {
            scope.active = false;
        }
        context.scopes.pop();
        if region_tracing() {
            log::trace(format!("region close (depth {depth})"));
        }
    });
}

/// Close a region that was unwound: release its guards in list order and
/// hand back the stored error.
fn unwind_region(depth: usize) -> ErrorValue {
    let (pending, err) = with_context(|context| {
        debug_assert_eq!(context.scopes.len(), depth + 1);
        let mut scope = context
            .scopes
            .pop()
            .expect("unwound region missing its scope");
        scope.active = false;

        // Disarm each guard under the borrow; run the cleanups outside it,
        // so a cleanup that throws targets the next enclosing region.
        let mut pending: Vec<(Cleanup, Handle)> = Vec::new();
        let mut cursor = scope.guards;
        while let Some(index) = cursor {
            let slot = context.pool.slot_mut(index);
            cursor = slot.next;
            if let Some(cleanup) = slot.cleanup.take() {
                if !slot.resource.is_null() {
                    pending.push((cleanup, slot.resource));
                }
            }
        }

        let err = scope
            .err
            .take()
            .expect("protocol unwind without a stored error");
        (pending, err)
    });

    if region_tracing() {
        log::trace(format!(
            "region unwind (depth {depth}, releasing {} guards)",
            pending.len()
        ));
    }
    for (cleanup, handle) in pending {
        // SAFETY: the registrant promised the handle stays valid for release
        // during an unwind of its region; each cleanup was disarmed above so
        // it runs exactly once.
        unsafe { cleanup(handle) };
    }
    err
}

/// Raise an error with a typed code and a formatted message, capturing the
/// call site's file and line.
///
/// With only a code, the code's canned description is used as the message:
/// `throw!(ErrorCode::Memory)` raises "out of memory".
#[macro_export]
macro_rules! throw {
    ($code:expr) => {{
        let __code = $code;
        $crate::throw($crate::ErrorValue::with_location(
            __code,
            __code.describe(),
            file!(),
            line!(),
        ))
    }};
    ($code:expr, $($arg:tt)*) => {
        $crate::throw($crate::ErrorValue::with_location(
            $code,
            format!($($arg)*),
            file!(),
            line!(),
        ))
    };
}

/// Raise an error from the last OS error, appending its description to the
/// formatted message and carrying its raw number as the code.
#[macro_export]
macro_rules! throw_os {
    ($($arg:tt)*) => {{
        let __os = ::std::io::Error::last_os_error();
        let __code = __os.raw_os_error().unwrap_or(-1);
        $crate::throw($crate::ErrorValue::with_location(
            $crate::ErrorCode::Os(__code),
            format!("{}: {}", format!($($arg)*), __os),
            file!(),
            line!(),
        ))
    }};
}
