//! Per-Thread Context and Runtime Lifecycle
//!
//! Each thread that touches the runtime gets its own context: a fixed-depth
//! stack of scope records plus one guard pool. Contexts are created lazily on
//! first use and torn down by the thread-local storage destructor when the
//! thread ends. Nothing in a context is ever visible to another thread.
//!
//! Process-wide state is limited to the one-time runtime initialization
//! (configuration load and log setup) and two monotonic counters kept for
//! observability. Initialization is safe under concurrent first callers: a
//! single winner performs the setup while the others spin until it is
//! published. A reentrant call during initialization on the initializing
//! thread is a programming defect and aborts the process.

use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::OnceLock;

use crate::config::RuntimeConfig;
use crate::guard::GuardPool;
use crate::log::{self, LogLevel};
use crate::scope::Scope;

/// Maximum try-region nesting depth per thread.
///
/// Exceeding it is a fatal condition (process abort): it indicates runaway
/// recursion into try regions, not a runtime resource shortage.
pub const MAX_SCOPE_DEPTH: usize = 64;

const UNINIT: u8 = 0;
const INITIALIZING: u8 = 1;
const READY: u8 = 2;

static STATE: AtomicU8 = AtomicU8::new(UNINIT);
static CONFIG: OnceLock<RuntimeConfig> = OnceLock::new();

/// Total thread contexts ever created.
static CONTEXTS_CREATED: AtomicU64 = AtomicU64::new(0);
/// Thread contexts currently alive.
static CONTEXTS_LIVE: AtomicU64 = AtomicU64::new(0);

thread_local! {
    /// Set while this thread is running the one-time initialization.
    static INIT_ACTIVE: Cell<bool> = const { Cell::new(false) };

    /// The calling thread's context, created on first use.
    static CONTEXT: RefCell<Option<Box<ThreadContext>>> = const { RefCell::new(None) };
}

/// Per-thread state: the scope stack and the guard pool.
pub(crate) struct ThreadContext {
    /// Active scopes, innermost last. Length is bounded by
    /// [`MAX_SCOPE_DEPTH`]; the protocol aborts rather than push past it.
    pub(crate) scopes: Vec<Scope>,
    /// The thread's guard pool, reset at every region entry.
    pub(crate) pool: GuardPool,
}

impl ThreadContext {
    fn new() -> Self {
        Self {
            scopes: Vec::with_capacity(MAX_SCOPE_DEPTH),
            pool: GuardPool::new(),
        }
    }
}

impl Drop for ThreadContext {
    fn drop(&mut self) {
        CONTEXTS_LIVE.fetch_sub(1, Ordering::SeqCst);
        if log::would_log(LogLevel::Trace) {
            log::trace(format!(
                "thread context destroyed (open scopes: {})",
                self.scopes.len()
            ));
        }
    }
}

/// Abort the process over an unrecoverable programming defect.
///
/// Used where no handler can exist: the error machinery itself is broken or
/// unavailable at this point.
pub(crate) fn fatal(message: &str) -> ! {
    eprintln!("recoil: fatal: {message}");
    std::process::abort();
}

/// Ensure the runtime is initialized and return its configuration.
pub(crate) fn runtime() -> &'static RuntimeConfig {
    initialize(None)
}

/// Initialize with an explicit configuration.
///
/// The first initializer wins; if the runtime is already up, the supplied
/// configuration is ignored.
pub(crate) fn init_with(config: RuntimeConfig) -> &'static RuntimeConfig {
    initialize(Some(config))
}

/// Get the published configuration without forcing initialization.
pub(crate) fn published_config() -> Option<&'static RuntimeConfig> {
    CONFIG.get()
}

fn initialize(mut config: Option<RuntimeConfig>) -> &'static RuntimeConfig {
    loop {
        match STATE.load(Ordering::Acquire) {
            READY => {
                return CONFIG.get().expect("runtime marked ready without a config");
            }
            INITIALIZING => {
                if INIT_ACTIVE.with(Cell::get) {
                    fatal("reentrant runtime initialization");
                }
                // Another thread is setting up; wait for it to publish.
                std::hint::spin_loop();
            }
            _ => {
                if STATE
                    .compare_exchange(UNINIT, INITIALIZING, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    continue;
                }
                INIT_ACTIVE.with(|active| active.set(true));
                let resolved = config.take().unwrap_or_else(|| {
                    RuntimeConfig::from_env().unwrap_or_else(|err| {
                        eprintln!("recoil: ignoring bad environment: {err}");
                        RuntimeConfig::default()
                    })
                });
                resolved.apply();
                // Throws must be silent when caught; the hook has to be in
                // place before any thread can reach a throw.
                crate::scope::install_unwind_hook();
                let _ = CONFIG.set(resolved);
                STATE.store(READY, Ordering::Release);
                INIT_ACTIVE.with(|active| active.set(false));
                return CONFIG.get().expect("runtime config vanished after publish");
            }
        }
    }
}

/// Run `f` against the calling thread's context, creating it on first use.
///
/// Racing first calls from different threads never interfere: every thread
/// has independent storage. Failure of the storage itself (only possible
/// while the thread is already being torn down) is fatal.
pub(crate) fn with_context<R>(f: impl FnOnce(&mut ThreadContext) -> R) -> R {
    runtime();
    CONTEXT
        .try_with(|cell| {
            let mut slot = cell.borrow_mut();
            let context = slot.get_or_insert_with(|| {
                CONTEXTS_CREATED.fetch_add(1, Ordering::SeqCst);
                CONTEXTS_LIVE.fetch_add(1, Ordering::SeqCst);
                if log::would_log(LogLevel::Trace) {
                    log::trace("thread context created");
                }
                Box::new(ThreadContext::new())
            });
            f(context)
        })
        .unwrap_or_else(|_| fatal("thread context storage unavailable during teardown"))
}

/// Total thread contexts created since process start.
pub fn contexts_created() -> u64 {
    CONTEXTS_CREATED.load(Ordering::SeqCst)
}

/// Thread contexts currently alive.
pub fn contexts_live() -> u64 {
    CONTEXTS_LIVE.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};

    #[test]
    fn test_context_is_created_lazily() {
        let before = contexts_created();
        with_context(|_| ());
        let after = contexts_created();
        assert!(after >= before);
        // Repeated access on the same thread does not create another context.
        with_context(|_| ());
        assert_eq!(contexts_created(), after);
    }

    #[test]
    fn test_concurrent_first_access_initializes_once() {
        let barrier = Arc::new(Barrier::new(4));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    let config = runtime();
                    config.clone()
                })
            })
            .collect();

        let mut seen = Vec::new();
        for handle in handles {
            seen.push(handle.join().unwrap());
        }
        // Every thread observed the same published configuration.
        assert!(seen.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[test]
    fn test_contexts_are_thread_private() {
        with_context(|context| context.scopes.clear());
        let spawned = std::thread::spawn(|| {
            with_context(|context| {
                context.pool.reset();
                context.scopes.len()
            })
        })
        .join()
        .unwrap();
        assert_eq!(spawned, 0);
    }

    #[test]
    fn test_context_torn_down_at_thread_exit() {
        std::thread::spawn(|| with_context(|_| ())).join().unwrap();
        // The spawned thread's context has been dropped by its TLS destructor.
        assert!(contexts_live() <= contexts_created());
    }
}
