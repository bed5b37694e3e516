//! # Recoil
//!
//! Structured error unwinding with guarded, ordered resource cleanup, for
//! code that manages resources with no destructors of their own.
//!
//! A caller opens a **try region**; anything running inside it, however
//! deeply nested, can **throw** a typed error that unwinds straight back to
//! that region, and can **defer** a cleanup for a resource it has acquired.
//! When a region unwinds, every cleanup registered inside it runs in reverse
//! order of registration before the caller sees the error.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          RECOIL                              │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌────────────┐  ┌────────────┐  ┌────────────────────────┐  │
//! │  │   Scopes   │  │   Guards   │  │  Resource acquisition  │  │
//! │  │ (scope.rs) │  │ (guard.rs) │  │     (resource.rs)      │  │
//! │  └────────────┘  └────────────┘  └────────────────────────┘  │
//! │        │               │                     │               │
//! │        └───────────────┼─────────────────────┘               │
//! │                        │                                     │
//! │  ┌────────────┐  ┌────────────┐  ┌────────────────────────┐  │
//! │  │   Errors   │  │  Context   │  │     Config / Log       │  │
//! │  │ (error.rs) │  │(context.rs)│  │ (config.rs / log.rs)   │  │
//! │  └────────────┘  └────────────┘  └────────────────────────┘  │
//! │                                                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! All state is thread-private: each thread carries its own scope stack and
//! guard pool, created on first use and torn down when the thread ends.
//! Nothing crosses threads except the one-time runtime initialization.
//!
//! ## The cleanup contract
//!
//! Cleanup is **error-path only**: a region that completes normally closes
//! without running its guard list, so resources registered in it stay
//! acquired. This asymmetry is part of the crate's contract: guards are a
//! failure-recovery mechanism, not scope-bound destructors. Callers that
//! want release-on-success perform it themselves before the region closes.
//!
//! The guard pool is likewise deliberately coarse: one fixed pool per
//! thread, reset at every region entry, sized by [`GUARD_POOL_CAPACITY`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use recoil::{try_region, open_file, alloc_bytes, ErrorCode};
//!
//! let outcome = try_region(|| {
//!     let buffer = alloc_bytes(1024);          // freed if we unwind
//!     let file = open_file("data.txt", "r");   // closed if we unwind
//!     // ... work that may recoil::throw!(...) ...
//! });
//! if let Err(err) = outcome {
//!     err.print();
//! }
//! ```
//!
//! Unwinding rides on Rust's panic machinery with a private sentinel
//! payload, so building with `panic = "abort"` is not supported. Runtime
//! initialization installs a panic hook that keeps the sentinel silent:
//! a caught throw produces no output of its own, while foreign panics
//! report exactly as before.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod context;
pub mod error;
pub mod guard;
pub mod log;
pub mod resource;
pub mod scope;

pub use config::{ConfigError, RuntimeConfig};
pub use context::MAX_SCOPE_DEPTH;
pub use error::{ErrorCode, ErrorValue, FILE_MAX, MESSAGE_MAX};
pub use guard::{Cleanup, Handle, GUARD_POOL_CAPACITY};
pub use log::LogLevel;
#[cfg(unix)]
pub use resource::watch_fd;
pub use resource::{alloc_bytes, alloc_zeroed, dup_text, open_file, realloc_bytes};
pub use scope::{defer, guard_count, scope_depth, throw, try_region};

/// Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the runtime with configuration from the environment.
///
/// Optional: any entry point initializes lazily on first use. Calling this
/// early pins the configuration before other threads start.
pub fn init() {
    context::runtime();
}

/// Initialize the runtime with an explicit configuration.
///
/// The first initializer wins; if the runtime is already up, `config` is
/// ignored. The configuration is applied as given; call
/// [`RuntimeConfig::validate`] first to check it for conflicting settings.
pub fn init_with_config(config: RuntimeConfig) {
    context::init_with(config);
}

/// Get the runtime configuration, if the runtime has been initialized.
pub fn runtime_config() -> Option<&'static RuntimeConfig> {
    context::published_config()
}
