//! umbra keeps a shadow of the native call stack so that tracebacks survive
//! where the host's own stack walker goes blind.
//!
//! # how it works
//! a scripting host can walk its own stack, but a native extension function
//! is a single opaque level in that walk: whatever the extension calls
//! internally is invisible. instrumented native functions mirror their
//! call/return activity onto a heap-allocated shadow stack ([`ShadowStack`]),
//! and when a fatal error surfaces, the renderer ([`traceback`]) interleaves
//! the shadow frames with the host's visible stack into one coherent report.
//!
//! two mechanisms keep the shadow stack honest independently of normal
//! control flow: the overflow sentinel turns runaway native recursion into a
//! catchable host error, and the [`Finalizer`] rewinds the stack when an
//! error unwinds past a boundary without its matching frame-exit.

#[macro_use]
extern crate tracing;

mod finalizer;
mod frame;
mod identify;
mod macros;
mod stack;

pub mod host;
pub mod registry;
pub mod traceback;

#[cfg(test)]
pub(crate) mod testhost;

pub use finalizer::Finalizer;
pub use frame::{FnDetails, Frame, HostFnId};
pub use registry::{init, init_with_capacity, Registry};
pub use stack::{ShadowStack, ShadowStackRef};
pub use traceback::{render_traceback, render_traceback_with};

/// The size of the shadow call-stack, in frames. Pre-allocated in full at
/// `init` so that exhaustion is a deterministic, catchable error instead of
/// unbounded growth. Override per instance with [`init_with_capacity`].
pub const MAX_CALLSTACK: usize = 100_000;

/// Traceback ellipsis top threshold. How many frames should we print first
/// to trigger ellipsis?
pub const TRACEBACK_TOP_THRESHOLD: usize = 10;

/// This should always be 2 fewer than the top threshold, for symmetry.
/// Two tail frames linger around at the end which are not captured by the
/// level count.
pub const TRACEBACK_BOTTOM_THRESHOLD: usize = 8;

/// Message raised through the host when the shadow stack is full.
pub const CALLSTACK_OVERFLOW_MSG: &str = "umbra callstack overflow";
