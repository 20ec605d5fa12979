//! What the embedding runtime must provide.
//!
//! The host scripting runtime is a black box to the tracer. It has to be
//! able to do three things: walk its own visible stack, raise an error
//! through its non-local exit mechanism, and expose its global namespace so
//! untracked functions can at least get a deduced name.

use crate::frame::HostFnId;

/// One level of the host's own stack walk, innermost first.
#[derive(Debug, Clone, PartialEq)]
pub enum StackLevel {
    /// A native function. Opaque to the host beyond its entry point.
    Native { id: HostFnId },
    /// A function running in the host interpreter itself.
    Script {
        /// Name the host's introspection already knows, if any.
        name: Option<String>,
        /// Whether this is the program's top-level chunk.
        is_main: bool,
        /// Source designation (file or chunk name).
        source: String,
        /// Current line within the frame.
        line: u32,
        /// Identity for global-namespace name deduction, if the function
        /// has one the host can hand out.
        id: Option<HostFnId>,
    },
}

/// A value reachable from the host's global namespace, as seen by the name
/// deduction walk.
pub enum GlobalValue<'h> {
    /// A callable with a host identity.
    Function(HostFnId),
    /// A nested namespace (table, module) that can be walked further.
    Namespace(GlobalIter<'h>),
    /// Anything else. Skipped by the walk.
    Other,
}

pub type GlobalIter<'h> = Box<dyn Iterator<Item = (String, GlobalValue<'h>)> + 'h>;

pub trait Host {
    /// Reports level `level` of the host's visible stack, innermost first.
    /// Level 0 is the currently executing reporting hook itself and is never
    /// printed. Returns `None` past the outermost level.
    fn stack_level(&self, level: usize) -> Option<StackLevel>;

    /// Iterates the host's global namespace.
    fn globals(&self) -> GlobalIter<'_>;

    /// Raises a fatal error through the host's non-local exit mechanism.
    /// Does not return; the host may still catch the error at a protected
    /// call and continue running.
    fn raise(&self, message: &str) -> !;
}
