//! Per-host-instance extension registry and tracer initialization.
//!
//! The registry is an explicit object owned by whatever structure represents
//! one host-runtime instance; there is no ambient global. Slots are keyed by
//! well-known names so that the host's generic error-reporting path can find
//! the traceback entry point without linking against this crate's types.

use std::any::Any;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::host::Host;
use crate::stack::{ShadowStack, ShadowStackRef};
use crate::traceback;

/// Registry entry of the shadow-stack container.
pub const CONTAINER_KEY: &str = "__UMBRA_TRACER_CONTAINER";

/// Registry entry of the traceback hook.
pub const TRACEBACK_KEY: &str = "__UMBRA_TRACER_TRACEBACK";

/// Renderer entry point registered for the host's error-reporting path.
pub type TracebackHook = fn(&dyn Host, &ShadowStack, &str) -> String;

/// One registry per host-runtime instance. Dropping it (with the last
/// outstanding stack reference) frees the shadow stack's backing storage.
#[derive(Default)]
pub struct Registry {
    slots: FxHashMap<&'static str, Box<dyn Any>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// The shadow stack registered for this instance, if [`init`] has run.
    pub fn shadow_stack(&self) -> Option<ShadowStackRef> {
        self.get::<ShadowStackRef>(CONTAINER_KEY).cloned()
    }

    /// The traceback hook registered for this instance's error path.
    pub fn traceback_hook(&self) -> Option<TracebackHook> {
        self.get::<TracebackHook>(TRACEBACK_KEY).copied()
    }

    fn get<T: 'static>(&self, key: &str) -> Option<&T> {
        self.slots.get(key).and_then(|slot| slot.downcast_ref())
    }
}

/// Initializes the tracer for one host instance: on the first call the
/// shadow stack is allocated in full and registered, together with the
/// traceback entry point. Idempotent; always returns the same stack for a
/// given registry.
///
/// Allocation failure is fatal (the allocator aborts); no recovery is
/// attempted.
pub fn init(registry: &mut Registry) -> ShadowStackRef {
    init_with_capacity(registry, crate::MAX_CALLSTACK)
}

/// [`init`] with an explicit shadow-stack capacity.
pub fn init_with_capacity(registry: &mut Registry, capacity: usize) -> ShadowStackRef {
    if let Some(stack) = registry.shadow_stack() {
        return stack;
    }

    debug!(capacity, "initializing shadow stack");
    let stack = ShadowStack::with_capacity(capacity);
    registry
        .slots
        .insert(CONTAINER_KEY, Box::new(Rc::clone(&stack)));
    registry.slots.insert(
        TRACEBACK_KEY,
        Box::new(traceback::render_traceback as TracebackHook),
    );

    stack
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testhost::TestHost;

    #[test]
    fn init_is_idempotent_per_instance() {
        let mut registry = Registry::new();

        let first = init(&mut registry);
        let second = init(&mut registry);
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(first.capacity(), crate::MAX_CALLSTACK);
    }

    #[test]
    fn separate_instances_get_separate_stacks() {
        let mut one = Registry::new();
        let mut two = Registry::new();

        assert!(!Rc::ptr_eq(&init(&mut one), &init(&mut two)));
    }

    #[test]
    fn a_repeat_init_keeps_the_first_capacity() {
        let mut registry = Registry::new();

        let first = init_with_capacity(&mut registry, 32);
        let second = init_with_capacity(&mut registry, 64);
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(second.capacity(), 32);
    }

    #[test]
    fn the_traceback_hook_is_registered_and_callable() {
        let mut registry = Registry::new();
        assert!(registry.traceback_hook().is_none());

        let stack = init(&mut registry);
        let hook = registry.traceback_hook().expect("registered by init");

        let host = TestHost::new();
        let report = hook(&host, &stack, "something went wrong");
        assert!(report.starts_with("something went wrong\nStack traceback:\n"));
    }

    #[test]
    fn the_registered_stack_is_reachable_by_key() {
        let mut registry = Registry::new();
        assert!(registry.shadow_stack().is_none());

        let stack = init(&mut registry);
        let found = registry.shadow_stack().expect("registered by init");
        assert!(Rc::ptr_eq(&stack, &found));
    }
}
