//! A toy embedding: a host whose script calls into an instrumented native
//! module. The success path leaves no trace; the failure path dies deep in a
//! native call chain, where the host's own stack walker sees a single opaque
//! level, and the shadow tracer reconstructs the rest.

use std::cell::RefCell;
use std::panic::{catch_unwind, panic_any, AssertUnwindSafe};
use std::rc::Rc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use umbra::host::{GlobalIter, GlobalValue, Host, StackLevel};
use umbra::registry::TracebackHook;
use umbra::{fn_details, setline, FnDetails, HostFnId, Registry, ShadowStackRef};

/// Identity the toy host assigns to its one host-callable native entry.
const LAUNCH: HostFnId = HostFnId::new(0x1a);

/// What the host throws through its protected calls.
struct ScriptError(String);

/// A host runtime small enough to fit in a demo: a canned view of the
/// visible stack and a one-entry global namespace.
struct ToyHost {
    levels: RefCell<Vec<StackLevel>>,
    tracer: RefCell<Option<(ShadowStackRef, TracebackHook)>>,
    report: RefCell<Option<String>>,
}

impl ToyHost {
    fn new() -> Self {
        ToyHost {
            levels: RefCell::new(Vec::new()),
            tracer: RefCell::new(None),
            report: RefCell::new(None),
        }
    }

    /// Wires the renderer into the host's error-reporting path.
    fn install(&self, stack: ShadowStackRef, hook: TracebackHook) {
        *self.tracer.borrow_mut() = Some((stack, hook));
    }

    /// The stack view while `launch` is the innermost visible call.
    fn enter_script(&self, line: u32) {
        *self.levels.borrow_mut() = vec![
            StackLevel::Native { id: LAUNCH },
            StackLevel::Script {
                name: None,
                is_main: true,
                source: "demo.lua".into(),
                line,
                id: None,
            },
        ];
    }
}

impl Host for ToyHost {
    fn stack_level(&self, level: usize) -> Option<StackLevel> {
        if level == 0 {
            return Some(StackLevel::Native { id: HostFnId::new(0) });
        }
        self.levels.borrow().get(level - 1).cloned()
    }

    fn globals(&self) -> GlobalIter<'_> {
        Box::new(std::iter::once((
            "launch".to_string(),
            GlobalValue::Function(LAUNCH),
        )))
    }

    fn raise(&self, message: &str) -> ! {
        // The error-reporting path runs before the unwind, like a message
        // handler: the shadow frames are still live here.
        if let Some((stack, hook)) = self.tracer.borrow().as_ref() {
            *self.report.borrow_mut() = Some(hook(self, stack, message));
        }
        panic_any(ScriptError(message.to_string()));
    }
}

// ---- the instrumented native module ----

static FIB: FnDetails = fn_details!("fib");
static SPIN: FnDetails = fn_details!("spin");
static IGNITE: FnDetails = fn_details!("ignite");

fn fib(host: &ToyHost, stack: &ShadowStackRef, n: u64) -> u64 {
    stack.frame_enter(host, &FIB);
    let result = if n <= 1 {
        n
    } else {
        setline!(stack);
        fib(host, stack, n - 1) + fib(host, stack, n - 2)
    };
    stack.frame_exit();
    result
}

fn ignite(host: &ToyHost, stack: &ShadowStackRef) {
    stack.frame_enter(host, &IGNITE);
    setline!(stack);
    host.raise("engine exploded");
}

fn spin(host: &ToyHost, stack: &ShadowStackRef, n: u32) {
    stack.frame_enter(host, &SPIN);
    if n == 0 {
        setline!(stack);
        ignite(host, stack);
    } else {
        setline!(stack);
        spin(host, stack, n - 1);
    }
    stack.frame_exit();
}

/// The host-callable boundary. The finalizer pops the boundary frame on both
/// exit paths; only the internal calls above do their own bookkeeping.
fn launch(host: &ToyHost, stack: &ShadowStackRef, depth: u32) {
    let _finalizer = stack.boundary_enter(host, LAUNCH);
    spin(host, stack, depth);
}

fn main() {
    let registry = tracing_subscriber::Registry::default().with(
        EnvFilter::builder()
            .with_default_directive(tracing::Level::TRACE.into())
            .from_env()
            .unwrap(),
    );

    let tree_layer = tracing_tree::HierarchicalLayer::new(2)
        .with_targets(true)
        .with_bracketed_fields(true);

    registry.with(tree_layer).init();

    let host = ToyHost::new();
    let mut instance = Registry::new();
    let stack = umbra::init(&mut instance);
    host.install(
        Rc::clone(&stack),
        instance.traceback_hook().expect("init registered it"),
    );

    // Success path: the shadow stack drains back to empty and no traceback
    // is rendered.
    host.enter_script(4);
    let value = {
        let _finalizer = stack.boundary_enter(&host, LAUNCH);
        fib(&host, &stack, 10)
    };
    println!("fib(10) = {value} (shadow depth now {})", stack.depth());

    // Failure path: the error unwinds out of the native chain, the protected
    // call catches it, and the report rendered at the raise site survives.
    host.enter_script(9);
    let result = catch_unwind(AssertUnwindSafe(|| launch(&host, &stack, 24)));

    match result {
        Ok(()) => println!("unexpectedly survived"),
        Err(payload) => {
            let error = payload
                .downcast::<ScriptError>()
                .unwrap_or_else(|_| panic!("foreign panic through the host"));
            let report = host
                .report
                .borrow_mut()
                .take()
                .expect("rendered at the raise site");

            eprintln!("Runtime error: {report}");
            println!(
                "caught {:?}; shadow depth after repair: {}",
                error.0,
                stack.depth()
            );
        }
    }
}
