//! A stand-in for the host scripting runtime, used by the unit tests.
//!
//! The double walks a canned stack view, exposes a toy global namespace, and
//! raises errors the way a real host would: through a non-local exit (a
//! payload-carrying panic the protected-call site catches). When a shadow
//! stack is attached, `raise` renders the traceback through the library hook
//! before unwinding, mirroring a host error-reporting path.

use std::cell::RefCell;
use std::panic::panic_any;

use crate::frame::HostFnId;
use crate::host::{GlobalIter, GlobalValue, Host, StackLevel};
use crate::stack::ShadowStackRef;
use crate::traceback::render_traceback;

/// Error payload thrown by [`TestHost::raise`].
pub(crate) struct HostError(pub String);

#[derive(Clone)]
pub(crate) enum TestValue {
    Function(HostFnId),
    Table(Vec<(String, TestValue)>),
    Other,
}

impl TestValue {
    fn as_global(&self) -> GlobalValue<'_> {
        match self {
            TestValue::Function(id) => GlobalValue::Function(*id),
            TestValue::Table(entries) => GlobalValue::Namespace(Box::new(
                entries.iter().map(|(key, value)| (key.clone(), value.as_global())),
            )),
            TestValue::Other => GlobalValue::Other,
        }
    }
}

pub(crate) struct TestHost {
    levels: RefCell<Vec<StackLevel>>,
    global_table: Vec<(String, TestValue)>,
    attached: RefCell<Option<ShadowStackRef>>,
    pub report: RefCell<Option<String>>,
}

impl TestHost {
    pub fn new() -> Self {
        TestHost {
            levels: RefCell::new(Vec::new()),
            global_table: Vec::new(),
            attached: RefCell::new(None),
            report: RefCell::new(None),
        }
    }

    pub fn global(mut self, key: &str, value: TestValue) -> Self {
        self.global_table.push((key.to_string(), value));
        self
    }

    pub fn levels(self, levels: Vec<StackLevel>) -> Self {
        *self.levels.borrow_mut() = levels;
        self
    }

    /// Makes `raise` render a traceback for `stack` before unwinding.
    pub fn attach(&self, stack: ShadowStackRef) {
        *self.attached.borrow_mut() = Some(stack);
    }

    /// A scripted `<main>` chunk level.
    pub fn main_chunk(source: &str, line: u32) -> StackLevel {
        StackLevel::Script {
            name: None,
            is_main: true,
            source: source.to_string(),
            line,
            id: None,
        }
    }
}

impl Host for TestHost {
    fn stack_level(&self, level: usize) -> Option<StackLevel> {
        if level == 0 {
            // The reporting hook itself. Never printed.
            return Some(StackLevel::Native {
                id: HostFnId::new(usize::MAX),
            });
        }
        self.levels.borrow().get(level - 1).cloned()
    }

    fn globals(&self) -> GlobalIter<'_> {
        Box::new(
            self.global_table
                .iter()
                .map(|(key, value)| (key.clone(), value.as_global())),
        )
    }

    fn raise(&self, message: &str) -> ! {
        if let Some(stack) = self.attached.borrow().as_ref() {
            *self.report.borrow_mut() = Some(render_traceback(self, stack, message));
        }
        panic_any(HostError(message.to_string()));
    }
}
