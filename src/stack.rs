//! The shadow stack container and the frame lifecycle operations.

use std::cell::RefCell;
use std::rc::Rc;

use crate::finalizer::Finalizer;
use crate::frame::{FnDetails, Frame, HostFnId};
use crate::host::Host;

pub type ShadowStackRef = Rc<ShadowStack>;

/// A fully heap-allocated mirror of the native call chain. Exactly one
/// exists per host-runtime instance, shared by reference and mutated only on
/// that instance's single thread.
///
/// Push/pop is strictly nested per call. The storage is pre-sized: the push
/// that would fill the last slot raises the overflow error instead, so
/// pathological native recursion becomes a catchable host error rather than
/// a silent crash.
pub struct ShadowStack {
    frames: RefCell<Vec<Frame>>,
    capacity: usize,
}

impl ShadowStack {
    pub(crate) fn with_capacity(capacity: usize) -> ShadowStackRef {
        Rc::new(ShadowStack {
            frames: RefCell::new(Vec::with_capacity(capacity)),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live frames.
    pub fn depth(&self) -> usize {
        self.frames.borrow().len()
    }

    /// Pushes an internal native frame. The frame's line starts at 0 and is
    /// maintained through [`set_line`](Self::set_line).
    pub fn frame_enter(&self, host: &dyn Host, details: &'static FnDetails) {
        self.push(host, Frame::native(details));
    }

    /// Pushes a boundary frame and arms the finalizer for the enclosing
    /// native-interface scope. This is the only way to push a boundary
    /// frame, so every internal call chain is rooted at one.
    ///
    /// The returned capability must be held for the whole boundary
    /// invocation; dropping it (on any exit path) rewinds the stack past the
    /// boundary frame.
    pub fn boundary_enter(self: &Rc<Self>, host: &dyn Host, id: HostFnId) -> Finalizer {
        self.push(host, Frame::boundary(id));
        Finalizer::arm(Rc::clone(self))
    }

    fn push(&self, host: &dyn Host, frame: Frame) {
        let mut frames = self.frames.borrow_mut();

        // Have we run out of stack entries? The last slot is never written:
        // the push that would take it raises instead.
        if frames.len() + 1 >= self.capacity {
            // `raise` unwinds; release the borrow so the finalizers that run
            // during the unwind can rewind the stack.
            drop(frames);
            host.raise(crate::CALLSTACK_OVERFLOW_MSG);
        }

        frames.push(frame);
    }

    /// Sets the line number of the topmost frame. No-op on an empty stack.
    pub fn set_line(&self, line: u32) {
        if let Some(top) = self.frames.borrow_mut().last_mut() {
            top.set_line(line);
        }
    }

    /// Removes the topmost frame. An unmatched exit is ignored.
    pub fn frame_exit(&self) {
        self.frames.borrow_mut().pop();
    }

    /// Discards the most recent boundary frame and everything above it.
    /// This is the guardian repair: an error skipped the frame-exits of the
    /// frames above the boundary, and the boundary frame itself is popped
    /// here because its owner never pops it directly.
    pub(crate) fn rewind_to_boundary(&self) {
        let mut frames = self.frames.borrow_mut();
        match frames.iter().rposition(Frame::is_boundary) {
            Some(boundary) => {
                trace!(
                    discarded = frames.len() - boundary,
                    "rewinding shadow stack to boundary"
                );
                frames.truncate(boundary);
            }
            None => {
                // Instrumentation contract slip: a finalizer outlived every
                // boundary frame. Clamp at zero rather than scanning off the
                // start of the storage.
                warn!("finalizer fired with no boundary frame on the shadow stack");
                frames.clear();
            }
        }
    }

    pub(crate) fn top(&self) -> Option<Frame> {
        self.frames.borrow().last().copied()
    }

    pub(crate) fn with_frames<R>(&self, f: impl FnOnce(&[Frame]) -> R) -> R {
        f(&self.frames.borrow())
    }
}
