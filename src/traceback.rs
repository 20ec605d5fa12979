//! Renders the merged traceback.
//!
//! # how it works
//! the host's visible stack is walked innermost-first. a native level is
//! checked against the nearest boundary frame at or below the shadow-stack
//! cursor: on an identity match the run of internal frames above that
//! boundary is spliced in (most recent first) and the boundary frame itself
//! is skipped, because the host-visible line already represents it. a native
//! level with no matching boundary is untracked, and gets a best-effort name
//! from the host's global namespace instead. scripted levels print the way
//! the host reports them.
//!
//! very deep stacks are cut down to a head and a tail window with a single
//! ellipsis line in between stating how many frames were skipped.
//!
//! rendering runs after the program has already decided to report a fatal
//! error, so it is best-effort and must not fail itself.


use std::fmt::{self, Write};

use crate::frame::Frame;
use crate::host::{Host, StackLevel};
use crate::identify::identify;
use crate::stack::ShadowStack;
use crate::{TRACEBACK_BOTTOM_THRESHOLD, TRACEBACK_TOP_THRESHOLD};

/// Renders the traceback for `message` with the default print thresholds.
///
/// This is the entry point registered in the instance registry for the
/// host's error-reporting hook; delivery of the returned report through the
/// host's error channel is the embedder's job.
pub fn render_traceback(host: &dyn Host, stack: &ShadowStack, message: &str) -> String {
    render_traceback_with(
        host,
        stack,
        message,
        TRACEBACK_TOP_THRESHOLD,
        TRACEBACK_BOTTOM_THRESHOLD,
    )
}

/// [`render_traceback`] with explicit top/bottom print thresholds.
///
/// Rendering twice on a stable stack produces identical output.
#[instrument(skip(host, stack))]
pub fn render_traceback_with(
    host: &dyn Host,
    stack: &ShadowStack,
    message: &str,
    top_threshold: usize,
    bottom_threshold: usize,
) -> String {
    stack.with_frames(|frames| {
        // The point where we are in the shadow stack.
        let mut cursor = frames.len() as isize - 1;

        let natives = frames.iter().filter(|f| !f.is_boundary()).count();
        let boundaries = frames.len() - natives;
        let levels = count_levels(host);

        // Boundary frames are represented by host-visible lines already, and
        // the walk starts at host level 1.
        let total = (levels + natives).saturating_sub(boundaries + 1);

        trace!(levels, natives, boundaries, total, "rendering traceback");

        let mut out = Printer::new(message, total, top_threshold, bottom_threshold);

        let mut level = 1;
        while let Some(entry) = host.stack_level(level) {
            level += 1;

            match entry {
                StackLevel::Native { id } => {
                    if cursor >= 0 {
                        // Check whether this level is tracked: find the
                        // nearest boundary frame at or below the cursor.
                        let below = &frames[..=cursor as usize];
                        if let Some(check) = below.iter().rposition(Frame::is_boundary) {
                            if frames[check].boundary_id() == Some(id) {
                                // Tracked. Splice in the internal frames
                                // above the boundary, most recent first.
                                for frame in frames[check + 1..=cursor as usize].iter().rev() {
                                    if let Frame::Native { details, line } = frame {
                                        out.frame(format_args!(
                                            "    {}:{}: in function '{}'\n",
                                            details.file, line, details.name
                                        ));
                                    }
                                }

                                // The boundary frame itself is this very
                                // host level; skip it.
                                cursor = check as isize - 1;
                                continue;
                            }
                        }
                    }

                    // An untracked native call.
                    let name = identify(host, id).unwrap_or_else(|| "<?>".into());
                    out.frame(format_args!("    C: in function '{name}'\n"));
                }
                StackLevel::Script {
                    name,
                    is_main,
                    source,
                    line,
                    id,
                } => {
                    let descriptor = if let Some(name) = name {
                        format!("function '{name}'")
                    } else if is_main {
                        "<main>".into()
                    } else if let Some(found) = id.and_then(|id| identify(host, id)) {
                        format!("function '{found}'")
                    } else {
                        "function '<?>'".into()
                    };

                    out.frame(format_args!("    {source}:{line}: in {descriptor}\n"));
                }
            }
        }

        out.finish()
    })
}

/// Depth of the host's visible stack above level 0: an exponential probe for
/// an upper bound, then a binary search for the first missing level.
fn count_levels(host: &dyn Host) -> usize {
    let mut li = 1;
    let mut le = 1;

    while host.stack_level(le).is_some() {
        li = le;
        le *= 2;
    }

    while li < le {
        let m = (li + le) / 2;
        if host.stack_level(m).is_some() {
            li = m + 1;
        } else {
            le = m;
        }
    }

    le - 1
}

/// Print-budget accounting: the first `top` and last `bottom` frames are
/// printed, everything in between collapses into one ellipsis line.
struct Printer {
    out: String,
    /// Frames accounted so far, visible or not.
    accounted: usize,
    total: usize,
    ellipsis: bool,
    top: usize,
    bottom: usize,
}

impl Printer {
    fn new(message: &str, total: usize, top: usize, bottom: usize) -> Self {
        let mut out = String::new();
        let _ = write!(out, "{message}\nStack traceback:\n");

        Printer {
            out,
            accounted: 0,
            total,
            ellipsis: total > top + bottom,
            top,
            bottom,
        }
    }

    /// Accounts one frame, even when it ends up not being visible.
    fn frame(&mut self, line: fmt::Arguments<'_>) {
        self.accounted += 1;

        let should_print = self.accounted <= self.top
            || self.total.saturating_sub(self.accounted) <= self.bottom;

        if should_print {
            let _ = self.out.write_fmt(line);
        } else if self.ellipsis {
            let _ = write!(
                self.out,
                "\n    ... (Skipped {} frames) ...\n\n",
                self.total - (self.top + self.bottom)
            );
            self.ellipsis = false;
        }
    }

    fn finish(self) -> String {
        self.out
    }
}
