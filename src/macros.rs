//! Instrumentation helpers for native modules.

/// A function descriptor carrying the enclosing file. Declare one `static`
/// per instrumented function:
///
/// ```
/// static FIB: umbra::FnDetails = umbra::fn_details!("fib");
/// ```
#[macro_export]
macro_rules! fn_details {
    ($name:expr) => {
        $crate::FnDetails::new($name, file!())
    };
}

/// Records the line of the sub-call that follows. Place it on the line
/// directly above the fallible expression, so the active frame always shows
/// the line about to execute:
///
/// ```ignore
/// umbra::setline!(stack);
/// let result = risky(host, stack, n);
/// ```
#[macro_export]
macro_rules! setline {
    ($stack:expr) => {
        $stack.set_line(line!() + 1)
    };
}
