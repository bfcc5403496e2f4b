//! Same-thread conveniences that need no signal round trip.

use peeps_stacktrace::StackTrace;

use crate::{Tid, sys};

/// Kernel id of the calling thread, as accepted by `dump_thread_stack`.
/// Always `0` on targets without thread-directed signals.
pub fn current_tid() -> Tid {
    sys::current_tid()
}

/// Raw return addresses of the caller's stack as space-separated hex,
/// starting with the caller of this function.
#[inline(never)]
pub fn capture_current_stack_hex() -> String {
    StackTrace::capture(1).to_hex_string()
}

/// The caller's stack, symbolized by the standard library. Not limited to
/// `MAX_FRAMES`.
pub fn capture_current_stack_text() -> String {
    let bt = std::backtrace::Backtrace::force_capture();
    format!("{bt}")
}
