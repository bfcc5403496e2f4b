//! Signal handler run on the thread being dumped.
//!
//! Everything reachable from here must be async-signal-safe: no allocation,
//! no I/O, no futex-backed locks, no logging.

use std::ffi::{c_int, c_void};
use std::io;

use crate::dumper::CHANNEL;
use crate::sys;

/// Frames between `Channel::respond` and the interrupted code: this handler
/// and the kernel's signal trampoline. The first recorded frame is the
/// instruction the target was executing when the signal arrived.
const HANDLER_SKIP_FRAMES: usize = 2;

extern "C" fn handle_dump_signal(
    _signal: c_int,
    _info: *mut libc::siginfo_t,
    _context: *mut c_void,
) {
    let _errno = sys::ErrnoGuard::save();
    CHANNEL.respond(sys::current_tid(), HANDLER_SKIP_FRAMES);
}

pub(crate) fn install(signal: c_int) -> io::Result<()> {
    sys::install_handler(signal, handle_dump_signal)
}
