//! Stack dumps of other threads in the running process.
//!
//! [`dump_thread_stack`] asks a thread for its stack by sending it a signal.
//! The target's handler captures a [`StackTrace`] and publishes it through a
//! process-wide single-slot channel guarded by a spin lock, which is safe to
//! take from signal context. The caller polls that slot for a bounded time,
//! then symbolizes what it got.
//!
//! A thread that blocks the signal, or is not scheduled in time, does not
//! answer; the caller gets a placeholder string instead of a trace. Dumping
//! is Linux-only. Elsewhere every dump reports [`DumpError::Unsupported`].

mod channel;
mod config;
mod current;
mod dumper;
#[cfg(target_os = "linux")]
mod handler;
mod snapshot;
mod spin;
mod sys;
mod tasks;

pub use config::{
    DEFAULT_MAX_POLLS, DEFAULT_POLL_INTERVAL, DEFAULT_SIGNAL, DumperConfig, parse_signal,
};
pub use current::{capture_current_stack_hex, capture_current_stack_text, current_tid};
pub use dumper::{
    DumpError, capture_thread_stack, capture_thread_stack_with, default_config,
    dump_thread_stack, dump_thread_stack_with,
};
pub use peeps_stacktrace::{MAX_FRAMES, StackTrace};
pub use snapshot::{ThreadStackSnapshot, dump_all_threads, dump_all_threads_with};
pub use tasks::{ListThreadsError, list_threads, thread_name};

/// Kernel thread id, as returned by `gettid` and listed in `/proc/self/task`.
pub type Tid = i32;

pub const DELIVERY_FAILED_MESSAGE: &str = "(unable to deliver signal: process may have exited)";
pub const NO_RESPONSE_MESSAGE: &str = "(thread did not respond: maybe it is blocking signals)";
pub const INSTALL_FAILED_MESSAGE: &str = "(unable to install signal handler)";
pub const UNSUPPORTED_MESSAGE: &str = "(thread stack dumps are not supported on this platform)";
