use facet::Facet;
use peeps_stacktrace::DebugInfoResolver;
use tracing::debug;

use crate::Tid;
use crate::config::DumperConfig;
use crate::dumper::{capture_thread_stack_with, default_config};
use crate::tasks::{ListThreadsError, list_threads, thread_name};

/// One thread's entry in a whole-process dump.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct ThreadStackSnapshot {
    pub tid: Tid,
    /// `None` if the thread exited before its name was read.
    pub name: Option<String>,
    /// Symbolized frames, or the placeholder explaining why there are none.
    pub backtrace: String,
    pub responded: bool,
}

/// Dumps every thread of the process, one request at a time, in tid order.
///
/// The calling thread is included. Threads started after the listing are
/// missed; threads that exit during the sweep get a placeholder.
pub fn dump_all_threads() -> Result<Vec<ThreadStackSnapshot>, ListThreadsError> {
    dump_all_threads_with(default_config())
}

pub fn dump_all_threads_with(
    config: &DumperConfig,
) -> Result<Vec<ThreadStackSnapshot>, ListThreadsError> {
    let tids = list_threads()?;
    debug!(threads = tids.len(), "dumping all threads");

    // One resolver for the sweep so each module's debug info is parsed once.
    let resolver = DebugInfoResolver::new();
    let snapshots = tids
        .into_iter()
        .map(|tid| {
            let name = thread_name(tid);
            match capture_thread_stack_with(tid, config) {
                Ok(trace) => ThreadStackSnapshot {
                    tid,
                    name,
                    backtrace: trace.symbolize_with(&resolver),
                    responded: true,
                },
                Err(err) => ThreadStackSnapshot {
                    tid,
                    name,
                    backtrace: err.placeholder().to_owned(),
                    responded: false,
                },
            }
        })
        .collect();
    Ok(snapshots)
}
