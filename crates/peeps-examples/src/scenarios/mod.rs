use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use peeps_threads::{DumpError, StackTrace, ThreadStackSnapshot, Tid, thread_name};

use crate::{AnyResult, Options};

pub mod all_threads;
pub mod blocked_signal;
pub mod exited_thread;
pub mod spinning_thread;

pub struct Scenario {
    pub name: &'static str,
    pub description: &'static str,
    pub run: fn(&Options) -> AnyResult<()>,
}

pub static ALL: &[Scenario] = &[
    Scenario {
        name: "spinning_thread",
        description: "dump a thread busy in a hot loop",
        run: spinning_thread::run,
    },
    Scenario {
        name: "blocked_signal",
        description: "dump a thread that masks the dump signal, then unmask it",
        run: blocked_signal::run,
    },
    Scenario {
        name: "exited_thread",
        description: "dump a thread id whose thread has already exited",
        run: exited_thread::run,
    },
    Scenario {
        name: "all_threads",
        description: "dump every thread of the process",
        run: all_threads::run,
    },
];

/// A named thread spinning in [`busy_loop`] until dropped.
pub(crate) struct Spinner {
    pub(crate) tid: Tid,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Spinner {
    pub(crate) fn spawn(name: &str) -> AnyResult<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn({
                let stop = Arc::clone(&stop);
                move || {
                    let _ = tx.send(peeps_threads::current_tid());
                    busy_loop(&stop);
                }
            })
            .map_err(|e| format!("failed to spawn '{name}': {e}"))?;
        let tid = rx
            .recv()
            .map_err(|_| format!("thread '{name}' exited before reporting its tid"))?;
        Ok(Self {
            tid,
            stop,
            handle: Some(handle),
        })
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[inline(never)]
pub(crate) fn busy_loop(stop: &AtomicBool) {
    while !stop.load(Ordering::Relaxed) {
        std::hint::spin_loop();
    }
}

/// Prints one dump outcome, as text or as a JSON snapshot.
pub(crate) fn report(
    options: &Options,
    tid: Tid,
    outcome: Result<StackTrace, DumpError>,
) -> AnyResult<()> {
    let snapshot = match outcome {
        Ok(trace) => ThreadStackSnapshot {
            tid,
            name: thread_name(tid),
            backtrace: trace.symbolize(),
            responded: true,
        },
        Err(err) => {
            tracing::info!(tid, %err, "no trace");
            ThreadStackSnapshot {
                tid,
                name: thread_name(tid),
                backtrace: err.placeholder().to_owned(),
                responded: false,
            }
        }
    };
    print_snapshots(options, std::slice::from_ref(&snapshot))
}

pub(crate) fn print_snapshots(
    options: &Options,
    snapshots: &[ThreadStackSnapshot],
) -> AnyResult<()> {
    if options.json {
        // One JSON object per line.
        for snapshot in snapshots {
            let json = facet_json::to_string(snapshot);
            println!("{json}");
        }
        return Ok(());
    }

    for snapshot in snapshots {
        let name = snapshot.name.as_deref().unwrap_or("?");
        println!("thread {} ({name}):", snapshot.tid);
        if snapshot.backtrace.ends_with('\n') {
            print!("{}", snapshot.backtrace);
        } else {
            println!("{}", snapshot.backtrace);
        }
    }
    Ok(())
}
