use std::sync::mpsc;
use std::thread;

use peeps_threads::capture_thread_stack;

use super::report;
use crate::{AnyResult, Options};

pub fn run(options: &Options) -> AnyResult<()> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("short-lived".to_owned())
        .spawn(move || {
            let _ = tx.send(peeps_threads::current_tid());
        })
        .map_err(|e| format!("failed to spawn thread: {e}"))?
        .join()
        .map_err(|_| "short-lived thread panicked".to_owned())?;
    let tid = rx
        .recv()
        .map_err(|_| "short-lived thread never reported its tid".to_owned())?;

    report(options, tid, capture_thread_stack(tid))
}
