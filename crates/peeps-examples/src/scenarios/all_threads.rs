use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use peeps_threads::dump_all_threads;

use super::{Spinner, print_snapshots};
use crate::{AnyResult, Options};

pub fn run(options: &Options) -> AnyResult<()> {
    let _spinner = Spinner::spawn("spinner")?;

    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    let waiter = thread::Builder::new()
        .name("waiter".to_owned())
        .spawn(move || {
            let _ = stop_rx.recv();
        })
        .map_err(|e| format!("failed to spawn waiter: {e}"))?;

    // Give the waiter time to block in recv.
    thread::sleep(Duration::from_millis(50));

    let snapshots = dump_all_threads().map_err(|e| e.to_string())?;
    let responded = snapshots.iter().filter(|s| s.responded).count();
    tracing::info!(threads = snapshots.len(), responded, "dumped all threads");
    print_snapshots(options, &snapshots)?;

    let _ = stop_tx.send(());
    waiter
        .join()
        .map_err(|_| "waiter thread panicked".to_owned())
}
