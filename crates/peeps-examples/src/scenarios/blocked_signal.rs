use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use peeps_threads::{DumperConfig, capture_thread_stack_with, default_config};

use super::report;
use crate::{AnyResult, Options};

pub fn run(options: &Options) -> AnyResult<()> {
    let config = DumperConfig {
        poll_interval: Duration::from_millis(10),
        max_polls: 20,
        ..*default_config()
    };
    let signal = config.signal;

    let (tid_tx, tid_rx) = mpsc::channel();
    let (unblock_tx, unblock_rx) = mpsc::channel::<()>();
    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    let handle = thread::Builder::new()
        .name("masked".to_owned())
        .spawn(move || {
            let mut set: libc::sigset_t = unsafe { std::mem::zeroed() };
            unsafe {
                libc::sigemptyset(&mut set);
                libc::sigaddset(&mut set, signal);
                libc::pthread_sigmask(libc::SIG_BLOCK, &set, std::ptr::null_mut());
            }
            let _ = tid_tx.send(peeps_threads::current_tid());

            let _ = unblock_rx.recv();
            unsafe {
                libc::pthread_sigmask(libc::SIG_UNBLOCK, &set, std::ptr::null_mut());
            }
            let _ = tid_tx.send(peeps_threads::current_tid());
            let _ = stop_rx.recv();
        })
        .map_err(|e| format!("failed to spawn thread: {e}"))?;

    let tid = tid_rx
        .recv()
        .map_err(|_| "masked thread exited early".to_owned())?;

    if !options.json {
        println!("signal {signal} masked; expecting a timeout after {:?}", config.timeout());
    }
    report(options, tid, capture_thread_stack_with(tid, &config))?;

    unblock_tx
        .send(())
        .map_err(|_| "masked thread exited early".to_owned())?;
    tid_rx
        .recv()
        .map_err(|_| "masked thread exited early".to_owned())?;

    if !options.json {
        println!("signal {signal} unmasked");
    }
    report(options, tid, capture_thread_stack_with(tid, &config))?;

    let _ = stop_tx.send(());
    handle
        .join()
        .map_err(|_| "masked thread panicked".to_owned())
}
