//! Cross-thread dump requests.
//!
//! A request moves the process-wide channel through
//! idle → armed → (responded | timed out) → idle:
//!
//! 1. take the request mutex, so one request is in flight per process;
//! 2. install the signal handler on first use of a signal;
//! 3. arm the channel with the target tid;
//! 4. `tgkill` the target;
//! 5. poll the channel until the handler publishes or the budget runs out;
//! 6. harvest and reset the channel.
//!
//! A handler that runs after its request timed out finds the channel idle or
//! pointing at another thread and does nothing.

use std::error::Error;
use std::ffi::c_int;
use std::fmt;
use std::io;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use peeps_stacktrace::StackTrace;
use tracing::{debug, warn};

use crate::channel::Channel;
use crate::config::DumperConfig;
use crate::{
    DELIVERY_FAILED_MESSAGE, INSTALL_FAILED_MESSAGE, NO_RESPONSE_MESSAGE, Tid,
    UNSUPPORTED_MESSAGE, sys,
};

/// Shared with the signal handler. Only touched under its spin lock.
pub(crate) static CHANNEL: Channel = Channel::new();

/// Held for the whole lifetime of a request. Never taken by the handler.
static REQUEST: Mutex<RequestState> = parking_lot::const_mutex(RequestState::new());

static DEFAULT_CONFIG: OnceLock<DumperConfig> = OnceLock::new();

struct RequestState {
    /// Bit `n` is set once the handler is installed for signal `n`.
    installed_signals: u64,
}

impl RequestState {
    const fn new() -> Self {
        Self {
            installed_signals: 0,
        }
    }

    fn ensure_handler(&mut self, signal: c_int) -> Result<(), DumpError> {
        if !(1..64).contains(&signal) {
            return Err(DumpError::InstallFailed {
                signal,
                source: io::Error::new(io::ErrorKind::InvalidInput, "signal number out of range"),
            });
        }

        let bit = 1u64 << signal;
        if self.installed_signals & bit != 0 {
            return Ok(());
        }

        install_handler(signal).map_err(|source| DumpError::InstallFailed { signal, source })?;
        self.installed_signals |= bit;
        debug!(signal, "installed stack dump signal handler");
        Ok(())
    }
}

#[cfg(target_os = "linux")]
fn install_handler(signal: c_int) -> io::Result<()> {
    crate::handler::install(signal)
}

#[cfg(not(target_os = "linux"))]
fn install_handler(_signal: c_int) -> io::Result<()> {
    Err(io::ErrorKind::Unsupported.into())
}

/// Why a dump request produced no trace.
#[derive(Debug)]
pub enum DumpError {
    Unsupported { target_os: &'static str },
    InstallFailed { signal: c_int, source: io::Error },
    /// The target could not be signaled, usually because it already exited.
    DeliveryFailed { tid: Tid, source: io::Error },
    /// The target did not answer in time, usually because it blocks the signal.
    NoResponse { tid: Tid, waited: Duration },
}

impl DumpError {
    /// The fixed text `dump_thread_stack` returns in place of a trace.
    pub fn placeholder(&self) -> &'static str {
        match self {
            Self::Unsupported { .. } => UNSUPPORTED_MESSAGE,
            Self::InstallFailed { .. } => INSTALL_FAILED_MESSAGE,
            Self::DeliveryFailed { .. } => DELIVERY_FAILED_MESSAGE,
            Self::NoResponse { .. } => NO_RESPONSE_MESSAGE,
        }
    }
}

impl fmt::Display for DumpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported { target_os } => {
                write!(f, "cross-thread stack dumps are not supported on {target_os}")
            }
            Self::InstallFailed { signal, source } => {
                write!(f, "failed to install handler for signal {signal}: {source}")
            }
            Self::DeliveryFailed { tid, source } => {
                write!(f, "failed to signal thread {tid}: {source}")
            }
            Self::NoResponse { tid, waited } => {
                write!(f, "thread {tid} did not respond within {waited:?}")
            }
        }
    }
}

impl Error for DumpError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InstallFailed { source, .. } | Self::DeliveryFailed { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }
}

/// Process-wide configuration, read from the environment on first use.
pub fn default_config() -> &'static DumperConfig {
    DEFAULT_CONFIG.get_or_init(DumperConfig::from_env)
}

/// Returns the symbolized stack of thread `tid` of this process, or a fixed
/// placeholder explaining why none could be taken.
pub fn dump_thread_stack(tid: Tid) -> String {
    dump_thread_stack_with(tid, default_config())
}

pub fn dump_thread_stack_with(tid: Tid, config: &DumperConfig) -> String {
    match capture_thread_stack_with(tid, config) {
        Ok(trace) => trace.symbolize(),
        Err(err) => err.placeholder().to_owned(),
    }
}

/// Captures the raw stack of thread `tid` without symbolizing it.
pub fn capture_thread_stack(tid: Tid) -> Result<StackTrace, DumpError> {
    capture_thread_stack_with(tid, default_config())
}

pub fn capture_thread_stack_with(tid: Tid, config: &DumperConfig) -> Result<StackTrace, DumpError> {
    if !sys::SUPPORTED {
        return Err(DumpError::Unsupported {
            target_os: std::env::consts::OS,
        });
    }

    let mut request = REQUEST.lock();
    request.ensure_handler(config.signal).inspect_err(|err| {
        warn!(%err, "stack dump unavailable");
    })?;

    CHANNEL.arm(tid);
    debug!(tid, signal = config.signal, "requesting stack dump");

    if let Err(source) = sys::signal_thread(tid, config.signal) {
        CHANNEL.disarm();
        debug!(tid, %source, "could not signal thread");
        return Err(DumpError::DeliveryFailed { tid, source });
    }

    let signaled_at = Instant::now();
    let mut polls = 0;
    while !CHANNEL.is_ready() && polls < config.max_polls {
        std::thread::sleep(config.poll_interval);
        polls += 1;
    }

    let harvested = CHANNEL.harvest(tid);
    drop(request);

    match harvested {
        Some(trace) => {
            debug!(tid, frames = trace.len(), polls, "stack dump received");
            Ok(trace)
        }
        None => {
            let waited = signaled_at.elapsed();
            warn!(tid, ?waited, "thread did not respond to stack dump request");
            Err(DumpError::NoResponse { tid, waited })
        }
    }
}
