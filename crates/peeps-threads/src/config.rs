use std::ffi::c_int;
use std::time::Duration;

use tracing::warn;

/// Signal used to ask a thread for its stack unless configured otherwise.
#[cfg(unix)]
pub const DEFAULT_SIGNAL: c_int = libc::SIGUSR1;
#[cfg(not(unix))]
pub const DEFAULT_SIGNAL: c_int = 10;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);
pub const DEFAULT_MAX_POLLS: u32 = 100;

const SIGNAL_ENV: &str = "PEEPS_STACKDUMP_SIGNAL";
const POLL_MS_ENV: &str = "PEEPS_STACKDUMP_POLL_MS";
const MAX_POLLS_ENV: &str = "PEEPS_STACKDUMP_MAX_POLLS";

/// How a dump request signals its target and how long it waits.
///
/// A healthy thread answers within a few scheduling quanta. Threads that
/// block the signal never answer, so the wait is bounded by
/// `poll_interval * max_polls`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumperConfig {
    pub signal: c_int,
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl Default for DumperConfig {
    fn default() -> Self {
        Self {
            signal: DEFAULT_SIGNAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }
}

impl DumperConfig {
    /// Defaults, overridden by `PEEPS_STACKDUMP_SIGNAL`,
    /// `PEEPS_STACKDUMP_POLL_MS` and `PEEPS_STACKDUMP_MAX_POLLS`.
    /// Malformed values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(SIGNAL_ENV) {
            match parse_signal(&raw) {
                Some(signal) => config.signal = signal,
                None => warn!(var = SIGNAL_ENV, value = %raw, "ignoring unrecognized signal"),
            }
        }

        if let Some(raw) = lookup(POLL_MS_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => config.poll_interval = Duration::from_millis(ms),
                _ => warn!(var = POLL_MS_ENV, value = %raw, "ignoring invalid poll interval"),
            }
        }

        if let Some(raw) = lookup(MAX_POLLS_ENV) {
            match raw.trim().parse::<u32>() {
                Ok(polls) => config.max_polls = polls,
                Err(_) => warn!(var = MAX_POLLS_ENV, value = %raw, "ignoring invalid poll count"),
            }
        }

        config
    }

    /// Upper bound on how long a request waits for its target.
    pub fn timeout(&self) -> Duration {
        self.poll_interval.saturating_mul(self.max_polls)
    }
}

/// Accepts a signal number or one of the names `SIGUSR1`, `SIGUSR2`,
/// `SIGPROF` (with or without the `SIG` prefix).
pub fn parse_signal(raw: &str) -> Option<c_int> {
    let raw = raw.trim();
    if let Ok(number) = raw.parse::<c_int>() {
        return (number > 0).then_some(number);
    }

    let name = raw.strip_prefix("SIG").unwrap_or(raw);
    match name {
        #[cfg(unix)]
        "USR1" => Some(libc::SIGUSR1),
        #[cfg(unix)]
        "USR2" => Some(libc::SIGUSR2),
        #[cfg(unix)]
        "PROF" => Some(libc::SIGPROF),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> DumperConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DumperConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_give_one_second_budget() {
        let config = DumperConfig::default();
        assert_eq!(config.signal, DEFAULT_SIGNAL);
        assert_eq!(config.timeout(), Duration::from_secs(1));
    }

    #[test]
    fn env_overrides_are_applied() {
        let config = config_from(&[
            (SIGNAL_ENV, "SIGUSR2"),
            (POLL_MS_ENV, "5"),
            (MAX_POLLS_ENV, "40"),
        ]);
        assert_eq!(config.signal, libc::SIGUSR2);
        assert_eq!(config.poll_interval, Duration::from_millis(5));
        assert_eq!(config.max_polls, 40);
        assert_eq!(config.timeout(), Duration::from_millis(200));
    }

    #[test]
    fn malformed_values_fall_back_to_defaults() {
        let config = config_from(&[
            (SIGNAL_ENV, "SIGNOPE"),
            (POLL_MS_ENV, "0"),
            (MAX_POLLS_ENV, "-3"),
        ]);
        assert_eq!(config, DumperConfig::default());
    }

    #[test]
    fn parses_signal_names_and_numbers() {
        assert_eq!(parse_signal("USR1"), Some(libc::SIGUSR1));
        assert_eq!(parse_signal(" SIGPROF "), Some(libc::SIGPROF));
        assert_eq!(parse_signal("12"), Some(12));
        assert_eq!(parse_signal("0"), None);
        assert_eq!(parse_signal("-1"), None);
        assert_eq!(parse_signal("HUP"), None);
    }
}
