//! Enumerating the threads of this process.

use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;

use tracing::warn;

use crate::Tid;

#[cfg(target_os = "linux")]
const TASK_DIR: &str = "/proc/self/task";

#[derive(Debug)]
pub enum ListThreadsError {
    Io { path: PathBuf, source: io::Error },
    Unsupported { target_os: &'static str },
}

impl fmt::Display for ListThreadsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "failed to read {}: {source}", path.display()),
            Self::Unsupported { target_os } => {
                write!(f, "listing threads is not supported on {target_os}")
            }
        }
    }
}

impl Error for ListThreadsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Unsupported { .. } => None,
        }
    }
}

/// Kernel ids of every live thread in this process, ascending.
///
/// Threads may start or exit right after the listing is taken.
#[cfg(target_os = "linux")]
pub fn list_threads() -> Result<Vec<Tid>, ListThreadsError> {
    let io_err = |source| ListThreadsError::Io {
        path: PathBuf::from(TASK_DIR),
        source,
    };

    let mut names = Vec::new();
    for entry in std::fs::read_dir(TASK_DIR).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(parse_task_entries(names))
}

#[cfg(not(target_os = "linux"))]
pub fn list_threads() -> Result<Vec<Tid>, ListThreadsError> {
    Err(ListThreadsError::Unsupported {
        target_os: std::env::consts::OS,
    })
}

/// Kernel-assigned name of thread `tid`, as in `/proc/self/task/<tid>/comm`.
/// `None` once the thread has exited.
#[cfg(target_os = "linux")]
pub fn thread_name(tid: Tid) -> Option<String> {
    let comm = std::fs::read_to_string(format!("{TASK_DIR}/{tid}/comm")).ok()?;
    let name = comm.trim_end_matches('\n');
    (!name.is_empty()).then(|| name.to_owned())
}

#[cfg(not(target_os = "linux"))]
pub fn thread_name(_tid: Tid) -> Option<String> {
    None
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_task_entries<I, S>(names: I) -> Vec<Tid>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut tids: Vec<Tid> = names
        .into_iter()
        .filter_map(|name| {
            let name = name.as_ref();
            match name.parse::<Tid>() {
                Ok(tid) if tid > 0 => Some(tid),
                _ => {
                    warn!(entry = name, "skipping unexpected task directory entry");
                    None
                }
            }
        })
        .collect();
    tids.sort_unstable();
    tids.dedup();
    tids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_entries_are_sorted_and_filtered() {
        let tids = parse_task_entries(["812", "17", "garbage", "0", "17", "-4", "90"]);
        assert_eq!(tids, vec![17, 90, 812]);
    }

    #[test]
    fn empty_task_dir_yields_no_threads() {
        assert!(parse_task_entries(Vec::<String>::new()).is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn current_thread_is_listed_and_named() {
        let me = crate::sys::current_tid();
        let tids = list_threads().expect("list threads");
        assert!(tids.contains(&me), "{me} missing from {tids:?}");
        assert!(thread_name(me).is_some());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn exited_thread_has_no_name() {
        assert_eq!(thread_name(Tid::MAX), None);
    }
}
