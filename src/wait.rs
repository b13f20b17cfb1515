//! Bounded, cancellable polling used by every blocking step of a launch.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use sysinfo::{Process, ProcessRefreshKind, System, UpdateKind};
use thiserror::Error;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

// Upper bound on how long a sleeping wait ignores its cancel token.
const CANCEL_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub poll_interval: Duration,
    /// `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
        }
    }
}

/// Shared flag that aborts pending waits once set.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Error)]
pub enum WaitError {
    #[error("gave up waiting for {what} after {after:?}")]
    TimedOut { what: String, after: Duration },

    #[error("wait for {what} was cancelled")]
    Cancelled { what: String },

    #[error("failed while waiting for {what}")]
    Io {
        what: String,
        #[source]
        source: io::Error,
    },
}

/// Calls `check` until it reports `true`, sleeping `poll_interval` between
/// calls. The first check happens immediately. Returns the number of checks.
pub fn poll_until(
    policy: &WaitPolicy,
    cancel: &CancelToken,
    what: &str,
    mut check: impl FnMut() -> io::Result<bool>,
) -> Result<u32, WaitError> {
    let started = Instant::now();
    let mut polls = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(WaitError::Cancelled {
                what: what.to_string(),
            });
        }

        polls += 1;
        let done = check().map_err(|source| WaitError::Io {
            what: what.to_string(),
            source,
        })?;
        if done {
            log::debug!("{what}: satisfied after {polls} poll(s)");
            return Ok(polls);
        }

        let elapsed = started.elapsed();
        let mut nap = policy.poll_interval;
        if let Some(timeout) = policy.timeout {
            if elapsed >= timeout {
                return Err(WaitError::TimedOut {
                    what: what.to_string(),
                    after: elapsed,
                });
            }
            nap = nap.min(timeout - elapsed);
        }
        log::debug!("{what}: not yet, polling again in {nap:?}");
        sleep_unless_cancelled(nap, cancel);
    }
}

fn sleep_unless_cancelled(total: Duration, cancel: &CancelToken) {
    let deadline = Instant::now() + total;
    while !cancel.is_cancelled() {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep((deadline - now).min(CANCEL_SLICE));
    }
}

/// Live view of the OS process table.
pub struct SystemProcessTable {
    system: System,
}

impl SystemProcessTable {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    pub fn is_running(&mut self, name: &str) -> bool {
        self.system.refresh_processes_specifics(
            ProcessRefreshKind::new()
                .with_exe(UpdateKind::OnlyIfNotSet)
                .with_cmd(UpdateKind::OnlyIfNotSet),
        );
        self.system
            .processes()
            .values()
            .any(|process| {
                process_names(process).any(|candidate| process_name_matches(candidate, name))
            })
    }
}

// Linux truncates the kernel's process name to 15 bytes, so the executable
// path and argv[0] are checked as well.
fn process_names(process: &Process) -> impl Iterator<Item = &str> {
    let exe = process.exe().and_then(file_name);
    let argv0 = process.cmd().first().and_then(|arg| file_name(Path::new(arg)));
    std::iter::once(process.name()).chain(exe).chain(argv0)
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|name| name.to_str())
}

/// Case-insensitive match where a trailing `.exe` on either side is optional.
pub fn process_name_matches(candidate: &str, wanted: &str) -> bool {
    strip_exe(candidate).eq_ignore_ascii_case(strip_exe(wanted))
}

fn strip_exe(name: &str) -> &str {
    let name = name.trim();
    match name.len().checked_sub(4).and_then(|at| name.get(at..)) {
        Some(ext) if ext.eq_ignore_ascii_case(".exe") => &name[..name.len() - 4],
        _ => name,
    }
}
