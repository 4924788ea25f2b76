use std::fs;
use std::io;

use tracing::{info, warn};

/// Process names that may hold the apt/dpkg lock when apt does not say who does.
pub const LOCK_HOLDER_NAMES: [&str; 2] = ["apt", "apt-get"];

pub trait ProcessTable {
    fn pids_named(&self, name: &str) -> Vec<u32>;

    fn terminate(&mut self, pid: u32) -> io::Result<()>;
}

/// Live processes read from `/proc`, signalled with `kill(2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostProcessTable;

impl ProcessTable for HostProcessTable {
    fn pids_named(&self, name: &str) -> Vec<u32> {
        let Ok(entries) = fs::read_dir("/proc") else {
            return Vec::new();
        };

        let mut pids = Vec::new();
        for entry in entries.flatten() {
            let Some(pid) = entry
                .file_name()
                .to_str()
                .and_then(|value| value.parse::<u32>().ok())
            else {
                continue;
            };
            // Processes can exit between listing and reading; skip them.
            let Ok(comm) = fs::read_to_string(entry.path().join("comm")) else {
                continue;
            };
            if comm.trim_end() == name {
                pids.push(pid);
            }
        }
        pids.sort_unstable();
        pids
    }

    fn terminate(&mut self, pid: u32) -> io::Result<()> {
        let pid = libc::pid_t::try_from(pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

/// Terminate whatever holds the package manager lock.
///
/// `holder` is the pid apt reported, if any. Without it every process named
/// in [`LOCK_HOLDER_NAMES`] is terminated. The current process, pid 0 and
/// init are never signalled. Returns the pids that were signalled.
pub fn terminate_lock_holders<P>(processes: &mut P, holder: Option<u32>) -> Vec<u32>
where
    P: ProcessTable + ?Sized,
{
    let own_pid = std::process::id();
    let mut candidates = match holder {
        Some(pid) => vec![pid],
        None => LOCK_HOLDER_NAMES
            .iter()
            .flat_map(|name| processes.pids_named(name))
            .collect(),
    };
    candidates.sort_unstable();
    candidates.dedup();

    let mut terminated = Vec::new();
    for pid in candidates
        .into_iter()
        .filter(|pid| *pid > 1 && *pid != own_pid)
    {
        match processes.terminate(pid) {
            Ok(()) => {
                info!(pid, "terminated process holding the package manager lock");
                terminated.push(pid);
            }
            Err(err) => warn!(pid, error = %err, "failed to terminate lock holder"),
        }
    }
    terminated
}
