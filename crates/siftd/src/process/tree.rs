//! Termination of an execution unit and everything it spawned.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill, killpg};
use nix::unistd::Pid;
use thiserror::Error;
use tracing::debug;

use super::PROCESS_TARGET;

/// Errors raised while terminating processes.
#[derive(Debug, Clone, Error)]
pub enum ProcessError {
    /// A signal could not be delivered.
    #[error("failed to signal process {pid}: {source}")]
    Signal {
        /// Target pid or process group.
        pid: i32,
        /// Underlying errno.
        #[source]
        source: Errno,
    },
}

/// Terminates execution units.
///
/// The production implementation walks the process table; tests substitute
/// their own to observe or fail kills.
pub trait ProcessKiller: Send + Sync {
    /// Kills `pid`, all of its descendants and its process group.
    ///
    /// # Errors
    ///
    /// [`ProcessError`] when a live process could not be signalled.
    fn kill_tree(&self, pid: Pid) -> Result<(), ProcessError>;

    /// Kills whatever is left in process group `pgid` after a normal exit.
    ///
    /// # Errors
    ///
    /// [`ProcessError`] when a live group could not be signalled.
    fn reap_group(&self, pgid: Pid) -> Result<(), ProcessError>;
}

/// Kills process trees with `SIGKILL`, deepest descendants first.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessKiller;

impl ProcessKiller for SystemProcessKiller {
    fn kill_tree(&self, pid: Pid) -> Result<(), ProcessError> {
        let mut victims = descendants(pid);
        victims.sort_by(|(_, a), (_, b)| b.cmp(a));
        for (victim, depth) in &victims {
            debug!(
                target: PROCESS_TARGET,
                pid = victim.as_raw(),
                depth,
                "killing descendant"
            );
            signal_one(*victim)?;
        }
        signal_one(pid)?;
        self.reap_group(pid)
    }

    fn reap_group(&self, pgid: Pid) -> Result<(), ProcessError> {
        match killpg(pgid, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(source) => Err(ProcessError::Signal {
                pid: pgid.as_raw(),
                source,
            }),
        }
    }
}

fn signal_one(pid: Pid) -> Result<(), ProcessError> {
    match kill(pid, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(source) => Err(ProcessError::Signal {
            pid: pid.as_raw(),
            source,
        }),
    }
}

/// Descendants of `root` with their depth below it.
fn descendants(root: Pid) -> Vec<(Pid, usize)> {
    let children = children_by_parent(Path::new("/proc"));
    let mut found = Vec::new();
    let mut frontier = vec![(root.as_raw(), 0_usize)];
    while let Some((parent, depth)) = frontier.pop() {
        for child in children.get(&parent).into_iter().flatten() {
            found.push((Pid::from_raw(*child), depth + 1));
            frontier.push((*child, depth + 1));
        }
    }
    found
}

/// Maps each parent pid to its children by scanning `<proc>/*/stat`.
fn children_by_parent(proc_root: &Path) -> HashMap<i32, Vec<i32>> {
    let mut map: HashMap<i32, Vec<i32>> = HashMap::new();
    let Ok(entries) = fs::read_dir(proc_root) else {
        return map;
    };
    for entry in entries.flatten() {
        let Some(pid) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<i32>().ok())
        else {
            continue;
        };
        let Ok(stat) = fs::read_to_string(entry.path().join("stat")) else {
            continue;
        };
        if let Some(ppid) = parse_ppid(&stat) {
            map.entry(ppid).or_default().push(pid);
        }
    }
    map
}

/// Parent pid from a `/proc/<pid>/stat` line.
///
/// The command name is parenthesised and may itself contain spaces or
/// parentheses, so fields are counted from the last `)`.
fn parse_ppid(stat: &str) -> Option<i32> {
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    fields.next()?;
    fields.next()?.parse().ok()
}
