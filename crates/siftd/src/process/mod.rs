//! Execution unit plumbing: process-tree termination and result artefacts.

pub mod artifact;
mod tree;

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;

pub use self::artifact::{ArtifactError, cleanup_stale_artifacts, read_artifact, write_artifact};
pub use self::tree::{ProcessError, ProcessKiller, SystemProcessKiller};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");

/// Returns `true` while `pid` names a live process.
///
/// A process owned by another user still counts as alive.
pub(crate) fn process_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    match kill(Pid::from_raw(pid), None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}
