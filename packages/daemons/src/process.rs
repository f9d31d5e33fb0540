//! Child processes and process identity.

use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use paddock_core::JobId;
use tokio::process::{Child, Command};

/// `argv[0]` of every workhorse process.
pub const WORKHORSE_PROCESS_NAME: &str = "paddock-workhorse";

/// Answers whether a pid is a live workhorse of this system.
pub trait ProcessProbe: Send + Sync {
    fn is_workhorse(&self, pid: u32) -> bool;
}

/// Probe that reads `/proc/<pid>/cmdline`.
///
/// A pid recycled by an unrelated program fails the name check, and a
/// zombie has an empty command line, so neither counts as alive.
#[derive(Debug, Clone)]
pub struct ProcFsProbe {
    proc_root: PathBuf,
}

impl Default for ProcFsProbe {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
        }
    }
}

impl ProcFsProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read process tables from another mount point.
    pub fn with_root(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }
}

impl ProcessProbe for ProcFsProbe {
    fn is_workhorse(&self, pid: u32) -> bool {
        let cmdline = self.proc_root.join(pid.to_string()).join("cmdline");
        match std::fs::read(&cmdline) {
            Ok(raw) => raw.starts_with(WORKHORSE_PROCESS_NAME.as_bytes()),
            Err(_) => false,
        }
    }
}

/// Starts the isolated process that runs one job.
pub trait Spawner: Send + Sync {
    fn spawn(&self, pool: &str, pool_instance_id: &str, job_id: JobId) -> std::io::Result<Child>;
}

/// Spawner that re-executes the current binary as a workhorse.
#[derive(Debug, Clone)]
pub struct WorkhorseSpawner {
    program: PathBuf,
    config_path: Option<PathBuf>,
}

impl WorkhorseSpawner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            config_path: None,
        }
    }

    /// Spawner for the binary of the running process.
    pub fn current() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    /// Pass this configuration file to every workhorse.
    pub fn with_config(mut self, config_path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(config_path.into());
        self
    }
}

impl Spawner for WorkhorseSpawner {
    fn spawn(&self, pool: &str, pool_instance_id: &str, job_id: JobId) -> std::io::Result<Child> {
        let mut command = std::process::Command::new(&self.program);
        command.arg0(WORKHORSE_PROCESS_NAME);
        if let Some(config_path) = &self.config_path {
            command.arg("--config").arg(config_path);
        }
        command
            .arg("workhorse")
            .arg("--pool")
            .arg(pool)
            .arg("--pool-instance")
            .arg(pool_instance_id)
            .arg("--job-id")
            .arg(job_id.to_string())
            .stdin(Stdio::null())
            .process_group(0);

        Command::from(command).spawn()
    }
}

/// Start a detached pool supervisor process for `pool`.
pub fn spawn_pool_process(
    program: &Path,
    config_path: Option<&Path>,
    pool: &str,
) -> std::io::Result<Child> {
    let mut command = Command::new(program);
    if let Some(config_path) = config_path {
        command.arg("--config").arg(config_path);
    }
    command
        .arg("pool")
        .arg("--name")
        .arg(pool)
        .stdin(Stdio::null())
        .process_group(0);
    command.spawn()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_process_is_not_a_workhorse() {
        assert!(!ProcFsProbe::new().is_workhorse(std::process::id()));
    }

    #[test]
    fn missing_pid_is_not_alive() {
        let root = tempfile::tempdir().unwrap();
        assert!(!ProcFsProbe::with_root(root.path()).is_workhorse(12345));
    }

    #[test]
    fn name_prefix_identifies_workhorse() {
        let root = tempfile::tempdir().unwrap();
        let live = root.path().join("100");
        let recycled = root.path().join("200");
        let zombie = root.path().join("300");
        std::fs::create_dir_all(&live).unwrap();
        std::fs::create_dir_all(&recycled).unwrap();
        std::fs::create_dir_all(&zombie).unwrap();
        std::fs::write(live.join("cmdline"), b"paddock-workhorse\0--job-id\x007\0").unwrap();
        std::fs::write(recycled.join("cmdline"), b"/usr/bin/vim\0notes.txt\0").unwrap();
        std::fs::write(zombie.join("cmdline"), b"").unwrap();

        let probe = ProcFsProbe::with_root(root.path());
        assert!(probe.is_workhorse(100));
        assert!(!probe.is_workhorse(200));
        assert!(!probe.is_workhorse(300));
    }

    /// Process group id from `/proc/<pid>/stat`.
    fn process_group_of(pid: u32) -> Option<u32> {
        let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
        let (_, fields) = stat.rsplit_once(')')?;
        // state, ppid, pgrp
        fields.split_whitespace().nth(2)?.parse().ok()
    }

    #[tokio::test]
    async fn workhorse_leads_its_own_process_group() {
        // `sleep` rejects the workhorse arguments; the exited child stays
        // visible until it is waited for.
        let mut child = WorkhorseSpawner::new("sleep")
            .spawn("p", "instance", JobId(1))
            .unwrap();
        let pid = child.id().unwrap();

        assert_eq!(process_group_of(pid), Some(pid));
        assert_ne!(process_group_of(std::process::id()), Some(pid));

        child.wait().await.unwrap();
    }
}
