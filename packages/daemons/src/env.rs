//! Execution environment of a job.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use paddock_core::ExecutableUnit;
use tokio::process::Command;

/// File that marks a directory as an isolated environment.
const ENV_MARKER: &str = "pyvenv.cfg";

/// Lookup-path overrides applied to the commands a job runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecEnv {
    /// Directories searched before anything else.
    pub sys_path: Vec<PathBuf>,
    /// Isolated environment whose `bin` directory is activated.
    pub venv_path: Option<PathBuf>,
    /// Drop inherited entries that belong to other isolated environments.
    pub venv_exclusive: bool,
}

fn absolute(path: &str) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| PathBuf::from(path))
}

impl ExecEnv {
    /// Build the pool-wide defaults.
    pub fn new(sys_path: &[String], venv_path: Option<&str>, venv_exclusive: bool) -> Self {
        Self {
            sys_path: sys_path.iter().map(|p| absolute(p)).collect(),
            venv_path: venv_path.map(absolute),
            venv_exclusive,
        }
    }

    /// Environment for one job: its own overrides, else the pool defaults.
    ///
    /// The environment path and its exclusivity flag travel together.
    pub fn resolve(unit: &ExecutableUnit, defaults: &ExecEnv) -> Self {
        let sys_path = match &unit.sys_path {
            Some(paths) => paths.iter().map(|p| absolute(p)).collect(),
            None => defaults.sys_path.clone(),
        };

        let (venv_path, venv_exclusive) = match &unit.venv_path {
            Some(path) => (Some(absolute(path)), unit.venv_exclusive.unwrap_or(false)),
            None => (defaults.venv_path.clone(), defaults.venv_exclusive),
        };

        Self {
            sys_path,
            venv_path,
            venv_exclusive,
        }
    }

    /// Compute the lookup path from the inherited one.
    pub fn search_path(&self, inherited: Option<&OsStr>) -> OsString {
        let inherited: Vec<PathBuf> = inherited
            .map(|path| std::env::split_paths(path).collect())
            .unwrap_or_default();

        let mut entries: Vec<PathBuf> = Vec::new();
        for dir in &self.sys_path {
            if !entries.contains(dir) && !inherited.contains(dir) {
                entries.push(dir.clone());
            }
        }

        if let Some(venv) = &self.venv_path {
            let already_active = inherited.iter().any(|entry| entry.starts_with(venv));
            if !already_active {
                entries.push(venv.join("bin"));
            }
        }

        for entry in inherited {
            if self.venv_exclusive && is_foreign_env(&entry, self.venv_path.as_deref()) {
                continue;
            }
            entries.push(entry);
        }

        std::env::join_paths(entries).unwrap_or_default()
    }

    /// Apply the environment to a command about to be spawned.
    pub fn apply(&self, command: &mut Command) {
        command.env(
            "PATH",
            self.search_path(std::env::var_os("PATH").as_deref()),
        );
        if let Some(venv) = &self.venv_path {
            command.env("VIRTUAL_ENV", venv);
        }
    }
}

/// Whether `entry` lives in an isolated environment other than `own`.
fn is_foreign_env(entry: &Path, own: Option<&Path>) -> bool {
    if own.is_some_and(|own| entry.starts_with(own)) {
        return false;
    }
    entry
        .ancestors()
        .skip(1)
        .any(|dir| dir.join(ENV_MARKER).is_file())
}
