//! paddock: distributed background job processor.
//!
//! One binary carries every daemon and the operator tooling; deployments run
//! `paddock whip`, `paddock hostler` and `paddock pools` (or single
//! `paddock pool` instances) under a process supervisor.

mod commands;
mod config;
mod handlers;
mod telemetry;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use paddock_core::{EntityType, JobId, JobStatus, PoolStatus};

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Parser, Debug)]
#[command(name = "paddock")]
#[command(about = "Distributed background job processor")]
#[command(version)]
struct Args {
    /// Configuration file
    #[arg(long, short = 'c', env = "PADDOCK_CONFIG", default_value = DEFAULT_CONFIG_PATH, global = true)]
    config: PathBuf,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Configuration file operations
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Job store schema operations
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
    /// Delete jobs not saved for a number of days
    Cleanup {
        #[arg(long, default_value = "7")]
        days: u32,
    },
    /// Job operations
    Job {
        #[command(subcommand)]
        action: JobAction,
    },
    /// Concurrency limit operations
    Limit {
        #[command(subcommand)]
        action: LimitAction,
    },
    /// Queue routing operations
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
    /// Pool instance status operations
    Manager {
        #[command(subcommand)]
        action: ManagerAction,
    },
    /// Run the admission dispatcher
    Whip,
    /// Run the stale job watchdog
    Hostler,
    /// Run one pool supervisor
    Pool {
        /// Pool whose dispatch queue to consume
        #[arg(long)]
        name: String,
    },
    /// Launch one pool supervisor process per pool
    Pools {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Run a single dispatched job (started by a pool)
    #[command(hide = true)]
    Workhorse {
        #[arg(long)]
        pool: String,
        #[arg(long)]
        pool_instance: String,
        #[arg(long)]
        job_id: JobId,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Write the default configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum DbAction {
    /// Create tables and indexes
    Init,
    /// Remove every table
    Drop,
}

#[derive(Subcommand, Debug)]
enum JobAction {
    /// Submit a job
    Submit {
        /// Registered handler name
        handler: String,
        #[arg(long)]
        pool: String,
        /// Defaults to the pool name
        #[arg(long)]
        queue: Option<String>,
        #[arg(long)]
        host: Option<String>,
        /// Positional argument, JSON or plain string (repeatable)
        #[arg(long = "arg")]
        args: Vec<String>,
        /// Keyword argument as key=value, value JSON or plain string (repeatable)
        #[arg(long = "kwarg")]
        kwargs: Vec<String>,
        /// Initial status; anything but new or restart means new
        #[arg(long)]
        status: Option<String>,
        /// Do not run before this many minutes from now
        #[arg(long, default_value = "0")]
        wait_minutes: u64,
        /// Extra lookup path directory (repeatable)
        #[arg(long = "sys-path")]
        sys_path: Vec<String>,
        #[arg(long)]
        venv: Option<String>,
        #[arg(long, requires = "venv")]
        venv_exclusive: bool,
    },
    /// Show one job
    Show { id: JobId },
    /// List jobs
    List {
        #[arg(long)]
        pool: Option<String>,
        #[arg(long)]
        queue: Option<String>,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        status: Option<JobStatus>,
        #[arg(long, default_value = "50")]
        limit: usize,
    },
    /// Run a job in this process, bypassing the pools
    Execute { id: JobId },
}

#[derive(Subcommand, Debug)]
enum LimitAction {
    /// Create or replace a limit
    Set {
        /// pool or queue
        entity_type: EntityType,
        entity: String,
        #[arg(value_parser = clap::value_parser!(i64).range(1..))]
        limit: i64,
    },
    List,
    Delete {
        entity_type: EntityType,
        entity: String,
    },
}

#[derive(Subcommand, Debug)]
enum QueueAction {
    /// Create or replace a queue routing record
    Add { name: String, pool: String },
    List,
}

#[derive(Subcommand, Debug)]
enum ManagerAction {
    /// Show pool instances
    Status(PoolSelection),
    /// Ask pools to drain (default: active instances)
    Terminate(PoolSelection),
    /// Kill the workhorses of pools (default: dead instances)
    Kill(PoolSelection),
    /// Remove registry entries (default: terminated instances)
    Clean(PoolSelection),
}

#[derive(clap::Args, Debug)]
struct PoolSelection {
    /// Pool names; none selects every pool
    pools: Vec<String>,
    /// Source statuses (repeatable)
    #[arg(long = "status")]
    statuses: Vec<PoolStatus>,
}

impl PoolSelection {
    fn statuses(&self) -> Option<&[PoolStatus]> {
        (!self.statuses.is_empty()).then_some(self.statuses.as_slice())
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    telemetry::init_tracing(args.verbose);

    match commands::run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
