//! Daemons of the paddock job processor.
//!
//! - [`Whip`]: admission dispatcher promoting ready jobs under concurrency limits
//! - [`Pool`]: worker-pool supervisor spawning one workhorse process per job
//! - [`Workhorse`]: runs exactly one job and writes its terminal status
//! - [`Hostler`]: watchdog reclaiming jobs whose workhorse died
//! - [`Manager`]: operator control plane over pool instance statuses
//! - [`Launcher`]: starts one pool process per configured pool
//!
//! Every daemon is a single sequential loop that exits on the first
//! infrastructure error; an external supervisor restarts it.

mod env;
mod error;
mod handler;
mod hostler;
mod inline;
mod launcher;
mod manager;
mod pool;
mod process;
mod whip;
mod workhorse;

pub use env::ExecEnv;
pub use error::DaemonError;
pub use handler::{FnHandler, HandlerFuture, HandlerRegistry, JobContext, JobError, JobHandler};
pub use hostler::{Hostler, HostlerConfig};
pub use inline::{DUMMY_HOST, DUMMY_POOL, DUMMY_QUEUE, execute_inline};
pub use launcher::Launcher;
pub use manager::Manager;
pub use pool::{Pool, PoolConfig, PoolExit};
pub use process::{
    ProcFsProbe, ProcessProbe, Spawner, WORKHORSE_PROCESS_NAME, WorkhorseSpawner,
    spawn_pool_process,
};
pub use whip::{CurrentLoad, Limits, Whip, WhipConfig, can_enqueue, remaining_sleep};
pub use workhorse::{Workhorse, WorkhorseOutcome};
