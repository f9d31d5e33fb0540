//! Command implementations.

use std::future::Future;
use std::path::Path;

use anyhow::{Context, bail};
use chrono::Utc;
use coord::{CoordinationStore, PoolInstance, RedisCoordination};
use daemons::{
    Hostler, Launcher, Manager, Pool, PoolExit, ProcFsProbe, Whip, Workhorse, WorkhorseSpawner,
    execute_inline,
};
use db::repositories::{JobFilter, JobRepository, LimitRepository, QueueRepository};
use db::{Database, DbConfig};
use paddock_core::{ExecutableUnit, Job, Limit, NewJob, Queue};
use serde_json::{Map, Value};
use tokio::signal::unix::{SignalKind, signal};

use crate::config::Settings;
use crate::handlers::builtin_registry;
use crate::{
    Args, Command, ConfigAction, DbAction, JobAction, LimitAction, ManagerAction, PoolSelection,
    QueueAction,
};

pub async fn run(args: Args) -> anyhow::Result<()> {
    if let Command::Config {
        action: ConfigAction::Init { force },
    } = &args.command
    {
        return config_init(&args.config, *force);
    }

    let settings = Settings::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    match args.command {
        Command::Config { .. } => Ok(()),
        Command::Db { action } => {
            let db = db::connect(&settings.db_config()).await?;
            match action {
                DbAction::Init => {
                    db::init_schema(&db).await?;
                    println!("Schema applied");
                }
                DbAction::Drop => {
                    db::drop_schema(&db).await?;
                    println!("Tables removed");
                }
            }
            Ok(())
        }
        Command::Cleanup { days } => {
            let jobs = JobRepository::new(open_db(&settings.db_config()).await?);
            let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));
            let deleted = jobs.delete_updated_before(cutoff).await?;
            println!("Deleted {deleted} jobs not saved since {cutoff}");
            Ok(())
        }
        Command::Job { action } => job(&settings, action).await,
        Command::Limit { action } => limit(&settings, action).await,
        Command::Queue { action } => queue(&settings, action).await,
        Command::Manager { action } => {
            let store = coordination(&settings).await?;
            manager(Manager::new(store), action).await
        }
        Command::Whip => {
            let db = open_db(&settings.db_config()).await?;
            let store = coordination(&settings).await?;
            let shutdown = shutdown_signal()?;
            let mut whip = Whip::new(settings.whip_config(), db, store);
            tokio::select! {
                result = whip.run() => result?,
                _ = shutdown => tracing::info!("Whip stopped"),
            }
            Ok(())
        }
        Command::Hostler => {
            let jobs = JobRepository::new(open_db(&settings.db_config()).await?);
            let shutdown = shutdown_signal()?;
            let mut hostler = Hostler::new(settings.hostler_config(), jobs, ProcFsProbe::new());
            tokio::select! {
                result = hostler.run() => result?,
                _ = shutdown => tracing::info!("Hostler stopped"),
            }
            Ok(())
        }
        Command::Pool { name } => {
            let store = coordination(&settings).await?;
            let spawner = WorkhorseSpawner::current()?.with_config(&args.config);
            let shutdown = shutdown_signal()?;
            let mut pool = Pool::new(settings.pool_config(name), store, spawner);
            if pool.run(shutdown).await? == PoolExit::Killed {
                tracing::warn!("Pool {} killed its workhorses", pool.instance_id());
            }
            Ok(())
        }
        Command::Pools { names } => {
            let store = coordination(&settings).await?;
            let program = std::env::current_exe()?;
            let shutdown = shutdown_signal()?;
            Launcher::new(names, program, store)
                .with_config(&args.config)
                .run(shutdown)
                .await?;
            Ok(())
        }
        Command::Workhorse {
            pool,
            pool_instance,
            job_id,
        } => {
            let jobs = JobRepository::new(db::connect(&settings.db_config()).await?);
            let workhorse =
                Workhorse::new(jobs, builtin_registry(), settings.exec_env(), pool_instance);
            tracing::debug!("Workhorse {} of pool \"{}\"", workhorse.instance_id(), pool);
            workhorse.run(job_id).await?;
            Ok(())
        }
    }
}

fn config_init(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists, use --force to overwrite", path.display());
    }
    Settings::default().save(path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

async fn open_db(config: &DbConfig) -> anyhow::Result<Database> {
    Ok(db::init(config).await?)
}

async fn coordination(settings: &Settings) -> anyhow::Result<RedisCoordination> {
    let url = &settings.connection.redis_url;
    RedisCoordination::connect(url)
        .await
        .with_context(|| format!("Failed to connect to {url}"))
}

/// Completes on the first SIGTERM or SIGINT.
///
/// The handlers are installed before this returns, so a signal arriving
/// before the future is first polled is not lost.
fn shutdown_signal() -> anyhow::Result<impl Future<Output = ()>> {
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    Ok(async move {
        tokio::select! {
            _ = terminate.recv() => tracing::info!("Got SIGTERM"),
            _ = interrupt.recv() => tracing::info!("Got SIGINT"),
        }
    })
}

/// Command-line argument as JSON, falling back to a plain string.
fn json_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn json_kwargs(raw: &[String]) -> anyhow::Result<Map<String, Value>> {
    raw.iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_string(), json_value(value))),
            _ => bail!("Keyword argument '{pair}' is not key=value"),
        })
        .collect()
}

fn print_job_line(job: &Job) {
    println!(
        "#{:<8} {:<12} {:<16} {:<16} {:<12} {}",
        job.id,
        job.status,
        job.pool,
        job.queue,
        job.host,
        job.execute_at.to_rfc3339()
    );
}

async fn job(settings: &Settings, action: JobAction) -> anyhow::Result<()> {
    let jobs = JobRepository::new(open_db(&settings.db_config()).await?);

    match action {
        JobAction::Submit {
            handler,
            pool,
            queue,
            host,
            args,
            kwargs,
            status,
            wait_minutes,
            sys_path,
            venv,
            venv_exclusive,
        } => {
            let mut unit = ExecutableUnit::new(handler)
                .with_args(args.iter().map(|a| json_value(a)).collect())
                .with_kwargs(json_kwargs(&kwargs)?);
            if !sys_path.is_empty() {
                unit = unit.with_sys_path(sys_path);
            }
            if let Some(venv) = venv {
                unit = unit.with_venv(venv, venv_exclusive.then_some(true));
            }

            let mut new_job = NewJob::new(pool, unit).with_wait_minutes(wait_minutes);
            if let Some(queue) = queue {
                new_job = new_job.with_queue(queue);
            }
            if let Some(host) = host {
                new_job = new_job.with_host(host);
            }
            if let Some(status) = status {
                new_job = new_job.with_status(status);
            }

            let job = jobs.submit(new_job).await?;
            println!("{}", job.id);
        }
        JobAction::Show { id } => {
            let job = jobs.get(id).await?;
            println!("{}", serde_json::to_string_pretty(&job)?);
        }
        JobAction::List {
            pool,
            queue,
            host,
            status,
            limit,
        } => {
            let filter = JobFilter {
                pool,
                queue,
                host,
                status,
                limit: Some(limit),
            };
            for job in jobs.list(filter).await? {
                print_job_line(&job);
            }
        }
        JobAction::Execute { id } => {
            let ended = execute_inline(&jobs, builtin_registry(), settings.exec_env(), id).await?;
            if !ended {
                bail!("Job #{id} was not executed");
            }
            println!("Job #{id} ended");
        }
    }
    Ok(())
}

async fn limit(settings: &Settings, action: LimitAction) -> anyhow::Result<()> {
    let limits = LimitRepository::new(open_db(&settings.db_config()).await?);

    match action {
        LimitAction::Set {
            entity_type,
            entity,
            limit,
        } => {
            let saved = limits.set(Limit::new(entity_type, entity, limit)).await?;
            println!("{} {} = {}", saved.entity_type, saved.entity, saved.limit);
        }
        LimitAction::List => {
            for limit in limits.list().await? {
                println!("{:<6} {:<24} {}", limit.entity_type, limit.entity, limit.limit);
            }
        }
        LimitAction::Delete {
            entity_type,
            entity,
        } => {
            if !limits.delete(entity_type, &entity).await? {
                bail!("No limit for {entity_type} {entity}");
            }
            println!("Deleted limit for {entity_type} {entity}");
        }
    }
    Ok(())
}

async fn queue(settings: &Settings, action: QueueAction) -> anyhow::Result<()> {
    let queues = QueueRepository::new(open_db(&settings.db_config()).await?);

    match action {
        QueueAction::Add { name, pool } => {
            let saved = queues.set(Queue::new(name, pool)).await?;
            println!("{} -> {}", saved.name, saved.pool);
        }
        QueueAction::List => {
            for queue in queues.list().await? {
                println!("{:<24} {}", queue.name, queue.pool);
            }
        }
    }
    Ok(())
}

fn print_instances(instances: &[PoolInstance]) {
    for instance in instances {
        println!(
            "{:<16} {:<28} {}",
            instance.pool, instance.instance_id, instance.status
        );
    }
}

async fn manager<S: CoordinationStore>(
    manager: Manager<S>,
    action: ManagerAction,
) -> anyhow::Result<()> {
    let instances = match &action {
        ManagerAction::Status(selection) => {
            manager.get_status(&selection.pools, selection.statuses()).await?
        }
        ManagerAction::Terminate(selection) => {
            manager.terminate(&selection.pools, selection.statuses()).await?
        }
        ManagerAction::Kill(selection) => {
            manager.kill(&selection.pools, selection.statuses()).await?
        }
        ManagerAction::Clean(selection) => {
            manager.clean(&selection.pools, selection.statuses()).await?
        }
    };
    print_instances(&instances);
    Ok(())
}
