//! Handlers every paddock binary registers.

use std::sync::Arc;
use std::time::Duration;

use daemons::{FnHandler, HandlerRegistry, JobContext, JobError};
use serde_json::Value;

type HandlerResult = Result<(), JobError>;

/// Registry with the built-in handlers.
pub fn builtin_registry() -> Arc<HandlerRegistry> {
    let mut handlers = HandlerRegistry::new();
    handlers.register(FnHandler::new("echo", |ctx| Box::pin(echo(ctx))));
    handlers.register(FnHandler::new("sleep", |ctx| Box::pin(sleep(ctx))));
    handlers.register(FnHandler::new("fail", |ctx| Box::pin(fail(ctx))));
    handlers.register(FnHandler::new("shell", |ctx| Box::pin(shell(ctx))));
    Arc::new(handlers)
}

/// Write the arguments to the job output.
async fn echo(ctx: JobContext) -> HandlerResult {
    let params = ctx.params();
    ctx.log(format!("args: {}", Value::Array(params.args.clone())));
    ctx.log(format!("kwargs: {}", Value::Object(params.kwargs.clone())));
    Ok(())
}

/// Sleep `seconds` (default 5), sending a heartbeat every `tick` seconds.
async fn sleep(ctx: JobContext) -> HandlerResult {
    let seconds = ctx.kwarg("seconds").and_then(Value::as_u64).unwrap_or(5);
    let tick = ctx.kwarg("tick").and_then(Value::as_u64).unwrap_or(60).max(1);

    let mut left = seconds;
    while left > 0 {
        let step = left.min(tick);
        tokio::time::sleep(Duration::from_secs(step)).await;
        left -= step;
        ctx.tick().await?;
    }
    ctx.log(format!("Slept for {seconds} seconds"));
    Ok(())
}

async fn fail(ctx: JobContext) -> HandlerResult {
    let reason = ctx
        .arg(0)
        .and_then(Value::as_str)
        .unwrap_or("Intentional failure");
    Err(JobError::failed(reason))
}

/// Run `args[0]` with the remaining args in the job environment.
///
/// With `restart_on_failure` a non-zero exit asks for a restart after
/// `wait_minutes` instead of failing the job.
async fn shell(ctx: JobContext) -> HandlerResult {
    let mut words = ctx.params().args.iter().map(|arg| match arg {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    });
    let program = words
        .next()
        .ok_or_else(|| JobError::failed("shell needs a program as first argument"))?;
    let rest: Vec<String> = words.collect();

    let status = ctx.run_command(&program, &rest).await?;
    if status.success() {
        return Ok(());
    }
    if ctx.kwarg("restart_on_failure").and_then(Value::as_bool) == Some(true) {
        let wait_minutes = ctx.kwarg("wait_minutes").and_then(Value::as_u64);
        return Err(JobError::Restart { wait_minutes });
    }
    Err(JobError::failed(format!("{program} exited with {status}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_registered() {
        let registry = builtin_registry();
        assert_eq!(registry.names(), vec!["echo", "fail", "shell", "sleep"]);
    }
}
