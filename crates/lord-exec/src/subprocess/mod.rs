mod output;
pub use output::OutputConfig;

use std::{path::PathBuf, process::Stdio, sync::Arc};

use lord_model::{Environment, ExecConfig, WORKER_ID_VAR, WorkerId};
use tokio::process::Command;
use tracing::trace;

use crate::{ChildFork, ExecError, ExecResult, Fork};
use output::{TenantOutput, Stream, pump};

/// Per-spawn context injected by the caller.
#[derive(Debug, Clone, Default)]
pub struct SpawnContext {
    /// Exported to the child as `WORKER_ID`.
    pub worker_id: Option<WorkerId>,
}

impl SpawnContext {
    pub fn for_worker(worker_id: WorkerId) -> Self {
        Self {
            worker_id: Some(worker_id),
        }
    }
}

/// Starts the opaque per-tenant unit of work.
pub trait TenantExecutor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Start a child for `env` and return without waiting for it.
    fn spawn(&self, env: &Environment, ctx: &SpawnContext) -> ExecResult<Box<dyn Fork>>;
}

/// Runs a fixed command with the tenant variables in its environment.
///
/// Children get their own process group, so terminal signals aimed at the
/// supervisor do not interrupt tenant work.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    command: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    inherit_env: bool,
    exclude: Vec<String>,
    output: OutputConfig,
}

impl CommandExecutor {
    /// `exclude` names supervisor variables that must not leak into children.
    pub fn new(cfg: &ExecConfig, exclude: Vec<String>, output: OutputConfig) -> ExecResult<Self> {
        if cfg.command.trim().is_empty() {
            return Err(ExecError::InvalidCommand("command is empty".into()));
        }
        Ok(Self {
            command: cfg.command.clone(),
            args: cfg.args.clone(),
            cwd: cfg.cwd.clone(),
            inherit_env: cfg.inherit_env,
            exclude,
            output: OutputConfig {
                max_line_length: cfg.max_line_length,
                ..output
            },
        })
    }

    fn command_for(&self, env: &Environment, ctx: &SpawnContext) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        if !self.inherit_env {
            cmd.env_clear();
        }
        for key in &self.exclude {
            cmd.env_remove(key);
        }
        cmd.envs(env.vars().iter());
        if let Some(id) = ctx.worker_id {
            cmd.env(WORKER_ID_VAR, id.to_string());
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }
}

impl TenantExecutor for CommandExecutor {
    fn name(&self) -> &'static str {
        "command"
    }

    fn spawn(&self, env: &Environment, ctx: &SpawnContext) -> ExecResult<Box<dyn Fork>> {
        trace!(
            tenant = %env.key(),
            command = %self.command,
            args = ?self.args,
            vars = env.vars().len(),
            "spawning tenant process"
        );
        let mut child = self
            .command_for(env, ctx)
            .spawn()
            .map_err(|e| ExecError::Spawn {
                command: self.command.clone(),
                reason: e.to_string(),
            })?;

        let tag = TenantOutput {
            tenant: Arc::from(env.key()),
            worker: ctx.worker_id,
        };
        if let Some(stdout) = child.stdout.take() {
            pump(stdout, Stream::Stdout, tag.clone(), self.output);
        }
        if let Some(stderr) = child.stderr.take() {
            pump(stderr, Stream::Stderr, tag, self.output);
        }
        Ok(Box::new(ChildFork::new(child)))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use lord_model::Vars;

    use super::*;
    use crate::{ForkExit, RunOutcome};

    fn shell(script: &str) -> CommandExecutor {
        let cfg = ExecConfig {
            command: "sh".into(),
            args: vec!["-c".into(), script.into()],
            ..Default::default()
        };
        CommandExecutor::new(&cfg, vec!["LARALORD_INTERNAL".into()], OutputConfig::default())
            .unwrap()
    }

    async fn wait(mut fork: Box<dyn Fork>) -> ForkExit {
        tokio::time::timeout(Duration::from_secs(5), async move {
            loop {
                if let Some(exit) = fork.try_reap().unwrap() {
                    return exit;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("child exits")
    }

    #[test]
    fn empty_command_is_rejected() {
        let cfg = ExecConfig {
            command: "  ".into(),
            ..Default::default()
        };
        let err = CommandExecutor::new(&cfg, Vec::new(), OutputConfig::default()).unwrap_err();
        assert!(matches!(err, ExecError::InvalidCommand(_)));
    }

    #[tokio::test]
    async fn child_sees_tenant_and_worker_vars() {
        let executor = shell(r#"test "$DB_NAME" = "acme_db" && test "$WORKER_ID" = "3""#);
        let env = Environment::new(
            "acme",
            Vars::single("DB_NAME", "acme_db"),
            0,
            time::OffsetDateTime::now_utc(),
        );

        let fork = executor.spawn(&env, &SpawnContext::for_worker(3)).unwrap();
        assert!(fork.pid() > 0);
        assert_eq!(wait(fork).await.outcome(), RunOutcome::Success);
    }

    #[tokio::test]
    async fn excluded_supervisor_vars_do_not_leak() {
        // SAFETY: tests in this module do not read this variable concurrently
        unsafe { std::env::set_var("LARALORD_INTERNAL", "secret") };
        let executor = shell(r#"test -z "$LARALORD_INTERNAL""#);

        let fork = executor
            .spawn(&Environment::empty("acme"), &SpawnContext::default())
            .unwrap();
        assert_eq!(wait(fork).await.outcome(), RunOutcome::Success);
    }

    #[tokio::test]
    async fn non_zero_exit_is_a_failure() {
        let executor = shell("echo boom >&2; exit 3");
        let fork = executor
            .spawn(&Environment::empty("acme"), &SpawnContext::default())
            .unwrap();

        let exit = wait(fork).await;
        assert_eq!(exit.code, Some(3));
        assert_eq!(exit.outcome(), RunOutcome::Failure);
    }

    #[tokio::test]
    async fn invalid_utf8_output_keeps_the_pipe_open() {
        let executor = shell(
            r#"printf '\377\n'; sleep 0.3; i=0; while [ $i -lt 2000 ]; do echo after; i=$((i+1)); done; exit 0"#,
        );
        let fork = executor
            .spawn(&Environment::empty("acme"), &SpawnContext::default())
            .unwrap();

        let exit = wait(fork).await;
        assert_eq!(exit.code, Some(0));
        assert_eq!(exit.outcome(), RunOutcome::Success);
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let cfg = ExecConfig {
            command: "/nonexistent/laralord-child".into(),
            ..Default::default()
        };
        let executor = CommandExecutor::new(&cfg, Vec::new(), OutputConfig::default()).unwrap();
        let err = executor
            .spawn(&Environment::empty("acme"), &SpawnContext::default())
            .err()
            .expect("spawn fails");
        assert!(matches!(err, ExecError::Spawn { .. }));
    }
}
