use std::collections::HashMap;
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::RuntimeConfig;
use crate::error::RunError;
use crate::request::{RunMode, RunRequest};
use crate::response::RunResponse;
use crate::sandbox::Sandbox;

#[derive(Debug, Clone)]
pub struct ProcessResult {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum ExecOutcome {
    Completed(ProcessResult),
    TimedOut { stdout: Vec<u8>, stderr: Vec<u8> },
}

#[derive(Debug, Clone)]
pub struct PythonRuntime {
    config: RuntimeConfig,
}

impl PythonRuntime {
    pub fn new(config: RuntimeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub async fn run(&self, request: &RunRequest) -> Result<RunResponse, RunError> {
        let entrypoint = request
            .entrypoint
            .as_deref()
            .unwrap_or(&self.config.default_entrypoint);
        if request.mode() == RunMode::Files {
            let files = request.files.as_ref().ok_or(RunError::CodeNotFound)?;
            if !files.contains_key(entrypoint) {
                return Err(RunError::EntrypointNotFound);
            }
        }

        let sandbox = Sandbox::create(&self.config.base_tempdir_path)?;
        let entry_path = sandbox.stage(request, entrypoint)?;
        let outcome = self
            .execute(&entry_path, &request.args, &request.env)
            .await?;
        Ok(RunResponse::from_outcome(outcome, self.config.timeout))
        // sandbox dropped here, after the child has been reaped
    }

    async fn execute(
        &self,
        entry_path: &Path,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<ExecOutcome, RunError> {
        let mut command = Command::new(&self.config.python_path);
        command
            .arg(entry_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if !env.is_empty() {
            command.env_clear().envs(env);
        }
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn()?;
        let stdout_task = drain(child.stdout.take());
        let stderr_task = drain(child.stderr.take());

        match timeout(self.config.timeout, child.wait()).await {
            Ok(status) => {
                let status = status?;
                Ok(ExecOutcome::Completed(ProcessResult {
                    exit_code: exit_code(status),
                    stdout: collect(stdout_task).await,
                    stderr: collect(stderr_task).await,
                }))
            }
            Err(_) => {
                log::info!(
                    "run exceeded {}s deadline, killing process tree",
                    self.config.timeout.as_secs()
                );
                kill_process_tree(&mut child).await;
                Ok(ExecOutcome::TimedOut {
                    stdout: collect(stdout_task).await,
                    stderr: collect(stderr_task).await,
                })
            }
        }
    }
}

fn drain<R>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pipe.map(|mut reader| {
        tokio::spawn(async move {
            let mut buffer = Vec::new();
            let _ = reader.read_to_end(&mut buffer).await;
            buffer
        })
    })
}

async fn collect(task: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    match task {
        Some(handle) => handle.await.unwrap_or_default(),
        None => Vec::new(),
    }
}

// The child is its own process group leader, so killing the group takes any
// descendants it spawned down with it before the sandbox is removed.
async fn kill_process_tree(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Err(err) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            log::debug!("killpg({pid}) failed: {err}");
        }
    }
    let _ = child.start_kill();
    let _ = child.wait().await;
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}
