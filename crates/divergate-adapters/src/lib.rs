//! Adapters for divergate.
//!
//! In clean-arch terms: this is where we touch the world. Everything above
//! this crate sees processes and staging directories through the types here.

use async_trait::async_trait;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;

pub mod staging;

/// One process invocation, fully resolved: no shell, no search-path surprises
/// beyond what the OS does with `argv[0]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub argv: Vec<String>,
    pub cwd: PathBuf,

    /// Opened by the runner around the spawn and released on every exit path.
    pub stdin_file: Option<PathBuf>,

    pub timeout: Option<Duration>,
}

/// Raw capture of one completed execution, before output normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawExecution {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub timed_out: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("command argv must not be empty")]
    EmptyArgv,

    #[error("failed to start {program:?}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open stdin file {}", path.display())]
    Stdin {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting for child process")]
    Wait {
        #[source]
        source: std::io::Error,
    },
}

/// Spawns one external process and captures its observable behavior.
///
/// Two flavors of the same contract: `run` suspends cooperatively and allows
/// many executions in flight; `run_blocking` holds the calling thread until
/// the child exits, which is what safe mode relies on for strict serialization.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<RawExecution, ExecError>;

    fn run_blocking(&self, spec: &CommandSpec) -> Result<RawExecution, ExecError>;
}

#[derive(Debug, Default, Clone)]
pub struct SystemProcessRunner;

#[async_trait]
impl ProcessRunner for SystemProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<RawExecution, ExecError> {
        if spec.argv.is_empty() {
            return Err(ExecError::EmptyArgv);
        }

        let mut cmd = tokio::process::Command::new(&spec.argv[0]);
        cmd.args(&spec.argv[1..])
            .current_dir(&spec.cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd.stdin(open_stdin(spec)?);

        let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
            program: spec.argv[0].clone(),
            source,
        })?;

        let mut stdout = child.stdout.take().expect("stdout piped");
        let mut stderr = child.stderr.take().expect("stderr piped");
        let out_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stdout.read_to_end(&mut buf).await;
            buf
        });
        let err_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            buf
        });

        let (status, timed_out) = match spec.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => (status.map_err(|source| ExecError::Wait { source })?, false),
                Err(_) => {
                    // Kill, then reap; the pipe readers drain whatever was written.
                    let _ = child.start_kill();
                    let status = child
                        .wait()
                        .await
                        .map_err(|source| ExecError::Wait { source })?;
                    (status, true)
                }
            },
            None => (
                child
                    .wait()
                    .await
                    .map_err(|source| ExecError::Wait { source })?,
                false,
            ),
        };

        let stdout = out_task.await.unwrap_or_default();
        let stderr = err_task.await.unwrap_or_default();

        Ok(RawExecution {
            exit_code: status.code().unwrap_or(-1),
            stdout,
            stderr,
            timed_out,
        })
    }

    fn run_blocking(&self, spec: &CommandSpec) -> Result<RawExecution, ExecError> {
        if spec.argv.is_empty() {
            return Err(ExecError::EmptyArgv);
        }

        let mut cmd = std::process::Command::new(&spec.argv[0]);
        cmd.args(&spec.argv[1..])
            .current_dir(&spec.cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd.stdin(open_stdin(spec)?);

        let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
            program: spec.argv[0].clone(),
            source,
        })?;

        let mut stdout = child.stdout.take().expect("stdout piped");
        let mut stderr = child.stderr.take().expect("stderr piped");
        let out_handle = std::thread::spawn(move || read_all(&mut stdout));
        let err_handle = std::thread::spawn(move || read_all(&mut stderr));

        let (status, timed_out) = match spec.timeout {
            Some(limit) => wait_with_deadline(&mut child, limit)?,
            None => (
                child
                    .wait()
                    .map_err(|source| ExecError::Wait { source })?,
                false,
            ),
        };

        let stdout = out_handle.join().unwrap_or_default();
        let stderr = err_handle.join().unwrap_or_default();

        Ok(RawExecution {
            exit_code: status.code().unwrap_or(-1),
            stdout,
            stderr,
            timed_out,
        })
    }
}

fn open_stdin(spec: &CommandSpec) -> Result<Stdio, ExecError> {
    match &spec.stdin_file {
        Some(path) => {
            let file = std::fs::File::open(path).map_err(|source| ExecError::Stdin {
                path: path.clone(),
                source,
            })?;
            Ok(Stdio::from(file))
        }
        None => Ok(Stdio::null()),
    }
}

fn read_all<R: Read>(reader: &mut R) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(_) => break,
        }
    }
    buf
}

fn wait_with_deadline(
    child: &mut std::process::Child,
    limit: Duration,
) -> Result<(std::process::ExitStatus, bool), ExecError> {
    let start = Instant::now();
    loop {
        if let Some(status) = child
            .try_wait()
            .map_err(|source| ExecError::Wait { source })?
        {
            return Ok((status, false));
        }
        if start.elapsed() >= limit {
            let _ = child.kill();
            let status = child
                .wait()
                .map_err(|source| ExecError::Wait { source })?;
            return Ok((status, true));
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

/// Convenience for specs that neither pipe stdin nor enforce a timeout.
pub fn command(argv: Vec<String>, cwd: &Path) -> CommandSpec {
    CommandSpec {
        argv,
        cwd: cwd.to_path_buf(),
        stdin_file: None,
        timeout: None,
    }
}
