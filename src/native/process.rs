use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::{Duration, Instant, timeout};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    pub current_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProcessOutput {
    /// `None` when the process was ended by a signal.
    pub exit_code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
    pub timed_out: bool,
    /// Stdout went past `max_output_bytes` and was cut.
    pub stdout_truncated: bool,
}

impl ProcessOutput {
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to supervise process: {0}")]
    Io(#[from] io::Error),
}

/// How long captured pipes may stay open after the direct child exited.
/// Only a descendant that left the process group can hold them that long.
const PIPE_GRACE: Duration = Duration::from_millis(100);

/// Process group of a spawned child. Every member gets SIGKILL on `kill` or
/// on drop, whichever comes first.
struct ProcessGroup {
    pgid: Option<libc::pid_t>,
}

impl ProcessGroup {
    fn new(leader: Option<u32>) -> Self {
        Self {
            pgid: leader.map(|pid| pid as libc::pid_t),
        }
    }

    fn kill(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };
        // SAFETY: killpg only sends a signal to the group we created.
        if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
            let e = io::Error::last_os_error();
            if e.raw_os_error() != Some(libc::ESRCH) {
                tracing::warn!(pgid, "Failed to kill process group: {}", e);
            }
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Runs `spec` to completion with `stdin` as its whole input.
///
/// The child leads its own process group. Once it exits, whatever it left
/// running is killed. When `limit` of wall-clock time passes first, the
/// whole group is killed and the returned output has `timed_out` set and no
/// captured streams. Dropping the future kills the group too.
/// Each stream keeps at most `max_output_bytes`, the rest is drained.
#[tracing::instrument(skip(stdin), fields(program = %spec.program.display()))]
pub async fn execute(
    spec: &CommandSpec,
    stdin: &str,
    limit: Duration,
    max_output_bytes: usize,
) -> Result<ProcessOutput, ProcessError> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .envs(spec.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);
    if let Some(dir) = &spec.current_dir {
        cmd.current_dir(dir);
    }

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        program: spec.program.display().to_string(),
        source,
    })?;
    let mut group = ProcessGroup::new(child.id());

    let stdin_handle = child.stdin.take();
    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();
    let input = stdin.as_bytes().to_vec();

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();

    let supervised = async {
        let writer = async move {
            if let Some(mut handle) = stdin_handle {
                match handle.write_all(&input).await {
                    Ok(()) => {}
                    // The program exited without consuming its input.
                    Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {}
                    Err(e) => return Err(e),
                }
            }
            Ok(())
        };
        let mut io = Box::pin(async {
            tokio::join!(
                writer,
                read_capped(stdout_handle, max_output_bytes, &mut stdout),
                read_capped(stderr_handle, max_output_bytes, &mut stderr),
            )
        });

        let mut io_done = None;
        let status = tokio::select! {
            status = child.wait() => status,
            done = &mut io => {
                io_done = Some(done);
                child.wait().await
            }
        };
        let elapsed = start.elapsed();
        group.kill();

        let io_done = match io_done {
            Some(done) => Some(done),
            None => match timeout(PIPE_GRACE, &mut io).await {
                Ok(done) => Some(done),
                Err(_) => {
                    tracing::warn!("Output pipes held open by a detached process");
                    None
                }
            },
        };
        drop(io);
        (status, elapsed, io_done)
    };

    let supervised = timeout(limit, supervised).await;
    match supervised {
        Ok((status, elapsed, io_done)) => {
            let status = status?;
            let mut stdout_truncated = false;
            if let Some((written, stdout_result, stderr_result)) = io_done {
                written?;
                stdout_truncated = stdout_result?;
                stderr_result?;
            }
            Ok(ProcessOutput {
                exit_code: status.code(),
                success: status.success(),
                stdout: String::from_utf8_lossy(&stdout).to_string(),
                stderr: String::from_utf8_lossy(&stderr).to_string(),
                elapsed,
                timed_out: false,
                stdout_truncated,
            })
        }
        Err(_) => {
            let elapsed = start.elapsed();
            group.kill();
            let status = child.wait().await?;
            tracing::debug!(?status, "timed out process reaped");
            Ok(ProcessOutput {
                exit_code: status.code(),
                success: false,
                stdout: String::new(),
                stderr: String::new(),
                elapsed,
                timed_out: true,
                stdout_truncated: false,
            })
        }
    }
}

/// Reads at most `max_bytes` into `buf` and drains the rest. Returns whether
/// anything was discarded.
async fn read_capped<R>(reader: Option<R>, max_bytes: usize, buf: &mut Vec<u8>) -> io::Result<bool>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok(false);
    };
    (&mut reader).take(max_bytes as u64).read_to_end(buf).await?;
    let discarded = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;
    Ok(discarded > 0)
}
