//! Child process execution with an enforced wall-clock timeout.

use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use wait_timeout::ChildExt;

use super::backend::{MediaError, MediaResult};

/// Captured result of a finished child process.
#[derive(Debug)]
pub(crate) struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Spawn `cmd`, capture both output pipes, and kill it if it runs past
/// `timeout`.
///
/// Stdin is left as configured by the caller so decoders can be chained.
pub(crate) fn run_with_timeout(
    tool: &str,
    cmd: &mut Command,
    timeout: Duration,
) -> MediaResult<CommandOutput> {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    tracing::debug!("Running {}: {:?}", tool, cmd);

    let mut child = cmd.spawn().map_err(|e| spawn_error(tool, e))?;

    // Drain pipes on their own threads so a chatty child can't block on a full pipe
    let stdout_reader = drain(child.stdout.take());
    let stderr_reader = drain(child.stderr.take());

    let status = match child.wait_timeout(timeout)? {
        Some(status) => status,
        None => {
            kill_quietly(&mut child);
            join_reader(stdout_reader);
            join_reader(stderr_reader);
            tracing::warn!("{} timed out after {}s", tool, timeout.as_secs());
            return Err(MediaError::Timeout {
                tool: tool.to_string(),
                secs: timeout.as_secs(),
            });
        }
    };

    Ok(CommandOutput {
        status,
        stdout: join_reader(stdout_reader),
        stderr: join_reader(stderr_reader),
    })
}

/// Turn a non-zero exit into `CommandFailed`, keeping the tail of stderr.
pub(crate) fn check_success(tool: &str, output: CommandOutput) -> MediaResult<CommandOutput> {
    if output.status.success() {
        return Ok(output);
    }

    let stderr = output.stderr_lossy();
    let mut message: String = stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .trim()
        .to_string();
    if message.len() > 500 {
        let cut = (0..=500).rev().find(|&i| message.is_char_boundary(i)).unwrap_or(0);
        message.truncate(cut);
    }

    Err(MediaError::CommandFailed {
        tool: tool.to_string(),
        code: output.status.code(),
        message,
    })
}

/// Map a spawn failure, treating a missing binary as an unavailable tool.
pub(crate) fn spawn_error(tool: &str, err: io::Error) -> MediaError {
    if err.kind() == io::ErrorKind::NotFound {
        MediaError::unavailable(tool)
    } else {
        MediaError::Io(err)
    }
}

/// Kill and reap a child, ignoring errors from one that already exited.
pub(crate) fn kill_quietly(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = pipe.read_to_end(&mut buffer);
            buffer
        })
    })
}

fn join_reader(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    reader
        .map(|handle| handle.join().unwrap_or_default())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_is_unavailable() {
        let mut cmd = Command::new("definitely-not-a-real-binary-vem");
        let err = run_with_timeout("fake-tool", &mut cmd, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, MediaError::ToolUnavailable { ref tool } if tool == "fake-tool"));
    }

    #[cfg(unix)]
    #[test]
    fn captures_stdout() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("printf hello");
        let output = run_with_timeout("sh", &mut cmd, Duration::from_secs(5)).unwrap();
        assert!(output.status.success());
        assert_eq!(output.stdout_lossy(), "hello");
    }

    #[cfg(unix)]
    #[test]
    fn kills_on_timeout() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("exec sleep 5");
        let err = run_with_timeout("sleeper", &mut cmd, Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, MediaError::Timeout { ref tool, .. } if tool == "sleeper"));
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_reports_last_stderr_line() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo first >&2; echo 'bad input' >&2; exit 3");
        let output = run_with_timeout("sh", &mut cmd, Duration::from_secs(5)).unwrap();
        let err = check_success("sh", output).unwrap_err();
        match err {
            MediaError::CommandFailed { code, message, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(message, "bad input");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
