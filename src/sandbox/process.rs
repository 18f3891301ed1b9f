use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::time::timeout;

const READ_CHUNK: usize = 8192;

/// How long output pipes may stay open once the child is gone
const PIPE_GRACE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy)]
pub(super) enum Termination {
    Exited(ExitStatus),
    TimedOut,
}

/// Text read from one output stream, cut at the output limit
#[derive(Debug)]
pub(super) struct Captured {
    pub text: String,
    pub truncated: bool,
}

#[derive(Debug)]
pub(super) struct ProcessOutput {
    pub termination: Termination,
    pub stdout: Captured,
    pub stderr: Captured,
    pub elapsed: Duration,
}

/// Spawns `command` in `cwd`, feeds it `input`, and waits at most `limit`
///
/// The child runs in its own process group, which is killed once the child
/// exits or times out, before the child is reaped, so that launchers and
/// forked helpers die together with it. Output pipes still held open after
/// that by a descendant that left the group are abandoned after
/// [`PIPE_GRACE`]. Spawn failures are returned as `Err`, everything after a
/// successful spawn is described by the returned [`ProcessOutput`].
pub(super) async fn run_process(
    command: &[String],
    cwd: &Path,
    input: Option<&[u8]>,
    limit: Duration,
    output_limit: usize,
) -> io::Result<ProcessOutput> {
    let Some((program, args)) = command.split_first() else {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty command"));
    };

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .process_group(0);

    let start_time = Instant::now();
    let mut child = cmd.spawn()?;
    let pid = child.id();

    let stdin = child.stdin.take();
    let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
    let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

    let mut stdout_sink = Sink::default();
    let mut stderr_sink = Sink::default();

    let (termination, pipes) = {
        let feed = async move {
            if let (Some(mut stdin), Some(input)) = (stdin, input) {
                // Programs are free to exit without consuming their input
                if let Err(e) = stdin.write_all(input).await
                    && e.kind() != io::ErrorKind::BrokenPipe
                {
                    log::debug!("Failed to write input to process {pid:?}: {e}");
                }
                // stdin is dropped here, which closes the pipe
            }
        };
        let pipes = async {
            let (_, out, err) = tokio::join!(
                feed,
                drain(stdout, output_limit, &mut stdout_sink),
                drain(stderr, output_limit, &mut stderr_sink)
            );
            out.and(err)
        };
        let wait = wait_with_deadline(&mut child, limit);
        tokio::pin!(pipes, wait);

        let mut drained = None;
        let termination = loop {
            tokio::select! {
                res = &mut pipes, if drained.is_none() => drained = Some(res),
                termination = &mut wait => break termination,
            }
        };

        let pipes = match drained {
            Some(res) => res,
            None => match timeout(PIPE_GRACE, &mut pipes).await {
                Ok(res) => res,
                Err(_) => {
                    log::warn!("Pipes of process {pid:?} still open after exit, abandoning them");
                    Ok(())
                }
            },
        };
        (termination, pipes)
    };

    let termination = termination?;
    pipes?;

    Ok(ProcessOutput {
        termination,
        stdout: stdout_sink.into_captured(),
        stderr: stderr_sink.into_captured(),
        elapsed: start_time.elapsed(),
    })
}

/// Waits for the child to exit, killing it after `limit`
///
/// The exit is observed without reaping, so the process group is signalled
/// while its id still belongs to us.
async fn wait_with_deadline(child: &mut Child, limit: Duration) -> io::Result<Termination> {
    let Some(pid) = child.id() else {
        return child.wait().await.map(Termination::Exited);
    };

    let exited = timeout(limit, wait_for_exit(pid)).await;
    kill_process_group(pid);
    if exited.is_err() {
        let _ = child.start_kill();
    }

    let status = child.wait().await?;
    Ok(match exited {
        Ok(_) => Termination::Exited(status),
        Err(_) => Termination::TimedOut,
    })
}

/// Resolves once `pid` has terminated, leaving it unreaped
async fn wait_for_exit(pid: u32) -> io::Result<()> {
    tokio::task::spawn_blocking(move || {
        // SAFETY: siginfo_t is plain data and only used as an out-parameter
        let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
        loop {
            // SAFETY: WNOWAIT leaves the zombie for tokio to reap
            let rc = unsafe {
                libc::waitid(
                    libc::P_PID,
                    pid as libc::id_t,
                    &mut info,
                    libc::WEXITED | libc::WNOWAIT,
                )
            };
            if rc == 0 {
                return Ok(());
            }
            let e = io::Error::last_os_error();
            if e.kind() != io::ErrorKind::Interrupted {
                return Err(e);
            }
        }
    })
    .await
    .map_err(io::Error::other)?
}

/// Bytes kept from one output stream
#[derive(Default)]
struct Sink {
    kept: Vec<u8>,
    truncated: bool,
}

impl Sink {
    fn into_captured(self) -> Captured {
        Captured {
            text: String::from_utf8_lossy(&self.kept).into_owned(),
            truncated: self.truncated,
        }
    }
}

/// Drains `reader` to EOF, keeping at most `limit` bytes in `sink`
async fn drain<R: AsyncRead + Unpin>(mut reader: R, limit: usize, sink: &mut Sink) -> io::Result<()> {
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        let room = limit.saturating_sub(sink.kept.len());
        if n > room {
            sink.truncated = true;
        }
        sink.kept.extend_from_slice(&chunk[..n.min(room)]);
    }
}

fn kill_process_group(pid: u32) {
    if let Ok(pgid) = libc::pid_t::try_from(pid) {
        // SAFETY: killpg only sends a signal; ESRCH for an empty group is ignored
        unsafe {
            libc::killpg(pgid, libc::SIGKILL);
        }
    }
}

fn missing_pipe(name: &str) -> io::Error {
    io::Error::other(format!("child {name} was not captured"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_input_is_fed_and_output_captured() {
        let output = run_process(
            &sh("cat; echo oops >&2"),
            &std::env::temp_dir(),
            Some(b"hello\nworld\n".as_slice()),
            Duration::from_secs(5),
            1024,
        )
        .await
        .unwrap();

        assert!(matches!(output.termination, Termination::Exited(s) if s.success()));
        assert_eq!(output.stdout.text, "hello\nworld\n");
        assert_eq!(output.stderr.text, "oops\n");
        assert!(!output.stdout.truncated);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_reported() {
        let output = run_process(
            &sh("exit 3"),
            &std::env::temp_dir(),
            None,
            Duration::from_secs(5),
            1024,
        )
        .await
        .unwrap();

        match output.termination {
            Termination::Exited(status) => assert_eq!(status.code(), Some(3)),
            other => panic!("unexpected termination {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let output = run_process(
            &sh("while :; do :; done"),
            &std::env::temp_dir(),
            Some(b"".as_slice()),
            Duration::from_millis(300),
            1024,
        )
        .await
        .unwrap();

        assert!(matches!(output.termination, Termination::TimedOut));
        assert!(output.elapsed < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_timeout_kills_whole_group() {
        // The background sleep inherits stdout; without the group kill the
        // reader would wait for it to finish
        let output = run_process(
            &sh("sleep 30 & sleep 30"),
            &std::env::temp_dir(),
            None,
            Duration::from_millis(300),
            1024,
        )
        .await
        .unwrap();

        assert!(matches!(output.termination, Termination::TimedOut));
        assert!(output.elapsed < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_escaped_descendant_does_not_block_exit() {
        // setsid moves the sleep out of the killed group while it keeps stdout
        let output = run_process(
            &sh("setsid sleep 10 & sleep 0.3; echo 1"),
            &std::env::temp_dir(),
            None,
            Duration::from_secs(5),
            1024,
        )
        .await
        .unwrap();

        assert!(matches!(output.termination, Termination::Exited(s) if s.success()));
        assert_eq!(output.stdout.text, "1\n");
        assert!(output.elapsed < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_escaped_descendant_does_not_block_timeout() {
        let output = run_process(
            &sh("setsid sleep 10 & sleep 30"),
            &std::env::temp_dir(),
            Some(b"".as_slice()),
            Duration::from_millis(300),
            1024,
        )
        .await
        .unwrap();

        assert!(matches!(output.termination, Termination::TimedOut));
        assert!(output.elapsed < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_output_is_truncated_at_limit() {
        let output = run_process(
            &sh("yes | head -c 100000"),
            &std::env::temp_dir(),
            None,
            Duration::from_secs(5),
            1000,
        )
        .await
        .unwrap();

        assert!(matches!(output.termination, Termination::Exited(s) if s.success()));
        assert_eq!(output.stdout.text.len(), 1000);
        assert!(output.stdout.truncated);
        assert!(!output.stderr.truncated);
    }

    #[tokio::test]
    async fn test_unread_input_is_not_an_error() {
        let input = vec![b'x'; 1 << 20];
        let output = run_process(
            &sh("exit 0"),
            &std::env::temp_dir(),
            Some(input.as_slice()),
            Duration::from_secs(5),
            1024,
        )
        .await
        .unwrap();

        assert!(matches!(output.termination, Termination::Exited(s) if s.success()));
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_spawn() {
        let result = run_process(
            &["definitely-not-a-real-toolchain".to_string()],
            &std::env::temp_dir(),
            None,
            Duration::from_secs(1),
            1024,
        )
        .await;

        assert!(result.is_err());
    }
}
