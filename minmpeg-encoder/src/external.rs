//! External ffmpeg process backend
//!
//! Raw RGB24 frames are written to the child's standard input; the child
//! encodes and muxes straight into the output file. Its stderr goes to an
//! anonymous temporary file so a chatty encoder can never block on a full
//! pipe, and the tail is quoted in the error when the process fails.
//!
//! Writes happen on a helper thread so a child that stops reading cannot
//! block the caller past the job deadline.

use crate::quality::encoder_options;
use crate::{Error, Result};
use minmpeg_core::{Container, Geometry};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Lines of stderr quoted when the process fails
const STDERR_TAIL_LINES: usize = 20;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Settings for one external encode
#[derive(Debug, Clone)]
pub struct ExternalJob<'a> {
    pub encoder: &'a str,
    pub container: Container,
    pub geometry: Geometry,
    pub fps: u32,
    pub quality: u8,
    pub threads: usize,
}

/// Builds the ffmpeg argument list encoding stdin into `output`
pub fn command_args(job: &ExternalJob<'_>, output: &Path) -> Vec<String> {
    let mut args: Vec<String> = [
        "-hide_banner",
        "-loglevel",
        "error",
        "-y",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgb24",
        "-s",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(job.geometry.to_string());
    args.push("-r".into());
    args.push(job.fps.to_string());
    args.extend(["-i", "pipe:0", "-an", "-c:v"].map(String::from));
    args.push(job.encoder.to_string());

    for (name, value) in encoder_options(job.encoder, job.quality, job.geometry, job.fps, job.threads) {
        args.push(format!("-{name}"));
        args.push(value);
    }

    args.extend(["-pix_fmt", "yuv420p"].map(String::from));
    if job.container == Container::Mp4 {
        args.extend(["-movflags", "+faststart"].map(String::from));
    }
    args.push("-f".into());
    args.push(job.container.format_name().into());
    args.push(output.display().to_string());
    args
}

/// A running ffmpeg child encoding into one output file.
///
/// Dropping it before [`finish`](Self::finish) kills and reaps the child.
pub struct ExternalEncoder {
    program: PathBuf,
    child: Child,
    frames: Option<SyncSender<Vec<u8>>>,
    acks: Receiver<io::Result<()>>,
    writer: Option<JoinHandle<()>>,
    stderr: File,
    timeout: Duration,
    deadline: Instant,
    reaped: bool,
}

impl ExternalEncoder {
    /// Starts `program` encoding into `output`. The whole job, from now
    /// until the child exits, must finish within `timeout`.
    pub fn spawn(program: &Path, job: &ExternalJob<'_>, output: &Path, timeout: Duration) -> Result<Self> {
        let process_error = |source| Error::Process {
            program: program.to_path_buf(),
            source,
        };

        let stderr = tempfile::tempfile().map_err(process_error)?;
        let child_stderr = stderr.try_clone().map_err(process_error)?;

        let args = command_args(job, output);
        tracing::debug!(program = %program.display(), ?args, "spawning external encoder");

        let mut child = Command::new(program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::from(child_stderr))
            .spawn()
            .map_err(process_error)?;
        let deadline = Instant::now() + timeout;

        let Some(stdin) = child.stdin.take() else {
            reap(&mut child);
            return Err(Error::Encode("external encoder has no input pipe".into()));
        };
        let (frames, frame_rx) = mpsc::sync_channel(1);
        let (ack_tx, acks) = mpsc::channel();
        let writer = match std::thread::Builder::new()
            .name("minmpeg-encoder-input".into())
            .spawn(move || feed_stdin(stdin, frame_rx, ack_tx))
        {
            Ok(writer) => writer,
            Err(source) => {
                reap(&mut child);
                return Err(process_error(source));
            }
        };

        Ok(Self {
            program: program.to_path_buf(),
            child,
            frames: Some(frames),
            acks,
            writer: Some(writer),
            stderr,
            timeout,
            deadline,
            reaped: false,
        })
    }

    /// Writes one frame of packed RGB24 rows
    pub fn write_frame(&mut self, data: &[u8]) -> Result<()> {
        let Some(frames) = self.frames.as_ref() else {
            return Err(Error::Encode("external encoder input already closed".into()));
        };
        if frames.send(data.to_vec()).is_err() {
            return Err(self.input_failed(None));
        }

        let remaining = self.deadline.saturating_duration_since(Instant::now());
        match self.acks.recv_timeout(remaining) {
            Ok(Ok(())) => Ok(()),
            // Usually a broken pipe: the child died, its exit status says why
            Ok(Err(source)) => Err(self.input_failed(Some(source))),
            Err(RecvTimeoutError::Disconnected) => Err(self.input_failed(None)),
            Err(RecvTimeoutError::Timeout) => {
                // Killing the child unblocks the pending write
                self.kill();
                self.close_input();
                Err(Error::Timeout(self.timeout))
            }
        }
    }

    /// Closes the input and waits for the child to exit successfully
    pub fn finish(&mut self) -> Result<()> {
        self.close_input();
        let status = self.wait()?;
        if !status.success() {
            return Err(self.failure(status));
        }
        tracing::debug!(program = %self.program.display(), "external encoder finished");
        Ok(())
    }

    /// Closes stdin and joins the writer thread
    fn close_input(&mut self) {
        drop(self.frames.take());
        if let Some(writer) = self.writer.take() {
            if writer.join().is_err() {
                tracing::warn!(program = %self.program.display(), "external encoder input thread panicked");
            }
        }
    }

    fn input_failed(&mut self, source: Option<io::Error>) -> Error {
        self.close_input();
        match self.wait() {
            Ok(status) if !status.success() => self.failure(status),
            Ok(_) => Error::Process {
                program: self.program.clone(),
                source: source.unwrap_or_else(|| {
                    io::Error::new(io::ErrorKind::BrokenPipe, "external encoder stopped reading")
                }),
            },
            Err(e) => e,
        }
    }

    /// Waits for exit, killing the child once the timeout elapses
    fn wait(&mut self) -> Result<ExitStatus> {
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    self.reaped = true;
                    return Ok(status);
                }
                Ok(None) => {}
                Err(source) => {
                    return Err(Error::Process {
                        program: self.program.clone(),
                        source,
                    })
                }
            }
            if Instant::now() >= self.deadline {
                self.kill();
                return Err(Error::Timeout(self.timeout));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn kill(&mut self) {
        if self.reaped {
            return;
        }
        if let Err(e) = self.child.kill() {
            tracing::warn!(program = %self.program.display(), error = %e, "failed to kill external encoder");
        }
        if self.child.wait().is_ok() {
            self.reaped = true;
        }
    }

    fn failure(&mut self, status: ExitStatus) -> Error {
        Error::ExternalFailed {
            program: self.program.clone(),
            status: status.to_string(),
            stderr: self.stderr_tail(),
        }
    }

    fn stderr_tail(&mut self) -> String {
        let mut captured = String::new();
        if self.stderr.seek(SeekFrom::Start(0)).is_err() {
            return captured;
        }
        let mut bytes = Vec::new();
        if self.stderr.read_to_end(&mut bytes).is_ok() {
            captured = String::from_utf8_lossy(&bytes).into_owned();
        }
        let lines: Vec<&str> = captured.lines().collect();
        let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
        lines[start..].join("\n")
    }
}

impl Drop for ExternalEncoder {
    fn drop(&mut self) {
        self.kill();
        self.close_input();
    }
}

/// Writer thread body: one acknowledgement per frame, stops at the first
/// failed write or when the sender hangs up
fn feed_stdin(mut stdin: ChildStdin, frames: Receiver<Vec<u8>>, acks: mpsc::Sender<io::Result<()>>) {
    for frame in frames {
        let result = stdin.write_all(&frame);
        let failed = result.is_err();
        if acks.send(result).is_err() || failed {
            break;
        }
    }
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
