//! Subprocess bridge for candidates built as separate binaries.

use std::ffi::OsStr;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::harness::{encode_request, parse_response, HarnessError, MulModCandidate};

/// An external `mulmod` implementation speaking the line protocol.
///
/// The child is spawned once and kept for the whole run.  A background
/// thread forwards its output lines over a channel so every response can be
/// awaited with a timeout.
///
/// A timeout, closed output or pipe failure kills the child: a late reply
/// could otherwise be read as the answer to a later request.  Every call
/// after that returns [`HarnessError::Closed`].  The child is also killed
/// when this value is dropped.
#[derive(Debug)]
pub struct ExternalMulMod {
    program: String,
    child: Child,
    stdin: ChildStdin,
    lines: Receiver<std::io::Result<String>>,
    timeout: Duration,
    stopped: bool,
}

impl ExternalMulMod {
    /// Starts `program` with `args`, waiting at most `timeout` per response.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Spawn`] if the process cannot be started.
    pub fn spawn<I, S>(program: &str, args: I, timeout: Duration) -> Result<Self, HarnessError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let spawn_error = |source| HarnessError::Spawn {
            program: program.to_string(),
            source,
        };
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(spawn_error)?;
        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(spawn_error(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "child pipes unavailable",
                )));
            }
        };

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let failed = line.is_err();
                if tx.send(line).is_err() || failed {
                    break;
                }
            }
        });

        info!(program, pid = child.id(), "spawned mulmod candidate");
        Ok(Self {
            program: program.to_string(),
            child,
            stdin,
            lines: rx,
            timeout,
            stopped: false,
        })
    }

    /// Returns the program name this candidate was started from.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns `true` once the child has been killed after a failed exchange.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    fn read_line(&self) -> Result<String, HarnessError> {
        match self.lines.recv_timeout(self.timeout) {
            Ok(line) => Ok(line?),
            Err(RecvTimeoutError::Timeout) => Err(HarnessError::Timeout(self.timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(HarnessError::Closed),
        }
    }

    fn exchange(&mut self, request: &str) -> Result<String, HarnessError> {
        self.stdin.write_all(request.as_bytes())?;
        self.stdin.flush()?;
        self.read_line()
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        if let Err(err) = self.child.kill() {
            // Already exited on its own.
            debug!(%err, "kill failed");
        }
        match self.child.wait() {
            Ok(status) => debug!(program = %self.program, %status, "candidate stopped"),
            Err(err) => warn!(program = %self.program, %err, "failed to reap candidate"),
        }
    }
}

impl MulModCandidate for ExternalMulMod {
    fn mul_mod(&mut self, a: u128, b: u128) -> Result<u128, HarnessError> {
        if self.stopped {
            return Err(HarnessError::Closed);
        }
        let request = encode_request(a, b);
        let line = match self.exchange(&request) {
            Ok(line) => line,
            Err(err) => {
                warn!(program = %self.program, %err, "stopping candidate");
                self.stop();
                return Err(err);
            }
        };
        debug!(request = request.trim_end(), response = %line, "candidate answered");
        parse_response(&line)
    }
}

impl Drop for ExternalMulMod {
    fn drop(&mut self) {
        self.stop();
    }
}
