//! Synchronous invocation of external solver processes.
//!
//! A solver call is request/response: write the exchange directory, run
//! the binary to completion, read the results back. The child's stdout and
//! stderr are drained on reader threads while the invoking thread polls
//! for exit, killing the child when the configured deadline passes.

pub mod exchange;

use log::{debug, info, warn};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SolverError {
    /// No binary registered for the solver in the path configuration.
    #[error("no binary configured for solver '{solver}'; add it to pasim_paths.json")]
    NotConfigured { solver: String },
    #[error("could not launch solver '{binary}': {source}")]
    Spawn {
        binary: PathBuf,
        source: std::io::Error,
    },
    /// Non-zero exit. `stderr` is passed through verbatim so the solver's
    /// own diagnostics reach the user.
    #[error("solver '{binary}' failed ({status}): {stderr}")]
    Failed {
        binary: PathBuf,
        status: String,
        stderr: String,
    },
    #[error("solver '{binary}' exceeded its {timeout_s} s budget and was killed")]
    TimedOut { binary: PathBuf, timeout_s: f64 },
    #[error("solver produced malformed data: {reason}")]
    MalformedOutput { reason: String },
    #[error("solver I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// One solver invocation.
#[derive(Debug)]
pub struct SolverRequest {
    pub binary: PathBuf,
    pub args: Vec<String>,
    /// Working directory for the child, normally the exchange directory.
    pub workdir: PathBuf,
    pub timeout: Duration,
}

#[derive(Debug)]
pub struct SolverOutput {
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut text = String::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_string(&mut text);
        }
        text
    })
}

/// Run the solver to completion, killing it at the deadline.
pub fn invoke(request: &SolverRequest) -> Result<SolverOutput, SolverError> {
    debug!(
        "invoking solver {} {:?} in {}",
        request.binary.display(),
        request.args,
        request.workdir.display()
    );
    let start = Instant::now();
    let mut child = Command::new(&request.binary)
        .args(&request.args)
        .current_dir(&request.workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| SolverError::Spawn {
            binary: request.binary.clone(),
            source,
        })?;

    let stdout_reader = drain(child.stdout.take());
    let stderr_reader = drain(child.stderr.take());

    let status = loop {
        match child.try_wait()? {
            Some(status) => break status,
            None => {
                if start.elapsed() >= request.timeout {
                    warn!(
                        "solver {} ran past {:?}, killing it",
                        request.binary.display(),
                        request.timeout
                    );
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(SolverError::TimedOut {
                        binary: request.binary.clone(),
                        timeout_s: request.timeout.as_secs_f64(),
                    });
                }
                thread::sleep(Duration::from_millis(20));
            }
        }
    };

    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();
    let duration = start.elapsed();

    if !status.success() {
        return Err(SolverError::Failed {
            binary: request.binary.clone(),
            status: status.to_string(),
            stderr,
        });
    }
    info!(
        "solver {} finished in {:.2} s",
        request.binary.display(),
        duration.as_secs_f64()
    );
    Ok(SolverOutput {
        stdout,
        stderr,
        duration,
    })
}

/// Exchange directory for one stage invocation, under the run's output
/// directory. Kept on failure so the problem can be inspected or re-run by
/// hand; removed on success.
pub fn exchange_dir(output_dir: &Path, stage: &str, wavelength_nm: u32) -> PathBuf {
    output_dir.join(format!("solver_{stage}_{wavelength_nm}nm"))
}
