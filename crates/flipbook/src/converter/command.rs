//! Running external tools: locating executables and enforcing timeouts.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use crate::error::ConversionError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const MAX_STDERR_CHARS: usize = 2000;

#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// One-line failure description suitable for the processing log.
    pub fn failure_message(&self) -> String {
        let code = match self.status.code() {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        };
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            code
        } else {
            format!("{}: {}", code, truncate(stderr, MAX_STDERR_CHARS))
        }
    }
}

#[derive(Debug)]
pub enum RunError {
    /// The process could not be started at all.
    Spawn(std::io::Error),
    /// The process exceeded its time budget and was killed.
    Timeout,
    Wait(std::io::Error),
}

/// Resolves an executable: an explicitly configured path wins, otherwise
/// the first candidate name found on `PATH`.
pub fn locate_executable(explicit: Option<&Path>, candidates: &[&str]) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return is_executable_file(path).then(|| path.to_path_buf());
    }

    let search_path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&search_path) {
        for name in candidates {
            let candidate = dir.join(name);
            if is_executable_file(&candidate) {
                return Some(candidate);
            }
            if cfg!(windows) {
                let with_ext = dir.join(format!("{}.exe", name));
                if is_executable_file(&with_ext) {
                    return Some(with_ext);
                }
            }
        }
    }
    None
}

#[cfg(unix)]
fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable_file(path: &Path) -> bool {
    path.is_file()
}

/// Runs `command` to completion, killing it once `timeout` elapses.
/// Stdout is discarded; stderr is captured for diagnostics.
pub fn run_with_timeout(mut command: Command, timeout: Duration) -> Result<CommandOutput, RunError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    let mut child = command.spawn().map_err(RunError::Spawn)?;

    let stderr_reader = child.stderr.take().map(|mut stderr| {
        std::thread::spawn(move || {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf);
            buf
        })
    });

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if started.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(RunError::Timeout);
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                let _ = child.kill();
                return Err(RunError::Wait(e));
            }
        }
    };

    let stderr = stderr_reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();

    Ok(CommandOutput { status, stderr })
}

/// Runs a converter command, mapping every way it can go wrong onto a
/// backend-tagged [`ConversionError`].
pub fn run_converter(backend: &str, command: Command, timeout: Duration) -> Result<(), ConversionError> {
    let output = run_with_timeout(command, timeout).map_err(|e| match e {
        RunError::Timeout => ConversionError::Timeout {
            backend: backend.to_string(),
            secs: timeout.as_secs(),
        },
        RunError::Spawn(err) if err.kind() == std::io::ErrorKind::NotFound => {
            ConversionError::NotAvailable {
                backend: backend.to_string(),
                reason: err.to_string(),
            }
        }
        RunError::Spawn(err) | RunError::Wait(err) => ConversionError::Failed {
            backend: backend.to_string(),
            message: err.to_string(),
        },
    })?;

    if output.success() {
        Ok(())
    } else {
        Err(ConversionError::Failed {
            backend: backend.to_string(),
            message: output.failure_message(),
        })
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
