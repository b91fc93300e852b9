//! Running external command line tools

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::SbomError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Resolve a tool either from an explicit path or by searching `PATH`
pub fn locate(program: &str, explicit: Option<&Path>) -> Result<PathBuf, SbomError> {
    if let Some(path) = explicit {
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(SbomError::ToolNotFound(path.display().to_string()))
        };
    }

    let paths = std::env::var_os("PATH").ok_or_else(|| SbomError::ToolNotFound(program.to_string()))?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| SbomError::ToolNotFound(program.to_string()))
}

/// Run a command to completion, killing it once `timeout` has elapsed
///
/// Output is drained on separate threads so large documents on stdout cannot
/// block the child. A non-zero exit status becomes [`SbomError::ToolFailed`]
/// carrying stderr.
pub fn run_with_timeout(mut command: Command, timeout: Duration) -> Result<Output, SbomError> {
    let tool = command.get_program().to_string_lossy().into_owned();
    debug!("Running {:?}", command);

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| SbomError::ToolFailed {
            tool: tool.clone(),
            reason: format!("Failed to start: {}", e),
        })?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SbomError::Timeout {
                what: tool,
                after: timeout,
            });
        }
        thread::sleep(POLL_INTERVAL);
    };

    let output = Output {
        status,
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
    };

    if !output.status.success() {
        return Err(SbomError::ToolFailed {
            tool,
            reason: format!(
                "{}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    Ok(output)
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}
