//! Running commands with administrator privilege.
//!
//! The reconciler only needs two privileged operations (reading and replacing
//! fstab), both expressed as plain commands handed to an [`Elevator`]. The
//! real implementation prefixes them with `sudo` or `pkexec`; tests substitute
//! their own.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{NetmountError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs a command with administrator privilege, prompting if needed.
pub trait Elevator {
    /// Run `command` (program first) and return its stdout.
    ///
    /// A declined prompt is reported as `ElevationDenied`; any other failure
    /// carries the command's stderr verbatim. Implementations never retry.
    fn run(&self, command: &[&str]) -> Result<String>;
}

impl<E: Elevator + ?Sized> Elevator for &E {
    fn run(&self, command: &[&str]) -> Result<String> {
        (**self).run(command)
    }
}

/// Elevates through an external program such as `sudo` or `pkexec`.
#[derive(Debug, Clone)]
pub struct SudoElevator {
    program: String,
    timeout: Duration,
}

impl SudoElevator {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.elevation.program(), config.command_timeout)
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Elevator for SudoElevator {
    fn run(&self, command: &[&str]) -> Result<String> {
        let command_line = format!("{} {}", self.program, command.join(" "));
        debug!("running privileged command: {}", command_line);

        let output_error = |e: io::Error| NetmountError::command_failed(&command_line, &e.to_string());

        // Output goes to anonymous files so a chatty child can never block on
        // a full pipe while we poll for the timeout.
        let mut stdout = tempfile::tempfile().map_err(output_error)?;
        let mut stderr = tempfile::tempfile().map_err(output_error)?;

        let mut child = Command::new(&self.program)
            .args(command)
            .stdin(Stdio::inherit())
            .stdout(Stdio::from(stdout.try_clone().map_err(output_error)?))
            .stderr(Stdio::from(stderr.try_clone().map_err(output_error)?))
            .spawn()
            .map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    NetmountError::command_not_found(&self.program, e)
                } else {
                    NetmountError::command_failed(&command_line, &e.to_string())
                }
            })?;

        let start = Instant::now();
        let status: ExitStatus = loop {
            if let Some(status) = child.try_wait().map_err(output_error)? {
                break status;
            }
            if start.elapsed() > self.timeout {
                if let Err(e) = child.kill() {
                    warn!("failed to kill timed out command '{}': {}", command_line, e);
                }
                let _ = child.wait();
                return Err(NetmountError::command_timeout(&command_line, self.timeout));
            }
            thread::sleep(POLL_INTERVAL);
        };

        let out = read_all(&mut stdout).map_err(output_error)?;
        let err = read_all(&mut stderr).map_err(output_error)?;

        if status.success() {
            return Ok(out);
        }
        if is_denial(&self.program, status.code(), &err) {
            return Err(NetmountError::elevation_denied(&self.program, &err));
        }
        Err(NetmountError::command_failed(&command_line, &err))
    }
}

fn read_all(file: &mut File) -> io::Result<String> {
    file.seek(SeekFrom::Start(0))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Whether a failed run means the user refused or failed authentication.
pub fn is_denial(program: &str, code: Option<i32>, stderr: &str) -> bool {
    let name = program.rsplit('/').next().unwrap_or(program);
    match name {
        // 126: dialog dismissed, 127: not authorized
        "pkexec" => matches!(code, Some(126) | Some(127)),
        "sudo" => {
            let stderr = stderr.to_ascii_lowercase();
            stderr.contains("incorrect password")
                || stderr.contains("a password is required")
                || stderr.contains("no password was provided")
                || stderr.contains("is not in the sudoers file")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn runner(timeout: Duration) -> SudoElevator {
        // `env` runs its arguments unchanged, standing in for sudo
        SudoElevator::new("env", timeout)
    }

    #[test]
    fn test_run_returns_stdout() {
        let out = runner(Duration::from_secs(10)).run(&["echo", "hello"]).unwrap();
        assert_eq!(out, "hello\n");
    }

    #[test]
    fn test_run_failure_carries_stderr() {
        let err = runner(Duration::from_secs(10))
            .run(&["sh", "-c", "echo 'cp: permission denied' >&2; exit 3"])
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::CommandFailed);
        assert!(err.message.contains("cp: permission denied"), "Error was: {}", err);
    }

    #[test]
    fn test_run_times_out() {
        let start = Instant::now();
        let err = runner(Duration::from_millis(200))
            .run(&["sleep", "10"])
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::CommandTimeout);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_program_not_found() {
        let err = SudoElevator::new("/nonexistent/elevate", Duration::from_secs(1))
            .run(&["true"])
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::CommandNotFound);
    }

    #[test]
    fn test_large_output_does_not_block() {
        let out = runner(Duration::from_secs(20))
            .run(&["sh", "-c", "head -c 300000 /dev/zero | tr '\\000' a"])
            .unwrap();
        assert_eq!(out.len(), 300000);
    }

    #[test]
    fn test_is_denial() {
        assert!(is_denial("pkexec", Some(126), ""));
        assert!(is_denial("/usr/bin/pkexec", Some(127), ""));
        assert!(!is_denial("pkexec", Some(1), "cp failed"));
        assert!(is_denial("sudo", Some(1), "sudo: 3 incorrect password attempts"));
        assert!(is_denial("sudo", Some(1), "sudo: a password is required"));
        assert!(!is_denial("sudo", Some(1), "cp: cannot stat '/tmp/x'"));
        assert!(!is_denial("env", Some(126), ""));
    }

    #[test]
    fn test_reference_forwarding() {
        fn echo<E: Elevator>(elevator: E) -> String {
            elevator.run(&["echo", "x"]).unwrap()
        }
        let elevator = runner(Duration::from_secs(10));
        assert_eq!(echo(&elevator), "x\n");
    }
}
