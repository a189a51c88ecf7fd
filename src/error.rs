//! Error types with numbered codes for netmount.
//!
//! Every failure carries a stable code so it can be documented, searched for
//! and scripted around, and a category matching the four failure families of
//! the tool (validation, credentials, fstab, mount/elevation).
//!
//! ## Error Code Reference
//!
//! | Code | Description |
//! |------|-------------|
//! | E001 | Invalid input (hostname, share, mount point, credentials) |
//! | E002 | Credentials directory could not be created or secured |
//! | E003 | Credentials file could not be written |
//! | E004 | Credentials file missing, unreadable or incomplete |
//! | E005 | fstab file does not exist |
//! | E006 | fstab file could not be read |
//! | E007 | fstab backup failed (nothing was written) |
//! | E008 | fstab file could not be written |
//! | E009 | Privilege elevation was declined |
//! | E010 | Privileged command failed |
//! | E011 | Privileged command timed out |
//! | E012 | Elevation program not found |

use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Error codes for netmount failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// E001: Input rejected before any I/O
    InvalidInput,
    /// E002: Credentials directory failure
    CredentialsDir,
    /// E003: Credentials file write failure
    CredentialsWrite,
    /// E004: Credentials file read/parse failure
    CredentialsRead,
    /// E005: fstab does not exist
    FstabNotFound,
    /// E006: fstab read failure
    FstabRead,
    /// E007: fstab backup failure
    FstabBackup,
    /// E008: fstab write failure
    FstabWrite,
    /// E009: Elevation declined by the user
    ElevationDenied,
    /// E010: Privileged command failed
    CommandFailed,
    /// E011: Privileged command timed out
    CommandTimeout,
    /// E012: Elevation program not found
    CommandNotFound,
}

/// Failure family an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Credentials,
    Fstab,
    Mount,
}

impl ErrorCode {
    /// Get the numeric code as a string (e.g., "E001").
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "E001",
            ErrorCode::CredentialsDir => "E002",
            ErrorCode::CredentialsWrite => "E003",
            ErrorCode::CredentialsRead => "E004",
            ErrorCode::FstabNotFound => "E005",
            ErrorCode::FstabRead => "E006",
            ErrorCode::FstabBackup => "E007",
            ErrorCode::FstabWrite => "E008",
            ErrorCode::ElevationDenied => "E009",
            ErrorCode::CommandFailed => "E010",
            ErrorCode::CommandTimeout => "E011",
            ErrorCode::CommandNotFound => "E012",
        }
    }

    /// Get a short description of the error.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "invalid input",
            ErrorCode::CredentialsDir => "credentials directory unavailable",
            ErrorCode::CredentialsWrite => "failed to write credentials file",
            ErrorCode::CredentialsRead => "failed to read credentials file",
            ErrorCode::FstabNotFound => "fstab file does not exist",
            ErrorCode::FstabRead => "failed to read fstab",
            ErrorCode::FstabBackup => "failed to back up fstab",
            ErrorCode::FstabWrite => "failed to write fstab",
            ErrorCode::ElevationDenied => "privilege elevation declined",
            ErrorCode::CommandFailed => "privileged command failed",
            ErrorCode::CommandTimeout => "privileged command timed out",
            ErrorCode::CommandNotFound => "elevation program not found",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorCode::InvalidInput => ErrorCategory::Validation,
            ErrorCode::CredentialsDir | ErrorCode::CredentialsWrite | ErrorCode::CredentialsRead => {
                ErrorCategory::Credentials
            }
            ErrorCode::FstabNotFound
            | ErrorCode::FstabRead
            | ErrorCode::FstabBackup
            | ErrorCode::FstabWrite => ErrorCategory::Fstab,
            ErrorCode::ElevationDenied
            | ErrorCode::CommandFailed
            | ErrorCode::CommandTimeout
            | ErrorCode::CommandNotFound => ErrorCategory::Mount,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A netmount error with code and context.
#[derive(Debug)]
pub struct NetmountError {
    pub code: ErrorCode,
    pub message: String,
}

impl NetmountError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// Input rejected by validation.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Credentials directory could not be created or secured.
    pub fn credentials_dir(path: &Path, source: std::io::Error) -> Self {
        Self::new(
            ErrorCode::CredentialsDir,
            format!(
                "failed to prepare credentials directory '{}': {}",
                path.display(),
                source
            ),
        )
    }

    /// Credentials file could not be written.
    pub fn credentials_write(path: &Path, source: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::CredentialsWrite,
            format!(
                "failed to write credentials file '{}': {}",
                path.display(),
                source
            ),
        )
    }

    /// Credentials file could not be read or is incomplete.
    pub fn credentials_read(path: &Path, detail: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::CredentialsRead,
            format!("credentials file '{}': {}", path.display(), detail),
        )
    }

    /// fstab does not exist.
    pub fn fstab_not_found(path: &Path) -> Self {
        Self::new(
            ErrorCode::FstabNotFound,
            format!("fstab file '{}' does not exist", path.display()),
        )
    }

    /// fstab exists but could not be read.
    pub fn fstab_read(path: &Path, detail: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::FstabRead,
            format!("failed to read '{}': {}", path.display(), detail),
        )
    }

    /// Backup before write failed.
    pub fn fstab_backup(path: &Path, source: std::io::Error) -> Self {
        Self::new(
            ErrorCode::FstabBackup,
            format!(
                "failed to back up '{}', nothing was written: {}",
                path.display(),
                source
            ),
        )
    }

    /// fstab could not be written.
    pub fn fstab_write(path: &Path, detail: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::FstabWrite,
            format!("failed to write '{}': {}", path.display(), detail),
        )
    }

    /// The user declined the privilege prompt.
    pub fn elevation_denied(program: &str, stderr: &str) -> Self {
        let detail = if stderr.trim().is_empty() {
            "authentication was cancelled".to_string()
        } else {
            stderr.trim().to_string()
        };
        Self::new(
            ErrorCode::ElevationDenied,
            format!("{} refused to elevate: {}", program, detail),
        )
    }

    /// A privileged command exited unsuccessfully.
    pub fn command_failed(command: &str, stderr: &str) -> Self {
        let detail = if stderr.trim().is_empty() {
            "unknown error".to_string()
        } else {
            stderr.trim().to_string()
        };
        Self::new(
            ErrorCode::CommandFailed,
            format!("'{}' failed: {}", command, detail),
        )
    }

    /// A privileged command did not finish in time.
    pub fn command_timeout(command: &str, timeout: Duration) -> Self {
        Self::new(
            ErrorCode::CommandTimeout,
            format!("'{}' timed out after {}s", command, timeout.as_secs_f32()),
        )
    }

    /// The elevation program could not be started.
    pub fn command_not_found(program: &str, source: std::io::Error) -> Self {
        Self::new(
            ErrorCode::CommandNotFound,
            format!("could not run '{}' (is it installed?): {}", program, source),
        )
    }
}

impl fmt::Display for NetmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for NetmountError {}

/// Convenience type alias for Results using NetmountError.
pub type Result<T> = std::result::Result<T, NetmountError>;
