//! Runtime configuration shared by every component.
//!
//! A `Config` is built once (by the binary from its arguments, or by a caller
//! embedding the library) and handed to each component; nothing reads global
//! state.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the system mount table.
pub const DEFAULT_FSTAB_PATH: &str = "/etc/fstab";

/// Default credentials directory, relative to the home directory.
pub const DEFAULT_CREDENTIALS_DIR: &str = "~/.cifs_credentials";

/// Upper bound on any command run under elevation.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Inline comment attached to entries written by this tool.
pub const DEFAULT_ENTRY_COMMENT: &str = "Added by netmount";

/// Program used to run commands with administrator privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Elevation {
    /// `sudo`, prompting on the controlling terminal.
    #[default]
    Sudo,
    /// `pkexec`, prompting through the desktop polkit agent.
    Pkexec,
}

impl Elevation {
    pub fn program(&self) -> &'static str {
        match self {
            Elevation::Sudo => "sudo",
            Elevation::Pkexec => "pkexec",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub fstab_path: PathBuf,
    /// May start with `~`; expanded against `home_dir`.
    pub credentials_dir: PathBuf,
    pub home_dir: PathBuf,
    pub elevation: Elevation,
    pub command_timeout: Duration,
    /// Copy fstab to `<fstab>.bak` before each rewrite.
    pub backup: bool,
    pub entry_comment: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fstab_path: PathBuf::from(DEFAULT_FSTAB_PATH),
            credentials_dir: PathBuf::from(DEFAULT_CREDENTIALS_DIR),
            home_dir: dirs::home_dir().unwrap_or_else(|| PathBuf::from("/")),
            elevation: Elevation::default(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            backup: true,
            entry_comment: DEFAULT_ENTRY_COMMENT.to_string(),
        }
    }
}

impl Config {
    pub fn with_fstab_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.fstab_path = path.into();
        self
    }

    pub fn with_credentials_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_dir = path.into();
        self
    }

    pub fn with_home_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.home_dir = path.into();
        self
    }

    pub fn with_elevation(mut self, elevation: Elevation) -> Self {
        self.elevation = elevation;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    pub fn with_entry_comment(mut self, comment: impl Into<String>) -> Self {
        self.entry_comment = comment.into();
        self
    }

    pub fn fstab_path(&self) -> &Path {
        &self.fstab_path
    }
}
