//! Credential files for authenticated shares.
//!
//! Each file holds `username=`, `password=` and optionally `domain=` lines and
//! is referenced from fstab through a `credentials=<path>` mount option. Files
//! live in one directory readable by the owner only. They are never removed
//! when a share goes away; see [`crate::unused`] for finding orphans.

use std::fmt;
use std::fs::{self, DirBuilder, OpenOptions, Permissions};
use std::io::{self, Write};
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use rand::Rng;
use tracing::{debug, error, info, warn};

use crate::atomic::{atomic_write, mode_of};
use crate::config::Config;
use crate::error::{NetmountError, Result};
use crate::paths::PathResolver;

/// Extension every credential file carries.
pub const CREDENTIAL_EXTENSION: &str = "cred";

pub const DIR_MODE: u32 = 0o700;
pub const FILE_MODE: u32 = 0o600;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Secret bundle stored in one credential file.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub domain: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            domain: None,
        }
    }

    pub fn with_domain(mut self, domain: Option<String>) -> Self {
        self.domain = domain.filter(|d| !d.is_empty());
        self
    }

    /// Parse `key=value` lines. Keys are case-insensitive; blank lines,
    /// `#` comments and lines without `=` are ignored.
    pub fn parse(content: &str) -> std::result::Result<Self, String> {
        let mut username = None;
        let mut password = None;
        let mut domain = None;

        for line in content.lines() {
            // Values are kept verbatim: a password may begin or end with spaces
            let line = line.trim_start();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.to_string();
            match key.trim().to_ascii_lowercase().as_str() {
                "username" | "user" => username = Some(value),
                "password" | "pass" => password = Some(value),
                "domain" => domain = Some(value),
                _ => {}
            }
        }

        match (username, password) {
            (Some(username), Some(password)) => {
                Ok(Credentials::new(username, password).with_domain(domain))
            }
            (None, _) => Err("missing username".to_string()),
            (_, None) => Err("missing password".to_string()),
        }
    }

    /// File content, newline terminated.
    pub fn render(&self) -> String {
        let mut content = format!("username={}\npassword={}\n", self.username, self.password);
        if let Some(domain) = &self.domain {
            content.push_str(&format!("domain={}\n", domain));
        }
        content
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("domain", &self.domain)
            .finish()
    }
}

/// Display data for a credential file.
#[derive(Debug, Clone)]
pub struct CredentialInfo {
    pub path: PathBuf,
    pub file_name: String,
    /// `None` when the file could not be parsed.
    pub username: Option<String>,
    pub domain: Option<String>,
    pub size: u64,
    pub modified: SystemTime,
}

/// Outcome counts of a bulk deletion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub deleted: usize,
    pub errors: usize,
}

impl fmt::Display for PurgeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} deleted, {} errors", self.deleted, self.errors)
    }
}

/// Owner-only directory of credential files.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
    resolver: PathResolver,
}

impl CredentialStore {
    /// Bind to `dir` (which may start with `~`). Nothing is created yet.
    pub fn new(dir: &Path, resolver: PathResolver) -> Self {
        let dir = resolver.canonicalize(dir);
        Self { dir, resolver }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.credentials_dir,
            PathResolver::new(&config.home_dir),
        )
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the directory with mode 0700, or tighten an existing one.
    pub fn ensure_directory(&self) -> Result<()> {
        DirBuilder::new()
            .recursive(true)
            .mode(DIR_MODE)
            .create(&self.dir)
            .map_err(|e| NetmountError::credentials_dir(&self.dir, e))?;

        let mode = mode_of(&self.dir).map_err(|e| NetmountError::credentials_dir(&self.dir, e))?;
        if mode & 0o077 != 0 {
            warn!(
                "credentials directory {} had mode {:o}, restricting to {:o}",
                self.dir.display(),
                mode,
                DIR_MODE
            );
            fs::set_permissions(&self.dir, Permissions::from_mode(DIR_MODE))
                .map_err(|e| NetmountError::credentials_dir(&self.dir, e))?;
        }
        debug!("credentials directory: {}", self.dir.display());
        Ok(())
    }

    /// Write a new credential file and return its path.
    ///
    /// With both hints the name is `<server>_<share>_<8 hex>.cred`, otherwise
    /// `credentials_<32 hex>.cred`. The random part keeps a remount with
    /// different credentials from clobbering the previous file.
    pub fn create(
        &self,
        credentials: &Credentials,
        server_hint: Option<&str>,
        share_hint: Option<&str>,
    ) -> Result<PathBuf> {
        for (field, value) in [
            ("username", credentials.username.as_str()),
            ("password", credentials.password.as_str()),
            ("domain", credentials.domain.as_deref().unwrap_or("")),
        ] {
            if value.contains(['\n', '\r']) {
                return Err(NetmountError::invalid_input(format!(
                    "{} must not contain line breaks",
                    field
                )));
            }
        }

        self.ensure_directory()?;

        let mut path = self.dir.join(credential_file_name(server_hint, share_hint));
        while path.exists() {
            path = self.dir.join(credential_file_name(server_hint, share_hint));
        }

        atomic_write(&path, credentials.render().as_bytes(), FILE_MODE)
            .map_err(|e| NetmountError::credentials_write(&path, e))?;
        info!("created credentials file {}", path.display());
        Ok(path)
    }

    /// Read and parse a credential file.
    ///
    /// A file readable by group or others is tightened to 0600 before its
    /// content is trusted; if that fails the read fails.
    pub fn parse(&self, path: &Path) -> Result<Credentials> {
        let path = self.resolver.expand_tilde(path);
        let mode = match mode_of(&path) {
            Ok(mode) => mode,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(NetmountError::credentials_read(&path, "does not exist"));
            }
            Err(e) => return Err(NetmountError::credentials_read(&path, e)),
        };
        if mode & 0o077 != 0 {
            warn!(
                "credentials file {} had mode {:o}, restricting to {:o}",
                path.display(),
                mode,
                FILE_MODE
            );
            fs::set_permissions(&path, Permissions::from_mode(FILE_MODE)).map_err(|e| {
                NetmountError::credentials_read(&path, format!("insecure permissions: {}", e))
            })?;
        }

        let content =
            fs::read_to_string(&path).map_err(|e| NetmountError::credentials_read(&path, e))?;
        Credentials::parse(&content).map_err(|reason| {
            NetmountError::credentials_read(&path, format!("incomplete file: {}", reason))
        })
    }

    /// Overwrite and remove a credential file.
    ///
    /// Paths resolving outside the credentials directory are refused. Returns
    /// `false` on refusal or I/O failure, `true` otherwise (including when the
    /// file is already gone).
    pub fn delete(&self, path: &Path) -> bool {
        let target = self.resolver.canonicalize(path);
        if !self.contains(&target) {
            warn!(
                "refusing to delete {}: outside credentials directory {}",
                target.display(),
                self.dir.display()
            );
            return false;
        }

        let metadata = match fs::symlink_metadata(&target) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("credentials file {} already removed", target.display());
                return true;
            }
            Err(e) => {
                error!("cannot stat {}: {}", target.display(), e);
                return false;
            }
        };
        if !metadata.is_file() {
            warn!("refusing to delete {}: not a regular file", target.display());
            return false;
        }

        if let Err(e) = fs::set_permissions(&target, Permissions::from_mode(FILE_MODE)) {
            warn!("cannot reset mode of {}: {}", target.display(), e);
        }
        if let Err(e) = overwrite_with_random(&target, metadata.len()) {
            warn!("could not overwrite {} before removal: {}", target.display(), e);
        }

        match fs::remove_file(&target) {
            Ok(()) => {
                info!("deleted credentials file {}", target.display());
                true
            }
            Err(e) => {
                error!("error deleting {}: {}", target.display(), e);
                false
            }
        }
    }

    /// Every `*.cred` regular file in the directory, sorted.
    pub fn list(&self) -> Vec<PathBuf> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("cannot list {}: {}", self.dir.display(), e);
                }
                return Vec::new();
            }
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|entry| entry.path())
            .filter(|path| is_credential_file(path))
            .collect();
        files.sort();
        files
    }

    /// Display data for one file.
    pub fn info(&self, path: &Path) -> Result<CredentialInfo> {
        let metadata =
            fs::metadata(path).map_err(|e| NetmountError::credentials_read(path, e))?;
        let (username, domain) = match self.parse(path) {
            Ok(credentials) => (Some(credentials.username), credentials.domain),
            Err(e) => {
                warn!("{}", e);
                (None, None)
            }
        };
        Ok(CredentialInfo {
            path: path.to_path_buf(),
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            username,
            domain,
            size: metadata.len(),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        })
    }

    /// Delete every given path, counting successes and failures.
    pub fn purge(&self, paths: &[PathBuf]) -> PurgeReport {
        let mut report = PurgeReport::default();
        for path in paths {
            if self.delete(path) {
                report.deleted += 1;
            } else {
                report.errors += 1;
            }
        }
        info!("credentials purge: {}", report);
        report
    }

    /// Delete credential files last modified more than `max_age_days` ago.
    pub fn purge_older_than(&self, max_age_days: u64) -> PurgeReport {
        let max_age = Duration::from_secs(max_age_days.saturating_mul(SECONDS_PER_DAY));
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut report = PurgeReport::default();
        for path in self.list() {
            let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) => {
                    error!("error processing {}: {}", path.display(), e);
                    report.errors += 1;
                    continue;
                }
            };
            if modified < cutoff {
                if self.delete(&path) {
                    report.deleted += 1;
                } else {
                    report.errors += 1;
                }
            }
        }
        info!("credentials cleanup: {}", report);
        report
    }

    fn contains(&self, canonical: &Path) -> bool {
        let dir = self.resolver.canonicalize(&self.dir);
        canonical != dir && canonical.starts_with(&dir)
    }
}

pub fn is_credential_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext == CREDENTIAL_EXTENSION)
        .unwrap_or(false)
}

fn credential_file_name(server: Option<&str>, share: Option<&str>) -> String {
    let mut rng = rand::rng();
    match (server, share) {
        (Some(server), Some(share)) if !server.is_empty() && !share.is_empty() => format!(
            "{}_{}_{:08x}.{}",
            sanitize(server),
            sanitize(share),
            rng.random::<u32>(),
            CREDENTIAL_EXTENSION
        ),
        _ => format!(
            "credentials_{:032x}.{}",
            rng.random::<u128>(),
            CREDENTIAL_EXTENSION
        ),
    }
}

fn sanitize(token: &str) -> String {
    token
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn overwrite_with_random(path: &Path, len: u64) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    let mut rng = rand::rng();
    let mut buf = [0u8; 4096];
    let mut remaining = len;
    while remaining > 0 {
        let chunk = remaining.min(buf.len() as u64) as usize;
        rng.fill(&mut buf[..chunk]);
        file.write_all(&buf[..chunk])?;
        remaining -= chunk as u64;
    }
    file.sync_all()
}
