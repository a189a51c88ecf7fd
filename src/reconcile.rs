//! Read-modify-write of the system fstab.
//!
//! [`FstabReconciler`] turns a [`ShareRequest`] into an fstab entry, merges it
//! into the current file and writes the result back. The current file is read
//! directly when possible and through the [`Elevator`] otherwise; the new
//! content always goes through a temporary file and is swapped in either by
//! an atomic rename or, lacking permission, by one privileged shell step.
//!
//! A request whose mount point is already present is a conflict; the
//! [`ConflictResolver`] decides between replacing the existing line in place
//! and keeping it (which leaves fstab untouched).

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::atomic::atomic_write;
use crate::config::Config;
use crate::credentials::{CredentialStore, Credentials};
use crate::error::{ErrorCode, NetmountError, Result};
use crate::fstab::{backup_path, FstabDocument, FstabEntry, FSTAB_MODE};
use crate::options::MountOptions;
use crate::paths::PathResolver;
use crate::privilege::Elevator;
use crate::validate::{
    is_smb_fs_type, validate_credentials, validate_fs_type, validate_hostname,
    validate_mount_point, validate_options, validate_share,
};

/// Privileged replace step. `$1` is the staged file, `$2` the fstab path.
/// The copy lands next to fstab first so the final `mv` is an atomic rename.
const REPLACE_SCRIPT: &str = r#"set -e
trap 'rm -f -- "$2.netmount-new"' EXIT
cp -- "$1" "$2.netmount-new"
chmod 644 -- "$2.netmount-new"
mv -f -- "$2.netmount-new" "$2"
"#;

/// Same as [`REPLACE_SCRIPT`] with a `.bak` copy of the current file first.
const BACKUP_AND_REPLACE_SCRIPT: &str = r#"set -e
trap 'rm -f -- "$2.netmount-new"' EXIT
if [ -e "$2" ]; then cp -p -- "$2" "$2.bak"; fi
cp -- "$1" "$2.netmount-new"
chmod 644 -- "$2.netmount-new"
mv -f -- "$2.netmount-new" "$2"
"#;

/// A share to persist in fstab.
#[derive(Clone)]
pub struct ShareRequest {
    pub server: String,
    pub share: String,
    pub mount_point: PathBuf,
    pub fs_type: String,
    /// Comma separated options as typed by the user.
    pub options: String,
    pub username: String,
    pub password: String,
    pub domain: String,
    pub dump: u32,
    pub pass: u32,
}

impl ShareRequest {
    pub fn new(
        server: impl Into<String>,
        share: impl Into<String>,
        mount_point: impl Into<PathBuf>,
        fs_type: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            share: share.into(),
            mount_point: mount_point.into(),
            fs_type: fs_type.into(),
            options: String::new(),
            username: String::new(),
            password: String::new(),
            domain: String::new(),
            dump: 0,
            pass: 0,
        }
    }

    pub fn with_options(mut self, options: impl Into<String>) -> Self {
        self.options = options.into();
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self.domain = domain.into();
        self
    }

    pub fn with_dump_pass(mut self, dump: u32, pass: u32) -> Self {
        self.dump = dump;
        self.pass = pass;
        self
    }

    pub fn has_credentials(&self) -> bool {
        !(self.username.is_empty() && self.password.is_empty() && self.domain.is_empty())
    }

    /// `//server/share` for SMB types, `server:share` otherwise.
    pub fn source(&self) -> String {
        if is_smb_fs_type(&self.fs_type) {
            format!("//{}/{}", self.server, self.share.trim_start_matches('/'))
        } else {
            format!("{}:{}", self.server, self.share)
        }
    }

    pub fn validate(&self, resolver: &PathResolver) -> Result<()> {
        validate_hostname(&self.server)?;
        validate_share(&self.share)?;
        validate_mount_point(&resolver.expand_tilde(&self.mount_point))?;
        validate_fs_type(&self.fs_type)?;
        validate_options(&self.options)?;
        validate_credentials(&self.username, &self.password, &self.domain)?;
        if self.dump > 1 {
            return Err(NetmountError::invalid_input(format!(
                "dump must be 0 or 1, got {}",
                self.dump
            )));
        }
        if self.pass > 2 {
            return Err(NetmountError::invalid_input(format!(
                "pass must be 0, 1 or 2, got {}",
                self.pass
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for ShareRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShareRequest")
            .field("source", &self.source())
            .field("mount_point", &self.mount_point)
            .field("fs_type", &self.fs_type)
            .field("options", &self.options)
            .field("username", &self.username)
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

/// Answer to "an entry for this mount point already exists".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictDecision {
    Replace,
    Keep,
}

/// Asked once per conflicting request, with both rendered fstab lines.
pub trait ConflictResolver {
    fn decide(&self, existing: &str, proposed: &str) -> ConflictDecision;
}

impl<F> ConflictResolver for F
where
    F: Fn(&str, &str) -> ConflictDecision,
{
    fn decide(&self, existing: &str, proposed: &str) -> ConflictDecision {
        self(existing, proposed)
    }
}

/// Always replace the existing line.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReplace;

impl ConflictResolver for AlwaysReplace {
    fn decide(&self, _existing: &str, _proposed: &str) -> ConflictDecision {
        ConflictDecision::Replace
    }
}

/// Always keep the existing line.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepExisting;

impl ConflictResolver for KeepExisting {
    fn decide(&self, _existing: &str, _proposed: &str) -> ConflictDecision {
        ConflictDecision::Keep
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelReason {
    /// The conflict resolver chose to keep the existing entry.
    KeptExisting { mount_point: PathBuf },
    /// The privilege prompt was declined.
    ElevationDeclined(String),
}

/// Terminal state of a reconciliation that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Added { line: String },
    Replaced { previous: String, line: String },
    Removed { count: usize },
    NotPresent { mount_point: PathBuf },
    Cancelled(CancelReason),
}

impl ReconcileOutcome {
    /// Whether fstab now holds what the caller asked for.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ReconcileOutcome::Added { .. }
                | ReconcileOutcome::Replaced { .. }
                | ReconcileOutcome::Removed { .. }
        )
    }
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileOutcome::Added { line } => write!(f, "entry added to fstab: {}", line),
            ReconcileOutcome::Replaced { previous, line } => {
                write!(f, "entry replaced in fstab: {} (was: {})", line, previous)
            }
            ReconcileOutcome::Removed { count: 1 } => write!(f, "removed 1 entry from fstab"),
            ReconcileOutcome::Removed { count } => {
                write!(f, "removed {} entries from fstab", count)
            }
            ReconcileOutcome::NotPresent { mount_point } => {
                write!(f, "no fstab entry for {}", mount_point.display())
            }
            ReconcileOutcome::Cancelled(CancelReason::KeptExisting { mount_point }) => write!(
                f,
                "an entry for {} already exists; kept it, fstab unchanged",
                mount_point.display()
            ),
            ReconcileOutcome::Cancelled(CancelReason::ElevationDeclined(detail)) => {
                write!(f, "cancelled: {}", detail)
            }
        }
    }
}

/// Coordinates credential creation and fstab rewrites.
#[derive(Debug)]
pub struct FstabReconciler<E> {
    fstab_path: PathBuf,
    store: CredentialStore,
    resolver: PathResolver,
    elevator: E,
    entry_comment: String,
    backup: bool,
}

impl<E: Elevator> FstabReconciler<E> {
    pub fn new(config: &Config, elevator: E) -> Self {
        Self {
            fstab_path: config.fstab_path.clone(),
            store: CredentialStore::from_config(config),
            resolver: PathResolver::new(&config.home_dir),
            elevator,
            entry_comment: config.entry_comment.clone(),
            backup: config.backup,
        }
    }

    pub fn fstab_path(&self) -> &Path {
        &self.fstab_path
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Add (or, on a conflict the resolver allows, replace) the entry for
    /// `request`.
    ///
    /// A credential file is written before fstab is read and is left in
    /// place when the request ends up cancelled.
    pub fn add_entry(
        &self,
        request: &ShareRequest,
        conflicts: &dyn ConflictResolver,
    ) -> Result<ReconcileOutcome> {
        request.validate(&self.resolver)?;

        let source = request.source();
        let mount_point = self.resolver.canonicalize(&request.mount_point);
        let mut options = MountOptions::parse(&request.options);

        if request.has_credentials() {
            let credentials = Credentials::new(&request.username, &request.password)
                .with_domain(Some(request.domain.clone()));
            let path = self
                .store
                .create(
                    &credentials,
                    Some(request.server.as_str()),
                    Some(request.share.as_str()),
                )?;
            options.set_credentials(credentials_option_value(&path));
        }

        let entry = FstabEntry::new(
            source,
            &mount_point,
            request.fs_type.to_ascii_lowercase(),
            options,
        )
        .with_dump_pass(request.dump, request.pass)
        .with_comment(self.entry_comment.as_str());
        let proposed = entry.to_string();

        let content = match self.read_current() {
            Ok(content) => content,
            Err(e) => return declined(e),
        };
        let mut document =
            FstabDocument::parse(&self.fstab_path, &content, self.resolver.clone());

        let outcome = match document.position_of_mount_point(&mount_point) {
            Some(index) => {
                let existing = document.lines()[index].to_string();
                info!("fstab already has an entry for {}", mount_point.display());
                match conflicts.decide(&existing, &proposed) {
                    ConflictDecision::Keep => {
                        info!("keeping existing entry, fstab not modified");
                        return Ok(ReconcileOutcome::Cancelled(CancelReason::KeptExisting {
                            mount_point,
                        }));
                    }
                    ConflictDecision::Replace => {
                        document.replace_at(index, entry);
                        ReconcileOutcome::Replaced {
                            previous: existing,
                            line: proposed,
                        }
                    }
                }
            }
            None => {
                document.add_entry(entry, true);
                ReconcileOutcome::Added { line: proposed }
            }
        };

        if let Err(e) = self.persist(&document.render()) {
            return declined(e);
        }
        info!("{}", outcome);
        Ok(outcome)
    }

    /// Remove every entry mounted at `mount_point`.
    ///
    /// Credential files referenced by removed entries stay on disk.
    pub fn remove_entry(&self, mount_point: &Path) -> Result<ReconcileOutcome> {
        let mount_point = self.resolver.canonicalize(mount_point);

        let content = match self.read_current() {
            Ok(content) => content,
            Err(e) => return declined(e),
        };
        let mut document =
            FstabDocument::parse(&self.fstab_path, &content, self.resolver.clone());

        let removed = document.remove_mount_point(&mount_point);
        if removed.is_empty() {
            return Ok(ReconcileOutcome::NotPresent { mount_point });
        }
        for entry in &removed {
            if let Some(credentials) = entry.options.credentials() {
                info!("credentials file {} left in place", credentials);
            }
        }

        if let Err(e) = self.persist(&document.render()) {
            return declined(e);
        }
        let outcome = ReconcileOutcome::Removed {
            count: removed.len(),
        };
        info!("{}", outcome);
        Ok(outcome)
    }

    /// Current fstab content, read through elevation when the file is not
    /// readable by this process.
    pub fn read_current(&self) -> Result<String> {
        match fs::read_to_string(&self.fstab_path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                debug!(
                    "{} not readable directly, reading with elevation",
                    self.fstab_path.display()
                );
                self.read_elevated()
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(NetmountError::fstab_not_found(&self.fstab_path))
            }
            Err(e) => Err(NetmountError::fstab_read(&self.fstab_path, e)),
        }
    }

    fn read_elevated(&self) -> Result<String> {
        let path = self.fstab_path.to_string_lossy();
        self.elevator.run(&["cat", "--", &*path])
    }

    /// Replace fstab with `content`: atomically in place when this process
    /// may write there, otherwise through one privileged step.
    pub fn persist(&self, content: &str) -> Result<()> {
        if self.backup && self.fstab_path.exists() {
            let backup = backup_path(&self.fstab_path);
            match fs::copy(&self.fstab_path, &backup) {
                Ok(_) => debug!("backed up fstab to {}", backup.display()),
                Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                    return self.persist_elevated(content);
                }
                Err(e) => return Err(NetmountError::fstab_backup(&self.fstab_path, e)),
            }
        }

        match atomic_write(&self.fstab_path, content.as_bytes(), FSTAB_MODE) {
            Ok(()) => {
                info!("wrote {}", self.fstab_path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                self.persist_elevated(content)
            }
            Err(e) => Err(NetmountError::fstab_write(&self.fstab_path, e)),
        }
    }

    fn persist_elevated(&self, content: &str) -> Result<()> {
        // Removed when `staged` drops, whatever the outcome below
        let mut staged = tempfile::Builder::new()
            .prefix("netmount-fstab-")
            .suffix(".tmp")
            .tempfile()
            .map_err(|e| NetmountError::fstab_write(&self.fstab_path, e))?;
        staged
            .write_all(content.as_bytes())
            .and_then(|_| staged.as_file().sync_all())
            .map_err(|e| NetmountError::fstab_write(&self.fstab_path, e))?;

        let script = if self.backup {
            BACKUP_AND_REPLACE_SCRIPT
        } else {
            REPLACE_SCRIPT
        };
        let staged_path = staged.path().to_string_lossy().into_owned();
        let fstab_path = self.fstab_path.to_string_lossy();

        debug!("replacing {} with elevation", fstab_path);
        self.elevator
            .run(&["sh", "-c", script, "netmount", staged_path.as_str(), &*fstab_path])?;
        info!("wrote {} with elevation", fstab_path);
        Ok(())
    }
}

/// Elevation refusals end the operation as cancelled; everything else fails.
fn declined(error: NetmountError) -> Result<ReconcileOutcome> {
    if error.code == ErrorCode::ElevationDenied {
        info!("{}", error);
        Ok(ReconcileOutcome::Cancelled(CancelReason::ElevationDeclined(
            error.message,
        )))
    } else {
        Err(error)
    }
}

/// Value for `credentials=`, quoted when the path would split the option list.
fn credentials_option_value(path: &Path) -> String {
    let path = path.to_string_lossy();
    if path.contains(',') {
        format!("\"{}\"", path)
    } else {
        path.into_owned()
    }
}
