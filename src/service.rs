//! Facade used by front ends.
//!
//! [`NetworkMounter`] bundles a [`Config`], the credential store and the
//! reconciler behind the handful of operations a UI needs. Add and remove
//! report through [`OperationResult`] so callers get one success flag and a
//! message to show whatever happened underneath.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::error;

use crate::config::Config;
use crate::credentials::{CredentialInfo, CredentialStore, PurgeReport};
use crate::error::Result;
use crate::fstab::{FstabDocument, FstabEntry};
use crate::paths::PathResolver;
use crate::privilege::{Elevator, SudoElevator};
use crate::reconcile::{ConflictResolver, FstabReconciler, ReconcileOutcome, ShareRequest};
use crate::unused::UnusedCredentialFinder;

/// Success flag plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    pub success: bool,
    pub message: String,
}

impl OperationResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

impl From<Result<ReconcileOutcome>> for OperationResult {
    fn from(result: Result<ReconcileOutcome>) -> Self {
        match result {
            Ok(outcome) => Self {
                success: outcome.is_success(),
                message: outcome.to_string(),
            },
            Err(e) => {
                error!("{}", e);
                Self::failed(e.to_string())
            }
        }
    }
}

impl fmt::Display for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Persistent network share management.
#[derive(Debug)]
pub struct NetworkMounter<E = SudoElevator> {
    config: Config,
    resolver: PathResolver,
    reconciler: FstabReconciler<E>,
}

impl NetworkMounter<SudoElevator> {
    /// Mounter elevating with the program named in `config`.
    pub fn new(config: Config) -> Self {
        let elevator = SudoElevator::from_config(&config);
        Self::with_elevator(config, elevator)
    }
}

impl<E: Elevator> NetworkMounter<E> {
    pub fn with_elevator(config: Config, elevator: E) -> Self {
        let reconciler = FstabReconciler::new(&config, elevator);
        Self {
            resolver: PathResolver::new(&config.home_dir),
            reconciler,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &CredentialStore {
        self.reconciler.store()
    }

    /// Persist `request` in fstab, asking `conflicts` if its mount point is
    /// already in use.
    pub fn add_share(
        &self,
        request: &ShareRequest,
        conflicts: &dyn ConflictResolver,
    ) -> OperationResult {
        self.reconciler.add_entry(request, conflicts).into()
    }

    /// Remove the fstab entries for `mount_point`.
    pub fn remove_share(&self, mount_point: &Path) -> OperationResult {
        self.reconciler.remove_entry(mount_point).into()
    }

    /// The fstab file as it currently is on disk.
    pub fn read_fstab_raw(&self) -> Result<String> {
        self.reconciler.read_current()
    }

    pub fn fstab(&self) -> Result<FstabDocument> {
        let content = self.read_fstab_raw()?;
        Ok(FstabDocument::parse(
            self.reconciler.fstab_path(),
            &content,
            self.resolver.clone(),
        ))
    }

    /// Entries of a network filesystem type.
    pub fn network_shares(&self) -> Result<Vec<FstabEntry>> {
        Ok(self
            .fstab()?
            .network_shares()
            .into_iter()
            .cloned()
            .collect())
    }

    /// Credential files not referenced by any fstab entry.
    pub fn list_unused_credentials(&self) -> Result<Vec<CredentialInfo>> {
        let document = self.fstab()?;
        Ok(UnusedCredentialFinder::new(self.store(), self.resolver.clone()).find(&document))
    }

    pub fn purge_credentials(&self, paths: &[PathBuf]) -> PurgeReport {
        self.store().purge(paths)
    }

    /// Delete stored credential files older than `days`, used or not.
    pub fn purge_credentials_older_than(&self, days: u64) -> PurgeReport {
        self.store().purge_older_than(days)
    }
}
