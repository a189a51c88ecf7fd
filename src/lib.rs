//! # netmount
//!
//! Persist authenticated network shares in fstab.
//!
//! `netmount` writes CIFS/SMB and NFS entries into `/etc/fstab` so shares are
//! mounted at boot, storing each share's username and password in its own
//! owner-only credential file referenced through `credentials=`. It never
//! mounts anything itself.
//!
//! ## Features
//!
//! - Adds, replaces and removes fstab entries while preserving comments,
//!   blank lines and lines it cannot parse
//! - Writes fstab atomically, with a `.bak` copy of the previous version
//! - Falls back to `sudo` or `pkexec` only when the file is not writable
//! - Finds credential files no entry refers to, and securely erases them
//!
//! ## Usage
//!
//! ```bash
//! # Persist //nas/team at /mnt/team with credentials
//! NETMOUNT_PASSWORD=secret netmount add --server nas --share team \
//!     --mount-point /mnt/team --username alice --options vers=3.0
//!
//! # Credential files left behind by removed entries
//! netmount unused
//! netmount purge --unused
//! ```

pub mod atomic;
pub mod config;
pub mod credentials;
pub mod error;
pub mod fstab;
pub mod options;
pub mod paths;
pub mod privilege;
pub mod reconcile;
pub mod service;
pub mod unused;
pub mod validate;

pub use config::{Config, Elevation};
pub use credentials::{CredentialInfo, CredentialStore, Credentials, PurgeReport};
pub use error::{ErrorCategory, ErrorCode, NetmountError, Result};
pub use fstab::{escape_fstab, FstabDocument, FstabEntry, FstabLine};
pub use options::{MountOption, MountOptions};
pub use paths::PathResolver;
pub use privilege::{Elevator, SudoElevator};
pub use reconcile::{
    AlwaysReplace, CancelReason, ConflictDecision, ConflictResolver, FstabReconciler,
    KeepExisting, ReconcileOutcome, ShareRequest,
};
pub use service::{NetworkMounter, OperationResult};
pub use unused::{MatchRule, UnusedCredentialFinder};
