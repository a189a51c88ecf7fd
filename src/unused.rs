//! Credential files no fstab entry refers to.

use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::credentials::{CredentialInfo, CredentialStore};
use crate::fstab::FstabDocument;
use crate::options::CREDENTIALS_KEY;
use crate::paths::PathResolver;

/// Ways a stored file can match a `credentials=` reference, tried in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    /// Same device and inode.
    SameFile,
    /// Equal canonical paths.
    SamePath,
    /// Equal file names, wherever the reference points.
    SameFileName,
    /// Equal file names once `.` is read as `_`.
    NormalizedFileName,
}

impl MatchRule {
    pub const ALL: [MatchRule; 4] = [
        MatchRule::SameFile,
        MatchRule::SamePath,
        MatchRule::SameFileName,
        MatchRule::NormalizedFileName,
    ];

    /// Whether `candidate` (a stored file) is what `reference` points at.
    /// Both paths are expected in canonical form.
    pub fn matches(self, candidate: &Path, reference: &Path) -> bool {
        match self {
            MatchRule::SameFile => match (fs::metadata(candidate), fs::metadata(reference)) {
                (Ok(a), Ok(b)) => a.dev() == b.dev() && a.ino() == b.ino(),
                _ => false,
            },
            MatchRule::SamePath => candidate == reference,
            MatchRule::SameFileName => match (candidate.file_name(), reference.file_name()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
            MatchRule::NormalizedFileName => {
                match (candidate.file_name(), reference.file_name()) {
                    (Some(a), Some(b)) => {
                        normalized_name(&a.to_string_lossy())
                            == normalized_name(&b.to_string_lossy())
                    }
                    _ => false,
                }
            }
        }
    }
}

fn normalized_name(name: &str) -> String {
    name.replace('.', "_")
}

/// Classifies the files of a [`CredentialStore`] against an fstab.
#[derive(Debug)]
pub struct UnusedCredentialFinder<'a> {
    store: &'a CredentialStore,
    resolver: PathResolver,
    rules: Vec<MatchRule>,
}

impl<'a> UnusedCredentialFinder<'a> {
    pub fn new(store: &'a CredentialStore, resolver: PathResolver) -> Self {
        Self {
            store,
            resolver,
            rules: MatchRule::ALL.to_vec(),
        }
    }

    /// Restrict matching to `rules`, in the given order.
    pub fn with_rules(mut self, rules: &[MatchRule]) -> Self {
        self.rules = rules.to_vec();
        self
    }

    /// Canonical paths of every `credentials=` value in `document`.
    pub fn references(&self, document: &FstabDocument) -> Vec<PathBuf> {
        let mut references = Vec::new();
        for entry in document.entries() {
            for value in entry.options.values(CREDENTIALS_KEY) {
                let raw = value.trim_matches('"').trim_matches('\'');
                if raw.is_empty() {
                    continue;
                }
                let resolved = self.resolver.canonicalize(Path::new(raw));
                debug!("{} references {}", entry.mount_point.display(), resolved.display());
                references.push(resolved);
            }
        }
        references
    }

    /// Stored files that match no reference, sorted by path.
    ///
    /// Files that cannot be parsed are still reported, without a username.
    pub fn find(&self, document: &FstabDocument) -> Vec<CredentialInfo> {
        let references = self.references(document);

        let mut unused = Vec::new();
        for path in self.store.list() {
            let candidate = self.resolver.canonicalize(&path);
            if let Some(rule) = self.used_by(&candidate, &references) {
                debug!("{} is in use ({:?})", path.display(), rule);
                continue;
            }
            match self.store.info(&path) {
                Ok(info) => unused.push(info),
                Err(e) => warn!("{}", e),
            }
        }
        unused.sort_by(|a, b| a.path.cmp(&b.path));
        unused
    }

    fn used_by(&self, candidate: &Path, references: &[PathBuf]) -> Option<MatchRule> {
        self.rules.iter().copied().find(|rule| {
            references
                .iter()
                .any(|reference| rule.matches(candidate, reference))
        })
    }
}
