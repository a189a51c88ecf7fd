//! In-memory model of an fstab file.
//!
//! A document is the file's lines in order. Data lines become [`FstabEntry`]
//! values; comments, blank lines and lines that fail to parse are carried
//! through untouched so that saving never drops or reorders anything an
//! administrator wrote.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::atomic::atomic_write;
use crate::error::{NetmountError, Result};
use crate::options::MountOptions;
use crate::paths::PathResolver;

/// Filesystem types treated as network shares.
pub const NETWORK_FS_TYPES: &[&str] = &["nfs", "nfs4", "cifs", "smb", "smbfs"];

/// Mode of the fstab file after every write.
pub const FSTAB_MODE: u32 = 0o644;

/// Check if a filesystem type is a network share type (case-insensitive).
pub fn is_network_fs(fs_type: &str) -> bool {
    NETWORK_FS_TYPES
        .iter()
        .any(|t| t.eq_ignore_ascii_case(fs_type))
}

/// Escape special characters for fstab output.
///
/// fstab(5) requires special characters to be octal-escaped because the line
/// is split on whitespace before parsing. Characters that need escaping:
/// - Space (\040), Tab (\011), Newline (\012), CR (\015) - field separators
/// - Backslash (\134) - escape character itself
/// - Hash (\043) - comment character
pub fn escape_fstab(s: &str) -> String {
    let mut result = String::with_capacity(s.len() * 2);
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\134"),
            ' ' => result.push_str("\\040"),
            '\t' => result.push_str("\\011"),
            '\n' => result.push_str("\\012"),
            '\r' => result.push_str("\\015"),
            '#' => result.push_str("\\043"),
            _ => result.push(c),
        }
    }
    result
}

/// Reverse [`escape_fstab`]. Any `\NNN` octal sequence is decoded; anything
/// else passes through unchanged.
pub fn unescape_fstab(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && is_octal_triplet(&bytes[i + 1..]) {
            let value = (bytes[i + 1] - b'0') as u32 * 64
                + (bytes[i + 2] - b'0') as u32 * 8
                + (bytes[i + 3] - b'0') as u32;
            if let Ok(byte) = u8::try_from(value) {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).unwrap_or_else(|_| s.to_string())
}

fn is_octal_triplet(bytes: &[u8]) -> bool {
    bytes.len() >= 3 && bytes[..3].iter().all(|b| (b'0'..=b'7').contains(b))
}

/// One mount definition: the six fstab fields plus an optional trailing
/// comment.
///
/// Two entries are equal when `source`, `mount_point` and `fs_type` match;
/// options, dump, pass and comment do not take part.
#[derive(Debug, Clone)]
pub struct FstabEntry {
    pub source: String,
    pub mount_point: PathBuf,
    pub fs_type: String,
    pub options: MountOptions,
    pub dump: u32,
    pub pass: u32,
    pub comment: Option<String>,
}

impl FstabEntry {
    pub fn new(
        source: impl Into<String>,
        mount_point: impl Into<PathBuf>,
        fs_type: impl Into<String>,
        options: MountOptions,
    ) -> Self {
        Self {
            source: source.into(),
            mount_point: mount_point.into(),
            fs_type: fs_type.into(),
            options,
            dump: 0,
            pass: 0,
            comment: None,
        }
    }

    pub fn with_dump_pass(mut self, dump: u32, pass: u32) -> Self {
        self.dump = dump;
        self.pass = pass;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        let comment = comment.into();
        self.comment = if comment.trim().is_empty() {
            None
        } else {
            Some(comment.trim().to_string())
        };
        self
    }

    pub fn is_network_share(&self) -> bool {
        is_network_fs(&self.fs_type)
    }

    /// Parse a data line. Returns a reason string for malformed lines.
    pub fn parse(line: &str) -> std::result::Result<Self, String> {
        let fields = split_fields(line, 6);
        if fields.len() < 6 {
            return Err(format!("expected 6 fields, found {}", fields.len()));
        }

        let dump = fields[4]
            .parse::<u32>()
            .map_err(|_| format!("invalid dump field '{}'", fields[4]))?;

        // The last field may carry an inline "# comment"
        let (pass_field, comment) = match fields[5].split_once('#') {
            Some((pass, comment)) => (pass.trim(), Some(comment.trim())),
            None => (fields[5].trim(), None),
        };
        let pass = pass_field
            .parse::<u32>()
            .map_err(|_| format!("invalid pass field '{}'", pass_field))?;

        let mut entry = FstabEntry::new(
            unescape_fstab(fields[0]),
            unescape_fstab(fields[1]),
            fields[2],
            MountOptions::parse(fields[3]),
        )
        .with_dump_pass(dump, pass);
        if let Some(comment) = comment {
            entry = entry.with_comment(comment);
        }
        Ok(entry)
    }
}

impl PartialEq for FstabEntry {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
            && self.mount_point == other.mount_point
            && self.fs_type == other.fs_type
    }
}

impl Eq for FstabEntry {}

impl fmt::Display for FstabEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {}",
            escape_fstab(&self.source),
            escape_fstab(&self.mount_point.to_string_lossy()),
            self.fs_type,
            self.options,
            self.dump,
            self.pass
        )?;
        if let Some(comment) = &self.comment {
            write!(f, "  # {}", comment)?;
        }
        Ok(())
    }
}

/// A line of an fstab file.
#[derive(Debug, Clone, PartialEq)]
pub enum FstabLine {
    Blank,
    /// Comment line, kept verbatim.
    Comment(String),
    /// Data line that could not be parsed, kept verbatim.
    Invalid(String),
    Entry(FstabEntry),
}

impl FstabLine {
    /// Classify a raw line.
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return FstabLine::Blank;
        }
        if trimmed.starts_with('#') {
            return FstabLine::Comment(line.trim_end().to_string());
        }
        match FstabEntry::parse(trimmed) {
            Ok(entry) => FstabLine::Entry(entry),
            Err(reason) => {
                warn!("skipping malformed fstab line ({}): {}", reason, trimmed);
                FstabLine::Invalid(line.trim_end().to_string())
            }
        }
    }

    /// New comment line from plain text.
    pub fn comment(text: &str) -> Self {
        FstabLine::Comment(format!("# {}", text.trim()))
    }

    /// Comment text with the leading `#` and whitespace stripped.
    pub fn comment_text(&self) -> Option<&str> {
        match self {
            FstabLine::Comment(raw) => Some(raw.trim().trim_start_matches('#').trim()),
            _ => None,
        }
    }

    pub fn entry(&self) -> Option<&FstabEntry> {
        match self {
            FstabLine::Entry(entry) => Some(entry),
            _ => None,
        }
    }
}

impl fmt::Display for FstabLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FstabLine::Blank => Ok(()),
            FstabLine::Comment(raw) | FstabLine::Invalid(raw) => write!(f, "{}", raw),
            FstabLine::Entry(entry) => write!(f, "{}", entry),
        }
    }
}

/// Ordered fstab contents bound to a file path.
#[derive(Debug, Clone)]
pub struct FstabDocument {
    path: PathBuf,
    lines: Vec<FstabLine>,
    resolver: PathResolver,
}

impl FstabDocument {
    /// Empty document that will be written to `path`.
    pub fn new(path: impl Into<PathBuf>, resolver: PathResolver) -> Self {
        Self {
            path: path.into(),
            lines: Vec::new(),
            resolver,
        }
    }

    /// Read and parse the file at `path`.
    ///
    /// Malformed lines are logged and skipped as entries; only a missing or
    /// unreadable file is an error.
    pub fn load(path: impl Into<PathBuf>, resolver: PathResolver) -> Result<Self> {
        let path = path.into();
        let content = fs::read_to_string(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                NetmountError::fstab_not_found(&path)
            } else {
                NetmountError::fstab_read(&path, e)
            }
        })?;
        Ok(Self::parse(path, &content, resolver))
    }

    /// Parse content that was already read (e.g. through elevation).
    pub fn parse(path: impl Into<PathBuf>, content: &str, resolver: PathResolver) -> Self {
        let lines: Vec<FstabLine> = content.lines().map(FstabLine::parse).collect();
        let doc = Self {
            path: path.into(),
            lines,
            resolver,
        };
        debug!(
            "parsed {} lines ({} entries) from {}",
            doc.lines.len(),
            doc.len(),
            doc.path.display()
        );
        doc
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines(&self) -> &[FstabLine] {
        &self.lines
    }

    pub fn entries(&self) -> impl Iterator<Item = &FstabEntry> {
        self.lines.iter().filter_map(FstabLine::entry)
    }

    /// Number of data entries.
    pub fn len(&self) -> usize {
        self.entries().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize every line in order, newline terminated.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(&line.to_string());
            out.push('\n');
        }
        out
    }

    /// Write the document back to its own path.
    pub fn save(&self, backup_first: bool) -> Result<()> {
        self.save_to(&self.path, backup_first)
    }

    /// Write the document to `path`, optionally copying the current file to
    /// `<path>.bak` first. A failed backup aborts before anything is written.
    pub fn save_to(&self, path: &Path, backup_first: bool) -> Result<()> {
        self.save_with(path, backup_first, |path, content| {
            atomic_write(path, content, FSTAB_MODE)
        })
    }

    fn save_with<W>(&self, path: &Path, backup_first: bool, write: W) -> Result<()>
    where
        W: FnOnce(&Path, &[u8]) -> io::Result<()>,
    {
        if backup_first && path.exists() {
            let backup = backup_path(path);
            fs::copy(path, &backup).map_err(|e| NetmountError::fstab_backup(path, e))?;
            info!("backed up {} to {}", path.display(), backup.display());
        }

        write(path, self.render().as_bytes()).map_err(|e| NetmountError::fstab_write(path, e))?;
        info!("wrote {} ({} entries)", path.display(), self.len());
        Ok(())
    }

    /// Append `entry`. With `check_duplicate`, an existing entry with the same
    /// source, mount point and type wins and nothing changes.
    pub fn add_entry(&mut self, entry: FstabEntry, check_duplicate: bool) -> bool {
        if check_duplicate {
            let exists = self.entries().any(|existing| {
                self.same_identity(existing, &entry.source, &entry.mount_point, &entry.fs_type)
            });
            if exists {
                warn!("fstab entry already exists: {}", entry);
                return false;
            }
        }
        self.lines.push(FstabLine::Entry(entry));
        true
    }

    /// Append a comment line.
    pub fn add_comment(&mut self, text: &str) {
        self.lines.push(FstabLine::comment(text));
    }

    /// Remove every entry with this identity. Returns whether any was removed.
    pub fn remove_entry(&mut self, source: &str, mount_point: &Path, fs_type: &str) -> bool {
        let before = self.lines.len();
        let resolver = self.resolver.clone();
        self.lines.retain(|line| match line {
            FstabLine::Entry(existing) => {
                !identity_matches(&resolver, existing, source, mount_point, fs_type)
            }
            _ => true,
        });
        self.lines.len() < before
    }

    /// Remove every entry mounted at `mount_point`, returning them.
    pub fn remove_mount_point(&mut self, mount_point: &Path) -> Vec<FstabEntry> {
        let target = self.resolver.canonicalize(mount_point);
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.lines.len());
        for line in self.lines.drain(..) {
            match line {
                FstabLine::Entry(entry)
                    if self.resolver.canonicalize(&entry.mount_point) == target =>
                {
                    removed.push(entry)
                }
                other => kept.push(other),
            }
        }
        self.lines = kept;
        removed
    }

    /// Entries whose canonical mount point equals the canonical `path`.
    pub fn find_by_mount_point(&self, path: &Path) -> Vec<&FstabEntry> {
        let target = self.resolver.canonicalize(path);
        self.entries()
            .filter(|entry| self.resolver.canonicalize(&entry.mount_point) == target)
            .collect()
    }

    /// Line index of the first entry mounted at `path`.
    pub fn position_of_mount_point(&self, path: &Path) -> Option<usize> {
        let target = self.resolver.canonicalize(path);
        self.lines.iter().position(|line| match line {
            FstabLine::Entry(entry) => self.resolver.canonicalize(&entry.mount_point) == target,
            _ => false,
        })
    }

    /// Replace the entry at line `index`, returning the previous entry.
    /// Non-entry lines are left alone and `None` is returned.
    pub fn replace_at(&mut self, index: usize, entry: FstabEntry) -> Option<FstabEntry> {
        match self.lines.get_mut(index) {
            Some(FstabLine::Entry(existing)) => Some(std::mem::replace(existing, entry)),
            _ => None,
        }
    }

    pub fn find_by_source(&self, source: &str) -> Vec<&FstabEntry> {
        self.entries().filter(|entry| entry.source == source).collect()
    }

    /// Entries whose type is one of [`NETWORK_FS_TYPES`].
    pub fn network_shares(&self) -> Vec<&FstabEntry> {
        self.entries().filter(|entry| entry.is_network_share()).collect()
    }

    fn same_identity(
        &self,
        entry: &FstabEntry,
        source: &str,
        mount_point: &Path,
        fs_type: &str,
    ) -> bool {
        identity_matches(&self.resolver, entry, source, mount_point, fs_type)
    }
}

fn identity_matches(
    resolver: &PathResolver,
    entry: &FstabEntry,
    source: &str,
    mount_point: &Path,
    fs_type: &str,
) -> bool {
    entry.source == source
        && entry.fs_type == fs_type
        && (entry.mount_point == mount_point
            || resolver.canonicalize(&entry.mount_point) == resolver.canonicalize(mount_point))
}

/// `<path>.bak` next to the original.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "fstab".into());
    name.push(".bak");
    path.with_file_name(name)
}

/// Split on runs of whitespace into at most `max` fields; the last field
/// keeps the remainder of the line (trimmed at the end).
fn split_fields(line: &str, max: usize) -> Vec<&str> {
    let mut fields = Vec::with_capacity(max);
    let mut rest = line.trim_start();
    while !rest.is_empty() {
        if fields.len() + 1 == max {
            fields.push(rest.trim_end());
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(end) => {
                fields.push(&rest[..end]);
                rest = rest[end..].trim_start();
            }
            None => {
                fields.push(rest);
                break;
            }
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    const SAMPLE: &str = "\
# /etc/fstab: static file system information.
#
# <file system> <mount point>   <type>  <options>       <dump>  <pass>
UUID=1234-abcd /               ext4    errors=remount-ro 0       1

/dev/sda2\tnone\tswap\tsw\t0\t0
//nas/media /mnt/media cifs credentials=/root/.smb,vers=3.0 0 0  # Added by netmount
nas:/export/home /mnt/home nfs4 rw,hard 0 0
broken line here
/dev/sdb1 /data ext4 defaults zero 2
";

    fn resolver() -> PathResolver {
        PathResolver::new("/home/alice")
    }

    fn doc(content: &str) -> FstabDocument {
        FstabDocument::parse("/tmp/fstab", content, resolver())
    }

    fn cifs(source: &str, mount_point: &str) -> FstabEntry {
        FstabEntry::new(source, mount_point, "cifs", MountOptions::parse("vers=3.0"))
    }

    #[test]
    fn test_parse_sample() {
        let d = doc(SAMPLE);
        assert_eq!(d.lines().len(), 10);
        assert_eq!(d.len(), 4);

        let media = d.find_by_source("//nas/media");
        assert_eq!(media.len(), 1);
        assert_eq!(media[0].mount_point, PathBuf::from("/mnt/media"));
        assert_eq!(media[0].options.credentials(), Some("/root/.smb"));
        assert_eq!(media[0].comment.as_deref(), Some("Added by netmount"));
        assert_eq!(media[0].pass, 0);
    }

    #[test]
    fn test_malformed_lines_are_not_entries_but_survive() {
        let d = doc(SAMPLE);
        let invalid: Vec<_> = d
            .lines()
            .iter()
            .filter(|l| matches!(l, FstabLine::Invalid(_)))
            .collect();
        assert_eq!(invalid.len(), 2);
        assert!(d.find_by_source("/dev/sdb1").is_empty());
        assert!(d.render().contains("/dev/sdb1 /data ext4 defaults zero 2\n"));
        assert!(d.render().contains("broken line here\n"));
    }

    #[test]
    fn test_round_trip_preserves_comments_and_entries() {
        let d = doc(SAMPLE);
        let rendered = d.render();
        let again = doc(&rendered);

        assert_eq!(d.lines(), again.lines());

        // Comment and blank lines verbatim, in order
        let original_comments: Vec<_> = SAMPLE
            .lines()
            .filter(|l| l.trim().is_empty() || l.trim_start().starts_with('#'))
            .collect();
        let rendered_comments: Vec<_> = rendered
            .lines()
            .filter(|l| l.trim().is_empty() || l.trim_start().starts_with('#'))
            .collect();
        assert_eq!(original_comments, rendered_comments);

        // Entries are normalized to single spaces
        assert!(rendered.contains("/dev/sda2 none swap sw 0 0\n"));
    }

    #[test]
    fn test_entries_compare_all_fields_after_round_trip() {
        let d = doc(SAMPLE);
        let again = doc(&d.render());
        for (a, b) in d.entries().zip(again.entries()) {
            assert_eq!(a, b);
            assert_eq!(a.options, b.options);
            assert_eq!((a.dump, a.pass), (b.dump, b.pass));
            assert_eq!(a.comment, b.comment);
        }
    }

    #[test]
    fn test_inline_comment_without_space() {
        let entry = FstabEntry::parse("//s/x /mnt/x cifs rw 0 2#note").unwrap();
        assert_eq!(entry.pass, 2);
        assert_eq!(entry.comment.as_deref(), Some("note"));
    }

    #[test]
    fn test_parse_rejects_short_and_non_numeric() {
        assert!(FstabEntry::parse("/dev/sda1 / ext4 defaults").is_err());
        assert!(FstabEntry::parse("/dev/sda1 / ext4 defaults 0").is_err());
        assert!(FstabEntry::parse("/dev/sda1 / ext4 defaults x 0").is_err());
        assert!(FstabEntry::parse("/dev/sda1 / ext4 defaults 0 1 extra").is_err());
    }

    #[test]
    fn test_escaped_mount_point_round_trip() {
        let line = "//nas/my\\040files /mnt/my\\040files cifs rw 0 0";
        let entry = FstabEntry::parse(line).unwrap();
        assert_eq!(entry.source, "//nas/my files");
        assert_eq!(entry.mount_point, PathBuf::from("/mnt/my files"));
        assert_eq!(entry.to_string(), line);
    }

    #[test]
    fn test_escape_fstab() {
        assert_eq!(escape_fstab("/mnt/my disk"), "/mnt/my\\040disk");
        assert_eq!(escape_fstab("/mnt/tab\there"), "/mnt/tab\\011here");
        assert_eq!(escape_fstab("/mnt/new\nline"), "/mnt/new\\012line");
        assert_eq!(escape_fstab("/mnt/back\\slash"), "/mnt/back\\134slash");
        assert_eq!(escape_fstab("/mnt/#weird"), "/mnt/\\043weird");
        assert_eq!(escape_fstab("/mnt/normal"), "/mnt/normal");
        assert_eq!(escape_fstab(""), "");
    }

    #[test]
    fn test_unescape_fstab() {
        assert_eq!(unescape_fstab("/mnt/my\\040disk"), "/mnt/my disk");
        assert_eq!(unescape_fstab("/mnt/back\\134slash"), "/mnt/back\\slash");
        // Not an octal sequence
        assert_eq!(unescape_fstab("/mnt/\\x20"), "/mnt/\\x20");
        assert_eq!(unescape_fstab("/mnt/\\04"), "/mnt/\\04");
        assert_eq!(unescape_fstab("/mnt/\\"), "/mnt/\\");
        // Unicode passes through
        assert_eq!(unescape_fstab("/mnt/données"), "/mnt/données");
    }

    #[test]
    fn test_duplicate_rejection() {
        let mut d = doc(SAMPLE);
        let before = d.len();

        assert!(d.add_entry(cifs("//srv/a", "/mnt/a"), true));
        assert!(!d.add_entry(cifs("//srv/a", "/mnt/a"), true));
        assert_eq!(d.len(), before + 1);

        // Options do not take part in identity
        let mut other_opts = cifs("//srv/a", "/mnt/a");
        other_opts.options = MountOptions::parse("ro");
        assert!(!d.add_entry(other_opts, true));

        // Without the check, duplicates are appended
        assert!(d.add_entry(cifs("//srv/a", "/mnt/a"), false));
        assert_eq!(d.len(), before + 2);
    }

    #[test]
    fn test_duplicate_detected_through_path_normalization() {
        let mut d = doc("//srv/a /mnt/a cifs rw 0 0\n");
        assert!(!d.add_entry(cifs("//srv/a", "/mnt/./b/../a"), true));
    }

    #[test]
    fn test_remove_entry() {
        let mut d = doc(SAMPLE);
        assert!(d.add_entry(cifs("//nas/media", "/mnt/media"), false));
        assert!(d.remove_entry("//nas/media", Path::new("/mnt/media"), "cifs"));
        assert!(d.find_by_source("//nas/media").is_empty());
        assert!(!d.remove_entry("//nas/media", Path::new("/mnt/media"), "cifs"));
        // Type is part of identity
        assert!(!d.remove_entry("nas:/export/home", Path::new("/mnt/home"), "nfs"));
    }

    #[test]
    fn test_find_by_mount_point_canonicalizes() {
        let d = doc(SAMPLE);
        assert_eq!(d.find_by_mount_point(Path::new("/mnt/media")).len(), 1);
        assert_eq!(d.find_by_mount_point(Path::new("/mnt/x/../media/")).len(), 1);
        assert!(d.find_by_mount_point(Path::new("/mnt/med")).is_empty());
    }

    #[test]
    fn test_find_by_mount_point_expands_tilde() {
        let d = doc("//s/x /home/alice/share cifs rw 0 0\n");
        assert_eq!(d.find_by_mount_point(Path::new("~/share")).len(), 1);
    }

    #[test]
    fn test_find_by_mount_point_through_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        fs::create_dir(root.join("real")).unwrap();
        std::os::unix::fs::symlink(root.join("real"), root.join("alias")).unwrap();

        let content = format!("//s/x {} cifs rw 0 0\n", root.join("real").display());
        let d = FstabDocument::parse(root.join("fstab"), &content, PathResolver::new(&root));
        assert_eq!(d.find_by_mount_point(&root.join("alias")).len(), 1);
    }

    #[test]
    fn test_network_shares() {
        let mut d = doc(SAMPLE);
        d.add_entry(
            FstabEntry::new("//x/y", "/mnt/y", "SMBFS", MountOptions::new()),
            true,
        );
        let shares: Vec<_> = d.network_shares().iter().map(|e| e.source.clone()).collect();
        assert_eq!(shares, vec!["//nas/media", "nas:/export/home", "//x/y"]);
    }

    #[test]
    fn test_replace_at_keeps_position() {
        let mut d = doc(SAMPLE);
        let index = d.position_of_mount_point(Path::new("/mnt/media")).unwrap();
        let previous = d
            .replace_at(index, cifs("//nas/media2", "/mnt/media"))
            .unwrap();
        assert_eq!(previous.source, "//nas/media");
        assert_eq!(
            d.lines()[index].entry().map(|e| e.source.as_str()),
            Some("//nas/media2")
        );
        // Comment lines are not replaceable
        assert!(d.replace_at(0, cifs("//a/b", "/mnt/b")).is_none());
    }

    #[test]
    fn test_remove_mount_point() {
        let mut d = doc(SAMPLE);
        let removed = d.remove_mount_point(Path::new("/mnt/home"));
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].source, "nas:/export/home");
        assert_eq!(d.lines().len(), 9);
    }

    #[test]
    fn test_comment_text() {
        let line = FstabLine::parse("   #  hello  ");
        assert_eq!(line.comment_text(), Some("hello"));
        assert_eq!(FstabLine::comment("Added").to_string(), "# Added");
        assert_eq!(FstabLine::parse("  \t").to_string(), "");
    }

    #[test]
    fn test_load_missing_file() {
        let err = FstabDocument::load("/nonexistent/fstab", resolver()).unwrap_err();
        assert!(err.to_string().starts_with("E005:"), "Error was: {}", err);
    }

    #[test]
    fn test_save_with_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fstab");
        fs::write(&path, SAMPLE).unwrap();

        let mut d = FstabDocument::load(&path, resolver()).unwrap();
        d.add_entry(cifs("//srv/new", "/mnt/new"), true);
        d.save(true).unwrap();

        assert_eq!(fs::read_to_string(backup_path(&path)).unwrap(), SAMPLE);
        let saved = FstabDocument::load(&path, resolver()).unwrap();
        assert_eq!(saved.len(), 5);
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }

    #[test]
    fn test_save_without_edits_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fstab");
        fs::write(&path, SAMPLE).unwrap();

        let d = FstabDocument::load(&path, resolver()).unwrap();
        d.save(false).unwrap();
        let reloaded = FstabDocument::load(&path, resolver()).unwrap();
        assert_eq!(d.lines(), reloaded.lines());
    }

    #[test]
    fn test_failed_backup_leaves_original_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fstab");
        fs::write(&path, SAMPLE).unwrap();
        // A directory where the backup file should go makes the copy fail
        fs::create_dir(backup_path(&path)).unwrap();

        let mut d = FstabDocument::load(&path, resolver()).unwrap();
        d.add_entry(cifs("//srv/new", "/mnt/new"), true);
        let err = d.save(true).unwrap_err();

        assert!(err.to_string().starts_with("E007:"), "Error was: {}", err);
        assert_eq!(fs::read_to_string(&path).unwrap(), SAMPLE);
    }

    #[test]
    fn test_failed_write_leaves_target_intact() {
        let dir = tempfile::tempdir().unwrap();
        // Renaming a file over a non-empty directory fails at the last step
        let target = dir.path().join("fstab");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("keep"), "x").unwrap();

        let d = doc(SAMPLE);
        let err = d.save_to(&target, false).unwrap_err();
        assert!(err.to_string().starts_with("E008:"), "Error was: {}", err);
        assert_eq!(fs::read_to_string(target.join("keep")).unwrap(), "x");

        // No stray temp files next to the target
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("fstab")]);
    }

    #[test]
    fn test_write_failure_after_backup_keeps_both() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("fstab");
        fs::write(&target, SAMPLE).unwrap();

        let mut d = doc(SAMPLE);
        d.add_entry(cifs("//nas/new", "/mnt/new"), true);
        let err = d
            .save_with(&target, true, |_, _| {
                Err(io::Error::new(io::ErrorKind::Other, "no space left on device"))
            })
            .unwrap_err();
        assert!(err.to_string().starts_with("E008:"), "Error was: {}", err);
        assert!(err.to_string().contains("no space left"), "Error was: {}", err);

        assert_eq!(fs::read_to_string(backup_path(&target)).unwrap(), SAMPLE);
        assert_eq!(fs::read_to_string(&target).unwrap(), SAMPLE);
    }

    #[test]
    fn test_backup_path() {
        assert_eq!(
            backup_path(Path::new("/etc/fstab")),
            PathBuf::from("/etc/fstab.bak")
        );
    }

    #[test]
    fn test_split_fields() {
        assert_eq!(
            split_fields("a  b\tc d e f  # x y", 6),
            vec!["a", "b", "c", "d", "e", "f  # x y"]
        );
        assert_eq!(split_fields("a b", 6), vec!["a", "b"]);
        assert!(split_fields("   ", 6).is_empty());
    }

    #[test]
    fn test_is_network_fs() {
        assert!(is_network_fs("cifs"));
        assert!(is_network_fs("NFS4"));
        assert!(is_network_fs("smbfs"));
        assert!(!is_network_fs("ext4"));
        assert!(!is_network_fs("sshfs"));
    }
}
