//! Structured mount options (the fourth fstab field).
//!
//! Options are kept as an ordered set of `key[=value]` tokens instead of a raw
//! string, so inserting or replacing `credentials=` never has to search and
//! splice text.

use std::fmt;
use std::str::FromStr;

use crate::fstab::{escape_fstab, unescape_fstab};

/// Key of the option pointing at a credentials file.
pub const CREDENTIALS_KEY: &str = "credentials";

/// A single `key` or `key=value` mount option.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MountOption {
    key: String,
    value: Option<String>,
}

impl MountOption {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    pub fn flag(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    /// Split a token on its first `=`. Octal escapes in the value are
    /// decoded.
    pub fn parse(token: &str) -> Self {
        match token.split_once('=') {
            Some((key, value)) => Self::new(key.trim(), unescape_fstab(value.trim())),
            None => Self::flag(token.trim()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

/// Values are written fstab-escaped so a value with spaces stays in one field.
impl fmt::Display for MountOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}={}", self.key, escape_fstab(value)),
            None => write!(f, "{}", self.key),
        }
    }
}

/// Ordered set of mount options.
///
/// Serializes as the tokens joined by `,`; an empty set serializes as
/// `defaults` so a written fstab line always has six fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountOptions {
    options: Vec<MountOption>,
}

impl MountOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma separated option string.
    ///
    /// Commas inside double quotes do not split, so
    /// `credentials="/srv/a,b.cred"` stays one token. Empty tokens and
    /// surrounding whitespace are dropped.
    pub fn parse(options: &str) -> Self {
        let mut result = Self::new();
        for token in split_tokens(options) {
            let token = token.trim();
            if !token.is_empty() {
                result.insert(MountOption::parse(token));
            }
        }
        result
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MountOption> {
        self.options.iter()
    }

    /// First option with this key.
    pub fn get(&self, key: &str) -> Option<&MountOption> {
        self.options.iter().find(|opt| opt.key == key)
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(MountOption::value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Values of every option with this key, in order.
    pub fn values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.options
            .iter()
            .filter(move |opt| opt.key == key)
            .filter_map(MountOption::value)
    }

    /// Append an option unless the identical token is already present.
    /// Returns whether the set changed.
    pub fn insert(&mut self, option: MountOption) -> bool {
        if self.options.contains(&option) {
            return false;
        }
        self.options.push(option);
        true
    }

    /// Set `key=value`, replacing the first option with this key in place and
    /// dropping any later ones, or appending when the key is new.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let option = MountOption::new(key, value);
        match self.options.iter().position(|opt| opt.key == key) {
            Some(index) => {
                self.options[index] = option;
                let mut seen = 0usize;
                self.options.retain(|opt| {
                    if opt.key != key {
                        return true;
                    }
                    seen += 1;
                    seen == 1
                });
            }
            None => self.options.push(option),
        }
    }

    /// Remove every option with this key. Returns whether any was removed.
    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.options.len();
        self.options.retain(|opt| opt.key != key);
        self.options.len() < before
    }

    pub fn credentials(&self) -> Option<&str> {
        self.value(CREDENTIALS_KEY)
    }

    pub fn set_credentials(&mut self, path: impl Into<String>) {
        self.set(CREDENTIALS_KEY, path);
    }

    /// Merge another option set, keeping this set's order first.
    pub fn extend(&mut self, other: MountOptions) {
        for option in other.options {
            self.insert(option);
        }
    }
}

impl fmt::Display for MountOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.options.is_empty() {
            return write!(f, "defaults");
        }
        for (i, option) in self.options.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", option)?;
        }
        Ok(())
    }
}

impl FromStr for MountOptions {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl FromIterator<MountOption> for MountOptions {
    fn from_iter<I: IntoIterator<Item = MountOption>>(iter: I) -> Self {
        let mut result = Self::new();
        for option in iter {
            result.insert(option);
        }
        result
    }
}

/// Split on commas outside double quotes. With an unbalanced quote every
/// comma splits.
fn split_tokens(options: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (i, c) in options.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => {
                tokens.push(&options[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if quoted {
        return options.split(',').collect();
    }
    tokens.push(&options[start..]);
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let opts = MountOptions::parse("rw,vers=3.0,uid=1000");
        assert_eq!(opts.len(), 3);
        assert_eq!(opts.value("vers"), Some("3.0"));
        assert!(opts.contains("rw"));
        assert_eq!(opts.value("rw"), None);
        assert_eq!(opts.to_string(), "rw,vers=3.0,uid=1000");
    }

    #[test]
    fn test_parse_edge_cases() {
        // Leading/trailing/double commas and whitespace
        let opts = MountOptions::parse(" ,rw,, noauto ,");
        assert_eq!(opts.to_string(), "rw,noauto");

        // Exact duplicates collapse
        assert_eq!(MountOptions::parse("rw,rw,user").to_string(), "rw,user");

        // Empty set
        let empty = MountOptions::parse("");
        assert!(empty.is_empty());
        assert_eq!(empty.to_string(), "defaults");
    }

    #[test]
    fn test_value_splits_on_first_equals() {
        let opts = MountOptions::parse("password=a=b=c");
        assert_eq!(opts.value("password"), Some("a=b=c"));
    }

    #[test]
    fn test_quoted_value_keeps_commas() {
        let opts = MountOptions::parse("vers=3.0,credentials=\"/srv/a,b.cred\",ro");
        assert_eq!(opts.len(), 3);
        assert_eq!(opts.credentials(), Some("\"/srv/a,b.cred\""));
        assert_eq!(
            opts.to_string(),
            "vers=3.0,credentials=\"/srv/a,b.cred\",ro"
        );
    }

    #[test]
    fn test_value_with_space_is_escaped() {
        let mut opts = MountOptions::parse("vers=3.0");
        opts.set_credentials("/home/u/my creds/a.cred");
        let rendered = opts.to_string();
        assert_eq!(rendered, "vers=3.0,credentials=/home/u/my\\040creds/a.cred");
        assert!(!rendered.contains(' '));

        let reparsed = MountOptions::parse(&rendered);
        assert_eq!(reparsed.credentials(), Some("/home/u/my creds/a.cred"));
    }

    #[test]
    fn test_unbalanced_quote_splits_every_comma() {
        let opts = MountOptions::parse("uid=\"x,ro,vers=3.0");
        assert_eq!(opts.len(), 3);
        assert!(opts.contains("ro"));
        assert_eq!(opts.value("vers"), Some("3.0"));
        assert_eq!(opts.value("uid"), Some("\"x"));
    }

    #[test]
    fn test_set_credentials_appends() {
        let mut opts = MountOptions::parse("vers=3.0");
        opts.set_credentials("/home/u/.cifs_credentials/a.cred");
        assert_eq!(
            opts.to_string(),
            "vers=3.0,credentials=/home/u/.cifs_credentials/a.cred"
        );
    }

    #[test]
    fn test_set_credentials_replaces_in_place() {
        let mut opts = MountOptions::parse("credentials=/old,vers=3.0,credentials=/older");
        opts.set_credentials("/new");
        assert_eq!(opts.to_string(), "credentials=/new,vers=3.0");
    }

    #[test]
    fn test_remove() {
        let mut opts = MountOptions::parse("rw,user,uid=0");
        assert!(opts.remove("user"));
        assert!(!opts.remove("user"));
        assert_eq!(opts.to_string(), "rw,uid=0");
    }

    #[test]
    fn test_values_iterates_all_matches() {
        let opts = MountOptions::parse("credentials=/a,ro,credentials=/b");
        let values: Vec<_> = opts.values(CREDENTIALS_KEY).collect();
        assert_eq!(values, vec!["/a", "/b"]);
    }

    #[test]
    fn test_extend_keeps_order_and_dedups() {
        let mut opts = MountOptions::parse("rw,user");
        opts.extend(MountOptions::parse("user,vers=3.0"));
        assert_eq!(opts.to_string(), "rw,user,vers=3.0");
    }
}
