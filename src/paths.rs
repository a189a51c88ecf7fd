//! Path expansion and canonicalization.
//!
//! fstab entries and `credentials=` options reference paths in whatever form
//! an administrator typed them: with `~`, relative components, or through
//! symlinks. [`PathResolver`] turns them into a single comparable form.

use std::path::{Component, Path, PathBuf};

/// Resolves `~`, `.`, `..` and symlinks against a fixed home directory.
#[derive(Debug, Clone)]
pub struct PathResolver {
    home: PathBuf,
}

impl PathResolver {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Expand a leading `~` or `~/`. `~user` forms are left untouched.
    pub fn expand_tilde(&self, path: &Path) -> PathBuf {
        let mut components = path.components();
        match components.next() {
            Some(Component::Normal(first)) if first == "~" => {
                self.home.join(components.as_path())
            }
            _ => path.to_path_buf(),
        }
    }

    /// Canonicalize a path that may not fully exist.
    ///
    /// The longest existing ancestor is resolved through the filesystem
    /// (symlinks included); the remaining components are normalized
    /// lexically. Relative paths are taken from the current directory.
    pub fn canonicalize(&self, path: &Path) -> PathBuf {
        let expanded = self.expand_tilde(path);
        let absolute = if expanded.is_absolute() {
            expanded
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(&expanded))
                .unwrap_or(expanded)
        };
        let absolute = normalize_lexically(&absolute);

        let mut existing = absolute.clone();
        let mut missing = Vec::new();
        loop {
            if let Ok(mut resolved) = std::fs::canonicalize(&existing) {
                for part in missing.iter().rev() {
                    resolved.push(part);
                }
                return resolved;
            }
            match existing.file_name() {
                Some(name) => missing.push(name.to_os_string()),
                None => break,
            }
            if !existing.pop() {
                break;
            }
        }
        absolute
    }
}

/// Remove `.` and resolve `..` without touching the filesystem.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` at the root stays at the root
                if !result.pop() && !path.is_absolute() {
                    result.push("..");
                }
            }
            other => result.push(other.as_os_str()),
        }
    }
    if result.as_os_str().is_empty() {
        result.push(if path.is_absolute() { "/" } else { "." });
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_tilde() {
        let resolver = PathResolver::new("/home/alice");
        assert_eq!(
            resolver.expand_tilde(Path::new("~/.cifs_credentials/x.cred")),
            PathBuf::from("/home/alice/.cifs_credentials/x.cred")
        );
        assert_eq!(
            resolver.expand_tilde(Path::new("~")),
            PathBuf::from("/home/alice")
        );
    }

    #[test]
    fn test_expand_tilde_leaves_other_forms() {
        let resolver = PathResolver::new("/home/alice");
        assert_eq!(
            resolver.expand_tilde(Path::new("~bob/file")),
            PathBuf::from("~bob/file")
        );
        assert_eq!(
            resolver.expand_tilde(Path::new("/etc/~/x")),
            PathBuf::from("/etc/~/x")
        );
    }

    #[test]
    fn test_normalize_lexically() {
        assert_eq!(
            normalize_lexically(Path::new("/mnt/./a/../b")),
            PathBuf::from("/mnt/b")
        );
        assert_eq!(normalize_lexically(Path::new("/..")), PathBuf::from("/"));
        assert_eq!(normalize_lexically(Path::new("/mnt/")), PathBuf::from("/mnt"));
    }

    #[test]
    fn test_canonicalize_missing_tail() {
        let dir = tempfile::tempdir().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        let resolver = PathResolver::new(&root);

        let result = resolver.canonicalize(&root.join("not/yet/../there"));
        assert_eq!(result, root.join("not/there"));
    }

    #[test]
    fn test_canonicalize_resolves_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        std::fs::create_dir(root.join("real")).unwrap();
        std::os::unix::fs::symlink(root.join("real"), root.join("link")).unwrap();

        let resolver = PathResolver::new(&root);
        assert_eq!(
            resolver.canonicalize(Path::new("~/link/share")),
            root.join("real/share")
        );
    }
}
