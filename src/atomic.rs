//! Atomic file replacement.
//!
//! Content goes to a temporary file in the destination directory (same
//! filesystem, so the final rename is atomic), gets its final mode, is synced,
//! and only then is renamed over the destination. Readers observe either the
//! old file or the complete new one.

use std::fs::{self, Permissions};
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tempfile::NamedTempFile;

/// Replace `path` with `content`, leaving it with permission bits `mode`.
pub fn atomic_write(path: &Path, content: &[u8], mode: u32) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    // Dropped (and removed) on every early return
    let mut temp = NamedTempFile::new_in(parent)?;
    temp.as_file()
        .set_permissions(Permissions::from_mode(mode))?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    // Directory entry durability is best effort
    if let Ok(dir) = fs::File::open(parent) {
        let _ = dir.sync_all();
    }
    Ok(())
}

/// Permission bits (lower 12 bits of the mode) of `path`.
pub fn mode_of(path: &Path) -> io::Result<u32> {
    Ok(fs::metadata(path)?.permissions().mode() & 0o7777)
}
