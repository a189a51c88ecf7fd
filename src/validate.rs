//! Input checks run before any file or process is touched.

use std::net::IpAddr;
use std::path::Path;

use crate::error::{NetmountError, Result};

/// Filesystem types accepted for new shares.
pub const SUPPORTED_FS_TYPES: &[&str] = &["cifs", "smb", "smbfs", "nfs", "nfs4"];

/// Types whose source is written `//server/share`.
pub const SMB_FS_TYPES: &[&str] = &["cifs", "smb", "smbfs"];

const SHARE_FORBIDDEN: &[char] = &['\\', ':', '*', '?', '"', '<', '>', '|'];

/// Host name or IP address.
pub fn validate_hostname(hostname: &str) -> Result<()> {
    let invalid = || NetmountError::invalid_input(format!("invalid server name '{}'", hostname));

    if hostname.is_empty() {
        return Err(NetmountError::invalid_input("server name is empty"));
    }
    if hostname.parse::<IpAddr>().is_ok() {
        return Ok(());
    }
    if hostname.len() > 255 || hostname.starts_with('.') || hostname.ends_with('.') {
        return Err(invalid());
    }
    let label_ok = |label: &str| {
        (1..=63).contains(&label.len())
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    };
    if hostname.split('.').all(label_ok) {
        Ok(())
    } else {
        Err(invalid())
    }
}

/// Share name or exported path.
pub fn validate_share(share: &str) -> Result<()> {
    if share.trim_matches('/').is_empty() {
        return Err(NetmountError::invalid_input("share name is empty"));
    }
    if let Some(c) = share
        .chars()
        .find(|c| SHARE_FORBIDDEN.contains(c) || c.is_control())
    {
        return Err(NetmountError::invalid_input(format!(
            "share '{}' contains forbidden character {:?}",
            share, c
        )));
    }
    Ok(())
}

/// Mount point for a persisted share: absolute and not the root.
pub fn validate_mount_point(path: &Path) -> Result<()> {
    if !path.is_absolute() {
        return Err(NetmountError::invalid_input(format!(
            "mount point '{}' must be an absolute path",
            path.display()
        )));
    }
    if path.parent().is_none() {
        return Err(NetmountError::invalid_input("refusing to use / as a mount point"));
    }
    Ok(())
}

pub fn validate_fs_type(fs_type: &str) -> Result<()> {
    if is_supported_fs_type(fs_type) {
        Ok(())
    } else {
        Err(NetmountError::invalid_input(format!(
            "unsupported filesystem type '{}' (expected one of: {})",
            fs_type,
            SUPPORTED_FS_TYPES.join(", ")
        )))
    }
}

pub fn is_supported_fs_type(fs_type: &str) -> bool {
    SUPPORTED_FS_TYPES
        .iter()
        .any(|t| t.eq_ignore_ascii_case(fs_type))
}

pub fn is_smb_fs_type(fs_type: &str) -> bool {
    SMB_FS_TYPES.iter().any(|t| t.eq_ignore_ascii_case(fs_type))
}

/// Username/password/domain triple. An all-empty triple means "no
/// authentication" and is valid.
pub fn validate_credentials(username: &str, password: &str, domain: &str) -> Result<()> {
    if username.is_empty() && password.is_empty() && domain.is_empty() {
        return Ok(());
    }
    if username.is_empty() {
        return Err(NetmountError::invalid_input("username is required with credentials"));
    }
    if password.is_empty() {
        return Err(NetmountError::invalid_input("password is required with credentials"));
    }
    for (field, value) in [("username", username), ("password", password), ("domain", domain)] {
        if value.contains(['\n', '\r']) {
            return Err(NetmountError::invalid_input(format!(
                "{} must not contain line breaks",
                field
            )));
        }
    }
    if !domain.is_empty()
        && !domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return Err(NetmountError::invalid_input(format!("invalid domain '{}'", domain)));
    }
    Ok(())
}

/// Raw option string supplied by the user.
pub fn validate_options(options: &str) -> Result<()> {
    if options.chars().any(char::is_whitespace) {
        return Err(NetmountError::invalid_input(format!(
            "mount options must not contain whitespace: '{}'",
            options
        )));
    }
    if options.matches('"').count() % 2 != 0 {
        return Err(NetmountError::invalid_input(format!(
            "mount options have an unbalanced quote: '{}'",
            options
        )));
    }
    Ok(())
}
