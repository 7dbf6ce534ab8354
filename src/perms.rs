//! Working-tree write-permission handling.
//!
//! When `modify_permissions` is enabled, tracked files that are not
//! safe to edit are kept read-only on disk. Only the user-write bit is
//! touched; everything else about the file mode is preserved.

use std::path::Path;

use crate::error::{GitalongError, Result};

/// Whether the file at `path` lacks the user-write bit.
pub fn is_read_only(path: &Path) -> std::io::Result<bool> {
    let metadata = std::fs::metadata(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        Ok(metadata.permissions().mode() & 0o200 == 0)
    }
    #[cfg(not(unix))]
    {
        Ok(metadata.permissions().readonly())
    }
}

/// Set or clear the user-write bit on `path`.
///
/// `writable = true` ORs the bit on; `writable = false` ANDs it off.
pub fn set_write_bit(path: &Path, writable: bool) -> std::io::Result<()> {
    let metadata = std::fs::metadata(path)?;
    let mut permissions = metadata.permissions();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = permissions.mode();
        permissions.set_mode(if writable { mode | 0o200 } else { mode & !0o200 });
    }
    #[cfg(not(unix))]
    {
        permissions.set_readonly(!writable);
    }
    std::fs::set_permissions(path, permissions)
}

/// Set the write bit without failing on files that cannot be touched.
///
/// Missing files are skipped. A permission error reports whether the
/// file already is in the desired state: denied-but-read-only counts as
/// success when asking for read-only. Returns whether the file ends up
/// in the requested state.
pub fn set_write_bit_safe(path: &Path, writable: bool) -> bool {
    match set_write_bit(path, writable) {
        Ok(()) => true,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => false,
        Err(_) => !writable,
    }
}

/// Strict variant used by claim/release: a failure on an existing file
/// surfaces as [`GitalongError::PermissionDenied`].
pub fn set_write_bit_checked(path: &Path, writable: bool) -> Result<()> {
    match set_write_bit(path, writable) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(GitalongError::PermissionDenied {
            path: path.to_path_buf(),
            source: err,
        }),
    }
}
