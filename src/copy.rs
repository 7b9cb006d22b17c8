//! Placing resolved libraries next to the binary.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::error::ResolveError;

/// Make a file executable by its owner, group and others (adds `0o111`).
pub fn make_executable(path: &Path) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o111);
    fs::set_permissions(path, perms)
}

/// Copy the library at `src` into `dest_dir` under the name `lib_name`.
///
/// Symlinks are followed, so the vendored file is always a real copy.
/// Returns `Ok(false)` without writing anything if `dest_dir` already holds
/// an entry of that name.
pub fn vendor_library(src: &Path, dest_dir: &Path, lib_name: &str) -> Result<bool, ResolveError> {
    let dest = dest_dir.join(lib_name);
    if dest.exists() || dest.is_symlink() {
        return Ok(false); // Already vendored
    }

    let copy_failed = |source| ResolveError::CopyFailed {
        from: src.to_path_buf(),
        to: dest.clone(),
        source,
    };

    fs::copy(src, &dest).map_err(copy_failed)?;

    let executable = fs::metadata(src)
        .map(|m| m.permissions().mode() & 0o100 != 0)
        .map_err(copy_failed)?;
    if executable {
        make_executable(&dest).map_err(copy_failed)?;
    }

    Ok(true)
}
