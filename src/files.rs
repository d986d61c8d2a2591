//! Local file access for templates and private keys.
//!
//! Reads go through `cap-std` ambient directories so a path is always
//! resolved relative to an explicitly opened parent. Private keys are
//! created with mode `0600`, and pre-existing files are tightened to it.

use std::fs::{OpenOptions, Permissions};
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};

/// Permission bits applied to persisted private keys.
pub const OWNER_ONLY_MODE: u32 = 0o600;

/// Expands a leading `~/` prefix to the user's home directory.
///
/// The input is returned unchanged when `HOME` is not set.
///
/// # Examples
///
/// ```
/// # use armada::files::expand_tilde;
/// assert_eq!(expand_tilde("/absolute/path"), "/absolute/path");
/// ```
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    path.to_owned()
}

fn split_parent(path: &Utf8Path) -> Result<(&Utf8Path, &Utf8Path), String> {
    if !path.is_absolute() {
        return Ok((Utf8Path::new("."), path));
    }
    let parent = path
        .parent()
        .ok_or_else(|| format!("path has no parent directory: {path}"))?;
    let file_name = path
        .file_name()
        .ok_or_else(|| format!("path has no file name: {path}"))?;
    Ok((parent, Utf8Path::new(file_name)))
}

/// Reads a UTF-8 file after tilde expansion.
///
/// # Errors
///
/// Returns a human-readable message when the file cannot be opened or read.
pub fn read_to_string(path: &str) -> Result<String, String> {
    let expanded = expand_tilde(path);
    let full = Utf8Path::new(&expanded);
    let (dir_path, file_path) = split_parent(full)?;
    let dir =
        Dir::open_ambient_dir(dir_path, ambient_authority()).map_err(|err| err.to_string())?;
    dir.read_to_string(file_path).map_err(|err| err.to_string())
}

/// Returns `true` when `path` names an existing file.
///
/// # Errors
///
/// Returns a human-readable message when the parent directory exists but
/// cannot be inspected.
pub fn file_exists(path: &str) -> Result<bool, String> {
    let expanded = expand_tilde(path);
    let full = Utf8Path::new(&expanded);
    let (dir_path, file_path) = split_parent(full)?;
    match Dir::open_ambient_dir(dir_path, ambient_authority()) {
        Ok(dir) => dir.try_exists(file_path).map_err(|err| err.to_string()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.to_string()),
    }
}

/// Writes `contents` to `path`, creating or truncating it with mode `0600`.
///
/// # Errors
///
/// Returns a human-readable message when the file cannot be created or
/// written.
pub fn write_owner_only(path: &str, contents: &str) -> Result<(), String> {
    let expanded = expand_tilde(path);
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(OWNER_ONLY_MODE)
        .open(&expanded)
        .map_err(|err| err.to_string())?;
    file.write_all(contents.as_bytes())
        .map_err(|err| err.to_string())?;
    std::fs::set_permissions(&expanded, Permissions::from_mode(OWNER_ONLY_MODE))
        .map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_path(dir: &TempDir, name: &str) -> String {
        dir.path().join(name).to_string_lossy().into_owned()
    }

    #[test]
    fn write_owner_only_restricts_permissions() {
        let dir = TempDir::new().expect("temp dir");
        let path = temp_path(&dir, "key.pem");

        write_owner_only(&path, "secret").expect("write key");

        let mode = std::fs::metadata(&path)
            .expect("metadata")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, OWNER_ONLY_MODE);
        assert_eq!(read_to_string(&path).expect("read back"), "secret");
    }

    #[test]
    fn write_owner_only_tightens_existing_file() {
        let dir = TempDir::new().expect("temp dir");
        let path = temp_path(&dir, "key.pem");
        std::fs::write(&path, "old").expect("seed file");
        std::fs::set_permissions(&path, Permissions::from_mode(0o644))
            .expect("loosen permissions");

        write_owner_only(&path, "new").expect("rewrite key");

        let mode = std::fs::metadata(&path)
            .expect("metadata")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, OWNER_ONLY_MODE);
    }

    #[test]
    fn file_exists_is_false_for_missing_parent() {
        let dir = TempDir::new().expect("temp dir");
        let path = temp_path(&dir, "missing/key.pem");
        assert_eq!(file_exists(&path), Ok(false));
    }

    #[test]
    fn read_to_string_reports_missing_file() {
        let dir = TempDir::new().expect("temp dir");
        let path = temp_path(&dir, "absent.sh");
        assert!(read_to_string(&path).is_err());
    }
}
