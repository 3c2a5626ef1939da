// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for external files that need to be
//! read, like the settings file or the user's netrc file.

use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(NoWayHome)
}

/// Determine default absolute path to settings file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/epsword/config.toml` as the
/// default absolute path. Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_settings_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("epsword").join("config.toml"))
        .ok_or(NoWayHome)
}

/// Locate the user's netrc file.
///
/// Prefers `~/.netrc`, but falls back to `~/_netrc` which is the name Windows
/// users tend to end up with. Returns `None` if neither exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn netrc_path() -> Result<Option<PathBuf>> {
    let home = home_dir()?;
    Ok(netrc_path_in(home))
}

pub(crate) fn netrc_path_in(home: impl AsRef<Path>) -> Option<PathBuf> {
    [".netrc", "_netrc"]
        .into_iter()
        .map(|name| home.as_ref().join(name))
        .find(|path| path.is_file())
}

/// Perform shell expansion on a user supplied path.
///
/// Expands `~` and environment variables. Falls back to the path as given if
/// expansion fails, e.g., because of an unset variable.
pub fn expand_path(path: impl AsRef<Path>) -> PathBuf {
    let raw = path.as_ref().to_string_lossy();
    match shellexpand::full(raw.as_ref()) {
        Ok(expanded) => PathBuf::from(expanded.into_owned()),
        Err(_) => path.as_ref().to_path_buf(),
    }
}

/// List regular files below target directory.
///
/// Walks the directory recursively, skipping hidden entries. Ignore files
/// like `.gitignore` are not honored, an upload directory is not a
/// repository. The listing is sorted to keep logs stable, but callers must not
/// rely on any particular order.
pub fn files_under(dir: impl AsRef<Path>) -> Vec<PathBuf> {
    let mut files = WalkBuilder::new(dir.as_ref())
        .standard_filters(false)
        .hidden(true)
        .build()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(error) => {
                warn!("skip unreadable entry: {error}");
                None
            }
        })
        .filter(|entry| entry.file_type().is_some_and(|kind| kind.is_file()))
        .map(|entry| entry.into_path())
        .collect::<Vec<_>>();
    files.sort();

    files
}

/// Check whether path carries one of the given extensions.
///
/// Extensions are given without leading dot and compared case-sensitively.
pub fn has_extension(path: impl AsRef<Path>, extensions: &[&str]) -> bool {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.contains(&ext))
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;
