//! Local path helpers shared by the client.

use std::{
    env,
    io::{Error, ErrorKind},
    path::{Path, PathBuf},
};

/// Expands a leading tilde ("~") to the user's home directory; relative
/// paths are joined onto the current working directory.
fn expand_tilde<P: AsRef<Path>>(input: P) -> PathBuf {
    let path = input.as_ref();

    if let Some(first) = path.components().next() {
        if first.as_os_str() == "~" {
            if let Some(home) = dirs::home_dir() {
                return home.join(path.strip_prefix("~").unwrap());
            }
        } else if path.is_relative() {
            if let Ok(cwd) = env::current_dir() {
                return cwd.join(path);
            }
        }
    }

    path.to_path_buf()
}

/// Resolves a local file path to an absolute, existing path.
pub fn resolve_path<P: AsRef<Path>>(input: P) -> Result<PathBuf, Error> {
    let path = expand_tilde(input.as_ref());
    let path = path.canonicalize()?;

    if path.exists() {
        Ok(path)
    } else {
        Err(Error::new(ErrorKind::NotFound, "File not found"))
    }
}
