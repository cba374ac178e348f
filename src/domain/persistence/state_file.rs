use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;

pub const RESV_STATE_FILE: &str = "resv_state";

/// `resv_state`, `resv_state.new` and `resv_state.old` in the state save location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateFilePaths {
    pub reg_file: PathBuf,
    pub new_file: PathBuf,
    pub old_file: PathBuf,
}

impl StateFilePaths {
    pub fn new(state_save_location: impl AsRef<Path>) -> Self {
        let dir = state_save_location.as_ref();
        StateFilePaths {
            reg_file: dir.join(RESV_STATE_FILE),
            new_file: dir.join(format!("{}.new", RESV_STATE_FILE)),
            old_file: dir.join(format!("{}.old", RESV_STATE_FILE)),
        }
    }
}

/// Writes `data` to `.new`, then rotates `reg -> .old` and `.new -> reg` with
/// hard links. On a write error `.new` is removed and `reg` is left alone.
pub fn write_state_file(paths: &StateFilePaths, data: &[u8]) -> Result<()> {
    if let Err(e) = write_new_file(&paths.new_file, data) {
        let _ = fs::remove_file(&paths.new_file);
        return Err(e.into());
    }

    remove_if_present(&paths.old_file)?;
    if let Err(e) = fs::hard_link(&paths.reg_file, &paths.old_file) {
        if e.kind() != ErrorKind::NotFound {
            log::warn!("Could not keep previous state file as '{}': {}", paths.old_file.display(), e);
        }
    }
    remove_if_present(&paths.reg_file)?;
    fs::hard_link(&paths.new_file, &paths.reg_file)?;
    fs::remove_file(&paths.new_file)?;
    Ok(())
}

/// `None` when no state file exists.
pub fn read_state_file(paths: &StateFilePaths) -> Result<Option<Vec<u8>>> {
    match fs::read(&paths.reg_file) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_new_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(data)?;
    file.sync_all()
}

fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
