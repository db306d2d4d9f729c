//! Process-wide registry of open backing paths.
//!
//! A store or interning log registers its path before touching any file and
//! keeps the returned [`PathGuard`] for as long as it lives. Opening the same
//! path again while the guard is alive fails with [`Error::AlreadyOpen`].

use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
};

use fxhash::FxHashSet;
use parking_lot::Mutex;

use crate::error::{Error, Result};

static OPEN_PATHS: LazyLock<Mutex<FxHashSet<PathBuf>>> =
    LazyLock::new(|| Mutex::new(FxHashSet::default()));

/// Exclusive registration of a backing path, released on drop.
#[derive(Debug)]
pub(crate) struct PathGuard {
    path: PathBuf,
}

impl PathGuard {
    /// Registers `path`, failing if it is already registered.
    pub(crate) fn acquire(path: &Path) -> Result<Self> {
        let path =
            std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());

        if !OPEN_PATHS.lock().insert(path.clone()) {
            return Err(Error::AlreadyOpen(path));
        }

        Ok(Self { path })
    }

    pub(crate) fn path(&self) -> &Path { &self.path }
}

impl Drop for PathGuard {
    fn drop(&mut self) { OPEN_PATHS.lock().remove(&self.path); }
}
