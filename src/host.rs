use std::{
    env,
    ffi::OsString,
    fs, io,
    path::{Path, PathBuf},
};

/// Everything the driver reads from the machine it runs on.
///
/// The locator and the resolver only go through this trait, so tests can swap in a fake
/// environment and file tree.
pub trait Host {
    /// Value of an environment variable, `None` if unset or empty.
    fn env_var(&self, key: &str) -> Option<OsString>;

    fn current_dir(&self) -> io::Result<PathBuf>;

    fn exists(&self, path: &Path) -> bool;

    fn is_dir(&self, path: &Path) -> bool;

    /// Names of the regular files directly inside `dir`, sorted.
    fn list_files(&self, dir: &Path) -> io::Result<Vec<OsString>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OsHost;

impl Host for OsHost {
    fn env_var(&self, key: &str) -> Option<OsString> {
        env::var_os(key).filter(|value| !value.is_empty())
    }

    #[inline]
    fn current_dir(&self) -> io::Result<PathBuf> {
        env::current_dir()
    }

    #[inline]
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    #[inline]
    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn list_files(&self, dir: &Path) -> io::Result<Vec<OsString>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name());
            }
        }
        names.sort();
        Ok(names)
    }
}
