//! Single daemon instance guard
//!
//! Windows uses a named mutex in the session namespace. Elsewhere an exclusive
//! lock on a file in the data directory stands in for it.

use color_eyre::eyre::Result;
#[cfg(not(windows))]
use std::path::Path;

#[cfg(windows)]
const MUTEX_NAME: windows::core::PCWSTR = windows::core::w!("Local\\masw-single-instance");

/// Held for the daemon's lifetime; released on drop
pub struct InstanceLock {
    #[cfg(windows)]
    handle: windows::Win32::Foundation::HANDLE,
    #[cfg(not(windows))]
    _file: std::fs::File,
}

impl InstanceLock {
    /// Take the instance lock, or `None` if another daemon already holds it
    ///
    /// # Errors
    /// Returns an error if the lock cannot be created at all.
    #[cfg(windows)]
    pub fn acquire() -> Result<Option<Self>> {
        use color_eyre::eyre::Context;
        use windows::Win32::Foundation::{CloseHandle, ERROR_ALREADY_EXISTS, GetLastError};
        use windows::Win32::System::Threading::CreateMutexW;

        let handle = unsafe { CreateMutexW(None, true, MUTEX_NAME) }
            .context("Failed to create instance mutex")?;

        if unsafe { GetLastError() } == ERROR_ALREADY_EXISTS {
            let _ = unsafe { CloseHandle(handle) };
            return Ok(None);
        }
        Ok(Some(Self { handle }))
    }

    /// Whether a daemon currently holds the lock
    #[cfg(windows)]
    #[must_use]
    pub fn is_held() -> bool {
        use windows::Win32::Foundation::CloseHandle;
        use windows::Win32::System::Threading::{OpenMutexW, SYNCHRONIZATION_SYNCHRONIZE};

        match unsafe { OpenMutexW(SYNCHRONIZATION_SYNCHRONIZE, false, MUTEX_NAME) } {
            Ok(handle) => {
                let _ = unsafe { CloseHandle(handle) };
                true
            }
            Err(_) => false,
        }
    }

    /// Take the instance lock, or `None` if another daemon already holds it
    ///
    /// # Errors
    /// Returns an error if the data directory is unknown or the lock file cannot be opened.
    #[cfg(not(windows))]
    pub fn acquire() -> Result<Option<Self>> {
        Self::acquire_at(&lock_path()?)
    }

    /// Whether a daemon currently holds the lock
    #[cfg(not(windows))]
    #[must_use]
    pub fn is_held() -> bool {
        lock_path().is_ok_and(|path| Self::is_held_at(&path))
    }

    #[cfg(not(windows))]
    fn is_held_at(path: &Path) -> bool {
        use std::fs::{OpenOptions, TryLockError};

        // No file means no daemon has ever run; don't create one just to look
        let Ok(file) = OpenOptions::new().write(true).open(path) else {
            return false;
        };
        matches!(file.try_lock(), Err(TryLockError::WouldBlock))
    }

    #[cfg(not(windows))]
    fn acquire_at(path: &Path) -> Result<Option<Self>> {
        use color_eyre::eyre::Context;
        use std::fs::{self, File, OpenOptions, TryLockError};

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file: File = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open lock file {}", path.display()))?;

        match file.try_lock() {
            Ok(()) => Ok(Some(Self { _file: file })),
            Err(TryLockError::WouldBlock) => Ok(None),
            Err(TryLockError::Error(e)) => {
                Err(e).with_context(|| format!("Failed to lock {}", path.display()))
            }
        }
    }
}

#[cfg(not(windows))]
fn lock_path() -> Result<std::path::PathBuf> {
    Ok(dirs::data_local_dir()
        .ok_or_else(|| color_eyre::eyre::eyre!("Could not determine data directory"))?
        .join("masw")
        .join("masw.lock"))
}

#[cfg(windows)]
impl Drop for InstanceLock {
    fn drop(&mut self) {
        use windows::Win32::Foundation::CloseHandle;
        use windows::Win32::System::Threading::ReleaseMutex;

        unsafe {
            let _ = ReleaseMutex(self.handle);
            let _ = CloseHandle(self.handle);
        }
    }
}
