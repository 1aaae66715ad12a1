//! File-backed shared windows.
//!
//! A simulated modem running in another process maps the same file with
//! `MAP_SHARED` and sees every semaphore flip and FIFO write immediately.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use crate::Region;

/// A `MAP_SHARED` mapping of a whole file.
pub struct MmapRegion {
    ptr: *mut u8,
    len: usize,
    #[allow(dead_code)]
    file: File,
    path: PathBuf,
    /// Creator unlinks the file on drop; attachers leave it alone.
    unlink_on_drop: bool,
}

impl MmapRegion {
    /// Create (or truncate) `path`, size it to `size` zero bytes and map it.
    ///
    /// The file is created with mode 0600.
    pub fn create(path: &Path, size: usize) -> io::Result<Self> {
        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "shared window size must be > 0",
            ));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        file.set_len(size as u64)?;

        let ptr = map_shared(&file, size)?;
        Ok(Self {
            ptr,
            len: size,
            file,
            path: path.to_path_buf(),
            unlink_on_drop: true,
        })
    }

    /// Map an existing window file; its length is the window size.
    pub fn attach(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let size = file.metadata()?.len() as usize;
        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "shared window file is empty",
            ));
        }

        let ptr = map_shared(&file, size)?;
        Ok(Self {
            ptr,
            len: size,
            file,
            path: path.to_path_buf(),
            unlink_on_drop: false,
        })
    }

    #[inline]
    pub fn region(&self) -> Region {
        // SAFETY: the mapping lives as long as self.
        unsafe { Region::from_raw(self.ptr, self.len) }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the backing file after this mapping is dropped.
    pub fn persist(&mut self) {
        self.unlink_on_drop = false;
    }
}

fn map_shared(file: &File, size: usize) -> io::Result<*mut u8> {
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            file.as_raw_fd(),
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    Ok(ptr as *mut u8)
}

impl Drop for MmapRegion {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr as *mut libc::c_void, self.len);
        }
        if self.unlink_on_drop {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

// SAFETY: the mapping is valid for the lifetime of MmapRegion; concurrent
// access is arbitrated by whoever lays structures out inside it.
unsafe impl Send for MmapRegion {}
unsafe impl Sync for MmapRegion {}
