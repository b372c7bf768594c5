use crate::debug;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, IntoRawFd, RawFd};
use std::path::{Path, PathBuf};

/// An open block-device node
///
/// Owns its descriptor exclusively. The descriptor is released either
/// by [`DeviceHandle::close`], which reports failure, or on drop, which
/// cannot. Because `close` consumes the handle, a closed handle can
/// never be used for I/O again.
#[derive(Debug)]
pub struct DeviceHandle {
    path: PathBuf,
    file: File,
}

impl DeviceHandle {
    /// Open `path` for reading and writing
    ///
    /// The open is not exclusive (no `O_EXCL`), so other processes may
    /// hold the same device open. Failures are returned as-is; there is
    /// no retry.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        debug::println!("opened {} as fd {}", path.display(), file.as_raw_fd());
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the descriptor, reporting any error from `close(2)`
    pub fn close(self) -> io::Result<()> {
        let Self { path, file } = self;
        let fd = file.into_raw_fd();
        debug::println!("closing {} (fd {})", path.display(), fd);
        // SAFETY: fd came from into_raw_fd, so nothing else owns it
        nix::errno::Errno::result(unsafe { libc::close(fd) })
            .map(drop)
            .map_err(io::Error::from)
    }
}

impl AsRawFd for DeviceHandle {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl AsFd for DeviceHandle {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}
