// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 argus contributors
//
// Fifo and server-directory setup helpers. Thin libc wrappers returning
// io::Result; an already-existing directory or fifo is not an error.

use std::ffi::CString;
use std::io;
use std::os::fd::{FromRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

const DIR_MODE: libc::mode_t = 0o777;
const FIFO_MODE: libc::mode_t = 0o666;

fn cpath(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

/// Create the server directory with permissive mode if absent.
pub fn create_dir(path: &Path) -> io::Result<()> {
    let c_path = cpath(path)?;
    if unsafe { libc::mkdir(c_path.as_ptr(), DIR_MODE) } == -1 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EEXIST) {
            return Err(err);
        }
    }
    Ok(())
}

/// Create a fifo if absent.
pub fn create_fifo(path: &Path) -> io::Result<()> {
    let c_path = cpath(path)?;
    if unsafe { libc::mkfifo(c_path.as_ptr(), FIFO_MODE) } == -1 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EEXIST) {
            return Err(err);
        }
    }
    Ok(())
}

fn open_flags(path: &Path, flags: libc::c_int) -> io::Result<OwnedFd> {
    let c_path = cpath(path)?;
    let fd = unsafe { libc::open(c_path.as_ptr(), flags | libc::O_CLOEXEC) };
    if fd == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Open a fifo read-write. The server uses this for all three channels so
/// that it always counts as its own reader/writer: the command read blocks
/// instead of spinning on EOF when no client is connected, and opening the
/// report fifos at startup cannot deadlock waiting for a peer.
pub fn open_read_write(path: &Path) -> io::Result<OwnedFd> {
    open_flags(path, libc::O_RDWR)
}

/// Open a fifo write-only (blocks until a reader exists).
pub fn open_write(path: &Path) -> io::Result<OwnedFd> {
    open_flags(path, libc::O_WRONLY)
}

/// Open a fifo read-only (blocks until a writer exists).
pub fn open_read(path: &Path) -> io::Result<OwnedFd> {
    open_flags(path, libc::O_RDONLY)
}
