// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 argus contributors
//
// Buffered reader over an owned file descriptor.
//
// The internal buffer holds bytes already fetched from the descriptor but
// not yet delivered: `[begin, end)` with `0 <= begin <= end <= cap`. A read
// request drains that window first and only then touches the descriptor,
// reading straight into the caller's slice when the remainder is at least a
// whole buffer, or refilling (vectored with the caller's tail when both are
// wanted) otherwise.
//
// `Interrupted` is deliberately NOT retried here: the server's command loop
// relies on a signal breaking the blocking read so the shutdown flag can be
// observed. Buffer state stays consistent across any error, so the caller
// may retry or abort.

use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};

/// Default buffer capacity in bytes.
pub const DEFAULT_READER_CAP: usize = 8192;

/// A wrapper around a readable file descriptor that provides buffered
/// reading. The descriptor is owned and closed on drop.
pub struct BufReader {
    fd: OwnedFd,
    buf: Vec<u8>,
    begin: usize,
    end: usize,
}

impl BufReader {
    pub fn with_default_cap(fd: OwnedFd) -> Self {
        Self::with_cap(fd, DEFAULT_READER_CAP)
    }

    pub fn with_cap(fd: OwnedFd, capacity: usize) -> Self {
        assert!(capacity > 0, "BufReader capacity must be positive");
        Self {
            fd,
            buf: vec![0; capacity],
            begin: 0,
            end: 0,
        }
    }

    /// Bytes fetched from the descriptor but not yet delivered.
    pub fn available_bytes(&self) -> usize {
        self.end - self.begin
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }

    /// Give up the descriptor, discarding any buffered bytes.
    pub fn into_fd(self) -> OwnedFd {
        self.fd
    }

    /// One descriptor read into the internal buffer. Returns the byte count
    /// (zero means end of stream).
    fn fill(&mut self) -> io::Result<usize> {
        self.begin = 0;
        self.end = 0;
        let n = read_once(self.fd.as_fd(), &mut self.buf)?;
        self.end = n;
        Ok(n)
    }

    /// Read up to `out.len()` bytes, returning the number actually read.
    /// A short count means the stream ended.
    pub fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let drained = self.available_bytes().min(out.len());
        out[..drained].copy_from_slice(&self.buf[self.begin..self.begin + drained]);
        self.begin += drained;

        let mut filled = drained;
        while filled < out.len() {
            let remainder = out.len() - filled;
            if remainder >= self.buf.len() {
                // No point buffering a read at least this large.
                let n = read_once(self.fd.as_fd(), &mut out[filled..])?;
                if n == 0 {
                    break;
                }
                filled += n;
            } else {
                // Fill the caller's tail and the internal buffer in one
                // vectored syscall; whatever lands past the tail is kept
                // for later requests.
                let (_, tail) = out.split_at_mut(filled);
                let n = readv_once(self.fd.as_fd(), tail, &mut self.buf)?;
                if n == 0 {
                    break;
                }
                let direct = remainder.min(n);
                filled += direct;
                self.begin = 0;
                self.end = n - direct;
            }
        }
        Ok(filled)
    }

    /// Read one line, appending its bytes (newline excluded) to `line`.
    ///
    /// Returns `Some(count)` with the number of bytes appended, or `None`
    /// when the stream ended before any byte of a new line arrived. A stream
    /// ending mid-line still yields `Some` with the partial line.
    pub fn read_line(&mut self, line: &mut Vec<u8>) -> io::Result<Option<usize>> {
        let start_len = line.len();
        loop {
            if self.begin == self.end && self.fill()? == 0 {
                let count = line.len() - start_len;
                return Ok(if count == 0 { None } else { Some(count) });
            }
            let window = &self.buf[self.begin..self.end];
            match window.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    line.extend_from_slice(&window[..pos]);
                    self.begin += pos + 1;
                    return Ok(Some(line.len() - start_len));
                }
                None => {
                    line.extend_from_slice(window);
                    self.begin = self.end;
                }
            }
        }
    }

    /// Read a single byte, amortized O(1). `None` means end of stream.
    pub fn read_byte(&mut self) -> io::Result<Option<u8>> {
        if self.begin == self.end && self.fill()? == 0 {
            return Ok(None);
        }
        let byte = self.buf[self.begin];
        self.begin += 1;
        Ok(Some(byte))
    }
}

fn read_once(fd: BorrowedFd<'_>, buf: &mut [u8]) -> io::Result<usize> {
    let n = unsafe {
        libc::read(
            fd.as_raw_fd(),
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len(),
        )
    };
    if n == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}

fn readv_once(fd: BorrowedFd<'_>, first: &mut [u8], second: &mut [u8]) -> io::Result<usize> {
    let iov = [
        libc::iovec {
            iov_base: first.as_mut_ptr() as *mut libc::c_void,
            iov_len: first.len(),
        },
        libc::iovec {
            iov_base: second.as_mut_ptr() as *mut libc::c_void,
            iov_len: second.len(),
        },
    ];
    let n = unsafe { libc::readv(fd.as_raw_fd(), iov.as_ptr(), 2) };
    if n == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}
