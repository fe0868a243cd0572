// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 argus contributors
//
// Buffered writer over an owned file descriptor.
//
// `[0, pos)` holds bytes accepted but not yet flushed, `0 <= pos <= cap`.
// A write that would overflow the buffer flushes first; a payload larger
// than the whole buffer goes to the descriptor directly, combined with any
// pending bytes in one vectored write. Partial writes are resumed, and a
// failed flush keeps the unwritten tail buffered so the caller can retry
// once the descriptor is writable again.

use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};

/// Default buffer capacity in bytes.
pub const DEFAULT_WRITER_CAP: usize = 8192;

/// A wrapper around a writable file descriptor that provides buffered
/// writing. The descriptor is owned; dropping the writer performs a
/// best-effort flush and closes it.
pub struct BufWriter {
    fd: OwnedFd,
    buf: Vec<u8>,
    pos: usize,
}

impl BufWriter {
    pub fn with_default_cap(fd: OwnedFd) -> Self {
        Self::with_cap(fd, DEFAULT_WRITER_CAP)
    }

    pub fn with_cap(fd: OwnedFd, capacity: usize) -> Self {
        assert!(capacity > 0, "BufWriter capacity must be positive");
        Self {
            fd,
            buf: vec![0; capacity],
            pos: 0,
        }
    }

    /// Bytes accepted but not yet flushed to the descriptor.
    pub fn used_bytes(&self) -> usize {
        self.pos
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }

    /// Append `data`, flushing to the descriptor as needed.
    pub fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let available = self.capacity() - self.pos;
        if data.len() <= available {
            self.buf[self.pos..self.pos + data.len()].copy_from_slice(data);
            self.pos += data.len();
            return Ok(());
        }
        if data.len() > self.capacity() {
            return self.write_large(data);
        }
        // Fits in the buffer, just not in what is left of it.
        self.flush()?;
        self.buf[..data.len()].copy_from_slice(data);
        self.pos = data.len();
        Ok(())
    }

    /// `write` plus a trailing newline. The newline is appended even when
    /// `data` lands exactly on a capacity boundary (forcing a flush first).
    pub fn write_line(&mut self, data: &[u8]) -> io::Result<()> {
        self.write(data)?;
        self.write_byte(b'\n')
    }

    pub fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        if self.pos == self.capacity() {
            self.flush()?;
        }
        self.buf[self.pos] = byte;
        self.pos += 1;
        Ok(())
    }

    /// Force all pending bytes to the descriptor.
    ///
    /// On failure the unwritten tail is moved to the front of the buffer and
    /// `used_bytes` reflects it, so nothing unflushed is ever dropped.
    pub fn flush(&mut self) -> io::Result<()> {
        let mut start = 0;
        while start < self.pos {
            match write_once(self.fd.as_fd(), &self.buf[start..self.pos]) {
                Ok(0) => {
                    self.buf.copy_within(start..self.pos, 0);
                    self.pos -= start;
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "descriptor accepted zero bytes",
                    ));
                }
                Ok(n) => start += n,
                Err(err) => {
                    self.buf.copy_within(start..self.pos, 0);
                    self.pos -= start;
                    return Err(err);
                }
            }
        }
        self.pos = 0;
        Ok(())
    }

    /// Flush pending bytes and close the descriptor.
    ///
    /// Callers that want to retry a failed flush should call [`flush`]
    /// themselves first; an error here still attempts one final best-effort
    /// flush when the writer is dropped.
    ///
    /// [`flush`]: BufWriter::flush
    pub fn close(mut self) -> io::Result<()> {
        self.flush()
    }

    /// Payload larger than the whole buffer: one vectored write combining
    /// the pending bytes and the payload, then plain writes for whatever the
    /// kernel left behind.
    fn write_large(&mut self, data: &[u8]) -> io::Result<()> {
        if self.pos == 0 {
            return write_full(self.fd.as_fd(), data);
        }
        let n = writev_once(self.fd.as_fd(), &self.buf[..self.pos], data)?;
        if n < self.pos {
            // Only part of the pending bytes went out.
            self.buf.copy_within(n..self.pos, 0);
            self.pos -= n;
            self.flush()?;
            return write_full(self.fd.as_fd(), data);
        }
        let data_done = n - self.pos;
        self.pos = 0;
        write_full(self.fd.as_fd(), &data[data_done..])
    }
}

impl Drop for BufWriter {
    fn drop(&mut self) {
        // Best effort only; an unwritable descriptor loses the tail here.
        let _ = self.flush();
    }
}

fn write_once(fd: BorrowedFd<'_>, buf: &[u8]) -> io::Result<usize> {
    let n = unsafe {
        libc::write(
            fd.as_raw_fd(),
            buf.as_ptr() as *const libc::c_void,
            buf.len(),
        )
    };
    if n == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}

fn write_full(fd: BorrowedFd<'_>, mut buf: &[u8]) -> io::Result<()> {
    while !buf.is_empty() {
        match write_once(fd, buf)? {
            0 => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "descriptor accepted zero bytes",
                ))
            }
            n => buf = &buf[n..],
        }
    }
    Ok(())
}

fn writev_once(fd: BorrowedFd<'_>, first: &[u8], second: &[u8]) -> io::Result<usize> {
    let iov = [
        libc::iovec {
            iov_base: first.as_ptr() as *mut libc::c_void,
            iov_len: first.len(),
        },
        libc::iovec {
            iov_base: second.as_ptr() as *mut libc::c_void,
            iov_len: second.len(),
        },
    ];
    let n = unsafe { libc::writev(fd.as_raw_fd(), iov.as_ptr(), 2) };
    if n == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}
