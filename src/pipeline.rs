// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 argus contributors
//
// Pipeline launcher: splits a submitted command line into pipe-separated
// stages, word-splits each stage into an argv, and forks the chain into a
// single killable process group.
//
// Group semantics: the group id is always the FIRST stage's pid. Stage 0
// founds the group with setpgid(0, 0); every later stage joins it, from
// both the child and the parent side (whichever runs first wins, the loser
// sees the benign after-exec EACCES), so one kill(-pgid) reaches the whole
// chain. The group deliberately stays in the server's session: a setsid in
// stage 0 would start a new session, and setpgid cannot move the later
// stages across a session boundary.
//
// Only literal '|' splitting and whitespace word-splitting are supported —
// no quoting, redirection, or globbing. A literal '|' inside an argument
// cannot be expressed.

use std::ffi::CString;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::ptr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("empty command line")]
    EmptyCommand,
    #[error("pipeline stage {0} is empty")]
    EmptyStage(usize),
    #[error("command line contains an interior nul byte")]
    Nul,
    #[error("failed creating a pipe: {0}")]
    Pipe(#[source] io::Error),
    #[error("failed creating a new process: {0}")]
    Fork(#[source] io::Error),
    #[error("pipeline stage {stage} could not join the process group: {source}")]
    Group {
        stage: usize,
        #[source]
        source: io::Error,
    },
    #[error("pipeline stage {stage} failed to exec: {source}")]
    Exec {
        stage: usize,
        #[source]
        source: io::Error,
    },
}

/// Split a command line on literal `'|'` into stage strings.
pub fn split_stages(cmdline: &str) -> impl Iterator<Item = &str> {
    cmdline.split('|')
}

/// Split one stage on whitespace runs into words.
pub fn split_words(stage: &str) -> impl Iterator<Item = &str> {
    stage.split_whitespace()
}

/// Send `signum` to every process in the group `pgid`.
pub fn signal_group(pgid: libc::pid_t, signum: libc::c_int) -> io::Result<()> {
    if unsafe { libc::kill(-pgid, signum) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Owned handle to a launched pipeline's process group.
///
/// Scoped acquisition: a handle that is dropped without being
/// [`detach`](ProcessGroup::detach)ed sends SIGTERM to the group, so no code
/// path can leak an untracked pipeline.
#[derive(Debug)]
#[must_use = "an undetached ProcessGroup terminates its pipeline on drop"]
pub struct ProcessGroup {
    pgid: libc::pid_t,
    armed: bool,
}

impl ProcessGroup {
    fn new(pgid: libc::pid_t) -> Self {
        Self { pgid, armed: true }
    }

    pub fn id(&self) -> libc::pid_t {
        self.pgid
    }

    /// Hand over responsibility for the group (it has been registered
    /// somewhere that will signal it later).
    pub fn detach(mut self) -> libc::pid_t {
        self.armed = false;
        self.pgid
    }

    pub fn terminate(&self) -> io::Result<()> {
        signal_group(self.pgid, libc::SIGTERM)
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        if self.armed {
            let _ = signal_group(self.pgid, libc::SIGTERM);
        }
    }
}

/// Launch `cmdline` as a chain of connected processes in one new process
/// group, returning the group handle.
///
/// The first stage inherits the server's stdin; each later stage reads its
/// predecessor's stdout through a pipe. Fork and exec failures abort only
/// this launch: already-started stages of the partial pipeline get SIGTERM
/// and the error is returned to the caller.
pub fn spawn_pipeline(cmdline: &str) -> Result<ProcessGroup, SpawnError> {
    let stages = tokenize(cmdline)?;

    // argv pointer tables are prepared before any fork: between fork and
    // exec the child may only make async-signal-safe calls, which rules out
    // allocation.
    let argvs: Vec<Vec<*const libc::c_char>> = stages
        .iter()
        .map(|argv| {
            let mut ptrs: Vec<*const libc::c_char> = argv.iter().map(|a| a.as_ptr()).collect();
            ptrs.push(ptr::null());
            ptrs
        })
        .collect();

    // Close-on-exec back-channel: a stage whose setpgid or exec fails
    // reports the failed operation, its index, and errno here; a clean EOF
    // means every stage exec'd.
    let (err_read, err_write) = pipe_pair(true).map_err(SpawnError::Pipe)?;

    let mut pgid: libc::pid_t = 0;
    let mut prev_read: Option<OwnedFd> = None;

    for (i, argv) in argvs.iter().enumerate() {
        let next = if i + 1 < argvs.len() {
            match pipe_pair(false) {
                Ok(pair) => Some(pair),
                Err(err) => {
                    if pgid != 0 {
                        let _ = signal_group(pgid, libc::SIGTERM);
                    }
                    return Err(SpawnError::Pipe(err));
                }
            }
        } else {
            None
        };

        let stdin_fd = prev_read.as_ref().map(|fd| fd.as_raw_fd());
        let next_fds = next.as_ref().map(|(r, w)| (r.as_raw_fd(), w.as_raw_fd()));

        let pid = unsafe { libc::fork() };
        match pid {
            -1 => {
                let err = io::Error::last_os_error();
                if pgid != 0 {
                    let _ = signal_group(pgid, libc::SIGTERM);
                }
                return Err(SpawnError::Fork(err));
            }
            0 => exec_stage(
                i,
                if i == 0 { 0 } else { pgid },
                stdin_fd,
                next_fds,
                err_read.as_raw_fd(),
                err_write.as_raw_fd(),
                argv,
            ),
            _ => {
                // Also set the group from the parent side, closing the race
                // between the child's setpgid and an early kill(-pgid). For
                // stage 0 this guarantees the group exists before any later
                // stage is forked.
                let target = if i == 0 { pid } else { pgid };
                if unsafe { libc::setpgid(pid, target) } == -1 {
                    let err = io::Error::last_os_error();
                    // EACCES: the child exec'd first, so its own setpgid
                    // already ran. ESRCH: it has already exited, ditto.
                    if !matches!(err.raw_os_error(), Some(libc::EACCES) | Some(libc::ESRCH)) {
                        unsafe { libc::kill(pid, libc::SIGTERM) };
                        if pgid != 0 {
                            let _ = signal_group(pgid, libc::SIGTERM);
                        }
                        return Err(SpawnError::Group {
                            stage: i,
                            source: err,
                        });
                    }
                }
                if i == 0 {
                    pgid = pid;
                }
                // Drops the previous read end and this pipe's write end;
                // the new read end becomes the next stage's stdin.
                prev_read = next.map(|(r, _w)| r);
            }
        }
    }

    drop(prev_read);
    drop(err_write);

    match read_exec_report(err_read.as_fd()) {
        Ok(None) => Ok(ProcessGroup::new(pgid)),
        Ok(Some((op, stage, errno))) => {
            let _ = signal_group(pgid, libc::SIGTERM);
            let source = io::Error::from_raw_os_error(errno);
            Err(if op == OP_EXEC {
                SpawnError::Exec { stage, source }
            } else {
                SpawnError::Group { stage, source }
            })
        }
        Err(err) => {
            let _ = signal_group(pgid, libc::SIGTERM);
            Err(SpawnError::Pipe(err))
        }
    }
}

/// Reap every child that has already exited, without blocking. Returns the
/// reaped pids; the caller maps them back to tasks.
pub fn reap_exited() -> Vec<libc::pid_t> {
    let mut exited = Vec::new();
    loop {
        let mut status: libc::c_int = 0;
        let pid = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };
        if pid <= 0 {
            // 0: children exist but none have exited; -1: no children left.
            break;
        }
        exited.push(pid);
    }
    exited
}

fn tokenize(cmdline: &str) -> Result<Vec<Vec<CString>>, SpawnError> {
    if cmdline.trim().is_empty() {
        return Err(SpawnError::EmptyCommand);
    }
    let mut stages = Vec::new();
    for (i, stage) in split_stages(cmdline).enumerate() {
        let mut argv = Vec::new();
        for word in split_words(stage) {
            argv.push(CString::new(word).map_err(|_| SpawnError::Nul)?);
        }
        if argv.is_empty() {
            return Err(SpawnError::EmptyStage(i));
        }
        stages.push(argv);
    }
    Ok(stages)
}

const REPORT_SIZE: usize = 12;
const OP_GROUP: u32 = 0;
const OP_EXEC: u32 = 1;

/// Post-fork, pre-exec path. Only async-signal-safe calls.
///
/// `pgid` is 0 for stage 0: the first child founds the group.
fn exec_stage(
    stage: usize,
    pgid: libc::pid_t,
    stdin_fd: Option<RawFd>,
    next_fds: Option<(RawFd, RawFd)>,
    err_read: RawFd,
    err_write: RawFd,
    argv: &[*const libc::c_char],
) -> ! {
    unsafe {
        // A stage that cannot join the group would be unreachable by
        // kill(-pgid); abort it rather than run it untracked.
        if libc::setpgid(0, pgid) == -1 {
            report_failure(err_write, OP_GROUP, stage);
        }
        if let Some(fd) = stdin_fd {
            libc::dup2(fd, libc::STDIN_FILENO);
            libc::close(fd);
        }
        if let Some((r, w)) = next_fds {
            libc::dup2(w, libc::STDOUT_FILENO);
            libc::close(w);
            libc::close(r);
        }
        libc::close(err_read);
        libc::execvp(argv[0], argv.as_ptr());
        // err_write is close-on-exec so it is still open here.
        report_failure(err_write, OP_EXEC, stage);
    }
}

/// Report the failed operation, stage index, and errno to the parent, then
/// bail out of the child.
unsafe fn report_failure(err_write: RawFd, op: u32, stage: usize) -> ! {
    let errno = io::Error::last_os_error().raw_os_error().unwrap_or(0);
    let mut report = [0u8; REPORT_SIZE];
    report[..4].copy_from_slice(&op.to_ne_bytes());
    report[4..8].copy_from_slice(&(stage as u32).to_ne_bytes());
    report[8..].copy_from_slice(&errno.to_ne_bytes());
    libc::write(
        err_write,
        report.as_ptr() as *const libc::c_void,
        report.len(),
    );
    libc::_exit(127);
}

/// Block until every stage has either exec'd (EOF) or reported a failure.
fn read_exec_report(fd: BorrowedFd<'_>) -> io::Result<Option<(u32, usize, i32)>> {
    let mut report = [0u8; REPORT_SIZE];
    let mut got = 0;
    while got < REPORT_SIZE {
        let n = unsafe {
            libc::read(
                fd.as_raw_fd(),
                report[got..].as_mut_ptr() as *mut libc::c_void,
                REPORT_SIZE - got,
            )
        };
        match n {
            -1 => {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            0 => break,
            n => got += n as usize,
        }
    }
    match got {
        0 => Ok(None),
        REPORT_SIZE => {
            let op = u32::from_ne_bytes(report[..4].try_into().unwrap_or([0; 4]));
            let stage = u32::from_ne_bytes(report[4..8].try_into().unwrap_or([0; 4])) as usize;
            let errno = i32::from_ne_bytes(report[8..].try_into().unwrap_or([0; 4]));
            Ok(Some((op, stage, errno)))
        }
        _ => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "truncated exec failure report",
        )),
    }
}

fn pipe_pair(cloexec: bool) -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0 as libc::c_int; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } == -1 {
        return Err(io::Error::last_os_error());
    }
    let read = unsafe { OwnedFd::from_raw_fd(fds[0]) };
    let write = unsafe { OwnedFd::from_raw_fd(fds[1]) };
    if cloexec {
        set_cloexec(read.as_raw_fd())?;
        set_cloexec(write.as_raw_fd())?;
    }
    Ok((read, write))
}

fn set_cloexec(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags == -1 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
