// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 argus contributors
//
// The dispatch loop: reads command frames from the commands fifo, launches
// and signals task pipelines, and writes name listings to the two report
// fifos.
//
// Shutdown is signal driven. The handler only records the signal number;
// the loop observes it at the top of each iteration, which works because
// the blocking command read returns `Interrupted` instead of restarting
// (handlers are installed without SA_RESTART and the buffered reader does
// not retry EINTR).

use std::io;
use std::sync::atomic::{AtomicI32, Ordering};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::buf_reader::BufReader;
use crate::buf_writer::BufWriter;
use crate::conf::Conf;
use crate::fifo;
use crate::pipeline::{self, spawn_pipeline};
use crate::protocol::Command;
use crate::task::{Task, TaskRegistry};

static PENDING_SIGNAL: AtomicI32 = AtomicI32::new(0);

extern "C" fn note_signal(signum: libc::c_int) {
    // Async-signal-safe: a single atomic store.
    PENDING_SIGNAL.store(signum, Ordering::Relaxed);
}

/// Install the shutdown handlers for SIGINT and SIGTERM and ignore SIGPIPE
/// (a report-fifo write with no reader must surface as EPIPE, not kill the
/// server).
///
/// SA_RESTART is deliberately left out so a caught signal interrupts the
/// blocking command read.
pub fn install_signal_handlers() -> io::Result<()> {
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = note_signal as usize;
        action.sa_flags = 0;
        libc::sigemptyset(&mut action.sa_mask);
        for signum in [libc::SIGINT, libc::SIGTERM] {
            if libc::sigaction(signum, &action, std::ptr::null_mut()) == -1 {
                return Err(io::Error::last_os_error());
            }
        }
        if libc::signal(libc::SIGPIPE, libc::SIG_IGN) == libc::SIG_ERR {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Consume a recorded shutdown signal, if any.
pub fn take_pending_signal() -> Option<i32> {
    match PENDING_SIGNAL.swap(0, Ordering::Relaxed) {
        0 => None,
        signum => Some(signum),
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed setting up the server directory and fifos: {0}")]
    Setup(#[source] io::Error),
    #[error("failed reading from the commands fifo: {0}")]
    CommandRead(#[source] io::Error),
    #[error("failed writing a task listing: {0}")]
    ListingWrite(#[source] io::Error),
}

/// One server instance: the three fifo endpoints plus the running and
/// finished task registries.
pub struct Server {
    commands: BufReader,
    running_out: BufWriter,
    finished_out: BufWriter,
    running: TaskRegistry,
    finished: TaskRegistry,
    next_task_id: u64,
    active_timeout: Option<u64>,
    inactive_timeout: Option<u64>,
    line: Vec<u8>,
}

impl Server {
    /// Create the server directory and fifos per `conf` and open all three
    /// endpoints.
    ///
    /// Every fifo is opened read-write: the server then always counts as a
    /// reader and a writer of each, so startup cannot block waiting for a
    /// client, the command read blocks instead of spinning on EOF when no
    /// writer is connected, and listing writes cannot fail just because no
    /// client is draining yet.
    pub fn open(conf: &Conf) -> Result<Self, ServerError> {
        fifo::create_dir(conf.dir()).map_err(ServerError::Setup)?;
        for path in [
            conf.commands_fifo(),
            conf.running_tasks_fifo(),
            conf.finished_tasks_fifo(),
        ] {
            fifo::create_fifo(&path).map_err(ServerError::Setup)?;
        }
        let commands = fifo::open_read_write(&conf.commands_fifo()).map_err(ServerError::Setup)?;
        let running_out =
            fifo::open_read_write(&conf.running_tasks_fifo()).map_err(ServerError::Setup)?;
        let finished_out =
            fifo::open_read_write(&conf.finished_tasks_fifo()).map_err(ServerError::Setup)?;
        info!(dir = %conf.dir().display(), "listening");
        Ok(Self::from_parts(
            BufReader::with_default_cap(commands),
            BufWriter::with_default_cap(running_out),
            BufWriter::with_default_cap(finished_out),
        ))
    }

    /// Assemble a server from already-open endpoints. Lets tests drive the
    /// dispatch loop over plain pipes.
    pub fn from_parts(
        commands: BufReader,
        running_out: BufWriter,
        finished_out: BufWriter,
    ) -> Self {
        Self {
            commands,
            running_out,
            finished_out,
            running: TaskRegistry::new(),
            finished: TaskRegistry::new(),
            next_task_id: 0,
            active_timeout: None,
            inactive_timeout: None,
            line: Vec::new(),
        }
    }

    pub fn running(&self) -> &TaskRegistry {
        &self.running
    }

    pub fn finished(&self) -> &TaskRegistry {
        &self.finished
    }

    pub fn active_timeout(&self) -> Option<u64> {
        self.active_timeout
    }

    pub fn inactive_timeout(&self) -> Option<u64> {
        self.inactive_timeout
    }

    /// Dispatch until a shutdown signal arrives or the command channel
    /// fails. On either, every still-running task group gets SIGTERM.
    pub fn run(&mut self) -> Result<(), ServerError> {
        loop {
            if let Some(signum) = take_pending_signal() {
                info!(signum, "shutting down");
                self.terminate_all(libc::SIGTERM);
                return Ok(());
            }
            self.reap_finished();
            if let Err(err) = self.step() {
                self.terminate_all(libc::SIGTERM);
                return Err(err);
            }
        }
    }

    /// One loop iteration: read at most one frame and dispatch it.
    pub fn step(&mut self) -> Result<(), ServerError> {
        self.line.clear();
        match self.commands.read_line(&mut self.line) {
            // A signal interrupted the blocking read; the caller's loop
            // checks the flag next.
            Err(err) if err.kind() == io::ErrorKind::Interrupted => Ok(()),
            Err(err) => Err(ServerError::CommandRead(err)),
            // No writer right now. The O_RDWR fifo open keeps this from
            // surfacing in normal operation, but a zero-byte read means
            // "keep waiting", never a dead server.
            Ok(None) => Ok(()),
            Ok(Some(_)) => {
                // The frame buffer is reused across iterations; take it so
                // the dispatch below can borrow the server mutably.
                let frame = std::mem::take(&mut self.line);
                let result = self.handle_frame(&frame);
                self.line = frame;
                result
            }
        }
    }

    /// Dispatch one command frame. Malformed frames are logged and dropped;
    /// only listing-channel failures are fatal.
    pub fn handle_frame(&mut self, frame: &[u8]) -> Result<(), ServerError> {
        let text = match std::str::from_utf8(frame) {
            Ok(text) => text,
            Err(_) => {
                warn!("dropping non-utf8 command frame");
                return Ok(());
            }
        };
        let command = match Command::parse(text) {
            Ok(command) => command,
            Err(err) => {
                warn!(%err, frame = text, "dropping malformed command frame");
                return Ok(());
            }
        };
        match command {
            Command::Execute(cmdline) => {
                self.execute(cmdline);
                Ok(())
            }
            Command::End(id) => {
                self.end_task(id);
                Ok(())
            }
            Command::SetActiveTimeout(seconds) => {
                info!(seconds, "active timeout set");
                self.active_timeout = Some(seconds);
                Ok(())
            }
            Command::SetInactiveTimeout(seconds) => {
                info!(seconds, "inactive timeout set");
                self.inactive_timeout = Some(seconds);
                Ok(())
            }
            Command::ListRunning => Self::list(&self.running, &mut self.running_out),
            Command::ListFinished => Self::list(&self.finished, &mut self.finished_out),
            // Help is rendered client side; a stray frame is harmless.
            Command::Help => {
                debug!("ignoring help frame");
                Ok(())
            }
        }
    }

    /// Launch a pipeline and register it as a running task. A launch or
    /// registration failure loses only this task.
    fn execute(&mut self, cmdline: &str) {
        let group = match spawn_pipeline(cmdline) {
            Ok(group) => group,
            Err(err) => {
                warn!(%err, cmdline, "failed launching task");
                return;
            }
        };
        let task = Task {
            id: self.next_task_id,
            name: cmdline.to_owned(),
            pgid: group.id(),
        };
        if let Err(err) = self.running.push(task) {
            // Dropping the still-armed group terminates the pipeline.
            warn!(%err, cmdline, "failed registering task");
            return;
        }
        let pgid = group.detach();
        info!(id = self.next_task_id, pgid, cmdline, "task started");
        self.next_task_id += 1;
    }

    /// SIGTERM the task's process group and move its record to the finished
    /// registry. An unknown id is logged and ignored.
    fn end_task(&mut self, id: u64) {
        let Some((idx, task)) = self.running.find_by_id(id) else {
            warn!(id, "no running task with that id");
            return;
        };
        let pgid = task.pgid;
        if let Err(err) = pipeline::signal_group(pgid, libc::SIGTERM) {
            // Record keeping continues; the group may already be gone.
            warn!(%err, id, pgid, "failed signalling task group");
        }
        // Listings must keep submission order.
        if let Some(task) = self.running.remove_preserve_order(idx) {
            info!(id, pgid, "task ended");
            if let Err(err) = self.finished.push(task) {
                warn!(%err, id, "failed recording finished task");
            }
        }
    }

    /// Collect exited children and move the matching records from running to
    /// finished. Called once per dispatch iteration.
    pub fn reap_finished(&mut self) {
        for pid in pipeline::reap_exited() {
            // Each reaped pid is a stage; only the group leader's exit
            // retires the record.
            let Some((idx, task)) = self
                .running
                .iter()
                .enumerate()
                .find(|(_, t)| t.pgid == pid)
            else {
                continue;
            };
            let id = task.id;
            if let Some(task) = self.running.remove_preserve_order(idx) {
                info!(id, pgid = pid, "task finished");
                if let Err(err) = self.finished.push(task) {
                    warn!(%err, id, "failed recording finished task");
                }
            }
        }
    }

    /// Write one registry's task names, one per line, and flush so the
    /// waiting client sees the listing immediately.
    fn list(registry: &TaskRegistry, out: &mut BufWriter) -> Result<(), ServerError> {
        for task in registry {
            out.write_line(task.name.as_bytes())
                .map_err(ServerError::ListingWrite)?;
        }
        out.flush().map_err(ServerError::ListingWrite)
    }

    /// Signal every running task's process group. Records stay in place;
    /// this runs only on the way out.
    fn terminate_all(&mut self, signum: libc::c_int) {
        for task in &self.running {
            if let Err(err) = pipeline::signal_group(task.pgid, signum) {
                warn!(%err, id = task.id, pgid = task.pgid, "failed signalling task group");
            }
        }
    }
}
