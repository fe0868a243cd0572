// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 argus contributors

//! Client front end for the task daemon.
//!
//! Flags map one-to-one onto command frames; with no action flags the
//! client reads frame-shaped lines from stdin instead. Listings are drained
//! from the report fifos with a poll timeout, since the server keeps its
//! fifo ends open and never signals end-of-listing with EOF.

use std::io::{self, BufRead, Write};
use std::os::fd::AsRawFd;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use argus::buf_writer::BufWriter;
use argus::conf::{self, Conf, DEFAULT_SERVER_DIR};
use argus::fifo;
use argus::parse_size::parse_size;
use argus::protocol::Command;

/// How long a silent report fifo means the listing is complete.
const LISTING_IDLE_TIMEOUT_MS: libc::c_int = 500;

const HELP_TEXT: &str = "\
commands:
  e <command line>   run a task in the background ('|' pipes stages)
  t <id>             terminate the running task with this id
  m <seconds>        set the active-phase timeout
  i <seconds>        set the inactive-phase timeout
  l                  list running task names
  r                  list finished task names
  h                  show this help";

#[derive(Parser, Debug)]
#[command(name = "argus", about = "Task daemon client", version)]
struct Args {
    /// Run a command line as a background task.
    #[arg(short, long, value_name = "CMDLINE")]
    execute: Option<String>,

    /// Terminate the running task with this id.
    #[arg(short = 't', long, value_name = "ID")]
    end: Option<String>,

    /// Set the active-phase timeout, in seconds.
    #[arg(short = 'm', long, value_name = "SECONDS")]
    active_timeout: Option<String>,

    /// Set the inactive-phase timeout, in seconds.
    #[arg(short = 'i', long, value_name = "SECONDS")]
    inactive_timeout: Option<String>,

    /// List running task names.
    #[arg(short = 'l', long)]
    list_running: bool,

    /// List finished task names.
    #[arg(short = 'r', long)]
    list_finished: bool,

    /// Server fifo directory.
    #[arg(short, long, default_value = DEFAULT_SERVER_DIR)]
    dir: String,
}

impl Args {
    fn has_action(&self) -> bool {
        self.execute.is_some()
            || self.end.is_some()
            || self.active_timeout.is_some()
            || self.inactive_timeout.is_some()
            || self.list_running
            || self.list_finished
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("argus: {err:#}.");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let conf = Conf::with_dir(&args.dir);

    if !args.has_action() {
        return interactive(&conf);
    }

    if let Some(cmdline) = &args.execute {
        send(&conf, conf::EXEC_TASK_TAG, cmdline)?;
    }
    if let Some(id) = &args.end {
        send(&conf, conf::END_TASK_TAG, &validate_number(id)?)?;
    }
    if let Some(seconds) = &args.active_timeout {
        send(&conf, conf::SET_ACTIVE_TIMEOUT_TAG, &validate_number(seconds)?)?;
    }
    if let Some(seconds) = &args.inactive_timeout {
        send(&conf, conf::SET_INACTIVE_TIMEOUT_TAG, &validate_number(seconds)?)?;
    }
    if args.list_running {
        list(&conf, conf::LIST_RUNNING_TASKS_TAG, conf.running_tasks_fifo())?;
    }
    if args.list_finished {
        list(&conf, conf::LIST_FINISHED_TASKS_TAG, conf.finished_tasks_fifo())?;
    }
    Ok(())
}

/// Read frame-shaped lines from stdin and relay them, validating locally so
/// a typo is reported instead of silently dropped by the server.
fn interactive(conf: &Conf) -> anyhow::Result<()> {
    println!("{HELP_TEXT}");
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("failed reading stdin")?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match Command::parse(trimmed) {
            Ok(Command::Help) => println!("{HELP_TEXT}"),
            Ok(Command::ListRunning) => {
                list(conf, conf::LIST_RUNNING_TASKS_TAG, conf.running_tasks_fifo())?
            }
            Ok(Command::ListFinished) => {
                list(conf, conf::LIST_FINISHED_TASKS_TAG, conf.finished_tasks_fifo())?
            }
            Ok(Command::Execute(cmdline)) => send(conf, conf::EXEC_TASK_TAG, cmdline)?,
            Ok(Command::End(id)) => send(conf, conf::END_TASK_TAG, &id.to_string())?,
            Ok(Command::SetActiveTimeout(s)) => {
                send(conf, conf::SET_ACTIVE_TIMEOUT_TAG, &s.to_string())?
            }
            Ok(Command::SetInactiveTimeout(s)) => {
                send(conf, conf::SET_INACTIVE_TIMEOUT_TAG, &s.to_string())?
            }
            Err(err) => eprintln!("argus: {err}."),
        }
    }
    Ok(())
}

fn validate_number(text: &str) -> anyhow::Result<String> {
    let value = parse_size(text.as_bytes()).with_context(|| format!("bad number {text:?}"))?;
    Ok(value.to_string())
}

/// Write one `<tag> <payload>` frame to the commands fifo.
fn send(conf: &Conf, tag: char, payload: &str) -> anyhow::Result<()> {
    let fd = fifo::open_write(&conf.commands_fifo())
        .with_context(|| server_missing_hint(conf))?;
    let mut out = BufWriter::with_default_cap(fd);
    out.write_byte(tag as u8).context("failed writing command")?;
    if !payload.is_empty() {
        out.write_byte(b' ').context("failed writing command")?;
        out.write(payload.as_bytes())
            .context("failed writing command")?;
    }
    out.write_byte(b'\n').context("failed writing command")?;
    out.close().context("failed writing command")?;
    Ok(())
}

/// Request a listing and copy it to stdout until the report fifo stays
/// silent for the idle timeout.
fn list(conf: &Conf, tag: char, report_fifo: PathBuf) -> anyhow::Result<()> {
    // Open the report end before asking, so no bytes are produced with no
    // reader attached.
    let fd = fifo::open_read(&report_fifo).with_context(|| server_missing_hint(conf))?;
    send(conf, tag, "")?;

    let mut stdout = io::stdout().lock();
    let mut chunk = [0u8; 4096];
    loop {
        let mut poll_fd = libc::pollfd {
            fd: fd.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let ready = unsafe { libc::poll(&mut poll_fd, 1, LISTING_IDLE_TIMEOUT_MS) };
        match ready {
            -1 => {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err).context("failed polling the report fifo");
            }
            0 => break,
            _ => {}
        }
        let n = unsafe {
            libc::read(
                fd.as_raw_fd(),
                chunk.as_mut_ptr() as *mut libc::c_void,
                chunk.len(),
            )
        };
        match n {
            -1 => {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err).context("failed reading the report fifo");
            }
            0 => break,
            n => stdout
                .write_all(&chunk[..n as usize])
                .context("failed writing the listing")?,
        }
    }
    stdout.flush().context("failed writing the listing")?;
    Ok(())
}

fn server_missing_hint(conf: &Conf) -> String {
    format!(
        "failed opening a fifo in {} (is argus_server running?)",
        conf.dir().display()
    )
}
