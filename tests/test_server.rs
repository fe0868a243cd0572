// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 argus contributors
//
// The server is driven through `handle_frame` over plain pipes instead of
// fifos. Everything that launches children lives in ONE sequential test:
// `reap_finished` waits on any child of the process, so two tests spawning
// concurrently would steal each other's exit notifications.

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::time::{Duration, Instant};

use argus::buf_reader::BufReader;
use argus::buf_writer::BufWriter;
use argus::server::{install_signal_handlers, take_pending_signal, Server};

fn pipe_pair() -> (OwnedFd, OwnedFd) {
    let mut fds = [0 as libc::c_int; 2];
    assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
    unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) }
}

/// A server over pipes, returning the read ends of the two report channels.
fn pipe_server() -> (Server, OwnedFd, OwnedFd) {
    let (commands_read, _commands_write) = pipe_pair();
    let (running_read, running_write) = pipe_pair();
    let (finished_read, finished_write) = pipe_pair();
    let server = Server::from_parts(
        BufReader::with_default_cap(commands_read),
        BufWriter::with_default_cap(running_write),
        BufWriter::with_default_cap(finished_write),
    );
    (server, running_read, finished_read)
}

fn read_chunk(fd: &OwnedFd) -> Vec<u8> {
    let mut buf = [0u8; 4096];
    let n = unsafe {
        libc::read(
            fd.as_raw_fd(),
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len(),
        )
    };
    assert!(n >= 0);
    buf[..n as usize].to_vec()
}

fn set_nonblocking(fd: &OwnedFd) {
    let flags = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFL) };
    assert!(flags != -1);
    assert!(unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFL, flags | libc::O_NONBLOCK) } != -1);
}

#[test]
fn task_lifecycle() {
    let (mut server, running_read, finished_read) = pipe_server();

    // Launch and list.
    server.handle_frame(b"e sleep 100").unwrap();
    assert_eq!(server.running().len(), 1);
    let task = server.running().get(0).unwrap();
    assert_eq!(task.id, 0);
    assert_eq!(task.name, "sleep 100");
    let pgid = task.pgid;
    assert!(pgid > 0);

    server.handle_frame(b"l").unwrap();
    assert_eq!(read_chunk(&running_read), b"sleep 100\n");

    // End: the record moves to the finished registry and the group dies.
    server.handle_frame(b"t 0").unwrap();
    assert!(server.running().is_empty());
    assert_eq!(server.finished().len(), 1);
    assert_eq!(server.finished().get(0).unwrap().id, 0);

    server.handle_frame(b"r").unwrap();
    assert_eq!(read_chunk(&finished_read), b"sleep 100\n");

    // Collect the zombie; the record is already retired, so nothing moves.
    let deadline = Instant::now() + Duration::from_secs(5);
    while unsafe { libc::kill(-pgid, 0) } == 0 {
        server.reap_finished();
        assert!(Instant::now() < deadline, "ended task never exited");
        std::thread::sleep(Duration::from_millis(5));
    }
    server.reap_finished();
    assert_eq!(server.finished().len(), 1);

    // An empty listing writes nothing at all.
    set_nonblocking(&running_read);
    server.handle_frame(b"l").unwrap();
    let mut buf = [0u8; 16];
    let n = unsafe {
        libc::read(
            running_read.as_raw_fd(),
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len(),
        )
    };
    let err = std::io::Error::last_os_error();
    assert_eq!(n, -1);
    assert_eq!(err.raw_os_error(), Some(libc::EWOULDBLOCK));

    // A task that exits on its own is reaped into the finished registry.
    server.handle_frame(b"e sleep 0").unwrap();
    assert_eq!(server.running().len(), 1);
    assert_eq!(server.running().get(0).unwrap().id, 1);
    let deadline = Instant::now() + Duration::from_secs(5);
    while server.finished().len() < 2 {
        server.reap_finished();
        assert!(Instant::now() < deadline, "task was never reaped");
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(server.running().is_empty());
    assert_eq!(server.finished().get(1).unwrap().name, "sleep 0");

    // Ending an unknown id is a no-op.
    server.handle_frame(b"t 99").unwrap();
    assert_eq!(server.finished().len(), 2);
}

#[test]
fn command_eof_keeps_the_server_waiting() {
    let (commands_read, commands_write) = pipe_pair();
    let (_running_read, running_write) = pipe_pair();
    let (_finished_read, finished_write) = pipe_pair();
    let mut server = Server::from_parts(
        BufReader::with_default_cap(commands_read),
        BufWriter::with_default_cap(running_write),
        BufWriter::with_default_cap(finished_write),
    );

    let frame = b"m 30\n";
    let n = unsafe {
        libc::write(
            commands_write.as_raw_fd(),
            frame.as_ptr() as *const libc::c_void,
            frame.len(),
        )
    };
    assert_eq!(n, frame.len() as isize);
    drop(commands_write);

    server.step().unwrap();
    assert_eq!(server.active_timeout(), Some(30));

    // The writer is gone; zero-byte reads mean "no client right now",
    // never a dead server.
    server.step().unwrap();
    server.step().unwrap();
    assert_eq!(server.active_timeout(), Some(30));
}

#[test]
fn malformed_frames_are_dropped_not_fatal() {
    let (mut server, _running_read, _finished_read) = pipe_server();
    for frame in [
        &b""[..],
        b"x 1",
        b"e",
        b"e    ",
        b"t",
        b"t -1",
        b"t 4x",
        b"m notanumber",
        b"\xff\xfe",
    ] {
        server.handle_frame(frame).unwrap();
    }
    assert!(server.running().is_empty());
    assert!(server.finished().is_empty());
    assert_eq!(server.active_timeout(), None);
}

#[test]
fn timeouts_are_recorded() {
    let (mut server, _running_read, _finished_read) = pipe_server();
    assert_eq!(server.active_timeout(), None);
    assert_eq!(server.inactive_timeout(), None);

    server.handle_frame(b"m 30").unwrap();
    server.handle_frame(b"i  45 ").unwrap();
    assert_eq!(server.active_timeout(), Some(30));
    assert_eq!(server.inactive_timeout(), Some(45));

    server.handle_frame(b"m 0").unwrap();
    assert_eq!(server.active_timeout(), Some(0));
}

#[test]
fn help_frames_are_ignored() {
    let (mut server, _running_read, _finished_read) = pipe_server();
    server.handle_frame(b"h").unwrap();
    assert!(server.running().is_empty());
}

#[test]
fn signal_flag_is_consumed_once() {
    install_signal_handlers().unwrap();
    assert_eq!(take_pending_signal(), None);
    unsafe { libc::raise(libc::SIGTERM) };
    assert_eq!(take_pending_signal(), Some(libc::SIGTERM));
    assert_eq!(take_pending_signal(), None);
}
