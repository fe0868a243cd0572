// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 argus contributors

//! Background task daemon over POSIX fifos.
//!
//! A server process owns a directory of three named pipes: clients submit
//! newline-framed commands on one, and read back running- and finished-task
//! listings on the other two. Submitted command lines are launched as
//! shell-less pipelines, each in its own killable process group.
//!
//! The [`server`] module holds the dispatch loop; [`pipeline`] launches and
//! signals task process groups; [`buf_reader`] and [`buf_writer`] are the
//! buffered fifo endpoints; [`protocol`] and [`parse_size`] decode frames.

pub mod buf_reader;
pub mod buf_writer;
pub mod conf;
pub mod fifo;
pub mod parse_size;
pub mod pipeline;
pub mod protocol;
pub mod server;
pub mod task;

pub use buf_reader::BufReader;
pub use buf_writer::BufWriter;
pub use conf::Conf;
pub use parse_size::{parse_size, ParseSizeError};
pub use pipeline::{spawn_pipeline, ProcessGroup, SpawnError};
pub use protocol::{Command, ProtocolError};
pub use server::{Server, ServerError};
pub use task::{Task, TaskRegistry};
