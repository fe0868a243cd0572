// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 argus contributors
//
// Command-frame parsing. A frame is one newline-terminated line of the form
// `<tag>` or `<tag> <payload>`: a single tag character, one space, and the
// payload for tags that take one.

use thiserror::Error;

use crate::conf;
use crate::parse_size::{parse_size, ParseSizeError};

/// A decoded command frame. Borrows the payload from the input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// Launch the given command line as a background task.
    Execute(&'a str),
    /// Terminate the running task with this id.
    End(u64),
    /// Set the active-phase timeout, in seconds.
    SetActiveTimeout(u64),
    /// Set the inactive-phase timeout, in seconds.
    SetInactiveTimeout(u64),
    /// Report the names of the running tasks.
    ListRunning,
    /// Report the names of the finished tasks.
    ListFinished,
    /// Report usage help.
    Help,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("empty command frame")]
    Empty,
    #[error("unknown command tag '{0}'")]
    UnknownTag(char),
    #[error("command '{0}' requires a payload")]
    MissingPayload(char),
    #[error("bad numeric payload: {0}")]
    BadNumber(#[from] ParseSizeError),
}

impl<'a> Command<'a> {
    /// Parse one frame (without its trailing newline).
    pub fn parse(line: &'a str) -> Result<Self, ProtocolError> {
        let mut chars = line.chars();
        let tag = chars.next().ok_or(ProtocolError::Empty)?;
        let rest = chars.as_str();
        let payload = rest.strip_prefix(' ').unwrap_or(rest);

        match tag {
            conf::EXEC_TASK_TAG => {
                if payload.trim().is_empty() {
                    return Err(ProtocolError::MissingPayload(tag));
                }
                // Kept verbatim: the payload becomes the task's name
                // exactly as submitted.
                Ok(Command::Execute(payload))
            }
            conf::END_TASK_TAG => Ok(Command::End(parse_number(tag, payload)?)),
            conf::SET_ACTIVE_TIMEOUT_TAG => {
                Ok(Command::SetActiveTimeout(parse_number(tag, payload)?))
            }
            conf::SET_INACTIVE_TIMEOUT_TAG => {
                Ok(Command::SetInactiveTimeout(parse_number(tag, payload)?))
            }
            conf::LIST_RUNNING_TASKS_TAG => Ok(Command::ListRunning),
            conf::LIST_FINISHED_TASKS_TAG => Ok(Command::ListFinished),
            conf::HELP_TAG => Ok(Command::Help),
            other => Err(ProtocolError::UnknownTag(other)),
        }
    }
}

fn parse_number(tag: char, payload: &str) -> Result<u64, ProtocolError> {
    if payload.trim().is_empty() {
        return Err(ProtocolError::MissingPayload(tag));
    }
    Ok(parse_size(payload.as_bytes())?)
}
