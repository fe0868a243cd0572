// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 argus contributors
//
// Server directory layout and wire-protocol tag characters, shared by the
// server and the client front end.

use std::path::{Path, PathBuf};

/// Command tag characters, one per protocol frame kind.
pub const EXEC_TASK_TAG: char = 'e';
pub const END_TASK_TAG: char = 't';
pub const SET_ACTIVE_TIMEOUT_TAG: char = 'm';
pub const SET_INACTIVE_TIMEOUT_TAG: char = 'i';
pub const LIST_RUNNING_TASKS_TAG: char = 'l';
pub const LIST_FINISHED_TASKS_TAG: char = 'r';
pub const HELP_TAG: char = 'h';

/// Default server directory holding the three fifos.
pub const DEFAULT_SERVER_DIR: &str = "/tmp/argus";

const COMMANDS_FIFO: &str = "commands";
const RUNNING_TASKS_FIFO: &str = "running_tasks";
const FINISHED_TASKS_FIFO: &str = "finished_tasks";

/// Filesystem configuration for one server instance.
///
/// All three fifos live directly under `dir`. Clients must be pointed at the
/// same directory as the server they talk to.
#[derive(Debug, Clone)]
pub struct Conf {
    dir: PathBuf,
}

impl Conf {
    pub fn new() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_SERVER_DIR),
        }
    }

    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the commands fifo (clients write, server reads).
    pub fn commands_fifo(&self) -> PathBuf {
        self.dir.join(COMMANDS_FIFO)
    }

    /// Path of the running-tasks report fifo (server writes, clients read).
    pub fn running_tasks_fifo(&self) -> PathBuf {
        self.dir.join(RUNNING_TASKS_FIFO)
    }

    /// Path of the finished-tasks report fifo (server writes, clients read).
    pub fn finished_tasks_fifo(&self) -> PathBuf {
        self.dir.join(FINISHED_TASKS_FIFO)
    }
}

impl Default for Conf {
    fn default() -> Self {
        Self::new()
    }
}
