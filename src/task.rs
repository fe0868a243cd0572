// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 argus contributors
//
// Task records and the registry that owns them.
//
// A registry is an ordered, contiguous, growable sequence. Lookup by id is
// a linear scan (task counts stay small); removal comes in two deliberately
// distinct flavours because callers' correctness depends on knowing which
// reordering semantics they get: `remove_swap` is O(1) and reorders,
// `remove_preserve_order` is O(n) and keeps enumeration order intact.

use thiserror::Error;

/// One background task. Immutable after creation; owned by exactly one
/// registry at a time and moved between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Unique, monotonically assigned, never reused within a server lifetime.
    pub id: u64,
    /// The literal command line as submitted by the client.
    pub name: String,
    /// Process group id of the pipeline (the first stage's pid).
    pub pgid: libc::pid_t,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    #[error("failed allocating space for the task registry")]
    Alloc,
    #[error("index {0} is out of bounds")]
    OutOfBounds(usize),
}

const FIRST_ALLOC_CAP: usize = 2;
const ALLOC_ATTEMPT_COUNT: u32 = 5;

/// Ordered, growable collection of [`Task`] records.
///
/// Growth is on demand by ~50% (minimum initial capacity 2), with escalating
/// smaller-increment retries on allocation failure before giving up, so a
/// failed `push` is surfaced to the caller instead of aborting the process.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: Vec<Task>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    pub fn with_cap(capacity: usize) -> Result<Self, RegistryError> {
        let mut tasks = Vec::new();
        tasks
            .try_reserve_exact(capacity)
            .map_err(|_| RegistryError::Alloc)?;
        Ok(Self { tasks })
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.tasks.capacity()
    }

    pub fn get(&self, idx: usize) -> Option<&Task> {
        self.tasks.get(idx)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Task> {
        self.tasks.iter()
    }

    /// Append a task to the end.
    pub fn push(&mut self, task: Task) -> Result<(), RegistryError> {
        self.reserve_for_one()?;
        self.tasks.push(task);
        Ok(())
    }

    /// Insert at `idx`, shifting the tail right. `idx == len` appends.
    pub fn insert_at(&mut self, idx: usize, task: Task) -> Result<(), RegistryError> {
        if idx > self.tasks.len() {
            return Err(RegistryError::OutOfBounds(idx));
        }
        self.reserve_for_one()?;
        self.tasks.insert(idx, task);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Task> {
        self.tasks.pop()
    }

    /// O(1) removal: the last element takes the removed slot, reordering the
    /// sequence.
    pub fn remove_swap(&mut self, idx: usize) -> Option<Task> {
        if idx >= self.tasks.len() {
            return None;
        }
        Some(self.tasks.swap_remove(idx))
    }

    /// O(n) removal that shifts the tail left, preserving enumeration order.
    pub fn remove_preserve_order(&mut self, idx: usize) -> Option<Task> {
        if idx >= self.tasks.len() {
            return None;
        }
        Some(self.tasks.remove(idx))
    }

    /// Linear scan for a task id. Returns the record and its current index;
    /// the index is invalidated by any subsequent mutation.
    pub fn find_by_id(&self, id: u64) -> Option<(usize, &Task)> {
        self.tasks.iter().enumerate().find(|(_, t)| t.id == id)
    }

    /// Best-effort capacity reduction to the current length.
    pub fn shrink_to_fit(&mut self) {
        self.shrink_to(0);
    }

    /// Best-effort capacity reduction to `max(len, min_capacity)`. A failed
    /// allocation leaves the registry unchanged.
    pub fn shrink_to(&mut self, min_capacity: usize) {
        let target = self.tasks.len().max(min_capacity);
        if target >= self.tasks.capacity() {
            return;
        }
        let mut shrunk: Vec<Task> = Vec::new();
        if shrunk.try_reserve_exact(target).is_err() {
            return;
        }
        shrunk.append(&mut self.tasks);
        self.tasks = shrunk;
    }

    /// Ensure room for one more record: grow by half the current capacity,
    /// halving the increment on each failed attempt.
    fn reserve_for_one(&mut self) -> Result<(), RegistryError> {
        if self.tasks.len() < self.tasks.capacity() {
            return Ok(());
        }
        let cap = self.tasks.capacity();
        let mut additional = if cap == 0 { FIRST_ALLOC_CAP } else { cap / 2 };
        for _ in 0..ALLOC_ATTEMPT_COUNT {
            if additional == 0 {
                break;
            }
            if self.tasks.try_reserve_exact(additional).is_ok() {
                return Ok(());
            }
            additional /= 2;
        }
        // Last resort: room for exactly the one record being added.
        self.tasks
            .try_reserve_exact(1)
            .map_err(|_| RegistryError::Alloc)
    }
}

impl<'a> IntoIterator for &'a TaskRegistry {
    type Item = &'a Task;
    type IntoIter = std::slice::Iter<'a, Task>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.iter()
    }
}
