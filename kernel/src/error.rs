//! Ошибки ядра / Kernel errors

use core::fmt;

use crate::ipc::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Задача с таким id не существует / No task with this id
    NoSuchTask(TaskId),
    /// Уровень вне диапазона `0..=MAX_LEVEL` / Level outside `0..=MAX_LEVEL`
    InvalidLevel(usize),
    /// Не хватило памяти под стек или структуры планировщика.
    /// Out of memory for a task stack or scheduler bookkeeping.
    AllocationFailure { bytes: usize },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NoSuchTask(id) => write!(f, "no such task: {}", id),
            Error::InvalidLevel(level) => write!(f, "invalid priority level {}", level),
            Error::AllocationFailure { bytes } => {
                write!(f, "allocation of {} bytes failed", bytes)
            }
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
