//! IPC — сообщения между задачами / inter-task messages
//!
//! Основные примитивы / Core primitives:
//!   TaskId  — адрес получателя / receiver address
//!   Message — типизированное сообщение / typed message (copied by value)
//!   Inbox   — FIFO входящих сообщений задачи / a task's inbound FIFO
//!
//! Отправка пробуждает спящего получателя — это делает планировщик
//! (`sched::send_message`), поэтому здесь только данные и очередь.
//! Sending wakes a sleeping receiver; that part lives in the scheduler
//! (`sched::send_message`), this module only holds the data and the queue.

mod message;

pub use message::{Device, Inbox, LayerOperation, Message};

use core::fmt;

/// Идентификатор задачи / Task identifier
///
/// Выдаётся монотонно начиная с 1 и никогда не переиспользуется.
/// Assigned monotonically from 1 and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u64);

impl TaskId {
    pub const fn as_u64(self) -> u64 { self.0 }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
