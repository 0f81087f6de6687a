use alloc::collections::VecDeque;

use super::TaskId;

/// Источник аппаратного уведомления / Hardware notification source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    /// Контроллер USB (xHCI) / USB host controller
    Xhci,
    /// PS/2 клавиатура: скан-код читает получатель.
    /// PS/2 keyboard: the receiver reads the scancode.
    Keyboard,
}

/// Операция над слоем композитора / Compositor layer operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerOperation {
    Move,
    MoveRelative,
    Draw,
    DrawArea,
}

/// Сообщение задаче / Message to a task
///
/// Ядро не интерпретирует полезную нагрузку — только маршрутизирует по id.
/// The core never interprets payloads; it only routes by task id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// Прерывание устройства / Device interrupt notification
    DeviceInterrupt(Device),
    /// Сработал таймер / Timer fired
    TimerTimeout { timeout: u64, value: i32 },
    /// Событие клавиатуры / Key event
    KeyPush { modifier: u8, keycode: u8, ascii: u8, press: bool },
    /// Запрос к композитору / Layer operation request
    Layer {
        op: LayerOperation,
        layer_id: u32,
        x: i32,
        y: i32,
        w: i32,
        h: i32,
        src_task: TaskId,
    },
    /// Подтверждение операции над слоем / Layer operation ack
    LayerFinish { layer_id: u32 },
}

/// Очередь входящих сообщений задачи (FIFO).
/// A task's inbound message queue (FIFO).
#[derive(Debug, Default)]
pub struct Inbox {
    msgs: VecDeque<Message>,
}

impl Inbox {
    pub const fn new() -> Self {
        Self { msgs: VecDeque::new() }
    }

    pub fn push(&mut self, msg: Message) {
        self.msgs.push_back(msg);
    }

    /// Самое старое сообщение или `None` — никогда не блокирует.
    /// Oldest message or `None`; never blocks.
    pub fn pop(&mut self) -> Option<Message> {
        self.msgs.pop_front()
    }

    pub fn len(&self) -> usize {
        self.msgs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.msgs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbox_preserves_send_order() {
        let mut inbox = Inbox::new();
        for value in 0..5 {
            inbox.push(Message::TimerTimeout { timeout: 10, value });
        }
        for value in 0..5 {
            assert_eq!(inbox.pop(), Some(Message::TimerTimeout { timeout: 10, value }));
        }
        assert_eq!(inbox.pop(), None);
        assert!(inbox.is_empty());
    }

    #[test]
    fn messages_are_copied_by_value() {
        let mut inbox = Inbox::new();
        let mut msg = Message::LayerFinish { layer_id: 3 };
        inbox.push(msg);
        msg = Message::LayerFinish { layer_id: 4 };
        assert_eq!(inbox.pop(), Some(Message::LayerFinish { layer_id: 3 }));
        assert_ne!(msg, Message::LayerFinish { layer_id: 3 });
    }
}
