//! Диспетчеризация прерываний / Interrupt dispatch
//!
//! Архитектурно-нейтральная часть обработчиков IRQ. Заглушки в
//! `arch::x86_64::idt` вызывают `timer_interrupt` / `device_interrupt` и
//! передают подтверждение контроллеру (EOI) замыканием `ack`.
//!
//! The architecture-neutral half of the IRQ handlers. The stubs in
//! `arch::x86_64::idt` call `timer_interrupt` / `device_interrupt` and hand
//! the controller acknowledgement (EOI) in as the `ack` closure.
//!
//! Порядок всегда: работа → EOI → переключение задачи.
//! The order is always: work → EOI → task switch.

use log::{trace, warn};

use crate::ipc::{Device, Message, TaskId};
use crate::sched::{self, Handoff, TaskManager};
use crate::sync::without_interrupts;
use crate::timer::{self, TimerManager};

/// Векторы аппаратных прерываний / Hardware interrupt vectors
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptVector {
    /// IRQ0 (PIT) после ремаппинга PIC / IRQ0 (PIT) after the PIC remap
    Timer = 0x20,
    /// IRQ1 (PS/2)
    Keyboard = 0x21,
    /// IRQ7: ложные прерывания PIC / PIC spurious interrupts
    Spurious = 0x27,
}

impl InterruptVector {
    /// Все векторы, для которых IDT ставит обработчик.
    /// Every vector the IDT installs a handler for.
    pub const ALL: [InterruptVector; 3] = [Self::Timer, Self::Keyboard, Self::Spurious];

    /// Линия PIC, с которой приходит вектор / The PIC line raising the vector
    pub const fn pic_line(self) -> u8 {
        self as u8 - Self::Timer as u8
    }
}

/// Тик таймера. Квант истёк — вернуть переключение, которое выполнит
/// вызывающий уже после `ack`.
/// A timer tick. If the quantum expired, return the switch for the caller
/// to perform after `ack`.
pub fn on_timer(
    timer: &mut TimerManager,
    tasks: &mut TaskManager,
    ack: impl FnOnce(),
) -> Option<Handoff> {
    let expired = timer.tick(tasks);
    ack();
    if !expired {
        return None;
    }
    let handoff = tasks.switch_task();
    if let Some(handoff) = &handoff {
        trace!("irq: quantum expired, {} -> {}", handoff.from(), handoff.to());
    }
    handoff
}

/// Уведомление устройства: только сообщение получателю и `ack`.
/// A device notification: only a message to the receiver and `ack`.
pub fn on_device(tasks: &mut TaskManager, receiver: TaskId, device: Device, ack: impl FnOnce()) {
    if let Err(err) = tasks.send_message(receiver, Message::DeviceInterrupt(device)) {
        warn!("irq: {:?} notification dropped: {}", device, err);
    }
    ack();
}

/// Точка входа IRQ таймера / Timer IRQ entry point
pub fn timer_interrupt(ack: impl FnOnce()) {
    without_interrupts(|| {
        let handoff = {
            let mut timer = timer::manager().lock();
            let mut tasks = sched::manager().lock();
            on_timer(&mut timer, &mut tasks, ack)
        };
        if let Some(handoff) = handoff {
            // SAFETY: маска прерываний на месте, замки отпущены.
            // The interrupt mask is in place and the locks are released.
            unsafe { handoff.perform() };
        }
    });
}

/// Точка входа IRQ устройства / Device IRQ entry point
pub fn device_interrupt(device: Device, ack: impl FnOnce()) {
    without_interrupts(|| {
        let mut tasks = sched::manager().lock();
        let receiver = tasks.config().timer_receiver;
        on_device(&mut tasks, receiver, device, ack);
    });
}
