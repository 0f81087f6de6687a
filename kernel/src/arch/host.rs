//! Хост-бэкенд / Host backend
//!
//! Второго стека, в который можно «вернуться», на хосте нет: планировщик
//! ведёт очереди как обычно, а `switch_context` ничего не делает.
//! There is no second stack to resume into on the host: the scheduler keeps
//! its queues as usual and `switch_context` does nothing.

use crate::sched::Context;

pub const KERNEL_CODE: u16 = 0x08;
pub const KERNEL_DATA: u16 = 0x10;

pub mod interrupts {
    use core::sync::atomic::{AtomicBool, Ordering};

    /// Моделируемый флаг IF / Simulated IF flag
    static ENABLED: AtomicBool = AtomicBool::new(true);

    pub fn are_enabled() -> bool {
        ENABLED.load(Ordering::SeqCst)
    }

    pub fn enable() {
        ENABLED.store(true, Ordering::SeqCst);
    }

    pub fn disable() {
        ENABLED.store(false, Ordering::SeqCst);
    }
}

/// # Safety
/// Указатели не разыменовываются / The pointers are never dereferenced.
pub unsafe fn switch_context(_next: *const Context, _current: *mut Context) {}

/// Адрес возврата из точки входа задачи. На хосте его никто не вызывает.
/// Return address below a task's entry point. Nothing calls it on the host.
pub fn task_return_trap() -> u64 {
    crate::sched::task_returned as usize as u64
}

pub fn read_cr3() -> u64 {
    0
}

pub fn halt() {
    core::hint::spin_loop();
}
