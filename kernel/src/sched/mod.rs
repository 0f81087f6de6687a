//! Планировщик — многоуровневые очереди + сообщения
//! Scheduler — multi-level ready queues + messages
//!
//! Уровни / Levels (`0..=MAX_LEVEL`, выше — приоритетнее / higher wins):
//!   3 — main-задача: таймауты и уведомления устройств
//!       main task: timeouts and device notifications
//!   1 — обычные задачи / regular tasks (default)
//!   0 — задача простоя / idle task
//!
//! Внутри уровня — round-robin по кванту `TASK_TIMER_PERIOD`.
//! Within a level: round-robin on the `TASK_TIMER_PERIOD` quantum.
//!
//! Единственный `TaskManager` живёт в [`TASK_MANAGER`] за `IrqLock`.
//! Функции этого модуля маскируют прерывания сами и выполняют `Handoff`
//! уже без замка, но ещё под маской.
//! The single `TaskManager` lives in [`TASK_MANAGER`] behind an `IrqLock`.
//! The functions here mask interrupts themselves and perform the `Handoff`
//! with the lock released but the mask still in place.

pub mod context;
mod manager;
mod task;

pub use context::{Context, Handoff};
pub use manager::TaskManager;
pub use task::{HeapStacks, StackAllocator, Task, TaskFunc, TaskStack};
pub(crate) use task::task_returned;

use log::{info, warn};
use spin::Once;

use crate::arch;
use crate::config::SchedConfig;
use crate::error::Result;
use crate::ipc::{Message, TaskId};
use crate::sync::{without_interrupts, IrqLock};

/// Менеджер задач ядра. Создаётся один раз в `init()`, до `sti`.
/// The kernel task manager. Created once by `init()`, before `sti`.
static TASK_MANAGER: Once<IrqLock<TaskManager>> = Once::new();

/// Создать менеджер задач: main-задача + задача простоя.
/// Повторный вызов игнорируется.
/// Create the task manager: main task plus idle task.
/// A second call is ignored.
pub fn init() -> Result<()> {
    init_with(SchedConfig::default())
}

pub fn init_with(config: SchedConfig) -> Result<()> {
    if TASK_MANAGER.is_completed() {
        warn!("sched: already initialized");
        return Ok(());
    }
    let mgr = TaskManager::new(config)?;
    TASK_MANAGER.call_once(|| IrqLock::new(mgr));
    let (main, idle) = with_tasks(|tasks| (tasks.main_task_id(), tasks.idle_task_id()));
    info!("sched: main task {}, idle task {}", main, idle);
    Ok(())
}

pub(crate) fn manager() -> &'static IrqLock<TaskManager> {
    match TASK_MANAGER.get() {
        Some(mgr) => mgr,
        None => panic!("sched: used before sched::init()"),
    }
}

pub fn is_initialized() -> bool {
    TASK_MANAGER.is_completed()
}

/// Выполнить `f` над менеджером под маской прерываний.
/// Run `f` on the manager with interrupts masked.
pub fn with_tasks<R>(f: impl FnOnce(&mut TaskManager) -> R) -> R {
    f(&mut manager().lock())
}

/// Под маской: применить `f`, отпустить замок, затем переключиться.
/// Masked: apply `f`, release the lock, then switch.
fn switch_with<R>(f: impl FnOnce(&mut TaskManager) -> (R, Option<Handoff>)) -> R {
    without_interrupts(|| {
        let (ret, handoff) = f(&mut manager().lock());
        if let Some(handoff) = handoff {
            // SAFETY: прерывания замаскированы, замок отпущен, задачи
            // никогда не удаляются. Interrupts are masked, the lock is
            // released and tasks are never removed.
            unsafe { handoff.perform() };
        }
        ret
    })
}

/// Уступить процессор следующей задаче своего уровня.
/// Yield to the next task of the current level.
pub fn switch_task() {
    switch_with(|tasks| ((), tasks.switch_task()));
}

pub fn sleep(id: TaskId) -> Result<()> {
    switch_with(|tasks| match tasks.sleep(id) {
        Ok(handoff) => (Ok(()), handoff),
        Err(err) => (Err(err), None),
    })
    .inspect_err(|err| warn!("sched: sleep: {}", err))
}

/// Усыпить текущую задачу / Put the current task to sleep
pub fn sleep_current() {
    switch_with(|tasks| {
        let id = tasks.current_task_id();
        ((), tasks.sleep(id).ok().flatten())
    });
}

pub fn wakeup(id: TaskId, level: Option<usize>) -> Result<()> {
    with_tasks(|tasks| tasks.wakeup(id, level)).inspect_err(|err| warn!("sched: wakeup: {}", err))
}

pub fn change_level(id: TaskId, level: usize) -> Result<()> {
    with_tasks(|tasks| tasks.change_level_running(id, level))
        .inspect_err(|err| warn!("sched: change level: {}", err))
}

/// Отправить сообщение и разбудить получателя. Безопасно из обработчика
/// прерывания. Send a message and wake the receiver. Safe from an
/// interrupt handler.
pub fn send_message(id: TaskId, msg: Message) -> Result<()> {
    with_tasks(|tasks| tasks.send_message(id, msg))
        .inspect_err(|err| warn!("sched: message to {} dropped: {}", id, err))
}

/// Создать задачу, подготовить её контекст и разбудить на уровне `level`.
/// При ошибке задача не создаётся.
/// Create a task, prepare its context and wake it at `level`. On error no
/// task is created.
pub fn new_task(f: TaskFunc, data: i64, level: usize) -> Result<TaskId> {
    let id = with_tasks(|tasks| tasks.spawn(f, data, level))
        .inspect_err(|err| warn!("sched: new task: {}", err))?;
    info!("sched: task {} started at level {}", id, level);
    Ok(id)
}

pub fn current_task_id() -> TaskId {
    with_tasks(|tasks| tasks.current_task_id())
}

pub fn idle_task_id() -> TaskId {
    with_tasks(|tasks| tasks.idle_task_id())
}

/// Неблокирующее чтение входящих текущей задачи.
/// Non-blocking read of the current task's inbox.
pub fn receive_message() -> Option<Message> {
    with_tasks(|tasks| tasks.current_task_mut().receive_message())
}

/// Ждать сообщение: проверка и засыпание под одной маской, после
/// пробуждения — повторная проверка.
/// Wait for a message: check and sleep under one mask, re-check after
/// every wakeup.
pub fn wait_message() -> Message {
    loop {
        let msg = switch_with(|tasks| {
            let current = tasks.current_task_mut();
            match current.receive_message() {
                Some(msg) => (Some(msg), None),
                None => {
                    let id = current.id();
                    (None, tasks.sleep(id).ok().flatten())
                }
            }
        });
        if let Some(msg) = msg {
            return msg;
        }
    }
}

/// Задача простоя: всегда готова, только ждёт прерываний.
/// The idle task: always ready, only waits for interrupts.
pub extern "C" fn task_idle(_task_id: u64, _data: i64) {
    loop {
        arch::halt();
    }
}
