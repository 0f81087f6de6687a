//! Конфигурация ядра / Kernel configuration
//!
//! Константы времени компиляции и [`SchedConfig`] — набор параметров,
//! который передаётся планировщику и таймеру при создании.
//! Compile-time constants plus [`SchedConfig`], the parameter set handed to
//! the task manager and the timer manager on construction.

use log::LevelFilter;

use crate::ipc::TaskId;

/// Частота аппаратного таймера / Hardware timer frequency (Hz).
pub const TIMER_FREQ: u64 = 100;

/// Квант планировщика в тиках (20 мс) / Scheduler quantum in ticks (20 ms).
pub const TASK_TIMER_PERIOD: u64 = TIMER_FREQ / 50;

/// Наивысший уровень приоритета / Highest priority level.
pub const MAX_LEVEL: usize = 3;

/// Уровень новой задачи по умолчанию / Default level of a new task.
pub const DEFAULT_LEVEL: usize = 1;

/// Размер стека задачи / Task stack size.
pub const DEFAULT_STACK_BYTES: usize = 8 * 4096;

/// Задача, которая получает таймауты и уведомления устройств.
/// Task that receives timer timeouts and device notifications.
pub const MAIN_TASK_ID: TaskId = TaskId(1);

/// Размер кучи ядра / Kernel heap size.
pub const KERNEL_HEAP_SIZE: usize = 16 * 1024 * 1024;

pub const LOG_LEVEL: LevelFilter = if cfg!(debug_assertions) {
    LevelFilter::Debug
} else {
    LevelFilter::Info
};

/// Параметры планировщика и таймера.
/// Scheduler and timer parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedConfig {
    /// Квант в тиках / Quantum in ticks
    pub quantum: u64,
    /// Размер стека новой задачи в байтах / New task stack size in bytes
    pub stack_bytes: usize,
    /// Получатель сообщений `TimerTimeout` / Receiver of `TimerTimeout`
    pub timer_receiver: TaskId,
}

impl SchedConfig {
    pub const fn new() -> Self {
        Self {
            quantum: TASK_TIMER_PERIOD,
            stack_bytes: DEFAULT_STACK_BYTES,
            timer_receiver: MAIN_TASK_ID,
        }
    }
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self::new()
    }
}
