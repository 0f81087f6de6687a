//! HAL — Hardware Abstraction Layer
//!
//! Выбираем реализацию в зависимости от цели сборки.
//! Select implementation based on the build target.
//!
//! `x86_64` — настоящее железо (x86_64-unknown-none).
//! `host`   — сборка на хосте для тестов: флаг прерываний моделируется,
//!            переключение контекста сводится к учёту в планировщике.
//! `host`   — hosted builds for tests: the interrupt flag is simulated and
//!            a context switch is scheduler bookkeeping only.
//!
//! Каждый бэкенд обязан предоставить / Every backend provides:
//!   interrupts::{are_enabled, enable, disable}
//!   switch_context(next, current), task_return_trap()
//!   read_cr3(), halt(), KERNEL_CODE, KERNEL_DATA

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
pub mod x86_64;
#[cfg(all(target_arch = "x86_64", target_os = "none"))]
pub use self::x86_64 as current;

#[cfg(not(target_os = "none"))]
pub mod host;
#[cfg(not(target_os = "none"))]
pub use self::host as current;

pub use current::{
    halt, interrupts, read_cr3, switch_context, task_return_trap, KERNEL_CODE, KERNEL_DATA,
};

/// Инициализация платформы — вызывается первой из kernel_main.
/// Platform initialization, called first from kernel_main.
#[cfg(all(target_arch = "x86_64", target_os = "none"))]
pub fn init() {
    current::init();
}
