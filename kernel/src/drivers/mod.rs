//! Kernel-space drivers
//!
//!   - UART/Serial — отладочный вывод и журнал / debug output and the log sink
//!   - Keyboard    — PS/2, скан-коды набора 1 / PS/2, scancode set 1

pub mod keyboard;
#[cfg(target_os = "none")]
pub mod uart;

/// Макрос для отладочного вывода.
/// Debug print macro.
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => {
        $crate::drivers::uart::_print(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! kprintln {
    ()           => ($crate::kprint!("\n"));
    ($($arg:tt)*) => ($crate::kprint!("{}\n", format_args!($($arg)*)));
}
