//! Журнал ядра / Kernel logger
//!
//! Реализация `log::Log`: строки `[LEVEL target] message` в COM1.
//! A `log::Log` implementation: `[LEVEL target] message` lines to COM1.

use core::fmt::{self, Write};

use log::{LevelFilter, Log, Metadata, Record};

use crate::config::LOG_LEVEL;

struct KernelLogger {
    level: LevelFilter,
}

static LOGGER: KernelLogger = KernelLogger { level: LOG_LEVEL };

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        emit(record);
    }

    fn flush(&self) {}
}

#[cfg(target_os = "none")]
fn emit(record: &Record) {
    crate::kprint!("{}", Line(record));
}

// На хосте вывода нет: тесты проверяют только формат.
// No output on the host: tests check the format only.
#[cfg(not(target_os = "none"))]
fn emit(_record: &Record) {}

/// Отформатированная запись / A formatted record
#[cfg(target_os = "none")]
struct Line<'a, 'b>(&'a Record<'b>);

#[cfg(target_os = "none")]
impl fmt::Display for Line<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_record(f, self.0)
    }
}

pub fn write_record(w: &mut impl Write, record: &Record) -> fmt::Result {
    writeln!(w, "[{:<5} {}] {}", record.level(), record.target(), record.args())
}

/// Установить логгер. Повторный вызов ничего не меняет.
/// Install the logger. A second call changes nothing.
pub fn init() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LOG_LEVEL);
    }
}
