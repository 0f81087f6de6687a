//! UART Serial driver — COM1 (0x3F8)
//!
//! Отладочный вывод ядра и журнал `log` в QEMU.
//! Kernel debug output and the `log` sink in QEMU: -serial stdio
//!
//! Запуск / Run:
//!   qemu-system-x86_64 -serial stdio ...

use core::fmt;
use spin::Mutex;

use crate::arch::x86_64::cpu::{inb, outb};
use crate::sync::without_interrupts;

const COM1: u16 = 0x3F8;
/// LSR бит 5: регистр передачи пуст / LSR bit 5: transmit holding register empty
const LSR_THR_EMPTY: u8 = 0x20;

/// Инициализировать COM1 на 115200 baud, без прерываний UART.
/// Initialize COM1 at 115200 baud, UART interrupts off.
pub fn init() {
    unsafe {
        outb(COM1 + 1, 0x00); // Отключить прерывания / Disable interrupts
        outb(COM1 + 3, 0x80); // Включить DLAB (Divisor Latch)
        outb(COM1, 0x01);     // Делитель 1 → 115200 baud
        outb(COM1 + 1, 0x00);
        outb(COM1 + 3, 0x03); // 8 бит, нет чётности, 1 стоп-бит
        outb(COM1 + 2, 0xC7); // Enable FIFO, clear, 14-byte threshold
        outb(COM1 + 4, 0x03); // DTR + RTS, линия IRQ не нужна / no IRQ line
    }
}

fn send_byte(byte: u8) {
    unsafe {
        while inb(COM1 + 5) & LSR_THR_EMPTY == 0 {}
        outb(COM1, byte);
    }
}

struct UartWriter;

impl fmt::Write for UartWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                send_byte(b'\r');
            }
            send_byte(byte);
        }
        Ok(())
    }
}

static UART_LOCK: Mutex<UartWriter> = Mutex::new(UartWriter);

/// Внутренняя функция для kprint! / Internal function for kprint!
///
/// Под маской прерываний: обработчик, который пишет в журнал, не должен
/// застать замок UART занятым прерванной задачей.
/// Under the interrupt mask: a handler that logs must never find the UART
/// lock held by the task it interrupted.
pub fn _print(args: fmt::Arguments) {
    use fmt::Write;
    without_interrupts(|| UART_LOCK.lock().write_fmt(args).ok());
}

/// Вывод из обработчика паники: замок мог остаться у упавшего кода.
/// Output from the panic handler: the lock may still belong to the code that
/// panicked.
pub fn _print_panic(args: fmt::Arguments) {
    use fmt::Write;
    // SAFETY: после паники ядро только печатает и останавливается.
    // After a panic the kernel only prints and halts.
    unsafe { UART_LOCK.force_unlock() };
    UART_LOCK.lock().write_fmt(args).ok();
}
