//! Примитивы процессора / CPU primitives
//!
//! Порты ввода-вывода, флаг прерываний, CR3, hlt.
//! I/O ports, interrupt flag, CR3, hlt.

use core::arch::asm;

/// RFLAGS.IF
const RFLAGS_IF: u64 = 1 << 9;

/// # Safety
/// Запись в порт может иметь любые побочные эффекты на устройстве.
/// A port write may have arbitrary device side effects.
pub unsafe fn outb(port: u16, val: u8) {
    unsafe { asm!("out dx, al", in("dx") port, in("al") val, options(nomem, nostack)) };
}

/// # Safety
/// Чтение порта может сбросить состояние устройства.
/// Reading a port may clear device state.
pub unsafe fn inb(port: u16) -> u8 {
    let val: u8;
    unsafe { asm!("in al, dx", out("al") val, in("dx") port, options(nomem, nostack)) };
    val
}

pub mod interrupts {
    use core::arch::asm;

    pub fn are_enabled() -> bool {
        let rflags: u64;
        unsafe { asm!("pushfq", "pop {}", out(reg) rflags, options(nomem, preserves_flags)) };
        rflags & super::RFLAGS_IF != 0
    }

    pub fn enable() {
        unsafe { asm!("sti", options(nomem, nostack)) };
    }

    pub fn disable() {
        unsafe { asm!("cli", options(nomem, nostack)) };
    }
}

pub fn read_cr3() -> u64 {
    let cr3: u64;
    unsafe { asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags)) };
    cr3
}

/// Ждать следующего прерывания / Wait for the next interrupt
pub fn halt() {
    unsafe { asm!("hlt", options(nomem, nostack, preserves_flags)) };
}

/// Разрешить FXSAVE/FXRSTOR и SSE: переключение контекста сохраняет
/// FPU/SSE-состояние каждой задачи.
/// Enable FXSAVE/FXRSTOR and SSE: the context switch saves every task's
/// FPU/SSE state.
pub fn enable_fpu() {
    const CR0_MP: u64 = 1 << 1;
    const CR0_EM: u64 = 1 << 2;
    const CR0_TS: u64 = 1 << 3;
    const CR4_OSFXSR: u64 = 1 << 9;
    const CR4_OSXMMEXCPT: u64 = 1 << 10;

    unsafe {
        let mut cr0: u64;
        asm!("mov {}, cr0", out(reg) cr0, options(nomem, nostack));
        cr0 = (cr0 | CR0_MP) & !(CR0_EM | CR0_TS);
        asm!("mov cr0, {}", in(reg) cr0, options(nomem, nostack));

        let mut cr4: u64;
        asm!("mov {}, cr4", out(reg) cr4, options(nomem, nostack));
        cr4 |= CR4_OSFXSR | CR4_OSXMMEXCPT;
        asm!("mov cr4, {}", in(reg) cr4, options(nomem, nostack));

        asm!("fninit", options(nomem, nostack));
    }
}
