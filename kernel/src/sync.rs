//! Критические секции / Critical sections
//!
//! Единственный примитив синхронизации ядра — маскирование прерываний
//! (одно ядро, блокирующих замков нет). `IrqLock` добавляет к маске
//! `spin::Mutex`, чтобы у Rust был корректный `&mut`; на одном ядре
//! под маской он никогда не конкурирует.
//!
//! The kernel's only synchronization primitive is interrupt masking (single
//! core, no blocking locks). `IrqLock` pairs the mask with a `spin::Mutex`
//! so Rust gets a sound `&mut`; on one core under the mask it never contends.
//!
//! Порт на SMP должен заменить маску настоящим spinlock + запретом
//! вытеснения. An SMP port must replace the mask with a real spinlock plus
//! preemption disabling.

use core::ops::{Deref, DerefMut};

use spin::{Mutex, MutexGuard};

use crate::arch::interrupts;

/// Выполнить `f` с замаскированными прерываниями и вернуть прежнее
/// состояние IF. Вложенные вызовы не включают прерывания раньше времени.
/// Run `f` with interrupts masked, then restore the previous IF state.
/// Nested calls never unmask early.
pub fn without_interrupts<R>(f: impl FnOnce() -> R) -> R {
    let saved = interrupts::are_enabled();
    if saved {
        interrupts::disable();
    }
    let ret = f();
    if saved {
        interrupts::enable();
    }
    ret
}

/// Данные, доступные только под маской прерываний.
/// Data reachable only with interrupts masked.
pub struct IrqLock<T> {
    inner: Mutex<T>,
}

impl<T> IrqLock<T> {
    pub const fn new(value: T) -> Self {
        Self { inner: Mutex::new(value) }
    }

    /// Замаскировать прерывания и захватить данные. Маска снимается, когда
    /// guard уничтожается (если до этого прерывания были включены).
    /// Mask interrupts and take the data. The mask is lifted when the guard
    /// drops (if interrupts were enabled before).
    pub fn lock(&self) -> IrqLockGuard<'_, T> {
        let saved = interrupts::are_enabled();
        if saved {
            interrupts::disable();
        }
        IrqLockGuard { guard: Some(self.inner.lock()), saved }
    }
}

pub struct IrqLockGuard<'a, T> {
    guard: Option<MutexGuard<'a, T>>,
    saved: bool,
}

impl<T> Deref for IrqLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Some до самого Drop / Some until Drop
        match &self.guard {
            Some(guard) => guard,
            None => unreachable!(),
        }
    }
}

impl<T> DerefMut for IrqLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.guard {
            Some(guard) => guard,
            None => unreachable!(),
        }
    }
}

impl<T> Drop for IrqLockGuard<'_, T> {
    fn drop(&mut self) {
        // Сначала отпустить замок, потом снять маску.
        // Release the lock first, then lift the mask.
        drop(self.guard.take());
        if self.saved {
            interrupts::enable();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Флаг прерываний на хосте общий для процесса, поэтому всё, что его
    // проверяет, собрано в одном тесте.
    // The host interrupt flag is process-wide, so everything that inspects
    // it lives in one test.
    #[test]
    fn masks_and_restores_interrupt_flag() {
        interrupts::enable();

        let inside = without_interrupts(|| {
            let nested = without_interrupts(interrupts::are_enabled);
            (interrupts::are_enabled(), nested)
        });
        assert_eq!(inside, (false, false));
        assert!(interrupts::are_enabled());

        let lock = IrqLock::new(5u32);
        {
            let mut value = lock.lock();
            *value += 1;
            assert!(!interrupts::are_enabled());
        }
        assert!(interrupts::are_enabled());
        assert_eq!(*lock.lock(), 6);

        // Замаскировано до захвата — остаётся замаскированным.
        // Masked before taking the lock, so it stays masked.
        interrupts::disable();
        drop(lock.lock());
        assert!(!interrupts::are_enabled());
        interrupts::enable();
    }
}
