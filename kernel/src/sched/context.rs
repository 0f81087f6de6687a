//! Сохранённый контекст задачи / Saved task context
//!
//! Раскладка — контракт с `arch::x86_64::context`: ассемблер обращается к
//! полям по смещениям из [`offsets`]. Любое изменение полей требует
//! синхронной правки смещений (их проверяет тест ниже).
//! The layout is a contract with `arch::x86_64::context`: the assembly
//! addresses fields through [`offsets`]. Changing a field requires updating
//! the offsets in lockstep (checked by the test below).

use bitflags::bitflags;

use crate::arch;
use crate::ipc::TaskId;

/// Регистры задачи + область FXSAVE (512 байт, выравнивание 16).
/// Task registers plus the FXSAVE area (512 bytes, 16-byte aligned).
#[derive(Clone)]
#[repr(C, align(16))]
pub struct Context {
    pub cr3: u64,
    pub rip: u64,
    pub rflags: u64,
    reserved1: u64,
    pub cs: u64,
    pub ss: u64,
    pub fs: u64,
    pub gs: u64,
    pub rax: u64,
    pub rbx: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rsp: u64,
    pub rbp: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub fxsave_area: [u8; 512],
}

/// Смещения полей `Context` / `Context` field offsets
pub mod offsets {
    pub const CR3: usize = 0x00;
    pub const RIP: usize = 0x08;
    pub const RFLAGS: usize = 0x10;
    pub const CS: usize = 0x20;
    pub const SS: usize = 0x28;
    pub const FS: usize = 0x30;
    pub const GS: usize = 0x38;
    pub const RAX: usize = 0x40;
    pub const RBX: usize = 0x48;
    pub const RCX: usize = 0x50;
    pub const RDX: usize = 0x58;
    pub const RDI: usize = 0x60;
    pub const RSI: usize = 0x68;
    pub const RSP: usize = 0x70;
    pub const RBP: usize = 0x78;
    pub const R8: usize = 0x80;
    pub const R9: usize = 0x88;
    pub const R10: usize = 0x90;
    pub const R11: usize = 0x98;
    pub const R12: usize = 0xa0;
    pub const R13: usize = 0xa8;
    pub const R14: usize = 0xb0;
    pub const R15: usize = 0xb8;
    pub const FXSAVE: usize = 0xc0;
}

bitflags! {
    /// Биты RFLAGS, которые выставляет ядро / RFLAGS bits the kernel sets
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RFlags: u64 {
        /// Бит 1 всегда 1 / Bit 1 is always set
        const RESERVED_1       = 1 << 1;
        /// IF — разрешить маскируемые прерывания / enable maskable interrupts
        const INTERRUPT_ENABLE = 1 << 9;
    }
}

/// x87 FCW: все исключения замаскированы, 64-бит точность, округление к
/// ближайшему. x87 FCW: all exceptions masked, 64-bit precision, round to
/// nearest.
pub const DEFAULT_FCW: u16 = 0x037F;

/// MXCSR: все исключения SSE замаскированы / all SSE exceptions masked
pub const DEFAULT_MXCSR: u32 = 0x1F80;

const FCW_OFFSET: usize = 0;
const MXCSR_OFFSET: usize = 24;

impl Context {
    pub const fn zeroed() -> Self {
        Self {
            cr3: 0, rip: 0, rflags: 0, reserved1: 0,
            cs: 0, ss: 0, fs: 0, gs: 0,
            rax: 0, rbx: 0, rcx: 0, rdx: 0,
            rdi: 0, rsi: 0, rsp: 0, rbp: 0,
            r8: 0, r9: 0, r10: 0, r11: 0,
            r12: 0, r13: 0, r14: 0, r15: 0,
            fxsave_area: [0; 512],
        }
    }

    pub fn fcw(&self) -> u16 {
        let bytes = &self.fxsave_area[FCW_OFFSET..FCW_OFFSET + 2];
        u16::from_le_bytes([bytes[0], bytes[1]])
    }

    pub fn set_fcw(&mut self, fcw: u16) {
        self.fxsave_area[FCW_OFFSET..FCW_OFFSET + 2].copy_from_slice(&fcw.to_le_bytes());
    }

    pub fn mxcsr(&self) -> u32 {
        let bytes = &self.fxsave_area[MXCSR_OFFSET..MXCSR_OFFSET + 4];
        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    pub fn set_mxcsr(&mut self, mxcsr: u32) {
        self.fxsave_area[MXCSR_OFFSET..MXCSR_OFFSET + 4].copy_from_slice(&mxcsr.to_le_bytes());
    }

    pub fn rflags(&self) -> RFlags {
        RFlags::from_bits_retain(self.rflags)
    }
}

/// Запланированная передача управления: сохранить регистры в `current`,
/// возобновить `next`. Её создаёт `TaskManager`, а выполняет глобальный
/// слой `sched` — после освобождения замка, но до снятия маски прерываний.
///
/// A planned hand-off: save the registers into `current`, resume `next`.
/// `TaskManager` creates it; the global `sched` layer performs it after
/// releasing the lock but before unmasking interrupts.
#[must_use = "the switch only happens when the handoff is performed"]
#[derive(Debug)]
pub struct Handoff {
    from: TaskId,
    to: TaskId,
    current: *mut Context,
    next: *const Context,
}

impl Handoff {
    pub(crate) fn new(from: TaskId, to: TaskId, current: *mut Context, next: *const Context) -> Self {
        Self { from, to, current, next }
    }

    pub fn from(&self) -> TaskId {
        self.from
    }

    pub fn to(&self) -> TaskId {
        self.to
    }

    /// # Safety
    /// Прерывания замаскированы, обе задачи живы (задачи никогда не
    /// удаляются), и никто не держит ссылок на их контексты.
    /// Interrupts are masked, both tasks are alive (tasks are never
    /// removed) and nothing holds references into their contexts.
    pub unsafe fn perform(self) {
        unsafe { arch::switch_context(self.next, self.current) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::{align_of, offset_of, size_of};

    #[test]
    fn layout_matches_switch_routine() {
        assert_eq!(offset_of!(Context, cr3), offsets::CR3);
        assert_eq!(offset_of!(Context, rip), offsets::RIP);
        assert_eq!(offset_of!(Context, rflags), offsets::RFLAGS);
        assert_eq!(offset_of!(Context, cs), offsets::CS);
        assert_eq!(offset_of!(Context, ss), offsets::SS);
        assert_eq!(offset_of!(Context, fs), offsets::FS);
        assert_eq!(offset_of!(Context, gs), offsets::GS);
        assert_eq!(offset_of!(Context, rax), offsets::RAX);
        assert_eq!(offset_of!(Context, rbx), offsets::RBX);
        assert_eq!(offset_of!(Context, rcx), offsets::RCX);
        assert_eq!(offset_of!(Context, rdx), offsets::RDX);
        assert_eq!(offset_of!(Context, rdi), offsets::RDI);
        assert_eq!(offset_of!(Context, rsi), offsets::RSI);
        assert_eq!(offset_of!(Context, rsp), offsets::RSP);
        assert_eq!(offset_of!(Context, rbp), offsets::RBP);
        assert_eq!(offset_of!(Context, r8), offsets::R8);
        assert_eq!(offset_of!(Context, r15), offsets::R15);
        assert_eq!(offset_of!(Context, fxsave_area), offsets::FXSAVE);
        assert_eq!(offsets::FXSAVE % 16, 0);
        assert_eq!(align_of::<Context>(), 16);
        assert_eq!(size_of::<Context>(), offsets::FXSAVE + 512);
    }

    #[test]
    fn fpu_control_words_live_in_fxsave_area() {
        let mut ctx = Context::zeroed();
        ctx.set_fcw(DEFAULT_FCW);
        ctx.set_mxcsr(DEFAULT_MXCSR);
        assert_eq!(ctx.fxsave_area[0], 0x7F);
        assert_eq!(ctx.fxsave_area[1], 0x03);
        assert_eq!(ctx.fxsave_area[24..28], [0x80, 0x1F, 0, 0]);
        assert_eq!(ctx.fcw(), DEFAULT_FCW);
        assert_eq!(ctx.mxcsr(), DEFAULT_MXCSR);
    }

    #[test]
    fn kernel_rflags_enable_interrupts() {
        let flags = RFlags::INTERRUPT_ENABLE | RFlags::RESERVED_1;
        assert_eq!(flags.bits(), 0x202);
    }
}
