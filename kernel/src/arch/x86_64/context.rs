//! Переключение контекста / Context switch
//!
//! `kairos_switch_context(next, current)`:
//!   1. сохраняет регистры вызывающего в `current` (RIP = адрес возврата,
//!      RSP = значение после возврата, RFLAGS как есть — вместе с IF);
//!   2. строит на стеке кадр iretq из `next` и восстанавливает его.
//!
//!   1. saves the caller's registers into `current` (RIP = return address,
//!      RSP = value after return, RFLAGS as-is, including IF);
//!   2. builds an iretq frame from `next` and resumes it.
//!
//! Вызывать только с замаскированными прерываниями: целевая задача сама
//! восстанавливает свой IF через сохранённый RFLAGS.
//! Call only with interrupts masked: the target restores its own IF through
//! its saved RFLAGS.

use core::arch::global_asm;

use crate::sched::context::offsets;
use crate::sched::Context;

extern "C" {
    fn kairos_switch_context(next: *const Context, current: *mut Context);
    fn kairos_task_return_trap();
}

/// # Safety
/// Оба указателя должны указывать на живые контексты задач, `next` должен
/// быть инициализирован (`Task::init_context` или предыдущее сохранение),
/// прерывания должны быть замаскированы.
/// Both pointers must reference live task contexts, `next` must have been
/// initialized (by `Task::init_context` or a previous save), and interrupts
/// must be masked.
pub unsafe fn switch_context(next: *const Context, current: *mut Context) {
    unsafe { kairos_switch_context(next, current) };
}

/// Адрес ловушки под точкой входа задачи. `ret` приходит сюда с
/// RSP ≡ 0 (mod 16); заглушка выравнивает стек и делает `call`, так что
/// обработчик видит обычный для SysV RSP ≡ 8.
/// Address of the trap below a task's entry point. `ret` lands here with
/// RSP ≡ 0 (mod 16); the stub aligns the stack and `call`s, so the handler
/// sees the usual SysV RSP ≡ 8.
pub fn task_return_trap() -> u64 {
    kairos_task_return_trap as usize as u64
}

global_asm!(
    r#"
.section .text
.global kairos_task_return_trap
kairos_task_return_trap:
    and rsp, -16
    call {returned}
    ud2
"#,
    returned = sym crate::sched::task_returned,
);

global_asm!(
    r#"
.section .text
.global kairos_switch_context
kairos_switch_context:
    mov [rsi + {rax}], rax
    mov [rsi + {rbx}], rbx
    mov [rsi + {rcx}], rcx
    mov [rsi + {rdx}], rdx
    mov [rsi + {rdi}], rdi
    mov [rsi + {rsi}], rsi

    lea rax, [rsp + 8]
    mov [rsi + {rsp}], rax
    mov [rsi + {rbp}], rbp

    mov [rsi + {r8}], r8
    mov [rsi + {r9}], r9
    mov [rsi + {r10}], r10
    mov [rsi + {r11}], r11
    mov [rsi + {r12}], r12
    mov [rsi + {r13}], r13
    mov [rsi + {r14}], r14
    mov [rsi + {r15}], r15

    mov rax, cr3
    mov [rsi + {cr3}], rax
    mov rax, [rsp]
    mov [rsi + {rip}], rax
    pushfq
    pop qword ptr [rsi + {rflags}]

    mov rax, cs
    mov [rsi + {cs}], rax
    mov rbx, ss
    mov [rsi + {ss}], rbx
    mov rcx, fs
    mov [rsi + {fs}], rcx
    mov rdx, gs
    mov [rsi + {gs}], rdx

    fxsave64 [rsi + {fxsave}]

    /* iretq frame for next: SS, RSP, RFLAGS, CS, RIP */
    push qword ptr [rdi + {ss}]
    push qword ptr [rdi + {rsp}]
    push qword ptr [rdi + {rflags}]
    push qword ptr [rdi + {cs}]
    push qword ptr [rdi + {rip}]

    fxrstor64 [rdi + {fxsave}]

    mov rax, [rdi + {cr3}]
    mov rcx, cr3
    cmp rax, rcx
    je 2f
    mov cr3, rax
2:
    mov rax, [rdi + {fs}]
    mov fs, ax
    mov rax, [rdi + {gs}]
    mov gs, ax

    mov rax, [rdi + {rax}]
    mov rbx, [rdi + {rbx}]
    mov rcx, [rdi + {rcx}]
    mov rdx, [rdi + {rdx}]
    mov rsi, [rdi + {rsi}]
    mov rbp, [rdi + {rbp}]
    mov r8,  [rdi + {r8}]
    mov r9,  [rdi + {r9}]
    mov r10, [rdi + {r10}]
    mov r11, [rdi + {r11}]
    mov r12, [rdi + {r12}]
    mov r13, [rdi + {r13}]
    mov r14, [rdi + {r14}]
    mov r15, [rdi + {r15}]

    mov rdi, [rdi + {rdi}]

    iretq
"#,
    cr3 = const offsets::CR3,
    rip = const offsets::RIP,
    rflags = const offsets::RFLAGS,
    cs = const offsets::CS,
    ss = const offsets::SS,
    fs = const offsets::FS,
    gs = const offsets::GS,
    rax = const offsets::RAX,
    rbx = const offsets::RBX,
    rcx = const offsets::RCX,
    rdx = const offsets::RDX,
    rdi = const offsets::RDI,
    rsi = const offsets::RSI,
    rsp = const offsets::RSP,
    rbp = const offsets::RBP,
    r8 = const offsets::R8,
    r9 = const offsets::R9,
    r10 = const offsets::R10,
    r11 = const offsets::R11,
    r12 = const offsets::R12,
    r13 = const offsets::R13,
    r14 = const offsets::R14,
    r15 = const offsets::R15,
    fxsave = const offsets::FXSAVE,
);
