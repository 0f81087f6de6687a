//! x86_64 boot entry point — Limine protocol
//!
//! Limine jumps here in 64-bit long mode with interrupts disabled.
//! We set up the boot stack, zero BSS, then call kernel_main.
//!
//! Этот стек становится стеком main-задачи: `TaskManager::new` принимает
//! текущий поток исполнения как задачу #1 без нового контекста.
//! This stack becomes the main task's stack: `TaskManager::new` adopts the
//! running flow of control as task #1 without a fresh context.

use core::arch::global_asm;

use limine::memory_map::Entry;
use limine::request::{HhdmRequest, MemoryMapRequest, RequestsEndMarker, RequestsStartMarker};
use limine::BaseRevision;

// ── Запросы Limine / Limine requests ──────────────────────────────────────────

#[used]
#[link_section = ".requests"]
static BASE_REVISION: BaseRevision = BaseRevision::new();

#[used]
#[link_section = ".requests"]
static MEMORY_MAP_REQUEST: MemoryMapRequest = MemoryMapRequest::new();

#[used]
#[link_section = ".requests"]
static HHDM_REQUEST: HhdmRequest = HhdmRequest::new();

#[used]
#[link_section = ".requests_start_marker"]
static _START_MARKER: RequestsStartMarker = RequestsStartMarker::new();

#[used]
#[link_section = ".requests_end_marker"]
static _END_MARKER: RequestsEndMarker = RequestsEndMarker::new();

/// Поддерживает ли загрузчик нашу ревизию протокола.
/// Whether the bootloader supports our protocol revision.
pub fn base_revision_supported() -> bool {
    BASE_REVISION.is_supported()
}

/// Карта памяти от Limine / Limine memory map
pub fn memory_map() -> Option<&'static [&'static Entry]> {
    MEMORY_MAP_REQUEST.get_response().map(|response| response.entries())
}

/// Смещение higher-half direct map / HHDM offset
pub fn hhdm_offset() -> Option<u64> {
    HHDM_REQUEST.get_response().map(|response| response.offset())
}

global_asm!(
    r#"
.section .text
.global _start
_start:
    cli

    /* Switch to our 64KB boot stack */
    leaq boot_stack_top(%rip), %rsp
    andq $-16, %rsp

    /* Zero BSS: rdi = __bss_start, rcx = byte count, al = 0 */
    leaq __bss_start(%rip), %rdi
    leaq __bss_end(%rip),   %rcx
    subq %rdi, %rcx
    xorl %eax, %eax
    rep stosb

    callq kernel_main

    /* kernel_main never returns; halt just in case */
.hang:
    cli
    hlt
    jmp .hang

.section .bss
.balign 16
boot_stack_bottom:
    .skip 65536
boot_stack_top:
"#,
    options(att_syntax)
);
