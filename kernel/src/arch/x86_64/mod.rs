//! x86_64 platform initialization

pub mod boot;
pub mod context;
pub mod cpu;
pub mod gdt;
pub mod idt;

pub use context::{switch_context, task_return_trap};
pub use cpu::{halt, interrupts, read_cr3};
pub use gdt::{KERNEL_CODE, KERNEL_DATA};

/// x86_64 init sequence
pub fn init() {
    gdt::init();         // Global Descriptor Table + TSS (IST1 for #DF)
    idt::init();         // Interrupt Descriptor Table + PIC remap
    cpu::enable_fpu();   // FXSAVE/SSE for the context switch
}
