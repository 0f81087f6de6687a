//! Interrupt Descriptor Table (IDT) — x86_64
//!
//! Регистрирует обработчики исключений и IRQ.
//! Registers exception and IRQ handlers.
//!
//! Важные векторы / Important vectors:
//!   0x00 #DE  — Division Error
//!   0x06 #UD  — Invalid Opcode
//!   0x08 #DF  — Double Fault     (IST1 / отдельный стек)
//!   0x0D #GP  — General Protection Fault
//!   0x0E #PF  — Page Fault
//!   0x20      — Timer IRQ        → irq::timer_interrupt (тик + квант)
//!   0x21      — Keyboard IRQ     → irq::device_interrupt (сообщение main)
//!   0x27      — Spurious IRQ7    (без EOI / no EOI)
//!
//! PIT (IRQ0) работает в режиме 2 / runs in mode 2 (rate generator)

use core::arch::{asm, global_asm};

use super::cpu::outb;
use super::gdt::{DOUBLE_FAULT_IST, KERNEL_CODE};
use crate::config::TIMER_FREQ;
use crate::ipc::Device;
use crate::irq::{self, InterruptVector};
use crate::timer::pit;

// ── Дескриптор прерывания / Interrupt descriptor (16 байт) ───────────────────

#[derive(Clone, Copy)]
#[repr(C, packed)]
struct IdtEntry {
    offset_low:  u16, // биты 0–15 обработчика  / handler bits 0–15
    selector:    u16, // сегмент кода / code segment (KERNEL_CODE)
    ist:         u8,  // Interrupt Stack Table index (0 = не использовать)
    type_attr:   u8,  // тип + атрибуты / type + attributes
    offset_mid:  u16, // биты 16–31 обработчика / handler bits 16–31
    offset_high: u32, // биты 32–63 обработчика / handler bits 32–63
    reserved:    u32,
}

impl IdtEntry {
    const fn missing() -> Self {
        Self {
            offset_low: 0, selector: 0, ist: 0,
            type_attr: 0, offset_mid: 0,
            offset_high: 0, reserved: 0,
        }
    }

    /// Создать дескриптор прерывания.
    /// Create interrupt gate descriptor.
    ///
    /// type_attr 0x8E = Present | ring 0 | Interrupt Gate (IF сбрасывается / IF cleared)
    fn new(handler: u64, selector: u16, ist: u8, type_attr: u8) -> Self {
        Self {
            offset_low:  (handler & 0xFFFF) as u16,
            selector,
            ist,
            type_attr,
            offset_mid:  ((handler >> 16) & 0xFFFF) as u16,
            offset_high: (handler >> 32) as u32,
            reserved:    0,
        }
    }
}

const INTERRUPT_GATE: u8 = 0x8E;

// ── IDTR ─────────────────────────────────────────────────────────────────────

#[repr(C, packed)]
struct IdtDescriptor {
    size:   u16,
    offset: u64,
}

// ── Таблица IDT / IDT table ───────────────────────────────────────────────────

const IDT_SIZE: usize = 256;
static mut IDT: [IdtEntry; IDT_SIZE] = [IdtEntry::missing(); IDT_SIZE];

// ── Контекст прерывания / Interrupt frame ─────────────────────────────────────

/// CPU автоматически помещает на стек при прерывании.
/// CPU automatically pushes on the stack on interrupt.
#[repr(C)]
pub struct InterruptFrame {
    pub rip:    u64,
    pub cs:     u64,
    pub rflags: u64,
    pub rsp:    u64,
    pub ss:     u64,
}

// ── Заглушки на ассемблере / Assembly stubs ───────────────────────────────────
//
// Сохраняют caller-saved регистры (rax, rcx, rdx, rsi, rdi, r8–r11), чтобы
// прерванная задача ничего не заметила. После 9 push + кадр CPU стек снова
// выровнен на 16 — call видит правильное выравнивание SysV.
// Stubs save the caller-saved registers so the interrupted task never
// notices. After 9 pushes plus the CPU frame the stack is 16-byte aligned
// again, as SysV expects at the call.

/// Обработчик без error code: `handler(frame)`.
macro_rules! isr_handler {
    ($name:ident, $handler:path) => {
        global_asm!(
            concat!(".global ", stringify!($name)),
            concat!(stringify!($name), ":"),
            "push rax", "push rcx", "push rdx", "push rsi", "push rdi",
            "push r8", "push r9", "push r10", "push r11",
            "lea rdi, [rsp + 72]",
            "cld",
            "call {handler}",
            "pop r11", "pop r10", "pop r9", "pop r8",
            "pop rdi", "pop rsi", "pop rdx", "pop rcx", "pop rax",
            "iretq",
            handler = sym $handler,
        );
    };
}

/// Обработчик с error code: `handler(frame, error)`.
/// Лишние 8 байт восстанавливают выравнивание после error code.
/// The extra 8 bytes restore alignment after the error code.
macro_rules! isr_handler_err {
    ($name:ident, $handler:path) => {
        global_asm!(
            concat!(".global ", stringify!($name)),
            concat!(stringify!($name), ":"),
            "push rax", "push rcx", "push rdx", "push rsi", "push rdi",
            "push r8", "push r9", "push r10", "push r11",
            "sub rsp, 8",
            "lea rdi, [rsp + 88]",
            "mov rsi, [rsp + 80]",
            "cld",
            "call {handler}",
            "add rsp, 8",
            "pop r11", "pop r10", "pop r9", "pop r8",
            "pop rdi", "pop rsi", "pop rdx", "pop rcx", "pop rax",
            "add rsp, 8",
            "iretq",
            handler = sym $handler,
        );
    };
}

// ── Обработчики исключений / Exception handlers ───────────────────────────────

extern "C" fn handle_divide_error(frame: &InterruptFrame) {
    panic!("Division Error at RIP={:#x}", frame.rip);
}

extern "C" fn handle_invalid_opcode(frame: &InterruptFrame) {
    panic!("Invalid Opcode at RIP={:#x}", frame.rip);
}

extern "C" fn handle_double_fault(frame: &InterruptFrame, error: u64) {
    panic!("Double Fault (error={:#x}) at RIP={:#x} RSP={:#x}", error, frame.rip, frame.rsp);
}

extern "C" fn handle_general_protection(frame: &InterruptFrame, error: u64) {
    panic!("General Protection Fault (error={:#x}) at RIP={:#x}", error, frame.rip);
}

extern "C" fn handle_page_fault(frame: &InterruptFrame, error: u64) {
    // Виновный виртуальный адрес — в регистре CR2
    // Faulting virtual address is in CR2
    let cr2: u64;
    unsafe { asm!("mov {}, cr2", out(reg) cr2) };

    panic!(
        "Page Fault at RIP={:#x} addr={:#x} error={:#x}",
        frame.rip, cr2, error
    );
}

// ── IRQ ──────────────────────────────────────────────────────────────────────

/// Timer IRQ — тик, EOI, и при истечении кванта — переключение задачи.
/// Timer IRQ: tick, EOI, then a task switch when the quantum expired.
extern "C" fn handle_timer(_frame: &InterruptFrame) {
    irq::timer_interrupt(|| unsafe { pic_eoi(InterruptVector::Timer.pic_line()) });
}

/// Keyboard IRQ — только сообщение main-задаче и EOI.
/// Keyboard IRQ: only a message to the main task and EOI.
extern "C" fn handle_keyboard(_frame: &InterruptFrame) {
    irq::device_interrupt(Device::Keyboard, || unsafe {
        pic_eoi(InterruptVector::Keyboard.pic_line())
    });
}

extern "C" fn handle_spurious(_frame: &InterruptFrame) {
    // Ложное прерывание от PIC — игнорируем без EOI
    // Spurious IRQ: ignored, no EOI
}

isr_handler!(isr_divide_error,      handle_divide_error);
isr_handler!(isr_invalid_opcode,    handle_invalid_opcode);
isr_handler_err!(isr_double_fault,  handle_double_fault);
isr_handler_err!(isr_gp_fault,      handle_general_protection);
isr_handler_err!(isr_page_fault,    handle_page_fault);
isr_handler!(isr_timer,             handle_timer);
isr_handler!(isr_keyboard,          handle_keyboard);
isr_handler!(isr_spurious,          handle_spurious);

extern "C" {
    fn isr_divide_error();
    fn isr_invalid_opcode();
    fn isr_double_fault();
    fn isr_gp_fault();
    fn isr_page_fault();
    fn isr_timer();
    fn isr_keyboard();
    fn isr_spurious();
}

// ── PIC (8259) ────────────────────────────────────────────────────────────────

const PIC1_CMD:  u16 = 0x20;
const PIC1_DATA: u16 = 0x21;
const PIC2_CMD:  u16 = 0xA0;
const PIC2_DATA: u16 = 0xA1;

/// Сообщить PIC об окончании обработки прерывания.
/// Send End-Of-Interrupt to PIC.
unsafe fn pic_eoi(irq: u8) {
    unsafe {
        if irq >= 8 { outb(PIC2_CMD, 0x20); }
        outb(PIC1_CMD, 0x20);
    }
}

/// Инициализировать PIC и ремаппировать IRQ 0–15 на векторы 0x20–0x2F.
/// Initialize PIC and remap IRQ 0–15 to vectors 0x20–0x2F.
///
/// По умолчанию IRQ 0–7 → векторы 0x08–0x0F — конфликт с исключениями!
/// By default IRQ 0–7 → vectors 0x08–0x0F, which conflicts with exceptions!
unsafe fn pic_init() {
    unsafe {
        // ICW1: начало инициализации / start initialization
        outb(PIC1_CMD,  0x11);
        outb(PIC2_CMD,  0x11);
        // ICW2: векторные смещения / vector offsets
        outb(PIC1_DATA, InterruptVector::Timer as u8); // IRQ 0–7  → 0x20–0x27
        outb(PIC2_DATA, InterruptVector::Timer as u8 + 8); // IRQ 8–15 → 0x28–0x2F
        // ICW3: каскадирование / cascade
        outb(PIC1_DATA, 0x04);
        outb(PIC2_DATA, 0x02);
        // ICW4: режим 8086 / 8086 mode
        outb(PIC1_DATA, 0x01);
        outb(PIC2_DATA, 0x01);
        // Маска: разрешить только Timer (IRQ0) и Keyboard (IRQ1)
        // Mask: allow only Timer (IRQ0) and Keyboard (IRQ1)
        outb(PIC1_DATA, 0b11111100);
        outb(PIC2_DATA, 0b11111111);
    }
}

// ── PIT (8254) ────────────────────────────────────────────────────────────────

const PIT_COMMAND:  u16 = 0x43;
const PIT_CHANNEL0: u16 = 0x40;

/// Запустить периодический таймер с частотой `TIMER_FREQ` (режим 2).
/// Start the periodic timer at `TIMER_FREQ` (mode 2).
pub fn start_timer() {
    let divisor = pit::divisor(TIMER_FREQ);
    unsafe {
        outb(PIT_COMMAND, pit::RATE_GENERATOR);
        outb(PIT_CHANNEL0, (divisor & 0xFF) as u8);
        outb(PIT_CHANNEL0, (divisor >> 8) as u8);
    }
}

// ── Инициализация / Initialization ───────────────────────────────────────────

/// Инициализировать IDT и загрузить IDTR. Прерывания остаются выключенными:
/// их включает kernel_main, когда планировщик и таймер готовы.
/// Initialize IDT and load IDTR. Interrupts stay disabled: kernel_main
/// enables them once the scheduler and timer exist.
pub fn init() {
    unsafe {
        let idt = core::ptr::addr_of_mut!(IDT);
        let set = |vec: usize, handler: unsafe extern "C" fn(), ist: u8| {
            (*idt)[vec] = IdtEntry::new(handler as u64, KERNEL_CODE, ist, INTERRUPT_GATE);
        };

        // Исключения процессора / CPU exceptions
        set(0x00, isr_divide_error,   0);
        set(0x06, isr_invalid_opcode, 0);
        set(0x08, isr_double_fault,   DOUBLE_FAULT_IST);
        set(0x0D, isr_gp_fault,       0);
        set(0x0E, isr_page_fault,     0);

        // IRQ после ремаппинга: у каждого вектора своя заглушка.
        // IRQ after remapping: every vector has its own stub.
        for vector in InterruptVector::ALL {
            let stub: unsafe extern "C" fn() = match vector {
                InterruptVector::Timer => isr_timer,
                InterruptVector::Keyboard => isr_keyboard,
                InterruptVector::Spurious => isr_spurious,
            };
            set(vector as usize, stub, 0);
        }

        pic_init();

        // Загрузить IDTR / Load IDTR
        let descriptor = IdtDescriptor {
            size:   (core::mem::size_of::<[IdtEntry; IDT_SIZE]>() - 1) as u16,
            offset: idt as u64,
        };
        asm!("lidt [{desc}]", desc = in(reg) &descriptor);
    }
}
