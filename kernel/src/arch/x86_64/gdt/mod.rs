//! Global Descriptor Table (GDT) — x86_64
//!
//! Структура GDT для Kairos / Kairos GDT layout:
//!
//!  Индекс / Index  Сегмент / Segment
//!  ─────────────────────────────────
//!  0               Null descriptor (обязателен / required)
//!  1               Kernel Code  (ring 0, execute)
//!  2               Kernel Data  (ring 0, read/write)
//!  3–4             TSS          (Task State Segment, 16 байт / 16 bytes)
//!
//! Все задачи работают в ring 0: `Task::init_context` ставит CS/SS ядра.
//! Every task runs in ring 0: `Task::init_context` uses the kernel CS/SS.

use core::mem::size_of;

use bitflags::bitflags;

// ── Селекторы сегментов / Segment selectors ───────────────────────────────────
pub const KERNEL_CODE: u16 = 0x08;
pub const KERNEL_DATA: u16 = 0x10;
pub const TSS_SEL:     u16 = 0x18;

/// Индекс IST для #DF / IST slot used by the double-fault handler
pub const DOUBLE_FAULT_IST: u8 = 1;

bitflags! {
    /// Биты 8-байтового дескриптора сегмента.
    /// Bits of an 8-byte segment descriptor.
    #[derive(Debug, Clone, Copy)]
    struct Descriptor: u64 {
        const LIMIT_0_15   = 0xFFFF;
        const ACCESSED     = 1 << 40;
        /// Код: читаемый; данные: записываемые / code: readable; data: writable
        const WRITABLE     = 1 << 41;
        const EXECUTABLE   = 1 << 43;
        /// Сегмент кода/данных, не системный / code/data, not a system segment
        const USER_SEGMENT = 1 << 44;
        const PRESENT      = 1 << 47;
        const LIMIT_16_19  = 0xF << 48;
        const LONG_MODE    = 1 << 53;
        const DEFAULT_SIZE = 1 << 54;
        /// Лимит в страницах по 4KB / limit in 4KB pages
        const GRANULARITY  = 1 << 55;
    }
}

impl Descriptor {
    const COMMON: Self = Self::USER_SEGMENT
        .union(Self::PRESENT)
        .union(Self::WRITABLE)
        .union(Self::ACCESSED)
        .union(Self::LIMIT_0_15)
        .union(Self::LIMIT_16_19)
        .union(Self::GRANULARITY);

    /// ring 0, code, 64-bit (access 0x9A)
    const KERNEL_CODE: Self = Self::COMMON.union(Self::EXECUTABLE).union(Self::LONG_MODE);
    /// ring 0, data (access 0x92)
    const KERNEL_DATA: Self = Self::COMMON.union(Self::DEFAULT_SIZE);
}

/// Системный дескриптор TSS занимает два слота GDT.
/// The TSS system descriptor takes two GDT slots.
fn tss_descriptor(base: u64) -> [u64; 2] {
    /// Present | available 64-bit TSS
    const TSS_AVAILABLE: u64 = 0x89;
    let limit = (size_of::<Tss>() - 1) as u64;
    let low = (limit & 0xFFFF)
        | ((base & 0xFF_FFFF) << 16)
        | (TSS_AVAILABLE << 40)
        | (((limit >> 16) & 0xF) << 48)
        | (((base >> 24) & 0xFF) << 56);
    [low, base >> 32]
}

/// TSS — в long mode хранит только стеки (RSP0–2 и IST).
/// In long mode the TSS only holds stacks (RSP0–2 and IST).
#[repr(C, packed)]
pub struct Tss {
    reserved0:      u32,
    pub rsp0:       u64,
    pub rsp1:       u64,
    pub rsp2:       u64,
    reserved1:      u64,
    /// IST — 7 стеков для критических прерываний / 7 stacks for critical interrupts
    pub ist:        [u64; 7],
    reserved2:      u64,
    reserved3:      u16,
    pub iomap_base: u16,
}

impl Tss {
    const fn new() -> Self {
        Self {
            reserved0: 0, rsp0: 0, rsp1: 0, rsp2: 0,
            reserved1: 0, ist: [0; 7], reserved2: 0,
            reserved3: 0,
            iomap_base: size_of::<Tss>() as u16,
        }
    }
}

/// null, kernel code, kernel data, TSS (2 слота / 2 slots)
const GDT_LEN: usize = 5;

#[repr(C, packed)]
struct GdtDescriptor {
    size:   u16,
    offset: u64,
}

/// Отдельный стек для #DF (20KB) — переполнение стека задачи не должно
/// превращаться в triple fault.
/// Dedicated #DF stack (20KB) so a task stack overflow does not become a
/// triple fault.
static mut DOUBLE_FAULT_STACK: [u8; 20 * 1024] = [0; 20 * 1024];

static mut TSS: Tss = Tss::new();
static mut GDT: [u64; GDT_LEN] = [0; GDT_LEN];

/// Инициализировать и загрузить GDT + TSS.
/// Initialize and load GDT + TSS.
pub fn init() {
    unsafe {
        // 1. Вершина стека #DF → TSS.ist[0] (IST1)
        let stack = core::ptr::addr_of_mut!(DOUBLE_FAULT_STACK);
        let stack_top = (stack as *mut u8).add(size_of::<[u8; 20 * 1024]>()) as u64;
        let tss = core::ptr::addr_of_mut!(TSS);
        (*tss).ist[(DOUBLE_FAULT_IST - 1) as usize] = stack_top & !0xF;

        // 2. GDT с правильным адресом TSS / GDT with the real TSS address
        let [tss_low, tss_high] = tss_descriptor(tss as u64);
        let gdt = core::ptr::addr_of_mut!(GDT);
        gdt.write([
            0,
            Descriptor::KERNEL_CODE.bits(),
            Descriptor::KERNEL_DATA.bits(),
            tss_low,
            tss_high,
        ]);

        // 3. Загрузить GDTR
        let descriptor = GdtDescriptor {
            size:   (size_of::<[u64; GDT_LEN]>() - 1) as u16,
            offset: gdt as u64,
        };

        core::arch::asm!(
            "lgdt [{desc}]",
            // Обновить регистры данных / Update data registers
            "mov ax, {kdata}",
            "mov ds, ax",
            "mov es, ax",
            "mov fs, ax",
            "mov gs, ax",
            "mov ss, ax",
            // Обновить CS через far return / Update CS via far return
            "push {kcode}",
            "lea rax, [rip + 2f]",
            "push rax",
            "retfq",
            "2:",
            // Загрузить TSS / Load TSS
            "ltr {tss:x}",
            desc  = in(reg) &descriptor,
            kcode = const KERNEL_CODE as u64,
            kdata = const KERNEL_DATA,
            tss   = in(reg) TSS_SEL,
            out("rax") _,
        );
    }
}
