//! Memory Management subsystem
//!
//! Два уровня / Two layers:
//!   pmm  — карта памяти Limine → область под кучу / Limine memory map → heap arena
//!   heap — куча ядра (buddy) / kernel heap (buddy)
//!
//! Стеки задач и все структуры планировщика живут в куче.
//! Task stacks and all scheduler structures live on the heap.

pub mod heap;
pub mod pmm;

/// Физический адрес / Physical address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct PhysAddr(pub u64);

/// Виртуальный адрес / Virtual address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct VirtAddr(pub u64);

impl PhysAddr {
    pub const fn new(addr: u64) -> Self { Self(addr) }
    pub const fn as_u64(self) -> u64   { self.0 }
}

impl VirtAddr {
    pub const fn new(addr: u64) -> Self { Self(addr) }
    pub const fn as_u64(self) -> u64   { self.0 }
}
