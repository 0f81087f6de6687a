//! Kernel Heap — buddy allocator
//!
//! `buddy_system_allocator::LockedHeap` под маской прерываний: в куче
//! выделяют и задачи, и обработчики прерываний (очереди сообщений).
//! `buddy_system_allocator::LockedHeap` under the interrupt mask: both tasks
//! and interrupt handlers (message queues) allocate from the heap.

use core::alloc::{GlobalAlloc, Layout};

use buddy_system_allocator::LockedHeap;
use log::info;

use super::pmm::{self, Region};
use crate::config::KERNEL_HEAP_SIZE;
use crate::sync::without_interrupts;

pub struct KernelHeap {
    inner: LockedHeap,
}

impl KernelHeap {
    const fn new() -> Self {
        Self { inner: LockedHeap::empty() }
    }
}

unsafe impl GlobalAlloc for KernelHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        without_interrupts(|| unsafe { self.inner.alloc(layout) })
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        without_interrupts(|| unsafe { self.inner.dealloc(ptr, layout) })
    }
}

#[global_allocator]
static HEAP: KernelHeap = KernelHeap::new();

/// Отдать куче область из карты памяти. Без неё ядру не жить.
/// Hand the heap a region from the memory map. The kernel cannot live
/// without it.
pub fn init() {
    let Some(Region { start, len }) = pmm::heap_region(KERNEL_HEAP_SIZE) else {
        panic!("heap: no usable memory region for the kernel heap");
    };
    // SAFETY: область свободна по карте Limine и видна через HHDM.
    // The region is free per the Limine map and mapped through the HHDM.
    unsafe { HEAP.inner.lock().init(start.as_u64() as usize, len) };
    info!("heap: {} KiB at {:#x}", len / 1024, start.as_u64());
}
