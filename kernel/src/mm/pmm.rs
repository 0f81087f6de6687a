//! Physical Memory Manager
//!
//! Читает карту памяти Limine и отдаёт крупнейшую свободную область под
//! кучу ядра. Вся физическая память видна через HHDM, так что область
//! адресуется как `hhdm_offset + phys` без своих таблиц страниц.
//!
//! Reads the Limine memory map and hands the largest usable region to the
//! kernel heap. All physical memory is visible through the HHDM, so the
//! region is addressed as `hhdm_offset + phys` with no page tables of our own.

use limine::memory_map::EntryType;
use log::{debug, info};

use super::{PhysAddr, VirtAddr};
use crate::arch::x86_64::boot;

pub const PAGE_SIZE: u64 = 4096;

/// Область памяти под кучу / Memory region for the heap
#[derive(Debug, Clone, Copy)]
pub struct Region {
    pub start: VirtAddr,
    pub len: usize,
}

/// Найти область для кучи размером до `want` байт.
/// `None` — нет ответа загрузчика или свободной памяти.
/// Find a heap region of up to `want` bytes.
/// `None` if the bootloader did not answer or no memory is usable.
pub fn heap_region(want: usize) -> Option<Region> {
    let hhdm = boot::hhdm_offset()?;
    let entries = boot::memory_map()?;

    let mut usable = 0u64;
    let mut best: Option<(u64, u64)> = None;
    for entry in entries.iter().filter(|e| e.entry_type == EntryType::USABLE) {
        debug!("pmm: usable {:#x}..{:#x}", entry.base, entry.base + entry.length);
        usable += entry.length;
        if best.map_or(true, |(_, len)| entry.length > len) {
            best = Some((entry.base, entry.length));
        }
    }
    info!("pmm: {} MiB usable", usable / (1024 * 1024));

    let (phys, length) = best?;
    let base = PhysAddr::new(align_up(phys, PAGE_SIZE));
    let len = (phys + length).saturating_sub(base.as_u64()).min(want as u64) as usize;
    Some(Region { start: phys_to_virt(base, hhdm), len })
}

fn phys_to_virt(phys: PhysAddr, hhdm: u64) -> VirtAddr {
    VirtAddr::new(phys.as_u64() + hhdm)
}

const fn align_up(addr: u64, align: u64) -> u64 {
    (addr + align - 1) & !(align - 1)
}
