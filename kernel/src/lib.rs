//! Kairos — ядро вытесняющей многозадачности для x86_64
//! Kairos — a preemptive multitasking kernel core for x86_64
//!
//! Архитектурно-нейтральная часть (задачи, планировщик, таймеры,
//! сообщения) собирается и тестируется на хосте; всё, что трогает железо,
//! живёт под `target_os = "none"`.
//! The architecture-neutral part (tasks, scheduler, timers, messages) builds
//! and is tested on the host; everything that touches hardware lives under
//! `target_os = "none"`.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

// Box, Vec, VecDeque, BTreeMap, BinaryHeap
extern crate alloc;

pub mod arch;
pub mod config;
pub mod drivers;
pub mod error;
pub mod ipc;
pub mod irq;
pub mod logger;
#[cfg(target_os = "none")]
pub mod mm;
pub mod sched;
pub mod sync;
pub mod timer;

pub use error::{Error, Result};
