//! Источник тиков и таймауты / Tick source and timeouts
//!
//! `tick()` вызывается только из обработчика прерывания таймера.
//! Ожидающие таймеры лежат в `BinaryHeap` с обратным порядком, так что
//! вершина — ближайший дедлайн; равные дедлайны срабатывают в порядке
//! добавления.
//!
//! `tick()` is called only from the timer interrupt handler. Pending timers
//! sit in a `BinaryHeap` with reversed ordering so the top is the nearest
//! deadline; equal deadlines fire in insertion order.

use alloc::collections::BinaryHeap;
use core::cmp::Ordering;

use log::{debug, warn};
use spin::Once;

use crate::config::SchedConfig;
use crate::ipc::Message;
use crate::sched::TaskManager;
use crate::sync::IrqLock;

/// Полезная нагрузка таймера / Timer payload
///
/// `Quantum` и `Never` создаёт только этот модуль, поэтому они не могут
/// попасть во входящие. Only this module creates `Quantum` and `Never`, so
/// they can never reach an inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    /// Квант планировщика / Scheduler quantum
    Quantum,
    /// Страж: куча никогда не пуста / Sentinel: the heap is never empty
    Never,
    Timeout(i32),
}

#[derive(Debug, Clone, Copy)]
struct Timer {
    timeout: u64,
    seq: u64,
    kind: TimerKind,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    // Меньший (timeout, seq) — выше в max-куче.
    // Smaller (timeout, seq) ranks higher in the max-heap.
    fn cmp(&self, other: &Self) -> Ordering {
        (other.timeout, other.seq).cmp(&(self.timeout, self.seq))
    }
}

pub struct TimerManager {
    tick: u64,
    timers: BinaryHeap<Timer>,
    next_seq: u64,
    /// В куче лежит маркер кванта (не больше одного).
    /// A quantum marker is in the heap (never more than one).
    quantum_armed: bool,
    config: SchedConfig,
}

impl TimerManager {
    pub fn new(config: SchedConfig) -> Self {
        let mut mgr = Self {
            tick: 0,
            timers: BinaryHeap::new(),
            next_seq: 0,
            quantum_armed: false,
            config,
        };
        mgr.push(u64::MAX, TimerKind::Never);
        mgr
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Таймаут на тике `timeout` со значением `value` для получателя
    /// таймаутов. A timeout at tick `timeout` carrying `value` for the timeout
    /// receiver.
    pub fn add_timer(&mut self, timeout: u64, value: i32) {
        self.push(timeout, TimerKind::Timeout(value));
    }

    /// Поставить квант планировщика на `current_tick + quantum`. Уже
    /// взведённый квант не трогаем.
    /// Arm the scheduler quantum at `current_tick + quantum`. An already
    /// armed quantum is left alone.
    pub fn arm_task_timer(&mut self) {
        if self.quantum_armed {
            debug!("timer: quantum already armed");
            return;
        }
        self.quantum_armed = true;
        self.push(self.tick + self.config.quantum, TimerKind::Quantum);
    }

    /// Число ожидающих таймеров без стража.
    /// Pending timers, not counting the sentinel.
    pub fn pending(&self) -> usize {
        self.timers.len() - 1
    }

    /// Следующий тик. Наступившие таймауты уходят получателю сообщениями;
    /// `true` — истёк квант, пора переключать задачу.
    /// Advance one tick. Due timeouts go to the receiver as messages;
    /// `true` means the quantum expired and a task switch is due.
    pub fn tick(&mut self, tasks: &mut TaskManager) -> bool {
        self.tick += 1;

        while let Some(top) = self.timers.peek().copied() {
            if top.timeout > self.tick {
                break;
            }
            match top.kind {
                TimerKind::Quantum => {
                    self.timers.pop();
                    self.quantum_armed = false;
                    self.arm_task_timer();
                    return true;
                }
                TimerKind::Timeout(value) => {
                    self.timers.pop();
                    let msg = Message::TimerTimeout { timeout: top.timeout, value };
                    let receiver = self.config.timer_receiver;
                    if let Err(err) = tasks.send_message(receiver, msg) {
                        warn!("timer: timeout {} dropped: {}", value, err);
                    }
                }
                // Страж на u64::MAX недостижим.
                // The sentinel at u64::MAX is never reached.
                TimerKind::Never => break,
            }
        }
        false
    }

    fn push(&mut self, timeout: u64, kind: TimerKind) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.timers.push(Timer { timeout, seq, kind });
    }
}

// ── Источник тиков / Tick source ─────────────────────────────────────────────

/// Программирование 8254 PIT, канал 0. Порты пишет `arch::x86_64::idt`.
/// 8254 PIT programming, channel 0. `arch::x86_64::idt` writes the ports.
pub mod pit {
    /// Входная частота / Input clock
    pub const INPUT_HZ: u64 = 1_193_182;

    /// Канал 0, lo/hi байт, режим 2 (rate generator), двоичный счёт.
    /// Channel 0, lobyte/hibyte, mode 2 (rate generator), binary count.
    pub const RATE_GENERATOR: u8 = 0b00_11_010_0;

    /// Делитель для частоты `freq`, в пределах 16-битного счётчика.
    /// Divisor for `freq`, clamped to the 16-bit counter.
    pub const fn divisor(freq: u64) -> u16 {
        let div = INPUT_HZ / if freq == 0 { 1 } else { freq };
        if div == 0 {
            1
        } else if div > u16::MAX as u64 {
            u16::MAX
        } else {
            div as u16
        }
    }
}

// ── Глобальный таймер / Global timer ─────────────────────────────────────────

/// Менеджер таймеров ядра. Создаётся один раз в `init()`, до `sti`.
/// The kernel timer manager. Created once by `init()`, before `sti`.
static TIMER_MANAGER: Once<IrqLock<TimerManager>> = Once::new();

pub fn init() {
    init_with(SchedConfig::default());
}

pub fn init_with(config: SchedConfig) {
    if TIMER_MANAGER.is_completed() {
        warn!("timer: already initialized");
        return;
    }
    TIMER_MANAGER.call_once(|| IrqLock::new(TimerManager::new(config)));
    debug!("timer: quantum {} ticks, timeouts to {}", config.quantum, config.timer_receiver);
}

pub(crate) fn manager() -> &'static IrqLock<TimerManager> {
    match TIMER_MANAGER.get() {
        Some(mgr) => mgr,
        None => panic!("timer: used before timer::init()"),
    }
}

/// Маскирует прерывания сам / Masks interrupts on its own
pub fn add_timer(timeout: u64, value: i32) {
    manager().lock().add_timer(timeout, value);
}

pub fn arm_task_timer() {
    manager().lock().arm_task_timer();
}

pub fn current_tick() -> u64 {
    manager().lock().current_tick()
}
