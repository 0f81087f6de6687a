//! Сценарии планировщика на хосте / Host-side scheduler scenarios
//!
//! Менеджер задач, таймер и диспетчер прерываний собираются вместе так же,
//! как в ядре, только тики подаются вручную и переключение контекста —
//! лишь учёт в очередях.
//! The task manager, timer and interrupt dispatch are wired together as in
//! the kernel, except ticks are fed by hand and a context switch is queue
//! bookkeeping only.

use kairos::config::SchedConfig;
use kairos::ipc::{Device, Message, TaskId};
use kairos::irq;
use kairos::sched::TaskManager;
use kairos::timer::TimerManager;

const MAIN: TaskId = TaskId(1);

extern "C" fn worker(_task_id: u64, _data: i64) {}

fn config() -> SchedConfig {
    SchedConfig { quantum: 2, stack_bytes: 4096, timer_receiver: MAIN }
}

struct Machine {
    tasks: TaskManager,
    timer: TimerManager,
    acks: usize,
}

impl Machine {
    fn boot() -> Self {
        let tasks = TaskManager::new(config()).expect("task manager");
        let mut timer = TimerManager::new(config());
        timer.arm_task_timer();
        Self { tasks, timer, acks: 0 }
    }

    fn spawn(&mut self, level: usize) -> TaskId {
        let id = self.tasks.new_task().init_context(worker, 0).expect("stack").id();
        self.tasks.wakeup(id, Some(level)).expect("wakeup");
        id
    }

    /// Один тик; возвращает текущую задачу после него.
    /// One tick; returns the current task afterwards.
    fn tick(&mut self) -> TaskId {
        let acks = &mut self.acks;
        let handoff = irq::on_timer(&mut self.timer, &mut self.tasks, || *acks += 1);
        if let Some(handoff) = handoff {
            assert_eq!(handoff.to(), self.tasks.current_task_id());
        }
        self.tasks.current_task_id()
    }

    /// Текущая задача на каждом кванте / Current task at every quantum
    fn run_quanta(&mut self, quanta: usize) -> Vec<TaskId> {
        (0..quanta)
            .map(|_| {
                self.tick();
                self.tick()
            })
            .collect()
    }
}

#[test]
fn quantum_rotates_tasks_of_one_level() {
    let mut m = Machine::boot();
    let a = m.spawn(1);
    let b = m.spawn(1);
    let c = m.spawn(1);
    drop(m.tasks.sleep(MAIN).expect("sleep main"));
    assert_eq!(m.tasks.current_task_id(), a);

    assert_eq!(m.run_quanta(6), [b, c, a, b, c, a]);
    assert_eq!(m.acks, 12);
}

#[test]
fn higher_level_runs_until_it_sleeps() {
    let mut m = Machine::boot();
    let low1 = m.spawn(1);
    let low2 = m.spawn(1);
    let high = m.spawn(2);
    drop(m.tasks.sleep(MAIN).expect("sleep main"));

    assert_eq!(m.run_quanta(3), [high, high, high]);
    drop(m.tasks.sleep(high).expect("sleep high"));
    assert_eq!(m.tasks.current_task_id(), low1);
    assert_eq!(m.run_quanta(4), [low2, low1, low2, low1]);
}

#[test]
fn timeout_wakes_main_which_preempts_at_next_quantum() {
    let mut m = Machine::boot();
    let a = m.spawn(1);
    drop(m.tasks.sleep(MAIN).expect("sleep main"));
    m.timer.add_timer(3, 9);

    assert_eq!(m.tick(), a);
    assert_eq!(m.tick(), a);
    assert_eq!(m.tick(), a);
    assert!(m.tasks.task(MAIN).expect("main").running());
    assert_eq!(m.tick(), MAIN);

    let main = m.tasks.current_task_mut();
    assert_eq!(main.receive_message(), Some(Message::TimerTimeout { timeout: 3, value: 9 }));
    assert_eq!(main.receive_message(), None);
}

#[test]
fn device_interrupt_wakes_sleeping_main() {
    let mut m = Machine::boot();
    drop(m.tasks.sleep(MAIN).expect("sleep main"));
    assert_eq!(m.tasks.current_task_id(), m.tasks.idle_task_id());

    let mut acked = false;
    irq::on_device(&mut m.tasks, MAIN, Device::Keyboard, || acked = true);
    assert!(acked);
    assert_eq!(m.run_quanta(1), [MAIN]);
    assert_eq!(
        m.tasks.current_task_mut().receive_message(),
        Some(Message::DeviceInterrupt(Device::Keyboard))
    );
}

#[test]
fn messages_keep_send_order_across_switches() {
    let mut m = Machine::boot();
    let a = m.spawn(1);
    drop(m.tasks.sleep(a).expect("sleep a"));
    for layer_id in 0..4 {
        m.tasks.send_message(a, Message::LayerFinish { layer_id }).expect("send");
        m.run_quanta(1);
    }

    let task = m.tasks.task_mut(a).expect("a");
    assert_eq!(task.pending_messages(), 4);
    let ids: Vec<u32> = std::iter::from_fn(|| task.receive_message())
        .map(|msg| match msg {
            Message::LayerFinish { layer_id } => layer_id,
            other => panic!("unexpected {:?}", other),
        })
        .collect();
    assert_eq!(ids, [0, 1, 2, 3]);
}
