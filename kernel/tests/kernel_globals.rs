//! Глобальные менеджеры ядра / Kernel-wide managers
//!
//! `sched` и `timer` держат по одному менеджеру на процесс, поэтому весь
//! сценарий собран в одном тесте этого файла.
//! `sched` and `timer` hold one manager per process, so the whole scenario
//! lives in the single test of this file.

use std::sync::atomic::{AtomicUsize, Ordering};

use kairos::arch::interrupts;
use kairos::config::{SchedConfig, MAIN_TASK_ID};
use kairos::ipc::{Device, Message, TaskId};
use kairos::{irq, sched, timer, Error};

extern "C" fn worker_entry(_task_id: u64, _data: i64) {}

static ACKS: AtomicUsize = AtomicUsize::new(0);

fn ack() {
    ACKS.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn global_handles_route_interrupts_and_messages() {
    let config = SchedConfig { stack_bytes: 8192, ..SchedConfig::default() };
    assert!(!sched::is_initialized());
    timer::init_with(config);
    sched::init_with(config).expect("sched init");
    sched::init().expect("second init is ignored");
    timer::init();

    assert_eq!(sched::current_task_id(), MAIN_TASK_ID);
    let idle = sched::idle_task_id();
    let before = sched::with_tasks(|tasks| tasks.tasks().count());
    assert_eq!(sched::new_task(worker_entry, 0, 9), Err(Error::InvalidLevel(9)));
    assert_eq!(sched::with_tasks(|tasks| tasks.tasks().count()), before);

    let worker = sched::new_task(worker_entry, 5, 1).expect("worker");
    assert_eq!(worker, TaskId(3));
    assert_ne!(worker, idle);
    sched::with_tasks(|tasks| {
        let task = tasks.task(worker).expect("worker task");
        assert!(task.running());
        assert_eq!(task.context().rsi, 5);
    });

    // Таймаут приходит main-задаче / A timeout reaches the main task
    timer::add_timer(1, 4);
    irq::timer_interrupt(ack);
    assert_eq!(timer::current_tick(), 1);
    assert_eq!(ACKS.load(Ordering::SeqCst), 1);
    assert_eq!(sched::receive_message(), Some(Message::TimerTimeout { timeout: 1, value: 4 }));
    assert_eq!(sched::receive_message(), None);

    // Квант истёк, но main одна на своём уровне.
    // The quantum expired, but main is alone on its level.
    timer::arm_task_timer();
    for _ in 0..config.quantum {
        irq::timer_interrupt(ack);
    }
    assert_eq!(sched::current_task_id(), MAIN_TASK_ID);

    irq::device_interrupt(Device::Keyboard, ack);
    assert_eq!(sched::wait_message(), Message::DeviceInterrupt(Device::Keyboard));

    sched::send_message(worker, Message::LayerFinish { layer_id: 2 }).expect("send");
    assert_eq!(
        sched::send_message(TaskId(99), Message::LayerFinish { layer_id: 2 }),
        Err(Error::NoSuchTask(TaskId(99)))
    );

    sched::sleep(worker).expect("sleep worker");
    sched::with_tasks(|tasks| assert!(!tasks.task(worker).expect("worker task").running()));
    sched::wakeup(worker, Some(2)).expect("wakeup worker");
    assert_eq!(sched::change_level(worker, 9), Err(Error::InvalidLevel(9)));
    sched::with_tasks(|tasks| {
        assert_eq!(tasks.task(worker).expect("worker task").level(), 2);
        assert_eq!(tasks.task(worker).expect("worker task").pending_messages(), 1);
    });

    assert!(interrupts::are_enabled());
}
