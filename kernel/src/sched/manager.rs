//! Менеджер задач / Task manager
//!
//! Очереди готовых задач по уровням: строгий приоритет между уровнями,
//! round-robin внутри уровня. Текущая задача — голова очереди
//! `ready[current_level]`.
//!
//! Per-level ready queues: strict priority across levels, round-robin within
//! a level. The current task is the head of `ready[current_level]`.
//!
//! Ни один метод не маскирует прерывания сам: менеджер живёт за
//! `IrqLock`, а переключение (`Handoff`) выполняет вызывающий.
//! No method masks interrupts on its own: the manager lives behind an
//! `IrqLock` and the caller performs the switch (`Handoff`).

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, VecDeque};

use log::{debug, trace, warn};

use super::context::{Context, Handoff};
use super::task::{HeapStacks, StackAllocator, Task, TaskFunc};
use crate::config::{SchedConfig, MAX_LEVEL};
use crate::error::{Error, Result};
use crate::ipc::{Message, TaskId};

pub struct TaskManager {
    /// Все задачи; `Box` даёт контекстам стабильные адреса.
    /// Every task; `Box` keeps the contexts at stable addresses.
    tasks: BTreeMap<TaskId, Box<Task>>,
    latest_id: u64,
    ready: [VecDeque<TaskId>; MAX_LEVEL + 1],
    current_level: usize,
    /// Пересчитать `current_level` при следующем переключении.
    /// Re-evaluate `current_level` at the next switch.
    level_changed: bool,
    main: TaskId,
    idle: TaskId,
    config: SchedConfig,
}

impl TaskManager {
    /// Принять текущий поток исполнения как main-задачу (уровень
    /// `MAX_LEVEL`, без нового контекста) и создать задачу простоя.
    /// Adopt the running flow of control as the main task (level
    /// `MAX_LEVEL`, no fresh context) and create the idle task.
    pub fn new(config: SchedConfig) -> Result<Self> {
        let mut mgr = Self {
            tasks: BTreeMap::new(),
            latest_id: 0,
            ready: core::array::from_fn(|_| VecDeque::new()),
            current_level: MAX_LEVEL,
            level_changed: false,
            main: TaskId(0),
            idle: TaskId(0),
            config,
        };

        let main = mgr.new_task();
        main.set_level(MAX_LEVEL).set_running(true);
        let main = main.id();
        mgr.ready[MAX_LEVEL].push_back(main);
        mgr.main = main;

        let idle = mgr.new_task();
        idle.init_context(super::task_idle, 0)?;
        idle.set_level(0).set_running(true);
        let idle = idle.id();
        mgr.ready[0].push_back(idle);
        mgr.idle = idle;

        debug!("task manager ready: main {}, idle {}", main, idle);
        Ok(mgr)
    }

    pub fn config(&self) -> &SchedConfig {
        &self.config
    }

    /// Новая спящая задача уровня по умолчанию. Перед `wakeup` нужен
    /// `init_context`. A new sleeping task at the default level.
    /// `init_context` must precede `wakeup`.
    pub fn new_task(&mut self) -> &mut Task {
        self.latest_id += 1;
        let id = TaskId(self.latest_id);
        self.tasks
            .entry(id)
            .or_insert_with(|| Box::new(Task::new(id, self.config.stack_bytes)))
    }

    /// Создать задачу `f(id, data)` и разбудить её на уровне `level`.
    /// Задача попадает в менеджер только целиком готовой: при ошибке не
    /// остаётся ни записи, ни занятого id.
    /// Create a task running `f(id, data)` and wake it at `level`. The task
    /// joins the manager only once fully prepared: a failure leaves neither
    /// an entry nor a spent id behind.
    pub fn spawn(&mut self, f: TaskFunc, data: i64, level: usize) -> Result<TaskId> {
        self.spawn_in(f, data, level, &mut HeapStacks)
    }

    pub fn spawn_in(
        &mut self,
        f: TaskFunc,
        data: i64,
        level: usize,
        stacks: &mut dyn StackAllocator,
    ) -> Result<TaskId> {
        check_level(level)?;
        let id = TaskId(self.latest_id + 1);
        let mut task = Box::new(Task::new(id, self.config.stack_bytes));
        task.init_context_in(f, data, stacks)?;

        self.latest_id = id.as_u64();
        self.tasks.insert(id, task);
        self.wakeup(id, Some(level))?;
        Ok(id)
    }

    pub fn task(&self, id: TaskId) -> Result<&Task> {
        self.tasks.get(&id).map(|task| &**task).ok_or(Error::NoSuchTask(id))
    }

    pub fn task_mut(&mut self, id: TaskId) -> Result<&mut Task> {
        self.tasks.get_mut(&id).map(|task| &mut **task).ok_or(Error::NoSuchTask(id))
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values().map(|task| &**task)
    }

    pub fn current_task_id(&self) -> TaskId {
        match self.ready[self.current_level].front() {
            Some(&id) => id,
            None => panic!("queue inconsistency: level {} has no current task", self.current_level),
        }
    }

    pub fn current_task(&self) -> &Task {
        self.queued(self.current_task_id())
    }

    pub fn current_task_mut(&mut self) -> &mut Task {
        let id = self.current_task_id();
        self.queued_mut(id)
    }

    pub fn main_task_id(&self) -> TaskId {
        self.main
    }

    pub fn idle_task_id(&self) -> TaskId {
        self.idle
    }

    pub fn current_level(&self) -> usize {
        self.current_level
    }

    /// Очередь готовых задач уровня; `None` вне `0..=MAX_LEVEL`.
    /// The ready queue of a level; `None` outside `0..=MAX_LEVEL`.
    pub fn ready_queue(&self, level: usize) -> Option<&VecDeque<TaskId>> {
        self.ready.get(level)
    }

    /// Переместить текущую задачу в хвост её очереди и выбрать следующую.
    /// Move the current task to the tail of its queue and pick the next one.
    pub fn switch_task(&mut self) -> Option<Handoff> {
        let (from, to) = self.rotate_current_task(false);
        self.handoff(from, to)
    }

    /// Усыпить задачу. Текущая задача сначала уступает процессор.
    /// Put a task to sleep. The current task yields the processor first.
    pub fn sleep(&mut self, id: TaskId) -> Result<Option<Handoff>> {
        let task = self.task_mut(id)?;
        if !task.running() {
            return Ok(None);
        }
        let level = task.level();
        if id == self.idle {
            warn!("idle task {} cannot sleep", id);
            return Ok(None);
        }

        self.queued_mut(id).set_running(false);
        if id == self.current_task_id() {
            let (from, to) = self.rotate_current_task(true);
            trace!("task {} sleeps, {} runs", from, to);
            return Ok(self.handoff(from, to));
        }

        self.erase(level, id);
        trace!("task {} sleeps", id);
        Ok(None)
    }

    /// Разбудить задачу. `None` оставляет её уровень; для уже готовой
    /// задачи это смена уровня (или ничего).
    /// Wake a task. `None` keeps its level; for an already ready task this
    /// is a level change (or nothing).
    pub fn wakeup(&mut self, id: TaskId, level: Option<usize>) -> Result<()> {
        if let Some(level) = level {
            check_level(level)?;
        }
        let task = self.task_mut(id)?;
        if task.running() {
            return match level {
                Some(level) => self.change_level_running(id, level),
                None => Ok(()),
            };
        }

        let level = level.unwrap_or(task.level());
        task.set_level(level).set_running(true);
        self.ready[level].push_back(id);
        if level > self.current_level {
            self.level_changed = true;
        }
        trace!("task {} woken at level {}", id, level);
        Ok(())
    }

    /// Сменить уровень задачи. Готовая задача встаёт в хвост новой
    /// очереди; текущая — в голову, и `current_level` следует за ней.
    /// Спящей задаче меняется только поле, оно сработает при пробуждении.
    ///
    /// Change a task's level. A ready task joins the tail of the new queue;
    /// the current task joins its head and `current_level` follows it. A
    /// sleeping task only has its field updated, effective at wakeup.
    pub fn change_level_running(&mut self, id: TaskId, level: usize) -> Result<()> {
        check_level(level)?;
        let idle = self.idle;
        let task = self.task_mut(id)?;
        let old = task.level();
        if level == old {
            return Ok(());
        }
        if id == idle {
            warn!("idle task {} stays at level {}", id, old);
            return Ok(());
        }
        if !task.running() {
            task.set_level(level);
            return Ok(());
        }

        if id != self.current_task_id() {
            self.erase(old, id);
            self.ready[level].push_back(id);
            self.queued_mut(id).set_level(level);
            if level > self.current_level {
                self.level_changed = true;
            }
            debug!("task {} moved from level {} to {}", id, old, level);
            return Ok(());
        }

        self.ready[self.current_level].pop_front();
        self.ready[level].push_front(id);
        self.queued_mut(id).set_level(level);
        if level < self.current_level {
            self.level_changed = true;
        }
        self.current_level = level;
        debug!("current task {} moved from level {} to {}", id, old, level);
        Ok(())
    }

    /// Положить сообщение во входящие и разбудить получателя.
    /// Безопасно в контексте прерывания.
    /// Enqueue a message and wake the receiver. Safe in interrupt context.
    pub fn send_message(&mut self, id: TaskId, msg: Message) -> Result<()> {
        self.task_mut(id)?.push_message(msg);
        self.wakeup(id, None)
    }

    // ── Внутреннее / Internals ───────────────────────────────────────────────

    /// Возвращает (прежняя текущая, новая текущая).
    /// Returns (previous current, new current).
    fn rotate_current_task(&mut self, current_sleep: bool) -> (TaskId, TaskId) {
        let level = self.current_level;
        let current = match self.ready[level].pop_front() {
            Some(id) => id,
            None => panic!("queue inconsistency: level {} has no current task", level),
        };
        if !current_sleep {
            self.ready[level].push_back(current);
        }
        if self.ready[level].is_empty() {
            self.level_changed = true;
        }

        if self.level_changed {
            self.level_changed = false;
            if let Some(top) = (0..=MAX_LEVEL).rev().find(|&lv| !self.ready[lv].is_empty()) {
                self.current_level = top;
            }
        }

        (current, self.current_task_id())
    }

    fn handoff(&mut self, from: TaskId, to: TaskId) -> Option<Handoff> {
        if from == to {
            return None;
        }
        let current: *mut Context = self.queued_mut(from).context_mut();
        let next: *const Context = self.queued(to).context();
        Some(Handoff::new(from, to, current, next))
    }

    fn erase(&mut self, level: usize, id: TaskId) {
        let queue = &mut self.ready[level];
        match queue.iter().position(|&queued| queued == id) {
            Some(pos) => {
                queue.remove(pos);
            }
            None => panic!("queue inconsistency: task {} is not in ready queue {}", id, level),
        }
    }

    /// Задача, известная по очереди, обязана существовать.
    /// A task known from a queue must exist.
    fn queued(&self, id: TaskId) -> &Task {
        match self.tasks.get(&id) {
            Some(task) => &**task,
            None => panic!("queue inconsistency: task {} is queued but unknown", id),
        }
    }

    fn queued_mut(&mut self, id: TaskId) -> &mut Task {
        match self.tasks.get_mut(&id) {
            Some(task) => &mut **task,
            None => panic!("queue inconsistency: task {} is queued but unknown", id),
        }
    }
}

fn check_level(level: usize) -> Result<usize> {
    if level > MAX_LEVEL {
        return Err(Error::InvalidLevel(level));
    }
    Ok(level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    extern "C" fn noop(_task_id: u64, _data: i64) {}

    fn manager() -> TaskManager {
        TaskManager::new(SchedConfig { stack_bytes: 4096, ..SchedConfig::default() }).unwrap()
    }

    fn spawn(mgr: &mut TaskManager, level: usize) -> TaskId {
        let id = mgr.new_task().init_context(noop, 0).unwrap().id();
        mgr.wakeup(id, Some(level)).unwrap();
        id
    }

    fn queue(mgr: &TaskManager, level: usize) -> Vec<TaskId> {
        mgr.ready_queue(level).unwrap().iter().copied().collect()
    }

    fn switch(mgr: &mut TaskManager) -> TaskId {
        if let Some(handoff) = mgr.switch_task() {
            assert_ne!(handoff.from(), handoff.to());
        }
        mgr.current_task_id()
    }

    /// Каждая задача ровно в одной очереди (своего уровня) iff running.
    /// Every task is in exactly one queue (its own level's) iff running.
    fn assert_consistent(mgr: &TaskManager) {
        for task in mgr.tasks() {
            let hits: Vec<usize> = (0..=MAX_LEVEL)
                .filter(|&lv| queue(mgr, lv).contains(&task.id()))
                .collect();
            if task.running() {
                assert_eq!(hits, [task.level()], "task {}", task.id());
            } else {
                assert!(hits.is_empty(), "sleeping task {} is queued", task.id());
            }
        }
        let top = (0..=MAX_LEVEL).rev().find(|&lv| !queue(mgr, lv).is_empty());
        assert!(top.is_some());
    }

    #[test]
    fn bootstrap_adopts_main_and_creates_idle() {
        let mgr = manager();
        assert_eq!(mgr.current_task_id(), TaskId(1));
        assert_eq!(mgr.main_task_id(), TaskId(1));
        assert_eq!(mgr.idle_task_id(), TaskId(2));
        assert_eq!(mgr.current_level(), MAX_LEVEL);
        assert_eq!(queue(&mgr, MAX_LEVEL), [TaskId(1)]);
        assert_eq!(queue(&mgr, 0), [TaskId(2)]);

        let idle = mgr.task(TaskId(2)).unwrap();
        assert_eq!(idle.context().rip, super::super::task_idle as usize as u64);
        assert!(mgr.task(TaskId(1)).unwrap().stack().is_none());
        assert_consistent(&mgr);
    }

    #[test]
    fn ids_are_monotonic() {
        let mut mgr = manager();
        let a = mgr.new_task().id();
        let b = mgr.new_task().id();
        assert_eq!((a, b), (TaskId(3), TaskId(4)));
        assert!(!mgr.task(a).unwrap().running());
    }

    #[test]
    fn round_robin_within_a_level() {
        let mut mgr = manager();
        let a = spawn(&mut mgr, MAX_LEVEL);
        let b = spawn(&mut mgr, MAX_LEVEL);
        let order: Vec<TaskId> = (0..6).map(|_| switch(&mut mgr)).collect();
        assert_eq!(order, [a, b, TaskId(1), a, b, TaskId(1)]);
        assert_consistent(&mgr);
    }

    #[test]
    fn higher_level_monopolizes_until_it_sleeps() {
        let mut mgr = manager();
        let low1 = spawn(&mut mgr, 1);
        let low2 = spawn(&mut mgr, 1);
        let high = spawn(&mut mgr, 2);

        let handoff = mgr.sleep(TaskId(1)).unwrap().unwrap();
        assert_eq!((handoff.from(), handoff.to()), (TaskId(1), high));
        for _ in 0..4 {
            assert_eq!(switch(&mut mgr), high);
        }

        mgr.sleep(high).unwrap();
        let order: Vec<TaskId> = (0..4).map(|_| switch(&mut mgr)).collect();
        assert_eq!(mgr.current_level(), 1);
        assert_eq!(order, [low2, low1, low2, low1]);
        assert_consistent(&mgr);
    }

    #[test]
    fn message_wakes_sleeping_task() {
        let mut mgr = manager();
        let a = spawn(&mut mgr, 1);
        assert_eq!(mgr.sleep(a).unwrap().map(|h| h.to()), None);
        mgr.sleep(TaskId(1)).unwrap();
        assert_eq!(mgr.current_task_id(), mgr.idle_task_id());

        let msg = Message::TimerTimeout { timeout: 42, value: 7 };
        mgr.send_message(a, msg).unwrap();
        assert!(mgr.task(a).unwrap().running());
        assert_eq!(switch(&mut mgr), a);

        let task = mgr.current_task_mut();
        assert_eq!(task.receive_message(), Some(msg));
        assert_eq!(task.receive_message(), None);
        assert_consistent(&mgr);
    }

    #[test]
    fn repeated_wakeup_and_sleep_are_no_ops() {
        let mut mgr = manager();
        let a = spawn(&mut mgr, MAX_LEVEL);
        let b = spawn(&mut mgr, MAX_LEVEL);
        mgr.wakeup(a, None).unwrap();
        mgr.wakeup(a, Some(MAX_LEVEL)).unwrap();
        assert_eq!(queue(&mgr, MAX_LEVEL), [TaskId(1), a, b]);

        mgr.sleep(b).unwrap();
        assert!(mgr.sleep(b).unwrap().is_none());
        assert_eq!(queue(&mgr, MAX_LEVEL), [TaskId(1), a]);
        assert_consistent(&mgr);
    }

    #[test]
    fn unknown_ids_and_levels_are_rejected() {
        let mut mgr = manager();
        let ghost = TaskId(99);
        assert_eq!(mgr.sleep(ghost).err(), Some(Error::NoSuchTask(ghost)));
        assert_eq!(mgr.wakeup(ghost, None), Err(Error::NoSuchTask(ghost)));
        assert_eq!(mgr.send_message(ghost, Message::LayerFinish { layer_id: 1 }), Err(Error::NoSuchTask(ghost)));
        assert_eq!(mgr.wakeup(TaskId(1), Some(MAX_LEVEL + 1)), Err(Error::InvalidLevel(MAX_LEVEL + 1)));
        assert_eq!(mgr.change_level_running(TaskId(1), 9), Err(Error::InvalidLevel(9)));
        assert_consistent(&mgr);
    }

    #[test]
    fn raising_another_task_takes_effect_at_next_switch() {
        let mut mgr = manager();
        mgr.change_level_running(TaskId(1), 1).unwrap();
        let a = spawn(&mut mgr, 1);
        let b = spawn(&mut mgr, 1);
        assert_eq!(mgr.current_task_id(), TaskId(1));

        mgr.change_level_running(b, 2).unwrap();
        assert_eq!(queue(&mgr, 1), [TaskId(1), a]);
        assert_eq!(queue(&mgr, 2), [b]);
        assert_eq!(mgr.current_task_id(), TaskId(1));
        assert_eq!(switch(&mut mgr), b);
        assert_consistent(&mgr);
    }

    #[test]
    fn lowering_self_keeps_running_until_next_switch() {
        let mut mgr = manager();
        let mid = spawn(&mut mgr, 2);
        let low = spawn(&mut mgr, 1);

        mgr.change_level_running(TaskId(1), 1).unwrap();
        assert_eq!(mgr.current_level(), 1);
        assert_eq!(mgr.current_task_id(), TaskId(1));
        assert_eq!(queue(&mgr, 1), [TaskId(1), low]);

        assert_eq!(switch(&mut mgr), mid);
        assert_eq!(queue(&mgr, 1), [low, TaskId(1)]);
        assert_consistent(&mgr);
    }

    #[test]
    fn raising_self_moves_current_level_up() {
        let mut mgr = manager();
        mgr.change_level_running(TaskId(1), 1).unwrap();
        let a = spawn(&mut mgr, 1);
        mgr.change_level_running(TaskId(1), 2).unwrap();
        assert_eq!(mgr.current_level(), 2);
        assert_eq!(queue(&mgr, 2), [TaskId(1)]);
        assert_eq!(queue(&mgr, 1), [a]);
        assert_eq!(switch(&mut mgr), TaskId(1));
        assert_consistent(&mgr);
    }

    #[test]
    fn idle_task_never_sleeps_or_moves() {
        let mut mgr = manager();
        let idle = mgr.idle_task_id();
        assert!(mgr.sleep(idle).unwrap().is_none());
        mgr.change_level_running(idle, 2).unwrap();
        mgr.wakeup(idle, Some(1)).unwrap();
        let task = mgr.task(idle).unwrap();
        assert!(task.running());
        assert_eq!(task.level(), 0);
        assert_eq!(queue(&mgr, 0), [idle]);
    }

    #[test]
    fn sleeping_task_level_applies_at_wakeup() {
        let mut mgr = manager();
        let a = spawn(&mut mgr, 1);
        mgr.sleep(a).unwrap();
        mgr.change_level_running(a, 2).unwrap();
        assert!(queue(&mgr, 2).is_empty());
        mgr.wakeup(a, None).unwrap();
        assert_eq!(queue(&mgr, 2), [a]);
        assert_consistent(&mgr);
    }

    #[test]
    fn current_task_sleeping_alone_falls_back_to_idle() {
        let mut mgr = manager();
        let handoff = mgr.sleep(TaskId(1)).unwrap().unwrap();
        assert_eq!(handoff.to(), mgr.idle_task_id());
        assert_eq!(mgr.current_level(), 0);
        assert_eq!(switch(&mut mgr), mgr.idle_task_id());

        mgr.wakeup(TaskId(1), None).unwrap();
        assert_eq!(switch(&mut mgr), TaskId(1));
        assert_eq!(mgr.current_level(), MAX_LEVEL);
    }

    #[test]
    fn spawn_wakes_a_prepared_task() {
        let mut mgr = manager();
        let id = mgr.spawn(noop, 11, 2).unwrap();
        assert_eq!(id, TaskId(3));
        let task = mgr.task(id).unwrap();
        assert!(task.running());
        assert_eq!(task.level(), 2);
        assert_eq!(task.context().rsi, 11);
        assert_eq!(queue(&mgr, 2), [id]);
    }

    use crate::sched::TaskStack;

    struct NoMemory;

    impl StackAllocator for NoMemory {
        fn allocate(&mut self, bytes: usize) -> Result<TaskStack> {
            Err(Error::AllocationFailure { bytes })
        }
    }

    #[test]
    fn failed_spawn_leaves_no_task_behind() {
        let mut mgr = manager();
        assert_eq!(mgr.spawn(noop, 0, MAX_LEVEL + 1), Err(Error::InvalidLevel(MAX_LEVEL + 1)));
        assert_eq!(
            mgr.spawn_in(noop, 0, 1, &mut NoMemory),
            Err(Error::AllocationFailure { bytes: 4096 })
        );
        assert_eq!(mgr.tasks().count(), 2);
        assert_consistent(&mgr);

        // id не расходуется / the id is not spent
        assert_eq!(mgr.spawn(noop, 0, 1).unwrap(), TaskId(3));
    }

    #[test]
    fn random_sleep_wakeup_keeps_queues_consistent() {
        let mut mgr = manager();
        let ids: Vec<TaskId> = (0..6).map(|i| spawn(&mut mgr, i % (MAX_LEVEL + 1))).collect();

        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        for _ in 0..500 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let id = ids[(seed >> 33) as usize % ids.len()];
            match (seed >> 20) % 4 {
                0 => drop(mgr.sleep(id).unwrap()),
                1 => mgr.wakeup(id, None).unwrap(),
                2 => mgr.change_level_running(id, (seed >> 40) as usize % (MAX_LEVEL + 1)).unwrap(),
                _ => drop(mgr.switch_task()),
            }
            assert_consistent(&mgr);
            let current = mgr.current_task();
            assert!(current.running());
            assert_eq!(current.level(), mgr.current_level());
        }
    }
}
