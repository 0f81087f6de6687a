//! Задача / Task
//!
//! Единица планирования: сохранённый контекст, собственный стек и
//! собственная очередь входящих сообщений.
//! A schedulable unit: saved context, private stack, private inbox.

use alloc::boxed::Box;
use alloc::vec::Vec;

use log::debug;

use super::context::{Context, RFlags, DEFAULT_FCW, DEFAULT_MXCSR};
use crate::arch;
use crate::config::DEFAULT_LEVEL;
use crate::error::{Error, Result};
use crate::ipc::{Inbox, Message, TaskId};

/// Точка входа задачи: `(task_id, data)` приходят в RDI и RSI.
/// Task entry point: `(task_id, data)` arrive in RDI and RSI.
///
/// Функция не должна возвращаться / The function must never return.
pub type TaskFunc = extern "C" fn(task_id: u64, data: i64);

/// Стек задачи. Никогда не меняет размер и не освобождается.
/// A task stack. Never resized, never freed.
pub struct TaskStack {
    words: Box<[u64]>,
}

impl TaskStack {
    pub fn len_bytes(&self) -> usize {
        self.words.len() * 8
    }

    pub fn base(&self) -> u64 {
        self.words.as_ptr() as u64
    }

    /// Адрес сразу за последним словом / Address one past the last word
    pub fn end(&self) -> u64 {
        self.base() + self.len_bytes() as u64
    }
}

/// Поставщик памяти под стеки задач.
/// Supplier of task stack memory.
pub trait StackAllocator {
    fn allocate(&mut self, bytes: usize) -> Result<TaskStack>;
}

/// Стеки из кучи ядра с проверкой нехватки памяти.
/// Stacks from the kernel heap, with out-of-memory checking.
pub struct HeapStacks;

impl StackAllocator for HeapStacks {
    fn allocate(&mut self, bytes: usize) -> Result<TaskStack> {
        let words_len = bytes.div_ceil(8);
        let mut words = Vec::new();
        words
            .try_reserve_exact(words_len)
            .map_err(|_| Error::AllocationFailure { bytes })?;
        words.resize(words_len, 0u64);
        Ok(TaskStack { words: words.into_boxed_slice() })
    }
}

pub struct Task {
    id: TaskId,
    level: usize,
    running: bool,
    stack_bytes: usize,
    stack: Option<TaskStack>,
    context: Context,
    inbox: Inbox,
}

impl Task {
    pub(crate) fn new(id: TaskId, stack_bytes: usize) -> Self {
        Self {
            id,
            level: DEFAULT_LEVEL,
            running: false,
            stack_bytes,
            stack: None,
            context: Context::zeroed(),
            inbox: Inbox::new(),
        }
    }

    /// Подготовить контекст для первого запуска `f(id, data)` на новом
    /// стеке из кучи. Вызвать до первого `wakeup`.
    /// Prepare the context for a first run of `f(id, data)` on a fresh heap
    /// stack. Call before the first `wakeup`.
    pub fn init_context(&mut self, f: TaskFunc, data: i64) -> Result<&mut Self> {
        self.init_context_in(f, data, &mut HeapStacks)
    }

    pub fn init_context_in(
        &mut self,
        f: TaskFunc,
        data: i64,
        stacks: &mut dyn StackAllocator,
    ) -> Result<&mut Self> {
        let mut stack = stacks.allocate(self.stack_bytes)?;

        // RSP ≡ 8 (mod 16): так выглядит стек сразу после `call`, чего и
        // ждёт пролог функции по SysV. В слот адреса возврата кладём
        // ловушку на случай, если функция всё же вернётся.
        // RSP ≡ 8 (mod 16): what a function prologue expects right after a
        // SysV `call`. The return-address slot holds a trap in case the
        // function returns after all.
        let rsp = (stack.end() & !0xF) - 8;
        let slot = ((rsp - stack.base()) / 8) as usize;
        stack.words[slot] = arch::task_return_trap();

        let mut ctx = Context::zeroed();
        ctx.rip = f as usize as u64;
        ctx.rdi = self.id.as_u64();
        ctx.rsi = data as u64;
        ctx.cr3 = arch::read_cr3();
        ctx.rflags = (RFlags::INTERRUPT_ENABLE | RFlags::RESERVED_1).bits();
        ctx.cs = u64::from(arch::KERNEL_CODE);
        ctx.ss = u64::from(arch::KERNEL_DATA);
        ctx.rsp = rsp;
        ctx.set_fcw(DEFAULT_FCW);
        ctx.set_mxcsr(DEFAULT_MXCSR);
        self.context = ctx;
        self.stack = Some(stack);

        debug!("task {} context: rip={:#x} rsp={:#x}", self.id, self.context.rip, rsp);
        Ok(self)
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn level(&self) -> usize {
        self.level
    }

    /// Стоит ли задача в какой-либо очереди готовых.
    /// Whether the task sits in some ready queue.
    pub fn running(&self) -> bool {
        self.running
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub(crate) fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    pub fn stack(&self) -> Option<&TaskStack> {
        self.stack.as_ref()
    }

    /// Верх собственного стека; `None` у main-задачи, которая живёт на
    /// загрузочном стеке. Top of the own stack; `None` for the main task,
    /// which lives on the boot stack.
    pub fn stack_top(&self) -> Option<u64> {
        self.stack.as_ref().map(TaskStack::end)
    }

    pub(crate) fn set_level(&mut self, level: usize) -> &mut Self {
        self.level = level;
        self
    }

    pub(crate) fn set_running(&mut self, running: bool) -> &mut Self {
        self.running = running;
        self
    }

    /// Только положить в очередь. Пробуждение — `TaskManager::send_message`.
    /// Enqueue only. Waking is `TaskManager::send_message`.
    pub(crate) fn push_message(&mut self, msg: Message) {
        self.inbox.push(msg);
    }

    /// Самое старое сообщение или `None`; не блокирует. При `None` вызывающий
    /// сам засыпает и после пробуждения проверяет снова.
    /// Oldest message or `None`; never blocks. On `None` the caller sleeps
    /// on its own and re-checks after waking.
    pub fn receive_message(&mut self) -> Option<Message> {
        self.inbox.pop()
    }

    pub fn pending_messages(&self) -> usize {
        self.inbox.len()
    }
}

/// Куда попадает задача, вернувшаяся из точки входа (через
/// `arch::task_return_trap`).
/// Where a task that returns from its entry point lands (through
/// `arch::task_return_trap`).
pub(crate) extern "C" fn task_returned() -> ! {
    panic!("task returned from its entry function");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_STACK_BYTES;

    extern "C" fn entry(_task_id: u64, _data: i64) {}

    struct NoMemory;

    impl StackAllocator for NoMemory {
        fn allocate(&mut self, bytes: usize) -> Result<TaskStack> {
            Err(Error::AllocationFailure { bytes })
        }
    }

    #[test]
    fn init_context_prepares_first_run() {
        let mut task = Task::new(TaskId(4), DEFAULT_STACK_BYTES);
        task.init_context(entry, -9).unwrap();

        let ctx = task.context();
        assert_eq!(ctx.rip, entry as usize as u64);
        assert_eq!(ctx.rdi, 4);
        assert_eq!(ctx.rsi, -9i64 as u64);
        assert_eq!(ctx.rflags, 0x202);
        assert_eq!(ctx.cs, u64::from(arch::KERNEL_CODE));
        assert_eq!(ctx.ss, u64::from(arch::KERNEL_DATA));
        assert_eq!(ctx.mxcsr(), 0x1F80);
        assert_eq!(ctx.fcw(), 0x037F);

        let stack = task.stack().unwrap();
        assert_eq!(stack.len_bytes(), DEFAULT_STACK_BYTES);
        assert_eq!(ctx.rsp % 16, 8);
        assert!(ctx.rsp >= stack.base() && ctx.rsp < stack.end());
        assert!(stack.end() - ctx.rsp < 32);
        assert_eq!(task.stack_top(), Some(stack.end()));

        let slot = ((ctx.rsp - stack.base()) / 8) as usize;
        assert_eq!(stack.words[slot], arch::task_return_trap());
    }

    #[test]
    fn stack_allocation_failure_is_reported() {
        let mut task = Task::new(TaskId(2), DEFAULT_STACK_BYTES);
        let err = task.init_context_in(entry, 0, &mut NoMemory).err();
        assert_eq!(err, Some(Error::AllocationFailure { bytes: DEFAULT_STACK_BYTES }));
        assert!(task.stack().is_none());
        assert_eq!(task.context().rip, 0);
    }

    #[test]
    fn new_task_sleeps_at_default_level() {
        let task = Task::new(TaskId(9), 4096);
        assert!(!task.running());
        assert_eq!(task.level(), DEFAULT_LEVEL);
        assert_eq!(task.pending_messages(), 0);
    }
}
