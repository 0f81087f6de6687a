//! Kairos Kernel — точка входа / entry point
//!
//! Образ ядра собирается под `x86_64-unknown-none` и грузится Limine.
//! На хосте бинарник — заглушка; ядро проверяется тестами библиотеки.
//! The kernel image is built for `x86_64-unknown-none` and loaded by Limine.
//! On the host the binary is a stub; the kernel is exercised by the library
//! tests.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]
#![deny(unsafe_op_in_unsafe_fn)]

#[cfg(not(target_os = "none"))]
fn main() {
    eprintln!("kairos: build the kernel image with --target x86_64-unknown-none");
}

#[cfg(target_os = "none")]
use core::panic::PanicInfo;

#[cfg(target_os = "none")]
use kairos::drivers::keyboard::{self, Keyboard};
#[cfg(target_os = "none")]
use kairos::drivers::uart;
#[cfg(target_os = "none")]
use kairos::ipc::{Device, LayerOperation, Message, TaskId};
#[cfg(target_os = "none")]
use kairos::{arch, config, kprint, kprintln, logger, mm, sched, timer};
#[cfg(target_os = "none")]
use log::{debug, info, trace, warn};

/// Значение таймера мигания курсора / Cursor blink timer value
#[cfg(target_os = "none")]
const CURSOR_TIMER: i32 = 1;

/// Слой окна терминала / Terminal window layer
#[cfg(target_os = "none")]
const TERMINAL_LAYER: u32 = 1;

/// Точка входа ядра — вызывается из `_start` на загрузочном стеке.
/// Kernel entry point, called from `_start` on the boot stack.
#[cfg(target_os = "none")]
#[no_mangle]
pub extern "C" fn kernel_main() -> ! {
    // 0. UART первым делом / UART first of all
    uart::init();
    kprintln!("Kairos booting...");
    logger::init();

    if !arch::x86_64::boot::base_revision_supported() {
        panic!("Limine base revision is not supported by the bootloader");
    }

    // 1. GDT + IDT + PIC + FPU
    arch::init();
    info!("arch: GDT, IDT, PIC ready");

    // 2. Куча — после этого работают Box и Vec / Box and Vec work after this
    mm::heap::init();

    // 3. Таймеры и задачи / Timers and tasks
    timer::init();
    if let Err(err) = sched::init() {
        panic!("sched: {}", err);
    }
    timer::arm_task_timer();
    arch::x86_64::idt::start_timer();
    info!("timer: {} Hz, quantum {} ticks", config::TIMER_FREQ, config::TASK_TIMER_PERIOD);

    // 4. Демо-задачи / Demo tasks
    let terminal = match sched::new_task(task_terminal, 0, config::DEFAULT_LEVEL) {
        Ok(id) => id,
        Err(err) => panic!("terminal task: {}", err),
    };
    if let Err(err) = sched::new_task(task_counter, 0, config::DEFAULT_LEVEL) {
        panic!("counter task: {}", err);
    }

    kprintln!("Kairos ready: main {}, terminal {}", sched::current_task_id(), terminal);
    arch::interrupts::enable();

    main_loop(terminal)
}

/// Цикл main-задачи: таймауты, клавиатура, запросы к слоям.
/// The main task loop: timeouts, keyboard, layer requests.
#[cfg(target_os = "none")]
fn main_loop(terminal: TaskId) -> ! {
    let blink = config::TIMER_FREQ / 2;
    let mut kbd = Keyboard::new();
    timer::add_timer(timer::current_tick() + blink, CURSOR_TIMER);

    loop {
        match sched::wait_message() {
            msg @ Message::TimerTimeout { timeout, value } => {
                if value == CURSOR_TIMER {
                    timer::add_timer(timeout + blink, CURSOR_TIMER);
                }
                sched::send_message(terminal, msg).ok();
            }
            Message::DeviceInterrupt(Device::Keyboard) => {
                while let Some(scancode) = keyboard::read_scancode() {
                    if let Some(key) = kbd.decode(scancode) {
                        sched::send_message(terminal, key).ok();
                    }
                }
            }
            Message::DeviceInterrupt(Device::Xhci) => {
                debug!("main: xHCI notification ignored, no controller driver");
            }
            msg @ Message::KeyPush { .. } => {
                sched::send_message(terminal, msg).ok();
            }
            Message::Layer { op, layer_id, src_task, .. } => {
                trace!("main: layer {} {:?} from {}", layer_id, op, src_task);
                sched::send_message(src_task, Message::LayerFinish { layer_id }).ok();
            }
            Message::LayerFinish { layer_id } => {
                warn!("main: unexpected ack for layer {}", layer_id);
            }
        }
    }
}

/// Терминал: эхо клавиш в COM1, мигание курсора, отрисовка через main.
/// Terminal: echoes keys to COM1, blinks the cursor, draws through main.
#[cfg(target_os = "none")]
extern "C" fn task_terminal(task_id: u64, _data: i64) {
    let me = TaskId(task_id);
    let mut cursor_visible = false;
    info!("terminal {} started", me);

    loop {
        match sched::wait_message() {
            Message::KeyPush { ascii, press: true, .. } if ascii != 0 => {
                kprint!("{}", ascii as char);
                let draw = Message::Layer {
                    op: LayerOperation::DrawArea,
                    layer_id: TERMINAL_LAYER,
                    x: 0,
                    y: 0,
                    w: 8,
                    h: 16,
                    src_task: me,
                };
                sched::send_message(config::MAIN_TASK_ID, draw).ok();
            }
            Message::TimerTimeout { value: CURSOR_TIMER, .. } => {
                cursor_visible = !cursor_visible;
                trace!("terminal: cursor {}", if cursor_visible { "on" } else { "off" });
            }
            Message::LayerFinish { layer_id } => {
                trace!("terminal: layer {} drawn", layer_id);
            }
            _ => {}
        }
    }
}

/// Счётная задача: никогда не спит, её вытесняет только таймер.
/// Counter task: never sleeps, only the timer preempts it.
#[cfg(target_os = "none")]
extern "C" fn task_counter(task_id: u64, _data: i64) {
    let mut count: u64 = 0;
    loop {
        count = count.wrapping_add(1);
        if count % 100_000_000 == 0 {
            info!("counter {}: {} at tick {}", TaskId(task_id), count, timer::current_tick());
        }
    }
}

/// Panic handler — выводим в UART и halt.
#[cfg(target_os = "none")]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    arch::interrupts::disable();
    uart::_print_panic(format_args!("\n[KERNEL PANIC] {}\n", info));
    loop {
        arch::halt();
    }
}
