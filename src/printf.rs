//! 定义系统内核的输出方法：`print!`/`println!` 宏与 `log` 日志后端

use core::fmt;
use core::sync::atomic::Ordering;

use conquer_once::spin::OnceCell;
use log::{Level, Log, Metadata, Record};

use crate::driver::{Console, PANICKED};
use crate::spinlock::SpinLock;

/// 启动阶段注册的控制台设备，只能注册一次。
static CONSOLE: OnceCell<&'static dyn Console> = OnceCell::uninit();

/// 注册控制台输出设备
///
/// # 返回值
/// - `Ok(())`: 注册成功
/// - `Err(&str)`: 控制台已经注册过
pub fn register_console(console: &'static dyn Console) -> Result<(), &'static str> {
    CONSOLE
        .try_init_once(|| console)
        .map_err(|_| "printf: console already registered")
}

/// 零大小类型（ZST）的打印结构体，用于在多个 CPU 之间对打印操作进行排序。
struct Print;

impl Print {
    /// 向控制台输出单个字符；尚未注册控制台时丢弃输出
    fn print(&self, c: u8) {
        if let Some(console) = CONSOLE.get() {
            console.putc(c);
        }
    }
}

impl fmt::Write for Print {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            self.print(byte);
        }
        Ok(())
    }
}

/// 核心打印函数（被宏调用）
///
/// # 功能说明
/// 根据系统状态决定是否加锁输出：
/// - 当系统处于panic状态时，直接输出（不加锁）
/// - 正常状态下使用自旋锁保证多核输出同步
///
/// # 注意
/// 此函数被声明为pub，因为需要在宏中调用
pub fn _print(args: fmt::Arguments<'_>) {
    use fmt::Write;
    static PRINT: SpinLock<()> = SpinLock::new((), "print");

    if PANICKED.load(Ordering::Relaxed) {
        // no need to lock
        let _ = Print.write_fmt(args);
    } else {
        let guard = PRINT.lock();
        let _ = Print.write_fmt(args);
        drop(guard);
    }
}

/// 在终端输出一串字符
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::printf::_print(format_args!($($arg)*));
    };
}

/// 在终端输出一行字符
#[macro_export]
macro_rules! println {
    () => {$crate::print!("\n")};
    ($fmt:expr) => {$crate::print!(concat!($fmt, "\n"))};
    ($fmt:expr, $($arg:tt)*) => {
        $crate::print!(concat!($fmt, "\n"), $($arg)*)
    };
}

/// `log` 门面的内核后端，所有记录经由 [`_print`] 输出到控制台。
struct KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            crate::println!("[{:>5}] {}: {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: KernelLogger = KernelLogger;

/// 安装内核日志后端并设置最高日志级别
///
/// # 返回值
/// - `Ok(())`: 安装成功
/// - `Err(&str)`: 已经安装过其他日志后端
pub fn init_logger(level: Level) -> Result<(), &'static str> {
    log::set_logger(&LOGGER).map_err(|_| "printf: logger already installed")?;
    log::set_max_level(level.to_level_filter());
    Ok(())
}

/// 全局panic处理函数
///
/// # 功能说明
/// 1. 打印panic信息
/// 2. 设置全局panic状态标志
/// 3. 挂起系统（无限循环）
#[cfg(all(feature = "bare_metal", not(test)))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo<'_>) -> ! {
    crate::println!("{}", info);
    PANICKED.store(true, Ordering::Relaxed);
    loop {
        core::hint::spin_loop();
    }
}
