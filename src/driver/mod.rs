//! 设备驱动接口：陷阱分发器调用的中断服务例程与控制台输出设备

use core::sync::atomic::AtomicBool;

/// 用于表示是否有任何硬件线程触发了 panic。
pub(crate) static PANICKED: AtomicBool = AtomicBool::new(false);

/// 设备中断服务例程集合。
///
/// 陷阱分发器按陷阱号调用对应的例程，不关心返回值；
/// 结束中断（EOI）由分发器统一发出，例程内部不应再发送。
pub trait Devices {
    /// 主 IDE 磁盘中断
    fn ide_intr(&self);

    /// 键盘中断
    fn kbd_intr(&self);

    /// COM1 串口中断
    fn uart_intr(&self);
}

/// 控制台输出设备，`print!` 宏的最终落点。
pub trait Console: Sync {
    /// 输出单个字节
    fn putc(&self, c: u8);
}
