//! 全局时钟计数

use core::num::Wrapping;

use crate::process::Scheduler;
use crate::spinlock::SpinLock;

/// 全局时钟计数器（自旋锁保护）。
///
/// 只有 CPU 0 的时钟中断推进计数，其他 CPU 只读取或在其上睡眠。
pub struct Ticks(SpinLock<Wrapping<usize>>);

impl Ticks {
    pub const fn new() -> Self {
        Self(SpinLock::new(Wrapping(0), "time"))
    }

    /// 睡眠/唤醒使用的等待通道
    pub fn channel(&self) -> usize {
        self as *const Self as usize
    }

    /// 处理时钟中断（更新全局计数器）
    ///
    /// # 功能说明
    /// 在持锁状态下增加全局时钟计数并唤醒等待时钟的进程。
    pub(super) fn clock_intr(&self, sched: &dyn Scheduler) {
        let mut guard = self.0.lock();
        *guard += Wrapping(1);
        sched.wakeup(self.channel());
        drop(guard);
    }

    /// 读取当前时钟计数值
    ///
    /// # 返回值
    /// 系统启动以来 CPU 0 观察到的时钟中断次数
    pub fn read(&self) -> usize {
        self.0.lock().0
    }
}

impl Default for Ticks {
    fn default() -> Self {
        Self::new()
    }
}
