//! 进程与处理器：陷阱分发层看到的进程、CPU 状态，以及调度器提供的原语

pub use cpu::{Cpu, CpuManager, IntrGuard, IntrState};
pub use proc::{KillFlag, Proc, ProcState};
pub use trapframe::TrapFrame;

mod cpu;
mod proc;
mod trapframe;

/// 调度器提供给陷阱分发层的原语。
///
/// 进程由调度器拥有，分发器只在固定检查点调用这些原语。
pub trait Scheduler {
    /// 执行系统调用；参数与返回值经由 `p` 上挂接的陷阱帧传递
    fn syscall(&self, p: &Proc);

    /// 当前进程主动让出 CPU；返回时进程重新获得 CPU
    fn yield_current(&self, p: &Proc);

    /// 终止当前进程。裸机实现永不返回；
    /// 若实现返回（如测试中的模拟调度器），分发器立即结束本次陷阱处理。
    fn exit(&self, p: &Proc);

    /// 唤醒所有在 `channel` 上睡眠的进程
    fn wakeup(&self, channel: usize);
}
