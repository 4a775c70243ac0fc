//! 进程中与陷阱处理相关的部分：运行状态、终止标志、页目录与当前陷阱帧

use core::ptr;
use core::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

use crate::mm::PageDirectory;
use crate::spinlock::SpinLock;
use super::TrapFrame;

/// 进程状态枚举类型，表示操作系统内核中进程的不同生命周期状态。
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum ProcState {
    /// 该进程槽位未被占用，空闲状态。
    UNUSED,
    /// 进程处于睡眠状态，等待某事件或资源唤醒。
    SLEEPING,
    /// 进程处于可运行状态，等待调度器调度执行。
    RUNNABLE,
    /// 进程当前正在 CPU 上运行。
    RUNNING,
    /// 进程已被分配但尚未准备好运行。
    ALLOCATED,
    /// 进程已退出，处于僵尸状态，等待父进程回收。
    ZOMBIE,
}

/// 协作式终止标志。
///
/// 任何 CPU 都可以随时置位，但只在固定的检查点被读取：
/// 系统调用进入前与返回后、陷阱收尾时让出 CPU 之前与之后。
/// 置位本身不会打断正在内核态执行的代码。
#[derive(Debug, Default)]
pub struct KillFlag(AtomicBool);

impl KillFlag {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    #[inline]
    pub fn kill(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_killed(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// 进程结构体。
///
/// 进程由调度器拥有；陷阱分发层只读取运行状态、页目录，
/// 并修改终止标志与当前陷阱帧指针。
pub struct Proc {
    /// 进程的唯一标识符（进程ID）。
    pid: usize,
    /// 进程名称，最长16字节，通常用于调试和显示。
    name: [u8; 16],
    /// 进程当前的状态，由调度器在持锁时修改。
    pub state: SpinLock<ProcState>,
    /// 标识进程是否被杀死。
    pub killed: KillFlag,
    /// 系统调用期间挂接的陷阱帧。
    tf: AtomicPtr<TrapFrame>,
    /// 进程自己的页目录，描述分配给它的全部地址。
    pgdir: PageDirectory,
}

impl Proc {
    pub fn new(pid: usize, name: &str, pgdir: PageDirectory) -> Self {
        let mut buf = [0u8; 16];
        let len = name.len().min(buf.len() - 1);
        buf[..len].copy_from_slice(&name.as_bytes()[..len]);
        Self {
            pid,
            name: buf,
            state: SpinLock::new(ProcState::RUNNABLE, "proc"),
            killed: KillFlag::new(),
            tf: AtomicPtr::new(ptr::null_mut()),
            pgdir,
        }
    }

    #[inline]
    pub fn pid(&self) -> usize {
        self.pid
    }

    /// 进程名称（到第一个 NUL 为止）
    pub fn name(&self) -> &str {
        let len = self.name.iter().position(|&c| c == 0).unwrap_or(self.name.len());
        core::str::from_utf8(&self.name[..len]).unwrap_or("???")
    }

    #[inline]
    pub fn pgdir(&self) -> &PageDirectory {
        &self.pgdir
    }

    #[inline]
    pub fn pgdir_mut(&mut self) -> &mut PageDirectory {
        &mut self.pgdir
    }

    /// 当前运行状态
    pub fn state(&self) -> ProcState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: ProcState) {
        *self.state.lock() = state;
    }

    /// 标记进程被杀死，实际终止推迟到下一个检查点
    #[inline]
    pub fn kill(&self) {
        self.killed.kill();
    }

    #[inline]
    pub fn is_killed(&self) -> bool {
        self.killed.is_killed()
    }

    /// 把陷阱帧挂到进程上，供系统调用读取参数、写回返回值
    pub fn set_trapframe(&self, tf: *mut TrapFrame) {
        self.tf.store(tf, Ordering::Release);
    }

    /// 当前挂接的陷阱帧
    pub fn trapframe(&self) -> *mut TrapFrame {
        self.tf.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_truncated_and_nul_terminated() {
        let p = Proc::new(1, "a-very-long-process-name", PageDirectory::new());
        assert_eq!(p.name(), "a-very-long-pro");
        assert_eq!(Proc::new(2, "sh", PageDirectory::new()).name(), "sh");
    }

    #[test]
    fn kill_flag_is_sticky() {
        let p = Proc::new(3, "init", PageDirectory::new());
        assert!(!p.is_killed());
        p.kill();
        p.kill();
        assert!(p.is_killed());
    }

    #[test]
    fn state_and_trapframe() {
        let p = Proc::new(4, "cat", PageDirectory::new());
        assert_eq!(p.state(), ProcState::RUNNABLE);
        p.set_state(ProcState::RUNNING);
        assert_eq!(p.state(), ProcState::RUNNING);

        let mut tf = TrapFrame::default();
        assert!(p.trapframe().is_null());
        p.set_trapframe(&mut tf);
        assert_eq!(p.trapframe(), &mut tf as *mut TrapFrame);
    }
}
