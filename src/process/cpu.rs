//! 处理器状态管理：每 CPU 的软件 TLB 与中断开关嵌套

use array_macro::array;

use core::cell::Cell;

use crate::consts::NCPU;
use crate::mm::{FaultError, FaultOutcome, FrameAllocator, PageDirectory, SoftTlb, VirtAddr};
use crate::register::Hal;

/// CPU 管理器，维护系统中所有 CPU 核心的状态信息。
///
/// 每个 `Cpu` 只由对应的 CPU 核心本地访问，管理器本身只负责持有与分发。
pub struct CpuManager {
    /// 所有 CPU 核心状态的数组，下标即 CPU 编号。
    table: [Cpu; NCPU],
}

impl CpuManager {
    pub fn new() -> Self {
        Self {
            table: array![i => Cpu::new(i); NCPU],
        }
    }

    /// 编号为 `id` 的 CPU
    pub fn cpu(&self, id: usize) -> &Cpu {
        &self.table[id]
    }

    /// 编号为 `id` 的 CPU 的可变引用，只应由该 CPU 自己使用
    pub fn cpu_mut(&mut self, id: usize) -> &mut Cpu {
        &mut self.table[id]
    }

    /// 一次性取出全部 CPU 的可变引用，每个核心各持其一
    pub fn cpus_mut(&mut self) -> &mut [Cpu] {
        &mut self.table
    }
}

impl Default for CpuManager {
    fn default() -> Self {
        Self::new()
    }
}

/// CPU 结构体，保存当前 CPU 核心的状态信息。
///
/// 该结构体设计为单核独占访问，不需要额外的锁保护；
/// 唯一需要防范的是同一 CPU 上嵌套到来的中断，由 [`IntrState`] 处理。
pub struct Cpu {
    id: usize,
    /// 私有内核页目录与驻留页 FIFO
    tlb: SoftTlb,
    /// 关闭中断的嵌套状态
    intr: IntrState,
}

impl Cpu {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            tlb: SoftTlb::new(),
            intr: IntrState::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    #[inline]
    pub fn tlb(&self) -> &SoftTlb {
        &self.tlb
    }

    #[inline]
    pub fn intr(&self) -> &IntrState {
        &self.intr
    }

    /// # 功能说明
    /// 在关闭本地中断的情况下处理 `va` 处的缺页，
    /// 把进程页目录 `pgdir` 中的页表项复制进本 CPU 的软件 TLB。
    ///
    /// # 返回值
    /// 见 [`SoftTlb::fault`]。无论成功、失败还是展开（panic），离开时都会恢复中断状态。
    pub fn handle_page_fault(
        &mut self,
        hw: &dyn Hal,
        pgdir: &PageDirectory,
        va: VirtAddr,
        frames: &dyn FrameAllocator,
    ) -> Result<FaultOutcome, FaultError> {
        let _intr = self.intr.push_off(hw);
        self.tlb.fault(pgdir, va, frames)
    }

    /// 淘汰本 CPU 全部驻留页，返回淘汰数量
    pub fn flush_tlb(&mut self, hw: &dyn Hal, frames: &dyn FrameAllocator) -> usize {
        let _intr = self.intr.push_off(hw);
        self.tlb.flush(frames)
    }
}

/// 关闭中断的嵌套状态。
///
/// 与 `intr_off()` 类似，但支持成对使用：
/// 多次 `push_off()` 需要相应次数的 `pop_off()` 才能恢复中断状态；
/// 如果中断原本就是关闭状态，全部弹出后仍保持关闭。
#[derive(Debug, Default)]
pub struct IntrState {
    /// 关闭中断的嵌套计数
    noff: Cell<u8>,
    /// 第一次 `push_off` 之前中断是否开启
    intena: Cell<bool>,
}

impl IntrState {
    pub const fn new() -> Self {
        Self { noff: Cell::new(0), intena: Cell::new(false) }
    }

    /// 当前嵌套深度
    pub fn depth(&self) -> u8 {
        self.noff.get()
    }

    /// # 功能说明
    /// 关闭当前 CPU 的中断，并记录中断关闭的嵌套次数。
    /// 返回的守卫在离开作用域时调用 `pop_off()`。
    ///
    /// # 流程解释
    /// 1. 读取当前中断使能状态 `old`。
    /// 2. 关闭中断。
    /// 3. 若嵌套计数为 0，保存 `old` 以便恢复。
    /// 4. 嵌套计数加 1。
    pub fn push_off<'a>(&'a self, hw: &'a dyn Hal) -> IntrGuard<'a> {
        let old = hw.intr_get();
        hw.intr_off();
        if self.noff.get() == 0 {
            self.intena.set(old);
        }
        self.noff.set(self.noff.get() + 1);
        IntrGuard { state: self, hw }
    }

    /// # 功能说明
    /// 解除一层 `push_off()`，嵌套全部解除且之前中断为开启状态时重新开启中断。
    ///
    /// # 可能的错误
    /// - 中断已开启时调用，panic。
    /// - 调用次数与 `push_off()` 不匹配，panic。
    fn pop_off(&self, hw: &dyn Hal) {
        if hw.intr_get() {
            panic!("pop_off(): interruptable");
        }
        let noff = match self.noff.get().checked_sub(1) {
            Some(n) => n,
            None => panic!("pop_off(): count not match"),
        };
        self.noff.set(noff);
        if noff == 0 && self.intena.get() {
            hw.intr_on();
        }
    }
}

/// `push_off` 的作用域守卫
pub struct IntrGuard<'a> {
    state: &'a IntrState,
    hw: &'a dyn Hal,
}

impl<'a> Drop for IntrGuard<'a> {
    fn drop(&mut self) {
        self.state.pop_off(self.hw);
    }
}
