//! 中断处理模块：按陷阱号分发系统调用、设备中断、缺页与异常

use conquer_once::spin::OnceCell;

use crate::consts::NIDT;
use crate::consts::trapno::{
    IRQ_COM1, IRQ_IDE, IRQ_KBD, IRQ_LPT1, IRQ_SPURIOUS, IRQ_TIMER, T_IRQ0, T_PGFLT, T_SYSCALL,
};
use crate::driver::Devices;
use crate::mm::{FaultError, FrameAllocator, VirtAddr};
use crate::process::{Cpu, Proc, ProcState, Scheduler, TrapFrame};
use crate::register::Hal;

pub use clock::Ticks;
pub use idt::{GateDesc, Idt};

mod clock;
mod idt;


/// 陷阱分类
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TrapKind {
    /// 系统调用
    Syscall,
    /// 本地 APIC 时钟中断
    Timer,
    /// 主 IDE 磁盘中断
    Ide,
    /// 从 IDE 磁盘中断，模拟器会误发，直接忽略
    Ide2,
    /// 键盘中断
    Kbd,
    /// COM1 串口中断
    Com1,
    /// 伪中断
    Spurious,
    /// 缺页异常
    PageFault,
    /// 其他陷阱
    Unknown,
}

impl TrapKind {
    pub fn from_trapno(trapno: u32) -> Self {
        match trapno {
            T_SYSCALL => return TrapKind::Syscall,
            T_PGFLT => return TrapKind::PageFault,
            _ => {}
        }
        match trapno.wrapping_sub(T_IRQ0) {
            IRQ_TIMER => TrapKind::Timer,
            IRQ_IDE => TrapKind::Ide,
            irq if irq == IRQ_IDE + 1 => TrapKind::Ide2,
            IRQ_KBD => TrapKind::Kbd,
            IRQ_COM1 => TrapKind::Com1,
            IRQ_LPT1 | IRQ_SPURIOUS => TrapKind::Spurious,
            _ => TrapKind::Unknown,
        }
    }
}

/// 陷阱处理时用到的外部协作者
pub struct Platform<'a> {
    /// 当前 CPU 的硬件原语
    pub hw: &'a dyn Hal,
    /// 设备中断服务例程
    pub devices: &'a dyn Devices,
    /// 调度器原语
    pub sched: &'a dyn Scheduler,
    /// 物理页帧分配器
    pub frames: &'a dyn FrameAllocator,
}

/// 所有 CPU 共享的陷阱状态：中断描述符表与全局时钟计数。
///
/// 启动时构造一次（可作为 `static`），再交给需要它的各个 CPU。
pub struct TrapState {
    idt: OnceCell<Idt>,
    ticks: Ticks,
}

impl TrapState {
    pub const fn new() -> Self {
        Self {
            idt: OnceCell::uninit(),
            ticks: Ticks::new(),
        }
    }

    /// 全局时钟计数
    pub fn ticks(&self) -> &Ticks {
        &self.ticks
    }

    /// # 功能说明
    /// 建立 256 项中断描述符表，系统调用向量设为用户态可触发。只能调用一次。
    ///
    /// # 参数
    /// - `vectors`: 每个向量的入口桩代码地址
    ///
    /// # 返回值
    /// - `Ok(())`: 建表成功
    /// - `Err(&str)`: 已经建过表
    pub fn init_trap_table(&self, vectors: &[usize; NIDT]) -> Result<(), &'static str> {
        self.idt
            .try_init_once(|| Idt::new(vectors))
            .map_err(|_| "trap: idt already initialized")?;
        #[cfg(feature = "verbose_init_info")]
        log::info!("trap: idt initialized, {} gates", NIDT);
        Ok(())
    }

    /// 把中断描述符表装入当前 CPU，每个 CPU 启动时调用一次
    pub fn load_trap_table(&self, hw: &dyn Hal) -> Result<(), &'static str> {
        let idt = self.idt.get().ok_or("trap: idt not initialized")?;
        hw.lidt(idt);
        Ok(())
    }

    /// 已建立的中断描述符表
    pub fn idt(&self) -> Option<&Idt> {
        self.idt.get()
    }

    /// # 功能说明
    /// 陷阱处理入口，由各向量的入口桩代码调用。
    ///
    /// # 流程解释
    /// 1. 系统调用：检查终止标志，挂接陷阱帧并执行系统调用，再次检查终止标志后直接返回。
    /// 2. 设备中断：调用对应的中断服务例程并发送 EOI；时钟中断只在 CPU 0 上推进计数。
    /// 3. 缺页：交给本 CPU 的软件 TLB 处理。
    /// 4. 其他陷阱：内核态触发则停机，用户态触发则标记进程被杀死。
    /// 5. 收尾：被杀死的用户态进程退出；时钟中断时运行中的进程让出 CPU；
    ///    让出后再次检查终止标志。
    ///
    /// # 参数
    /// - `cpu`: 当前 CPU
    /// - `p`: 当前 CPU 上运行的进程（调度器空闲时为 `None`）
    /// - `tf`: 本次陷阱的陷阱帧
    /// - `plat`: 外部协作者
    pub fn handle_trap(&self, cpu: &mut Cpu, p: Option<&Proc>, tf: &mut TrapFrame, plat: &Platform<'_>) {
        let kind = TrapKind::from_trapno(tf.trapno);

        #[cfg(feature = "trace_trap")]
        log::trace!("cpu{}: trap {} ({:?}) eip {:#x} cs {:#x}", cpu.id(), tf.trapno, kind, tf.eip, tf.cs);

        match kind {
            TrapKind::Syscall => {
                let p = match p {
                    Some(p) => p,
                    None => unexpected(cpu, tf, plat.hw.fault_addr()),
                };
                syscall(p, tf, plat.sched);
                return
            }
            TrapKind::Timer => {
                if cpu.id() == 0 {
                    self.ticks.clock_intr(plat.sched);
                }
                plat.hw.lapic_eoi();
            }
            TrapKind::Ide => {
                plat.devices.ide_intr();
                plat.hw.lapic_eoi();
            }
            TrapKind::Ide2 => {
                // 模拟器会产生伪 IDE1 中断
            }
            TrapKind::Kbd => {
                plat.devices.kbd_intr();
                plat.hw.lapic_eoi();
            }
            TrapKind::Com1 => {
                plat.devices.uart_intr();
                plat.hw.lapic_eoi();
            }
            TrapKind::Spurious => {
                log::warn!("cpu{}: spurious interrupt at {:#x}:{:#x}", cpu.id(), tf.cs, tf.eip);
                plat.hw.lapic_eoi();
            }
            TrapKind::PageFault => page_fault(cpu, p, tf, plat),
            TrapKind::Unknown => misbehaved(cpu, p, tf, plat.hw.fault_addr()),
        }

        let p = match p {
            Some(p) => p,
            None => return,
        };

        // 进程已被杀死且位于用户态时立即退出；
        // 仍在内核中执行时让它继续运行，直到正常的系统调用返回
        if p.is_killed() && tf.from_user() {
            plat.sched.exit(p);
            return
        }

        // 时钟中断时强制进程让出 CPU
        if p.state() == ProcState::RUNNING && kind == TrapKind::Timer {
            plat.sched.yield_current(p);
        }

        // 让出期间可能已被其他 CPU 杀死
        if p.is_killed() && tf.from_user() {
            plat.sched.exit(p);
        }
    }
}

impl Default for TrapState {
    fn default() -> Self {
        Self::new()
    }
}

/// 系统调用路径，不经过统一收尾
fn syscall(p: &Proc, tf: &mut TrapFrame, sched: &dyn Scheduler) {
    if p.is_killed() {
        sched.exit(p);
        return
    }
    p.set_trapframe(tf);
    sched.syscall(p);
    // 系统调用可能杀死了自己
    if p.is_killed() {
        sched.exit(p);
    }
}

/// 缺页路径：把进程页表项装入本 CPU 的软件 TLB，失败时停机
fn page_fault(cpu: &mut Cpu, p: Option<&Proc>, tf: &TrapFrame, plat: &Platform<'_>) {
    let addr = plat.hw.fault_addr();
    let p = match p {
        Some(p) => p,
        None => unexpected(cpu, tf, addr),
    };
    let result = match VirtAddr::try_from(addr) {
        Ok(va) => cpu.handle_page_fault(plat.hw, p.pgdir(), va, plat.frames),
        Err(_) => Err(FaultError::NoEntry),
    };
    match result {
        Ok(_) => {}
        Err(FaultError::NotPresent) => misbehaved(cpu, Some(p), tf, addr),
        Err(e) => {
            log::error!("pid {} {}: {} at {:#x}", p.pid(), p.name(), e.as_str(), addr);
            panic!(
                "{}: trap {} from cpu {} eip {:#x} (cr2={:#x})",
                e.as_str(), tf.trapno, cpu.id(), tf.eip, addr
            );
        }
    }
}

/// 无法识别的陷阱：内核态触发时停机，用户态触发时杀死当前进程
fn misbehaved(cpu: &Cpu, p: Option<&Proc>, tf: &TrapFrame, addr: usize) {
    let p = match p {
        Some(p) if tf.from_user() => p,
        // 在内核中，一定是我们自己的错
        _ => unexpected(cpu, tf, addr),
    };
    // 在用户态，认为是进程行为不当
    log::warn!(
        "pid {} {}: trap {} err {} on cpu {} eip {:#x} addr {:#x}--kill proc",
        p.pid(), p.name(), tf.trapno, tf.err, cpu.id(), tf.eip, addr
    );
    p.kill();
}

fn unexpected(cpu: &Cpu, tf: &TrapFrame, addr: usize) -> ! {
    log::error!("unexpected trap {} from cpu {} eip {:#x} (cr2={:#x})", tf.trapno, cpu.id(), tf.eip, addr);
    panic!("unexpected trap {} from cpu {} eip {:#x} (cr2={:#x})", tf.trapno, cpu.id(), tf.eip, addr);
}
