//! 测试用的模拟硬件、设备、调度器与页帧分配器

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::driver::Devices;
use crate::mm::{Addr, FrameAllocator, PhysAddr};
use crate::process::{Proc, Scheduler};
use crate::register::Hal;
use crate::trap::Idt;

/// 单个 CPU 的模拟硬件
#[derive(Default)]
pub struct MockHw {
    cr2: Cell<usize>,
    intr: Cell<bool>,
    eoi: Cell<usize>,
    intr_off_calls: Cell<usize>,
    idt: Cell<Option<*const Idt>>,
}

impl MockHw {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fault_addr(&self, addr: usize) {
        self.cr2.set(addr);
    }

    pub fn eoi_count(&self) -> usize {
        self.eoi.get()
    }

    pub fn intr_off_calls(&self) -> usize {
        self.intr_off_calls.get()
    }

    pub fn loaded_idt(&self) -> Option<*const Idt> {
        self.idt.get()
    }
}

impl Hal for MockHw {
    fn fault_addr(&self) -> usize {
        self.cr2.get()
    }

    fn lapic_eoi(&self) {
        self.eoi.set(self.eoi.get() + 1);
    }

    fn intr_get(&self) -> bool {
        self.intr.get()
    }

    fn intr_on(&self) {
        self.intr.set(true);
    }

    fn intr_off(&self) {
        self.intr_off_calls.set(self.intr_off_calls.get() + 1);
        self.intr.set(false);
    }

    fn lidt(&self, idt: &Idt) {
        self.idt.set(Some(idt as *const Idt));
    }
}

/// 记录各中断服务例程被调用的次数
#[derive(Default)]
pub struct MockDevices {
    pub ide: AtomicUsize,
    pub kbd: AtomicUsize,
    pub uart: AtomicUsize,
}

impl Devices for MockDevices {
    fn ide_intr(&self) {
        self.ide.fetch_add(1, Ordering::Relaxed);
    }

    fn kbd_intr(&self) {
        self.kbd.fetch_add(1, Ordering::Relaxed);
    }

    fn uart_intr(&self) {
        self.uart.fetch_add(1, Ordering::Relaxed);
    }
}

/// 记录调度器原语的调用；可配置在系统调用或让出 CPU 时杀死进程
#[derive(Default)]
pub struct MockSched {
    pub exits: Mutex<Vec<usize>>,
    pub syscalls: Mutex<Vec<usize>>,
    pub yields: AtomicUsize,
    pub wakeups: AtomicUsize,
    pub kill_in_syscall: AtomicBool,
    pub kill_on_yield: AtomicBool,
}

impl MockSched {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exited(&self) -> Vec<usize> {
        self.exits.lock().unwrap().clone()
    }

    pub fn syscalled(&self) -> Vec<usize> {
        self.syscalls.lock().unwrap().clone()
    }

    pub fn yield_count(&self) -> usize {
        self.yields.load(Ordering::Relaxed)
    }
}

impl Scheduler for MockSched {
    fn syscall(&self, p: &Proc) {
        assert!(!p.trapframe().is_null(), "syscall without trapframe");
        self.syscalls.lock().unwrap().push(p.pid());
        if self.kill_in_syscall.load(Ordering::Relaxed) {
            p.kill();
        }
    }

    fn yield_current(&self, p: &Proc) {
        self.yields.fetch_add(1, Ordering::Relaxed);
        if self.kill_on_yield.load(Ordering::Relaxed) {
            p.kill();
        }
    }

    fn exit(&self, p: &Proc) {
        self.exits.lock().unwrap().push(p.pid());
    }

    fn wakeup(&self, _channel: usize) {
        self.wakeups.fetch_add(1, Ordering::Relaxed);
    }
}

/// 发放假的物理页帧地址，记录每次分配与释放。
///
/// 页帧从不被解引用，地址只用于核对。
pub struct MockFrames {
    next: AtomicUsize,
    allocated: AtomicUsize,
    freed: Mutex<Vec<PhysAddr>>,
}

impl MockFrames {
    pub fn new() -> Self {
        Self {
            next: AtomicUsize::new(0x0010_0000),
            allocated: AtomicUsize::new(0),
            freed: Mutex::new(Vec::new()),
        }
    }

    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    pub fn freed(&self) -> Vec<PhysAddr> {
        self.freed.lock().unwrap().clone()
    }
}

impl FrameAllocator for MockFrames {
    fn alloc_frame(&self) -> Option<PhysAddr> {
        let raw = self.next.fetch_add(0x1000, Ordering::Relaxed);
        self.allocated.fetch_add(1, Ordering::Relaxed);
        PhysAddr::try_from(raw).ok()
    }

    fn free_frame(&self, pa: PhysAddr) {
        assert_eq!(pa.as_usize() % 0x1000, 0);
        self.freed.lock().unwrap().push(pa);
    }
}
