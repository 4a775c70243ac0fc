//! 陷阱处理所需的处理器本地硬件原语
//!
//! 每个 CPU 通过自己的 [`Hal`] 访问本地寄存器与本地中断控制器，
//! 裸机下由汇编实现，测试中由模拟对象实现。

use crate::trap::Idt;

/// 处理器本地硬件原语
pub trait Hal {
    /// 读取最近一次缺页的地址（cr2）
    fn fault_addr(&self) -> usize;

    /// 向本地 APIC 发送结束中断信号
    fn lapic_eoi(&self);

    /// 本地中断当前是否开启
    fn intr_get(&self) -> bool;

    /// 开启本地中断（sti）
    fn intr_on(&self);

    /// 关闭本地中断（cli）
    fn intr_off(&self);

    /// 把中断描述符表装入本 CPU（lidt）
    fn lidt(&self, idt: &Idt);
}
