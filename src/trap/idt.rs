//! 中断描述符表（IDT）的构造

use bit_field::BitField;

use crate::consts::{DPL_KERNEL, DPL_USER, NIDT, SEG_KCODE, trapno::T_SYSCALL};

/// 32 位中断门类型
const STS_IG32: u8 = 0xE;
/// 32 位陷阱门类型
const STS_TG32: u8 = 0xF;

/// 中断/陷阱门描述符
///
/// 低 8 字节依次为：偏移低 16 位、代码段选择子、参数与保留位、类型属性、偏移高 16 位。
/// 类型属性字节：`[0..4)` 门类型，`4` 系统段标志（恒为 0），`[5..7)` DPL，`7` 存在位。
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct GateDesc {
    off_15_0: u16,
    cs: u16,
    args: u8,
    attr: u8,
    off_31_16: u16,
}

impl GateDesc {
    pub const fn missing() -> Self {
        Self { off_15_0: 0, cs: 0, args: 0, attr: 0, off_31_16: 0 }
    }

    /// 设置门描述符
    ///
    /// # 参数
    /// - `istrap`: 陷阱门（不自动关中断）为真，中断门为假；
    /// - `sel`: 处理程序的代码段选择子；
    /// - `off`: 处理程序入口偏移；
    /// - `dpl`: 允许以 `int` 指令显式触发该向量的最低特权级。
    pub fn set(&mut self, istrap: bool, sel: u16, off: usize, dpl: u8) {
        self.off_15_0 = off.get_bits(0..16) as u16;
        self.cs = sel;
        self.args = 0;
        let mut attr = 0u8;
        attr.set_bits(0..4, if istrap { STS_TG32 } else { STS_IG32 });
        attr.set_bit(4, false);
        attr.set_bits(5..7, dpl);
        attr.set_bit(7, true);
        self.attr = attr;
        self.off_31_16 = off.get_bits(16..32) as u16;
    }

    pub fn offset(&self) -> usize {
        (self.off_31_16 as usize) << 16 | self.off_15_0 as usize
    }

    pub fn selector(&self) -> u16 {
        self.cs
    }

    pub fn dpl(&self) -> u8 {
        self.attr.get_bits(5..7)
    }

    pub fn is_trap(&self) -> bool {
        self.attr.get_bits(0..4) == STS_TG32
    }

    pub fn is_present(&self) -> bool {
        self.attr.get_bit(7)
    }
}

/// 中断描述符表，所有 CPU 共享同一张。
#[repr(C, align(8))]
pub struct Idt {
    gates: [GateDesc; NIDT],
}

impl Idt {
    /// # 功能说明
    /// 为 256 个向量建立中断门，入口为 `vectors` 中对应的桩代码地址；
    /// 系统调用向量改为用户态可触发的陷阱门。
    pub fn new(vectors: &[usize; NIDT]) -> Self {
        let mut gates = [GateDesc::missing(); NIDT];
        let sel = SEG_KCODE << 3;
        for (gate, &entry) in gates.iter_mut().zip(vectors.iter()) {
            gate.set(false, sel, entry, DPL_KERNEL);
        }
        gates[T_SYSCALL as usize].set(true, sel, vectors[T_SYSCALL as usize], DPL_USER);
        Self { gates }
    }

    pub fn gate(&self, vector: usize) -> &GateDesc {
        &self.gates[vector]
    }

    /// `lidt` 需要的表基址
    pub fn as_ptr(&self) -> *const GateDesc {
        self.gates.as_ptr()
    }

    /// `lidt` 需要的表界限（字节数减一）
    pub fn limit(&self) -> u16 {
        (core::mem::size_of::<[GateDesc; NIDT]>() - 1) as u16
    }
}
