//！ 定义陷阱帧（Trap Frame）

use bit_field::BitField;

use crate::consts::DPL_USER;

/// 陷阱发生时由硬件与入口桩代码压栈保存的 CPU 现场。
///
/// 布局与 32 位 x86 入口代码（`pushal` + 段寄存器 + 硬件压栈部分）一致，
/// 分发器只读取其中的陷阱号、错误码、`eip` 与 `cs`。
#[repr(C)]
#[derive(Debug, Default, Clone)]
pub struct TrapFrame {
    // pushal 压入的通用寄存器
    /*  0 */ pub edi: u32,
    /*  4 */ pub esi: u32,
    /*  8 */ pub ebp: u32,
    /* 12 */ pub oesp: u32,     // 无用
    /* 16 */ pub ebx: u32,
    /* 20 */ pub edx: u32,
    /* 24 */ pub ecx: u32,
    /* 28 */ pub eax: u32,

    // 其余陷阱帧
    /* 32 */ pub gs: u16,
    padding1: u16,
    /* 36 */ pub fs: u16,
    padding2: u16,
    /* 40 */ pub es: u16,
    padding3: u16,
    /* 44 */ pub ds: u16,
    padding4: u16,
    /* 48 */ pub trapno: u32,

    // 以下由 x86 硬件压栈
    /* 52 */ pub err: u32,
    /* 56 */ pub eip: u32,
    /* 60 */ pub cs: u16,
    padding5: u16,
    /* 64 */ pub eflags: u32,

    // 仅在跨特权级时压栈
    /* 68 */ pub esp: u32,
    /* 72 */ pub ss: u16,
    padding6: u16,
}

impl TrapFrame {
    /// 构造一个只填写陷阱号、错误码、`eip` 与 `cs` 的陷阱帧
    pub fn new(trapno: u32, err: u32, eip: u32, cs: u16) -> Self {
        Self { trapno, err, eip, cs, ..Default::default() }
    }

    /// 陷阱发生时的特权级（`cs` 的低 2 位）
    #[inline]
    pub fn cpl(&self) -> u8 {
        self.cs.get_bits(0..2) as u8
    }

    /// 陷阱是否来自用户态
    #[inline]
    pub fn from_user(&self) -> bool {
        self.cpl() == DPL_USER
    }
}
