//! 内核常量定义：处理器数量、分页参数、陷阱号与中断号

/// 系统支持的最大 CPU 数量
pub const NCPU: usize = 8;

/// 进程表大小
pub const NPROC: usize = 64;

/// 页大小（字节）
pub const PGSIZE: usize = 4096;
/// 页内偏移位数
pub const PGSHIFT: usize = 12;

/// 页目录项数量
pub const NPDENTRIES: usize = 1024;
/// 二级页表项数量
pub const NPTENTRIES: usize = 1024;

/// 页目录索引在虚拟地址中的偏移
pub const PDXSHIFT: usize = 22;
/// 二级页表索引在虚拟地址中的偏移
pub const PTXSHIFT: usize = 12;
/// 单级索引掩码（10 位）
pub const PXMASK: usize = 0x3FF;

/// 32 位地址空间的最大虚拟地址
pub const MAXVA: usize = 0xFFFF_FFFF;

/// 软件 TLB（每 CPU 的 FIFO 映射缓存）容量
pub const TLB_SIZE: usize = 2;

/// 中断描述符表项数量
pub const NIDT: usize = 256;

/// 内核代码段在 GDT 中的下标
pub const SEG_KCODE: u16 = 1;
/// 内核特权级
pub const DPL_KERNEL: u8 = 0;
/// 用户特权级
pub const DPL_USER: u8 = 3;

/// 处理器定义的异常号
pub mod trapno {
    pub const T_DIVIDE: u32 = 0;
    pub const T_DEBUG: u32 = 1;
    pub const T_NMI: u32 = 2;
    pub const T_BRKPT: u32 = 3;
    pub const T_OFLOW: u32 = 4;
    pub const T_BOUND: u32 = 5;
    pub const T_ILLOP: u32 = 6;
    pub const T_DEVICE: u32 = 7;
    pub const T_DBLFLT: u32 = 8;
    pub const T_TSS: u32 = 10;
    pub const T_SEGNP: u32 = 11;
    pub const T_STACK: u32 = 12;
    pub const T_GPFLT: u32 = 13;
    pub const T_PGFLT: u32 = 14;
    pub const T_FPERR: u32 = 16;
    pub const T_ALIGN: u32 = 17;
    pub const T_MCHK: u32 = 18;
    pub const T_SIMDERR: u32 = 19;

    /// 系统调用向量
    pub const T_SYSCALL: u32 = 64;

    /// IRQ 0 对应的陷阱号
    pub const T_IRQ0: u32 = 32;

    pub const IRQ_TIMER: u32 = 0;
    pub const IRQ_KBD: u32 = 1;
    pub const IRQ_COM1: u32 = 4;
    /// 第 7 号 IRQ 在 8259 上常被误触发
    pub const IRQ_LPT1: u32 = 7;
    pub const IRQ_IDE: u32 = 14;
    pub const IRQ_ERROR: u32 = 19;
    pub const IRQ_SPURIOUS: u32 = 31;
}
