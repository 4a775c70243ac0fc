//! 内存管理模块：地址类型、两级页表、页帧分配与软件 TLB

use crate::consts::PGSIZE;

pub use addr::{Addr, PhysAddr, VirtAddr};
pub use pagetable::{Mapping, PageDirectory, PageTable, PageTableEntry, PteFlag};
pub use kalloc::{FrameAllocator, KernelFrames};
pub use tlb::{FaultError, FaultOutcome, Fifo, SoftTlb, TlbSlot};

mod addr;
pub mod kalloc;
mod pagetable;
pub mod tlb;

/// 单页大小（4096字节）的内存页结构
///
/// # 内存布局
/// - `#[repr(C, align(4096)]` 确保页对齐
/// - 固定大小：`PGSIZE`
#[repr(C, align(4096))]
pub struct RawSinglePage {
    #[allow(dead_code)]
    data: [u8; PGSIZE]
}
