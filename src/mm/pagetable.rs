//! 二级页表（页目录 + 页表）配置与管理

use array_macro::array;

use alloc::alloc::{alloc_zeroed, Layout};
use alloc::boxed::Box;

use crate::consts::{NPTENTRIES, PGSIZE};
use super::{Addr, PhysAddr, VirtAddr};

bitflags! {
    /// 页表项权限与状态标志（x86 两级分页）
    pub struct PteFlag: usize {
        /// 存在位（Present）
        const P = 1 << 0;
        /// 可写（Writeable）
        const W = 1 << 1;
        /// 用户态可访问（User）
        const U = 1 << 2;
        /// 写直通（Write-Through）
        const PWT = 1 << 3;
        /// 禁用缓存（Cache-Disable）
        const PCD = 1 << 4;
        /// 访问位（Accessed）
        const A = 1 << 5;
        /// 脏位（Dirty）
        const D = 1 << 6;
        /// 大页（Page Size）
        const PS = 1 << 7;
    }
}

/// 页表项中标志位所占的低 12 位
const PTE_FLAGS_MASK: usize = PGSIZE - 1;

/// 查询页表项得到的映射结果。
///
/// 调用者通过匹配变体判断页是否存在，而不是自己对原始数值做位测试。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mapping {
    /// 映射存在，指向 `frame`，权限为 `flags`
    Present { frame: PhysAddr, flags: PteFlag },
    /// 没有有效映射
    Absent,
}

impl Mapping {
    #[inline]
    pub fn is_present(&self) -> bool {
        matches!(self, Mapping::Present { .. })
    }

    /// 映射存在时返回物理页帧
    #[inline]
    pub fn frame(&self) -> Option<PhysAddr> {
        match *self {
            Mapping::Present { frame, .. } => Some(frame),
            Mapping::Absent => None,
        }
    }
}

/// 页表项结构体（PageTableEntry）
///
/// 高 20 位为物理页帧地址，低 12 位为 [`PteFlag`]。
/// 该类型可以按值复制，软件 TLB 正是通过复制页表项的值把同一物理页
/// 同时映射进进程页表和 CPU 内核页表。
#[repr(C)]
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct PageTableEntry {
    data: usize,
}

impl core::fmt::Debug for PageTableEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "PageTableEntry({:#x})", self.data)
    }
}

impl PageTableEntry {
    pub const fn empty() -> Self {
        Self { data: 0 }
    }

    #[inline]
    pub fn is_present(&self) -> bool {
        (self.data & PteFlag::P.bits()) > 0
    }

    #[inline]
    pub fn flags(&self) -> PteFlag {
        PteFlag::from_bits_truncate(self.data)
    }

    #[inline]
    pub fn as_phys_addr(&self) -> PhysAddr {
        unsafe { PhysAddr::from_raw(self.data & !PTE_FLAGS_MASK) }
    }

    /// 以带标签的形式返回该页表项描述的映射
    #[inline]
    pub fn mapping(&self) -> Mapping {
        if self.is_present() {
            Mapping::Present { frame: self.as_phys_addr(), flags: self.flags() }
        } else {
            Mapping::Absent
        }
    }

    #[inline]
    fn as_page_table(&self) -> *mut PageTable {
        (self.data & !PTE_FLAGS_MASK) as *mut PageTable
    }

    #[inline]
    fn write_zero(&mut self) {
        self.data = 0;
    }

    #[inline]
    fn write_perm(&mut self, pa: PhysAddr, perm: PteFlag) {
        self.data = pa.as_usize() | (perm | PteFlag::P).bits()
    }

    /// 用另一个页表项的值覆盖本项
    #[inline]
    fn copy_from(&mut self, other: &PageTableEntry) {
        self.data = other.data;
    }
}

/// 页表结构体（PageTable）
///
/// 一个页大小的表页，包含 1024 个页表项。页目录与二级页表共用此布局。
#[repr(C, align(4096))]
pub struct PageTable {
    data: [PageTableEntry; NPTENTRIES],
}

impl PageTable {
    pub const fn empty() -> Self {
        Self {
            data: array![_ => PageTableEntry { data: 0 }; NPTENTRIES],
        }
    }

    /// 分配一个清零的表页，内存不足时返回 `None`
    fn try_new_zeroed() -> Option<*mut PageTable> {
        let raw = unsafe { alloc_zeroed(Layout::new::<PageTable>()) } as *mut PageTable;
        if raw.is_null() {
            None
        } else {
            Some(raw)
        }
    }
}

/// 页目录：一个地址空间的顶层表，独占其下所有二级页表页。
///
/// 页目录只管理表页本身；叶子页表项指向的物理页帧由映射的建立者负责释放。
pub struct PageDirectory {
    root: Box<PageTable>,
}

// 页目录独占其表页，裸指针只指向自己分配的二级页表。
unsafe impl Send for PageDirectory {}
unsafe impl Sync for PageDirectory {}

impl PageDirectory {
    pub fn new() -> Self {
        Self { root: Box::new(PageTable::empty()) }
    }

    /// # 功能说明
    /// 定位虚拟地址 `va` 对应的叶子页表项。
    /// 若二级页表不存在且 `alloc` 为真，则分配一个清零的二级页表并挂入页目录；
    /// 本函数从不分配叶子映射所指向的数据页。
    ///
    /// # 返回值
    /// - `Some(&mut PageTableEntry)`：叶子页表项（可能尚未映射）。
    /// - `None`：二级页表不存在且 `alloc` 为假，或分配二级页表失败。
    pub fn lookup_or_create(&mut self, va: VirtAddr, alloc: bool) -> Option<&mut PageTableEntry> {
        let pde = &mut self.root.data[va.pdx()];
        let pgt = if pde.is_present() {
            pde.as_page_table()
        } else {
            if !alloc {
                return None
            }
            let pgt = PageTable::try_new_zeroed()?;
            // 二级页表的权限放到最宽，由叶子项控制实际权限
            pde.write_perm(unsafe { PhysAddr::from_raw(pgt as usize) }, PteFlag::W | PteFlag::U);
            pgt
        };
        unsafe { Some(&mut (*pgt).data[va.ptx()]) }
    }

    /// 与 [`lookup_or_create`](Self::lookup_or_create) 的 `alloc = false` 相同，
    /// 但返回不可变引用。
    pub fn walk(&self, va: VirtAddr) -> Option<&PageTableEntry> {
        let pde = &self.root.data[va.pdx()];
        if !pde.is_present() {
            return None
        }
        unsafe { Some(&(*pde.as_page_table()).data[va.ptx()]) }
    }

    /// 查询 `va` 的映射
    pub fn translate(&self, va: VirtAddr) -> Mapping {
        match self.walk(va) {
            Some(pte) => pte.mapping(),
            None => Mapping::Absent,
        }
    }

    /// 建立 `va` 所在页到物理页 `pa` 的映射
    ///
    /// # 返回值
    /// - `Ok(())`：映射成功。
    /// - `Err(&'static str)`：二级页表分配失败，或该页已经映射。
    pub fn map(&mut self, mut va: VirtAddr, pa: PhysAddr, perm: PteFlag) -> Result<(), &'static str> {
        va.pg_round_down();
        let pte = self.lookup_or_create(va, true)
            .ok_or("PageDirectory.map: not enough memory for new page table")?;
        if pte.is_present() {
            return Err("PageDirectory.map: remap")
        }
        pte.write_perm(pa, perm);
        Ok(())
    }

    /// 清除 `va` 所在页的叶子映射，返回清除前的映射。
    /// 不释放物理页帧，也不回收二级页表。
    pub fn unmap(&mut self, va: VirtAddr) -> Mapping {
        match self.lookup_or_create(va, false) {
            Some(pte) => {
                let old = pte.mapping();
                pte.write_zero();
                old
            }
            None => Mapping::Absent,
        }
    }

    /// 把页表项 `pte` 的值原样复制到本页目录中 `va` 的叶子项，必要时分配二级页表
    ///
    /// # 返回值
    /// - `Ok(())`：复制成功。
    /// - `Err(&'static str)`：无法得到叶子页表项。
    pub fn install_copy(&mut self, va: VirtAddr, pte: &PageTableEntry) -> Result<(), &'static str> {
        let leaf = self.lookup_or_create(va, true)
            .ok_or("PageDirectory.install_copy: no leaf entry")?;
        leaf.copy_from(pte);
        Ok(())
    }
}

impl Default for PageDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PageDirectory {
    /// 释放所有二级页表页；叶子指向的数据页不在此释放
    fn drop(&mut self) {
        for pde in self.root.data.iter_mut() {
            if pde.is_present() {
                drop(unsafe { Box::from_raw(pde.as_page_table()) });
                pde.write_zero();
            }
        }
    }
}
