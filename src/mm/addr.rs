//! 提供物理地址与虚拟地址包装

use core::convert::TryFrom;
use core::fmt;

use crate::consts::{PDXSHIFT, PGSIZE, PTXSHIFT, PXMASK, MAXVA};

/// 地址类型通用接口
///
/// 定义物理地址和虚拟地址共有的操作方法，
/// 包括页对齐调整、地址转换等。
pub trait Addr {
    /// 获取内部地址值的不可变引用
    fn data_ref(&self) -> &usize;

    /// 获取内部地址值的可变引用
    fn data_mut(&mut self) -> &mut usize;

    /// 向下取整到页边界
    #[inline]
    fn pg_round_down(&mut self) {
        *self.data_mut() = *self.data_mut() & !(PGSIZE - 1)
    }

    /// 获取地址的usize表示
    #[inline]
    fn as_usize(&self) -> usize {
        *self.data_ref()
    }
}

/// 物理地址封装类型
///
/// # 合法性保证
/// 通过`TryFrom`构造的地址必须页对齐。
#[repr(C)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysAddr(usize);

impl Addr for PhysAddr {
    #[inline]
    fn data_ref(&self) -> &usize {
        &self.0
    }

    #[inline]
    fn data_mut(&mut self) -> &mut usize {
        &mut self.0
    }
}

impl PhysAddr {
    /// 从原始usize值构造物理地址
    ///
    /// # 安全性
    /// 调用者必须确保`raw`是有效且页对齐的物理地址
    #[inline]
    pub unsafe fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    /// 解封装获取原始物理地址
    #[inline]
    pub fn into_raw(self) -> usize {
        self.0
    }
}

impl TryFrom<usize> for PhysAddr {
    type Error = &'static str;

    /// 尝试从usize创建物理地址，地址必须页对齐
    fn try_from(addr: usize) -> Result<Self, Self::Error> {
        if addr % PGSIZE != 0 {
            return Err("PhysAddr addr not aligned");
        }
        Ok(PhysAddr(addr))
    }
}

impl fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysAddr({:#x})", self.0)
    }
}

/// 虚拟地址封装类型
///
/// 地址值不超过 32 位地址空间上限 `MAXVA`，
/// 高 10 位为页目录下标，中间 10 位为二级页表下标，低 12 位为页内偏移。
#[repr(C)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtAddr(usize);

impl Addr for VirtAddr {
    #[inline]
    fn data_ref(&self) -> &usize {
        &self.0
    }

    #[inline]
    fn data_mut(&mut self) -> &mut usize {
        &mut self.0
    }
}

impl VirtAddr {
    /// 解封装获取原始虚拟地址
    #[inline]
    pub fn into_raw(self) -> usize {
        self.0
    }

    /// 页目录下标（PDX）
    #[inline]
    pub fn pdx(&self) -> usize {
        (self.0 >> PDXSHIFT) & PXMASK
    }

    /// 二级页表下标（PTX）
    #[inline]
    pub fn ptx(&self) -> usize {
        (self.0 >> PTXSHIFT) & PXMASK
    }

    /// 返回向下取整到页边界后的新地址
    #[inline]
    pub fn page(mut self) -> Self {
        self.pg_round_down();
        self
    }
}

impl TryFrom<usize> for VirtAddr {
    type Error = &'static str;

    /// 地址值必须小于等于`MAXVA`
    fn try_from(addr: usize) -> Result<Self, Self::Error> {
        if addr > MAXVA {
            Err("value for VirtAddr should be smaller than 1<<32")
        } else {
            Ok(Self(addr))
        }
    }
}

impl fmt::Debug for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtAddr({:#x})", self.0)
    }
}
