//! 物理页帧分配接口与基于内核堆的页帧分配器

use alloc::alloc::{alloc_zeroed, dealloc, Layout};
use alloc::collections::BTreeSet;

use crate::spinlock::SpinLock;
use super::{Addr, PhysAddr, RawSinglePage};

/// 物理页帧分配器。
///
/// 软件 TLB 在淘汰缓存项时通过它归还页帧。
/// 分配器以 `&self` 调用，内部自行保证多核并发安全。
pub trait FrameAllocator {
    /// 分配一个清零的物理页帧，内存耗尽时返回 `None`
    fn alloc_frame(&self) -> Option<PhysAddr>;

    /// 归还一个物理页帧
    fn free_frame(&self, pa: PhysAddr);
}

/// 从内核堆中按页对齐分配页帧（物理地址与内核虚拟地址恒等映射）。
///
/// 分配器记录每个尚未归还的页帧。软件 TLB 淘汰的页帧可能仍被进程页表映射，
/// 同一页帧因此可能被归还多次；不属于自己或已经归还的页帧会被拒绝，
/// 不会交给内核堆。
pub struct KernelFrames {
    /// 尚未归还的页帧地址
    live: SpinLock<BTreeSet<usize>>,
}

impl KernelFrames {
    pub const fn new() -> Self {
        Self { live: SpinLock::new(BTreeSet::new(), "kframes") }
    }

    /// 当前未归还的页帧数量
    pub fn live(&self) -> usize {
        self.live.lock().len()
    }

    /// `pa` 是否是本分配器发出且尚未归还的页帧
    pub fn is_live(&self, pa: PhysAddr) -> bool {
        self.live.lock().contains(&pa.as_usize())
    }
}

impl Default for KernelFrames {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAllocator for KernelFrames {
    fn alloc_frame(&self) -> Option<PhysAddr> {
        let raw = unsafe { alloc_zeroed(Layout::new::<RawSinglePage>()) };
        if raw.is_null() {
            return None
        }
        self.live.lock().insert(raw as usize);
        Some(unsafe { PhysAddr::from_raw(raw as usize) })
    }

    fn free_frame(&self, pa: PhysAddr) {
        let mut live = self.live.lock();
        if !live.remove(&pa.as_usize()) {
            drop(live);
            log::warn!("kfree: cannot recycle {:?}, not allocated or already freed", pa);
            return
        }
        drop(live);
        unsafe { dealloc(pa.into_raw() as *mut u8, Layout::new::<RawSinglePage>()) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::PGSIZE;
    use crate::mm::{PageDirectory, PteFlag, SoftTlb, VirtAddr};

    #[test]
    fn frames_are_page_aligned_and_zeroed() {
        let frames = KernelFrames::new();
        let pa = frames.alloc_frame().unwrap();
        assert_eq!(pa.as_usize() % PGSIZE, 0);
        let bytes = unsafe { core::slice::from_raw_parts(pa.as_usize() as *const u8, PGSIZE) };
        assert!(bytes.iter().all(|&b| b == 0));
        assert_eq!(frames.live(), 1);
        assert!(frames.is_live(pa));
        frames.free_frame(pa);
        assert_eq!(frames.live(), 0);
        assert!(!frames.is_live(pa));
    }

    #[test]
    fn repeated_free_is_rejected() {
        let frames = KernelFrames::new();
        let a = frames.alloc_frame().unwrap();
        let b = frames.alloc_frame().unwrap();
        frames.free_frame(a);
        frames.free_frame(a);
        assert_eq!(frames.live(), 1);
        assert!(frames.is_live(b));
        frames.free_frame(b);
        frames.free_frame(b);
        assert_eq!(frames.live(), 0);
    }

    #[test]
    fn foreign_frame_is_rejected() {
        let frames = KernelFrames::new();
        let a = frames.alloc_frame().unwrap();
        frames.free_frame(PhysAddr::try_from(0x1000).unwrap());
        assert_eq!(frames.live(), 1);
        frames.free_frame(a);
    }

    #[test]
    fn cache_cycle_frees_each_frame_once() {
        let frames = KernelFrames::new();
        let pages = [0x1000, 0x2000, 0x0040_3000];
        let mut pgdir = PageDirectory::new();
        for &page in pages.iter() {
            let pa = frames.alloc_frame().unwrap();
            pgdir.map(VirtAddr::try_from(page).unwrap(), pa, PteFlag::W | PteFlag::U).unwrap();
        }
        assert_eq!(frames.live(), 3);

        let mut tlb = SoftTlb::new();
        for _ in 0..4 {
            for &page in pages.iter() {
                tlb.fault(&pgdir, VirtAddr::try_from(page).unwrap(), &frames).unwrap();
                assert!(tlb.len() <= 2);
            }
        }
        // 每个页帧只被真正归还一次，之后的重复归还都被拒绝
        assert_eq!(frames.live(), 0);
        assert_eq!(tlb.flush(&frames), 2);
        assert_eq!(frames.live(), 0);
    }
}
