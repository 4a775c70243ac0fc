//! 软件 TLB：每个 CPU 私有的、容量固定的 FIFO 映射缓存
//!
//! 缺页时把进程页表中对应页表项的值复制进 CPU 自己的内核页目录，
//! 同一物理页因此同时出现在两张页表中。缓存满时淘汰最早装入的页
//! （先进先出，而非最近最少使用），并把该页帧归还给分配器。

use crate::consts::TLB_SIZE;
use super::{FrameAllocator, Mapping, PageDirectory, PhysAddr, VirtAddr};

/// 缓存槽：驻留的虚拟页，以及装入时该页映射到的物理页帧
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TlbSlot {
    pub va: VirtAddr,
    pub frame: PhysAddr,
}

/// 定长环形缓冲区，按逻辑位置访问：位置 0 永远是最早进入的元素。
#[derive(Debug)]
pub struct Fifo<T: Copy, const N: usize> {
    slots: [Option<T>; N],
    head: usize,
    len: usize,
}

impl<T: Copy, const N: usize> Fifo<T, N> {
    pub const fn new() -> Self {
        Self { slots: [None; N], head: 0, len: 0 }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == N
    }

    /// 第 `pos` 个逻辑位置上的元素
    pub fn get(&self, pos: usize) -> Option<&T> {
        if pos >= self.len {
            return None
        }
        self.slots[(self.head + pos) % N].as_ref()
    }

    /// 取出最早进入的元素，其余元素整体前移一位
    pub fn pop_front(&mut self) -> Option<T> {
        if self.len == 0 {
            return None
        }
        let item = self.slots[self.head].take();
        self.head = (self.head + 1) % N;
        self.len -= 1;
        item
    }

    /// 追加到末尾；已满时原样返回 `Err(item)`
    pub fn push_back(&mut self, item: T) -> Result<(), T> {
        if self.is_full() {
            return Err(item)
        }
        self.slots[(self.head + self.len) % N] = Some(item);
        self.len += 1;
        Ok(())
    }

    /// 从最早到最新依次遍历
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len).filter_map(move |pos| self.get(pos))
    }
}

/// 缺页处理的结果
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FaultOutcome {
    /// 新装入一页，`evicted` 为被淘汰的页（如有）
    Installed { evicted: Option<VirtAddr> },
    /// 该页已驻留，仅重新复制了页表项
    Refreshed,
}

/// 缺页处理失败的原因
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FaultError {
    /// 进程页目录中完全没有该地址的页表项
    NoEntry,
    /// 进程页表项存在但未映射
    NotPresent,
    /// 无法在内核页目录中得到叶子页表项
    NoLeaf,
}

impl FaultError {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultError::NoEntry => "bad memory access",
            FaultError::NotPresent => "page not present",
            FaultError::NoLeaf => "no kernel pte",
        }
    }
}

/// 一个 CPU 的软件 TLB：私有内核页目录与驻留页 FIFO。
///
/// 内核页目录只服务于本缓存，不与任何进程或其他 CPU 共享。
pub struct SoftTlb {
    kpgdir: PageDirectory,
    fifo: Fifo<TlbSlot, TLB_SIZE>,
}

impl SoftTlb {
    pub fn new() -> Self {
        Self {
            kpgdir: PageDirectory::new(),
            fifo: Fifo::new(),
        }
    }

    /// CPU 私有的内核页目录
    pub fn kpgdir(&self) -> &PageDirectory {
        &self.kpgdir
    }

    /// 驻留页数量
    pub fn len(&self) -> usize {
        self.fifo.len()
    }

    /// 从最早到最新列出驻留页
    pub fn resident(&self) -> impl Iterator<Item = VirtAddr> + '_ {
        self.fifo.iter().map(|slot| slot.va)
    }

    /// `va` 所在页是否驻留
    pub fn contains(&self, va: VirtAddr) -> bool {
        let page = va.page();
        self.fifo.iter().any(|slot| slot.va == page)
    }

    /// # 功能说明
    /// 处理 `va` 处的缺页：从进程页目录 `pgdir` 复制页表项到本 CPU 的内核页目录。
    ///
    /// # 流程解释
    /// 1. 在进程页目录中查找 `va`（不分配）；不存在则返回 `NoEntry`，
    ///    未映射则返回 `NotPresent`。
    /// 2. 若该页已驻留，重新复制页表项后返回 `Refreshed`。
    /// 3. 若 FIFO 已满，淘汰最早的一页并归还其页帧。
    /// 4. 在内核页目录中取得叶子页表项（必要时分配二级页表），复制进程页表项的值，
    ///    并把该页追加到 FIFO 末尾。
    ///
    /// # 注意
    /// 调用者须已关闭本 CPU 的中断；见 [`Cpu::handle_page_fault`](crate::process::Cpu::handle_page_fault)。
    pub fn fault(
        &mut self,
        pgdir: &PageDirectory,
        va: VirtAddr,
        frames: &dyn FrameAllocator,
    ) -> Result<FaultOutcome, FaultError> {
        let va = va.page();
        let pte = *pgdir.walk(va).ok_or(FaultError::NoEntry)?;
        let frame = pte.mapping().frame().ok_or(FaultError::NotPresent)?;

        if self.contains(va) {
            self.kpgdir.install_copy(va, &pte).map_err(|_| FaultError::NoLeaf)?;
            return Ok(FaultOutcome::Refreshed)
        }

        let evicted = if self.fifo.is_full() {
            self.evict_oldest(frames)
        } else {
            None
        };

        self.kpgdir.install_copy(va, &pte).map_err(|_| FaultError::NoLeaf)?;
        if self.fifo.push_back(TlbSlot { va, frame }).is_err() {
            panic!("soft tlb: fifo full after eviction");
        }
        Ok(FaultOutcome::Installed { evicted })
    }

    /// 淘汰最早驻留的一页：清除内核页目录中的映射并归还页帧。
    /// 若内核页目录中该页已无映射，归还装入时记录的页帧。
    fn evict_oldest(&mut self, frames: &dyn FrameAllocator) -> Option<VirtAddr> {
        let slot = self.fifo.pop_front()?;
        match self.kpgdir.unmap(slot.va) {
            Mapping::Present { frame, .. } => frames.free_frame(frame),
            Mapping::Absent => {
                log::warn!("soft tlb: {:?} resident but unmapped, freeing recorded frame", slot.va);
                frames.free_frame(slot.frame);
            }
        }
        Some(slot.va)
    }

    /// 淘汰全部驻留页，返回淘汰的页数
    pub fn flush(&mut self, frames: &dyn FrameAllocator) -> usize {
        let mut n = 0;
        while self.evict_oldest(frames).is_some() {
            n += 1;
        }
        n
    }
}

impl Default for SoftTlb {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::PteFlag;
    use crate::printf::tests::{captured, install_capture};
    use crate::testutil::MockFrames;

    fn va(raw: usize) -> VirtAddr {
        VirtAddr::try_from(raw).unwrap()
    }

    /// 建一个进程页目录，依次把 `pages` 映射到分配器给出的页帧
    fn proc_pgdir(frames: &MockFrames, pages: &[usize]) -> PageDirectory {
        let mut pgdir = PageDirectory::new();
        for &p in pages {
            let pa = frames.alloc_frame().unwrap();
            pgdir.map(va(p), pa, PteFlag::W | PteFlag::U).unwrap();
        }
        pgdir
    }

    #[test]
    fn fifo_orders_oldest_first() {
        let mut fifo: Fifo<u32, 2> = Fifo::new();
        assert!(fifo.is_empty());
        fifo.push_back(1).unwrap();
        fifo.push_back(2).unwrap();
        assert_eq!(fifo.push_back(3), Err(3));
        assert_eq!(fifo.pop_front(), Some(1));
        fifo.push_back(3).unwrap();
        assert_eq!(fifo.get(0), Some(&2));
        assert_eq!(fifo.get(1), Some(&3));
        assert_eq!(fifo.get(2), None);
        assert_eq!(fifo.iter().copied().collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn fault_installs_copy() {
        let frames = MockFrames::new();
        let pgdir = proc_pgdir(&frames, &[0x1000]);
        let mut tlb = SoftTlb::new();

        let out = tlb.fault(&pgdir, va(0x1234), &frames).unwrap();
        assert_eq!(out, FaultOutcome::Installed { evicted: None });
        assert_eq!(tlb.kpgdir().translate(va(0x1000)), pgdir.translate(va(0x1000)));
        assert_eq!(tlb.resident().collect::<Vec<_>>(), vec![va(0x1000)]);
        // 没有分配新的数据页
        assert_eq!(frames.allocated(), 1);
    }

    #[test]
    fn third_fault_evicts_oldest() {
        let frames = MockFrames::new();
        let pgdir = proc_pgdir(&frames, &[0x1000, 0x2000, 0x3000]);
        let a_frame = pgdir.translate(va(0x1000)).frame().unwrap();
        let mut tlb = SoftTlb::new();

        tlb.fault(&pgdir, va(0x1000), &frames).unwrap();
        tlb.fault(&pgdir, va(0x2000), &frames).unwrap();
        let out = tlb.fault(&pgdir, va(0x3000), &frames).unwrap();

        assert_eq!(out, FaultOutcome::Installed { evicted: Some(va(0x1000)) });
        assert_eq!(tlb.resident().collect::<Vec<_>>(), vec![va(0x2000), va(0x3000)]);
        assert_eq!(tlb.kpgdir().translate(va(0x1000)), Mapping::Absent);
        assert_eq!(frames.freed(), vec![a_frame]);
    }

    #[test]
    fn refault_on_resident_page_is_a_hit() {
        let frames = MockFrames::new();
        let pgdir = proc_pgdir(&frames, &[0x1000, 0x2000]);
        let mut tlb = SoftTlb::new();

        tlb.fault(&pgdir, va(0x1000), &frames).unwrap();
        tlb.fault(&pgdir, va(0x2000), &frames).unwrap();
        assert_eq!(tlb.fault(&pgdir, va(0x1008), &frames), Ok(FaultOutcome::Refreshed));
        assert_eq!(tlb.resident().collect::<Vec<_>>(), vec![va(0x1000), va(0x2000)]);
        assert!(frames.freed().is_empty());
    }

    #[test]
    fn missing_entry_is_reported() {
        let frames = MockFrames::new();
        let pgdir = PageDirectory::new();
        let mut tlb = SoftTlb::new();
        assert_eq!(tlb.fault(&pgdir, va(0x1000), &frames), Err(FaultError::NoEntry));
        assert_eq!(tlb.len(), 0);
    }

    #[test]
    fn not_present_entry_is_not_installed() {
        let frames = MockFrames::new();
        let mut pgdir = proc_pgdir(&frames, &[0x1000]);
        pgdir.unmap(va(0x1000));
        let mut tlb = SoftTlb::new();
        assert_eq!(tlb.fault(&pgdir, va(0x1000), &frames), Err(FaultError::NotPresent));
        assert_eq!(tlb.len(), 0);
    }

    #[test]
    fn never_more_than_capacity() {
        let frames = MockFrames::new();
        let pages: Vec<usize> = (1..=16).map(|i| i * 0x0040_1000).collect();
        let pgdir = proc_pgdir(&frames, &pages);
        let mut tlb = SoftTlb::new();

        for (i, &p) in pages.iter().chain(pages.iter().rev()).enumerate() {
            tlb.fault(&pgdir, va(p), &frames).unwrap();
            assert!(tlb.len() <= TLB_SIZE, "step {}", i);
            let resident: Vec<_> = tlb.resident().collect();
            assert!(resident.windows(2).all(|w| w[0] != w[1]));
            for r in resident {
                assert!(tlb.kpgdir().translate(r).is_present());
            }
        }
    }

    #[test]
    fn eviction_of_unmapped_slot_frees_recorded_frame() {
        install_capture();
        let frames = MockFrames::new();
        let pgdir = proc_pgdir(&frames, &[0x1000, 0x2000, 0x3000]);
        let a_frame = pgdir.translate(va(0x1000)).frame().unwrap();
        let mut tlb = SoftTlb::new();

        tlb.fault(&pgdir, va(0x1000), &frames).unwrap();
        // 绕过缓存直接清掉内核页目录中的映射，使 FIFO 与页表不一致
        assert!(tlb.kpgdir.unmap(va(0x1000)).is_present());
        tlb.fault(&pgdir, va(0x2000), &frames).unwrap();
        let out = tlb.fault(&pgdir, va(0x3000), &frames).unwrap();

        assert_eq!(out, FaultOutcome::Installed { evicted: Some(va(0x1000)) });
        assert_eq!(frames.freed(), vec![a_frame]);
        assert!(captured().contains("soft tlb: VirtAddr(0x1000) resident but unmapped, freeing recorded frame"));
    }

    #[test]
    fn flush_frees_everything() {
        let frames = MockFrames::new();
        let pgdir = proc_pgdir(&frames, &[0x1000, 0x2000]);
        let mut tlb = SoftTlb::new();
        tlb.fault(&pgdir, va(0x1000), &frames).unwrap();
        tlb.fault(&pgdir, va(0x2000), &frames).unwrap();

        assert_eq!(tlb.flush(&frames), 2);
        assert_eq!(tlb.len(), 0);
        assert_eq!(frames.freed().len(), 2);
        assert_eq!(tlb.kpgdir().translate(va(0x2000)), Mapping::Absent);
    }
}
