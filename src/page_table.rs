use bitflags::bitflags;

use crate::memory::FrameId;
use crate::swap::SwapIndex;

bitflags! {
    /// Page table entry state bits. PRESENT and SWAPPED are never set together.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PteFlags: u8 {
        const PRESENT = 1 << 0;
        const SWAPPED = 1 << 1;
        const DIRTY = 1 << 2;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageTableEntry {
    frame: Option<FrameId>,
    swap_index: Option<SwapIndex>,
    flags: PteFlags,
    pub last_access: u64,
}

impl PageTableEntry {
    #[inline]
    pub fn is_present(&self) -> bool {
        self.flags.contains(PteFlags::PRESENT)
    }

    #[inline]
    pub fn is_swapped(&self) -> bool {
        self.flags.contains(PteFlags::SWAPPED)
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.flags.contains(PteFlags::DIRTY)
    }

    pub fn flags(&self) -> PteFlags {
        self.flags
    }

    /// Backing frame, only while present
    pub fn frame(&self) -> Option<FrameId> {
        self.frame
    }

    /// Backing swap block, only while swapped
    pub fn swap_index(&self) -> Option<SwapIndex> {
        self.swap_index
    }

    /// Map the page to a resident frame
    pub fn set_present(&mut self, frame: FrameId, now: u64) {
        self.frame = Some(frame);
        self.swap_index = None;
        self.flags.remove(PteFlags::SWAPPED | PteFlags::DIRTY);
        self.flags.insert(PteFlags::PRESENT);
        self.last_access = now;
    }

    /// Record that the page's bytes now live in a swap block
    pub fn set_swapped(&mut self, idx: SwapIndex) {
        self.frame = None;
        self.swap_index = Some(idx);
        self.flags.remove(PteFlags::PRESENT | PteFlags::DIRTY);
        self.flags.insert(PteFlags::SWAPPED);
    }

    pub fn set_dirty(&mut self) {
        self.flags.insert(PteFlags::DIRTY);
    }

    /// Forget both the frame and the swap block
    pub fn clear(&mut self) {
        *self = PageTableEntry::default();
    }

    /// Rebuild an entry from saved fields, rejecting impossible combinations
    pub fn from_parts(
        flags: PteFlags,
        frame: Option<FrameId>,
        swap_index: Option<SwapIndex>,
        last_access: u64,
    ) -> Option<Self> {
        let present = flags.contains(PteFlags::PRESENT);
        let swapped = flags.contains(PteFlags::SWAPPED);
        if (present && swapped) || present != frame.is_some() || swapped != swap_index.is_some() {
            return None;
        }
        Some(PageTableEntry { frame, swap_index, flags, last_access })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Code,
    Data,
    Heap,
    Stack,
}

impl SegmentKind {
    pub const ALL: [SegmentKind; 4] =
        [SegmentKind::Code, SegmentKind::Data, SegmentKind::Heap, SegmentKind::Stack];

    pub fn name(self) -> &'static str {
        match self {
            SegmentKind::Code => "code",
            SegmentKind::Data => "data",
            SegmentKind::Heap => "heap",
            SegmentKind::Stack => "stack",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Segment {
    pub start_page: u32,
    pub num_pages: u32,
    pub allocated: bool,
}

impl Segment {
    pub fn contains(&self, page: u32) -> bool {
        page >= self.start_page && page - self.start_page < self.num_pages
    }

    pub fn end_page(&self) -> u32 {
        self.start_page.saturating_add(self.num_pages)
    }
}

/// Contiguous code < data < heap < stack segments in virtual page space
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessMemoryLayout {
    pub code: Segment,
    pub data: Segment,
    pub heap: Segment,
    pub stack: Segment,
}

impl ProcessMemoryLayout {
    /// Lay the segments out back to back. `None` if the last page would not
    /// fit in a `u32` page number.
    pub fn new(
        code_pages: u32,
        data_pages: u32,
        heap_pages: u32,
        stack_pages: u32,
    ) -> Option<Self> {
        let mut next = 0u32;
        let mut segment = |num_pages: u32| {
            let seg = Segment { start_page: next, num_pages, allocated: num_pages > 0 };
            next = next.checked_add(num_pages)?;
            Some(seg)
        };
        Some(ProcessMemoryLayout {
            code: segment(code_pages)?,
            data: segment(data_pages)?,
            heap: segment(heap_pages)?,
            stack: segment(stack_pages)?,
        })
    }

    /// Page count of a layout without building it
    pub fn page_count(code_pages: u32, data_pages: u32, heap_pages: u32, stack_pages: u32) -> u64 {
        [code_pages, data_pages, heap_pages, stack_pages].iter().map(|&n| n as u64).sum()
    }

    pub fn segment(&self, kind: SegmentKind) -> &Segment {
        match kind {
            SegmentKind::Code => &self.code,
            SegmentKind::Data => &self.data,
            SegmentKind::Heap => &self.heap,
            SegmentKind::Stack => &self.stack,
        }
    }

    pub fn total_pages(&self) -> usize {
        SegmentKind::ALL
            .iter()
            .map(|&kind| self.segment(kind).num_pages as usize)
            .sum()
    }

    /// Which segment a virtual page falls in
    pub fn segment_of(&self, page: u32) -> Option<SegmentKind> {
        SegmentKind::ALL
            .into_iter()
            .find(|&kind| self.segment(kind).contains(page))
    }

    /// Segments are back to back in code, data, heap, stack order
    pub fn is_contiguous(&self) -> bool {
        self.code.start_page == 0
            && self.data.start_page == self.code.end_page()
            && self.heap.start_page == self.data.end_page()
            && self.stack.start_page == self.heap.end_page()
    }
}

/// Per-process page table, one entry per virtual page of the layout
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageTable {
    entries: Vec<PageTableEntry>,
}

impl PageTable {
    /// Zeroed table sized for `layout`
    pub fn setup_process_memory(layout: &ProcessMemoryLayout) -> Self {
        PageTable { entries: vec![PageTableEntry::default(); layout.total_pages()] }
    }

    pub fn from_entries(entries: Vec<PageTableEntry>) -> Self {
        PageTable { entries }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, page: u32) -> Option<&PageTableEntry> {
        self.entries.get(page as usize)
    }

    pub fn get_mut(&mut self, page: u32) -> Option<&mut PageTableEntry> {
        self.entries.get_mut(page as usize)
    }

    pub fn entries(&self) -> &[PageTableEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &PageTableEntry)> {
        self.entries.iter().enumerate().map(|(i, pte)| (i as u32, pte))
    }

    pub fn present_count(&self) -> usize {
        self.entries.iter().filter(|pte| pte.is_present()).count()
    }

    pub fn swapped_count(&self) -> usize {
        self.entries.iter().filter(|pte| pte.is_swapped()).count()
    }

    /// Resident pages as a whole percentage of the table size
    pub fn resident_percent(&self) -> u32 {
        if self.entries.is_empty() {
            return 100;
        }
        (self.present_count() * 100 / self.entries.len()) as u32
    }

    /// Present page with the oldest access time, lowest page on ties
    pub fn oldest_present(&self) -> Option<(u32, u64)> {
        self.iter()
            .filter(|(_, pte)| pte.is_present())
            .map(|(page, pte)| (page, pte.last_access))
            .fold(None, |best, (page, stamp)| match best {
                Some((_, best_stamp)) if best_stamp <= stamp => best,
                _ => Some((page, stamp)),
            })
    }

    /// Next page to bring in: swapped pages first, then never-touched ones
    pub fn next_absent(&self) -> Option<u32> {
        self.iter()
            .find(|(_, pte)| pte.is_swapped())
            .or_else(|| self.iter().find(|(_, pte)| !pte.is_present()))
            .map(|(page, _)| page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_is_contiguous() {
        let layout = ProcessMemoryLayout::new(3, 2, 4, 1).unwrap();
        assert_eq!(layout.code, Segment { start_page: 0, num_pages: 3, allocated: true });
        assert_eq!(layout.data.start_page, 3);
        assert_eq!(layout.heap.start_page, 5);
        assert_eq!(layout.stack.start_page, 9);
        assert_eq!(layout.total_pages(), 10);
        assert!(layout.is_contiguous());
    }

    #[test]
    fn test_empty_segment_not_allocated() {
        let layout = ProcessMemoryLayout::new(2, 0, 0, 1).unwrap();
        assert!(!layout.data.allocated);
        assert!(!layout.heap.allocated);
        assert_eq!(layout.stack.start_page, 2);
        assert_eq!(layout.segment_of(2), Some(SegmentKind::Stack));
        assert_eq!(layout.segment_of(3), None);
    }

    #[test]
    fn test_layout_overflow_is_rejected() {
        assert!(ProcessMemoryLayout::new(u32::MAX, 1, 0, 0).is_none());
        assert!(ProcessMemoryLayout::new(0, 0, u32::MAX, 1).is_none());
        assert_eq!(ProcessMemoryLayout::page_count(u32::MAX, 1, 0, 0), u32::MAX as u64 + 1);

        let layout = ProcessMemoryLayout::new(u32::MAX, 0, 0, 0).unwrap();
        assert!(layout.code.contains(u32::MAX - 1));
        assert!(!layout.code.contains(u32::MAX));
        assert_eq!(layout.stack.end_page(), u32::MAX);
    }

    #[test]
    fn test_segment_of() {
        let layout = ProcessMemoryLayout::new(1, 1, 1, 1).unwrap();
        let kinds: Vec<_> = (0..4).map(|p| layout.segment_of(p).unwrap().name()).collect();
        assert_eq!(kinds, vec!["code", "data", "heap", "stack"]);
    }

    #[test]
    fn test_setup_process_memory() {
        let layout = ProcessMemoryLayout::new(4, 4, 0, 0).unwrap();
        let table = PageTable::setup_process_memory(&layout);
        assert_eq!(table.len(), 8);
        assert!(table.entries().iter().all(|pte| *pte == PageTableEntry::default()));
        assert_eq!(table.resident_percent(), 0);
    }

    #[test]
    fn test_present_and_swapped_are_exclusive() {
        let mut pte = PageTableEntry::default();
        pte.set_present(FrameId(4), 10);
        pte.set_dirty();
        assert!(pte.is_present() && !pte.is_swapped() && pte.is_dirty());
        assert_eq!(pte.frame(), Some(FrameId(4)));

        pte.set_swapped(SwapIndex(2));
        assert!(!pte.is_present() && pte.is_swapped() && !pte.is_dirty());
        assert_eq!(pte.frame(), None);
        assert_eq!(pte.swap_index(), Some(SwapIndex(2)));

        pte.set_present(FrameId(1), 11);
        assert_eq!(pte.flags(), PteFlags::PRESENT);
        assert_eq!(pte.swap_index(), None);
    }

    #[test]
    fn test_from_parts_rejects_both_flags() {
        let both = PteFlags::PRESENT | PteFlags::SWAPPED;
        let (frame, block) = (Some(FrameId(0)), Some(SwapIndex(0)));
        assert!(PageTableEntry::from_parts(both, frame, block, 0).is_none());
        assert!(PageTableEntry::from_parts(PteFlags::PRESENT, None, None, 0).is_none());
        assert!(PageTableEntry::from_parts(PteFlags::SWAPPED, None, block, 5).is_some());
    }

    #[test]
    fn test_oldest_present_prefers_lowest_page_on_ties() {
        let layout = ProcessMemoryLayout::new(4, 0, 0, 0).unwrap();
        let mut table = PageTable::setup_process_memory(&layout);
        table.get_mut(1).unwrap().set_present(FrameId(0), 7);
        table.get_mut(2).unwrap().set_present(FrameId(1), 3);
        table.get_mut(3).unwrap().set_present(FrameId(2), 3);
        assert_eq!(table.oldest_present(), Some((2, 3)));
        assert_eq!(table.present_count(), 3);
        assert_eq!(table.resident_percent(), 75);
    }

    #[test]
    fn test_next_absent_prefers_swapped() {
        let layout = ProcessMemoryLayout::new(3, 0, 0, 0).unwrap();
        let mut table = PageTable::setup_process_memory(&layout);
        assert_eq!(table.next_absent(), Some(0));

        table.get_mut(2).unwrap().set_swapped(SwapIndex(0));
        assert_eq!(table.next_absent(), Some(2));

        for page in 0..3 {
            table.get_mut(page).unwrap().set_present(FrameId(page), 1);
        }
        assert_eq!(table.next_absent(), None);
    }
}
