use crate::constants::*;
use crate::memory::FrameId;
use crate::page_table::PageTable;

/// Represents the decomposed components of a Virtual Address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualAddress {
    pub va: u32,
    pub page: u32,
    pub offset: u32,
}

impl VirtualAddress {
    /// Decompose a raw VA into page number and in-page offset
    pub fn from_raw(va: u32) -> Self {
        VirtualAddress { va, page: va >> PAGE_SHIFT, offset: va & OFFSET_MASK }
    }

    /// Rebuild a VA from its parts
    #[inline]
    pub fn from_parts(page: u32, offset: u32) -> Self {
        Self::from_raw((page << PAGE_SHIFT) | (offset & OFFSET_MASK))
    }

    /// Bytes left in this page starting at the offset
    #[inline]
    pub fn remaining_in_page(&self) -> usize {
        PAGE_SIZE - self.offset as usize
    }
}

impl std::fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VA({:#x}) = (page={}, offset={})", self.va, self.page, self.offset)
    }
}

/// Result of an address translation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationResult {
    /// Page is resident; carries the frame and the physical address
    Resident { frame: FrameId, physical_address: usize },
    /// Page is valid but not backed by a frame
    PageFault,
    /// Page number is beyond the page table
    InvalidPage,
}

/// Translate a virtual address against one process's page table.
///
/// Out-of-range pages are an error, not a fault.
pub fn translate(va: &VirtualAddress, page_table: &PageTable) -> TranslationResult {
    let Some(pte) = page_table.get(va.page) else {
        return TranslationResult::InvalidPage;
    };

    match pte.frame() {
        Some(frame) if pte.is_present() => TranslationResult::Resident {
            frame,
            physical_address: frame.base_address() + va.offset as usize,
        },
        _ => TranslationResult::PageFault,
    }
}
