//! x86_64 paging constants and page table entry flags.
//!
//! `slopos_mm::paging_defs` carries the kernel's working copy of these same
//! values; this module exists so crates below `slopos_mm` in the dependency
//! graph (e.g. `slopos_drivers`) can still name a page size without taking a
//! dependency on the memory manager.

use bitflags::bitflags;

bitflags! {
    /// x86_64 page table entry flags (bits match the hardware PTE format).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct PageFlags: u64 {
        const PRESENT       = 1 << 0;
        const WRITABLE      = 1 << 1;
        const USER          = 1 << 2;
        const WRITE_THROUGH = 1 << 3;
        const CACHE_DISABLE = 1 << 4;
        const ACCESSED      = 1 << 5;
        const DIRTY         = 1 << 6;
        const HUGE          = 1 << 7;
        const GLOBAL        = 1 << 8;
        const COW           = 1 << 9;
        const NO_EXECUTE    = 1 << 63;

        const KERNEL_RW = Self::PRESENT.bits() | Self::WRITABLE.bits();
        const KERNEL_RO = Self::PRESENT.bits();
        const USER_RW = Self::PRESENT.bits() | Self::WRITABLE.bits() | Self::USER.bits();
        const USER_RO = Self::PRESENT.bits() | Self::USER.bits();
        const LARGE_KERNEL_RW = Self::PRESENT.bits() | Self::WRITABLE.bits() | Self::HUGE.bits();
        const MMIO = Self::PRESENT.bits() | Self::WRITABLE.bits() | Self::CACHE_DISABLE.bits() | Self::NO_EXECUTE.bits();
    }
}

impl PageFlags {
    pub const ADDRESS_MASK: u64 = 0x000F_FFFF_FFFF_F000;

    #[inline]
    pub const fn extract_address(pte: u64) -> u64 {
        pte & Self::ADDRESS_MASK
    }
}

/// 4KB page size (standard).
pub const PAGE_SIZE_4KB: u64 = 0x1000;
/// 4KB page size as `usize`, for array indexing and size math.
pub const PAGE_SIZE_4KB_USIZE: usize = PAGE_SIZE_4KB as usize;
/// 2MB huge page size (PDE).
pub const PAGE_SIZE_2MB: u64 = 0x20_0000;
/// 1GB huge page size (PDPTE).
pub const PAGE_SIZE_1GB: u64 = 0x4000_0000;

/// Entries per page table (PML4/PDPT/PD/PT all have 512 slots).
pub const ENTRIES_PER_PAGE_TABLE: usize = 512;

/// Generic page alignment, same as the 4KB page size.
pub const PAGE_ALIGN: u64 = PAGE_SIZE_4KB;
/// Stack alignment required by the System V AMD64 ABI at a `call` instruction.
pub const STACK_ALIGN: u64 = 16;

/// EFI "conventional memory" type code (UEFI spec table 7-1), used when
/// classifying Limine memory map entries as usable RAM.
pub const EFI_CONVENTIONAL_MEMORY: u32 = 7;
/// EFI page size (always 4KB, independent of paging mode).
pub const EFI_PAGE_SIZE: u64 = 0x1000;
