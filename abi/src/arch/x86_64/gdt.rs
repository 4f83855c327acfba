//! Global Descriptor Table and Task State Segment layout.
//!
//! Flat long-mode segmentation: one code and one data descriptor for ring 0,
//! one code and one data descriptor for ring 3, and a 64-bit TSS descriptor
//! occupying two GDT slots. Selector values are laid out so that the
//! `STAR` MSR's SYSCALL/SYSRET segment pairs fall out of this table in
//! order, per the Intel SDM's SYSRET requirement that user code/data sit at
//! `user_data_selector, user_data_selector + 8` relative to `STAR[63:48]`.

use core::mem::size_of;

/// Segment selector values, matching the descriptor order in
/// [`GdtLayout::load_standard_entries`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct SegmentSelector(pub u16);

impl SegmentSelector {
    pub const KERNEL_CODE: Self = Self(0x08);
    pub const KERNEL_DATA: Self = Self(0x10);
    pub const USER_DATA: Self = Self(0x20 | 3);
    pub const USER_CODE: Self = Self(0x28 | 3);
    pub const TSS: Self = Self(0x30);

    #[inline]
    pub const fn bits(self) -> u16 {
        self.0
    }
}

const KERNEL_CODE_DESCRIPTOR: u64 = 0x0020_9A00_0000_0000;
const KERNEL_DATA_DESCRIPTOR: u64 = 0x0000_9200_0000_0000;
const USER_DATA_DESCRIPTOR: u64 = 0x0000_F200_0000_0000;
const USER_CODE_DESCRIPTOR: u64 = 0x0020_FA00_0000_0000;

/// Null, kernel code, kernel data, (unused 32-bit user code slot), user
/// data, user code64 — the flat descriptor set every CPU's GDT starts with.
pub const GDT_STANDARD_ENTRIES: [u64; 6] = [
    0,
    KERNEL_CODE_DESCRIPTOR,
    KERNEL_DATA_DESCRIPTOR,
    0,
    USER_DATA_DESCRIPTOR,
    USER_CODE_DESCRIPTOR,
];

/// The 6 flat-segment entries plus the two-slot TSS descriptor that follows
/// them in the table.
#[repr(C, align(8))]
#[derive(Clone, Copy)]
pub struct GdtLayout {
    pub entries: [u64; 6],
    pub tss_descriptor: [u64; 2],
}

impl GdtLayout {
    #[inline]
    pub const fn new() -> Self {
        Self {
            entries: [0; 6],
            tss_descriptor: [0; 2],
        }
    }

    /// Populate the null, kernel code/data, and user code/data descriptors.
    /// Slot 4 (0x20) is user data and slot 5 (0x28) is user code, so that
    /// `SYSRET` loading `STAR[63:48] + 8` for data and `+ 16` for code lands
    /// on the right descriptors.
    pub fn load_standard_entries(&mut self) {
        self.entries = GDT_STANDARD_ENTRIES;
    }

    /// Write the system-segment TSS descriptor (two GDT slots wide) pointing
    /// at `tss`.
    pub fn load_tss(&mut self, tss: &Tss64) {
        let base = tss as *const Tss64 as u64;
        let limit = (size_of::<Tss64>() - 1) as u64;

        let low = (limit & 0xFFFF)
            | ((base & 0xFFFFFF) << 16)
            | (0x89u64 << 40)
            | (((limit >> 16) & 0xF) << 48)
            | (((base >> 24) & 0xFF) << 56);
        let high = (base >> 32) & 0xFFFF_FFFF;

        self.tss_descriptor[0] = low;
        self.tss_descriptor[1] = high;
    }
}

impl Default for GdtLayout {
    fn default() -> Self {
        Self::new()
    }
}

/// Placeholder type for the two raw `u64` words a TSS descriptor occupies;
/// kept distinct from `[u64; 2]` for self-documenting call sites.
pub type GdtTssEntry = [u64; 2];

/// The `lgdt` operand: table base and limit.
#[repr(C, packed)]
pub struct GdtDescriptor {
    pub limit: u16,
    pub base: u64,
}

impl GdtDescriptor {
    #[inline]
    pub fn from_layout(layout: &GdtLayout) -> Self {
        Self {
            limit: (size_of::<GdtLayout>() - 1) as u16,
            base: layout as *const GdtLayout as u64,
        }
    }
}

/// 64-bit Task State Segment. Only the fields this kernel actually uses
/// (ring-0 stack pointer, interrupt stack table, I/O bitmap base) are
/// tracked; the rest of the hardware structure is reserved padding.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct Tss64 {
    reserved0: u32,
    pub rsp0: u64,
    rsp1: u64,
    rsp2: u64,
    reserved1: u64,
    pub ist: [u64; 7],
    reserved2: u64,
    reserved3: u16,
    pub iomap_base: u16,
}

impl Tss64 {
    #[inline]
    pub const fn new() -> Self {
        Self {
            reserved0: 0,
            rsp0: 0,
            rsp1: 0,
            rsp2: 0,
            reserved1: 0,
            ist: [0; 7],
            reserved2: 0,
            reserved3: 0,
            iomap_base: 0,
        }
    }
}

impl Default for Tss64 {
    fn default() -> Self {
        Self::new()
    }
}

const _: () = assert!(size_of::<Tss64>() == 104);
