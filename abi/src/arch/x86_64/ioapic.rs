//! I/O APIC register offsets and redirection entry flags, ABI-level copy of
//! the subset `slopos_drivers::ioapic_defs` exposes for cross-crate tests.

/// Version register index.
pub const IOAPIC_REG_VER: u8 = 0x01;
/// Redirection table base register index.
pub const IOAPIC_REG_REDIR_BASE: u8 = 0x10;

/// Active-high interrupt polarity (redirection entry bit 13 = 0).
pub const IOAPIC_FLAG_POLARITY_HIGH: u32 = 0u32 << 13;
/// Active-low interrupt polarity (redirection entry bit 13 = 1).
pub const IOAPIC_FLAG_POLARITY_LOW: u32 = 1u32 << 13;

/// Edge-triggered interrupt (redirection entry bit 15 = 0).
pub const IOAPIC_FLAG_TRIGGER_EDGE: u32 = 0u32 << 15;
/// Level-triggered interrupt (redirection entry bit 15 = 1).
pub const IOAPIC_FLAG_TRIGGER_LEVEL: u32 = 1u32 << 15;

/// Interrupt masked (redirection entry bit 16).
pub const IOAPIC_FLAG_MASK: u32 = 1u32 << 16;
