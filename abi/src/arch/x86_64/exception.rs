//! Human-readable exception names and criticality classification, used by
//! the page/double/general-protection fault handlers when logging and by
//! the panic path when deciding whether a fault is recoverable.

use super::idt::{EXCEPTION_DOUBLE_FAULT, EXCEPTION_MACHINE_CHECK, EXCEPTION_NMI};

/// Human-readable name for any interrupt vector (0-255). CPU exceptions get
/// their architectural name; everything else is reported generically.
pub fn get_exception_name(vector: u8) -> &'static str {
    match vector {
        0 => "Divide Error",
        1 => "Debug",
        2 => "Non-Maskable Interrupt",
        3 => "Breakpoint",
        4 => "Overflow",
        5 => "Bound Range Exceeded",
        6 => "Invalid Opcode",
        7 => "Device Not Available",
        8 => "Double Fault",
        9 => "Coprocessor Segment Overrun",
        10 => "Invalid TSS",
        11 => "Segment Not Present",
        12 => "Stack-Segment Fault",
        13 => "General Protection Fault",
        14 => "Page Fault",
        15 => "Reserved",
        16 => "x87 Floating-Point Error",
        17 => "Alignment Check",
        18 => "Machine Check",
        19 => "SIMD Floating-Point Exception",
        20 => "Virtualization Exception",
        21 => "Control Protection Exception",
        22..=31 => "Reserved",
        32..=255 => "Hardware Interrupt",
    }
}

/// Whether a fault on this vector indicates the kernel cannot safely
/// continue (double fault, NMI, machine check) versus a recoverable or
/// user-triggerable condition.
#[inline]
pub const fn exception_is_critical(vector: u8) -> bool {
    matches!(
        vector,
        EXCEPTION_NMI | EXCEPTION_DOUBLE_FAULT | EXCEPTION_MACHINE_CHECK
    )
}
