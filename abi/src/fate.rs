//! Shared result type for the "fate" (chance/reward) subsystem exposed to
//! userland via the scheduler and UI syscall handlers.

/// Outcome of a fate roll: an opaque correlation token plus the rolled value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct FateResult {
    pub token: u32,
    pub value: u32,
}
