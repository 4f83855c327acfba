//! Shared memory segment access flags and error type for the `shm_*`
//! syscall family.

/// Map a shared segment read-only.
pub const SHM_ACCESS_RO: u32 = 0;
/// Map a shared segment read-write.
pub const SHM_ACCESS_RW: u32 = 1;

/// Failure modes a shared memory wrapper can report back to its caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShmError {
    InvalidSize,
    AllocationFailed,
    MappingFailed,
    PermissionDenied,
    InvalidToken,
}
