//! Typed kernel error codes, convertible to the negative-errno convention
//! syscall return values use throughout this ABI.

use crate::syscall::*;

/// A POSIX-style error condition a syscall handler can report.
///
/// Variants mirror the subset of errno values this kernel actually raises;
/// see `syscall::ERRNO_*` for the raw wire values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum KernelError {
    PermissionDenied,
    NoSuchEntity,
    NoSuchProcess,
    Interrupted,
    IoError,
    BadFileDescriptor,
    NoChild,
    TryAgain,
    OutOfMemory,
    Busy,
    FileExists,
    CrossDevice,
    NotADirectory,
    IsADirectory,
    InvalidArgument,
    NameTooLong,
    NotImplemented,
    DirectoryNotEmpty,
    BadAddress,
    ReadOnlyFilesystem,
    NoSpace,
    TimedOut,
    NoLink,
}

impl KernelError {
    /// The negated-errno value (as an unsigned 64-bit wire value) a syscall
    /// handler should return for this condition.
    #[inline]
    pub const fn as_errno(self) -> u64 {
        match self {
            Self::PermissionDenied => ERRNO_EPERM,
            Self::NoSuchEntity => ERRNO_ENOENT,
            Self::NoSuchProcess => ERRNO_ESRCH,
            Self::Interrupted => ERRNO_EINTR,
            Self::IoError => ERRNO_EIO,
            Self::BadFileDescriptor => ERRNO_EBADF,
            Self::NoChild => ERRNO_ECHILD,
            Self::TryAgain => ERRNO_EAGAIN,
            Self::OutOfMemory => ERRNO_ENOMEM,
            Self::Busy => ERRNO_EBUSY,
            Self::FileExists => ERRNO_EEXIST,
            Self::CrossDevice => ERRNO_EXDEV,
            Self::NotADirectory => ERRNO_ENOTDIR,
            Self::IsADirectory => ERRNO_EISDIR,
            Self::InvalidArgument => ERRNO_EINVAL,
            Self::NameTooLong => ERRNO_ENAMETOOLONG,
            Self::NotImplemented => ERRNO_ENOSYS,
            Self::DirectoryNotEmpty => ERRNO_ENOTEMPTY,
            Self::BadAddress => ERRNO_EFAULT,
            Self::ReadOnlyFilesystem => ERRNO_EROFS,
            Self::NoSpace => ERRNO_ENOSPC,
            Self::TimedOut => ERRNO_ETIMEDOUT,
            Self::NoLink => ERRNO_ENOLINK,
        }
    }
}
