//! `flock(2)`-style advisory whole-file locking.
//!
//! Locks are keyed by the underlying file's identity (filesystem instance +
//! inode), not by fd, so two fds opened on the same file contend for the
//! same lock the way POSIX `flock` requires. Holders are tracked by process
//! ID so a process's own second `flock` call on an already-held lock is a
//! no-op rather than a self-deadlock.
//!
//! Structurally this mirrors the futex hash table: a fixed-size table under
//! an `IrqMutex`, blocked waiters parked with `block_current_task()` and
//! released with `unblock_task()` on unlock.

use core::ptr;

use slopos_abi::fs::{LOCK_EX, LOCK_NB, LOCK_SH, LOCK_UN};
use slopos_abi::task::BlockReason;
use slopos_lib::IrqMutex;

use super::scheduler::{block_current_task, scheduler_get_current_task, unblock_task};
use super::task_struct::Task;

const FLOCK_MAX_LOCKS: usize = 64;
const FLOCK_MAX_WAITERS: usize = 16;
const FLOCK_MAX_SHARERS: usize = 8;

type LockKey = (usize, u64);

#[derive(Clone, Copy)]
struct FlockWaiter {
    task: *mut Task,
}

impl FlockWaiter {
    const fn empty() -> Self {
        Self { task: ptr::null_mut() }
    }

    fn is_empty(&self) -> bool {
        self.task.is_null()
    }
}

// SAFETY: raw task pointers are only read/written under FLOCK_TABLE's lock.
unsafe impl Send for FlockWaiter {}

#[derive(Clone, Copy, PartialEq, Eq)]
enum LockState {
    Unlocked,
    Shared,
    Exclusive,
}

struct FlockEntry {
    key: Option<LockKey>,
    state: LockState,
    /// Owning process IDs. Exclusive locks use index 0 only.
    owners: [u32; FLOCK_MAX_SHARERS],
    owner_count: usize,
    waiters: [FlockWaiter; FLOCK_MAX_WAITERS],
}

impl FlockEntry {
    const fn empty() -> Self {
        Self {
            key: None,
            state: LockState::Unlocked,
            owners: [slopos_abi::task::INVALID_PROCESS_ID; FLOCK_MAX_SHARERS],
            owner_count: 0,
            waiters: [FlockWaiter::empty(); FLOCK_MAX_WAITERS],
        }
    }

    fn owns(&self, process_id: u32) -> bool {
        self.owners[..self.owner_count].contains(&process_id)
    }

    fn add_owner(&mut self, process_id: u32) {
        if !self.owns(process_id) && self.owner_count < FLOCK_MAX_SHARERS {
            self.owners[self.owner_count] = process_id;
            self.owner_count += 1;
        }
    }

    fn remove_owner(&mut self, process_id: u32) {
        if let Some(idx) = self.owners[..self.owner_count].iter().position(|&p| p == process_id) {
            self.owner_count -= 1;
            self.owners[idx] = self.owners[self.owner_count];
            self.owners[self.owner_count] = slopos_abi::task::INVALID_PROCESS_ID;
        }
        if self.owner_count == 0 {
            self.state = LockState::Unlocked;
            self.key = None;
        }
    }
}

struct FlockTable {
    entries: [FlockEntry; FLOCK_MAX_LOCKS],
}

impl FlockTable {
    const fn new() -> Self {
        const ENTRY: FlockEntry = FlockEntry::empty();
        Self {
            entries: [ENTRY; FLOCK_MAX_LOCKS],
        }
    }
}

static FLOCK_TABLE: IrqMutex<FlockTable> = IrqMutex::new(FlockTable::new());

fn find_or_alloc_entry(table: &mut FlockTable, key: LockKey) -> Option<usize> {
    let mut free = None;
    for (idx, entry) in table.entries.iter().enumerate() {
        if entry.key == Some(key) {
            return Some(idx);
        }
        if entry.key.is_none() && free.is_none() {
            free = Some(idx);
        }
    }
    if let Some(idx) = free {
        table.entries[idx].key = Some(key);
    }
    free
}

fn wake_all_waiters(entry: &mut FlockEntry) {
    for waiter in entry.waiters.iter_mut() {
        if !waiter.is_empty() {
            let task = waiter.task;
            *waiter = FlockWaiter::empty();
            let _ = unblock_task(task);
        }
    }
}

/// `flock(fd, operation)`. `key` identifies the underlying file (see
/// `slopos_fs::fileio::file_fd_lock_key`); `process_id` is the calling
/// process, used for ownership and for collapsing repeated locks by the same
/// holder into a no-op.
///
/// Returns `0` on success, `-EWOULDBLOCK` if `LOCK_NB` was set and the lock
/// is held incompatibly by another process, `-EINVAL` for a malformed
/// operation.
pub fn flock_acquire(key: LockKey, process_id: u32, operation: u32) -> i32 {
    let nonblock = operation & LOCK_NB != 0;
    let op = operation & !LOCK_NB;

    if op == LOCK_UN {
        return flock_release(key, process_id);
    }

    let want_exclusive = match op {
        LOCK_SH => false,
        LOCK_EX => true,
        _ => return slopos_abi::syscall::ERRNO_EINVAL as i32,
    };

    loop {
        {
            let mut table = FLOCK_TABLE.lock();
            let Some(idx) = find_or_alloc_entry(&mut table, key) else {
                return slopos_abi::syscall::ERRNO_ENOMEM as i32;
            };
            let entry = &mut table.entries[idx];

            let compatible = match entry.state {
                LockState::Unlocked => true,
                LockState::Shared => {
                    !want_exclusive || (entry.owner_count == 1 && entry.owns(process_id))
                }
                LockState::Exclusive => entry.owns(process_id),
            };

            if compatible {
                entry.state = if want_exclusive { LockState::Exclusive } else { LockState::Shared };
                entry.add_owner(process_id);
                return 0;
            }

            if nonblock {
                return slopos_abi::syscall::ERRNO_EAGAIN as i32;
            }

            let current = scheduler_get_current_task();
            if current.is_null() {
                return slopos_abi::syscall::ERRNO_EINVAL as i32;
            }
            let Some(slot) = entry.waiters.iter().position(FlockWaiter::is_empty) else {
                return slopos_abi::syscall::ERRNO_ENOMEM as i32;
            };
            entry.waiters[slot] = FlockWaiter { task: current };
            unsafe {
                (*current).block_reason = BlockReason::FlockWait;
            }
        }
        // Table lock dropped; block until woken by a release, then recheck.
        block_current_task();
    }
}

fn flock_release(key: LockKey, process_id: u32) -> i32 {
    let mut table = FLOCK_TABLE.lock();
    for entry in table.entries.iter_mut() {
        if entry.key == Some(key) {
            if !entry.owns(process_id) {
                return slopos_abi::syscall::ERRNO_EACCES as i32;
            }
            entry.remove_owner(process_id);
            if entry.key.is_none() {
                wake_all_waiters(entry);
            }
            return 0;
        }
    }
    0
}

/// Release every lock a terminating process holds, waking anyone blocked on
/// them. Called from task cleanup so a crashed/exited holder never wedges
/// other processes waiting on its locks.
pub fn flock_release_all_for_process(process_id: u32) {
    let mut table = FLOCK_TABLE.lock();
    for entry in table.entries.iter_mut() {
        if entry.key.is_some() && entry.owns(process_id) {
            entry.remove_owner(process_id);
            if entry.key.is_none() {
                wake_all_waiters(entry);
            }
        }
    }
}
