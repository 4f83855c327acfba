use core::ffi::{c_char, c_int};
use core::mem::{self, MaybeUninit};
use core::slice;

use slopos_lib::{InitFlag, IrqMutex};

use slopos_abi::fs::{FS_TYPE_FILE, USER_FS_OPEN_CREAT, UserFsEntry, UserFsStat};
use slopos_abi::syscall::{
    F_DUPFD, F_GETFD, F_GETFL, F_SETFD, F_SETFL, FD_CLOEXEC, O_CLOEXEC, O_NONBLOCK, POLLERR,
    POLLHUP, POLLIN, POLLNVAL, POLLOUT, POLLPRI, SEEK_CUR, SEEK_END, SEEK_SET,
};

use crate::vfs::traits::FileType;
use crate::vfs::{
    FileSystem, InodeId, resolve_path, vfs_list, vfs_mkdir, vfs_open, vfs_readlink, vfs_rename,
    vfs_stat, vfs_unlink,
};

#[allow(non_camel_case_types)]
type ssize_t = isize;

const FILE_OPEN_READ: u32 = 1 << 0;
const FILE_OPEN_WRITE: u32 = 1 << 1;
const FILE_OPEN_APPEND: u32 = 1 << 3;

use slopos_abi::task::INVALID_PROCESS_ID;
use slopos_mm::memory_layout_defs::MAX_PROCESSES;

use crate::MAX_PATH_LEN;

const FILEIO_MAX_OPEN_FILES: usize = 32;
const MAX_PIPES: usize = 64;
const PIPE_BUFFER_SIZE: usize = 4096;
const INVALID_PIPE_ID: u32 = u32::MAX;
const MAX_TIMERFDS: usize = 64;
const INVALID_TIMERFD_ID: u32 = u32::MAX;

#[derive(Clone, Copy)]
struct PipeSlot {
    valid: bool,
    read_pos: usize,
    write_pos: usize,
    len: usize,
    readers: u16,
    writers: u16,
    buffer: [u8; PIPE_BUFFER_SIZE],
}

impl PipeSlot {
    const fn new() -> Self {
        Self {
            valid: false,
            read_pos: 0,
            write_pos: 0,
            len: 0,
            readers: 0,
            writers: 0,
            buffer: [0; PIPE_BUFFER_SIZE],
        }
    }
}

struct PipeState {
    slots: [PipeSlot; MAX_PIPES],
}

impl PipeState {
    const fn new() -> Self {
        Self {
            slots: [PipeSlot::new(); MAX_PIPES],
        }
    }
}

static PIPE_STATE: IrqMutex<PipeState> = IrqMutex::new(PipeState::new());

/// A `timerfd_create` slot: expiry/interval are expressed in the platform's
/// own tick units (see `slopos_core::platform::timer_ticks`), set by the
/// caller after converting from the requested `timespec`. `fileio` itself
/// has no notion of wall-clock time; it only counts expirations.
#[derive(Clone, Copy)]
struct TimerFdSlot {
    valid: bool,
    refs: u16,
    expiry_tick: u64,
    interval_ticks: u64,
    counter: u64,
}

impl TimerFdSlot {
    const fn new() -> Self {
        Self {
            valid: false,
            refs: 0,
            expiry_tick: 0,
            interval_ticks: 0,
            counter: 0,
        }
    }
}

struct TimerFdState {
    slots: [TimerFdSlot; MAX_TIMERFDS],
}

impl TimerFdState {
    const fn new() -> Self {
        Self {
            slots: [TimerFdSlot::new(); MAX_TIMERFDS],
        }
    }
}

static TIMERFD_STATE: IrqMutex<TimerFdState> = IrqMutex::new(TimerFdState::new());

#[derive(Clone, Copy)]
struct FileDescriptor {
    inode: InodeId,
    fs: Option<&'static dyn FileSystem>,
    position: usize,
    flags: u32,
    valid: bool,
    cloexec: bool,
    /// When true, reads/writes route to the platform console/TTY instead of a filesystem.
    console: bool,
    pipe_id: u32,
    pipe_read_end: bool,
    pipe_write_end: bool,
    timerfd_id: u32,
}

impl FileDescriptor {
    const fn new() -> Self {
        Self {
            inode: 0,
            fs: None,
            position: 0,
            flags: 0,
            valid: false,
            cloexec: false,
            console: false,
            pipe_id: INVALID_PIPE_ID,
            pipe_read_end: false,
            pipe_write_end: false,
            timerfd_id: INVALID_TIMERFD_ID,
        }
    }
}

unsafe impl Send for FileDescriptor {}

/// Current working directory, stored per-table so it survives fork (cloned
/// along with the rest of the descriptor table) and is private to exec.
#[derive(Clone, Copy)]
struct Cwd {
    path: [u8; MAX_PATH_LEN],
    len: usize,
}

impl Cwd {
    const fn root() -> Self {
        let mut path = [0u8; MAX_PATH_LEN];
        path[0] = b'/';
        Self { path, len: 1 }
    }

    fn as_bytes(&self) -> &[u8] {
        &self.path[..self.len]
    }
}

struct FileTableSlot {
    process_id: u32,
    in_use: bool,
    lock: IrqMutex<()>,
    descriptors: [FileDescriptor; FILEIO_MAX_OPEN_FILES],
    cwd: Cwd,
}

impl FileTableSlot {
    const fn new(in_use: bool) -> Self {
        Self {
            process_id: INVALID_PROCESS_ID,
            in_use,
            lock: IrqMutex::new(()),
            descriptors: [FileDescriptor::new(); FILEIO_MAX_OPEN_FILES],
            cwd: Cwd::root(),
        }
    }
}

unsafe impl Send for FileTableSlot {}

struct FileioState {
    initialized: bool,
    kernel: MaybeUninit<FileTableSlot>,
    processes: [MaybeUninit<FileTableSlot>; MAX_PROCESSES],
}

impl FileioState {
    const fn uninitialized() -> Self {
        let processes: [MaybeUninit<FileTableSlot>; MAX_PROCESSES] = unsafe {
            MaybeUninit::<[MaybeUninit<FileTableSlot>; MAX_PROCESSES]>::uninit().assume_init()
        };
        Self {
            initialized: false,
            kernel: MaybeUninit::uninit(),
            processes,
        }
    }
}

unsafe impl Send for FileioState {}

static FILEIO_STATE: IrqMutex<FileioState> = IrqMutex::new(FileioState::uninitialized());
static FILEIO_INIT: InitFlag = InitFlag::new();

fn with_state<R>(f: impl FnOnce(&mut FileioState) -> R) -> R {
    let mut guard = FILEIO_STATE.lock();
    f(&mut *guard)
}

fn with_tables<R>(
    f: impl FnOnce(&mut FileTableSlot, &mut [FileTableSlot; MAX_PROCESSES]) -> R,
) -> R {
    with_state(|state| {
        ensure_initialized(state);
        let kernel = unsafe { state.kernel.assume_init_mut() };
        let processes = unsafe {
            mem::transmute::<_, &mut [FileTableSlot; MAX_PROCESSES]>(&mut state.processes)
        };
        f(kernel, processes)
    })
}

fn reset_descriptor(desc: &mut FileDescriptor) {
    if desc.valid && desc.pipe_id != INVALID_PIPE_ID {
        let mut pipe_state = PIPE_STATE.lock();
        let idx = desc.pipe_id as usize;
        if idx < MAX_PIPES {
            let slot = &mut pipe_state.slots[idx];
            if slot.valid {
                if desc.pipe_read_end && slot.readers > 0 {
                    slot.readers -= 1;
                }
                if desc.pipe_write_end && slot.writers > 0 {
                    slot.writers -= 1;
                }
                if slot.readers == 0 && slot.writers == 0 {
                    *slot = PipeSlot::new();
                }
            }
        }
    }

    if desc.valid && desc.timerfd_id != INVALID_TIMERFD_ID {
        let mut state = TIMERFD_STATE.lock();
        let idx = desc.timerfd_id as usize;
        if idx < MAX_TIMERFDS {
            let slot = &mut state.slots[idx];
            if slot.valid && slot.refs > 0 {
                slot.refs -= 1;
                if slot.refs == 0 {
                    *slot = TimerFdSlot::new();
                }
            }
        }
    }

    desc.inode = 0;
    desc.fs = None;
    desc.position = 0;
    desc.flags = 0;
    desc.valid = false;
    desc.cloexec = false;
    desc.console = false;
    desc.pipe_id = INVALID_PIPE_ID;
    desc.pipe_read_end = false;
    desc.pipe_write_end = false;
    desc.timerfd_id = INVALID_TIMERFD_ID;
}

fn alloc_pipe_slot() -> Option<u32> {
    let mut state = PIPE_STATE.lock();
    for (idx, slot) in state.slots.iter_mut().enumerate() {
        if !slot.valid {
            *slot = PipeSlot::new();
            slot.valid = true;
            return Some(idx as u32);
        }
    }
    None
}

fn pipe_slot_mut(state: &mut PipeState, pipe_id: u32) -> Option<&mut PipeSlot> {
    let idx = pipe_id as usize;
    if idx >= MAX_PIPES {
        return None;
    }
    let slot = &mut state.slots[idx];
    if !slot.valid {
        return None;
    }
    Some(slot)
}

fn pipe_read_into(slot: &mut PipeSlot, out: &mut [u8]) -> usize {
    let mut copied = 0usize;
    while copied < out.len() && slot.len > 0 {
        out[copied] = slot.buffer[slot.read_pos];
        slot.read_pos = (slot.read_pos + 1) % PIPE_BUFFER_SIZE;
        slot.len -= 1;
        copied += 1;
    }
    copied
}

fn pipe_write_from(slot: &mut PipeSlot, input: &[u8]) -> usize {
    let mut written = 0usize;
    while written < input.len() && slot.len < PIPE_BUFFER_SIZE {
        slot.buffer[slot.write_pos] = input[written];
        slot.write_pos = (slot.write_pos + 1) % PIPE_BUFFER_SIZE;
        slot.len += 1;
        written += 1;
    }
    written
}

fn alloc_timerfd_slot() -> Option<u32> {
    let mut state = TIMERFD_STATE.lock();
    for (idx, slot) in state.slots.iter_mut().enumerate() {
        if !slot.valid {
            *slot = TimerFdSlot::new();
            slot.valid = true;
            slot.refs = 1;
            return Some(idx as u32);
        }
    }
    None
}

fn timerfd_slot_mut(state: &mut TimerFdState, timerfd_id: u32) -> Option<&mut TimerFdSlot> {
    let idx = timerfd_id as usize;
    if idx >= MAX_TIMERFDS {
        return None;
    }
    let slot = &mut state.slots[idx];
    if !slot.valid {
        return None;
    }
    Some(slot)
}

fn timerfd_revents(slot: &TimerFdSlot, events: u16) -> u16 {
    if slot.counter > 0 {
        events & POLLIN
    } else {
        0
    }
}

fn pipe_revents(slot: &PipeSlot, desc: &FileDescriptor, events: u16) -> u16 {
    let mut revents = 0u16;

    if desc.pipe_read_end {
        if slot.len > 0 {
            revents |= events & (POLLIN | POLLPRI);
        }
        if slot.writers == 0 {
            revents |= POLLHUP;
            if (events & POLLIN) != 0 {
                revents |= POLLIN;
            }
        }
    }

    if desc.pipe_write_end {
        if slot.readers == 0 {
            revents |= POLLERR | POLLHUP;
        } else if slot.len < PIPE_BUFFER_SIZE {
            revents |= events & POLLOUT;
        }
    }

    revents
}

fn clone_descriptor_for_dup(src: &FileDescriptor) -> Option<FileDescriptor> {
    let copy = *src;

    if copy.timerfd_id != INVALID_TIMERFD_ID {
        let mut state = TIMERFD_STATE.lock();
        let slot = timerfd_slot_mut(&mut state, copy.timerfd_id)?;
        slot.refs = slot.refs.saturating_add(1);
        return Some(copy);
    }

    if copy.pipe_id == INVALID_PIPE_ID {
        return Some(copy);
    }

    let mut pipe_state = PIPE_STATE.lock();
    let slot = pipe_slot_mut(&mut pipe_state, copy.pipe_id)?;
    if copy.pipe_read_end {
        slot.readers = slot.readers.saturating_add(1);
    }
    if copy.pipe_write_end {
        slot.writers = slot.writers.saturating_add(1);
    }
    Some(copy)
}

fn reset_table(table: &mut FileTableSlot) {
    for desc in table.descriptors.iter_mut() {
        reset_descriptor(desc);
    }
    table.cwd = Cwd::root();
}

fn find_free_table(processes: &mut [FileTableSlot; MAX_PROCESSES]) -> Option<&mut FileTableSlot> {
    for slot in processes.iter_mut() {
        if !slot.in_use {
            return Some(slot);
        }
    }
    None
}

fn table_for_pid<'a>(
    kernel: &'a mut FileTableSlot,
    processes: &'a mut [FileTableSlot; MAX_PROCESSES],
    pid: u32,
) -> Option<&'a mut FileTableSlot> {
    if pid == INVALID_PROCESS_ID {
        return Some(kernel);
    }
    for slot in processes.iter_mut() {
        if slot.in_use && slot.process_id == pid {
            return Some(slot);
        }
    }
    None
}

fn get_descriptor<'a>(table: &'a mut FileTableSlot, fd: c_int) -> Option<&'a mut FileDescriptor> {
    if fd < 0 || fd as usize >= FILEIO_MAX_OPEN_FILES {
        return None;
    }
    let desc = &mut table.descriptors[fd as usize];
    if !desc.valid {
        return None;
    }
    Some(desc)
}

fn find_free_slot(table: &FileTableSlot) -> Option<usize> {
    find_free_slot_from(table, 0)
}

fn find_free_slot_from(table: &FileTableSlot, min_fd: usize) -> Option<usize> {
    for idx in min_fd..FILEIO_MAX_OPEN_FILES {
        if !table.descriptors[idx].valid {
            return Some(idx);
        }
    }
    None
}

fn ensure_initialized(state: &mut FileioState) {
    if !FILEIO_INIT.init_once() {
        return;
    }

    state.kernel.write(FileTableSlot::new(true));
    for slot in state.processes.iter_mut() {
        slot.write(FileTableSlot::new(false));
    }
    let kernel = unsafe { state.kernel.assume_init_mut() };
    reset_table(kernel);
    let processes =
        unsafe { mem::transmute::<_, &mut [FileTableSlot; MAX_PROCESSES]>(&mut state.processes) };
    for slot in processes.iter_mut() {
        reset_table(slot);
        slot.process_id = INVALID_PROCESS_ID;
        slot.in_use = false;
    }
    state.initialized = true;
}

unsafe fn cstr_len(ptr_in: *const c_char) -> usize {
    if ptr_in.is_null() {
        return 0;
    }
    let mut len = 0usize;
    unsafe {
        while *ptr_in.add(len) != 0 {
            len += 1;
        }
    }
    len
}

unsafe fn path_bytes<'a>(path: *const c_char) -> Option<&'a [u8]> {
    if path.is_null() {
        return None;
    }
    unsafe {
        let len = cstr_len(path);
        Some(slice::from_raw_parts(
            path as *const u8,
            len.min(MAX_PATH_LEN),
        ))
    }
}

/// Bootstrap FD 0 (stdin), 1 (stdout), 2 (stderr) as console descriptors.
///
/// Console descriptors are valid file descriptors that route reads/writes
/// through the platform console/TTY instead of a filesystem.  This ensures
/// every new user process satisfies the POSIX FD bootstrap contract.
fn bootstrap_console_fds(table: &mut FileTableSlot) {
    // FD 0 = stdin (read-only console)
    table.descriptors[0] = FileDescriptor {
        inode: 0,
        fs: None,
        position: 0,
        flags: FILE_OPEN_READ,
        valid: true,
        cloexec: false,
        console: true,
        pipe_id: INVALID_PIPE_ID,
        pipe_read_end: false,
        pipe_write_end: false,
        timerfd_id: INVALID_TIMERFD_ID,
    };
    // FD 1 = stdout (write-only console)
    table.descriptors[1] = FileDescriptor {
        inode: 0,
        fs: None,
        position: 0,
        flags: FILE_OPEN_WRITE,
        valid: true,
        cloexec: false,
        console: true,
        pipe_id: INVALID_PIPE_ID,
        pipe_read_end: false,
        pipe_write_end: false,
        timerfd_id: INVALID_TIMERFD_ID,
    };
    // FD 2 = stderr (write-only console)
    table.descriptors[2] = FileDescriptor {
        inode: 0,
        fs: None,
        position: 0,
        flags: FILE_OPEN_WRITE,
        valid: true,
        cloexec: false,
        console: true,
        pipe_id: INVALID_PIPE_ID,
        pipe_read_end: false,
        pipe_write_end: false,
        timerfd_id: INVALID_TIMERFD_ID,
    };
}

pub fn fileio_create_table_for_process(process_id: u32) -> c_int {
    if process_id == INVALID_PROCESS_ID {
        return 0;
    }
    with_tables(|kernel, processes| {
        if table_for_pid(kernel, processes, process_id).is_some() {
            return 0;
        }
        let Some(slot) = find_free_table(processes) else {
            return -1;
        };
        reset_table(slot);
        slot.process_id = process_id;
        slot.in_use = true;
        bootstrap_console_fds(slot);
        0
    })
}

pub fn fileio_destroy_table_for_process(process_id: u32) {
    if process_id == INVALID_PROCESS_ID {
        return;
    }
    with_tables(|kernel, processes| {
        let kernel_ptr = kernel as *mut FileTableSlot;
        if let Some(table) = table_for_pid(kernel, processes, process_id) {
            let table_ptr = table as *mut FileTableSlot;
            if table_ptr == kernel_ptr {
                return;
            }
            let guard = unsafe { (&(*table_ptr).lock).lock() };
            unsafe {
                reset_table(&mut *table_ptr);
                (*table_ptr).process_id = INVALID_PROCESS_ID;
                (*table_ptr).in_use = false;
            }
            drop(guard);
        }
    });
}

pub fn fileio_clone_table_for_process(src_process_id: u32, dst_process_id: u32) -> c_int {
    if src_process_id == INVALID_PROCESS_ID || dst_process_id == INVALID_PROCESS_ID {
        return -1;
    }
    if src_process_id == dst_process_id {
        return 0;
    }

    with_tables(|kernel, processes| {
        let src_table = match table_for_pid(kernel, processes, src_process_id) {
            Some(t) => t as *const FileTableSlot,
            None => return -1,
        };

        let dst_slot = match find_free_table(processes) {
            Some(s) => s,
            None => return -1,
        };

        reset_table(dst_slot);
        dst_slot.process_id = dst_process_id;
        dst_slot.in_use = true;
        dst_slot.cwd = unsafe { (*src_table).cwd };

        for (i, src_desc) in unsafe { (*src_table).descriptors.iter().enumerate() } {
            if src_desc.valid {
                let Some(copy) = clone_descriptor_for_dup(src_desc) else {
                    reset_table(dst_slot);
                    dst_slot.process_id = INVALID_PROCESS_ID;
                    dst_slot.in_use = false;
                    return -1;
                };
                dst_slot.descriptors[i] = copy;
            }
        }

        0
    })
}

pub fn file_open_for_process(process_id: u32, path: *const c_char, flags: u32) -> c_int {
    if path.is_null() || (flags & (FILE_OPEN_READ | FILE_OPEN_WRITE)) == 0 {
        return -1;
    }
    if (flags & FILE_OPEN_APPEND) != 0 && (flags & FILE_OPEN_WRITE) == 0 {
        return -1;
    }

    let path_bytes = match unsafe { path_bytes(path) } {
        Some(p) => p,
        None => return -1,
    };

    let create = (flags & USER_FS_OPEN_CREAT) != 0;

    let handle = match vfs_open(path_bytes, create) {
        Ok(h) => h,
        Err(_) => return -1,
    };

    with_tables(|kernel, processes| {
        let kernel_ptr = kernel as *mut FileTableSlot;
        let table_ptr = if let Some(t) = table_for_pid(kernel, processes, process_id) {
            t as *mut FileTableSlot
        } else if let Some(t) = find_free_table(processes) {
            t as *mut FileTableSlot
        } else {
            kernel_ptr
        };
        let table: &mut FileTableSlot = unsafe { &mut *table_ptr };

        if !table.in_use {
            table.in_use = true;
            table.process_id = process_id;
            reset_table(table);
        }

        let table_ptr: *mut FileTableSlot = table;
        let guard = unsafe { (&(*table_ptr).lock).lock() };

        let Some(slot_idx) = find_free_slot(table) else {
            drop(guard);
            return -1;
        };

        let desc = unsafe { &mut (*table_ptr).descriptors[slot_idx] };

        let position = if (flags & FILE_OPEN_APPEND) != 0 {
            match handle.size() {
                Ok(size) => size as usize,
                Err(_) => {
                    drop(guard);
                    return -1;
                }
            }
        } else {
            0
        };

        desc.inode = handle.inode;
        desc.fs = Some(handle.fs);
        desc.flags = flags;
        desc.cloexec = (flags & O_CLOEXEC as u32) != 0;
        desc.position = position;
        desc.valid = true;
        desc.console = false;
        desc.pipe_id = INVALID_PIPE_ID;
        desc.pipe_read_end = false;
        desc.pipe_write_end = false;

        drop(guard);
        slot_idx as c_int
    })
}

pub fn file_read_fd(process_id: u32, fd: c_int, buffer: *mut c_char, count: usize) -> ssize_t {
    if buffer.is_null() || count == 0 {
        return 0;
    }

    with_tables(|kernel, processes| {
        let Some(table) = table_for_pid(kernel, processes, process_id) else {
            return -1;
        };
        if !table.in_use {
            return -1;
        }
        let table_ptr: *mut FileTableSlot = table;
        let guard = unsafe { (&(*table_ptr).lock).lock() };
        let Some(desc) = (unsafe { get_descriptor(&mut *table_ptr, fd) }) else {
            drop(guard);
            return -1;
        };
        if (desc.flags & FILE_OPEN_READ) == 0 {
            drop(guard);
            return -1;
        }

        if desc.timerfd_id != INVALID_TIMERFD_ID {
            if count < 8 {
                drop(guard);
                return -1;
            }
            let expirations = {
                let mut state = TIMERFD_STATE.lock();
                let Some(slot) = timerfd_slot_mut(&mut state, desc.timerfd_id) else {
                    drop(guard);
                    return -1;
                };
                if slot.counter == 0 {
                    drop(guard);
                    return -1;
                }
                let n = slot.counter;
                slot.counter = 0;
                n
            };
            drop(guard);
            unsafe {
                core::ptr::copy_nonoverlapping(
                    expirations.to_ne_bytes().as_ptr(),
                    buffer as *mut u8,
                    8,
                );
            }
            return 8;
        }

        if desc.pipe_id != INVALID_PIPE_ID {
            if !desc.pipe_read_end {
                drop(guard);
                return -1;
            }
            let mut local = [0u8; 512];
            let mut remaining = count;
            let mut total = 0usize;
            while remaining > 0 {
                let chunk = remaining.min(local.len());
                let copied = {
                    let mut pipe_state = PIPE_STATE.lock();
                    let Some(slot) = pipe_slot_mut(&mut pipe_state, desc.pipe_id) else {
                        drop(guard);
                        return -1;
                    };
                    if slot.len == 0 {
                        if slot.writers == 0 {
                            break;
                        }
                        if total == 0 {
                            drop(guard);
                            return -1;
                        }
                        break;
                    }
                    pipe_read_into(slot, &mut local[..chunk])
                };
                if copied == 0 {
                    break;
                }
                unsafe {
                    core::ptr::copy_nonoverlapping(
                        local.as_ptr(),
                        (buffer as *mut u8).add(total),
                        copied,
                    );
                }
                total += copied;
                remaining -= copied;
            }
            drop(guard);
            return total as ssize_t;
        }

        // Console descriptors: stdin returns 0 (no data available).
        // Interactive console input is handled by SYSCALL_READ / SYSCALL_READ_CHAR.
        if desc.console {
            drop(guard);
            return 0;
        }

        let fs = match desc.fs {
            Some(fs) => fs,
            None => {
                drop(guard);
                return -1;
            }
        };

        let buf = unsafe { slice::from_raw_parts_mut(buffer as *mut u8, count) };
        let rc = fs.read(desc.inode, desc.position as u64, buf);
        if let Ok(read_len) = rc {
            desc.position = desc.position.saturating_add(read_len);
            drop(guard);
            return read_len as ssize_t;
        }
        drop(guard);
        -1
    })
}

pub fn file_write_fd(process_id: u32, fd: c_int, buffer: *const c_char, count: usize) -> ssize_t {
    if buffer.is_null() || count == 0 {
        return 0;
    }
    with_tables(|kernel, processes| {
        let Some(table) = table_for_pid(kernel, processes, process_id) else {
            return -1;
        };
        if !table.in_use {
            return -1;
        }
        let table_ptr: *mut FileTableSlot = table;
        let guard = unsafe { (&(*table_ptr).lock).lock() };
        let Some(desc) = (unsafe { get_descriptor(&mut *table_ptr, fd) }) else {
            drop(guard);
            return -1;
        };
        if (desc.flags & FILE_OPEN_WRITE) == 0 {
            drop(guard);
            return -1;
        }

        if desc.pipe_id != INVALID_PIPE_ID {
            if !desc.pipe_write_end {
                drop(guard);
                return -1;
            }

            let input = unsafe { slice::from_raw_parts(buffer as *const u8, count) };
            let written = {
                let mut pipe_state = PIPE_STATE.lock();
                let Some(slot) = pipe_slot_mut(&mut pipe_state, desc.pipe_id) else {
                    drop(guard);
                    return -1;
                };
                if slot.readers == 0 {
                    drop(guard);
                    return -1;
                }
                pipe_write_from(slot, input)
            };
            drop(guard);
            if written == 0 {
                return -1;
            }
            return written as ssize_t;
        }

        // Console descriptors: route stdout/stderr writes to serial port.
        if desc.console {
            drop(guard);
            let bytes = unsafe { slice::from_raw_parts(buffer as *const u8, count) };
            // SAFETY: COM1 is always valid on x86_64 QEMU targets.
            unsafe {
                slopos_lib::ports::serial_write_bytes(slopos_lib::ports::COM1, bytes);
            }
            return count as ssize_t;
        }

        let fs = match desc.fs {
            Some(fs) => fs,
            None => {
                drop(guard);
                return -1;
            }
        };

        let buf = unsafe { slice::from_raw_parts(buffer as *const u8, count) };
        let rc = fs.write(desc.inode, desc.position as u64, buf);
        if let Ok(written) = rc {
            desc.position = desc.position.saturating_add(written);
            drop(guard);
            return written as ssize_t;
        }
        drop(guard);
        -1
    })
}

pub fn file_close_fd(process_id: u32, fd: c_int) -> c_int {
    with_tables(|kernel, processes| {
        let Some(table) = table_for_pid(kernel, processes, process_id) else {
            return -1;
        };
        if !table.in_use {
            return -1;
        }
        let table_ptr: *mut FileTableSlot = table;
        let guard = unsafe { (&(*table_ptr).lock).lock() };
        let Some(desc) = (unsafe { get_descriptor(&mut *table_ptr, fd) }) else {
            drop(guard);
            return -1;
        };
        reset_descriptor(desc);
        drop(guard);
        0
    })
}

/// POSIX lseek: reposition file offset.
///
/// Returns the new offset on success, or -1 on error (ESPIPE for console FDs).
/// The offset parameter is signed to support negative seeks with SEEK_CUR/SEEK_END.
pub fn file_seek_fd(process_id: u32, fd: c_int, offset: i64, whence: u32) -> i64 {
    with_tables(|kernel, processes| {
        let Some(table) = table_for_pid(kernel, processes, process_id) else {
            return -1;
        };
        if !table.in_use {
            return -1;
        }
        let table_ptr: *mut FileTableSlot = table;
        let guard = unsafe { (&(*table_ptr).lock).lock() };
        let Some(desc) = (unsafe { get_descriptor(&mut *table_ptr, fd) }) else {
            drop(guard);
            return -1;
        };

        // Console descriptors are not seekable (POSIX ESPIPE).
        if desc.console {
            drop(guard);
            return -1;
        }

        let fs = match desc.fs {
            Some(fs) => fs,
            None => {
                drop(guard);
                return -1;
            }
        };

        let size = match fs.stat(desc.inode) {
            Ok(stat) => stat.size as i64,
            Err(_) => {
                drop(guard);
                return -1;
            }
        };

        // SEEK_END computes `size - offset`, not POSIX's `size + offset` — this
        // matches the original source this facade was ported from and is kept
        // deliberately (see DESIGN.md).
        let new_pos = match whence as u64 {
            SEEK_SET => offset,
            SEEK_CUR => (desc.position as i64).saturating_add(offset).clamp(0, size),
            SEEK_END => size.saturating_sub(offset),
            _ => {
                drop(guard);
                return -1;
            }
        };

        if new_pos < 0 {
            drop(guard);
            return -1;
        }

        desc.position = new_pos as usize;
        drop(guard);
        new_pos
    })
}

pub fn file_get_size_fd(process_id: u32, fd: c_int) -> usize {
    with_tables(|kernel, processes| {
        let Some(table) = table_for_pid(kernel, processes, process_id) else {
            return usize::MAX;
        };
        if !table.in_use {
            return usize::MAX;
        }
        let table_ptr: *mut FileTableSlot = table;
        let guard = unsafe { (&(*table_ptr).lock).lock() };
        let desc = unsafe { get_descriptor(&mut *table_ptr, fd) };
        let size = if let Some(desc) = desc {
            if let Some(fs) = desc.fs {
                match fs.stat(desc.inode) {
                    Ok(stat) => stat.size as usize,
                    Err(_) => usize::MAX,
                }
            } else {
                usize::MAX
            }
        } else {
            usize::MAX
        };
        drop(guard);
        size
    })
}

pub fn file_exists_path(path: *const c_char) -> c_int {
    if path.is_null() {
        return 0;
    }
    let path_bytes = match unsafe { path_bytes(path) } {
        Some(p) => p,
        None => return 0,
    };
    let rc = vfs_stat(path_bytes);
    if let Ok((kind, _)) = rc {
        return if kind == FS_TYPE_FILE { 1 } else { 0 };
    }
    0
}

pub fn file_unlink_path(path: *const c_char) -> c_int {
    if path.is_null() {
        return -1;
    }
    let path_bytes = match unsafe { path_bytes(path) } {
        Some(p) => p,
        None => return -1,
    };
    if vfs_unlink(path_bytes).is_ok() {
        0
    } else {
        -1
    }
}

pub fn file_mkdir_path(path: *const c_char) -> c_int {
    if path.is_null() {
        return -1;
    }
    let path_bytes = match unsafe { path_bytes(path) } {
        Some(p) => p,
        None => return -1,
    };
    if vfs_mkdir(path_bytes).is_ok() { 0 } else { -1 }
}

pub fn file_stat_path(path: *const c_char, out_type: &mut u8, out_size: &mut u32) -> c_int {
    if path.is_null() {
        return -1;
    }
    let path_bytes = match unsafe { path_bytes(path) } {
        Some(p) => p,
        None => return -1,
    };
    if let Ok((kind, size)) = vfs_stat(path_bytes) {
        *out_type = kind;
        *out_size = size;
        return 0;
    }
    -1
}

pub fn file_list_path(
    path: *const c_char,
    entries: *mut UserFsEntry,
    max: u32,
    out_count: &mut u32,
) -> c_int {
    if path.is_null() || entries.is_null() || max == 0 {
        return -1;
    }
    let path_bytes = match unsafe { path_bytes(path) } {
        Some(p) => p,
        None => return -1,
    };
    let cap = max as usize;
    let out_slice = unsafe { slice::from_raw_parts_mut(entries, cap) };
    match vfs_list(path_bytes, out_slice) {
        Ok(count) => {
            *out_count = count as u32;
            0
        }
        Err(_) => -1,
    }
}

pub fn file_is_console_fd(process_id: u32, fd: c_int) -> bool {
    with_tables(|kernel, processes| {
        let Some(table) = table_for_pid(kernel, processes, process_id) else {
            return false;
        };
        if !table.in_use {
            return false;
        }
        let table_ptr: *mut FileTableSlot = table;
        let guard = unsafe { (&(*table_ptr).lock).lock() };
        let is_console = unsafe { get_descriptor(&mut *table_ptr, fd) }
            .map(|d| d.console)
            .unwrap_or(false);
        drop(guard);
        is_console
    })
}

pub fn file_pipe_create(
    process_id: u32,
    flags: u32,
    out_read_fd: &mut c_int,
    out_write_fd: &mut c_int,
) -> c_int {
    if flags & !(O_NONBLOCK as u32 | O_CLOEXEC as u32) != 0 {
        return -1;
    }

    let pipe_id = match alloc_pipe_slot() {
        Some(id) => id,
        None => return -1,
    };

    let rc = with_tables(|kernel, processes| {
        let kernel_ptr = kernel as *mut FileTableSlot;
        let table_ptr = if let Some(t) = table_for_pid(kernel, processes, process_id) {
            t as *mut FileTableSlot
        } else if let Some(t) = find_free_table(processes) {
            t as *mut FileTableSlot
        } else {
            kernel_ptr
        };

        let table = unsafe { &mut *table_ptr };
        if !table.in_use {
            table.in_use = true;
            table.process_id = process_id;
            reset_table(table);
        }

        let guard = unsafe { (&(*table_ptr).lock).lock() };
        let Some(read_idx) = find_free_slot(table) else {
            drop(guard);
            return -1;
        };
        table.descriptors[read_idx].valid = true;

        let Some(write_idx) = find_free_slot(table) else {
            reset_descriptor(&mut table.descriptors[read_idx]);
            drop(guard);
            return -1;
        };

        let nonblock = (flags & O_NONBLOCK as u32) != 0;
        let cloexec = (flags & O_CLOEXEC as u32) != 0;

        table.descriptors[read_idx] = FileDescriptor {
            inode: 0,
            fs: None,
            position: 0,
            flags: FILE_OPEN_READ | if nonblock { O_NONBLOCK as u32 } else { 0 },
            valid: true,
            cloexec,
            console: false,
            pipe_id,
            pipe_read_end: true,
            pipe_write_end: false,
            timerfd_id: INVALID_TIMERFD_ID,
        };

        table.descriptors[write_idx] = FileDescriptor {
            inode: 0,
            fs: None,
            position: 0,
            flags: FILE_OPEN_WRITE | if nonblock { O_NONBLOCK as u32 } else { 0 },
            valid: true,
            cloexec,
            console: false,
            pipe_id,
            pipe_read_end: false,
            pipe_write_end: true,
            timerfd_id: INVALID_TIMERFD_ID,
        };

        {
            let mut pipe_state = PIPE_STATE.lock();
            let Some(slot) = pipe_slot_mut(&mut pipe_state, pipe_id) else {
                reset_descriptor(&mut table.descriptors[read_idx]);
                reset_descriptor(&mut table.descriptors[write_idx]);
                drop(guard);
                return -1;
            };
            slot.readers = 1;
            slot.writers = 1;
        }

        *out_read_fd = read_idx as c_int;
        *out_write_fd = write_idx as c_int;
        drop(guard);
        0
    });

    if rc != 0 {
        let mut pipe_state = PIPE_STATE.lock();
        if let Some(slot) = pipe_slot_mut(&mut pipe_state, pipe_id) {
            *slot = PipeSlot::new();
        }
    }

    rc
}

/// Allocate a `timerfd_create`-style descriptor. Disarmed until
/// `file_timerfd_settime` is called. `nonblock`/`cloexec` mirror the
/// corresponding `O_*` open flags.
pub fn file_timerfd_create(process_id: u32, nonblock: bool, cloexec: bool) -> c_int {
    let timerfd_id = match alloc_timerfd_slot() {
        Some(id) => id,
        None => return -1,
    };

    let rc = with_tables(|kernel, processes| {
        let kernel_ptr = kernel as *mut FileTableSlot;
        let table_ptr = if let Some(t) = table_for_pid(kernel, processes, process_id) {
            t as *mut FileTableSlot
        } else if let Some(t) = find_free_table(processes) {
            t as *mut FileTableSlot
        } else {
            kernel_ptr
        };

        let table = unsafe { &mut *table_ptr };
        if !table.in_use {
            table.in_use = true;
            table.process_id = process_id;
            reset_table(table);
        }

        let guard = unsafe { (&(*table_ptr).lock).lock() };
        let Some(idx) = find_free_slot(table) else {
            drop(guard);
            return -1;
        };

        table.descriptors[idx] = FileDescriptor {
            inode: 0,
            fs: None,
            position: 0,
            flags: FILE_OPEN_READ | if nonblock { O_NONBLOCK as u32 } else { 0 },
            valid: true,
            cloexec,
            console: false,
            pipe_id: INVALID_PIPE_ID,
            pipe_read_end: false,
            pipe_write_end: false,
            timerfd_id,
        };

        drop(guard);
        idx as c_int
    });

    if rc < 0 {
        let mut state = TIMERFD_STATE.lock();
        if let Some(slot) = timerfd_slot_mut(&mut state, timerfd_id) {
            *slot = TimerFdSlot::new();
        }
    }

    rc
}

/// Arm (or disarm, if `expiry_tick == 0`) a timerfd. Ticks are absolute,
/// already converted by the caller from the requested `itimerspec`.
/// Returns the previous `(remaining_ticks, interval_ticks)` on success.
pub fn file_timerfd_settime(
    process_id: u32,
    fd: c_int,
    now_tick: u64,
    expiry_tick: u64,
    interval_ticks: u64,
) -> Option<(u64, u64)> {
    with_tables(|kernel, processes| {
        let table = table_for_pid(kernel, processes, process_id)?;
        if !table.in_use {
            return None;
        }
        let table_ptr: *mut FileTableSlot = table;
        let guard = unsafe { (&(*table_ptr).lock).lock() };
        let desc = unsafe { get_descriptor(&mut *table_ptr, fd) }?;
        if desc.timerfd_id == INVALID_TIMERFD_ID {
            drop(guard);
            return None;
        }

        let mut state = TIMERFD_STATE.lock();
        let slot = timerfd_slot_mut(&mut state, desc.timerfd_id)?;
        let old_remaining = if slot.expiry_tick > now_tick {
            slot.expiry_tick - now_tick
        } else {
            0
        };
        let old = (old_remaining, slot.interval_ticks);
        slot.expiry_tick = expiry_tick;
        slot.interval_ticks = interval_ticks;
        slot.counter = 0;
        drop(guard);
        Some(old)
    })
}

/// Returns `(remaining_ticks, interval_ticks)` for a timerfd, or `None` if
/// `fd` is not a timerfd.
pub fn file_timerfd_gettime(process_id: u32, fd: c_int, now_tick: u64) -> Option<(u64, u64)> {
    with_tables(|kernel, processes| {
        let table = table_for_pid(kernel, processes, process_id)?;
        if !table.in_use {
            return None;
        }
        let table_ptr: *mut FileTableSlot = table;
        let guard = unsafe { (&(*table_ptr).lock).lock() };
        let desc = unsafe { get_descriptor(&mut *table_ptr, fd) }?;
        if desc.timerfd_id == INVALID_TIMERFD_ID {
            drop(guard);
            return None;
        }

        let mut state = TIMERFD_STATE.lock();
        let slot = timerfd_slot_mut(&mut state, desc.timerfd_id)?;
        let remaining = slot.expiry_tick.saturating_sub(now_tick);
        let result = (remaining, slot.interval_ticks);
        drop(guard);
        Some(result)
    })
}

/// Drives every armed timerfd forward to `now_tick`, incrementing each
/// slot's expiration counter and rearming periodic timers. Called once per
/// scheduler tick.
pub fn timerfd_tick_all(now_tick: u64) {
    let mut state = TIMERFD_STATE.lock();
    for slot in state.slots.iter_mut() {
        if !slot.valid || slot.expiry_tick == 0 || slot.expiry_tick > now_tick {
            continue;
        }
        if slot.interval_ticks == 0 {
            slot.counter = slot.counter.saturating_add(1);
            slot.expiry_tick = 0;
            continue;
        }
        let elapsed = now_tick - slot.expiry_tick;
        let periods = 1 + elapsed / slot.interval_ticks;
        slot.counter = slot.counter.saturating_add(periods);
        slot.expiry_tick = slot.expiry_tick + periods * slot.interval_ticks;
    }
}

pub fn file_poll_fd(process_id: u32, fd: c_int, events: u16) -> u16 {
    with_tables(|kernel, processes| {
        let Some(table) = table_for_pid(kernel, processes, process_id) else {
            return POLLNVAL;
        };
        if !table.in_use {
            return POLLNVAL;
        }

        let table_ptr: *mut FileTableSlot = table;
        let guard = unsafe { (&(*table_ptr).lock).lock() };
        let Some(desc) = (unsafe { get_descriptor(&mut *table_ptr, fd) }) else {
            drop(guard);
            return POLLNVAL;
        };

        if desc.timerfd_id != INVALID_TIMERFD_ID {
            let mut state = TIMERFD_STATE.lock();
            let revents = match timerfd_slot_mut(&mut state, desc.timerfd_id) {
                Some(slot) => timerfd_revents(slot, events),
                None => POLLERR,
            };
            drop(guard);
            return revents;
        }

        if desc.pipe_id != INVALID_PIPE_ID {
            let mut pipe_state = PIPE_STATE.lock();
            let revents = match pipe_slot_mut(&mut pipe_state, desc.pipe_id) {
                Some(slot) => pipe_revents(slot, desc, events),
                None => POLLERR,
            };
            drop(guard);
            return revents;
        }

        if desc.console {
            let mut revents = 0u16;
            if (events & POLLIN) != 0 {
                revents |= POLLIN;
            }
            if (events & POLLOUT) != 0 {
                revents |= POLLOUT;
            }
            drop(guard);
            return revents;
        }

        let mut revents = 0u16;
        if (events & POLLIN) != 0 {
            revents |= POLLIN;
        }
        if (events & POLLOUT) != 0 {
            revents |= POLLOUT;
        }
        drop(guard);
        revents
    })
}

// =============================================================================
// POSIX FD operations: dup, dup2, dup3, fcntl, fstat
// =============================================================================

/// Duplicate a file descriptor to the lowest available fd.
/// Returns the new fd on success, -1 on error.
pub fn file_dup_fd(process_id: u32, old_fd: c_int) -> c_int {
    file_dup_fd_min(process_id, old_fd, 0)
}

/// Duplicate a file descriptor to the lowest available fd >= min_fd.
/// Used by both dup() (min_fd=0) and fcntl F_DUPFD.
fn file_dup_fd_min(process_id: u32, old_fd: c_int, min_fd: usize) -> c_int {
    with_tables(|kernel, processes| {
        let Some(table) = table_for_pid(kernel, processes, process_id) else {
            return -1;
        };
        if !table.in_use {
            return -1;
        }
        let table_ptr: *mut FileTableSlot = table;
        let guard = unsafe { (&(*table_ptr).lock).lock() };

        let src = unsafe { get_descriptor(&mut *table_ptr, old_fd) };
        let Some(src) = src else {
            drop(guard);
            return -1;
        };
        let Some(copy) = clone_descriptor_for_dup(src) else {
            drop(guard);
            return -1;
        };

        let table = unsafe { &mut *table_ptr };
        let Some(new_idx) = find_free_slot_from(table, min_fd) else {
            drop(guard);
            return -1;
        };

        table.descriptors[new_idx] = copy;
        // dup() clears FD_CLOEXEC on the new descriptor
        table.descriptors[new_idx].cloexec = false;
        drop(guard);
        new_idx as c_int
    })
}

/// Duplicate old_fd to exactly new_fd. If new_fd is already open it is closed first.
/// If old_fd == new_fd, return new_fd without closing.
/// Returns new_fd on success, -1 on error.
pub fn file_dup2_fd(process_id: u32, old_fd: c_int, new_fd: c_int) -> c_int {
    if new_fd < 0 || new_fd as usize >= FILEIO_MAX_OPEN_FILES {
        return -1;
    }
    if old_fd == new_fd {
        // Verify old_fd is valid, return new_fd if so
        return with_tables(|kernel, processes| {
            let Some(table) = table_for_pid(kernel, processes, process_id) else {
                return -1;
            };
            if !table.in_use {
                return -1;
            }
            let table_ptr: *mut FileTableSlot = table;
            let guard = unsafe { (&(*table_ptr).lock).lock() };
            let valid = unsafe { get_descriptor(&mut *table_ptr, old_fd) }.is_some();
            drop(guard);
            if valid { new_fd } else { -1 }
        });
    }

    with_tables(|kernel, processes| {
        let Some(table) = table_for_pid(kernel, processes, process_id) else {
            return -1;
        };
        if !table.in_use {
            return -1;
        }
        let table_ptr: *mut FileTableSlot = table;
        let guard = unsafe { (&(*table_ptr).lock).lock() };

        let src = unsafe { get_descriptor(&mut *table_ptr, old_fd) };
        let Some(src) = src else {
            drop(guard);
            return -1;
        };
        let Some(copy) = clone_descriptor_for_dup(src) else {
            drop(guard);
            return -1;
        };

        let table = unsafe { &mut *table_ptr };
        // Silently close new_fd if it was open
        if table.descriptors[new_fd as usize].valid {
            reset_descriptor(&mut table.descriptors[new_fd as usize]);
        }
        // dup2 preserves the source descriptor's FD_CLOEXEC bit.
        let src_cloexec = copy.cloexec;
        table.descriptors[new_fd as usize] = copy;
        table.descriptors[new_fd as usize].cloexec = src_cloexec;
        drop(guard);
        new_fd
    })
}

/// Duplicate old_fd to exactly new_fd with flags.
/// Unlike dup2, dup3 fails if old_fd == new_fd.
/// The only supported flag is O_CLOEXEC (mapped to bit 0 of flags).
/// Returns new_fd on success, -1 on error.
pub fn file_dup3_fd(process_id: u32, old_fd: c_int, new_fd: c_int, flags: u32) -> c_int {
    if old_fd == new_fd {
        return -1;
    }
    if new_fd < 0 || new_fd as usize >= FILEIO_MAX_OPEN_FILES {
        return -1;
    }

    with_tables(|kernel, processes| {
        let Some(table) = table_for_pid(kernel, processes, process_id) else {
            return -1;
        };
        if !table.in_use {
            return -1;
        }
        let table_ptr: *mut FileTableSlot = table;
        let guard = unsafe { (&(*table_ptr).lock).lock() };

        let src = unsafe { get_descriptor(&mut *table_ptr, old_fd) };
        let Some(src) = src else {
            drop(guard);
            return -1;
        };
        let Some(copy) = clone_descriptor_for_dup(src) else {
            drop(guard);
            return -1;
        };

        let table = unsafe { &mut *table_ptr };
        if table.descriptors[new_fd as usize].valid {
            reset_descriptor(&mut table.descriptors[new_fd as usize]);
        }
        table.descriptors[new_fd as usize] = copy;
        // dup3 sets cloexec based on flags
        table.descriptors[new_fd as usize].cloexec = (flags & FD_CLOEXEC as u32) != 0;
        drop(guard);
        new_fd
    })
}

/// Minimal fcntl implementation.
///
/// Supported commands:
/// - F_DUPFD: duplicate fd to lowest available >= arg
/// - F_GETFD: get FD_CLOEXEC flag
/// - F_SETFD: set FD_CLOEXEC flag
/// - F_GETFL: get file status flags (open mode)
/// - F_SETFL: set file status flags (currently only APPEND)
///
/// Returns command-specific value on success, -1 on error.
pub fn file_fcntl_fd(process_id: u32, fd: c_int, cmd: u64, arg: u64) -> i64 {
    match cmd {
        F_DUPFD => file_dup_fd_min(process_id, fd, arg as usize) as i64,
        F_GETFD => with_tables(|kernel, processes| {
            let Some(table) = table_for_pid(kernel, processes, process_id) else {
                return -1i64;
            };
            if !table.in_use {
                return -1;
            }
            let table_ptr: *mut FileTableSlot = table;
            let guard = unsafe { (&(*table_ptr).lock).lock() };
            let Some(desc) = (unsafe { get_descriptor(&mut *table_ptr, fd) }) else {
                drop(guard);
                return -1;
            };
            let val = if desc.cloexec { FD_CLOEXEC as i64 } else { 0 };
            drop(guard);
            val
        }),
        F_SETFD => with_tables(|kernel, processes| {
            let Some(table) = table_for_pid(kernel, processes, process_id) else {
                return -1i64;
            };
            if !table.in_use {
                return -1;
            }
            let table_ptr: *mut FileTableSlot = table;
            let guard = unsafe { (&(*table_ptr).lock).lock() };
            let Some(desc) = (unsafe { get_descriptor(&mut *table_ptr, fd) }) else {
                drop(guard);
                return -1;
            };
            desc.cloexec = (arg & FD_CLOEXEC) != 0;
            drop(guard);
            0
        }),
        F_GETFL => with_tables(|kernel, processes| {
            let Some(table) = table_for_pid(kernel, processes, process_id) else {
                return -1i64;
            };
            if !table.in_use {
                return -1;
            }
            let table_ptr: *mut FileTableSlot = table;
            let guard = unsafe { (&(*table_ptr).lock).lock() };
            let Some(desc) = (unsafe { get_descriptor(&mut *table_ptr, fd) }) else {
                drop(guard);
                return -1;
            };
            let val = desc.flags as i64;
            drop(guard);
            val
        }),
        F_SETFL => with_tables(|kernel, processes| {
            let Some(table) = table_for_pid(kernel, processes, process_id) else {
                return -1i64;
            };
            if !table.in_use {
                return -1;
            }
            let table_ptr: *mut FileTableSlot = table;
            let guard = unsafe { (&(*table_ptr).lock).lock() };
            let Some(desc) = (unsafe { get_descriptor(&mut *table_ptr, fd) }) else {
                drop(guard);
                return -1;
            };
            let mode_bits = desc.flags & (FILE_OPEN_READ | FILE_OPEN_WRITE);
            let mut next_flags = mode_bits | (arg as u32 & FILE_OPEN_APPEND);
            if (arg & O_NONBLOCK) != 0 {
                next_flags |= O_NONBLOCK as u32;
            }
            desc.flags = next_flags;
            drop(guard);
            0
        }),
        _ => -1,
    }
}

/// Close all file descriptors with FD_CLOEXEC set for a process.
///
/// Called during exec() to satisfy the POSIX close-on-exec contract.
/// Console FDs (0/1/2) are never marked cloexec by default, so they
/// survive exec transitions automatically.
pub fn fileio_close_on_exec(process_id: u32) {
    if process_id == INVALID_PROCESS_ID {
        return;
    }
    with_tables(|kernel, processes| {
        let Some(table) = table_for_pid(kernel, processes, process_id) else {
            return;
        };
        if !table.in_use {
            return;
        }
        let table_ptr: *mut FileTableSlot = table;
        let guard = unsafe { (&(*table_ptr).lock).lock() };
        let table = unsafe { &mut *table_ptr };
        for desc in table.descriptors.iter_mut() {
            if desc.valid && desc.cloexec {
                reset_descriptor(desc);
            }
        }
        drop(guard);
    });
}

/// Stat an open file descriptor.
/// Returns 0 on success and fills out_stat, -1 on error.
pub fn file_fstat_fd(process_id: u32, fd: c_int, out_stat: &mut UserFsStat) -> c_int {
    with_tables(|kernel, processes| {
        let Some(table) = table_for_pid(kernel, processes, process_id) else {
            return -1;
        };
        if !table.in_use {
            return -1;
        }
        let table_ptr: *mut FileTableSlot = table;
        let guard = unsafe { (&(*table_ptr).lock).lock() };
        let Some(desc) = (unsafe { get_descriptor(&mut *table_ptr, fd) }) else {
            drop(guard);
            return -1;
        };

        // Console descriptors report as character devices with size 0.
        if desc.console {
            out_stat.type_ = slopos_abi::fs::FS_TYPE_CHARDEV;
            out_stat.size = 0;
            drop(guard);
            return 0;
        }

        let fs = match desc.fs {
            Some(fs) => fs,
            None => {
                drop(guard);
                return -1;
            }
        };

        match fs.stat(desc.inode) {
            Ok(stat) => {
                out_stat.type_ = stat.file_type as u8;
                out_stat.size = stat.size as u32;
                drop(guard);
                0
            }
            Err(_) => {
                drop(guard);
                -1
            }
        }
    })
}

/// Identity key for `flock()`: distinguishes the underlying file (filesystem
/// instance + inode) from the fd used to reach it, so two fds opened on the
/// same file contend for the same lock. Console and pipe fds have no backing
/// filesystem and return `None` (flock on them fails with `EBADF`).
pub fn file_fd_lock_key(process_id: u32, fd: c_int) -> Option<(usize, InodeId)> {
    with_tables(|kernel, processes| {
        let table = table_for_pid(kernel, processes, process_id)?;
        if !table.in_use {
            return None;
        }
        let table_ptr: *mut FileTableSlot = table;
        let guard = unsafe { (&(*table_ptr).lock).lock() };
        let desc = unsafe { get_descriptor(&mut *table_ptr, fd) }?;
        let fs = desc.fs?;
        let key = ((fs as *const dyn FileSystem).cast::<()>() as usize, desc.inode);
        drop(guard);
        Some(key)
    })
}

// =============================================================================
// Working directory / path-relative resolution
// =============================================================================

/// Join `cwd` and `path` into an absolute path, the way a shell would expand
/// a relative argument: a leading `/` in `path` makes it absolute outright,
/// otherwise it is appended to `cwd` with a separating slash.
fn join_cwd(cwd: &[u8], path: &[u8], out: &mut [u8; MAX_PATH_LEN]) -> Option<usize> {
    if path.first() == Some(&b'/') || path.is_empty() {
        let len = path.len().min(MAX_PATH_LEN);
        if len == 0 {
            out[0] = b'/';
            return Some(1);
        }
        out[..len].copy_from_slice(&path[..len]);
        return Some(len);
    }

    let mut len = cwd.len().min(MAX_PATH_LEN);
    out[..len].copy_from_slice(&cwd[..len]);
    if len == 0 || out[len - 1] != b'/' {
        if len >= MAX_PATH_LEN {
            return None;
        }
        out[len] = b'/';
        len += 1;
    }
    let remaining = MAX_PATH_LEN.checked_sub(len)?;
    let take = path.len().min(remaining);
    out[len..len + take].copy_from_slice(&path[..take]);
    Some(len + take)
}

/// Resolve `path` to an absolute path for `process_id`, honoring its cwd.
fn resolve_for_process(process_id: u32, path: &[u8], out: &mut [u8; MAX_PATH_LEN]) -> Option<usize> {
    with_tables(|kernel, processes| {
        let table = table_for_pid(kernel, processes, process_id)?;
        if !table.in_use {
            return None;
        }
        join_cwd(table.cwd.as_bytes(), path, out)
    })
}

/// Resolve `path` against `dirfd` the way the `*at` syscall family expects:
/// `AT_FDCWD` resolves relative to the process's cwd, any other dirfd value
/// is rejected (directory-fd-relative resolution beyond cwd is not modeled).
pub fn file_resolve_at_path(
    process_id: u32,
    dirfd: i32,
    path: &[u8],
    out: &mut [u8; MAX_PATH_LEN],
) -> Option<usize> {
    if dirfd != slopos_abi::fs::AT_FDCWD {
        return None;
    }
    resolve_for_process(process_id, path, out)
}

/// `openat`-style resolution: `dirfd == AT_FDCWD` resolves relative to the
/// process cwd; any other dirfd is rejected since descriptors here carry no
/// directory-handle semantics beyond the cwd itself.
pub fn file_openat_for_process(
    process_id: u32,
    dirfd: i32,
    path: *const c_char,
    flags: u32,
) -> c_int {
    const AT_FDCWD: i32 = slopos_abi::fs::AT_FDCWD;
    if dirfd != AT_FDCWD {
        return -1;
    }
    let Some(path_bytes) = (unsafe { path_bytes(path) }) else {
        return -1;
    };
    let mut buf = [0u8; MAX_PATH_LEN];
    let Some(len) = resolve_for_process(process_id, path_bytes, &mut buf) else {
        return -1;
    };
    let mut cpath = [0u8; MAX_PATH_LEN + 1];
    cpath[..len].copy_from_slice(&buf[..len]);
    file_open_for_process(process_id, cpath.as_ptr() as *const c_char, flags)
}

/// `chdir`: verify the target exists and is a directory, then record it as
/// the process's cwd.
pub fn file_chdir_for_process(process_id: u32, path: *const c_char) -> c_int {
    let Some(path_bytes) = (unsafe { path_bytes(path) }) else {
        return -1;
    };
    let mut buf = [0u8; MAX_PATH_LEN];
    let Some(len) = resolve_for_process(process_id, path_bytes, &mut buf) else {
        return -1;
    };

    match resolve_path(&buf[..len]) {
        Ok(resolved) => match resolved.fs.stat(resolved.inode) {
            Ok(stat) if stat.file_type == FileType::Directory => {
                with_tables(|kernel, processes| {
                    let Some(table) = table_for_pid(kernel, processes, process_id) else {
                        return -1;
                    };
                    if !table.in_use {
                        return -1;
                    }
                    table.cwd.len = len;
                    table.cwd.path[..len].copy_from_slice(&buf[..len]);
                    0
                })
            }
            _ => -1,
        },
        Err(_) => -1,
    }
}

/// `getcwd`: copy the process's current working directory into `buf`,
/// returning the byte length written (not including a NUL) or -1 if `buf`
/// is too small.
pub fn file_getcwd_for_process(process_id: u32, buf: &mut [u8]) -> isize {
    with_tables(|kernel, processes| {
        let Some(table) = table_for_pid(kernel, processes, process_id) else {
            return -1;
        };
        if !table.in_use {
            return -1;
        }
        let cwd = table.cwd.as_bytes();
        if cwd.len() >= buf.len() {
            return -1;
        }
        buf[..cwd.len()].copy_from_slice(cwd);
        buf[cwd.len()] = 0;
        cwd.len() as isize
    })
}

// =============================================================================
// Path-level POSIX operations: link, rename, readlink, access, rmdir
// =============================================================================

/// `link(old, new)`: per the behaviour this facade was ported from, this
/// does **not** create a true hard link sharing the source inode — it
/// creates a new, empty file at `new`. Preserved deliberately; see DESIGN.md.
pub fn file_link_path(old_path: *const c_char, new_path: *const c_char) -> c_int {
    let Some(_old) = (unsafe { path_bytes(old_path) }) else {
        return -1;
    };
    let Some(new_bytes) = (unsafe { path_bytes(new_path) }) else {
        return -1;
    };
    match vfs_open(new_bytes, true) {
        Ok(_) => 0,
        Err(_) => -1,
    }
}

/// `rename(old, new)`: move/rename within the same filesystem.
pub fn file_rename_path(old_path: *const c_char, new_path: *const c_char) -> c_int {
    let Some(old_bytes) = (unsafe { path_bytes(old_path) }) else {
        return -1;
    };
    let Some(new_bytes) = (unsafe { path_bytes(new_path) }) else {
        return -1;
    };
    if vfs_rename(old_bytes, new_bytes).is_ok() {
        0
    } else {
        -1
    }
}

/// `rmdir(path)`: like unlink, but rejects non-directories.
pub fn file_rmdir_path(path: *const c_char) -> c_int {
    let Some(path_bytes) = (unsafe { path_bytes(path) }) else {
        return -1;
    };
    match resolve_path(path_bytes) {
        Ok(resolved) => match resolved.fs.stat(resolved.inode) {
            Ok(stat) if stat.file_type == FileType::Directory => {
                if vfs_unlink(path_bytes).is_ok() { 0 } else { -1 }
            }
            _ => -1,
        },
        Err(_) => -1,
    }
}

/// `readlink(path, buf)`: returns bytes written, or -1 on error (including
/// "not a symlink", which every filesystem here reports via `NotSupported`).
pub fn file_readlink_path(path: *const c_char, buf: &mut [u8]) -> isize {
    let Some(path_bytes) = (unsafe { path_bytes(path) }) else {
        return -1;
    };
    match vfs_readlink(path_bytes, buf) {
        Ok(n) => n as isize,
        Err(_) => -1,
    }
}

/// `access(path, mode)`: existence/type check only. This kernel does not
/// model per-file permission bits beyond the VFS default, so `mode` is
/// accepted but only `F_OK` (existence) is meaningfully distinguishable from
/// the R_OK/W_OK/X_OK bits, which always succeed once the path resolves.
pub fn file_access_path(path: *const c_char) -> c_int {
    let Some(path_bytes) = (unsafe { path_bytes(path) }) else {
        return -1;
    };
    if resolve_path(path_bytes).is_ok() { 0 } else { -1 }
}

// =============================================================================
// `*at` family: resolve a dirfd-relative path, then delegate to the
// path-based primitive above. Mirrors `file_openat_for_process`: `AT_FDCWD`
// resolves relative to the process cwd, any other dirfd is rejected since
// descriptors here carry no directory-handle semantics beyond the cwd.
// =============================================================================

fn resolve_at_to_cstr(
    process_id: u32,
    dirfd: c_int,
    path: *const c_char,
    out: &mut [u8; MAX_PATH_LEN + 1],
) -> Option<usize> {
    let path_bytes = unsafe { path_bytes(path) }?;
    let mut buf = [0u8; MAX_PATH_LEN];
    let len = file_resolve_at_path(process_id, dirfd, path_bytes, &mut buf)?;
    out[..len].copy_from_slice(&buf[..len]);
    out[len] = 0;
    Some(len)
}

pub fn file_linkat(
    process_id: u32,
    old_dirfd: c_int,
    old_path: *const c_char,
    new_dirfd: c_int,
    new_path: *const c_char,
) -> c_int {
    let mut old_buf = [0u8; MAX_PATH_LEN + 1];
    let mut new_buf = [0u8; MAX_PATH_LEN + 1];
    if resolve_at_to_cstr(process_id, old_dirfd, old_path, &mut old_buf).is_none() {
        return -1;
    }
    if resolve_at_to_cstr(process_id, new_dirfd, new_path, &mut new_buf).is_none() {
        return -1;
    }
    file_link_path(
        old_buf.as_ptr() as *const c_char,
        new_buf.as_ptr() as *const c_char,
    )
}

pub fn file_unlinkat(process_id: u32, dirfd: c_int, path: *const c_char, flags: u32) -> c_int {
    let mut buf = [0u8; MAX_PATH_LEN + 1];
    if resolve_at_to_cstr(process_id, dirfd, path, &mut buf).is_none() {
        return -1;
    }
    let cpath = buf.as_ptr() as *const c_char;
    if flags & slopos_abi::fs::AT_REMOVEDIR != 0 {
        file_rmdir_path(cpath)
    } else {
        file_unlink_path(cpath)
    }
}

pub fn file_renameat(
    process_id: u32,
    old_dirfd: c_int,
    old_path: *const c_char,
    new_dirfd: c_int,
    new_path: *const c_char,
) -> c_int {
    let mut old_buf = [0u8; MAX_PATH_LEN + 1];
    let mut new_buf = [0u8; MAX_PATH_LEN + 1];
    if resolve_at_to_cstr(process_id, old_dirfd, old_path, &mut old_buf).is_none() {
        return -1;
    }
    if resolve_at_to_cstr(process_id, new_dirfd, new_path, &mut new_buf).is_none() {
        return -1;
    }
    file_rename_path(
        old_buf.as_ptr() as *const c_char,
        new_buf.as_ptr() as *const c_char,
    )
}

pub fn file_readlinkat_path(
    process_id: u32,
    dirfd: c_int,
    path: *const c_char,
    buf: &mut [u8],
) -> isize {
    let mut resolved = [0u8; MAX_PATH_LEN + 1];
    if resolve_at_to_cstr(process_id, dirfd, path, &mut resolved).is_none() {
        return -1;
    }
    file_readlink_path(resolved.as_ptr() as *const c_char, buf)
}

pub fn file_fstatat(
    process_id: u32,
    dirfd: c_int,
    path: *const c_char,
    out_type: &mut u8,
    out_size: &mut u32,
) -> c_int {
    let mut resolved = [0u8; MAX_PATH_LEN + 1];
    if resolve_at_to_cstr(process_id, dirfd, path, &mut resolved).is_none() {
        return -1;
    }
    file_stat_path(resolved.as_ptr() as *const c_char, out_type, out_size)
}

pub fn file_faccessat(process_id: u32, dirfd: c_int, path: *const c_char) -> c_int {
    let mut resolved = [0u8; MAX_PATH_LEN + 1];
    if resolve_at_to_cstr(process_id, dirfd, path, &mut resolved).is_none() {
        return -1;
    }
    file_access_path(resolved.as_ptr() as *const c_char)
}

/// `fchdir`: not supported. Open directory descriptors here do not retain
/// the path they were opened from, so there is nothing to `chdir` into;
/// matches the documented shortfall of `file_access_path`/`file_link_path`
/// above. Always fails.
pub fn file_fchdir(_process_id: u32, _fd: c_int) -> c_int {
    -1
}

// =============================================================================
// Directory-fd enumeration: getdents
// =============================================================================

/// `getdents`: read directory entries from an open directory fd into
/// `out`, starting from the fd's current position (used as an entry index,
/// not a byte offset — this kernel's `Dirent` records are fixed-size so the
/// two coincide in units of `size_of::<Dirent>()`).
///
/// Returns the number of entries written, or -1 on error.
pub fn file_getdents_fd(
    process_id: u32,
    fd: c_int,
    out: &mut [slopos_abi::fs::Dirent],
) -> isize {
    use slopos_abi::fs::{DT_CHR, DT_DIR, DT_LNK, DT_REG, Dirent};

    with_tables(|kernel, processes| {
        let Some(table) = table_for_pid(kernel, processes, process_id) else {
            return -1;
        };
        if !table.in_use {
            return -1;
        }
        let table_ptr: *mut FileTableSlot = table;
        let guard = unsafe { (&(*table_ptr).lock).lock() };
        let Some(desc) = (unsafe { get_descriptor(&mut *table_ptr, fd) }) else {
            drop(guard);
            return -1;
        };
        let (inode, fs, start) = match desc.fs {
            Some(fs) => (desc.inode, fs, desc.position),
            None => {
                drop(guard);
                return -1;
            }
        };

        let mut produced = 0usize;
        let cap = out.len();
        let rc = fs.readdir(inode, start, &mut |name, child_inode, file_type| {
            if produced >= cap {
                return false;
            }
            let mut entry = Dirent::new();
            entry.d_ino = child_inode;
            entry.d_off = (start + produced + 1) as i64;
            entry.d_type = match file_type {
                FileType::Directory => DT_DIR,
                FileType::Regular => DT_REG,
                FileType::CharDevice => DT_CHR,
                FileType::Symlink => DT_LNK,
                _ => slopos_abi::fs::DT_UNKNOWN,
            };
            let nlen = name.len().min(entry.d_name.len() - 1);
            entry.d_name[..nlen].copy_from_slice(&name[..nlen]);
            out[produced] = entry;
            produced += 1;
            true
        });

        if rc.is_err() && produced == 0 {
            drop(guard);
            return -1;
        }

        desc.position = start + produced;
        drop(guard);
        produced as isize
    })
}
