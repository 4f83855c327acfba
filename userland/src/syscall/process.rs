//! Process management syscalls: spawn, exec, fork, halt, reboot.

use super::numbers::*;
use super::raw::{syscall0, syscall1, syscall2, syscall3, syscall4};
use slopos_abi::signal::{SIG_IGN, SigSet, UserSigaction};
use slopos_abi::task::WNOHANG;

#[inline(always)]
pub fn spawn_path(path: &[u8]) -> i32 {
    spawn_path_with_attrs(path, 5, 0)
}

#[inline(always)]
pub fn spawn_path_with_attrs(path: &[u8], priority: u8, flags: u16) -> i32 {
    unsafe {
        syscall4(
            SYSCALL_SPAWN_PATH,
            path.as_ptr() as u64,
            path.len() as u64,
            priority as u64,
            flags as u64,
        ) as i32
    }
}

/// Full `waitpid(2)`: `pid` is `-1` for any child, `0` for any child sharing
/// this task's pgid, `>0` for one specific task id. Returns the reaped task's
/// id on success, or a negative errno (`ECHILD` if no matching child exists
/// at all, the syscall's generic error otherwise).
#[inline(always)]
pub fn waitpid_full(pid: i32, status_out: Option<&mut i32>, options: u32) -> i32 {
    let status_ptr = match status_out {
        Some(slot) => slot as *mut i32 as u64,
        None => 0,
    };
    unsafe { syscall3(SYSCALL_WAITPID, pid as i64 as u64, status_ptr, options as u64) as i32 }
}

/// `waitpid(-1, ...)`: block for (or immediately reap) any child.
#[inline(always)]
pub fn wait_any(status_out: Option<&mut i32>) -> i32 {
    waitpid_full(-1, status_out, 0)
}

#[inline(always)]
pub fn waitpid(task_id: u32) -> i32 {
    let mut status: i32 = 0;
    let rc = waitpid_full(task_id as i32, Some(&mut status), 0);
    if rc < 0 { rc } else { status }
}

#[inline(always)]
pub fn waitpid_nohang(task_id: u32) -> Option<i32> {
    let mut status: i32 = 0;
    let rc = waitpid_full(task_id as i32, Some(&mut status), WNOHANG);
    if rc > 0 { Some(status) } else { None }
}

#[inline(always)]
pub fn terminate_task(task_id: u32) -> i32 {
    unsafe { syscall1(SYSCALL_TERMINATE_TASK, task_id as u64) as i32 }
}

#[inline(always)]
pub fn exec(path: &[u8]) -> i64 {
    unsafe { syscall1(SYSCALL_EXEC, path.as_ptr() as u64) as i64 }
}

#[inline(always)]
pub fn exec_ptr(path: *const u8) -> i64 {
    unsafe { syscall1(SYSCALL_EXEC, path as u64) as i64 }
}

#[inline(always)]
pub fn fork() -> i32 {
    unsafe { syscall0(SYSCALL_FORK) as i32 }
}

#[inline(always)]
pub fn setpgid(pid: u32, pgid: u32) -> i32 {
    unsafe { syscall2(SYSCALL_SETPGID, pid as u64, pgid as u64) as i32 }
}

#[inline(always)]
pub fn getpgid(pid: u32) -> i32 {
    unsafe { syscall1(SYSCALL_GETPGID, pid as u64) as i32 }
}

#[inline(always)]
pub fn kill(pid: u32, signum: u8) -> i32 {
    kill_pid(pid as i32, signum)
}

#[inline(always)]
pub fn kill_pid(pid: i32, signum: u8) -> i32 {
    unsafe { syscall2(SYSCALL_KILL, pid as i64 as u64, signum as u64) as i32 }
}

#[inline(always)]
pub fn ignore_signal(signum: u8) -> i32 {
    let action = UserSigaction {
        sa_handler: SIG_IGN,
        sa_flags: 0,
        sa_restorer: 0,
        sa_mask: 0,
    };
    unsafe {
        syscall4(
            SYSCALL_RT_SIGACTION,
            signum as u64,
            (&action as *const UserSigaction) as u64,
            0,
            core::mem::size_of::<SigSet>() as u64,
        ) as i32
    }
}

#[inline(always)]
pub fn halt() -> ! {
    unsafe {
        syscall0(SYSCALL_HALT);
    }
    loop {
        core::hint::spin_loop();
    }
}

#[inline(always)]
pub fn reboot() -> ! {
    unsafe {
        syscall0(SYSCALL_REBOOT);
    }
    loop {
        core::hint::spin_loop();
    }
}
