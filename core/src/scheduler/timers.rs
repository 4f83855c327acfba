//! Per-task interval timers: `setitimer(ITIMER_REAL)` and `timer_create`
//! POSIX timers. Both are driven from the scheduler tick, mirroring the
//! sleep queue and futex wait-list idiom: fixed-size per-task state, no
//! heap allocation, woken tasks unblocked through the ordinary
//! block/unblock scheduler hooks.

use core::ffi::c_void;

use slopos_abi::signal::sig_bit;
use slopos_abi::task::INVALID_TASK_ID;

use super::scheduler::unblock_task;
use super::task::{Task, task_iterate_active};
use super::task_struct::MAX_TASK_POSIX_TIMERS;

/// Advances every task's `ITIMER_REAL` and POSIX timers to `now_tick`,
/// raising the configured signal and rearming (or disarming) each timer
/// that has expired. Called once per scheduler tick.
pub fn sched_update_itimer(now_tick: u64) {
    task_iterate_active(Some(update_one_task), (&now_tick as *const u64 as *mut u64).cast());
}

fn update_one_task(task: *mut Task, context: *mut c_void) {
    if task.is_null() || context.is_null() {
        return;
    }
    let now_tick = unsafe { *(context as *const u64) };

    unsafe {
        let mut fired = false;

        if (*task).itimer_real_expiry != 0 && (*task).itimer_real_expiry <= now_tick {
            (*task)
                .signal_pending
                .fetch_or(sig_bit(slopos_abi::signal::SIGALRM), core::sync::atomic::Ordering::AcqRel);
            fired = true;

            if (*task).itimer_real_interval != 0 {
                (*task).itimer_real_expiry = now_tick + (*task).itimer_real_interval;
            } else {
                (*task).itimer_real_expiry = 0;
            }
        }

        for idx in 0..MAX_TASK_POSIX_TIMERS {
            let timer = &mut (*task).posix_timers[idx];
            if !timer.in_use || timer.expiry_tick == 0 || timer.expiry_tick > now_tick {
                continue;
            }

            (*task)
                .signal_pending
                .fetch_or(sig_bit(timer.signum), core::sync::atomic::Ordering::AcqRel);
            fired = true;

            if timer.interval_ticks != 0 {
                timer.expiry_tick = now_tick + timer.interval_ticks;
            } else {
                timer.expiry_tick = 0;
            }
        }

        if fired && (*task).task_id != INVALID_TASK_ID {
            let _ = unblock_task(task);
        }
    }
}

/// Allocates a free POSIX timer slot on `task`, returning its index (used as
/// the kernel-visible `timer_t`), or `None` if the task's timer table is full.
pub fn posix_timer_create(task: *mut Task, signum: u8) -> Option<usize> {
    if task.is_null() {
        return None;
    }
    unsafe {
        for (idx, timer) in (*task).posix_timers.iter_mut().enumerate() {
            if !timer.in_use {
                timer.in_use = true;
                timer.signum = signum;
                timer.expiry_tick = 0;
                timer.interval_ticks = 0;
                return Some(idx);
            }
        }
    }
    None
}

pub fn posix_timer_settime(
    task: *mut Task,
    timer_id: usize,
    expiry_tick: u64,
    interval_ticks: u64,
) -> Result<(u64, u64), ()> {
    if task.is_null() || timer_id >= MAX_TASK_POSIX_TIMERS {
        return Err(());
    }
    unsafe {
        let timer = &mut (*task).posix_timers[timer_id];
        if !timer.in_use {
            return Err(());
        }
        let old = (timer.expiry_tick, timer.interval_ticks);
        timer.expiry_tick = expiry_tick;
        timer.interval_ticks = interval_ticks;
        Ok(old)
    }
}

pub fn posix_timer_gettime(task: *mut Task, timer_id: usize) -> Result<(u64, u64), ()> {
    if task.is_null() || timer_id >= MAX_TASK_POSIX_TIMERS {
        return Err(());
    }
    unsafe {
        let timer = &(*task).posix_timers[timer_id];
        if !timer.in_use {
            return Err(());
        }
        Ok((timer.expiry_tick, timer.interval_ticks))
    }
}

pub fn posix_timer_delete(task: *mut Task, timer_id: usize) -> Result<(), ()> {
    if task.is_null() || timer_id >= MAX_TASK_POSIX_TIMERS {
        return Err(());
    }
    unsafe {
        let timer = &mut (*task).posix_timers[timer_id];
        if !timer.in_use {
            return Err(());
        }
        *timer = super::task_struct::PosixTimer::empty();
    }
    Ok(())
}
