use core::ffi::c_int;

use slopos_abi::task::{BlockReason, MAX_TASKS};
use slopos_lib::IrqMutex;

use super::scheduler::{
    is_scheduling_active, schedule, schedule_task, scheduler_get_current_task, unschedule_task,
};
use super::task::{
    INVALID_TASK_ID, TaskStatus, task_find_by_id, task_is_blocked, task_is_invalid,
    task_is_terminated, task_set_state_with_reason,
};
use crate::platform;

#[derive(Copy, Clone)]
struct SleepEntry {
    task_id: u32,
    wake_tick: u64,
    active: bool,
}

impl SleepEntry {
    const fn empty() -> Self {
        Self {
            task_id: INVALID_TASK_ID,
            wake_tick: 0,
            active: false,
        }
    }
}

struct SleepQueue {
    entries: [SleepEntry; MAX_TASKS],
}

impl SleepQueue {
    const fn new() -> Self {
        Self {
            entries: [SleepEntry::empty(); MAX_TASKS],
        }
    }

    fn clear(&mut self) {
        self.entries = [SleepEntry::empty(); MAX_TASKS];
    }

    fn upsert(&mut self, task_id: u32, wake_tick: u64) -> bool {
        let mut free_idx = None;
        for (idx, entry) in self.entries.iter_mut().enumerate() {
            if entry.active && entry.task_id == task_id {
                entry.wake_tick = wake_tick;
                return true;
            }
            if !entry.active && free_idx.is_none() {
                free_idx = Some(idx);
            }
        }

        if let Some(idx) = free_idx {
            self.entries[idx] = SleepEntry {
                task_id,
                wake_tick,
                active: true,
            };
            true
        } else {
            false
        }
    }

    fn remove(&mut self, task_id: u32) {
        for entry in self.entries.iter_mut() {
            if entry.active && entry.task_id == task_id {
                *entry = SleepEntry::empty();
                break;
            }
        }
    }

    /// Removes and returns the entry's wake tick if `task_id` is still queued.
    /// A sleeper woken by the timer tick is already removed by `collect_due`,
    /// so a hit here means something else (e.g. a signal) woke the task early.
    fn take(&mut self, task_id: u32) -> Option<u64> {
        for entry in self.entries.iter_mut() {
            if entry.active && entry.task_id == task_id {
                let wake_tick = entry.wake_tick;
                *entry = SleepEntry::empty();
                return Some(wake_tick);
            }
        }
        None
    }

    fn collect_due(&mut self, now_tick: u64, out: &mut [u32; MAX_TASKS]) -> usize {
        let mut count = 0usize;
        for entry in self.entries.iter_mut() {
            if !entry.active {
                continue;
            }
            if tick_reached(now_tick, entry.wake_tick) {
                if count < out.len() {
                    out[count] = entry.task_id;
                    count += 1;
                }
                *entry = SleepEntry::empty();
            }
        }
        count
    }
}

static SLEEP_QUEUE: IrqMutex<SleepQueue> = IrqMutex::new(SleepQueue::new());

#[inline]
fn tick_reached(now_tick: u64, deadline_tick: u64) -> bool {
    now_tick.wrapping_sub(deadline_tick) < (1u64 << 63)
}

fn ms_to_sleep_ticks(ms: u32) -> u64 {
    let freq = platform::timer_frequency() as u64;
    if freq == 0 {
        return 1;
    }

    let ticks = (ms as u64).saturating_mul(freq).saturating_add(999) / 1000;
    ticks.max(1)
}

fn sleep_ticks_to_ms(ticks: u64) -> u32 {
    let freq = platform::timer_frequency() as u64;
    if freq == 0 {
        return 0;
    }
    let ms = ticks.saturating_mul(1000).saturating_add(freq - 1) / freq;
    ms.min(u32::MAX as u64) as u32
}

fn wake_sleeping_task(task_id: u32) {
    if task_id == INVALID_TASK_ID {
        return;
    }

    let task = task_find_by_id(task_id);
    if task.is_null() || task_is_invalid(task) || task_is_terminated(task) {
        return;
    }

    let is_sleep_blocked =
        task_is_blocked(task) && unsafe { (*task).block_reason == BlockReason::Sleep };
    if !is_sleep_blocked {
        return;
    }

    if task_set_state_with_reason(task_id, TaskStatus::Ready, BlockReason::None) != 0 {
        return;
    }

    core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
    let _ = schedule_task(task);
}

pub fn wake_due_sleepers(now_tick: u64) {
    let mut due = [INVALID_TASK_ID; MAX_TASKS];
    let due_count = {
        let mut queue = SLEEP_QUEUE.lock();
        queue.collect_due(now_tick, &mut due)
    };

    for task_id in due.iter().take(due_count) {
        wake_sleeping_task(*task_id);
    }
}

pub fn reset_sleep_queue() {
    SLEEP_QUEUE.lock().clear();
}

pub fn cancel_sleep(task_id: u32) {
    if task_id == INVALID_TASK_ID {
        return;
    }
    SLEEP_QUEUE.lock().remove(task_id);
}

pub fn sleep_current_task_ms(ms: u32) -> c_int {
    if ms == 0 {
        return 0;
    }

    if !is_scheduling_active() {
        platform::timer_poll_delay_ms(ms);
        return 0;
    }

    let current = scheduler_get_current_task();
    if current.is_null() {
        return -1;
    }
    if super::per_cpu::is_idle_task(current) {
        platform::timer_poll_delay_ms(ms);
        return 0;
    }

    let task_id = unsafe { (*current).task_id };
    if task_id == INVALID_TASK_ID {
        return -1;
    }

    let now_tick = platform::timer_ticks();
    let wake_tick = now_tick.wrapping_add(ms_to_sleep_ticks(ms));
    if !SLEEP_QUEUE.lock().upsert(task_id, wake_tick) {
        return -1;
    }

    if task_set_state_with_reason(task_id, TaskStatus::Blocked, BlockReason::Sleep) != 0 {
        cancel_sleep(task_id);
        return -1;
    }

    unschedule_task(current);
    schedule();
    0
}

/// Like `sleep_current_task_ms`, but returns early if a signal becomes
/// deliverable while blocked. Returns `(woke_early, remaining_ms)`: when
/// `woke_early` is true the sleep was cut short and `remaining_ms` holds
/// however much of the requested duration was left.
pub fn sleep_current_task_ms_interruptible(ms: u32) -> (bool, u32) {
    if ms == 0 {
        return (false, 0);
    }

    if !is_scheduling_active() {
        platform::timer_poll_delay_ms(ms);
        return (false, 0);
    }

    let current = scheduler_get_current_task();
    if current.is_null() {
        return (false, 0);
    }
    if super::per_cpu::is_idle_task(current) {
        platform::timer_poll_delay_ms(ms);
        return (false, 0);
    }

    let task_id = unsafe { (*current).task_id };
    if task_id == INVALID_TASK_ID {
        return (false, 0);
    }

    let now_tick = platform::timer_ticks();
    let wake_tick = now_tick.wrapping_add(ms_to_sleep_ticks(ms));
    if !SLEEP_QUEUE.lock().upsert(task_id, wake_tick) {
        return (false, 0);
    }

    if task_set_state_with_reason(task_id, TaskStatus::Blocked, BlockReason::Sleep) != 0 {
        cancel_sleep(task_id);
        return (false, 0);
    }

    unschedule_task(current);
    schedule();

    match SLEEP_QUEUE.lock().take(task_id) {
        Some(wake_tick) => {
            let now = platform::timer_ticks();
            let remaining_ticks = if tick_reached(now, wake_tick) {
                0
            } else {
                wake_tick.wrapping_sub(now)
            };
            (true, sleep_ticks_to_ms(remaining_ticks))
        }
        None => (false, 0),
    }
}
