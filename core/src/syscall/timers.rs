//! `setitimer`/`getitimer`, `timer_create` POSIX timers, and `timerfd_*`.
//! All three families share the same tick-based arming logic; only where
//! the expiry/interval end up (a `Task` field, a `PosixTimer` slot, or an
//! `fs` timerfd slot) differs.

use slopos_abi::fs::{
    ITIMER_REAL, TIMER_ABSTIME, UserItimerSpec,
};
use slopos_abi::signal::{SIGALRM, SIGEV_SIGNAL, UserSigevent};
use slopos_abi::syscall::{ERRNO_EFAULT, ERRNO_EINVAL, ERRNO_ESRCH};
use slopos_fs::fileio::{file_timerfd_create, file_timerfd_gettime, file_timerfd_settime};
use slopos_mm::user_copy::{copy_from_user, copy_to_user};
use slopos_mm::user_ptr::UserPtr;

use crate::platform;
use crate::scheduler::scheduler::{
    posix_timer_create, posix_timer_delete, posix_timer_gettime, posix_timer_settime,
};
use crate::syscall::common::{SyscallDisposition, syscall_return_err};
use crate::syscall::context::SyscallContext;

fn ticks_to_itimerspec(remaining_ticks: u64, interval_ticks: u64) -> UserItimerSpec {
    let remaining_ms = platform::ticks_to_ms(remaining_ticks);
    let interval_ms = platform::ticks_to_ms(interval_ticks);
    UserItimerSpec {
        value: ms_to_timespec(remaining_ms),
        interval: ms_to_timespec(interval_ms),
    }
}

fn ms_to_timespec(ms: u64) -> slopos_abi::fs::UserTimespec {
    slopos_abi::fs::UserTimespec {
        tv_sec: (ms / 1000) as i64,
        tv_nsec: ((ms % 1000) * 1_000_000) as i64,
    }
}

fn timespec_to_ms(ts: &slopos_abi::fs::UserTimespec) -> u64 {
    if ts.tv_sec < 0 || ts.tv_nsec < 0 {
        return 0;
    }
    (ts.tv_sec as u64)
        .saturating_mul(1000)
        .saturating_add((ts.tv_nsec as u64) / 1_000_000)
}

define_syscall!(syscall_setitimer(ctx, args) {
    if args.arg0 as u32 != ITIMER_REAL {
        return syscall_return_err(ctx.frame_ptr(), ERRNO_EINVAL);
    }

    let task_ref = some_or_err!(ctx, ctx.task_mut());
    let now_tick = platform::timer_ticks();

    if args.arg2 != 0 {
        let old_ptr = try_or_err!(ctx, UserPtr::<UserItimerSpec>::try_new(args.arg2));
        let remaining = if task_ref.itimer_real_expiry > now_tick {
            task_ref.itimer_real_expiry - now_tick
        } else {
            0
        };
        let old = ticks_to_itimerspec(remaining, task_ref.itimer_real_interval);
        if copy_to_user(old_ptr, &old).is_err() {
            return syscall_return_err(ctx.frame_ptr(), ERRNO_EFAULT);
        }
    }

    if args.arg1 != 0 {
        let new_ptr = try_or_err!(ctx, UserPtr::<UserItimerSpec>::try_new(args.arg1));
        let new_spec = match copy_from_user(new_ptr) {
            Ok(v) => v,
            Err(_) => return syscall_return_err(ctx.frame_ptr(), ERRNO_EFAULT),
        };

        let value_ms = timespec_to_ms(&new_spec.value);
        if value_ms == 0 {
            task_ref.itimer_real_expiry = 0;
            task_ref.itimer_real_interval = 0;
        } else {
            task_ref.itimer_real_expiry = now_tick + platform::ms_to_ticks(value_ms);
            task_ref.itimer_real_interval = platform::ms_to_ticks(timespec_to_ms(&new_spec.interval));
        }
    }

    ctx.ok(0)
});

define_syscall!(syscall_getitimer(ctx, args) {
    if args.arg0 as u32 != ITIMER_REAL {
        return syscall_return_err(ctx.frame_ptr(), ERRNO_EINVAL);
    }
    require_nonzero!(ctx, args.arg1);

    let task_ref = some_or_err!(ctx, ctx.task_mut());
    let now_tick = platform::timer_ticks();
    let remaining = if task_ref.itimer_real_expiry > now_tick {
        task_ref.itimer_real_expiry - now_tick
    } else {
        0
    };
    let curr = ticks_to_itimerspec(remaining, task_ref.itimer_real_interval);

    let out_ptr = try_or_err!(ctx, UserPtr::<UserItimerSpec>::try_new(args.arg1));
    try_or_err!(ctx, copy_to_user(out_ptr, &curr));
    ctx.ok(0)
});

define_syscall!(syscall_timer_create(ctx, args) {
    require_nonzero!(ctx, args.arg2);

    let signum = if args.arg1 != 0 {
        let sev_ptr = try_or_err!(ctx, UserPtr::<UserSigevent>::try_new(args.arg1));
        let sev = match copy_from_user(sev_ptr) {
            Ok(v) => v,
            Err(_) => return syscall_return_err(ctx.frame_ptr(), ERRNO_EFAULT),
        };
        if sev.sigev_notify == SIGEV_SIGNAL {
            if sev.sigev_signo == 0 || sev.sigev_signo as usize > slopos_abi::signal::NSIG {
                return syscall_return_err(ctx.frame_ptr(), ERRNO_EINVAL);
            }
            sev.sigev_signo as u8
        } else {
            SIGALRM
        }
    } else {
        SIGALRM
    };

    let Some(timer_id) = posix_timer_create(ctx.task_ptr(), signum) else {
        return syscall_return_err(ctx.frame_ptr(), ERRNO_EINVAL);
    };

    let out_ptr = try_or_err!(ctx, UserPtr::<u32>::try_new(args.arg2));
    try_or_err!(ctx, copy_to_user(out_ptr, &(timer_id as u32)));
    ctx.ok(0)
});

define_syscall!(syscall_timer_settime(ctx, args) {
    require_nonzero!(ctx, args.arg2);
    let timer_id = args.arg0 as usize;
    let abstime = (args.arg1 as u32 & TIMER_ABSTIME) != 0;

    let new_ptr = try_or_err!(ctx, UserPtr::<UserItimerSpec>::try_new(args.arg2));
    let new_spec = match copy_from_user(new_ptr) {
        Ok(v) => v,
        Err(_) => return syscall_return_err(ctx.frame_ptr(), ERRNO_EFAULT),
    };

    let now_tick = platform::timer_ticks();
    let value_ms = timespec_to_ms(&new_spec.value);
    let expiry_tick = if value_ms == 0 {
        0
    } else if abstime {
        platform::ms_to_ticks(value_ms)
    } else {
        now_tick + platform::ms_to_ticks(value_ms)
    };
    let interval_ticks = platform::ms_to_ticks(timespec_to_ms(&new_spec.interval));

    let Ok((old_expiry, old_interval)) = posix_timer_settime(ctx.task_ptr(), timer_id, expiry_tick, interval_ticks) else {
        return syscall_return_err(ctx.frame_ptr(), ERRNO_EINVAL);
    };

    if args.arg3 != 0 {
        let old_remaining = if old_expiry > now_tick { old_expiry - now_tick } else { 0 };
        let old = ticks_to_itimerspec(old_remaining, old_interval);
        let old_ptr = try_or_err!(ctx, UserPtr::<UserItimerSpec>::try_new(args.arg3));
        try_or_err!(ctx, copy_to_user(old_ptr, &old));
    }

    ctx.ok(0)
});

define_syscall!(syscall_timer_gettime(ctx, args) {
    require_nonzero!(ctx, args.arg1);
    let timer_id = args.arg0 as usize;

    let Ok((expiry_tick, interval_ticks)) = posix_timer_gettime(ctx.task_ptr(), timer_id) else {
        return syscall_return_err(ctx.frame_ptr(), ERRNO_ESRCH);
    };

    let now_tick = platform::timer_ticks();
    let remaining = if expiry_tick > now_tick { expiry_tick - now_tick } else { 0 };
    let curr = ticks_to_itimerspec(remaining, interval_ticks);

    let out_ptr = try_or_err!(ctx, UserPtr::<UserItimerSpec>::try_new(args.arg1));
    try_or_err!(ctx, copy_to_user(out_ptr, &curr));
    ctx.ok(0)
});

define_syscall!(syscall_timer_delete(ctx, args) {
    let timer_id = args.arg0 as usize;
    if posix_timer_delete(ctx.task_ptr(), timer_id).is_err() {
        return syscall_return_err(ctx.frame_ptr(), ERRNO_ESRCH);
    }
    ctx.ok(0)
});

define_syscall!(syscall_timerfd_create(ctx, args) {
    use slopos_abi::syscall::{O_CLOEXEC, O_NONBLOCK};

    let process_id = match ctx.process_id() {
        Some(pid) => pid,
        None => return syscall_return_err(ctx.frame_ptr(), ERRNO_ESRCH),
    };

    let flags = args.arg1 as u32;
    let nonblock = (flags & O_NONBLOCK as u32) != 0;
    let cloexec = (flags & O_CLOEXEC as u32) != 0;

    let fd = file_timerfd_create(process_id, nonblock, cloexec);
    if fd < 0 {
        return syscall_return_err(ctx.frame_ptr(), ERRNO_EINVAL);
    }
    ctx.ok(fd as u64)
});

define_syscall!(syscall_timerfd_settime(ctx, args) {
    require_nonzero!(ctx, args.arg2);

    let process_id = match ctx.process_id() {
        Some(pid) => pid,
        None => return syscall_return_err(ctx.frame_ptr(), ERRNO_ESRCH),
    };
    let fd = args.arg0 as core::ffi::c_int;
    let abstime = (args.arg1 as u32 & TIMER_ABSTIME) != 0;

    let new_ptr = try_or_err!(ctx, UserPtr::<UserItimerSpec>::try_new(args.arg2));
    let new_spec = match copy_from_user(new_ptr) {
        Ok(v) => v,
        Err(_) => return syscall_return_err(ctx.frame_ptr(), ERRNO_EFAULT),
    };

    let now_tick = platform::timer_ticks();
    let value_ms = timespec_to_ms(&new_spec.value);
    let expiry_tick = if value_ms == 0 {
        0
    } else if abstime {
        platform::ms_to_ticks(value_ms)
    } else {
        now_tick + platform::ms_to_ticks(value_ms)
    };
    let interval_ticks = platform::ms_to_ticks(timespec_to_ms(&new_spec.interval));

    let Some((old_remaining, old_interval)) =
        file_timerfd_settime(process_id, fd, now_tick, expiry_tick, interval_ticks)
    else {
        return syscall_return_err(ctx.frame_ptr(), ERRNO_EINVAL);
    };

    if args.arg3 != 0 {
        let old = ticks_to_itimerspec(old_remaining, old_interval);
        let old_ptr = try_or_err!(ctx, UserPtr::<UserItimerSpec>::try_new(args.arg3));
        try_or_err!(ctx, copy_to_user(old_ptr, &old));
    }

    ctx.ok(0)
});

define_syscall!(syscall_timerfd_gettime(ctx, args) {
    require_nonzero!(ctx, args.arg1);

    let process_id = match ctx.process_id() {
        Some(pid) => pid,
        None => return syscall_return_err(ctx.frame_ptr(), ERRNO_ESRCH),
    };
    let fd = args.arg0 as core::ffi::c_int;
    let now_tick = platform::timer_ticks();

    let Some((remaining, interval)) = file_timerfd_gettime(process_id, fd, now_tick) else {
        return syscall_return_err(ctx.frame_ptr(), ERRNO_EINVAL);
    };

    let curr = ticks_to_itimerspec(remaining, interval);
    let out_ptr = try_or_err!(ctx, UserPtr::<UserItimerSpec>::try_new(args.arg1));
    try_or_err!(ctx, copy_to_user(out_ptr, &curr));
    ctx.ok(0)
});
