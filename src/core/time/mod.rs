//! Time management: delays, the tick handler, and millisecond conversion.

pub(crate) mod delay_list;

use crate::config::CFG_TICK_RATE_HZ;
use crate::critical::{is_isr_context, CriticalSection};
use crate::error::{KernelError, KernelResult};
use crate::kernel;
use crate::sched;
use crate::types::{tick_diff, tick_reached, TaskState, Tick};

/// Convert a millisecond interval to at least one tick.
pub(crate) fn ms_to_ticks(ms: u32) -> Tick {
    let ticks = (ms as u64 * CFG_TICK_RATE_HZ as u64 / 1000) as Tick;
    if ticks == 0 {
        1
    } else {
        ticks
    }
}

/// Current kernel tick.
#[inline]
pub fn now() -> Tick {
    kernel::KERNEL.tick_get()
}

/// Put the calling task to sleep for at least `ms` milliseconds.
///
/// A zero delay returns immediately.
pub fn delay(ms: u32) -> KernelResult<()> {
    if ms == 0 {
        return Ok(());
    }
    let wake = now().wrapping_add(ms_to_ticks(ms));
    sleep_until(wake)
}

/// Sleep until the absolute tick `wake_tick`.
///
/// Returns immediately when the tick has already been reached. Driving a
/// periodic task with `last_wake += period` through this call is free of
/// cumulative drift.
pub fn delay_until(wake_tick: Tick) -> KernelResult<()> {
    if tick_diff(wake_tick, now()) <= 0 {
        return Ok(());
    }
    sleep_until(wake_tick)
}

fn sleep_until(wake_tick: Tick) -> KernelResult<()> {
    if !kernel::KERNEL.is_running() {
        return Err(KernelError::State);
    }
    if is_isr_context() {
        return Err(KernelError::Isr);
    }
    if kernel::KERNEL.sched_lock_nesting() != 0 {
        return Err(KernelError::State);
    }

    {
        let _cs = CriticalSection::enter();

        let cur = unsafe { kernel::current_tcb() }.ok_or(KernelError::State)?;
        let cur_ref = unsafe { &mut *cur.as_ptr() };

        cur_ref.state = TaskState::Blocked;
        cur_ref.wake_tick = wake_tick;
        unsafe { kernel::delay_list() }.insert(cur);
    }

    sched::pend_switch_if_unlocked();

    Ok(())
}

/// Kernel tick entry, invoked from the SysTick exception.
///
/// Advances the tick counter, runs due soft timers, wakes expired delays,
/// and requests preemption when a task at the running priority or higher
/// became ready.
pub fn tick_handler() {
    if !kernel::KERNEL.is_running() {
        return;
    }

    let _cs = CriticalSection::enter();

    let now = kernel::KERNEL.tick_increment();

    #[cfg(feature = "timer")]
    unsafe {
        crate::core::timer::process_expired(now)
    };

    unsafe { wake_expired(now) };

    unsafe { sched::preempt_check() };
}

/// Move every due task off the delay list. Interrupts must be masked.
unsafe fn wake_expired(now: Tick) {
    loop {
        let head = match unsafe { kernel::delay_list() }.head() {
            Some(h) => h,
            None => break,
        };

        let tcb = unsafe { &mut *head.as_ptr() };
        if !tick_reached(now, tcb.wake_tick) {
            break;
        }

        unsafe { kernel::delay_list() }.remove(head);
        tcb.wake_tick = 0;

        // A task waiting on a sync object keeps its wait linkage; it
        // detaches itself and reports the timeout once it runs.
        if tcb.state == TaskState::Blocked {
            unsafe { sched::make_ready(head) };
        }
    }
}

/// SysTick exception handler.
#[no_mangle]
pub extern "C" fn SysTick() {
    tick_handler();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ms_conversion_floors_at_one_tick() {
        // 1 kHz tick: 1 ms per tick.
        assert_eq!(ms_to_ticks(1), 1);
        assert_eq!(ms_to_ticks(30), 30);
        // Sub-tick intervals round up to a single tick.
        assert_eq!(ms_to_ticks(0), 1);
    }

    #[test]
    fn ms_conversion_does_not_overflow() {
        let ticks = ms_to_ticks(0xFFFF_FFFE);
        assert!(ticks > 0);
    }
}
