//! Task management: creation, suspension, and stack instrumentation.

mod tcb;

pub use tcb::Tcb;

use core::ptr::NonNull;

use crate::config::{CFG_PRIO_MAX, CFG_STK_SIZE_MIN};
use crate::critical::{critical_section, is_isr_context};
use crate::error::{KernelError, KernelResult};
use crate::kernel;
use crate::sched;
use crate::types::{Prio, StkElement, TaskFn, TaskState};

/// Pattern the stack is filled with at creation, for watermarking and
/// overflow detection.
pub const STACK_MARKER: StkElement = 0xDEAD_BEEF;

/// Create a task and make it ready.
///
/// The stack is filled with [`STACK_MARKER`] and an initial register image
/// is composed at its top so the first dispatch enters `entry(arg)` with
/// interrupts enabled. When the scheduler is running and `prio` is more
/// urgent than the caller's, the new task preempts before `create` returns.
///
/// # Example
/// ```ignore
/// static mut WORKER_TCB: Tcb = Tcb::new();
/// static mut WORKER_STK: [StkElement; 256] = [0; 256];
///
/// fn worker(_: *mut ()) -> ! {
///     loop { /* ... */ }
/// }
///
/// task::create(
///     unsafe { &mut WORKER_TCB },
///     unsafe { &mut WORKER_STK },
///     "worker",
///     worker,
///     2,
///     core::ptr::null_mut(),
/// ).unwrap();
/// ```
pub fn create(
    tcb: &'static mut Tcb,
    stack: &'static mut [StkElement],
    name: &'static str,
    entry: TaskFn,
    prio: Prio,
    arg: *mut (),
) -> KernelResult<()> {
    if is_isr_context() {
        return Err(KernelError::Isr);
    }
    unsafe {
        create_raw(
            tcb as *mut Tcb,
            stack.as_mut_ptr(),
            stack.len(),
            name,
            entry,
            prio,
            arg,
        )
    }
}

/// Creation path shared with the kernel-internal idle task.
///
/// # Safety
/// `tcb` and `stack` must stay valid and unaliased for the task's lifetime.
pub(crate) unsafe fn create_raw(
    tcb: *mut Tcb,
    stk_base: *mut StkElement,
    stk_size: usize,
    name: &'static str,
    entry: TaskFn,
    prio: Prio,
    arg: *mut (),
) -> KernelResult<()> {
    if tcb.is_null() || stk_base.is_null() {
        return Err(KernelError::Param);
    }
    if stk_size < CFG_STK_SIZE_MIN {
        return Err(KernelError::Param);
    }
    if prio as usize >= CFG_PRIO_MAX {
        return Err(KernelError::Param);
    }

    critical_section(|_cs| {
        let tcb_ref = unsafe { &mut *tcb };
        tcb_ref.init();

        tcb_ref.name = name;
        tcb_ref.prio = prio;
        tcb_ref.base_prio = prio;
        tcb_ref.stk_base = stk_base;
        tcb_ref.stk_size = stk_size;

        // Watermark fill; the initial frame overwrites the top words.
        for i in 0..stk_size {
            unsafe { stk_base.add(i).write(STACK_MARKER) };
        }

        tcb_ref.stk_ptr = unsafe { crate::port::init_task_stack(entry, arg, stk_base, stk_size) };

        let tcb_nn = unsafe { NonNull::new_unchecked(tcb) };
        unsafe { sched::make_ready(tcb_nn) };

        if kernel::KERNEL.is_running() {
            if let Some(cur) = unsafe { kernel::current_tcb() } {
                if prio < unsafe { cur.as_ref() }.prio {
                    sched::pend_switch_if_unlocked();
                }
            }
        }

        Ok(())
    })
}

/// Suspend a task; `None` suspends the caller.
///
/// A task blocked on a sync object keeps its wait-list linkage: once
/// resumed it detaches itself and the pending operation reports `Timeout`.
pub fn suspend(tcb: Option<NonNull<Tcb>>) -> KernelResult<()> {
    if !kernel::KERNEL.is_running() {
        return Err(KernelError::State);
    }
    if is_isr_context() {
        return Err(KernelError::Isr);
    }

    critical_section(|_cs| {
        let tcb_ptr = match tcb {
            Some(ptr) => ptr,
            None => unsafe { kernel::current_tcb() }.ok_or(KernelError::State)?,
        };

        if unsafe { kernel::is_idle(tcb_ptr) } {
            return Err(KernelError::State);
        }

        let tcb_ref = unsafe { &mut *tcb_ptr.as_ptr() };
        match tcb_ref.state {
            TaskState::Suspended => return Err(KernelError::State),
            TaskState::Ready => unsafe { sched::remove_ready(tcb_ptr) },
            TaskState::Blocked => {
                if tcb_ref.wake_tick != 0 {
                    unsafe { kernel::delay_list() }.remove(tcb_ptr);
                    tcb_ref.wake_tick = 0;
                }
            }
            TaskState::Running => {}
        }

        tcb_ref.state = TaskState::Suspended;

        let is_current = unsafe { kernel::current_tcb() } == Some(tcb_ptr);
        if is_current {
            sched::pend_switch_if_unlocked();
        }

        Ok(())
    })
}

/// Resume a suspended task.
pub fn resume(tcb: NonNull<Tcb>) -> KernelResult<()> {
    if !kernel::KERNEL.is_running() {
        return Err(KernelError::State);
    }

    critical_section(|_cs| {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        if tcb_ref.state != TaskState::Suspended {
            return Err(KernelError::State);
        }

        unsafe { sched::make_ready(tcb) };

        if !is_isr_context() {
            if let Some(cur) = unsafe { kernel::current_tcb() } {
                if tcb_ref.prio < unsafe { cur.as_ref() }.prio {
                    sched::pend_switch_if_unlocked();
                }
            }
        }

        Ok(())
    })
}

/// The currently running task, if the scheduler has dispatched one.
pub fn current() -> Option<NonNull<Tcb>> {
    unsafe { kernel::current_tcb() }
}

/// Task name.
pub fn name(tcb: &Tcb) -> &'static str {
    tcb.name
}

/// Current (possibly inherited) priority.
pub fn priority(tcb: &Tcb) -> Prio {
    tcb.prio
}

/// Times the task has been dispatched.
#[cfg(feature = "stats")]
pub fn run_count(tcb: &Tcb) -> u32 {
    tcb.run_count
}

/// Unused stack in bytes, measured from how far the watermark fill
/// survives above the stack base.
pub fn stack_unused(tcb: &Tcb) -> usize {
    if tcb.stk_base.is_null() {
        return 0;
    }

    let mut unused = 0;
    for i in 0..tcb.stk_size {
        if unsafe { tcb.stk_base.add(i).read() } == STACK_MARKER {
            unused += 1;
        } else {
            break;
        }
    }

    unused * core::mem::size_of::<StkElement>()
}

/// Whether the bottom sentinel word has been overwritten.
///
/// Only catches overshoot that reaches the stack base; an MPU guard region
/// would be needed for anything stronger.
pub fn stack_overflow(tcb: &Tcb) -> bool {
    if tcb.stk_base.is_null() {
        return false;
    }
    (unsafe { tcb.stk_base.read() }) != STACK_MARKER
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_watermark_counts_from_base() {
        let mut stack = [STACK_MARKER; 64];
        // Simulate a task having used the top 16 words.
        for word in stack[48..].iter_mut() {
            *word = 0;
        }

        let mut tcb = Tcb::new();
        tcb.stk_base = stack.as_mut_ptr();
        tcb.stk_size = stack.len();

        assert_eq!(stack_unused(&tcb), 48 * core::mem::size_of::<StkElement>());
        assert!(!stack_overflow(&tcb));
    }

    #[test]
    fn overflow_detected_when_base_mutated() {
        let mut stack = [STACK_MARKER; 64];
        stack[0] = 0x1234_5678;

        let mut tcb = Tcb::new();
        tcb.stk_base = stack.as_mut_ptr();
        tcb.stk_size = stack.len();

        assert!(stack_overflow(&tcb));
        assert_eq!(stack_unused(&tcb), 0);
    }
}
