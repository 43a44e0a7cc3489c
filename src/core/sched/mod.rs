//! Scheduler: ready-structure bookkeeping, scheduling points, and the
//! selection step run from the context-switch exception.
//!
//! Scheduling points never switch directly; they pend the PendSV exception
//! and selection happens there, at the lowest exception priority, after all
//! other interrupts have retired.

mod rdy_list;

pub use rdy_list::ReadyList;

use core::ptr::NonNull;

use crate::critical::is_isr_context;
use crate::kernel;
use crate::task::Tcb;
use crate::types::{Prio, StkElement, TaskState};

/// Make a task Ready and append it to its priority FIFO.
///
/// Must run with interrupts masked.
pub(crate) unsafe fn make_ready(tcb: NonNull<Tcb>) {
    let tcb_ref = unsafe { &mut *tcb.as_ptr() };
    tcb_ref.state = TaskState::Ready;
    let prio = tcb_ref.prio;
    unsafe {
        kernel::rdy_list(prio).insert_tail(tcb);
        kernel::prio_table().insert(prio);
    }
}

/// Remove a Ready task from its priority FIFO, clearing the bitmap bit when
/// the FIFO drains.
///
/// Must run with interrupts masked.
pub(crate) unsafe fn remove_ready(tcb: NonNull<Tcb>) {
    let prio = unsafe { tcb.as_ref() }.prio;
    unsafe {
        let rdy = kernel::rdy_list(prio);
        rdy.remove(tcb);
        if rdy.is_empty() {
            kernel::prio_table().remove(prio);
        }
    }
}

/// Re-file a Ready task under a new priority, keeping FIFO order at the
/// destination. Used by priority inheritance.
pub(crate) unsafe fn change_ready_prio(tcb: NonNull<Tcb>, new_prio: Prio) {
    let tcb_ref = unsafe { &mut *tcb.as_ptr() };
    if tcb_ref.prio == new_prio {
        return;
    }
    unsafe { remove_ready(tcb) };
    tcb_ref.prio = new_prio;
    unsafe {
        kernel::rdy_list(new_prio).insert_tail(tcb);
        kernel::prio_table().insert(new_prio);
    }
}

/// Pend the context-switch exception unless the scheduler lock is held.
pub(crate) fn pend_switch_if_unlocked() {
    if kernel::KERNEL.is_running() && kernel::KERNEL.sched_lock_nesting() == 0 {
        crate::port::pend_switch();
    }
}

/// Preemption check: pend a switch when a task at the running priority or
/// higher is ready. Runs from the tick handler and after the scheduler
/// unlocks; interrupts must be masked.
pub(crate) unsafe fn preempt_check() {
    if !kernel::KERNEL.is_running() || kernel::KERNEL.sched_lock_nesting() != 0 {
        return;
    }

    let highest = unsafe { kernel::prio_table() }.highest();
    if let (Some(p), Some(cur)) = (highest, unsafe { kernel::current_tcb() }) {
        if p <= unsafe { cur.as_ref() }.prio {
            crate::port::pend_switch();
        }
    }
}

/// Give up the CPU voluntarily.
///
/// The caller is re-appended at the tail of its FIFO during selection, so
/// equal-priority tasks rotate in arrival order.
pub fn yield_now() {
    if !kernel::KERNEL.is_running() || is_isr_context() {
        return;
    }
    pend_switch_if_unlocked();
}

/// Select the next task to run.
///
/// Called from the context-switch exception with interrupts masked:
/// re-appends the outgoing task when it is still Running, picks the head of
/// the highest non-empty ready FIFO, and marks it Running. Returns the
/// incoming task's saved stack pointer, or null when nothing is ready.
pub(crate) unsafe fn switch_context() -> *mut StkElement {
    #[cfg(feature = "stats")]
    kernel::KERNEL.count_context_switch();

    unsafe {
        if let Some(cur) = kernel::current_tcb() {
            if cur.as_ref().state == TaskState::Running {
                make_ready(cur);
            }
        }

        let next = match kernel::prio_table().highest() {
            Some(p) => kernel::rdy_list(p).head(),
            None => None,
        };

        match next {
            Some(next) => {
                remove_ready(next);
                let next_ref = &mut *next.as_ptr();
                next_ref.state = TaskState::Running;
                #[cfg(feature = "stats")]
                {
                    next_ref.run_count = next_ref.run_count.wrapping_add(1);
                }
                kernel::set_current_tcb(Some(next));
                next_ref.stk_ptr
            }
            None => core::ptr::null_mut(),
        }
    }
}
