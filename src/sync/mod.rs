//! Synchronization primitives and the shared blocking protocol.
//!
//! Every blocking primitive follows the same two-phase shape: under the
//! interrupt mask it parks the caller on the object's wait list (arming a
//! timeout through the delay list when asked to), leaves the critical
//! section, and pends a context switch. When the task runs again it
//! distinguishes the outcome by its wait back-pointer: a waker cleared it
//! under the mask, while a timeout left it set.

pub mod pend_list;

#[cfg(feature = "sem")]
pub mod sem;

#[cfg(feature = "mutex")]
pub mod mutex;

#[cfg(feature = "queue")]
pub mod queue;

#[cfg(any(feature = "sem", feature = "mutex", feature = "queue"))]
mod protocol {
    use core::ptr::NonNull;

    use crate::config::WAIT_FOREVER;
    use crate::core::time::ms_to_ticks;
    use crate::kernel;
    use crate::sched;
    use crate::sync::pend_list::PendList;
    use crate::task::Tcb;
    use crate::types::{TaskState, WaitOn};

    /// Park the current task on `list`, arming a timeout unless the caller
    /// waits forever.
    ///
    /// Must run with interrupts masked; the caller pends the context switch
    /// after leaving the critical section.
    pub(crate) unsafe fn block_current(
        list: &mut PendList,
        obj: *const (),
        wait_on: WaitOn,
        timeout_ms: u32,
    ) {
        let cur = match unsafe { kernel::current_tcb() } {
            Some(cur) => cur,
            None => return,
        };
        let cur_ref = unsafe { &mut *cur.as_ptr() };

        cur_ref.state = TaskState::Blocked;
        cur_ref.pend_obj = obj;
        cur_ref.pend_on = wait_on;

        if timeout_ms != WAIT_FOREVER {
            cur_ref.wake_tick = kernel::KERNEL
                .tick_get()
                .wrapping_add(ms_to_ticks(timeout_ms));
            unsafe { kernel::delay_list() }.insert(cur);
        } else {
            cur_ref.wake_tick = 0;
        }

        list.insert_by_prio(cur);
    }

    /// Wake the most urgent waiter on `list`, if any.
    ///
    /// Must run with interrupts masked. The waiter is detached from the
    /// delay list when a timeout was armed, its back-pointer is cleared,
    /// and it joins the ready structure unless a timeout already made it
    /// Ready (it then observes the cleared back-pointer and reports
    /// success) or it was suspended while blocked.
    pub(crate) unsafe fn wake_one(list: &mut PendList) -> Option<NonNull<Tcb>> {
        let tcb = list.pop_head()?;
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        if tcb_ref.wake_tick != 0 {
            unsafe { kernel::delay_list() }.remove(tcb);
            tcb_ref.wake_tick = 0;
        }

        tcb_ref.pend_obj = core::ptr::null();
        tcb_ref.pend_on = WaitOn::Nothing;

        if tcb_ref.state == TaskState::Blocked {
            unsafe { sched::make_ready(tcb) };
        }

        Some(tcb)
    }

    /// Preemption request after waking `woken` from task context.
    pub(crate) fn yield_to_woken(woken: NonNull<Tcb>) {
        if !kernel::KERNEL.is_running() {
            return;
        }
        let cur = match unsafe { kernel::current_tcb() } {
            Some(cur) => cur,
            None => return,
        };
        if unsafe { woken.as_ref() }.prio < unsafe { cur.as_ref() }.prio {
            sched::pend_switch_if_unlocked();
        }
    }

    /// Outcome check once a blocked task runs again: returns `true` when a
    /// waker granted the resource. A back-pointer still aimed at `obj`
    /// means the wait timed out (or the task was forcibly detached), so the
    /// task removes itself from the wait list.
    pub(crate) unsafe fn finish_wait(list: &mut PendList, obj: *const ()) -> bool {
        if let Some(cur) = unsafe { kernel::current_tcb() } {
            let cur_ref = unsafe { &mut *cur.as_ptr() };
            if cur_ref.pend_obj == obj {
                list.remove(cur);
                cur_ref.pend_obj = core::ptr::null();
                cur_ref.pend_on = WaitOn::Nothing;
                return false;
            }
        }
        true
    }
}

#[cfg(any(feature = "sem", feature = "mutex", feature = "queue"))]
pub(crate) use protocol::{block_current, finish_wait, wake_one, yield_to_woken};
