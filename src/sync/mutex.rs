//! Mutex with priority inheritance.
//!
//! Ownership is task-scoped and recursive. When a more urgent task blocks
//! on a held mutex, the holder inherits its priority until release; release
//! hands ownership directly to the most urgent waiter, so the mutex never
//! passes through an unowned window while tasks wait.
//!
//! Inheritance is direct and one level deep: a holder that is itself
//! blocked on another mutex is not transitively boosted.

use core::cell::UnsafeCell;
use core::ptr::NonNull;

use crate::config::NO_WAIT;
use crate::critical::{critical_section, is_isr_context, CriticalSection};
use crate::error::{KernelError, KernelResult};
use crate::kernel;
use crate::sched;
use crate::sync::pend_list::PendList;
use crate::sync::{block_current, finish_wait, wake_one, yield_to_woken};
use crate::task::Tcb;
use crate::types::{Prio, TaskState, WaitOn};

/// Raw mutex state.
pub struct RawMutex {
    owner: Option<NonNull<Tcb>>,
    /// Owner's priority at acquisition, restored at release
    original_prio: Prio,
    /// Recursive lock depth
    lock_count: u8,
    wait_list: PendList,
}

impl RawMutex {
    pub const fn new() -> Self {
        RawMutex {
            owner: None,
            original_prio: 0,
            lock_count: 0,
            wait_list: PendList::new(),
        }
    }

    pub fn init(&mut self) {
        *self = Self::new();
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.owner.is_some()
    }

    /// Acquire the mutex, waiting up to `timeout_ms`.
    pub fn lock(&mut self, timeout_ms: u32) -> KernelResult<()> {
        if is_isr_context() {
            return Err(KernelError::Isr);
        }
        if !kernel::KERNEL.is_running() {
            return Err(KernelError::State);
        }

        let cs = CriticalSection::enter();

        let cur = unsafe { kernel::current_tcb() }.ok_or(KernelError::State)?;

        let owner = match self.owner {
            None => {
                self.owner = Some(cur);
                self.original_prio = unsafe { cur.as_ref() }.prio;
                self.lock_count = 1;
                return Ok(());
            }
            Some(owner) if owner == cur => {
                if self.lock_count == u8::MAX {
                    return Err(KernelError::State);
                }
                self.lock_count += 1;
                return Ok(());
            }
            Some(owner) => owner,
        };

        if timeout_ms == NO_WAIT {
            return Err(KernelError::Resource);
        }
        if kernel::KERNEL.sched_lock_nesting() != 0 {
            return Err(KernelError::State);
        }

        // Priority inheritance: lift the holder to the blocked task's
        // urgency so it cannot be starved by middle priorities.
        let cur_prio = unsafe { cur.as_ref() }.prio;
        let owner_ref = unsafe { &mut *owner.as_ptr() };
        if cur_prio < owner_ref.prio {
            if owner_ref.state == TaskState::Ready {
                unsafe { sched::change_ready_prio(owner, cur_prio) };
            } else {
                owner_ref.prio = cur_prio;
            }
        }

        let obj = self as *const _ as *const ();
        unsafe { block_current(&mut self.wait_list, obj, WaitOn::Mutex, timeout_ms) };

        drop(cs);
        sched::pend_switch_if_unlocked();

        // Execution resumes here with ownership transferred, or on timeout.
        let _cs = CriticalSection::enter();
        if unsafe { finish_wait(&mut self.wait_list, obj) } {
            Ok(())
        } else {
            Err(KernelError::Timeout)
        }
    }

    /// Release the mutex.
    pub fn unlock(&mut self) -> KernelResult<()> {
        if is_isr_context() {
            return Err(KernelError::Isr);
        }
        if !kernel::KERNEL.is_running() {
            return Err(KernelError::State);
        }

        let cs = CriticalSection::enter();

        let cur = unsafe { kernel::current_tcb() }.ok_or(KernelError::State)?;
        if self.owner != Some(cur) {
            return Err(KernelError::State);
        }

        self.lock_count -= 1;
        if self.lock_count > 0 {
            return Ok(());
        }

        // Shed any inherited boost before handing the mutex over.
        let cur_ref = unsafe { &mut *cur.as_ptr() };
        if cur_ref.prio != self.original_prio {
            if cur_ref.state == TaskState::Ready {
                unsafe { sched::change_ready_prio(cur, self.original_prio) };
            } else {
                cur_ref.prio = self.original_prio;
            }
        }

        if let Some(woken) = unsafe { wake_one(&mut self.wait_list) } {
            self.owner = Some(woken);
            self.original_prio = unsafe { woken.as_ref() }.base_prio;
            self.lock_count = 1;

            drop(cs);
            yield_to_woken(woken);
        } else {
            self.owner = None;
        }

        Ok(())
    }

    /// Acquire without blocking.
    pub fn try_lock(&mut self) -> KernelResult<()> {
        self.lock(NO_WAIT)
    }
}

impl Default for RawMutex {
    fn default() -> Self {
        Self::new()
    }
}

// ============ Safe Wrapper ============

/// Interior-mutable mutex sharable between tasks.
pub struct Mutex {
    inner: UnsafeCell<RawMutex>,
}

unsafe impl Send for Mutex {}
unsafe impl Sync for Mutex {}

impl Mutex {
    pub const fn new() -> Self {
        Mutex {
            inner: UnsafeCell::new(RawMutex::new()),
        }
    }

    /// Reset to the unowned state. Only valid while nothing waits on it.
    pub fn init(&self) -> KernelResult<()> {
        critical_section(|_cs| {
            unsafe { (*self.inner.get()).init() };
            Ok(())
        })
    }

    pub fn lock(&self, timeout_ms: u32) -> KernelResult<()> {
        unsafe { (*self.inner.get()).lock(timeout_ms) }
    }

    pub fn unlock(&self) -> KernelResult<()> {
        unsafe { (*self.inner.get()).unlock() }
    }

    pub fn try_lock(&self) -> KernelResult<()> {
        unsafe { (*self.inner.get()).try_lock() }
    }

    pub fn is_locked(&self) -> bool {
        unsafe { (*self.inner.get()).is_locked() }
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}
