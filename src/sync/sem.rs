//! Binary semaphore.
//!
//! Count is 0 or 1. A post with waiters hands the token straight to the
//! most urgent one; a post with the count already at 1 is absorbed.

use core::cell::UnsafeCell;

use crate::config::NO_WAIT;
use crate::critical::{critical_section, is_isr_context, CriticalSection};
use crate::error::{KernelError, KernelResult};
use crate::kernel;
use crate::sched;
use crate::sync::pend_list::PendList;
use crate::sync::{block_current, finish_wait, wake_one, yield_to_woken};
use crate::types::WaitOn;

/// Raw binary semaphore state.
pub struct RawSem {
    count: u32,
    wait_list: PendList,
}

impl RawSem {
    pub const fn new(initial: u32) -> Self {
        RawSem {
            count: if initial != 0 { 1 } else { 0 },
            wait_list: PendList::new(),
        }
    }

    pub fn init(&mut self, initial: u32) {
        self.count = if initial != 0 { 1 } else { 0 };
        self.wait_list = PendList::new();
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Take the semaphore, waiting up to `timeout_ms`.
    pub fn wait(&mut self, timeout_ms: u32) -> KernelResult<()> {
        if is_isr_context() && timeout_ms != NO_WAIT {
            return Err(KernelError::Isr);
        }

        let cs = CriticalSection::enter();

        if self.count > 0 {
            self.count -= 1;
            return Ok(());
        }

        if timeout_ms == NO_WAIT {
            return Err(KernelError::Resource);
        }
        if !kernel::KERNEL.is_running() || kernel::KERNEL.sched_lock_nesting() != 0 {
            return Err(KernelError::State);
        }

        let obj = self as *const _ as *const ();
        unsafe { block_current(&mut self.wait_list, obj, WaitOn::Sem, timeout_ms) };

        drop(cs);
        sched::pend_switch_if_unlocked();

        // Execution resumes here after a post or a timeout.
        let _cs = CriticalSection::enter();
        if unsafe { finish_wait(&mut self.wait_list, obj) } {
            Ok(())
        } else {
            Err(KernelError::Timeout)
        }
    }

    /// Release the semaphore.
    pub fn post(&mut self) -> KernelResult<()> {
        let cs = CriticalSection::enter();

        if let Some(woken) = unsafe { wake_one(&mut self.wait_list) } {
            drop(cs);
            if !is_isr_context() {
                yield_to_woken(woken);
            }
            return Ok(());
        }

        if self.count == 0 {
            self.count = 1;
        }

        Ok(())
    }

    /// Take without blocking.
    pub fn try_wait(&mut self) -> KernelResult<()> {
        self.wait(NO_WAIT)
    }
}

impl Default for RawSem {
    fn default() -> Self {
        Self::new(0)
    }
}

// ============ Safe Wrapper ============

/// Interior-mutable semaphore sharable between tasks and ISRs.
pub struct Semaphore {
    inner: UnsafeCell<RawSem>,
}

unsafe impl Send for Semaphore {}
unsafe impl Sync for Semaphore {}

impl Semaphore {
    pub const fn new(initial: u32) -> Self {
        Semaphore {
            inner: UnsafeCell::new(RawSem::new(initial)),
        }
    }

    /// Reset count and wait list. Only valid while nothing waits on it.
    pub fn init(&self, initial: u32) -> KernelResult<()> {
        critical_section(|_cs| {
            unsafe { (*self.inner.get()).init(initial) };
            Ok(())
        })
    }

    pub fn wait(&self, timeout_ms: u32) -> KernelResult<()> {
        unsafe { (*self.inner.get()).wait(timeout_ms) }
    }

    pub fn post(&self) -> KernelResult<()> {
        unsafe { (*self.inner.get()).post() }
    }

    pub fn try_wait(&self) -> KernelResult<()> {
        unsafe { (*self.inner.get()).try_wait() }
    }

    pub fn count(&self) -> u32 {
        unsafe { (*self.inner.get()).count() }
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new(0)
    }
}
