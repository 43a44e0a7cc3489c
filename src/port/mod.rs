//! CPU port layer.
//!
//! Everything the kernel needs from the machine: a tick source, a pendable
//! lowest-priority switch exception, initial stack frames, and a way to
//! enter the first task.

#[cfg(target_arch = "arm")]
pub mod cortex_m4;

#[cfg(target_arch = "arm")]
pub use cortex_m4::*;

// Stub implementations so the algorithmic core builds and tests on the
// host.
#[cfg(not(target_arch = "arm"))]
pub mod stub {
    use crate::types::{StkElement, TaskFn};

    pub fn systick_init(_reload: u32) {}

    pub fn pend_switch() {}

    /// # Safety
    /// Never returns on real hardware; on the host it only panics.
    pub unsafe fn start_scheduler() -> ! {
        panic!("the scheduler can only start on the target");
    }

    /// # Safety
    /// Mirrors the target contract; the frame itself is not constructed.
    pub unsafe fn init_task_stack(
        _entry: TaskFn,
        _arg: *mut (),
        stk_base: *mut StkElement,
        stk_size: usize,
    ) -> *mut StkElement {
        unsafe { stk_base.add(stk_size.saturating_sub(16)) }
    }
}

#[cfg(not(target_arch = "arm"))]
pub use stub::*;
