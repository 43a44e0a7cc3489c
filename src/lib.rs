//! picortos: a small preemptive RTOS kernel for single-core ARM Cortex-M4
//!
//! The kernel provides:
//! - Priority-based preemptive scheduling with O(1) task selection
//! - Synchronization primitives: binary semaphores, mutexes with priority
//!   inheritance, bounded message queues
//! - Tick-driven delays and soft timers
//! - Deferred context switching through the PendSV exception
//!
//! All task, sync-object, and timer storage is provided by the caller; the
//! kernel never allocates.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

// ============ Critical Section ============

#[cfg(target_arch = "arm")]
mod cs_impl {
    use cortex_m::interrupt;
    use cortex_m::register::primask;
    use critical_section::{set_impl, Impl, RawRestoreState};

    struct SingleCoreCriticalSection;
    set_impl!(SingleCoreCriticalSection);

    unsafe impl Impl for SingleCoreCriticalSection {
        unsafe fn acquire() -> RawRestoreState {
            let was_active = primask::read().is_active();
            interrupt::disable();
            was_active
        }

        unsafe fn release(was_active: RawRestoreState) {
            if was_active {
                unsafe { interrupt::enable() }
            }
        }
    }
}

// ============ Modules ============

pub mod log;
mod lang_items;

pub mod core;
pub mod port;
pub mod sync;

// ============ Re-exports ============

pub use crate::core::config;
pub use crate::core::critical;
pub use crate::core::critical::CriticalSection;
pub use crate::core::error;
pub use crate::core::error::{KernelError, KernelResult};
pub use crate::core::kernel;
pub use crate::core::prio;
pub use crate::core::sched;
pub use crate::core::task;
pub use crate::core::task::Tcb;
pub use crate::core::time;
pub use crate::core::types;
pub use crate::core::types::*;

#[cfg(feature = "timer")]
pub use crate::core::timer;

#[cfg(feature = "sem")]
pub use crate::sync::sem;

#[cfg(feature = "mutex")]
pub use crate::sync::mutex;

#[cfg(feature = "queue")]
pub use crate::sync::queue;
