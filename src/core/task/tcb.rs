//! Task control block.

use core::ptr::NonNull;

use crate::types::{Prio, StkElement, TaskState, Tick, WaitOn};

/// Per-task descriptor.
///
/// Storage is provided by the caller; the kernel borrows the block for the
/// task's lifetime and weaves its list linkage through it. The saved stack
/// pointer must stay the first field: the PendSV handler loads and stores
/// it through the raw TCB pointer at offset 0.
#[repr(C)]
pub struct Tcb {
    /// Saved process stack pointer
    pub stk_ptr: *mut StkElement,

    /// Base of the caller-provided stack
    pub stk_base: *mut StkElement,
    /// Stack size in words
    pub stk_size: usize,

    /// Task name for debugging
    pub name: &'static str,

    // Ready-list links
    pub next: Option<NonNull<Tcb>>,
    pub prev: Option<NonNull<Tcb>>,

    // Wait-list links
    pub pend_next: Option<NonNull<Tcb>>,
    pub pend_prev: Option<NonNull<Tcb>>,
    /// Sync object this task is blocked on, or null
    pub pend_obj: *const (),
    /// Kind of object behind `pend_obj`
    pub pend_on: WaitOn,

    // Delay-list links
    pub tick_next: Option<NonNull<Tcb>>,
    pub tick_prev: Option<NonNull<Tcb>>,
    /// Absolute wake tick; 0 means no timeout armed
    pub wake_tick: Tick,

    /// Current priority, possibly boosted by priority inheritance
    pub prio: Prio,
    /// Priority the task was created with
    pub base_prio: Prio,

    /// Scheduling state
    pub state: TaskState,

    /// Times this task has been dispatched
    #[cfg(feature = "stats")]
    pub run_count: u32,
}

impl Tcb {
    pub const fn new() -> Self {
        Tcb {
            stk_ptr: core::ptr::null_mut(),
            stk_base: core::ptr::null_mut(),
            stk_size: 0,

            name: "",

            next: None,
            prev: None,

            pend_next: None,
            pend_prev: None,
            pend_obj: core::ptr::null(),
            pend_on: WaitOn::Nothing,

            tick_next: None,
            tick_prev: None,
            wake_tick: 0,

            prio: 0,
            base_prio: 0,

            state: TaskState::Ready,

            #[cfg(feature = "stats")]
            run_count: 0,
        }
    }

    /// Reset every field to its creation default.
    pub fn init(&mut self) {
        *self = Self::new();
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.state == TaskState::Ready
    }

    #[inline]
    pub fn is_blocked(&self) -> bool {
        self.state == TaskState::Blocked
    }

    #[inline]
    pub fn is_suspended(&self) -> bool {
        self.state == TaskState::Suspended
    }
}

impl Default for Tcb {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for Tcb {}
unsafe impl Sync for Tcb {}
