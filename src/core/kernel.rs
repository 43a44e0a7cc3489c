//! Global kernel state and lifecycle.
//!
//! The kernel singleton is created by [`init`] and lives for the rest of the
//! firmware's life. All mutable scheduler state sits behind the interrupt
//! mask; the flag word uses atomics so ISR-side reads need no section.

use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use crate::config::{
    CFG_CPU_CLOCK_HZ, CFG_IDLE_STK_SIZE, CFG_PRIO_IDLE, CFG_PRIO_MAX, CFG_TICK_RATE_HZ,
};
use crate::core::cs_cell::CsCell;
use crate::core::time::delay_list::DelayList;
use crate::critical::{critical_section, is_isr_context};
use crate::error::{KernelError, KernelResult};
use crate::prio::PrioTable;
use crate::sched::ReadyList;
use crate::task::Tcb;
use crate::types::{Prio, StkElement, Tick};

// ============ Kernel Flags ============

/// Atomic kernel flags and counters.
pub struct KernelFlags {
    initialized: AtomicBool,
    running: AtomicBool,
    sched_lock_nesting: AtomicU8,
    tick_counter: AtomicU32,
    #[cfg(feature = "stats")]
    context_switches: AtomicU32,
    #[cfg(feature = "stats")]
    idle_ticks: AtomicU32,
}

impl KernelFlags {
    const fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
            running: AtomicBool::new(false),
            sched_lock_nesting: AtomicU8::new(0),
            tick_counter: AtomicU32::new(0),
            #[cfg(feature = "stats")]
            context_switches: AtomicU32::new(0),
            #[cfg(feature = "stats")]
            idle_ticks: AtomicU32::new(0),
        }
    }

    pub(crate) fn reset(&self) {
        self.initialized.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.sched_lock_nesting.store(0, Ordering::SeqCst);
        self.tick_counter.store(0, Ordering::SeqCst);
        #[cfg(feature = "stats")]
        {
            self.context_switches.store(0, Ordering::SeqCst);
            self.idle_ticks.store(0, Ordering::SeqCst);
        }
    }

    /// Whether the scheduler has been started.
    #[inline(always)]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    #[inline(always)]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Current tick count.
    #[inline(always)]
    pub fn tick_get(&self) -> Tick {
        self.tick_counter.load(Ordering::Relaxed)
    }

    /// Advance the tick counter, returning the new value.
    #[inline(always)]
    pub(crate) fn tick_increment(&self) -> Tick {
        self.tick_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Scheduler lock depth.
    #[inline(always)]
    pub fn sched_lock_nesting(&self) -> u8 {
        self.sched_lock_nesting.load(Ordering::SeqCst)
    }

    pub(crate) fn try_sched_lock(&self) -> KernelResult<()> {
        let nesting = self.sched_lock_nesting.load(Ordering::SeqCst);
        if nesting == u8::MAX {
            return Err(KernelError::State);
        }
        self.sched_lock_nesting.store(nesting + 1, Ordering::SeqCst);
        Ok(())
    }

    pub(crate) fn try_sched_unlock(&self) -> KernelResult<u8> {
        let nesting = self.sched_lock_nesting.load(Ordering::SeqCst);
        if nesting == 0 {
            return Err(KernelError::State);
        }
        self.sched_lock_nesting.store(nesting - 1, Ordering::SeqCst);
        Ok(nesting - 1)
    }

    #[inline(always)]
    pub(crate) fn set_initialized(&self, val: bool) {
        self.initialized.store(val, Ordering::SeqCst);
    }

    #[inline(always)]
    pub(crate) fn set_running(&self, val: bool) {
        self.running.store(val, Ordering::SeqCst);
    }

    #[cfg(feature = "stats")]
    #[inline(always)]
    pub(crate) fn count_context_switch(&self) {
        self.context_switches.fetch_add(1, Ordering::Relaxed);
    }

    #[cfg(feature = "stats")]
    #[inline(always)]
    pub(crate) fn count_idle_tick(&self) {
        self.idle_ticks.fetch_add(1, Ordering::Relaxed);
    }

    #[cfg(feature = "stats")]
    #[inline(always)]
    pub fn context_switches(&self) -> u32 {
        self.context_switches.load(Ordering::Relaxed)
    }

    #[cfg(feature = "stats")]
    #[inline(always)]
    pub fn idle_ticks(&self) -> u32 {
        self.idle_ticks.load(Ordering::Relaxed)
    }
}

/// Global kernel flags instance.
pub(crate) static KERNEL: KernelFlags = KernelFlags::new();

// ============ Scheduler State ============

/// Scheduler data guarded by the interrupt mask.
pub struct SchedState {
    pub(crate) prio_tbl: PrioTable,
    pub(crate) rdy_list: [ReadyList; CFG_PRIO_MAX],
    pub(crate) delay_list: DelayList,
    #[cfg(feature = "timer")]
    pub(crate) timer_list: crate::core::timer::TimerList,
}

impl SchedState {
    const fn new() -> Self {
        Self {
            prio_tbl: PrioTable::new(),
            rdy_list: [ReadyList::new(); CFG_PRIO_MAX],
            delay_list: DelayList::new(),
            #[cfg(feature = "timer")]
            timer_list: crate::core::timer::TimerList::new(),
        }
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Global scheduler state instance.
pub(crate) static SCHED: CsCell<SchedState> = CsCell::new(SchedState::new());

/// Idle task resources.
static mut IDLE_TCB: Tcb = Tcb::new();
static mut IDLE_STK: [StkElement; CFG_IDLE_STK_SIZE] = [0; CFG_IDLE_STK_SIZE];

// ============ CPU State ============

/// Context-switch state shared with the PendSV handler.
#[repr(C)]
pub struct CpuState {
    /// Currently running task, or null before the first dispatch
    pub tcb_cur: *mut Tcb,
}

/// Global CPU state instance.
#[no_mangle]
#[used]
pub static mut CPU_STATE: CpuState = CpuState {
    tcb_cur: core::ptr::null_mut(),
};

// ============ Internal accessors ============

/// # Safety
/// Read under the interrupt mask, or from a context PendSV cannot preempt.
#[inline]
pub(crate) unsafe fn current_tcb() -> Option<NonNull<Tcb>> {
    unsafe { NonNull::new(CPU_STATE.tcb_cur) }
}

/// # Safety
/// Only the selection step and startup may set this, interrupts masked.
#[inline]
pub(crate) unsafe fn set_current_tcb(tcb: Option<NonNull<Tcb>>) {
    unsafe {
        CPU_STATE.tcb_cur = tcb.map_or(core::ptr::null_mut(), |p| p.as_ptr());
    }
}

#[inline]
pub(crate) unsafe fn is_idle(tcb: NonNull<Tcb>) -> bool {
    tcb.as_ptr() == &raw mut IDLE_TCB
}

/// # Safety
/// Interrupts must be masked.
#[inline(always)]
pub(crate) unsafe fn prio_table() -> &'static mut PrioTable {
    unsafe { &mut SCHED.get_unchecked().prio_tbl }
}

/// # Safety
/// Interrupts must be masked; `prio` must be in range.
#[inline(always)]
pub(crate) unsafe fn rdy_list(prio: Prio) -> &'static mut ReadyList {
    unsafe { &mut SCHED.get_unchecked().rdy_list[prio as usize] }
}

/// # Safety
/// Interrupts must be masked.
#[inline(always)]
pub(crate) unsafe fn delay_list() -> &'static mut DelayList {
    unsafe { &mut SCHED.get_unchecked().delay_list }
}

/// # Safety
/// Interrupts must be masked.
#[cfg(feature = "timer")]
#[inline(always)]
pub(crate) unsafe fn timer_list() -> &'static mut crate::core::timer::TimerList {
    unsafe { &mut SCHED.get_unchecked().timer_list }
}

// ============ Idle Task ============

/// Always-ready lowest-priority task; parks the core until the next
/// interrupt.
fn idle_task(_: *mut ()) -> ! {
    loop {
        #[cfg(feature = "stats")]
        KERNEL.count_idle_tick();
        cortex_m::asm::wfi();
    }
}

// ============ Public API ============

/// Initialize the kernel.
///
/// Must be called before any other kernel function. Resets all scheduler
/// state and creates the idle task.
pub fn init() -> KernelResult<()> {
    if KERNEL.is_running() {
        return Err(KernelError::State);
    }

    KERNEL.reset();

    critical_section(|cs| {
        SCHED.get(cs).reset();

        unsafe {
            CPU_STATE.tcb_cur = core::ptr::null_mut();

            crate::task::create_raw(
                &raw mut IDLE_TCB,
                (&raw mut IDLE_STK).cast::<StkElement>(),
                CFG_IDLE_STK_SIZE,
                "idle",
                idle_task,
                CFG_PRIO_IDLE,
                core::ptr::null_mut(),
            )?;
        }

        Ok(())
    })?;

    KERNEL.set_initialized(true);

    Ok(())
}

/// Start multitasking.
///
/// On success this never returns: the tick source is armed, the first
/// context switch is pended, and the highest-priority ready task takes the
/// CPU. At least the idle task exists once [`init`] has run.
pub fn start() -> KernelResult<()> {
    if !KERNEL.is_initialized() {
        return Err(KernelError::State);
    }
    if KERNEL.is_running() {
        return Err(KernelError::State);
    }

    KERNEL.set_running(true);

    crate::info!("scheduler starting, tick {=u32} Hz", CFG_TICK_RATE_HZ);

    crate::port::systick_init(CFG_CPU_CLOCK_HZ / CFG_TICK_RATE_HZ);

    unsafe { crate::port::start_scheduler() }
}

/// Whether the scheduler has been started.
#[inline]
pub fn is_running() -> bool {
    KERNEL.is_running()
}

/// Whether the caller is executing in interrupt context.
#[inline]
pub fn in_isr() -> bool {
    is_isr_context()
}

/// Suppress preemption without masking interrupts. Nests.
pub fn sched_lock() -> KernelResult<()> {
    if !KERNEL.is_running() {
        return Err(KernelError::State);
    }
    if is_isr_context() {
        return Err(KernelError::Isr);
    }

    critical_section(|_cs| KERNEL.try_sched_lock())
}

/// Undo one level of [`sched_lock`]; the outermost unlock re-evaluates
/// preemption.
pub fn sched_unlock() -> KernelResult<()> {
    if !KERNEL.is_running() {
        return Err(KernelError::State);
    }
    if is_isr_context() {
        return Err(KernelError::Isr);
    }

    critical_section(|_cs| {
        let remaining = KERNEL.try_sched_unlock()?;
        if remaining == 0 {
            unsafe { crate::sched::preempt_check() };
        }
        Ok(())
    })
}

/// Context switches since boot.
#[cfg(feature = "stats")]
pub fn stats_context_switches() -> u32 {
    KERNEL.context_switches()
}

/// Ticks the idle task has spent parked.
#[cfg(feature = "stats")]
pub fn stats_idle_ticks() -> u32 {
    KERNEL.idle_ticks()
}
