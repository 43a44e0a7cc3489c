//! Soft timers: one-shot and periodic callbacks driven from the tick
//! handler.
//!
//! Active timers sit on a single list sorted by expiry tick, so the tick
//! handler stops at the first timer that is not yet due. Callbacks run in
//! tick (interrupt) context and must be brief and non-blocking.

use core::cell::UnsafeCell;
use core::ptr::NonNull;

use crate::core::time::ms_to_ticks;
use crate::critical::critical_section;
use crate::error::{KernelError, KernelResult};
use crate::kernel;
use crate::types::{tick_diff, tick_reached, Tick};

/// Timer callback, invoked in tick context.
pub type TimerFn = fn(*mut ());

/// Raw timer control block. Caller-provided storage; while active it is
/// linked into the kernel's timer list and must not move.
pub struct RawTimer {
    period_ticks: Tick,
    next_expiry: Tick,
    callback: Option<TimerFn>,
    arg: *mut (),
    active: bool,
    one_shot: bool,
    next: Option<NonNull<RawTimer>>,
}

impl RawTimer {
    pub const fn new() -> Self {
        RawTimer {
            period_ticks: 0,
            next_expiry: 0,
            callback: None,
            arg: core::ptr::null_mut(),
            active: false,
            one_shot: false,
            next: None,
        }
    }

    pub fn init(&mut self) {
        *self = Self::new();
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Arm as a periodic timer firing every `period_ms`.
    ///
    /// # Safety
    /// The timer must stay pinned at its address while active.
    pub unsafe fn start(
        &mut self,
        period_ms: u32,
        callback: TimerFn,
        arg: *mut (),
    ) -> KernelResult<()> {
        unsafe { self.arm(period_ms, callback, arg, false) }
    }

    /// Arm as a one-shot timer firing once after `delay_ms`.
    ///
    /// # Safety
    /// The timer must stay pinned at its address while active.
    pub unsafe fn start_once(
        &mut self,
        delay_ms: u32,
        callback: TimerFn,
        arg: *mut (),
    ) -> KernelResult<()> {
        unsafe { self.arm(delay_ms, callback, arg, true) }
    }

    unsafe fn arm(
        &mut self,
        ms: u32,
        callback: TimerFn,
        arg: *mut (),
        one_shot: bool,
    ) -> KernelResult<()> {
        if ms == 0 {
            return Err(KernelError::Param);
        }

        critical_section(|_cs| {
            let this = NonNull::from(&mut *self);
            let list = unsafe { kernel::timer_list() };

            // Re-arming an active timer moves it, never duplicates it.
            if self.active {
                list.remove(this);
            }

            self.period_ticks = ms_to_ticks(ms);
            self.next_expiry = kernel::KERNEL.tick_get().wrapping_add(self.period_ticks);
            self.callback = Some(callback);
            self.arg = arg;
            self.active = true;
            self.one_shot = one_shot;

            list.insert(this);
            Ok(())
        })
    }

    /// Disarm; stopping an inactive timer is a no-op.
    ///
    /// # Safety
    /// Same pinning requirement as `start`.
    pub unsafe fn stop(&mut self) -> KernelResult<()> {
        critical_section(|_cs| {
            if self.active {
                let this = NonNull::from(&mut *self);
                unsafe { kernel::timer_list() }.remove(this);
                self.active = false;
            }
            Ok(())
        })
    }
}

impl Default for RawTimer {
    fn default() -> Self {
        Self::new()
    }
}

// ============ Timer List ============

/// Singly-linked list of active timers, sorted ascending by expiry.
pub(crate) struct TimerList {
    head: Option<NonNull<RawTimer>>,
}

impl TimerList {
    pub(crate) const fn new() -> Self {
        TimerList { head: None }
    }

    /// Insert keeping ascending expiry order; equal expiries keep arrival
    /// order.
    fn insert(&mut self, timer: NonNull<RawTimer>) {
        let expiry = unsafe { timer.as_ref() }.next_expiry;

        let mut prev: Option<NonNull<RawTimer>> = None;
        let mut cur = self.head;
        while let Some(cur_ptr) = cur {
            let cur_ref = unsafe { cur_ptr.as_ref() };
            if tick_diff(cur_ref.next_expiry, expiry) > 0 {
                break;
            }
            prev = cur;
            cur = cur_ref.next;
        }

        let timer_ref = unsafe { &mut *timer.as_ptr() };
        timer_ref.next = cur;
        match prev {
            Some(p) => unsafe { (*p.as_ptr()).next = Some(timer) },
            None => self.head = Some(timer),
        }
    }

    fn remove(&mut self, timer: NonNull<RawTimer>) {
        let mut prev: Option<NonNull<RawTimer>> = None;
        let mut cur = self.head;
        while let Some(cur_ptr) = cur {
            if cur_ptr == timer {
                let next = unsafe { cur_ptr.as_ref() }.next;
                match prev {
                    Some(p) => unsafe { (*p.as_ptr()).next = next },
                    None => self.head = next,
                }
                unsafe { (*cur_ptr.as_ptr()).next = None };
                return;
            }
            prev = cur;
            cur = unsafe { cur_ptr.as_ref() }.next;
        }
    }

    /// Pop and run every timer due at `now`. Periodic timers re-arm
    /// relative to the current tick; a callback that stopped its own timer
    /// stays disarmed.
    fn process(&mut self, now: Tick) {
        while let Some(head) = self.head {
            let timer = unsafe { &mut *head.as_ptr() };
            if !tick_reached(now, timer.next_expiry) {
                break;
            }

            self.head = timer.next;
            timer.next = None;

            if let Some(cb) = timer.callback {
                cb(timer.arg);
            }

            if !timer.one_shot && timer.active {
                timer.next_expiry = now.wrapping_add(timer.period_ticks);
                self.insert(head);
            } else {
                timer.active = false;
            }
        }
    }
}

unsafe impl Send for TimerList {}
unsafe impl Sync for TimerList {}

/// Tick-handler hook; interrupts are already masked.
pub(crate) unsafe fn process_expired(now: Tick) {
    unsafe { kernel::timer_list() }.process(now);
}

// ============ Safe Wrapper ============

/// Statically-allocatable timer handle.
pub struct Timer {
    inner: UnsafeCell<RawTimer>,
}

unsafe impl Send for Timer {}
unsafe impl Sync for Timer {}

impl Timer {
    pub const fn new() -> Self {
        Timer {
            inner: UnsafeCell::new(RawTimer::new()),
        }
    }

    /// Reset to the disarmed state. Fails with `State` while the timer is
    /// linked into the timer list.
    pub fn init(&'static self) -> KernelResult<()> {
        critical_section(|_cs| {
            let raw = unsafe { &mut *self.inner.get() };
            if raw.active {
                return Err(KernelError::State);
            }
            raw.init();
            Ok(())
        })
    }

    /// Start firing `callback(arg)` every `period_ms` milliseconds.
    pub fn start(&'static self, period_ms: u32, callback: TimerFn, arg: *mut ()) -> KernelResult<()> {
        unsafe { (*self.inner.get()).start(period_ms, callback, arg) }
    }

    /// Fire `callback(arg)` once after `delay_ms` milliseconds.
    pub fn start_once(
        &'static self,
        delay_ms: u32,
        callback: TimerFn,
        arg: *mut (),
    ) -> KernelResult<()> {
        unsafe { (*self.inner.get()).start_once(delay_ms, callback, arg) }
    }

    pub fn stop(&'static self) -> KernelResult<()> {
        unsafe { (*self.inner.get()).stop() }
    }

    pub fn is_active(&self) -> bool {
        unsafe { (*self.inner.get()).is_active() }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn armed(expiry: Tick, period: Tick, one_shot: bool, cb: TimerFn, arg: *mut ()) -> RawTimer {
        let mut t = RawTimer::new();
        t.next_expiry = expiry;
        t.period_ticks = period;
        t.one_shot = one_shot;
        t.callback = Some(cb);
        t.arg = arg;
        t.active = true;
        t
    }

    fn bump(arg: *mut ()) {
        let counter = unsafe { &*(arg as *const AtomicU32) };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[test]
    fn sorted_by_expiry() {
        let calls = AtomicU32::new(0);
        let arg = &calls as *const _ as *mut ();

        let mut a = armed(30, 30, true, bump, arg);
        let mut b = armed(10, 10, true, bump, arg);
        let mut c = armed(20, 20, true, bump, arg);

        let mut list = TimerList::new();
        list.insert(NonNull::from(&mut a));
        list.insert(NonNull::from(&mut b));
        list.insert(NonNull::from(&mut c));

        let head = list.head.unwrap();
        assert_eq!(unsafe { head.as_ref() }.next_expiry, 10);
    }

    #[test]
    fn one_shot_fires_once_and_deactivates() {
        let calls = AtomicU32::new(0);
        let arg = &calls as *const _ as *mut ();
        let mut t = armed(5, 5, true, bump, arg);

        let mut list = TimerList::new();
        list.insert(NonNull::from(&mut t));

        list.process(4);
        assert_eq!(calls.load(Ordering::Relaxed), 0);
        assert!(t.active);

        list.process(5);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert!(!t.active);
        assert!(list.head.is_none());

        list.process(10);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn periodic_rearms_from_current_tick() {
        let calls = AtomicU32::new(0);
        let arg = &calls as *const _ as *mut ();
        let mut t = armed(5, 5, false, bump, arg);

        let mut list = TimerList::new();
        list.insert(NonNull::from(&mut t));

        list.process(5);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert!(t.active);
        assert_eq!(t.next_expiry, 10);

        // A late tick slides the next expiry; the period is not caught up.
        list.process(12);
        assert_eq!(calls.load(Ordering::Relaxed), 2);
        assert_eq!(t.next_expiry, 17);
    }

    #[test]
    fn remove_unlinks_anywhere() {
        let calls = AtomicU32::new(0);
        let arg = &calls as *const _ as *mut ();

        let mut a = armed(10, 10, true, bump, arg);
        let mut b = armed(20, 20, true, bump, arg);
        let mut c = armed(30, 30, true, bump, arg);
        let (pa, pb, pc) = (
            NonNull::from(&mut a),
            NonNull::from(&mut b),
            NonNull::from(&mut c),
        );

        let mut list = TimerList::new();
        list.insert(pa);
        list.insert(pb);
        list.insert(pc);

        list.remove(pb);
        assert_eq!(list.head, Some(pa));
        assert_eq!(unsafe { pa.as_ref() }.next, Some(pc));

        list.remove(pa);
        assert_eq!(list.head, Some(pc));

        // Removing a timer that is no longer linked changes nothing.
        list.remove(pa);
        assert_eq!(list.head, Some(pc));
    }

    #[test]
    fn expiry_ordering_across_wrap() {
        let calls = AtomicU32::new(0);
        let arg = &calls as *const _ as *mut ();

        let now = 0xFFFF_FFF8u32;
        let mut late = armed(now.wrapping_add(40), 40, true, bump, arg);
        let mut soon = armed(now.wrapping_add(4), 4, true, bump, arg);

        let mut list = TimerList::new();
        list.insert(NonNull::from(&mut late));
        list.insert(NonNull::from(&mut soon));

        assert_eq!(list.head.unwrap(), NonNull::from(&mut soon));

        list.process(now.wrapping_add(4));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert!(late.active);
    }
}
