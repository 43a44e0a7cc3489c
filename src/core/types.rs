//! Core type definitions shared across the kernel.

/// Task priority (0 = most urgent).
pub type Prio = u8;

/// Tick counter type. Free-running; all comparisons go through the
/// signed-difference helpers below so wraparound behaves.
pub type Tick = u32;

/// Stack element type.
pub type StkElement = u32;

/// Task entry point. Entry functions never return; a task that wants to
/// stop suspends itself.
pub type TaskFn = fn(*mut ()) -> !;

/// Task scheduling state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    /// Eligible to run, waiting in a ready FIFO
    Ready = 0,
    /// Owns the CPU; not on any list
    Running = 1,
    /// Waiting on a sync object, a delay, or a timeout
    Blocked = 2,
    /// Removed from scheduling until resumed
    Suspended = 3,
}

/// Kind of object a blocked task is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WaitOn {
    Nothing = 0,
    Sem = 1,
    Mutex = 2,
    Queue = 3,
}

/// `true` when tick `a` is at or after tick `b`, modulo wraparound.
#[inline]
pub fn tick_reached(a: Tick, b: Tick) -> bool {
    a.wrapping_sub(b) as i32 >= 0
}

/// Signed distance from `b` to `a` in ticks.
#[inline]
pub fn tick_diff(a: Tick, b: Tick) -> i32 {
    a.wrapping_sub(b) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_comparison_without_wrap() {
        assert!(tick_reached(100, 100));
        assert!(tick_reached(101, 100));
        assert!(!tick_reached(99, 100));
        assert_eq!(tick_diff(150, 100), 50);
        assert_eq!(tick_diff(100, 150), -50);
    }

    #[test]
    fn tick_comparison_across_wrap() {
        let before = 0xFFFF_FFF0u32;
        let after = before.wrapping_add(100);
        assert_eq!(after, 0x54);
        assert!(tick_reached(after, before));
        assert!(!tick_reached(before, after));
        assert_eq!(tick_diff(after, before), 100);
    }

    #[test]
    fn max_forward_distance() {
        // Deltas up to i32::MAX ticks order correctly.
        let base = 0x8000_0000u32;
        let wake = base.wrapping_add(0x7FFF_FFFF);
        assert!(!tick_reached(base, wake));
        assert!(tick_reached(wake, wake));
    }
}
