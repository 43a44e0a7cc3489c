//! Kernel status codes.
//!
//! All fallible entry points return [`KernelResult`]; the kernel never
//! panics or unwinds on behalf of the caller.

/// Kernel error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum KernelError {
    /// Null or invalid argument: priority out of range, stack too small,
    /// zero-sized message, zero capacity
    Param = -1,
    /// A blocking call gave up waiting
    Timeout = -2,
    /// Resource unavailable and the caller asked not to block
    Resource = -3,
    /// Operation invalid in the current state: unlock by a non-owner,
    /// resume of a task that is not suspended, blocking while the scheduler
    /// is locked or not running
    State = -4,
    /// Caller-provided storage is too small
    NoMem = -5,
    /// Blocking API invoked from interrupt context
    Isr = -6,
}

/// Result alias for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;
