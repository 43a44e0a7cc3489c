//! Compile-time kernel configuration.
//!
//! These constants set the resource limits and timing of the kernel.

use crate::types::Prio;

/// Number of priority levels; valid priorities are `0..CFG_PRIO_MAX`,
/// 0 being the most urgent.
pub const CFG_PRIO_MAX: usize = 8;

/// Priority of the idle task, always the lowest level.
pub const CFG_PRIO_IDLE: Prio = (CFG_PRIO_MAX - 1) as Prio;

/// System tick rate in Hz.
pub const CFG_TICK_RATE_HZ: u32 = 1_000;

/// Core clock feeding SysTick.
pub const CFG_CPU_CLOCK_HZ: u32 = 16_000_000;

/// Minimum task stack size in words.
pub const CFG_STK_SIZE_MIN: usize = 32;

/// Idle task stack size in words.
pub const CFG_IDLE_STK_SIZE: usize = 128;

/// Timeout value meaning "do not block".
pub const NO_WAIT: u32 = 0;

/// Timeout value meaning "wait forever".
pub const WAIT_FOREVER: u32 = 0xFFFF_FFFF;
