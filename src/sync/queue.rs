//! Bounded message queue.
//!
//! Fixed-size messages in a caller-provided ring buffer, copied byte-wise
//! in and out. Producers blocked on a full queue and consumers blocked on
//! an empty one wait on separate lists; each side wakes the other's most
//! urgent waiter after changing the fill level.

use core::cell::UnsafeCell;

use crate::config::NO_WAIT;
use crate::critical::{critical_section, is_isr_context, CriticalSection};
use crate::error::{KernelError, KernelResult};
use crate::kernel;
use crate::sched;
use crate::sync::pend_list::PendList;
use crate::sync::{block_current, finish_wait, wake_one, yield_to_woken};
use crate::types::WaitOn;

/// Raw queue state.
pub struct RawQueue {
    buffer: *mut u8,
    msg_size: usize,
    capacity: usize,
    head: usize,
    tail: usize,
    count: usize,
    send_wait: PendList,
    recv_wait: PendList,
}

impl RawQueue {
    pub const fn new() -> Self {
        RawQueue {
            buffer: core::ptr::null_mut(),
            msg_size: 0,
            capacity: 0,
            head: 0,
            tail: 0,
            count: 0,
            send_wait: PendList::new(),
            recv_wait: PendList::new(),
        }
    }

    /// Bind the queue to its storage.
    ///
    /// `buffer` must stay valid for the queue's lifetime and hold at least
    /// `msg_size * capacity` bytes; message size and capacity are fixed
    /// from here on.
    pub fn init(
        &mut self,
        buffer: *mut u8,
        buffer_len: usize,
        msg_size: usize,
        capacity: usize,
    ) -> KernelResult<()> {
        if buffer.is_null() || msg_size == 0 || capacity == 0 {
            return Err(KernelError::Param);
        }
        if buffer_len < msg_size * capacity {
            return Err(KernelError::NoMem);
        }

        self.buffer = buffer;
        self.msg_size = msg_size;
        self.capacity = capacity;
        self.head = 0;
        self.tail = 0;
        self.count = 0;
        self.send_wait = PendList::new();
        self.recv_wait = PendList::new();

        Ok(())
    }

    #[inline]
    pub fn msg_size(&self) -> usize {
        self.msg_size
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.count >= self.capacity
    }

    unsafe fn copy_in(&mut self, msg: *const u8) {
        unsafe {
            core::ptr::copy_nonoverlapping(
                msg,
                self.buffer.add(self.head * self.msg_size),
                self.msg_size,
            );
        }
        self.head = (self.head + 1) % self.capacity;
        self.count += 1;
    }

    unsafe fn copy_out(&mut self, msg: *mut u8) {
        unsafe {
            core::ptr::copy_nonoverlapping(
                self.buffer.add(self.tail * self.msg_size),
                msg,
                self.msg_size,
            );
        }
        self.tail = (self.tail + 1) % self.capacity;
        self.count -= 1;
    }

    /// Enqueue one message, waiting up to `timeout_ms` for space.
    ///
    /// # Safety
    /// `msg` must be valid for reads of `msg_size` bytes.
    pub unsafe fn send(&mut self, msg: *const u8, timeout_ms: u32) -> KernelResult<()> {
        if msg.is_null() || self.buffer.is_null() {
            return Err(KernelError::Param);
        }
        if is_isr_context() && timeout_ms != NO_WAIT {
            return Err(KernelError::Isr);
        }

        let cs = CriticalSection::enter();

        if self.count < self.capacity {
            unsafe { self.copy_in(msg) };

            if let Some(woken) = unsafe { wake_one(&mut self.recv_wait) } {
                drop(cs);
                if !is_isr_context() {
                    yield_to_woken(woken);
                }
            }
            return Ok(());
        }

        if timeout_ms == NO_WAIT {
            return Err(KernelError::Resource);
        }
        if !kernel::KERNEL.is_running() || kernel::KERNEL.sched_lock_nesting() != 0 {
            return Err(KernelError::State);
        }

        let obj = self as *const _ as *const ();
        unsafe { block_current(&mut self.send_wait, obj, WaitOn::Queue, timeout_ms) };

        drop(cs);
        sched::pend_switch_if_unlocked();

        let _cs = CriticalSection::enter();
        if !unsafe { finish_wait(&mut self.send_wait, obj) } {
            return Err(KernelError::Timeout);
        }

        // A receiver freed a slot for us; it may have been raced away by a
        // non-blocking sender in the meantime.
        if self.count < self.capacity {
            unsafe { self.copy_in(msg) };
            Ok(())
        } else {
            Err(KernelError::Resource)
        }
    }

    /// Dequeue one message, waiting up to `timeout_ms` for data.
    ///
    /// # Safety
    /// `msg` must be valid for writes of `msg_size` bytes.
    pub unsafe fn recv(&mut self, msg: *mut u8, timeout_ms: u32) -> KernelResult<()> {
        if msg.is_null() || self.buffer.is_null() {
            return Err(KernelError::Param);
        }
        if is_isr_context() && timeout_ms != NO_WAIT {
            return Err(KernelError::Isr);
        }

        let cs = CriticalSection::enter();

        if self.count > 0 {
            unsafe { self.copy_out(msg) };

            if let Some(woken) = unsafe { wake_one(&mut self.send_wait) } {
                drop(cs);
                if !is_isr_context() {
                    yield_to_woken(woken);
                }
            }
            return Ok(());
        }

        if timeout_ms == NO_WAIT {
            return Err(KernelError::Resource);
        }
        if !kernel::KERNEL.is_running() || kernel::KERNEL.sched_lock_nesting() != 0 {
            return Err(KernelError::State);
        }

        let obj = self as *const _ as *const ();
        unsafe { block_current(&mut self.recv_wait, obj, WaitOn::Queue, timeout_ms) };

        drop(cs);
        sched::pend_switch_if_unlocked();

        let _cs = CriticalSection::enter();
        if !unsafe { finish_wait(&mut self.recv_wait, obj) } {
            return Err(KernelError::Timeout);
        }

        if self.count > 0 {
            unsafe { self.copy_out(msg) };
            Ok(())
        } else {
            Err(KernelError::Resource)
        }
    }
}

impl Default for RawQueue {
    fn default() -> Self {
        Self::new()
    }
}

// ============ Safe Wrapper ============

/// Interior-mutable queue sharable between tasks and ISRs.
pub struct Queue {
    inner: UnsafeCell<RawQueue>,
}

unsafe impl Send for Queue {}
unsafe impl Sync for Queue {}

impl Queue {
    pub const fn new() -> Self {
        Queue {
            inner: UnsafeCell::new(RawQueue::new()),
        }
    }

    /// Bind the queue to its storage; see [`RawQueue::init`].
    pub fn init(
        &self,
        buffer: &'static mut [u8],
        msg_size: usize,
        capacity: usize,
    ) -> KernelResult<()> {
        critical_section(|_cs| unsafe {
            (*self.inner.get()).init(buffer.as_mut_ptr(), buffer.len(), msg_size, capacity)
        })
    }

    /// Send one message; `msg` must be exactly `msg_size` bytes.
    pub fn send(&self, msg: &[u8], timeout_ms: u32) -> KernelResult<()> {
        let raw = unsafe { &mut *self.inner.get() };
        if msg.len() != raw.msg_size() {
            return Err(KernelError::Param);
        }
        unsafe { raw.send(msg.as_ptr(), timeout_ms) }
    }

    /// Receive one message into `msg`, which must be exactly `msg_size`
    /// bytes.
    pub fn recv(&self, msg: &mut [u8], timeout_ms: u32) -> KernelResult<()> {
        let raw = unsafe { &mut *self.inner.get() };
        if msg.len() != raw.msg_size() {
            return Err(KernelError::Param);
        }
        unsafe { raw.recv(msg.as_mut_ptr(), timeout_ms) }
    }

    pub fn count(&self) -> usize {
        unsafe { (*self.inner.get()).count() }
    }

    pub fn is_empty(&self) -> bool {
        unsafe { (*self.inner.get()).is_empty() }
    }

    pub fn is_full(&self) -> bool {
        unsafe { (*self.inner.get()).is_full() }
    }
}

impl Default for Queue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;

    fn queue_with_storage(msg_size: usize, capacity: usize) -> RawQueue {
        let storage = std::boxed::Box::leak(std::vec![0u8; msg_size * capacity].into_boxed_slice());
        let mut q = RawQueue::new();
        q.init(storage.as_mut_ptr(), storage.len(), msg_size, capacity)
            .unwrap();
        q
    }

    #[test]
    fn init_validates_arguments() {
        let mut q = RawQueue::new();
        let mut buf = [0u8; 8];

        assert_eq!(
            q.init(core::ptr::null_mut(), 8, 4, 2),
            Err(KernelError::Param)
        );
        assert_eq!(q.init(buf.as_mut_ptr(), 8, 0, 2), Err(KernelError::Param));
        assert_eq!(q.init(buf.as_mut_ptr(), 8, 4, 0), Err(KernelError::Param));
        assert_eq!(q.init(buf.as_mut_ptr(), 8, 4, 4), Err(KernelError::NoMem));
        assert_eq!(q.init(buf.as_mut_ptr(), 8, 4, 2), Ok(()));
    }

    #[test]
    fn round_trips_bytes_in_order() {
        let mut q = queue_with_storage(4, 2);

        let first = 0x1111_1111u32.to_le_bytes();
        let second = 0x2222_2222u32.to_le_bytes();

        unsafe {
            q.send(first.as_ptr(), NO_WAIT).unwrap();
            q.send(second.as_ptr(), NO_WAIT).unwrap();
        }
        assert_eq!(q.count(), 2);
        assert!(q.is_full());

        let mut out = [0u8; 4];
        unsafe { q.recv(out.as_mut_ptr(), NO_WAIT).unwrap() };
        assert_eq!(out, first);
        unsafe { q.recv(out.as_mut_ptr(), NO_WAIT).unwrap() };
        assert_eq!(out, second);
        assert!(q.is_empty());
    }

    #[test]
    fn non_blocking_send_on_full_fails_busy() {
        let mut q = queue_with_storage(4, 1);
        let msg = [0u8; 4];

        unsafe {
            q.send(msg.as_ptr(), NO_WAIT).unwrap();
            assert_eq!(q.send(msg.as_ptr(), NO_WAIT), Err(KernelError::Resource));
        }
    }

    #[test]
    fn non_blocking_recv_on_empty_fails_busy() {
        let mut q = queue_with_storage(4, 1);
        let mut out = [0u8; 4];

        unsafe {
            assert_eq!(
                q.recv(out.as_mut_ptr(), NO_WAIT),
                Err(KernelError::Resource)
            );
        }
    }

    #[test]
    fn ring_wraps_around_storage() {
        let mut q = queue_with_storage(2, 2);
        let mut out = [0u8; 2];

        // Push/pop enough to cycle the indices past the buffer end twice.
        for round in 0u8..5 {
            let a = [round, 1];
            let b = [round, 2];
            unsafe {
                q.send(a.as_ptr(), NO_WAIT).unwrap();
                q.send(b.as_ptr(), NO_WAIT).unwrap();
                q.recv(out.as_mut_ptr(), NO_WAIT).unwrap();
                assert_eq!(out, a);
                q.recv(out.as_mut_ptr(), NO_WAIT).unwrap();
                assert_eq!(out, b);
            }
        }
        assert!(q.is_empty());
    }
}
