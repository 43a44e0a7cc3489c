//! Per-priority ready FIFO.
//!
//! Doubly-linked list of TCBs eligible to run at one priority level. Tasks
//! enter at the tail and are dispatched from the head, so equal-priority
//! tasks run in arrival order.

use core::ptr::NonNull;

use crate::task::Tcb;

#[derive(Debug)]
pub struct ReadyList {
    head: Option<NonNull<Tcb>>,
    tail: Option<NonNull<Tcb>>,
}

impl ReadyList {
    pub const fn new() -> Self {
        ReadyList {
            head: None,
            tail: None,
        }
    }

    /// First task to be dispatched at this priority.
    #[inline]
    pub fn head(&self) -> Option<NonNull<Tcb>> {
        self.head
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Append a TCB at the tail.
    ///
    /// The TCB must not already be linked into a ready list.
    pub fn insert_tail(&mut self, tcb: NonNull<Tcb>) {
        // Exclusive access is guaranteed by the interrupt mask.
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        tcb_ref.next = None;
        tcb_ref.prev = self.tail;

        match self.tail {
            Some(tail) => {
                unsafe { (*tail.as_ptr()).next = Some(tcb) };
            }
            None => {
                self.head = Some(tcb);
            }
        }

        self.tail = Some(tcb);
    }

    /// Unlink a TCB that is on this list.
    pub fn remove(&mut self, tcb: NonNull<Tcb>) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        match tcb_ref.prev {
            Some(prev) => {
                unsafe { (*prev.as_ptr()).next = tcb_ref.next };
            }
            None => {
                self.head = tcb_ref.next;
            }
        }

        match tcb_ref.next {
            Some(next) => {
                unsafe { (*next.as_ptr()).prev = tcb_ref.prev };
            }
            None => {
                self.tail = tcb_ref.prev;
            }
        }

        tcb_ref.prev = None;
        tcb_ref.next = None;
    }
}

impl Default for ReadyList {
    fn default() -> Self {
        Self::new()
    }
}

// Only touched inside critical sections.
unsafe impl Send for ReadyList {}
unsafe impl Sync for ReadyList {}

impl Copy for ReadyList {}

impl Clone for ReadyList {
    fn clone(&self) -> Self {
        *self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(list: &ReadyList) -> std::vec::Vec<*mut Tcb> {
        let mut out = std::vec::Vec::new();
        let mut cur = list.head();
        while let Some(ptr) = cur {
            out.push(ptr.as_ptr());
            cur = unsafe { ptr.as_ref() }.next;
        }
        out
    }

    extern crate std;

    #[test]
    fn fifo_order() {
        let mut a = Tcb::new();
        let mut b = Tcb::new();
        let mut c = Tcb::new();
        let (pa, pb, pc) = (
            NonNull::from(&mut a),
            NonNull::from(&mut b),
            NonNull::from(&mut c),
        );

        let mut list = ReadyList::new();
        assert!(list.is_empty());

        list.insert_tail(pa);
        list.insert_tail(pb);
        list.insert_tail(pc);

        assert_eq!(collect(&list), [pa.as_ptr(), pb.as_ptr(), pc.as_ptr()]);
    }

    #[test]
    fn remove_middle_and_ends() {
        let mut a = Tcb::new();
        let mut b = Tcb::new();
        let mut c = Tcb::new();
        let (pa, pb, pc) = (
            NonNull::from(&mut a),
            NonNull::from(&mut b),
            NonNull::from(&mut c),
        );

        let mut list = ReadyList::new();
        list.insert_tail(pa);
        list.insert_tail(pb);
        list.insert_tail(pc);

        list.remove(pb);
        assert_eq!(collect(&list), [pa.as_ptr(), pc.as_ptr()]);

        list.remove(pa);
        assert_eq!(collect(&list), [pc.as_ptr()]);

        list.remove(pc);
        assert!(list.is_empty());
    }

    #[test]
    fn reinsert_after_remove() {
        let mut a = Tcb::new();
        let mut b = Tcb::new();
        let (pa, pb) = (NonNull::from(&mut a), NonNull::from(&mut b));

        let mut list = ReadyList::new();
        list.insert_tail(pa);
        list.insert_tail(pb);

        // Rotate: head moves to the tail.
        list.remove(pa);
        list.insert_tail(pa);

        assert_eq!(collect(&list), [pb.as_ptr(), pa.as_ptr()]);
    }
}
