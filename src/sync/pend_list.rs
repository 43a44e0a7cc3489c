//! Per-object wait list, sorted by current priority.
//!
//! Blocked tasks are linked through their dedicated wait-link pair, so a
//! task can sit here and on the delay list at the same time. The head is
//! always the most urgent waiter; equal priorities keep arrival order.

use core::ptr::NonNull;

use crate::task::Tcb;

#[derive(Debug)]
pub struct PendList {
    head: Option<NonNull<Tcb>>,
    tail: Option<NonNull<Tcb>>,
}

impl PendList {
    pub const fn new() -> Self {
        PendList {
            head: None,
            tail: None,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    #[inline]
    pub fn head(&self) -> Option<NonNull<Tcb>> {
        self.head
    }

    /// Insert in priority order; a task goes after every waiter at the same
    /// priority so ties resolve FIFO.
    pub fn insert_by_prio(&mut self, tcb: NonNull<Tcb>) {
        let prio = unsafe { tcb.as_ref() }.prio;

        let mut prev: Option<NonNull<Tcb>> = None;
        let mut current = self.head;
        while let Some(cur_ptr) = current {
            let cur_ref = unsafe { cur_ptr.as_ref() };
            if prio < cur_ref.prio {
                break;
            }
            prev = current;
            current = cur_ref.pend_next;
        }

        let tcb_ref = unsafe { &mut *tcb.as_ptr() };
        tcb_ref.pend_prev = prev;
        tcb_ref.pend_next = current;

        match prev {
            Some(p) => unsafe { (*p.as_ptr()).pend_next = Some(tcb) },
            None => self.head = Some(tcb),
        }
        match current {
            Some(c) => unsafe { (*c.as_ptr()).pend_prev = Some(tcb) },
            None => self.tail = Some(tcb),
        }
    }

    /// Unlink a TCB that is on this list.
    pub fn remove(&mut self, tcb: NonNull<Tcb>) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        match tcb_ref.pend_prev {
            Some(prev) => unsafe { (*prev.as_ptr()).pend_next = tcb_ref.pend_next },
            None => self.head = tcb_ref.pend_next,
        }
        match tcb_ref.pend_next {
            Some(next) => unsafe { (*next.as_ptr()).pend_prev = tcb_ref.pend_prev },
            None => self.tail = tcb_ref.pend_prev,
        }

        tcb_ref.pend_prev = None;
        tcb_ref.pend_next = None;
    }

    /// Detach and return the most urgent waiter.
    pub fn pop_head(&mut self) -> Option<NonNull<Tcb>> {
        let head = self.head?;
        self.remove(head);
        Some(head)
    }
}

impl Default for PendList {
    fn default() -> Self {
        Self::new()
    }
}

// Only touched inside critical sections.
unsafe impl Send for PendList {}
unsafe impl Sync for PendList {}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::types::Prio;

    fn waiter(prio: Prio) -> Tcb {
        let mut tcb = Tcb::new();
        tcb.prio = prio;
        tcb
    }

    fn prio_order(list: &PendList) -> std::vec::Vec<Prio> {
        let mut out = std::vec::Vec::new();
        let mut cur = list.head();
        while let Some(ptr) = cur {
            let tcb = unsafe { ptr.as_ref() };
            out.push(tcb.prio);
            cur = tcb.pend_next;
        }
        out
    }

    #[test]
    fn most_urgent_first() {
        let mut a = waiter(3);
        let mut b = waiter(1);
        let mut c = waiter(2);

        let mut list = PendList::new();
        list.insert_by_prio(NonNull::from(&mut a));
        list.insert_by_prio(NonNull::from(&mut b));
        list.insert_by_prio(NonNull::from(&mut c));

        assert_eq!(prio_order(&list), [1, 2, 3]);
    }

    #[test]
    fn equal_priority_is_fifo() {
        let mut a = waiter(2);
        let mut b = waiter(2);
        let mut c = waiter(2);
        let (pa, pb, pc) = (
            NonNull::from(&mut a),
            NonNull::from(&mut b),
            NonNull::from(&mut c),
        );

        let mut list = PendList::new();
        list.insert_by_prio(pa);
        list.insert_by_prio(pb);
        list.insert_by_prio(pc);

        assert_eq!(list.pop_head(), Some(pa));
        assert_eq!(list.pop_head(), Some(pb));
        assert_eq!(list.pop_head(), Some(pc));
        assert!(list.is_empty());
    }

    #[test]
    fn pop_returns_head_and_relinks() {
        let mut a = waiter(3);
        let mut b = waiter(1);
        let (pa, pb) = (NonNull::from(&mut a), NonNull::from(&mut b));

        let mut list = PendList::new();
        list.insert_by_prio(pa);
        list.insert_by_prio(pb);

        assert_eq!(list.pop_head(), Some(pb));
        assert_eq!(list.head(), Some(pa));
        assert_eq!(unsafe { pa.as_ref() }.pend_prev, None);
    }

    #[test]
    fn remove_from_middle() {
        let mut a = waiter(1);
        let mut b = waiter(2);
        let mut c = waiter(3);
        let pb = NonNull::from(&mut b);

        let mut list = PendList::new();
        list.insert_by_prio(NonNull::from(&mut a));
        list.insert_by_prio(pb);
        list.insert_by_prio(NonNull::from(&mut c));

        list.remove(pb);
        assert_eq!(prio_order(&list), [1, 3]);
    }
}
