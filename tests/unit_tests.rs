//! Host-side tests of the kernel's algorithmic surface.
//!
//! Everything here runs without a scheduler: non-blocking paths, the
//! priority bitmap, tick arithmetic, and configuration sanity. Behavior
//! that needs a real context switch lives in the target demos.

mod prio_tests {
    use picortos::config::CFG_PRIO_MAX;
    use picortos::prio::PrioTable;
    use picortos::types::Prio;

    #[test]
    fn empty_table_has_no_highest() {
        let table = PrioTable::new();
        assert!(table.is_empty());
        assert_eq!(table.highest(), None);
    }

    #[test]
    fn single_priority() {
        let mut table = PrioTable::new();

        table.insert(5);
        assert!(!table.is_empty());
        assert!(table.is_set(5));
        assert!(!table.is_set(4));
        assert_eq!(table.highest(), Some(5));

        table.remove(5);
        assert!(table.is_empty());
    }

    #[test]
    fn lowest_number_wins() {
        let mut table = PrioTable::new();

        table.insert(6);
        table.insert(1);
        table.insert(3);

        assert_eq!(table.highest(), Some(1));
        table.remove(1);
        assert_eq!(table.highest(), Some(3));
        table.remove(3);
        assert_eq!(table.highest(), Some(6));
    }

    #[test]
    fn full_range_round_trip() {
        let mut table = PrioTable::new();

        for p in 0..CFG_PRIO_MAX {
            table.insert(p as Prio);
        }
        for p in 0..CFG_PRIO_MAX {
            assert_eq!(table.highest(), Some(p as Prio));
            table.remove(p as Prio);
        }
        assert!(table.is_empty());
    }
}

mod tick_tests {
    use picortos::types::{tick_diff, tick_reached};

    #[test]
    fn due_comparison_is_inclusive() {
        assert!(tick_reached(10, 10));
        assert!(tick_reached(11, 10));
        assert!(!tick_reached(9, 10));
    }

    #[test]
    fn delay_across_wrap_is_exact() {
        // A task delayed 100 ticks just before the counter wraps wakes
        // exactly 100 ticks later, not after a full counter cycle.
        let start = 0xFFFF_FFF0u32;
        let wake = start.wrapping_add(100);

        for elapsed in 0..100u32 {
            assert!(!tick_reached(start.wrapping_add(elapsed), wake));
        }
        assert!(tick_reached(start.wrapping_add(100), wake));
        assert_eq!(tick_diff(wake, start), 100);
    }
}

mod error_tests {
    use picortos::error::KernelError;

    #[test]
    fn distinct_and_comparable() {
        assert_eq!(KernelError::Timeout, KernelError::Timeout);
        assert_ne!(KernelError::Timeout, KernelError::Resource);
        assert_ne!(KernelError::Param, KernelError::State);
    }

    #[test]
    fn formattable_for_debugging() {
        let err = KernelError::Isr;
        let _ = format!("{:?}", err);
    }
}

mod config_tests {
    use picortos::config::*;

    #[test]
    fn limits_are_sane() {
        assert!(CFG_PRIO_MAX >= 4, "need room for idle plus app tasks");
        assert!(CFG_PRIO_MAX <= 32, "bitmap is a single word");
        assert_eq!(CFG_PRIO_IDLE as usize, CFG_PRIO_MAX - 1);

        assert!(CFG_STK_SIZE_MIN >= 32);
        assert!(CFG_TICK_RATE_HZ >= 10);
        assert!(CFG_TICK_RATE_HZ <= 10_000);
    }

    #[test]
    fn timeout_encoding() {
        assert_eq!(NO_WAIT, 0);
        assert_eq!(WAIT_FOREVER, u32::MAX);
    }
}

mod sem_tests {
    use picortos::config::NO_WAIT;
    use picortos::error::KernelError;
    use picortos::sem::RawSem;

    #[test]
    fn wait_after_post_succeeds_without_blocking() {
        let mut sem = RawSem::new(0);

        sem.post().unwrap();
        assert_eq!(sem.count(), 1);
        assert_eq!(sem.wait(NO_WAIT), Ok(()));
        assert_eq!(sem.count(), 0);
    }

    #[test]
    fn try_on_empty_reports_busy() {
        let mut sem = RawSem::new(0);
        assert_eq!(sem.try_wait(), Err(KernelError::Resource));
    }

    #[test]
    fn double_post_saturates_at_one() {
        let mut sem = RawSem::new(0);

        sem.post().unwrap();
        sem.post().unwrap();
        assert_eq!(sem.count(), 1);

        assert_eq!(sem.wait(NO_WAIT), Ok(()));
        assert_eq!(sem.wait(NO_WAIT), Err(KernelError::Resource));
    }

    #[test]
    fn initial_count_is_binary() {
        let sem = RawSem::new(7);
        assert_eq!(sem.count(), 1);
    }
}

mod queue_tests {
    use picortos::config::NO_WAIT;
    use picortos::error::KernelError;
    use picortos::queue::Queue;

    fn leaked_storage(len: usize) -> &'static mut [u8] {
        Box::leak(vec![0u8; len].into_boxed_slice())
    }

    #[test]
    fn round_trip_through_wrapper() {
        let q = Queue::new();
        q.init(leaked_storage(8), 4, 2).unwrap();

        let sent = 0xDEAD_BEEFu32.to_le_bytes();
        q.send(&sent, NO_WAIT).unwrap();
        assert_eq!(q.count(), 1);

        let mut out = [0u8; 4];
        q.recv(&mut out, NO_WAIT).unwrap();
        assert_eq!(out, sent);
        assert!(q.is_empty());
    }

    #[test]
    fn wrong_message_length_is_rejected() {
        let q = Queue::new();
        q.init(leaked_storage(8), 4, 2).unwrap();

        assert_eq!(q.send(&[0u8; 3], NO_WAIT), Err(KernelError::Param));
        let mut short = [0u8; 5];
        assert_eq!(q.recv(&mut short, NO_WAIT), Err(KernelError::Param));
    }

    #[test]
    fn undersized_storage_is_rejected() {
        let q = Queue::new();
        assert_eq!(q.init(leaked_storage(7), 4, 2), Err(KernelError::NoMem));
    }

    #[test]
    fn full_and_empty_edges() {
        let q = Queue::new();
        q.init(leaked_storage(4), 4, 1).unwrap();

        let msg = [1u8, 2, 3, 4];
        q.send(&msg, NO_WAIT).unwrap();
        assert!(q.is_full());
        assert_eq!(q.send(&msg, NO_WAIT), Err(KernelError::Resource));

        let mut out = [0u8; 4];
        q.recv(&mut out, NO_WAIT).unwrap();
        assert!(q.is_empty());
        assert_eq!(q.recv(&mut out, NO_WAIT), Err(KernelError::Resource));
    }
}

mod mutex_tests {
    use picortos::mutex::Mutex;

    #[test]
    fn starts_unlocked() {
        let mtx = Mutex::new();
        assert!(!mtx.is_locked());
    }
}

mod task_tests {
    use picortos::task::{self, Tcb, STACK_MARKER};
    use picortos::types::StkElement;

    #[test]
    fn watermark_reports_untouched_stack() {
        let mut stack = [STACK_MARKER; 64];
        let mut tcb = Tcb::new();
        tcb.stk_base = stack.as_mut_ptr();
        tcb.stk_size = stack.len();

        assert_eq!(
            task::stack_unused(&tcb),
            64 * core::mem::size_of::<StkElement>()
        );
        assert!(!task::stack_overflow(&tcb));
    }

    #[test]
    fn clobbered_base_reports_overflow() {
        let mut stack = [STACK_MARKER; 64];
        stack[0] = 0;

        let mut tcb = Tcb::new();
        tcb.stk_base = stack.as_mut_ptr();
        tcb.stk_size = stack.len();

        assert!(task::stack_overflow(&tcb));
        assert_eq!(task::stack_unused(&tcb), 0);
    }
}
