//! Priority inversion demo: the classic low/mid/high scenario resolved by
//! priority inheritance.
//!
//! low(3) grabs the mutex and grinds; high(1) blocks on it, boosting low
//! past the compute-bound mid(2). Watch the "holding, prio" line: it reads
//! 1 while high is waiting and 3 otherwise.

#![no_std]
#![no_main]
#![allow(static_mut_refs)]

use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m_rt::entry;
use defmt::info;

use picortos::config::WAIT_FOREVER;
use picortos::sync::mutex::Mutex;
use picortos::task::Tcb;
use picortos::types::StkElement;
use picortos::{kernel, task, time};

static MTX: Mutex = Mutex::new();
static HIGH_ACQUIRED: AtomicU32 = AtomicU32::new(0);

static mut HIGH_TCB: Tcb = Tcb::new();
static mut HIGH_STK: [StkElement; 256] = [0; 256];
static mut MID_TCB: Tcb = Tcb::new();
static mut MID_STK: [StkElement; 256] = [0; 256];
static mut LOW_TCB: Tcb = Tcb::new();
static mut LOW_STK: [StkElement; 256] = [0; 256];

fn high_task(_arg: *mut ()) -> ! {
    // Let low grab the mutex first.
    let _ = time::delay(50);

    loop {
        let _ = MTX.lock(WAIT_FOREVER);
        let n = HIGH_ACQUIRED.fetch_add(1, Ordering::Relaxed) + 1;
        info!("[high] acquired #{}", n);
        let _ = MTX.unlock();
        let _ = time::delay(100);
    }
}

fn mid_task(_arg: *mut ()) -> ! {
    loop {
        for _ in 0..50_000 {
            cortex_m::asm::nop();
        }
        let _ = time::delay(10);
    }
}

fn low_task(_arg: *mut ()) -> ! {
    loop {
        let _ = MTX.lock(WAIT_FOREVER);
        for _ in 0..100_000 {
            cortex_m::asm::nop();
        }
        info!("[low] holding, prio {}", task::priority(unsafe { &LOW_TCB }));
        let _ = MTX.unlock();
        let _ = time::delay(200);
    }
}

#[entry]
fn main() -> ! {
    info!("priority inversion demo: high(1) mid(2) low(3)");

    kernel::init().expect("kernel init failed");
    MTX.init().unwrap();

    unsafe {
        task::create(&mut LOW_TCB, &mut LOW_STK, "low", low_task, 3, core::ptr::null_mut())
            .unwrap();
        task::create(&mut MID_TCB, &mut MID_STK, "mid", mid_task, 2, core::ptr::null_mut())
            .unwrap();
        task::create(&mut HIGH_TCB, &mut HIGH_STK, "high", high_task, 1, core::ptr::null_mut())
            .unwrap();
    }

    kernel::start().expect("kernel start failed");

    loop {
        cortex_m::asm::wfi();
    }
}
