//! Producer/consumer demo over a bounded message queue.
//!
//! The queue holds two 4-byte messages. The producer bursts three sends
//! with a 100 ms timeout while the consumer is still sleeping, so the third
//! send blocks until the consumer drains a slot.

#![no_std]
#![no_main]
#![allow(static_mut_refs)]

use cortex_m_rt::entry;
use defmt::info;

use picortos::sync::queue::Queue;
use picortos::task::Tcb;
use picortos::types::StkElement;
use picortos::{kernel, task, time};

const MSG_SIZE: usize = 4;
const CAPACITY: usize = 2;

static QUEUE: Queue = Queue::new();
static mut QUEUE_STORAGE: [u8; MSG_SIZE * CAPACITY] = [0; MSG_SIZE * CAPACITY];

static mut PRODUCER_TCB: Tcb = Tcb::new();
static mut PRODUCER_STK: [StkElement; 256] = [0; 256];
static mut CONSUMER_TCB: Tcb = Tcb::new();
static mut CONSUMER_STK: [StkElement; 256] = [0; 256];

fn producer_task(_arg: *mut ()) -> ! {
    let mut value = 0x1111_1111u32;

    loop {
        for _ in 0..3 {
            match QUEUE.send(&value.to_le_bytes(), 100) {
                Ok(()) => info!("[producer] sent {=u32:#x}", value),
                Err(_) => info!("[producer] send timed out"),
            }
            value = value.wrapping_add(0x1111_1111);
        }
        let _ = time::delay(500);
    }
}

fn consumer_task(_arg: *mut ()) -> ! {
    loop {
        let _ = time::delay(30);

        let mut msg = [0u8; MSG_SIZE];
        while QUEUE.recv(&mut msg, 200).is_ok() {
            info!("[consumer] got {=u32:#x}", u32::from_le_bytes(msg));
        }
    }
}

#[entry]
fn main() -> ! {
    info!("producer/consumer demo: queue of {} x {} bytes", CAPACITY, MSG_SIZE);

    kernel::init().expect("kernel init failed");
    QUEUE
        .init(unsafe { &mut QUEUE_STORAGE }, MSG_SIZE, CAPACITY)
        .unwrap();

    unsafe {
        task::create(
            &mut CONSUMER_TCB,
            &mut CONSUMER_STK,
            "consumer",
            consumer_task,
            1,
            core::ptr::null_mut(),
        )
        .unwrap();
        task::create(
            &mut PRODUCER_TCB,
            &mut PRODUCER_STK,
            "producer",
            producer_task,
            2,
            core::ptr::null_mut(),
        )
        .unwrap();
    }

    kernel::start().expect("kernel start failed");

    loop {
        cortex_m::asm::wfi();
    }
}
