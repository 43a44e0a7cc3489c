//! Cortex-M4 port: SysTick setup, the PendSV context switch, initial stack
//! frames, and the first-task launch.

use core::arch::naked_asm;

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;

use crate::kernel::CPU_STATE;
use crate::types::{StkElement, TaskFn};

/// Dedicated stack for exception handlers once the scheduler owns the CPU;
/// task stacks then only ever hold task frames.
#[no_mangle]
static mut INTERRUPT_STACK: [u64; 256] = [0; 256];

/// PendSV and SysTick run at the lowest exception priority so the switch
/// happens only after every other interrupt has retired.
const LOWEST_EXC_PRIO: u8 = 0xF0;

/// Words in the initial register image: R4-R11 plus the hardware frame.
const FRAME_WORDS: usize = 16;

/// xPSR with the Thumb bit set.
const XPSR_INIT: u32 = 0x0100_0000;

/// Configure SysTick to fire every `reload` core cycles.
pub fn systick_init(reload: u32) {
    let mut p = unsafe { cortex_m::Peripherals::steal() };

    p.SYST.set_reload(reload - 1);
    p.SYST.clear_current();
    p.SYST.set_clock_source(SystClkSource::Core);
    p.SYST.enable_interrupt();
    p.SYST.enable_counter();
}

/// Request a deferred context switch.
#[inline(always)]
pub fn pend_switch() {
    cortex_m::peripheral::SCB::set_pendsv();
}

/// Hand the CPU to the scheduler.
///
/// The first PendSV dispatches the highest-priority ready task through a
/// full exception return; the calling context is abandoned.
///
/// # Safety
/// The kernel must be initialized and marked running; call once.
pub unsafe fn start_scheduler() -> ! {
    unsafe {
        let mut scb = cortex_m::Peripherals::steal().SCB;
        scb.set_priority(SystemHandler::PendSV, LOWEST_EXC_PRIO);
        scb.set_priority(SystemHandler::SysTick, LOWEST_EXC_PRIO);

        let msp_top =
            &raw const INTERRUPT_STACK as u32 + core::mem::size_of::<[u64; 256]>() as u32;
        core::arch::asm!("msr msp, {}", in(reg) msp_top);
        core::arch::asm!("msr psp, {}", in(reg) 0u32);

        CPU_STATE.tcb_cur = core::ptr::null_mut();

        cortex_m::interrupt::enable();
        cortex_m::peripheral::SCB::set_pendsv();

        loop {
            cortex_m::asm::wfi();
        }
    }
}

/// Initial register image, laid out exactly as PendSV restores it: the
/// software-saved R4-R11 below the hardware frame the processor pops on
/// exception return.
#[repr(C)]
struct InitialFrame {
    r4: u32,
    r5: u32,
    r6: u32,
    r7: u32,
    r8: u32,
    r9: u32,
    r10: u32,
    r11: u32,
    r0: u32,
    r1: u32,
    r2: u32,
    r3: u32,
    r12: u32,
    lr: u32,
    pc: u32,
    xpsr: u32,
}

/// Compose the initial frame at the top of a task stack so the first
/// dispatch returns into `entry(arg)` with interrupts enabled. LR points at
/// the exit trap in case the entry function ever returns.
///
/// # Safety
/// `stk_base..stk_base+stk_size` must be valid, writable, and owned by the
/// task being created.
pub unsafe fn init_task_stack(
    entry: TaskFn,
    arg: *mut (),
    stk_base: *mut StkElement,
    stk_size: usize,
) -> *mut StkElement {
    let trap: fn() -> ! = task_exit_trap;

    unsafe {
        let stk_top = stk_base.add(stk_size);
        // AAPCS: the stack is 8-byte aligned at function entry.
        let aligned = ((stk_top as usize) & !7) as *mut StkElement;

        let frame = aligned.sub(FRAME_WORDS) as *mut InitialFrame;
        frame.write(InitialFrame {
            r4: 0x0404_0404,
            r5: 0x0505_0505,
            r6: 0x0606_0606,
            r7: 0x0707_0707,
            r8: 0x0808_0808,
            r9: 0x0909_0909,
            r10: 0x1010_1010,
            r11: 0x1111_1111,
            r0: arg as u32,
            r1: 0,
            r2: 0,
            r3: 0,
            r12: 0,
            lr: trap as usize as u32,
            pc: (entry as usize as u32) | 1,
            xpsr: XPSR_INIT,
        });

        frame as *mut StkElement
    }
}

/// Landing pad for a task whose entry function returns. The offender is
/// suspended and the core parks so the rest of the system keeps running.
fn task_exit_trap() -> ! {
    crate::error!("task returned from its entry function");
    let _ = crate::task::suspend(None);
    loop {
        cortex_m::asm::wfi();
    }
}

/// Save the outgoing stack pointer and pick the next task.
///
/// Called from PendSV with interrupts masked. Returns the incoming task's
/// saved stack pointer, or null to resume the interrupted context
/// unchanged.
#[inline(never)]
#[no_mangle]
unsafe extern "C" fn pendsv_switch_context(cur_sp: *mut StkElement) -> *mut StkElement {
    unsafe {
        if !CPU_STATE.tcb_cur.is_null() {
            (*CPU_STATE.tcb_cur).stk_ptr = cur_sp;
        }
        crate::sched::switch_context()
    }
}

/// Context-switch exception.
///
/// 1. Save R4-R11 onto the outgoing task's process stack (skipped on the
///    first switch, when no task owns the CPU yet).
/// 2. Select the next task with interrupts masked.
/// 3. Restore its R4-R11 and exception-return into it; the processor pops
///    the hardware frame.
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "cpsid i",
        "ldr r1, ={cpu_state}",
        "ldr r1, [r1]",
        "mrs r0, psp",
        "cbz r1, 1f",
        "stmdb r0!, {{r4-r11}}",
        "1:",
        "bl {switch}",
        "cbz r0, 2f",
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",
        "2:",
        "dsb",
        "isb",
        "cpsie i",
        "ldr lr, =0xFFFFFFFD",
        "bx lr",
        cpu_state = sym CPU_STATE,
        switch = sym pendsv_switch_context,
    );
}
