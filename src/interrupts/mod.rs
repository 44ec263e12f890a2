//! # Interrupt Handling Module
//!
//! - **GDT**: flat descriptor table with a TSS for the double-fault stack
//! - **IDT**: every CPU exception routed to the fatal banner path
//! - **PIC**: 8259 remap, masks and the IRQ callback table
//! - **Timer**: PIT channel 0 and the global tick counter
//!
//! ## Interrupt Vector Layout
//!
//! | Vector  | Type                 | Handler                         |
//! |---------|----------------------|---------------------------------|
//! | 0-31    | CPU Exceptions       | fault banner, then halt         |
//! | 32-47   | IRQ 0-15             | `pic::dispatch_irq`             |
//! | 48-255  | Unused               | inert                           |
//!
//! Only IRQ0 is unmasked; its callback advances [`timer::TICKS`].
//!
//! ## Usage
//!
//! ```ignore
//! interrupts::install_descriptor_table()?;
//! interrupts::install_interrupts()?; // enables interrupts
//! interrupts::install_timer()?;
//! ```

use core::sync::atomic::{AtomicBool, Ordering};

use crate::drivers::port::HardwarePorts;
use crate::println;

pub mod gdt;
#[allow(clippy::module_inception)]
pub mod interrupts;
pub mod pic;
pub mod timer;

use pic::{InterruptIndex, IrqMask, IRQ_HANDLERS, PICS};

static DESCRIPTORS_LOADED: AtomicBool = AtomicBool::new(false);
static INTERRUPTS_INSTALLED: AtomicBool = AtomicBool::new(false);
static TIMER_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Flip a one-shot latch. Fails if it was already set.
fn claim(latch: &AtomicBool, err: &'static str) -> Result<(), &'static str> {
    latch
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .map(|_| ())
        .map_err(|_| err)
}

/// Load the kernel GDT and TSS and reload the segment registers.
pub fn install_descriptor_table() -> Result<(), &'static str> {
    claim(&DESCRIPTORS_LOADED, "descriptor table already loaded")?;
    gdt::load();
    Ok(())
}

/// Load the IDT, remap the PICs with only the timer line open, hook the
/// tick callback on IRQ0 and enable interrupts.
pub fn install_interrupts() -> Result<(), &'static str> {
    if !DESCRIPTORS_LOADED.load(Ordering::Acquire) {
        return Err("descriptor table not loaded");
    }
    claim(&INTERRUPTS_INSTALLED, "interrupts already installed")?;

    x86_64::instructions::interrupts::without_interrupts(|| -> Result<(), &'static str> {
        interrupts::load_idt();
        IRQ_HANDLERS
            .lock()
            .register(InterruptIndex::Timer.line(), timer::on_tick)?;

        let mask = IrqMask::enabling(&[InterruptIndex::Timer.line()]);
        pic::remap(&mut *PICS.lock(), mask);
        println!("PIC remapped to {}..{}, {}", pic::PIC_1_OFFSET, pic::PIC_2_OFFSET + 7, mask);
        Ok(())
    })?;

    x86_64::instructions::interrupts::enable();
    Ok(())
}

/// Start the PIT at [`timer::TIMER_FREQUENCY_HZ`].
pub fn install_timer() -> Result<(), &'static str> {
    if !INTERRUPTS_INSTALLED.load(Ordering::Acquire) {
        return Err("interrupts not installed");
    }
    claim(&TIMER_INSTALLED, "timer already installed")?;

    let mut ports = unsafe { HardwarePorts::new() };
    let divisor = x86_64::instructions::interrupts::without_interrupts(|| {
        timer::program_pit(&mut ports, timer::TIMER_FREQUENCY_HZ)
    })
    .map_err(|_| "PIT cannot run at the configured frequency")?;

    println!("PIT: {} Hz (divisor {})", timer::TIMER_FREQUENCY_HZ, divisor);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latch_claims_once() {
        let latch = AtomicBool::new(false);
        assert_eq!(claim(&latch, "again"), Ok(()));
        assert_eq!(claim(&latch, "again"), Err("again"));
    }

    #[test]
    fn later_stages_refuse_to_run_early() {
        // Nothing in the test binary loads the descriptor table.
        assert_eq!(install_interrupts(), Err("descriptor table not loaded"));
        assert_eq!(install_timer(), Err("interrupts not installed"));
    }
}
