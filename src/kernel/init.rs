/// Kernel initialization phases
use spin::Mutex;

use crate::kernel::status::{get_all_statuses, BootError, BootTracker, BOOT_PHASES, BOOT_STATUS};
use crate::{interrupts, memory, println};

/// Setup routine for one boot phase.
pub type PhaseFn = fn() -> Result<(), &'static str>;

const PHASES: [PhaseFn; BOOT_PHASES] = [
    interrupts::install_descriptor_table,
    interrupts::install_interrupts,
    interrupts::install_timer,
    init_heap,
];

/// Bring the platform up: descriptor tables, interrupts, timer, heap.
/// Stops at the first failing phase. Only the first call does anything.
pub fn init_kernel() -> Result<(), BootError> {
    println!("╔════════════════════════════════════════╗");
    println!("║       NOVA Kernel Initialization       ║");
    println!("╚════════════════════════════════════════╝\n");

    run_phases(&BOOT_STATUS, &PHASES)?;

    for component in get_all_statuses() {
        println!("  {:<18} {}", component.name, component.status);
    }
    println!("\n✅ Kernel initialization complete!\n");
    Ok(())
}

pub(crate) fn run_phases<const N: usize>(
    tracker: &Mutex<BootTracker<N>>,
    phases: &[PhaseFn; N],
) -> Result<(), BootError> {
    for (index, phase) in phases.iter().enumerate() {
        init_phase(tracker, index, *phase)?;
    }
    Ok(())
}

fn init_phase<const N: usize>(
    tracker: &Mutex<BootTracker<N>>,
    index: usize,
    init_fn: PhaseFn,
) -> Result<(), BootError> {
    let name = {
        let mut tracker = tracker.lock();
        tracker.begin(index)?;
        tracker.name(index).unwrap_or("?")
    };
    println!("[{}/{}] Initializing {}...", index + 1, N, name);

    // The tracker lock is not held while the phase runs.
    let result = init_fn();
    match result {
        Ok(()) => println!("    ✓ {} initialized successfully\n", name),
        Err(e) => println!("    ✗ {} failed: {}\n", name, e),
    }
    tracker.lock().finish(index, result)
}

fn init_heap() -> Result<(), &'static str> {
    memory::init_heap();
    memory::HEAP
        .lock()
        .check_integrity()
        .map_err(|_| "heap failed its integrity check")
}
