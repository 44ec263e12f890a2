//! # NOVA platform core
//!
//! Bare-metal platform layer of the NOVA kernel: descriptor tables,
//! interrupt dispatch, the PIT tick source, the PS/2 keyboard decoder and
//! the first-fit kernel heap.
//!
//! The library is compiled for the host during `cargo test` so the pure
//! parts (allocator, decoder, tick arithmetic, PIC masks) run under the
//! standard test harness. Hardware access goes through [`drivers::port::PortIo`]
//! and [`interrupts::pic::InterruptController`] and is substituted in tests.
//!
//! ## Boot order
//!
//! ```text
//! install_descriptor_table → install_interrupts → install_timer → init_heap
//! ```
//!
//! [`kernel::init_kernel`] runs the four phases in that order exactly once.

#![cfg_attr(not(test), no_std)]
#![feature(abi_x86_interrupt)]

use spin::Mutex;
use uart_16550::SerialPort;

/// COM1, the kernel's diagnostic console.
pub const SERIAL_PORT: u16 = 0x3F8;

pub static SERIAL: Mutex<SerialPort> = Mutex::new(unsafe { SerialPort::new(SERIAL_PORT) });

#[cfg(not(test))]
#[macro_export]
macro_rules! println {
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        let mut serial = $crate::SERIAL.lock();
        let _ = writeln!(serial, $($arg)*);
    }};
}

#[cfg(test)]
#[macro_export]
macro_rules! println {
    ($($arg:tt)*) => {{
        std::println!($($arg)*);
    }};
}

pub mod drivers;
pub mod framebuffer;
pub mod interrupts;
pub mod kernel;
pub mod memory;

pub use drivers::ps2_keyboard::{poll_key, read_key_blocking, Key};
pub use interrupts::timer::ticks;
pub use interrupts::{install_descriptor_table, install_interrupts, install_timer};
pub use memory::{allocate, free, heap_stats, init_heap, resize, zero_allocate, HeapPtr, HeapStats};

/// Bring up the serial console. Must run before the first `println!`.
pub fn init_serial() {
    SERIAL.lock().init();
}

/// Park the CPU forever with interrupts off.
pub fn halt_loop() -> ! {
    x86_64::instructions::interrupts::disable();
    loop {
        x86_64::instructions::hlt();
    }
}
