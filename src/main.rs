#![no_std]
#![no_main]

extern crate alloc;
extern crate rlibc;

use alloc::format;
use bootloader_api::{entry_point, BootInfo};
use core::panic::PanicInfo;

use nova::drivers::keymap::DEFAULT_LAYOUT;
use nova::drivers::Key;
use nova::framebuffer::{init_framebuffer, write_at, Console, DEFAULT_ATTRIBUTE, FRAMEBUFFER};
use nova::interrupts::timer::TICKS;
use nova::kernel::{all_components_ready, init_kernel};
use nova::{halt_loop, heap_stats, memory, println, read_key_blocking};

entry_point!(kernel_main);

const PROMPT: &[u8] = b"> ";
/// Light green on black, for command output.
const REPORT_ATTRIBUTE: u8 = 0x0A;

pub fn kernel_main(boot_info: &'static mut BootInfo) -> ! {
    nova::init_serial();
    memory::log_memory_map(boot_info);

    if let Err(e) = init_kernel() {
        println!("Kernel initialization failed: {}", e);
        halt_loop();
    }
    println!("Keyboard layout: {}", DEFAULT_LAYOUT.name);

    if let Err(e) = init_framebuffer(boot_info) {
        println!("Display unavailable: {}", e);
    }

    let mut console = {
        let guard = FRAMEBUFFER.lock();
        match guard.as_ref() {
            Some(fb) => Console::new(fb.columns(), fb.rows()),
            None => Console::new(0, 0),
        }
    };

    let title = if all_components_ready() { 0x0B } else { 0x0C };
    with_screen(|fb| {
        let col = write_at(fb, 0, 0, b"NOVA", title);
        write_at(fb, col, 0, b" - F1 heap, F2 uptime", 0x07);
    });
    print(&mut console, b"\n");
    print(&mut console, PROMPT);

    loop {
        match read_key_blocking() {
            Key::F(1) => {
                let stats = heap_stats();
                println!("{}", stats);
                let line = format!("\nheap: {} / {} bytes used\n", stats.used, stats.total);
                report(&mut console, line.as_bytes());
            }
            Key::F(2) => {
                let line = format!(
                    "\nuptime: {} ms ({} ticks at {} Hz)\n",
                    TICKS.uptime_ms(),
                    TICKS.get(),
                    TICKS.frequency()
                );
                report(&mut console, line.as_bytes());
            }
            Key::Char(b'\n') => {
                print(&mut console, b"\n");
                print(&mut console, PROMPT);
            }
            Key::Char(byte) => print(&mut console, &[byte]),
            _ => {}
        }
    }
}

fn with_screen(f: impl FnOnce(&mut nova::framebuffer::FramebufferWriter)) {
    if let Some(fb) = FRAMEBUFFER.lock().as_mut() {
        f(fb);
    }
}

fn print(console: &mut Console, text: &[u8]) {
    with_screen(|fb| console.write_bytes(fb, text));
}

/// Print `text` in the report colour, then a fresh prompt.
fn report(console: &mut Console, text: &[u8]) {
    console.set_attribute(REPORT_ATTRIBUTE);
    print(console, text);
    console.set_attribute(DEFAULT_ATTRIBUTE);
    print(console, PROMPT);
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    let msg = info.message();
    let loc = info.location();
    println!("PANIC : {} | {:?}", msg, loc);

    halt_loop()
}
