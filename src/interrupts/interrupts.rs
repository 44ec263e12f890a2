use core::fmt::Write;
use spin::Lazy;
use x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame, PageFaultErrorCode};

use crate::framebuffer::{write_at, CellWriter, FRAMEBUFFER};
use crate::interrupts::gdt;
use crate::interrupts::pic::{self, vector_of, IRQ_HANDLERS, PICS};

pub const FAULT_BANNER: &[u8] = b"CPU EXCEPTION!";

/// White on red.
pub const FAULT_ATTRIBUTE: u8 = 0x4F;

/// Mnemonics for the architectural exception vectors.
pub const EXCEPTION_NAMES: [&str; 32] = [
    "Divide Error",
    "Debug",
    "Non-Maskable Interrupt",
    "Breakpoint",
    "Overflow",
    "Bound Range Exceeded",
    "Invalid Opcode",
    "Device Not Available",
    "Double Fault",
    "Coprocessor Segment Overrun",
    "Invalid TSS",
    "Segment Not Present",
    "Stack-Segment Fault",
    "General Protection Fault",
    "Page Fault",
    "Reserved",
    "x87 Floating-Point Exception",
    "Alignment Check",
    "Machine Check",
    "SIMD Floating-Point Exception",
    "Virtualization Exception",
    "Control Protection Exception",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Hypervisor Injection Exception",
    "VMM Communication Exception",
    "Security Exception",
    "Reserved",
];

pub fn exception_name(vector: u8) -> &'static str {
    EXCEPTION_NAMES
        .get(vector as usize)
        .copied()
        .unwrap_or("Unknown Exception")
}

/// Paint the fault banner on row 0 followed by the exception name.
pub fn draw_fault_banner<W: CellWriter + ?Sized>(writer: &mut W, name: &str) {
    let col = write_at(writer, 0, 0, FAULT_BANNER, FAULT_ATTRIBUTE);
    let col = write_at(writer, col, 0, b" ", FAULT_ATTRIBUTE);
    write_at(writer, col, 0, name.as_bytes(), FAULT_ATTRIBUTE);
}

/// Terminal path for every CPU exception.
///
/// Only `try_lock`s shared state: the fault may have hit while the
/// foreground held the framebuffer or the serial port.
fn fatal(vector: u8, frame: &InterruptStackFrame, error_code: Option<u64>) -> ! {
    let name = exception_name(vector);

    if let Some(mut guard) = FRAMEBUFFER.try_lock() {
        if let Some(fb) = guard.as_mut() {
            draw_fault_banner(fb, name);
        }
    }

    if let Some(mut serial) = crate::SERIAL.try_lock() {
        let _ = writeln!(serial, "EXCEPTION: {} (vector {})", name, vector);
        if let Some(code) = error_code {
            let _ = writeln!(serial, "Error Code: {:#x}", code);
        }
        let _ = writeln!(serial, "{:#?}", frame);
    }

    crate::halt_loop()
}

macro_rules! fatal_handlers {
    ($($handler:ident => $vector:expr),* $(,)?) => {$(
        extern "x86-interrupt" fn $handler(stack_frame: InterruptStackFrame) {
            fatal($vector, &stack_frame, None)
        }
    )*};
}

macro_rules! fatal_handlers_with_code {
    ($($handler:ident => $vector:expr),* $(,)?) => {$(
        extern "x86-interrupt" fn $handler(stack_frame: InterruptStackFrame, error_code: u64) {
            fatal($vector, &stack_frame, Some(error_code))
        }
    )*};
}

fatal_handlers! {
    divide_error_handler => 0,
    debug_handler => 1,
    nmi_handler => 2,
    breakpoint_handler => 3,
    overflow_handler => 4,
    bound_range_handler => 5,
    invalid_opcode_handler => 6,
    device_not_available_handler => 7,
    x87_floating_point_handler => 16,
    simd_floating_point_handler => 19,
    virtualization_handler => 20,
    hv_injection_handler => 28,
}

fatal_handlers_with_code! {
    invalid_tss_handler => 10,
    segment_not_present_handler => 11,
    stack_segment_fault_handler => 12,
    general_protection_fault_handler => 13,
    alignment_check_handler => 17,
    cp_protection_handler => 21,
    vmm_communication_handler => 29,
    security_exception_handler => 30,
}

extern "x86-interrupt" fn double_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) -> ! {
    fatal(8, &stack_frame, Some(error_code))
}

extern "x86-interrupt" fn machine_check_handler(stack_frame: InterruptStackFrame) -> ! {
    fatal(18, &stack_frame, None)
}

extern "x86-interrupt" fn page_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: PageFaultErrorCode,
) {
    use x86_64::registers::control::Cr2;

    if let Some(mut serial) = crate::SERIAL.try_lock() {
        let _ = writeln!(serial, "Accessed Address: {:?}", Cr2::read());
    }
    fatal(14, &stack_frame, Some(error_code.bits()))
}

// Hardware Interrupt Handlers

macro_rules! irq_stubs {
    ($($stub:ident => $line:expr),* $(,)?) => {
        $(
            extern "x86-interrupt" fn $stub(_stack_frame: InterruptStackFrame) {
                pic::dispatch_irq(&IRQ_HANDLERS, $line, &mut *PICS.lock());
            }
        )*

        const IRQ_STUBS: [extern "x86-interrupt" fn(InterruptStackFrame); pic::IRQ_LINES] =
            [$($stub),*];
    };
}

irq_stubs! {
    irq0 => 0, irq1 => 1, irq2 => 2, irq3 => 3,
    irq4 => 4, irq5 => 5, irq6 => 6, irq7 => 7,
    irq8 => 8, irq9 => 9, irq10 => 10, irq11 => 11,
    irq12 => 12, irq13 => 13, irq14 => 14, irq15 => 15,
}

extern "x86-interrupt" fn inert_handler(_stack_frame: InterruptStackFrame) {}

static IDT: Lazy<InterruptDescriptorTable> = Lazy::new(|| {
    let mut idt = InterruptDescriptorTable::new();

    // CPU EXCEPTIONS (0-31)
    idt.divide_error.set_handler_fn(divide_error_handler);
    idt.debug.set_handler_fn(debug_handler);
    idt.non_maskable_interrupt.set_handler_fn(nmi_handler);
    idt.breakpoint.set_handler_fn(breakpoint_handler);
    idt.overflow.set_handler_fn(overflow_handler);
    idt.bound_range_exceeded.set_handler_fn(bound_range_handler);
    idt.invalid_opcode.set_handler_fn(invalid_opcode_handler);
    idt.device_not_available.set_handler_fn(device_not_available_handler);
    idt.invalid_tss.set_handler_fn(invalid_tss_handler);
    idt.segment_not_present.set_handler_fn(segment_not_present_handler);
    idt.stack_segment_fault.set_handler_fn(stack_segment_fault_handler);
    idt.general_protection_fault.set_handler_fn(general_protection_fault_handler);
    idt.page_fault.set_handler_fn(page_fault_handler);
    idt.x87_floating_point.set_handler_fn(x87_floating_point_handler);
    idt.alignment_check.set_handler_fn(alignment_check_handler);
    idt.machine_check.set_handler_fn(machine_check_handler);
    idt.simd_floating_point.set_handler_fn(simd_floating_point_handler);
    idt.virtualization.set_handler_fn(virtualization_handler);
    idt.cp_protection_exception.set_handler_fn(cp_protection_handler);
    idt.hv_injection_exception.set_handler_fn(hv_injection_handler);
    idt.vmm_communication_exception.set_handler_fn(vmm_communication_handler);
    idt.security_exception.set_handler_fn(security_exception_handler);
    // Double fault needs its own stack to avoid cascading failures
    unsafe {
        idt.double_fault
            .set_handler_fn(double_fault_handler)
            .set_stack_index(gdt::DOUBLE_FAULT_IST_INDEX);
    }

    // HARDWARE INTERRUPTS (32-47 after remapping), then nothing up to 255
    for (line, stub) in IRQ_STUBS.iter().enumerate() {
        idt[vector_of(line as u8)].set_handler_fn(*stub);
    }
    for vector in (pic::PIC_2_OFFSET + 8)..=u8::MAX {
        idt[vector].set_handler_fn(inert_handler);
    }

    idt
});

pub(crate) fn load_idt() {
    IDT.load();
}
