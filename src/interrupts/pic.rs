//! # Programmable Interrupt Controller (8259 PIC)
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐
//! │   PIC 1     │     │   PIC 2     │
//! │  (Master)   │◀────│  (Slave)    │
//! │ IRQ 0-7     │ IRQ2│ IRQ 8-15    │
//! └─────────────┘     └─────────────┘
//!       │
//!       ▼
//!     CPU
//! ```
//!
//! Both chips are remapped off the CPU exception range:
//! - PIC 1: vectors 32-39 (IRQ 0-7)
//! - PIC 2: vectors 40-47 (IRQ 8-15)
//!
//! Hardware lines are dispatched through a static table of plain `fn()`
//! callbacks. [`dispatch_irq`] runs the registered callback, if any, and
//! then always acknowledges the controller.

use core::fmt;
use pic8259::ChainedPics;
use spin::Mutex;

pub const PIC_1_OFFSET: u8 = 32; // Primary PIC handles IRQs 0-7
pub const PIC_2_OFFSET: u8 = 40; // Secondary PIC handles IRQs 8-15

/// Number of hardware lines across both chips.
pub const IRQ_LINES: usize = 16;

/// Master line the slave chip is wired to.
pub const CASCADE_LINE: u8 = 2;

pub static PICS: Mutex<ChainedPics> =
    Mutex::new(unsafe { ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) });

// Interrupt indices - these are the actual vector numbers the CPU sees
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InterruptIndex {
    Timer = PIC_1_OFFSET,        // 32 - IRQ0
    Keyboard = PIC_1_OFFSET + 1, // 33 - IRQ1
}

impl InterruptIndex {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn as_usize(self) -> usize {
        usize::from(self.as_u8())
    }

    pub fn line(self) -> u8 {
        self.as_u8() - PIC_1_OFFSET
    }
}

/// Vector the CPU sees for a hardware line.
pub const fn vector_of(line: u8) -> u8 {
    if line < 8 {
        PIC_1_OFFSET + line
    } else {
        PIC_2_OFFSET + (line - 8)
    }
}

// ============================================================================
// CONTROLLER
// ============================================================================

/// The controller operations interrupt dispatch relies on.
pub trait InterruptController {
    /// Run the ICW1..ICW4 remap sequence.
    fn initialize(&mut self);
    fn write_masks(&mut self, mask: IrqMask);
    fn end_of_interrupt(&mut self, vector: u8);
}

impl InterruptController for ChainedPics {
    fn initialize(&mut self) {
        unsafe { ChainedPics::initialize(self) }
    }

    fn write_masks(&mut self, mask: IrqMask) {
        unsafe { ChainedPics::write_masks(self, mask.master, mask.slave) }
    }

    fn end_of_interrupt(&mut self, vector: u8) {
        unsafe { self.notify_end_of_interrupt(vector) }
    }
}

/// Remap both chips and apply `mask`.
pub fn remap<C: InterruptController>(controller: &mut C, mask: IrqMask) {
    controller.initialize();
    controller.write_masks(mask);
}

/// Mask bytes for the two chips. A set bit disables the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqMask {
    pub master: u8,
    pub slave: u8,
}

impl IrqMask {
    pub const ALL_MASKED: IrqMask = IrqMask {
        master: 0xFF,
        slave: 0xFF,
    };

    /// Masks with only `lines` enabled. Any slave line also opens the
    /// cascade, otherwise the slave's requests never reach the CPU.
    /// Lines above 15 are ignored.
    pub fn enabling(lines: &[u8]) -> IrqMask {
        lines
            .iter()
            .fold(IrqMask::ALL_MASKED, |mask, &line| mask.with_line(line))
    }

    pub fn with_line(self, line: u8) -> IrqMask {
        match line {
            0..=7 => IrqMask {
                master: self.master & !(1 << line),
                ..self
            },
            8..=15 => IrqMask {
                master: self.master & !(1 << CASCADE_LINE),
                slave: self.slave & !(1 << (line - 8)),
            },
            _ => self,
        }
    }

    pub fn is_enabled(&self, line: u8) -> bool {
        match line {
            0..=7 => self.master & (1 << line) == 0,
            8..=15 => self.slave & (1 << (line - 8)) == 0,
            _ => false,
        }
    }
}

impl fmt::Display for IrqMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "master={:#04x} slave={:#04x}", self.master, self.slave)
    }
}

// ============================================================================
// HANDLER TABLE
// ============================================================================

/// Callback for one hardware line. Takes and returns nothing, so it cannot
/// hand allocator state in or out of interrupt context.
pub type IrqHandler = fn();

pub struct IrqTable {
    handlers: [Option<IrqHandler>; IRQ_LINES],
}

impl IrqTable {
    pub const fn new() -> Self {
        Self {
            handlers: [None; IRQ_LINES],
        }
    }

    /// Install `handler` on `line`, replacing any previous one.
    pub fn register(&mut self, line: u8, handler: IrqHandler) -> Result<(), &'static str> {
        let slot = self
            .handlers
            .get_mut(line as usize)
            .ok_or("IRQ line out of range")?;
        *slot = Some(handler);
        Ok(())
    }

    pub fn unregister(&mut self, line: u8) {
        if let Some(slot) = self.handlers.get_mut(line as usize) {
            *slot = None;
        }
    }

    pub fn get(&self, line: u8) -> Option<IrqHandler> {
        self.handlers.get(line as usize).copied().flatten()
    }
}

impl Default for IrqTable {
    fn default() -> Self {
        Self::new()
    }
}

pub static IRQ_HANDLERS: Mutex<IrqTable> = Mutex::new(IrqTable::new());

/// Run the callback registered for `line` and acknowledge the controller.
///
/// The table lock is released before the callback runs, so a callback may
/// (un)register handlers.
pub fn dispatch_irq<C: InterruptController>(table: &Mutex<IrqTable>, line: u8, controller: &mut C) {
    let handler = table.lock().get(line);
    if let Some(handler) = handler {
        handler();
    }
    controller.end_of_interrupt(vector_of(line));
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingController {
        initialized: bool,
        masks: Vec<IrqMask>,
        eois: Vec<u8>,
    }

    impl InterruptController for RecordingController {
        fn initialize(&mut self) {
            self.initialized = true;
        }

        fn write_masks(&mut self, mask: IrqMask) {
            self.masks.push(mask);
        }

        fn end_of_interrupt(&mut self, vector: u8) {
            self.eois.push(vector);
        }
    }

    #[test]
    fn timer_only_mask() {
        assert_eq!(
            IrqMask::enabling(&[0]),
            IrqMask {
                master: 0xFE,
                slave: 0xFF
            }
        );
    }

    #[test]
    fn slave_lines_open_the_cascade() {
        let mask = IrqMask::enabling(&[0, 12]);
        assert_eq!(mask.master, 0xFA);
        assert_eq!(mask.slave, 0xEF);
        assert!(mask.is_enabled(CASCADE_LINE));
        assert!(mask.is_enabled(12));
        assert!(!mask.is_enabled(1));
    }

    #[test]
    fn out_of_range_lines_change_nothing() {
        assert_eq!(IrqMask::enabling(&[16, 200]), IrqMask::ALL_MASKED);
        assert!(!IrqMask::ALL_MASKED.is_enabled(99));
    }

    #[test]
    fn vectors_follow_the_remap() {
        assert_eq!(vector_of(0), 32);
        assert_eq!(vector_of(7), 39);
        assert_eq!(vector_of(8), 40);
        assert_eq!(vector_of(15), 47);
        assert_eq!(InterruptIndex::Timer.line(), 0);
        assert_eq!(InterruptIndex::Keyboard.as_usize(), 33);
    }

    static CALLS: AtomicUsize = AtomicUsize::new(0);

    fn count_call() {
        CALLS.fetch_add(1, Ordering::Relaxed);
    }

    #[test]
    fn dispatch_runs_handler_then_acknowledges() {
        let table = Mutex::new(IrqTable::new());
        table.lock().register(3, count_call).unwrap();
        let mut pic = RecordingController::default();

        let before = CALLS.load(Ordering::Relaxed);
        dispatch_irq(&table, 3, &mut pic);
        dispatch_irq(&table, 3, &mut pic);

        assert_eq!(CALLS.load(Ordering::Relaxed) - before, 2);
        assert_eq!(pic.eois, [35, 35]);
    }

    #[test]
    fn timer_line_advances_the_tick_counter() {
        use crate::interrupts::timer::{on_tick, TICKS};

        let table = Mutex::new(IrqTable::new());
        table.lock().register(InterruptIndex::Timer.line(), on_tick).unwrap();
        let mut pic = RecordingController::default();

        let start = TICKS.get();
        for _ in 0..25 {
            dispatch_irq(&table, InterruptIndex::Timer.line(), &mut pic);
        }

        assert_eq!(TICKS.elapsed_since(start), 25);
        assert_eq!(pic.eois.len(), 25);
        assert!(pic.eois.iter().all(|&v| v == InterruptIndex::Timer.as_u8()));
    }

    #[test]
    fn unhandled_lines_are_still_acknowledged() {
        let table = Mutex::new(IrqTable::new());
        let mut pic = RecordingController::default();

        dispatch_irq(&table, 9, &mut pic);
        assert_eq!(pic.eois, [41]);
        assert!(!pic.initialized);
        assert!(pic.masks.is_empty());
    }

    #[test]
    fn remap_initializes_before_masking() {
        let mut pic = RecordingController::default();
        remap(&mut pic, IrqMask::enabling(&[0]));
        assert!(pic.initialized);
        assert_eq!(pic.masks, [IrqMask { master: 0xFE, slave: 0xFF }]);
        assert!(pic.eois.is_empty());
    }

    #[test]
    fn registration_bounds() {
        let mut table = IrqTable::new();
        assert!(table.register(15, count_call).is_ok());
        assert!(table.register(16, count_call).is_err());
        assert!(table.get(15).is_some());
        table.unregister(15);
        assert!(table.get(15).is_none());
        assert!(table.get(40).is_none());
    }
}
