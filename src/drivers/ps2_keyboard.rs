//! # PS/2 Keyboard Driver
//!
//! Polled driver for the 8042 keyboard controller. IRQ1 stays masked; the
//! foreground asks for keys when it wants them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  status 0x64  ┌──────────────────┐
//! │  Keyboard   │──────────────▶│ ScancodeDecoder  │
//! │  (Port 60)  │  data 0x60    │ - 0xE0 sequences │
//! └─────────────┘               │ - Shift latch    │
//!                               │ - Caps Lock      │
//!                               │ - Layout tables  │
//!                               └────────┬─────────┘
//!                                        │
//!                                        ▼
//!                                       Key
//! ```
//!
//! ## Scancode Processing
//!
//! 1. `poll` checks bit 0 of the status port and reads one byte if pending
//! 2. `0xE0` arms the extended state; the next byte is decoded as a
//!    navigation key and always clears it
//! 3. Shift make/break codes update the latch, Caps Lock toggles
//! 4. Other break codes are dropped, make codes go through the layout table
//!
//! ## Usage
//!
//! ```ignore
//! loop {
//!     match read_key_blocking() {
//!         Key::Char(b'\n') => submit(),
//!         Key::Up => history_back(),
//!         _ => {}
//!     }
//! }
//! ```

use spin::Mutex;

use crate::drivers::keymap::{Layout, DEFAULT_LAYOUT, ESCAPE};
use crate::drivers::port::{HardwarePorts, PortIo};

pub const DATA_PORT: u16 = 0x60;
pub const STATUS_PORT: u16 = 0x64;

/// Output buffer full.
const STATUS_OUTPUT_FULL: u8 = 1 << 0;
/// The pending byte came from the auxiliary (mouse) device.
const STATUS_AUX_DATA: u8 = 1 << 5;

const EXTENDED_PREFIX: u8 = 0xE0;
const RELEASE_BIT: u8 = 0x80;

const LEFT_SHIFT: u8 = 0x2A;
const RIGHT_SHIFT: u8 = 0x36;
const LEFT_SHIFT_BREAK: u8 = LEFT_SHIFT | RELEASE_BIT;
const RIGHT_SHIFT_BREAK: u8 = RIGHT_SHIFT | RELEASE_BIT;
const CAPS_LOCK: u8 = 0x3A;

/// A decoded key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Printable byte (code page 437), or `\n`, `\t`, `\x08`.
    Char(u8),
    Escape,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
    /// Function key F1..F12.
    F(u8),
}

impl Key {
    /// The byte for character keys, `None` for navigation keys.
    pub fn as_byte(self) -> Option<u8> {
        match self {
            Key::Char(byte) => Some(byte),
            Key::Escape => Some(ESCAPE),
            _ => None,
        }
    }
}

pub struct ScancodeDecoder {
    layout: &'static Layout,
    is_extended: bool,
    shift_pressed: bool,
    caps_lock: bool,
}

impl ScancodeDecoder {
    pub const fn new(layout: &'static Layout) -> Self {
        Self {
            layout,
            is_extended: false,
            shift_pressed: false,
            caps_lock: false,
        }
    }

    pub fn layout(&self) -> &'static Layout {
        self.layout
    }

    pub fn shift_pressed(&self) -> bool {
        self.shift_pressed
    }

    pub fn process_scancode(&mut self, scancode: u8) -> Option<Key> {
        if scancode == EXTENDED_PREFIX {
            self.is_extended = true;
            return None;
        }

        if self.is_extended {
            self.is_extended = false;
            return Self::decode_extended(scancode);
        }

        match scancode {
            LEFT_SHIFT | RIGHT_SHIFT => {
                self.shift_pressed = true;
                return None;
            }
            LEFT_SHIFT_BREAK | RIGHT_SHIFT_BREAK => {
                self.shift_pressed = false;
                return None;
            }
            CAPS_LOCK => {
                self.caps_lock = !self.caps_lock;
                return None;
            }
            _ => {}
        }

        if scancode & RELEASE_BIT != 0 {
            return None;
        }

        match scancode {
            0x3B..=0x44 => return Some(Key::F(scancode - 0x3A)),
            0x57 => return Some(Key::F(11)),
            0x58 => return Some(Key::F(12)),
            _ => {}
        }

        let shifted = self.shift_pressed ^ (self.caps_lock && self.layout.is_letter(scancode));
        match self.layout.translate(scancode, shifted)? {
            ESCAPE => Some(Key::Escape),
            byte => Some(Key::Char(byte)),
        }
    }

    /// Second byte of an `0xE0` sequence.
    fn decode_extended(scancode: u8) -> Option<Key> {
        // Break codes, and the fake shifts some controllers wrap around
        // navigation keys, carry no key press.
        if scancode & RELEASE_BIT != 0 {
            return None;
        }

        let key = match scancode {
            0x48 => Key::Up,
            0x50 => Key::Down,
            0x4B => Key::Left,
            0x4D => Key::Right,
            0x47 => Key::Home,
            0x4F => Key::End,
            0x49 => Key::PageUp,
            0x51 => Key::PageDown,
            0x52 => Key::Insert,
            0x53 => Key::Delete,
            0x1C => Key::Char(b'\n'),
            0x35 => Key::Char(b'/'),
            _ => return None,
        };
        Some(key)
    }
}

/// A decoder bound to the controller ports it reads from.
pub struct Keyboard<P: PortIo> {
    ports: P,
    decoder: ScancodeDecoder,
}

impl<P: PortIo> Keyboard<P> {
    pub const fn new(ports: P, layout: &'static Layout) -> Self {
        Self {
            ports,
            decoder: ScancodeDecoder::new(layout),
        }
    }

    pub fn decoder(&self) -> &ScancodeDecoder {
        &self.decoder
    }

    /// Non-blocking read: `None` when no byte is pending or the byte
    /// doesn't complete a key press.
    pub fn poll(&mut self) -> Option<Key> {
        let status = self.ports.read_u8(STATUS_PORT);
        if status & STATUS_OUTPUT_FULL == 0 {
            return None;
        }

        let scancode = self.ports.read_u8(DATA_PORT);
        if status & STATUS_AUX_DATA != 0 {
            return None;
        }
        self.decoder.process_scancode(scancode)
    }

    /// Spin until a key press is decoded. Never times out.
    pub fn read_blocking(&mut self) -> Key {
        loop {
            if let Some(key) = self.poll() {
                return key;
            }
            core::hint::spin_loop();
        }
    }
}

static KEYBOARD: Mutex<Keyboard<HardwarePorts>> =
    Mutex::new(Keyboard::new(unsafe { HardwarePorts::new() }, &DEFAULT_LAYOUT));

/// Poll the system keyboard once.
pub fn poll_key() -> Option<Key> {
    KEYBOARD.lock().poll()
}

/// Wait for the next key press on the system keyboard.
pub fn read_key_blocking() -> Key {
    loop {
        if let Some(key) = poll_key() {
            return key;
        }
        core::hint::spin_loop();
    }
}
