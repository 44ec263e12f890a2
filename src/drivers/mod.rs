//! Device drivers
//!
//! - `port`: byte-wide port I/O behind the [`port::PortIo`] trait
//! - `keymap`: scan code set 1 layout tables (AZERTY, QWERTY)
//! - `ps2_keyboard`: polled 8042 keyboard driver and scan code decoder

pub mod keymap;
pub mod port;
pub mod ps2_keyboard;

pub use ps2_keyboard::{Key, Keyboard, ScancodeDecoder};
