//! Byte-wide x86 port I/O.
//!
//! Every register the platform touches (PIT, 8042 keyboard controller) is
//! reached through [`PortIo`], so drivers can be driven by a scripted bus in
//! tests instead of real `in`/`out` instructions.

use x86_64::instructions::port::Port;

/// The two port primitives the platform is built on.
pub trait PortIo {
    fn read_u8(&mut self, port: u16) -> u8;
    fn write_u8(&mut self, port: u16, value: u8);
}

/// Real hardware ports. Only constructible in ring 0.
#[derive(Debug)]
pub struct HardwarePorts {
    _private: (),
}

impl HardwarePorts {
    /// # Safety
    /// The caller must be running in ring 0 and must not let two owners
    /// program the same device concurrently.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl PortIo for HardwarePorts {
    fn read_u8(&mut self, port: u16) -> u8 {
        let mut port = Port::<u8>::new(port);
        unsafe { port.read() }
    }

    fn write_u8(&mut self, port: u16, value: u8) {
        let mut port = Port::<u8>::new(port);
        unsafe { port.write(value) }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::PortIo;
    use std::collections::VecDeque;

    /// Records writes and replays queued reads per port.
    #[derive(Default)]
    pub struct ScriptedPorts {
        pub writes: Vec<(u16, u8)>,
        reads: Vec<(u16, VecDeque<u8>)>,
    }

    impl ScriptedPorts {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn queue_read(&mut self, port: u16, value: u8) {
            match self.reads.iter_mut().find(|(p, _)| *p == port) {
                Some((_, queue)) => queue.push_back(value),
                None => {
                    let mut queue = VecDeque::new();
                    queue.push_back(value);
                    self.reads.push((port, queue));
                }
            }
        }
    }

    impl PortIo for ScriptedPorts {
        fn read_u8(&mut self, port: u16) -> u8 {
            self.reads
                .iter_mut()
                .find(|(p, _)| *p == port)
                .and_then(|(_, queue)| queue.pop_front())
                .unwrap_or(0)
        }

        fn write_u8(&mut self, port: u16, value: u8) {
            self.writes.push((port, value));
        }
    }
}
