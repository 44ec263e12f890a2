//! # System Timer
//!
//! PIT channel 0 runs as a rate generator at [`TIMER_FREQUENCY_HZ`]; every
//! IRQ0 bumps one global `u32` tick counter.
//!
//! ## Wraparound
//!
//! At 100 Hz the counter wraps after about 497 days. Deadlines written as
//! `now >= start + n` break across the wrap, so every wait here measures
//! `now.wrapping_sub(start)` against a captured start instead.

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::drivers::port::PortIo;

pub const TIMER_FREQUENCY_HZ: u32 = 100;
pub const PIT_BASE_FREQUENCY: u32 = 1_193_182;

const PIT_CHANNEL0: u16 = 0x40;
const PIT_COMMAND: u16 = 0x43;

/// Channel 0, lobyte/hibyte access, mode 2 (rate generator), binary.
const PIT_RATE_GENERATOR: u8 = 0x34;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    ZeroFrequency,
    /// The divisor for this frequency does not fit the 16-bit reload register.
    DivisorOutOfRange { hz: u32 },
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerError::ZeroFrequency => write!(f, "timer frequency must be non-zero"),
            TimerError::DivisorOutOfRange { hz } => {
                write!(f, "{} Hz is below what the PIT can divide down to", hz)
            }
        }
    }
}

/// Reload value for channel 0 at `hz`.
pub fn pit_divisor(hz: u32) -> Result<u16, TimerError> {
    if hz == 0 {
        return Err(TimerError::ZeroFrequency);
    }
    u16::try_from(PIT_BASE_FREQUENCY / hz).map_err(|_| TimerError::DivisorOutOfRange { hz })
}

/// Put channel 0 into rate-generator mode at `hz`.
pub fn program_pit<P: PortIo>(ports: &mut P, hz: u32) -> Result<u16, TimerError> {
    let divisor = pit_divisor(hz)?;
    let [low, high] = divisor.to_le_bytes();

    ports.write_u8(PIT_COMMAND, PIT_RATE_GENERATOR);
    ports.write_u8(PIT_CHANNEL0, low);
    ports.write_u8(PIT_CHANNEL0, high);
    Ok(divisor)
}

// ============================================================================
// TICK COUNTER
// ============================================================================

/// Monotonic tick count. The timer interrupt is the only writer.
pub struct TickCounter {
    ticks: AtomicU32,
    hz: u32,
}

impl TickCounter {
    pub const fn new(hz: u32) -> Self {
        Self {
            ticks: AtomicU32::new(0),
            hz,
        }
    }

    /// Advance by one tick, wrapping at `u32::MAX`.
    #[inline]
    pub fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self) -> u32 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn frequency(&self) -> u32 {
        self.hz
    }

    /// Ticks since `start`, correct across one wrap of the counter.
    pub fn elapsed_since(&self, start: u32) -> u32 {
        self.get().wrapping_sub(start)
    }

    pub fn ticks_to_ms(&self, ticks: u32) -> u64 {
        u64::from(ticks) * 1000 / u64::from(self.hz.max(1))
    }

    /// Milliseconds to ticks, rounded up so a wait never ends early.
    pub fn ms_to_ticks(&self, ms: u64) -> u32 {
        let ticks = ms.saturating_mul(u64::from(self.hz)).div_ceil(1000);
        u32::try_from(ticks).unwrap_or(u32::MAX)
    }

    /// Spin until `n` ticks have passed. Needs interrupts enabled and the
    /// timer running, otherwise it never returns.
    pub fn busy_wait(&self, n: u32) {
        let start = self.get();
        while self.elapsed_since(start) < n {
            core::hint::spin_loop();
        }
    }

    pub fn uptime_ms(&self) -> u64 {
        self.ticks_to_ms(self.get())
    }
}

pub static TICKS: TickCounter = TickCounter::new(TIMER_FREQUENCY_HZ);

/// IRQ0 callback.
pub(crate) fn on_tick() {
    TICKS.tick();
}

pub fn ticks() -> u32 {
    TICKS.get()
}

pub fn elapsed_since(start: u32) -> u32 {
    TICKS.elapsed_since(start)
}

pub fn sleep_ms(ms: u64) {
    TICKS.busy_wait(TICKS.ms_to_ticks(ms));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::port::mock::ScriptedPorts;

    #[test]
    fn programs_channel0_at_100hz() {
        let mut ports = ScriptedPorts::new();
        assert_eq!(program_pit(&mut ports, TIMER_FREQUENCY_HZ), Ok(11931));
        assert_eq!(ports.writes, [(0x43, 0x34), (0x40, 0x9B), (0x40, 0x2E)]);
    }

    #[test]
    fn rejects_unreachable_frequencies() {
        let mut ports = ScriptedPorts::new();
        assert_eq!(program_pit(&mut ports, 0), Err(TimerError::ZeroFrequency));
        assert_eq!(
            program_pit(&mut ports, 18),
            Err(TimerError::DivisorOutOfRange { hz: 18 })
        );
        assert!(ports.writes.is_empty());
        assert_eq!(pit_divisor(19), Ok(62799));
    }

    #[test]
    fn counts_every_tick() {
        let counter = TickCounter::new(100);
        for _ in 0..250 {
            counter.tick();
        }
        assert_eq!(counter.get(), 250);
        assert_eq!(counter.frequency(), 100);
        assert_eq!(counter.uptime_ms(), 2500);
    }

    #[test]
    fn elapsed_survives_wraparound() {
        let counter = TickCounter::new(100);
        counter.ticks.store(u32::MAX - 2, Ordering::Relaxed);
        let start = counter.get();
        for _ in 0..5 {
            counter.tick();
        }
        assert_eq!(counter.get(), 2);
        assert_eq!(counter.elapsed_since(start), 5);
    }

    #[test]
    fn busy_wait_for_zero_ticks_returns() {
        let counter = TickCounter::new(100);
        counter.busy_wait(0);
    }

    #[test]
    fn ms_conversion_rounds_up() {
        let counter = TickCounter::new(100);
        assert_eq!(counter.ms_to_ticks(0), 0);
        assert_eq!(counter.ms_to_ticks(1), 1);
        assert_eq!(counter.ms_to_ticks(10), 1);
        assert_eq!(counter.ms_to_ticks(11), 2);
        assert_eq!(counter.ms_to_ticks(u64::MAX / 1000), u32::MAX);
    }

    #[test]
    fn huge_waits_clamp_instead_of_overflowing() {
        let counter = TickCounter::new(100);
        assert_eq!(counter.ms_to_ticks(u64::MAX), u32::MAX);
        assert_eq!(counter.ms_to_ticks(u64::MAX / 2), u32::MAX);
        assert_eq!(TickCounter::new(1000).ms_to_ticks(u64::MAX), u32::MAX);
    }
}
