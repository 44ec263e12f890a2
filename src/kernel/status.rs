use core::fmt;
use spin::Mutex;

/// Kernel initialization status tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStatus {
    NotStarted,
    InProgress,
    Completed,
    Failed(&'static str),
}

/// Kernel component status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentStatus {
    pub name: &'static str,
    pub status: InitStatus,
}

impl ComponentStatus {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            status: InitStatus::NotStarted,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.status, InitStatus::Completed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, InitStatus::Failed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    /// `phase` was started before the phase at `expected`.
    OutOfOrder { phase: &'static str, expected: &'static str },
    AlreadyRan { phase: &'static str },
    UnknownPhase { index: usize },
    Failed { phase: &'static str, reason: &'static str },
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootError::OutOfOrder { phase, expected } => {
                write!(f, "{} started before {}", phase, expected)
            }
            BootError::AlreadyRan { phase } => write!(f, "{} already ran", phase),
            BootError::UnknownPhase { index } => write!(f, "no boot phase #{}", index),
            BootError::Failed { phase, reason } => write!(f, "{} failed: {}", phase, reason),
        }
    }
}

/// Per-phase status for a fixed, ordered list of boot phases. Phases run
/// strictly in order and at most once.
pub struct BootTracker<const N: usize> {
    components: [ComponentStatus; N],
    next: usize,
}

impl<const N: usize> BootTracker<N> {
    pub const fn new(names: [&'static str; N]) -> Self {
        let mut components = [ComponentStatus::new(""); N];
        let mut i = 0;
        while i < N {
            components[i] = ComponentStatus::new(names[i]);
            i += 1;
        }
        Self {
            components,
            next: 0,
        }
    }

    pub fn begin(&mut self, index: usize) -> Result<(), BootError> {
        let component = self
            .components
            .get(index)
            .ok_or(BootError::UnknownPhase { index })?;
        if component.status != InitStatus::NotStarted {
            return Err(BootError::AlreadyRan {
                phase: component.name,
            });
        }
        if index != self.next {
            return Err(BootError::OutOfOrder {
                phase: component.name,
                expected: self.components[self.next.min(N - 1)].name,
            });
        }
        self.components[index].status = InitStatus::InProgress;
        Ok(())
    }

    pub fn finish(
        &mut self,
        index: usize,
        result: Result<(), &'static str>,
    ) -> Result<(), BootError> {
        let component = self
            .components
            .get_mut(index)
            .ok_or(BootError::UnknownPhase { index })?;
        match result {
            Ok(()) => {
                component.status = InitStatus::Completed;
                self.next += 1;
                Ok(())
            }
            Err(reason) => {
                component.status = InitStatus::Failed(reason);
                Err(BootError::Failed {
                    phase: component.name,
                    reason,
                })
            }
        }
    }

    pub fn name(&self, index: usize) -> Option<&'static str> {
        self.components.get(index).map(|c| c.name)
    }

    pub fn statuses(&self) -> &[ComponentStatus] {
        &self.components
    }

    /// Check if all components are initialized
    pub fn all_ready(&self) -> bool {
        N > 0 && self.components.iter().all(|c| c.is_complete())
    }
}

pub const BOOT_PHASES: usize = 4;

pub static BOOT_STATUS: Mutex<BootTracker<BOOT_PHASES>> = Mutex::new(BootTracker::new([
    "Descriptor Tables",
    "Interrupt System",
    "System Timer",
    "Kernel Heap",
]));

/// Snapshot of every boot phase.
pub fn get_all_statuses() -> [ComponentStatus; BOOT_PHASES] {
    BOOT_STATUS.lock().components
}

pub fn all_components_ready() -> bool {
    BOOT_STATUS.lock().all_ready()
}

impl fmt::Display for InitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitStatus::NotStarted => write!(f, "Not Started"),
            InitStatus::InProgress => write!(f, "In Progress"),
            InitStatus::Completed => write!(f, "Completed"),
            InitStatus::Failed(err) => write!(f, "Failed: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> BootTracker<3> {
        BootTracker::new(["a", "b", "c"])
    }

    #[test]
    fn phases_run_in_order() {
        let mut t = tracker();
        for i in 0..3 {
            t.begin(i).unwrap();
            assert_eq!(t.statuses()[i].status, InitStatus::InProgress);
            t.finish(i, Ok(())).unwrap();
        }
        assert!(t.all_ready());
    }

    #[test]
    fn skipping_ahead_is_refused() {
        let mut t = tracker();
        assert_eq!(
            t.begin(1),
            Err(BootError::OutOfOrder {
                phase: "b",
                expected: "a"
            })
        );
        assert_eq!(t.statuses()[1].status, InitStatus::NotStarted);
    }

    #[test]
    fn phases_run_once() {
        let mut t = tracker();
        t.begin(0).unwrap();
        t.finish(0, Ok(())).unwrap();
        assert_eq!(t.begin(0), Err(BootError::AlreadyRan { phase: "a" }));
        assert_eq!(t.begin(7), Err(BootError::UnknownPhase { index: 7 }));
    }

    #[test]
    fn failure_blocks_later_phases() {
        let mut t = tracker();
        t.begin(0).unwrap();
        assert_eq!(
            t.finish(0, Err("boom")),
            Err(BootError::Failed {
                phase: "a",
                reason: "boom"
            })
        );
        assert!(t.statuses()[0].is_failed());
        assert!(t.begin(1).is_err());
        assert!(!t.all_ready());
    }

    #[test]
    fn kernel_phases_are_listed_in_boot_order() {
        let names = get_all_statuses().map(|c| c.name);
        assert_eq!(
            names,
            ["Descriptor Tables", "Interrupt System", "System Timer", "Kernel Heap"]
        );
        assert!(!BootTracker::new(names).all_ready());
    }

    #[test]
    fn status_display() {
        assert_eq!(InitStatus::Failed("no PIT").to_string(), "Failed: no PIT");
        assert_eq!(
            BootError::OutOfOrder {
                phase: "System Timer",
                expected: "Interrupt System"
            }
            .to_string(),
            "System Timer started before Interrupt System"
        );
    }
}
