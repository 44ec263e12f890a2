/// Shared constants, report types and helpers for the heap allocator
use core::fmt;

// ============================================================================
// LAYOUT CONSTANTS
// ============================================================================

/// Arena bytes reserved in front of every payload.
pub const HEADER_SIZE: usize = 16;

/// Requests are rounded up to this boundary; payloads start on it.
pub const ALIGNMENT: usize = 16;

/// Smallest payload a split is allowed to leave behind.
pub const MIN_PAYLOAD: usize = 16;

/// Tag carried by every allocated block, cleared when it is freed.
pub const GUARD_TAG: u32 = 0xDEAD_BEEF;

/// Most blocks an arena of `arena` bytes can be cut into: every block is at
/// least one header plus the minimum payload.
pub const fn max_blocks(arena: usize) -> usize {
    arena / (HEADER_SIZE + MIN_PAYLOAD)
}

// ============================================================================
// UTILITY FUNCTIONS
// ============================================================================

#[inline]
pub(crate) const fn align_up(addr: usize, align: usize) -> usize {
    (addr + align - 1) & !(align - 1)
}

#[inline]
pub(crate) fn is_aligned(addr: usize, align: usize) -> bool {
    addr & (align - 1) == 0
}

// ============================================================================
// REPORTS
// ============================================================================

/// One walk over the block list.
///
/// `used` counts allocated payloads plus one header per block, `free`
/// counts free payloads only, so `used + free == total` on a healthy heap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub total: usize,
    pub used: usize,
    pub free: usize,
    pub block_count: usize,
    pub free_blocks: usize,
    pub largest_free: usize,
}

impl HeapStats {
    pub fn usage_percent(&self) -> usize {
        if self.total == 0 {
            return 0;
        }
        self.used * 100 / self.total
    }
}

impl fmt::Display for HeapStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== HEAP ===")?;
        writeln!(f, "Total:   {} bytes", self.total)?;
        writeln!(f, "Used:    {} bytes", self.used)?;
        writeln!(f, "Free:    {} bytes", self.free)?;
        writeln!(f, "Usage:   {}%", self.usage_percent())?;
        write!(
            f,
            "Blocks:  {} ({} free, largest {} bytes)",
            self.block_count, self.free_blocks, self.largest_free
        )
    }
}

/// A block as seen from outside the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Arena offset of the block header.
    pub offset: usize,
    /// Payload capacity in bytes.
    pub size: usize,
    pub free: bool,
}

/// First invariant violation found by `Heap::check_integrity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapCorruption {
    Uninitialized,
    /// A link points at a descriptor slot that holds no block.
    DanglingLink { slot: usize },
    /// The list is longer than the descriptor table.
    Cycle,
    /// A block does not start where its predecessor ends.
    Gap { expected: usize, found: usize },
    AdjacentFree { offset: usize },
    GuardMismatch { offset: usize },
    /// The blocks do not cover the arena exactly.
    Coverage { covered: usize, arena: usize },
}

impl fmt::Display for HeapCorruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeapCorruption::Uninitialized => write!(f, "heap not initialized"),
            HeapCorruption::DanglingLink { slot } => write!(f, "link to vacant slot {}", slot),
            HeapCorruption::Cycle => write!(f, "block list does not terminate"),
            HeapCorruption::Gap { expected, found } => {
                write!(f, "block at {:#x}, expected {:#x}", found, expected)
            }
            HeapCorruption::AdjacentFree { offset } => {
                write!(f, "unmerged free neighbour at {:#x}", offset)
            }
            HeapCorruption::GuardMismatch { offset } => write!(f, "bad guard tag at {:#x}", offset),
            HeapCorruption::Coverage { covered, arena } => {
                write!(f, "blocks cover {} of {} bytes", covered, arena)
            }
        }
    }
}
