use core::cell::UnsafeCell;
use core::num::NonZeroUsize;
use core::{ptr, slice};

use crate::memory::allocators::common::{
    align_up, max_blocks, BlockInfo, HeapCorruption, HeapStats, ALIGNMENT, GUARD_TAG,
    HEADER_SIZE, MIN_PAYLOAD,
};

// ============================================================================
// HANDLES AND DESCRIPTORS
// ============================================================================

/// Handle to a live allocation: the payload's offset inside the arena.
///
/// Always at least `HEADER_SIZE`, since the header precedes the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HeapPtr(NonZeroUsize);

impl HeapPtr {
    pub fn from_offset(offset: usize) -> Option<Self> {
        NonZeroUsize::new(offset).map(HeapPtr)
    }

    pub fn offset(self) -> usize {
        self.0.get()
    }
}

#[derive(Debug, Clone, Copy)]
struct Block {
    /// Arena offset of the header.
    offset: usize,
    /// Payload capacity.
    size: usize,
    free: bool,
    tag: u32,
    next: Option<usize>,
}

impl Block {
    fn payload_start(&self) -> usize {
        self.offset + HEADER_SIZE
    }

    fn end(&self) -> usize {
        self.offset + HEADER_SIZE + self.size
    }

    fn is_live(&self) -> bool {
        !self.free && self.tag == GUARD_TAG
    }
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Vacant { next: Option<usize> },
    Occupied(Block),
}

/// Backing bytes for a [`Heap`].
///
/// Lives outside the heap and any lock around it. The bytes are only ever
/// reached through raw pointers.
#[repr(C, align(16))]
pub struct Arena<const N: usize>(UnsafeCell<[u8; N]>);

// Each payload is owned by whoever holds its handle; the heap only writes
// to a payload while it is being handed out or moved.
unsafe impl<const N: usize> Sync for Arena<N> {}

impl<const N: usize> Arena<N> {
    pub const fn new() -> Self {
        Self(UnsafeCell::new([0; N]))
    }

    pub fn base(&self) -> *mut u8 {
        self.0.get().cast()
    }
}

impl<const N: usize> Default for Arena<N> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// FIRST-FIT HEAP
// ============================================================================

/// First-fit allocator over an [`Arena`] of `N` bytes.
///
/// Blocks form one address-ordered list covering the whole arena. Their
/// descriptors live in a table of `SLOTS` entries rather than inside the
/// arena, so a stray write into a payload can't rewrite a link. `SLOTS`
/// must cover the most blocks the arena can be cut into, so a split never
/// waits on a descriptor.
///
/// - allocate: first fit, split when the surplus can hold another block
/// - free: guard check, then one coalescing pass over the whole list
pub struct Heap<const N: usize, const SLOTS: usize> {
    arena: &'static Arena<N>,
    slots: [Slot; SLOTS],
    head: Option<usize>,
    vacant: Option<usize>,
    initialized: bool,
}

impl<const N: usize, const SLOTS: usize> Heap<N, SLOTS> {
    const LAYOUT_OK: () = {
        assert!(N % ALIGNMENT == 0, "arena size must be a multiple of 16");
        assert!(N >= HEADER_SIZE + MIN_PAYLOAD, "arena must hold one minimal block");
        assert!(SLOTS >= max_blocks(N), "descriptor table smaller than the block limit");
    };

    pub const fn new(arena: &'static Arena<N>) -> Self {
        let () = Self::LAYOUT_OK;
        Self {
            arena,
            slots: [Slot::Vacant { next: None }; SLOTS],
            head: None,
            vacant: None,
            initialized: false,
        }
    }

    pub const fn arena_size(&self) -> usize {
        N
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Lay down one free block spanning the arena. Later calls do nothing.
    pub fn init(&mut self) {
        if self.initialized {
            return;
        }

        for i in 1..SLOTS {
            let next = if i + 1 < SLOTS { Some(i + 1) } else { None };
            self.slots[i] = Slot::Vacant { next };
        }
        self.vacant = if SLOTS > 1 { Some(1) } else { None };

        self.slots[0] = Slot::Occupied(Block {
            offset: 0,
            size: N - HEADER_SIZE,
            free: true,
            tag: 0,
            next: None,
        });
        self.head = Some(0);
        self.initialized = true;
    }

    /// Reserve `size` bytes. `None` for zero-sized requests or when no free
    /// block is large enough.
    pub fn allocate(&mut self, size: usize) -> Option<HeapPtr> {
        if !self.initialized {
            self.init();
        }
        if size == 0 || size > N {
            return None;
        }

        let size = align_up(size, ALIGNMENT);
        let (id, block) = self.iter().find(|(_, b)| b.free && b.size >= size)?;

        if block.size >= size + HEADER_SIZE + MIN_PAYLOAD {
            self.split(id, size);
        }

        let block = self.block_mut(id)?;
        block.free = false;
        block.tag = GUARD_TAG;
        HeapPtr::from_offset(block.payload_start())
    }

    /// Release an allocation. Handles that don't name a live block
    /// (already freed, never allocated, mid-payload) are ignored.
    pub fn free(&mut self, ptr: HeapPtr) {
        if !self.initialized {
            return;
        }
        let Some(id) = self.find(ptr) else {
            return;
        };
        let Some(block) = self.block_mut(id) else {
            return;
        };
        if !block.is_live() {
            return;
        }

        block.free = true;
        block.tag = 0;
        self.coalesce();
    }

    /// `allocate(count * size)` with the payload cleared. An overflowing
    /// product is treated as unsatisfiable.
    pub fn zero_allocate(&mut self, count: usize, size: usize) -> Option<HeapPtr> {
        let total = count.checked_mul(size)?;
        let ptr = self.allocate(total)?;
        // The block was handed out just now and spans at least `total` bytes.
        unsafe { ptr::write_bytes(self.arena_ptr().add(ptr.offset()), 0, total) };
        Some(ptr)
    }

    /// Grow or keep an allocation.
    ///
    /// - `None` behaves as `allocate`
    /// - `new_size == 0` frees and returns `None`
    /// - a request that fits the current capacity returns `ptr` unchanged
    /// - otherwise the contents move to a new block; on failure the old
    ///   block is left untouched and `None` is returned
    pub fn resize(&mut self, ptr: Option<HeapPtr>, new_size: usize) -> Option<HeapPtr> {
        let Some(ptr) = ptr else {
            return self.allocate(new_size);
        };
        if new_size == 0 {
            self.free(ptr);
            return None;
        }

        let old = *self.block(self.find(ptr)?)?;
        if !old.is_live() {
            return None;
        }
        if new_size <= old.size {
            return Some(ptr);
        }

        let new_ptr = self.allocate(new_size)?;
        let base = self.arena_ptr();
        // Both blocks are live and distinct, so the ranges cannot overlap.
        unsafe {
            ptr::copy_nonoverlapping(
                base.add(old.payload_start()),
                base.add(new_ptr.offset()),
                old.size.min(new_size),
            )
        };
        self.free(ptr);
        Some(new_ptr)
    }

    /// Merge every address-adjacent pair of free blocks.
    pub fn defragment(&mut self) {
        self.coalesce();
    }

    /// Payload capacity of a live allocation.
    pub fn capacity(&self, ptr: HeapPtr) -> Option<usize> {
        self.live_block(ptr).map(|b| b.size)
    }

    /// Bytes of a live allocation. The caller must not be holding the same
    /// payload through a raw pointer from [`Heap::arena_ptr`] meanwhile.
    pub fn payload(&self, ptr: HeapPtr) -> Option<&[u8]> {
        let block = self.live_block(ptr)?;
        let start = unsafe { self.arena_ptr().add(block.payload_start()) };
        Some(unsafe { slice::from_raw_parts(start, block.size) })
    }

    pub fn payload_mut(&mut self, ptr: HeapPtr) -> Option<&mut [u8]> {
        let block = self.live_block(ptr)?;
        let start = unsafe { self.arena_ptr().add(block.payload_start()) };
        Some(unsafe { slice::from_raw_parts_mut(start, block.size) })
    }

    /// Address of the first arena byte. Offsets in [`HeapPtr`] are relative to it.
    pub fn arena_ptr(&self) -> *mut u8 {
        self.arena.base()
    }

    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            total: N,
            ..HeapStats::default()
        };

        for (_, block) in self.iter() {
            stats.block_count += 1;
            stats.used += HEADER_SIZE;
            if block.free {
                stats.free += block.size;
                stats.free_blocks += 1;
                stats.largest_free = stats.largest_free.max(block.size);
            } else {
                stats.used += block.size;
            }
        }

        stats
    }

    /// Blocks in address order.
    pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
        self.iter().map(|(_, b)| BlockInfo {
            offset: b.offset,
            size: b.size,
            free: b.free,
        })
    }

    /// Walk the list and verify its structural invariants.
    pub fn check_integrity(&self) -> Result<(), HeapCorruption> {
        if !self.initialized {
            return Err(HeapCorruption::Uninitialized);
        }

        let mut expected = 0;
        let mut prev_free = false;
        let mut visited = 0;
        let mut current = self.head;

        while let Some(id) = current {
            visited += 1;
            if visited > SLOTS {
                return Err(HeapCorruption::Cycle);
            }
            let block = self.block(id).ok_or(HeapCorruption::DanglingLink { slot: id })?;

            if block.offset != expected {
                return Err(HeapCorruption::Gap {
                    expected,
                    found: block.offset,
                });
            }
            if block.free && prev_free {
                return Err(HeapCorruption::AdjacentFree {
                    offset: block.offset,
                });
            }
            if block.free == (block.tag == GUARD_TAG) {
                return Err(HeapCorruption::GuardMismatch {
                    offset: block.offset,
                });
            }

            expected = block.end();
            prev_free = block.free;
            current = block.next;
        }

        if expected != N {
            return Err(HeapCorruption::Coverage {
                covered: expected,
                arena: N,
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // list plumbing
    // ------------------------------------------------------------------------

    fn block(&self, id: usize) -> Option<&Block> {
        match self.slots.get(id)? {
            Slot::Occupied(block) => Some(block),
            Slot::Vacant { .. } => None,
        }
    }

    fn block_mut(&mut self, id: usize) -> Option<&mut Block> {
        match self.slots.get_mut(id)? {
            Slot::Occupied(block) => Some(block),
            Slot::Vacant { .. } => None,
        }
    }

    fn iter(&self) -> impl Iterator<Item = (usize, Block)> + '_ {
        let first = self.head.and_then(|id| self.block(id).map(|b| (id, *b)));
        core::iter::successors(first, move |(_, block)| {
            block.next.and_then(|id| self.block(id).map(|b| (id, *b)))
        })
        .take(SLOTS)
    }

    fn find(&self, ptr: HeapPtr) -> Option<usize> {
        self.iter()
            .find(|(_, b)| b.payload_start() == ptr.offset())
            .map(|(id, _)| id)
    }

    fn live_block(&self, ptr: HeapPtr) -> Option<Block> {
        let block = *self.block(self.find(ptr)?)?;
        block.is_live().then_some(block)
    }

    fn take_vacant(&mut self) -> Option<usize> {
        let id = self.vacant?;
        match self.slots[id] {
            Slot::Vacant { next } => self.vacant = next,
            Slot::Occupied(_) => return None,
        }
        Some(id)
    }

    fn release_slot(&mut self, id: usize) {
        self.slots[id] = Slot::Vacant { next: self.vacant };
        self.vacant = Some(id);
    }

    /// Cut `id` down to `size` bytes and put the rest in a new free block
    /// right behind it. `LAYOUT_OK` keeps a spare descriptor around for
    /// every split the arena has room for.
    fn split(&mut self, id: usize, size: usize) {
        let Some(block) = self.block(id).copied() else {
            return;
        };
        let Some(new_id) = self.take_vacant() else {
            return;
        };

        self.slots[new_id] = Slot::Occupied(Block {
            offset: block.payload_start() + size,
            size: block.size - size - HEADER_SIZE,
            free: true,
            tag: 0,
            next: block.next,
        });
        if let Some(block) = self.block_mut(id) {
            block.size = size;
            block.next = Some(new_id);
        }
    }

    fn coalesce(&mut self) {
        let mut current = self.head;
        while let Some(id) = current {
            let Some(block) = self.block(id).copied() else {
                break;
            };
            let Some(next_id) = block.next else {
                break;
            };
            let Some(next) = self.block(next_id).copied() else {
                break;
            };

            if block.free && next.free && block.end() == next.offset {
                if let Some(merged) = self.block_mut(id) {
                    merged.size += HEADER_SIZE + next.size;
                    merged.next = next.next;
                }
                self.release_slot(next_id);
                continue;
            }
            current = block.next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARENA: usize = 1024;
    type TestHeap = Heap<ARENA, 64>;

    fn arena<const N: usize>() -> &'static Arena<N> {
        Box::leak(Box::new(Arena::new()))
    }

    fn fresh() -> Box<TestHeap> {
        let mut heap = Box::new(TestHeap::new(arena()));
        heap.init();
        heap
    }

    fn assert_healthy(heap: &TestHeap) {
        assert_eq!(heap.check_integrity(), Ok(()));
        let stats = heap.stats();
        assert_eq!(stats.used + stats.free, stats.total);
        let covered: usize = heap.blocks().map(|b| HEADER_SIZE + b.size).sum();
        assert_eq!(covered, ARENA);
    }

    fn range(heap: &TestHeap, ptr: HeapPtr) -> core::ops::Range<usize> {
        ptr.offset()..ptr.offset() + heap.capacity(ptr).unwrap()
    }

    #[test]
    fn fresh_heap_is_one_free_block() {
        let heap = fresh();
        let blocks: Vec<_> = heap.blocks().collect();
        assert_eq!(
            blocks,
            [BlockInfo {
                offset: 0,
                size: ARENA - HEADER_SIZE,
                free: true
            }]
        );
        assert_healthy(&heap);
    }

    #[test]
    fn every_size_fits_a_fresh_heap() {
        for size in 1..=ARENA - HEADER_SIZE {
            let mut heap = fresh();
            let ptr = heap.allocate(size).unwrap_or_else(|| panic!("size {size}"));
            assert!(heap.capacity(ptr).unwrap() >= size);
            assert!(ptr.offset() + size <= ARENA);
            assert_healthy(&heap);
        }
    }

    #[test]
    fn oversized_requests_fail() {
        let mut heap = fresh();
        assert_eq!(heap.allocate(ARENA - HEADER_SIZE + 1), None);
        assert_eq!(heap.allocate(usize::MAX), None);
        assert_healthy(&heap);
    }

    #[test]
    fn live_regions_never_overlap() {
        let mut heap = fresh();
        let mut live = Vec::new();
        for size in [1, 17, 100, 3, 64, 250, 16, 48].iter().cycle().take(40) {
            match heap.allocate(*size) {
                Some(ptr) => live.push(ptr),
                None => break,
            }
        }
        assert!(live.len() > 4);

        for (i, a) in live.iter().enumerate() {
            for b in &live[i + 1..] {
                let (ra, rb) = (range(&heap, *a), range(&heap, *b));
                assert!(ra.end <= rb.start || rb.end <= ra.start, "{ra:?} overlaps {rb:?}");
            }
        }
        assert_healthy(&heap);
    }

    #[test]
    fn invariants_hold_through_mixed_workload() {
        let mut heap = fresh();
        let mut live: Vec<HeapPtr> = Vec::new();
        let mut seed: u32 = 0x1234_5678;

        for _ in 0..500 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
            let roll = (seed >> 16) as usize;
            if roll % 3 == 0 && !live.is_empty() {
                let victim = live.swap_remove(roll % live.len());
                heap.free(victim);
            } else if let Some(ptr) = heap.allocate(roll % 200 + 1) {
                live.push(ptr);
            }
            assert_healthy(&heap);
        }

        for ptr in live {
            heap.free(ptr);
        }
        assert_eq!(heap.stats().block_count, 1);
        assert_healthy(&heap);
    }

    #[test]
    fn free_then_allocate_reuses_address() {
        let mut heap = fresh();
        let first = heap.allocate(40).unwrap();
        heap.free(first);
        let second = heap.allocate(40).unwrap();
        assert_eq!(first, second);
        assert_eq!(heap.stats().block_count, 2);
    }

    #[test]
    fn adjacent_frees_coalesce_in_either_order() {
        for reverse in [false, true] {
            let mut heap = fresh();
            let a = heap.allocate(32).unwrap();
            let b = heap.allocate(32).unwrap();
            let _fence = heap.allocate(32).unwrap();

            if reverse {
                heap.free(b);
                heap.free(a);
            } else {
                heap.free(a);
                heap.free(b);
            }

            let first = heap.blocks().next().unwrap();
            assert_eq!(
                first,
                BlockInfo {
                    offset: 0,
                    size: 32 + HEADER_SIZE + 32,
                    free: true
                }
            );
            assert_healthy(&heap);
        }
    }

    #[test]
    fn double_free_is_ignored() {
        let mut heap = fresh();
        let a = heap.allocate(64).unwrap();
        let b = heap.allocate(64).unwrap();

        heap.free(a);
        let after_first = heap.stats();
        heap.free(a);
        assert_eq!(heap.stats(), after_first);
        assert_healthy(&heap);

        // `a`'s space is handed out exactly once.
        let c = heap.allocate(64).unwrap();
        let d = heap.allocate(64).unwrap();
        assert_eq!(c, a);
        assert_ne!(d, a);
        assert_eq!(heap.capacity(b), Some(64));
    }

    #[test]
    fn wild_pointers_are_ignored() {
        let mut heap = fresh();
        let a = heap.allocate(64).unwrap();
        let before = heap.stats();

        heap.free(HeapPtr::from_offset(a.offset() + 8).unwrap());
        heap.free(HeapPtr::from_offset(ARENA * 4).unwrap());
        assert_eq!(heap.stats(), before);
        assert_eq!(heap.resize(HeapPtr::from_offset(a.offset() + 16), 500), None);
        assert_eq!(heap.stats(), before);
    }

    #[test]
    fn zero_sized_requests() {
        let mut heap = fresh();
        assert_eq!(heap.allocate(0), None);
        assert_eq!(heap.zero_allocate(0, 16), None);
        assert_eq!(heap.zero_allocate(16, 0), None);
        assert_eq!(heap.zero_allocate(usize::MAX, 2), None);
        assert_eq!(heap.stats().block_count, 1);
    }

    #[test]
    fn zero_allocate_clears_recycled_memory() {
        let mut heap = fresh();
        let dirty = heap.allocate(48).unwrap();
        heap.payload_mut(dirty).unwrap().fill(0xAA);
        heap.free(dirty);

        let clean = heap.zero_allocate(4, 12).unwrap();
        assert_eq!(clean, dirty);
        assert!(heap.payload(clean).unwrap()[..48].iter().all(|&b| b == 0));
    }

    #[test]
    fn first_fit_scenario() {
        let mut heap = fresh();
        let a = heap.allocate(100).unwrap();
        let b = heap.allocate(200).unwrap();
        assert_ne!(a, b);

        heap.free(a);
        let c = heap.allocate(50).unwrap();
        assert_eq!(c, a);
        assert_healthy(&heap);

        heap.free(b);
        heap.free(c);

        let stats = heap.stats();
        assert_eq!(stats.block_count, 1);
        assert_eq!(stats.free_blocks, 1);
        assert_eq!(stats.free, ARENA - HEADER_SIZE);
        assert_eq!(stats.used, HEADER_SIZE);
        assert_healthy(&heap);
    }

    #[test]
    fn split_leaves_no_runt_blocks() {
        let mut heap = fresh();
        // 1008 bytes free: a 992-byte request would leave exactly one header
        // and no payload, so the whole block is handed out.
        let ptr = heap.allocate(ARENA - HEADER_SIZE - HEADER_SIZE).unwrap();
        assert_eq!(heap.capacity(ptr), Some(ARENA - HEADER_SIZE));
        assert_eq!(heap.stats().block_count, 1);
    }

    #[test]
    fn resize_semantics() {
        let mut heap = fresh();

        let p = heap.resize(None, 20).unwrap();
        assert_eq!(heap.capacity(p), Some(32));
        heap.payload_mut(p).unwrap()[..4].copy_from_slice(b"nova");

        assert_eq!(heap.resize(Some(p), 30), Some(p));

        let _fence = heap.allocate(16).unwrap();
        let grown = heap.resize(Some(p), 100).unwrap();
        assert_ne!(grown, p);
        assert_eq!(&heap.payload(grown).unwrap()[..4], b"nova");
        assert_eq!(heap.capacity(p), None);

        assert_eq!(heap.resize(Some(grown), 0), None);
        assert_eq!(heap.capacity(grown), None);
        assert_healthy(&heap);
    }

    #[test]
    fn failed_resize_keeps_old_block() {
        let mut heap = fresh();
        let p = heap.allocate(64).unwrap();
        heap.payload_mut(p).unwrap()[0] = 7;

        assert_eq!(heap.resize(Some(p), ARENA), None);
        assert_eq!(heap.capacity(p), Some(64));
        assert_eq!(heap.payload(p).unwrap()[0], 7);
        assert_healthy(&heap);
    }

    #[test]
    fn init_is_idempotent_and_implicit() {
        let mut heap = Box::new(TestHeap::new(arena()));
        assert!(!heap.is_initialized());
        assert_eq!(heap.check_integrity(), Err(HeapCorruption::Uninitialized));

        let p = heap.allocate(10).unwrap();
        assert!(heap.is_initialized());
        heap.init();
        assert_eq!(heap.capacity(p), Some(16));
        assert_eq!(heap.stats().block_count, 2);
    }

    #[test]
    fn smallest_blocks_fill_the_whole_arena() {
        let mut heap = fresh();
        let mut live = Vec::new();
        while let Some(ptr) = heap.allocate(1) {
            assert_eq!(heap.capacity(ptr), Some(MIN_PAYLOAD));
            live.push(ptr);
        }

        assert_eq!(live.len(), max_blocks(ARENA));
        let stats = heap.stats();
        assert_eq!((stats.used, stats.free), (ARENA, 0));
        assert_healthy(&heap);

        for ptr in live {
            heap.free(ptr);
        }
        assert_eq!(heap.stats().block_count, 1);
    }

    #[test]
    fn payload_writes_stay_inside_the_block() {
        let mut heap = fresh();
        let a = heap.allocate(32).unwrap();
        let b = heap.allocate(32).unwrap();
        heap.payload_mut(a).unwrap().fill(0x11);
        heap.payload_mut(b).unwrap().fill(0x22);

        assert!(heap.payload(a).unwrap().iter().all(|&x| x == 0x11));
        assert!(heap.payload(b).unwrap().iter().all(|&x| x == 0x22));
        let raw = unsafe { *heap.arena_ptr().add(b.offset() - 1) };
        assert_eq!(raw, 0x11);
    }

    #[test]
    fn stats_report_renders() {
        let mut heap = fresh();
        heap.allocate(100).unwrap();
        let report = heap.stats().to_string();
        assert!(report.contains("Total:   1024 bytes"));
        assert!(report.contains("Used:    144 bytes"));
        assert!(report.contains("Usage:   14%"));
    }
}
