//! # Kernel Heap
//!
//! One static 1 MiB [`Arena`] managed by the first-fit [`Heap`]. Only the
//! block list sits behind the spin lock; the arena bytes stay outside it.
//! Outside of host tests it is also the `#[global_allocator]`, so `alloc`
//! collections land in the same arena.
//!
//! ```ignore
//! memory::init_heap();
//! let buf = memory::zero_allocate(4, 64).expect("heap exhausted");
//! memory::HEAP.lock().payload_mut(buf).unwrap()[0] = 1;
//! memory::free(buf);
//! ```
//!
//! Interrupt handlers must never call into the heap: the lock is not
//! re-entrant and an interrupted allocation leaves the list mid-update.

use bootloader_api::info::MemoryRegionKind;
use bootloader_api::BootInfo;
use core::alloc::{GlobalAlloc, Layout};
use core::ptr;
use spin::{Mutex, MutexGuard};

use crate::println;

pub mod allocators;

pub use allocators::{Arena, BlockInfo, Heap, HeapCorruption, HeapPtr, HeapStats};
use allocators::{is_aligned, max_blocks, ALIGNMENT};

// Static heap buffer embedded in the kernel binary
pub const HEAP_SIZE: usize = 1024 * 1024; // 1 MiB
/// One descriptor for every block the arena could ever be split into.
pub const MAX_BLOCKS: usize = max_blocks(HEAP_SIZE);

pub type KernelHeap = Heap<HEAP_SIZE, MAX_BLOCKS>;

static KERNEL_HEAP_ARENA: Arena<HEAP_SIZE> = Arena::new();

#[cfg_attr(not(test), global_allocator)]
pub static HEAP: LockedHeap<HEAP_SIZE, MAX_BLOCKS> = LockedHeap::new(&KERNEL_HEAP_ARENA);

pub struct LockedHeap<const N: usize, const SLOTS: usize> {
    inner: Mutex<Heap<N, SLOTS>>,
}

impl<const N: usize, const SLOTS: usize> LockedHeap<N, SLOTS> {
    pub const fn new(arena: &'static Arena<N>) -> Self {
        Self {
            inner: Mutex::new(Heap::new(arena)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Heap<N, SLOTS>> {
        self.inner.lock()
    }

    /// Map a raw pointer handed out by the `GlobalAlloc` impl back to its handle.
    fn handle_of(heap: &Heap<N, SLOTS>, ptr: *mut u8) -> Option<HeapPtr> {
        let base = heap.arena_ptr() as usize;
        let addr = ptr as usize;
        if addr < base || addr >= base + N || !is_aligned(addr, ALIGNMENT) {
            return None;
        }
        HeapPtr::from_offset(addr - base)
    }
}

unsafe impl<const N: usize, const SLOTS: usize> GlobalAlloc for LockedHeap<N, SLOTS> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return ptr::null_mut();
        }
        let mut heap = self.inner.lock();
        let base = heap.arena_ptr();
        match heap.allocate(layout.size()) {
            Some(handle) => base.add(handle.offset()),
            None => ptr::null_mut(),
        }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return ptr::null_mut();
        }
        let mut heap = self.inner.lock();
        let base = heap.arena_ptr();
        match heap.zero_allocate(1, layout.size()) {
            Some(handle) => base.add(handle.offset()),
            None => ptr::null_mut(),
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        let mut heap = self.inner.lock();
        if let Some(handle) = Self::handle_of(&heap, ptr) {
            heap.free(handle);
        }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return ptr::null_mut();
        }
        let mut heap = self.inner.lock();
        let Some(handle) = Self::handle_of(&heap, ptr) else {
            return ptr::null_mut();
        };
        let base = heap.arena_ptr();
        match heap.resize(Some(handle), new_size) {
            Some(moved) => base.add(moved.offset()),
            None => ptr::null_mut(),
        }
    }
}

/// Set up the kernel heap. Calling it again is harmless.
pub fn init_heap() {
    let mut heap = HEAP.lock();
    if heap.is_initialized() {
        return;
    }
    heap.init();

    let start = heap.arena_ptr() as usize;
    println!(
        "Heap: {:#x} - {:#x} ({} KB, {} descriptors)",
        start,
        start + HEAP_SIZE,
        HEAP_SIZE / 1024,
        MAX_BLOCKS
    );
}

pub fn allocate(size: usize) -> Option<HeapPtr> {
    HEAP.lock().allocate(size)
}

pub fn free(ptr: HeapPtr) {
    HEAP.lock().free(ptr)
}

pub fn zero_allocate(count: usize, size: usize) -> Option<HeapPtr> {
    HEAP.lock().zero_allocate(count, size)
}

pub fn resize(ptr: Option<HeapPtr>, new_size: usize) -> Option<HeapPtr> {
    HEAP.lock().resize(ptr, new_size)
}

pub fn heap_stats() -> HeapStats {
    HEAP.lock().stats()
}

/// Dump the bootloader's memory map to the serial console.
pub fn log_memory_map(boot_info: &BootInfo) {
    println!("\n=== Memory Map ===");

    let mut total_usable = 0u64;
    let mut total_reserved = 0u64;

    for region in boot_info.memory_regions.iter() {
        let size = region.end - region.start;
        let kind_str = match region.kind {
            MemoryRegionKind::Usable => {
                total_usable += size;
                "Usable"
            }
            MemoryRegionKind::Bootloader => {
                total_reserved += size;
                "Bootloader"
            }
            MemoryRegionKind::UnknownBios(_) => {
                total_reserved += size;
                "BIOS"
            }
            MemoryRegionKind::UnknownUefi(_) => {
                total_reserved += size;
                "UEFI"
            }
            _ => {
                total_reserved += size;
                "Reserved"
            }
        };

        println!(
            "  {:#018x} - {:#018x} ({:>8} KB) [{}]",
            region.start,
            region.end,
            size / 1024,
            kind_str
        );
    }

    println!("\nTotal Usable:   {} MB", total_usable / (1024 * 1024));
    println!("Total Reserved: {} MB", total_reserved / (1024 * 1024));
}
