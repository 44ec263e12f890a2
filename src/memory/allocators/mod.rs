//! # Memory Allocators
//!
//! ## FirstFit `Heap`
//! - One fixed `Arena`, never grows, kept apart from the block list
//! - Address-ordered block list, first-fit search
//! - Split on allocate, coalesce on free
//! - Guard tag on every allocated block: double frees and wild frees are
//!   ignored instead of corrupting the list
//!
//! ## Common
//!
//! - Layout constants (`HEADER_SIZE`, `ALIGNMENT`, `MIN_PAYLOAD`, `GUARD_TAG`)
//! - `HeapStats`, `BlockInfo`, `HeapCorruption` reports
//! - Alignment helpers

mod common;
pub mod first_fit;

pub use common::{
    max_blocks, BlockInfo, HeapCorruption, HeapStats, ALIGNMENT, GUARD_TAG, HEADER_SIZE,
    MIN_PAYLOAD,
};
pub(crate) use common::is_aligned;
pub use first_fit::{Arena, Heap, HeapPtr};
