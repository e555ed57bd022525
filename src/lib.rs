//! # rangealloc - A Simulated First-Fit Memory Allocator
//!
//! This crate manages a fixed-size, simulated address space measured in
//! abstract "words". No real memory is touched. The allocator only keeps
//! track of which address ranges are handed out and which are free.
//!
//! ## Overview
//!
//! The space `[0, max_size)` is always split between two ordered lists of
//! address ranges:
//!
//! ```text
//!   Memory space (max_size = 100):
//!
//!   0         17  20                    60                         100
//!   ├─────────┼───┼─────────────────────┼────────────────────────────┤
//!   │ alloc A │ B │      free (20,40)    │         alloc C            │
//!   └─────────┴───┴─────────────────────┴────────────────────────────┘
//!
//!   free list:       (20, 40)
//!   allocated list:  (0, 17) ──► (17, 3) ──► (60, 40)
//! ```
//!
//! Every address belongs to exactly one range in exactly one list, and the
//! lengths of both lists always add up to `max_size`.
//!
//! ## Crate Structure
//!
//! ```text
//!   rangealloc
//!   ├── range      - AddressRange value type
//!   ├── list       - RangeList, an ordered singly linked list of ranges
//!   ├── allocator  - FreeListAllocator (allocate / release / compact)
//!   └── error      - ListError, AllocError
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use rangealloc::FreeListAllocator;
//!
//! let mut allocator = FreeListAllocator::new(100).unwrap();
//!
//! let a = allocator.allocate(17).unwrap();
//! let b = allocator.allocate(3).unwrap();
//! assert_eq!((a, b), (0, 17));
//!
//! allocator.release(a);
//! allocator.release(b);
//!
//! // Released ranges sit side by side in the free list until compaction.
//! assert_eq!(allocator.free_list().len(), 3);
//! allocator.compact();
//! assert_eq!(allocator.free_list().len(), 1);
//! ```
//!
//! ## How It Works
//!
//! `allocate` walks the free list in list order and takes the first range
//! that is long enough. A larger range is split: the allocation takes its
//! front and the remainder stays in place in the free list.
//!
//! ```text
//!   allocate(17) on free range (250, 20):
//!
//!   before   ┌──────────────────────────────┐
//!            │        free (250, 20)        │
//!            └──────────────────────────────┘
//!   after    ┌─────────────────────────┬────┐
//!            │   allocated (250, 17)   │free│ (267, 3)
//!            └─────────────────────────┴────┘
//! ```
//!
//! `release` moves a range back to the end of the free list without merging
//! it. Merging is the job of `compact`, which joins every pair of free
//! ranges where one ends at the other's base. Compaction never runs on its
//! own. Call it after an [`AllocError::AllocationFailure`], or use
//! [`FreeListAllocator::allocate_or_compact`].
//!
//! ## Limitations
//!
//! - **Single-threaded only**: wrap the whole allocator in one lock if it
//!   must be shared, never each list on its own
//! - **No alignment**: every word is interchangeable
//! - **Linear scans**: allocate and release are O(n), compact is O(n²)

mod allocator;
mod error;
mod list;
mod range;

pub use allocator::FreeListAllocator;
pub use error::{AllocError, ListError, Result};
pub use list::{Entry, EntryId, Iter, RangeList};
pub use range::AddressRange;
