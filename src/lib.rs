//! Non-moving mark-sweep garbage collection for cell arenas
//!
//! This crate implements a small stop-the-world collector for language
//! runtimes on memory-constrained targets. It manages one fixed-size byte
//! arena carved into uniform 4-byte cells, with one out-of-line tag byte
//! per cell.
//!
//! # Characteristics
//!
//! - **Non-moving**: objects keep their address for their whole lifetime
//! - **Bounded tracing**: reachability marking uses Deutsch-Schorr-Waite
//!   pointer reversal, so the mark phase needs O(1) auxiliary space on
//!   arbitrarily deep or cyclic graphs
//! - **Coalescing sweep**: unmarked spans return to a single free list,
//!   merging with adjacent free spans on both sides
//! - **Epoch marking**: flipping one byte reclassifies every object as
//!   unmarked for the next cycle; there is no unmark pass
//! - **First-fit allocation**: spans split when strictly larger than the
//!   request; exhaustion is an error, never an implicit collection
//!
//! # Usage
//!
//! ```rust
//! use cellgc::CellHeap;
//!
//! let mut heap = CellHeap::new().expect("failed to create heap");
//!
//! // Allocate a two-cell object pointing at a one-cell object.
//! let a = heap.alloc(2, 0).expect("allocation failed");
//! let b = heap.alloc(1, 0).expect("allocation failed");
//! heap.set_ptr(a, b);
//!
//! // Collect with `a` as the only root: both objects survive.
//! let stats = heap.collect(&[a]);
//! assert_eq!(stats.objects_marked, 2);
//! ```
//!
//! The lower-level cycle (`trace` per root, `reclaim`, `flip_epoch`) is
//! available for hosts that manage roots incrementally.

// Module declarations
pub mod arena;
pub mod collect;
pub mod freelist;
pub mod heap;
pub mod tag;

// Re-export main types
pub use arena::{Addr, Arena, Cell, CELL_SZ, DEFAULT_ALLOC_BASE, DEFAULT_MEM_BYTES, NIL};

pub use tag::{Tag, CONT_MASK, INFO_MASK, MARK_MASK, PTR_MASK};

pub use collect::CollectionStats;

pub use freelist::FreeSpan;

pub use heap::{CellHeap, HeapConfig, HeapStats};

/// Errors reported by the collector.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GcError {
    /// No free span was large enough for the request.
    #[error("arena exhausted: no free span of {requested} cells")]
    OutOfMemory {
        /// Cells requested by the failed allocation.
        requested: u16,
    },

    /// Rejected heap geometry.
    #[error("invalid heap configuration: {0}")]
    InvalidConfig(String),
}

/// Version of the collector crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
