//! The heap handle and its configuration
//!
//! `CellHeap` is the single owning handle over the arena, the free list,
//! and the collection machinery. Hosts hold cell addresses as opaque
//! integers and go through this type for every read, write, allocation,
//! and collection.

use std::time::Instant;

use crate::arena::{Addr, Arena, Cell, CELL_SZ, DEFAULT_ALLOC_BASE, DEFAULT_MEM_BYTES, NIL};
use crate::collect::{self, CollectionStats};
use crate::freelist::{FreeList, FreeSpan};
use crate::tag::Tag;
use crate::GcError;

/// Arena geometry, fixed at heap creation.
///
/// # Example
///
/// ```
/// use cellgc::HeapConfig;
///
/// let config = HeapConfig::default().with_mem_bytes(0x4000);
/// assert_eq!(config.mem_bytes, 0x4000);
/// ```
#[derive(Debug, Clone)]
pub struct HeapConfig {
    /// Total arena size in bytes. Three quarters become the cell region,
    /// the top quarter holds one tag byte per cell.
    pub mem_bytes: usize,
    /// Start of the cell region; everything below it is host-reserved.
    pub alloc_base: Addr,
}

impl Default for HeapConfig {
    fn default() -> Self {
        HeapConfig {
            mem_bytes: DEFAULT_MEM_BYTES,
            alloc_base: DEFAULT_ALLOC_BASE,
        }
    }
}

impl HeapConfig {
    /// Sets the arena size in bytes.
    pub fn with_mem_bytes(mut self, mem_bytes: usize) -> Self {
        self.mem_bytes = mem_bytes;
        self
    }

    /// Sets the start of the cell region.
    pub fn with_alloc_base(mut self, alloc_base: Addr) -> Self {
        self.alloc_base = alloc_base;
        self
    }

    fn validate(&self) -> Result<(), GcError> {
        if self.mem_bytes % 16 != 0 {
            return Err(GcError::InvalidConfig(format!(
                "mem_bytes {:#x} is not a multiple of 16",
                self.mem_bytes
            )));
        }
        if self.mem_bytes < 0x40 || self.mem_bytes > 0x1_0000 {
            return Err(GcError::InvalidConfig(format!(
                "mem_bytes {:#x} outside supported range [0x40, 0x10000]",
                self.mem_bytes
            )));
        }
        if self.alloc_base % CELL_SZ != 0 {
            return Err(GcError::InvalidConfig(format!(
                "alloc_base {:#06x} is not cell-aligned",
                self.alloc_base
            )));
        }
        let alloc_top = (self.mem_bytes / CELL_SZ as usize) * 3;
        if self.alloc_base as usize >= alloc_top {
            return Err(GcError::InvalidConfig(format!(
                "alloc_base {:#06x} leaves no cell region below {:#06x}",
                self.alloc_base, alloc_top
            )));
        }
        Ok(())
    }
}

/// A point-in-time summary of heap state.
#[derive(Debug, Clone, Default)]
pub struct HeapStats {
    /// Cells in the cell region.
    pub cells_total: u32,
    /// Cells currently on the free list.
    pub cells_free: u32,
    /// Number of free spans.
    pub free_spans: usize,
    /// Length of the largest free span.
    pub largest_span: u16,
    /// Completed collection cycles.
    pub collections: usize,
}

/// The mark-sweep heap.
///
/// Objects never move: an address returned by [`alloc`](CellHeap::alloc)
/// is stable for the object's lifetime. Collection is stop-the-world
/// within the calling thread; the heap is not `Sync` and performs no
/// internal synchronization.
#[derive(Debug)]
pub struct CellHeap {
    arena: Arena,
    free: FreeList,
    collections: usize,
}

impl CellHeap {
    /// Create a heap with the default geometry.
    pub fn new() -> Result<CellHeap, GcError> {
        Self::with_config(HeapConfig::default())
    }

    /// Create a heap with the given geometry.
    pub fn with_config(config: HeapConfig) -> Result<CellHeap, GcError> {
        config.validate()?;
        let mut heap = CellHeap {
            arena: Arena::new(config.mem_bytes, config.alloc_base),
            free: FreeList::new(),
            collections: 0,
        };
        heap.init_free_span();
        Ok(heap)
    }

    /// Write the initial free-span header: one maximal span covering the
    /// whole cell region, terminated by `NIL`.
    fn init_free_span(&mut self) {
        let base = self.arena.alloc_base();
        let cells = self.arena.cells_total();
        self.free.head = base;
        self.arena.unmark(base);
        let t = self.arena.tag(base);
        self.arena.set_tag(base, t.with_cont());
        self.arena.set_cell(base, NIL as Cell);
        self.arena.set_cell(base + CELL_SZ, cells as Cell);
    }

    /// Return the heap to its post-creation state: epoch zero, one
    /// maximal free span, collection counter cleared. Cell contents are
    /// not wiped.
    pub fn reset(&mut self) {
        self.arena.reset_epoch();
        self.init_free_span();
        self.collections = 0;
    }

    /// Allocate `n_cells` contiguous cells, tagging the object's first
    /// cell with the host `info` bit.
    ///
    /// There is no implicit collection: exhaustion reports
    /// [`GcError::OutOfMemory`] and the host decides whether to collect
    /// and retry.
    ///
    /// # Panics
    ///
    /// Panics if `n_cells` is zero.
    pub fn alloc(&mut self, n_cells: u16, info: u8) -> Result<Addr, GcError> {
        self.free.alloc(&mut self.arena, n_cells, info)
    }

    /// Walk the object graph from `root`, marking objects as they are
    /// reached. Returns the number of objects newly marked; zero if
    /// `root` is `NIL` or already marked.
    ///
    /// An object's cells are scanned for as long as each cell descends
    /// into an unmarked target; a cell with nothing to follow ends that
    /// object's scan. Structures meant to be traced link-by-link keep
    /// each link in the last cell of its node, or use single-cell link
    /// nodes — a final-cell pointer is followed whenever its target
    /// still needs marking.
    ///
    /// Call once per root per cycle, before [`reclaim`](CellHeap::reclaim).
    pub fn trace(&mut self, root: Addr) -> usize {
        collect::mark_from(&mut self.arena, root)
    }

    /// Sweep the cell region once, returning unmarked spans to the free
    /// list and coalescing with neighbors on both sides. Returns the
    /// number of cells reclaimed.
    ///
    /// The epoch is left untouched; pair with
    /// [`flip_epoch`](CellHeap::flip_epoch) to finish the cycle, or use
    /// [`collect`](CellHeap::collect) which does both.
    pub fn reclaim(&mut self) -> usize {
        collect::sweep(&mut self.arena, &mut self.free)
    }

    /// Flip the mark epoch, reclassifying every marked object as
    /// "unreachable until traced again" without touching any tag.
    pub fn flip_epoch(&mut self) {
        self.arena.flip_epoch();
    }

    /// The current mark epoch byte.
    pub fn epoch(&self) -> u8 {
        self.arena.epoch()
    }

    /// Run a full collection cycle: trace every root, sweep until the
    /// free list stabilizes, then flip the epoch.
    pub fn collect(&mut self, roots: &[Addr]) -> CollectionStats {
        let mark_start = Instant::now();
        let mut objects_marked = 0;
        for &root in roots {
            objects_marked += collect::mark_from(&mut self.arena, root);
        }
        let mark_time_us = mark_start.elapsed().as_micros() as u64;

        // A sweep that fuses a span forward resumes past the fused span's
        // successor, so one pass may leave garbage behind; repeat until a
        // pass frees nothing.
        let sweep_start = Instant::now();
        let mut cells_reclaimed = 0;
        loop {
            let n = collect::sweep(&mut self.arena, &mut self.free);
            cells_reclaimed += n;
            if n == 0 {
                break;
            }
        }
        let sweep_time_us = sweep_start.elapsed().as_micros() as u64;

        self.arena.flip_epoch();
        self.collections += 1;

        CollectionStats {
            objects_marked,
            cells_reclaimed,
            mark_time_us,
            sweep_time_us,
        }
    }

    /// Number of completed collection cycles.
    pub fn collection_count(&self) -> usize {
        self.collections
    }

    /// Read the value of cell `p`.
    pub fn cell(&self, p: Addr) -> Cell {
        self.arena.cell(p)
    }

    /// Write the value of cell `p`. The cell's tag is untouched; use
    /// [`set_ptr`](CellHeap::set_ptr) when storing a traceable address.
    pub fn set_cell(&mut self, p: Addr, v: Cell) {
        self.arena.set_cell(p, v);
    }

    /// Read the tag byte of cell `p`.
    pub fn tag(&self, p: Addr) -> Tag {
        self.arena.tag(p)
    }

    /// Write the tag byte of cell `p`.
    ///
    /// The continuation bit of allocated cells and the mark bit of first
    /// cells belong to the collector; hosts must carry them through.
    pub fn set_tag(&mut self, p: Addr, t: Tag) {
        self.arena.set_tag(p, t);
    }

    /// Store `target` in cell `p` and set the cell's pointer bit. `NIL`
    /// is allowed and traces as "no target".
    pub fn set_ptr(&mut self, p: Addr, target: Addr) {
        self.arena.set_cell(p, target as Cell);
        let t = self.arena.tag(p);
        self.arena.set_tag(p, t.with_ptr());
    }

    /// True iff the mark bit of `p` differs from the current epoch.
    pub fn is_free(&self, p: Addr) -> bool {
        self.arena.is_free(p)
    }

    /// Check that `p` is a cell address within the cell region.
    pub fn contains(&self, p: Addr) -> bool {
        self.arena.contains(p)
    }

    /// Number of cells in the cell region.
    pub fn cells_total(&self) -> u32 {
        self.arena.cells_total()
    }

    /// The free list as a vector of spans, in list order.
    pub fn free_spans(&self) -> Vec<FreeSpan> {
        self.free.spans(&self.arena).collect()
    }

    /// Total cells currently on the free list.
    pub fn free_cells(&self) -> u32 {
        self.free
            .spans(&self.arena)
            .map(|span| span.len as u32)
            .sum()
    }

    /// Snapshot of heap state.
    pub fn stats(&self) -> HeapStats {
        let mut cells_free = 0u32;
        let mut free_spans = 0usize;
        let mut largest_span = 0u16;
        for span in self.free.spans(&self.arena) {
            cells_free += span.len as u32;
            free_spans += 1;
            largest_span = largest_span.max(span.len);
        }
        HeapStats {
            cells_total: self.arena.cells_total(),
            cells_free,
            free_spans,
            largest_span,
            collections: self.collections,
        }
    }
}
