//! Marking and sweeping
//!
//! The mark phase is a depth-first walk over pointer cells using
//! Deutsch-Schorr-Waite pointer reversal: the return path is threaded
//! through the cells being descended through, so tracing needs only two
//! local addresses (`p` and `back`) no matter how deep or cyclic the
//! object graph is. The sweep phase walks the cell region in address
//! order, absorbing runs of consecutive unmarked objects into free spans
//! and fusing them with pre-existing neighbors on both sides.

use crate::arena::{Addr, Arena, Cell, CELL_SZ, NIL};
use crate::freelist::FreeList;

/// Statistics for one collection cycle.
#[derive(Debug, Clone, Default)]
pub struct CollectionStats {
    /// Number of objects newly marked by the mark phase.
    pub objects_marked: usize,
    /// Cells returned to the free list by the sweep phase.
    pub cells_reclaimed: usize,
    /// Time spent marking (microseconds).
    pub mark_time_us: u64,
    /// Time spent sweeping (microseconds).
    pub sweep_time_us: u64,
}

/// Walk the graph from `root`, marking objects as they are entered, and
/// return how many were newly marked.
///
/// The walk scans an object's cells for as long as each cell descends
/// into an unmarked target; a cell with nothing to follow (no pointer
/// bit, a `NIL` value, or an already-marked target) returns the walk to
/// the parent object, and the current object's remaining cells are not
/// scanned. A `NIL` root and an already-marked root are no-ops; pointer
/// cells holding `NIL` are never dereferenced, not even for a tag
/// lookup.
pub(crate) fn mark_from(arena: &mut Arena, root: Addr) -> usize {
    if root == NIL || !arena.is_free(root) {
        return 0;
    }

    let mut marked = 1usize;
    let mut p = root;
    let mut back = NIL;

    loop {
        // Mark the cell under the cursor. Only first cells matter for
        // reachability; marking continuation cells as the cursor walks an
        // object is harmless.
        arena.mark(p);

        let t = arena.tag(p);
        if t.is_ptr() {
            let target = arena.addr_at(p);
            if target != NIL && arena.is_free(target) {
                marked += 1;
                if !t.has_cont() {
                    // Last cell of its object: nothing left to come back
                    // for, so follow the pointer without reversing.
                    p = target;
                    continue;
                }
                // Descend with reversal: the cell keeps our return address
                // until the walk climbs back out through it.
                arena.set_cell(p, back as Cell);
                back = p;
                p = target;
                continue;
            }
        }

        // Nothing to follow from this cell; climb back out.
        if back == NIL {
            break;
        }
        let saved = arena.addr_at(back);
        arena.set_cell(back, p as Cell);
        p = back + CELL_SZ;
        back = saved;
    }

    marked
}

/// Sweep the cell region in address order, returning unmarked spans to
/// the free list. Returns the number of cells reclaimed.
///
/// Runs of consecutive unmarked objects become one span. A run ending at
/// a pre-existing free span is fused into it; a span starting where the
/// previously emitted span ends is fused backward into that one. After a
/// forward fusion the sweep resumes at the fused span's successor.
pub(crate) fn sweep(arena: &mut Arena, free: &mut FreeList) -> usize {
    let alloc_top = arena.alloc_top();
    let mut reclaimed = 0usize;

    let mut p = arena.alloc_base();
    let mut next_free = free.head;
    let mut prev_free = NIL;

    while p < alloc_top {
        if p == next_free {
            // Already on the free list; step over it.
            prev_free = next_free;
            next_free = arena.next_free(p);
            p += arena.free_len(p) * CELL_SZ;
            continue;
        }

        // Find where the object at p ends, absorbing any unmarked objects
        // that follow it, up to the next recorded free span.
        let mut end = p;
        loop {
            while arena.has_cont(end) {
                end += CELL_SZ;
            }
            end += CELL_SZ;
            if end == next_free || end >= alloc_top {
                break;
            }
            if !arena.is_free(end) || !arena.is_free(p) {
                break;
            }
        }

        if arena.is_free(p) {
            reclaimed += ((end - p) / CELL_SZ) as usize;
            if next_free == free.head {
                free.head = p;
            }
            if end == next_free {
                // The run ends at a recorded span: fuse and resume at that
                // span's successor.
                let succ = arena.next_free(next_free);
                let fused = arena.free_len(next_free) + (end - p) / CELL_SZ;
                arena.set_cell(p, succ as Cell);
                let t = arena.tag(p);
                arena.set_tag(p, t.with_cont());
                arena.set_cell(p + CELL_SZ, fused as Cell);
                end = succ;
                next_free = succ;
            } else {
                // Standalone span; one-cell spans keep their implicit
                // length.
                arena.set_cell(p, next_free as Cell);
                if end > p + CELL_SZ {
                    arena.set_cell(p + CELL_SZ, ((end - p) / CELL_SZ) as Cell);
                    let t = arena.tag(p);
                    arena.set_tag(p, t.with_cont());
                }
            }
            if prev_free != NIL {
                if p == prev_free + arena.free_len(prev_free) * CELL_SZ {
                    // The new span starts right after the previous one:
                    // swallow it so the combined span keeps coalescing.
                    let succ = arena.addr_at(p);
                    let total = arena.free_len(prev_free) + arena.free_len(p);
                    arena.set_cell(prev_free, succ as Cell);
                    arena.set_cell(prev_free + CELL_SZ, total as Cell);
                    let t = arena.tag(prev_free);
                    arena.set_tag(prev_free, t.with_cont());
                    p = prev_free;
                } else {
                    arena.set_cell(prev_free, p as Cell);
                }
            }
            prev_free = p;
        }

        p = end;
    }

    reclaimed
}
