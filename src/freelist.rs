//! Free-list allocation
//!
//! Free memory is a singly-linked list of maximal spans threaded through
//! the spans' own cells: the first cell of a span holds the address of the
//! next span (or `NIL`), and spans of two or more cells carry the
//! continuation bit on their head tag plus their length in the second
//! cell. Allocation is first fit, carving requests off the low end of the
//! chosen span.

use std::fmt;

use crate::arena::{Addr, Arena, Cell, CELL_SZ, NIL};
use crate::tag::{Tag, CONT_MASK, INFO_MASK, MARK_MASK};
use crate::GcError;

/// One maximal run of contiguous free cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeSpan {
    /// Address of the span's first cell.
    pub addr: Addr,
    /// Length in cells.
    pub len: u16,
}

impl fmt::Display for FreeSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}({})", self.addr, self.len)
    }
}

/// Anchor of the free list.
#[derive(Debug)]
pub(crate) struct FreeList {
    /// Head span address, or `NIL` when the arena is exhausted.
    pub(crate) head: Addr,
}

impl FreeList {
    pub(crate) fn new() -> FreeList {
        FreeList { head: NIL }
    }

    /// First-fit allocation of `n_cells` cells tagged with `info`.
    ///
    /// An exact fit consumes the chosen span entirely. Otherwise the
    /// request is carved off the low end and a new span header is written
    /// for the remainder; a one-cell remainder stores no length and relies
    /// on the last cell of a span always having its continuation bit
    /// clear.
    pub(crate) fn alloc(
        &mut self,
        arena: &mut Arena,
        n_cells: u16,
        info: u8,
    ) -> Result<Addr, GcError> {
        assert!(n_cells >= 1, "allocation must request at least one cell");

        // Find a span of at least n_cells, remembering its predecessor.
        let mut prev = NIL;
        let mut p = self.head;
        let mut len = 0u16;
        while p != NIL {
            len = arena.free_len(p);
            if len >= n_cells {
                break;
            }
            prev = p;
            p = arena.next_free(p);
        }
        if p == NIL {
            return Err(GcError::OutOfMemory { requested: n_cells });
        }

        // Splice the carved cells out of the list.
        let next = if len == n_cells {
            arena.next_free(p)
        } else {
            let rem = p + n_cells * CELL_SZ;
            arena.set_cell(rem, arena.next_free(p) as Cell);
            if len > n_cells + 1 {
                let t = arena.tag(rem);
                arena.set_tag(rem, t.with_cont());
                arena.set_cell(rem + CELL_SZ, (len - n_cells) as Cell);
            }
            rem
        };
        if prev == NIL {
            self.head = next;
        } else {
            arena.set_cell(prev, next as Cell);
        }

        // Tag the new object: info and continuation on the first cell, with
        // the mark bit opposite the current epoch so the next trace sees it
        // as unvisited. Continuation cells get bare tags, the last cell a
        // zero tag.
        let head_bits = (info & INFO_MASK)
            | if n_cells > 1 { CONT_MASK } else { 0 }
            | (arena.epoch() ^ MARK_MASK);
        arena.set_tag(p, Tag::new(head_bits));
        let mut q = p + CELL_SZ;
        let mut left = n_cells - 1;
        while left != 0 {
            arena.set_tag(q, Tag::new(if left == 1 { 0 } else { CONT_MASK }));
            q += CELL_SZ;
            left -= 1;
        }

        Ok(p)
    }

    /// Iterate the spans currently on the list, in list order.
    pub(crate) fn spans<'a>(&self, arena: &'a Arena) -> FreeSpans<'a> {
        FreeSpans {
            arena,
            next: self.head,
        }
    }
}

/// Iterator over the free list.
pub(crate) struct FreeSpans<'a> {
    arena: &'a Arena,
    next: Addr,
}

impl Iterator for FreeSpans<'_> {
    type Item = FreeSpan;

    fn next(&mut self) -> Option<FreeSpan> {
        if self.next >= self.arena.alloc_top() {
            return None;
        }
        let span = FreeSpan {
            addr: self.next,
            len: self.arena.free_len(self.next),
        };
        self.next = self.arena.next_free(self.next);
        Some(span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::CellHeap;
    use crate::tag::PTR_MASK;

    #[test]
    fn test_first_alloc_splits_the_initial_span() {
        let mut heap = CellHeap::new().unwrap();
        let total = heap.cells_total() as u16;

        let a = heap.alloc(1, 0).unwrap();
        assert_eq!(a, 0x0400);
        assert_eq!(
            heap.free_spans(),
            vec![FreeSpan {
                addr: 0x0404,
                len: total - 1
            }]
        );
    }

    #[test]
    fn test_allocations_are_contiguous() {
        let mut heap = CellHeap::new().unwrap();
        let a = heap.alloc(2, 0).unwrap();
        let b = heap.alloc(1, 0).unwrap();
        let c = heap.alloc(3, 0).unwrap();
        assert_eq!(b, a + 8);
        assert_eq!(c, b + 4);
    }

    #[test]
    fn test_object_tags() {
        let mut heap = CellHeap::new().unwrap();
        let a = heap.alloc(3, 1).unwrap();

        let head = heap.tag(a);
        assert_eq!(head.info(), 1);
        assert!(head.has_cont());
        assert!(!head.is_ptr());
        assert_eq!(head.mark_bits(), MARK_MASK);

        assert_eq!(heap.tag(a + 4).bits(), CONT_MASK);
        assert_eq!(heap.tag(a + 8).bits(), 0);
    }

    #[test]
    fn test_single_cell_object_has_no_cont() {
        let mut heap = CellHeap::new().unwrap();
        let a = heap.alloc(1, 0).unwrap();
        assert!(!heap.tag(a).has_cont());
    }

    #[test]
    fn test_one_cell_remainder_keeps_implicit_length() {
        let mut heap = CellHeap::new().unwrap();
        let total = heap.cells_total() as u16;

        // Leave exactly one free cell at the top of the arena.
        let _ = heap.alloc(total - 1, 0).unwrap();
        let spans = heap.free_spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].len, 1);
        assert!(!heap.tag(spans[0].addr).has_cont());

        let last = heap.alloc(1, 0).unwrap();
        assert_eq!(last, spans[0].addr);
        assert!(heap.free_spans().is_empty());
    }

    #[test]
    fn test_exact_multi_cell_fit_consumes_span() {
        let mut heap = CellHeap::new().unwrap();
        let total = heap.cells_total() as u16;

        let _ = heap.alloc(total - 4, 0).unwrap();
        let b = heap.alloc(4, 0).unwrap();
        assert!(heap.free_spans().is_empty());
        assert!(heap.tag(b).has_cont());

        assert_eq!(
            heap.alloc(1, 0),
            Err(GcError::OutOfMemory { requested: 1 })
        );
    }

    #[test]
    fn test_first_fit_skips_small_spans() {
        let mut heap = CellHeap::new().unwrap();

        // Carve a one-cell hole below the tail span.
        let a = heap.alloc(1, 0).unwrap();
        let b = heap.alloc(1, 0).unwrap();
        heap.trace(b);
        heap.reclaim();
        heap.flip_epoch();
        let _ = a;

        let spans = heap.free_spans();
        assert_eq!(spans[0].len, 1);

        // A two-cell request must come from the tail, not the hole.
        let c = heap.alloc(2, 0).unwrap();
        assert_eq!(c, spans[1].addr);

        // A one-cell request fills the hole.
        let d = heap.alloc(1, 0).unwrap();
        assert_eq!(d, spans[0].addr);
    }

    #[test]
    fn test_oversized_request_fails() {
        let mut heap = CellHeap::new().unwrap();
        let total = heap.cells_total() as u16;
        let err = heap.alloc(total + 1, 0).unwrap_err();
        assert_eq!(
            err,
            GcError::OutOfMemory {
                requested: total + 1
            }
        );
        // The free list is untouched by a failed allocation.
        assert_eq!(heap.free_cells(), heap.cells_total());
    }

    #[test]
    fn test_alloc_leaves_ptr_clear() {
        let mut heap = CellHeap::new().unwrap();
        let a = heap.alloc(2, 0).unwrap();
        assert_eq!(heap.tag(a).bits() & PTR_MASK, 0);
        assert_eq!(heap.tag(a + 4).bits() & PTR_MASK, 0);
    }

    #[test]
    fn test_free_span_display() {
        let span = FreeSpan {
            addr: 0x0400,
            len: 8960,
        };
        assert_eq!(span.to_string(), "0400(8960)");
    }
}
