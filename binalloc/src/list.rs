//! The node list embedded in arena memory.
//!
//! Nodes are addressed by byte offset from the arena base and always
//! partition `0..total` in address order, so the head lives at offset zero
//! for the whole lifetime of an arena.

use alloc::vec::Vec;
use core::ptr::NonNull;

use crate::diag::{NodeInfo, Violation};
use crate::node::{NODE_ALIGN, NODE_SIZE, Node};
use crate::numeric::{Offset, Size};

pub(crate) const HEAD: Offset = 0;

/// Split failed: the node is smaller than the requested block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Infeasible {
    pub available: Size,
}

/// Which neighbours a freed node was merged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Joined {
    Alone,
    Prev,
    Next,
    Both,
}

/// Why a header failed validation on `free`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rejected {
    Misaligned,
    Marker,
    DoubleFree,
    Size,
    Links,
}

/// Mutable view over the nodes of one arena.
pub(crate) struct List {
    base: NonNull<u8>,
    total: Size,
}

impl List {
    /// ## Safety
    /// `base..base + total` must be a live region owned by one arena, and the
    /// caller must hold that arena's lock for as long as the list is used.
    #[inline]
    pub unsafe fn new(base: NonNull<u8>, total: Size) -> Self {
        Self { base, total }
    }

    #[inline]
    fn ptr(&self, off: Offset) -> *mut Node {
        debug_assert!(off % NODE_ALIGN == 0, "misaligned node at {}", off);
        debug_assert!(
            off as u64 + NODE_SIZE as u64 <= self.total as u64,
            "node at {} past arena end {}",
            off,
            self.total
        );
        unsafe { self.base.as_ptr().add(off as usize).cast() }
    }

    #[inline]
    pub fn node(&self, off: Offset) -> Node {
        unsafe { self.ptr(off).read() }
    }

    #[inline]
    fn write(&mut self, off: Offset, node: Node) {
        unsafe { self.ptr(off).write(node) }
    }

    #[inline]
    fn update(&mut self, off: Offset, f: impl FnOnce(&mut Node)) {
        let mut node = self.node(off);
        f(&mut node);
        self.write(off, node);
    }

    #[inline]
    pub fn set_free(&mut self, off: Offset, free: bool) {
        self.update(off, |n| n.set_free(free));
    }

    /// Writes the single free node spanning the whole arena.
    pub fn install(&mut self) {
        let head = Node::free(self.total, None, None);
        self.write(HEAD, head);
    }

    /// First free node of at least `target` bytes, scanning from the head.
    pub fn find_fit(&self, target: Size) -> Option<Offset> {
        let mut cur = Some(HEAD);
        while let Some(off) = cur {
            let node = self.node(off);
            if node.is_free() && node.size >= target {
                return Some(off);
            }
            cur = node.next();
        }
        None
    }

    /// Shrinks the free node at `off` to `target` bytes and links the rest
    /// of its range back in as a free remainder.
    ///
    /// A remainder too narrow for its own header is not created; the node
    /// keeps its full size instead. Returns the node's final size.
    pub fn split(&mut self, off: Offset, target: Size) -> Result<Size, Infeasible> {
        let mut node = self.node(off);
        debug_assert!(node.is_free());

        let Some(rest) = node.size.checked_sub(target) else {
            return Err(Infeasible {
                available: node.size,
            });
        };
        if rest < NODE_SIZE {
            return Ok(node.size);
        }

        let rem_off = off + target;
        let rem = Node::free(rest, Some(off), node.next());
        self.write(rem_off, rem);
        if let Some(next) = node.next() {
            self.update(next, |n| n.prev = rem_off);
        }

        node.next = rem_off;
        node.size = target;
        self.write(off, node);
        Ok(target)
    }

    /// Merges the free node at `off` with whichever neighbours are free.
    ///
    /// Absorbed headers are wiped so they no longer pass validation.
    pub fn join(&mut self, off: Offset) -> Joined {
        let mut node = self.node(off);
        debug_assert!(node.is_free());

        let prev = node
            .prev()
            .map(|p| (p, self.node(p)))
            .filter(|(_, n)| n.is_free());
        let next = node
            .next()
            .map(|n| (n, self.node(n)))
            .filter(|(_, n)| n.is_free());

        match (prev, next) {
            (Some((p, mut pn)), Some((n, nn))) => {
                pn.size += node.size + nn.size;
                pn.next = nn.next;
                self.write(p, pn);
                if let Some(after) = nn.next() {
                    self.update(after, |x| x.prev = p);
                }
                self.write(off, Node::retired());
                self.write(n, Node::retired());
                Joined::Both
            }
            (Some((p, mut pn)), None) => {
                pn.size += node.size;
                pn.next = node.next;
                self.write(p, pn);
                if let Some(after) = node.next() {
                    self.update(after, |x| x.prev = p);
                }
                self.write(off, Node::retired());
                Joined::Prev
            }
            (None, Some((n, nn))) => {
                node.size += nn.size;
                node.next = nn.next;
                self.write(off, node);
                if let Some(after) = nn.next() {
                    self.update(after, |x| x.prev = off);
                }
                self.write(n, Node::retired());
                Joined::Next
            }
            (None, None) => Joined::Alone,
        }
    }

    /// Checks that `off` heads a live, allocated node of this list.
    ///
    /// `off` must leave room for a header inside the arena.
    pub fn validate(&self, off: Offset) -> Result<Node, Rejected> {
        if off % NODE_ALIGN != 0 {
            return Err(Rejected::Misaligned);
        }
        let node = self.node(off);
        if !node.is_valid() {
            return Err(Rejected::Marker);
        }
        if node.is_free() {
            return Err(Rejected::DoubleFree);
        }
        let end = off as u64 + node.size as u64;
        if node.size < NODE_SIZE || end > self.total as u64 {
            return Err(Rejected::Size);
        }

        match node.prev() {
            None if off != HEAD => return Err(Rejected::Links),
            None => {}
            Some(p) => {
                if p >= off || p % NODE_ALIGN != 0 || self.node(p).next != off {
                    return Err(Rejected::Links);
                }
            }
        }
        match node.next() {
            None if end != self.total as u64 => return Err(Rejected::Links),
            None => {}
            Some(n) => {
                if n as u64 != end || end + NODE_SIZE as u64 > self.total as u64 {
                    return Err(Rejected::Links);
                }
                if self.node(n).prev != off {
                    return Err(Rejected::Links);
                }
            }
        }
        Ok(node)
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            cur: Some(HEAD),
        }
    }

    pub fn snapshot(&self) -> Vec<NodeInfo> {
        self.iter()
            .map(|(offset, node)| NodeInfo {
                offset,
                size: node.size,
                free: node.is_free(),
            })
            .collect()
    }

    /// Walks the list and verifies every structural and accounting invariant.
    pub fn check(&self, used: Size) -> Result<(), Violation> {
        let total = self.total;
        let mut expected: Offset = HEAD;
        let mut covered: u64 = 0;
        let mut counted: u64 = 0;
        let mut prev: Option<(Offset, Node)> = None;
        let mut cur = Some(HEAD);

        while let Some(off) = cur {
            if off != expected {
                return Err(Violation::Gap { offset: off, expected });
            }
            if off as u64 + NODE_SIZE as u64 > total as u64 {
                return Err(Violation::Partition { covered, total });
            }

            let node = self.node(off);
            if !node.is_valid() {
                return Err(Violation::MissingMarker { offset: off });
            }
            if node.size < NODE_SIZE || off as u64 + node.size as u64 > total as u64 {
                return Err(Violation::BadSize {
                    offset: off,
                    size: node.size,
                });
            }
            if node.prev() != prev.map(|(p, _)| p) {
                return Err(Violation::BrokenLink { offset: off });
            }
            if let Some((p, pn)) = prev {
                if pn.is_free() && node.is_free() {
                    return Err(Violation::AdjacentFree { offset: p });
                }
            }

            covered += node.size as u64;
            if !node.is_free() {
                counted += node.size as u64;
            }
            expected = off + node.size;
            prev = Some((off, node));
            cur = node.next();
        }

        if covered != total as u64 {
            return Err(Violation::Partition { covered, total });
        }
        if counted != used as u64 {
            return Err(Violation::Accounting {
                counted,
                recorded: used,
            });
        }
        Ok(())
    }
}

pub(crate) struct Iter<'a> {
    list: &'a List,
    cur: Option<Offset>,
}

impl Iterator for Iter<'_> {
    type Item = (Offset, Node);

    fn next(&mut self) -> Option<Self::Item> {
        let off = self.cur?;
        let node = self.list.node(off);
        self.cur = node.next();
        Some((off, node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::{HeapBackend, Region};

    const TOTAL: Size = 1024;

    fn fresh() -> (Region<HeapBackend>, List) {
        let region = Region::map(HeapBackend, TOTAL).expect("should map");
        let mut list = unsafe { List::new(region.base(), region.size()) };
        list.install();
        (region, list)
    }

    fn take(list: &mut List, target: Size) -> (Offset, Size) {
        let off = list.find_fit(target).expect("should fit");
        let size = list.split(off, target).expect("should split");
        list.set_free(off, false);
        (off, size)
    }

    fn release(list: &mut List, off: Offset) -> Joined {
        list.set_free(off, true);
        list.join(off)
    }

    fn used(list: &List) -> Size {
        list.iter()
            .filter(|(_, n)| !n.is_free())
            .map(|(_, n)| n.size)
            .sum()
    }

    #[test]
    fn install_whole() {
        let (_region, list) = fresh();
        let nodes = list.snapshot();
        assert_eq!(
            nodes,
            [NodeInfo {
                offset: 0,
                size: TOTAL,
                free: true
            }]
        );
        list.check(0).unwrap();
    }

    #[test]
    fn split_links_remainder() {
        let (_region, mut list) = fresh();
        let (a, size) = take(&mut list, 32);
        assert_eq!((a, size), (0, 32));
        let (b, _) = take(&mut list, 80);
        assert_eq!(b, 32);

        let head = list.node(a);
        let mid = list.node(b);
        let tail = list.node(112);
        assert_eq!(head.next(), Some(b));
        assert_eq!(mid.prev(), Some(a));
        assert_eq!(mid.next(), Some(112));
        assert_eq!(tail.prev(), Some(b));
        assert_eq!(tail.size, TOTAL - 112);
        assert!(tail.is_free() && tail.is_valid());
        list.check(used(&list)).unwrap();
    }

    #[test]
    fn split_inside_list_relinks_successor() {
        let (_region, mut list) = fresh();
        let (a, _) = take(&mut list, 272);
        let (b, _) = take(&mut list, 32);
        // free `a` and carve a smaller block out of it
        assert_eq!(release(&mut list, a), Joined::Alone);
        let (c, size) = take(&mut list, 48);
        assert_eq!((c, size), (0, 48));

        let rem = list.node(48);
        assert_eq!(rem.size, 272 - 48);
        assert_eq!(rem.next(), Some(b));
        assert_eq!(list.node(b).prev(), Some(48));
        list.check(used(&list)).unwrap();
    }

    #[test]
    fn narrow_remainder_is_absorbed() {
        let (_region, mut list) = fresh();
        // leaves exactly 8 bytes, less than one header
        let (off, size) = take(&mut list, TOTAL - 8);
        assert_eq!((off, size), (0, TOTAL));
        assert_eq!(list.node(off).next(), None);
        list.check(TOTAL).unwrap();
        assert_eq!(list.find_fit(NODE_SIZE), None);
    }

    #[test]
    fn exact_fit_leaves_no_remainder() {
        let (_region, mut list) = fresh();
        let (_, size) = take(&mut list, TOTAL);
        assert_eq!(size, TOTAL);
        assert_eq!(list.snapshot().len(), 1);
    }

    #[test]
    fn split_too_small() {
        let (_region, mut list) = fresh();
        assert_eq!(
            list.split(HEAD, TOTAL + 16),
            Err(Infeasible { available: TOTAL })
        );
        list.check(0).unwrap();
    }

    #[test]
    fn join_cases() {
        let (_region, mut list) = fresh();
        let (a, _) = take(&mut list, 32);
        let (b, _) = take(&mut list, 272);
        let (c, _) = take(&mut list, 80);
        let (d, _) = take(&mut list, 32);

        // a: no free neighbour
        assert_eq!(release(&mut list, a), Joined::Alone);
        // c: successor d is allocated, predecessor b is allocated
        assert_eq!(release(&mut list, c), Joined::Alone);
        // b: both neighbours free
        assert_eq!(release(&mut list, b), Joined::Both);
        assert_eq!(list.node(a).size, 32 + 272 + 80);
        assert!(!list.node(b).is_valid());
        assert!(!list.node(c).is_valid());
        list.check(used(&list)).unwrap();

        // d: both free again, then everything collapses
        assert_eq!(release(&mut list, d), Joined::Both);
        assert_eq!(list.snapshot().len(), 1);
        list.check(0).unwrap();
    }

    #[test]
    fn join_prev_and_next() {
        let (_region, mut list) = fresh();
        let (a, _) = take(&mut list, 32);
        let (b, _) = take(&mut list, 32);
        let (c, _) = take(&mut list, 32);

        assert_eq!(release(&mut list, a), Joined::Alone);
        assert_eq!(release(&mut list, b), Joined::Prev);
        assert_eq!(list.node(a).next(), Some(c));
        assert_eq!(list.node(c).prev(), Some(a));
        // c has a..b before it and the tail remainder after it
        assert_eq!(release(&mut list, c), Joined::Both);
        list.check(0).unwrap();

        let (x, _) = take(&mut list, 32);
        let (_, _) = take(&mut list, 32);
        assert_eq!(release(&mut list, x), Joined::Alone);
        let (y, _) = take(&mut list, 32);
        assert_eq!(y, x);
    }

    #[test]
    fn join_next_only() {
        let (_region, mut list) = fresh();
        let (a, _) = take(&mut list, 32);
        let (b, _) = take(&mut list, 32);
        assert_eq!(release(&mut list, b), Joined::Next);
        assert_eq!(list.node(b).size, TOTAL - 32);
        assert_eq!(release(&mut list, a), Joined::Next);
        list.check(0).unwrap();
    }

    #[test]
    fn validate_rejects() {
        let (_region, mut list) = fresh();
        let (a, _) = take(&mut list, 32);
        let (b, _) = take(&mut list, 32);

        assert!(list.validate(a).is_ok());
        assert!(list.validate(b).is_ok());
        assert_eq!(list.validate(a + 2), Err(Rejected::Misaligned));
        // payload of `a` is zeroed memory
        assert_eq!(list.validate(a + NODE_SIZE), Err(Rejected::Marker));
        // the free tail remainder
        assert_eq!(list.validate(64), Err(Rejected::DoubleFree));

        assert_eq!(release(&mut list, b), Joined::Next);
        assert_eq!(list.validate(b), Err(Rejected::DoubleFree));
        // the old tail header was absorbed into `b`
        assert_eq!(list.validate(64), Err(Rejected::Marker));
    }

    #[test]
    fn validate_forged_header() {
        let (_region, mut list) = fresh();
        let (a, _) = take(&mut list, 256 + NODE_SIZE);
        // a plausible header inside a's payload
        let mut forged = list.node(a);
        forged.size = 32;
        forged.prev = a;
        list.write(a + 64, forged);
        assert_eq!(list.validate(a + 64), Err(Rejected::Links));
    }

    #[test]
    fn check_reports_adjacent_free() {
        let (_region, mut list) = fresh();
        let (a, _) = take(&mut list, 32);
        // flip the flag without joining
        list.update(a, |n| n.set_free(true));
        assert_eq!(list.check(0), Err(Violation::AdjacentFree { offset: a }));
    }

    #[test]
    fn check_reports_accounting() {
        let (_region, mut list) = fresh();
        take(&mut list, 32);
        assert_eq!(
            list.check(0),
            Err(Violation::Accounting {
                counted: 32,
                recorded: 0
            })
        );
    }
}
