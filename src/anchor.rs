use core::ptr::{self, NonNull};

use crossbeam_utils::{Backoff, CachePadded};

use crate::node::Node;
use crate::sync::{AtomicPtr, Ordering, snooze};

/// Value held by an anchor while one thread owns its chain.
///
/// Nodes are at least pointer-aligned, so address 1 never names a node.
#[inline]
fn claimed<T>() -> *mut Node<T> {
    ptr::without_provenance_mut(1)
}

/// The root word of a stack or queue.
///
/// It is in one of three states: empty (null), claimed, or pointing at the
/// newest node of the chain. Pushes splice onto it with a CAS. Removals first
/// claim it, which hands the whole chain to one thread until [`release`] is
/// called, so no other thread can unlink or re-push a node the claimer is
/// looking at.
///
/// [`release`]: Anchor::release
pub(crate) struct Anchor<T> {
    next: CachePadded<AtomicPtr<Node<T>>>,
}

impl<T> Anchor<T> {
    #[cfg(not(feature = "loom"))]
    pub(crate) const fn new() -> Self {
        Self {
            next: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
        }
    }

    #[cfg(feature = "loom")]
    pub(crate) fn new() -> Self {
        Self {
            next: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
        }
    }

    /// Splices `node` in front of the chain.
    pub(crate) fn push(&self, node: &Node<T>) {
        node.mark_linked();
        let node_ptr = node.as_ptr();
        let backoff = Backoff::new();

        let mut head = self.next.load(Ordering::Relaxed);
        loop {
            if head == claimed() {
                // A removal owns the chain; its successor is not known yet.
                snooze(&backoff);
                head = self.next.load(Ordering::Relaxed);
                continue;
            }

            node.next.store(head, Ordering::Relaxed);
            match self.next.compare_exchange_weak(
                head,
                node_ptr,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(current) => {
                    head = current;
                    backoff.spin();
                }
            }
        }
    }

    /// Takes exclusive ownership of the chain.
    ///
    /// Returns `None` without claiming anything if the anchor was observed
    /// empty. Otherwise the anchor stays claimed until [`release`] is called,
    /// and the returned head and every node reachable from it may be relinked
    /// freely by the caller.
    ///
    /// [`release`]: Anchor::release
    pub(crate) fn claim(&self) -> Option<NonNull<Node<T>>> {
        let backoff = Backoff::new();
        loop {
            let head = self.next.load(Ordering::Relaxed);
            if head.is_null() {
                return None;
            }
            if head == claimed() {
                snooze(&backoff);
                continue;
            }

            if self
                .next
                .compare_exchange_weak(head, claimed(), Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return NonNull::new(head);
            }
            backoff.spin();
        }
    }

    /// Ends a claim, installing `head` as the new front of the chain.
    pub(crate) fn release(&self, head: *mut Node<T>) {
        debug_assert_eq!(self.next.load(Ordering::Relaxed), claimed());
        self.next.store(head, Ordering::Release);
    }

    /// Whether the chain is empty, waiting out any claim in flight.
    pub(crate) fn is_empty(&self) -> bool {
        let backoff = Backoff::new();
        loop {
            let head = self.next.load(Ordering::Acquire);
            if head != claimed() {
                return head.is_null();
            }
            snooze(&backoff);
        }
    }
}
