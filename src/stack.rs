use core::{marker::PhantomData, ptr};

use crate::anchor::Anchor;
use crate::node::Node;
use crate::sync::Ordering;

/// An intrusive, lock-free LIFO stack.
///
/// The stack links caller-owned [`Node`]s together through their `next` word
/// and never allocates. Nodes are borrowed for `'a`, so they are guaranteed to
/// outlive the stack and every reference it hands back.
///
/// ## How it works
///
/// `push` is a classic Treiber splice: read the head, point the node at it and
/// CAS the anchor over to the node.
///
/// `pop` does not use the plain "CAS head to head.next" step, which is exposed
/// to ABA when the head is popped and pushed again between the read of its
/// successor and the CAS. Instead it *claims* the anchor by swapping in a
/// marker, reads the successor while no one else can touch the chain, then
/// stores the successor back. Concurrent pops and pushes that meet the marker
/// back off until it is gone, which takes one load and one store.
///
/// ## Example
///
/// ```
/// use tether::{AtomicStack, Node};
///
/// let a = Node::new("a");
/// let b = Node::new("b");
///
/// let stack = AtomicStack::new();
/// stack.push(&a);
/// stack.push(&b);
///
/// assert_eq!(stack.pop().map(Node::payload), Some(&"b"));
/// assert_eq!(stack.pop().map(Node::payload), Some(&"a"));
/// assert!(stack.pop().is_none());
/// ```
pub struct AtomicStack<'a, T> {
    anchor: Anchor<T>,
    _nodes: PhantomData<&'a Node<T>>,
}

impl<T> Default for AtomicStack<'_, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T> AtomicStack<'a, T> {
    /// Creates a new, empty stack.
    #[cfg(not(feature = "loom"))]
    pub const fn new() -> Self {
        Self {
            anchor: Anchor::new(),
            _nodes: PhantomData,
        }
    }

    /// Creates a new, empty stack.
    #[cfg(feature = "loom")]
    pub fn new() -> Self {
        Self {
            anchor: Anchor::new(),
            _nodes: PhantomData,
        }
    }

    /// Pushes `node` on top of the stack.
    ///
    /// The node must not currently be linked into any stack or queue.
    pub fn push(&self, node: &'a Node<T>) {
        self.anchor.push(node);
    }

    /// Removes and returns the most recently pushed node.
    pub fn pop(&self) -> Option<&'a Node<T>> {
        let head = self.anchor.claim()?;
        // SAFETY: every pointer in the chain came from a `&'a Node<T>` given
        // to `push`, and the claim keeps other threads away from the head.
        let head: &'a Node<T> = unsafe { head.as_ref() };

        self.anchor.release(head.next.load(Ordering::Relaxed));
        head.unlink();
        Some(head)
    }

    /// Detaches every node at once, yielding them newest first.
    pub fn drain(&self) -> Drain<'a, T> {
        match self.anchor.claim() {
            Some(head) => {
                self.anchor.release(ptr::null_mut());
                // SAFETY: as in `pop`; the detached chain is now ours alone.
                Drain(Some(unsafe { head.as_ref() }))
            }
            None => Drain(None),
        }
    }

    /// Checks if the stack is empty.
    pub fn is_empty(&self) -> bool {
        self.anchor.is_empty()
    }
}

impl<T> Drop for AtomicStack<'_, T> {
    fn drop(&mut self) {
        self.drain();
    }
}

/// A draining iterator for [`AtomicStack`].
///
/// This struct is created by [`AtomicStack::drain`]. Nodes left in it when it
/// is dropped are unlinked, so they can be pushed again.
pub struct Drain<'a, T>(Option<&'a Node<T>>);

impl<'a, T> Iterator for Drain<'a, T> {
    type Item = &'a Node<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.0.take()?;
        // SAFETY: the chain was detached by `drain` and every node lives for `'a`.
        self.0 = unsafe { node.next.load(Ordering::Relaxed).as_ref() };
        node.unlink();
        Some(node)
    }
}

impl<T> Drop for Drain<'_, T> {
    fn drop(&mut self) {
        for _ in self.by_ref() {}
    }
}
