use core::{marker::PhantomData, ptr};

use crate::anchor::Anchor;
use crate::node::Node;
use crate::sync::Ordering;

/// An intrusive, lock-free FIFO queue.
///
/// The queue shares its node type and its push path with [`AtomicStack`]: new
/// nodes are spliced in front of the anchor, so the chain is kept newest
/// first. `pop` claims the anchor, walks the chain it now owns down to the
/// oldest node, cuts it off and hands the rest back to the anchor. Pops are
/// serialized by the claim; pushes arriving meanwhile wait for it to end.
///
/// A pop costs a walk over the whole chain, so this suits short queues with
/// many producers, such as hand-off lists between threads.
///
/// ## Example
///
/// ```
/// use tether::{AtomicQueue, Node};
///
/// let nodes = [Node::new(1), Node::new(2), Node::new(3)];
///
/// let queue = AtomicQueue::new();
/// for node in &nodes {
///     queue.push(node);
/// }
///
/// let order: Vec<_> = std::iter::from_fn(|| queue.pop())
///     .map(|node| *node.payload())
///     .collect();
/// assert_eq!(order, [1, 2, 3]);
/// ```
///
/// [`AtomicStack`]: crate::AtomicStack
pub struct AtomicQueue<'a, T> {
    anchor: Anchor<T>,
    _nodes: PhantomData<&'a Node<T>>,
}

impl<T> Default for AtomicQueue<'_, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T> AtomicQueue<'a, T> {
    /// Creates a new, empty queue.
    #[cfg(not(feature = "loom"))]
    pub const fn new() -> Self {
        Self {
            anchor: Anchor::new(),
            _nodes: PhantomData,
        }
    }

    /// Creates a new, empty queue.
    #[cfg(feature = "loom")]
    pub fn new() -> Self {
        Self {
            anchor: Anchor::new(),
            _nodes: PhantomData,
        }
    }

    /// Appends `node` to the back of the queue.
    ///
    /// The node must not currently be linked into any stack or queue.
    pub fn push(&self, node: &'a Node<T>) {
        self.anchor.push(node);
    }

    /// Removes and returns the oldest node.
    pub fn pop(&self) -> Option<&'a Node<T>> {
        let head = self.anchor.claim()?;
        // SAFETY: every pointer in the chain came from a `&'a Node<T>` given
        // to `push`, and the claim gives this thread the whole chain.
        let head: &'a Node<T> = unsafe { head.as_ref() };

        let mut newer: Option<&'a Node<T>> = None;
        let mut oldest = head;
        // SAFETY: as above.
        while let Some(next) = unsafe { oldest.next.load(Ordering::Relaxed).as_ref() } {
            newer = Some(oldest);
            oldest = next;
        }

        match newer {
            Some(newer) => {
                newer.next.store(ptr::null_mut(), Ordering::Relaxed);
                self.anchor.release(head.as_ptr());
            }
            None => self.anchor.release(ptr::null_mut()),
        }
        oldest.unlink();
        Some(oldest)
    }

    /// Checks if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.anchor.is_empty()
    }
}

impl<T> Drop for AtomicQueue<'_, T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use std::{collections::HashMap, vec::Vec};

    use crossbeam_utils::thread;

    use super::*;

    #[test]
    fn test_fifo_order() {
        let nodes: Vec<_> = (0..6).map(Node::new).collect();
        let queue = AtomicQueue::new();
        for node in &nodes {
            queue.push(node);
        }

        let popped: Vec<_> = core::iter::from_fn(|| queue.pop())
            .map(|node| *node.payload())
            .collect();
        assert_eq!(popped, [0, 1, 2, 3, 4, 5]);
        assert!(queue.pop().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_interleaved_push_pop() {
        let nodes: Vec<_> = (0..4).map(Node::new).collect();
        let queue = AtomicQueue::new();

        queue.push(&nodes[0]);
        queue.push(&nodes[1]);
        assert_eq!(queue.pop().map(Node::payload), Some(&0));
        queue.push(&nodes[2]);
        assert_eq!(queue.pop().map(Node::payload), Some(&1));

        // A popped node goes to the back when pushed again.
        let first = queue.pop().unwrap();
        queue.push(&nodes[3]);
        queue.push(first);
        assert_eq!(queue.pop().map(Node::payload), Some(&3));
        assert_eq!(queue.pop().map(Node::payload), Some(&2));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_drop_unlinks_nodes() {
        let nodes: Vec<_> = (0..3).map(Node::new).collect();
        {
            let queue = AtomicQueue::new();
            for node in &nodes {
                queue.push(node);
            }
        }

        let queue = AtomicQueue::new();
        for node in &nodes {
            queue.push(node);
        }
        assert_eq!(queue.pop().map(Node::payload), Some(&0));
    }

    #[test]
    fn test_concurrent_no_loss() {
        const THREADS: usize = 4;
        const PER_THREAD: usize = 300;

        let nodes: Vec<_> = (0..THREADS * PER_THREAD).map(Node::new).collect();
        let queue = AtomicQueue::new();

        let popped: Vec<usize> = thread::scope(|s| {
            for chunk in nodes.chunks(PER_THREAD) {
                let queue = &queue;
                s.spawn(move |_| {
                    for node in chunk {
                        queue.push(node);
                    }
                });
            }

            let consumers: Vec<_> = (0..THREADS)
                .map(|_| {
                    let queue = &queue;
                    s.spawn(move |_| {
                        let mut seen = Vec::new();
                        for _ in 0..PER_THREAD {
                            loop {
                                if let Some(node) = queue.pop() {
                                    seen.push(*node.payload());
                                    break;
                                }
                                std::thread::yield_now();
                            }
                        }
                        seen
                    })
                })
                .collect();
            consumers
                .into_iter()
                .flat_map(|handle| handle.join().unwrap())
                .collect()
        })
        .unwrap();

        let mut popped = popped;
        popped.sort();
        assert_eq!(popped, (0..THREADS * PER_THREAD).collect::<Vec<_>>());
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_per_producer_order() {
        const THREADS: usize = 3;
        const PER_THREAD: usize = 200;

        // Payload is (producer, sequence number).
        let nodes: Vec<_> = (0..THREADS)
            .flat_map(|t| (0..PER_THREAD).map(move |i| Node::new((t, i))))
            .collect();
        let queue = AtomicQueue::new();

        let popped: Vec<(usize, usize)> = thread::scope(|s| {
            for chunk in nodes.chunks(PER_THREAD) {
                let queue = &queue;
                s.spawn(move |_| {
                    for node in chunk {
                        queue.push(node);
                    }
                });
            }

            let mut popped = Vec::new();
            while popped.len() < THREADS * PER_THREAD {
                match queue.pop() {
                    Some(node) => popped.push(*node.payload()),
                    None => std::thread::yield_now(),
                }
            }
            popped
        })
        .unwrap();

        let mut last: HashMap<usize, usize> = HashMap::new();
        for (producer, seq) in popped {
            if let Some(prev) = last.insert(producer, seq) {
                assert!(prev < seq, "producer {producer} reordered: {prev} then {seq}");
            }
        }
    }
}
