use core::{fmt, ptr};

#[cfg(debug_assertions)]
use crate::sync::AtomicBool;
use crate::sync::{AtomicPtr, Ordering};

/// An intrusive link shared by [`AtomicStack`] and [`AtomicQueue`].
///
/// A node pairs the link word used by the structures with a payload owned by
/// the caller. The structures never allocate, move or drop nodes: they only
/// borrow them for as long as they are linked, which is why both are
/// parameterized by the lifetime of the nodes they hold.
///
/// A node may be in at most one chain at a time. Once popped it can be pushed
/// again, into the same structure or another one. Pushing a node that is still
/// linked is a bug in the caller and trips a debug assertion.
///
/// [`AtomicStack`]: crate::AtomicStack
/// [`AtomicQueue`]: crate::AtomicQueue
pub struct Node<T> {
    pub(crate) next: AtomicPtr<Node<T>>,
    #[cfg(debug_assertions)]
    linked: AtomicBool,
    payload: T,
}

impl<T: Default> Default for Node<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Node<T> {
    /// Creates an unlinked node carrying `payload`.
    #[cfg(not(feature = "loom"))]
    pub const fn new(payload: T) -> Self {
        Self {
            next: AtomicPtr::new(ptr::null_mut()),
            #[cfg(debug_assertions)]
            linked: AtomicBool::new(false),
            payload,
        }
    }

    /// Creates an unlinked node carrying `payload`.
    #[cfg(feature = "loom")]
    pub fn new(payload: T) -> Self {
        Self {
            next: AtomicPtr::new(ptr::null_mut()),
            #[cfg(debug_assertions)]
            linked: AtomicBool::new(false),
            payload,
        }
    }

    /// Returns the payload carried by this node.
    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Consumes the node and returns its payload.
    pub fn into_payload(self) -> T {
        self.payload
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut Node<T> {
        ptr::from_ref(self).cast_mut()
    }

    #[inline]
    pub(crate) fn mark_linked(&self) {
        #[cfg(debug_assertions)]
        {
            let was_linked = self.linked.swap(true, Ordering::Relaxed);
            debug_assert!(!was_linked, "node pushed while still linked");
        }
    }

    /// Detaches the node from whatever chain it was in.
    ///
    /// Only the thread that removed the node from its chain may call this.
    #[inline]
    pub(crate) fn unlink(&self) {
        self.next.store(ptr::null_mut(), Ordering::Relaxed);
        #[cfg(debug_assertions)]
        self.linked.store(false, Ordering::Relaxed);
    }
}

impl<T: fmt::Debug> fmt::Debug for Node<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("payload", &self.payload)
            .finish_non_exhaustive()
    }
}
