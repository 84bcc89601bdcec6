use std::{
    ops::{Deref, DerefMut},
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex, MutexGuard};
#[cfg(debug_assertions)]
use std::thread::{self, ThreadId};

use crate::ring::{ByteRing, Full, ReadError};

/// A bounded, blocking channel of byte records.
///
/// Wraps a [`ByteRing`] in a mutex so any number of threads can write and
/// read. Blocking operations park the thread until the ring changes: writers
/// wait on `writable`, readers and peekers on `readable`. Every state change
/// wakes the whole class of waiters that might now proceed, and each of them
/// re-checks the ring before going back to sleep.
///
/// Writing can also be split in two with [`write_allocate`]: the returned
/// [`WriteSlot`] keeps the lock while the caller fills the record in place,
/// and [`WriteSlot::flush`] publishes it. No other thread sees the ring in
/// between.
///
/// ## Example
///
/// ```
/// use tether::BlockingByteRing;
///
/// let mut buffer = [0u8; 256];
/// let ring = BlockingByteRing::new(&mut buffer);
///
/// std::thread::scope(|s| {
///     s.spawn(|| ring.write(b"ping"));
///
///     let mut out = [0u8; 16];
///     let n = ring.read(&mut out).unwrap();
///     assert_eq!(&out[..n], b"ping");
/// });
/// ```
///
/// [`write_allocate`]: BlockingByteRing::write_allocate
pub struct BlockingByteRing<'a> {
    ring: Mutex<ByteRing<'a>>,
    readable: Condvar,
    writable: Condvar,
    /// Thread holding an unflushed `WriteSlot`.
    #[cfg(debug_assertions)]
    pending_flush: Mutex<Option<ThreadId>>,
}

impl<'a> BlockingByteRing<'a> {
    /// Creates an empty ring over `buffer`.
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self {
            ring: Mutex::new(ByteRing::new(buffer)),
            readable: Condvar::new(),
            writable: Condvar::new(),
            #[cfg(debug_assertions)]
            pending_flush: Mutex::new(None),
        }
    }

    /// Appends `data`, waiting for room if the ring is full.
    ///
    /// # Panics
    ///
    /// Panics if `data` is empty or could never fit in the ring.
    pub fn write(&self, data: &[u8]) {
        let mut ring = self.lock();
        assert_fits(&ring, data.len());
        self.block_on(&self.writable, &mut ring, "write", |ring| {
            ring.write(data).ok()
        });
        self.readable.notify_all();
    }

    /// Like [`write`](Self::write), but gives up after `timeout`.
    pub fn write_timeout(&self, data: &[u8], timeout: Duration) -> Result<(), Full> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.write(data);
            return Ok(());
        };
        let mut ring = self.lock();
        assert_fits(&ring, data.len());
        self.block_until(&self.writable, &mut ring, deadline, "write", |ring| {
            ring.write(data).ok()
        })
        .ok_or(Full)?;
        self.readable.notify_all();
        Ok(())
    }

    /// Appends `data` if there is room right now.
    pub fn write_try(&self, data: &[u8]) -> Result<(), Full> {
        let mut ring = self.lock();
        ring.write(data)?;
        self.readable.notify_all();
        Ok(())
    }

    /// Appends `data`, evicting the oldest records to make room.
    ///
    /// Returns how many records were evicted.
    pub fn overwrite(&self, data: &[u8]) -> usize {
        let mut ring = self.lock();
        let evicted = ring.overwrite(data);
        self.readable.notify_all();
        evicted
    }

    /// Reserves a record of `len` bytes, waiting for room if the ring is full.
    ///
    /// The ring stays locked until the returned slot is flushed.
    ///
    /// # Panics
    ///
    /// Panics if `len` is zero or could never fit in the ring.
    pub fn write_allocate(&self, len: usize) -> WriteSlot<'_, 'a> {
        let mut ring = self.lock();
        assert_fits(&ring, len);
        let at = self.block_on(&self.writable, &mut ring, "write_allocate", |ring| {
            ring.reserve_record(len).ok()
        });
        self.slot(ring, at, len)
    }

    /// Reserves a record of `len` bytes if there is room right now.
    pub fn write_allocate_try(&self, len: usize) -> Result<WriteSlot<'_, 'a>, Full> {
        let mut ring = self.lock();
        let at = ring.reserve_record(len)?;
        Ok(self.slot(ring, at, len))
    }

    /// Moves the oldest record into `out`, waiting for one if the ring is
    /// empty.
    ///
    /// Fails only with [`ReadError::BufferTooSmall`].
    pub fn read(&self, out: &mut [u8]) -> Result<usize, ReadError> {
        let mut ring = self.lock();
        let len = self.block_on(&self.readable, &mut ring, "read", |ring| {
            unless_empty(ring.read(out))
        })?;
        self.writable.notify_all();
        Ok(len)
    }

    /// Like [`read`](Self::read), but gives up with [`ReadError::Empty`]
    /// after `timeout`.
    pub fn read_timeout(&self, out: &mut [u8], timeout: Duration) -> Result<usize, ReadError> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.read(out);
        };
        let mut ring = self.lock();
        let len = self
            .block_until(&self.readable, &mut ring, deadline, "read", |ring| {
                unless_empty(ring.read(out))
            })
            .unwrap_or(Err(ReadError::Empty))?;
        self.writable.notify_all();
        Ok(len)
    }

    /// Moves the oldest record into `out` if there is one.
    pub fn read_try(&self, out: &mut [u8]) -> Result<usize, ReadError> {
        let mut ring = self.lock();
        let len = ring.read(out)?;
        self.writable.notify_all();
        Ok(len)
    }

    /// Copies the oldest record into `out` without removing it, waiting for
    /// one if the ring is empty.
    pub fn peek(&self, out: &mut [u8]) -> Result<usize, ReadError> {
        let mut ring = self.lock();
        self.block_on(&self.readable, &mut ring, "peek", |ring| {
            unless_empty(ring.peek(out))
        })
    }

    /// Copies the oldest record into `out` without removing it, if there is
    /// one.
    pub fn peek_try(&self, out: &mut [u8]) -> Result<usize, ReadError> {
        self.lock().peek(out)
    }

    /// Checks if the ring holds no records.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of records stored.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Size of the backing buffer in bytes.
    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    fn lock(&self) -> MutexGuard<'_, ByteRing<'a>> {
        #[cfg(debug_assertions)]
        debug_assert_ne!(
            *self.pending_flush.lock(),
            Some(thread::current().id()),
            "ring used again before the pending write slot was flushed"
        );
        self.ring.lock()
    }

    /// Retries `attempt` until it yields a value, parking on `cond` in
    /// between.
    fn block_on<T>(
        &self,
        cond: &Condvar,
        ring: &mut MutexGuard<'_, ByteRing<'a>>,
        op: &'static str,
        mut attempt: impl FnMut(&mut ByteRing<'a>) -> Option<T>,
    ) -> T {
        loop {
            if let Some(value) = attempt(&mut **ring) {
                return value;
            }
            tracing::trace!(op, "ring operation blocked");
            cond.wait(ring);
            tracing::trace!(op, "ring operation woke up");
        }
    }

    /// Like `block_on`, but makes one last attempt at `deadline` and returns
    /// `None` if that fails too.
    fn block_until<T>(
        &self,
        cond: &Condvar,
        ring: &mut MutexGuard<'_, ByteRing<'a>>,
        deadline: Instant,
        op: &'static str,
        mut attempt: impl FnMut(&mut ByteRing<'a>) -> Option<T>,
    ) -> Option<T> {
        loop {
            if let Some(value) = attempt(&mut **ring) {
                return Some(value);
            }
            tracing::trace!(op, "ring operation blocked");
            if cond.wait_until(ring, deadline).timed_out() {
                tracing::trace!(op, "ring operation timed out");
                return attempt(&mut **ring);
            }
        }
    }

    fn slot<'r>(
        &'r self,
        ring: MutexGuard<'r, ByteRing<'a>>,
        at: usize,
        len: usize,
    ) -> WriteSlot<'r, 'a> {
        #[cfg(debug_assertions)]
        {
            let mut pending = self.pending_flush.lock();
            debug_assert!(pending.is_none(), "write slot allocated twice without flush");
            *pending = Some(thread::current().id());
        }
        WriteSlot {
            owner: self,
            ring,
            at,
            len,
            flushed: false,
        }
    }
}

impl Drop for BlockingByteRing<'_> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        debug_assert!(
            self.pending_flush.get_mut().is_none(),
            "ring dropped with an unflushed write slot"
        );
    }
}

fn assert_fits(ring: &ByteRing<'_>, len: usize) {
    assert!(
        len <= ring.max_record_len(),
        "record of {len} bytes can never fit in a {}-byte ring",
        ring.capacity()
    );
}

/// Maps an empty ring to `None`, the one read failure worth waiting on.
fn unless_empty(result: Result<usize, ReadError>) -> Option<Result<usize, ReadError>> {
    match result {
        Err(ReadError::Empty) => None,
        result => Some(result),
    }
}

/// A record reserved by [`BlockingByteRing::write_allocate`], still locked.
///
/// Dereferences to the record's bytes. Call [`flush`](WriteSlot::flush) once
/// they are filled in; until then every other ring operation waits. Dropping
/// the slot without flushing trips a debug assertion, and publishes the record
/// as is in release builds.
pub struct WriteSlot<'r, 'a> {
    owner: &'r BlockingByteRing<'a>,
    ring: MutexGuard<'r, ByteRing<'a>>,
    at: usize,
    len: usize,
    flushed: bool,
}

impl WriteSlot<'_, '_> {
    /// Publishes the record and unlocks the ring.
    pub fn flush(mut self) {
        self.flushed = true;
    }
}

impl Deref for WriteSlot<'_, '_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.ring.record(self.at, self.len)
    }
}

impl DerefMut for WriteSlot<'_, '_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.ring.record_mut(self.at, self.len)
    }
}

impl Drop for WriteSlot<'_, '_> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        {
            *self.owner.pending_flush.lock() = None;
        }
        self.owner.readable.notify_all();
        debug_assert!(
            self.flushed || std::thread::panicking(),
            "write slot dropped without flush"
        );
    }
}
