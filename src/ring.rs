use core::{fmt, mem::size_of};

/// Size of the length header in front of every record.
pub const HEADER_LEN: usize = size_of::<usize>();

/// Header value telling the reader to continue at offset 0.
const SKIP: usize = 0;

/// The ring has no room for the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Full;

impl fmt::Display for Full {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ring is full")
    }
}

impl core::error::Error for Full {}

/// Why a record could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadError {
    /// There is no record to read.
    Empty,
    /// The output buffer is shorter than the oldest record. The record stays
    /// in the ring.
    BufferTooSmall { needed: usize },
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadError::Empty => f.write_str("ring is empty"),
            ReadError::BufferTooSmall { needed } => {
                write!(f, "output buffer too small, record needs {needed} bytes")
            }
        }
    }
}

impl core::error::Error for ReadError {}

/// A FIFO of variable-length byte records in a caller-supplied buffer.
///
/// Every record is stored as a native-endian `usize` length header followed by
/// the payload. A record is never split across the end of the buffer: when
/// the tail is too short, the writer leaves a zero header there (if one fits)
/// and starts over at offset 0, and the reader follows the same rule.
///
/// The ring is not synchronized; see [`BlockingByteRing`] for the shared
/// version.
///
/// ```
/// use tether::ByteRing;
///
/// let mut buffer = [0u8; 64];
/// let mut ring = ByteRing::new(&mut buffer);
/// ring.write(b"hello").unwrap();
///
/// let mut out = [0u8; 16];
/// let n = ring.read(&mut out).unwrap();
/// assert_eq!(&out[..n], b"hello");
/// assert!(ring.is_empty());
/// ```
///
/// [`BlockingByteRing`]: crate::BlockingByteRing
pub struct ByteRing<'a> {
    data: &'a mut [u8],
    write: usize,
    /// Offset of the oldest record's header, `None` when the ring is empty.
    read: Option<usize>,
    len: usize,
}

impl<'a> ByteRing<'a> {
    /// Creates an empty ring over `data`.
    ///
    /// The ring never allocates; the buffer is borrowed for its lifetime.
    pub fn new(data: &'a mut [u8]) -> Self {
        debug_assert!(
            data.len() > HEADER_LEN,
            "ring buffer must hold at least one header and one byte"
        );
        Self {
            data,
            write: 0,
            read: None,
            len: 0,
        }
    }

    /// Size of the backing buffer in bytes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Largest payload an empty ring can hold.
    pub fn max_record_len(&self) -> usize {
        self.data.len().saturating_sub(HEADER_LEN)
    }

    /// Number of records stored.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Checks if the ring holds no records.
    pub fn is_empty(&self) -> bool {
        self.read.is_none()
    }

    /// Drops every record.
    pub fn clear(&mut self) {
        self.read = None;
        self.write = 0;
        self.len = 0;
    }

    /// Appends a copy of `data` as one record.
    ///
    /// # Panics
    ///
    /// Panics if `data` is empty.
    pub fn write(&mut self, data: &[u8]) -> Result<(), Full> {
        let at = self.reserve(data.len())?;
        self.data[at..at + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Appends a record of `len` bytes and returns it for the caller to fill.
    ///
    /// The record is committed right away; whatever the caller leaves in the
    /// slice is what readers get.
    ///
    /// # Panics
    ///
    /// Panics if `len` is zero.
    pub fn allocate(&mut self, len: usize) -> Result<&mut [u8], Full> {
        let at = self.reserve(len)?;
        Ok(&mut self.data[at..at + len])
    }

    /// Appends a copy of `data`, evicting the oldest records until it fits.
    ///
    /// Returns how many records were evicted.
    ///
    /// # Panics
    ///
    /// Panics if `data` is empty or longer than [`max_record_len`].
    ///
    /// [`max_record_len`]: ByteRing::max_record_len
    pub fn overwrite(&mut self, data: &[u8]) -> usize {
        assert!(
            data.len() <= self.max_record_len(),
            "record of {} bytes can never fit in a {}-byte ring",
            data.len(),
            self.capacity()
        );

        let mut evicted = 0;
        loop {
            match self.write(data) {
                Ok(()) => break,
                Err(Full) => {
                    self.discard_front();
                    evicted += 1;
                }
            }
        }
        if evicted > 0 {
            tracing::debug!(evicted, len = data.len(), "ring overwrite evicted records");
        }
        evicted
    }

    /// Moves the oldest record into `out` and returns its length.
    pub fn read(&mut self, out: &mut [u8]) -> Result<usize, ReadError> {
        let len = self.peek(out)?;
        self.discard_front();
        Ok(len)
    }

    /// Copies the oldest record into `out` without removing it.
    pub fn peek(&self, out: &mut [u8]) -> Result<usize, ReadError> {
        let record = self.peek_slice().ok_or(ReadError::Empty)?;
        let dst = out
            .get_mut(..record.len())
            .ok_or(ReadError::BufferTooSmall {
                needed: record.len(),
            })?;
        dst.copy_from_slice(record);
        Ok(record.len())
    }

    /// Borrows the oldest record in place.
    pub fn peek_slice(&self) -> Option<&[u8]> {
        let read = self.read?;
        let at = read + HEADER_LEN;
        Some(&self.data[at..at + self.header_at(read)])
    }

    /// Removes the oldest record without copying it out.
    ///
    /// Returns `false` if the ring was empty.
    pub fn discard_front(&mut self) -> bool {
        let Some(read) = self.read else {
            return false;
        };

        self.len -= 1;
        if self.len == 0 {
            debug_assert_eq!(read + HEADER_LEN + self.header_at(read), self.write);
            self.clear();
            return true;
        }

        let next = read + HEADER_LEN + self.header_at(read);
        self.read = Some(if self.is_skip(next) { 0 } else { next });
        true
    }

    /// Finds room for a record of `len` bytes, writes its header and returns
    /// the payload offset.
    fn reserve(&mut self, len: usize) -> Result<usize, Full> {
        assert!(len > 0, "zero-length records are not supported");
        debug_assert!(
            len <= self.max_record_len(),
            "record of {len} bytes can never fit in a {}-byte ring",
            self.capacity()
        );

        let frame = HEADER_LEN.checked_add(len).ok_or(Full)?;
        let cap = self.data.len();
        let at = match self.read {
            None if frame <= cap => 0,
            None => return Err(Full),
            // Live records sit in `read..write`; free space is the tail and
            // everything before `read`.
            Some(read) if self.write > read => {
                if cap - self.write >= frame {
                    self.write
                } else if read >= frame {
                    self.mark_skip(self.write);
                    0
                } else {
                    return Err(Full);
                }
            }
            // Wrapped: free space is `write..read`.
            Some(read) if read - self.write >= frame => self.write,
            Some(_) => return Err(Full),
        };

        self.data[at..at + HEADER_LEN].copy_from_slice(&len.to_ne_bytes());
        self.write = at + frame;
        self.read.get_or_insert(at);
        self.len += 1;
        Ok(at + HEADER_LEN)
    }

    fn mark_skip(&mut self, at: usize) {
        if self.data.len() - at >= HEADER_LEN {
            self.data[at..at + HEADER_LEN].copy_from_slice(&SKIP.to_ne_bytes());
        }
    }

    fn is_skip(&self, at: usize) -> bool {
        self.data.len() - at < HEADER_LEN || self.header_at(at) == SKIP
    }

    fn header_at(&self, at: usize) -> usize {
        let mut bytes = [0u8; HEADER_LEN];
        bytes.copy_from_slice(&self.data[at..at + HEADER_LEN]);
        usize::from_ne_bytes(bytes)
    }

    #[cfg(feature = "std")]
    pub(crate) fn record(&self, at: usize, len: usize) -> &[u8] {
        &self.data[at..at + len]
    }

    /// Payload bytes of a record returned by `reserve_record`.
    #[cfg(feature = "std")]
    pub(crate) fn record_mut(&mut self, at: usize, len: usize) -> &mut [u8] {
        &mut self.data[at..at + len]
    }

    #[cfg(feature = "std")]
    pub(crate) fn reserve_record(&mut self, len: usize) -> Result<usize, Full> {
        self.reserve(len)
    }
}

impl fmt::Debug for ByteRing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteRing")
            .field("capacity", &self.capacity())
            .field("len", &self.len)
            .field("read", &self.read)
            .field("write", &self.write)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::vec::Vec;

    use super::*;

    fn frames(count: usize, payload: usize) -> usize {
        count * (HEADER_LEN + payload)
    }

    fn read_all(ring: &mut ByteRing<'_>) -> Vec<Vec<u8>> {
        let mut out = [0u8; 64];
        core::iter::from_fn(|| ring.read(&mut out).ok().map(|n| out[..n].to_vec())).collect()
    }

    #[test]
    fn test_round_trip() {
        let mut buffer = [0u8; 64];
        let mut ring = ByteRing::new(&mut buffer);

        ring.write(b"payload").unwrap();
        assert_eq!(ring.len(), 1);

        let mut out = [0u8; 16];
        assert_eq!(ring.read(&mut out), Ok(7));
        assert_eq!(&out[..7], b"payload");
        assert!(ring.is_empty());
        assert_eq!(ring.read(&mut out), Err(ReadError::Empty));
    }

    #[test]
    fn test_five_records_then_full() {
        let mut buffer = vec_of(frames(5, 2));
        let mut ring = ByteRing::new(&mut buffer);

        for record in [b"aa", b"bb", b"cc", b"dd", b"ee"] {
            ring.write(record).unwrap();
        }
        assert_eq!(ring.write(b"ff"), Err(Full));

        let records = read_all(&mut ring);
        assert_eq!(records, [b"aa", b"bb", b"cc", b"dd", b"ee"]);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_overwrite_evicts_oldest() {
        let mut buffer = vec_of(frames(5, 2));
        let mut ring = ByteRing::new(&mut buffer);

        let records: Vec<[u8; 2]> = (0..6u8).map(|i| [b'a' + i; 2]).collect();
        let evicted: usize = records.iter().map(|r| ring.overwrite(r)).sum();
        assert_eq!(evicted, 1);
        assert_eq!(ring.len(), 5);

        assert_eq!(read_all(&mut ring), records[1..]);
    }

    #[test]
    fn test_overwrite_larger_record_evicts_several() {
        let mut buffer = vec_of(frames(4, 4));
        let mut ring = ByteRing::new(&mut buffer);
        for i in 0..4u8 {
            ring.write(&[i; 4]).unwrap();
        }

        let big = [9u8; 4 + HEADER_LEN + 4];
        assert_eq!(ring.overwrite(&big), 2);
        assert_eq!(read_all(&mut ring), [&[2u8; 4][..], &[3u8; 4][..], &big[..]]);
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut buffer = [0u8; 64];
        let mut ring = ByteRing::new(&mut buffer);
        ring.write(b"abc").unwrap();
        ring.write(b"de").unwrap();

        let mut out = [0u8; 8];
        assert_eq!(ring.peek(&mut out), Ok(3));
        assert_eq!(ring.peek_slice(), Some(&b"abc"[..]));
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.read(&mut out), Ok(3));
        assert_eq!(ring.peek_slice(), Some(&b"de"[..]));
    }

    #[test]
    fn test_small_output_buffer() {
        let mut buffer = [0u8; 64];
        let mut ring = ByteRing::new(&mut buffer);
        ring.write(b"abcdef").unwrap();

        let mut out = [0u8; 4];
        assert_eq!(ring.read(&mut out), Err(ReadError::BufferTooSmall { needed: 6 }));
        assert_eq!(ring.peek(&mut out), Err(ReadError::BufferTooSmall { needed: 6 }));
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn test_allocate_fills_in_place() {
        let mut buffer = [0u8; 64];
        let mut ring = ByteRing::new(&mut buffer);

        ring.allocate(4).unwrap().copy_from_slice(b"zero");
        ring.write(b"copy").unwrap();
        assert_eq!(read_all(&mut ring), [b"zero", b"copy"]);
    }

    #[test]
    fn test_wrap_with_skip_marker() {
        // Room for three 4-byte records plus a spare header at the tail.
        let mut buffer = vec_of(frames(3, 4) + HEADER_LEN);
        let mut ring = ByteRing::new(&mut buffer);

        ring.write(b"0000").unwrap();
        ring.write(b"1111").unwrap();
        ring.write(b"2222").unwrap();

        let mut out = [0u8; 8];
        ring.read(&mut out).unwrap();

        // The tail only fits a header, so this record goes to offset 0.
        ring.write(b"3333").unwrap();
        assert_eq!(ring.write(b"4444"), Err(Full));

        assert_eq!(read_all(&mut ring), [b"1111", b"2222", b"3333"]);
    }

    #[test]
    fn test_wrap_without_room_for_marker() {
        let mut buffer = vec_of(frames(3, 4) + 1);
        let mut ring = ByteRing::new(&mut buffer);

        for _ in 0..3 {
            ring.write(b"wxyz").unwrap();
        }
        let mut out = [0u8; 8];
        ring.read(&mut out).unwrap();
        ring.write(b"next").unwrap();

        assert_eq!(read_all(&mut ring), [b"wxyz", b"wxyz", b"next"]);
    }

    #[test]
    fn test_many_wraps_with_mixed_sizes() {
        let mut buffer = vec_of(100);
        let mut ring = ByteRing::new(&mut buffer);
        let mut expected = std::collections::VecDeque::new();
        let mut out = [0u8; 64];

        for i in 0..500usize {
            let record: Vec<u8> = (0..(i % 13) + 1).map(|b| (b + i) as u8).collect();
            while ring.write(&record).is_err() {
                let n = ring.read(&mut out).unwrap();
                assert_eq!(Some(&out[..n]), expected.pop_front().as_deref());
            }
            expected.push_back(record);
            assert_eq!(ring.len(), expected.len());
        }

        assert_eq!(read_all(&mut ring), Vec::from(expected));
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "can never fit"))]
    fn test_oversize_write() {
        let mut buffer = [0u8; 16];
        let mut ring = ByteRing::new(&mut buffer);
        assert_eq!(ring.write(&[1; 16]), Err(Full));
    }

    #[test]
    #[should_panic(expected = "zero-length")]
    fn test_empty_record_panics() {
        let mut buffer = [0u8; 16];
        let mut ring = ByteRing::new(&mut buffer);
        let _ = ring.write(&[]);
    }

    fn vec_of(len: usize) -> Vec<u8> {
        std::vec![0; len]
    }
}
