//! Fixed-capacity receive buffer for a single channel.
//!
//! Holds bytes already pulled from the modem but not yet handed to the
//! channel's reader. Capacity is fixed at construction; callers check
//! [`RxBuffer::free`] before asking the modem for more data.

/// Default channel buffer capacity in bytes.
pub const DEFAULT_RX_CAPACITY: usize = 64;

/// Bounded ring buffer of bytes.
#[derive(Debug, Clone)]
pub struct RxBuffer {
    data: Box<[u8]>,
    head: usize,
    len: usize,
}

impl RxBuffer {
    /// Creates an empty buffer holding at most `capacity` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "channel buffer capacity must be non-zero");
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    /// Total capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of buffered bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if nothing is buffered.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Remaining free space in bytes.
    #[must_use]
    pub fn free(&self) -> usize {
        self.capacity() - self.len
    }

    /// Appends one byte. Returns false, leaving the buffer untouched, when full.
    pub fn put(&mut self, byte: u8) -> bool {
        if self.free() == 0 {
            return false;
        }
        let tail = (self.head + self.len) % self.capacity();
        self.data[tail] = byte;
        self.len += 1;
        true
    }

    /// Moves up to `dst.len()` bytes into `dst`, oldest first.
    ///
    /// Returns the number of bytes copied.
    pub fn get(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.len);
        let cap = self.capacity();

        // At most two contiguous runs: head..end, then 0..rest.
        let first = n.min(cap - self.head);
        dst[..first].copy_from_slice(&self.data[self.head..self.head + first]);
        let rest = n - first;
        dst[first..n].copy_from_slice(&self.data[..rest]);

        self.head = (self.head + n) % cap;
        self.len -= n;
        if self.len == 0 {
            self.head = 0;
        }
        n
    }
}

impl Default for RxBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_RX_CAPACITY)
    }
}
