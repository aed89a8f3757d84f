//! Byte buffers shared across the I/O substrate.

use std::fmt;
use std::sync::Arc;

/// Types that can be lifted bit-identically out of a buffer.
///
/// Extraction uses native byte order; a buffer is byte-identical to the
/// memory it was written from, with no endianness conversion.
pub trait Extract: Sized {
    fn extract_from(bytes: &[u8]) -> Self;
}

macro_rules! impl_extract {
    ($($ty:ty),* $(,)?) => {
        $(impl Extract for $ty {
            fn extract_from(bytes: &[u8]) -> Self {
                const SIZE: usize = std::mem::size_of::<$ty>();
                Self::from_ne_bytes(bytes[..SIZE].try_into().expect("slice length"))
            }
        })*
    };
}

impl_extract!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128, f32, f64);

/// A contiguous, growable byte container with copy-on-write sharing.
///
/// Clones share the underlying allocation; the first mutation through any
/// clone copies it. In-place `write` never grows the buffer — callers grow
/// first.
#[derive(Clone, Default)]
pub struct SharedBuffer {
    data: Arc<Vec<u8>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Arc::new(Vec::with_capacity(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Appends bytes at the end, growing the buffer.
    pub fn append(&mut self, bytes: impl AsRef<[u8]>) {
        Arc::make_mut(&mut self.data).extend_from_slice(bytes.as_ref());
    }

    /// Overwrites bytes in place starting at `offset`. The write must land
    /// entirely within the current size.
    pub fn write(&mut self, offset: usize, bytes: &[u8]) {
        assert!(
            offset + bytes.len() <= self.data.len(),
            "write of {} bytes at offset {offset} exceeds buffer size {}",
            bytes.len(),
            self.data.len()
        );
        Arc::make_mut(&mut self.data)[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Extends the buffer by `size` zero bytes.
    pub fn grow(&mut self, size: usize) {
        let data = Arc::make_mut(&mut self.data);
        let len = data.len();
        data.resize(len + size, 0);
    }

    /// Drops `size` bytes from the back.
    pub fn shrink(&mut self, size: usize) {
        let data = Arc::make_mut(&mut self.data);
        let len = data.len();
        assert!(size <= len, "shrink of {size} bytes exceeds size {len}");
        data.truncate(len - size);
    }

    /// Drops `size` bytes from the front, rebasing the logical start.
    pub fn shrink_front(&mut self, size: usize) {
        let data = Arc::make_mut(&mut self.data);
        assert!(
            size <= data.len(),
            "shrink_front of {size} bytes exceeds size {}",
            data.len()
        );
        data.drain(..size);
    }

    pub fn reserve(&mut self, capacity: usize) {
        Arc::make_mut(&mut self.data).reserve(capacity);
    }

    /// Lifts a `T` out of the buffer at `offset`, bit-identically.
    pub fn extract<T: Extract>(&self, offset: usize) -> T {
        T::extract_from(&self.data[offset..])
    }
}

impl fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedBuffer({} bytes)", self.len())
    }
}

impl PartialEq for SharedBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for SharedBuffer {}

impl AsRef<[u8]> for SharedBuffer {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl From<&[u8]> for SharedBuffer {
    fn from(bytes: &[u8]) -> Self {
        Self {
            data: Arc::new(bytes.to_vec()),
        }
    }
}

impl From<Vec<u8>> for SharedBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self {
            data: Arc::new(bytes),
        }
    }
}

/// A mutable view of the tail of a buffer starting at a fixed offset.
///
/// `shrink_front` on a slice is offset arithmetic, not a copy.
pub struct BufferSlice<'a> {
    buffer: &'a mut SharedBuffer,
    start: usize,
}

impl<'a> BufferSlice<'a> {
    pub fn new(buffer: &'a mut SharedBuffer, start: usize) -> Self {
        assert!(start <= buffer.len(), "slice start exceeds buffer size");
        Self { buffer, start }
    }

    pub fn len(&self) -> usize {
        self.buffer.len() - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer.as_slice()[self.start..]
    }

    pub fn append(&mut self, bytes: impl AsRef<[u8]>) {
        self.buffer.append(bytes);
    }

    pub fn write(&mut self, offset: usize, bytes: &[u8]) {
        self.buffer.write(self.start + offset, bytes);
    }

    pub fn grow(&mut self, size: usize) {
        self.buffer.grow(size);
    }

    pub fn shrink(&mut self, size: usize) {
        self.buffer.shrink(size);
    }

    pub fn shrink_front(&mut self, size: usize) {
        assert!(size <= self.len(), "shrink_front exceeds slice size");
        self.start += size;
    }

    pub fn extract<T: Extract>(&self, offset: usize) -> T {
        self.buffer.extract(self.start + offset)
    }
}

/// A cheap read-only view over any byte container.
#[derive(Clone, Copy)]
pub struct BufferView<'a> {
    bytes: &'a [u8],
}

impl<'a> BufferView<'a> {
    pub fn new(bytes: &'a (impl AsRef<[u8]> + ?Sized)) -> Self {
        Self {
            bytes: bytes.as_ref(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn extract<T: Extract>(&self, offset: usize) -> T {
        T::extract_from(&self.bytes[offset..])
    }
}

impl<'a> From<&'a SharedBuffer> for BufferView<'a> {
    fn from(buffer: &'a SharedBuffer) -> Self {
        Self::new(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::{BufferSlice, BufferView, SharedBuffer};

    #[test]
    fn write_then_extract_is_bit_identical() {
        let mut buffer = SharedBuffer::new();
        buffer.grow(12);
        buffer.write(4, &0x1234_5678u32.to_ne_bytes());
        assert_eq!(buffer.extract::<u32>(4), 0x1234_5678);
        buffer.write(8, &(-7i32).to_ne_bytes());
        assert_eq!(buffer.extract::<i32>(8), -7);
    }

    #[test]
    fn clones_share_until_mutation() {
        let mut original = SharedBuffer::from(b"abc".as_slice());
        let snapshot = original.clone();
        original.append(b"def");
        assert_eq!(original.as_slice(), b"abcdef");
        assert_eq!(snapshot.as_slice(), b"abc");
    }

    #[test]
    fn shrink_front_rebases() {
        let mut buffer = SharedBuffer::from(b"hello world".as_slice());
        buffer.shrink_front(6);
        assert_eq!(buffer.as_slice(), b"world");
        buffer.shrink(1);
        assert_eq!(buffer.as_slice(), b"worl");
    }

    #[test]
    fn slice_appends_land_in_base() {
        let mut buffer = SharedBuffer::from(b"head".as_slice());
        let base = buffer.len();
        let mut slice = BufferSlice::new(&mut buffer, base);
        slice.append(b"tail");
        assert_eq!(slice.as_slice(), b"tail");
        slice.shrink_front(2);
        assert_eq!(slice.as_slice(), b"il");
        assert_eq!(buffer.as_slice(), b"headtail");
        assert_eq!(buffer.extract::<u8>(base), b't');
    }

    #[test]
    fn view_reads_without_copying() {
        let buffer = SharedBuffer::from(vec![1u8, 0, 0, 0]);
        let view = BufferView::from(&buffer);
        assert_eq!(view.extract::<u32>(0), u32::from_ne_bytes([1, 0, 0, 0]));
        assert_eq!(view.len(), 4);
    }

    #[test]
    #[should_panic(expected = "exceeds buffer size")]
    fn in_place_write_never_grows() {
        let mut buffer = SharedBuffer::from(b"ab".as_slice());
        buffer.write(1, &[0, 0]);
    }
}
