//! The byte source contract.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::io::buffer::SharedBuffer;
use crate::sync::mutex::Mutex;

/// A polymorphic byte source.
///
/// Both blocking forms append at least one byte or fail; a return of zero
/// is not part of the contract (end of stream is [`crate::Error::EndOfFile`]).
/// The one documented exception is a zero-length frame from
/// [`crate::io::SizeDeclarativeReader`]. A reader is driven by one routine
/// at a time.
#[async_trait]
pub trait Reader: Send {
    /// Advisory, non-suspending: whether at least one byte can be read
    /// right now.
    fn poll(&self) -> bool;

    /// Appends at least one byte to `destination`, up to the transport's
    /// natural limit, suspending until some arrive. Returns the count
    /// appended.
    async fn read(&mut self, destination: &mut SharedBuffer) -> Result<usize>;

    /// Appends between 1 and `size` bytes to `destination`. Returns the
    /// count appended.
    async fn read_at_most(
        &mut self,
        destination: &mut SharedBuffer,
        size: usize,
    ) -> Result<usize>;
}

/// Repeats `read_at_most` until exactly `size` bytes have been appended.
pub async fn read_exactly<R: Reader + ?Sized>(
    reader: &mut R,
    destination: &mut SharedBuffer,
    mut size: usize,
) -> Result<()> {
    while size > 0 {
        size -= reader.read_at_most(destination, size).await?;
    }
    Ok(())
}

/// A reference-counted, type-erased [`Reader`] handle.
///
/// Clones share the underlying reader; an internal routine mutex keeps the
/// one-reader-at-a-time rule across clones.
#[derive(Clone)]
pub struct ReaderBox {
    inner: Arc<Mutex<Box<dyn Reader>>>,
}

impl ReaderBox {
    pub fn new(reader: impl Reader + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(reader))),
        }
    }
}

#[async_trait]
impl Reader for ReaderBox {
    fn poll(&self) -> bool {
        // A reader busy in another routine has nothing to offer right now.
        match self.inner.try_lock() {
            Some(reader) => reader.poll(),
            None => false,
        }
    }

    async fn read(&mut self, destination: &mut SharedBuffer) -> Result<usize> {
        self.inner.lock().await.read(destination).await
    }

    async fn read_at_most(
        &mut self,
        destination: &mut SharedBuffer,
        size: usize,
    ) -> Result<usize> {
        self.inner.lock().await.read_at_most(destination, size).await
    }
}
