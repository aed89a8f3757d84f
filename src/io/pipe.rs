//! An in-memory byte stream.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::io::buffer::SharedBuffer;
use crate::io::reader::Reader;
use crate::io::writer::Writer;
use crate::sync::spin::SpinMutex;
use crate::sync::waitable::WaitableCore;

struct PipeInner {
    buffer: SharedBuffer,
    closed: bool,
}

struct PipeShared {
    inner: SpinMutex<PipeInner>,
    readable: WaitableCore,
}

impl PipeShared {
    fn close(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                return;
            }
            inner.closed = true;
        }
        self.readable.notify_all();
    }
}

/// Creates a unidirectional in-memory byte stream.
///
/// Bytes written to the [`PipedWriter`] become readable from the
/// [`PipedReader`] in order. Closing either end (or dropping the reader)
/// makes the reader drain what is buffered and then report
/// [`Error::EndOfFile`], while writes fail immediately.
pub fn pipe() -> (PipedWriter, PipedReader) {
    let shared = Arc::new(PipeShared {
        inner: SpinMutex::new(PipeInner {
            buffer: SharedBuffer::new(),
            closed: false,
        }),
        readable: WaitableCore::new(),
    });
    (
        PipedWriter {
            shared: Arc::clone(&shared),
        },
        PipedReader { shared },
    )
}

/// The write end of a [`pipe`]. Clones share the stream.
#[derive(Clone)]
pub struct PipedWriter {
    shared: Arc<PipeShared>,
}

impl PipedWriter {
    /// Closes the stream; buffered bytes remain readable.
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.inner.lock().closed
    }
}

#[async_trait]
impl Writer for PipedWriter {
    async fn write(&self, data: &[u8]) -> Result<()> {
        {
            let mut inner = self.shared.inner.lock();
            if inner.closed {
                return Err(Error::EndOfFile);
            }
            inner.buffer.append(data);
        }
        self.shared.readable.notify_one();
        Ok(())
    }
}

/// The read end of a [`pipe`].
pub struct PipedReader {
    shared: Arc<PipeShared>,
}

impl PipedReader {
    /// Closes the stream from the reading side; subsequent writes fail.
    pub fn close(&self) {
        self.shared.close();
    }
}

#[async_trait]
impl Reader for PipedReader {
    fn poll(&self) -> bool {
        !self.shared.inner.lock().buffer.is_empty()
    }

    async fn read(&mut self, destination: &mut SharedBuffer) -> Result<usize> {
        self.read_at_most(destination, usize::MAX).await
    }

    async fn read_at_most(
        &mut self,
        destination: &mut SharedBuffer,
        size: usize,
    ) -> Result<usize> {
        if size == 0 {
            return Ok(0);
        }
        let shared = Arc::clone(&self.shared);
        shared
            .readable
            .wait_until(|| {
                let mut inner = shared.inner.lock();
                if !inner.buffer.is_empty() {
                    let count = size.min(inner.buffer.len());
                    destination.append(&inner.buffer.as_slice()[..count]);
                    inner.buffer.shrink_front(count);
                    return Some(Ok(count));
                }
                if inner.closed {
                    return Some(Err(Error::EndOfFile));
                }
                None
            })
            .await
    }
}

impl Drop for PipedReader {
    fn drop(&mut self) {
        self.shared.close();
    }
}

#[cfg(test)]
mod tests {
    use super::pipe;
    use crate::error::Error;
    use crate::io::buffer::SharedBuffer;
    use crate::io::reader::Reader;
    use crate::io::writer::Writer;
    use crate::routine::block_on;

    #[test]
    fn bytes_flow_in_order() {
        let (writer, mut reader) = pipe();
        block_on(writer.write(b"abc")).expect("write");
        block_on(writer.write(b"def")).expect("write");
        let mut destination = SharedBuffer::new();
        let count = block_on(reader.read(&mut destination)).expect("read");
        assert_eq!(count, 6);
        assert_eq!(destination.as_slice(), b"abcdef");
    }

    #[test]
    fn close_drains_then_eofs() {
        let (writer, mut reader) = pipe();
        block_on(writer.write(b"xy")).expect("write");
        writer.close();
        let mut destination = SharedBuffer::new();
        assert_eq!(
            block_on(reader.read_at_most(&mut destination, 1)).expect("read"),
            1
        );
        assert_eq!(
            block_on(reader.read(&mut destination)).expect("read"),
            1
        );
        assert!(matches!(
            block_on(reader.read(&mut destination)),
            Err(Error::EndOfFile)
        ));
        assert!(matches!(
            block_on(writer.write(b"z")),
            Err(Error::EndOfFile)
        ));
    }

    #[test]
    fn poll_reports_buffered_bytes() {
        let (writer, reader) = pipe();
        assert!(!reader.poll());
        block_on(writer.write(b"1")).expect("write");
        assert!(reader.poll());
    }
}
