//! Length-prefixed record framing.
//!
//! Wire layout: a little-endian `u32` length N followed by exactly N payload
//! bytes. N = 0 is a legal, empty frame. Codecs layered over these must
//! preserve the layout exactly and must not coalesce frames.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::io::buffer::SharedBuffer;
use crate::io::channel::Channel;
use crate::io::reader::{read_exactly, Reader};
use crate::io::writer::Writer;

/// Turns a byte reader into a frame reader.
///
/// A single `read` never crosses a frame boundary: the caller sees at most
/// the remainder of the current frame, and a larger destination simply stops
/// at the frame's end. A zero-length frame reads as 0 bytes while consuming
/// its prefix. Any error from the underlying reader resets the frame
/// counters, abandoning the partial frame.
pub struct SizeDeclarativeReader<R> {
    source: R,
    read_size: u32,
    total_size: u32,
}

impl<R: Reader> SizeDeclarativeReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            source,
            read_size: 0,
            total_size: 0,
        }
    }

    pub fn into_inner(self) -> R {
        self.source
    }

    async fn read_frame_size(&mut self) -> Result<()> {
        let mut prefix = SharedBuffer::new();
        if let Err(error) = read_exactly(&mut self.source, &mut prefix, 4).await {
            self.read_size = 0;
            self.total_size = 0;
            return Err(error);
        }
        self.total_size = u32::from_le_bytes(
            prefix.as_slice().try_into().expect("four byte prefix"),
        );
        self.read_size = 0;
        Ok(())
    }
}

#[async_trait]
impl<R: Reader> Reader for SizeDeclarativeReader<R> {
    fn poll(&self) -> bool {
        false
    }

    async fn read(&mut self, destination: &mut SharedBuffer) -> Result<usize> {
        self.read_at_most(destination, usize::MAX).await
    }

    async fn read_at_most(
        &mut self,
        destination: &mut SharedBuffer,
        mut size: usize,
    ) -> Result<usize> {
        if self.read_size == self.total_size {
            self.read_frame_size().await?;
        }
        let mut appended = 0;
        while size > 0 && self.read_size != self.total_size {
            let remaining = (self.total_size - self.read_size) as usize;
            match self
                .source
                .read_at_most(destination, size.min(remaining))
                .await
            {
                Ok(count) => {
                    appended += count;
                    self.read_size += count as u32;
                    size -= count;
                }
                Err(error) => {
                    self.read_size = 0;
                    self.total_size = 0;
                    return Err(error);
                }
            }
        }
        Ok(appended)
    }
}

/// Turns a byte writer into a frame writer: every `write` emits one frame,
/// prefix and payload in a single underlying call.
pub struct SizeDeclarativeWriter<W> {
    destination: W,
}

impl<W: Writer> SizeDeclarativeWriter<W> {
    pub fn new(destination: W) -> Self {
        Self { destination }
    }

    pub fn into_inner(self) -> W {
        self.destination
    }
}

#[async_trait]
impl<W: Writer> Writer for SizeDeclarativeWriter<W> {
    async fn write(&self, data: &[u8]) -> Result<()> {
        let size = u32::try_from(data.len())
            .map_err(|_| Error::NotSupported("frame exceeds u32 length prefix"))?;
        let mut frame = SharedBuffer::with_capacity(4 + data.len());
        frame.append(size.to_le_bytes());
        frame.append(data);
        self.destination.write(frame.as_slice()).await
    }
}

/// Recomposes a channel with its reader and writer framed, keeping the inner
/// identifier and connection.
pub fn frame_channel<I, C, R: Reader, W: Writer>(
    channel: Channel<I, C, R, W>,
) -> Channel<I, C, SizeDeclarativeReader<R>, SizeDeclarativeWriter<W>> {
    let (identifier, connection, reader, writer) = channel.into_parts();
    Channel::new(
        identifier,
        connection,
        SizeDeclarativeReader::new(reader),
        SizeDeclarativeWriter::new(writer),
    )
}
