//! The four-part channel bundle.

use std::fmt;
use std::sync::Arc;

use crate::io::connection::{Connection, ConnectionBox};
use crate::io::reader::{Reader, ReaderBox};
use crate::io::writer::{Writer, WriterBox};

/// A stringifiable descriptor of one endpoint: a host and port, a path, a
/// logical name.
pub trait ChannelIdentifier: fmt::Display + Send + Sync {}

impl<T: fmt::Display + Send + Sync> ChannelIdentifier for T {}

/// A reference-counted, type-erased [`ChannelIdentifier`] handle.
#[derive(Clone)]
pub struct ChannelIdentifierBox {
    inner: Arc<dyn ChannelIdentifier>,
}

impl ChannelIdentifierBox {
    pub fn new(identifier: impl ChannelIdentifier + 'static) -> Self {
        Self {
            inner: Arc::new(identifier),
        }
    }
}

impl fmt::Display for ChannelIdentifierBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

/// One bidirectional endpoint: identifier, connection, reader, writer.
///
/// The bundle is uniquely owned; [`Channel::into_parts`] splits it so a
/// routine can read while another writes. Wrapping layers (framing, codecs)
/// recompose the bundle around a transformed reader and writer while keeping
/// the inner connection.
pub struct Channel<I, C, R, W> {
    identifier: I,
    connection: C,
    reader: R,
    writer: W,
}

impl<I, C, R, W> Channel<I, C, R, W> {
    pub fn new(identifier: I, connection: C, reader: R, writer: W) -> Self {
        Self {
            identifier,
            connection,
            reader,
            writer,
        }
    }

    pub fn identifier(&self) -> &I {
        &self.identifier
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn reader(&mut self) -> &mut R {
        &mut self.reader
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn into_parts(self) -> (I, C, R, W) {
        (self.identifier, self.connection, self.reader, self.writer)
    }
}

/// A fully type-erased channel. The four boxes share the lifetime of the
/// channel they were split from.
pub type ChannelBox = Channel<ChannelIdentifierBox, ConnectionBox, ReaderBox, WriterBox>;

impl ChannelBox {
    /// Erases a concrete channel into four reference-counted boxes.
    pub fn from_channel<I, C, R, W>(channel: Channel<I, C, R, W>) -> ChannelBox
    where
        I: ChannelIdentifier + 'static,
        C: Connection + 'static,
        R: Reader + 'static,
        W: Writer + 'static,
    {
        let (identifier, connection, reader, writer) = channel.into_parts();
        Channel::new(
            ChannelIdentifierBox::new(identifier),
            ConnectionBox::new(connection),
            ReaderBox::new(reader),
            WriterBox::new(writer),
        )
    }
}
