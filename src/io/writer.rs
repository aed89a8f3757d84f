//! The byte sink contract.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::io::buffer::SharedBuffer;

/// A polymorphic byte sink with at-least-sent semantics: a successful write
/// means the bytes were handed to the transport, not that they were
/// delivered.
///
/// Each call transfers the full payload or fails; implementations serialize
/// concurrent writes internally, so framing is preserved per call (and no
/// further).
#[async_trait]
pub trait Writer: Send + Sync {
    async fn write(&self, data: &[u8]) -> Result<()>;

    async fn write_buffer(&self, buffer: &SharedBuffer) -> Result<()> {
        self.write(buffer.as_slice()).await
    }
}

/// A reference-counted, type-erased [`Writer`] handle. Clones share the
/// underlying writer.
#[derive(Clone)]
pub struct WriterBox {
    inner: Arc<dyn Writer>,
}

impl WriterBox {
    pub fn new(writer: impl Writer + 'static) -> Self {
        Self {
            inner: Arc::new(writer),
        }
    }
}

#[async_trait]
impl Writer for WriterBox {
    async fn write(&self, data: &[u8]) -> Result<()> {
        self.inner.write(data).await
    }
}
