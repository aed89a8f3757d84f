//! The lifecycle half of an I/O resource.

use std::sync::Arc;

use async_trait::async_trait;

/// Closes a resource.
///
/// `close` is idempotent and safe from any routine or thread. It unblocks
/// every pending read with [`crate::Error::EndOfFile`], fails pending
/// writes, and publishes a single failure to the resource's
/// [`crate::io::OpenState`].
#[async_trait]
pub trait Connection: Send + Sync {
    async fn close(&self);
}

/// A reference-counted, type-erased [`Connection`] handle. Clones share the
/// underlying connection.
#[derive(Clone)]
pub struct ConnectionBox {
    inner: Arc<dyn Connection>,
}

impl ConnectionBox {
    pub fn new(connection: impl Connection + 'static) -> Self {
        Self {
            inner: Arc::new(connection),
        }
    }
}

#[async_trait]
impl Connection for ConnectionBox {
    async fn close(&self) {
        self.inner.close().await;
    }
}
