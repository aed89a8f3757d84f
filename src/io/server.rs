//! Listening endpoints and the accept loop.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};

use crate::error::Result;
use crate::io::channel::ChannelBox;
use crate::routine::scheduler::{JoinHandle, Scheduler};

/// A listening endpoint producing channels.
#[async_trait]
pub trait ServerConnection: Send + Sync {
    /// Suspends until an inbound connection is ready and returns its
    /// channel, with the connection already open. A closed server reports
    /// [`crate::Error::EndOfFile`].
    async fn accept(&self) -> Result<ChannelBox>;

    /// Stops listening and unblocks pending accepts with
    /// [`crate::Error::EndOfFile`]. Idempotent.
    async fn close(&self);
}

/// A reference-counted, type-erased [`ServerConnection`] handle. Clones
/// share the underlying server.
#[derive(Clone)]
pub struct ServerConnectionBox {
    inner: Arc<dyn ServerConnection>,
}

impl ServerConnectionBox {
    pub fn new(server: impl ServerConnection + 'static) -> Self {
        Self {
            inner: Arc::new(server),
        }
    }

    /// Boxes an already shared server.
    pub fn from_arc(server: Arc<dyn ServerConnection>) -> Self {
        Self { inner: server }
    }
}

#[async_trait]
impl ServerConnection for ServerConnectionBox {
    async fn accept(&self) -> Result<ChannelBox> {
        self.inner.accept().await
    }

    async fn close(&self) {
        self.inner.close().await;
    }
}

/// Runs the accept → dispatch → owning-routine pattern.
///
/// One routine accepts channels in a loop; each accepted channel is handed
/// to a fresh routine running the handler, which owns the channel for its
/// whole life. Closing the server ends the accept loop; per-channel routines
/// wind down when their channels close.
pub struct ChannelServer {
    server: ServerConnectionBox,
    accept_loop: JoinHandle,
}

impl ChannelServer {
    pub fn new<H, F>(scheduler: &Scheduler, server: ServerConnectionBox, handler: H) -> Self
    where
        H: Fn(ChannelBox) -> F + Send + Sync + 'static,
        F: Future<Output = ()> + Send + 'static,
    {
        let accept_server = server.clone();
        let spawner = scheduler.clone();
        let accept_loop = scheduler.spawn(async move {
            loop {
                match accept_server.accept().await {
                    Ok(channel) => {
                        debug!("accepted channel {}", channel.identifier());
                        spawner.spawn(handler(channel));
                    }
                    Err(error) => {
                        if !error.is_end_of_file() {
                            warn!("accept loop stopping: {error}");
                        }
                        break;
                    }
                }
            }
        });
        Self {
            server,
            accept_loop,
        }
    }

    /// Closes the server and suspends until the accept loop has wound down.
    pub async fn close(&self) {
        self.server.close().await;
        self.accept_loop.join().await;
    }
}
