//! In-process channels and servers, built from pipes.
//!
//! A local server pairs every `connect` with a pending `accept`: the two
//! sides receive mirror-image channels whose reader is the peer's writer.
//! Useful wherever a real transport is noise — composition layers and
//! tests.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::io::channel::{Channel, ChannelBox};
use crate::io::connection::Connection;
use crate::io::open_state::OpenState;
use crate::io::pipe::{pipe, PipedReader, PipedWriter};
use crate::io::server::ServerConnection;
use crate::queue::queue::Queue;

/// Identifies a local channel by the server name and its role.
#[derive(Clone)]
pub struct LocalChannelIdentifier {
    name: String,
}

impl LocalChannelIdentifier {
    fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for LocalChannelIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Closes both directions of a local channel.
pub struct LocalConnection {
    open_state: OpenState,
    outbound: PipedWriter,
    inbound: PipedWriter,
}

impl LocalConnection {
    fn new(outbound: PipedWriter, inbound: PipedWriter) -> Self {
        Self {
            open_state: OpenState::open(),
            outbound,
            inbound,
        }
    }
}

#[async_trait]
impl Connection for LocalConnection {
    async fn close(&self) {
        if !self.open_state.set_closing() {
            return;
        }
        self.outbound.close();
        self.inbound.close();
        // The one failure this close publishes: an orderly end of file.
        self.open_state.set_open_failure(Error::EndOfFile);
        self.open_state.set_closed();
    }
}

/// A channel whose peer lives in the same process.
pub type LocalChannel = Channel<LocalChannelIdentifier, LocalConnection, PipedReader, PipedWriter>;

/// An in-process listening endpoint.
///
/// `connect` hands back the client half immediately and queues the server
/// half for `accept`. Closing the server unblocks pending accepts with
/// [`Error::EndOfFile`] and refuses further connects.
pub struct LocalServerConnection {
    name: String,
    accepts: Arc<Queue<ChannelBox>>,
}

impl LocalServerConnection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            accepts: Queue::new(),
        }
    }

    /// Establishes a connection, returning the client channel.
    pub fn connect(&self) -> Result<LocalChannel> {
        let (client_to_server, server_reader) = pipe();
        let (server_to_client, client_reader) = pipe();
        let server_channel = Channel::new(
            LocalChannelIdentifier::new(format!("{}/server", self.name)),
            LocalConnection::new(server_to_client.clone(), client_to_server.clone()),
            server_reader,
            server_to_client.clone(),
        );
        let _ = self.accepts.try_push(ChannelBox::from_channel(server_channel));
        // Pushing into a broken queue is a silent drop; a closed server is
        // detected by asking the accept queue afterwards.
        if self.accepts.is_broken() {
            return Err(Error::Connect(
                format!("local server {} closed", self.name),
                None,
            ));
        }
        Ok(Channel::new(
            LocalChannelIdentifier::new(format!("{}/client", self.name)),
            LocalConnection::new(client_to_server.clone(), server_to_client),
            client_reader,
            client_to_server,
        ))
    }

    /// Suspends until a peer connects.
    pub async fn accept(&self) -> Result<ChannelBox> {
        self.accepts.pop().await.map_err(|_| Error::EndOfFile)
    }

    /// Unblocks pending accepts with [`Error::EndOfFile`]. Idempotent.
    pub fn close(&self) {
        self.accepts.close();
    }
}

#[async_trait]
impl ServerConnection for LocalServerConnection {
    async fn accept(&self) -> Result<ChannelBox> {
        LocalServerConnection::accept(self).await
    }

    async fn close(&self) {
        LocalServerConnection::close(self);
    }
}
