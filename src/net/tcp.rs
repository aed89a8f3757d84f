//! TCP channels and the TCP server socket.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use log::warn;
use mio::net::{TcpListener, TcpStream};
use mio::Token;

use crate::error::{Error, Result};
use crate::io::buffer::SharedBuffer;
use crate::io::channel::{Channel, ChannelBox};
use crate::io::connection::Connection;
use crate::io::open_state::OpenState;
use crate::io::reader::Reader;
use crate::io::server::ServerConnection;
use crate::io::writer::Writer;
use crate::net::reactor::{IoWakers, Reactor};
use crate::sync::mutex::Mutex;

const READ_CHUNK: usize = 8 * 1024;

/// Options applied to every connected or accepted socket.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpSocketOptions {
    pub no_delay: bool,
    pub send_buffer_size: Option<usize>,
    pub receive_buffer_size: Option<usize>,
}

/// Renders the peer address, `host:port`.
#[derive(Clone, Copy)]
pub struct SocketIdentifier {
    address: SocketAddr,
}

impl SocketIdentifier {
    pub fn address(&self) -> SocketAddr {
        self.address
    }
}

impl fmt::Display for SocketIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}

fn socket_error(error: io::Error) -> Error {
    Error::Socket(error.raw_os_error().unwrap_or(0), error.to_string())
}

/// Gate check for transfers. An orderly close records end of file as the
/// resource's failure and surfaces here as [`Error::EndOfFile`]; any other
/// recorded failure keeps its cause chain in [`Error::NotOpen`].
fn ensure_open(open_state: &OpenState) -> Result<()> {
    open_state.ensure_open().map_err(|error| match error {
        Error::NotOpen(Some(cause)) if cause.is_end_of_file() => Error::EndOfFile,
        other => other,
    })
}

fn apply_options(stream: &TcpStream, options: &TcpSocketOptions) -> Result<()> {
    stream.set_nodelay(options.no_delay).map_err(socket_error)?;
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;

        fn set_buffer_size(fd: i32, option: libc::c_int, size: usize) -> Result<()> {
            let value = size as libc::c_int;
            let result = unsafe {
                libc::setsockopt(
                    fd,
                    libc::SOL_SOCKET,
                    option,
                    &value as *const libc::c_int as *const libc::c_void,
                    std::mem::size_of::<libc::c_int>() as libc::socklen_t,
                )
            };
            if result < 0 {
                return Err(socket_error(io::Error::last_os_error()));
            }
            Ok(())
        }

        if let Some(size) = options.send_buffer_size {
            set_buffer_size(stream.as_raw_fd(), libc::SO_SNDBUF, size)?;
        }
        if let Some(size) = options.receive_buffer_size {
            set_buffer_size(stream.as_raw_fd(), libc::SO_RCVBUF, size)?;
        }
    }
    Ok(())
}

struct TcpShared {
    stream: TcpStream,
    token: Token,
    wakers: Arc<IoWakers>,
    reactor: Reactor,
    open_state: OpenState,
}

impl TcpShared {
    fn close(&self) {
        if !self.open_state.set_closing() {
            return;
        }
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
        // Record the single failure before waking waiters, so the transfers
        // they retry observe it through the open state.
        self.open_state.set_open_failure(Error::EndOfFile);
        self.wakers.read.wake_ready();
        self.wakers.write.wake_ready();
        self.open_state.set_closed();
    }
}

impl Drop for TcpShared {
    fn drop(&mut self) {
        let token = self.token;
        let reactor = self.reactor.clone();
        reactor.deregister(token, &mut self.stream);
    }
}

/// The lifecycle half of a TCP channel.
pub struct TcpConnection {
    shared: Arc<TcpShared>,
}

#[async_trait]
impl Connection for TcpConnection {
    async fn close(&self) {
        self.shared.close();
    }
}

/// Readiness-driven reader over one TCP stream.
pub struct TcpReader {
    shared: Arc<TcpShared>,
    scratch: Vec<u8>,
}

#[async_trait]
impl Reader for TcpReader {
    fn poll(&self) -> bool {
        self.shared.wakers.read.is_ready()
    }

    async fn read(&mut self, destination: &mut SharedBuffer) -> Result<usize> {
        self.read_at_most(destination, READ_CHUNK).await
    }

    async fn read_at_most(
        &mut self,
        destination: &mut SharedBuffer,
        size: usize,
    ) -> Result<usize> {
        if size == 0 {
            return Ok(0);
        }
        let count = size.min(READ_CHUNK);
        loop {
            ensure_open(&self.shared.open_state)?;
            match (&self.shared.stream).read(&mut self.scratch[..count]) {
                Ok(0) => return Err(Error::EndOfFile),
                Ok(read) => {
                    destination.append(&self.scratch[..read]);
                    return Ok(read);
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                    self.shared.wakers.read.ready().await;
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => return Err(socket_error(error)),
            }
        }
    }
}

/// Serialized writer over one TCP stream: each `write` transfers the whole
/// payload before the next begins.
pub struct TcpWriter {
    shared: Arc<TcpShared>,
    serialize: Mutex<()>,
}

#[async_trait]
impl Writer for TcpWriter {
    async fn write(&self, data: &[u8]) -> Result<()> {
        let _guard = self.serialize.lock().await;
        let mut written = 0;
        while written < data.len() {
            ensure_open(&self.shared.open_state)?;
            match (&self.shared.stream).write(&data[written..]) {
                Ok(0) => return Err(Error::EndOfFile),
                Ok(count) => written += count,
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                    self.shared.wakers.write.ready().await;
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => return Err(socket_error(error)),
            }
        }
        Ok(())
    }
}

/// A bidirectional TCP endpoint.
pub type TcpSocketChannel = Channel<SocketIdentifier, TcpConnection, TcpReader, TcpWriter>;

fn build_channel(
    stream: TcpStream,
    token: Token,
    wakers: Arc<IoWakers>,
    reactor: &Reactor,
    address: SocketAddr,
) -> TcpSocketChannel {
    let shared = Arc::new(TcpShared {
        stream,
        token,
        wakers,
        reactor: reactor.clone(),
        open_state: OpenState::open(),
    });
    Channel::new(
        SocketIdentifier { address },
        TcpConnection {
            shared: Arc::clone(&shared),
        },
        TcpReader {
            shared: Arc::clone(&shared),
            scratch: vec![0; READ_CHUNK],
        },
        TcpWriter {
            shared,
            serialize: Mutex::new(()),
        },
    )
}

/// Opens a TCP connection to `address`, suspending until it is established.
pub async fn connect(
    reactor: &Reactor,
    address: SocketAddr,
    options: &TcpSocketOptions,
) -> Result<TcpSocketChannel> {
    let mut stream = TcpStream::connect(address).map_err(|error| {
        Error::Connect(
            format!("unable to reach {address}"),
            Some(Arc::new(socket_error(error))),
        )
    })?;
    let (token, wakers) = reactor.register(&mut stream)?;
    loop {
        wakers.write.ready().await;
        if let Ok(Some(error)) = stream.take_error() {
            reactor.deregister(token, &mut stream);
            return Err(Error::Connect(
                format!("unable to reach {address}"),
                Some(Arc::new(socket_error(error))),
            ));
        }
        match stream.peer_addr() {
            Ok(_) => break,
            Err(error)
                if error.kind() == io::ErrorKind::NotConnected
                    || error.kind() == io::ErrorKind::WouldBlock => {}
            Err(error) => {
                reactor.deregister(token, &mut stream);
                return Err(Error::Connect(
                    format!("unable to reach {address}"),
                    Some(Arc::new(socket_error(error))),
                ));
            }
        }
    }
    if let Err(error) = apply_options(&stream, options) {
        reactor.deregister(token, &mut stream);
        return Err(error);
    }
    Ok(build_channel(stream, token, wakers, reactor, address))
}

/// A listening TCP socket.
pub struct TcpServerSocket {
    listener: TcpListener,
    token: Token,
    wakers: Arc<IoWakers>,
    reactor: Reactor,
    options: TcpSocketOptions,
    open_state: OpenState,
    local_address: SocketAddr,
}

impl TcpServerSocket {
    /// Binds to `address` and starts listening. Bind to port 0 for an
    /// ephemeral port, then read it back with
    /// [`TcpServerSocket::local_address`].
    pub fn bind(
        reactor: &Reactor,
        address: SocketAddr,
        options: TcpSocketOptions,
    ) -> Result<Self> {
        let mut listener = TcpListener::bind(address).map_err(|error| {
            Error::Connect(
                format!("unable to open server on {address}"),
                Some(Arc::new(socket_error(error))),
            )
        })?;
        let local_address = listener.local_addr().map_err(socket_error)?;
        let (token, wakers) = reactor.register(&mut listener)?;
        Ok(Self {
            listener,
            token,
            wakers,
            reactor: reactor.clone(),
            options,
            open_state: OpenState::open(),
            local_address,
        })
    }

    pub fn local_address(&self) -> SocketAddr {
        self.local_address
    }

    /// Suspends until an inbound connection arrives and returns its channel,
    /// already open with the configured options applied. A channel that
    /// fails while being opened is dropped and the accept continues.
    pub async fn accept(&self) -> Result<TcpSocketChannel> {
        loop {
            ensure_open(&self.open_state)?;
            match self.listener.accept() {
                Ok((mut stream, peer)) => match self.open_accepted(&mut stream, peer) {
                    Ok((token, wakers)) => {
                        return Ok(build_channel(stream, token, wakers, &self.reactor, peer));
                    }
                    Err(error) => {
                        warn!("dropping accepted channel from {peer}: {error}");
                    }
                },
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                    self.wakers.read.ready().await;
                }
                Err(error)
                    if error.kind() == io::ErrorKind::Interrupted
                        || error.kind() == io::ErrorKind::ConnectionAborted => {}
                Err(error) => {
                    ensure_open(&self.open_state)?;
                    return Err(socket_error(error));
                }
            }
        }
    }

    fn open_accepted(
        &self,
        stream: &mut TcpStream,
        _peer: SocketAddr,
    ) -> Result<(Token, Arc<IoWakers>)> {
        apply_options(stream, &self.options)?;
        self.reactor.register(stream)
    }

    /// Unblocks pending accepts with [`Error::EndOfFile`]. Idempotent.
    pub fn close(&self) {
        if !self.open_state.set_closing() {
            return;
        }
        self.open_state.set_open_failure(Error::EndOfFile);
        self.wakers.read.wake_ready();
        self.open_state.set_closed();
    }
}

#[async_trait]
impl ServerConnection for TcpServerSocket {
    async fn accept(&self) -> Result<ChannelBox> {
        TcpServerSocket::accept(self)
            .await
            .map(ChannelBox::from_channel)
    }

    async fn close(&self) {
        TcpServerSocket::close(self);
    }
}

impl Drop for TcpServerSocket {
    fn drop(&mut self) {
        self.close();
        let token = self.token;
        let reactor = self.reactor.clone();
        reactor.deregister(token, &mut self.listener);
    }
}
